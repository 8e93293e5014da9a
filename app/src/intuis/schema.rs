//! Wire format of the Intuis cloud API. Decoded once at the boundary, the rest of the service only
//! sees the typed topology and status values.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
}

/// Every data endpoint wraps its payload in `body`, failures come back as `error`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub body: Option<T>,
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomesDataBody {
    #[serde(default)]
    pub homes: Vec<HomeData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeData {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub rooms: Vec<RoomData>,
    #[serde(default)]
    pub modules: Vec<ModuleData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomData {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub room_type: Option<String>,
    #[serde(default, alias = "module_ids")]
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleData {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub bridge: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeStatusBody {
    pub home: HomeStatusData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeStatusData {
    #[serde(default)]
    pub rooms: Vec<RoomStatusData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomStatusData {
    pub id: String,
    pub therm_measured_temperature: Option<f64>,
    pub therm_setpoint_temperature: Option<f64>,
    pub therm_setpoint_mode: Option<String>,
    pub open_window: Option<bool>,
    pub boost_status: Option<String>,
    pub presence: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SetStateRequest {
    pub home: SetStateHome,
}

#[derive(Debug, Serialize)]
pub struct SetStateHome {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<SetStateRoom>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<SetStateModule>,
}

#[derive(Debug, Serialize)]
pub struct SetStateRoom {
    pub id: String,
    pub therm_setpoint_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub therm_setpoint_temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SetStateModule {
    pub id: String,
    pub bridge: String,
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct MeasureRequest {
    pub date_begin: i64,
    pub date_end: i64,
    pub scale: &'static str,
    pub step_time: i64,
    pub home: MeasureRequestHome,
}

#[derive(Debug, Serialize)]
pub struct MeasureRequestHome {
    pub id: String,
    pub rooms: Vec<MeasureRequestRoom>,
}

#[derive(Debug, Serialize)]
pub struct MeasureRequestRoom {
    pub id: String,
    pub bridge: String,
    #[serde(rename = "type")]
    pub measure_types: Vec<&'static str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasureBody {
    pub home: MeasureHome,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasureHome {
    #[serde(default)]
    pub rooms: Vec<RoomMeasures>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomMeasures {
    pub id: String,
    #[serde(default)]
    pub measures: Vec<MeasureSeries>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasureSeries {
    pub beg_time: i64,
    pub step_time: Option<i64>,
    #[serde(default)]
    pub value: Vec<MeasureValue>,
}

/// A sample is either one reading or a vector of sub-readings. Missing readings count as zero.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MeasureValue {
    Single(Option<f64>),
    Multi(Vec<Option<f64>>),
}

impl MeasureValue {
    pub fn total(&self) -> f64 {
        match self {
            MeasureValue::Single(value) => value.unwrap_or(0.0),
            MeasureValue::Multi(values) => values.iter().map(|v| v.unwrap_or(0.0)).sum(),
        }
    }
}
