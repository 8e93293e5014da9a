use crate::core::time::DateTime;
use crate::intuis::schema::{MeasureBody, MeasureSeries};
use crate::topology::Topology;

use super::EnergyMeasurement;

/// Expands one series into per-interval measurements. Sample `i` starts at
/// `beg_time + i * step_time`.
pub fn derive_measurements(room_id: &str, series: &MeasureSeries, default_step_secs: i64) -> Vec<EnergyMeasurement> {
    let step = series.step_time.unwrap_or(default_step_secs);

    series
        .value
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let secs = series.beg_time + index as i64 * step;
            match DateTime::from_timestamp(secs) {
                Ok(timestamp) => Some(EnergyMeasurement {
                    timestamp,
                    room_id: room_id.to_owned(),
                    energy_wh: value.total(),
                }),
                Err(e) => {
                    tracing::warn!("Skipping measurement of room {}: {}", room_id, e);
                    None
                }
            }
        })
        .collect()
}

/// All measurements of rooms known to the topology, ascending by time per room.
pub fn from_measure_body(body: &MeasureBody, topology: &Topology, default_step_secs: i64) -> Vec<EnergyMeasurement> {
    let mut measurements: Vec<EnergyMeasurement> = body
        .home
        .rooms
        .iter()
        .filter(|room| {
            let known = topology.room(&room.id).is_some();
            if !known {
                tracing::debug!("Ignoring measurements of unknown room {}", room.id);
            }
            known
        })
        .flat_map(|room| {
            room.measures
                .iter()
                .flat_map(|series| derive_measurements(&room.id, series, default_step_secs))
        })
        .collect();

    measurements.sort_by(|a, b| a.room_id.cmp(&b.room_id).then(a.timestamp.cmp(&b.timestamp)));
    measurements
}
