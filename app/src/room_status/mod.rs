mod control;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use crate::core::cache::TtlCache;
use crate::core::coordinator::Source;
use crate::intuis::schema::{HomeStatusBody, RoomStatusData};
use crate::intuis::{IntuisClient, IntuisError};
use crate::topology::{Capabilities, Room, Topology};

pub use control::{RoomControl, WaterHeaterMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetpointMode {
    Schedule,
    Manual,
    Off,
    FrostGuard,
    Other(String),
}

impl SetpointMode {
    pub fn from_upstream(value: &str) -> Self {
        match value {
            "home" => SetpointMode::Schedule,
            "manual" => SetpointMode::Manual,
            "off" => SetpointMode::Off,
            "hg" => SetpointMode::FrostGuard,
            other => SetpointMode::Other(other.to_owned()),
        }
    }

    pub fn as_upstream(&self) -> &str {
        match self {
            SetpointMode::Schedule => "home",
            SetpointMode::Manual => "manual",
            SetpointMode::Off => "off",
            SetpointMode::FrostGuard => "hg",
            SetpointMode::Other(value) => value,
        }
    }
}

impl std::str::FromStr for SetpointMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match SetpointMode::from_upstream(s) {
            SetpointMode::Other(other) => anyhow::bail!("Unknown set-point mode {}", other),
            mode => Ok(mode),
        }
    }
}

impl Display for SetpointMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_upstream())
    }
}

/// Live state of one room, rebuilt from scratch on every poll.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomStatus {
    pub room_id: String,
    pub home_id: String,
    pub name: String,
    pub capabilities: Capabilities,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub mode: Option<SetpointMode>,
    pub open_window: Option<bool>,
    pub boost: Option<String>,
    pub presence: Option<bool>,
}

pub type StatusMap = BTreeMap<String, RoomStatus>;

impl RoomStatus {
    fn merged(room: &Room, capabilities: Capabilities, live: Option<&RoomStatusData>) -> Self {
        Self {
            room_id: room.id.clone(),
            home_id: room.home_id.clone(),
            name: room.name.clone(),
            capabilities,
            current_temperature: live.and_then(|l| l.therm_measured_temperature),
            target_temperature: live.and_then(|l| l.therm_setpoint_temperature),
            mode: live
                .and_then(|l| l.therm_setpoint_mode.as_deref())
                .map(SetpointMode::from_upstream),
            open_window: live.and_then(|l| l.open_window),
            boost: live.and_then(|l| l.boost_status.clone()),
            presence: live.and_then(|l| l.presence),
        }
    }
}

/// Live status of every home, read through the status cache.
pub struct StatusSource {
    client: IntuisClient,
    cache: Arc<TtlCache<String, HomeStatusBody>>,
    home_ids: Vec<String>,
}

impl StatusSource {
    pub fn new(client: IntuisClient, cache: Arc<TtlCache<String, HomeStatusBody>>, topology: &Topology) -> Self {
        Self {
            client,
            cache,
            home_ids: topology.homes().iter().map(|h| h.id.clone()).collect(),
        }
    }
}

impl Source for StatusSource {
    type Raw = Vec<HomeStatusBody>;
    type Output = StatusMap;

    fn name(&self) -> &'static str {
        "status"
    }

    async fn fetch(&self) -> Result<Self::Raw, IntuisError> {
        let fetches = self
            .home_ids
            .iter()
            .map(|home_id| self.cache.get_or_fetch(home_id.clone(), || self.client.home_status(home_id)));

        futures::future::try_join_all(fetches).await
    }

    fn merge(&self, raw: Self::Raw, topology: &Topology) -> Self::Output {
        let live_rooms: Vec<&RoomStatusData> = raw.iter().flat_map(|s| s.home.rooms.iter()).collect();

        topology
            .rooms()
            .map(|room| {
                let live = live_rooms.iter().find(|l| l.id == room.id).copied();
                if live.is_none() {
                    tracing::debug!("No live status for room {} ({})", room.name, room.id);
                }

                let status = RoomStatus::merged(room, topology.capabilities(room), live);
                (room.id.clone(), status)
            })
            .collect()
    }
}
