use std::fmt::Display;
use std::sync::Arc;

use anyhow::Context as _;

use crate::core::cache::TtlCache;
use crate::core::coordinator::PollingCoordinator;
use crate::intuis::IntuisClient;
use crate::intuis::schema::HomeStatusBody;
use crate::topology::{Room, Topology};

use super::{RoomStatus, SetpointMode, StatusSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WaterHeaterMode {
    Off,
    Auto,
    ForceOn,
}

impl WaterHeaterMode {
    fn as_upstream(&self) -> &'static str {
        match self {
            WaterHeaterMode::Off => "off",
            WaterHeaterMode::Auto => "auto",
            WaterHeaterMode::ForceOn => "temporary_on",
        }
    }

    /// Water heaters report through the room set-point mode, with a looser vocabulary.
    pub fn from_setpoint_mode(mode: &SetpointMode) -> Self {
        match mode {
            SetpointMode::Manual => WaterHeaterMode::ForceOn,
            SetpointMode::Schedule => WaterHeaterMode::Auto,
            SetpointMode::Other(other) => match other.to_lowercase().as_str() {
                "on" | "forced" | "force" | "override" | "temporary_on" => WaterHeaterMode::ForceOn,
                "auto" | "schedule" => WaterHeaterMode::Auto,
                _ => WaterHeaterMode::Off,
            },
            SetpointMode::Off | SetpointMode::FrostGuard => WaterHeaterMode::Off,
        }
    }
}

impl Display for WaterHeaterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_upstream())
    }
}

impl RoomStatus {
    pub fn water_heater_mode(&self) -> Option<WaterHeaterMode> {
        if !self.capabilities.water_heater {
            return None;
        }

        Some(self.mode.as_ref().map_or(WaterHeaterMode::Off, WaterHeaterMode::from_setpoint_mode))
    }
}

/// State-changing calls. Each successful change drops the cached live status of the home and
/// asks the status coordinator for an immediate refresh.
pub struct RoomControl {
    client: IntuisClient,
    topology: Arc<Topology>,
    status_cache: Arc<TtlCache<String, HomeStatusBody>>,
    status: Option<Arc<PollingCoordinator<StatusSource>>>,
}

impl RoomControl {
    pub fn new(
        client: IntuisClient,
        topology: Arc<Topology>,
        status_cache: Arc<TtlCache<String, HomeStatusBody>>,
        status: Option<Arc<PollingCoordinator<StatusSource>>>,
    ) -> Self {
        Self {
            client,
            topology,
            status_cache,
            status,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_temperature(&self, room_id: &str, temperature: f64) -> anyhow::Result<()> {
        let room = self.room(room_id)?;

        self.client
            .set_room_state(
                &room.home_id,
                &room.id,
                SetpointMode::Manual.as_upstream(),
                Some(temperature),
            )
            .await
            .with_context(|| format!("Error setting temperature of room {}", room.name))?;

        self.after_change(room).await;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_mode(&self, room_id: &str, mode: SetpointMode) -> anyhow::Result<()> {
        let room = self.room(room_id)?;

        self.client
            .set_room_state(&room.home_id, &room.id, mode.as_upstream(), None)
            .await
            .with_context(|| format!("Error setting mode of room {}", room.name))?;

        self.after_change(room).await;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_water_heater_mode(&self, room_id: &str, mode: WaterHeaterMode) -> anyhow::Result<()> {
        let room = self.room(room_id)?;

        let device = self
            .topology
            .water_heater_of(room)
            .with_context(|| format!("Room {} has no water heater module", room.name))?;
        let bridge_id = device
            .bridge_id
            .as_deref()
            .with_context(|| format!("Water heater module {} in room {} has no bridge", device.id, room.name))?;

        self.client
            .set_module_mode(&room.home_id, &device.id, bridge_id, mode.as_upstream())
            .await
            .with_context(|| format!("Error setting water heater mode of room {}", room.name))?;

        self.after_change(room).await;
        Ok(())
    }

    fn room(&self, room_id: &str) -> anyhow::Result<&Room> {
        self.topology
            .room(room_id)
            .with_context(|| format!("Unknown room {}", room_id))
    }

    async fn after_change(&self, room: &Room) {
        self.status_cache.invalidate(&room.home_id).await;

        if let Some(status) = &self.status {
            status.request_refresh();
        }
    }
}
