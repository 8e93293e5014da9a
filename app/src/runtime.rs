use std::sync::Arc;

use crate::core::cache::TtlCache;
use crate::core::coordinator::PollingCoordinator;
use crate::energy::{EnergyConfig, EnergySource};
use crate::intuis::schema::HomeStatusBody;
use crate::intuis::{IntuisClient, IntuisError};
use crate::room_status::{RoomControl, StatusMap, StatusSource};
use crate::settings::PollingConfig;
use crate::topology::{self, Topology};

/// Everything that lives for the whole process, created once by the composition root.
pub struct Runtime {
    pub client: IntuisClient,
    pub topology: Arc<Topology>,
    pub status_cache: Arc<TtlCache<String, HomeStatusBody>>,
    pub status: Arc<PollingCoordinator<StatusSource>>,
}

/// Loads the topology and wires the status coordinator, without polling yet.
pub async fn connect(client: IntuisClient, polling: &PollingConfig) -> Result<Runtime, IntuisError> {
    let topology = Arc::new(topology::load(&client).await?);
    let status_cache = Arc::new(TtlCache::new("status", polling.status_cache_ttl));

    let mut status = PollingCoordinator::new(
        StatusSource::new(client.clone(), status_cache.clone(), &topology),
        topology.clone(),
        polling.status_interval,
    );
    status.add_listener(log_status);
    status.add_listener(record_temperatures);

    Ok(Runtime {
        client,
        topology,
        status_cache,
        status: Arc::new(status),
    })
}

/// `connect` followed by the initial status refresh. Any failure here means the service is not
/// ready and must not start polling.
pub async fn bootstrap(client: IntuisClient, polling: &PollingConfig) -> Result<Runtime, IntuisError> {
    let runtime = connect(client, polling).await?;
    runtime.status.first_refresh().await?;

    tracing::info!(
        "Bootstrapped {} homes with {} rooms",
        runtime.topology.homes().len(),
        runtime.topology.rooms().count()
    );

    Ok(runtime)
}

impl Runtime {
    pub fn control(&self) -> RoomControl {
        RoomControl::new(
            self.client.clone(),
            self.topology.clone(),
            self.status_cache.clone(),
            Some(self.status.clone()),
        )
    }

    pub fn energy_coordinator(&self, polling: &PollingConfig, energy: &EnergyConfig) -> PollingCoordinator<EnergySource> {
        let cache = Arc::new(TtlCache::new("energy", polling.energy_cache_ttl));

        PollingCoordinator::new(
            EnergySource::new(self.client.clone(), cache, &self.topology, energy.lookback),
            self.topology.clone(),
            polling.energy_interval,
        )
    }
}

fn log_status(rooms: &StatusMap) -> anyhow::Result<()> {
    for status in rooms.values() {
        tracing::debug!(
            "{}: {:?}°C -> {:?}°C, mode {:?}",
            status.name,
            status.current_temperature,
            status.target_temperature,
            status.mode
        );
    }
    Ok(())
}

fn record_temperatures(rooms: &StatusMap) -> anyhow::Result<()> {
    for status in rooms.values() {
        if let Some(temperature) = status.current_temperature {
            infrastructure::meter::set("intuis_room_temperature", temperature, &[("room", status.name.as_str())]);
        }
        if let Some(target) = status.target_temperature {
            infrastructure::meter::set("intuis_room_target_temperature", target, &[("room", status.name.as_str())]);
        }
    }
    Ok(())
}
