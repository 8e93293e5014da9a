use std::sync::Arc;

use anyhow::Context as _;
use infrastructure::{EventListener, meter};
use tokio_util::sync::CancellationToken;

use crate::core::time::DateTimeRange;
use crate::statistics::{StatField, StatMetadata, StatPeriod, StatisticWrite, StatisticsStore};
use crate::topology::{Room, Topology};

use super::reconcile::reconcile;
use super::{EnergyBatch, EnergyCategory, EnergyConfig, EnergyMeasurement, statistic_id};

/// Keeps the per-room cumulative energy statistics in the store continuous with what was
/// written in earlier cycles.
pub struct EnergyReconciler<S> {
    store: S,
    topology: Arc<Topology>,
    config: EnergyConfig,
}

impl<S: StatisticsStore> EnergyReconciler<S> {
    pub fn new(store: S, topology: Arc<Topology>, config: EnergyConfig) -> Self {
        Self {
            store,
            topology,
            config,
        }
    }

    /// Processes every batch published by the energy coordinator until cancelled. A failed cycle
    /// is logged and skipped, the next batch starts over.
    pub async fn run(&self, mut batches: EventListener<Vec<EnergyBatch>>, cancel: CancellationToken) {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => None,
                received = batches.recv() => received,
            };

            let Some(received) = received else {
                tracing::info!("Stopping energy reconciliation");
                return;
            };

            for batch in received {
                if let Err(e) = self.process(&batch).await {
                    tracing::error!("Energy cycle for home {} dropped: {:?}", batch.home_id, e);
                    meter::increment("intuis_energy_cycles", &[("result", "dropped")]);
                }
            }
        }
    }

    /// Reconciles all rooms of the batch first and writes them together once every room
    /// succeeded. Returns the number of points written.
    #[tracing::instrument(skip_all, fields(home_id = %batch.home_id, window = %batch.window))]
    pub async fn process(&self, batch: &EnergyBatch) -> anyhow::Result<usize> {
        let mut pending = vec![];

        for room in self.topology.rooms().filter(|r| r.home_id == batch.home_id) {
            let measurements: Vec<EnergyMeasurement> = batch
                .measurements
                .iter()
                .filter(|m| m.room_id == room.id)
                .cloned()
                .collect();

            if measurements.is_empty() {
                tracing::debug!("No energy measurements for room {}", room.name);
                continue;
            }

            pending.push(self.reconcile_room(room, &measurements).await?);
        }

        self.store
            .write_all(&pending)
            .await
            .with_context(|| format!("Error writing energy statistics of home {}", batch.home_id))?;

        let mut written = 0;
        for write in &pending {
            meter::set(
                "intuis_energy_points_written",
                write.points.len() as f64,
                &[("statistic_id", write.statistic_id.as_str())],
            );
            written += write.points.len();
        }

        meter::increment("intuis_energy_cycles", &[("result", "ok")]);
        tracing::info!("Wrote {} energy points", written);

        Ok(written)
    }

    async fn reconcile_room(&self, room: &Room, measurements: &[EnergyMeasurement]) -> anyhow::Result<StatisticWrite> {
        let category = self.category_of(room);
        let statistic_id = statistic_id(&self.config.statistic_prefix, category, &room.home_id, &room.id);

        let first = measurements.iter().map(|m| m.timestamp).min().context("No measurements")?;
        let last = measurements.iter().map(|m| m.timestamp).max().context("No measurements")?;
        let range = DateTimeRange::new(first, last).extend_start(self.config.query_margin);

        let mut persisted = self
            .store
            .query(&statistic_id, &range, StatPeriod::Hour, &[StatField::Mean, StatField::Sum])
            .await
            .with_context(|| format!("Error reading statistic {}", statistic_id))?;

        //the last stored sum may be older than the query margin after a longer outage
        if !persisted.iter().any(|p| p.start < first && p.sum.is_some()) {
            if let Some(previous) = self
                .store
                .last_before(&statistic_id, first)
                .await
                .with_context(|| format!("Error reading last sum of statistic {}", statistic_id))?
            {
                persisted.insert(0, previous);
            }
        }

        let reconciled = reconcile(measurements, &persisted, self.config.drift_tolerance_wh);

        for drift in &reconciled.drifts {
            tracing::warn!(
                "Energy drift in {} at {}: {:?} stored {} but computed {}",
                statistic_id,
                drift.start,
                drift.field,
                drift.persisted,
                drift.computed
            );
            meter::increment("intuis_energy_drifts", &[("statistic_id", statistic_id.as_str())]);
        }

        tracing::debug!(
            "Room {}: {} points continuing from {} Wh, {} already stored",
            room.name,
            reconciled.points.len(),
            reconciled.baseline,
            persisted.len()
        );

        Ok(StatisticWrite {
            metadata: StatMetadata {
                name: format!("{} energy", room.name),
                unit: "Wh".to_owned(),
                has_mean: true,
                has_sum: true,
            },
            statistic_id,
            points: reconciled.points,
        })
    }

    fn category_of(&self, room: &Room) -> EnergyCategory {
        if self.topology.capabilities(room).water_heater {
            EnergyCategory::HotWater
        } else {
            EnergyCategory::Heating
        }
    }
}
