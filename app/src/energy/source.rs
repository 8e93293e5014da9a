use std::sync::Arc;

use crate::core::cache::TtlCache;
use crate::core::coordinator::Source;
use crate::core::time::{DateTime, DateTimeRange, Duration};
use crate::intuis::schema::MeasureBody;
use crate::intuis::{IntuisClient, IntuisError, MeasureTarget};
use crate::topology::Topology;

use super::measurement::from_measure_body;
use super::EnergyBatch;

const STEP_SECS: i64 = 3600;

/// Raw measurement answer together with the window it was requested for.
#[derive(Debug, Clone)]
pub struct MeasureWindow {
    pub home_id: String,
    pub window: DateTimeRange,
    pub body: MeasureBody,
}

/// Hourly energy series for the trailing lookback window, ending at the current full hour.
pub struct EnergySource {
    client: IntuisClient,
    cache: Arc<TtlCache<String, MeasureWindow>>,
    targets: Vec<(String, Vec<MeasureTarget>)>,
    lookback: Duration,
}

impl EnergySource {
    pub fn new(
        client: IntuisClient,
        cache: Arc<TtlCache<String, MeasureWindow>>,
        topology: &Topology,
        lookback: Duration,
    ) -> Self {
        let targets = topology
            .homes()
            .iter()
            .map(|home| {
                let rooms = home
                    .rooms
                    .iter()
                    .filter_map(|room| match &room.bridge_id {
                        Some(bridge_id) => Some(MeasureTarget {
                            room_id: room.id.clone(),
                            bridge_id: bridge_id.clone(),
                        }),
                        None => {
                            tracing::info!("Room {} ({}) has no bridge, no energy data available", room.name, room.id);
                            None
                        }
                    })
                    .collect();
                (home.id.clone(), rooms)
            })
            .collect();

        Self {
            client,
            cache,
            targets,
            lookback,
        }
    }

    fn current_window(&self) -> DateTimeRange {
        DateTimeRange::ending_at(DateTime::now().start_of_hour(), self.lookback)
    }
}

impl Source for EnergySource {
    type Raw = Vec<MeasureWindow>;
    type Output = Vec<EnergyBatch>;

    fn name(&self) -> &'static str {
        "energy"
    }

    async fn fetch(&self) -> Result<Self::Raw, IntuisError> {
        let client = &self.client;
        let window = &self.current_window();
        let mut windows = vec![];

        for (home_id, targets) in self.targets.iter().filter(|(_, t)| !t.is_empty()) {
            tracing::debug!("Fetching energy of home {} for {}", home_id, window);

            let measured = self
                .cache
                .get_or_fetch(home_id.clone(), move || async move {
                    let body = client.home_measure(home_id, targets, window).await?;
                    Ok::<_, IntuisError>(MeasureWindow {
                        home_id: home_id.clone(),
                        window: window.clone(),
                        body,
                    })
                })
                .await?;

            windows.push(measured);
        }

        Ok(windows)
    }

    fn merge(&self, raw: Self::Raw, topology: &Topology) -> Self::Output {
        raw.into_iter()
            .map(|measured| {
                let measurements = from_measure_body(&measured.body, topology, STEP_SECS);
                tracing::info!(
                    "Received {} energy measurements for home {} in {}",
                    measurements.len(),
                    measured.home_id,
                    measured.window
                );

                EnergyBatch {
                    home_id: measured.home_id,
                    window: measured.window,
                    measurements,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::FIXED_NOW;
    use crate::intuis::mock_client;
    use crate::topology::tests::sample_topology;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn requests_bridged_rooms_for_window_ending_at_full_hour() {
        let (mut server, _token, client) = mock_client().await;
        let measure = server
            .mock("POST", "/api/gethomemeasure")
            .match_body(Matcher::PartialJson(json!({
                "date_begin": 1_730_602_800,
                "date_end": 1_730_646_000,
                "scale": "1hour",
                "home": {"id": "home-1", "rooms": [
                    {"id": "living", "bridge": "gw-1", "type": ["sum_energy_elec"]},
                    {"id": "bath", "bridge": "gw-1", "type": ["sum_energy_elec"]}
                ]}
            })))
            .with_status(200)
            .with_body(
                r#"{"body": {"home": {"rooms": [
                    {"id": "living", "measures": [{"beg_time": 1730602800, "step_time": 3600, "value": [100, 200]}]}
                ]}}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let topology = sample_topology();
        let source = EnergySource::new(
            client,
            Arc::new(TtlCache::new("energy", Duration::seconds(300))),
            &topology,
            Duration::hours(12),
        );

        //2024-11-03T15:00:00Z is the full hour before now
        let now = DateTime::from_iso("2024-11-03T15:42:10Z").unwrap();
        let raw = FIXED_NOW.scope(now, source.fetch()).await.unwrap();
        let batches = source.merge(raw, &topology);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].home_id, "home-1");
        assert_eq!(batches[0].measurements.len(), 2);
        assert_eq!(*batches[0].window.end(), DateTime::from_iso("2024-11-03T15:00:00Z").unwrap());
        measure.assert_async().await;
    }
}
