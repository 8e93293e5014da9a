use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::time::{DateTime, DateTimeRange};

use super::{PersistedStatPoint, StatField, StatMetadata, StatPeriod, StatisticWrite, StatisticsStore, select_fields};

type Series = (StatMetadata, BTreeMap<DateTime, PersistedStatPoint>);

#[derive(Default)]
pub struct InMemoryStatisticsStore {
    series: Mutex<HashMap<String, Series>>,
    unavailable: AtomicBool,
    failing_statistic: Mutex<Option<String>>,
    writes: Mutex<Vec<String>>,
}

impl InMemoryStatisticsStore {
    pub fn with_points(statistic_id: &str, points: Vec<PersistedStatPoint>) -> Self {
        let store = Self::default();
        let metadata = StatMetadata {
            name: statistic_id.to_owned(),
            unit: "Wh".to_owned(),
            has_mean: true,
            has_sum: true,
        };
        store.series.lock().unwrap().insert(
            statistic_id.to_owned(),
            (metadata, points.into_iter().map(|p| (p.start, p)).collect()),
        );
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes every batch containing `statistic_id` fail without writing anything.
    pub fn fail_writes_of(&self, statistic_id: &str) {
        *self.failing_statistic.lock().unwrap() = Some(statistic_id.to_owned());
    }

    pub fn points(&self, statistic_id: &str) -> Vec<PersistedStatPoint> {
        self.series
            .lock()
            .unwrap()
            .get(statistic_id)
            .map(|(_, points)| points.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn metadata(&self, statistic_id: &str) -> Option<StatMetadata> {
        self.series.lock().unwrap().get(statistic_id).map(|(m, _)| m.clone())
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("statistics store unavailable");
        }
        Ok(())
    }
}

impl StatisticsStore for InMemoryStatisticsStore {
    async fn query(
        &self,
        statistic_id: &str,
        range: &DateTimeRange,
        _period: StatPeriod,
        fields: &[StatField],
    ) -> anyhow::Result<Vec<PersistedStatPoint>> {
        self.check_available()?;

        Ok(self
            .points(statistic_id)
            .into_iter()
            .filter(|p| *range.start() <= p.start && p.start <= *range.end())
            .map(|p| select_fields(p, fields))
            .collect())
    }

    async fn last_before(&self, statistic_id: &str, before: DateTime) -> anyhow::Result<Option<PersistedStatPoint>> {
        self.check_available()?;

        Ok(self
            .points(statistic_id)
            .into_iter()
            .rev()
            .find(|p| p.start < before && p.sum.is_some()))
    }

    async fn write_all(&self, writes: &[StatisticWrite]) -> anyhow::Result<()> {
        self.check_available()?;

        let failing = self.failing_statistic.lock().unwrap().clone();
        if let Some(write) = writes.iter().find(|w| failing.as_ref() == Some(&w.statistic_id)) {
            anyhow::bail!("write of statistic {} rejected", write.statistic_id);
        }

        let mut series = self.series.lock().unwrap();
        for write in writes {
            let entry = series
                .entry(write.statistic_id.clone())
                .or_insert_with(|| (write.metadata.clone(), BTreeMap::new()));
            entry.0 = write.metadata.clone();
            for point in &write.points {
                entry.1.insert(point.start, point.clone());
            }
            self.writes.lock().unwrap().push(write.statistic_id.clone());
        }

        Ok(())
    }

    async fn clear_namespace(&self, prefix: &str) -> anyhow::Result<u64> {
        self.check_available()?;

        let mut series = self.series.lock().unwrap();
        let before = series.len();
        series.retain(|id, _| !id.starts_with(prefix));

        Ok((before - series.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(iso: &str, mean: f64, sum: f64) -> PersistedStatPoint {
        PersistedStatPoint {
            start: DateTime::from_iso(iso).unwrap(),
            mean: Some(mean),
            sum: Some(sum),
        }
    }

    #[tokio::test]
    async fn query_filters_range_and_fields() {
        let store = InMemoryStatisticsStore::with_points(
            "ns:energy",
            vec![
                point("2024-11-03T08:00:00Z", 10.0, 10.0),
                point("2024-11-03T09:00:00Z", 20.0, 30.0),
                point("2024-11-03T10:00:00Z", 30.0, 60.0),
            ],
        );
        let range = DateTimeRange::new(
            DateTime::from_iso("2024-11-03T09:00:00Z").unwrap(),
            DateTime::from_iso("2024-11-03T10:00:00Z").unwrap(),
        );

        let points = store
            .query("ns:energy", &range, StatPeriod::Hour, &[StatField::Sum])
            .await
            .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].mean, None);
        assert_eq!(points[0].sum, Some(30.0));
    }

    #[tokio::test]
    async fn clear_namespace_only_touches_prefix() {
        let store = InMemoryStatisticsStore::with_points("ns:energy_a", vec![]);
        let meta = StatMetadata {
            name: "other".to_owned(),
            unit: "Wh".to_owned(),
            has_mean: true,
            has_sum: true,
        };
        store
            .write_all(&[StatisticWrite {
                statistic_id: "other:energy".to_owned(),
                metadata: meta,
                points: vec![],
            }])
            .await
            .unwrap();

        let removed = store.clear_namespace("ns:").await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.metadata("other:energy").is_some());
        assert!(store.metadata("ns:energy_a").is_none());
    }

    #[tokio::test]
    async fn last_before_skips_points_without_sum() {
        let store = InMemoryStatisticsStore::with_points(
            "ns:energy",
            vec![
                point("2024-11-01T10:00:00Z", 10.0, 500.0),
                PersistedStatPoint {
                    start: DateTime::from_iso("2024-11-01T11:00:00Z").unwrap(),
                    mean: Some(5.0),
                    sum: None,
                },
                point("2024-11-03T00:00:00Z", 20.0, 520.0),
            ],
        );

        let last = store
            .last_before("ns:energy", DateTime::from_iso("2024-11-03T00:00:00Z").unwrap())
            .await
            .unwrap();

        assert_eq!(last.map(|p| p.sum), Some(Some(500.0)));
    }

    #[tokio::test]
    async fn rejected_batch_leaves_every_statistic_untouched() {
        let store = InMemoryStatisticsStore::default();
        store.fail_writes_of("ns:b");
        let write = |id: &str| StatisticWrite {
            statistic_id: id.to_owned(),
            metadata: StatMetadata {
                name: id.to_owned(),
                unit: "Wh".to_owned(),
                has_mean: true,
                has_sum: true,
            },
            points: vec![point("2024-11-03T00:00:00Z", 1.0, 1.0)],
        };

        let result = store.write_all(&[write("ns:a"), write("ns:b")]).await;

        assert!(result.is_err());
        assert!(store.points("ns:a").is_empty());
        assert!(store.written_ids().is_empty());
    }
}
