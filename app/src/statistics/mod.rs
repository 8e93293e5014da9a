#![allow(async_fn_in_trait)]

mod db;
#[cfg(test)]
mod memory;

use crate::core::time::{DateTime, DateTimeRange};

pub use db::PgStatisticsStore;
#[cfg(test)]
pub use memory::InMemoryStatisticsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatPeriod {
    Hour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    Mean,
    Sum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedStatPoint {
    pub start: DateTime,
    pub mean: Option<f64>,
    pub sum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatMetadata {
    pub name: String,
    pub unit: String,
    pub has_mean: bool,
    pub has_sum: bool,
}

/// Full replacement content for one statistic within a batch write.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticWrite {
    pub statistic_id: String,
    pub metadata: StatMetadata,
    pub points: Vec<PersistedStatPoint>,
}

/// External time-series store holding long-term statistics.
pub trait StatisticsStore {
    /// Points of `statistic_id` whose start lies within `range`, ascending by start. Fields not
    /// requested come back as `None`.
    async fn query(
        &self,
        statistic_id: &str,
        range: &DateTimeRange,
        period: StatPeriod,
        fields: &[StatField],
    ) -> anyhow::Result<Vec<PersistedStatPoint>>;

    /// Most recent point of `statistic_id` carrying a `sum` and starting strictly before `before`.
    async fn last_before(&self, statistic_id: &str, before: DateTime) -> anyhow::Result<Option<PersistedStatPoint>>;

    /// Upserts metadata and points of every statistic in `writes`. Either the whole batch is
    /// written or nothing.
    async fn write_all(&self, writes: &[StatisticWrite]) -> anyhow::Result<()>;

    /// Deletes points and metadata of every statistic whose id starts with `prefix`. Returns the
    /// number of statistics removed.
    async fn clear_namespace(&self, prefix: &str) -> anyhow::Result<u64>;
}

/// Projects a stored point onto the requested fields.
fn select_fields(point: PersistedStatPoint, fields: &[StatField]) -> PersistedStatPoint {
    PersistedStatPoint {
        start: point.start,
        mean: point.mean.filter(|_| fields.contains(&StatField::Mean)),
        sum: point.sum.filter(|_| fields.contains(&StatField::Sum)),
    }
}
