use anyhow::Context as _;
use sqlx::{PgPool, Row};

use crate::core::time::{DateTime, DateTimeRange};

use super::{PersistedStatPoint, StatField, StatPeriod, StatisticWrite, StatisticsStore, select_fields};

#[derive(Clone)]
pub struct PgStatisticsStore {
    pool: PgPool,
}

impl PgStatisticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .context("Error applying statistics migrations")
    }
}

impl StatisticsStore for PgStatisticsStore {
    #[tracing::instrument(skip(self, fields))]
    async fn query(
        &self,
        statistic_id: &str,
        range: &DateTimeRange,
        //only hourly statistics are kept
        _period: StatPeriod,
        fields: &[StatField],
    ) -> anyhow::Result<Vec<PersistedStatPoint>> {
        let rows = sqlx::query(
            r#"SELECT s.start, s.mean, s.sum
                FROM statistics s
                JOIN statistics_meta m ON m.id = s.metadata_id
                WHERE m.statistic_id = $1
                AND s.start >= $2
                AND s.start <= $3
                ORDER BY s.start ASC"#,
        )
        .bind(statistic_id)
        .bind(range.start().into_db())
        .bind(range.end().into_db())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Error querying statistic {}", statistic_id))?;

        rows.into_iter()
            .map(|row| -> anyhow::Result<PersistedStatPoint> {
                let start: chrono::DateTime<chrono::Utc> = row.try_get("start")?;
                let point = PersistedStatPoint {
                    start: DateTime::from(start),
                    mean: row.try_get("mean")?,
                    sum: row.try_get("sum")?,
                };
                Ok(select_fields(point, fields))
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn last_before(&self, statistic_id: &str, before: DateTime) -> anyhow::Result<Option<PersistedStatPoint>> {
        let row = sqlx::query(
            r#"SELECT s.start, s.mean, s.sum
                FROM statistics s
                JOIN statistics_meta m ON m.id = s.metadata_id
                WHERE m.statistic_id = $1
                AND s.start < $2
                AND s.sum IS NOT NULL
                ORDER BY s.start DESC
                LIMIT 1"#,
        )
        .bind(statistic_id)
        .bind(before.into_db())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Error querying last point of statistic {} before {}", statistic_id, before))?;

        row.map(|row| -> anyhow::Result<PersistedStatPoint> {
            let start: chrono::DateTime<chrono::Utc> = row.try_get("start")?;
            Ok(PersistedStatPoint {
                start: DateTime::from(start),
                mean: row.try_get("mean")?,
                sum: row.try_get("sum")?,
            })
        })
        .transpose()
    }

    #[tracing::instrument(skip_all, fields(statistics = writes.len()))]
    async fn write_all(&self, writes: &[StatisticWrite]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for write in writes {
            let statistic_id = write.statistic_id.as_str();
            let metadata = &write.metadata;

            let metadata_id: i64 = sqlx::query_scalar(
                r#"INSERT INTO statistics_meta (statistic_id, name, unit, has_mean, has_sum)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (statistic_id) DO UPDATE
                    SET name = EXCLUDED.name, unit = EXCLUDED.unit, has_mean = EXCLUDED.has_mean, has_sum = EXCLUDED.has_sum
                    RETURNING id"#,
            )
            .bind(statistic_id)
            .bind(&metadata.name)
            .bind(&metadata.unit)
            .bind(metadata.has_mean)
            .bind(metadata.has_sum)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("Error upserting metadata of statistic {}", statistic_id))?;

            for point in &write.points {
                sqlx::query(
                    r#"INSERT INTO statistics (metadata_id, start, mean, sum)
                        VALUES ($1, $2, $3, $4)
                        ON CONFLICT (metadata_id, start) DO UPDATE
                        SET mean = EXCLUDED.mean, sum = EXCLUDED.sum"#,
                )
                .bind(metadata_id)
                .bind(point.start.into_db())
                .bind(point.mean)
                .bind(point.sum)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Error writing point {} of statistic {}", point.start, statistic_id))?;
            }
        }

        //dropping the transaction on any error above rolls back every statistic of the batch
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn clear_namespace(&self, prefix: &str) -> anyhow::Result<u64> {
        let pattern = format!("{}%", prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        let mut tx = self.pool.begin().await?;

        let points = sqlx::query(
            r#"DELETE FROM statistics
                WHERE metadata_id IN (SELECT id FROM statistics_meta WHERE statistic_id LIKE $1)"#,
        )
        .bind(&pattern)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let statistics = sqlx::query(r#"DELETE FROM statistics_meta WHERE statistic_id LIKE $1"#)
            .bind(&pattern)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::info!("Removed {} statistics with {} points under {}", statistics, points, prefix);
        Ok(statistics)
    }
}
