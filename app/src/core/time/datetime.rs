use std::{
    fmt::Display,
    ops::{Add, Sub},
};

use chrono::{DurationRound, TimeZone};
use tokio::task_local;

use super::Duration;

task_local! {
    pub static FIXED_NOW: DateTime;
}

/// Point in time, always normalised to UTC. Upstream timestamps are unix seconds and the
/// statistics store is keyed by hour starts, so no local time zone is involved anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DateTime {
    delegate: chrono::DateTime<chrono::Utc>,
}

impl DateTime {
    fn new<T: chrono::TimeZone>(delegate: chrono::DateTime<T>) -> Self {
        Self {
            delegate: delegate.with_timezone(&chrono::Utc),
        }
    }

    pub fn now() -> Self {
        FIXED_NOW
            .try_with(|t| *t)
            .unwrap_or_else(|_| chrono::Utc::now().into())
    }

    #[cfg(test)]
    pub fn from_iso(iso8601: &str) -> anyhow::Result<Self> {
        Ok(chrono::DateTime::parse_from_rfc3339(iso8601)?.into())
    }

    pub fn from_timestamp(secs: i64) -> anyhow::Result<Self> {
        chrono::Utc
            .timestamp_opt(secs, 0)
            .single()
            .map(Self::new)
            .ok_or_else(|| anyhow::anyhow!("Timestamp {} out of range", secs))
    }

    pub fn timestamp(&self) -> i64 {
        self.delegate.timestamp()
    }

    pub fn start_of_hour(&self) -> Self {
        //truncation to a full hour can only fail for dates near the representable limits
        self.delegate
            .duration_trunc(chrono::Duration::hours(1))
            .map(Self::new)
            .unwrap_or(*self)
    }

    pub fn elapsed_since(&self, since: Self) -> Duration {
        Duration::new(self.delegate - since.delegate)
    }

    pub fn elapsed(&self) -> Duration {
        Self::now().elapsed_since(*self)
    }

    pub fn into_db(&self) -> chrono::DateTime<chrono::Utc> {
        self.delegate
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.delegate.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

impl Add<Duration> for DateTime {
    type Output = DateTime;

    fn add(self, rhs: Duration) -> Self::Output {
        Self::new(self.delegate + rhs.delegate)
    }
}

impl Sub<Duration> for DateTime {
    type Output = DateTime;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self::new(self.delegate - rhs.delegate)
    }
}

impl<T: chrono::TimeZone> From<chrono::DateTime<T>> for DateTime {
    fn from(val: chrono::DateTime<T>) -> Self {
        DateTime::new(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_timestamp() {
        let dt = DateTime::from_timestamp(1_700_000_000).unwrap();

        assert_eq!(dt, DateTime::from_iso("2023-11-14T22:13:20Z").unwrap());
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_start_of_hour() {
        let dt = DateTime::from_iso("2024-11-03T15:23:46+01:00").unwrap();

        assert_eq!(dt.start_of_hour(), DateTime::from_iso("2024-11-03T14:00:00Z").unwrap());
    }

    #[tokio::test]
    async fn test_fixed_now() {
        let fixed = DateTime::from_iso("2024-11-03T15:00:00Z").unwrap();

        let now = FIXED_NOW.scope(fixed, async { DateTime::now() }).await;

        assert_eq!(now, fixed);
    }
}
