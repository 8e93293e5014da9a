use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Duration {
    #[serde(with = "iso_format")]
    pub(super) delegate: chrono::Duration,
}

impl Duration {
    pub(super) fn new(delegate: chrono::Duration) -> Self {
        Self { delegate }
    }

    pub fn hours(hours: i64) -> Self {
        Self::new(chrono::Duration::hours(hours))
    }

    pub fn minutes(minutes: i64) -> Self {
        Self::new(chrono::Duration::minutes(minutes))
    }

    pub fn seconds(seconds: i64) -> Self {
        Self::new(chrono::Duration::seconds(seconds))
    }

    pub fn to_iso_string(&self) -> String {
        to_iso(&self.delegate).to_string()
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso_string())
    }
}

impl std::ops::Add<Duration> for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        Self::new(self.delegate + rhs.delegate)
    }
}

//negative durations collapse to zero, tokio timers cannot go backwards
impl From<Duration> for std::time::Duration {
    fn from(val: Duration) -> Self {
        val.delegate.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

mod iso_format {
    use iso8601_duration::Duration as IsoDuration;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(duration: &chrono::Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_iso(duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<chrono::Duration, D::Error> {
        let value = String::deserialize(deserializer)?;

        let iso = IsoDuration::parse(&value)
            .map_err(|e| D::Error::custom(format!("Invalid ISO-8601 duration {}: {:?}", value, e)))?;

        iso.to_chrono()
            .ok_or_else(|| D::Error::custom(format!("Duration {} must not contain years or months", value)))
    }
}

fn to_iso(duration: &chrono::Duration) -> iso8601_duration::Duration {
    let total = duration.num_seconds();
    let days = total / 86400;
    let rest = total % 86400;

    iso8601_duration::Duration::new(
        0.0,
        0.0,
        days as f32,
        (rest / 3600) as f32,
        ((rest % 3600) / 60) as f32,
        (rest % 60) as f32,
    )
}
