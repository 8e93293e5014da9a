use std::fmt::Display;

use super::{DateTime, Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeRange {
    start: DateTime,
    end: DateTime,
}

impl Display for DateTimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.start, self.end)
    }
}

impl DateTimeRange {
    pub fn new(start: DateTime, end: DateTime) -> Self {
        Self { start, end }
    }

    /// Window of the given length ending at `end`.
    pub fn ending_at(end: DateTime, length: Duration) -> Self {
        Self::new(end - length, end)
    }

    pub fn start(&self) -> &DateTime {
        &self.start
    }

    pub fn end(&self) -> &DateTime {
        &self.end
    }

    pub fn extend_start(&self, by: Duration) -> Self {
        Self::new(self.start - by, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ending_at_and_extend() {
        let end = DateTime::from_iso("2024-11-03T12:00:00Z").unwrap();
        let range = DateTimeRange::ending_at(end, Duration::hours(12)).extend_start(Duration::hours(24));

        assert_eq!(*range.start(), DateTime::from_iso("2024-11-02T00:00:00Z").unwrap());
        assert_eq!(*range.end(), end);
        assert_eq!(range.to_string(), "2024-11-02T00:00:00Z/2024-11-03T12:00:00Z");
    }
}
