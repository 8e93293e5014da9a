use config::{Config, ConfigError, Environment, File};
use infrastructure::{DatabaseConfig, MonitoringConfig};
use serde::Deserialize;

use crate::core::time::Duration;
use crate::energy::EnergyConfig;
use crate::intuis::IntuisConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub monitoring: MonitoringConfig,
    pub database: DatabaseConfig,
    pub intuis: IntuisConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub energy: EnergyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub status_interval: Duration,
    pub status_cache_ttl: Duration,
    pub energy_interval: Duration,
    pub energy_cache_ttl: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::seconds(30),
            status_cache_ttl: Duration::seconds(20),
            energy_interval: Duration::hours(1),
            energy_cache_ttl: Duration::minutes(5),
        }
    }
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::default().separator("_").list_separator(","));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const MINIMAL: &str = r#"
        [monitoring]
        service_name = "intuis-sync"
        app_name = "intuis-sync"
        logs = { default_level = "info" }
        traces = { default_level = "info" }

        [database]
        url = "postgres://localhost/stats"

        [intuis]
        username = "jane@example.com"
        password = "secret"
        client_id = "id"
        client_secret = "client-secret"
    "#;

    fn parse(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let settings = parse(MINIMAL);

        assert_eq!(settings.polling.status_cache_ttl, Duration::seconds(20));
        assert_eq!(settings.polling.energy_interval, Duration::hours(1));
        assert_eq!(settings.energy.lookback, Duration::hours(12));
        assert_eq!(settings.energy.drift_tolerance_wh, 1.0);
        assert_eq!(settings.energy.statistic_prefix, "muller_intuis");
        assert_eq!(settings.intuis.session_ttl, Duration::hours(1));
        assert_eq!(settings.intuis.scope, "read_muller write_muller");
    }

    #[test]
    fn durations_are_read_as_iso() {
        let settings = parse(&format!(
            "{}\n[polling]\nstatus_interval = \"PT1M\"\nstatus_cache_ttl = \"PT45S\"\n",
            MINIMAL
        ));

        assert_eq!(settings.polling.status_interval, Duration::minutes(1));
        assert_eq!(settings.polling.status_cache_ttl, Duration::seconds(45));
        assert_eq!(settings.polling.energy_cache_ttl, Duration::seconds(300));
    }
}
