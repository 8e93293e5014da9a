mod bus;
mod db;
mod http;
mod monitoring;

pub use bus::{EventBus, EventListener};
pub use db::DatabaseConfig;
pub use http::client::HttpClientConfig;
pub use monitoring::MonitoringConfig;

pub mod meter {
    pub use super::monitoring::meter::{increment, set};
}
