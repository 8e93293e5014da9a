mod client;
mod config;
mod error;
pub mod schema;
mod session;

pub use client::{IntuisClient, MeasureTarget};
pub use config::IntuisConfig;
pub use error::IntuisError;

#[cfg(test)]
pub use client::tests::mock_client;
