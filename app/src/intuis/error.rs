use derive_more::{Display, Error};

/// Failures at the upstream boundary. `Clone` so that one failed fetch can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum IntuisError {
    #[display("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[display("Loading home configuration failed: {reason}")]
    ConfigFetchFailed { reason: String },

    #[display("Upstream unavailable at {endpoint}: {reason}")]
    UpstreamUnavailable { endpoint: String, reason: String },

    #[display("Upstream error at {endpoint}: {reason}")]
    UpstreamError { endpoint: String, reason: String },

    #[display("No data available from {endpoint}")]
    NoDataAvailable { endpoint: String },
}

impl IntuisError {
    pub fn authentication(reason: impl ToString) -> Self {
        Self::AuthenticationFailed {
            reason: reason.to_string(),
        }
    }

    pub fn config(reason: impl ToString) -> Self {
        Self::ConfigFetchFailed {
            reason: reason.to_string(),
        }
    }

    pub fn unavailable(endpoint: &str, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            endpoint: endpoint.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub fn upstream(endpoint: &str, reason: impl ToString) -> Self {
        Self::UpstreamError {
            endpoint: endpoint.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub fn no_data(endpoint: &str) -> Self {
        Self::NoDataAvailable {
            endpoint: endpoint.to_owned(),
        }
    }

    /// Short label used as metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            IntuisError::AuthenticationFailed { .. } => "authentication_failed",
            IntuisError::ConfigFetchFailed { .. } => "config_fetch_failed",
            IntuisError::UpstreamUnavailable { .. } => "upstream_unavailable",
            IntuisError::UpstreamError { .. } => "upstream_error",
            IntuisError::NoDataAvailable { .. } => "no_data",
        }
    }
}
