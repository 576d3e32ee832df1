use diag_api::v1::report::Report;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Failed to acquire media: {0}")]
    Device(#[from] DeviceError),

    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    #[error("Timed out after {timeout_ms} ms")]
    TestTimeout { timeout_ms: u64 },

    #[error("Failed collecting stats: {0}")]
    StatsCollection(String),

    #[error("{message}")]
    Check {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Stopped before completion")]
    Stopped,

    #[error("{failed} test(s) failed")]
    SuiteFailure { failed: usize, report: Report },
}

impl Error {
    /// Application-level rejection from a probe.
    pub fn check(message: impl Into<String>) -> Self {
        Self::Check {
            message: message.into(),
            details: None,
        }
    }

    pub fn check_with_details(message: impl Into<String>, details: impl serde::Serialize) -> Self {
        Self::Check {
            message: message.into(),
            details: serde_json::to_value(details).ok(),
        }
    }

    /// Structured data recorded in the report entry of a failed probe.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Check { details, .. } => details.clone(),
            Self::SuiteFailure { report, .. } => serde_json::to_value(report).ok(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TestTimeout { .. })
    }

    /// The partial report, when this is a suite failure.
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::SuiteFailure { report, .. } => Some(report),
            _ => None,
        }
    }
}
