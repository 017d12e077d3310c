use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Invalid coordinates ({latitude}, {longitude}): latitude must be -90 to 90, longitude -180 to 180")]
pub struct InvalidCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Failures surfaced by a weather provider adapter.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No place matches '{0}'")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    #[error(transparent)]
    InvalidCoordinates(#[from] InvalidCoordinates),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

/// Failures from the device location capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),
}

/// Storage-level failure. Kept inside the cache adapter and only logged.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a run could not produce fresh data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    PermissionDenied,
    NotFound,
    Network,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::PermissionDenied => "permission_denied",
            FailureReason::NotFound => "not_found",
            FailureReason::Network => "network",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ProviderError> for FailureReason {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::NotFound(_) => FailureReason::NotFound,
            _ => FailureReason::Network,
        }
    }
}

impl From<&LocationError> for FailureReason {
    fn from(err: &LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => FailureReason::PermissionDenied,
            LocationError::Unavailable(_) => FailureReason::Network,
        }
    }
}

/// No fresh data and nothing cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No weather data available ({reason})")]
pub struct NoDataAvailable {
    pub reason: FailureReason,
}
