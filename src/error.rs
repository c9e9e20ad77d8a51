use thiserror::Error;

/// Failures reported by snapshot sources and cue providers.
///
/// None of these are fatal to a running session: the session logs them and
/// keeps animating from whatever state it already has.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Not authorized: token missing, expired or invalid")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Remote server error (status {0})")]
    Server(u16),
    #[error("Request failed (status {0})")]
    Request(u16),
    #[error("Invalid track id: {0:?}")]
    InvalidTrackId(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Map a non-success HTTP status to an error. Returns `None` for statuses
    /// that carry a usable response (2xx, including 204).
    pub fn from_status(status: u16, retry_after: Option<&str>) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(SourceError::Unauthorized),
            404 => Some(SourceError::NotFound("Resource".to_string())),
            429 => {
                let retry_after_secs = retry_after
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .unwrap_or(60);
                Some(SourceError::RateLimited { retry_after_secs })
            }
            500.. => Some(SourceError::Server(status)),
            _ => Some(SourceError::Request(status)),
        }
    }
}
