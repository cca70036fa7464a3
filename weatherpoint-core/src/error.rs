use thiserror::Error;

/// Fatal problems detected while building a provider or cache.
///
/// These never surface from a read; they stop construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Latitude must be in range [-90, 90], got {0}")]
    InvalidLatitude(f64),

    #[error("Longitude must be in range [-180, 180], got {0}")]
    InvalidLongitude(f64),

    #[error(
        "No API key configured for provider '{0}'.\n\
         Hint: set WEATHER_API_TOKEN or run `weatherpoint configure {0}`."
    )]
    MissingCredential(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A single failed fetch attempt. Recoverable: the cache keeps its last good data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("upstream responded with status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("upstream reported an error: {0}")]
    UpstreamError(String),

    #[error("malformed upstream response: {0}")]
    Malformed(#[from] serde_json::Error),
}
