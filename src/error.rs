use thiserror::Error;

/// Failure of a single JSON document fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The body was not the JSON document we expected.
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Every attempt failed; carries the last failure.
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

/// Session initialization failure. Fatal for the session; shown on the error screen.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("inventory unavailable: {0}")]
    Inventory(#[source] FetchError),

    #[error("settings unavailable: {0}")]
    Settings(#[source] FetchError),

    #[error("invalid source locator {locator:?}: {reason}")]
    Locator { locator: String, reason: String },
}
