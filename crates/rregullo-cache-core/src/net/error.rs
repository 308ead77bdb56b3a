use thiserror::Error;

/// The network could not produce a response.
///
/// An HTTP error status is not a `FetchError`: the server answered, and the
/// response is handed back as-is.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_connect() {
            FetchError::Unreachable(err.to_string())
        } else {
            FetchError::Network(err)
        }
    }
}
