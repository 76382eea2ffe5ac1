/// Why a request produced no response.
///
/// An HTTP error status is still a response, so it is not a [NetworkError]. Checks decide
/// whether the status is acceptable.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout(err)
        } else if err.is_connect() {
            NetworkError::Connect(err)
        } else if err.is_body() || err.is_decode() {
            NetworkError::Body(err)
        } else {
            NetworkError::Request(err)
        }
    }
}
