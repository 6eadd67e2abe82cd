//! Endpoint error type.
//!
//! A timeout is not just another failure: the adaptive probe backs off and
//! retries on timeouts but aborts on everything else, so `Timeout` must be a
//! distinguishable kind rather than a string inside a generic error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    /// The source did not answer within the deadline (client-side timeout or
    /// an upstream 504).
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure: DNS, refused connection, broken transfer.
    #[error("transport error: {0}")]
    Transport(String),
    /// The source answered with a non-success HTTP status.
    #[error("endpoint returned HTTP status {0}")]
    Status(u16),
    /// The response body was not a well-formed results document.
    #[error("malformed results document: {0}")]
    Decode(String),
}

impl EndpointError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EndpointError::Timeout)
    }
}

impl From<reqwest::Error> for EndpointError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EndpointError::Timeout
        } else {
            EndpointError::Transport(e.to_string())
        }
    }
}
