//! Error categorization.

use std::time::Duration;

use super::types::FetchError;

impl FetchError {
    /// Categorizes a `reqwest::Error`, keeping the timeout that was in effect.
    ///
    /// Status codes are checked first, then the transport error kind.
    pub fn from_reqwest(error: &reqwest::Error, timeout: Duration) -> Self {
        if let Some(status) = error.status() {
            FetchError::Status(status.as_u16())
        } else if error.is_timeout() {
            FetchError::Timeout(timeout)
        } else if error.is_connect() {
            FetchError::Connect(error.to_string())
        } else if error.is_body() || error.is_decode() {
            FetchError::Body(error.to_string())
        } else if error.is_builder() {
            FetchError::InvalidUrl(error.to_string())
        } else {
            FetchError::Request(error.to_string())
        }
    }
}
