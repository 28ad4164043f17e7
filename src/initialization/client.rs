//! HTTP client initialization.

use std::time::Duration;

use reqwest::ClientBuilder;

use crate::config::{Config, TCP_CONNECT_TIMEOUT_SECS};
use crate::error_handling::InitializationError;

/// Maximum redirect hops followed for one fetch.
const MAX_REDIRECTS: usize = 10;

/// Initializes the HTTP client used by the fetcher.
///
/// No overall request timeout is set here: the fetcher sets one per request from
/// the adaptive per-domain timeout. Only the TCP connect phase is bounded globally.
pub fn init_client(config: &Config) -> Result<reqwest::Client, InitializationError> {
    let client = ClientBuilder::new()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()?;
    Ok(client)
}
