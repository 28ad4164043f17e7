//! HTTP capability consumed by the fetcher.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::MAX_RESPONSE_BODY_SIZE;
use crate::error_handling::FetchError;

/// Raw answer of one GET.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
    /// URL after redirects.
    pub final_url: String,
}

/// `get(url, timeout) -> (status, body, elapsed) | error`.
///
/// Non-2xx answers are returned as responses; the fetcher decides what they mean.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError>;
}

/// [`HttpGet`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpGet for ReqwestHttp {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let start = Instant::now();
        let mut response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, timeout))?
        {
            let room = MAX_RESPONSE_BODY_SIZE.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_RESPONSE_BODY_SIZE {
                log::debug!("Response body of {} truncated at {} bytes", url, MAX_RESPONSE_BODY_SIZE);
                break;
            }
        }

        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
            elapsed: start.elapsed(),
            final_url,
        })
    }
}
