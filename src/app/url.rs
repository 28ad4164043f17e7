//! URL validation and normalization utilities.

use log::warn;

use crate::config::MAX_URL_LENGTH;
use crate::error_handling::FetchError;

/// Validates and normalizes a URL.
///
/// Adds an `https://` prefix if missing, then checks that the URL parses, has a
/// host, and uses the http/https scheme. Over-long URLs are rejected.
///
/// Rejected URLs are not fetched. The caller still records a result for them
/// carrying the returned `FetchError::InvalidUrl`.
pub fn validate_and_normalize_url(url: &str) -> Result<String, FetchError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FetchError::InvalidUrl("empty URL".to_string()));
    }

    let normalized = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };

    if normalized.len() > MAX_URL_LENGTH {
        warn!(
            "Skipping URL exceeding maximum length ({} > {})",
            normalized.len(),
            MAX_URL_LENGTH
        );
        return Err(FetchError::InvalidUrl(format!(
            "URL exceeds maximum length of {MAX_URL_LENGTH}"
        )));
    }

    match url::Url::parse(&normalized) {
        Ok(parsed) => match parsed.scheme() {
            "http" | "https" if parsed.host_str().is_some_and(|h| !h.is_empty()) => {
                Ok(normalized)
            }
            "http" | "https" => {
                warn!("Skipping URL without host: {url}");
                Err(FetchError::InvalidUrl(format!("missing host: {url}")))
            }
            scheme => {
                warn!("Skipping unsupported scheme for URL: {url}");
                Err(FetchError::InvalidUrl(format!("unsupported scheme '{scheme}'")))
            }
        },
        Err(e) => {
            warn!("Skipping invalid URL: {url}");
            Err(FetchError::InvalidUrl(format!("{url}: {e}")))
        }
    }
}

/// Host used as the key for per-domain statistics.
pub fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default()
}
