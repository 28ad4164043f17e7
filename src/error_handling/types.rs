//! Error type definitions.
//!
//! This module defines the error taxonomy of a detection run together with the
//! error, warning, and info categories counted by `ProcessingStats`.

use std::time::Duration;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// The headless browser could not be started.
    #[error("Browser launch error: {0}")]
    BrowserLaunchError(String),
}

/// Registry or run-setting inconsistencies. Fatal at start-up, before any URL is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Plugin '{0}' is registered without a matching pattern bundle")]
    MissingPattern(String),

    #[error("Plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    #[error("Pattern bundle '{0}' is already registered")]
    DuplicatePattern(String),

    #[error("No detector plugins registered")]
    EmptyRegistry,

    #[error("Invalid pattern for '{tag}': {message}")]
    InvalidPattern { tag: String, message: String },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

/// A fetch that failed permanently, after the retry policy gave up.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Response body error: {0}")]
    Body(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// Transient failures worth another attempt.
    ///
    /// Timeouts, connection and transport failures, 5xx, 408 and 429 are retried.
    /// Other 4xx answers and invalid URLs are permanent.
    pub fn is_retriable(&self) -> bool {
        match self {
            FetchError::Timeout(_)
            | FetchError::Connect(_)
            | FetchError::Body(_)
            | FetchError::Request(_) => true,
            FetchError::Status(code) => *code >= 500 || *code == 429 || *code == 408,
            FetchError::InvalidUrl(_) => false,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            FetchError::InvalidUrl(_) => ErrorType::InvalidUrl,
            FetchError::Timeout(_) => ErrorType::HttpRequestTimeoutError,
            FetchError::Connect(_) => ErrorType::HttpRequestConnectError,
            FetchError::Body(_) => ErrorType::HttpRequestBodyError,
            FetchError::Request(_) => ErrorType::HttpRequestRequestError,
            FetchError::Status(code) => match code {
                400 => ErrorType::HttpRequestBadRequest,
                401 => ErrorType::HttpRequestUnauthorized,
                403 => ErrorType::HttpRequestBotDetectionError,
                404 => ErrorType::HttpRequestNotFound,
                429 => ErrorType::HttpRequestTooManyRequests,
                500 => ErrorType::HttpRequestInternalServerError,
                502 => ErrorType::HttpRequestBadGateway,
                503 => ErrorType::HttpRequestServiceUnavailable,
                504 => ErrorType::HttpRequestGatewayTimeout,
                _ => ErrorType::HttpRequestStatusError,
            },
        }
    }
}

/// Malformed markup. Recovered locally: unparsable sections count as absent evidence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed markup: {0}")]
    Markup(String),

    #[error("Invalid script reference '{0}'")]
    ScriptReference(String),
}

/// Failure of the automated browser session. The dynamic pass for that URL is abandoned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrowserError {
    #[error("Browser unavailable: {0}")]
    Unavailable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("Page evaluation failed: {0}")]
    Evaluation(String),

    #[error("Browser session crashed: {0}")]
    Crashed(String),
}

/// A single plugin faulted. Isolated to that tag on that URL.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    #[error("Plugin '{plugin}' failed: {message}")]
    Failed { plugin: String, message: String },

    #[error("Plugin '{plugin}' panicked: {message}")]
    Panicked { plugin: String, message: String },
}

/// Types of errors that can occur during URL processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    // HTTP/Network errors
    HttpRequestTimeoutError,
    HttpRequestConnectError,
    HttpRequestRequestError,
    HttpRequestBodyError,
    HttpRequestStatusError,
    HttpRequestTooManyRequests,
    HttpRequestBotDetectionError, // 403 Forbidden - typically bot detection
    HttpRequestBadRequest,          // 400 Bad Request
    HttpRequestUnauthorized,        // 401 Unauthorized
    HttpRequestNotFound,            // 404 Not Found
    HttpRequestInternalServerError, // 500 Internal Server Error
    HttpRequestBadGateway,          // 502 Bad Gateway
    HttpRequestServiceUnavailable,  // 503 Service Unavailable
    HttpRequestGatewayTimeout,      // 504 Gateway Timeout
    InvalidUrl,
    // Pipeline errors
    ProcessUrlTimeout,
    BrowserSessionError,
    TaskAborted,
}

/// Types of warnings that can occur during URL processing.
///
/// Warnings never prevent a verdict but lower confidence in it or explain it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum WarningType {
    PluginFault,
    MarkupParseError,
    DynamicDegraded,
    DynamicOnlyDetection,
    PossiblyInactive,
    ConsentManager,
    LazyLoading,
    SpaFramework,
}

/// Types of informational metrics that can occur during URL processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum InfoType {
    FetchRetried,
    ProgressiveExtension,
    ProgressiveDetection,
    SimulatedInteraction,
    CorroboratedDetection,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::HttpRequestTimeoutError => "HTTP request timeout error",
            ErrorType::HttpRequestConnectError => "HTTP request connect error",
            ErrorType::HttpRequestRequestError => "HTTP request error",
            ErrorType::HttpRequestBodyError => "HTTP request body error",
            ErrorType::HttpRequestStatusError => "HTTP request status error",
            ErrorType::HttpRequestTooManyRequests => "Too many requests",
            ErrorType::HttpRequestBotDetectionError => "Bot detection (403 Forbidden)",
            ErrorType::HttpRequestBadRequest => "Bad Request (400)",
            ErrorType::HttpRequestUnauthorized => "Unauthorized (401)",
            ErrorType::HttpRequestNotFound => "Not Found (404)",
            ErrorType::HttpRequestInternalServerError => "Internal Server Error (500)",
            ErrorType::HttpRequestBadGateway => "Bad Gateway (502)",
            ErrorType::HttpRequestServiceUnavailable => "Service Unavailable (503)",
            ErrorType::HttpRequestGatewayTimeout => "Gateway Timeout (504)",
            ErrorType::InvalidUrl => "Invalid URL",
            ErrorType::ProcessUrlTimeout => "Process URL timeout",
            ErrorType::BrowserSessionError => "Browser session error",
            ErrorType::TaskAborted => "Worker task aborted",
        }
    }
}

impl WarningType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningType::PluginFault => "Plugin fault",
            WarningType::MarkupParseError => "Malformed markup",
            WarningType::DynamicDegraded => "Dynamic pass failed (static-only verdicts)",
            WarningType::DynamicOnlyDetection => "Dynamic-only detection",
            WarningType::PossiblyInactive => "Noscript-only (possibly inactive)",
            WarningType::ConsentManager => "Consent manager present",
            WarningType::LazyLoading => "Lazy loading present",
            WarningType::SpaFramework => "Single-page application",
        }
    }
}

impl InfoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::FetchRetried => "Fetch retried",
            InfoType::ProgressiveExtension => "Observation extended",
            InfoType::ProgressiveDetection => "Progressive detection",
            InfoType::SimulatedInteraction => "Simulated interaction",
            InfoType::CorroboratedDetection => "Static and dynamic agree",
        }
    }
}
