use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by authentication and credential management routines.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("no profile configured; run `meta-ads setup` first")]
    NoProfileConfigured,
    #[error("profile '{0}' not found; run `meta-ads setup` first")]
    ProfileNotFound(String),
    #[error("port {0} is already in use; close the application using it and try again")]
    PortInUse(u16),
    #[error("authorization request denied ({0})")]
    AccessDenied(String),
    #[error("authorization response missing code parameter")]
    MissingAuthorizationCode,
    #[error("authorization flow timed out after {0} seconds; try `meta-ads auth` again")]
    TimedOut(u64),
    #[error("token endpoint error {status}: {body}")]
    TokenEndpoint { status: StatusCode, body: String },
    #[error("authorization listener terminated before receiving redirect")]
    ListenerClosed,
    #[error("invalid authorization response: {0}")]
    InvalidAuthorizationResponse(String),
}
