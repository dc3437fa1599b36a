//! Request and response bodies.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::error::{Result, TinyUrlError};

/// A backslash followed by something JSON does not accept as an escape.
static INVALID_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\\([^"\\/bfnrtu])"#).expect("escape pattern compiles"));

/// Body of `POST /tinyurl`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShortenRequest {
    #[serde(default)]
    pub long_url: String,
    #[serde(default)]
    pub short_code: Option<String>,
}

impl ShortenRequest {
    /// Parse a raw body, dropping the backslash of invalid escape sequences
    /// (`\q` becomes `q`) so hand-written JSON with stray escapes is accepted.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let cleaned = sanitize_escapes(body);
        serde_json::from_slice(&cleaned).map_err(|e| {
            TinyUrlError::InvalidInput(format!("Error while parsing request body: {}", e))
        })
    }
}

fn sanitize_escapes(body: &[u8]) -> Cow<'_, [u8]> {
    INVALID_ESCAPE.replace_all(body, &b"$1"[..])
}

/// Response of `POST /tinyurl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub short_url: String,
    pub long_url: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
    pub elapsed_time: String,
}

/// Response of `GET /v1/url/{code}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub long_url: String,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Response of `GET /healthz`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}
