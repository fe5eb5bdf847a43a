//! Credential value type
//!
//! A credential is the full set of headers captured from an authorized call.
//! Its identity for invalidation purposes is the `authorization` header value,
//! never the object itself: every in-flight attempt owns its own clone.

use chrono::{DateTime, Duration, Utc};
use reqwest::RequestBuilder;

/// Headers that describe a single captured request rather than the session
const REQUEST_SPECIFIC_HEADERS: [&str; 3] = ["content-length", "host", "connection"];

/// A short-lived set of authorization headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    headers: Vec<(String, String)>,
    created_at: DateTime<Utc>,
    failure_count: u32,
}

impl Credential {
    /// Creates a credential from captured headers, dropping request-specific ones
    ///
    /// Header order is preserved. When a name repeats, the first value wins.
    pub fn new<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut kept: Vec<(String, String)> = Vec::new();
        for (name, value) in headers {
            let name = name.into();
            let lower = name.to_ascii_lowercase();
            if REQUEST_SPECIFIC_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            if kept.iter().any(|(k, _)| k.eq_ignore_ascii_case(&name)) {
                continue;
            }
            kept.push((name, value.into()));
        }

        Self {
            headers: kept,
            created_at: Utc::now(),
            failure_count: 0,
        }
    }

    /// Returns the headers in capture order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Looks up a header case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The value that identifies this credential in the pool
    pub fn authorization(&self) -> &str {
        self.header("authorization").unwrap_or("")
    }

    /// Returns the first of `required` that this credential does not carry
    pub fn missing_header<'a>(&self, required: &'a [String]) -> Option<&'a str> {
        required
            .iter()
            .find(|name| self.header(name).map_or(true, |v| v.is_empty()))
            .map(String::as_str)
    }

    /// How long ago this credential was harvested
    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub(crate) fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    pub(crate) fn reset_failures(&mut self) {
        self.failure_count = 0;
    }

    /// Attaches every header to an outgoing request
    pub fn apply(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    /// Short, log-safe prefix of the authorization value
    pub fn preview(&self) -> String {
        self.authorization().chars().take(16).collect()
    }
}
