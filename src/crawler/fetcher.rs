//! Upstream request dispatcher
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with timeouts and user agent
//! - Attaching the attempt's credential to each request
//! - Backing off before retried attempts
//! - Classifying every response into the attempt error taxonomy

use crate::config::{ApiConfig, IDENTITY_PLACEHOLDER};
use crate::credentials::Credential;
use crate::crawler::parser::{parse_followers, FollowersPage};
use crate::state::{AttemptState, FrontierEntry, Identity};
use crate::{AttemptError, CrawlError};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Longest wait between two attempts at the same entry
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Bytes escaped when an identity is placed in a URL path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Result of a single upstream call
pub type FetchResult = Result<String, AttemptError>;

/// Computes the wait before the attempt numbered `retry_count` (0 = first)
///
/// The first attempt never waits; attempt *n* waits `base * 2^(n-1)`.
pub fn retry_delay(base: Duration, retry_count: u32) -> Duration {
    if retry_count == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(retry_count - 1);
    base.checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

/// Maps a non-success status code to its attempt error
///
/// | Status | Error |
/// |--------|-------|
/// | 401 | AuthExpired |
/// | 403 | Forbidden |
/// | 429 | RateLimited |
/// | anything else | Transient |
pub fn classify_status(status: StatusCode) -> AttemptError {
    match status {
        StatusCode::UNAUTHORIZED => AttemptError::AuthExpired,
        StatusCode::FORBIDDEN => AttemptError::Forbidden,
        StatusCode::TOO_MANY_REQUESTS => AttemptError::RateLimited,
        other => AttemptError::Transient(format!("HTTP {}", other.as_u16())),
    }
}

fn classify_transport(error: &reqwest::Error) -> AttemptError {
    if error.is_timeout() {
        AttemptError::Transient("request timeout".to_string())
    } else if error.is_connect() {
        AttemptError::Transient(format!("connection failed: {}", error))
    } else {
        AttemptError::Transient(error.to_string())
    }
}

/// HTTP client bound to the followers endpoint
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    followers_url: String,
    namespace: String,
}

impl ApiClient {
    /// Builds the client described by the API configuration
    ///
    /// # Returns
    ///
    /// * `Ok(ApiClient)` - Successfully built HTTP client
    /// * `Err(reqwest::Error)` - Failed to build client
    pub fn new(config: &ApiConfig) -> Result<Self, reqwest::Error> {
        let user_agent = config.user_agent.clone().unwrap_or_else(|| {
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        });

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            followers_url: config.followers_url.clone(),
            namespace: config.uri_namespace.clone(),
        })
    }

    /// Uri prefix that marks a profile as a graph node
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds the followers URL for an identity
    pub fn followers_url(&self, identity: &Identity) -> String {
        let encoded = utf8_percent_encode(identity.as_str(), SEGMENT).to_string();
        self.followers_url.replace(IDENTITY_PLACEHOLDER, &encoded)
    }

    /// Requests the followers of `identity` using `credential`
    ///
    /// Returns the response body on 2xx; every other outcome is classified.
    pub async fn fetch_followers(&self, identity: &Identity, credential: &Credential) -> FetchResult {
        let url = self.followers_url(identity);
        tracing::trace!("GET {} with credential {}", url, credential.preview());

        let request = credential.apply(self.client.get(&url));
        let response = request.send().await.map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        response.text().await.map_err(|e| classify_transport(&e))
    }
}

/// One attempt at resolving a frontier entry with a specific credential
///
/// The attempt owns its credential clone, so the credential to blame for a
/// failure is always the one this request carried.
#[derive(Debug)]
pub struct Attempt {
    pub entry: FrontierEntry,
    pub credential: Credential,
    state: AttemptState,
}

impl Attempt {
    pub fn new(entry: FrontierEntry, credential: Credential) -> Self {
        Self {
            entry,
            credential,
            state: AttemptState::Pending,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    fn transition(&mut self, next: AttemptState) {
        debug_assert!(self.state.can_transition_to(next));
        self.state = next;
    }
}

/// Finished attempt handed back to the coordinator
#[derive(Debug)]
pub struct AttemptResult {
    pub entry: FrontierEntry,
    pub credential: Credential,
    pub state: AttemptState,
    pub outcome: Result<FollowersPage, AttemptError>,
}

impl AttemptResult {
    /// Moves the attempt to `next`, rejecting transitions the state machine
    /// does not allow
    pub fn settle(&mut self, next: AttemptState) -> Result<(), CrawlError> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Runs one attempt: backs off if this is a retry, calls upstream, and
/// decodes the payload
pub async fn dispatch(client: Arc<ApiClient>, mut attempt: Attempt, backoff: Duration) -> AttemptResult {
    let delay = retry_delay(backoff, attempt.entry.retry_count);
    if !delay.is_zero() {
        tracing::debug!(
            "Backing off {:?} before attempt {} for {}",
            delay,
            attempt.entry.attempts(),
            attempt.entry.identity
        );
        tokio::time::sleep(delay).await;
    }

    attempt.transition(AttemptState::Dispatched);

    let outcome = client
        .fetch_followers(&attempt.entry.identity, &attempt.credential)
        .await
        .and_then(|body| parse_followers(&body, client.namespace()));

    let next = match &outcome {
        Ok(_) => AttemptState::Completed,
        Err(e) if e.is_retryable() => AttemptState::Retryable,
        Err(_) => AttemptState::Fatal,
    };
    attempt.transition(next);

    AttemptResult {
        entry: attempt.entry,
        credential: attempt.credential,
        state: attempt.state,
        outcome,
    }
}
