//! Followers payload parsing
//!
//! The upstream body is `{"profiles": [{"uri", "name", "followers_count"}, ...]}`.
//! Only profiles whose `uri` lies in the configured namespace are graph
//! nodes; everything else (artists, playlists) is skipped.

use crate::state::{FollowerProfile, Identity};
use crate::AttemptError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FollowersPayload {
    #[serde(default)]
    profiles: Vec<RawProfile>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    followers_count: Option<u64>,
}

/// Followers of one identity as reported by a single upstream response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowersPage {
    /// Profiles inside the namespace, in upstream order
    pub profiles: Vec<FollowerProfile>,

    /// Profiles dropped because their uri was missing or foreign
    pub skipped: usize,
}

impl FollowersPage {
    /// Number of followers directly observed in this response
    pub fn observed_count(&self) -> u64 {
        self.profiles.len() as u64
    }
}

/// Parses a followers response body
///
/// # Arguments
///
/// * `body` - The raw response body
/// * `namespace` - Uri prefix identifying graph nodes, e.g. `spotify:user:`
///
/// # Returns
///
/// * `Ok(FollowersPage)` - The in-namespace profiles
/// * `Err(AttemptError::MalformedPayload)` - The body is not the expected JSON
pub fn parse_followers(body: &str, namespace: &str) -> Result<FollowersPage, AttemptError> {
    let payload: FollowersPayload =
        serde_json::from_str(body).map_err(|e| AttemptError::MalformedPayload(e.to_string()))?;

    let mut page = FollowersPage::default();
    for raw in payload.profiles {
        let identity = raw
            .uri
            .as_deref()
            .and_then(|uri| uri.strip_prefix(namespace))
            .filter(|id| !id.is_empty());

        match identity {
            Some(id) => page.profiles.push(FollowerProfile {
                identity: Identity::new(id),
                name: raw.name,
                follower_count: raw.followers_count,
            }),
            None => page.skipped += 1,
        }
    }

    Ok(page)
}
