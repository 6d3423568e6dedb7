//! Where users' connections come from.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::ihash;

/// Looks up the direct connections of a user.
#[async_trait]
pub trait SocialGraphSource: Send + Sync {
    /// Nicknames of the users `nickname` is connected to. May contain
    /// duplicates and users outside of any room.
    async fn connections(&self, nickname: &str) -> Result<Vec<String>>;
}

/////////////////////////////////////////////////////////////////////////////
// FriendFeed
/////////////////////////////////////////////////////////////////////////////

pub const FRIENDFEED_URL: &str = "http://friendfeed.com/";

/// A user or room as listed in a profile. Imaginary friends have no
/// nickname.
#[derive(Debug, Deserialize)]
struct Entity {
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,

    #[serde(default)]
    subscriptions: Vec<Entity>,

    #[serde(default)]
    members: Vec<Entity>,
}

fn nicknames(entities: Vec<Entity>) -> Vec<String> {
    entities.into_iter().filter_map(|entity| entity.nickname).collect()
}

/// Reads profiles from the FriendFeed API. A user's connections are the
/// users they subscribe to.
#[derive(Debug, Clone)]
pub struct FriendFeedSource {
    http: reqwest::Client,
    base: Url,
}

impl FriendFeedSource {
    pub fn new(base: &str) -> Result<Self> {
        let mut base = Url::parse(base)
            .map_err(|e| Error::InvalidInput(format!("bad api url `{base}`: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    /// `{base}/{kind}/{name}/profile`, with `name` percent-encoded as a
    /// single path segment.
    fn endpoint(&self, kind: &str, name: &str) -> Result<Url> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::upstream(name, "not a valid profile name"));
        }

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::upstream(name, format!("api url `{}` cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(["api", kind, name, "profile"]);
        Ok(url)
    }

    async fn profile(&self, kind: &str, subject: &str) -> Result<Profile> {
        let url = self.endpoint(kind, subject)?;
        debug!(%url, "fetching profile");

        let response = self
            .http
            .get(url)
            .query(&[("format", "json")])
            .send()
            .await
            .map_err(|e| Error::upstream(subject, e))?;

        let status = response.status();
        let profile: Profile = response
            .json()
            .await
            .map_err(|e| Error::upstream(subject, e))?;

        if let Some(code) = profile.error_code {
            return Err(Error::upstream(subject, format!("friendfeed error `{code}`")));
        }
        if !status.is_success() {
            return Err(Error::upstream(subject, format!("friendfeed answered {status}")));
        }

        Ok(profile)
    }

    /// Nicknames of the members of a room.
    pub async fn room_members(&self, room: &str) -> Result<Vec<String>> {
        let profile = self.profile("room", room).await?;
        Ok(nicknames(profile.members))
    }
}

#[async_trait]
impl SocialGraphSource for FriendFeedSource {
    async fn connections(&self, nickname: &str) -> Result<Vec<String>> {
        let profile = self.profile("user", nickname).await?;
        Ok(nicknames(profile.subscriptions))
    }
}

/////////////////////////////////////////////////////////////////////////////
// Synthetic
/////////////////////////////////////////////////////////////////////////////

/// Made-up population `user00`, `user01`, ... where every user follows
/// between 1 and 10 others at random.
///
/// The choice is seeded from the nickname, so a user's connections are the
/// same on every fetch.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticSource {
    population: usize,
}

impl SyntheticSource {
    pub fn new(population: usize) -> Self {
        Self {
            population: population.max(1),
        }
    }

    /// Every user of the population.
    pub fn members(&self) -> Vec<String> {
        (0..self.population).map(Self::nickname).collect()
    }

    fn nickname(index: usize) -> String {
        format!("user{index:02}")
    }
}

#[async_trait]
impl SocialGraphSource for SyntheticSource {
    async fn connections(&self, nickname: &str) -> Result<Vec<String>> {
        let mut rng = StdRng::seed_from_u64(ihash(nickname.as_bytes()) as u64);
        let count = rng.gen_range(1..=10);
        let friends = (0..count)
            .map(|_| Self::nickname(rng.gen_range(0..self.population)))
            .collect();
        Ok(friends)
    }
}

/////////////////////////////////////////////////////////////////////////////
// Static
/////////////////////////////////////////////////////////////////////////////

/// Fixed adjacency lists. Unknown users fail like a missing profile.
#[derive(Debug, Clone, Default)]
pub struct StaticGraph {
    graph: HashMap<String, Vec<String>>,
}

impl StaticGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, nickname: &str, friends: &[&str]) -> Self {
        self.graph.insert(
            nickname.to_string(),
            friends.iter().map(|friend| friend.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl SocialGraphSource for StaticGraph {
    async fn connections(&self, nickname: &str) -> Result<Vec<String>> {
        self.graph
            .get(nickname)
            .cloned()
            .ok_or_else(|| Error::upstream(nickname, "user-not-found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_drops_imaginary_friends() {
        let body = r#"{
            "nickname": "alice",
            "subscriptions": [
                {"nickname": "bob", "name": "Bob"},
                {"name": "Imaginary", "id": "1234"},
                {"nickname": "carol"}
            ]
        }"#;
        let profile: Profile = serde_json::from_str(body).unwrap();

        assert!(profile.error_code.is_none());
        assert_eq!(nicknames(profile.subscriptions), vec!["bob", "carol"]);
        assert!(profile.members.is_empty());
    }

    #[test]
    fn profile_carries_error_code() {
        let profile: Profile = serde_json::from_str(r#"{"errorCode": "user-not-found"}"#).unwrap();
        assert_eq!(profile.error_code.as_deref(), Some("user-not-found"));
    }

    #[test]
    fn api_url_gets_trailing_slash() {
        let source = FriendFeedSource::new("http://localhost:8080/ff").unwrap();
        assert_eq!(source.base.as_str(), "http://localhost:8080/ff/");
        assert!(FriendFeedSource::new("::").is_err());
    }

    #[test]
    fn profile_names_stay_in_one_path_segment() {
        let source = FriendFeedSource::new("http://localhost:8080/ff").unwrap();

        let url = source.endpoint("user", "bob").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/ff/api/user/bob/profile");

        let url = source.endpoint("room", "a?b#c/d").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/ff/api/room/a%3Fb%23c%2Fd/profile");
        assert!(url.query().is_none() && url.fragment().is_none());

        for name in ["", ".", ".."] {
            let err = source.endpoint("user", name).unwrap_err();
            assert!(matches!(err, Error::UpstreamFetch { .. }));
        }
    }

    #[tokio::test]
    async fn synthetic_connections_are_stable() {
        let source = SyntheticSource::new(20);
        let first = source.connections("user03").await.unwrap();
        let second = source.connections("user03").await.unwrap();

        assert_eq!(first, second);
        assert!((1..=10).contains(&first.len()));
        assert!(first.iter().all(|friend| source.members().contains(friend)));
    }

    #[tokio::test]
    async fn static_graph_fails_unknown_users() {
        let graph = StaticGraph::new().with_user("a", &["b"]);
        assert_eq!(graph.connections("a").await.unwrap(), vec!["b"]);

        let err = graph.connections("z").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFetch { .. }));
    }
}
