//! Persisted peer state
//!
//! One JSON file per installation holds the signing key, display name,
//! remembered relay, current space and the last post snapshot used as an
//! offline fallback. The session is loaded once at startup and written back
//! at explicit save points; nothing here is global.

use super::config::DEFAULT_SPACE;
use crate::crypto::Keypair;
use crate::types::{PeerKey, Post};
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "dusky", "eager", "fuzzy", "gentle", "hollow", "lucky", "quiet",
];
const NOUNS: &[&str] = &[
    "badger", "comet", "falcon", "harbor", "lantern", "maple", "otter", "pebble", "river", "willow",
];

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    display_name: String,
    /// Ed25519 secret key, hex encoded
    signing_key: String,
    #[serde(default)]
    best_relay: Option<String>,
    #[serde(default = "default_space")]
    space: String,
    #[serde(default)]
    recent_posts: Vec<Post>,
}

fn default_space() -> String {
    DEFAULT_SPACE.to_string()
}

/// Client-side state owned by one peer instance
#[derive(Debug)]
pub struct PeerSession {
    path: Option<PathBuf>,
    display_name: String,
    keypair: Keypair,
    best_relay: Option<String>,
    space: String,
    recent_posts: Vec<Post>,
}

impl PeerSession {
    /// Fresh identity that is never written to disk
    pub fn ephemeral(display_name: impl Into<String>) -> Self {
        Self {
            path: None,
            display_name: display_name.into(),
            keypair: Keypair::generate(),
            best_relay: None,
            space: default_space(),
            recent_posts: Vec::new(),
        }
    }

    /// Load the session at `path`, creating and saving a new identity if absent
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            let mut session = Self::ephemeral(generate_display_name());
            session.path = Some(path.to_path_buf());
            session.save()?;
            info!(
                name = %session.display_name,
                path = %path.display(),
                "Created new peer identity"
            );
            Ok(session)
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let file: SessionFile = serde_json::from_slice(&data)
            .map_err(|e| Error::Session(format!("Failed to parse {}: {}", path.display(), e)))?;
        let keypair = Keypair::from_hex(&file.signing_key)?;

        debug!(name = %file.display_name, relay = ?file.best_relay, "Loaded peer session");
        Ok(Self {
            path: Some(path.to_path_buf()),
            display_name: file.display_name,
            keypair,
            best_relay: file.best_relay,
            space: file.space,
            recent_posts: file.recent_posts,
        })
    }

    /// Write the session back to its file. No-op for ephemeral sessions.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = SessionFile {
            display_name: self.display_name.clone(),
            signing_key: self.keypair.to_hex(),
            best_relay: self.best_relay.clone(),
            space: self.space.clone(),
            recent_posts: self.recent_posts.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, json)?;
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn peer_key(&self) -> PeerKey {
        self.keypair.peer_key()
    }

    pub fn best_relay(&self) -> Option<&str> {
        self.best_relay.as_deref()
    }

    pub fn set_best_relay(&mut self, relay: Option<String>) {
        self.best_relay = relay;
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    pub fn set_space(&mut self, space: impl Into<String>) {
        self.space = space.into();
    }

    pub fn recent_posts(&self) -> &[Post] {
        &self.recent_posts
    }

    pub fn set_recent_posts(&mut self, posts: Vec<Post>) {
        self.recent_posts = posts;
    }

    /// Record a post newer than everything in the snapshot
    pub fn push_recent_post(&mut self, post: Post) {
        self.recent_posts.insert(0, post);
    }
}

fn generate_display_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("otter");
    format!("{}-{}-{:04}", adjective, noun, rng.gen_range(0..10_000))
}
