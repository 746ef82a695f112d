//! Space directory
//!
//! Spaces live in the `spaces` collection; a space exists once its
//! `<name>/posts` collection holds at least one post. Creation writes the
//! opening post first and the space document second, so a failed create
//! never leaves a name claimed in `spaces` without posts behind it.

use super::dedup::TopicDeduplicator;
use crate::storage::{DocumentStore, StorePath};
use crate::types::{now_millis, ContentItem, Post, Space};
use crate::wire::{CreateSpaceRequest, SpaceErrorReason};
use crate::Error;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Longest accepted space name, in characters
pub const MAX_SPACE_NAME_LEN: usize = 64;

/// Author of posts the relay writes itself
pub const RELAY_AUTHOR: &str = "relay";

/// Why a space could not be created
#[derive(Debug, thiserror::Error)]
pub enum CreateSpaceError {
    #[error("Space rejected: {0:?}")]
    Rejected(SpaceErrorReason),

    #[error(transparent)]
    Store(#[from] Error),
}

impl From<SpaceErrorReason> for CreateSpaceError {
    fn from(reason: SpaceErrorReason) -> Self {
        CreateSpaceError::Rejected(reason)
    }
}

/// Check a proposed space name
pub fn validate_name(name: &str) -> Result<(), SpaceErrorReason> {
    let valid = !name.trim().is_empty()
        && name.chars().count() <= MAX_SPACE_NAME_LEN
        && !name.chars().any(|c| c == '/' || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(SpaceErrorReason::InvalidName)
    }
}

/// Creates and looks up spaces in the backing store
pub struct SpaceDirectory {
    store: Arc<dyn DocumentStore>,
    dedup: TopicDeduplicator,
    // Serializes creation so two requests cannot both claim a name
    create_lock: Mutex<()>,
}

impl SpaceDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, dedup: TopicDeduplicator) -> Self {
        Self {
            store,
            dedup,
            create_lock: Mutex::new(()),
        }
    }

    /// Whether the space has any posts
    pub async fn exists(&self, space: &str) -> crate::Result<bool> {
        self.store.exists(&StorePath::posts(space)).await
    }

    /// Names of every known space
    pub async fn names(&self) -> crate::Result<Vec<String>> {
        let docs = self.store.query_recent(&StorePath::spaces(), usize::MAX).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| doc.get("name").and_then(|name| name.as_str()))
            .map(str::to_owned)
            .collect())
    }

    /// Create a space together with its first post
    pub async fn create_space(
        &self,
        request: CreateSpaceRequest,
    ) -> Result<Space, CreateSpaceError> {
        validate_name(&request.name)?;

        let _guard = self.create_lock.lock().await;
        // Posts without a space document are left by an interrupted create
        if self.exists(&request.name).await? {
            return Err(SpaceErrorReason::NameTaken.into());
        }
        let existing = self.names().await?;
        let similar_spaces = self
            .dedup
            .similar_names(&request.name, existing.iter().map(String::as_str))?;

        let space = Space {
            name: request.name.clone(),
            description: request.description,
            similar_spaces,
            created_at: now_millis(),
        };
        let first_post = Post::new(request.author, request.name, request.content);
        self.write_space(&space, &first_post).await?;

        info!(space = %space.name, similar = space.similar_spaces.len(), "Created space");
        Ok(space)
    }

    /// Seed `name` with a welcome post unless it already exists
    pub async fn ensure_space(&self, name: &str) -> crate::Result<bool> {
        let _guard = self.create_lock.lock().await;
        if self.exists(name).await? {
            debug!(space = %name, "Space already present");
            return Ok(false);
        }

        let space = Space {
            name: name.to_string(),
            description: None,
            similar_spaces: BTreeSet::new(),
            created_at: now_millis(),
        };
        let welcome = Post::new(
            RELAY_AUTHOR,
            name,
            vec![ContentItem::text(format!("Welcome to {}", name))],
        );
        self.write_space(&space, &welcome).await?;

        info!(space = %name, "Seeded space");
        Ok(true)
    }

    async fn write_space(&self, space: &Space, first_post: &Post) -> crate::Result<()> {
        self.store
            .append(&StorePath::posts(&space.name), serde_json::to_value(first_post)?)
            .await?;
        self.store
            .append(&StorePath::spaces(), serde_json::to_value(space)?)
            .await
    }
}
