use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Feed, FeedFollow, FeedListing, User};
use crate::postgres::PgStore;

/// The persistence operations the aggregator needs. Each method maps to a
/// single statement against the backing database.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError>;
    async fn create_user(&self, user: User) -> Result<User, StoreError>;
    /// Removes every user; feeds and follows go with them.
    async fn clear_users(&self) -> Result<(), StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn create_feed(&self, feed: Feed) -> Result<Feed, StoreError>;
    /// Removes a feed and every follow referencing it.
    async fn delete_feed(&self, feed_id: Uuid) -> Result<(), StoreError>;
    async fn list_feeds(&self) -> Result<Vec<FeedListing>, StoreError>;
    async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError>;
    async fn create_feed_follow(&self, follow: FeedFollow) -> Result<FeedFollow, StoreError>;
    /// Deleting a pair that does not exist is not an error.
    async fn delete_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<(), StoreError>;
    /// Names of the feeds `user_id` follows, oldest follow first.
    async fn list_follows_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError>;
}

pub type SharedStore = Arc<dyn Store>;

/// Opens the backend selected by the url scheme: `postgres://` (or
/// `postgresql://`) connects to PostgreSQL, `memory://` keeps everything in
/// process memory.
pub async fn open(db_url: &str) -> Result<SharedStore, StoreError> {
    if db_url.starts_with("postgres://") || db_url.starts_with("postgresql://") {
        let store = PgStore::connect(db_url).await?;
        Ok(Arc::new(store))
    } else if db_url.starts_with("memory://") {
        debug!("using in-memory store");
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Err(StoreError::UnsupportedUrl(db_url.to_owned()))
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    feeds: Vec<Feed>,
    follows: Vec<FeedFollow>,
}

/// In-process store with the same uniqueness and cascade rules as the
/// PostgreSQL schema.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        let tables = self.inner.read().await;
        tables
            .users
            .iter()
            .find(|u| u.name == name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let mut tables = self.inner.write().await;
        if tables.users.iter().any(|u| u.name == user.name) {
            return Err(StoreError::Conflict(format!("users.name = {}", user.name)));
        }
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn clear_users(&self) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables.users.clear();
        tables.feeds.clear();
        tables.follows.clear();
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().await.users.clone())
    }

    async fn create_feed(&self, feed: Feed) -> Result<Feed, StoreError> {
        let mut tables = self.inner.write().await;
        if !tables.users.iter().any(|u| u.id == feed.user_id) {
            return Err(StoreError::MissingReference(format!(
                "feeds.user_id = {}",
                feed.user_id
            )));
        }
        if tables.feeds.iter().any(|f| f.url == feed.url) {
            return Err(StoreError::Conflict(format!("feeds.url = {}", feed.url)));
        }
        tables.feeds.push(feed.clone());
        Ok(feed)
    }

    async fn delete_feed(&self, feed_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables.feeds.retain(|f| f.id != feed_id);
        tables.follows.retain(|f| f.feed_id != feed_id);
        Ok(())
    }

    async fn list_feeds(&self) -> Result<Vec<FeedListing>, StoreError> {
        let tables = self.inner.read().await;
        let listings = tables
            .feeds
            .iter()
            .filter_map(|feed| {
                let owner = tables.users.iter().find(|u| u.id == feed.user_id)?;
                Some(FeedListing {
                    name: feed.name.clone(),
                    url: feed.url.clone(),
                    user_name: owner.name.clone(),
                })
            })
            .collect();
        Ok(listings)
    }

    async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        let tables = self.inner.read().await;
        tables
            .feeds
            .iter()
            .find(|f| f.url == url)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_feed_follow(&self, follow: FeedFollow) -> Result<FeedFollow, StoreError> {
        let mut tables = self.inner.write().await;
        if !tables.users.iter().any(|u| u.id == follow.user_id) {
            return Err(StoreError::MissingReference(format!(
                "feed_follows.user_id = {}",
                follow.user_id
            )));
        }
        if !tables.feeds.iter().any(|f| f.id == follow.feed_id) {
            return Err(StoreError::MissingReference(format!(
                "feed_follows.feed_id = {}",
                follow.feed_id
            )));
        }
        if tables
            .follows
            .iter()
            .any(|f| f.user_id == follow.user_id && f.feed_id == follow.feed_id)
        {
            return Err(StoreError::Conflict(format!(
                "feed_follows (user_id, feed_id) = ({}, {})",
                follow.user_id, follow.feed_id
            )));
        }
        tables.follows.push(follow.clone());
        Ok(follow)
    }

    async fn delete_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables
            .follows
            .retain(|f| !(f.user_id == user_id && f.feed_id == feed_id));
        Ok(())
    }

    async fn list_follows_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        let tables = self.inner.read().await;
        let names = tables
            .follows
            .iter()
            .filter(|f| f.user_id == user_id)
            .filter_map(|f| tables.feeds.iter().find(|feed| feed.id == f.feed_id))
            .map(|feed| feed.name.clone())
            .collect();
        Ok(names)
    }
}
