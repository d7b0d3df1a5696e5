//! Follow graph: the many-to-many association between users and feeds.
//!
//! A (user, feed) pair can be followed at most once. A second follow fails
//! with `AlreadyFollowing` instead of creating a duplicate record.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{GatorError, Result, StoreError};
use crate::models::{Feed, FeedFollow, User};
use crate::storage::Store;

pub async fn create_follow(store: &dyn Store, user: &User, feed: &Feed) -> Result<FeedFollow> {
    match store
        .create_feed_follow(FeedFollow::new(user.id, feed.id))
        .await
    {
        Ok(follow) => {
            info!(user = %user.name, feed = %feed.name, "created follow");
            Ok(follow)
        }
        Err(StoreError::Conflict(_)) => Err(GatorError::AlreadyFollowing {
            user: user.name.clone(),
            feed: feed.name.clone(),
        }),
        Err(source) => Err(GatorError::Persistence {
            operation: "create feed follow",
            source,
        }),
    }
}

/// Removes the follow for this exact pair; a missing pair is a no-op.
pub async fn delete_follow(store: &dyn Store, user_id: Uuid, feed_id: Uuid) -> Result<()> {
    store
        .delete_feed_follow(user_id, feed_id)
        .await
        .map_err(GatorError::persistence("delete feed follow"))?;
    debug!(%user_id, %feed_id, "deleted follow");
    Ok(())
}

pub async fn list_follows_for_user(store: &dyn Store, user_id: Uuid) -> Result<Vec<String>> {
    store
        .list_follows_for_user(user_id)
        .await
        .map_err(GatorError::persistence("list feed follows"))
}

pub async fn feed_by_url(store: &dyn Store, url: &str) -> Result<Feed> {
    match store.get_feed_by_url(url).await {
        Ok(feed) => Ok(feed),
        Err(StoreError::NotFound) => Err(GatorError::FeedNotFound(url.to_owned())),
        Err(source) => Err(GatorError::Persistence {
            operation: "get feed by url",
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    async fn seeded() -> (MemoryStore, User, Feed) {
        let store = MemoryStore::new();
        let user = store.create_user(User::new("ana")).await.unwrap();
        let feed = store
            .create_feed(Feed::new("Lanes", "https://www.wagslane.dev/index.xml", user.id))
            .await
            .unwrap();
        (store, user, feed)
    }

    #[tokio::test]
    async fn follow_then_unfollow() {
        let (store, user, feed) = seeded().await;

        create_follow(&store, &user, &feed).await.unwrap();
        let names = list_follows_for_user(&store, user.id).await.unwrap();
        assert_eq!(names, vec!["Lanes".to_string()]);

        delete_follow(&store, user.id, feed.id).await.unwrap();
        assert!(list_follows_for_user(&store, user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_follow_is_rejected() {
        let (store, user, feed) = seeded().await;
        create_follow(&store, &user, &feed).await.unwrap();

        let err = create_follow(&store, &user, &feed).await.unwrap_err();
        assert!(matches!(err, GatorError::AlreadyFollowing { .. }));
        assert_eq!(list_follows_for_user(&store, user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_url_is_feed_not_found() {
        let (store, _, _) = seeded().await;
        let err = feed_by_url(&store, "https://nowhere.example/rss").await.unwrap_err();
        assert!(matches!(err, GatorError::FeedNotFound(_)));
    }
}
