use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Feed, FeedFollow, FeedListing, User};
use crate::storage::Store;

/// PostgreSQL-backed store. Migrations run once on connect.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(db_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(db_url).await.map_err(classify)?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("connected to postgres and applied migrations");
        Ok(Self { pool })
    }
}

fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.constraint().unwrap_or(db.message()).to_owned())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::MissingReference(db.constraint().unwrap_or(db.message()).to_owned())
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, created_at, updated_at, name FROM users WHERE name = $1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, created_at, updated_at, name)
             VALUES ($1, $2, $3, $4)
             RETURNING id, created_at, updated_at, name",
        )
        .bind(user.id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(&user.name)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn clear_users(&self) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        debug!(rows = result.rows_affected(), "cleared users");
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, created_at, updated_at, name FROM users ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn create_feed(&self, feed: Feed) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(
            "INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, created_at, updated_at, name, url, user_id",
        )
        .bind(feed.id)
        .bind(feed.created_at)
        .bind(feed.updated_at)
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(feed.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn delete_feed(&self, feed_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM feeds WHERE id = $1")
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn list_feeds(&self) -> Result<Vec<FeedListing>, StoreError> {
        sqlx::query_as::<_, FeedListing>(
            "SELECT feeds.name, feeds.url, users.name AS user_name
             FROM feeds
             INNER JOIN users ON users.id = feeds.user_id
             ORDER BY feeds.created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(
            "SELECT id, created_at, updated_at, name, url, user_id FROM feeds WHERE url = $1",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn create_feed_follow(&self, follow: FeedFollow) -> Result<FeedFollow, StoreError> {
        sqlx::query_as::<_, FeedFollow>(
            "INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, created_at, updated_at, user_id, feed_id",
        )
        .bind(follow.id)
        .bind(follow.created_at)
        .bind(follow.updated_at)
        .bind(follow.user_id)
        .bind(follow.feed_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn delete_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM feed_follows WHERE user_id = $1 AND feed_id = $2")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn list_follows_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT feeds.name
             FROM feed_follows
             INNER JOIN feeds ON feeds.id = feed_follows.feed_id
             WHERE feed_follows.user_id = $1
             ORDER BY feed_follows.created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }
}
