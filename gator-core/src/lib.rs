pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod follow;
pub mod identity;
pub mod models;
pub mod postgres;
pub mod storage;

pub use commands::{Command, Handler, Registry, State, DEFAULT_FEED_URL};
pub use config::{Config, Session};
pub use error::{ConfigError, FetchError, GatorError, StoreError};
pub use feed::{CancelHandle, FeedFetcher, FetchContext, RssFeed, RssItem};
pub use models::{Feed, FeedFollow, FeedListing, User};
pub use storage::{MemoryStore, SharedStore, Store};
