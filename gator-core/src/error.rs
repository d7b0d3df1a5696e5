use std::time::Duration;

use thiserror::Error;

/// Failures raised while retrieving and decoding a remote feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch of {url} was canceled")]
    Canceled { url: String },
    #[error("fetch of {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },
    #[error("feed at {url} exceeds the {limit} byte limit")]
    TooLarge { url: String, limit: u64 },
    #[error("failed to fetch feed {url}: {source}")]
    Failed {
        url: String,
        #[source]
        source: FetchFailure,
    },
}

#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed parsing error: {0}")]
    Parse(#[from] rss::Error),
}

/// Storage-layer failures. `NotFound` and `Conflict` are kept apart from
/// driver errors so callers can turn them into domain errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("referenced record missing: {0}")]
    MissingReference(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to locate the home directory")]
    NoHomeDir,
    #[error("unable to access config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum GatorError {
    #[error("'{command}' command expects {expected}")]
    Argument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("'{command}': invalid url '{url}': {source}")]
    InvalidUrl {
        command: &'static str,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("user {0} does not exist, register the user first")]
    UserNotFound(String),
    #[error("no user is logged in, run 'login' or 'register' first")]
    NotLoggedIn,
    #[error("no feed is registered for {0}, add it with 'addfeed' first")]
    FeedNotFound(String),
    #[error("user {0} already exists")]
    UserExists(String),
    #[error("a feed with url {0} already exists")]
    FeedExists(String),
    #[error("user {user} already follows {feed}")]
    AlreadyFollowing { user: String, feed: String },
    #[error("{operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("expecting at least one argument, the command name")]
    MissingCommand,
    #[error("interrupted")]
    Interrupted,
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GatorError {
    pub fn persistence(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| GatorError::Persistence { operation, source }
    }

    /// True for the lookup-miss family (unknown user, no login, unknown feed).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatorError::UserNotFound(_) | GatorError::NotLoggedIn | GatorError::FeedNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            GatorError::UserExists(_)
                | GatorError::FeedExists(_)
                | GatorError::AlreadyFollowing { .. }
        )
    }
}

pub type Result<T, E = GatorError> = std::result::Result<T, E>;
