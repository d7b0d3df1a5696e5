use tracing::debug;

use crate::config::Config;
use crate::error::{GatorError, Result, StoreError};
use crate::models::User;
use crate::storage::Store;

/// Looks up a user by exact (case-sensitive) name.
pub async fn user_by_name(store: &dyn Store, name: &str) -> Result<User> {
    match store.get_user_by_name(name).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(GatorError::UserNotFound(name.to_owned())),
        Err(source) => Err(GatorError::Persistence {
            operation: "get user by name",
            source,
        }),
    }
}

/// Resolves the user recorded as logged in. Fails with `NotLoggedIn` when no
/// name is set and `UserNotFound` when the name has no matching record.
pub async fn current_user(store: &dyn Store, config: &Config) -> Result<User> {
    let name = config.current_user().ok_or(GatorError::NotLoggedIn)?;
    let user = user_by_name(store, name).await?;
    debug!(user = %user.name, "resolved current user");
    Ok(user)
}
