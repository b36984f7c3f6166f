//! Username and password check for login.

use tracing::debug;

use super::password::verify_stored_password;
use crate::db::{Database, User};
use crate::error::Error;

/// Resolve the user for a username/password pair.
///
/// Unknown usernames and wrong passwords both yield [`Error::Unauthorized`]
/// after the same amount of hashing work.
pub async fn authenticate(db: &Database, username: &str, password: &str) -> Result<User, Error> {
    let users = db.users();
    let stored = users.password_hash_by_username(username).await?;
    let known = stored.is_some();

    if !verify_stored_password(password, stored.as_deref()) {
        debug!(%username, known, "Credentials rejected");
        return Err(Error::Unauthorized);
    }

    users
        .get_by_username(username)
        .await?
        .ok_or(Error::Unauthorized)
}
