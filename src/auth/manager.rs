//! Session lifecycle: creation, validation, prolongation, continuation and
//! termination.
//!
//! Every operation takes the current time explicitly so that expiry
//! arithmetic is deterministic under test.

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use std::fmt;
use tracing::{debug, info};

use super::token::{generate_token, hash_token};
use crate::config::AppConfig;
use crate::db::{Database, Session, User};
use crate::error::Error;

/// Latest year a stored timestamp may carry; the sweep compares timestamps
/// as fixed-width text.
const MAX_STORED_YEAR: i32 = 9999;

/// Sliding lifetimes applied to sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub session_expiry: TimeDelta,
    pub remember_me_expiry: TimeDelta,
}

impl SessionSettings {
    /// Out-of-range values saturate; expiries computed from them are rejected.
    pub fn from_minutes(session_expiry: i64, remember_me_expiry: i64) -> Self {
        let minutes = |m| TimeDelta::try_minutes(m).unwrap_or(TimeDelta::MAX);
        Self {
            session_expiry: minutes(session_expiry),
            remember_me_expiry: minutes(remember_me_expiry),
        }
    }
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        Self::from_minutes(config.session_expiry, config.remember_me_expiry)
    }
}

/// Why a session failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    CreatedMalformed,
    CreatedInFuture,
    ExpiresMalformed,
    Expired,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InvalidReason::CreatedMalformed => "creation time cannot be parsed",
            InvalidReason::CreatedInFuture => "creation time lies in the future",
            InvalidReason::ExpiresMalformed => "expiry time cannot be parsed",
            InvalidReason::Expired => "session has expired",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid(InvalidReason),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// `now + lifetime`, provided the result is representable and storable.
fn expiry_after(now: DateTime<Utc>, lifetime: TimeDelta) -> Result<DateTime<Utc>, Error> {
    now.checked_add_signed(lifetime)
        .filter(|expiry| expiry.year() <= MAX_STORED_YEAR)
        .ok_or_else(|| Error::InvalidInput("expiry lies beyond the storable range".into()))
}

#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(db: Database, settings: SessionSettings) -> Self {
        Self { db, settings }
    }

    /// Build a new session for `user`. Nothing is persisted.
    pub fn create_session(&self, user: Option<&User>, now: DateTime<Utc>) -> Result<Session, Error> {
        let user = user.ok_or_else(|| Error::InvalidInput("session requires a user".into()))?;
        let expires = expiry_after(now, self.settings.session_expiry)?;

        let mut session = Session {
            key: uuid::Uuid::new_v4().to_string(),
            user_key: user.key.clone(),
            created: String::new(),
            expires: String::new(),
            remember_me_token: None,
            remember_me_expires: None,
            user: Some(user.clone()),
        };
        session.set_created(now);
        session.set_expires(expires);
        Ok(session)
    }

    /// Attach a fresh remember-me token to `session`. Returns the raw token,
    /// which is not stored anywhere.
    pub fn establish_remember_me(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<String, Error> {
        let remember_me_expires = expiry_after(now, self.settings.remember_me_expiry)?;
        let (raw, hash) = generate_token()?;
        session.remember_me_token = Some(hash);
        session.set_remember_me_expires(remember_me_expires);
        Ok(raw)
    }

    /// Insert a newly created session.
    pub async fn persist(&self, session: &Session) -> Result<String, Error> {
        Ok(self.db.sessions().create(session).await?)
    }

    /// Load a session with its owner resolved. Sessions whose owner no longer
    /// exists are treated as absent.
    pub async fn load_session(&self, key: &str) -> Result<Option<Session>, Error> {
        let Some(mut session) = self.db.sessions().get_by_key(key).await? else {
            return Ok(None);
        };
        let Some(user) = self.db.users().get_by_key(&session.user_key).await? else {
            debug!(session = %session.key, "Session owner no longer exists");
            return Ok(None);
        };
        session.user = Some(user);
        Ok(Some(session))
    }

    /// Valid iff `created <= now <= expires`, both parseable.
    pub fn validate_session(session: &Session, now: DateTime<Utc>) -> Validity {
        let Ok(created) = session.created_at() else {
            return Validity::Invalid(InvalidReason::CreatedMalformed);
        };
        if created > now {
            return Validity::Invalid(InvalidReason::CreatedInFuture);
        }
        let Ok(expires) = session.expires_at() else {
            return Validity::Invalid(InvalidReason::ExpiresMalformed);
        };
        if now > expires {
            return Validity::Invalid(InvalidReason::Expired);
        }
        Validity::Valid
    }

    /// Push the expiry out from `now`. Touches the remember-me expiry only if
    /// the session carries a token. In-memory only; see [`Self::save_expiry`].
    /// On error the session is left unchanged.
    pub fn prolong_session(&self, session: &mut Session, now: DateTime<Utc>) -> Result<(), Error> {
        let expires = expiry_after(now, self.settings.session_expiry)?;
        let remember_me_expires = if session.has_remember_me() {
            Some(expiry_after(now, self.settings.remember_me_expiry)?)
        } else {
            None
        };

        session.set_expires(expires);
        if let Some(remember_me_expires) = remember_me_expires {
            session.set_remember_me_expires(remember_me_expires);
        }
        Ok(())
    }

    /// Write the expiry fields of `session` back to the store.
    pub async fn save_expiry(&self, session: &Session) -> Result<(), Error> {
        self.db
            .sessions()
            .update_expiry(
                &session.key,
                &session.expires,
                session.remember_me_expires.as_deref(),
            )
            .await?;
        Ok(())
    }

    /// Revive a session with its remember-me token.
    ///
    /// `NotFound` when no session carries the token hash or the remember-me
    /// period has passed. Both expiries are reset from `now`.
    pub async fn continue_session(
        &self,
        key: &str,
        raw_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, Error> {
        let mut session = self
            .db
            .sessions()
            .get_with_token(key, &hash_token(raw_token))
            .await?
            .ok_or(Error::NotFound)?;

        match session.remember_me_expires_at() {
            Some(Ok(expires)) if now <= expires => {}
            _ => {
                debug!(session = %session.key, "Remember-me period is over");
                return Err(Error::NotFound);
            }
        }

        session.set_expires(expiry_after(now, self.settings.session_expiry)?);
        session.set_remember_me_expires(expiry_after(now, self.settings.remember_me_expiry)?);
        self.save_expiry(&session).await?;

        session.user = self.db.users().get_by_key(&session.user_key).await?;
        info!(session = %session.key, "Session continued");
        Ok(session)
    }

    /// Delete a session. Unknown keys are not an error.
    pub async fn terminate_session(&self, key: &str) -> Result<(), Error> {
        self.db.sessions().delete(key).await?;
        Ok(())
    }

    /// Delete every session that expired before `now`. Returns the count.
    pub async fn expiry_sweep(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        Ok(self.db.sessions().delete_expired(now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserLevel, to_db_time};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    async fn setup() -> (SessionManager, User) {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(&NewUser {
                key: "u1",
                username: "alice",
                name: "Alice",
                email: "alice@example.com",
                level: UserLevel::User,
                password_hash: "hash",
            })
            .await
            .unwrap();
        let user = db.users().get_by_key("u1").await.unwrap().unwrap();
        (
            SessionManager::new(db, SessionSettings::from_minutes(30, 60 * 24)),
            user,
        )
    }

    fn session_between(created: DateTime<Utc>, expires: DateTime<Utc>) -> Session {
        Session {
            key: "s".into(),
            user_key: "u".into(),
            created: to_db_time(created),
            expires: to_db_time(expires),
            remember_me_token: None,
            remember_me_expires: None,
            user: None,
        }
    }

    #[test]
    fn test_validation_boundaries() {
        let created = t0();
        let expires = t0() + TimeDelta::minutes(30);
        let session = session_between(created, expires);

        let v = |now| SessionManager::validate_session(&session, now);
        assert_eq!(v(created), Validity::Valid);
        assert_eq!(v(expires), Validity::Valid);
        assert_eq!(
            v(created - TimeDelta::seconds(1)),
            Validity::Invalid(InvalidReason::CreatedInFuture)
        );
        assert_eq!(
            v(expires + TimeDelta::seconds(1)),
            Validity::Invalid(InvalidReason::Expired)
        );
    }

    #[test]
    fn test_validation_malformed_timestamps() {
        let mut session = session_between(t0(), t0());
        session.created = "garbage".into();
        assert_eq!(
            SessionManager::validate_session(&session, t0()),
            Validity::Invalid(InvalidReason::CreatedMalformed)
        );

        let mut session = session_between(t0(), t0());
        session.expires = String::new();
        assert_eq!(
            SessionManager::validate_session(&session, t0()),
            Validity::Invalid(InvalidReason::ExpiresMalformed)
        );
    }

    #[tokio::test]
    async fn test_create_session_requires_user() {
        let (manager, _) = setup().await;
        let result = manager.create_session(None, t0());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_create_session_sets_expiry() {
        let (manager, user) = setup().await;
        let session = manager.create_session(Some(&user), t0()).unwrap();

        assert_eq!(session.user_key, "u1");
        assert_eq!(session.created_at().unwrap(), t0());
        assert_eq!(session.expires_at().unwrap(), t0() + TimeDelta::minutes(30));
        assert!(!session.has_remember_me());

        let other = manager.create_session(Some(&user), t0()).unwrap();
        assert_ne!(session.key, other.key);
    }

    #[tokio::test]
    async fn test_prolong_is_monotonic() {
        let (manager, user) = setup().await;
        let mut session = manager.create_session(Some(&user), t0()).unwrap();
        manager.establish_remember_me(&mut session, t0()).unwrap();

        let mut last_expires = session.expires_at().unwrap();
        let mut last_remember = session.remember_me_expires_at().unwrap().unwrap();
        for step in 1..5 {
            manager
                .prolong_session(&mut session, t0() + TimeDelta::minutes(step * 7))
                .unwrap();
            let expires = session.expires_at().unwrap();
            let remember = session.remember_me_expires_at().unwrap().unwrap();
            assert!(expires > last_expires);
            assert!(remember > last_remember);
            last_expires = expires;
            last_remember = remember;
        }
    }

    #[tokio::test]
    async fn test_prolong_without_token_keeps_remember_me_empty() {
        let (manager, user) = setup().await;
        let mut session = manager.create_session(Some(&user), t0()).unwrap();

        manager
            .prolong_session(&mut session, t0() + TimeDelta::minutes(5))
            .unwrap();

        assert!(session.remember_me_expires.is_none());
        assert_eq!(
            session.expires_at().unwrap(),
            t0() + TimeDelta::minutes(35)
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_expiry_is_rejected() {
        let (manager, user) = setup().await;
        let huge = SessionManager::new(
            manager.db.clone(),
            SessionSettings::from_minutes(100_000_000_000_000, 30),
        );
        assert!(matches!(
            huge.create_session(Some(&user), t0()),
            Err(Error::InvalidInput(_))
        ));

        // Representable, but past year 9999.
        let far = SessionManager::new(
            manager.db.clone(),
            SessionSettings::from_minutes(30, 8_000 * 366 * 24 * 60),
        );
        let mut session = far.create_session(Some(&user), t0()).unwrap();
        assert!(matches!(
            far.establish_remember_me(&mut session, t0()),
            Err(Error::InvalidInput(_))
        ));
        assert!(!session.has_remember_me());

        session.remember_me_token = Some("hash".into());
        let before = session.expires.clone();
        assert!(far.prolong_session(&mut session, t0() + TimeDelta::minutes(5)).is_err());
        assert_eq!(session.expires, before);
    }

    #[tokio::test]
    async fn test_remember_me_stores_only_hash() {
        let (manager, user) = setup().await;
        let mut session = manager.create_session(Some(&user), t0()).unwrap();
        let raw = manager.establish_remember_me(&mut session, t0()).unwrap();

        assert_eq!(session.remember_me_token.as_deref(), Some(hash_token(&raw).as_str()));
        assert_ne!(session.remember_me_token.as_deref(), Some(raw.as_str()));
        assert_eq!(
            session.remember_me_expires_at().unwrap().unwrap(),
            t0() + TimeDelta::days(1)
        );
    }

    #[tokio::test]
    async fn test_continue_requires_matching_token() {
        let (manager, user) = setup().await;
        let mut session = manager.create_session(Some(&user), t0()).unwrap();
        let raw = manager.establish_remember_me(&mut session, t0()).unwrap();
        manager.persist(&session).await.unwrap();

        let later = t0() + TimeDelta::hours(2);
        let result = manager.continue_session(&session.key, "wrong-token", later).await;
        assert!(matches!(result, Err(Error::NotFound)));

        let result = manager.continue_session("no-such-session", &raw, later).await;
        assert!(matches!(result, Err(Error::NotFound)));

        let continued = manager.continue_session(&session.key, &raw, later).await.unwrap();
        assert_eq!(continued.expires_at().unwrap(), later + TimeDelta::minutes(30));
        assert_eq!(
            continued.remember_me_expires_at().unwrap().unwrap(),
            later + TimeDelta::days(1)
        );
        assert_eq!(continued.user.unwrap().key, "u1");

        let stored = manager.load_session(&session.key).await.unwrap().unwrap();
        assert_eq!(stored.expires, continued.expires);
    }

    #[tokio::test]
    async fn test_continue_rejected_after_remember_me_expiry() {
        let (manager, user) = setup().await;
        let mut session = manager.create_session(Some(&user), t0()).unwrap();
        let raw = manager.establish_remember_me(&mut session, t0()).unwrap();
        manager.persist(&session).await.unwrap();

        let at_limit = t0() + TimeDelta::days(1);
        assert!(manager.continue_session(&session.key, &raw, at_limit).await.is_ok());

        let past = at_limit + TimeDelta::days(1) + TimeDelta::seconds(1);
        let result = manager.continue_session(&session.key, &raw, past).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_session_without_token_cannot_continue() {
        let (manager, user) = setup().await;
        let session = manager.create_session(Some(&user), t0()).unwrap();
        manager.persist(&session).await.unwrap();

        let result = manager.continue_session(&session.key, "", t0()).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let (manager, user) = setup().await;
        let session = manager.create_session(Some(&user), t0()).unwrap();
        manager.persist(&session).await.unwrap();

        manager.terminate_session(&session.key).await.unwrap();
        manager.terminate_session(&session.key).await.unwrap();

        assert!(manager.load_session(&session.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_sweep_ignores_remember_me() {
        let (manager, user) = setup().await;
        let mut old = manager.create_session(Some(&user), t0()).unwrap();
        manager.establish_remember_me(&mut old, t0()).unwrap();
        manager.persist(&old).await.unwrap();

        let later = t0() + TimeDelta::hours(1);
        let fresh = manager.create_session(Some(&user), later).unwrap();
        manager.persist(&fresh).await.unwrap();

        assert_eq!(manager.expiry_sweep(later).await.unwrap(), 1);
        assert!(manager.load_session(&old.key).await.unwrap().is_none());
        assert!(manager.load_session(&fresh.key).await.unwrap().is_some());

        assert_eq!(manager.expiry_sweep(later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_resolves_user() {
        let (manager, user) = setup().await;
        let session = manager.create_session(Some(&user), t0()).unwrap();
        manager.persist(&session).await.unwrap();

        let loaded = manager.load_session(&session.key).await.unwrap().unwrap();
        assert_eq!(loaded.user.unwrap().username, "alice");
        assert!(manager.load_session("missing").await.unwrap().is_none());
    }
}
