//! Session resolution middleware and the extractors that read its result.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, error, warn};

use super::errors::AuthError;
use super::header::session_id;
use super::manager::{SessionManager, Validity};
use crate::db::Session;

/// Per-request authentication state, inserted by [`resolve_session`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The caller's session if it was present and valid.
    pub session: Option<Session>,
}

/// Load, validate and prolong the session named by the request, then hand
/// the result to handlers through a [`RequestContext`] extension.
///
/// The prolonged expiry is written back in the background; a failed write is
/// logged and otherwise ignored.
pub async fn resolve_session(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut context = RequestContext::default();

    if let Some(key) = session_id(request.headers()).map(str::to_owned) {
        match manager.load_session(&key).await {
            Ok(Some(mut session)) => {
                let now = Utc::now();
                match SessionManager::validate_session(&session, now) {
                    Validity::Valid => {
                        match manager.prolong_session(&mut session, now) {
                            Ok(()) => {
                                let background = manager.clone();
                                let snapshot = session.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = background.save_expiry(&snapshot).await {
                                        warn!(session = %snapshot.key, error = %e, "Failed to prolong session");
                                    }
                                });
                            }
                            Err(e) => warn!(session = %key, error = %e, "Failed to prolong session"),
                        }

                        context.session = Some(session);
                    }
                    Validity::Invalid(reason) => {
                        debug!(session = %key, %reason, "Rejected session");
                    }
                }
            }
            Ok(None) => debug!(session = %key, "Unknown session"),
            Err(e) => error!(error = %e, "Failed to load session"),
        }
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

fn current_session(parts: &Parts) -> Option<Session> {
    parts
        .extensions
        .get::<RequestContext>()
        .and_then(|context| context.session.clone())
}

/// Extractor for endpoints that require a valid session.
pub struct Auth(pub Session);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_session(parts).map(Auth).ok_or(AuthError)
    }
}

/// Optional authentication extractor, never fails.
pub struct OptionalAuth(pub Option<Session>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(current_session(parts)))
    }
}
