//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket per client address to slow down password and
//! remember-me token guessing.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::access::ClientAddress;
use crate::config::RateLimitSettings;

/// Per-address rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

#[derive(Clone)]
pub struct RateLimitConfig {
    /// Shared by login and session continuation.
    pub auth: Arc<IpLimiter>,
}

impl RateLimitConfig {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let per_second = NonZeroU32::new(settings.per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(settings.burst).unwrap_or(NonZeroU32::MIN);

        Self {
            auth: Arc::new(RateLimiter::keyed(
                Quota::per_second(per_second).allow_burst(burst),
            )),
        }
    }
}

/// Middleware for rate limiting login and continuation.
///
/// Keys on the address admitted by the access filter, so it must run inside
/// that layer.
pub async fn rate_limit_auth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ClientAddress(address)) = request.extensions().get::<ClientAddress>().cloned() else {
        return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
    };

    match config.auth.check_key(&address) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(%address, "Too many authentication attempts");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many authentication attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}
