//! Session identifier transport.

use axum::http::HeaderMap;

/// Request header carrying the session key.
pub const AUTHENTICATION_HEADER: &str = "Authentication";

/// Extract the session key from the request headers.
/// Absent, empty or non-ASCII values count as no session.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHENTICATION_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() { None } else { Some(value) }
}
