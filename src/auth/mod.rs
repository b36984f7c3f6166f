//! Session based authentication.
//!
//! The session key travels in the `Authentication` request header. A
//! middleware resolves it once per request and handlers read the result
//! through the [`Auth`] and [`OptionalAuth`] extractors. Sessions that expired
//! can be revived with the remember-me token handed out at login.

mod credentials;
mod errors;
mod extractors;
mod header;
mod manager;
mod password;
mod token;

pub use credentials::authenticate;
pub use errors::AuthError;
pub use extractors::{Auth, OptionalAuth, RequestContext, resolve_session};
pub use header::{AUTHENTICATION_HEADER, session_id};
pub use manager::{InvalidReason, SessionManager, SessionSettings, Validity};
pub use password::{hash_password, verify_password};
pub use token::{TOKEN_LENGTH, generate_token, hash_token};
