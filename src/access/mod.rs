//! IP based access control applied to every inbound request.

mod filter;
mod ip;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

pub use filter::{AccessFilter, Decision};
pub use ip::{ClientIpHeader, HasHeadersAndExtensions, IpExtractor, extract_client_ip, peer_host};

/// State for the access filter middleware.
#[derive(Clone)]
pub struct AccessState {
    pub filter: Arc<AccessFilter>,
    pub ip_extractor: Option<IpExtractor>,
}

/// Client address of an admitted request, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

/// Reject requests whose source address is denied by the access policy.
///
/// An unusable source address answers 400, a policy deny answers 403.
/// Neither response carries a body.
pub async fn filter_access(
    State(state): State<AccessState>,
    mut request: Request,
    next: Next,
) -> Response {
    let address = match extract_client_ip(&request, state.ip_extractor.as_ref()) {
        Ok(address) => address,
        Err(reason) => {
            warn!(%reason, "Rejecting request without a usable source address");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.filter.evaluate(&address) {
        Decision::Deny => {
            info!(%address, "Origin address is not allowed");
            StatusCode::FORBIDDEN.into_response()
        }
        Decision::Allow => {
            request.extensions_mut().insert(ClientAddress(address));
            next.run(request).await
        }
    }
}
