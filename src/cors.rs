//! Cross-origin headers for browser clients.
//!
//! Every response carries `Access-Control-Allow-Origin`. Preflight requests are
//! answered directly without reaching the router.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, Response, StatusCode, header},
    middleware::Next,
    response::IntoResponse,
};

const ALLOWED_METHODS: &str = "GET, PATCH, POST, PUT, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authentication";

#[derive(Clone)]
pub struct CorsState {
    origin: HeaderValue,
}

impl CorsState {
    /// Origins that are not valid header values fall back to `*`.
    pub fn new(origin: &str) -> Self {
        Self {
            origin: HeaderValue::from_str(origin).unwrap_or(HeaderValue::from_static("*")),
        }
    }
}

pub async fn cors_middleware(
    State(state): State<CorsState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if *request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, state.origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        return response;
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, state.origin);
    response
}
