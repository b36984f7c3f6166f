#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode, request::Builder},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use shoptrac::access::IpExtractor;
use shoptrac::auth::hash_password;
use shoptrac::config::{AppConfig, RateLimitSettings};
use shoptrac::db::{Database, NewUser, UserLevel};
use shoptrac::{ServerConfig, create_app};
use std::net::SocketAddr;
use tower::ServiceExt;

pub const PEER: &str = "127.0.0.1:40000";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
}

/// Configuration used by most tests: defaults with a generous rate limit.
pub fn test_config() -> AppConfig {
    AppConfig {
        rate_limit: RateLimitSettings {
            per_second: 100,
            burst: 100,
        },
        ..AppConfig::default()
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(test_config(), None).await
}

pub async fn test_app_with(app: AppConfig, ip_extractor: Option<IpExtractor>) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        app,
        ip_extractor,
    };
    TestApp {
        router: create_app(&config),
        db,
    }
}

/// Request builder carrying the connection info a real listener would attach.
pub fn request_from(method: &str, uri: &str, peer: &str) -> Builder {
    let addr: SocketAddr = peer.parse().expect("valid peer address");
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(addr))
}

pub fn request(method: &str, uri: &str) -> Builder {
    request_from(method, uri, PEER)
}

pub fn json_request(method: &str, uri: &str, session: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = request(method, uri).header("content-type", "application/json");
    if let Some(session) = session {
        builder = builder.header("Authentication", session);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = request("GET", uri);
    if let Some(session) = session {
        builder = builder.header("Authentication", session);
    }
    builder.body(Body::empty()).unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn create_user(&self, username: &str, password: &str) -> String {
        self.create_user_with_level(username, password, UserLevel::User)
            .await
    }

    pub async fn create_user_with_level(
        &self,
        username: &str,
        password: &str,
        level: UserLevel,
    ) -> String {
        let key = uuid::Uuid::new_v4().to_string();
        let hash = hash_password(password).unwrap();
        self.db
            .users()
            .create(&NewUser {
                key: &key,
                username,
                name: "Test User",
                email: "test@example.com",
                level,
                password_hash: &hash,
            })
            .await
            .unwrap();
        key
    }

    pub async fn login(&self, username: &str, password: &str, remember_me: bool) -> TestResponse {
        let body = serde_json::json!({
            "username": username,
            "password": encode(password),
            "remember_me": remember_me,
        });
        self.send(json_request("POST", "/api/auth/login", None, &body.to_string()))
            .await
    }

    /// Log in and return `(session_id, remember_me_token)`.
    pub async fn login_ok(&self, username: &str, password: &str, remember_me: bool) -> (String, String) {
        let response = self.login(username, password, remember_me).await;
        assert_eq!(response.status, StatusCode::OK);
        let json = response.json();
        (
            json["session_id"].as_str().unwrap().to_string(),
            json["remember_me_token"].as_str().unwrap().to_string(),
        )
    }

    /// Stored `(expires, remember_me_expires)` of a session.
    pub async fn stored_expiry(&self, session_id: &str) -> (String, Option<String>) {
        let session = self
            .db
            .sessions()
            .get_by_key(session_id)
            .await
            .unwrap()
            .expect("session exists");
        (session.expires, session.remember_me_expires)
    }

    /// Overwrite the stored expiry fields of a session.
    pub async fn set_expiry(&self, session_id: &str, expires: &str, remember_me_expires: Option<&str>) {
        sqlx::query("UPDATE sessions SET expires = ?, remember_me_expires = ? WHERE key = ?")
            .bind(expires)
            .bind(remember_me_expires)
            .bind(session_id)
            .execute(self.db.pool())
            .await
            .unwrap();
    }

    /// Poll until the stored expiry differs from `previous`, as written by
    /// the background prolongation.
    pub async fn wait_for_expiry_change(&self, session_id: &str, previous: &str) -> (String, Option<String>) {
        for _ in 0..100 {
            let stored = self.stored_expiry(session_id).await;
            if stored.0 != previous {
                return stored;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("stored expiry of {session_id} never changed");
    }

    /// Move the stored expiry of a session into the past.
    pub async fn expire_session(&self, session_id: &str) {
        sqlx::query("UPDATE sessions SET expires = '2000-01-01 00:00:00Z' WHERE key = ?")
            .bind(session_id)
            .execute(self.db.pool())
            .await
            .unwrap();
    }
}

pub fn encode(value: &str) -> String {
    STANDARD.encode(value)
}
