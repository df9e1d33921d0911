#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use linkshelf::config::Config;
use linkshelf::db;
use linkshelf::routes;
use linkshelf::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub set_cookie: Option<String>,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("body is not JSON ({e}): {}", self.body))
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config.enrichment.auto_enrich = false;
    config.fetch.timeout_secs = 5;
    config
}

pub fn test_state(config: Config) -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    let state = AppState::new(pool, config).expect("Failed to build state");
    (state, dir)
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let (state, dir) = test_state(config);
        Self::from_state(state, dir)
    }

    pub fn from_state(state: AppState, dir: TempDir) -> Self {
        Self {
            router: routes::build_router(state.clone()),
            state,
            _dir: dir,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            set_cookie,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, cookie, None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, cookie, Some(body)).await
    }

    /// Register a user and return the `name=value` cookie for later requests.
    pub async fn register(&self, username: &str) -> String {
        let response = self
            .post(
                "/api/auth/register",
                None,
                serde_json::json!({ "username": username, "password": "correct horse" }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        session_pair(&response)
    }

    /// Create a post for an address nothing listens on, so ingestion falls back.
    pub async fn create_post(&self, cookie: &str, categories: &[&str]) -> Value {
        let response = self
            .post(
                "/api/posts",
                Some(cookie),
                serde_json::json!({ "url": "http://127.0.0.1:9/unreachable", "categories": categories }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.json()
    }
}

/// The `name=value` part of a `Set-Cookie` header.
pub fn session_pair(response: &TestResponse) -> String {
    response
        .set_cookie
        .as_deref()
        .and_then(|c| c.split(';').next())
        .expect("No session cookie returned")
        .to_string()
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
