//! Mock profile endpoint for integration tests.
//!
//! Serves a mutable JSON profile at `/api/profile` to requests carrying the
//! expected bearer token, and counts every request.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct Profile {
    token: String,
    body: Arc<Mutex<serde_json::Value>>,
    failing: Arc<Mutex<bool>>,
    hits: Arc<AtomicU32>,
}

/// A mock profile server.
pub struct MockRestServer {
    url: String,
    profile: Profile,
}

impl MockRestServer {
    /// Start serving `body` to requests authenticated with `token`.
    pub async fn start(token: &str, body: serde_json::Value) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let profile = Profile {
            token: token.to_string(),
            body: Arc::new(Mutex::new(body)),
            failing: Arc::new(Mutex::new(false)),
            hits: Arc::new(AtomicU32::new(0)),
        };

        let app = Router::new()
            .route("/api/profile", get(serve_profile))
            .with_state(profile.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{addr}/api/profile"),
            profile,
        }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Replace the served profile.
    pub fn set_profile(&self, body: serde_json::Value) {
        *self.profile.body.lock().unwrap() = body;
    }

    /// Answer every request with 503 while `failing`.
    pub fn set_failing(&self, failing: bool) {
        *self.profile.failing.lock().unwrap() = failing;
    }

    pub fn hits(&self) -> u32 {
        self.profile.hits.load(Ordering::SeqCst)
    }
}

async fn serve_profile(State(profile): State<Profile>, headers: HeaderMap) -> (StatusCode, String) {
    profile.hits.fetch_add(1, Ordering::SeqCst);

    if *profile.failing.lock().unwrap() {
        return (StatusCode::SERVICE_UNAVAILABLE, "unavailable".to_string());
    }
    let expected = format!("Bearer {}", profile.token);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => {
            (StatusCode::OK, profile.body.lock().unwrap().to_string())
        }
        _ => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
    }
}
