//! Test utilities for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, body::Body, http::Request};
use serde_json::json;
use tempfile::TempDir;

use neae::api::{AppState, app};
use neae::core::AppConfig;
use neae::keys::{KeyStore, UserKeyRecord};

pub const GEMINI_MODEL: &str = "gemini-test";
pub const GEMINI_PATH: &str = "/v1beta/models/gemini-test:generateContent";

/// A running app plus the files backing it. The temp directory is
/// removed when this is dropped so keep it alive for the whole test.
pub struct TestApp {
    pub router: Router,
    pub keys_path: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    /// Read the key file the way an operator would see it on disk.
    pub fn stored_key(&self, key: &str) -> UserKeyRecord {
        let keys = KeyStore::load(&self.keys_path, 100).unwrap();
        keys.get(key).unwrap().clone()
    }
}

/// Creates a test application router backed by a temporary key file,
/// prompt and static directory. `keys_json` is written as the key
/// file. When `gemini_url` is `None` no model is configured.
///
/// Tests sharing a mockito server should be marked `#[serial]`.
pub fn test_app(keys_json: &str, gemini_url: Option<&str>) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let keys_path = dir.path().join("user_keys.json");
    fs::write(&keys_path, keys_json).expect("Failed to write key file");

    let prompt_path = dir.path().join("prompt.txt");
    fs::write(&prompt_path, "Eres un asistente para docentes.").unwrap();

    let static_dir = dir.path().join("static");
    fs::create_dir_all(&static_dir).unwrap();
    fs::write(
        static_dir.join("index.html"),
        "<html><body>Asistente NEAE</body></html>",
    )
    .unwrap();

    let config = AppConfig {
        keys_path: keys_path.display().to_string(),
        prompt_path: prompt_path.display().to_string(),
        static_dir: static_dir.display().to_string(),
        gemini_api_hostname: gemini_url.unwrap_or("http://localhost:1").to_string(),
        gemini_api_key: gemini_url.map(|_| String::from("test-api-key")),
        gemini_model: String::from(GEMINI_MODEL),
        search_grounding: true,
        model_timeout_secs: 5,
        max_sessions: 50,
        default_max_uses: 100,
        secure_cookies: false,
        greeting: String::from("Hola, sesión iniciada."),
    };

    let state = AppState::from_config(config).expect("Failed to build app state");
    TestApp {
        router: app(Arc::new(state)),
        keys_path,
        _dir: dir,
    }
}

/// A Gemini response body with a single text candidate.
pub fn gemini_reply(text: &str) -> String {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
    .to_string()
}

/// `Cookie` header value for the given key.
pub fn auth_cookie(key: &str) -> String {
    format!("auth_key={}", key)
}

pub fn json_request(uri: &str, key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("cookie", auth_cookie(key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_to_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_to_string(body).await).unwrap()
}
