//! Built-in status tool server
//!
//! Small HTTP app registered by the binary next to the real tool servers:
//! a liveness probe, the endpoint directory and read access to the live
//! configuration.

use std::sync::{Arc, RwLock};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;

use crate::config::ConfigStore;
use crate::lifecycle::ServerEndpoint;

/// Leaf names whose values are never returned verbatim
const SENSITIVE_MARKERS: &[&str] = &["key", "token", "secret", "password"];

/// Endpoint list shared with the status app.
///
/// The binary publishes the manager's endpoints once registration is done.
#[derive(Debug, Clone, Default)]
pub struct EndpointDirectory {
    endpoints: Arc<RwLock<Vec<ServerEndpoint>>>,
}

impl EndpointDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, endpoints: Vec<ServerEndpoint>) {
        match self.endpoints.write() {
            Ok(mut guard) => *guard = endpoints,
            Err(poisoned) => *poisoned.into_inner() = endpoints,
        }
    }

    pub fn list(&self) -> Vec<ServerEndpoint> {
        match self.endpoints.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[derive(Clone)]
struct StatusState {
    store: ConfigStore,
    directory: EndpointDirectory,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Build the status app
pub fn router(store: ConfigStore, directory: EndpointDirectory) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/servers", get(list_servers))
        .route("/config/:key", get(get_config))
        .with_state(StatusState { store, directory })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn list_servers(State(state): State<StatusState>) -> Json<Vec<ServerEndpoint>> {
    Json(state.directory.list())
}

async fn get_config(
    State(state): State<StatusState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get_value(&key) {
        Some(value) => {
            let leaf = key.rsplit('.').next().unwrap_or(&key);
            Ok(Json(redact(leaf, value)))
        }
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("config key '{}' not found", key),
            }),
        )),
    }
}

fn is_sensitive(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|marker| name.contains(marker))
}

fn redact(name: &str, value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = redact(&k, v);
                    (k, v)
                })
                .collect(),
        ),
        Value::Null => Value::Null,
        _ if is_sensitive(name) => Value::String("***".to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_nested_secrets() {
        let value = json!({
            "api_key": "sk-123",
            "model": "gpt-4",
            "auth": {"Token": "abc", "user": "astra"}
        });
        assert_eq!(
            redact("api", value),
            json!({
                "api_key": "***",
                "model": "gpt-4",
                "auth": {"Token": "***", "user": "astra"}
            })
        );
        assert_eq!(redact("password", json!("hunter2")), json!("***"));
        assert_eq!(redact("port", json!(9000)), json!(9000));
    }

    #[tokio::test]
    async fn test_status_routes() {
        let store = ConfigStore::new();
        store.set("AstraCore.api.model", "gpt-4").unwrap();
        store.set("AstraCore.api.api_key", "sk-123").unwrap();

        let directory = EndpointDirectory::new();
        directory.publish(vec![ServerEndpoint {
            name: "weather".into(),
            host: "127.0.0.1".into(),
            port: 9001,
        }]);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = router(store.clone(), directory);
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let health: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health, json!({"status": "ok"}));

        let servers: Vec<ServerEndpoint> = reqwest::get(format!("{}/servers", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "weather");

        let model: Value = reqwest::get(format!("{}/config/AstraCore.api.model", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(model, json!("gpt-4"));

        // Reads see in-memory overrides immediately
        store.set("AstraCore.api.model", "gpt-4o").unwrap();
        let model: Value = reqwest::get(format!("{}/config/AstraCore.api.model", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(model, json!("gpt-4o"));

        let key: Value = reqwest::get(format!("{}/config/AstraCore.api.api_key", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(key, json!("***"));

        let missing = reqwest::get(format!("{}/config/no.such.key", base))
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        server.abort();
    }
}
