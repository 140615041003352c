use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::services::AppState;

pub mod sessions;
pub mod sse;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let questions = check_dependency(state.sessions.question_source().ping()).await;
    dependencies.insert("questions".to_string(), json!(questions));

    for store in state.sessions.stores().all() {
        let health = check_dependency(store.ping()).await;
        dependencies.insert(format!("results_{}", store.name()), json!(health));
    }

    let all_healthy = dependencies
        .values()
        .all(|dep| dep.get("status").and_then(|v| v.as_str()) == Some("healthy"));
    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "assessment-api",
            "version": env!("CARGO_PKG_VERSION"),
            "active_sessions": state.sessions.active_count(),
            "dependencies": dependencies
        })),
    )
}

async fn check_dependency<F>(check: F) -> serde_json::Map<String, serde_json::Value>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let mut result = serde_json::Map::new();

    match tokio::time::timeout(PROBE_TIMEOUT, check).await {
        Ok(Ok(())) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{:#}", e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert(
                "error".to_string(),
                json!(format!("timeout after {}ms", PROBE_TIMEOUT.as_millis())),
            );
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}
