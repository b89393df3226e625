use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::commands::{CheckWakeReport, ProbeVerdict, StatusReport, Target, WakeReport};
use crate::engine::Monitor;
use crate::error::CommandError;
use crate::utils::{format_uptime, system_uptime};

type AppState = Arc<Monitor>;

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let status = match self {
            CommandError::UnknownHost(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
struct WakeView {
    host: String,
    mac_address: String,
    sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<WakeReport> for WakeView {
    fn from(report: WakeReport) -> Self {
        Self {
            host: report.host,
            mac_address: report.mac_address,
            sent: report.result.is_ok(),
            error: report.result.err().map(|e| e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct CheckWakeView {
    host: String,
    verdict: ProbeVerdict,
    woken: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<CheckWakeReport> for CheckWakeView {
    fn from(report: CheckWakeReport) -> Self {
        let (woken, error) = match report.wake {
            None => (false, None),
            Some(Ok(())) => (true, None),
            Some(Err(e)) => (false, Some(e.to_string())),
        };
        Self { host: report.host, verdict: report.verdict, woken, error }
    }
}

async fn status_all(State(monitor): State<AppState>) -> Result<Json<Vec<StatusReport>>, CommandError> {
    Ok(Json(monitor.status(&Target::All).await?))
}

async fn status_one(
    State(monitor): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<StatusReport>>, CommandError> {
    Ok(Json(monitor.status(&Target::from_arg(Some(&name))).await?))
}

async fn wake(monitor: &Monitor, target: Target) -> Result<Json<Vec<WakeView>>, CommandError> {
    let reports = monitor.wake(&target).await?;
    Ok(Json(reports.into_iter().map(WakeView::from).collect()))
}

async fn wake_all(State(monitor): State<AppState>) -> Result<Json<Vec<WakeView>>, CommandError> {
    wake(&monitor, Target::All).await
}

async fn wake_one(
    State(monitor): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<WakeView>>, CommandError> {
    wake(&monitor, Target::from_arg(Some(&name))).await
}

async fn check_wake(monitor: &Monitor, target: Target) -> Result<Json<Vec<CheckWakeView>>, CommandError> {
    let reports = monitor.check_and_wake(&target).await?;
    Ok(Json(reports.into_iter().map(CheckWakeView::from).collect()))
}

async fn check_wake_all(State(monitor): State<AppState>) -> Result<Json<Vec<CheckWakeView>>, CommandError> {
    check_wake(&monitor, Target::All).await
}

async fn check_wake_one(
    State(monitor): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<CheckWakeView>>, CommandError> {
    check_wake(&monitor, Target::from_arg(Some(&name))).await
}

async fn uptime() -> Json<serde_json::Value> {
    let uptime = system_uptime();
    Json(json!({
        "uptime": format_uptime(uptime),
        "seconds": uptime.map(|d| d.as_secs()),
    }))
}

pub fn create_router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/api/status", get(status_all))
        .route("/api/status/{name}", get(status_one))
        .route("/api/wake", post(wake_all))
        .route("/api/wake/{name}", post(wake_one))
        .route("/api/checkwake", post(check_wake_all))
        .route("/api/checkwake/{name}", post(check_wake_one))
        .route("/api/uptime", get(uptime))
        .layer(TraceLayer::new_for_http())
        .with_state(monitor)
}

pub async fn start_server(addr: SocketAddr, monitor: Arc<Monitor>) -> anyhow::Result<()> {
    let app = create_router(monitor);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Command API: http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{monitor_with, test_config, ScriptedProber, H1, H2};
    use crate::wol::MagicPacketSender;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn app() -> (Router, Arc<Monitor>) {
        let prober = Arc::new(ScriptedProber::default().with(H1, &[true]).with(H2, &[false]));
        let (monitor, _) = monitor_with(test_config(), prober, MagicPacketSender::default());
        (create_router(monitor.clone()), monitor)
    }

    #[tokio::test]
    async fn status_lists_every_host() {
        let (app, monitor) = app();
        monitor.sweep().await;

        let (status, body) = call(app, "GET", "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        let statuses: Vec<_> = body.as_array().unwrap().iter().map(|r| r["status"].clone()).collect();
        assert_eq!(statuses, vec!["up", "down", "no_ip"]);
        assert_eq!(body[0]["ip"], "10.0.0.1");
        assert_eq!(body[0]["check_count"], 1);
    }

    #[tokio::test]
    async fn single_host_status_is_case_insensitive() {
        let (app, _) = app();
        let (status, body) = call(app, "GET", "/api/status/NAS").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["host"], "nas");
        assert_eq!(body[0]["status"], "no_ip");
    }

    #[tokio::test]
    async fn unknown_host_is_not_found() {
        let (app, _) = app();
        let (status, body) = call(app, "POST", "/api/wake/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "server 'ghost' not found in configuration");
    }

    #[tokio::test]
    async fn uptime_endpoint_responds() {
        let (app, _) = app();
        let (status, body) = call(app, "GET", "/api/uptime").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["uptime"].is_string());
    }
}
