//! Household config HTTP API
//!
//! Serves the household document to the phone/web front end, accepts the
//! manual departure trigger and exposes health and counters.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::infra::store::HouseholdStore;
use crate::services::trigger_gate::ManualTrigger;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shared handles for request handlers
pub struct ApiState {
    pub store: Arc<HouseholdStore>,
    pub manual: ManualTrigger,
    pub metrics: Arc<Metrics>,
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn respond_json(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    respond(status, "application/json", body.to_string())
}

fn write_counter(output: &mut String, name: &str, help: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name} {val}");
}

fn write_gauge(output: &mut String, name: &str, help: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name} {val}");
}

/// Counters in Prometheus text exposition format
fn format_metrics(summary: &MetricsSummary) -> String {
    let counters = [
        ("departure_cycles_total", "Monitor cycles started", summary.cycles_total),
        ("departure_triggers_manual_total", "Manual triggers consumed", summary.triggers_manual),
        ("departure_triggers_motion_total", "PIR triggers observed", summary.triggers_motion),
        ("departure_exits_total", "Confirmed departures", summary.exits_confirmed),
        (
            "departure_exits_rejected_total",
            "Triggers without a confirmed departure",
            summary.exits_not_confirmed,
        ),
        ("departure_camera_errors_total", "Camera failures", summary.camera_errors),
        ("departure_items_checked_total", "Item probes run", summary.items_checked),
        (
            "departure_items_forgotten_total",
            "Items judged still at home",
            summary.items_still_present,
        ),
        ("departure_notify_sent_total", "Reminders sent", summary.notifications_sent),
        (
            "departure_notify_failed_total",
            "Reminder pushes that failed",
            summary.notifications_failed,
        ),
        (
            "departure_notify_throttled_total",
            "Reminders suppressed by the minimum interval",
            summary.notifications_throttled,
        ),
        (
            "departure_notify_skipped_total",
            "Reminders skipped for missing credentials",
            summary.notifications_skipped,
        ),
        ("departure_cycle_faults_total", "Cycles that failed", summary.cycle_faults),
    ];

    let mut output = String::with_capacity(2048);
    for (name, help, val) in counters {
        write_counter(&mut output, name, help, val);
    }
    write_gauge(
        &mut output,
        "departure_last_confirm_ms",
        "Duration of the last exit confirmation",
        summary.last_confirm_ms,
    );
    write_gauge(&mut output, "departure_uptime_seconds", "Process uptime", summary.uptime_secs);
    output
}

/// Route one request. Split from the hyper service so tests can call it
/// without a socket.
pub async fn route(
    method: &Method,
    path: &str,
    body: Bytes,
    state: &ApiState,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/api/data") => {
            let store = state.store.clone();
            match tokio::task::spawn_blocking(move || store.snapshot()).await {
                Ok(household) => match serde_json::to_value(&household) {
                    Ok(value) => respond_json(StatusCode::OK, value),
                    Err(e) => error_response(e.to_string()),
                },
                Err(e) => error_response(e.to_string()),
            }
        }
        (&Method::POST, "/api/data") => {
            let store = state.store.clone();
            match tokio::task::spawn_blocking(move || store.save_json(&body)).await {
                Ok(Ok(household)) => {
                    info!(items = %household.items.len(), "api_household_saved");
                    respond_json(StatusCode::OK, json!({ "status": "success" }))
                }
                Ok(Err(e)) => {
                    warn!(error = %format!("{e:#}"), "api_household_rejected");
                    error_response(format!("{e:#}"))
                }
                Err(e) => error_response(e.to_string()),
            }
        }
        (&Method::POST, "/api/trigger") => {
            state.manual.request();
            info!("api_manual_trigger");
            respond_json(StatusCode::OK, json!({ "status": "triggered" }))
        }
        (&Method::OPTIONS, "/api/data") | (&Method::OPTIONS, "/api/trigger") => {
            let mut response = respond(StatusCode::OK, "text/plain", "");
            let headers = response.headers_mut();
            headers.insert(
                hyper::header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            );
            headers.insert(
                hyper::header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type"),
            );
            response
        }
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        (&Method::GET, "/metrics") => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_metrics(&state.metrics.report()),
        ),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    }
}

fn error_response(msg: String) -> Response<Full<Bytes>> {
    respond_json(StatusCode::INTERNAL_SERVER_ERROR, json!({ "status": "error", "msg": msg }))
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<ApiState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "api_body_read_failed");
            return Ok(respond(StatusCode::BAD_REQUEST, "text/plain", "Bad Request"));
        }
    };
    Ok(route(&parts.method, parts.uri.path(), body, &state).await)
}

/// Start the config API server
pub async fn start_api_server(
    bind_address: &str,
    port: u16,
    state: Arc<ApiState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "http_api_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_api_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_api_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("http_api_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::household::HouseholdConfig;
    use tempfile::TempDir;

    fn state() -> (ApiState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = ApiState {
            store: Arc::new(HouseholdStore::new(dir.path().join("data.json"))),
            manual: ManualTrigger::new(),
            metrics: Arc::new(Metrics::new()),
        };
        (state, dir)
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_data_returns_default_document() {
        let (state, _dir) = state();
        let response = route(&Method::GET, "/api/data", Bytes::new(), &state).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["system_enabled"], true);
        assert_eq!(body["items"], json!([]));
        assert_eq!(body["line_token"], "");
    }

    #[tokio::test]
    async fn test_post_data_replaces_document() {
        let (state, _dir) = state();
        let doc = r#"{"system_enabled":false,"items":[{"name":"keys","mac":"","enabled":true}],
            "line_token":"t","line_user_id":"u"}"#;

        let response = route(&Method::POST, "/api/data", Bytes::from(doc), &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "success" }));

        let saved: HouseholdConfig = state.store.snapshot();
        assert!(!saved.system_enabled);
        assert_eq!(saved.items[0].name, "keys");
        assert_eq!(saved.items[0].end_time, "23:59");
    }

    #[tokio::test]
    async fn test_post_invalid_json_is_500() {
        let (state, _dir) = state();
        let response = route(&Method::POST, "/api/data", Bytes::from("{not json"), &state).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["msg"].as_str().unwrap().contains("Invalid household JSON"));
    }

    #[tokio::test]
    async fn test_trigger_sets_manual_flag() {
        let (state, _dir) = state();
        let response = route(&Method::POST, "/api/trigger", Bytes::new(), &state).await;
        assert_eq!(body_json(response).await, json!({ "status": "triggered" }));
        assert!(state.manual.is_pending());
    }

    #[tokio::test]
    async fn test_health_metrics_and_unknown_routes() {
        let (state, _dir) = state();
        state.metrics.record_cycle();

        let health = route(&Method::GET, "/health", Bytes::new(), &state).await;
        assert_eq!(health.status(), StatusCode::OK);

        let metrics = route(&Method::GET, "/metrics", Bytes::new(), &state).await;
        let text = metrics.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(text.to_vec()).unwrap();
        assert!(text.contains("departure_cycles_total 1"));

        let missing = route(&Method::GET, "/api/nope", Bytes::new(), &state).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let wrong_method = route(&Method::GET, "/api/trigger", Bytes::new(), &state).await;
        assert_eq!(wrong_method.status(), StatusCode::NOT_FOUND);
    }
}
