//! Loopback HTTP control surface
//!
//! Three endpoints over plain HTTP on the loopback interface: status,
//! pairing code, and stop. Everything served here is read from the
//! supervisor's watch channel; the control surface holds no state of its
//! own and no route can mutate the connection. Stop acknowledges first and
//! cancels the process-wide shutdown token after a short grace period so
//! the response gets out before the process exits.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use herald_core::config::ControlConfig;
use herald_core::errors::ControlError;
use herald_core::types::{BoundUser, StatusSnapshot};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

// ----------------------------------------------------------------------------
// Control State
// ----------------------------------------------------------------------------

/// Shared state for all control routes.
#[derive(Clone)]
pub struct ControlState {
    status: watch::Receiver<StatusSnapshot>,
    stop: CancellationToken,
    stop_grace: Duration,
}

impl ControlState {
    pub fn new(
        status: watch::Receiver<StatusSnapshot>,
        stop: CancellationToken,
        config: &ControlConfig,
    ) -> Self {
        Self {
            status,
            stop,
            stop_grace: config.stop_grace(),
        }
    }
}

// ----------------------------------------------------------------------------
// Wire Types
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    jid: String,
    name: Option<String>,
}

impl From<&BoundUser> for UserDto {
    fn from(user: &BoundUser) -> Self {
        Self {
            jid: user.jid.as_str().to_string(),
            name: user.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusDto {
    instance_id: String,
    status: String,
    pairing_code: Option<String>,
    phone_number: Option<String>,
    user: Option<UserDto>,
}

impl From<&StatusSnapshot> for StatusDto {
    fn from(snapshot: &StatusSnapshot) -> Self {
        Self {
            instance_id: snapshot.instance_id.to_string(),
            status: snapshot.state.to_string(),
            pairing_code: snapshot.pairing_code.clone(),
            phone_number: snapshot.phone_number.clone(),
            user: snapshot.user.as_ref().map(UserDto::from),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PairingDto {
    pairing_code: Option<String>,
    status: String,
}

// ----------------------------------------------------------------------------
// Routes
// ----------------------------------------------------------------------------

async fn get_status(State(state): State<ControlState>) -> Response {
    let snapshot = state.status.borrow().clone();
    Json(StatusDto::from(&snapshot)).into_response()
}

async fn get_pairing_code(State(state): State<ControlState>) -> Response {
    let snapshot = state.status.borrow().clone();
    Json(PairingDto {
        pairing_code: snapshot.pairing_code.clone(),
        status: snapshot.state.to_string(),
    })
    .into_response()
}

/// Acknowledge, then cancel the shutdown token once the response has had
/// time to flush.
async fn stop_instance(State(state): State<ControlState>) -> Response {
    info!("stop requested over control surface");
    let stop = state.stop.clone();
    let grace = state.stop_grace;
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        stop.cancel();
    });
    Json(serde_json::json!({ "status": "stopping" })).into_response()
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
        .into_response()
}

/// Build the control router.
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/pairing-code", get(get_pairing_code))
        // Accepted under any method; local managers use GET and POST
        // interchangeably.
        .route("/stop", any(stop_instance))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

/// Bind the loopback listener and serve until the shutdown token fires.
pub async fn serve(
    port: u16,
    state: ControlState,
    shutdown: CancellationToken,
) -> Result<(), ControlError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "control surface listening");

    let app = router(state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = result {
        warn!(error = %e, "control surface stopped with error");
        return Err(ControlError::Io(e));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use herald_core::types::{ConnectionState, InstanceId, InstanceIdentity, Jid};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot::initial(&InstanceIdentity {
            instance_id: InstanceId::new("bot-1"),
            phone_number: Some("15551234567".to_string()),
            control_port: 3001,
        })
    }

    fn test_router(
        initial: StatusSnapshot,
        stop: CancellationToken,
    ) -> (Router, watch::Sender<StatusSnapshot>) {
        let (tx, rx) = watch::channel(initial);
        let state = ControlState::new(rx, stop, &ControlConfig { stop_grace_ms: 10 });
        (router(state), tx)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn status_reports_the_current_snapshot() {
        let (app, _tx) = test_router(snapshot(), CancellationToken::new());
        let (code, body) = get_json(app, "/status").await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["instanceId"], "bot-1");
        assert_eq!(body["status"], "disconnected");
        assert_eq!(body["phoneNumber"], "15551234567");
        assert!(body["pairingCode"].is_null());
        assert!(body["user"].is_null());
    }

    #[tokio::test]
    async fn status_tracks_supervisor_updates() {
        let (app, tx) = test_router(snapshot(), CancellationToken::new());
        tx.send_modify(|s| {
            s.state = ConnectionState::Connected;
            s.user = Some(BoundUser {
                jid: Jid::normalize("15551234567"),
                name: Some("Herald".to_string()),
            });
        });

        let (_, body) = get_json(app, "/status").await;
        assert_eq!(body["status"], "connected");
        assert_eq!(body["user"]["jid"], "15551234567@s.whatsapp.net");
        assert_eq!(body["user"]["name"], "Herald");
    }

    #[tokio::test]
    async fn pairing_code_route_exposes_the_code() {
        let (app, tx) = test_router(snapshot(), CancellationToken::new());
        tx.send_modify(|s| {
            s.state = ConnectionState::Pairing;
            s.pairing_code = Some("ABCD-1234-EFGH".to_string());
        });

        let (_, body) = get_json(app, "/pairing-code").await;
        assert_eq!(body["pairingCode"], "ABCD-1234-EFGH");
        assert_eq!(body["status"], "pairing");
    }

    #[tokio::test]
    async fn stop_acknowledges_then_cancels() {
        let stop = CancellationToken::new();
        let (app, _tx) = test_router(snapshot(), stop.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // Token is still live when the ack goes out.
        assert!(!stop.is_cancelled());

        stop.cancelled().await;
    }

    #[tokio::test]
    async fn unknown_routes_return_json_404() {
        let (app, _tx) = test_router(snapshot(), CancellationToken::new());
        let (code, body) = get_json(app, "/nope").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found");
    }
}
