//! Administrative HTTP surface.
//!
//! Consumed by operational tooling, not by signaling peers:
//!
//! - `POST /rooms` - pre-create a room before any participant connects
//! - `GET /rooms/{roomId}` - room + participant summary
//! - `GET /stats` - aggregate counts for monitoring
//!
//! Every endpoint requires a bearer token whose verified role is in the
//! configured admin-role set. Health probes live in
//! [`crate::observability`] and are unauthenticated.

use crate::auth::VerifiedIdentity;
use crate::connection::ws_handler;
use crate::errors::SignalingError;
use crate::protocol::ParticipantSummary;
use crate::state::AppState;
use crate::store::{RoomKind, RoomStatus};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build the administrative router.
pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/:room_id", get(get_room))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Build the full application router: signaling WebSocket plus the
/// administrative surface. Health and metrics routes are merged in by the
/// binary so tests can assemble exactly what they need.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone())
        .merge(admin_router(state))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest {
    session_id: String,
    #[serde(default)]
    kind: Option<RoomKind>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomResponse {
    room_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomSummary {
    room_id: String,
    session_id: String,
    kind: RoomKind,
    status: RoomStatus,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
    max_participants: usize,
    participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    active_rooms: usize,
    connected_participants: usize,
    open_connections: u64,
    messages_routed: u64,
    deliveries_dropped: u64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

fn error_response(e: &SignalingError) -> Response {
    (
        e.http_status(),
        Json(ErrorBody {
            code: e.error_code().to_string(),
            message: e.client_message(),
        }),
    )
        .into_response()
}

/// Verify the bearer token and gate on the admin-role set.
async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<VerifiedIdentity, SignalingError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| SignalingError::Unauthenticated("missing bearer token".to_string()))?;

    let identity = state.verifier.verify(token).await?;

    if !state.admin_roles.iter().any(|role| role == &identity.role) {
        return Err(SignalingError::Forbidden);
    }

    Ok(identity)
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRoomRequest>,
) -> Response {
    if let Err(e) = authorize(&state, &headers).await {
        return error_response(&e);
    }

    let room = state
        .lifecycle
        .create_room(&request.session_id, request.kind.unwrap_or_default());

    (
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room_id: room.id,
            created_at: room.created_at,
        }),
    )
        .into_response()
}

async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = authorize(&state, &headers).await {
        return error_response(&e);
    }

    match state.store.get_room(&room_id).await {
        Some(record) => Json(RoomSummary {
            room_id: record.room.id,
            session_id: record.room.session_id,
            kind: record.room.kind,
            status: record.room.status,
            created_at: record.room.created_at,
            ended_at: record.room.ended_at,
            max_participants: record.room.max_participants,
            participants: record
                .participants
                .iter()
                .map(ParticipantSummary::from)
                .collect(),
        })
        .into_response(),
        None => error_response(&SignalingError::RoomNotFound),
    }
}

async fn stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers).await {
        return error_response(&e);
    }

    let snapshot = state.stats.snapshot();
    Json(StatsResponse {
        active_rooms: state.store.active_room_count(),
        connected_participants: state.store.live_participant_count(),
        open_connections: snapshot.connections_open,
        messages_routed: snapshot.messages_routed,
        deliveries_dropped: snapshot.deliveries_dropped,
    })
    .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::auth::StaticVerifier;
    use crate::lifecycle::RoomLifecycleManager;
    use crate::observability::CoreStats;
    use crate::registry::ConnectionRegistry;
    use crate::router::SignalingRouter;
    use crate::store::RoomStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let stats = Arc::new(CoreStats::new());
        let store = Arc::new(RoomStore::new(4, Duration::from_secs(14400), None));
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&stats)));
        let router = Arc::new(SignalingRouter::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&stats),
        ));
        let lifecycle = Arc::new(RoomLifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&stats),
            Duration::from_secs(60),
            CancellationToken::new(),
        ));
        let verifier = StaticVerifier::new()
            .with_token("tok-clinician", "dr-house", "clinician")
            .with_token("tok-patient", "pat-1", "patient");

        AppState {
            store,
            registry,
            router,
            lifecycle,
            verifier: Arc::new(verifier),
            stats,
            idle_timeout: Duration::from_secs(300),
            admin_roles: Arc::new(vec!["clinician".to_string(), "admin".to_string()]),
            shutdown: CancellationToken::new(),
        }
    }

    fn post_rooms(token: Option<&str>, body: &str) -> Request<Body> {
        let builder = Request::builder()
            .method("POST")
            .uri("/rooms")
            .header("content-type", "application/json");
        let builder = match token {
            Some(t) => builder.header("authorization", format!("Bearer {t}")),
            None => builder,
        };
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_create_room_requires_token() {
        let app = admin_router(test_state());

        let response = app
            .oneshot(post_rooms(None, r#"{"sessionId":"s-1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_room_rejects_non_admin_role() {
        let app = admin_router(test_state());

        let response = app
            .oneshot(post_rooms(Some("tok-patient"), r#"{"sessionId":"s-1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_then_fetch_room() {
        let state = test_state();
        let app = admin_router(state.clone());

        let response = app
            .clone()
            .oneshot(post_rooms(
                Some("tok-clinician"),
                r#"{"sessionId":"s-1","kind":"emergency"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let room_id = created["roomId"].as_str().unwrap().to_string();
        assert!(created["createdAt"].is_string());

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/rooms/{room_id}"))
                    .header("authorization", "Bearer tok-clinician")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let summary: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary["sessionId"], "s-1");
        assert_eq!(summary["kind"], "emergency");
        assert_eq!(summary["status"], "active");
        assert_eq!(summary["participants"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_missing_room_is_404() {
        let app = admin_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/rooms/nope")
                    .header("authorization", "Bearer tok-clinician")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_shape() {
        let state = test_state();
        state.lifecycle.create_room("s-1", RoomKind::Consultation);
        let app = admin_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .header("authorization", "Bearer tok-clinician")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["activeRooms"], 1);
        assert_eq!(stats["connectedParticipants"], 0);
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let app = app_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // Plain GET without the upgrade handshake is refused
        assert_ne!(response.status(), StatusCode::OK);
    }
}
