//! Signaling controller error types.
//!
//! Errors carry a stable wire code (sent to clients in `error` frames and as
//! the `code` field of admin error bodies) and a client-safe message.
//! Internal details (storage failures, configuration problems) are logged
//! server-side and never exposed.

use axum::http::StatusCode;
use thiserror::Error;

/// Signaling controller error type.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// No or invalid identity claim; the connection or request is refused.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The room does not exist in the cache or the durable store.
    #[error("Room not found")]
    RoomNotFound,

    /// The room has ended; it is never reactivated.
    #[error("Room closed")]
    RoomClosed,

    /// The room is at its participant bound.
    #[error("Room full")]
    RoomFull,

    /// The sending connection is not a current participant of the target room.
    #[error("Not a participant of the target room")]
    NotAParticipant,

    /// The caller's role is not allowed on this surface.
    #[error("Forbidden")]
    Forbidden,

    /// Durable store operation failed. Swallowed inside the room store;
    /// surfaces only from explicit persistence calls.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Stable wire code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SignalingError::Unauthenticated(_) => "UNAUTHENTICATED",
            SignalingError::RoomNotFound => "ROOM_NOT_FOUND",
            SignalingError::RoomClosed => "ROOM_CLOSED",
            SignalingError::RoomFull => "ROOM_FULL",
            SignalingError::NotAParticipant => "NOT_A_PARTICIPANT",
            SignalingError::Forbidden => "FORBIDDEN",
            SignalingError::Storage(_) | SignalingError::Config(_) | SignalingError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Client-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalingError::Unauthenticated(_) => "Authentication required".to_string(),
            SignalingError::RoomNotFound => "Room not found".to_string(),
            SignalingError::RoomClosed => "Room has ended".to_string(),
            SignalingError::RoomFull => "Room is at capacity".to_string(),
            SignalingError::NotAParticipant => {
                "You are not a participant of this room".to_string()
            }
            SignalingError::Forbidden => "Not allowed for your role".to_string(),
            SignalingError::Storage(_) | SignalingError::Config(_) | SignalingError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// HTTP status for the administrative surface.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self {
            SignalingError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            SignalingError::Forbidden => StatusCode::FORBIDDEN,
            SignalingError::RoomNotFound => StatusCode::NOT_FOUND,
            SignalingError::RoomClosed => StatusCode::GONE,
            SignalingError::RoomFull | SignalingError::NotAParticipant => StatusCode::CONFLICT,
            SignalingError::Storage(_) | SignalingError::Config(_) | SignalingError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            SignalingError::Unauthenticated("no token".to_string()).error_code(),
            "UNAUTHENTICATED"
        );
        assert_eq!(SignalingError::RoomNotFound.error_code(), "ROOM_NOT_FOUND");
        assert_eq!(SignalingError::RoomClosed.error_code(), "ROOM_CLOSED");
        assert_eq!(SignalingError::RoomFull.error_code(), "ROOM_FULL");
        assert_eq!(
            SignalingError::NotAParticipant.error_code(),
            "NOT_A_PARTICIPANT"
        );

        // Internal family collapses to one code
        assert_eq!(
            SignalingError::Storage("conn refused".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
        assert_eq!(
            SignalingError::Config("missing var".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
        assert_eq!(
            SignalingError::Internal("oops".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let storage = SignalingError::Storage("connection refused at 10.0.0.4:6379".to_string());
        assert!(!storage.client_message().contains("10.0.0.4"));
        assert_eq!(storage.client_message(), "An internal error occurred");

        let config = SignalingError::Config("SC_TOKEN_SECRET unset".to_string());
        assert!(!config.client_message().contains("SC_TOKEN_SECRET"));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            SignalingError::Unauthenticated("x".to_string()).http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SignalingError::RoomNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(SignalingError::RoomClosed.http_status(), StatusCode::GONE);
        assert_eq!(SignalingError::RoomFull.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            SignalingError::Storage("x".to_string()).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
