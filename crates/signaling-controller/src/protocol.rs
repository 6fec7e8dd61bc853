//! Wire protocol for the signaling WebSocket.
//!
//! Frames are JSON text messages tagged by `type` (kebab-case), with
//! camelCase fields. Negotiation and relay payloads are opaque JSON values:
//! they are forwarded verbatim and never inspected or transformed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Participant, ParticipantStatus};

/// Frames a client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Identity claim; must be the first frame on every connection.
    Authenticate { token: String },

    /// Join a room (created lazily on first join of an unseen id).
    #[serde(rename_all = "camelCase")]
    Join { room_id: String, role: String },

    /// Leave a room. No reply; peers receive `peer-left`.
    #[serde(rename_all = "camelCase")]
    Leave { room_id: String },

    /// Media negotiation offer, relayed verbatim.
    NegotiationOffer(SignalBody),

    /// Media negotiation answer, relayed verbatim.
    NegotiationAnswer(SignalBody),

    /// Transport candidate, relayed verbatim.
    NegotiationCandidate(SignalBody),

    /// Application payload (chat, media-state toggles, ...), relayed verbatim.
    RelayPayload(SignalBody),

    /// Liveness check; answered with `pong` and counted as activity.
    Ping,
}

/// Common body of client-sent signal frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBody {
    pub room_id: String,
    /// Target participant; absent means broadcast to the rest of the room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_participant_id: Option<String>,
    /// Opaque payload; never interpreted by the controller.
    #[serde(default)]
    pub payload: Value,
}

/// Frames the server sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Identity claim accepted.
    #[serde(rename_all = "camelCase")]
    Authenticated { user_id: String, role: String },

    /// Join accepted; `participants` lists the existing peers so the joiner
    /// can initiate negotiation with each of them.
    #[serde(rename_all = "camelCase")]
    Joined {
        room_id: String,
        participant_id: String,
        participants: Vec<ParticipantSummary>,
    },

    /// A peer joined the room.
    #[serde(rename_all = "camelCase")]
    PeerJoined {
        participant_id: String,
        user_id: String,
        role: String,
    },

    /// A peer left or disconnected.
    #[serde(rename_all = "camelCase")]
    PeerLeft {
        participant_id: String,
        user_id: String,
    },

    /// Relayed negotiation offer.
    NegotiationOffer(RelayedSignal),

    /// Relayed negotiation answer.
    NegotiationAnswer(RelayedSignal),

    /// Relayed transport candidate.
    NegotiationCandidate(RelayedSignal),

    /// Relayed application payload.
    RelayPayload(RelayedSignal),

    /// Reply to `ping`.
    Pong,

    /// Request-scoped error; the connection stays open unless noted.
    Error { code: String, message: String },
}

/// Body of a relayed signal frame as delivered to recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedSignal {
    pub room_id: String,
    pub from_participant_id: String,
    pub payload: Value,
}

/// Participant view included in rosters and admin summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub participant_id: String,
    pub user_id: String,
    pub role: String,
    pub status: ParticipantStatus,
    pub joined_at: DateTime<Utc>,
}

impl From<&Participant> for ParticipantSummary {
    fn from(p: &Participant) -> Self {
        Self {
            participant_id: p.participant_id.clone(),
            user_id: p.user_id.clone(),
            role: p.role.clone(),
            status: p.status,
            joined_at: p.joined_at,
        }
    }
}
