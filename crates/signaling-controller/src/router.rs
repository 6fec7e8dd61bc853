//! Signaling router: validates senders and relays negotiation frames.
//!
//! The router verifies that the sending connection is a current participant
//! of the target room, then either delivers to one named peer or fans out to
//! every other live participant. Payloads are opaque; only sender, kind and
//! room appear in logs.
//!
//! Frames from a single connection are routed one at a time by that
//! connection's reader task, and every recipient is fed through an ordered
//! per-connection channel, so delivery is FIFO per sender-recipient pair.
//! No ordering holds across different senders.

use crate::errors::SignalingError;
use crate::observability::CoreStats;
use crate::protocol::{RelayedSignal, ServerFrame, SignalBody};
use crate::registry::ConnectionRegistry;
use crate::store::{RoomStatus, RoomStore};
use std::sync::Arc;
use tracing::debug;

/// Kind of relayed signal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    Relay,
}

impl SignalKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "negotiation-offer",
            SignalKind::Answer => "negotiation-answer",
            SignalKind::Candidate => "negotiation-candidate",
            SignalKind::Relay => "relay-payload",
        }
    }

    fn into_frame(self, signal: RelayedSignal) -> ServerFrame {
        match self {
            SignalKind::Offer => ServerFrame::NegotiationOffer(signal),
            SignalKind::Answer => ServerFrame::NegotiationAnswer(signal),
            SignalKind::Candidate => ServerFrame::NegotiationCandidate(signal),
            SignalKind::Relay => ServerFrame::RelayPayload(signal),
        }
    }
}

/// Routes inbound signal frames to their room peers.
pub struct SignalingRouter {
    store: Arc<RoomStore>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<CoreStats>,
}

impl SignalingRouter {
    #[must_use]
    pub fn new(
        store: Arc<RoomStore>,
        registry: Arc<ConnectionRegistry>,
        stats: Arc<CoreStats>,
    ) -> Self {
        Self {
            store,
            registry,
            stats,
        }
    }

    /// Route one frame from `connection_id`.
    ///
    /// Delivery itself is best-effort: an unreachable recipient is counted
    /// and skipped, and a broadcast always reaches the remaining recipients.
    ///
    /// # Errors
    ///
    /// `NotAParticipant` when the sender is not a current participant of the
    /// target room; `RoomNotFound` when the room does not exist. Frames for
    /// rooms that have already ended are dropped silently so a departing
    /// peer's stragglers don't error.
    pub async fn route(
        &self,
        connection_id: &str,
        kind: SignalKind,
        body: SignalBody,
    ) -> Result<(), SignalingError> {
        let binding = self
            .registry
            .binding(connection_id)
            .ok_or(SignalingError::NotAParticipant)?;

        if binding.bound_room.as_deref() != Some(body.room_id.as_str()) {
            return Err(SignalingError::NotAParticipant);
        }

        let record = self
            .store
            .get_room(&body.room_id)
            .await
            .ok_or(SignalingError::RoomNotFound)?;

        if record.room.status == RoomStatus::Ended {
            debug!(
                target: "sc.router",
                room_id = %body.room_id,
                kind = kind.as_str(),
                "Dropping frame for ended room"
            );
            return Ok(());
        }

        let live = record.live_participants();
        let sender = live
            .iter()
            .find(|p| p.connection_id.as_deref() == Some(connection_id))
            .ok_or(SignalingError::NotAParticipant)?;

        let frame = kind.into_frame(RelayedSignal {
            room_id: body.room_id.clone(),
            from_participant_id: sender.participant_id.clone(),
            payload: body.payload,
        });

        debug!(
            target: "sc.router",
            room_id = %body.room_id,
            from_participant_id = %sender.participant_id,
            kind = kind.as_str(),
            targeted = body.to_participant_id.is_some(),
            "Routing signal"
        );

        match body.to_participant_id {
            Some(ref target_id) => {
                let target = live
                    .iter()
                    .filter(|p| p.participant_id != sender.participant_id)
                    .find(|p| &p.participant_id == target_id);

                match target.and_then(|p| p.connection_id.as_deref()) {
                    Some(target_connection) => {
                        // Outcome already counted by the registry
                        let _ = self.registry.send(target_connection, frame);
                    }
                    None => {
                        debug!(
                            target: "sc.router",
                            room_id = %body.room_id,
                            "Target participant not reachable, frame dropped"
                        );
                        self.stats.delivery_dropped();
                    }
                }
            }
            None => {
                for peer in live
                    .iter()
                    .filter(|p| p.participant_id != sender.participant_id)
                {
                    if let Some(peer_connection) = peer.connection_id.as_deref() {
                        let _ = self.registry.send(peer_connection, frame.clone());
                    }
                }
            }
        }

        self.stats.message_routed();
        Ok(())
    }
}
