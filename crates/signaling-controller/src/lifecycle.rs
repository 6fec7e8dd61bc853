//! Room lifecycle management: join/leave/end transitions and reclamation.
//!
//! This component collectively owns rooms and their participant sets; the
//! store is only mutated from here. It synthesizes the `peer-joined` /
//! `peer-left` notifications and runs the janitor that reclaims ended or
//! over-age rooms from both the cache and the durable store.

use crate::errors::SignalingError;
use crate::observability::CoreStats;
use crate::protocol::{ParticipantSummary, ServerFrame};
use crate::registry::{ConnectionBinding, ConnectionRegistry};
use crate::store::{Room, RoomKind, RoomStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a successful join, echoed back to the joiner.
#[derive(Debug)]
pub struct JoinedRoom {
    pub room_id: String,
    pub participant_id: String,
    /// Existing peers, so the joiner can initiate negotiation with each.
    pub participants: Vec<ParticipantSummary>,
}

/// Orchestrates join/leave/end transitions and room reclamation.
pub struct RoomLifecycleManager {
    store: Arc<RoomStore>,
    registry: Arc<ConnectionRegistry>,
    #[allow(dead_code)]
    stats: Arc<CoreStats>,
    /// Grace before an ended room is dropped from the cache, so stragglers
    /// are ignored instead of erroring.
    ended_grace: Duration,
    /// Parent token for scheduled removals and the janitor.
    tasks_token: CancellationToken,
}

impl RoomLifecycleManager {
    #[must_use]
    pub fn new(
        store: Arc<RoomStore>,
        registry: Arc<ConnectionRegistry>,
        stats: Arc<CoreStats>,
        ended_grace: Duration,
        tasks_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            registry,
            stats,
            ended_grace,
            tasks_token,
        }
    }

    /// Pre-create a room before any participant connects (admin surface).
    pub fn create_room(&self, session_id: &str, kind: RoomKind) -> Room {
        self.store.create_room(None, session_id, kind)
    }

    /// Join `connection_id` to a room, creating the room lazily on first
    /// join of an unseen id. Emits `peer-joined` to the existing peers and
    /// returns the current roster to the joiner.
    ///
    /// A connection bound to another room leaves it first; a rejoin by the
    /// same user displaces the stale connection, which immediately stops
    /// being a routing target.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for unknown connections, plus the store's
    /// `RoomClosed` / `RoomFull` rejections.
    pub async fn join(
        &self,
        room_id: &str,
        role: &str,
        connection_id: &str,
    ) -> Result<JoinedRoom, SignalingError> {
        let binding = self
            .registry
            .binding(connection_id)
            .ok_or_else(|| SignalingError::Unauthenticated("no identity claim".to_string()))?;

        if let Some(previous) = binding.bound_room.as_deref() {
            if previous != room_id {
                self.registry.clear_room(connection_id);
                self.depart(previous, &binding.user_id, Some(connection_id))
                    .await;
            }
        }

        // Lazy creation: first join of an unseen id brings the room up with
        // the room id doubling as the session reference.
        if self.store.get_room(room_id).await.is_none() {
            self.store
                .create_room(Some(room_id.to_string()), room_id, RoomKind::default());
        }

        let effect =
            self.store
                .add_or_update_participant(room_id, &binding.user_id, role, connection_id)?;

        if let Some(stale) = effect.replaced_connection.as_deref() {
            // The displaced connection must stop being a routing target
            // before anyone learns about the rejoin.
            self.registry.unregister(stale);
            debug!(
                target: "sc.lifecycle",
                room_id = %room_id,
                "Stale connection displaced by rejoin"
            );
        }

        self.registry.bind_room(connection_id, room_id);

        let announcement = ServerFrame::PeerJoined {
            participant_id: effect.participant.participant_id.clone(),
            user_id: effect.participant.user_id.clone(),
            role: effect.participant.role.clone(),
        };
        self.registry
            .broadcast_room(room_id, &announcement, Some(connection_id));

        info!(
            target: "sc.lifecycle",
            room_id = %room_id,
            participant_id = %effect.participant.participant_id,
            peers = effect.peers.len(),
            "Participant joined"
        );

        Ok(JoinedRoom {
            room_id: room_id.to_string(),
            participant_id: effect.participant.participant_id,
            participants: effect.peers.iter().map(ParticipantSummary::from).collect(),
        })
    }

    /// Explicit leave. No reply is owed to the leaver; peers receive
    /// `peer-left`. The connection stays open and may join another room.
    ///
    /// # Errors
    ///
    /// `NotAParticipant` when the connection is not bound to `room_id`.
    pub async fn leave(&self, room_id: &str, connection_id: &str) -> Result<(), SignalingError> {
        let binding = self
            .registry
            .binding(connection_id)
            .ok_or(SignalingError::NotAParticipant)?;

        if binding.bound_room.as_deref() != Some(room_id) {
            return Err(SignalingError::NotAParticipant);
        }

        self.registry.clear_room(connection_id);
        self.depart(room_id, &binding.user_id, Some(connection_id))
            .await;
        Ok(())
    }

    /// Transport close or error. The registry entry is already gone (the
    /// supervisor unregisters synchronously); this runs the remaining leave
    /// side effects for whatever room the connection was bound to.
    pub async fn handle_disconnect(&self, connection_id: &str, binding: ConnectionBinding) {
        if let Some(room_id) = binding.bound_room.as_deref() {
            self.depart(room_id, &binding.user_id, Some(connection_id))
                .await;
        }
    }

    /// End a room outright, disconnecting everyone.
    pub fn end_room(&self, room_id: &str) -> bool {
        let ended = self.store.end_room(room_id);
        if ended {
            self.schedule_removal(room_id);
        }
        ended
    }

    /// Shared departure path: mark disconnected, notify peers exactly once,
    /// and arrange reclamation when the room emptied.
    async fn depart(&self, room_id: &str, user_id: &str, expected_connection: Option<&str>) {
        match self
            .store
            .mark_disconnected(room_id, user_id, expected_connection)
        {
            Ok(Some(effect)) => {
                let notice = ServerFrame::PeerLeft {
                    participant_id: effect.participant.participant_id.clone(),
                    user_id: user_id.to_string(),
                };
                self.registry
                    .broadcast_room(room_id, &notice, expected_connection);

                info!(
                    target: "sc.lifecycle",
                    room_id = %room_id,
                    participant_id = %effect.participant.participant_id,
                    room_ended = effect.room_ended,
                    "Participant departed"
                );

                if effect.room_ended {
                    self.schedule_removal(room_id);
                }
            }
            Ok(None) => {
                debug!(
                    target: "sc.lifecycle",
                    room_id = %room_id,
                    "Departure of displaced connection ignored"
                );
            }
            Err(e) => {
                debug!(
                    target: "sc.lifecycle",
                    room_id = %room_id,
                    error = %e,
                    "Departure against unknown room ignored"
                );
            }
        }
    }

    /// Drop an ended room from the cache after the grace period; the sweep
    /// and the durable-store TTL are the backstops.
    fn schedule_removal(&self, room_id: &str) {
        let store = Arc::clone(&self.store);
        let room_id = room_id.to_string();
        let grace = self.ended_grace;
        let token = self.tasks_token.child_token();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(grace) => {
                    store.remove_room(&room_id);
                }
            }
        });
    }

    /// Spawn the janitor: every `period`, reclaim rooms that have ended or
    /// outlived `retention`, from cache and durable store alike.
    pub fn spawn_janitor(&self, period: Duration, retention: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let token = self.tasks_token.child_token();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a restart doesn't
            // sweep before rehydration traffic settles.
            ticker.tick().await;

            info!(
                target: "sc.janitor",
                period_seconds = period.as_secs(),
                retention_seconds = retention.as_secs(),
                "Janitor started"
            );

            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        info!(target: "sc.janitor", "Janitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired(retention);
                        if removed > 0 {
                            warn!(
                                target: "sc.janitor",
                                removed = removed,
                                "Reclaimed expired rooms"
                            );
                        }
                    }
                }
            }
        })
    }
}
