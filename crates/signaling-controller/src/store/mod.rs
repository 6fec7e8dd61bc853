//! Room store: authoritative room existence, membership and status.
//!
//! The in-process cache is the fast path and is always updated first; an
//! optional Redis write-through keeps a copy with a bounded TTL so state
//! survives a process restart and orphaned rooms self-expire. Callers never
//! see which path served a read, and durable-store failures never surface:
//! they are logged here and the operation succeeds against the cache.
//!
//! Entries live in a `DashMap`, so operations on unrelated rooms never
//! contend. The entry guard is dropped before any store I/O; write-through
//! runs on a spawned task against a cloned snapshot.
//!
//! Rooms and their participant sets are mutated only through the lifecycle
//! manager; the router and the admin surface read.

mod persistence;

pub use persistence::RoomPersistence;

use crate::errors::SignalingError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a room is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    #[default]
    Consultation,
    Emergency,
}

/// Room status. A room transitions active -> ended exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Ended,
}

/// Participant status within a room.
///
/// `Waiting` models pre-peer arrival: the first participant waits until a
/// peer joins. `Disconnected` is terminal for a connection instance; a
/// rejoin creates a fresh record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Waiting,
    Connected,
    Disconnected,
}

/// A room binding a set of participants to one logical session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub session_id: String,
    pub kind: RoomKind,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub max_participants: usize,
}

/// A user's membership record within a room, distinct from any one
/// connection instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: String,
    pub user_id: String,
    pub role: String,
    /// Owning connection; exactly one live connection at a time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    pub status: ParticipantStatus,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    fn new(user_id: &str, role: &str, connection_id: &str) -> Self {
        Self {
            participant_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            role: role.to_string(),
            connection_id: Some(connection_id.to_string()),
            status: ParticipantStatus::Waiting,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    /// Whether this record is bound to a live connection.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status != ParticipantStatus::Disconnected
    }
}

/// A room plus its participant records (historical records included until
/// the room is reclaimed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room: Room,
    pub participants: Vec<Participant>,
}

impl RoomRecord {
    fn live_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_live()).count()
    }

    /// Live participants, in join order.
    #[must_use]
    pub fn live_participants(&self) -> Vec<Participant> {
        self.participants
            .iter()
            .filter(|p| p.is_live())
            .cloned()
            .collect()
    }
}

/// Effect of a join on the room, reported back to the lifecycle manager.
#[derive(Debug)]
pub struct JoinEffect {
    /// The joiner's (created or updated) record.
    pub participant: Participant,
    /// Live peers at join time, excluding the joiner.
    pub peers: Vec<Participant>,
    /// Stale connection displaced by an idempotent rejoin, if any.
    pub replaced_connection: Option<String>,
}

/// Effect of a departure on the room.
#[derive(Debug)]
pub struct LeaveEffect {
    /// The departed participant's record.
    pub participant: Participant,
    /// True when this departure left no live participants and the room
    /// flipped to ended.
    pub room_ended: bool,
}

/// Authoritative store for rooms: in-process cache first, optional Redis
/// write-through.
pub struct RoomStore {
    rooms: DashMap<String, RoomRecord>,
    persistence: Option<RoomPersistence>,
    /// Retention window; also the durable-store TTL refreshed on each write.
    retention: Duration,
    max_participants: usize,
}

impl RoomStore {
    #[must_use]
    pub fn new(
        max_participants: usize,
        retention: Duration,
        persistence: Option<RoomPersistence>,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            persistence,
            retention,
            max_participants,
        }
    }

    /// Create a room. With `room_id = None` a fresh id is generated (admin
    /// pre-creation); with an explicit id an existing room wins (lazy
    /// creation races resolve to the first writer).
    pub fn create_room(
        &self,
        room_id: Option<String>,
        session_id: &str,
        kind: RoomKind,
    ) -> Room {
        let id = room_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let entry = self.rooms.entry(id.clone()).or_insert_with(|| {
            info!(
                target: "sc.store",
                room_id = %id,
                session_id = %session_id,
                "Room created"
            );
            RoomRecord {
                room: Room {
                    id: id.clone(),
                    session_id: session_id.to_string(),
                    kind,
                    status: RoomStatus::Active,
                    created_at: Utc::now(),
                    ended_at: None,
                    max_participants: self.max_participants,
                },
                participants: Vec::new(),
            }
        });

        let snapshot = entry.clone();
        drop(entry);

        self.write_through(&snapshot);
        snapshot.room
    }

    /// Fetch a room: cache first, then the durable store before declaring
    /// not-found.
    pub async fn get_room(&self, room_id: &str) -> Option<RoomRecord> {
        if let Some(record) = self.rooms.get(room_id) {
            return Some(record.clone());
        }

        let persistence = self.persistence.as_ref()?;
        match persistence.load_room(room_id).await {
            Ok(Some(mut record)) => {
                // Connections are meaningless outside the process that
                // accepted them; anything live in the stored copy is stale.
                for p in &mut record.participants {
                    if p.is_live() {
                        p.status = ParticipantStatus::Disconnected;
                        p.connection_id = None;
                    }
                }
                debug!(target: "sc.store", room_id = %room_id, "Room rehydrated from durable store");
                let entry = self.rooms.entry(room_id.to_string()).or_insert(record);
                Some(entry.clone())
            }
            Ok(None) => None,
            Err(e) => {
                warn!(target: "sc.store", error = %e, room_id = %room_id, "Durable store read failed");
                None
            }
        }
    }

    /// Live participants of a room (empty when the room is unknown).
    pub async fn list_active_participants(&self, room_id: &str) -> Vec<Participant> {
        self.get_room(room_id)
            .await
            .map(|r| r.live_participants())
            .unwrap_or_default()
    }

    /// Register or update a participant in a room.
    ///
    /// A `user_id` with a live record rejoins in place: the record keeps its
    /// participant id and the displaced connection is reported back.
    /// A `user_id` whose previous record is disconnected gets a fresh record.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if the room is not cached, `RoomClosed` if it has
    /// ended, `RoomFull` at the live-participant bound.
    pub fn add_or_update_participant(
        &self,
        room_id: &str,
        user_id: &str,
        role: &str,
        connection_id: &str,
    ) -> Result<JoinEffect, SignalingError> {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or(SignalingError::RoomNotFound)?;
        let record = entry.value_mut();

        if record.room.status == RoomStatus::Ended {
            return Err(SignalingError::RoomClosed);
        }

        let rejoin_idx = record
            .participants
            .iter()
            .position(|p| p.user_id == user_id && p.is_live());

        let replaced_connection = match rejoin_idx {
            Some(idx) => {
                // Idempotent rejoin: transition the existing record.
                let Some(p) = record.participants.get_mut(idx) else {
                    return Err(SignalingError::Internal("participant index vanished".into()));
                };
                let replaced = match p.connection_id.as_deref() {
                    Some(old) if old != connection_id => Some(old.to_string()),
                    _ => None,
                };
                p.connection_id = Some(connection_id.to_string());
                p.role = role.to_string();
                replaced
            }
            None => {
                if record.live_count() >= record.room.max_participants {
                    return Err(SignalingError::RoomFull);
                }
                record
                    .participants
                    .push(Participant::new(user_id, role, connection_id));
                None
            }
        };

        // A lone participant waits; once a peer is present everyone is
        // connected.
        let live = record.live_count();
        let target_status = if live >= 2 {
            ParticipantStatus::Connected
        } else {
            ParticipantStatus::Waiting
        };
        for p in record.participants.iter_mut().filter(|p| p.is_live()) {
            p.status = target_status;
        }

        let participant = record
            .participants
            .iter()
            .find(|p| p.user_id == user_id && p.is_live())
            .cloned()
            .ok_or_else(|| SignalingError::Internal("joined participant missing".into()))?;

        let peers: Vec<Participant> = record
            .participants
            .iter()
            .filter(|p| p.is_live() && p.user_id != user_id)
            .cloned()
            .collect();

        let snapshot = record.clone();
        drop(entry);

        self.write_through(&snapshot);

        Ok(JoinEffect {
            participant,
            peers,
            replaced_connection,
        })
    }

    /// Mark a participant disconnected.
    ///
    /// With `expected_connection` set, the transition only applies if the
    /// record is still bound to that connection; a stale connection's
    /// departure after a rejoin is a no-op (`Ok(None)`).
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if the room is not cached.
    pub fn mark_disconnected(
        &self,
        room_id: &str,
        user_id: &str,
        expected_connection: Option<&str>,
    ) -> Result<Option<LeaveEffect>, SignalingError> {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or(SignalingError::RoomNotFound)?;
        let record = entry.value_mut();

        let Some(p) = record
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id && p.is_live())
        else {
            return Ok(None);
        };

        if let Some(expected) = expected_connection {
            if p.connection_id.as_deref() != Some(expected) {
                return Ok(None);
            }
        }

        p.status = ParticipantStatus::Disconnected;
        p.connection_id = None;
        p.left_at = Some(Utc::now());
        let participant = p.clone();

        let room_ended = if record.live_count() == 0 && record.room.status == RoomStatus::Active {
            record.room.status = RoomStatus::Ended;
            record.room.ended_at = Some(Utc::now());
            info!(target: "sc.store", room_id = %room_id, "Last participant left, room ended");
            true
        } else {
            false
        };

        let snapshot = record.clone();
        drop(entry);

        self.write_through(&snapshot);

        Ok(Some(LeaveEffect {
            participant,
            room_ended,
        }))
    }

    /// End a room (active -> ended, exactly once). Live participants are
    /// marked disconnected; their connection bindings are no longer valid.
    pub fn end_room(&self, room_id: &str) -> bool {
        let Some(mut entry) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let record = entry.value_mut();

        if record.room.status == RoomStatus::Ended {
            return false;
        }

        record.room.status = RoomStatus::Ended;
        record.room.ended_at = Some(Utc::now());
        for p in record.participants.iter_mut().filter(|p| p.is_live()) {
            p.status = ParticipantStatus::Disconnected;
            p.connection_id = None;
            p.left_at = Some(Utc::now());
        }

        let snapshot = record.clone();
        drop(entry);

        self.write_through(&snapshot);
        true
    }

    /// Drop a room from the cache and the durable store.
    pub fn remove_room(&self, room_id: &str) {
        if self.rooms.remove(room_id).is_some() {
            debug!(target: "sc.store", room_id = %room_id, "Room removed");
        }
        if let Some(persistence) = self.persistence.clone() {
            let room_id = room_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = persistence.delete_room(&room_id).await {
                    warn!(target: "sc.store", error = %e, room_id = %room_id, "Durable store delete failed");
                }
            });
        }
    }

    /// Reclaim rooms that have ended or outlived the retention window,
    /// regardless of status. Returns the number of rooms removed.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);

        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.room.status == RoomStatus::Ended
                    || now.signed_duration_since(record.room.created_at) > max_age
            })
            .map(|entry| entry.key().clone())
            .collect();

        for room_id in &expired {
            self.remove_room(room_id);
        }

        if !expired.is_empty() {
            info!(target: "sc.store", removed = expired.len(), "Sweep reclaimed rooms");
        }
        expired.len()
    }

    /// Number of active rooms in the cache.
    #[must_use]
    pub fn active_room_count(&self) -> usize {
        self.rooms
            .iter()
            .filter(|e| e.value().room.status == RoomStatus::Active)
            .count()
    }

    /// Number of participants currently bound to live connections.
    #[must_use]
    pub fn live_participant_count(&self) -> usize {
        self.rooms.iter().map(|e| e.value().live_count()).sum()
    }

    /// Update the cache first, then write through on a spawned task. The
    /// entry lock is already released; a failed write only costs durability.
    fn write_through(&self, record: &RoomRecord) {
        let Some(persistence) = self.persistence.clone() else {
            return;
        };
        let record = record.clone();
        let ttl = self.retention;
        tokio::spawn(async move {
            if let Err(e) = persistence.store_room(&record, ttl).await {
                warn!(
                    target: "sc.store",
                    error = %e,
                    room_id = %record.room.id,
                    "Durable store write failed, continuing in-memory"
                );
            }
        });
    }
}
