//! Redis-backed persistence for room records.
//!
//! One JSON value per room under `room:{id}`, written with a TTL so orphaned
//! rooms self-expire even if the janitor never runs. The redis-rs
//! `MultiplexedConnection` is cheap to clone and safe for concurrent use, so
//! each operation clones the connection instead of locking.
//!
//! Callers (the room store) treat every error here as non-fatal: the
//! in-memory cache is authoritative for the running process and persistence
//! only has to be good enough to survive a restart.

use crate::errors::SignalingError;
use crate::store::RoomRecord;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, error};

/// Durable store client for room records.
#[derive(Clone)]
pub struct RoomPersistence {
    /// Redis client (kept for reconnection scenarios).
    #[allow(dead_code)]
    client: Client,
    /// Multiplexed connection, cloned per operation.
    connection: MultiplexedConnection,
}

impl RoomPersistence {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Storage` if the URL is invalid or the
    /// connection cannot be established. The URL is never logged; it may
    /// embed credentials.
    pub async fn connect(redis_url: &str) -> Result<Self, SignalingError> {
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "sc.store.redis", error = %e, "Failed to open Redis client");
            SignalingError::Storage(format!("failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "sc.store.redis", error = %e, "Failed to connect to Redis");
                SignalingError::Storage(format!("failed to connect to Redis: {e}"))
            })?;

        Ok(Self { client, connection })
    }

    fn room_key(room_id: &str) -> String {
        format!("room:{room_id}")
    }

    /// Write a room record with a TTL (refreshed on every write).
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Storage` on serialization or Redis failure.
    pub async fn store_room(
        &self,
        record: &RoomRecord,
        ttl: Duration,
    ) -> Result<(), SignalingError> {
        let json = serde_json::to_string(record).map_err(|e| {
            error!(
                target: "sc.store.redis",
                error = %e,
                room_id = %record.room.id,
                "Failed to serialize room record"
            );
            SignalingError::Internal(format!("room serialization failed: {e}"))
        })?;

        let mut conn = self.connection.clone();
        let key = Self::room_key(&record.room.id);

        let () = conn
            .set_ex(&key, json, ttl.as_secs().max(1))
            .await
            .map_err(|e| {
                SignalingError::Storage(format!("failed to store room record: {e}"))
            })?;

        debug!(
            target: "sc.store.redis",
            room_id = %record.room.id,
            ttl_seconds = ttl.as_secs(),
            "Stored room record"
        );

        Ok(())
    }

    /// Load a room record, or `None` if the key is absent or expired.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Storage` on Redis failure or a corrupt value.
    pub async fn load_room(&self, room_id: &str) -> Result<Option<RoomRecord>, SignalingError> {
        let mut conn = self.connection.clone();
        let key = Self::room_key(room_id);

        let value: Option<String> = conn.get(&key).await.map_err(|e| {
            SignalingError::Storage(format!("failed to load room record: {e}"))
        })?;

        match value {
            Some(json) => {
                let record: RoomRecord = serde_json::from_str(&json).map_err(|e| {
                    error!(
                        target: "sc.store.redis",
                        error = %e,
                        room_id = %room_id,
                        "Failed to deserialize room record"
                    );
                    SignalingError::Storage(format!("corrupt room record: {e}"))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Delete a room record.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Storage` on Redis failure.
    pub async fn delete_room(&self, room_id: &str) -> Result<(), SignalingError> {
        let mut conn = self.connection.clone();
        let key = Self::room_key(room_id);

        let () = conn.del(&key).await.map_err(|e| {
            SignalingError::Storage(format!("failed to delete room record: {e}"))
        })?;

        debug!(target: "sc.store.redis", room_id = %room_id, "Deleted room record");
        Ok(())
    }
}
