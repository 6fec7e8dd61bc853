//! Signaling Controller Library
//!
//! Core of the real-time consultation service: lets two or more parties
//! discover each other inside a named room, exchange the opaque negotiation
//! messages needed to establish a direct media path, and learn promptly when
//! a peer disconnects. No media bytes pass through this service; negotiation
//! payloads are relayed, never interpreted.
//!
//! # Architecture
//!
//! ```text
//! WebSocket connection
//!   └── connection supervisor (one reader + one writer task per socket)
//!         ├── RoomLifecycleManager  join/leave/end, peer-joined/peer-left
//!         │     └── RoomStore      cache-first, optional Redis write-through
//!         └── SignalingRouter      membership check + targeted/broadcast relay
//!               └── ConnectionRegistry  live sockets and their outbound channels
//! ```
//!
//! # Key Design Decisions
//!
//! - **Explicit registries over globals**: every component is constructed
//!   once in `main` and passed by `Arc`.
//! - **Per-room contention only**: room records live in sharded maps;
//!   operations on unrelated rooms never contend, and store I/O is never
//!   performed under an entry lock.
//! - **Best-effort delivery**: a vanished peer is a counted, routine
//!   condition, not an error.
//! - **Cache-first reads, write-through with TTL**: Redis unavailability
//!   degrades to in-memory-only operation, never to request failures.

pub mod auth;
pub mod config;
pub mod connection;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod state;
pub mod store;
