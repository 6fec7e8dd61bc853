//! End-to-end signaling flows over in-process components.
//!
//! These tests drive the lifecycle manager and router exactly the way the
//! connection supervisors do, with channel-backed fake connections standing
//! in for WebSockets so every delivered frame can be asserted on.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use serde_json::json;
use signaling_controller::lifecycle::RoomLifecycleManager;
use signaling_controller::observability::CoreStats;
use signaling_controller::protocol::{ServerFrame, SignalBody};
use signaling_controller::registry::ConnectionRegistry;
use signaling_controller::router::{SignalKind, SignalingRouter};
use signaling_controller::store::{RoomStore, RoomStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Harness {
    store: Arc<RoomStore>,
    registry: Arc<ConnectionRegistry>,
    router: SignalingRouter,
    lifecycle: RoomLifecycleManager,
}

struct Peer {
    connection_id: String,
    rx: mpsc::Receiver<ServerFrame>,
}

impl Harness {
    fn new() -> Self {
        Self::with_limits(8, Duration::from_secs(14_400))
    }

    fn with_limits(max_participants: usize, retention: Duration) -> Self {
        let stats = Arc::new(CoreStats::new());
        let store = Arc::new(RoomStore::new(max_participants, retention, None));
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&stats)));
        let router = SignalingRouter::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&stats),
        );
        let lifecycle = RoomLifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&stats),
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        Self {
            store,
            registry,
            router,
            lifecycle,
        }
    }

    /// Open an authenticated fake connection.
    fn connect(&self, user_id: &str, conn_id: &str) -> Peer {
        let (tx, rx) = mpsc::channel(32);
        self.registry.register(conn_id, user_id, "patient", tx);
        Peer {
            connection_id: conn_id.to_string(),
            rx,
        }
    }

    /// Disconnect the way a supervisor does on transport close.
    async fn disconnect(&self, peer: &Peer) {
        if let Some(binding) = self.registry.unregister(&peer.connection_id) {
            self.lifecycle
                .handle_disconnect(&peer.connection_id, binding)
                .await;
        }
    }

    async fn participant_id_of(&self, room: &str, user: &str) -> String {
        self.store
            .list_active_participants(room)
            .await
            .iter()
            .find(|p| p.user_id == user)
            .map(|p| p.participant_id.clone())
            .expect("participant should be live")
    }
}

/// Receive the next frame within a short deadline.
async fn recv(peer: &mut Peer) -> ServerFrame {
    tokio::time::timeout(Duration::from_millis(200), peer.rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("channel closed")
}

/// Drain everything currently queued.
fn drain(peer: &mut Peer) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = peer.rx.try_recv() {
        frames.push(frame);
    }
    frames
}

fn offer(room: &str, to: Option<String>, payload: serde_json::Value) -> SignalBody {
    SignalBody {
        room_id: room.to_string(),
        to_participant_id: to,
        payload,
    }
}

#[tokio::test]
async fn idempotent_rejoin_leaves_one_connected_record() {
    let h = Harness::new();
    let mut a1 = h.connect("alice", "conn-a1");
    let mut b = h.connect("bob", "conn-b");

    h.lifecycle.join("r1", "clinician", &a1.connection_id).await.unwrap();
    h.lifecycle.join("r1", "patient", &b.connection_id).await.unwrap();
    drain(&mut a1);
    drain(&mut b);

    // Second join by the same user from a fresh connection
    let mut a2 = h.connect("alice", "conn-a2");
    h.lifecycle.join("r1", "clinician", &a2.connection_id).await.unwrap();

    let live = h.store.list_active_participants("r1").await;
    let alice_records: Vec<_> = live.iter().filter(|p| p.user_id == "alice").collect();
    assert_eq!(alice_records.len(), 1, "exactly one live record for alice");

    // The stale connection is no longer a valid routing target: a frame
    // targeted at alice reaches only the new connection.
    let alice_pid = h.participant_id_of("r1", "alice").await;
    h.router
        .route(
            &b.connection_id,
            SignalKind::Offer,
            offer("r1", Some(alice_pid), json!({"sdp": "fresh"})),
        )
        .await
        .unwrap();

    let frame = recv(&mut a2).await;
    assert!(matches!(frame, ServerFrame::NegotiationOffer(_)));
    assert!(drain(&mut a1).iter().all(|f| !matches!(f, ServerFrame::NegotiationOffer(_))));
}

#[tokio::test]
async fn broadcasts_never_cross_rooms() {
    let h = Harness::new();
    let a = h.connect("alice", "conn-a");
    let mut b = h.connect("bob", "conn-b");
    let mut c = h.connect("carol", "conn-c");

    h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();
    h.lifecycle.join("r1", "patient", &b.connection_id).await.unwrap();
    h.lifecycle.join("r2", "patient", &c.connection_id).await.unwrap();
    drain(&mut b);
    drain(&mut c);

    h.router
        .route(
            &a.connection_id,
            SignalKind::Candidate,
            offer("r1", None, json!({"candidate": "host 10.0.0.1"})),
        )
        .await
        .unwrap();

    let frame = recv(&mut b).await;
    assert!(matches!(frame, ServerFrame::NegotiationCandidate(_)));

    // Carol is exclusively in r2 and must see nothing
    assert!(drain(&mut c).is_empty());
}

#[tokio::test]
async fn every_survivor_gets_exactly_one_departure_notice() {
    let h = Harness::new();
    let mut a = h.connect("alice", "conn-a");
    let mut b = h.connect("bob", "conn-b");
    let mut c = h.connect("carol", "conn-c");

    h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();
    h.lifecycle.join("r1", "patient", &b.connection_id).await.unwrap();
    h.lifecycle.join("r1", "patient", &c.connection_id).await.unwrap();
    drain(&mut a);
    drain(&mut b);
    drain(&mut c);

    h.disconnect(&b).await;

    // Give the notifications a moment to land, then count
    tokio::time::sleep(Duration::from_millis(50)).await;
    for peer in [&mut a, &mut c] {
        let notices: Vec<_> = drain(peer)
            .into_iter()
            .filter(|f| matches!(f, ServerFrame::PeerLeft { user_id, .. } if user_id == "bob"))
            .collect();
        assert_eq!(notices.len(), 1, "exactly one peer-left per survivor");
    }
}

#[tokio::test]
async fn emptied_room_ends_and_rejects_rejoining() {
    let h = Harness::new();
    let a = h.connect("alice", "conn-a");

    h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();
    h.disconnect(&a).await;

    let record = h.store.get_room("r1").await.unwrap();
    assert_eq!(record.room.status, RoomStatus::Ended);

    // A later join against the same id is rejected with RoomClosed
    let fresh = h.connect("alice", "conn-a2");
    let result = h.lifecycle.join("r1", "clinician", &fresh.connection_id).await;
    let err = result.unwrap_err();
    assert_eq!(err.error_code(), "ROOM_CLOSED");
}

#[tokio::test]
async fn sweep_reclaims_rooms_past_retention_regardless_of_status() {
    let h = Harness::with_limits(8, Duration::from_secs(0));
    let a = h.connect("alice", "conn-a");
    h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();

    // Room is active and occupied, but the retention window is exceeded
    let removed = h.store.sweep_expired(Duration::from_secs(0));
    assert_eq!(removed, 1);
    assert!(h.store.get_room("r1").await.is_none());
}

#[tokio::test]
async fn sweep_keeps_fresh_active_rooms() {
    let h = Harness::new();
    let a = h.connect("alice", "conn-a");
    h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();

    let removed = h.store.sweep_expired(Duration::from_secs(3600));
    assert_eq!(removed, 0);
    assert!(h.store.get_room("r1").await.is_some());
}

#[tokio::test]
async fn room_full_is_rejected_with_explicit_reason() {
    let h = Harness::with_limits(2, Duration::from_secs(14_400));
    let a = h.connect("alice", "conn-a");
    let b = h.connect("bob", "conn-b");
    let c = h.connect("carol", "conn-c");

    h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();
    h.lifecycle.join("r1", "patient", &b.connection_id).await.unwrap();

    let err = h
        .lifecycle
        .join("r1", "patient", &c.connection_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "ROOM_FULL");
}

/// The full consultation scenario: targeted offer, disconnect notice,
/// reconnection under a fresh binding.
#[tokio::test]
async fn consultation_scenario_offer_departure_reconnect() {
    let h = Harness::new();
    let mut a = h.connect("dr-house", "conn-a");
    let mut b = h.connect("pat-7", "conn-b");

    let joined_a = h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();
    let joined_b = h.lifecycle.join("r1", "patient", &b.connection_id).await.unwrap();
    assert!(joined_a.participants.is_empty());
    assert_eq!(joined_b.participants.len(), 1);
    drain(&mut a);

    // A sends a negotiation offer targeted at B
    let b_pid = h.participant_id_of("r1", "pat-7").await;
    let payload = json!({"sdp": "v=0 o=- 4611 2 IN IP4 0.0.0.0", "type": "offer"});
    h.router
        .route(
            &a.connection_id,
            SignalKind::Offer,
            offer("r1", Some(b_pid.clone()), payload.clone()),
        )
        .await
        .unwrap();

    // B receives exactly one offer with the original payload
    let frame = recv(&mut b).await;
    let ServerFrame::NegotiationOffer(signal) = frame else {
        panic!("expected negotiation-offer, got {frame:?}");
    };
    assert_eq!(signal.payload, payload);
    assert!(drain(&mut b).is_empty());

    // B drops abruptly; A learns exactly once
    h.disconnect(&b).await;
    let frame = recv(&mut a).await;
    let ServerFrame::PeerLeft { user_id, .. } = frame else {
        panic!("expected peer-left, got {frame:?}");
    };
    assert_eq!(user_id, "pat-7");

    // B reconnects under a new connection binding and answers A
    let mut b2 = h.connect("pat-7", "conn-b2");
    h.lifecycle.join("r1", "patient", &b2.connection_id).await.unwrap();
    let frame = recv(&mut a).await;
    assert!(matches!(frame, ServerFrame::PeerJoined { .. }));

    let a_pid = h.participant_id_of("r1", "dr-house").await;
    h.router
        .route(
            &b2.connection_id,
            SignalKind::Answer,
            offer("r1", Some(a_pid), json!({"type": "answer"})),
        )
        .await
        .unwrap();

    let frame = recv(&mut a).await;
    assert!(matches!(frame, ServerFrame::NegotiationAnswer(_)));
    drop(b2);
}

#[tokio::test]
async fn relay_payload_broadcasts_to_peers_only() {
    let h = Harness::new();
    let mut a = h.connect("alice", "conn-a");
    let mut b = h.connect("bob", "conn-b");

    h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();
    h.lifecycle.join("r1", "patient", &b.connection_id).await.unwrap();
    drain(&mut a);

    h.router
        .route(
            &b.connection_id,
            SignalKind::Relay,
            offer("r1", None, json!({"chat": "hello doctor"})),
        )
        .await
        .unwrap();

    let frame = recv(&mut a).await;
    let ServerFrame::RelayPayload(signal) = frame else {
        panic!("expected relay-payload");
    };
    assert_eq!(signal.payload["chat"], "hello doctor");

    // The sender receives no echo
    assert!(drain(&mut b).is_empty());
}

#[tokio::test]
async fn sender_outside_room_cannot_relay_into_it() {
    let h = Harness::new();
    let a = h.connect("alice", "conn-a");
    let mut b = h.connect("bob", "conn-b");
    let outsider = h.connect("mallory", "conn-m");

    h.lifecycle.join("r1", "clinician", &a.connection_id).await.unwrap();
    h.lifecycle.join("r1", "patient", &b.connection_id).await.unwrap();
    drain(&mut b);

    // Mallory never joined r1
    let err = h
        .router
        .route(
            &outsider.connection_id,
            SignalKind::Offer,
            offer("r1", None, json!({})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_A_PARTICIPANT");
    assert!(drain(&mut b).is_empty());
}
