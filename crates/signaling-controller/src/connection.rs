//! Per-connection supervision: handshake, frame dispatch, teardown.
//!
//! Every accepted WebSocket gets a reader loop (this module) and a writer
//! task draining the connection's outbound channel. The first frame must be
//! an identity claim; until it verifies, no room operation is accepted and
//! the connection is closed on any other input.
//!
//! Transport close is the sole source of truth for peer disappearance: the
//! teardown path unregisters the connection synchronously (so nothing more
//! can be routed to it) and then runs the leave side effects for whatever
//! room it was bound to. An idle timeout bounds the cost of abandoned
//! sessions; `ping` frames and transport-level pings both count as activity.

use crate::protocol::{ClientFrame, ServerFrame};
use crate::registry::OUTBOUND_CHANNEL_BUFFER;
use crate::router::SignalKind;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long teardown waits for the writer to flush.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// `GET /ws` upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| supervise_connection(socket, state))
}

/// Supervise one transport connection from handshake to teardown.
async fn supervise_connection(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let cancel = state.shutdown.child_token();

    debug!(
        target: "sc.connection",
        connection_id = %connection_id,
        "Connection accepted"
    );

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(OUTBOUND_CHANNEL_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    if authenticate(&mut stream, &tx, &state, &connection_id, &cancel).await {
        read_loop(&mut stream, &tx, &state, &connection_id, &cancel).await;
    }

    // Synchronous removal first: after this, no further frame can be routed
    // to this connection, even while the leave side effects run.
    if let Some(binding) = state.registry.unregister(&connection_id) {
        state
            .lifecycle
            .handle_disconnect(&connection_id, binding)
            .await;
    }

    drop(tx);
    let _ = tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer).await;

    debug!(
        target: "sc.connection",
        connection_id = %connection_id,
        "Connection closed"
    );
}

/// Handshake phase: require a verified identity claim before anything else.
/// Returns false when the connection must close without entering the room
/// phase.
async fn authenticate(
    stream: &mut SplitStream<WebSocket>,
    tx: &mpsc::Sender<ServerFrame>,
    state: &AppState,
    connection_id: &str,
    cancel: &CancellationToken,
) -> bool {
    let deadline = tokio::time::sleep(state.idle_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return false,

            () = &mut deadline => {
                info!(
                    target: "sc.connection",
                    connection_id = %connection_id,
                    "Connection idle during handshake, closing"
                );
                return false;
            }

            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(
                            target: "sc.connection",
                            connection_id = %connection_id,
                            error = %e,
                            "Transport error during handshake"
                        );
                        return false;
                    }
                };

                let Ok(ClientFrame::Authenticate { token }) =
                    serde_json::from_str::<ClientFrame>(&text)
                else {
                    // Room operations before an identity claim close the
                    // connection immediately.
                    let _ = tx
                        .send(ServerFrame::Error {
                            code: "UNAUTHENTICATED".to_string(),
                            message: "Authenticate first".to_string(),
                        })
                        .await;
                    return false;
                };

                match state.verifier.verify(&token).await {
                    Ok(identity) => {
                        state.registry.register(
                            connection_id,
                            &identity.user_id,
                            &identity.role,
                            tx.clone(),
                        );
                        let _ = tx
                            .send(ServerFrame::Authenticated {
                                user_id: identity.user_id.clone(),
                                role: identity.role.clone(),
                            })
                            .await;
                        info!(
                            target: "sc.connection",
                            connection_id = %connection_id,
                            role = %identity.role,
                            "Connection authenticated"
                        );
                        return true;
                    }
                    Err(e) => {
                        warn!(
                            target: "sc.connection",
                            connection_id = %connection_id,
                            "Identity claim rejected, closing"
                        );
                        let _ = tx
                            .send(ServerFrame::Error {
                                code: e.error_code().to_string(),
                                message: e.client_message(),
                            })
                            .await;
                        return false;
                    }
                }
            }
        }
    }
}

/// Room phase: dispatch inbound frames until close, error, idle timeout or
/// shutdown.
async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    tx: &mpsc::Sender<ServerFrame>,
    state: &AppState,
    connection_id: &str,
    cancel: &CancellationToken,
) {
    let deadline = tokio::time::sleep(state.idle_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(
                    target: "sc.connection",
                    connection_id = %connection_id,
                    "Shutdown requested, closing connection"
                );
                break;
            }

            () = &mut deadline => {
                info!(
                    target: "sc.connection",
                    connection_id = %connection_id,
                    "Idle timeout, closing connection"
                );
                break;
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        deadline.as_mut().reset(Instant::now() + state.idle_timeout);
                        dispatch_frame(&text, tx, state, connection_id).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        deadline.as_mut().reset(Instant::now() + state.idle_timeout);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(
                            target: "sc.connection",
                            connection_id = %connection_id,
                            "Ignoring binary frame"
                        );
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(
                            target: "sc.connection",
                            connection_id = %connection_id,
                            error = %e,
                            "Transport error, closing connection"
                        );
                        break;
                    }
                }
            }
        }
    }
}

/// Handle one parsed inbound frame.
async fn dispatch_frame(
    text: &str,
    tx: &mpsc::Sender<ServerFrame>,
    state: &AppState,
    connection_id: &str,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(
                target: "sc.connection",
                connection_id = %connection_id,
                error = %e,
                "Malformed frame"
            );
            let _ = tx
                .send(ServerFrame::Error {
                    code: "MALFORMED_FRAME".to_string(),
                    message: "Could not parse frame".to_string(),
                })
                .await;
            return;
        }
    };

    match frame {
        ClientFrame::Authenticate { .. } => {
            // Identity is fixed for the connection's lifetime.
            let _ = tx
                .send(ServerFrame::Error {
                    code: "ALREADY_AUTHENTICATED".to_string(),
                    message: "Connection is already authenticated".to_string(),
                })
                .await;
        }

        ClientFrame::Join { room_id, role } => {
            match state.lifecycle.join(&room_id, &role, connection_id).await {
                Ok(joined) => {
                    let _ = tx
                        .send(ServerFrame::Joined {
                            room_id: joined.room_id,
                            participant_id: joined.participant_id,
                            participants: joined.participants,
                        })
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(ServerFrame::Error {
                            code: e.error_code().to_string(),
                            message: e.client_message(),
                        })
                        .await;
                }
            }
        }

        ClientFrame::Leave { room_id } => {
            // No reply owed; structural rejections are only logged.
            if let Err(e) = state.lifecycle.leave(&room_id, connection_id).await {
                debug!(
                    target: "sc.connection",
                    connection_id = %connection_id,
                    error = %e,
                    "Leave ignored"
                );
            }
        }

        ClientFrame::NegotiationOffer(body) => {
            relay(state, tx, connection_id, SignalKind::Offer, body).await;
        }
        ClientFrame::NegotiationAnswer(body) => {
            relay(state, tx, connection_id, SignalKind::Answer, body).await;
        }
        ClientFrame::NegotiationCandidate(body) => {
            relay(state, tx, connection_id, SignalKind::Candidate, body).await;
        }
        ClientFrame::RelayPayload(body) => {
            relay(state, tx, connection_id, SignalKind::Relay, body).await;
        }

        ClientFrame::Ping => {
            let _ = tx.send(ServerFrame::Pong).await;
        }
    }
}

async fn relay(
    state: &AppState,
    tx: &mpsc::Sender<ServerFrame>,
    connection_id: &str,
    kind: SignalKind,
    body: crate::protocol::SignalBody,
) {
    if let Err(e) = state.router.route(connection_id, kind, body).await {
        let _ = tx
            .send(ServerFrame::Error {
                code: e.error_code().to_string(),
                message: e.client_message(),
            })
            .await;
    }
}
