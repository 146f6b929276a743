//! WebSocket chat endpoint.
//!
//! Each socket is split in two: a writer task drains the connection channel held by
//! the session store, and the reader loop feeds inbound messages to the engine.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::chat::connection::{ConnectionHandle, ConnectionSignal};
use crate::core::ids::{SessionId, UserId};
use crate::corpus::document::SourceRef;
use crate::engine::ChatReply;
use crate::storage::records::AnalyticsEvent;

use super::state::AppState;

/// Greeting sent when a socket connects.
pub const WELCOME_MESSAGE: &str = "Welcome to BigBikeBlitz AI Assistant! I'm here to help you find the perfect motorcycle and answer any questions about our services.";

/// Client frame.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    /// Message text.
    #[serde(default)]
    pub message: String,
    /// Optional user identifier.
    pub user_id: Option<String>,
}

/// Server frame.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Connection-level notice.
    System {
        /// Notice text.
        message: String,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// Reply to a user message.
    Response {
        /// Reply text.
        message: String,
        /// Session id.
        session_id: SessionId,
        /// Reply time.
        timestamp: DateTime<Utc>,
        /// Cited documents.
        sources: Vec<SourceRef>,
    },
}

impl Envelope {
    fn welcome() -> Self {
        Self::System {
            message: WELCOME_MESSAGE.to_string(),
            timestamp: Utc::now(),
        }
    }
}

impl From<ChatReply> for Envelope {
    fn from(reply: ChatReply) -> Self {
        Self::Response {
            message: reply.response,
            session_id: reply.session_id,
            timestamp: reply.timestamp,
            sources: reply.sources,
        }
    }
}

/// Upgrade `GET /ws/chat/{session_id}`.
pub async fn ws_chat(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, SessionId::new(session_id), socket))
}

async fn handle_socket(state: Arc<AppState>, session_id: SessionId, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let (handle, signals) = ConnectionHandle::channel();
    let writer = tokio::spawn(forward_signals(signals, sink));
    serve_connection(&state, &session_id, handle, stream).await;
    let _ = writer.await;
}

/// Drain queued signals into the socket until the channel closes or a close is requested.
async fn forward_signals<S>(mut signals: UnboundedReceiver<ConnectionSignal>, mut sink: S)
where
    S: Sink<WsMessage> + Unpin,
{
    while let Some(signal) = signals.recv().await {
        match signal {
            ConnectionSignal::Text(text) => {
                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            ConnectionSignal::Close => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
}

/// Register `handle` for the session, greet, answer each inbound frame, then
/// unregister once `frames` ends.
async fn serve_connection<S, E>(
    state: &AppState,
    session_id: &SessionId,
    handle: ConnectionHandle,
    mut frames: S,
) where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: fmt::Display,
{
    let handle_id = state.sessions().register_connection(session_id, handle.clone());
    info!(session_id = %session_id, "WebSocket connected");

    if let Some(json) = envelope_json(&Envelope::welcome()) {
        handle.send_text(json);
    }
    state
        .logger()
        .log_event(AnalyticsEvent::new("session_connected", Some(session_id.clone())))
        .await;

    while let Some(frame) = frames.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!(session_id = %session_id, "WebSocket receive error: {err}");
                break;
            }
        };
        let inbound: InboundMessage = match serde_json::from_str(text.as_str()) {
            Ok(inbound) => inbound,
            Err(err) => {
                debug!(session_id = %session_id, "Ignoring malformed frame: {err}");
                continue;
            }
        };

        let user_id = inbound.user_id.map(UserId::new);
        let Some(reply) = state
            .engine
            .handle_message(session_id, user_id, &inbound.message)
            .await
        else {
            continue;
        };
        let Some(json) = envelope_json(&Envelope::from(reply)) else {
            continue;
        };
        if !state.sessions().send_to(session_id, &json) {
            break;
        }
    }

    state.sessions().disconnect(session_id, Some(handle_id));
    drop(handle);
    state
        .logger()
        .log_event(AnalyticsEvent::new("session_disconnected", Some(session_id.clone())))
        .await;
    info!(session_id = %session_id, "WebSocket disconnected");
}

fn envelope_json(envelope: &Envelope) -> Option<String> {
    serde_json::to_string(envelope)
        .map_err(|err| warn!("Failed to serialize envelope: {err}"))
        .ok()
}
