//! WebSocket endpoint for live queries.
//!
//! ## Protocol
//!
//! ### Client → Server
//! ```json
//! {"type": "subscribe", "id": "tasks", "query": {"collection": "tasks", "filters": [...]}, "resume_after": 41}
//! {"type": "unsubscribe", "id": "tasks"}
//! {"type": "ping"}
//! ```
//!
//! ### Server → Client
//! ```json
//! {"type": "snapshot", "id": "tasks", "seq": 42, "documents": [...], "changes": [...]}
//! {"type": "error", "id": "tasks", "code": "permission_denied", "message": "..."}
//! {"type": "closed", "id": "tasks"}
//! {"type": "pong"}
//! ```

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::IntoResponse,
};
use crate::api::extractors::auth::AuthUser;
use crate::domain::models::{
    document::{Document, Query, Snapshot, SnapshotChange},
    user::Actor,
};
use crate::domain::services::document_service::DocumentService;
use crate::error::AppError;
use crate::state::AppState;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        id: String,
        query: Query,
        #[serde(default)]
        resume_after: Option<i64>,
    },
    Unsubscribe {
        id: String,
    },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot {
        id: String,
        seq: i64,
        documents: Vec<Document>,
        changes: Vec<SnapshotChange>,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: &'static str,
        message: String,
    },
    Closed {
        id: String,
    },
    Pong,
}

impl ServerMessage {
    fn snapshot(id: &str, snapshot: Snapshot) -> Self {
        ServerMessage::Snapshot {
            id: id.to_string(),
            seq: snapshot.seq,
            documents: snapshot.documents,
            changes: snapshot.changes,
        }
    }

    fn error(id: Option<&str>, err: &AppError) -> Self {
        ServerMessage::Error {
            id: id.map(str::to_string),
            code: err.code(),
            message: err.public_message(),
        }
    }
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let documents = state.documents.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, documents, user.actor, user.session_id))
}

async fn handle_connection(socket: WebSocket, documents: Arc<DocumentService>, actor: Actor, session_id: Uuid) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    let mut active: HashMap<String, JoinHandle<()>> = HashMap::new();

    info!(user = actor.label(), "Live query connection established");

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("WebSocket receive error: {}", e);
                        break;
                    }
                };
                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::Subscribe { id, query, resume_after }) => {
                        if let Some(previous) = active.remove(&id) {
                            previous.abort();
                        }
                        match documents.subscribe(actor.clone(), Some(session_id), query, resume_after).await {
                            Ok(mut subscription) => {
                                let out = out_tx.clone();
                                let sub_id = id.clone();
                                let handle = tokio::spawn(async move {
                                    while let Some(item) = subscription.next().await {
                                        let msg = match item {
                                            Ok(snapshot) => ServerMessage::snapshot(&sub_id, snapshot),
                                            Err(e) => ServerMessage::error(Some(&sub_id), &e),
                                        };
                                        if out.send(msg).await.is_err() {
                                            return;
                                        }
                                    }
                                    let _ = out.send(ServerMessage::Closed { id: sub_id }).await;
                                });
                                active.insert(id, handle);
                            }
                            Err(e) => {
                                let _ = out_tx.send(ServerMessage::error(Some(&id), &e)).await;
                            }
                        }
                    }
                    Ok(ClientMessage::Unsubscribe { id }) => {
                        if let Some(handle) = active.remove(&id) {
                            handle.abort();
                            let _ = out_tx.send(ServerMessage::Closed { id }).await;
                        }
                    }
                    Ok(ClientMessage::Ping) => {
                        let _ = out_tx.send(ServerMessage::Pong).await;
                    }
                    Err(e) => {
                        let err = AppError::InvalidArgument(format!("Malformed message: {}", e));
                        let _ = out_tx.send(ServerMessage::error(None, &err)).await;
                    }
                }
            }
            Some(msg) = out_rx.recv() => {
                let payload = match serde_json::to_string(&msg) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Failed to encode live query message: {}", e);
                        continue;
                    }
                };
                if ws_sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    for (_, handle) in active.drain() {
        handle.abort();
    }
    info!(user = actor.label(), "Live query connection closed");
}
