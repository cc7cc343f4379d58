//! Per-session WebSocket transport
//!
//! One persistent connection per session carries the JSON protocol both
//! ways: client inputs are queued on the session, completed turns are
//! drained from the session output queue and pushed to the client.

use crate::http::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use mowa_core::protocol::{now_timestamp, ClientMessage, ServerMessage};
use mowa_core::{Error, TurnInput};
use mowa_engine::Session;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.manager.get_session(&id) {
        Ok(session) => ws.on_upgrade(move |socket| handle_socket(socket, session)),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), ()> {
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize server message: {}", e);
            return Err(());
        }
    };
    sender.send(Message::Text(json)).await.map_err(|e| {
        warn!("failed to send websocket message: {}", e);
    })
}

async fn handle_socket(socket: WebSocket, session: Arc<Session>) {
    let session_id = session.id().to_string();
    info!("websocket attached to session {}", session_id);

    let (mut sender, mut receiver) = socket.split();
    let established = ServerMessage::ConnectionEstablished {
        session_id: session_id.clone(),
        timestamp: now_timestamp(),
    };
    if send_message(&mut sender, &established).await.is_err() {
        return;
    }

    // The output queue is handed over exclusively; a second concurrent
    // connection for the same session is refused.
    let Some(mut output_rx) = session.take_output() else {
        let _ = send_message(
            &mut sender,
            &ServerMessage::Error {
                error_type: "connection_conflict".to_string(),
                message: "session already has an attached connection".to_string(),
            },
        )
        .await;
        return;
    };

    'conn: loop {
        tokio::select! {
            completed = output_rx.recv() => match completed {
                Some(turn) => {
                    if let Some(message) = ServerMessage::from_turn(&turn) {
                        if send_message(&mut sender, &message).await.is_err() {
                            break 'conn;
                        }
                    }
                }
                None => {
                    // Session loop exited: closed by stop, timeout or shutdown.
                    let _ = send_message(&mut sender, &ServerMessage::Error {
                        error_type: "session_closed".to_string(),
                        message: "session closed by server".to_string(),
                    }).await;
                    break 'conn;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    for reply in handle_client_message(&session, &text) {
                        if send_message(&mut sender, &reply).await.is_err() {
                            break 'conn;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("client closed websocket for session {}", session_id);
                    break 'conn;
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!("ignoring binary websocket message for session {}", session_id);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("websocket error for session {}: {}", session_id, e);
                    break 'conn;
                }
            },
        }
    }

    // Give the queue back so a reconnecting client can re-attach.
    session.restore_output(output_rx);
    info!("websocket detached from session {}", session_id);
}

/// Dispatch one client message, returning the immediate replies. Completed
/// turn results arrive later through the session output queue.
fn handle_client_message(session: &Arc<Session>, text: &str) -> Vec<ServerMessage> {
    session.touch();
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => return vec![ServerMessage::error(&e)],
    };

    match message {
        ClientMessage::TextMessage {
            text,
            get_idle_frames,
            frame_count,
        } => {
            if get_idle_frames {
                // Idle bootstrap: frames only, nothing enters the pipeline.
                let frames = session.idle_frames(frame_count.max(1));
                return vec![ServerMessage::TextProcessed {
                    response_text: String::new(),
                    audio_data: None,
                    video_frames: frames.iter().map(|f| f.to_base64()).collect(),
                    processing_time: 0.0,
                    timestamp: now_timestamp(),
                }];
            }
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return vec![ServerMessage::error(&Error::TransportDecode(
                    "text is required".to_string(),
                ))];
            }
            if trimmed.len() > session.limits().max_text_length {
                return vec![ServerMessage::error(&Error::TransportDecode(format!(
                    "text exceeds {} bytes",
                    session.limits().max_text_length
                )))];
            }
            match session.submit(TurnInput::Text(trimmed.to_string())) {
                Ok(_) => vec![ServerMessage::ProcessingStarted {
                    timestamp: now_timestamp(),
                }],
                Err(e) => vec![ServerMessage::error(&e)],
            }
        }
        ClientMessage::AudioChunk { audio_data } => {
            let bytes = match BASE64.decode(audio_data.as_bytes()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return vec![ServerMessage::error(&Error::TransportDecode(format!(
                        "invalid base64 audio: {}",
                        e
                    )))];
                }
            };
            if bytes.is_empty() {
                return vec![ServerMessage::error(&Error::TransportDecode(
                    "audio_data is required".to_string(),
                ))];
            }
            if bytes.len() > session.limits().max_audio_bytes {
                return vec![ServerMessage::error(&Error::TransportDecode(format!(
                    "audio exceeds {} bytes",
                    session.limits().max_audio_bytes
                )))];
            }
            match session.submit(TurnInput::Audio(Bytes::from(bytes))) {
                Ok(_) => vec![ServerMessage::ProcessingStarted {
                    timestamp: now_timestamp(),
                }],
                Err(e) => vec![ServerMessage::error(&e)],
            }
        }
        ClientMessage::ConfigUpdate { config } => {
            session.update_overrides(&config);
            vec![ServerMessage::ConfigUpdated {
                timestamp: now_timestamp(),
            }]
        }
        ClientMessage::Ping => vec![ServerMessage::Pong {
            timestamp: now_timestamp(),
        }],
    }
}
