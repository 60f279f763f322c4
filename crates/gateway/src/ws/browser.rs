//! Browser audio channel endpoint.
//!
//! Binary frames carry raw PCM from the microphone; text frames carry
//! small control messages (typed user text). Outbound traffic interleaves
//! `audio_data` frames with session event envelopes so the UI renders
//! transcripts and agent changes from the same socket.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::engine::ingress::BargeInHandler;
use crate::engine::SpeechEvent;
use crate::session::context::TransportKind;
use crate::state::AppState;
use crate::ws::{build_session, teardown_session, WsJsonSink};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BrowserInbound {
    /// Typed text submitted instead of speech.
    UserText { text: String },
    /// Client-side playback finished draining after a cancel.
    PlaybackStopped,
}

/// GET /ws/browser — upgrade to the audio channel.
pub async fn browser_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let connection_id = uuid::Uuid::new_v4().to_string();

    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let pump = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let sink = Arc::new(WsJsonSink::new(
        out_tx.clone(),
        Arc::new(AtomicBool::new(false)),
    ));

    // The browser reacts to the `assistant_cancelled` envelope; nothing
    // extra to send from the barge-in path.
    let barge_in: BargeInHandler = Arc::new(|| Box::pin(async {}));

    let live = match build_session(
        &state,
        TransportKind::Browser,
        &connection_id,
        sink,
        barge_in,
    )
    .await
    {
        Ok(live) => live,
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "session setup failed");
            pump.abort();
            return;
        }
    };

    // Forward session events to the UI alongside audio frames.
    let event_forwarder = {
        let mut events = live.context.events.subscribe();
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Ok(envelope) = events.recv().await {
                let Ok(text) = serde_json::to_string(&envelope) else {
                    continue;
                };
                if out_tx.send(text).await.is_err() {
                    break;
                }
            }
        })
    };
    live.context.register_task(event_forwarder);

    while let Some(message) = ws_stream.next().await {
        match message {
            Ok(Message::Binary(bytes)) => {
                if let Err(e) = live.engine.ingress.write_audio(&bytes) {
                    tracing::warn!(error = %e, "audio write failed");
                }
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<BrowserInbound>(&text) {
                Ok(BrowserInbound::UserText { text }) => {
                    live.engine.queue.enqueue(SpeechEvent::Final {
                        text,
                        language: "text".into(),
                        speaker: None,
                    });
                }
                Ok(BrowserInbound::PlaybackStopped) => {
                    live.context.set_audio_playing(false);
                }
                Err(e) => tracing::debug!(error = %e, "unrecognized browser message"),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    teardown_session(&state, live).await;
    pump.abort();
}
