//! Telephony media-stream endpoint.
//!
//! Flow:
//! 1. The call-control service connects to `/ws/telephony`.
//! 2. Inbound envelopes carry PCM frames, DTMF tones, and format metadata.
//! 3. Outbound frames are paced `AudioData` envelopes; barge-in emits one
//!    `StopAudio` (latched until playback resumes).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use vg_protocol::telephony::{TelephonyInbound, TelephonyOutbound};

use crate::audio::{self, SAMPLE_RATE_TELEPHONY};
use crate::engine::ingress::BargeInHandler;
use crate::session::context::TransportKind;
use crate::state::AppState;
use crate::ws::{build_session, teardown_session, WsJsonSink};

/// GET /ws/telephony — upgrade to the media stream.
pub async fn telephony_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let connection_id = uuid::Uuid::new_v4().to_string();

    // Outbound pump: everything leaves through one channel so frame order
    // is the send order.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let pump = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let stop_audio_pending = Arc::new(AtomicBool::new(false));
    let sink = Arc::new(WsJsonSink::new(
        out_tx.clone(),
        Arc::clone(&stop_audio_pending),
    ));

    // Barge-in: interrupt the service's playback exactly once per
    // interruption window.
    let barge_in: BargeInHandler = {
        let out_tx = out_tx.clone();
        let stop_audio_pending = Arc::clone(&stop_audio_pending);
        Arc::new(move || {
            let out_tx = out_tx.clone();
            let stop_audio_pending = Arc::clone(&stop_audio_pending);
            Box::pin(async move {
                if stop_audio_pending.swap(true, Ordering::AcqRel) {
                    return;
                }
                if let Ok(text) = serde_json::to_string(&TelephonyOutbound::stop()) {
                    let _ = out_tx.send(text).await;
                }
            })
        })
    };

    let live = match build_session(
        &state,
        TransportKind::Telephony,
        &connection_id,
        sink,
        barge_in,
    )
    .await
    {
        Ok(live) => live,
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "session setup failed");
            if let Ok(text) =
                serde_json::to_string(&TelephonyOutbound::error("SetupFailed", e.to_string()))
            {
                let _ = out_tx.send(text).await;
            }
            pump.abort();
            return;
        }
    };

    // Inbound rate announced by the service; frames are resampled to the
    // recognizer's native 16 kHz when they differ.
    let inbound_rate = AtomicU32::new(SAMPLE_RATE_TELEPHONY);

    while let Some(message) = ws_stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<TelephonyInbound>(&text) {
                Ok(TelephonyInbound::AudioData { audio_data }) => {
                    if audio_data.silent {
                        continue;
                    }
                    match base64::engine::general_purpose::STANDARD.decode(&audio_data.data) {
                        Ok(bytes) => {
                            let rate = inbound_rate.load(Ordering::Relaxed);
                            let bytes = if rate == SAMPLE_RATE_TELEPHONY {
                                bytes
                            } else {
                                let samples = audio::bytes_to_samples(&bytes);
                                audio::samples_to_bytes(&audio::resample_linear(
                                    &samples,
                                    rate,
                                    SAMPLE_RATE_TELEPHONY,
                                ))
                            };
                            if let Err(e) = live.engine.ingress.write_audio(&bytes) {
                                tracing::warn!(error = %e, "audio write failed");
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "undecodable audio payload"),
                    }
                }
                Ok(TelephonyInbound::AudioMetadata { audio_metadata }) => {
                    inbound_rate.store(audio_metadata.sample_rate, Ordering::Relaxed);
                    tracing::info!(
                        sample_rate = audio_metadata.sample_rate,
                        channels = audio_metadata.channels,
                        "audio metadata updated"
                    );
                }
                Ok(TelephonyInbound::StopAudio) => {
                    tracing::debug!("input buffer committed");
                }
                Ok(TelephonyInbound::DtmfData { dtmf_data }) => {
                    live.dtmf.push(&dtmf_data.data);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "unrecognized inbound envelope");
                }
            },
            Ok(Message::Binary(bytes)) => {
                if let Err(e) = live.engine.ingress.write_audio(&bytes) {
                    tracing::warn!(error = %e, "audio write failed");
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    teardown_session(&state, live).await;
    pump.abort();
}
