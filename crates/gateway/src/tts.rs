//! TTS playback: synthesize text and stream framed audio to the
//! transport with cooperative cancellation.
//!
//! One playback at a time per session: `speak` serializes on an internal
//! lock, so a queued request waits for the in-flight utterance. The frame
//! loop checks the session cancel signal between frames; on cancellation it
//! clears the signal and returns `false` (the caller decides whether to
//! notify upstream). Synthesis runs on the blocking worker pool so the
//! scheduler lane never stalls.

use std::sync::Arc;

use base64::Engine as _;
use serde_json::Value;

use vg_domain::capability::VoiceSpec;
use vg_domain::error::Result;
use vg_protocol::browser::BrowserAudioFrame;
use vg_protocol::telephony::TelephonyOutbound;

use crate::audio::{
    BROWSER_FRAME_BYTES, SAMPLE_RATE_BROWSER, TELEPHONY_FRAME_BYTES, TELEPHONY_FRAME_MS,
};
use crate::pools::TtsPool;
use crate::session::context::{SessionContext, TransportKind};

/// Where framed audio goes. WS handlers implement this over their outbound
/// channel; tests collect the JSON.
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    async fn send_json(&self, value: Value) -> Result<()>;
}

/// Invoked exactly once when the first frame of an utterance is sent.
pub type FirstAudioHook = Box<dyn FnOnce() + Send>;

/// Clears a playback flag even when the surrounding future is dropped
/// (barge-in aborts the turn task mid-`speak`).
struct FlagGuard<'a> {
    context: &'a SessionContext,
    synthesizing: bool,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        if self.synthesizing {
            self.context.set_synthesizing(false);
        } else {
            self.context.set_audio_playing(false);
        }
    }
}

pub struct TtsPlayback {
    context: Arc<SessionContext>,
    pool: Arc<TtsPool>,
    sink: Arc<dyn AudioSink>,
    fallback_voice: VoiceSpec,
    /// Pace telephony frames in real time instead of flooding the socket.
    pacing: bool,
    lock: tokio::sync::Mutex<()>,
}

impl TtsPlayback {
    pub fn new(
        context: Arc<SessionContext>,
        pool: Arc<TtsPool>,
        sink: Arc<dyn AudioSink>,
        fallback_voice: VoiceSpec,
        pacing: bool,
    ) -> Self {
        Self {
            context,
            pool,
            sink,
            fallback_voice,
            pacing,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Voice priority: caller override, then the active agent, then the
    /// configured fallback.
    fn resolve_voice(&self, override_voice: Option<VoiceSpec>) -> VoiceSpec {
        if let Some(v) = override_voice {
            return v;
        }
        if let Some(agent) = self.context.active_agent() {
            if let Some(v) = &agent.voice {
                return v.clone();
            }
        }
        self.fallback_voice.clone()
    }

    /// Synthesize and play one utterance.
    ///
    /// Returns `true` on complete playback, `false` on cancellation or any
    /// synthesis/transport failure.
    pub async fn speak(
        &self,
        text: &str,
        voice_override: Option<VoiceSpec>,
        on_first_audio: Option<FirstAudioHook>,
    ) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        // Nearest queued request wins the lock next.
        let _guard = self.lock.lock().await;

        let voice = self.resolve_voice(voice_override);
        let sample_rate = self.context.transport.sample_rate();

        let synth = match self.pool.acquire(&self.context.session_id) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(session = %self.context.session_short(), error = %e, "no synthesizer available");
                return false;
            }
        };

        // Late cancellation that arrived before synthesis began.
        if self.context.cancel.take() {
            tracing::debug!(session = %self.context.session_short(), "speak cancelled before synthesis");
            return false;
        }

        let pcm = {
            self.context.set_synthesizing(true);
            let _guard = FlagGuard {
                context: self.context.as_ref(),
                synthesizing: true,
            };
            let text_owned = text.to_owned();
            let voice_owned = voice.clone();
            tokio::task::spawn_blocking(move || {
                synth.synthesize_to_pcm(&text_owned, &voice_owned, sample_rate)
            })
            .await
        };

        let pcm = match pcm {
            Ok(Ok(pcm)) if !pcm.is_empty() => pcm,
            Ok(Ok(_)) => {
                tracing::warn!(session = %self.context.session_short(), "synthesis returned empty PCM");
                return false;
            }
            Ok(Err(e)) => {
                tracing::warn!(session = %self.context.session_short(), error = %e, "synthesis failed");
                return false;
            }
            Err(e) => {
                tracing::warn!(session = %self.context.session_short(), error = %e, "synthesis task failed");
                return false;
            }
        };

        self.context.set_audio_playing(true);
        let _guard = FlagGuard {
            context: self.context.as_ref(),
            synthesizing: false,
        };
        match self.context.transport {
            TransportKind::Telephony => self.stream_to_telephony(&pcm, on_first_audio).await,
            TransportKind::Browser | TransportKind::Realtime => {
                self.stream_to_browser(&pcm, on_first_audio).await
            }
        }
    }

    async fn stream_to_browser(
        &self,
        pcm: &[u8],
        mut on_first_audio: Option<FirstAudioHook>,
    ) -> bool {
        let total_frames = pcm.len().div_ceil(BROWSER_FRAME_BYTES);
        tracing::debug!(
            session = %self.context.session_short(),
            bytes = pcm.len(),
            frames = total_frames,
            "streaming to browser"
        );

        for (frame_index, chunk) in pcm.chunks(BROWSER_FRAME_BYTES).enumerate() {
            if self.context.cancel.take() {
                tracing::debug!(session = %self.context.session_short(), "browser stream cancelled");
                return false;
            }

            let frame = BrowserAudioFrame::new(
                base64::engine::general_purpose::STANDARD.encode(chunk),
                SAMPLE_RATE_BROWSER,
                frame_index,
                total_frames,
                frame_index + 1 == total_frames,
            );
            let value = match serde_json::to_value(&frame) {
                Ok(v) => v,
                Err(_) => return false,
            };
            if self.sink.send_json(value).await.is_err() {
                return false;
            }

            if let Some(hook) = on_first_audio.take() {
                hook();
            }

            tokio::task::yield_now().await;
        }

        true
    }

    async fn stream_to_telephony(
        &self,
        pcm: &[u8],
        mut on_first_audio: Option<FirstAudioHook>,
    ) -> bool {
        for chunk in pcm.chunks(TELEPHONY_FRAME_BYTES) {
            if self.context.cancel.take() {
                tracing::debug!(session = %self.context.session_short(), "telephony stream cancelled");
                return false;
            }

            let frame = TelephonyOutbound::audio_frame(
                base64::engine::general_purpose::STANDARD.encode(chunk),
            );
            let value = match serde_json::to_value(&frame) {
                Ok(v) => v,
                Err(_) => return false,
            };
            if self.sink.send_json(value).await.is_err() {
                return false;
            }

            if let Some(hook) = on_first_audio.take() {
                hook();
            }

            if self.pacing {
                tokio::time::sleep(std::time::Duration::from_millis(TELEPHONY_FRAME_MS)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_context, CollectingSink, SilenceSynth};
    use crate::session::context::TransportKind;
    use parking_lot::Mutex;

    fn playback(
        transport: TransportKind,
        pcm_bytes: usize,
    ) -> (Arc<SessionContext>, Arc<CollectingSink>, TtsPlayback) {
        let context = Arc::new(make_context(transport));
        let sink = Arc::new(CollectingSink::default());
        let pool: Arc<TtsPool> = Arc::new(crate::pools::ClientPool::new(
            "tts",
            Box::new(move || Ok(Arc::new(SilenceSynth { bytes: pcm_bytes }) as _)),
        ));
        let tts = TtsPlayback::new(
            Arc::clone(&context),
            pool,
            Arc::clone(&sink) as _,
            VoiceSpec::named("en-US-JennyNeural"),
            false,
        );
        (context, sink, tts)
    }

    #[tokio::test]
    async fn browser_framing_and_final_marker() {
        // 2.5 browser frames → 3 frames, last one final.
        let (_ctx, sink, tts) = playback(TransportKind::Browser, BROWSER_FRAME_BYTES * 2 + 100);
        assert!(tts.speak("hello there", None, None).await);

        let frames = sink.values();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["type"], "audio_data");
        assert_eq!(frames[0]["frame_index"], 0);
        assert_eq!(frames[0]["total_frames"], 3);
        assert_eq!(frames[0]["is_final"], false);
        assert_eq!(frames[2]["is_final"], true);
    }

    #[tokio::test]
    async fn telephony_framing_has_no_final_marker() {
        let (_ctx, sink, tts) = playback(TransportKind::Telephony, TELEPHONY_FRAME_BYTES * 2);
        assert!(tts.speak("hi", None, None).await);

        let frames = sink.values();
        assert_eq!(frames.len(), 2);
        for frame in &frames {
            assert_eq!(frame["kind"], "AudioData");
            assert_eq!(frame["audioData"]["silent"], false);
            assert!(frame.get("is_final").is_none());
        }
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let (_ctx, sink, tts) = playback(TransportKind::Browser, 100);
        assert!(!tts.speak("   ", None, None).await);
        assert!(sink.values().is_empty());
    }

    #[tokio::test]
    async fn empty_synthesis_returns_false() {
        let (_ctx, sink, tts) = playback(TransportKind::Browser, 0);
        assert!(!tts.speak("hello", None, None).await);
        assert!(sink.values().is_empty());
    }

    #[tokio::test]
    async fn pre_synthesis_cancel_clears_signal_and_fails() {
        let (ctx, sink, tts) = playback(TransportKind::Browser, 100);
        ctx.cancel.set();
        assert!(!tts.speak("hello", None, None).await);
        assert!(!ctx.cancel.is_set());
        assert!(sink.values().is_empty());
    }

    #[tokio::test]
    async fn mid_stream_cancel_stops_frames() {
        let (ctx, sink, tts) = playback(TransportKind::Browser, BROWSER_FRAME_BYTES * 10);
        // Cancel once the second frame has been sent.
        let trip = Arc::new(Mutex::new(0usize));
        sink.set_on_send({
            let ctx = Arc::clone(&ctx);
            let trip = Arc::clone(&trip);
            Box::new(move || {
                let mut sent = trip.lock();
                *sent += 1;
                if *sent == 2 {
                    ctx.request_cancel();
                }
            })
        });

        assert!(!tts.speak("long utterance", None, None).await);
        assert!(sink.values().len() < 10);
        // Observing the cancellation cleared the signal.
        assert!(!ctx.cancel.is_set());
        assert!(!ctx.is_audio_playing());
    }

    #[tokio::test]
    async fn first_audio_hook_fires_once() {
        let (_ctx, _sink, tts) = playback(TransportKind::Browser, BROWSER_FRAME_BYTES * 3);
        let fired = Arc::new(Mutex::new(0usize));
        let hook = {
            let fired = Arc::clone(&fired);
            Box::new(move || *fired.lock() += 1)
        };
        assert!(tts.speak("hello", None, Some(hook)).await);
        assert_eq!(*fired.lock(), 1);
    }

    #[tokio::test]
    async fn playback_flag_is_true_during_send() {
        let (ctx, sink, tts) = playback(TransportKind::Browser, BROWSER_FRAME_BYTES);
        let observed = Arc::new(Mutex::new(false));
        sink.set_on_send({
            let ctx = Arc::clone(&ctx);
            let observed = Arc::clone(&observed);
            Box::new(move || {
                *observed.lock() = ctx.is_audio_playing();
            })
        });
        assert!(tts.speak("hello", None, None).await);
        assert!(*observed.lock());
        assert!(!ctx.is_audio_playing());
    }
}
