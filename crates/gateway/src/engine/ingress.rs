//! Lane A — audio ingress.
//!
//! Owns the recognizer. The vendor SDK invokes our callbacks from its own
//! worker thread; they only post (barge-in probes to the bridge, events to
//! the work queue) and never suspend. The push stream is created eagerly
//! before recognition starts so the first audio frame is never lost.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use vg_domain::capability::{RecognizerEvents, SpeechRecognizer};
use vg_domain::error::{Error, Result};

use super::bridge::ThreadBridge;
use super::event::SpeechEvent;
use super::queue::WorkQueue;
use crate::session::context::SessionContext;

/// Transport-supplied barge-in reaction (stop audio output, notify the UI).
pub type BargeInHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A partial shorter than this is noise, not a barge-in.
const MIN_BARGE_IN_CHARS: usize = 3;
/// A final shorter than this is discarded.
const MIN_FINAL_CHARS: usize = 1;

pub struct SpeechIngress {
    recognizer: Arc<dyn SpeechRecognizer>,
    bridge: Arc<ThreadBridge>,
    queue: Arc<WorkQueue>,
    context: Arc<SessionContext>,
    barge_in: BargeInHandler,
}

impl SpeechIngress {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        bridge: Arc<ThreadBridge>,
        queue: Arc<WorkQueue>,
        context: Arc<SessionContext>,
        barge_in: BargeInHandler,
    ) -> Self {
        Self {
            recognizer,
            bridge,
            queue,
            context,
            barge_in,
        }
    }

    /// Pre-initialize the push stream, then start continuous recognition.
    pub fn start(&self) -> Result<()> {
        self.recognizer.prepare()?;
        if !self.recognizer.is_ready() {
            return Err(Error::Stt("push stream not initialized".into()));
        }

        let on_partial = {
            let bridge = Arc::clone(&self.bridge);
            let queue = Arc::clone(&self.queue);
            let context = Arc::clone(&self.context);
            let barge_in = Arc::clone(&self.barge_in);
            Box::new(move |text: &str, lang: &str, speaker: Option<&str>| {
                let trimmed = text.trim();
                if trimmed.len() > MIN_BARGE_IN_CHARS {
                    // First substantive partial starts the recognition timer.
                    context.latency.start_stt_timer();
                    let handler = Arc::clone(&barge_in);
                    bridge.schedule_barge_in(move || handler());
                }
                bridge.queue_speech_result(
                    &queue,
                    SpeechEvent::Partial {
                        text: trimmed.to_owned(),
                        language: lang.to_owned(),
                        speaker: speaker.map(str::to_owned),
                    },
                );
            }) as Box<dyn Fn(&str, &str, Option<&str>) + Send + Sync>
        };

        let on_final = {
            let bridge = Arc::clone(&self.bridge);
            let queue = Arc::clone(&self.queue);
            let context = Arc::clone(&self.context);
            Box::new(move |text: &str, lang: &str, speaker: Option<&str>| {
                let trimmed = text.trim();
                if trimmed.len() > MIN_FINAL_CHARS {
                    context.latency.stop_stt_timer();
                    bridge.queue_speech_result(
                        &queue,
                        SpeechEvent::Final {
                            text: trimmed.to_owned(),
                            language: lang.to_owned(),
                            speaker: speaker.map(str::to_owned),
                        },
                    );
                }
            }) as Box<dyn Fn(&str, &str, Option<&str>) + Send + Sync>
        };

        let on_error = {
            let bridge = Arc::clone(&self.bridge);
            let queue = Arc::clone(&self.queue);
            Box::new(move |message: &str| {
                bridge.queue_speech_result(
                    &queue,
                    SpeechEvent::Error {
                        message: message.to_owned(),
                    },
                );
            }) as Box<dyn Fn(&str) + Send + Sync>
        };

        self.recognizer.start(RecognizerEvents {
            on_partial,
            on_final,
            on_error,
        })?;

        tracing::info!(session = %self.context.session_short(), "speech ingress started");
        Ok(())
    }

    /// Push audio bytes from any context. Verifies readiness so frames are
    /// never written into a missing push stream.
    pub fn write_audio(&self, bytes: &[u8]) -> Result<()> {
        if !self.recognizer.is_ready() {
            return Err(Error::Stt("write before push stream ready".into()));
        }
        self.recognizer.write_audio(bytes)
    }

    pub fn stop(&self) {
        self.recognizer.stop();
        tracing::debug!(session = %self.context.session_short(), "speech ingress stopped");
    }
}
