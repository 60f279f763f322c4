//! Typed work-queue events.
//!
//! One sum type instead of an event-type field plus downcasts: the queue's
//! drop/evict policy keys off [`SpeechEvent::is_droppable`], and Lane B
//! routes on the variant.

use vg_domain::capability::VoiceSpec;

#[derive(Debug, Clone)]
pub enum SpeechEvent {
    /// Interim recognition. Droppable under pressure.
    Partial {
        text: String,
        language: String,
        speaker: Option<String>,
    },

    /// Final recognition — starts a turn.
    Final {
        text: String,
        language: String,
        speaker: Option<String>,
    },

    /// Recognizer failure. Logged by Lane B, never fatal to the loop.
    Error { message: String },

    /// A text chunk to play through the unified TTS queue.
    TtsResponse {
        text: String,
        voice: Option<VoiceSpec>,
    },

    /// Agent greeting playback (barge-in suppressed while speaking).
    Greeting {
        text: String,
        voice: Option<VoiceSpec>,
    },

    /// Out-of-band announcement.
    Announcement {
        text: String,
        voice: Option<VoiceSpec>,
    },

    /// Progress note ("still working on it...").
    StatusUpdate {
        text: String,
        voice: Option<VoiceSpec>,
    },
}

impl SpeechEvent {
    /// Only interim transcriptions may be dropped when the queue is full.
    pub fn is_droppable(&self) -> bool {
        matches!(self, SpeechEvent::Partial { .. })
    }

    /// TTS responses must not be dropped; they block with a timeout instead.
    pub fn requires_blocking_enqueue(&self) -> bool {
        matches!(self, SpeechEvent::TtsResponse { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeechEvent::Partial { .. } => "partial",
            SpeechEvent::Final { .. } => "final",
            SpeechEvent::Error { .. } => "error",
            SpeechEvent::TtsResponse { .. } => "tts_response",
            SpeechEvent::Greeting { .. } => "greeting",
            SpeechEvent::Announcement { .. } => "announcement",
            SpeechEvent::StatusUpdate { .. } => "status_update",
        }
    }
}
