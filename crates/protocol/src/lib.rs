//! Wire protocol: WebSocket envelopes for the telephony media stream, the
//! browser audio channel, and the uniform session event fan-out.
//!
//! Telephony envelopes mirror the call-control service's media-streaming
//! JSON exactly (including its asymmetric outbound shapes); browser frames
//! are VoiceGate's own format. Session envelopes are what UI listeners and
//! observability consumers subscribe to.

pub mod browser;
pub mod events;
pub mod telephony;

pub use browser::BrowserAudioFrame;
pub use events::{SessionEnvelope, SessionEventKind};
pub use telephony::{TelephonyInbound, TelephonyOutbound};
