//! Telephony media-stream envelopes.
//!
//! The call-control service speaks JSON over the media WebSocket. Inbound
//! messages are tagged by `kind`; outbound messages reproduce the service's
//! exact field shapes, including the capitalized `AudioData`/`StopAudio`
//! pair on the stop message.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client → server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TelephonyInbound {
    /// Format announcement; updates the expected sample rate.
    AudioMetadata {
        #[serde(rename = "audioMetadata")]
        audio_metadata: AudioMetadata,
    },

    /// A PCM audio frame.
    AudioData {
        #[serde(rename = "audioData")]
        audio_data: InboundAudio,
    },

    /// Commit the input buffer.
    StopAudio,

    /// A DTMF tone.
    DtmfData {
        #[serde(rename = "dtmfData")]
        dtmf_data: DtmfPayload,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMetadata {
    #[serde(rename = "sampleRate", alias = "rate")]
    pub sample_rate: u32,
    #[serde(default = "d_one")]
    pub channels: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

fn d_one() -> u16 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundAudio {
    /// Base64 PCM.
    pub data: String,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtmfPayload {
    /// The tone as sent by the service ("1".."9", "#", "*", "pound", ...).
    pub data: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server → client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TelephonyOutbound {
    /// A playback frame.
    AudioData {
        #[serde(rename = "audioData")]
        audio_data: OutboundAudio,
    },

    /// Interrupt playback. The service expects both keys to be present,
    /// `AudioData` null and `StopAudio` an empty object.
    StopAudio {
        #[serde(rename = "AudioData")]
        audio_data: Option<OutboundAudio>,
        #[serde(rename = "StopAudio")]
        stop_audio: Empty,
    },

    /// A fatal error before the connection closes.
    ErrorData {
        #[serde(rename = "errorData")]
        error_data: ErrorData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundAudio {
    /// Base64 PCM.
    pub data: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "participantRawID", default)]
    pub participant_raw_id: Option<String>,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

impl TelephonyOutbound {
    /// A non-silent playback frame carrying `b64` PCM.
    pub fn audio_frame(b64: String) -> Self {
        Self::AudioData {
            audio_data: OutboundAudio {
                data: b64,
                timestamp: None,
                participant_raw_id: None,
                silent: false,
            },
        }
    }

    pub fn stop() -> Self {
        Self::StopAudio {
            audio_data: None,
            stop_audio: Empty {},
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ErrorData {
            error_data: ErrorData {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_audio_data_parses() {
        let raw = r#"{"kind":"AudioData","audioData":{"data":"AAAA","silent":false}}"#;
        let msg: TelephonyInbound = serde_json::from_str(raw).unwrap();
        match msg {
            TelephonyInbound::AudioData { audio_data } => {
                assert_eq!(audio_data.data, "AAAA");
                assert!(!audio_data.silent);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn inbound_stop_audio_parses_without_payload() {
        let msg: TelephonyInbound = serde_json::from_str(r#"{"kind":"StopAudio"}"#).unwrap();
        assert!(matches!(msg, TelephonyInbound::StopAudio));
    }

    #[test]
    fn inbound_dtmf_parses() {
        let msg: TelephonyInbound =
            serde_json::from_str(r#"{"kind":"DtmfData","dtmfData":{"data":"5"}}"#).unwrap();
        match msg {
            TelephonyInbound::DtmfData { dtmf_data } => assert_eq!(dtmf_data.data, "5"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn audio_metadata_accepts_rate_alias() {
        let msg: TelephonyInbound = serde_json::from_str(
            r#"{"kind":"AudioMetadata","audioMetadata":{"rate":16000,"channels":1}}"#,
        )
        .unwrap();
        match msg {
            TelephonyInbound::AudioMetadata { audio_metadata } => {
                assert_eq!(audio_metadata.sample_rate, 16000)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn outbound_stop_has_null_audio_and_empty_object() {
        let json = serde_json::to_value(TelephonyOutbound::stop()).unwrap();
        assert_eq!(json["kind"], "StopAudio");
        assert!(json["AudioData"].is_null());
        assert_eq!(json["StopAudio"], serde_json::json!({}));
    }

    #[test]
    fn outbound_frame_is_not_silent() {
        let json = serde_json::to_value(TelephonyOutbound::audio_frame("QUJD".into())).unwrap();
        assert_eq!(json["kind"], "AudioData");
        assert_eq!(json["audioData"]["data"], "QUJD");
        assert_eq!(json["audioData"]["silent"], false);
    }
}
