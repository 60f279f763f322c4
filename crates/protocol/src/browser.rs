//! Browser audio channel frames.

use serde::{Deserialize, Serialize};

/// One playback frame sent to the browser.
///
/// `frame_index`/`total_frames` let the client render progress and detect
/// gaps; `is_final` marks the last frame of an utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserAudioFrame {
    /// Always `"audio_data"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Base64 PCM.
    pub data: String,
    pub sample_rate: u32,
    pub frame_index: usize,
    pub total_frames: usize,
    pub is_final: bool,
}

impl BrowserAudioFrame {
    pub fn new(
        data: String,
        sample_rate: u32,
        frame_index: usize,
        total_frames: usize,
        is_final: bool,
    ) -> Self {
        Self {
            kind: "audio_data".into(),
            data,
            sample_rate,
            frame_index,
            total_frames,
            is_final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_serializes_with_type_tag() {
        let frame = BrowserAudioFrame::new("QQ==".into(), 48_000, 0, 3, false);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "audio_data");
        assert_eq!(json["sample_rate"], 48_000);
        assert_eq!(json["is_final"], false);
    }
}
