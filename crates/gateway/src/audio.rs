//! PCM helpers: frame sizing constants and sample-rate conversion.

/// Browser WebAudio prefers 48 kHz.
pub const SAMPLE_RATE_BROWSER: u32 = 48_000;
/// Telephony media streams use 16 kHz.
pub const SAMPLE_RATE_TELEPHONY: u32 = 16_000;

/// 100 ms at 48 kHz mono 16-bit.
pub const BROWSER_FRAME_BYTES: usize = 4800;
/// 40 ms at 16 kHz mono 16-bit.
pub const TELEPHONY_FRAME_BYTES: usize = 640;
/// Real-time duration of one telephony frame.
pub const TELEPHONY_FRAME_MS: u64 = 40;

/// Reinterpret little-endian PCM bytes as i16 samples. A trailing odd byte
/// is dropped.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Linear-interpolation resampler for mono i16 PCM.
///
/// Good enough for 24 kHz provider audio feeding a 16 kHz telephony leg.
/// Output stays clamped to the i16 range.
pub fn resample_linear(input: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src = i as f64 * ratio;
        let idx = src.floor() as usize;
        let frac = src - idx as f64;

        let a = input[idx] as f64;
        let b = if idx + 1 < input.len() {
            input[idx + 1] as f64
        } else {
            a
        };
        let sample = a + (b - a) * frac;
        out.push(sample.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
    }

    out
}
