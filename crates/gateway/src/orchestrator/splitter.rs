//! Streaming sentence splitter.
//!
//! Accumulates LLM text deltas and decides when a chunk is worth sending to
//! synthesis. Flush policy:
//! - primary breaks `.` `!` `?` once the buffer is near the minimum;
//! - secondary breaks `;` `:` newline when no primary break is close
//!   (comma excluded so numbers like "100,000" never split);
//! - forced flush when the buffer outgrows `max_buffer`, cutting at the
//!   last space before the limit.
//!
//! A break slightly below the minimum (within 5 bytes) still flushes; both
//! limits are fields, not constants, so the thresholds are tunable.

const PRIMARY_BREAKS: [char; 3] = ['.', '!', '?'];
const SECONDARY_BREAKS: [char; 3] = [';', ':', '\n'];

#[derive(Debug)]
pub struct SentenceSplitter {
    min_chunk: usize,
    max_buffer: usize,
    buffer: String,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self::with_limits(15, 80)
    }

    pub fn with_limits(min_chunk: usize, max_buffer: usize) -> Self {
        Self {
            min_chunk,
            max_buffer,
            buffer: String::new(),
        }
    }

    /// Feed a delta; returns the chunks that became ready.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        let mut out = Vec::new();

        while self.buffer.len() >= self.min_chunk {
            let near_min = self.min_chunk as isize - 5;

            let mut break_idx: isize = -1;
            for t in PRIMARY_BREAKS {
                if let Some(i) = self.buffer.rfind(t) {
                    break_idx = break_idx.max(i as isize);
                }
            }
            if break_idx < near_min {
                for t in SECONDARY_BREAKS {
                    if let Some(i) = self.buffer.rfind(t) {
                        break_idx = break_idx.max(i as isize);
                    }
                }
            }

            if break_idx >= near_min {
                // All break characters are single-byte, so +1 stays on a
                // char boundary.
                let cut = break_idx as usize + 1;
                let chunk: String = self.buffer.drain(..cut).collect();
                push_trimmed(&mut out, chunk);
            } else if self.buffer.len() >= self.max_buffer {
                let limit = floor_char_boundary(&self.buffer, self.max_buffer);
                match self.buffer[..limit].rfind(' ') {
                    Some(space) if space > self.min_chunk => {
                        let chunk: String = self.buffer.drain(..space).collect();
                        // Drop the separator space itself.
                        self.buffer.remove(0);
                        push_trimmed(&mut out, chunk);
                    }
                    _ => {
                        let chunk: String = self.buffer.drain(..limit).collect();
                        push_trimmed(&mut out, chunk);
                    }
                }
            } else {
                break;
            }
        }

        out
    }

    /// Hand back whatever is left (end of stream).
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn push_trimmed(out: &mut Vec<String>, chunk: String) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_owned());
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collapse_ws(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Stream text in small deltas; the chunks plus the flush must equal
    /// the input up to whitespace normalization.
    fn stream(text: &str, delta: usize) -> Vec<String> {
        let mut splitter = SentenceSplitter::new();
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(delta) {
            let piece: String = piece.iter().collect();
            chunks.extend(splitter.push(&piece));
        }
        chunks.extend(splitter.flush());
        chunks
    }

    #[test]
    fn content_is_preserved() {
        let text = "Your balance is $1,234.56. Anything else I can help with today? \
                    Let me know; I'm happy to assist.";
        for delta in [1, 3, 7, 100] {
            let chunks = stream(text, delta);
            assert_eq!(collapse_ws(&chunks.join(" ")), collapse_ws(text), "delta={delta}");
        }
    }

    #[test]
    fn primary_break_flushes_sentence() {
        let mut s = SentenceSplitter::new();
        let chunks = s.push("Your balance is $1,234.");
        assert_eq!(chunks, vec!["Your balance is $1,234."]);
        assert_eq!(s.pending_len(), 0);
    }

    #[test]
    fn tail_below_minimum_waits_for_flush() {
        let mut s = SentenceSplitter::new();
        s.push("Your balance is $1,234.");
        let chunks = s.push("56.");
        assert!(chunks.is_empty());
        assert_eq!(s.flush().unwrap(), "56.");
    }

    #[test]
    fn never_splits_inside_a_number() {
        let text = "We invested $100,000 total.";
        for delta in [1, 2, 5] {
            for chunk in stream(text, delta) {
                // A chunk containing the first half of the figure carries
                // the second half too.
                if chunk.contains("100,") {
                    assert!(chunk.contains("100,000"), "split inside number: {chunk:?}");
                }
            }
        }
    }

    #[test]
    fn secondary_break_used_when_no_sentence_end() {
        let mut s = SentenceSplitter::new();
        let chunks = s.push("Here are the options: first one is savings");
        assert_eq!(chunks, vec!["Here are the options:"]);
    }

    #[test]
    fn forced_flush_cuts_at_last_space() {
        let mut s = SentenceSplitter::new();
        let text = "a".repeat(40) + " " + &"b".repeat(60);
        let chunks = s.push(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "a".repeat(40));
    }

    #[test]
    fn forced_flush_without_space_cuts_at_limit() {
        let mut s = SentenceSplitter::new();
        let text = "x".repeat(100);
        let chunks = s.push(&text);
        assert_eq!(chunks, vec!["x".repeat(80)]);
        assert_eq!(s.pending_len(), 20);
    }

    #[test]
    fn short_text_never_flushes_early() {
        let mut s = SentenceSplitter::new();
        assert!(s.push("Hi.").is_empty());
        assert_eq!(s.flush().unwrap(), "Hi.");
    }

    #[test]
    fn flush_on_empty_is_none() {
        let mut s = SentenceSplitter::new();
        assert!(s.flush().is_none());
        s.push("   ");
        assert!(s.flush().is_none());
    }

    #[test]
    fn multibyte_text_is_not_split_mid_char() {
        let text = "é".repeat(120);
        let chunks = stream(&text, 7);
        // Every chunk is valid UTF-8 by construction; verify totals.
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert_eq!(total, 120);
    }
}
