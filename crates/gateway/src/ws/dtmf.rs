//! DTMF tone buffering.
//!
//! Digits accumulate until `#` (flush), `*` (clear), or 1.5 s of
//! inactivity (flush). A flushed sequence enters the work queue as a
//! synthetic final user utterance, so the orchestrator treats keypad input
//! exactly like speech.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::engine::event::SpeechEvent;
use crate::engine::queue::WorkQueue;

pub struct DtmfBuffer {
    digits: Mutex<String>,
    queue: Arc<WorkQueue>,
    flush_delay: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl DtmfBuffer {
    pub fn new(queue: Arc<WorkQueue>, flush_delay: Duration) -> Self {
        Self {
            digits: Mutex::new(String::new()),
            queue,
            flush_delay,
            timer: Mutex::new(None),
        }
    }

    /// Map the service's tone spellings onto single characters.
    pub fn normalize(raw: &str) -> Option<char> {
        match raw.trim().to_lowercase().as_str() {
            "0" | "zero" => Some('0'),
            "1" | "one" => Some('1'),
            "2" | "two" => Some('2'),
            "3" | "three" => Some('3'),
            "4" | "four" => Some('4'),
            "5" | "five" => Some('5'),
            "6" | "six" => Some('6'),
            "7" | "seven" => Some('7'),
            "8" | "eight" => Some('8'),
            "9" | "nine" => Some('9'),
            "a" | "b" | "c" | "d" => raw.trim().to_uppercase().chars().next(),
            "#" | "pound" | "hash" => Some('#'),
            "*" | "star" | "asterisk" => Some('*'),
            _ => None,
        }
    }

    pub fn push(self: &Arc<Self>, raw_tone: &str) {
        let Some(tone) = Self::normalize(raw_tone) else {
            tracing::debug!(tone = raw_tone, "ignoring invalid DTMF tone");
            return;
        };

        match tone {
            '#' => {
                self.cancel_timer();
                self.flush("terminator");
            }
            '*' => {
                self.cancel_timer();
                self.clear();
            }
            digit => {
                let len = {
                    let mut digits = self.digits.lock();
                    digits.push(digit);
                    digits.len()
                };
                tracing::info!(%digit, buffer_len = len, "DTMF tone buffered");
                self.schedule_flush();
            }
        }
    }

    fn schedule_flush(self: &Arc<Self>) {
        self.cancel_timer();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(this.flush_delay).await;
            this.flush("timeout");
        });
        *self.timer.lock() = Some(task);
    }

    fn cancel_timer(&self) {
        if let Some(task) = self.timer.lock().take() {
            task.abort();
        }
    }

    fn flush(&self, reason: &str) {
        let sequence = std::mem::take(&mut *self.digits.lock());
        if sequence.is_empty() {
            return;
        }
        tracing::info!(len = sequence.len(), reason, "flushing DTMF buffer");
        self.queue.enqueue(SpeechEvent::Final {
            text: sequence,
            language: "dtmf".into(),
            speaker: None,
        });
    }

    pub fn clear(&self) {
        let mut digits = self.digits.lock();
        if !digits.is_empty() {
            tracing::info!(buffer_len = digits.len(), "clearing DTMF buffer");
            digits.clear();
        }
    }

    /// Stop the inactivity timer (session teardown).
    pub fn stop(&self) {
        self.cancel_timer();
    }
}
