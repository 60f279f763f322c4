//! Shared client pools for the speech capabilities.
//!
//! Recognizers and synthesizers are acquired per session on start and
//! released on stop. A session that re-acquires gets its existing checkout
//! back.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use vg_domain::capability::{SpeechRecognizer, SpeechSynthesizer};
use vg_domain::error::{Error, Result};

type Factory<T> = Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

pub struct ClientPool<T: ?Sized> {
    label: &'static str,
    idle: Mutex<Vec<Arc<T>>>,
    checked_out: Mutex<HashMap<String, Arc<T>>>,
    factory: Factory<T>,
}

impl<T: ?Sized + Send + Sync> ClientPool<T> {
    pub fn new(label: &'static str, factory: Factory<T>) -> Self {
        Self {
            label,
            idle: Mutex::new(Vec::new()),
            checked_out: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Check a client out for a session, reusing an idle one when possible.
    pub fn acquire(&self, session_id: &str) -> Result<Arc<T>> {
        if let Some(existing) = self.checked_out.lock().get(session_id) {
            return Ok(Arc::clone(existing));
        }

        let client = match self.idle.lock().pop() {
            Some(client) => client,
            None => (self.factory)().map_err(|e| {
                Error::Other(format!("{} pool acquisition failed: {e}", self.label))
            })?,
        };
        self.checked_out
            .lock()
            .insert(session_id.to_owned(), Arc::clone(&client));
        tracing::debug!(pool = self.label, session_id, "client acquired");
        Ok(client)
    }

    /// Current checkout for a session, if any.
    pub fn get(&self, session_id: &str) -> Option<Arc<T>> {
        self.checked_out.lock().get(session_id).cloned()
    }

    /// Return a session's client to the idle set. Idempotent.
    pub fn release(&self, session_id: &str) {
        if let Some(client) = self.checked_out.lock().remove(session_id) {
            self.idle.lock().push(client);
            tracing::debug!(pool = self.label, session_id, "client released");
        }
    }
}

pub type SttPool = ClientPool<dyn SpeechRecognizer>;
pub type TtsPool = ClientPool<dyn SpeechSynthesizer>;

#[cfg(test)]
mod tests {
    use super::*;
    use vg_domain::capability::VoiceSpec;

    struct CountingSynth;

    impl SpeechSynthesizer for CountingSynth {
        fn synthesize_to_pcm(
            &self,
            _text: &str,
            _voice: &VoiceSpec,
            _sample_rate: u32,
        ) -> Result<Vec<u8>> {
            Ok(vec![0; 4])
        }
    }

    fn pool() -> TtsPool {
        ClientPool::new("tts", Box::new(|| Ok(Arc::new(CountingSynth) as _)))
    }

    #[test]
    fn acquire_is_stable_per_session() {
        let pool = pool();
        let a = pool.acquire("s1").unwrap();
        let b = pool.acquire("s1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn release_recycles_client() {
        let pool = pool();
        let a = pool.acquire("s1").unwrap();
        pool.release("s1");
        assert!(pool.get("s1").is_none());
        let b = pool.acquire("s2").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn release_unknown_session_is_noop() {
        let pool = pool();
        pool.release("ghost");
    }

    #[test]
    fn factory_failure_surfaces() {
        let pool: TtsPool = ClientPool::new(
            "tts",
            Box::new(|| Err(Error::Tts("synthesizer not ready".into()))),
        );
        assert!(pool.acquire("s1").is_err());
    }
}
