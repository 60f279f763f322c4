//! LLM stream driver.
//!
//! The provider stream is consumed by a spawned task feeding a bounded
//! channel; the consumer side runs the sentence splitter, assembles
//! tool-call deltas, and enforces the turn's timing discipline: a hard cap
//! on the whole stream and a per-chunk wait that only breaks once the
//! producer has finished. Once a tool-call delta is seen, TTS dispatch is
//! suppressed for the rest of the response (the narration after a handoff
//! belongs to the next agent).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use vg_domain::capability::{ChatRequest, LlmClient};
use vg_domain::error::{Error, Result};
use vg_domain::message::ToolCall;
use vg_domain::stream::{StreamEvent, Usage};

use crate::session::cancel::CancelSignal;

use super::splitter::SentenceSplitter;

/// What one streamed response produced.
#[derive(Debug, Default)]
pub struct StreamOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub response_id: Option<String>,
    pub tool_call_detected: bool,
    /// The consumer stopped because the session cancel signal fired.
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct StreamParams {
    pub turn_timeout: Duration,
    pub chunk_timeout: Duration,
    pub min_chunk: usize,
    pub max_buffer: usize,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(90),
            chunk_timeout: Duration::from_secs(5),
            min_chunk: 15,
            max_buffer: 80,
        }
    }
}

#[derive(Default)]
struct ToolCallBuf {
    id: String,
    name: String,
    arguments: String,
}

/// Drive one streaming completion.
///
/// `on_chunk` receives sentence-sized text for synthesis; `on_first_token`
/// fires once for TTFT accounting. Errors out only on request/stream
/// failure — the caller owns the apology policy.
pub async fn drive_stream(
    llm: &dyn LlmClient,
    req: ChatRequest,
    cancel: &CancelSignal,
    params: &StreamParams,
    on_first_token: &(dyn Fn() + Send + Sync),
    on_chunk: &(dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync),
) -> Result<StreamOutcome> {
    let mut stream = llm.chat_stream(req).await?;

    // The provider stream runs in its own task; a bounded channel carries
    // events to this consumer.
    let (tx, mut rx) = mpsc::channel::<Result<StreamEvent>>(64);
    let producer = tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });

    let deadline = Instant::now() + params.turn_timeout;
    let mut splitter = SentenceSplitter::with_limits(params.min_chunk, params.max_buffer);

    let mut outcome = StreamOutcome::default();
    let mut bufs: BTreeMap<usize, ToolCallBuf> = BTreeMap::new();
    let mut first_token_seen = false;

    loop {
        if Instant::now() > deadline {
            tracing::error!("LLM stream exceeded the turn cap, abandoning");
            break;
        }
        if cancel.is_set() {
            // Stop forwarding chunks; the turn records what was produced.
            outcome.cancelled = true;
            break;
        }

        let event = match tokio::time::timeout(params.chunk_timeout, rx.recv()).await {
            Err(_) => {
                if producer.is_finished() {
                    tracing::warn!("stream finished without a terminal event");
                    break;
                }
                continue;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                producer.abort();
                return Err(e);
            }
            Ok(Some(Ok(event))) => event,
        };

        match event {
            StreamEvent::Token { text } => {
                if !first_token_seen {
                    first_token_seen = true;
                    on_first_token();
                }
                outcome.text.push_str(&text);
                if !outcome.tool_call_detected {
                    for chunk in splitter.push(&text) {
                        on_chunk(chunk).await;
                    }
                }
            }
            StreamEvent::ToolCallDelta {
                index,
                call_id,
                name,
                arguments,
            } => {
                if !outcome.tool_call_detected {
                    outcome.tool_call_detected = true;
                    tracing::debug!("tool call detected, suppressing TTS dispatch");
                }
                let buf = bufs.entry(index).or_default();
                if let Some(id) = call_id {
                    buf.id = id;
                }
                if let Some(n) = name {
                    buf.name = n;
                }
                buf.arguments.push_str(&arguments);
            }
            StreamEvent::Done { usage, response_id } => {
                if let Some(u) = usage {
                    outcome.usage = u;
                }
                outcome.response_id = response_id;
                break;
            }
            StreamEvent::Error { message } => {
                producer.abort();
                return Err(Error::Llm {
                    provider: "stream".into(),
                    message,
                });
            }
        }
    }

    producer.abort();

    // Flush the tail unless a tool call owns the rest of the response.
    if !outcome.tool_call_detected && !outcome.cancelled {
        if let Some(rest) = splitter.flush() {
            on_chunk(rest).await;
        }
    }

    // Assemble tool calls, dropping the malformed.
    for (index, buf) in bufs {
        let name = buf.name.trim();
        if name.is_empty() {
            tracing::debug!(index, "skipping tool call with empty name");
            continue;
        }
        let arguments: Value = if buf.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&buf.arguments) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(tool = name, error = %e, "tool call arguments are not valid JSON, skipping");
                    continue;
                }
            }
        };
        outcome.tool_calls.push(ToolCall {
            call_id: if buf.id.is_empty() {
                format!("call_{index}")
            } else {
                buf.id
            },
            tool_name: name.to_owned(),
            arguments,
        });
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::ScriptedLlm;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn chunk_sink(log: Arc<Mutex<Vec<String>>>) -> impl Fn(String) -> BoxFuture<'static, ()> + Send + Sync {
        move |chunk| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push(chunk);
            })
        }
    }

    async fn drive(llm: &ScriptedLlm, cancel: &CancelSignal) -> (StreamOutcome, Vec<String>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = chunk_sink(Arc::clone(&log));
        let outcome = drive_stream(
            llm,
            ChatRequest::default(),
            cancel,
            &StreamParams::default(),
            &|| {},
            &sink,
        )
        .await
        .unwrap();
        let chunks = log.lock().clone();
        (outcome, chunks)
    }

    #[tokio::test]
    async fn text_streams_into_chunks() {
        let llm = ScriptedLlm::new();
        llm.push_script(ScriptedLlm::text_script(
            "Your balance is $1,234.56. Anything else?",
        ));
        let cancel = CancelSignal::new();
        let (outcome, chunks) = drive(&llm, &cancel).await;

        assert_eq!(outcome.text, "Your balance is $1,234.56. Anything else?");
        assert!(!outcome.tool_call_detected);
        assert!(!chunks.is_empty());
        // Everything dispatched, nothing lost.
        let joined = chunks.join(" ");
        assert!(joined.contains("$1,234.56."));
        assert!(joined.ends_with("Anything else?"));
    }

    #[tokio::test]
    async fn tool_call_assembles_across_deltas() {
        let llm = ScriptedLlm::new();
        llm.push_script(ScriptedLlm::tool_call_script(
            "handoff_to_agent",
            r#"{"target_agent": "Advisor", "reason": "user request"}"#,
            None,
        ));
        let cancel = CancelSignal::new();
        let (outcome, chunks) = drive(&llm, &cancel).await;

        assert!(chunks.is_empty());
        assert_eq!(outcome.tool_calls.len(), 1);
        let call = &outcome.tool_calls[0];
        assert_eq!(call.tool_name, "handoff_to_agent");
        assert_eq!(call.arguments["target_agent"], "Advisor");
    }

    #[tokio::test]
    async fn text_after_tool_call_is_suppressed() {
        let llm = ScriptedLlm::new();
        llm.push_script(vec![
            StreamEvent::ToolCallDelta {
                index: 0,
                call_id: Some("c1".into()),
                name: Some("handoff_to_agent".into()),
                arguments: r#"{"target_agent": "Advisor"}"#.into(),
            },
            StreamEvent::Token {
                text: "Transferring you to our advisor now, one moment please.".into(),
            },
            StreamEvent::Done {
                usage: None,
                response_id: None,
            },
        ]);
        let cancel = CancelSignal::new();
        let (outcome, chunks) = drive(&llm, &cancel).await;

        // Narration is kept in the transcript but never spoken.
        assert!(outcome.text.contains("Transferring you"));
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn malformed_tool_arguments_are_skipped() {
        let llm = ScriptedLlm::new();
        llm.push_script(vec![
            StreamEvent::ToolCallDelta {
                index: 0,
                call_id: Some("c1".into()),
                name: Some("lookup_customer".into()),
                arguments: r#"{"client_id": "#.into(),
            },
            StreamEvent::Done {
                usage: None,
                response_id: None,
            },
        ]);
        let cancel = CancelSignal::new();
        let (outcome, _) = drive(&llm, &cancel).await;
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn empty_arguments_default_to_object() {
        let llm = ScriptedLlm::new();
        llm.push_script(vec![
            StreamEvent::ToolCallDelta {
                index: 0,
                call_id: Some("c1".into()),
                name: Some("refresh".into()),
                arguments: String::new(),
            },
            StreamEvent::Done {
                usage: None,
                response_id: None,
            },
        ]);
        let cancel = CancelSignal::new();
        let (outcome, _) = drive(&llm, &cancel).await;
        assert_eq!(outcome.tool_calls[0].arguments, serde_json::json!({}));
    }

    #[tokio::test]
    async fn stream_error_event_becomes_llm_error() {
        let llm = ScriptedLlm::new();
        llm.push_script(vec![StreamEvent::Error {
            message: "rate limited".into(),
        }]);
        let cancel = CancelSignal::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = chunk_sink(Arc::clone(&log));
        let err = drive_stream(
            &llm,
            ChatRequest::default(),
            &cancel,
            &StreamParams::default(),
            &|| {},
            &sink,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Llm { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_forwarding() {
        let llm = ScriptedLlm::new();
        llm.push_script(ScriptedLlm::text_script(
            "A first sentence that is long enough to flush. And then a second one follows here.",
        ));
        let cancel = Arc::new(CancelSignal::new());

        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let log = Arc::clone(&log);
            let cancel = Arc::clone(&cancel);
            move |chunk: String| -> BoxFuture<'static, ()> {
                let log = Arc::clone(&log);
                let cancel = Arc::clone(&cancel);
                Box::pin(async move {
                    log.lock().push(chunk);
                    // Barge-in after the first dispatched chunk.
                    cancel.set();
                })
            }
        };

        let outcome = drive_stream(
            &llm,
            ChatRequest::default(),
            &cancel,
            &StreamParams::default(),
            &|| {},
            &sink,
        )
        .await
        .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn first_token_hook_fires_once() {
        let llm = ScriptedLlm::new();
        llm.push_script(ScriptedLlm::text_script("Hello there, how can I help?"));
        let cancel = CancelSignal::new();
        let counter = Arc::new(Mutex::new(0usize));
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = chunk_sink(Arc::clone(&log));
        let hook = {
            let counter = Arc::clone(&counter);
            move || *counter.lock() += 1
        };
        drive_stream(
            &llm,
            ChatRequest::default(),
            &cancel,
            &StreamParams::default(),
            &hook,
            &sink,
        )
        .await
        .unwrap();
        assert_eq!(*counter.lock(), 1);
    }
}
