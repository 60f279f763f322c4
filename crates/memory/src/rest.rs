//! REST implementation of [`MemoryProvider`].
//!
//! Wraps a `reqwest::Client` and translates every trait method into an HTTP
//! call against the memory service, with automatic retry + exponential
//! back-off on transient (5xx / timeout) failures.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use uuid::Uuid;

use vg_domain::config::MemoryConfig;
use vg_domain::error::{Error, Result};

use crate::provider::{MemoryProvider, Namespace};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST-based client for the session memory service.
///
/// Created once and reused for the lifetime of the process. The underlying
/// `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestMemoryClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl RestMemoryClient {
    pub fn new(cfg: &MemoryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key: cfg.api_key.clone(),
            max_retries: cfg.max_retries,
        })
    }

    // ── request helpers ──────────────────────────────────────────────

    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        let trace_id = Uuid::new_v4().to_string();
        let mut rb = rb
            .header("X-Client-Type", "voicegate")
            .header("X-Trace-Id", &trace_id);
        if let Some(ref key) = self.api_key {
            rb = rb.header("X-Api-Key", key);
        }
        rb
    }

    fn key_url(&self, ns: Namespace, session_id: &str, key: &str) -> String {
        format!(
            "{}/api/state/{}/{}/{}",
            self.base_url,
            ns.as_str(),
            session_id,
            key
        )
    }

    fn namespace_url(&self, ns: Namespace, session_id: &str) -> String {
        format!("{}/api/state/{}/{}", self.base_url, ns.as_str(), session_id)
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off on transient
    /// errors. Retries on 5xx and timeouts; 4xx is permanent.
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let rb = self.decorate(build_request());
            match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Memory(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                        continue;
                    }
                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Memory(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                    }
                    return Ok(resp);
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(Error::Timeout(format!("{endpoint}: {e}")));
                    continue;
                }
                Err(e) => return Err(Error::Http(format!("{endpoint}: {e}"))),
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Memory(format!("{endpoint}: retries exhausted"))))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryProvider impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl MemoryProvider for RestMemoryClient {
    async fn get(&self, ns: Namespace, session_id: &str, key: &str) -> Result<Option<Value>> {
        let url = self.key_url(ns, session_id, key);
        let resp = match self
            .execute_with_retry("state.get", || self.http.get(&url))
            .await
        {
            Ok(resp) => resp,
            // Missing keys surface as a 404 from the service; reads fall
            // back to defaults per the error policy.
            Err(Error::Memory(msg)) if msg.contains("404") => return Ok(None),
            Err(e) => return Err(e),
        };
        let value: Value = resp
            .json()
            .await
            .map_err(|e| Error::Memory(format!("state.get decode: {e}")))?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, ns: Namespace, session_id: &str, key: &str, value: Value) -> Result<()> {
        let url = self.key_url(ns, session_id, key);
        self.execute_with_retry("state.set", || self.http.put(&url).json(&value))
            .await?;
        Ok(())
    }

    async fn delete(&self, ns: Namespace, session_id: &str, key: &str) -> Result<()> {
        let url = self.key_url(ns, session_id, key);
        self.execute_with_retry("state.delete", || self.http.delete(&url))
            .await?;
        Ok(())
    }

    async fn set_many(
        &self,
        ns: Namespace,
        session_id: &str,
        entries: Vec<(String, Value)>,
    ) -> Result<()> {
        let url = self.namespace_url(ns, session_id);
        let body: HashMap<&str, &Value> =
            entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        self.execute_with_retry("state.set_many", || self.http.patch(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn load_namespace(
        &self,
        ns: Namespace,
        session_id: &str,
    ) -> Result<HashMap<String, Value>> {
        let url = self.namespace_url(ns, session_id);
        let resp = match self
            .execute_with_retry("state.load", || self.http.get(&url))
            .await
        {
            Ok(resp) => resp,
            Err(Error::Memory(msg)) if msg.contains("404") => return Ok(HashMap::new()),
            Err(e) => return Err(e),
        };
        resp.json()
            .await
            .map_err(|e| Error::Memory(format!("state.load decode: {e}")))
    }
}
