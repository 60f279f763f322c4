//! Process-local [`MemoryProvider`] for dev mode and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use vg_domain::error::Result;

use crate::provider::{MemoryProvider, Namespace};

type Bucket = HashMap<String, Value>;

/// In-process store: `(namespace, session_id) → {key → value}`.
#[derive(Default)]
pub struct LocalMemoryStore {
    buckets: RwLock<HashMap<(Namespace, String), Bucket>>,
}

impl LocalMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryProvider for LocalMemoryStore {
    async fn get(&self, ns: Namespace, session_id: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .buckets
            .read()
            .get(&(ns, session_id.to_owned()))
            .and_then(|b| b.get(key).cloned()))
    }

    async fn set(&self, ns: Namespace, session_id: &str, key: &str, value: Value) -> Result<()> {
        self.buckets
            .write()
            .entry((ns, session_id.to_owned()))
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, ns: Namespace, session_id: &str, key: &str) -> Result<()> {
        if let Some(bucket) = self.buckets.write().get_mut(&(ns, session_id.to_owned())) {
            bucket.remove(key);
        }
        Ok(())
    }

    async fn set_many(
        &self,
        ns: Namespace,
        session_id: &str,
        entries: Vec<(String, Value)>,
    ) -> Result<()> {
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry((ns, session_id.to_owned())).or_default();
        for (k, v) in entries {
            bucket.insert(k, v);
        }
        Ok(())
    }

    async fn load_namespace(
        &self,
        ns: Namespace,
        session_id: &str,
    ) -> Result<HashMap<String, Value>> {
        Ok(self
            .buckets
            .read()
            .get(&(ns, session_id.to_owned()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = LocalMemoryStore::new();
        store
            .set(Namespace::Core, "s1", "k", json!("core"))
            .await
            .unwrap();
        store
            .set(Namespace::Context, "s1", "k", json!("ctx"))
            .await
            .unwrap();

        assert_eq!(
            store.get(Namespace::Core, "s1", "k").await.unwrap(),
            Some(json!("core"))
        );
        assert_eq!(
            store.get(Namespace::Context, "s1", "k").await.unwrap(),
            Some(json!("ctx"))
        );
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = LocalMemoryStore::new();
        store
            .set(Namespace::Core, "s1", "k", json!(1))
            .await
            .unwrap();
        assert_eq!(store.get(Namespace::Core, "s2", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_many_then_load_namespace() {
        let store = LocalMemoryStore::new();
        store
            .set_many(
                Namespace::Core,
                "s1",
                vec![("a".into(), json!(1)), ("b".into(), json!(2))],
            )
            .await
            .unwrap();
        let all = store.load_namespace(Namespace::Core, "s1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["b"], json!(2));
    }
}
