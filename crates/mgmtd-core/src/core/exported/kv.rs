//! The contract the core expects from the external KV store (§6). Calls
//! are serialised through whatever queueing discipline the concrete client
//! uses; the core only depends on this trait.

use crate::core::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub enum KvEvent {
    Put { key: String, value: Vec<u8>, revision: u64 },
    Delete { key: String, revision: u64 },
}

#[derive(Debug, Clone)]
pub enum KvTxnCond {
    ValueEqualsOrAbsent { key: String, value: Vec<u8> },
}

#[derive(Debug, Clone, Default)]
pub struct KvTxn {
    pub conditions: Vec<KvTxnCond>,
    pub puts: Vec<(String, Vec<u8>)>,
    pub deletes: Vec<String>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn txn(&self, txn: KvTxn) -> Result<()>;

    /// Subscribe to put/delete events under `prefix`. A watch only signals
    /// that *something* changed; callers re-read the full subtree rather
    /// than trust the event's payload, matching §4.8's collection rule.
    fn watch(&self, prefix: &str) -> tokio::sync::broadcast::Receiver<KvEvent>;
}
