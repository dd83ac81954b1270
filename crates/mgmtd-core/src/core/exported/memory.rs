//! In-memory `KvStore` test double. Not a production backend (the real
//! distributed store is an external collaborator, §1) — this exists so the
//! exported-resource round-trip property (§8) can be exercised without a
//! real cluster.

use super::kv::{KvEvent, KvStore, KvTxn, KvTxnCond};
use crate::core::error::{EngineError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

pub struct MemoryKvStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    revision: AtomicU64,
    events: broadcast::Sender<KvEvent>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            data: RwLock::new(BTreeMap::new()),
            revision: AtomicU64::new(0),
            events,
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.write().insert(key.to_string(), value.clone());
        let _ = self.events.send(KvEvent::Put {
            key: key.to_string(),
            value,
            revision: self.next_revision(),
        });
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .data
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.write().remove(key);
        let _ = self.events.send(KvEvent::Delete {
            key: key.to_string(),
            revision: self.next_revision(),
        });
        Ok(())
    }

    async fn txn(&self, txn: KvTxn) -> Result<()> {
        {
            let data = self.data.read();
            for cond in &txn.conditions {
                let KvTxnCond::ValueEqualsOrAbsent { key, value } = cond;
                match data.get(key) {
                    None => {}
                    Some(existing) if existing == value => {}
                    Some(_) => {
                        return Err(EngineError::KvPermanent(format!(
                            "txn precondition failed for key {key}"
                        )));
                    }
                }
            }
        }
        let mut data = self.data.write();
        for (key, value) in txn.puts {
            data.insert(key.clone(), value.clone());
            let _ = self.events.send(KvEvent::Put {
                key,
                value,
                revision: self.next_revision(),
            });
        }
        for key in txn.deletes {
            data.remove(&key);
            let _ = self.events.send(KvEvent::Delete {
                key,
                revision: self.next_revision(),
            });
        }
        Ok(())
    }

    fn watch(&self, _prefix: &str) -> broadcast::Receiver<KvEvent> {
        self.events.subscribe()
    }
}
