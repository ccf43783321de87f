// ===============================
// src/store.rs (shared state store: trait + in-memory)
// ===============================
//
// Index semantics ikut redis: `start`/`end` inklusif, negatif dihitung dari
// ekor list (-1 = elemen terakhir). MemoryStore dipakai untuk STORE_MODE=memory
// dan sebagai test double.
//
use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::LedgerError;

/// Full ledger state written at the end of an `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotWrite<'a> {
    pub position_key: &'a str,
    pub position: String,
    pub ids_key: &'a str,
    pub new_ids: &'a [String],
    /// Keep only the last `keep` ids in the list after the push.
    pub keep: usize,
    /// Drop the stored id list before pushing (window was rebuilt elsewhere).
    pub replace_ids: bool,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), LedgerError>;
    async fn list_range(&self, key: &str, start: isize, end: isize) -> Result<Vec<String>, LedgerError>;
    async fn list_push_many(&self, key: &str, values: &[String]) -> Result<(), LedgerError>;
    async fn list_trim(&self, key: &str, start: isize, end: isize) -> Result<(), LedgerError>;
    async fn delete(&self, key: &str) -> Result<(), LedgerError>;

    /// One logical write of position + new ids. Adapters with transactions
    /// should override this to make it atomic.
    async fn write_snapshot(&self, w: &SnapshotWrite<'_>) -> Result<(), LedgerError> {
        self.set(w.position_key, &w.position).await?;
        if w.replace_ids {
            self.delete(w.ids_key).await?;
        }
        if !w.new_ids.is_empty() {
            self.list_push_many(w.ids_key, w.new_ids).await?;
            self.list_trim(w.ids_key, -(w.keep as isize), -1).await?;
        }
        Ok(())
    }
}

/// Resolve redis-style inclusive `[start, end]` into a half-open range over `len`.
pub fn resolve_range(len: usize, start: isize, end: isize) -> Option<(usize, usize)> {
    let len_i = len as isize;
    let norm = |i: isize| if i < 0 { (len_i + i).max(0) } else { i };
    let s = norm(start);
    let e = norm(end).min(len_i - 1);
    if len == 0 || s > e || s >= len_i {
        return None;
    }
    Some((s as usize, e as usize + 1))
}

#[derive(Debug, Default)]
struct MemInner {
    scalars: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemInner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (dipakai di test untuk jalur StoreUnavailable).
    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable("memory store: reads disabled".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), LedgerError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable("memory store: writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        self.check_read()?;
        Ok(self.inner.lock().scalars.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        self.check_write()?;
        self.inner.lock().scalars.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, end: isize) -> Result<Vec<String>, LedgerError> {
        self.check_read()?;
        let inner = self.inner.lock();
        let list = match inner.lists.get(key) {
            Some(l) => l,
            None => return Ok(Vec::new()),
        };
        Ok(match resolve_range(list.len(), start, end) {
            Some((s, e)) => list[s..e].to_vec(),
            None => Vec::new(),
        })
    }

    async fn list_push_many(&self, key: &str, values: &[String]) -> Result<(), LedgerError> {
        self.check_write()?;
        self.inner
            .lock()
            .lists
            .entry(key.to_string())
            .or_default()
            .extend(values.iter().cloned());
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: isize, end: isize) -> Result<(), LedgerError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        if let Some(list) = inner.lists.get_mut(key) {
            match resolve_range(list.len(), start, end) {
                Some((s, e)) => {
                    list.truncate(e);
                    list.drain(..s);
                }
                None => list.clear(),
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LedgerError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        inner.scalars.remove(key);
        inner.lists.remove(key);
        Ok(())
    }

    // Satu lock untuk seluruh snapshot supaya pembaca tidak melihat state setengah jadi.
    async fn write_snapshot(&self, w: &SnapshotWrite<'_>) -> Result<(), LedgerError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        inner.scalars.insert(w.position_key.to_string(), w.position.clone());
        if w.replace_ids {
            inner.lists.remove(w.ids_key);
        }
        if !w.new_ids.is_empty() {
            let list = inner.lists.entry(w.ids_key.to_string()).or_default();
            list.extend(w.new_ids.iter().cloned());
            if list.len() > w.keep {
                let excess = list.len() - w.keep;
                list.drain(..excess);
            }
        }
        Ok(())
    }
}
