// ===============================
// src/dedup.rs (bounded recent-execution-id window)
// ===============================
//
// FIFO window: VecDeque menjaga urutan insert, AHashSet untuk membership O(1).
// Id yang sudah ter-evict bisa diterima lagi bila muncul ulang; itu batas
// risiko yang disengaja (lihat ledger.rs).
//
use ahash::AHashSet as HashSet;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

#[derive(Debug, Clone)]
pub struct DedupWindow {
    order: VecDeque<String>,
    index: HashSet<String>,
    capacity: NonZeroUsize,
}

impl DedupWindow {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.get()),
            index: HashSet::with_capacity(capacity.get()),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Returns `false` (and changes nothing) when `id` is already present.
    pub fn insert(&mut self, id: String) -> bool {
        if self.index.contains(&id) {
            return false;
        }
        if self.order.len() >= self.capacity.get() {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }
        self.index.insert(id.clone());
        self.order.push_back(id);
        true
    }

    /// Replace contents with `ids` (oldest first). Only the most recent
    /// `capacity` distinct ids survive.
    pub fn load<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.order.clear();
        self.index.clear();
        for id in ids {
            self.insert(id);
        }
    }

    /// Ids oldest-first, the order they are persisted in.
    pub fn snapshot(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}
