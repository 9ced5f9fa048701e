//! # Dedup Cache
//!
//! Bounded FIFO set of inbound event ids. Platforms redeliver events on retry; anything
//! still resident is reported as a duplicate. Eviction is strictly by insertion order.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    order: VecDeque<String>,
    members: HashSet<String>,
}

pub struct DedupCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Returns `true` if `event_id` is resident, otherwise records it and returns `false`.
    /// Check and insert happen under one lock.
    pub fn seen(&self, event_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.members.contains(event_id) {
            return true;
        }
        inner.members.insert(event_id.to_string());
        inner.order.push_back(event_id.to_string());
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.members.remove(&oldest);
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .order
            .len()
    }
}
