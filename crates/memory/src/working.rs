//! Working memory (§4.2): a bounded, ordered FIFO buffer of the most
//! recent messages. The hot tier — everything else in the system is
//! downstream of what overflows out of here.

use chrono::Utc;
use memory_core::{Message, Metadata, Role};
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Result of a `compress` call: the synthetic placeholder and the
/// messages it replaces. Both are empty when there was nothing to
/// compress.
pub struct CompressResult {
    pub summary: Option<Message>,
    pub compressed: Vec<Message>,
}

/// A single reader-writer lock guards the whole buffer (§4.2
/// Concurrency): Add/Clear/Compress are writers, Recent/All/Size are
/// readers. All accessors return defensive copies.
pub struct WorkingStore {
    capacity: usize,
    buffer: RwLock<VecDeque<Message>>,
}

impl WorkingStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: RwLock::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `msg`, then evict from the front until size == capacity.
    /// Never rejects. This is the standalone contract (§8 S2): a caller
    /// using `WorkingStore` directly always observes size ≤ capacity
    /// after `add` returns.
    pub fn add(&self, msg: Message) {
        let mut buffer = self.buffer.write();
        buffer.push_back(msg);
        Self::evict_to_capacity(&mut buffer, self.capacity);
    }

    /// Append without evicting. Used only by the orchestrator's
    /// auto-compress pipeline (§4.5), which needs the genuine overflow
    /// to still be present when it calls `compress` — if `add` evicted
    /// it first, `compress` would never see anything to do. The
    /// overflow this permits is exactly the "+1" the invariant in §3
    /// tolerates: "the instant between append and compress trigger".
    /// Plain `add` remains the store's self-contained contract for any
    /// caller that does not also drive `compress`.
    pub fn add_overflowing(&self, msg: Message) {
        self.buffer.write().push_back(msg);
    }

    fn evict_to_capacity(buffer: &mut VecDeque<Message>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }

    /// Last `n` messages, oldest first. `n == 0` returns an empty vec.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        if n == 0 {
            return Vec::new();
        }
        let buffer = self.buffer.read();
        let start = buffer.len().saturating_sub(n);
        buffer.iter().skip(start).cloned().collect()
    }

    pub fn all(&self) -> Vec<Message> {
        self.buffer.read().iter().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn clear(&self) {
        self.buffer.write().clear();
    }

    /// Moves the oldest `size - capacity` messages out of the buffer
    /// into a synthetic summary placeholder (§4.2). A no-op (empty
    /// result) when the buffer isn't over capacity. Does not reinsert
    /// the summary — that's the orchestrator's job (§4.5).
    pub fn compress(&self) -> CompressResult {
        let mut buffer = self.buffer.write();
        if buffer.len() <= self.capacity {
            return CompressResult {
                summary: None,
                compressed: Vec::new(),
            };
        }

        let overflow = buffer.len() - self.capacity;
        let compressed: Vec<Message> = buffer.drain(..overflow).collect();
        drop(buffer);

        let oldest_ts = compressed.first().map(|m| m.timestamp);
        let newest_ts = compressed.last().map(|m| m.timestamp);

        let mut metadata = Metadata::new();
        metadata.insert("type", "summary");
        metadata.insert("compressed_count", compressed.len() as i64);
        if let Some(ts) = oldest_ts {
            metadata.insert("compressed_from", ts.to_rfc3339());
        }
        if let Some(ts) = newest_ts {
            metadata.insert("compressed_to", ts.to_rfc3339());
        }

        let summary = Message::new(
            Role::System,
            format!("[Compressed {} older messages]", compressed.len()),
        )
        .with_timestamp(Utc::now())
        .with_metadata(metadata);

        CompressResult {
            summary: Some(summary),
            compressed,
        }
    }
}
