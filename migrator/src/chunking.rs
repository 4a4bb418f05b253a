//! Splitting a batch for backends with per-write limits.
//!
//! Table-style stores cap a single transactional write by operation count and by
//! payload size (e.g. 100 operations / 4 MiB). Targets stage a batch as several
//! such writes while still reporting one count for the whole batch.

use crate::types::TimeoutRecord;

/// Per-write limits of a staging backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    pub max_operations: usize,
    pub max_bytes: usize,
}

impl ChunkLimits {
    pub const DEFAULT_MAX_OPERATIONS: usize = 100;
    pub const DEFAULT_MAX_BYTES: usize = 4 * 1024 * 1024;

    pub fn new(max_operations: usize, max_bytes: usize) -> Self {
        Self {
            max_operations: max_operations.max(1),
            max_bytes: max_bytes.max(1),
        }
    }
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_OPERATIONS, Self::DEFAULT_MAX_BYTES)
    }
}

/// Split `records` into chunks within `limits`, keeping their order.
///
/// A record larger than `max_bytes` on its own is put in a chunk by itself.
pub fn chunk_records(records: Vec<TimeoutRecord>, limits: ChunkLimits) -> Vec<Vec<TimeoutRecord>> {
    let mut chunks = Vec::new();
    let mut current: Vec<TimeoutRecord> = Vec::new();
    let mut current_bytes = 0usize;

    for record in records {
        let size = record.estimated_size();
        let full = current.len() >= limits.max_operations
            || (!current.is_empty() && current_bytes + size > limits.max_bytes);
        if full {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(record);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
