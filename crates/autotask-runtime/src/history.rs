//! Execution history storage.

use std::cmp::Ordering;
use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use autotask_protocols::{
    ExecutionRecord, HistoryError, HistoryPage, HistoryQuery, Pagination, SortField, SortOrder,
};

/// Records kept by [`MemoryHistoryStore::default`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Storage for finalized execution records.
///
/// Implementations must filter by exact task type, sort, and only then
/// paginate; `Pagination::total` is the size of the filtered set.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one record.
    async fn append(&self, record: ExecutionRecord) -> Result<(), HistoryError>;

    /// Read one page, optionally restricted to a task type.
    async fn query(
        &self,
        task_type: Option<&str>,
        query: &HistoryQuery,
    ) -> Result<HistoryPage, HistoryError>;

    /// Number of records currently stored.
    async fn len(&self) -> Result<usize, HistoryError>;
}

/// In-memory ring buffer of execution records.
///
/// When full, the oldest record is evicted before a new one is added.
pub struct MemoryHistoryStore {
    records: RwLock<VecDeque<ExecutionRecord>>,
    capacity: usize,
}

impl MemoryHistoryStore {
    /// Create a store holding at most `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

fn compare(a: &ExecutionRecord, b: &ExecutionRecord, field: SortField) -> Ordering {
    match field {
        SortField::StartTime => a.start_time.cmp(&b.start_time),
        SortField::EndTime => a.end_time.cmp(&b.end_time),
        SortField::Duration => a.duration_ms.cmp(&b.duration_ms),
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: ExecutionRecord) -> Result<(), HistoryError> {
        let mut records = self.records.write();
        while records.len() >= self.capacity {
            if let Some(evicted) = records.pop_front() {
                trace!(execution_id = %evicted.execution_id, "Evicted history record");
            }
        }
        records.push_back(record);
        Ok(())
    }

    async fn query(
        &self,
        task_type: Option<&str>,
        query: &HistoryQuery,
    ) -> Result<HistoryPage, HistoryError> {
        let mut matching: Vec<ExecutionRecord> = {
            let records = self.records.read();
            records
                .iter()
                .filter(|r| task_type.is_none_or(|t| r.task_type == t))
                .cloned()
                .collect()
        };

        // Stable sort: ties keep insertion order in both directions.
        match query.sort_order {
            SortOrder::Asc => matching.sort_by(|a, b| compare(a, b, query.sort_by)),
            SortOrder::Desc => matching.sort_by(|a, b| compare(b, a, query.sort_by)),
        }

        let total = matching.len();
        let records: Vec<ExecutionRecord> = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        let has_more = query.offset.saturating_add(records.len()) < total;

        Ok(HistoryPage {
            records,
            pagination: Pagination {
                total,
                limit: query.limit,
                offset: query.offset,
                has_more,
            },
        })
    }

    async fn len(&self) -> Result<usize, HistoryError> {
        Ok(self.records.read().len())
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
