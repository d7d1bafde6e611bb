//! Execution record and history query types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One finalized execution. Immutable once appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub task_type: String,
    /// Parameters after defaults were merged.
    pub parameters: Value,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    /// Present iff `success`. An explicit `null` result stays `Some(Null)`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub result: Option<Value>,
    /// Present iff not `success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ExecutionRecord {
    /// Record a successful execution.
    pub fn succeeded(
        execution_id: impl Into<String>,
        task_type: impl Into<String>,
        parameters: Value,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        result: Value,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            task_type: task_type.into(),
            parameters,
            start_time,
            end_time,
            duration_ms: duration_ms(start_time, end_time),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Record a terminal failure.
    pub fn failed(
        execution_id: impl Into<String>,
        task_type: impl Into<String>,
        parameters: Value,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            task_type: task_type.into(),
            parameters,
            start_time,
            end_time,
            duration_ms: duration_ms(start_time, end_time),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Milliseconds between two instants, clamped at zero.
pub fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    end.signed_duration_since(start).num_milliseconds().max(0) as u64
}

/// Envelope returned by a successful on-demand execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub result: Value,
}

/// Field history records are sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    StartTime,
    EndTime,
    Duration,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Paging and ordering options for a history read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
}

fn default_limit() -> usize {
    50
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl HistoryQuery {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn sorted_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = field;
        self.sort_order = order;
        self
    }
}

/// Pagination metadata for a history page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Size of the filtered set, not of the whole store.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// One page of history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    #[serde(rename = "history")]
    pub records: Vec<ExecutionRecord>,
    pub pagination: Pagination,
}
