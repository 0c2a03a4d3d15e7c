//! Diesel row models for companion task persistence.

use super::schema::{companion_task_statuses, companion_tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for companion tasks.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = companion_tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Task identifier.
    pub id: i64,
    /// Owning companion link.
    pub companion_link_id: uuid::Uuid,
    /// Task type tag.
    pub task_type: String,
    /// Untyped metadata payload.
    pub metadata: Option<Value>,
    /// Metadata version.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for companion tasks.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = companion_tasks)]
pub struct NewTaskRow {
    /// Owning companion link.
    pub companion_link_id: uuid::Uuid,
    /// Task type tag.
    pub task_type: String,
    /// Initial metadata payload.
    pub metadata: Option<Value>,
    /// Initial metadata version.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result row for status events.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = companion_task_statuses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StatusRow {
    /// Status event identifier.
    pub id: i64,
    /// Owning task.
    pub companion_task_id: i64,
    /// Status name.
    pub name: String,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insert model for status events.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = companion_task_statuses)]
pub struct NewStatusRow {
    /// Owning task.
    pub companion_task_id: i64,
    /// Status name.
    pub name: String,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}
