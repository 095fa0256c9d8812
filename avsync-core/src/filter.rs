//! Row filtering by task roles

use crate::model::{Row, Table};
use crate::task::FieldRoles;
use serde::{Deserialize, Serialize};

/// Exact-match filter over the status, type and project role cells.
///
/// A criterion applies only when it is non-empty and its role is
/// configured. Rows compare by display text; a missing cell compares as "".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowFilter {
    pub status: Option<String>,
    pub task_type: Option<String>,
    pub project: Option<String>,
}

impl RowFilter {
    /// A filter that admits every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn matches(&self, row: &Row, roles: &FieldRoles) -> bool {
        [
            (self.status.as_deref(), roles.status()),
            (self.task_type.as_deref(), roles.task_type()),
            (self.project.as_deref(), roles.project()),
        ]
        .into_iter()
        .all(|(wanted, key)| match (wanted.filter(|w| !w.is_empty()), key) {
            (Some(wanted), Some(key)) => row.text(key).unwrap_or("") == wanted,
            _ => true,
        })
    }
}

impl Table {
    /// Rows passing `filter`, in table order.
    pub fn filtered_rows<'a>(&'a self, filter: &'a RowFilter, roles: &'a FieldRoles) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows.iter().filter(move |row| filter.matches(row, roles))
    }
}
