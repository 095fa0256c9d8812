//! Gantt task view over the canonical table

use crate::enums::ColumnType;
use crate::error::ValidationError;
use crate::model::{Column, FieldUpdate, Row, Table};
use crate::projection::{extract_identifier, project_date, project_number, project_text};
use crate::shape::path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// FIELD ROLES
// ============================================================================

/// Which columns play which part in a task. Every role is optional.
///
/// Accepts both the short names and the `startKeyID` style names written by
/// older registries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRoles {
    #[serde(alias = "startKeyID", skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(alias = "endKeyID", skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(alias = "statusKeyID", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(alias = "parentKeyID", skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(alias = "progressKeyID", skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(alias = "typeKeyID", skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(alias = "projectKeyID", skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

fn configured(role: &Option<String>) -> Option<&str> {
    role.as_deref().filter(|k| !k.is_empty())
}

impl FieldRoles {
    pub fn start(&self) -> Option<&str> {
        configured(&self.start)
    }

    pub fn end(&self) -> Option<&str> {
        configured(&self.end)
    }

    pub fn status(&self) -> Option<&str> {
        configured(&self.status)
    }

    pub fn parent(&self) -> Option<&str> {
        configured(&self.parent)
    }

    pub fn progress(&self) -> Option<&str> {
        configured(&self.progress)
    }

    pub fn task_type(&self) -> Option<&str> {
        configured(&self.task_type)
    }

    pub fn project(&self) -> Option<&str> {
        configured(&self.project)
    }

    /// Configured roles as `(role, key_id)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("start", self.start()),
            ("end", self.end()),
            ("status", self.status()),
            ("parent", self.parent()),
            ("progress", self.progress()),
            ("task_type", self.task_type()),
            ("project", self.project()),
        ]
        .into_iter()
        .filter_map(|(role, key)| key.map(|k| (role, k)))
    }

    /// Point `role` at `key_id`.
    pub fn set(&mut self, role: TaskRole, key_id: impl Into<String>) {
        let slot = match role {
            TaskRole::Start => &mut self.start,
            TaskRole::End => &mut self.end,
            TaskRole::Status => &mut self.status,
            TaskRole::Parent => &mut self.parent,
            TaskRole::Progress => &mut self.progress,
        };
        *slot = Some(key_id.into());
    }

    pub fn get(&self, role: TaskRole) -> Option<&str> {
        match role {
            TaskRole::Start => self.start(),
            TaskRole::End => self.end(),
            TaskRole::Status => self.status(),
            TaskRole::Parent => self.parent(),
            TaskRole::Progress => self.progress(),
        }
    }

    /// Check every configured role against the column set.
    pub fn validate(&self, columns: &[Column]) -> Result<(), ValidationError> {
        for (role, key_id) in self.iter() {
            if !columns.iter().any(|c| c.key_id == key_id) {
                return Err(ValidationError::UnknownColumn {
                    role: role.to_string(),
                    key_id: key_id.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// ROLE COLUMNS
// ============================================================================

/// Roles a scheduler needs a column for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRole {
    Start,
    End,
    Status,
    Parent,
    Progress,
}

/// Column created for a role the source does not have yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleColumn {
    pub role: TaskRole,
    pub name: &'static str,
    pub column_type: ColumnType,
    pub options: &'static [&'static str],
}

impl RoleColumn {
    /// Default role columns, in creation order.
    pub const DEFAULTS: [RoleColumn; 5] = [
        RoleColumn {
            role: TaskRole::Start,
            name: "Start date",
            column_type: ColumnType::Date,
            options: &[],
        },
        RoleColumn {
            role: TaskRole::End,
            name: "End date",
            column_type: ColumnType::Date,
            options: &[],
        },
        RoleColumn {
            role: TaskRole::Status,
            name: "Status",
            column_type: ColumnType::MultiSelect,
            options: &["In progress", "Done", "Paused"],
        },
        RoleColumn {
            role: TaskRole::Parent,
            name: "Parent task",
            column_type: ColumnType::Relation,
            options: &[],
        },
        RoleColumn {
            role: TaskRole::Progress,
            name: "Progress",
            column_type: ColumnType::Number,
            options: &[],
        },
    ];

    /// Existing column with this name, compared case-insensitively.
    pub fn find_in<'a>(&self, columns: &'a [Column]) -> Option<&'a Column> {
        columns
            .iter()
            .find(|c| c.name.trim().eq_ignore_ascii_case(self.name))
    }

    /// Choice labels to declare, empty for types without a choice list.
    pub fn declared_options(&self) -> Vec<String> {
        if !self.column_type.has_options() {
            return Vec::new();
        }
        self.options.iter().map(|o| o.to_string()).collect()
    }
}

// ============================================================================
// TASK
// ============================================================================

/// A row read as a scheduled task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "itemID")]
    pub item_id: String,
    #[serde(rename = "blockID")]
    pub block_id: Option<String>,
    pub title: String,
    /// `YYYY-MM-DD`, `None` when unscheduled.
    pub start: Option<String>,
    pub end: Option<String>,
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub parent_id: Option<String>,
    pub task_type: Option<String>,
    pub project: Option<String>,
}

impl Task {
    /// Whether the task overlaps `[from, to]`. Missing dates are open-ended.
    pub fn overlaps(&self, from: &str, to: &str) -> bool {
        let start = self.start.as_deref().unwrap_or("0000-00-00");
        let end = self.end.as_deref().unwrap_or("9999-12-31");
        !(end < from || start > to)
    }
}

fn cell_value<'a>(row: &'a Row, key_id: Option<&str>) -> Option<&'a Value> {
    row.cell(key_id?)?.value.as_ref()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl Table {
    /// Task view of one row.
    pub fn task(&self, item_id: &str, roles: &FieldRoles) -> Option<Task> {
        self.row(item_id).map(|row| self.task_for_row(row, roles))
    }

    /// Task view of every row, in table order.
    pub fn tasks(&self, roles: &FieldRoles) -> Vec<Task> {
        self.rows
            .iter()
            .map(|row| self.task_for_row(row, roles))
            .collect()
    }

    pub fn task_for_row(&self, row: &Row, roles: &FieldRoles) -> Task {
        Task {
            item_id: row.item_id.clone(),
            block_id: row.primary_block_id.clone(),
            title: self.task_title(row),
            start: cell_value(row, roles.start()).and_then(project_date),
            end: cell_value(row, roles.end()).and_then(project_date),
            status: roles.status().and_then(|k| row.text(k)).map(str::to_string),
            progress: cell_value(row, roles.progress()).and_then(project_number),
            parent_id: cell_value(row, roles.parent())
                .map(extract_identifier)
                .and_then(non_empty),
            task_type: roles.task_type().and_then(|k| row.text(k)).map(str::to_string),
            project: roles.project().and_then(|k| row.text(k)).map(str::to_string),
        }
    }

    /// Block column content, then its name, then the row label, then the item id.
    fn task_title(&self, row: &Row) -> String {
        let block_value = self
            .block_column()
            .and_then(|c| cell_value(row, Some(c.key_id.as_str())));
        let from_block = block_value.and_then(|v| {
            [&["block", "content"][..], &["block", "name"][..]]
                .iter()
                .filter_map(|p| path(v, p))
                .map(project_text)
                .find(|s| !s.is_empty())
        });
        from_block
            .or_else(|| row.label.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| row.item_id.clone())
    }
}

// ============================================================================
// TASK PATCH
// ============================================================================

/// Scheduler-side edit to a task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub start: Option<String>,
    pub end: Option<String>,
    pub progress: Option<f64>,
    /// `Some("")` clears the parent link.
    pub parent_id: Option<String>,
}

impl TaskPatch {
    /// Map the patch onto field updates through the configured roles.
    ///
    /// Fields whose role is not configured are dropped.
    pub fn to_updates(&self, roles: &FieldRoles) -> Vec<FieldUpdate> {
        let mut updates = Vec::new();
        if let (Some(key), Some(start)) = (roles.start(), &self.start) {
            updates.push(FieldUpdate::new(key, start.as_str()));
        }
        if let (Some(key), Some(end)) = (roles.end(), &self.end) {
            updates.push(FieldUpdate::new(key, end.as_str()));
        }
        if let (Some(key), Some(progress)) = (roles.progress(), self.progress) {
            updates.push(FieldUpdate::new(key, progress));
        }
        if let (Some(key), Some(parent)) = (roles.parent(), &self.parent_id) {
            updates.push(FieldUpdate::new(key, parent.as_str()));
        }
        updates
    }
}
