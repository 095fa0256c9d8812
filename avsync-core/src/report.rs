//! Done / pending classification for period reports

use crate::filter::RowFilter;
use crate::model::Table;
use crate::task::{FieldRoles, Task};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DONE_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)done|完成|已完成|finished").expect("static regex"));

/// Whether a status label means the task is finished.
pub fn is_done_status(status: Option<&str>) -> bool {
    status.map(|s| DONE_STATUS.is_match(s)).unwrap_or(false)
}

/// Inclusive `YYYY-MM-DD` reporting window.
///
/// The window is open unless both bounds are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl ReportRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }

    pub fn admits(&self, task: &Task) -> bool {
        let from = self.from.as_deref().filter(|s| !s.is_empty());
        let to = self.to.as_deref().filter(|s| !s.is_empty());
        match (from, to) {
            (Some(from), Some(to)) => task.overlaps(from, to),
            _ => true,
        }
    }
}

/// Filtered tasks in range, split by completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub range: ReportRange,
    pub done: Vec<Task>,
    pub pending: Vec<Task>,
}

impl ReportSummary {
    pub fn build(table: &Table, roles: &FieldRoles, filter: &RowFilter, range: &ReportRange) -> Self {
        let (done, pending): (Vec<Task>, Vec<Task>) = table
            .filtered_rows(filter, roles)
            .map(|row| table.task_for_row(row, roles))
            .filter(|task| range.admits(task))
            .partition(|task| is_done_status(task.status.as_deref()));
        Self {
            range: range.clone(),
            done,
            pending,
        }
    }

    pub fn total(&self) -> usize {
        self.done.len() + self.pending.len()
    }
}
