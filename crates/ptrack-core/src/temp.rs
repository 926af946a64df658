//! Temporary tasks: lightweight to-dos that live outside the task hierarchy
//! until someone promotes them into a real project task.

use crate::models::{TempTask, TempTaskStatus};
use crate::repository::query_builder::Direction;
use std::str::FromStr;
use thiserror::Error;

pub const TEMP_TASKS_PER_PAGE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempTaskSort {
    Name,
    Priority,
    Assignee,
    Creator,
    Status,
    #[default]
    CreatedAt,
}

impl TempTaskSort {
    /// SQL ordering expression. Priority sorts by rank, not alphabetically.
    pub(crate) fn order_expr(&self) -> &'static str {
        match self {
            TempTaskSort::Name => "name",
            TempTaskSort::Priority => "CASE priority WHEN 'low' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END",
            TempTaskSort::Assignee => "assigned_byname",
            TempTaskSort::Creator => "created_byname",
            TempTaskSort::Status => "status",
            TempTaskSort::CreatedAt => "created_at",
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid sort column: {0}")]
pub struct ParseTempTaskSortError(String);

impl FromStr for TempTaskSort {
    type Err = ParseTempTaskSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "name" | "title" => Ok(TempTaskSort::Name),
            "priority" => Ok(TempTaskSort::Priority),
            "assignee" | "engineer" | "engineer_name" => Ok(TempTaskSort::Assignee),
            "creator" | "created_by" => Ok(TempTaskSort::Creator),
            "status" => Ok(TempTaskSort::Status),
            "created" | "created_at" => Ok(TempTaskSort::CreatedAt),
            _ => Err(ParseTempTaskSortError(s.to_string())),
        }
    }
}

/// One page request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempTaskQuery {
    pub page: u32,
    pub sort: TempTaskSort,
    pub direction: Direction,
}

impl Default for TempTaskQuery {
    fn default() -> Self {
        Self {
            page: 1,
            sort: TempTaskSort::CreatedAt,
            direction: Direction::Desc,
        }
    }
}

impl TempTaskQuery {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * TEMP_TASKS_PER_PAGE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TempTaskPage {
    pub items: Vec<TempTask>,
    pub total: i64,
    pub page: u32,
}

impl TempTaskPage {
    pub fn total_pages(&self) -> i64 {
        (self.total + TEMP_TASKS_PER_PAGE - 1) / TEMP_TASKS_PER_PAGE
    }

    /// 1-based index range of the items on this page, for "Showing x to y of z".
    pub fn showing(&self) -> Option<(i64, i64)> {
        if self.items.is_empty() {
            return None;
        }
        let first = (self.page.max(1) as i64 - 1) * TEMP_TASKS_PER_PAGE + 1;
        Some((first, first + self.items.len() as i64 - 1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TempTaskStats {
    pub total: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl TempTaskStats {
    pub fn from_tasks(tasks: &[TempTask]) -> Self {
        let count = |status| tasks.iter().filter(|t| t.status == status).count();
        Self {
            total: tasks.len(),
            assigned: count(TempTaskStatus::Assigned),
            in_progress: count(TempTaskStatus::InProgress),
            completed: count(TempTaskStatus::Completed),
        }
    }
}
