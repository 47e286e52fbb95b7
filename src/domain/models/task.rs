use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Done,
}

impl TaskStatus {
    /// 0 is Pending, 100 is Done, anything between is In Progress.
    pub fn from_progress(progress: i64) -> Self {
        match progress {
            0 => TaskStatus::Pending,
            100 => TaskStatus::Done,
            _ => TaskStatus::InProgress,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }
}

pub fn validate_progress(progress: i64) -> Result<(), AppError> {
    if !(0..=100).contains(&progress) || progress % 10 != 0 {
        return Err(AppError::InvalidArgument(format!(
            "progress must be a multiple of 10 between 0 and 100, got {}", progress
        )));
    }
    Ok(())
}

fn pending() -> TaskStatus {
    TaskStatus::Pending
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub startup_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "pending")]
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_open(&self) -> bool {
        self.status != TaskStatus::Done
    }
}

/// Fields any assignee or the creator may change.
pub const PROGRESS_FIELDS: &[&str] = &["progress", "status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MilestoneStatus {
    Upcoming,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl MilestoneStatus {
    /// Completed flips back to Upcoming; everything else completes.
    pub fn toggled(&self) -> Self {
        match self {
            MilestoneStatus::Completed => MilestoneStatus::Upcoming,
            MilestoneStatus::Upcoming | MilestoneStatus::InProgress => MilestoneStatus::Completed,
        }
    }

    pub fn can_transition_to(&self, next: MilestoneStatus) -> bool {
        use MilestoneStatus::*;
        matches!(
            (self, next),
            (Upcoming, InProgress) | (Upcoming, Completed) | (InProgress, Completed) | (Completed, Upcoming)
        ) || *self == next
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    #[serde(default)]
    pub id: String,
    pub startup_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: NaiveDate,
    pub status: MilestoneStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
