use std::sync::Arc;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::domain::models::{
    document::{encode_new_record, Collection, Direction, Query},
    task::{Milestone, MilestoneStatus, Priority, Task, TaskStatus},
    user::Actor,
};
use crate::domain::services::{document_service::DocumentService, notification_service::NotificationService};
use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub assigned_to: Vec<String>,
}

/// Partial task edit. Progress alone is open to assignees; the rest needs Founder or Co-Founder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub progress: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<Vec<String>>,
}

impl TaskUpdate {
    fn into_patch(self) -> Result<Map<String, Value>, AppError> {
        let mut patch = Map::new();
        let mut put = |key: &str, value: Result<Value, serde_json::Error>| -> Result<(), AppError> {
            let value = value.map_err(|e| AppError::InvalidArgument(e.to_string()))?;
            patch.insert(key.to_string(), value);
            Ok(())
        };
        if let Some(v) = self.title { put("title", serde_json::to_value(v))?; }
        if let Some(v) = self.description { put("description", serde_json::to_value(v))?; }
        if let Some(v) = self.priority { put("priority", serde_json::to_value(v))?; }
        if let Some(v) = self.progress { put("progress", serde_json::to_value(v))?; }
        if let Some(v) = self.due_date { put("dueDate", serde_json::to_value(v))?; }
        if let Some(v) = self.assigned_to { put("assignedTo", serde_json::to_value(v))?; }
        Ok(patch)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMilestone {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub status: Option<MilestoneStatus>,
    #[serde(default)]
    pub progress: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub status: Option<MilestoneStatus>,
    pub progress: Option<i64>,
}

pub struct TaskService {
    documents: Arc<DocumentService>,
    notifications: Arc<NotificationService>,
}

impl TaskService {
    pub fn new(documents: Arc<DocumentService>, notifications: Arc<NotificationService>) -> Self {
        Self { documents, notifications }
    }

    pub async fn create_task(&self, actor: &Actor, input: NewTask) -> Result<Task, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let task = Task {
            id: String::new(),
            startup_id: principal.startup_id.clone(),
            title: input.title.trim().to_string(),
            description: input.description,
            priority: input.priority,
            status: TaskStatus::from_progress(input.progress),
            progress: input.progress,
            due_date: input.due_date,
            assigned_to: input.assigned_to,
            created_by: principal.uid.clone(),
            created_at: chrono::Utc::now(),
        };

        let task: Task = self.documents
            .create(actor, Collection::Tasks, None, encode_new_record(&task)?)
            .await?
            .decode()?;
        info!(task_id = %task.id, assignees = task.assigned_to.len(), "Task created");

        self.notifications.notify_task_assignment(&task, principal).await;
        Ok(task)
    }

    pub async fn update_task(&self, actor: &Actor, id: &str, update: TaskUpdate) -> Result<Task, AppError> {
        let patch = update.into_patch()?;
        if patch.is_empty() {
            return Err(AppError::InvalidArgument("Nothing to update".into()));
        }
        self.documents
            .update(actor, Collection::Tasks, id, Value::Object(patch), None)
            .await?
            .decode()
    }

    pub async fn get_task(&self, actor: &Actor, id: &str) -> Result<Task, AppError> {
        self.documents.get(actor, Collection::Tasks, id).await?.decode()
    }

    /// Tasks of the caller's startup, newest first; optionally only those assigned to `assignee`.
    pub async fn list_tasks(&self, actor: &Actor, assignee: Option<&str>) -> Result<Vec<Task>, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let query = Query::new(Collection::Tasks)
            .where_eq("startupId", principal.startup_id.as_str())
            .order_by("createdAt", Direction::Desc);
        let tasks: Vec<Task> = self.documents
            .query(actor, query)
            .await?
            .iter()
            .map(|d| d.decode())
            .collect::<Result<_, _>>()?;
        Ok(match assignee {
            Some(uid) => tasks.into_iter().filter(|t| t.assigned_to.iter().any(|a| a == uid)).collect(),
            None => tasks,
        })
    }

    pub async fn create_milestone(&self, actor: &Actor, input: NewMilestone) -> Result<Milestone, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let milestone = Milestone {
            id: String::new(),
            startup_id: principal.startup_id.clone(),
            title: input.title.trim().to_string(),
            description: input.description,
            date: input.date,
            status: input.status.unwrap_or(MilestoneStatus::Upcoming),
            progress: input.progress,
            created_by: principal.uid.clone(),
            created_at: chrono::Utc::now(),
        };
        self.documents
            .create(actor, Collection::Milestones, None, encode_new_record(&milestone)?)
            .await?
            .decode()
    }

    pub async fn update_milestone(&self, actor: &Actor, id: &str, update: MilestoneUpdate) -> Result<Milestone, AppError> {
        let mut patch = Map::new();
        let to_value = |v: Result<Value, serde_json::Error>| v.map_err(|e| AppError::InvalidArgument(e.to_string()));
        if let Some(v) = update.title { patch.insert("title".into(), Value::String(v)); }
        if let Some(v) = update.description { patch.insert("description".into(), Value::String(v)); }
        if let Some(v) = update.date { patch.insert("date".into(), to_value(serde_json::to_value(v))?); }
        if let Some(v) = update.status { patch.insert("status".into(), to_value(serde_json::to_value(v))?); }
        if let Some(v) = update.progress { patch.insert("progress".into(), Value::from(v)); }
        if patch.is_empty() {
            return Err(AppError::InvalidArgument("Nothing to update".into()));
        }
        self.documents
            .update(actor, Collection::Milestones, id, Value::Object(patch), None)
            .await?
            .decode()
    }

    /// Completed flips back to Upcoming; anything else becomes Completed.
    pub async fn toggle_milestone(&self, actor: &Actor, id: &str) -> Result<Milestone, AppError> {
        let current: Milestone = self.documents.get(actor, Collection::Milestones, id).await?.decode()?;
        self.update_milestone(actor, id, MilestoneUpdate { status: Some(current.status.toggled()), ..Default::default() })
            .await
    }

    pub async fn delete_milestone(&self, actor: &Actor, id: &str) -> Result<(), AppError> {
        self.documents.delete(actor, Collection::Milestones, id, None).await?;
        info!(milestone_id = id, "Milestone deleted");
        Ok(())
    }

    /// Milestones of the caller's startup ordered by target date.
    pub async fn list_milestones(&self, actor: &Actor) -> Result<Vec<Milestone>, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let query = Query::new(Collection::Milestones)
            .where_eq("startupId", principal.startup_id.as_str())
            .order_by("date", Direction::Asc);
        self.documents
            .query(actor, query)
            .await?
            .iter()
            .map(|d| d.decode())
            .collect()
    }
}
