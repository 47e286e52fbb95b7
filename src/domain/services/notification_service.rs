use std::sync::Arc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{
    communication::{Notification, SenderProfile, TASK_ASSIGNMENT},
    document::{encode_new_record, Collection, Direction, Query, WriteOp},
    task::Task,
    user::{Actor, Principal},
};
use crate::domain::services::document_service::{DocumentService, Subscription};
use crate::error::AppError;

/// Fields of a notification chosen by the writer; the rest are server-owned.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub recipient_id: String,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub sender: Option<SenderProfile>,
    pub startup_id: Option<String>,
}

pub struct NotificationService {
    documents: Arc<DocumentService>,
    limit: usize,
}

impl NotificationService {
    pub fn new(documents: Arc<DocumentService>, limit: usize) -> Self {
        Self { documents, limit }
    }

    pub async fn create(&self, draft: NotificationDraft) -> Result<Notification, AppError> {
        let notification = Notification {
            id: String::new(),
            recipient_id: draft.recipient_id,
            notification_type: draft.notification_type,
            title: draft.title,
            message: draft.message,
            link: draft.link,
            read: false,
            created_at: chrono::Utc::now(),
            sender: draft.sender,
            startup_id: draft.startup_id,
        };
        self.documents
            .create(&Actor::System, Collection::Notifications, None, encode_new_record(&notification)?)
            .await?
            .decode()
    }

    /// One `task_assignment` notification per assignee other than the creator.
    /// Individual failures are logged and skipped.
    pub async fn notify_task_assignment(&self, task: &Task, creator: &Principal) -> usize {
        let mut delivered = 0;
        for recipient in task.assigned_to.iter().filter(|uid| **uid != creator.uid) {
            let draft = NotificationDraft {
                recipient_id: recipient.clone(),
                notification_type: TASK_ASSIGNMENT.to_string(),
                title: "New Task Assigned".to_string(),
                message: format!("{} assigned you a task: {}", creator.display_name, task.title),
                link: Some("/tasks".to_string()),
                sender: Some(SenderProfile {
                    display_name: creator.display_name.clone(),
                    photo_url: creator.photo_url.clone(),
                }),
                startup_id: Some(task.startup_id.clone()),
            };
            match self.create(draft).await {
                Ok(_) => delivered += 1,
                Err(e) => warn!(task_id = %task.id, recipient = %recipient, "Failed to deliver task notification: {}", e),
            }
        }
        if delivered > 0 {
            info!(task_id = %task.id, delivered, "Task assignment notifications sent");
        }
        delivered
    }

    pub async fn mark_read(&self, actor: &Actor, id: &str) -> Result<Notification, AppError> {
        self.documents
            .update(actor, Collection::Notifications, id, json!({ "read": true }), None)
            .await?
            .decode()
    }

    /// Marks every unread notification of the caller in one commit. Returns how many changed.
    pub async fn mark_all_read(&self, actor: &Actor) -> Result<usize, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let unread = self.documents
            .query(actor, Query::new(Collection::Notifications)
                .where_eq("recipientId", principal.uid.as_str())
                .where_eq("read", false))
            .await?;
        if unread.is_empty() {
            return Ok(0);
        }

        let ops: Vec<WriteOp> = unread
            .iter()
            .map(|doc| WriteOp::Update {
                collection: Collection::Notifications,
                id: doc.id.clone(),
                patch: json!({ "read": true }),
                expected_version: None,
            })
            .collect();
        let count = ops.len();
        self.documents.batch(actor, ops).await?;
        Ok(count)
    }

    fn recent_query(&self, principal: &Principal, limit: Option<usize>) -> Query {
        let limit = limit.map_or(self.limit, |l| l.clamp(1, self.limit));
        Query::new(Collection::Notifications)
            .where_eq("recipientId", Value::String(principal.uid.clone()))
            .order_by("createdAt", Direction::Desc)
            .limit(limit)
    }

    /// Most recent notifications of the caller, newest first.
    pub async fn list(&self, actor: &Actor, limit: Option<usize>) -> Result<Vec<Notification>, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        self.documents
            .query(actor, self.recent_query(principal, limit))
            .await?
            .iter()
            .map(|d| d.decode())
            .collect()
    }

    pub async fn subscribe(&self, actor: &Actor, session_id: Option<Uuid>) -> Result<Subscription, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let query = self.recent_query(principal, None);
        self.documents.subscribe(actor.clone(), session_id, query, None).await
    }
}
