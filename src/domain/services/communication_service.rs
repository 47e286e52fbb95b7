use std::sync::Arc;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::domain::models::{
    communication::{Channel, ChatMessage, Feedback, FeedbackStatus, FeedbackType},
    document::{encode_new_record, Collection, Direction, Query},
    user::Actor,
};
use crate::domain::services::{
    access_policy,
    document_service::{DocumentService, Subscription},
};
use crate::error::AppError;

const MAX_MESSAGE_LEN: usize = 4000;

/// Feedback board and chat channels.
pub struct CommunicationService {
    documents: Arc<DocumentService>,
}

impl CommunicationService {
    pub fn new(documents: Arc<DocumentService>) -> Self {
        Self { documents }
    }

    pub async fn create_feedback(
        &self,
        actor: &Actor,
        feedback_type: FeedbackType,
        content: &str,
        source: Option<String>,
    ) -> Result<Feedback, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let feedback = Feedback {
            id: String::new(),
            startup_id: principal.startup_id.clone(),
            feedback_type,
            content: content.trim().to_string(),
            status: FeedbackStatus::Open,
            author_id: principal.uid.clone(),
            author_name: principal.display_name.clone(),
            author_role: principal.role,
            created_at: chrono::Utc::now(),
            source: source.filter(|s| !s.trim().is_empty()),
        };
        let feedback: Feedback = self.documents
            .create(actor, Collection::Feedback, None, encode_new_record(&feedback)?)
            .await?
            .decode()?;
        info!(feedback_id = %feedback.id, "Feedback submitted");
        Ok(feedback)
    }

    pub async fn update_feedback_status(&self, actor: &Actor, id: &str, status: FeedbackStatus) -> Result<Feedback, AppError> {
        self.documents
            .update(actor, Collection::Feedback, id, json!({ "status": status }), None)
            .await?
            .decode()
    }

    /// Newest first, optionally one type only.
    pub async fn list_feedback(&self, actor: &Actor, feedback_type: Option<FeedbackType>) -> Result<Vec<Feedback>, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let mut query = Query::new(Collection::Feedback)
            .where_eq("startupId", principal.startup_id.as_str())
            .order_by("createdAt", Direction::Desc);
        if let Some(t) = feedback_type {
            query = query.where_eq("type", json!(t));
        }
        self.documents
            .query(actor, query)
            .await?
            .iter()
            .map(|d| d.decode())
            .collect()
    }

    pub async fn post_message(&self, actor: &Actor, channel: Channel, text: &str) -> Result<ChatMessage, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        if !access_policy::can_access_channel(principal.role, channel) {
            return Err(AppError::PermissionDenied("You cannot post to this channel".into()));
        }
        let text = text.trim();
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::InvalidArgument(format!("Messages are limited to {} characters", MAX_MESSAGE_LEN)));
        }

        let message = ChatMessage {
            id: String::new(),
            startup_id: principal.startup_id.clone(),
            channel,
            text: text.to_string(),
            author_id: principal.uid.clone(),
            author: principal.display_name.clone(),
            role: principal.role,
            created_at: chrono::Utc::now(),
        };
        self.documents
            .create(actor, Collection::Chats, None, encode_new_record(&message)?)
            .await?
            .decode()
    }

    fn channel_query(&self, actor: &Actor, channel: Channel, limit: Option<usize>) -> Result<Query, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let mut query = Query::new(Collection::Chats)
            .where_eq("startupId", principal.startup_id.as_str())
            .where_eq("channel", Value::String(channel.as_str().to_string()))
            .order_by("createdAt", Direction::Asc);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query)
    }

    /// Messages of one channel in send order.
    pub async fn list_messages(&self, actor: &Actor, channel: Channel, limit: Option<usize>) -> Result<Vec<ChatMessage>, AppError> {
        let query = self.channel_query(actor, channel, limit)?;
        self.documents
            .query(actor, query)
            .await?
            .iter()
            .map(|d| d.decode())
            .collect()
    }

    pub async fn subscribe_channel(&self, actor: &Actor, session_id: Option<Uuid>, channel: Channel) -> Result<Subscription, AppError> {
        let query = self.channel_query(actor, channel, None)?;
        self.documents.subscribe(actor.clone(), session_id, query, None).await
    }
}
