use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::domain::models::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackStatus {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Addressed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(default)]
    pub id: String,
    pub startup_id: String,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub content: String,
    pub status: FeedbackStatus,
    pub author_id: String,
    pub author_name: String,
    pub author_role: Role,
    pub created_at: DateTime<Utc>,
    /// Who gave external feedback, e.g. "Beta User #42".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    General,
    Mentor,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::General => "general",
            Channel::Mentor => "mentor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "general" => Some(Channel::General),
            "mentor" => Some(Channel::Mentor),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub startup_id: String,
    pub channel: Channel,
    pub text: String,
    pub author_id: String,
    pub author: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub display_name: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

pub const TASK_ASSIGNMENT: &str = "task_assignment";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sender: Option<SenderProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_id: Option<String>,
}
