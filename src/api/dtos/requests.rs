use crate::domain::models::{
    analytics::GrowthRange,
    communication::{FeedbackStatus, FeedbackType},
    document::{Filter, OrderBy, WriteOp},
    user::Role,
};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Account creation plus workspace onboarding: either a new startup
/// (`startupName`) or an invitation (`invite`, also accepted as a query parameter).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub startup_name: Option<String>,
    #[serde(default)]
    pub invite: Option<String>,
}

#[derive(Deserialize)]
pub struct SignupQuery {
    pub invite: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct MembersQuery {
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct TaskListQuery {
    pub assignee: Option<String>,
}

#[derive(Deserialize)]
pub struct FeedbackQuery {
    #[serde(rename = "type")]
    pub feedback_type: Option<FeedbackType>,
}

#[derive(Deserialize)]
pub struct CreateFeedbackRequest {
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateFeedbackStatusRequest {
    pub status: FeedbackStatus,
}

#[derive(Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub range: GrowthRange,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionQuery {
    pub expected_version: Option<i64>,
}

/// Body of `POST /documents/{collection}/query`; the collection comes from the path.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQueryRequest {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub writes: Vec<WriteOp>,
}

#[derive(Deserialize)]
pub struct SignedBlobQuery {
    pub v: String,
    pub sig: String,
}
