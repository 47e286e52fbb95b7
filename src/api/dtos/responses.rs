use crate::domain::models::invitation::Invitation;
use serde::Serialize;

/// Backend identifiers a client needs to talk to this deployment.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigResponse {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub app_id: String,
    pub notification_limit: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationCreatedResponse {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub signup_link: String,
}

#[derive(Serialize)]
pub struct UpdatedCountResponse {
    pub updated: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoResponse {
    pub url: String,
    pub version: String,
    pub size: u64,
    pub content_type: String,
}
