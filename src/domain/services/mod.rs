pub mod access_policy;
pub mod analytics;
pub mod auth_service;
pub mod blob_service;
pub mod communication_service;
pub mod document_service;
pub mod identity_service;
pub mod invitation_service;
pub mod notification_service;
pub mod record_rules;
pub mod retry;
pub mod task_service;
pub mod tenant_service;
