use std::sync::Arc;
use crate::domain::ports::{AuthRepository, BlobStore, CredentialRepository, DocumentRepository};
use crate::domain::services::{
    analytics::AnalyticsService,
    auth_service::AuthService,
    blob_service::BlobService,
    communication_service::CommunicationService,
    document_service::DocumentService,
    identity_service::IdentityService,
    invitation_service::InvitationService,
    notification_service::NotificationService,
    task_service::TaskService,
    tenant_service::TenantService,
};
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub document_repo: Arc<dyn DocumentRepository>,
    pub credential_repo: Arc<dyn CredentialRepository>,
    pub auth_repo: Arc<dyn AuthRepository>,
    pub blob_store: Arc<dyn BlobStore>,
    pub auth_service: Arc<AuthService>,
    pub documents: Arc<DocumentService>,
    pub identity: Arc<IdentityService>,
    pub tenants: Arc<TenantService>,
    pub invitations: Arc<InvitationService>,
    pub notifications: Arc<NotificationService>,
    pub tasks: Arc<TaskService>,
    pub communication: Arc<CommunicationService>,
    pub analytics: Arc<AnalyticsService>,
    pub blobs: Arc<BlobService>,
}

impl AppState {
    /// Wires the services on top of the given storage backends.
    pub fn new(
        config: Config,
        document_repo: Arc<dyn DocumentRepository>,
        credential_repo: Arc<dyn CredentialRepository>,
        auth_repo: Arc<dyn AuthRepository>,
        blob_store: Arc<dyn BlobStore>,
    ) -> Self {
        let auth_service = Arc::new(AuthService::new(auth_repo.clone(), config.clone()));
        let documents = Arc::new(DocumentService::new(
            document_repo.clone(),
            config.request_timeout,
            config.retry_attempts,
        ));
        let notifications = Arc::new(NotificationService::new(
            documents.clone(),
            config.notification_limit.max(1) as usize,
        ));

        Self {
            identity: Arc::new(IdentityService::new(credential_repo.clone(), auth_service.clone(), documents.clone())),
            tenants: Arc::new(TenantService::new(documents.clone())),
            invitations: Arc::new(InvitationService::new(
                documents.clone(),
                config.invitation_ttl,
                config.public_base_url.clone(),
            )),
            tasks: Arc::new(TaskService::new(documents.clone(), notifications.clone())),
            communication: Arc::new(CommunicationService::new(documents.clone())),
            analytics: Arc::new(AnalyticsService::new(documents.clone())),
            blobs: Arc::new(BlobService::new(
                blob_store.clone(),
                documents.clone(),
                config.blob_signing_key.clone(),
                config.public_base_url.clone(),
            )),
            notifications,
            documents,
            auth_service,
            config,
            document_repo,
            credential_repo,
            auth_repo,
            blob_store,
        }
    }
}
