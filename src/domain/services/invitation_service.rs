use std::sync::Arc;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::models::{
    auth::Credential,
    document::{encode_new_record, Collection, Direction, Document, Query, WriteOp},
    invitation::{Invitation, InvitationStatus},
    user::{Actor, Role, UserProfile},
};
use crate::domain::services::{document_service::DocumentService, identity_service::normalize_email};
use crate::error::AppError;

const MAX_REDEEM_ATTEMPTS: u32 = 3;

/// What an unauthenticated visitor of `/signup?invite={id}` may learn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedInvitation {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub startup_id: String,
    pub status: InvitationStatus,
}

pub struct InvitationService {
    documents: Arc<DocumentService>,
    ttl: Duration,
    public_base_url: String,
}

impl InvitationService {
    pub fn new(documents: Arc<DocumentService>, ttl: Duration, public_base_url: String) -> Self {
        Self { documents, ttl, public_base_url }
    }

    pub fn signup_link(&self, invitation_id: &str) -> String {
        format!("{}/signup?invite={}", self.public_base_url.trim_end_matches('/'), invitation_id)
    }

    pub async fn create(&self, actor: &Actor, email: &str, role: Role) -> Result<Invitation, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(AppError::InvalidArgument("Please enter a valid email address".into()));
        }
        if role == Role::Founder {
            return Err(AppError::InvalidArgument("Invitations cannot grant the FOUNDER role".into()));
        }

        let invitation = Invitation::new(email, role, principal.startup_id.clone(), principal.uid.clone());
        let doc = self.documents
            .create(actor, Collection::Invitations, Some(invitation.id.clone()), encode_new_record(&invitation)?)
            .await?;
        info!(invitation_id = %doc.id, role = %role, "Invitation created");
        self.decode(&doc)
    }

    /// Public lookup by id. Stale pending invitations report `revoked`.
    pub async fn resolve(&self, id: &str) -> Result<ResolvedInvitation, AppError> {
        let doc = self.documents.get(&Actor::System, Collection::Invitations, id).await?;
        let invitation = self.decode(&doc)?;
        Ok(ResolvedInvitation {
            id: invitation.id,
            email: invitation.email,
            role: invitation.role,
            startup_id: invitation.startup_id,
            status: invitation.status,
        })
    }

    /// Binds a freshly created account to the invitation's startup and role.
    /// The profile write and the status change commit together, guarded by the
    /// invitation's version, so only one redeemer can win.
    pub async fn consume(&self, id: &str, credential: &Credential, display_name: &str) -> Result<UserProfile, AppError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let doc = self.documents.get(&Actor::System, Collection::Invitations, id).await?;
            let invitation = self.decode(&doc)?;

            match invitation.status {
                InvitationStatus::Pending => {}
                InvitationStatus::Consumed => {
                    return Err(AppError::AlreadyConsumed("This invitation has already been used".into()));
                }
                InvitationStatus::Revoked => {
                    return Err(AppError::PermissionDenied("This invitation is no longer valid".into()));
                }
            }
            if normalize_email(&invitation.email) != credential.email {
                return Err(AppError::PermissionDenied("This invitation was issued for a different email address".into()));
            }

            let profile = UserProfile::new(
                credential.uid.clone(),
                credential.email.clone(),
                display_name.trim().to_string(),
                invitation.role,
                invitation.startup_id.clone(),
            );
            let ops = vec![
                WriteOp::Update {
                    collection: Collection::Invitations,
                    id: id.to_string(),
                    patch: json!({ "status": InvitationStatus::Consumed, "consumedBy": credential.uid }),
                    expected_version: Some(doc.version),
                },
                WriteOp::Create {
                    collection: Collection::Users,
                    id: Some(profile.uid.clone()),
                    data: encode_new_record(&profile)?,
                },
            ];

            match self.documents.batch(&Actor::System, ops).await {
                Ok(outcome) => {
                    let profile_doc = outcome.documents.into_iter().nth(1).flatten().ok_or(AppError::Internal)?;
                    info!(invitation_id = id, uid = %credential.uid, startup_id = %invitation.startup_id, "Invitation redeemed");
                    return profile_doc.decode();
                }
                Err(AppError::Conflict(_)) if attempts < MAX_REDEEM_ATTEMPTS => continue,
                Err(AppError::Conflict(_)) => {
                    return Err(AppError::AlreadyConsumed("This invitation has already been used".into()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn revoke(&self, actor: &Actor, id: &str) -> Result<Invitation, AppError> {
        let doc = self.documents
            .update(actor, Collection::Invitations, id, json!({ "status": InvitationStatus::Revoked }), None)
            .await?;
        info!(invitation_id = id, "Invitation revoked");
        self.decode(&doc)
    }

    pub async fn list(&self, actor: &Actor) -> Result<Vec<Invitation>, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let query = Query::new(Collection::Invitations)
            .where_eq("startupId", principal.startup_id.as_str())
            .order_by("createdAt", Direction::Desc);
        self.documents
            .query(actor, query)
            .await?
            .iter()
            .map(|d| self.decode(d))
            .collect()
    }

    /// Persists `revoked` on pending invitations past their TTL. Returns how many were swept.
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let pending = self.documents
            .query(&Actor::System, Query::new(Collection::Invitations).where_eq("status", "pending"))
            .await?;

        let mut swept = 0;
        for doc in pending {
            let invitation: Invitation = doc.decode()?;
            if !invitation.is_expired(self.ttl, now) {
                continue;
            }
            let patch = json!({ "status": InvitationStatus::Revoked });
            match self.documents.update(&Actor::System, Collection::Invitations, &doc.id, patch, Some(doc.version)).await {
                Ok(_) => swept += 1,
                Err(AppError::Conflict(_)) => {}
                Err(e) => warn!(invitation_id = %doc.id, "Failed to expire invitation: {}", e),
            }
        }
        Ok(swept)
    }

    fn decode(&self, doc: &Document) -> Result<Invitation, AppError> {
        let mut invitation: Invitation = doc.decode()?;
        invitation.status = invitation.effective_status(self.ttl, Utc::now());
        Ok(invitation)
    }
}
