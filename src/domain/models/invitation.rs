use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use crate::domain::models::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Consumed,
    Revoked,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    #[serde(default)]
    pub id: String,
    pub email: String,
    pub role: Role,
    pub startup_id: String,
    pub invited_by: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_by: Option<String>,
}

impl Invitation {
    pub fn new(email: String, role: Role, startup_id: String, invited_by: String) -> Self {
        Self {
            id: Self::generate_id(),
            email,
            role,
            startup_id,
            invited_by,
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
            consumed_by: None,
        }
    }

    /// Opaque, URL-safe id used in `/signup?invite={id}`.
    pub fn generate_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.created_at + ttl < now
    }

    /// Pending invitations past their TTL read as revoked.
    pub fn effective_status(&self, ttl: Duration, now: DateTime<Utc>) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && self.is_expired(ttl, now) {
            InvitationStatus::Revoked
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_pending_invitations_read_as_revoked() {
        let mut invite = Invitation::new("b@x.io".into(), Role::Team, "s1".into(), "u1".into());
        let ttl = Duration::days(14);
        assert_eq!(invite.effective_status(ttl, Utc::now()), InvitationStatus::Pending);

        invite.created_at = Utc::now() - Duration::days(15);
        assert_eq!(invite.effective_status(ttl, Utc::now()), InvitationStatus::Revoked);

        invite.status = InvitationStatus::Consumed;
        assert_eq!(invite.effective_status(ttl, Utc::now()), InvitationStatus::Consumed);
    }

    #[test]
    fn ids_are_url_safe() {
        let id = Invitation::generate_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
