use std::sync::Arc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::domain::models::{
    auth::Credential,
    communication::{Feedback, FeedbackStatus},
    document::{encode_new_record, encode_record, Collection, Direction, Query, WriteOp},
    task::{Milestone, MilestoneStatus, Task},
    tenant::{Startup, EDITABLE_STARTUP_FIELDS},
    user::{Actor, Role, UserProfile},
};
use crate::domain::services::document_service::DocumentService;
use crate::error::AppError;

const MAX_COUNTER_ATTEMPTS: u32 = 32;

/// Profile plus the availability label shown in the team list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub availability: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub startup_id: String,
    pub active_tasks: usize,
    pub my_open_tasks: usize,
    pub team_members: usize,
    pub upcoming_milestones: usize,
    pub open_feedback: usize,
}

/// Cancelled, then Busy (n), then Online for Founders and Mentors, else Available.
pub fn availability(profile: &UserProfile, tasks: &[Task]) -> String {
    if profile.is_cancelled() {
        return "Cancelled".to_string();
    }
    let open = tasks
        .iter()
        .filter(|t| t.is_open() && t.assigned_to.contains(&profile.uid))
        .count();
    if open > 0 {
        return format!("Busy ({})", open);
    }
    match profile.role {
        Role::Founder | Role::Mentor => "Online".to_string(),
        Role::CoFounder | Role::Team => "Available".to_string(),
    }
}

fn matches_search(profile: &UserProfile, needle: &str) -> bool {
    profile.display_name.to_lowercase().contains(needle) || profile.email.to_lowercase().contains(needle)
}

pub fn founder_startup_id(uid: &str) -> String {
    format!("startup_{}", uid)
}

pub struct TenantService {
    documents: Arc<DocumentService>,
}

impl TenantService {
    pub fn new(documents: Arc<DocumentService>) -> Self {
        Self { documents }
    }

    /// Creates the startup and its Founder's profile in one atomic batch.
    pub async fn register_founder(
        &self,
        credential: &Credential,
        display_name: &str,
        startup_name: &str,
    ) -> Result<(Startup, UserProfile), AppError> {
        let startup_name = startup_name.trim();
        if startup_name.is_empty() {
            return Err(AppError::InvalidArgument("Startup name is required".into()));
        }
        let startup = Startup::new(founder_startup_id(&credential.uid), startup_name.to_string());
        let profile = UserProfile::new(
            credential.uid.clone(),
            credential.email.clone(),
            display_name.trim().to_string(),
            Role::Founder,
            startup.id.clone(),
        );

        let outcome = self.documents.batch(&Actor::System, vec![
            WriteOp::Create { collection: Collection::Startups, id: Some(startup.id.clone()), data: encode_record(&startup)? },
            WriteOp::Create { collection: Collection::Users, id: Some(profile.uid.clone()), data: encode_new_record(&profile)? },
        ]).await?;

        let mut docs = outcome.documents.into_iter().flatten();
        let (Some(startup_doc), Some(profile_doc)) = (docs.next(), docs.next()) else {
            return Err(AppError::Internal);
        };
        info!(startup_id = %startup_doc.id, uid = %profile_doc.id, "Startup registered");
        Ok((startup_doc.decode()?, profile_doc.decode()?))
    }

    pub async fn create_startup(&self, actor: &Actor, startup: &Startup) -> Result<Startup, AppError> {
        let doc = self.documents
            .create(actor, Collection::Startups, Some(startup.id.clone()), encode_record(startup)?)
            .await?;
        doc.decode()
    }

    pub async fn get_startup(&self, actor: &Actor, id: &str) -> Result<Startup, AppError> {
        self.documents.get(actor, Collection::Startups, id).await?.decode()
    }

    pub async fn update_startup(&self, actor: &Actor, id: &str, patch: Map<String, Value>) -> Result<Startup, AppError> {
        if let Some(field) = patch.keys().find(|k| !EDITABLE_STARTUP_FIELDS.contains(&k.as_str())) {
            return Err(AppError::InvalidArgument(format!("Field '{}' cannot be edited", field)));
        }
        self.documents
            .update(actor, Collection::Startups, id, Value::Object(patch), None)
            .await?
            .decode()
    }

    pub async fn create_user_profile(&self, actor: &Actor, profile: &UserProfile) -> Result<UserProfile, AppError> {
        self.documents
            .create(actor, Collection::Users, Some(profile.uid.clone()), encode_new_record(profile)?)
            .await?
            .decode()
    }

    pub async fn get_user_profile(&self, actor: &Actor, uid: &str) -> Result<UserProfile, AppError> {
        self.documents.get(actor, Collection::Users, uid).await?.decode()
    }

    pub async fn update_user_profile(&self, actor: &Actor, uid: &str, patch: Map<String, Value>) -> Result<UserProfile, AppError> {
        self.documents
            .update(actor, Collection::Users, uid, Value::Object(patch), None)
            .await?
            .decode()
    }

    /// Members of a startup with availability, optionally narrowed by a
    /// case-insensitive match on display name or email.
    pub async fn list_members(&self, actor: &Actor, startup_id: &str, search: Option<&str>) -> Result<Vec<Member>, AppError> {
        let users = self.documents
            .query(actor, Query::new(Collection::Users).where_eq("startupId", startup_id).order_by("displayName", Direction::Asc))
            .await?;
        let tasks: Vec<Task> = self.documents
            .query(actor, Query::new(Collection::Tasks).where_eq("startupId", startup_id))
            .await?
            .iter()
            .map(|d| d.decode())
            .collect::<Result<_, _>>()?;

        let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let mut members = Vec::with_capacity(users.len());
        for doc in users {
            let profile: UserProfile = doc.decode()?;
            if needle.as_deref().is_some_and(|n| !matches_search(&profile, n)) {
                continue;
            }
            let availability = availability(&profile, &tasks);
            members.push(Member { profile, availability });
        }
        Ok(members)
    }

    /// Best-effort; a failure leaves the counter stale but the join intact.
    /// Each attempt is guarded by the version it read, so concurrent joins
    /// re-read instead of overwriting each other.
    pub async fn increment_team_size(&self, startup_id: &str) {
        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            let attempt = async {
                let doc = self.documents.get(&Actor::System, Collection::Startups, startup_id).await?;
                let startup: Startup = doc.decode()?;
                self.documents
                    .update(
                        &Actor::System,
                        Collection::Startups,
                        startup_id,
                        json!({ "teamSize": startup.team_size + 1 }),
                        Some(doc.version),
                    )
                    .await
            }
            .await;
            match attempt {
                Err(AppError::Conflict(_)) if attempts < MAX_COUNTER_ATTEMPTS => continue,
                other => break other,
            }
        };
        if let Err(e) = result {
            warn!(startup_id, attempts, "Failed to update team size: {}", e);
        }
    }

    pub async fn dashboard(&self, actor: &Actor) -> Result<DashboardSummary, AppError> {
        let principal = actor.principal().ok_or(AppError::Unauthenticated)?;
        let startup_id = principal.startup_id.as_str();

        let tasks: Vec<Task> = self.documents
            .query(actor, Query::new(Collection::Tasks).where_eq("startupId", startup_id))
            .await?
            .iter()
            .map(|d| d.decode())
            .collect::<Result<_, _>>()?;
        let members = self.documents
            .query(actor, Query::new(Collection::Users).where_eq("startupId", startup_id))
            .await?;
        let milestones: Vec<Milestone> = self.documents
            .query(actor, Query::new(Collection::Milestones).where_eq("startupId", startup_id))
            .await?
            .iter()
            .map(|d| d.decode())
            .collect::<Result<_, _>>()?;
        let feedback: Vec<Feedback> = self.documents
            .query(actor, Query::new(Collection::Feedback).where_eq("startupId", startup_id))
            .await?
            .iter()
            .map(|d| d.decode())
            .collect::<Result<_, _>>()?;

        Ok(DashboardSummary {
            startup_id: startup_id.to_string(),
            active_tasks: tasks.iter().filter(|t| t.is_open()).count(),
            my_open_tasks: tasks.iter().filter(|t| t.is_open() && t.assigned_to.contains(&principal.uid)).count(),
            team_members: members.len(),
            upcoming_milestones: milestones.iter().filter(|m| m.status != MilestoneStatus::Completed).count(),
            open_feedback: feedback.iter().filter(|f| f.status == FeedbackStatus::Open).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{task::{Priority, TaskStatus}, user::SubscriptionStatus};
    use chrono::Utc;

    fn task(assignees: &[&str], status: TaskStatus) -> Task {
        Task {
            id: "t".into(),
            startup_id: "s1".into(),
            title: "x".into(),
            description: String::new(),
            priority: Priority::Medium,
            status,
            progress: 0,
            due_date: None,
            assigned_to: assignees.iter().map(|s| s.to_string()).collect(),
            created_by: "f".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn availability_labels() {
        let tasks = vec![
            task(&["t1"], TaskStatus::InProgress),
            task(&["t1", "m"], TaskStatus::Pending),
            task(&["t2"], TaskStatus::Done),
        ];
        let member = |uid: &str, role| UserProfile::new(uid.into(), format!("{}@x.io", uid), uid.into(), role, "s1".into());

        assert_eq!(availability(&member("t1", Role::Team), &tasks), "Busy (2)");
        assert_eq!(availability(&member("t2", Role::Team), &tasks), "Available");
        assert_eq!(availability(&member("f", Role::Founder), &tasks), "Online");
        assert_eq!(availability(&member("m", Role::Mentor), &tasks), "Busy (1)");

        let mut cancelled = member("t1", Role::Team);
        cancelled.status = Some(SubscriptionStatus::Cancelled);
        assert_eq!(availability(&cancelled, &tasks), "Cancelled");
    }

    #[test]
    fn search_matches_name_or_email() {
        let p = UserProfile::new("u".into(), "jane@acme.io".into(), "Jane Doe".into(), Role::Team, "s1".into());
        assert!(matches_search(&p, "doe"));
        assert!(matches_search(&p, "acme"));
        assert!(!matches_search(&p, "bob"));
    }
}
