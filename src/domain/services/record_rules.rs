//! Per-collection validation and normalization applied to the post-write image
//! of every record before it is committed.

use crate::domain::models::{
    communication::{ChatMessage, Feedback, Notification},
    document::{decode_record, Collection},
    invitation::{Invitation, InvitationStatus},
    task::{validate_progress, Milestone, Task, TaskStatus},
    tenant::Startup,
    user::{Actor, Role, UserProfile},
};
use crate::error::AppError;
use serde_json::{Map, Value};

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::InvalidArgument(msg.into())
}

fn object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, AppError> {
    value.as_object_mut().ok_or_else(|| invalid("Record must be a JSON object"))
}

fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn has_created_at(collection: Collection) -> bool {
    !matches!(collection, Collection::Startups)
}

/// Validates `after` against the collection's schema and state machines and
/// fills server-owned fields. `before` is the stored image for updates.
pub fn normalize(
    actor: &Actor,
    collection: Collection,
    id: &str,
    before: Option<&Value>,
    mut after: Value,
    commit_time: &str,
) -> Result<Value, AppError> {
    let creating = before.is_none();
    {
        let map = object_mut(&mut after)?;
        map.remove("id");
        if creating && has_created_at(collection) && (actor.principal().is_some() || !map.contains_key("createdAt")) {
            map.insert("createdAt".into(), Value::String(commit_time.to_string()));
        }
    }

    match collection {
        Collection::Tasks => normalize_task(id, &mut after)?,
        Collection::Milestones => {
            let next: Milestone = decode_record(id, &after)?;
            require_text(&next.title, "title")?;
            if let Some(progress) = next.progress
                && !(0..=100).contains(&progress)
            {
                return Err(invalid("milestone progress must be between 0 and 100"));
            }
            if let Some(prev) = before {
                let prev: Milestone = decode_record(id, prev)?;
                if !prev.status.can_transition_to(next.status) {
                    return Err(invalid(format!("Milestone cannot move from {:?} to {:?}", prev.status, next.status)));
                }
            }
        }
        Collection::Feedback => {
            let feedback: Feedback = decode_record(id, &after)?;
            require_text(&feedback.content, "content")?;
        }
        Collection::Chats => {
            if let Some(p) = actor.principal() {
                let map = object_mut(&mut after)?;
                let missing = map.get("author").and_then(Value::as_str).is_none_or(|a| a.trim().is_empty());
                if missing {
                    map.insert("author".into(), Value::String(p.display_name.clone()));
                }
            }
            let message: ChatMessage = decode_record(id, &after)?;
            require_text(&message.text, "text")?;
        }
        Collection::Invitations => normalize_invitation(id, before, &mut after)?,
        Collection::Notifications => {
            let map = object_mut(&mut after)?;
            map.entry("read").or_insert(Value::Bool(false));
            let next: Notification = decode_record(id, &after)?;
            if let Some(prev) = before {
                let prev: Notification = decode_record(id, prev)?;
                if prev.read && !next.read {
                    return Err(invalid("Notifications cannot be marked unread"));
                }
            }
        }
        Collection::Users => {
            let profile: UserProfile = decode_record(id, &after)?;
            if profile.uid != id {
                return Err(invalid("uid must match the document id"));
            }
            require_text(&profile.display_name, "displayName")?;
            if profile.price.is_some_and(|p| p < 0.0) || profile.add_ons.iter().any(|a| a.price < 0.0) {
                return Err(invalid("prices must not be negative"));
            }
        }
        Collection::Startups => {
            let startup: Startup = decode_record(id, &after)?;
            require_text(&startup.name, "name")?;
            if startup.team_size < 0 {
                return Err(invalid("teamSize must not be negative"));
            }
        }
    }
    Ok(after)
}

fn normalize_task(id: &str, after: &mut Value) -> Result<(), AppError> {
    let map = object_mut(after)?;
    let progress = match map.get("progress") {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_i64().ok_or_else(|| invalid("progress must be an integer"))?,
    };
    validate_progress(progress)?;
    map.insert("progress".into(), Value::from(progress));
    map.insert("status".into(), Value::String(TaskStatus::from_progress(progress).as_str().to_string()));

    if let Some(Value::Array(list)) = map.get_mut("assignedTo") {
        let mut seen = Vec::with_capacity(list.len());
        list.retain(|v| {
            if seen.contains(v) {
                false
            } else {
                seen.push(v.clone());
                true
            }
        });
    }

    let task: Task = decode_record(id, after)?;
    require_text(&task.title, "title")
}

fn normalize_invitation(id: &str, before: Option<&Value>, after: &mut Value) -> Result<(), AppError> {
    let map = object_mut(after)?;
    if let Some(Value::String(email)) = map.get_mut("email") {
        *email = email.trim().to_lowercase();
    }

    let next: Invitation = decode_record(id, after)?;
    require_text(&next.email, "email")?;
    if next.role == Role::Founder {
        return Err(invalid("Invitations cannot grant the FOUNDER role"));
    }

    match before {
        None if next.status != InvitationStatus::Pending => Err(invalid("New invitations must be pending")),
        None => Ok(()),
        Some(prev) => {
            let prev: Invitation = decode_record(id, prev)?;
            match (prev.status, next.status) {
                (a, b) if a == b => Ok(()),
                (InvitationStatus::Pending, _) => Ok(()),
                (InvitationStatus::Consumed, _) => Err(AppError::AlreadyConsumed("Invitation has already been used".into())),
                (InvitationStatus::Revoked, _) => Err(invalid("Invitation has been revoked")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::user::Principal;
    use serde_json::json;

    const NOW: &str = "2026-03-01T10:00:00.000000Z";

    fn team() -> Actor {
        Actor::User(Principal {
            uid: "t".into(),
            email: "t@x.io".into(),
            display_name: "Tess".into(),
            role: Role::Team,
            startup_id: "s1".into(),
            photo_url: None,
        })
    }

    #[test]
    fn task_status_follows_progress() {
        let data = json!({"startupId": "s1", "title": "Ship", "createdBy": "f", "progress": 50, "status": "Done"});
        let out = normalize(&Actor::System, Collection::Tasks, "t1", None, data, NOW).unwrap();
        assert_eq!(out["status"], "In Progress");
        assert_eq!(out["createdAt"], NOW);

        let bad = json!({"startupId": "s1", "title": "Ship", "createdBy": "f", "progress": 45});
        assert!(matches!(normalize(&Actor::System, Collection::Tasks, "t1", None, bad, NOW), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn client_supplied_created_at_is_overridden() {
        let data = json!({"startupId": "s1", "title": "x", "createdBy": "t", "createdAt": "1999-01-01T00:00:00Z"});
        let out = normalize(&team(), Collection::Tasks, "t1", None, data, NOW).unwrap();
        assert_eq!(out["createdAt"], NOW);
    }

    #[test]
    fn chat_author_defaults_to_display_name() {
        let data = json!({"startupId": "s1", "channel": "general", "text": "hi", "authorId": "t", "role": "TEAM"});
        let out = normalize(&team(), Collection::Chats, "m1", None, data, NOW).unwrap();
        assert_eq!(out["author"], "Tess");
    }

    #[test]
    fn founder_invitations_are_rejected() {
        let data = json!({"email": "B@X.io ", "role": "FOUNDER", "startupId": "s1", "invitedBy": "f", "status": "pending"});
        assert!(matches!(normalize(&Actor::System, Collection::Invitations, "i", None, data, NOW), Err(AppError::InvalidArgument(_))));

        let data = json!({"email": "B@X.io ", "role": "TEAM", "startupId": "s1", "invitedBy": "f", "status": "pending"});
        let out = normalize(&Actor::System, Collection::Invitations, "i", None, data, NOW).unwrap();
        assert_eq!(out["email"], "b@x.io");
    }

    #[test]
    fn consumed_invitations_are_terminal() {
        let consumed = json!({"email": "b@x.io", "role": "TEAM", "startupId": "s1", "invitedBy": "f", "status": "consumed", "createdAt": NOW});
        let revoked = json!({"email": "b@x.io", "role": "TEAM", "startupId": "s1", "invitedBy": "f", "status": "revoked", "createdAt": NOW});
        assert!(matches!(
            normalize(&Actor::System, Collection::Invitations, "i", Some(&consumed), revoked, NOW),
            Err(AppError::AlreadyConsumed(_))
        ));
    }

    #[test]
    fn notifications_never_become_unread() {
        let read = json!({"recipientId": "t", "type": "task_assignment", "title": "x", "message": "y", "read": true, "createdAt": NOW});
        let mut unread = read.clone();
        unread["read"] = json!(false);
        assert!(normalize(&Actor::System, Collection::Notifications, "n", Some(&read), unread, NOW).is_err());
    }

    #[test]
    fn milestone_transitions_are_checked() {
        let completed = json!({"startupId": "s1", "title": "MVP", "date": "2026-04-01", "status": "Completed", "createdBy": "f", "createdAt": NOW});
        let mut in_progress = completed.clone();
        in_progress["status"] = json!("In Progress");
        assert!(normalize(&Actor::System, Collection::Milestones, "m", Some(&completed), in_progress, NOW).is_err());
        let mut upcoming = completed.clone();
        upcoming["status"] = json!("Upcoming");
        assert!(normalize(&Actor::System, Collection::Milestones, "m", Some(&completed), upcoming, NOW).is_ok());
    }
}
