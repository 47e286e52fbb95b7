//! Role and tenant rules evaluated on every store access.
//!
//! `R` is the caller's role, `S` the caller's startup, `T` the record's startup.
//! Reads outside `S` surface as `NotFound`; everything else the rules forbid is
//! `PermissionDenied`. The internal `System` actor bypasses these rules.

use crate::domain::models::{
    communication::Channel,
    document::{Collection, Document, Query, ID_FIELD},
    task::PROGRESS_FIELDS,
    user::{Actor, Principal, Role, BILLING_FIELDS, SELF_EDITABLE_FIELDS},
};
use crate::error::AppError;
use serde_json::Value;
use std::collections::BTreeSet;

const IMMUTABLE_USER_FIELDS: &[&str] = &["uid", "role", "startupId", "email", "createdAt"];
const IMMUTABLE_TASK_FIELDS: &[&str] = &["startupId", "createdBy", "createdAt"];

fn denied(msg: &str) -> AppError {
    AppError::PermissionDenied(msg.to_string())
}

pub fn allowed_channels(role: Role) -> &'static [Channel] {
    match role {
        Role::Founder | Role::CoFounder | Role::Mentor => &[Channel::General, Channel::Mentor],
        Role::Team => &[Channel::General],
    }
}

pub fn can_access_channel(role: Role, channel: Channel) -> bool {
    allowed_channels(role).contains(&channel)
}

fn str_of<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

fn in_tenant(p: &Principal, data: &Value) -> bool {
    str_of(data, "startupId") == Some(p.startup_id.as_str())
}

fn channel_of(data: &Value) -> Option<Channel> {
    str_of(data, "channel").and_then(Channel::parse)
}

fn is_assignee(p: &Principal, data: &Value) -> bool {
    data.get("assignedTo")
        .and_then(Value::as_array)
        .is_some_and(|list| list.iter().any(|v| v.as_str() == Some(p.uid.as_str())))
}

/// Top-level keys whose value differs between two record images.
pub fn changed_fields(before: &Value, after: &Value) -> BTreeSet<String> {
    let empty = serde_json::Map::new();
    let b = before.as_object().unwrap_or(&empty);
    let a = after.as_object().unwrap_or(&empty);
    b.keys()
        .chain(a.keys())
        .filter(|k| b.get(*k) != a.get(*k))
        .cloned()
        .collect()
}

fn only_touches(changed: &BTreeSet<String>, allowed: &[&str]) -> bool {
    changed.iter().all(|f| allowed.contains(&f.as_str()))
}

fn touches_any(changed: &BTreeSet<String>, fields: &[&str]) -> bool {
    changed.iter().any(|f| fields.contains(&f.as_str()))
}

pub fn authorize_read(actor: &Actor, doc: &Document) -> Result<(), AppError> {
    let Actor::User(p) = actor else { return Ok(()) };
    let data = &doc.data;

    let (visible, permitted) = match doc.collection {
        Collection::Startups => (doc.id == p.startup_id, true),
        Collection::Users => (doc.id == p.uid || in_tenant(p, data), true),
        Collection::Tasks | Collection::Milestones | Collection::Feedback => (in_tenant(p, data), true),
        Collection::Chats => (
            in_tenant(p, data),
            channel_of(data).is_some_and(|c| can_access_channel(p.role, c)),
        ),
        Collection::Invitations => (in_tenant(p, data), p.role.is_leadership()),
        Collection::Notifications => (str_of(data, "recipientId") == Some(p.uid.as_str()), true),
    };

    if !visible {
        return Err(AppError::NotFound(format!("{}/{} not found", doc.collection, doc.id)));
    }
    if !permitted {
        return Err(denied("Your role cannot read this record"));
    }
    Ok(())
}

/// Checks a single-document mutation. `before`/`after` are the stored images
/// (`None` when the document does not exist / is being deleted).
pub fn authorize_write(
    actor: &Actor,
    collection: Collection,
    id: &str,
    before: Option<&Value>,
    after: Option<&Value>,
) -> Result<(), AppError> {
    let Actor::User(p) = actor else { return Ok(()) };

    // Cross-cutting: no mutation may touch a record of another startup.
    match collection {
        Collection::Startups => {
            if id != p.startup_id {
                return Err(denied("Record belongs to another startup"));
            }
        }
        Collection::Notifications => {}
        _ => {
            if [before, after].into_iter().flatten().any(|data| !in_tenant(p, data)) {
                return Err(denied("Record belongs to another startup"));
            }
        }
    }

    match (collection, before, after) {
        (_, None, None) => Err(AppError::NotFound(format!("{}/{} not found", collection, id))),

        (Collection::Startups, Some(_), Some(_)) if p.role.is_leadership() => Ok(()),
        (Collection::Startups, None, Some(_)) => Err(denied("Startups are created at signup")),
        (Collection::Startups, _, _) => Err(denied("Only Founder or Co-Founder can edit the startup")),

        (Collection::Users, None, Some(_)) => Err(denied("Profiles are created at signup")),
        (Collection::Users, Some(_), None) => Err(denied("Profiles cannot be deleted")),
        (Collection::Users, Some(b), Some(a)) => {
            let changed = changed_fields(b, a);
            if touches_any(&changed, IMMUTABLE_USER_FIELDS) {
                return Err(denied("Role, startup and identity fields are immutable"));
            }
            let founder = p.role == Role::Founder;
            let ok = if id == p.uid {
                changed.iter().all(|f| {
                    SELF_EDITABLE_FIELDS.contains(&f.as_str()) || (founder && BILLING_FIELDS.contains(&f.as_str()))
                })
            } else {
                founder && only_touches(&changed, BILLING_FIELDS)
            };
            if ok { Ok(()) } else { Err(denied("You cannot edit these profile fields")) }
        }

        (Collection::Tasks, None, Some(a)) => {
            if !p.role.is_leadership() {
                return Err(denied("Only Founder or Co-Founder can create tasks"));
            }
            if str_of(a, "createdBy") != Some(p.uid.as_str()) {
                return Err(denied("createdBy must be the caller"));
            }
            Ok(())
        }
        (Collection::Tasks, Some(b), Some(a)) => {
            let changed = changed_fields(b, a);
            if touches_any(&changed, IMMUTABLE_TASK_FIELDS) {
                return Err(denied("Task ownership fields are immutable"));
            }
            if p.role.is_leadership() {
                return Ok(());
            }
            let involved = str_of(b, "createdBy") == Some(p.uid.as_str()) || is_assignee(p, b);
            if involved && only_touches(&changed, PROGRESS_FIELDS) {
                Ok(())
            } else {
                Err(denied("Only assignees may update task progress"))
            }
        }
        (Collection::Tasks, Some(_), None) => Err(denied("Task deletion is not supported")),

        (Collection::Milestones, b, a) => {
            if p.role != Role::Founder {
                return Err(denied("Only the Founder can manage milestones"));
            }
            if b.is_none() && a.and_then(|a| str_of(a, "createdBy")) != Some(p.uid.as_str()) {
                return Err(denied("createdBy must be the caller"));
            }
            Ok(())
        }

        (Collection::Feedback, None, Some(a)) => {
            if str_of(a, "authorId") != Some(p.uid.as_str()) {
                return Err(denied("authorId must be the caller"));
            }
            Ok(())
        }
        (Collection::Feedback, Some(b), Some(a)) => {
            if p.role.is_leadership() && only_touches(&changed_fields(b, a), &["status"]) {
                Ok(())
            } else {
                Err(denied("Only Founder or Co-Founder can change feedback status"))
            }
        }
        (Collection::Feedback, Some(_), None) => Err(denied("Feedback cannot be deleted")),

        (Collection::Chats, None, Some(a)) => {
            let channel = channel_of(a).ok_or_else(|| AppError::InvalidArgument("Unknown channel".into()))?;
            if !can_access_channel(p.role, channel) {
                return Err(denied("You cannot post to this channel"));
            }
            if str_of(a, "authorId") != Some(p.uid.as_str()) || str_of(a, "role") != Some(p.role.as_str()) {
                return Err(denied("Author fields must match the caller"));
            }
            Ok(())
        }
        (Collection::Chats, Some(_), _) => Err(denied("Chat messages are immutable")),

        (Collection::Invitations, None, Some(a)) => {
            if !p.role.is_leadership() {
                return Err(denied("Only Founder or Co-Founder can invite"));
            }
            if str_of(a, "invitedBy") != Some(p.uid.as_str()) || str_of(a, "status") != Some("pending") {
                return Err(denied("Invitations must be pending and issued by the caller"));
            }
            Ok(())
        }
        (Collection::Invitations, Some(b), Some(a)) => {
            if p.role.is_leadership()
                && only_touches(&changed_fields(b, a), &["status"])
                && str_of(a, "status") == Some("revoked")
            {
                Ok(())
            } else {
                Err(denied("Invitations can only be revoked"))
            }
        }
        (Collection::Invitations, Some(_), None) => Err(denied("Invitations cannot be deleted")),

        (Collection::Notifications, None, Some(_)) => Err(denied("Notifications are written by the service")),
        (Collection::Notifications, Some(b), Some(a)) => {
            if str_of(b, "recipientId") != Some(p.uid.as_str()) {
                return Err(denied("Only the recipient may update a notification"));
            }
            if only_touches(&changed_fields(b, a), &["read"]) && a.get("read") == Some(&Value::Bool(true)) {
                Ok(())
            } else {
                Err(denied("Notifications can only be marked read"))
            }
        }
        (Collection::Notifications, Some(_), None) => Err(denied("Notifications cannot be deleted")),
    }
}

fn pin(query: Query, field: &str, value: &str) -> Result<Query, AppError> {
    match query.eq_value(field) {
        Some(v) if v.as_str() != Some(value) => Err(denied("Query reaches outside your scope")),
        Some(_) => Ok(query),
        None => Ok(query.where_eq(field, value)),
    }
}

/// Narrows a query so it can only return records the caller may read.
pub fn constrain_query(actor: &Actor, query: Query) -> Result<Query, AppError> {
    let Actor::User(p) = actor else { return Ok(query) };

    match query.collection {
        Collection::Startups => pin(query, ID_FIELD, &p.startup_id),
        Collection::Users | Collection::Tasks | Collection::Milestones | Collection::Feedback => {
            pin(query, "startupId", &p.startup_id)
        }
        Collection::Invitations => {
            if !p.role.is_leadership() {
                return Err(denied("Only Founder or Co-Founder can list invitations"));
            }
            pin(query, "startupId", &p.startup_id)
        }
        Collection::Notifications => pin(query, "recipientId", &p.uid),
        Collection::Chats => {
            let query = pin(query, "startupId", &p.startup_id)?;
            let allowed = allowed_channels(p.role);
            match query.eq_value("channel") {
                Some(v) => {
                    let channel = v.as_str().and_then(Channel::parse)
                        .ok_or_else(|| AppError::InvalidArgument("Unknown channel".into()))?;
                    if can_access_channel(p.role, channel) {
                        Ok(query)
                    } else {
                        Err(denied("You cannot read this channel"))
                    }
                }
                None if allowed.len() < 2 => {
                    let values = allowed.iter().map(|c| Value::String(c.as_str().to_string())).collect();
                    Ok(query.where_in("channel", values))
                }
                None => Ok(query),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn principal(uid: &str, role: Role) -> Actor {
        Actor::User(Principal {
            uid: uid.to_string(),
            email: format!("{}@x.io", uid),
            display_name: uid.to_string(),
            role,
            startup_id: "s1".to_string(),
            photo_url: None,
        })
    }

    fn doc(collection: Collection, id: &str, data: Value) -> Document {
        let now = Utc::now();
        Document { collection, id: id.to_string(), data, version: 1, create_time: now, update_time: now }
    }

    fn is_denied(r: Result<(), AppError>) -> bool {
        matches!(r, Err(AppError::PermissionDenied(_)))
    }

    #[test]
    fn cross_tenant_reads_are_not_found() {
        let founder = principal("f", Role::Founder);
        let foreign = doc(Collection::Tasks, "t1", json!({"startupId": "s2"}));
        assert!(matches!(authorize_read(&founder, &foreign), Err(AppError::NotFound(_))));
        let own = doc(Collection::Tasks, "t2", json!({"startupId": "s1"}));
        assert!(authorize_read(&founder, &own).is_ok());
    }

    #[test]
    fn mentor_channel_is_hidden_from_team() {
        let msg = doc(Collection::Chats, "m1", json!({"startupId": "s1", "channel": "mentor"}));
        assert!(authorize_read(&principal("f", Role::Founder), &msg).is_ok());
        assert!(authorize_read(&principal("c", Role::CoFounder), &msg).is_ok());
        assert!(authorize_read(&principal("m", Role::Mentor), &msg).is_ok());
        assert!(is_denied(authorize_read(&principal("t", Role::Team), &msg)));
    }

    #[test]
    fn task_create_is_leadership_only() {
        let data = |by: &str| json!({"startupId": "s1", "title": "x", "createdBy": by});
        assert!(authorize_write(&principal("f", Role::Founder), Collection::Tasks, "t", None, Some(&data("f"))).is_ok());
        assert!(authorize_write(&principal("c", Role::CoFounder), Collection::Tasks, "t", None, Some(&data("c"))).is_ok());
        assert!(is_denied(authorize_write(&principal("t", Role::Team), Collection::Tasks, "t", None, Some(&data("t")))));
        assert!(is_denied(authorize_write(&principal("m", Role::Mentor), Collection::Tasks, "t", None, Some(&data("m")))));
    }

    #[test]
    fn assignees_may_only_move_progress() {
        let before = json!({"startupId": "s1", "title": "x", "createdBy": "f", "assignedTo": ["t"], "progress": 0, "status": "Pending"});
        let progressed = json!({"startupId": "s1", "title": "x", "createdBy": "f", "assignedTo": ["t"], "progress": 50, "status": "In Progress"});
        let renamed = json!({"startupId": "s1", "title": "y", "createdBy": "f", "assignedTo": ["t"], "progress": 0, "status": "Pending"});

        let team = principal("t", Role::Team);
        assert!(authorize_write(&team, Collection::Tasks, "t1", Some(&before), Some(&progressed)).is_ok());
        assert!(is_denied(authorize_write(&team, Collection::Tasks, "t1", Some(&before), Some(&renamed))));

        let outsider = principal("o", Role::Team);
        assert!(is_denied(authorize_write(&outsider, Collection::Tasks, "t1", Some(&before), Some(&progressed))));

        let mentor = principal("m", Role::Mentor);
        assert!(is_denied(authorize_write(&mentor, Collection::Tasks, "t1", Some(&before), Some(&progressed))));

        assert!(is_denied(authorize_write(&principal("f", Role::Founder), Collection::Tasks, "t1", Some(&before), None)));
    }

    #[test]
    fn milestones_are_founder_only() {
        let data = json!({"startupId": "s1", "createdBy": "c"});
        assert!(is_denied(authorize_write(&principal("c", Role::CoFounder), Collection::Milestones, "m", None, Some(&data))));
        let data = json!({"startupId": "s1", "createdBy": "f"});
        assert!(authorize_write(&principal("f", Role::Founder), Collection::Milestones, "m", None, Some(&data)).is_ok());
        assert!(authorize_write(&principal("f", Role::Founder), Collection::Milestones, "m", Some(&data), None).is_ok());
    }

    #[test]
    fn writes_into_another_tenant_are_rejected() {
        let data = json!({"startupId": "s2", "authorId": "f", "content": "x"});
        assert!(is_denied(authorize_write(&principal("f", Role::Founder), Collection::Feedback, "fb", None, Some(&data))));
    }

    #[test]
    fn profile_role_is_immutable_and_billing_is_founder_only() {
        let before = json!({"uid": "t", "startupId": "s1", "role": "TEAM", "displayName": "T"});
        let renamed = json!({"uid": "t", "startupId": "s1", "role": "TEAM", "displayName": "Tee"});
        let promoted = json!({"uid": "t", "startupId": "s1", "role": "FOUNDER", "displayName": "T"});
        let billed = json!({"uid": "t", "startupId": "s1", "role": "TEAM", "displayName": "T", "plan": "Pro"});

        assert!(authorize_write(&principal("t", Role::Team), Collection::Users, "t", Some(&before), Some(&renamed)).is_ok());
        assert!(is_denied(authorize_write(&principal("t", Role::Team), Collection::Users, "t", Some(&before), Some(&promoted))));
        assert!(is_denied(authorize_write(&principal("f", Role::Founder), Collection::Users, "t", Some(&before), Some(&promoted))));
        assert!(is_denied(authorize_write(&principal("t", Role::Team), Collection::Users, "t", Some(&before), Some(&billed))));
        assert!(authorize_write(&principal("f", Role::Founder), Collection::Users, "t", Some(&before), Some(&billed)).is_ok());
        assert!(is_denied(authorize_write(&principal("f", Role::Founder), Collection::Users, "t", Some(&before), Some(&renamed))));
    }

    #[test]
    fn notifications_only_flip_to_read_by_recipient() {
        let unread = json!({"recipientId": "t", "read": false, "title": "x"});
        let read = json!({"recipientId": "t", "read": true, "title": "x"});
        assert!(authorize_write(&principal("t", Role::Team), Collection::Notifications, "n", Some(&unread), Some(&read)).is_ok());
        assert!(is_denied(authorize_write(&principal("f", Role::Founder), Collection::Notifications, "n", Some(&unread), Some(&read))));
        assert!(is_denied(authorize_write(&principal("t", Role::Team), Collection::Notifications, "n", Some(&read), Some(&unread))));
        assert!(is_denied(authorize_write(&principal("t", Role::Team), Collection::Notifications, "n", None, Some(&unread))));
    }

    #[test]
    fn system_actor_bypasses_rules() {
        let data = json!({"recipientId": "t", "read": false});
        assert!(authorize_write(&Actor::System, Collection::Notifications, "n", None, Some(&data)).is_ok());
    }

    #[test]
    fn queries_are_pinned_to_the_callers_scope() {
        let team = principal("t", Role::Team);
        let q = constrain_query(&team, Query::new(Collection::Tasks)).unwrap();
        assert_eq!(q.eq_value("startupId"), Some(&json!("s1")));

        let foreign = Query::new(Collection::Tasks).where_eq("startupId", "s2");
        assert!(constrain_query(&team, foreign).is_err());

        let chats = constrain_query(&team, Query::new(Collection::Chats)).unwrap();
        assert!(chats.filters.iter().any(|f| f.field() == "channel"));

        let mentor_chat = Query::new(Collection::Chats).where_eq("channel", "mentor");
        assert!(constrain_query(&team, mentor_chat.clone()).is_err());
        assert!(constrain_query(&principal("m", Role::Mentor), mentor_chat).is_ok());

        let notes = constrain_query(&team, Query::new(Collection::Notifications)).unwrap();
        assert_eq!(notes.eq_value("recipientId"), Some(&json!("t")));

        assert!(constrain_query(&team, Query::new(Collection::Invitations)).is_err());
    }
}
