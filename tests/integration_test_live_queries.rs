mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use startupops_backend::domain::models::{
    communication::Channel,
    document::{ChangeKind, Collection, Query, Snapshot},
    user::{Actor, Role},
};
use startupops_backend::background::start_background_worker;
use startupops_backend::domain::services::document_service::Subscription;
use startupops_backend::error::AppError;
use std::time::Duration;
use uuid::Uuid;

async fn next_snapshot(sub: &mut Subscription) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .expect("Timed out waiting for a snapshot")
        .expect("Subscription ended early")
        .expect("Subscription failed")
}

async fn next_error(sub: &mut Subscription) -> AppError {
    match tokio::time::timeout(Duration::from_secs(5), sub.next()).await {
        Ok(Some(Err(e))) => e,
        Ok(Some(Ok(snapshot))) => panic!("Expected an error, got snapshot at seq {}", snapshot.seq),
        Ok(None) => panic!("Subscription ended without an error"),
        Err(_) => panic!("Timed out waiting for an error"),
    }
}

async fn assert_quiet(sub: &mut Subscription) {
    let waited = tokio::time::timeout(Duration::from_millis(200), sub.next()).await;
    assert!(waited.is_err(), "Expected no snapshot");
}

#[tokio::test]
async fn test_snapshots_follow_commits() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let actor = app.actor(&founder).await;

    let mut sub = app.state.documents
        .subscribe(actor, None, Query::new(Collection::Tasks), None)
        .await
        .unwrap();

    let initial = next_snapshot(&mut sub).await;
    assert!(initial.documents.is_empty());
    assert!(initial.seq > 0);

    let (_, task) = app.post("/api/v1/tasks", &founder, json!({"title": "Ship"})).await;
    let task_id = task["id"].as_str().unwrap().to_string();

    let added = next_snapshot(&mut sub).await;
    assert!(added.seq > initial.seq);
    assert_eq!(added.documents.len(), 1);
    assert_eq!(added.changes.len(), 1);
    assert_eq!(added.changes[0].kind, ChangeKind::Added);
    assert_eq!(added.changes[0].id, task_id);

    // Commits to other collections do not wake the query
    let (status, _) = app.post("/api/v1/feedback", &founder, json!({"type": "internal", "content": "note"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_quiet(&mut sub).await;

    app.patch(&format!("/api/v1/tasks/{}", task_id), &founder, json!({"progress": 30})).await;
    let modified = next_snapshot(&mut sub).await;
    assert!(modified.seq > added.seq);
    assert_eq!(modified.changes[0].kind, ChangeKind::Modified);
    assert_eq!(modified.documents[0].data["status"], "In Progress");
}

#[tokio::test]
async fn test_other_tenants_commits_are_invisible() {
    let app = TestApp::new().await;
    let acme = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let globex = app.signup_founder("hank@globex.io", "Hank", "Globex").await;

    let mut sub = app.state.documents
        .subscribe(app.actor(&acme).await, None, Query::new(Collection::Tasks), None)
        .await
        .unwrap();
    next_snapshot(&mut sub).await;

    app.post("/api/v1/tasks", &globex, json!({"title": "Globex secret"})).await;
    assert_quiet(&mut sub).await;

    app.post("/api/v1/tasks", &acme, json!({"title": "Acme plan"})).await;
    let snapshot = next_snapshot(&mut sub).await;
    assert_eq!(snapshot.documents.len(), 1);
    assert_eq!(snapshot.documents[0].data["title"], "Acme plan");
}

#[tokio::test]
async fn test_resume_skips_unchanged_initial_snapshot() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    app.post("/api/v1/tasks", &founder, json!({"title": "First"})).await;

    let mut first = app.state.documents
        .subscribe(app.actor(&founder).await, None, Query::new(Collection::Tasks), None)
        .await
        .unwrap();
    let seen = next_snapshot(&mut first).await;
    drop(first);

    let mut resumed = app.state.documents
        .subscribe(app.actor(&founder).await, None, Query::new(Collection::Tasks), Some(seen.seq))
        .await
        .unwrap();
    assert_quiet(&mut resumed).await;

    app.post("/api/v1/tasks", &founder, json!({"title": "Second"})).await;
    let snapshot = next_snapshot(&mut resumed).await;
    assert_eq!(snapshot.documents.len(), 2);
}

#[tokio::test]
async fn test_logout_ends_live_queries() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;

    let (_, session) = app.state.identity.login("ada@acme.io", "password123").await.unwrap();
    let mut sub = app.state.documents
        .subscribe(app.actor(&founder).await, Some(session.session_id), Query::new(Collection::Tasks), None)
        .await
        .unwrap();
    // A subscription of another session survives
    let mut other = app.state.documents
        .subscribe(app.actor(&founder).await, Some(Uuid::new_v4()), Query::new(Collection::Tasks), None)
        .await
        .unwrap();
    next_snapshot(&mut sub).await;
    next_snapshot(&mut other).await;

    app.state.identity.logout(session.session_id).await.unwrap();

    assert!(matches!(next_error(&mut sub).await, AppError::Unauthenticated));
    let ended = tokio::time::timeout(Duration::from_secs(5), sub.next()).await.unwrap();
    assert!(ended.is_none());

    app.post("/api/v1/tasks", &founder, json!({"title": "Still live"})).await;
    assert_eq!(next_snapshot(&mut other).await.documents.len(), 1);
}

#[tokio::test]
async fn test_losing_membership_closes_subscription() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;

    let mut sub = app.state.documents
        .subscribe(app.actor(&team).await, None, Query::new(Collection::Tasks), None)
        .await
        .unwrap();
    next_snapshot(&mut sub).await;

    app.state.documents
        .update(&Actor::System, Collection::Users, &team.uid, json!({"startupId": "startup_elsewhere"}), None)
        .await
        .unwrap();

    assert!(matches!(next_error(&mut sub).await, AppError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_channel_visibility_in_live_queries() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;
    let mentor = app.join(&founder, "mia@acme.io", "Mia", Role::Mentor).await;
    let team_actor = app.actor(&team).await;

    let denied = app.state.communication.subscribe_channel(&team_actor, None, Channel::Mentor).await;
    assert!(matches!(denied, Err(AppError::PermissionDenied(_))));

    let mut all_chats = app.state.documents
        .subscribe(team_actor, None, Query::new(Collection::Chats), None)
        .await
        .unwrap();
    next_snapshot(&mut all_chats).await;

    app.post("/api/v1/chats/mentor", &mentor, json!({"text": "Leadership only"})).await;
    assert_quiet(&mut all_chats).await;

    app.post("/api/v1/chats/general", &mentor, json!({"text": "Hello team"})).await;
    let snapshot = next_snapshot(&mut all_chats).await;
    assert_eq!(snapshot.documents.len(), 1);
    assert_eq!(snapshot.documents[0].data["text"], "Hello team");
}

#[tokio::test]
async fn test_display_name_change_propagates_to_authored_records() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;

    app.post("/api/v1/chats/general", &team, json!({"text": "hi"})).await;
    app.post("/api/v1/feedback", &team, json!({"type": "internal", "content": "idea"})).await;

    let (status, _) = app.patch(&format!("/api/v1/users/{}", team.uid), &team, json!({"displayName": "Robert"})).await;
    assert_eq!(status, StatusCode::OK);

    let mut propagated = false;
    for _ in 0..100 {
        let (_, chats) = app.get("/api/v1/chats/general", &team).await;
        let (_, feedback) = app.get("/api/v1/feedback", &team).await;
        if chats[0]["author"] == "Robert" && feedback[0]["authorName"] == "Robert" {
            propagated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(propagated, "display name was not propagated");
}

#[tokio::test]
async fn test_background_workers_stop_on_shutdown() {
    let app = TestApp::new().await;
    let documents = app.state.documents.clone();
    let before = documents.commit_watchers();

    let workers = start_background_worker(app.state.clone());
    assert_eq!(documents.commit_watchers(), before + 1);

    tokio::time::timeout(Duration::from_secs(5), workers.shutdown())
        .await
        .expect("Workers did not stop");
    assert_eq!(documents.commit_watchers(), before);
}
