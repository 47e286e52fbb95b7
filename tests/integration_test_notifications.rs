mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use startupops_backend::domain::{
    models::user::Role,
    services::notification_service::NotificationDraft,
};

#[tokio::test]
async fn test_task_assignment_notifies_assignees_except_creator() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let cofounder = app.join(&founder, "cy@acme.io", "Cy", Role::CoFounder).await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;

    let (status, _) = app.post("/api/v1/tasks", &founder, json!({
        "title": "Investor update",
        "assignedTo": [founder.uid, cofounder.uid, team.uid],
    })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, notes) = app.get("/api/v1/notifications", &team).await;
    assert_eq!(status, StatusCode::OK);
    let notes = notes.as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["type"], "task_assignment");
    assert_eq!(notes[0]["title"], "New Task Assigned");
    assert_eq!(notes[0]["message"], "Ada assigned you a task: Investor update");
    assert_eq!(notes[0]["link"], "/tasks");
    assert_eq!(notes[0]["sender"]["displayName"], "Ada");
    assert_eq!(notes[0]["read"], false);

    let (_, cy_notes) = app.get("/api/v1/notifications", &cofounder).await;
    assert_eq!(cy_notes.as_array().unwrap().len(), 1);

    let (_, own) = app.get("/api/v1/notifications", &founder).await;
    assert!(own.as_array().unwrap().is_empty());

    // Only the recipient can mark a notification read
    let cy_note_id = cy_notes[0]["id"].as_str().unwrap();
    let (status, _) = app.post(&format!("/api/v1/notifications/{}/read", cy_note_id), &team, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, read) = app.post(&format!("/api/v1/notifications/{}/read", cy_note_id), &cofounder, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["read"], true);

    // Read never flips back
    let (status, _) = app.patch(&format!("/api/v1/documents/notifications/{}", cy_note_id), &cofounder, json!({"read": false})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Nobody writes notifications directly
    let (status, _) = app.post("/api/v1/documents/notifications", &founder, json!({
        "recipientId": team.uid, "type": "spam", "title": "x", "message": "y", "read": false
    })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_mark_all_read() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;

    for title in ["One", "Two", "Three"] {
        let (status, _) = app.post("/api/v1/tasks", &founder, json!({"title": title, "assignedTo": [team.uid]})).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app.post("/api/v1/notifications/read-all", &team, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 3);

    let (_, notes) = app.get("/api/v1/notifications", &team).await;
    assert!(notes.as_array().unwrap().iter().all(|n| n["read"] == true));

    let (_, body) = app.post("/api/v1/notifications/read-all", &team, json!({})).await;
    assert_eq!(body["updated"], 0);
}

#[tokio::test]
async fn test_listing_is_newest_first_and_capped() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;

    for i in 0..23 {
        app.state.notifications.create(NotificationDraft {
            recipient_id: founder.uid.clone(),
            notification_type: "system".to_string(),
            title: format!("Note {}", i),
            message: "hello".to_string(),
            link: None,
            sender: None,
            startup_id: Some(founder.startup_id.clone()),
        }).await.unwrap();
    }

    let (_, notes) = app.get("/api/v1/notifications", &founder).await;
    let notes = notes.as_array().unwrap();
    assert_eq!(notes.len(), 20);
    assert_eq!(notes[0]["title"], "Note 22");
    assert_eq!(notes[19]["title"], "Note 3");

    let (_, few) = app.get("/api/v1/notifications?limit=5", &founder).await;
    assert_eq!(few.as_array().unwrap().len(), 5);

    let (_, capped) = app.get("/api/v1/notifications?limit=500", &founder).await;
    assert_eq!(capped.as_array().unwrap().len(), 20);
}
