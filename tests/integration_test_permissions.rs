mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use startupops_backend::domain::models::user::Role;

#[tokio::test]
async fn test_task_permissions_by_role() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let cofounder = app.join(&founder, "cy@acme.io", "Cy", Role::CoFounder).await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;
    let bystander = app.join(&founder, "tim@acme.io", "Tim", Role::Team).await;
    let mentor = app.join(&founder, "mia@acme.io", "Mia", Role::Mentor).await;

    let (status, _) = app.post("/api/v1/tasks", &team, json!({"title": "Sneaky"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.post("/api/v1/tasks", &mentor, json!({"title": "Advice"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, task) = app.post("/api/v1/tasks", &cofounder, json!({
        "title": "Landing page",
        "priority": "High",
        "dueDate": "2026-12-01",
        "assignedTo": [team.uid, team.uid],
    })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "Pending");
    assert_eq!(task["createdBy"], cofounder.uid.as_str());
    assert_eq!(task["assignedTo"], json!([team.uid]));
    let uri = format!("/api/v1/tasks/{}", task["id"].as_str().unwrap());

    // Assignees move progress; status follows
    let (status, updated) = app.patch(&uri, &team, json!({"progress": 50})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["progress"], 50);
    assert_eq!(updated["status"], "In Progress");

    let (status, _) = app.patch(&uri, &team, json!({"title": "Renamed"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.patch(&uri, &bystander, json!({"progress": 60})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.patch(&uri, &mentor, json!({"progress": 60})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Progress is a multiple of ten in [0, 100]
    let (status, _) = app.patch(&uri, &team, json!({"progress": 55})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.patch(&uri, &founder, json!({"progress": 120})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app.patch(&uri, &founder, json!({"progress": 100, "title": "Landing page v2"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "Done");

    // Assignees must belong to the startup
    let outsider = app.signup_founder("hank@globex.io", "Hank", "Globex").await;
    let (status, _) = app.post("/api/v1/tasks", &founder, json!({
        "title": "Cross", "assignedTo": [outsider.uid]
    })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No one deletes tasks
    let (status, _) = app.send("DELETE", &format!("/api/v1/documents/tasks/{}", task["id"].as_str().unwrap()), Some(&founder.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, mine) = app.get(&format!("/api/v1/tasks?assignee={}", team.uid), &team).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_milestones_are_founder_only() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let cofounder = app.join(&founder, "cy@acme.io", "Cy", Role::CoFounder).await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;

    let (status, _) = app.post("/api/v1/milestones", &cofounder, json!({"title": "Seed round", "date": "2026-09-01"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, milestone) = app.post("/api/v1/milestones", &founder, json!({"title": "Seed round", "date": "2026-09-01"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(milestone["status"], "Upcoming");
    let id = milestone["id"].as_str().unwrap();

    let (status, _) = app.post(&format!("/api/v1/milestones/{}/toggle", id), &cofounder, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, toggled) = app.post(&format!("/api/v1/milestones/{}/toggle", id), &founder, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["status"], "Completed");
    let (_, toggled) = app.post(&format!("/api/v1/milestones/{}/toggle", id), &founder, json!({})).await;
    assert_eq!(toggled["status"], "Upcoming");

    // Everyone in the startup can read them
    let (status, list) = app.get("/api/v1/milestones", &team).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = app.send("DELETE", &format!("/api/v1/milestones/{}", id), Some(&cofounder.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send("DELETE", &format!("/api/v1/milestones/{}", id), Some(&founder.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, list) = app.get("/api/v1/milestones", &founder).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_mentor_channel_is_closed_to_team() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;
    let mentor = app.join(&founder, "mia@acme.io", "Mia", Role::Mentor).await;

    let (status, msg) = app.post("/api/v1/chats/mentor", &mentor, json!({"text": "Office hours at 3"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg["author"], "Mia");
    assert_eq!(msg["role"], "MENTOR");

    let (status, _) = app.post("/api/v1/chats/mentor", &team, json!({"text": "Can I join?"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/v1/chats/mentor", &team).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.post("/api/v1/chats/general", &team, json!({"text": "Morning all"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.post("/api/v1/chats/general", &founder, json!({"text": "Morning"})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, general) = app.get("/api/v1/chats/general", &team).await;
    let texts: Vec<&str> = general.as_array().unwrap().iter().map(|m| m["text"].as_str().unwrap()).collect();
    assert_eq!(texts, vec!["Morning all", "Morning"]);

    let (status, mentor_msgs) = app.get("/api/v1/chats/mentor", &founder).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mentor_msgs.as_array().unwrap().len(), 1);

    // A generic query without a channel only yields what the role may see
    let (status, docs) = app.post("/api/v1/documents/chats/query", &team, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(docs.as_array().unwrap().iter().all(|d| d["data"]["channel"] == "general"));
    assert_eq!(docs.as_array().unwrap().len(), 2);

    // Messages are immutable
    let id = msg["id"].as_str().unwrap();
    let (status, _) = app.patch(&format!("/api/v1/documents/chats/{}", id), &mentor, json!({"text": "edited"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_feedback_status_is_leadership_only() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;

    let (status, feedback) = app.post("/api/v1/feedback", &team, json!({
        "type": "external", "content": "Customers want dark mode", "source": "Intercom"
    })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(feedback["status"], "Open");
    assert_eq!(feedback["authorName"], "Bob");
    let uri = format!("/api/v1/feedback/{}", feedback["id"].as_str().unwrap());

    let (status, _) = app.post("/api/v1/feedback", &team, json!({"type": "internal", "content": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.patch(&uri, &team, json!({"status": "Addressed"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app.patch(&uri, &founder, json!({"status": "Addressed"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "Addressed");

    let (_, internal) = app.get("/api/v1/feedback?type=internal", &founder).await;
    assert!(internal.as_array().unwrap().is_empty());
    let (_, external) = app.get("/api/v1/feedback?type=external", &founder).await;
    assert_eq!(external.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unauthenticated_requests_are_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app.send("GET", "/api/v1/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");

    let (status, _) = app.send("GET", "/api/v1/tasks", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, config) = app.send("GET", "/api/v1/config", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["projectId"], "startupops");
    assert_eq!(config["notificationLimit"], 20);
}
