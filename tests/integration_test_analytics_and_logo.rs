mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{TestApp, TestUser};
use serde_json::{json, Value};
use startupops_backend::domain::{
    models::{analytics::GrowthRange, user::Role},
    services::{analytics::report_from_snapshot, blob_service::sign_blob},
};
use std::time::Duration;
use tower::ServiceExt;

async fn upload(app: &TestApp, user: &TestUser, startup_id: &str, content_type: &str, bytes: &[u8]) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(
        Request::builder()
            .method("PUT")
            .uri(format!("/api/v1/startups/{}/logo", startup_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(bytes.to_vec()))
            .unwrap()
    ).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn fetch_raw(app: &TestApp, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    ).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_analytics_report_by_role() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let cofounder = app.join(&founder, "cy@acme.io", "Cy", Role::CoFounder).await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;
    let mentor = app.join(&founder, "mia@acme.io", "Mia", Role::Mentor).await;

    let (status, _) = app.patch(&format!("/api/v1/users/{}", team.uid), &founder, json!({
        "status": "active", "plan": "Pro", "price": 29.0, "addOns": [{"name": "Extra seats", "price": 5.0}]
    })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.patch(&format!("/api/v1/users/{}", mentor.uid), &founder, json!({
        "status": "cancelled", "plan": "Enterprise", "price": 199.0
    })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, report) = app.get("/api/v1/analytics?range=monthly", &cofounder).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["totalUsers"], 4);
    assert_eq!(report["activeUsers"], 1);
    assert_eq!(report["cancelledUsers"], 1);
    assert_eq!(report["churnRate"], "25.0");
    assert_eq!(report["mrr"], 34.0);
    assert_eq!(report["revenueByPlan"], json!({"pro": 29.0, "enterprise": 0.0, "addOns": 5.0}));
    let growth = report["userGrowth"].as_array().unwrap();
    assert_eq!(growth.len(), 12);
    assert_eq!(growth.last().unwrap()["users"], 4);

    let (_, daily) = app.get("/api/v1/analytics?range=daily", &founder).await;
    assert_eq!(daily["userGrowth"].as_array().unwrap().len(), 31);

    // Other members see the stat cards only
    for member in [&team, &mentor] {
        let (status, headline) = app.get("/api/v1/analytics", member).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headline["totalUsers"], 4);
        assert_eq!(headline["mrr"], 34.0);
        assert_eq!(headline["churnRate"], "25.0");
        assert!(headline.get("revenueByPlan").is_none());
        assert!(headline.get("userGrowth").is_none());
    }
}

#[tokio::test]
async fn test_live_analytics_recompute_on_user_changes() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let actor = app.actor(&founder).await;

    let mut sub = app.state.analytics.subscribe(&actor, None).await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), sub.next()).await.unwrap().unwrap().unwrap();
    let report = report_from_snapshot(&first, GrowthRange::Yearly, chrono::Utc::now()).unwrap();
    assert_eq!(report.total_users, 1);

    app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;

    let next = tokio::time::timeout(Duration::from_secs(5), sub.next()).await.unwrap().unwrap().unwrap();
    let report = report_from_snapshot(&next, GrowthRange::Yearly, chrono::Utc::now()).unwrap();
    assert_eq!(report.total_users, 2);
    assert_eq!(report.user_growth.as_ref().unwrap().last().unwrap().users, 2);
}

#[tokio::test]
async fn test_logo_upload_and_signed_urls() {
    let app = TestApp::new().await;
    let founder = app.signup_founder("ada@acme.io", "Ada", "Acme").await;
    let team = app.join(&founder, "bob@acme.io", "Bob", Role::Team).await;
    let outsider = app.signup_founder("hank@globex.io", "Hank", "Globex").await;

    let logo = b"\x89PNG\r\n\x1a\nfake-logo-bytes";
    let (status, uploaded) = upload(&app, &founder, &founder.startup_id, "image/png", logo).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(uploaded["size"], logo.len());
    assert_eq!(uploaded["contentType"], "image/png");
    let url = uploaded["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("http://localhost:3000/api/v1/blobs/"));
    let expected_sig = sign_blob(
        b"test-signing-key",
        &format!("startups/{}/logo", founder.startup_id),
        uploaded["version"].as_str().unwrap(),
    ).unwrap();
    assert!(url.ends_with(&format!("&sig={}", expected_sig)));

    let (_, startup) = app.get(&format!("/api/v1/startups/{}", founder.startup_id), &team).await;
    assert_eq!(startup["logoUrl"], url.as_str());

    // Signed URLs work without a session
    let path = url.trim_start_matches("http://localhost:3000");
    let (status, bytes) = fetch_raw(&app, path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, logo.to_vec());

    let (status, _) = fetch_raw(&app, &format!("{}x", path)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Members read it through the API too
    let (status, current) = app.get(&format!("/api/v1/startups/{}/logo/url", founder.startup_id), &team).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["url"], url.as_str());

    // Replacing the logo retires the old URL
    let (status, replaced) = upload(&app, &founder, &founder.startup_id, "image/png", b"\x89PNGnew-logo").await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(replaced["version"], uploaded["version"]);
    let (status, _) = fetch_raw(&app, path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = upload(&app, &team, &founder.startup_id, "image/png", logo).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = upload(&app, &founder, &founder.startup_id, "text/plain", b"not an image").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = upload(&app, &outsider, &founder.startup_id, "image/png", logo).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get(&format!("/api/v1/startups/{}/logo", founder.startup_id), &outsider).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
