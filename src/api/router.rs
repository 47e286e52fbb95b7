use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use crate::state::AppState;
use crate::api::handlers::{
    analytics, auth, blob, communication, document, health, invitation, member, notification, signup,
    subscribe, task, tenant,
};
use crate::domain::services::blob_service::MAX_LOGO_BYTES;
use tower_http::{
    trace::TraceLayer,
    classify::ServerErrorsFailureClass,
};
use tower_cookies::CookieManagerLayer;
use tracing::{info_span, Span, error, info};
use uuid::Uuid;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/config", get(health::client_config))

        // Auth
        .route("/api/v1/auth/signup", post(auth::signup))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/logout/session", post(auth::logout_session))
        .route("/api/v1/auth/me", get(auth::me))

        // Onboarding
        .route("/api/v1/signup", post(signup::signup))

        // Invitations
        .route("/api/v1/invitations", post(invitation::create_invitation).get(invitation::list_invitations))
        .route("/api/v1/invitations/{invitation_id}", get(invitation::resolve_invitation))
        .route("/api/v1/invitations/{invitation_id}/revoke", post(invitation::revoke_invitation))

        // Startup & members
        .route("/api/v1/startups/{startup_id}", get(tenant::get_startup).patch(tenant::update_startup))
        .route("/api/v1/startups/{startup_id}/members", get(member::list_members))
        .route(
            "/api/v1/startups/{startup_id}/logo",
            put(blob::upload_logo)
                .get(blob::get_logo)
                .layer(DefaultBodyLimit::max(MAX_LOGO_BYTES * 2)),
        )
        .route("/api/v1/startups/{startup_id}/logo/url", get(blob::get_logo_url))
        .route("/api/v1/users/{uid}", get(member::get_user).patch(member::update_user))
        .route("/api/v1/dashboard", get(tenant::dashboard))

        // Tasks & milestones
        .route("/api/v1/tasks", get(task::list_tasks).post(task::create_task))
        .route("/api/v1/tasks/{task_id}", get(task::get_task).patch(task::update_task))
        .route("/api/v1/milestones", get(task::list_milestones).post(task::create_milestone))
        .route("/api/v1/milestones/{milestone_id}", put(task::update_milestone).patch(task::update_milestone).delete(task::delete_milestone))
        .route("/api/v1/milestones/{milestone_id}/toggle", post(task::toggle_milestone))

        // Feedback & chat
        .route("/api/v1/feedback", get(communication::list_feedback).post(communication::create_feedback))
        .route("/api/v1/feedback/{feedback_id}", patch(communication::update_feedback_status))
        .route("/api/v1/chats/{channel}", get(communication::list_messages).post(communication::post_message))

        // Notifications
        .route("/api/v1/notifications", get(notification::list_notifications))
        .route("/api/v1/notifications/read-all", post(notification::mark_all_read))
        .route("/api/v1/notifications/{notification_id}/read", post(notification::mark_read))

        // Analytics
        .route("/api/v1/analytics", get(analytics::get_report))
        .route("/api/v1/analytics/live", get(analytics::live_report))

        // Documents & live queries
        .route("/api/v1/documents/batch", post(document::batch_write))
        .route("/api/v1/documents/{collection}", post(document::create_document))
        .route("/api/v1/documents/{collection}/query", post(document::query_documents))
        .route(
            "/api/v1/documents/{collection}/{id}",
            get(document::get_document)
                .put(document::set_document)
                .patch(document::update_document)
                .delete(document::delete_document),
        )
        .route("/api/v1/subscribe", get(subscribe::subscribe))

        // Signed blob downloads
        .route("/api/v1/blobs/{*path}", get(blob::get_signed_blob))

        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = Uuid::new_v4().to_string();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = ?request.method(),
                        uri = ?request.uri(),
                        version = ?request.version(),
                        startup_id = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                    )
                })
                .on_request(|request: &Request<Body>, _span: &Span| {
                    info!("started processing request: {} {}", request.method(), request.uri().path());
                })
                .on_response(|response: &axum::http::Response<Body>, latency: Duration, _span: &Span| {
                    info!(
                        status = response.status().as_u16(),
                        latency_ms = latency.as_millis(),
                        "finished processing request"
                    );
                })
                .on_failure(|error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                    error!("request failed: {:?}", error);
                })
        )
        .layer(CookieManagerLayer::new())
        .with_state(state)
}
