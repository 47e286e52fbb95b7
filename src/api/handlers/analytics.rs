use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Query, State},
    response::IntoResponse,
    Json,
};
use crate::api::dtos::requests::AnalyticsQuery;
use crate::api::extractors::auth::AuthUser;
use crate::domain::models::{analytics::GrowthRange, user::Role};
use crate::domain::services::{analytics::{report_for_role, report_from_snapshot}, document_service::Subscription};
use crate::state::AppState;
use crate::error::AppError;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.analytics.report(&user.actor, query.range).await?))
}

/// Pushes a fresh report whenever the startup's users change.
pub async fn live_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<AnalyticsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let role = user.principal().ok_or(AppError::Unauthenticated)?.role;
    let subscription = state.analytics.subscribe(&user.actor, Some(user.session_id)).await?;
    Ok(ws.on_upgrade(move |socket| stream_reports(socket, subscription, query.range, role)))
}

async fn stream_reports(mut socket: WebSocket, mut subscription: Subscription, range: GrowthRange, role: Role) {
    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            },
            item = subscription.next() => {
                let message = match item {
                    Some(Ok(snapshot)) => match report_from_snapshot(&snapshot, range, Utc::now()) {
                        Ok(report) => json!({ "type": "report", "seq": snapshot.seq, "report": report_for_role(report, role) }),
                        Err(e) => error_message(&e),
                    },
                    Some(Err(e)) => error_message(&e),
                    None => break,
                };
                if socket.send(Message::Text(message.to_string().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Analytics stream closed");
}

fn error_message(e: &AppError) -> serde_json::Value {
    json!({ "type": "error", "code": e.code(), "message": e.public_message() })
}
