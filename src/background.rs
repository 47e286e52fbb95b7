use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::models::{
    document::{Collection, CommitRecord, DocumentChange, Query, WriteOp},
    user::Actor,
};
use crate::domain::services::document_service::DocumentService;
use crate::error::AppError;
use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Handles of the running background jobs.
pub struct BackgroundWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundWorkers {
    /// Aborts every job and waits until each has stopped.
    pub async fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Background workers stopped");
    }
}

pub fn start_background_worker(state: Arc<AppState>) -> BackgroundWorkers {
    info!("Starting background workers...");

    let documents = state.documents.clone();
    let commits = documents.watch_commits();
    let reconciler = tokio::spawn(run_display_name_reconciler(documents, commits));
    let sweeper = tokio::spawn(run_invitation_sweeper(state));

    BackgroundWorkers { handles: vec![reconciler, sweeper] }
}

async fn run_invitation_sweeper(state: Arc<AppState>) {
    loop {
        let span = info_span!("background_job", job_type = "invitation_sweep");
        async {
            match state.invitations.sweep_expired().await {
                Ok(0) => debug!("No expired invitations"),
                Ok(n) => info!(revoked = n, "Revoked expired invitations"),
                Err(e) => error!("Invitation sweep failed: {:?}", e),
            }
        }
            .instrument(span)
            .await;
        sleep(SWEEP_INTERVAL).await;
    }
}

/// Keeps author names copied into chats and feedback in step with `users.displayName`.
pub async fn run_display_name_reconciler(
    documents: Arc<DocumentService>,
    mut commits: broadcast::Receiver<Arc<CommitRecord>>,
) {
    loop {
        match commits.recv().await {
            Ok(record) => {
                for change in renames(&record) {
                    let span = info_span!("background_job", job_type = "display_name_sync", user_id = %change.id);
                    if let Err(e) = sync_display_name(&documents, change).instrument(span).await {
                        error!(user_id = %change.id, "Failed to propagate display name: {:?}", e);
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Display name reconciler lagged behind the commit log"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn renames(record: &CommitRecord) -> impl Iterator<Item = &DocumentChange> {
    record.changes.iter().filter(|c| {
        c.collection == Collection::Users
            && match (&c.before, &c.after) {
                (Some(b), Some(a)) => b.field("displayName") != a.field("displayName"),
                _ => false,
            }
    })
}

async fn sync_display_name(documents: &DocumentService, change: &DocumentChange) -> Result<usize, AppError> {
    let Some(after) = &change.after else { return Ok(0) };
    let (Some(name), Some(startup_id)) = (after.str_field("displayName"), after.str_field("startupId")) else {
        return Ok(0);
    };

    let mut ops = Vec::new();
    for (collection, name_field) in [(Collection::Chats, "author"), (Collection::Feedback, "authorName")] {
        let query = Query::new(collection)
            .where_eq("startupId", startup_id)
            .where_eq("authorId", change.id.as_str());
        for doc in documents.query(&Actor::System, query).await? {
            if doc.str_field(name_field) != Some(name) {
                ops.push(WriteOp::Update {
                    collection,
                    id: doc.id,
                    patch: json!({ name_field: name }),
                    expected_version: None,
                });
            }
        }
    }

    let count = ops.len();
    if count > 0 {
        documents.batch(&Actor::System, ops).await?;
        info!(updated = count, "Propagated display name change");
    }
    Ok(count)
}
