use crate::domain::models::{
    document::{
        format_timestamp, new_document_id, resolve_sentinels, ChangeKind, Collection, CommitOutcome, CommitRecord,
        Document, DocumentChange, Precondition, Query, ResolvedWrite, Snapshot, SnapshotChange, WriteKind, WriteOp,
    },
    user::Actor,
};
use crate::domain::ports::DocumentRepository;
use crate::domain::services::{access_policy, record_rules, retry::with_backoff};
use crate::error::AppError;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const COMMIT_CHANNEL_CAPACITY: usize = 1024;
const SUBSCRIPTION_BUFFER: usize = 16;
const MAX_CONFLICT_RETRIES: u32 = 5;

/// Strictly increasing commit timestamps, microsecond resolution.
#[derive(Debug, Default)]
pub struct CommitClock {
    last: Option<DateTime<Utc>>,
}

impl CommitClock {
    pub fn tick(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.duration_trunc(ChronoDuration::microseconds(1)).unwrap_or(now);
        let next = match self.last {
            Some(last) if now <= last => last + ChronoDuration::microseconds(1),
            _ => now,
        };
        self.last = Some(next);
        next
    }
}

/// A write with its stored before-image, ready to be stamped and committed.
struct PlannedWrite {
    collection: Collection,
    id: String,
    before: Option<Document>,
    draft: Option<Value>,
    precondition: Precondition,
}

pub struct DocumentService {
    repo: Arc<dyn DocumentRepository>,
    clock: Arc<Mutex<CommitClock>>,
    commits: broadcast::Sender<Arc<CommitRecord>>,
    session_ends: broadcast::Sender<Uuid>,
    request_timeout: Duration,
    retry_attempts: u32,
}

impl DocumentService {
    pub fn new(repo: Arc<dyn DocumentRepository>, request_timeout: Duration, retry_attempts: u32) -> Self {
        let (commits, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        let (session_ends, _) = broadcast::channel(64);
        Self {
            repo,
            clock: Arc::new(Mutex::new(CommitClock::default())),
            commits,
            session_ends,
            request_timeout,
            retry_attempts,
        }
    }

    async fn deadline<T>(&self, fut: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| AppError::DeadlineExceeded)?
    }

    async fn load(&self, collection: Collection, id: &str) -> Result<Option<Document>, AppError> {
        with_backoff("document store", self.retry_attempts, || self.repo.get(collection, id)).await
    }

    pub async fn get(&self, actor: &Actor, collection: Collection, id: &str) -> Result<Document, AppError> {
        let doc = self
            .deadline(self.load(collection, id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{}/{} not found", collection, id)))?;
        access_policy::authorize_read(actor, &doc)?;
        Ok(doc)
    }

    /// Like `get` but `None` when the document does not exist.
    pub async fn find(&self, actor: &Actor, collection: Collection, id: &str) -> Result<Option<Document>, AppError> {
        match self.get(actor, collection, id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn query(&self, actor: &Actor, query: Query) -> Result<Vec<Document>, AppError> {
        let query = access_policy::constrain_query(actor, query)?;
        let (_, docs) = self.deadline(fetch(&*self.repo, actor, &query, self.retry_attempts)).await?;
        Ok(docs)
    }

    pub async fn create(&self, actor: &Actor, collection: Collection, id: Option<String>, data: Value) -> Result<Document, AppError> {
        let outcome = self.batch(actor, vec![WriteOp::Create { collection, id, data }]).await?;
        single_document(outcome)
    }

    pub async fn set(&self, actor: &Actor, collection: Collection, id: &str, data: Value) -> Result<Document, AppError> {
        let outcome = self.batch(actor, vec![WriteOp::Set { collection, id: id.to_string(), data }]).await?;
        single_document(outcome)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        collection: Collection,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> Result<Document, AppError> {
        let op = WriteOp::Update { collection, id: id.to_string(), patch, expected_version };
        let outcome = self.batch(actor, vec![op]).await?;
        single_document(outcome)
    }

    pub async fn delete(&self, actor: &Actor, collection: Collection, id: &str, expected_version: Option<i64>) -> Result<(), AppError> {
        let op = WriteOp::Delete { collection, id: id.to_string(), expected_version };
        self.batch(actor, vec![op]).await.map(|_| ())
    }

    /// Applies all operations atomically. Without explicit `expectedVersion`s a
    /// concurrent modification is retried against fresh state; with them it
    /// surfaces as `Conflict`.
    pub async fn batch(&self, actor: &Actor, ops: Vec<WriteOp>) -> Result<CommitOutcome, AppError> {
        if ops.is_empty() {
            return Err(AppError::InvalidArgument("Batch must contain at least one write".into()));
        }
        let ops: Vec<WriteOp> = ops
            .into_iter()
            .map(|op| match op {
                WriteOp::Create { collection, id: None, data } => WriteOp::Create { collection, id: Some(new_document_id()), data },
                other => other,
            })
            .collect();
        let optimistic = ops.iter().any(|op| {
            matches!(op, WriteOp::Update { expected_version: Some(_), .. } | WriteOp::Delete { expected_version: Some(_), .. })
        });

        let ops = &ops;
        self.deadline(async {
            let mut conflicts = 0;
            loop {
                let attempt = with_backoff("document store", self.retry_attempts, || self.try_commit(actor, ops)).await;
                match attempt {
                    Err(AppError::Conflict(msg)) if !optimistic && conflicts < MAX_CONFLICT_RETRIES => {
                        debug!("Write conflict ({}), re-reading and retrying", msg);
                        conflicts += 1;
                    }
                    other => return other,
                }
            }
        })
        .await
    }

    async fn try_commit(&self, actor: &Actor, ops: &[WriteOp]) -> Result<CommitOutcome, AppError> {
        let plans = self.plan(actor, ops).await?;

        // The commit runs detached so that a caller timing out cannot split a
        // durable commit from its publication.
        let repo = self.repo.clone();
        let clock = self.clock.clone();
        let commits = self.commits.clone();
        let actor = actor.clone();
        tokio::spawn(async move { commit_and_publish(repo, clock, commits, actor, plans).await })
            .await
            .map_err(|e| AppError::InternalWithMsg(format!("Commit task failed: {}", e)))?
    }

    async fn plan(&self, actor: &Actor, ops: &[WriteOp]) -> Result<Vec<PlannedWrite>, AppError> {
        let mut seen = HashSet::new();
        let mut plans = Vec::with_capacity(ops.len());

        for op in ops {
            let (collection, id) = match op {
                WriteOp::Create { collection, id, .. } => (*collection, id.clone().unwrap_or_default()),
                WriteOp::Set { collection, id, .. }
                | WriteOp::Update { collection, id, .. }
                | WriteOp::Delete { collection, id, .. } => (*collection, id.clone()),
            };
            if id.is_empty() || id.contains('/') {
                return Err(AppError::InvalidArgument(format!("Invalid document id '{}'", id)));
            }
            if !seen.insert((collection, id.clone())) {
                return Err(AppError::InvalidArgument(format!("{}/{} is written twice in one batch", collection, id)));
            }

            let before = self.repo.get(collection, &id).await?;
            let not_found = || AppError::NotFound(format!("{}/{} not found", collection, id));
            let check_version = |before: &Document, expected: &Option<i64>| match expected {
                Some(v) if *v != before.version => Err(AppError::Conflict(format!(
                    "{}/{} is at version {}, expected {}",
                    collection, id, before.version, v
                ))),
                _ => Ok(()),
            };

            let (draft, precondition) = match op {
                WriteOp::Create { data, .. } => {
                    if before.is_some() {
                        return Err(AppError::AlreadyExists(format!("{}/{} already exists", collection, id)));
                    }
                    (Some(data.clone()), Precondition::MustNotExist)
                }
                WriteOp::Set { data, .. } => {
                    let pre = before.as_ref().map_or(Precondition::MustNotExist, |b| Precondition::Version(b.version));
                    (Some(data.clone()), pre)
                }
                WriteOp::Update { patch, expected_version, .. } => {
                    let current = before.as_ref().ok_or_else(not_found)?;
                    check_version(current, expected_version)?;
                    (Some(merge_patch(&current.data, patch)?), Precondition::Version(current.version))
                }
                WriteOp::Delete { expected_version, .. } => {
                    let current = before.as_ref().ok_or_else(not_found)?;
                    check_version(current, expected_version)?;
                    (None, Precondition::Version(current.version))
                }
            };

            if let Some(b) = &before {
                access_policy::authorize_read(actor, b).or_else(|e| match e {
                    AppError::NotFound(_) => Err(AppError::PermissionDenied("Record belongs to another startup".into())),
                    other => Err(other),
                })?;
            }
            access_policy::authorize_write(actor, collection, &id, before.as_ref().map(|d| &d.data), draft.as_ref())?;

            plans.push(PlannedWrite { collection, id, before, draft, precondition });
        }

        self.check_references(&plans).await?;
        Ok(plans)
    }

    /// Tenant references must resolve: assignees are members of the task's
    /// startup and profiles point at an existing startup.
    async fn check_references(&self, plans: &[PlannedWrite]) -> Result<(), AppError> {
        for plan in plans {
            let Some(draft) = &plan.draft else { continue };
            let startup_id = draft.get("startupId").and_then(Value::as_str).unwrap_or_default();

            match plan.collection {
                Collection::Tasks => {
                    let assignees = draft.get("assignedTo").and_then(Value::as_array).cloned().unwrap_or_default();
                    for uid in assignees {
                        let uid = uid
                            .as_str()
                            .ok_or_else(|| AppError::InvalidArgument("assignedTo must contain uids".into()))?;
                        let member = self.repo.get(Collection::Users, uid).await?;
                        if member.as_ref().and_then(|m| m.str_field("startupId")) != Some(startup_id) {
                            return Err(AppError::InvalidArgument(format!("{} is not a member of this startup", uid)));
                        }
                    }
                }
                Collection::Users if plan.before.is_none() => {
                    let in_batch = plans.iter().any(|p| p.collection == Collection::Startups && p.id == startup_id && p.draft.is_some());
                    if !in_batch && self.repo.get(Collection::Startups, startup_id).await?.is_none() {
                        return Err(AppError::InvalidArgument(format!("Startup {} does not exist", startup_id)));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// New commits, for internal observers such as background reconcilers.
    pub fn watch_commits(&self) -> broadcast::Receiver<Arc<CommitRecord>> {
        self.commits.subscribe()
    }

    /// Number of open commit receivers, live queries and internal observers alike.
    pub fn commit_watchers(&self) -> usize {
        self.commits.receiver_count()
    }

    /// Terminates every live subscription opened under `session_id`.
    pub fn end_session(&self, session_id: Uuid) {
        let _ = self.session_ends.send(session_id);
    }

    /// Opens a live query: an initial snapshot followed by one snapshot per
    /// committed change that alters the result set.
    pub async fn subscribe(
        &self,
        actor: Actor,
        session_id: Option<Uuid>,
        query: Query,
        resume_after: Option<i64>,
    ) -> Result<Subscription, AppError> {
        let query = access_policy::constrain_query(&actor, query)?;
        let commits = self.commits.subscribe();
        let session_ends = self.session_ends.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let worker = LiveQuery {
            repo: self.repo.clone(),
            actor,
            session_id,
            query,
            retry_attempts: self.retry_attempts,
            last_seq: 0,
            last_docs: Vec::new(),
        };
        let handle = tokio::spawn(worker.run(resume_after, commits, session_ends, tx));
        Ok(Subscription { rx, _task: AbortOnDrop(handle) })
    }
}

fn single_document(outcome: CommitOutcome) -> Result<Document, AppError> {
    outcome
        .documents
        .into_iter()
        .next()
        .flatten()
        .ok_or(AppError::Internal)
}

/// Shallow merge; top-level keys of `patch` replace those of `base`.
pub fn merge_patch(base: &Value, patch: &Value) -> Result<Value, AppError> {
    let patch = patch
        .as_object()
        .ok_or_else(|| AppError::InvalidArgument("Patch must be a JSON object".into()))?;
    let mut merged = base.clone();
    if let Value::Object(map) = &mut merged {
        for (k, v) in patch {
            map.insert(k.clone(), v.clone());
        }
    }
    Ok(merged)
}

async fn commit_and_publish(
    repo: Arc<dyn DocumentRepository>,
    clock: Arc<Mutex<CommitClock>>,
    commits: broadcast::Sender<Arc<CommitRecord>>,
    actor: Actor,
    plans: Vec<PlannedWrite>,
) -> Result<CommitOutcome, AppError> {
    let mut clock = clock.lock().await;
    let committed_at = clock.tick(Utc::now());
    let stamp = format_timestamp(committed_at);

    let mut writes = Vec::with_capacity(plans.len());
    for plan in &plans {
        let kind = match &plan.draft {
            Some(draft) => {
                let mut after = draft.clone();
                resolve_sentinels(&mut after, &stamp);
                let before = plan.before.as_ref().map(|d| &d.data);
                let after = record_rules::normalize(&actor, plan.collection, &plan.id, before, after, &stamp)?;
                access_policy::authorize_write(&actor, plan.collection, &plan.id, before, Some(&after))?;
                WriteKind::Put(after)
            }
            None => WriteKind::Delete,
        };
        let partition = match &kind {
            WriteKind::Put(data) => plan.collection.partition_of(&plan.id, data),
            WriteKind::Delete => None,
        };
        writes.push(ResolvedWrite {
            collection: plan.collection,
            id: plan.id.clone(),
            partition,
            kind,
            precondition: plan.precondition,
        });
    }

    let outcome = repo.commit(&writes, committed_at).await?;

    let changes = plans
        .into_iter()
        .zip(outcome.documents.iter())
        .map(|(plan, after)| DocumentChange {
            collection: plan.collection,
            id: plan.id,
            before: plan.before,
            after: after.clone(),
        })
        .collect();
    let record = CommitRecord { seq: outcome.seq, committed_at, changes };
    debug!(seq = record.seq, writes = record.changes.len(), actor = actor.label(), "Committed");
    let _ = commits.send(Arc::new(record));
    drop(clock);

    Ok(outcome)
}

/// Reads the head sequence, then the readable result set of `query`.
async fn fetch(repo: &dyn DocumentRepository, actor: &Actor, query: &Query, retries: u32) -> Result<(i64, Vec<Document>), AppError> {
    with_backoff("document store", retries, || async {
        let head = repo.head_seq().await?;
        let partition = query.partition_hint();
        let candidates = repo.list(query.collection, partition.as_deref()).await?;
        let readable = candidates
            .into_iter()
            .filter(|d| access_policy::authorize_read(actor, d).is_ok())
            .collect();
        Ok((head, query.apply(readable)))
    })
    .await
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Stream of snapshots for one live query. A final `Err` precedes termination
/// when access is revoked or the session ends; dropping the value unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<Result<Snapshot, AppError>>,
    _task: AbortOnDrop,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<Result<Snapshot, AppError>> {
        self.rx.recv().await
    }
}

struct LiveQuery {
    repo: Arc<dyn DocumentRepository>,
    actor: Actor,
    session_id: Option<Uuid>,
    query: Query,
    retry_attempts: u32,
    last_seq: i64,
    last_docs: Vec<Document>,
}

enum Step {
    Continue,
    Stop,
}

impl LiveQuery {
    async fn run(
        mut self,
        resume_after: Option<i64>,
        mut commits: broadcast::Receiver<Arc<CommitRecord>>,
        mut session_ends: broadcast::Receiver<Uuid>,
        tx: mpsc::Sender<Result<Snapshot, AppError>>,
    ) {
        match fetch(&*self.repo, &self.actor, &self.query, self.retry_attempts).await {
            Ok((seq, docs)) => {
                let skip_initial = resume_after == Some(seq);
                let changes = diff(&[], &docs);
                self.last_seq = seq;
                self.last_docs = docs;
                if !skip_initial {
                    let snapshot = Snapshot { seq, documents: self.last_docs.clone(), changes };
                    if tx.send(Ok(snapshot)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }

        loop {
            let step = tokio::select! {
                _ = tx.closed() => Step::Stop,
                ended = session_ends.recv() => match ended {
                    Ok(sid) if Some(sid) == self.session_id => {
                        let _ = tx.send(Err(AppError::Unauthenticated)).await;
                        Step::Stop
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => Step::Continue,
                    Err(broadcast::error::RecvError::Closed) => Step::Stop,
                },
                received = commits.recv() => match received {
                    Ok(record) => self.on_commit(&record, &tx).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, collection = %self.query.collection, "Subscription lagged, re-querying");
                        self.on_lag(&tx).await
                    }
                    Err(broadcast::error::RecvError::Closed) => Step::Stop,
                },
            };
            if let Step::Stop = step {
                break;
            }
        }
        debug!(collection = %self.query.collection, actor = self.actor.label(), "Subscription closed");
    }

    async fn on_commit(&mut self, record: &CommitRecord, tx: &mpsc::Sender<Result<Snapshot, AppError>>) -> Step {
        if record.seq <= self.last_seq {
            return Step::Continue;
        }
        if self.revoked_by(record) {
            info!(actor = self.actor.label(), "Subscriber lost access, closing subscription");
            let _ = tx.send(Err(AppError::PermissionDenied("Access to this query was revoked".into()))).await;
            return Step::Stop;
        }
        if !self.affected_by(record) {
            return Step::Continue;
        }
        self.refresh(tx).await
    }

    async fn on_lag(&mut self, tx: &mpsc::Sender<Result<Snapshot, AppError>>) -> Step {
        if let Actor::User(p) = &self.actor {
            let profile = self.repo.get(Collection::Users, &p.uid).await;
            let still_member = matches!(&profile, Ok(Some(doc)) if doc.str_field("startupId") == Some(p.startup_id.as_str()));
            if profile.is_ok() && !still_member {
                let _ = tx.send(Err(AppError::PermissionDenied("Access to this query was revoked".into()))).await;
                return Step::Stop;
            }
        }
        self.refresh(tx).await
    }

    fn revoked_by(&self, record: &CommitRecord) -> bool {
        let Actor::User(p) = &self.actor else { return false };
        record.changes.iter().any(|c| {
            c.collection == Collection::Users
                && c.id == p.uid
                && c.after.as_ref().and_then(|d| d.str_field("startupId")) != Some(p.startup_id.as_str())
        })
    }

    fn affected_by(&self, record: &CommitRecord) -> bool {
        record.changes.iter().any(|c| {
            c.collection == self.query.collection
                && [&c.before, &c.after].into_iter().flatten().any(|d| self.query.matches(d))
        })
    }

    async fn refresh(&mut self, tx: &mpsc::Sender<Result<Snapshot, AppError>>) -> Step {
        match fetch(&*self.repo, &self.actor, &self.query, self.retry_attempts).await {
            Ok((seq, docs)) => {
                if seq <= self.last_seq {
                    return Step::Continue;
                }
                self.last_seq = seq;
                if docs == self.last_docs {
                    return Step::Continue;
                }
                let changes = diff(&self.last_docs, &docs);
                self.last_docs = docs;
                let snapshot = Snapshot { seq, documents: self.last_docs.clone(), changes };
                if tx.send(Ok(snapshot)).await.is_err() { Step::Stop } else { Step::Continue }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                Step::Stop
            }
        }
    }
}

/// Per-document changes between two result sets.
pub fn diff(old: &[Document], new: &[Document]) -> Vec<SnapshotChange> {
    let old_versions: HashMap<&str, i64> = old.iter().map(|d| (d.id.as_str(), d.version)).collect();
    let new_ids: HashSet<&str> = new.iter().map(|d| d.id.as_str()).collect();

    let mut changes: Vec<SnapshotChange> = new
        .iter()
        .filter_map(|d| match old_versions.get(d.id.as_str()) {
            None => Some(SnapshotChange { kind: ChangeKind::Added, id: d.id.clone() }),
            Some(v) if *v != d.version => Some(SnapshotChange { kind: ChangeKind::Modified, id: d.id.clone() }),
            Some(_) => None,
        })
        .collect();
    changes.extend(
        old.iter()
            .filter(|d| !new_ids.contains(d.id.as_str()))
            .map(|d| SnapshotChange { kind: ChangeKind::Removed, id: d.id.clone() }),
    );
    changes
}
