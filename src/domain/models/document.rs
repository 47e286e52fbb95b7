use crate::error::AppError;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Key under which clients place the server timestamp sentinel: `{".sv": "timestamp"}`.
pub const SENTINEL_KEY: &str = ".sv";
pub const SENTINEL_TIMESTAMP: &str = "timestamp";

/// Pseudo-field addressing the document id inside filters and ordering.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Startups,
    Users,
    Tasks,
    Milestones,
    Feedback,
    Chats,
    Notifications,
    Invitations,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Startups,
        Collection::Users,
        Collection::Tasks,
        Collection::Milestones,
        Collection::Feedback,
        Collection::Chats,
        Collection::Notifications,
        Collection::Invitations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Startups => "startups",
            Collection::Users => "users",
            Collection::Tasks => "tasks",
            Collection::Milestones => "milestones",
            Collection::Feedback => "feedback",
            Collection::Chats => "chats",
            Collection::Notifications => "notifications",
            Collection::Invitations => "invitations",
        }
    }

    /// Field whose value is stored in the indexed `partition_key` column.
    pub fn partition_field(&self) -> &'static str {
        match self {
            Collection::Startups => ID_FIELD,
            Collection::Notifications => "recipientId",
            _ => "startupId",
        }
    }

    pub fn partition_of(&self, id: &str, data: &Value) -> Option<String> {
        match self.partition_field() {
            ID_FIELD => Some(id.to_string()),
            field => data.get(field).and_then(Value::as_str).map(str::to_string),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AppError::InvalidArgument(format!("Unknown collection '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub collection: Collection,
    pub id: String,
    pub data: Value,
    pub version: i64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        decode_record(&self.id, &self.data)
    }
}

/// Deserializes a stored record into its typed model, exposing the document id as `id`.
pub fn decode_record<T: DeserializeOwned>(id: &str, data: &Value) -> Result<T, AppError> {
    let mut value = data.clone();
    if let Value::Object(map) = &mut value {
        map.entry(ID_FIELD.to_string()).or_insert_with(|| Value::String(id.to_string()));
    }
    serde_json::from_value(value).map_err(|e| AppError::InvalidArgument(format!("Malformed record: {}", e)))
}

/// Serializes a typed model into stored form; the `id` lives in the key, not the body.
pub fn encode_record<T: Serialize>(record: &T) -> Result<Value, AppError> {
    let mut value = serde_json::to_value(record).map_err(|e| AppError::InternalWithMsg(format!("Encoding failed: {}", e)))?;
    if let Value::Object(map) = &mut value {
        map.remove(ID_FIELD);
    }
    Ok(value)
}

/// Encodes a record about to be created; `createdAt` becomes the commit time.
pub fn encode_new_record<T: Serialize>(record: &T) -> Result<Value, AppError> {
    let mut value = encode_record(record)?;
    if let Value::Object(map) = &mut value
        && map.contains_key("createdAt")
    {
        map.insert("createdAt".to_string(), server_timestamp());
    }
    Ok(value)
}

/// 20-character opaque id for documents created without one.
pub fn new_document_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

/// Canonical stored form of a timestamp. Fixed-width micros so that lexical order is time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn server_timestamp() -> Value {
    let mut map = Map::new();
    map.insert(SENTINEL_KEY.to_string(), Value::String(SENTINEL_TIMESTAMP.to_string()));
    Value::Object(map)
}

pub fn is_server_timestamp(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.get(SENTINEL_KEY).and_then(Value::as_str) == Some(SENTINEL_TIMESTAMP),
        _ => false,
    }
}

/// Replaces every server timestamp sentinel (at any depth) with the commit time.
pub fn resolve_sentinels(value: &mut Value, commit_time: &str) {
    if is_server_timestamp(value) {
        *value = Value::String(commit_time.to_string());
        return;
    }
    match value {
        Value::Object(map) => map.values_mut().for_each(|v| resolve_sentinels(v, commit_time)),
        Value::Array(items) => items.iter_mut().for_each(|v| resolve_sentinels(v, commit_time)),
        _ => {}
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq { field: field.to_string(), value: value.into() }
    }

    pub fn field(&self) -> &str {
        match self {
            Filter::Eq { field, .. } | Filter::In { field, .. } => field,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let actual = lookup(doc, self.field());
        match self {
            Filter::Eq { value, .. } => actual.as_ref() == Some(value),
            Filter::In { values, .. } => actual.is_some_and(|a| values.contains(&a)),
        }
    }
}

fn lookup(doc: &Document, field: &str) -> Option<Value> {
    if field == ID_FIELD {
        return Some(Value::String(doc.id.clone()));
    }
    doc.data.get(field).cloned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub collection: Collection,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: Collection) -> Self {
        Self { collection, filters: Vec::new(), order_by: None, limit: None }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(field, value));
        self
    }

    pub fn where_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In { field: field.to_string(), values });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy { field: field.to_string(), direction });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Equality value of the first filter on `field`, if any.
    pub fn eq_value(&self, field: &str) -> Option<&Value> {
        self.filters.iter().find_map(|f| match f {
            Filter::Eq { field: name, value } if name == field => Some(value),
            _ => None,
        })
    }

    /// Partition key the repository can use to narrow its scan.
    pub fn partition_hint(&self) -> Option<String> {
        self.eq_value(self.collection.partition_field())
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.collection == self.collection && self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filters, orders and truncates a candidate set.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut result: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        match &self.order_by {
            Some(order) => {
                result.sort_by(|a, b| {
                    let ord = compare_values(lookup(a, &order.field).as_ref(), lookup(b, &order.field).as_ref())
                        .then_with(|| a.id.cmp(&b.id));
                    match order.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                });
            }
            None => result.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        if let Some(limit) = self.limit {
            result.truncate(limit);
        }
        result
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    /// Fails with `AlreadyExists` if the document exists. A missing id is generated.
    Create {
        collection: Collection,
        #[serde(default)]
        id: Option<String>,
        data: Value,
    },
    /// Replaces the whole document, creating it if needed.
    Set { collection: Collection, id: String, data: Value },
    /// Shallow-merges `patch` into an existing document.
    Update {
        collection: Collection,
        id: String,
        patch: Value,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<i64>,
    },
    Delete {
        collection: Collection,
        id: String,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<i64>,
    },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Create { collection, .. }
            | WriteOp::Set { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. } => *collection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    MustNotExist,
    Version(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    Put(Value),
    Delete,
}

/// A write after authorization, validation and sentinel resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWrite {
    pub collection: Collection,
    pub id: String,
    pub partition: Option<String>,
    pub kind: WriteKind,
    pub precondition: Precondition,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub seq: i64,
    /// Post-commit image per write, `None` for deletes.
    pub documents: Vec<Option<Document>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChange {
    pub collection: Collection,
    pub id: String,
    pub before: Option<Document>,
    pub after: Option<Document>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub seq: i64,
    pub committed_at: DateTime<Utc>,
    pub changes: Vec<DocumentChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotChange {
    pub kind: ChangeKind,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub seq: i64,
    pub documents: Vec<Document>,
    pub changes: Vec<SnapshotChange>,
}

impl Snapshot {
    pub fn decode_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, AppError> {
        self.documents.iter().map(Document::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, data: Value) -> Document {
        let now = Utc::now();
        Document { collection: Collection::Tasks, id: id.to_string(), data, version: 1, create_time: now, update_time: now }
    }

    #[test]
    fn sentinels_are_resolved_at_any_depth() {
        let mut value = json!({
            "createdAt": server_timestamp(),
            "nested": { "at": server_timestamp(), "keep": 1 },
            "list": [server_timestamp()]
        });
        resolve_sentinels(&mut value, "2026-01-01T00:00:00.000000Z");
        assert_eq!(value["createdAt"], "2026-01-01T00:00:00.000000Z");
        assert_eq!(value["nested"]["at"], "2026-01-01T00:00:00.000000Z");
        assert_eq!(value["nested"]["keep"], 1);
        assert_eq!(value["list"][0], "2026-01-01T00:00:00.000000Z");
    }

    #[test]
    fn query_filters_orders_and_limits() {
        let docs = vec![
            doc("a", json!({"startupId": "s1", "progress": 50})),
            doc("b", json!({"startupId": "s2", "progress": 10})),
            doc("c", json!({"startupId": "s1", "progress": 90})),
            doc("d", json!({"startupId": "s1", "progress": 0})),
        ];
        let query = Query::new(Collection::Tasks)
            .where_eq("startupId", "s1")
            .order_by("progress", Direction::Desc)
            .limit(2);

        let ids: Vec<String> = query.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn in_filter_and_id_pseudo_field() {
        let d = doc("m1", json!({"channel": "general"}));
        assert!(Filter::In { field: "channel".into(), values: vec![json!("general")] }.matches(&d));
        assert!(!Filter::In { field: "channel".into(), values: vec![json!("mentor")] }.matches(&d));
        assert!(Filter::eq(ID_FIELD, "m1").matches(&d));
    }

    #[test]
    fn partition_hint_uses_collection_partition_field() {
        let q = Query::new(Collection::Notifications).where_eq("recipientId", "u1");
        assert_eq!(q.partition_hint().as_deref(), Some("u1"));
        let q = Query::new(Collection::Startups).where_eq(ID_FIELD, "s1");
        assert_eq!(q.partition_hint().as_deref(), Some("s1"));
    }

    #[test]
    fn missing_fields_sort_first() {
        assert_eq!(compare_values(None, Some(&json!("x"))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
    }
}
