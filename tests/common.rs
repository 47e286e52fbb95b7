use startupops_backend::{
    api::router::create_router,
    state::AppState,
    config::Config,
    infra::{
        blob::fs_blob_store::FsBlobStore,
        repositories::{
            sqlite_auth_repo::SqliteAuthRepo,
            sqlite_credential_repo::SqliteCredentialRepo,
            sqlite_document_repo::SqliteDocumentRepo,
        },
    },
    domain::models::user::{Actor, Principal, Role},
    background::start_background_worker,
};
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, Pool, Sqlite};
use std::sync::Arc;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    Router,
};
use std::str::FromStr;
use tower::ServiceExt;
use serde_json::{json, Value};

/// A signed-in account with a workspace profile.
#[derive(Clone, Debug)]
pub struct TestUser {
    pub uid: String,
    pub email: String,
    pub token: String,
    pub startup_id: String,
}

#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub pool: Pool<Sqlite>,
    pub db_filename: String,
    pub blob_dir: PathBuf,
    pub state: Arc<AppState>,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        let db_filename = format!("test_{}.db", Uuid::new_v4());
        let db_url = format!("sqlite://{}?mode=rwc", db_filename);

        let connection_options = SqliteConnectOptions::from_str(&db_url)
            .unwrap()
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(connection_options)
            .await
            .expect("Failed to connect to test db");

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .expect("Failed to migrate test db");

        let priv_key_pem = include_str!("../tests/keys/test_private.pem");
        let pub_key_pem = include_str!("../tests/keys/test_public.pem");
        let blob_dir = std::env::temp_dir().join(format!("startupops_test_{}", Uuid::new_v4()));

        let config = Config {
            database_url: db_url.clone(),
            port: 0,
            jwt_secret_key: priv_key_pem.to_string(),
            jwt_public_key: pub_key_pem.to_string(),
            auth_issuer: "test-issuer".to_string(),
            api_key: "test-api-key".to_string(),
            auth_domain: "startupops.local".to_string(),
            project_id: "startupops".to_string(),
            storage_bucket: "startupops-blobs".to_string(),
            app_id: "test-app".to_string(),
            invitation_ttl: chrono::Duration::days(14),
            notification_limit: 20,
            blob_dir: blob_dir.to_string_lossy().to_string(),
            blob_signing_key: "test-signing-key".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(10),
            retry_attempts: 2,
            log_dir: "./logs".to_string(),
        };

        let blob_store = FsBlobStore::new(&config.blob_dir)
            .await
            .expect("Failed to create blob dir");

        let state = Arc::new(AppState::new(
            config,
            Arc::new(SqliteDocumentRepo::new(pool.clone())),
            Arc::new(SqliteCredentialRepo::new(pool.clone())),
            Arc::new(SqliteAuthRepo::new(pool.clone())),
            Arc::new(blob_store),
        ));

        start_background_worker(state.clone());

        let router = create_router(state.clone());

        Self {
            router,
            pool,
            db_filename,
            blob_dir,
            state,
        }
    }

    /// Sends one request with an optional bearer token and JSON body.
    /// Returns the status and the parsed body (`Null` when empty).
    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        if bytes.is_empty() {
            return (status, Value::Null);
        }
        let value = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            panic!("Failed to parse JSON: {:?}. Status: {}. Body: {:?}", e, status, String::from_utf8_lossy(&bytes))
        });
        (status, value)
    }

    pub async fn get(&self, uri: &str, user: &TestUser) -> (StatusCode, Value) {
        self.send("GET", uri, Some(&user.token), None).await
    }

    pub async fn post(&self, uri: &str, user: &TestUser, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(&user.token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, user: &TestUser, body: Value) -> (StatusCode, Value) {
        self.send("PATCH", uri, Some(&user.token), Some(body)).await
    }

    fn user_from(status: StatusCode, body: &Value) -> TestUser {
        assert_eq!(status, StatusCode::CREATED, "Signup failed in test helper: {:?}", body);
        TestUser {
            uid: body["uid"].as_str().unwrap().to_string(),
            email: body["email"].as_str().unwrap().to_string(),
            token: body["access_token"].as_str().unwrap().to_string(),
            startup_id: body["profile"]["startupId"].as_str().unwrap().to_string(),
        }
    }

    pub async fn signup_founder(&self, email: &str, display_name: &str, startup_name: &str) -> TestUser {
        let (status, body) = self.send("POST", "/api/v1/signup", None, Some(json!({
            "email": email,
            "password": "password123",
            "displayName": display_name,
            "startupName": startup_name,
        }))).await;
        Self::user_from(status, &body)
    }

    /// Issues an invitation as `inviter` and returns its id.
    pub async fn invite(&self, inviter: &TestUser, email: &str, role: Role) -> String {
        let (status, body) = self.post("/api/v1/invitations", inviter, json!({
            "email": email,
            "role": role.as_str(),
        })).await;
        assert_eq!(status, StatusCode::CREATED, "Invitation failed in test helper: {:?}", body);
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn redeem(&self, invite_id: &str, email: &str, display_name: &str) -> (StatusCode, Value) {
        self.send("POST", &format!("/api/v1/signup?invite={}", invite_id), None, Some(json!({
            "email": email,
            "password": "password123",
            "displayName": display_name,
        }))).await
    }

    /// Invites `email` into the inviter's startup and signs the new member up.
    pub async fn join(&self, inviter: &TestUser, email: &str, display_name: &str, role: Role) -> TestUser {
        let invite_id = self.invite(inviter, email, role).await;
        let (status, body) = self.redeem(&invite_id, email, display_name).await;
        Self::user_from(status, &body)
    }

    /// The store actor of a signed-up user, for service-level assertions.
    pub async fn actor(&self, user: &TestUser) -> Actor {
        let profile = self.state.identity
            .profile_of(&user.uid)
            .await
            .unwrap()
            .expect("User has no profile");
        Actor::User(Principal::from(&profile))
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_filename);
        let _ = std::fs::remove_dir_all(&self.blob_dir);
    }
}
