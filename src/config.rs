use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret_key: String, // Private key (PEM)
    pub jwt_public_key: String, // Public key (PEM)
    pub auth_issuer: String,

    // Backend identifiers handed to clients verbatim
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub app_id: String,

    pub invitation_ttl: chrono::Duration,
    pub notification_limit: i64,
    pub blob_dir: String,
    pub blob_signing_key: String,
    pub public_base_url: String,
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        let jwt_public_key = env::var("JWT_PUBLIC_KEY").expect("JWT_PUBLIC_KEY must be set (Ed25519 Public Key)");
        let project_id = env::var("STARTUPOPS_PROJECT_ID").unwrap_or_else(|_| "startupops".to_string());

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            port: env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().expect("PORT must be a number"),
            jwt_secret_key: env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set (Ed25519 Private Key)"),
            blob_signing_key: env::var("BLOB_SIGNING_KEY").unwrap_or_else(|_| jwt_public_key.clone()),
            jwt_public_key,
            auth_issuer: env::var("AUTH_ISSUER").unwrap_or_else(|_| "https://api.startupops.local".to_string()),
            api_key: env::var("STARTUPOPS_API_KEY").unwrap_or_default(),
            auth_domain: env::var("STARTUPOPS_AUTH_DOMAIN").unwrap_or_else(|_| format!("{}.local", project_id)),
            storage_bucket: env::var("STARTUPOPS_STORAGE_BUCKET").unwrap_or_else(|_| format!("{}-blobs", project_id)),
            app_id: env::var("STARTUPOPS_APP_ID").unwrap_or_default(),
            project_id,
            invitation_ttl: chrono::Duration::days(
                env::var("INVITATION_TTL_DAYS").unwrap_or_else(|_| "14".to_string()).parse().expect("INVITATION_TTL_DAYS must be a number"),
            ),
            notification_limit: env::var("NOTIFICATION_LIMIT").unwrap_or_else(|_| "20".to_string()).parse().expect("NOTIFICATION_LIMIT must be a number"),
            blob_dir: env::var("BLOB_DIR").unwrap_or_else(|_| "./blobs".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            request_timeout: Duration::from_secs(
                env::var("REQUEST_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string()).parse().expect("REQUEST_TIMEOUT_SECS must be a number"),
            ),
            retry_attempts: env::var("STORE_RETRY_ATTEMPTS").unwrap_or_else(|_| "4".to_string()).parse().expect("STORE_RETRY_ATTEMPTS must be a number"),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()),
        }
    }
}
