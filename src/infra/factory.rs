use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use sqlx::{postgres::{PgPoolOptions, PgConnectOptions}, sqlite::{SqlitePoolOptions, SqliteJournalMode, SqliteConnectOptions}};
use sqlx::{PgPool, SqlitePool, ConnectOptions};
use tracing::info;
use tracing::log::LevelFilter;

use crate::config::Config;
use crate::state::AppState;
use crate::infra::blob::fs_blob_store::FsBlobStore;
use crate::infra::repositories::{
    postgres_auth_repo::PostgresAuthRepo, postgres_credential_repo::PostgresCredentialRepo,
    postgres_document_repo::PostgresDocumentRepo,
    sqlite_auth_repo::SqliteAuthRepo, sqlite_credential_repo::SqliteCredentialRepo,
    sqlite_document_repo::SqliteDocumentRepo,
};

pub async fn bootstrap_state(config: &Config) -> AppState {
    let database_url = &config.database_url;

    let blob_store = Arc::new(
        FsBlobStore::new(&config.blob_dir)
            .await
            .expect("Failed to initialize blob directory"),
    );

    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        info!("Initializing PostgreSQL connection...");

        let mut opts: PgConnectOptions = database_url.parse().expect("Invalid Postgres URL");
        opts = opts.log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await
            .expect("Failed to connect to Postgres");

        run_postgres_migrations(&pool).await;

        AppState::new(
            config.clone(),
            Arc::new(PostgresDocumentRepo::new(pool.clone())),
            Arc::new(PostgresCredentialRepo::new(pool.clone())),
            Arc::new(PostgresAuthRepo::new(pool)),
            blob_store,
        )
    } else {
        info!("Initializing SQLite connection with WAL Mode...");

        let opts = SqliteConnectOptions::from_str(database_url)
            .expect("Invalid SQLite connection string")
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .expect("Failed to connect to SQLite");

        run_sqlite_migrations(&pool).await;

        AppState::new(
            config.clone(),
            Arc::new(SqliteDocumentRepo::new(pool.clone())),
            Arc::new(SqliteCredentialRepo::new(pool.clone())),
            Arc::new(SqliteAuthRepo::new(pool)),
            blob_store,
        )
    }
}

async fn run_postgres_migrations(pool: &PgPool) {
    info!("Running Postgres migrations...");
    sqlx::migrate!("./migrations/postgres")
        .run(pool)
        .await
        .expect("Failed to run Postgres migrations");
}

async fn run_sqlite_migrations(pool: &SqlitePool) {
    info!("Running SQLite migrations...");
    sqlx::migrate!("./migrations/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}
