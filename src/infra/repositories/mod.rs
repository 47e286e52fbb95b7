mod document_row;

pub mod sqlite_document_repo;
pub mod sqlite_credential_repo;
pub mod sqlite_auth_repo;

pub mod postgres_document_repo;
pub mod postgres_credential_repo;
pub mod postgres_auth_repo;
