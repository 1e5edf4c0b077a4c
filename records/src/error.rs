use sea_orm::{DbErr, RuntimeErr, SqlxError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A keyed lookup matched zero rows.
    #[error("record not found")]
    NotFound,
    /// Anything raised by the engine, carried as its own message text.
    #[error("{0}")]
    Storage(String),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        Self::Storage(engine_message(&err))
    }
}

/// Prefer the database's own message over sea-orm's wrapper text.
fn engine_message(err: &DbErr) -> String {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(SqlxError::Database(db)))
        | DbErr::Query(RuntimeErr::SqlxError(SqlxError::Database(db))) => {
            db.message().to_string()
        }
        other => other.to_string(),
    }
}
