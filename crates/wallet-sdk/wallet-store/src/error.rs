use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use wallet_sdk::OutputId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("change output {output_id} is not allocated to run {run_id}")]
    NotAllocated { output_id: OutputId, run_id: i64 },

    #[error("generation run {0} not found")]
    RunNotFound(i64),

    #[error("generation run {0} is not open")]
    RunNotOpen(i64),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}
