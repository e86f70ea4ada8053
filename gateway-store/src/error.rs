#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("lock held by another owner")]
    LockConflict,
    #[error("storage: {0}")]
    Storage(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
