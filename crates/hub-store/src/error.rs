use thiserror::Error;

/// Low-level store failures: SQLite errors, I/O, and integrity check results.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
}

/// Typed error taxonomy for the mutation kernel and event writer (§7).
///
/// Never leaks a raw `rusqlite::Error` upward on the optimistic-concurrency
/// path: version mismatches are detected by an explicit pre-check inside the
/// transaction and reported as [`KernelError::VersionConflict`], never as a
/// database-level exception.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("content too large: {0}")]
    ContentTooLarge(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("version conflict: current_version={current_version}")]
    VersionConflict { current_version: i64 },
    #[error("cross-channel move: target topic is not in the source channel")]
    CrossChannelMove,
    #[error("store busy")]
    StoreBusy,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for KernelError {
    fn from(err: rusqlite::Error) -> Self {
        if is_busy(&err) {
            KernelError::StoreBusy
        } else {
            KernelError::Store(StoreError::Sqlite(err))
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
    )
}
