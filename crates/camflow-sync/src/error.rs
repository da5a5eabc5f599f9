//! Reconciliation error types

use camflow_cloud::{CloudError, Provider};
use thiserror::Error;

/// Errors that abort a sync call.
///
/// Region, type and instance level failures never surface here; they are
/// counted in the returned `SyncResult`.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cloud account not found: {0}")]
    AccountNotFound(i64),

    #[error("No active {0} accounts to sync")]
    NoActiveAccounts(Provider),

    #[error("Cloud adapter error: {0}")]
    Adapter(#[from] CloudError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
