//! Cloud adapter error types

use thiserror::Error;

/// Cloud adapter errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider not supported: {0}")]
    ProviderNotSupported(String),

    #[error("Asset type {asset_type} is not supported by {provider}")]
    AssetTypeNotSupported { provider: String, asset_type: String },

    #[error("Unknown asset type: {0}")]
    UnknownAssetType(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Account {0} is not active")]
    AccountDisabled(i64),

    #[error("API error: {0}")]
    ApiError(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;
