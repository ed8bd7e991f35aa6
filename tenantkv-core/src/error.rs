//! Error types for TENANTKV construction and configuration
//!
//! Store operations never return these: their outcomes are [`StatusCode`]
//! values. These errors cover everything around the contract, such as
//! loading configuration and opening a backend.
//!
//! [`StatusCode`]: crate::StatusCode

use thiserror::Error;

/// Storage layer errors raised while opening or talking to a backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open {backend} backend: {reason}")]
    BackendOpen { backend: String, reason: String },

    #[error("{backend} backend unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("{backend} backend failed: {reason}")]
    Backend { backend: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Backend not supported: {backend}")]
    BackendNotSupported { backend: String },
}

/// Master error type for all TENANTKV errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TenantKvError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for TENANTKV operations outside the store contract.
pub type TenantKvResult<T> = Result<T, TenantKvError>;
