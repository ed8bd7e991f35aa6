//! TENANTKV Core - Shared Contract Types
//!
//! Status codes, parameter validation, error types and configuration shared
//! by every store backend. This crate holds no storage state of its own.

pub mod config;
pub mod error;
pub mod status;
pub mod validation;

pub use config::{BackendConfig, StoreConfig};
pub use error::{ConfigError, StorageError, TenantKvError, TenantKvResult};
pub use status::{StatusCode, StatusCodeParseError};
pub use validation::{
    validate_entry, validate_key, validate_tenant, ValidatedEntry, ValidatedKey,
};
