//! Parameter validation for store operations
//!
//! Each store operation validates its parameters before touching any state.
//! Failures are reported in a fixed precedence: `UserIdIsNull`, then
//! `KeyIsNull`, then `ValueIsNull`. On success the validators hand back the
//! unwrapped parameters so an operation cannot proceed with absent input.

use crate::StatusCode;

/// Parameters of a Create or Update after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedEntry<'a> {
    pub user_id: &'a str,
    pub key: &'a str,
    pub value: &'a str,
}

/// Parameters of a Read or Delete after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedKey<'a> {
    pub user_id: &'a str,
    pub key: &'a str,
}

/// Validate the parameters of Create and Update.
pub fn validate_entry<'a>(
    user_id: Option<&'a str>,
    key: Option<&'a str>,
    value: Option<&'a str>,
) -> Result<ValidatedEntry<'a>, StatusCode> {
    let ValidatedKey { user_id, key } = validate_key(user_id, key)?;
    let value = value.ok_or(StatusCode::ValueIsNull)?;
    Ok(ValidatedEntry {
        user_id,
        key,
        value,
    })
}

/// Validate the parameters of Read and Delete.
pub fn validate_key<'a>(
    user_id: Option<&'a str>,
    key: Option<&'a str>,
) -> Result<ValidatedKey<'a>, StatusCode> {
    let user_id = validate_tenant(user_id)?;
    let key = key.ok_or(StatusCode::KeyIsNull)?;
    Ok(ValidatedKey { user_id, key })
}

/// Validate the parameter of GetAll.
pub fn validate_tenant(user_id: Option<&str>) -> Result<&str, StatusCode> {
    user_id.ok_or(StatusCode::UserIdIsNull)
}
