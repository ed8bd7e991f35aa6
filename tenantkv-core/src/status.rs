//! Outcome codes returned by every store operation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a store operation.
///
/// Every backend reports every result through this enumeration; no store
/// operation signals a failure by panicking or returning `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// The operation was applied (or the lookup found what it was asked for).
    Success,
    /// The tenant has never created an entry.
    UserNotFound,
    /// The tenant exists but holds no entry under the key.
    KeyNotFound,
    /// Create refused: the key is already present in the tenant's namespace.
    KeyAlreadyExists,
    /// The backend failed for a reason outside the lookup taxonomy.
    Error,
    /// `user_id` was absent.
    UserIdIsNull,
    /// `key` was absent.
    KeyIsNull,
    /// `value` was absent.
    ValueIsNull,
    /// The backend could not be reached (connection, I/O or timeout failure).
    Unavailable,
}

impl StatusCode {
    /// All status codes, in declaration order.
    pub const ALL: [StatusCode; 9] = [
        StatusCode::Success,
        StatusCode::UserNotFound,
        StatusCode::KeyNotFound,
        StatusCode::KeyAlreadyExists,
        StatusCode::Error,
        StatusCode::UserIdIsNull,
        StatusCode::KeyIsNull,
        StatusCode::ValueIsNull,
        StatusCode::Unavailable,
    ];

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Success)
    }

    /// True for the input-validation family, detected before any state access.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            StatusCode::UserIdIsNull | StatusCode::KeyIsNull | StatusCode::ValueIsNull
        )
    }

    /// True for the state-lookup family, detected after validation passes.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            StatusCode::UserNotFound | StatusCode::KeyNotFound | StatusCode::KeyAlreadyExists
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Success => "Success",
            StatusCode::UserNotFound => "UserNotFound",
            StatusCode::KeyNotFound => "KeyNotFound",
            StatusCode::KeyAlreadyExists => "KeyAlreadyExists",
            StatusCode::Error => "Error",
            StatusCode::UserIdIsNull => "UserIdIsNull",
            StatusCode::KeyIsNull => "KeyIsNull",
            StatusCode::ValueIsNull => "ValueIsNull",
            StatusCode::Unavailable => "Unavailable",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusCode {
    type Err = StatusCodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusCode::ALL
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StatusCodeParseError(s.to_string()))
    }
}

/// Error when parsing an unknown status code name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCodeParseError(pub String);

impl fmt::Display for StatusCodeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid status code: {}", self.0)
    }
}

impl std::error::Error for StatusCodeParseError {}
