//! Canonical status codes carried by engine errors.

use std::fmt;

/// Status code enumeration used by the engine's error channel.
///
/// Values match the canonical RPC status codes (`OK = 0` through
/// `UNAUTHENTICATED = 16`). Engine errors keep their raw integer, so a code
/// outside this table is still reported, just without a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    /// Not an error
    Ok = 0,
    /// Operation was cancelled
    Cancelled = 1,
    /// Unknown error, also used for undecodable error text
    Unknown = 2,
    /// Caller supplied an invalid argument (syntax errors land here)
    InvalidArgument = 3,
    /// Deadline expired before completion
    DeadlineExceeded = 4,
    /// Requested entity was not found
    NotFound = 5,
    /// Entity already exists
    AlreadyExists = 6,
    /// Caller lacks permission
    PermissionDenied = 7,
    /// Some resource has been exhausted
    ResourceExhausted = 8,
    /// System is not in a state required for the operation
    FailedPrecondition = 9,
    /// Operation was aborted
    Aborted = 10,
    /// Operation was attempted past the valid range
    OutOfRange = 11,
    /// Operation is not implemented
    Unimplemented = 12,
    /// Internal invariant broken
    Internal = 13,
    /// Service is unavailable
    Unavailable = 14,
    /// Unrecoverable data loss
    DataLoss = 15,
    /// Request lacks valid credentials
    Unauthenticated = 16,
}

impl StatusCode {
    /// All codes in numeric order.
    pub const ALL: [StatusCode; 17] = [
        StatusCode::Ok,
        StatusCode::Cancelled,
        StatusCode::Unknown,
        StatusCode::InvalidArgument,
        StatusCode::DeadlineExceeded,
        StatusCode::NotFound,
        StatusCode::AlreadyExists,
        StatusCode::PermissionDenied,
        StatusCode::ResourceExhausted,
        StatusCode::FailedPrecondition,
        StatusCode::Aborted,
        StatusCode::OutOfRange,
        StatusCode::Unimplemented,
        StatusCode::Internal,
        StatusCode::Unavailable,
        StatusCode::DataLoss,
        StatusCode::Unauthenticated,
    ];

    /// Look up a code by its integer value.
    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Integer value of the code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Upper-case canonical name, e.g. `INVALID_ARGUMENT`.
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense() {
        for (idx, status) in StatusCode::ALL.iter().enumerate() {
            assert_eq!(status.code(), idx as i32);
            assert_eq!(StatusCode::from_code(idx as i32), Some(*status));
        }
    }

    #[test]
    fn test_out_of_table_codes() {
        assert_eq!(StatusCode::from_code(-1), None);
        assert_eq!(StatusCode::from_code(17), None);
        assert_eq!(StatusCode::from_code(i32::MAX), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(StatusCode::InvalidArgument.to_string(), "INVALID_ARGUMENT");
        assert_eq!(StatusCode::Unauthenticated.name(), "UNAUTHENTICATED");
        assert_eq!(StatusCode::Unknown.code(), 2);
    }
}
