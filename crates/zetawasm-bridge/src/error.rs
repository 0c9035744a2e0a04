//! Error types for the bridge crate.

use std::fmt;

use thiserror::Error;

use crate::exports::{CallKind, Method};
use crate::status::StatusCode;

/// Bridge error type.
///
/// `Allocation`, `ExportNotFound` and `ExportSignature` mean the bridge or the
/// module itself is broken. `Engine` is the normal channel for rejected SQL
/// and always carries the guest's status code untouched.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Guest allocator returned a null pointer
    #[error("guest allocation of {size} bytes failed")]
    Allocation {
        /// Requested size in bytes
        size: u32,
    },

    /// Required guest export is missing
    #[error("guest export '{0}' not found")]
    ExportNotFound(String),

    /// Guest export exists but has the wrong wasm signature
    #[error("guest export '{name}' has an unexpected signature: {reason}")]
    ExportSignature {
        /// Export name
        name: String,
        /// Type check failure reported by the runtime
        reason: String,
    },

    /// Method used through the wrong calling convention
    #[error("{method} does not use the {expected} calling convention")]
    CallingConvention {
        /// Method that was called
        method: Method,
        /// Convention the caller tried to use
        expected: CallKind,
    },

    /// Failure signaled by the guest through its error channel
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Guest memory access outside the current linear memory
    #[error("guest memory access out of bounds: {len} bytes at {ptr:#x}")]
    OutOfBounds {
        /// Guest pointer
        ptr: u32,
        /// Access length in bytes
        len: usize,
    },

    /// Request does not fit the 32-bit guest address space
    #[error("request of {0} bytes exceeds the guest address space")]
    RequestTooLarge(usize),

    /// Guest trapped while executing an export
    #[error("guest trapped in '{export}': {reason}")]
    Trap {
        /// Export that was executing
        export: String,
        /// Trap description
        reason: String,
    },

    /// Other wasmtime failure (engine setup, compilation, linking)
    #[error("WASM runtime error: {0}")]
    Runtime(String),

    /// Guest returned a response the bridge cannot use
    #[error("malformed {method} response: {reason}")]
    MalformedResponse {
        /// Method whose response was rejected
        method: Method,
        /// What was wrong with it
        reason: String,
    },

    /// Response payload failed to decode
    #[error("response decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Convert a failed export invocation into a bridge error.
    pub(crate) fn from_call(export: &str, err: wasmtime::Error) -> Self {
        match err.downcast_ref::<wasmtime::Trap>() {
            Some(trap) => BridgeError::Trap {
                export: export.to_string(),
                reason: trap.to_string(),
            },
            None => BridgeError::Runtime(format!("call to '{}' failed: {}", export, err)),
        }
    }

    /// The engine error, if this failure was signaled by the guest.
    pub fn engine(&self) -> Option<&EngineError> {
        match self {
            BridgeError::Engine(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this failure was signaled by the guest.
    pub fn is_engine(&self) -> bool {
        self.engine().is_some()
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

const CODE_PREFIX: &str = "Code: ";
const MESSAGE_SEPARATOR: &str = ", Message: ";

/// Decoded contents of the guest's last-error side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    /// Raw status code, never renumbered
    pub code: i64,
    /// Message text
    pub message: String,
    /// Original side-channel text
    pub raw: String,
    malformed: bool,
}

impl EngineError {
    /// Decode error text of the form `Code: <integer>, Message: <text>`.
    ///
    /// Text that does not match becomes `UNKNOWN` with the raw text as its
    /// message.
    pub fn from_error_text(raw: &str) -> Self {
        match split_error_text(raw) {
            Some((code, message)) => Self {
                code,
                message: message.to_string(),
                raw: raw.to_string(),
                malformed: false,
            },
            None => Self {
                code: i64::from(StatusCode::Unknown.code()),
                message: raw.to_string(),
                raw: raw.to_string(),
                malformed: true,
            },
        }
    }

    /// Build an error from known parts.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code,
            raw: format!("{CODE_PREFIX}{code}{MESSAGE_SEPARATOR}{message}"),
            message,
            malformed: false,
        }
    }

    /// Named status, if the code is in the canonical table.
    pub fn status(&self) -> Option<StatusCode> {
        i32::try_from(self.code).ok().and_then(StatusCode::from_code)
    }

    /// True when the side-channel text did not follow the expected format.
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }
}

fn split_error_text(raw: &str) -> Option<(i64, &str)> {
    let rest = raw.strip_prefix(CODE_PREFIX)?;
    let (digits, message) = rest.split_once(MESSAGE_SEPARATOR)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || message.is_empty() {
        return None;
    }
    let code = digits.parse().ok()?;
    Some((code, message))
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => write!(f, "[{}] {}", status, self.message),
            None => write!(f, "[Code {}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_well_formed() {
        let err = EngineError::from_error_text("Code: 3, Message: Syntax error at line 1");
        assert_eq!(err.code, 3);
        assert_eq!(err.message, "Syntax error at line 1");
        assert_eq!(err.raw, "Code: 3, Message: Syntax error at line 1");
        assert_eq!(err.status(), Some(StatusCode::InvalidArgument));
        assert!(!err.is_malformed());
    }

    #[test]
    fn test_decode_unrecognized() {
        let err = EngineError::from_error_text("not a recognized format");
        assert_eq!(err.code, i64::from(StatusCode::Unknown.code()));
        assert_eq!(err.message, "not a recognized format");
        assert_eq!(err.raw, "not a recognized format");
        assert!(err.is_malformed());
    }

    #[test]
    fn test_decode_keeps_message_to_end() {
        let err = EngineError::from_error_text("Code: 5, Message: Table not found: t, Message: x\nmore");
        assert_eq!(err.code, 5);
        assert_eq!(err.message, "Table not found: t, Message: x\nmore");
    }

    #[test]
    fn test_decode_rejects_partial_matches() {
        for text in [
            "",
            "Code: , Message: x",
            "Code: -3, Message: x",
            "Code: 3, Message: ",
            "Code: 3 Message: x",
            "code: 3, Message: x",
            "Code: 99999999999999999999, Message: overflow",
        ] {
            let err = EngineError::from_error_text(text);
            assert!(err.is_malformed(), "{text:?} should not decode");
            assert_eq!(err.code, 2);
            assert_eq!(err.message, text);
        }
    }

    #[test]
    fn test_unknown_code_kept_opaque() {
        let err = EngineError::from_error_text("Code: 42, Message: custom");
        assert_eq!(err.code, 42);
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "[Code 42] custom");
    }

    #[test]
    fn test_wide_code_kept() {
        let err = EngineError::from_error_text("Code: 3000000000, Message: x");
        assert!(!err.is_malformed());
        assert_eq!(err.code, 3_000_000_000);
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "[Code 3000000000] x");
    }

    #[test]
    fn test_display() {
        let err = EngineError::new(3, "Syntax error");
        assert_eq!(err.to_string(), "[INVALID_ARGUMENT] Syntax error");
        assert_eq!(err.raw, "Code: 3, Message: Syntax error");

        let bridge: BridgeError = err.clone().into();
        assert!(bridge.is_engine());
        assert_eq!(bridge.engine(), Some(&err));
        assert_eq!(bridge.to_string(), "[INVALID_ARGUMENT] Syntax error");
    }

    #[test]
    fn test_local_errors_are_not_engine_errors() {
        let err = BridgeError::Allocation { size: 16 };
        assert!(!err.is_engine());
        assert_eq!(err.to_string(), "guest allocation of 16 bytes failed");

        let err = BridgeError::ExportNotFound("wasm_parse".into());
        assert!(err.engine().is_none());
    }
}
