use thiserror::Error;

use crate::fourcc::FourCharCode;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bridging an Apple Event into the runtime
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid four-character code: {0:?}")]
    InvalidFourCharCode(String),

    #[error("event is missing required attribute '{0}'")]
    MissingAttribute(FourCharCode),

    #[error("runtime context is not accepting events")]
    RuntimeClosed,

    #[error("bridge already initialized")]
    AlreadyInitialized,

    #[error("{operation} failed with OSErr {status}")]
    Native { operation: &'static str, status: i16 },

    #[error("reply encoding failed: {0}")]
    Encode(String),
}

/// Failure reported by the runtime callback for a single event
///
/// Carried back to the sending application as an error reply rather than a
/// transport fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler failed ({code}): {message}")]
pub struct HandlerError {
    code: i32,
    message: String,
}

impl HandlerError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error number written to the reply
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Human-readable message written to the reply
    pub fn message(&self) -> &str {
        &self.message
    }
}
