//! Virtual machine error types.

use stackc_core::MemoryError;

/// Construction-time configuration violation (image over the address-space
/// limit, zero-sized memory, and the like).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentError {
    pub message: String,
}

impl ArgumentError {
    pub fn new(message: impl Into<String>) -> ArgumentError {
        ArgumentError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ArgumentError {}

/// Fatal runtime fault: an out-of-range memory or program access, an
/// undefined opcode, or an operation the machine cannot complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segfault {
    /// The offending address.
    pub address: usize,
    /// Human-readable reason text.
    pub reason: String,
}

impl Segfault {
    pub fn new(address: usize, reason: impl Into<String>) -> Segfault {
        Segfault {
            address,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Segfault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "segmentation fault at address {}: {}", self.address, self.reason)
    }
}

impl std::error::Error for Segfault {}

impl From<MemoryError> for Segfault {
    fn from(err: MemoryError) -> Segfault {
        Segfault {
            address: err.address,
            reason: err.to_string(),
        }
    }
}
