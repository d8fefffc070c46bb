//! stackc core: shared foundation for the compiler and the virtual machine
//!
//! Key design principles:
//! - NumberType: the closed grid of scalar encodings both sides agree on
//! - Memory: big-endian byte buffer, independent of host endianness
//! - Lookahead: two-item peek-ahead over any iterator (std's Peekable gives one)

pub mod chunk;
pub mod lookahead;
pub mod memory;
pub mod number;

pub use lookahead::Lookahead;
pub use memory::{Memory, MemoryError};
pub use number::{Interpretation, Number, NumberType};
