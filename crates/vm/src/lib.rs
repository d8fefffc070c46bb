//! stackc virtual machine
//!
//! A byte-addressable stack machine with 1-byte opcodes, 16-bit addresses,
//! big-endian images, and a downward-growing stack. The instruction set is a
//! closed tagged sum; opcodes are assigned by position in the authoritative
//! list, so the code generator never deals in raw opcode integers.

pub mod error;
pub mod isa;
mod ops;
pub mod vm;

pub use error::{ArgumentError, Segfault};
pub use isa::{Instruction, instruction_set, opcode_of};
pub use vm::{MAX_IMAGE_SIZE, StepRecorder, Vm};
