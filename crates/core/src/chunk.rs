//! Byte-width chunk math
//!
//! Multi-byte block transfers (the VM's `loada` and `store`) move bytes in
//! the widest unsigned accesses that still fit, largest chunk first.

use crate::number::NumberType;

/// Split `length` bytes into `(offset, unsigned type)` chunks, largest first.
pub fn unsigned_chunks(length: usize) -> Vec<(usize, NumberType)> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    for width in [8usize, 4, 2, 1] {
        while length - offset >= width {
            // Unsigned types exist at every supported width.
            let ty = NumberType::unsigned_with_size(width).unwrap();
            chunks.push((offset, ty));
            offset += width;
        }
    }
    chunks
}
