//! Arithmetic, bitwise, and comparison kernels
//!
//! Integer results are truncated to the operand type's width before being
//! pushed back; fp32 arithmetic rounds through f32 so narrow floats behave
//! like narrow floats even though values travel as f64.

use stackc_core::number::sign_extend;
use stackc_core::{Interpretation, Number, NumberType};

#[derive(Debug, Clone, Copy)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum BitOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum CmpOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Normalize raw integer bits into a value of the given type.
fn from_raw(ty: NumberType, raw: u64) -> Number {
    match ty.interpretation() {
        Interpretation::Unsigned => Number::Unsigned(raw & ty.bitmask()),
        Interpretation::Signed => Number::Signed(sign_extend(raw & ty.bitmask(), ty.size_in_bytes())),
        Interpretation::Float => unreachable!("raw bits carry no float values"),
    }
}

pub(crate) fn arithmetic(
    ty: NumberType,
    op: ArithOp,
    left: Number,
    right: Number,
) -> Result<Number, &'static str> {
    match ty.interpretation() {
        Interpretation::Unsigned => {
            let (l, r) = (left.to_raw_bits() & ty.bitmask(), right.to_raw_bits() & ty.bitmask());
            let raw = match op {
                ArithOp::Add => l.wrapping_add(r),
                ArithOp::Sub => l.wrapping_sub(r),
                ArithOp::Mul => l.wrapping_mul(r),
                ArithOp::Div => l.checked_div(r).ok_or("integer division by zero")?,
                ArithOp::Mod => l.checked_rem(r).ok_or("integer division by zero")?,
            };
            Ok(from_raw(ty, raw))
        }
        Interpretation::Signed => {
            let l = sign_extend(left.to_raw_bits() & ty.bitmask(), ty.size_in_bytes());
            let r = sign_extend(right.to_raw_bits() & ty.bitmask(), ty.size_in_bytes());
            let raw = match op {
                ArithOp::Add => l.wrapping_add(r),
                ArithOp::Sub => l.wrapping_sub(r),
                ArithOp::Mul => l.wrapping_mul(r),
                ArithOp::Div => {
                    if r == 0 {
                        return Err("integer division by zero");
                    }
                    l.wrapping_div(r)
                }
                ArithOp::Mod => {
                    if r == 0 {
                        return Err("integer division by zero");
                    }
                    l.wrapping_rem(r)
                }
            };
            Ok(from_raw(ty, raw as u64))
        }
        Interpretation::Float => {
            let (l, r) = (left.as_f64(), right.as_f64());
            let value = if ty.size_in_bytes() == 4 {
                let (l, r) = (l as f32, r as f32);
                (match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => l / r,
                    ArithOp::Mod => l % r,
                }) as f64
            } else {
                match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => l / r,
                    ArithOp::Mod => l % r,
                }
            };
            Ok(Number::Float(value))
        }
    }
}

pub(crate) fn bitwise(ty: NumberType, op: BitOp, left: Number, right: Number) -> Number {
    let (l, r) = (left.to_raw_bits(), right.to_raw_bits());
    let raw = match op {
        BitOp::And => l & r,
        BitOp::Or => l | r,
        BitOp::Xor => l ^ r,
    };
    from_raw(ty, raw)
}

pub(crate) fn compare(ty: NumberType, op: CmpOp, left: Number, right: Number) -> Number {
    let ordering = match ty.interpretation() {
        Interpretation::Unsigned => {
            let (l, r) = (left.to_raw_bits() & ty.bitmask(), right.to_raw_bits() & ty.bitmask());
            l.partial_cmp(&r)
        }
        Interpretation::Signed => {
            let l = sign_extend(left.to_raw_bits() & ty.bitmask(), ty.size_in_bytes());
            let r = sign_extend(right.to_raw_bits() & ty.bitmask(), ty.size_in_bytes());
            l.partial_cmp(&r)
        }
        Interpretation::Float => left.as_f64().partial_cmp(&right.as_f64()),
    };
    let holds = match (op, ordering) {
        // NaN compares false under every operator.
        (_, None) => false,
        (CmpOp::Eq, Some(ordering)) => ordering.is_eq(),
        (CmpOp::Gt, Some(ordering)) => ordering.is_gt(),
        (CmpOp::Ge, Some(ordering)) => ordering.is_ge(),
        (CmpOp::Lt, Some(ordering)) => ordering.is_lt(),
        (CmpOp::Le, Some(ordering)) => ordering.is_le(),
    };
    Number::Unsigned(if holds { 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_add_wraps_at_width() {
        let result = arithmetic(
            NumberType::Uint8,
            ArithOp::Add,
            Number::Unsigned(250),
            Number::Unsigned(10),
        )
        .unwrap();
        assert_eq!(result, Number::Unsigned(4));
    }

    #[test]
    fn test_signed_division_truncates() {
        let result = arithmetic(
            NumberType::Sint32,
            ArithOp::Div,
            Number::Signed(-7),
            Number::Signed(2),
        )
        .unwrap();
        assert_eq!(result, Number::Signed(-3));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert!(arithmetic(
            NumberType::Sint32,
            ArithOp::Div,
            Number::Signed(1),
            Number::Signed(0)
        )
        .is_err());
        assert!(arithmetic(
            NumberType::Uint16,
            ArithOp::Mod,
            Number::Unsigned(1),
            Number::Unsigned(0)
        )
        .is_err());
    }

    #[test]
    fn test_float_division_is_ieee() {
        let result = arithmetic(
            NumberType::Fp64,
            ArithOp::Div,
            Number::Float(1.0),
            Number::Float(0.0),
        )
        .unwrap();
        assert_eq!(result, Number::Float(f64::INFINITY));
    }

    #[test]
    fn test_fp32_rounds_through_f32() {
        let result = arithmetic(
            NumberType::Fp32,
            ArithOp::Add,
            Number::Float(16_777_216.0),
            Number::Float(1.0),
        )
        .unwrap();
        // 2^24 + 1 is not representable in f32.
        assert_eq!(result, Number::Float(16_777_216.0));
    }

    #[test]
    fn test_signed_compare() {
        assert_eq!(
            compare(NumberType::Sint8, CmpOp::Lt, Number::Signed(-1), Number::Signed(1)),
            Number::Unsigned(1)
        );
        assert_eq!(
            compare(NumberType::Uint8, CmpOp::Lt, Number::Unsigned(0xFF), Number::Unsigned(1)),
            Number::Unsigned(0)
        );
    }

    #[test]
    fn test_bitwise_masks_to_width() {
        assert_eq!(
            bitwise(NumberType::Uint8, BitOp::Xor, Number::Unsigned(0xF0F), Number::Unsigned(0x0FF)),
            Number::Unsigned(0xF0)
        );
    }
}
