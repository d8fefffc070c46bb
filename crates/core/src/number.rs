//! The scalar number model
//!
//! Ten encodings: unsigned and signed integers at 1/2/4/8 bytes, plus IEEE
//! floats at 4 and 8 bytes. Every value the machine stores or computes is one
//! of these, and both the compiler and the VM dispatch on [`NumberType`].

/// How the bytes of a number are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpretation {
    Unsigned,
    Signed,
    Float,
}

/// One of the ten scalar encodings.
///
/// Exactly one variant exists per (interpretation, size) pair in the
/// supported grid; floats only at 4 and 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Sint8,
    Sint16,
    Sint32,
    Sint64,
    Fp32,
    Fp64,
}

impl NumberType {
    /// The authoritative enumeration order. Opcode assignment and the cast
    /// instruction grid both derive from this ordering.
    pub const ALL: [NumberType; 10] = [
        NumberType::Uint8,
        NumberType::Uint16,
        NumberType::Uint32,
        NumberType::Uint64,
        NumberType::Sint8,
        NumberType::Sint16,
        NumberType::Sint32,
        NumberType::Sint64,
        NumberType::Fp32,
        NumberType::Fp64,
    ];

    pub fn size_in_bytes(self) -> usize {
        match self {
            NumberType::Uint8 | NumberType::Sint8 => 1,
            NumberType::Uint16 | NumberType::Sint16 => 2,
            NumberType::Uint32 | NumberType::Sint32 | NumberType::Fp32 => 4,
            NumberType::Uint64 | NumberType::Sint64 | NumberType::Fp64 => 8,
        }
    }

    pub fn interpretation(self) -> Interpretation {
        match self {
            NumberType::Uint8 | NumberType::Uint16 | NumberType::Uint32 | NumberType::Uint64 => {
                Interpretation::Unsigned
            }
            NumberType::Sint8 | NumberType::Sint16 | NumberType::Sint32 | NumberType::Sint64 => {
                Interpretation::Signed
            }
            NumberType::Fp32 | NumberType::Fp64 => Interpretation::Float,
        }
    }

    /// Mask selecting the low `8 * size` bits: `2^(8·size) − 1`.
    pub fn bitmask(self) -> u64 {
        match self.size_in_bytes() {
            8 => u64::MAX,
            size => (1u64 << (8 * size)) - 1,
        }
    }

    /// Look up the variant for an (interpretation, size) pair.
    pub fn from_parts(interpretation: Interpretation, size_in_bytes: usize) -> Option<NumberType> {
        NumberType::ALL
            .into_iter()
            .find(|ty| ty.interpretation() == interpretation && ty.size_in_bytes() == size_in_bytes)
    }

    /// The unsigned type of the given width, used for raw byte transfers.
    pub fn unsigned_with_size(size_in_bytes: usize) -> Option<NumberType> {
        NumberType::from_parts(Interpretation::Unsigned, size_in_bytes)
    }

    pub fn is_integer(self) -> bool {
        self.interpretation() != Interpretation::Float
    }
}

impl std::fmt::Display for NumberType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NumberType::Uint8 => "uint8",
            NumberType::Uint16 => "uint16",
            NumberType::Uint32 => "uint32",
            NumberType::Uint64 => "uint64",
            NumberType::Sint8 => "sint8",
            NumberType::Sint16 => "sint16",
            NumberType::Sint32 => "sint32",
            NumberType::Sint64 => "sint64",
            NumberType::Fp32 => "fp32",
            NumberType::Fp64 => "fp64",
        };
        write!(f, "{}", name)
    }
}

/// A scalar value paired with its interpretation.
///
/// Integers are carried in the widest native representation end-to-end;
/// width truncation happens at memory boundaries and explicit casts, never
/// silently in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

/// Sign-extend the low `8 * size` bits of `raw` to a full i64.
pub fn sign_extend(raw: u64, size_in_bytes: usize) -> i64 {
    let shift = 64 - 8 * size_in_bytes as u32;
    ((raw << shift) as i64) >> shift
}

impl Number {
    /// The raw integer bits, two's complement for signed values. Floats are
    /// truncated toward zero first.
    pub fn to_raw_bits(self) -> u64 {
        match self {
            Number::Unsigned(value) => value,
            Number::Signed(value) => value as u64,
            Number::Float(value) => {
                if value < 0.0 {
                    (value as i64) as u64
                } else {
                    value as u64
                }
            }
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Unsigned(value) => value as f64,
            Number::Signed(value) => value as f64,
            Number::Float(value) => value,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Unsigned(value) => value == 0,
            Number::Signed(value) => value == 0,
            Number::Float(value) => value == 0.0,
        }
    }

    /// Value-preserving conversion into another encoding.
    ///
    /// Integer targets truncate to the target width (toward zero when the
    /// source is a float); fp32 targets round through f32.
    pub fn convert(self, to: NumberType) -> Number {
        match to.interpretation() {
            Interpretation::Unsigned => Number::Unsigned(self.to_raw_bits() & to.bitmask()),
            Interpretation::Signed => Number::Signed(sign_extend(
                self.to_raw_bits() & to.bitmask(),
                to.size_in_bytes(),
            )),
            Interpretation::Float => {
                let value = self.as_f64();
                if to.size_in_bytes() == 4 {
                    Number::Float(value as f32 as f64)
                } else {
                    Number::Float(value)
                }
            }
        }
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Unsigned(value) => write!(f, "{}", value),
            Number::Signed(value) => write!(f, "{}", value),
            Number::Float(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_is_exhaustive_and_unique() {
        // Exactly one variant per supported (interpretation, size) pair.
        for interpretation in [
            Interpretation::Unsigned,
            Interpretation::Signed,
            Interpretation::Float,
        ] {
            for size in [1usize, 2, 4, 8] {
                let matching: Vec<_> = NumberType::ALL
                    .into_iter()
                    .filter(|ty| {
                        ty.interpretation() == interpretation && ty.size_in_bytes() == size
                    })
                    .collect();
                let supported = interpretation != Interpretation::Float || size >= 4;
                assert_eq!(matching.len(), if supported { 1 } else { 0 });
            }
        }
        assert_eq!(NumberType::ALL.len(), 10);
    }

    #[test]
    fn test_bitmask() {
        assert_eq!(NumberType::Uint8.bitmask(), 0xFF);
        assert_eq!(NumberType::Sint16.bitmask(), 0xFFFF);
        assert_eq!(NumberType::Uint32.bitmask(), 0xFFFF_FFFF);
        assert_eq!(NumberType::Sint64.bitmask(), u64::MAX);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0xFF, 1), -1);
        assert_eq!(sign_extend(0x7F, 1), 127);
        assert_eq!(sign_extend(0x8000, 2), i16::MIN as i64);
        assert_eq!(sign_extend(0xFFFF_FFFF, 4), -1);
    }

    #[test]
    fn test_convert_identity() {
        for ty in NumberType::ALL {
            let value = match ty.interpretation() {
                Interpretation::Unsigned => Number::Unsigned(42),
                Interpretation::Signed => Number::Signed(-42),
                Interpretation::Float => Number::Float(42.5),
            };
            assert_eq!(value.convert(ty), value);
        }
    }

    #[test]
    fn test_convert_float_truncates_toward_zero() {
        assert_eq!(
            Number::Float(52.4).convert(NumberType::Sint32),
            Number::Signed(52)
        );
        assert_eq!(
            Number::Float(-52.9).convert(NumberType::Sint32),
            Number::Signed(-52)
        );
    }

    #[test]
    fn test_convert_narrows_by_mask() {
        assert_eq!(
            Number::Unsigned(0x1FF).convert(NumberType::Uint8),
            Number::Unsigned(0xFF)
        );
        assert_eq!(
            Number::Signed(-1).convert(NumberType::Uint16),
            Number::Unsigned(0xFFFF)
        );
    }

    #[test]
    fn test_convert_uint64_to_fp64_exact_below_2_53() {
        let exact = 1u64 << 53;
        assert_eq!(
            Number::Unsigned(exact).convert(NumberType::Fp64),
            Number::Float(exact as f64)
        );
    }
}
