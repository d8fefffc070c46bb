//! The instruction set
//!
//! Overloaded operations carry their number type as payload; two instances
//! with the same mnemonic and payload are the same instruction. The opcode of
//! an instruction is its 1-based position in [`instruction_set`], which keeps
//! the whole set inside a single opcode byte.

use std::collections::HashMap;
use std::sync::OnceLock;

use stackc_core::NumberType;

/// One operation of the stack machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Push the immediate onto the stack as a value of the given type.
    LoadC(NumberType),
    /// Release the immediate number of bytes from the stack.
    Pop,
    /// Reserve the immediate number of bytes on the stack.
    Alloc,
    /// Pop an address, copy the immediate number of bytes from it to the top
    /// of the stack.
    LoadA,
    /// Pop an address, pop the immediate number of bytes and write them there.
    Store,
    /// Push `framePointer − immediate` (mod 2^16) as an address.
    LoadR,
    /// Pop a uint32 status code and terminate.
    Halt,
    /// Unconditional jump to the immediate address.
    Jump,
    /// Pop one byte; jump to the immediate address if it is zero.
    JumpZ,
    /// Pop a jump target, save the caller's registers, open a new frame.
    Call,
    /// Publish the frame's locals budget to the extreme pointer.
    Enter,
    /// Restore the caller's registers from the frame's saved slots.
    Return,
    /// Pop a value as the first type, push it as the second.
    Cast(NumberType, NumberType),
    Add(NumberType),
    Sub(NumberType),
    Mul(NumberType),
    Div(NumberType),
    Mod(NumberType),
    And(NumberType),
    Or(NumberType),
    Xor(NumberType),
    Eq(NumberType),
    Gt(NumberType),
    Ge(NumberType),
    Lt(NumberType),
    Le(NumberType),
    /// Pop a byte; push 1 if it was zero, 0 otherwise.
    Not,
}

impl Instruction {
    /// The declared immediate argument type, if the instruction takes one.
    pub fn immediate_type(self) -> Option<NumberType> {
        match self {
            Instruction::LoadC(ty) => Some(ty),
            Instruction::Pop
            | Instruction::Alloc
            | Instruction::LoadA
            | Instruction::Store
            | Instruction::LoadR
            | Instruction::Jump
            | Instruction::JumpZ
            | Instruction::Call
            | Instruction::Enter => Some(NumberType::Uint16),
            _ => None,
        }
    }

    /// Encoded size in the program image: opcode byte plus immediate bytes.
    pub fn encoded_size(self) -> usize {
        1 + self.immediate_type().map_or(0, |ty| ty.size_in_bytes())
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::LoadC(ty) => write!(f, "loadc<{}>", ty),
            Instruction::Pop => write!(f, "pop"),
            Instruction::Alloc => write!(f, "alloc"),
            Instruction::LoadA => write!(f, "loada"),
            Instruction::Store => write!(f, "store"),
            Instruction::LoadR => write!(f, "loadr"),
            Instruction::Halt => write!(f, "halt"),
            Instruction::Jump => write!(f, "jump"),
            Instruction::JumpZ => write!(f, "jumpz"),
            Instruction::Call => write!(f, "call"),
            Instruction::Enter => write!(f, "enter"),
            Instruction::Return => write!(f, "return"),
            Instruction::Cast(from, to) => write!(f, "cast<{},{}>", from, to),
            Instruction::Add(ty) => write!(f, "add<{}>", ty),
            Instruction::Sub(ty) => write!(f, "sub<{}>", ty),
            Instruction::Mul(ty) => write!(f, "mul<{}>", ty),
            Instruction::Div(ty) => write!(f, "div<{}>", ty),
            Instruction::Mod(ty) => write!(f, "mod<{}>", ty),
            Instruction::And(ty) => write!(f, "and<{}>", ty),
            Instruction::Or(ty) => write!(f, "or<{}>", ty),
            Instruction::Xor(ty) => write!(f, "xor<{}>", ty),
            Instruction::Eq(ty) => write!(f, "eq<{}>", ty),
            Instruction::Gt(ty) => write!(f, "gt<{}>", ty),
            Instruction::Ge(ty) => write!(f, "ge<{}>", ty),
            Instruction::Lt(ty) => write!(f, "lt<{}>", ty),
            Instruction::Le(ty) => write!(f, "le<{}>", ty),
            Instruction::Not => write!(f, "not"),
        }
    }
}

fn build_instruction_set() -> Vec<Instruction> {
    let mut set = Vec::new();
    for ty in NumberType::ALL {
        set.push(Instruction::LoadC(ty));
    }
    set.extend([
        Instruction::Pop,
        Instruction::Alloc,
        Instruction::LoadA,
        Instruction::Store,
        Instruction::LoadR,
        Instruction::Halt,
        Instruction::Jump,
        Instruction::JumpZ,
        Instruction::Call,
        Instruction::Enter,
        Instruction::Return,
    ]);
    for from in NumberType::ALL {
        for to in NumberType::ALL {
            set.push(Instruction::Cast(from, to));
        }
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Add(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Sub(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Mul(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Div(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Mod(ty));
    }
    let integers = NumberType::ALL.into_iter().filter(|ty| ty.is_integer());
    for ty in integers.clone() {
        set.push(Instruction::And(ty));
    }
    for ty in integers.clone() {
        set.push(Instruction::Or(ty));
    }
    for ty in integers {
        set.push(Instruction::Xor(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Eq(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Gt(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Ge(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Lt(ty));
    }
    for ty in NumberType::ALL {
        set.push(Instruction::Le(ty));
    }
    set.push(Instruction::Not);
    set
}

/// The authoritative ordered instruction list. An instruction's opcode is its
/// index here plus one; opcode zero is invalid.
pub fn instruction_set() -> &'static [Instruction] {
    static SET: OnceLock<Vec<Instruction>> = OnceLock::new();
    SET.get_or_init(build_instruction_set)
}

/// Look up the opcode for an instruction by value.
pub fn opcode_of(instruction: Instruction) -> Option<u8> {
    static OPCODES: OnceLock<HashMap<Instruction, u8>> = OnceLock::new();
    let opcodes = OPCODES.get_or_init(|| {
        instruction_set()
            .iter()
            .enumerate()
            .map(|(index, &instruction)| (instruction, (index + 1) as u8))
            .collect()
    });
    opcodes.get(&instruction).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_fits_in_one_opcode_byte() {
        let set = instruction_set();
        assert_eq!(set.len(), 246);
        assert!(set.len() <= u8::MAX as usize);
    }

    #[test]
    fn test_opcodes_are_one_based_positions() {
        assert_eq!(opcode_of(Instruction::LoadC(NumberType::Uint8)), Some(1));
        assert_eq!(opcode_of(Instruction::Pop), Some(11));
        assert_eq!(opcode_of(Instruction::Halt), Some(16));
        assert_eq!(opcode_of(Instruction::Not), Some(246));
    }

    #[test]
    fn test_lookup_by_value_equality() {
        // A freshly constructed instance must resolve to the same opcode as
        // the entry in the authoritative list.
        for (index, &instruction) in instruction_set().iter().enumerate() {
            let fresh = instruction;
            assert_eq!(opcode_of(fresh), Some((index + 1) as u8), "{}", instruction);
        }
    }

    #[test]
    fn test_immediate_sizes() {
        assert_eq!(Instruction::LoadC(NumberType::Fp64).encoded_size(), 9);
        assert_eq!(Instruction::LoadC(NumberType::Uint8).encoded_size(), 2);
        assert_eq!(Instruction::Jump.encoded_size(), 3);
        assert_eq!(Instruction::Return.encoded_size(), 1);
        assert_eq!(
            Instruction::Cast(NumberType::Fp32, NumberType::Sint32).encoded_size(),
            1
        );
    }

    #[test]
    fn test_bitwise_variants_are_integer_only() {
        for instruction in instruction_set() {
            if let Instruction::And(ty) | Instruction::Or(ty) | Instruction::Xor(ty) = instruction {
                assert!(ty.is_integer(), "{}", instruction);
            }
        }
    }

    #[test]
    fn test_mnemonic_rendering() {
        assert_eq!(
            Instruction::LoadC(NumberType::Sint32).to_string(),
            "loadc<sint32>"
        );
        assert_eq!(
            Instruction::Cast(NumberType::Fp32, NumberType::Sint32).to_string(),
            "cast<fp32,sint32>"
        );
        assert_eq!(Instruction::Add(NumberType::Uint8).to_string(), "add<uint8>");
    }
}
