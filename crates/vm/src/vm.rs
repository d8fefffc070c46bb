//! The virtual machine
//!
//! ## Machine model
//! - **program**: read-only byte image holding bytecode; addresses inside it
//!   are instruction offsets.
//! - **memory**: separate byte image holding stack and (reserved) heap in one
//!   address space. The stack grows from high addresses toward zero.
//! - **Registers**: `programCounter`, `stackPointer` (lowest used byte of the
//!   stack), `framePointer` (base of the current activation record),
//!   `extremePointer` (maximum stack depth the current function may use,
//!   reserved for overflow checks).
//!
//! The machine is deterministic and fails fast: a normal run ends when `halt`
//! pops its status code, everything else that goes wrong is a [`Segfault`].

use stackc_core::{Memory, Number, NumberType, chunk};
use tracing::{debug, trace};

use crate::error::{ArgumentError, Segfault};
use crate::isa::{Instruction, instruction_set};
use crate::ops::{self, ArithOp, BitOp, CmpOp};

/// Program and memory images are capped at the 16-bit address space.
pub const MAX_IMAGE_SIZE: usize = 1 << 16;

const ADDRESS_TYPE: NumberType = NumberType::Uint16;
const ADDRESS_SIZE: usize = 2;
const ADDRESS_SPACE: usize = 1 << 16;

/// Observer invoked before each instruction dispatch.
///
/// This is the hook for the sketched rollback/undo feature: a recorder can
/// capture whatever state it needs to reconstruct earlier machine states. The
/// core machine never records anything itself.
pub trait StepRecorder {
    fn on_step(&mut self, program_counter: usize, instruction: &Instruction);
}

/// An emulated stack machine executing one bytecode image.
pub struct Vm {
    program: Memory,
    memory: Memory,
    program_counter: usize,
    stack_pointer: usize,
    frame_pointer: usize,
    extreme_pointer: usize,
    recorder: Option<Box<dyn StepRecorder>>,
}

impl Vm {
    /// Create a machine for the given program image and memory size.
    ///
    /// Both images are limited to 2^16 bytes; anything larger is rejected
    /// here rather than faulting mid-run.
    pub fn new(program: Vec<u8>, memory_size: usize) -> Result<Vm, ArgumentError> {
        if program.len() > MAX_IMAGE_SIZE {
            return Err(ArgumentError::new(format!(
                "program image of {} bytes exceeds the {}-byte limit",
                program.len(),
                MAX_IMAGE_SIZE
            )));
        }
        if memory_size > MAX_IMAGE_SIZE {
            return Err(ArgumentError::new(format!(
                "memory of {} bytes exceeds the {}-byte limit",
                memory_size, MAX_IMAGE_SIZE
            )));
        }
        Ok(Vm {
            program: Memory::from_bytes(program),
            memory: Memory::new(memory_size),
            program_counter: 0,
            stack_pointer: memory_size,
            frame_pointer: memory_size,
            extreme_pointer: memory_size,
            recorder: None,
        })
    }

    /// Install a step recorder. Replaces any previous one.
    pub fn set_recorder(&mut self, recorder: Box<dyn StepRecorder>) {
        self.recorder = Some(recorder);
    }

    pub fn program_counter(&self) -> usize {
        self.program_counter
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    pub fn frame_pointer(&self) -> usize {
        self.frame_pointer
    }

    pub fn extreme_pointer(&self) -> usize {
        self.extreme_pointer
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Pop a value of the given type off the stack.
    pub fn pop_stack(&mut self, ty: NumberType) -> Result<Number, Segfault> {
        let value = self.memory.read(self.stack_pointer, ty)?;
        self.stack_pointer += ty.size_in_bytes();
        Ok(value)
    }

    /// Push a value of the given type onto the stack.
    pub fn push_stack(&mut self, ty: NumberType, value: Number) -> Result<(), Segfault> {
        let new_sp = self
            .stack_pointer
            .checked_sub(ty.size_in_bytes())
            .ok_or_else(|| Segfault::new(0, "stack overflow"))?;
        self.memory.write(new_sp, ty, value)?;
        self.stack_pointer = new_sp;
        Ok(())
    }

    /// Run until `halt`, returning its status code.
    pub fn run(&mut self) -> Result<u32, Segfault> {
        debug!(
            program_bytes = self.program.size(),
            memory_bytes = self.memory.size(),
            "starting execution"
        );
        loop {
            if let Some(status) = self.step()? {
                return Ok(status);
            }
        }
    }

    /// Fetch, decode, and execute one instruction.
    ///
    /// Returns `Ok(Some(status))` when the instruction was `halt`. Embedders
    /// that want to bound execution can loop over this instead of [`run`].
    ///
    /// [`run`]: Vm::run
    pub fn step(&mut self) -> Result<Option<u32>, Segfault> {
        let at = self.program_counter;
        let opcode = self
            .program
            .read(at, NumberType::Uint8)
            .map_err(|_| Segfault::new(at, "program counter ran past the code segment"))?
            .to_raw_bits() as usize;
        self.program_counter += 1;

        let set = instruction_set();
        if opcode == 0 || opcode > set.len() {
            return Err(Segfault::new(at, format!("undefined opcode {}", opcode)));
        }
        let instruction = set[opcode - 1];

        let immediate = match instruction.immediate_type() {
            Some(ty) => {
                let value = self
                    .program
                    .read(self.program_counter, ty)
                    .map_err(|_| Segfault::new(at, "truncated immediate argument"))?;
                self.program_counter += ty.size_in_bytes();
                Some(value)
            }
            None => None,
        };

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.on_step(at, &instruction);
        }
        trace!(at, %instruction, "execute");
        self.execute(at, instruction, immediate)
    }

    fn execute(
        &mut self,
        at: usize,
        instruction: Instruction,
        immediate: Option<Number>,
    ) -> Result<Option<u32>, Segfault> {
        // Immediates were decoded per the instruction's declared type, so
        // instructions that take one always see a value here.
        let argument = immediate.map_or(0, |value| value.to_raw_bits() as usize);
        match instruction {
            Instruction::LoadC(ty) => {
                self.push_stack(ty, immediate.unwrap_or(Number::Unsigned(0)))?;
            }
            Instruction::Pop => {
                let new_sp = self.stack_pointer + argument;
                if new_sp > self.memory.size() {
                    return Err(Segfault::new(new_sp, "stack underflow"));
                }
                self.stack_pointer = new_sp;
            }
            Instruction::Alloc => {
                self.stack_pointer = self
                    .stack_pointer
                    .checked_sub(argument)
                    .ok_or_else(|| Segfault::new(0, "stack overflow"))?;
            }
            Instruction::LoadA => {
                let address = self.pop_stack(ADDRESS_TYPE)?.to_raw_bits() as usize;
                let destination = self
                    .stack_pointer
                    .checked_sub(argument)
                    .ok_or_else(|| Segfault::new(0, "stack overflow"))?;
                for (offset, ty) in chunk::unsigned_chunks(argument) {
                    let value = self.memory.read(address + offset, ty)?;
                    self.memory.write(destination + offset, ty, value)?;
                }
                self.stack_pointer = destination;
            }
            Instruction::Store => {
                let address = self.pop_stack(ADDRESS_TYPE)?.to_raw_bits() as usize;
                let new_sp = self.stack_pointer + argument;
                if new_sp > self.memory.size() {
                    return Err(Segfault::new(new_sp, "stack underflow"));
                }
                for (offset, ty) in chunk::unsigned_chunks(argument) {
                    let value = self.memory.read(self.stack_pointer + offset, ty)?;
                    self.memory.write(address + offset, ty, value)?;
                }
                self.stack_pointer = new_sp;
            }
            Instruction::LoadR => {
                // Frame-relative addresses are 16-bit modular arithmetic, so
                // offsets above 2^15 reach parameters above the frame.
                let address =
                    (self.frame_pointer + ADDRESS_SPACE - (argument & 0xFFFF)) & (ADDRESS_SPACE - 1);
                self.push_stack(ADDRESS_TYPE, Number::Unsigned(address as u64))?;
            }
            Instruction::Halt => {
                let status = self.pop_stack(NumberType::Uint32)?.to_raw_bits() as u32;
                debug!(status, "halt");
                return Ok(Some(status));
            }
            Instruction::Jump => {
                self.program_counter = argument;
            }
            Instruction::JumpZ => {
                if self.pop_stack(NumberType::Uint8)?.is_zero() {
                    self.program_counter = argument;
                }
            }
            Instruction::Call => {
                let target = self.pop_stack(ADDRESS_TYPE)?.to_raw_bits() as usize;
                let saved_sp = self.stack_pointer + argument;
                self.push_stack(ADDRESS_TYPE, Number::Unsigned(self.extreme_pointer as u64))?;
                self.push_stack(ADDRESS_TYPE, Number::Unsigned(self.frame_pointer as u64))?;
                self.push_stack(ADDRESS_TYPE, Number::Unsigned(saved_sp as u64))?;
                self.push_stack(ADDRESS_TYPE, Number::Unsigned(self.program_counter as u64))?;
                self.program_counter = target;
                self.frame_pointer = self.stack_pointer;
            }
            Instruction::Enter => {
                self.extreme_pointer = self
                    .frame_pointer
                    .checked_sub(argument)
                    .ok_or_else(|| Segfault::new(0, "stack overflow"))?;
            }
            Instruction::Return => {
                let fp = self.frame_pointer;
                let pc = self.memory.read(fp, ADDRESS_TYPE)?.to_raw_bits() as usize;
                let sp = self.memory.read(fp + ADDRESS_SIZE, ADDRESS_TYPE)?.to_raw_bits() as usize;
                let saved_fp =
                    self.memory.read(fp + 2 * ADDRESS_SIZE, ADDRESS_TYPE)?.to_raw_bits() as usize;
                let ep =
                    self.memory.read(fp + 3 * ADDRESS_SIZE, ADDRESS_TYPE)?.to_raw_bits() as usize;
                self.program_counter = pc;
                self.stack_pointer = sp;
                self.frame_pointer = saved_fp;
                self.extreme_pointer = ep;
            }
            Instruction::Cast(from, to) => {
                let value = self.pop_stack(from)?;
                self.push_stack(to, value.convert(to))?;
            }
            Instruction::Add(ty) => self.binary_arithmetic(at, ty, ArithOp::Add)?,
            Instruction::Sub(ty) => self.binary_arithmetic(at, ty, ArithOp::Sub)?,
            Instruction::Mul(ty) => self.binary_arithmetic(at, ty, ArithOp::Mul)?,
            Instruction::Div(ty) => self.binary_arithmetic(at, ty, ArithOp::Div)?,
            Instruction::Mod(ty) => self.binary_arithmetic(at, ty, ArithOp::Mod)?,
            Instruction::And(ty) => self.binary_bitwise(ty, BitOp::And)?,
            Instruction::Or(ty) => self.binary_bitwise(ty, BitOp::Or)?,
            Instruction::Xor(ty) => self.binary_bitwise(ty, BitOp::Xor)?,
            Instruction::Eq(ty) => self.binary_compare(ty, CmpOp::Eq)?,
            Instruction::Gt(ty) => self.binary_compare(ty, CmpOp::Gt)?,
            Instruction::Ge(ty) => self.binary_compare(ty, CmpOp::Ge)?,
            Instruction::Lt(ty) => self.binary_compare(ty, CmpOp::Lt)?,
            Instruction::Le(ty) => self.binary_compare(ty, CmpOp::Le)?,
            Instruction::Not => {
                let byte = self.pop_stack(NumberType::Uint8)?;
                let result = if byte.is_zero() { 1 } else { 0 };
                self.push_stack(NumberType::Uint8, Number::Unsigned(result))?;
            }
        }
        Ok(None)
    }

    fn binary_arithmetic(&mut self, at: usize, ty: NumberType, op: ArithOp) -> Result<(), Segfault> {
        let right = self.pop_stack(ty)?;
        let left = self.pop_stack(ty)?;
        let result =
            ops::arithmetic(ty, op, left, right).map_err(|reason| Segfault::new(at, reason))?;
        self.push_stack(ty, result)
    }

    fn binary_bitwise(&mut self, ty: NumberType, op: BitOp) -> Result<(), Segfault> {
        let right = self.pop_stack(ty)?;
        let left = self.pop_stack(ty)?;
        self.push_stack(ty, ops::bitwise(ty, op, left, right))
    }

    fn binary_compare(&mut self, ty: NumberType, op: CmpOp) -> Result<(), Segfault> {
        let right = self.pop_stack(ty)?;
        let left = self.pop_stack(ty)?;
        self.push_stack(NumberType::Uint8, ops::compare(ty, op, left, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::opcode_of;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn assemble(program: &[(Instruction, Option<Number>)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for &(instruction, immediate) in program {
            bytes.push(opcode_of(instruction).unwrap());
            if let Some(ty) = instruction.immediate_type() {
                let mut scratch = Memory::new(ty.size_in_bytes());
                scratch.write(0, ty, immediate.unwrap()).unwrap();
                bytes.extend_from_slice(scratch.as_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_push_pop_round_trip() {
        let mut vm = Vm::new(Vec::new(), 256).unwrap();
        let before = vm.stack_pointer();
        vm.push_stack(NumberType::Sint32, Number::Signed(-5)).unwrap();
        assert_eq!(vm.stack_pointer(), before - 4);
        assert_eq!(vm.pop_stack(NumberType::Sint32).unwrap(), Number::Signed(-5));
        assert_eq!(vm.stack_pointer(), before);
    }

    #[test]
    fn test_pop_from_empty_stack_segfaults() {
        let mut vm = Vm::new(Vec::new(), 16).unwrap();
        assert!(vm.pop_stack(NumberType::Uint32).is_err());
    }

    #[test]
    fn test_loadc_loadc_add() {
        let program = assemble(&[
            (Instruction::LoadC(NumberType::Uint8), Some(Number::Unsigned(2))),
            (Instruction::LoadC(NumberType::Uint8), Some(Number::Unsigned(4))),
            (Instruction::Add(NumberType::Uint8), None),
        ]);
        let mut vm = Vm::new(program, 64).unwrap();
        for _ in 0..3 {
            assert_eq!(vm.step().unwrap(), None);
        }
        let top = vm.memory().read(vm.stack_pointer(), NumberType::Uint8).unwrap();
        assert_eq!(top, Number::Unsigned(6));
    }

    #[test]
    fn test_jumpz_taken_and_not_taken() {
        let program = assemble(&[(Instruction::JumpZ, Some(Number::Unsigned(9)))]);

        let mut vm = Vm::new(program.clone(), 64).unwrap();
        vm.push_stack(NumberType::Uint8, Number::Unsigned(0)).unwrap();
        vm.step().unwrap();
        assert_eq!(vm.program_counter(), 9);

        let mut vm = Vm::new(program, 64).unwrap();
        vm.push_stack(NumberType::Uint8, Number::Unsigned(22)).unwrap();
        vm.step().unwrap();
        assert_eq!(vm.program_counter(), 3);
    }

    #[test]
    fn test_call_and_return_frame_discipline() {
        // 0: loadc<uint16> 9   (3 bytes)
        // 3: call 0            (3 bytes)
        // 9: return
        let mut program = assemble(&[
            (Instruction::LoadC(NumberType::Uint16), Some(Number::Unsigned(9))),
            (Instruction::Call, Some(Number::Unsigned(0))),
        ]);
        program.resize(9, 0);
        program.push(opcode_of(Instruction::Return).unwrap());

        let mut vm = Vm::new(program, 1024).unwrap();
        vm.step().unwrap(); // loadc target
        vm.step().unwrap(); // call

        assert_eq!(vm.program_counter(), 9);
        assert_eq!(vm.frame_pointer(), vm.stack_pointer());
        let fp = vm.frame_pointer();
        // Saved slots, top-down: previous pc, sp, fp, ep.
        assert_eq!(vm.memory().read(fp, NumberType::Uint16).unwrap(), Number::Unsigned(6));
        assert_eq!(vm.memory().read(fp + 2, NumberType::Uint16).unwrap(), Number::Unsigned(1024));
        assert_eq!(vm.memory().read(fp + 4, NumberType::Uint16).unwrap(), Number::Unsigned(1024));
        assert_eq!(vm.memory().read(fp + 6, NumberType::Uint16).unwrap(), Number::Unsigned(1024));

        vm.step().unwrap(); // return
        assert_eq!(vm.program_counter(), 6);
        assert_eq!(vm.stack_pointer(), 1024);
        assert_eq!(vm.frame_pointer(), 1024);
        assert_eq!(vm.extreme_pointer(), 1024);
    }

    #[test]
    fn test_halt_returns_status() {
        let program = assemble(&[
            (Instruction::LoadC(NumberType::Uint32), Some(Number::Unsigned(7))),
            (Instruction::Halt, None),
        ]);
        let mut vm = Vm::new(program, 64).unwrap();
        assert_eq!(vm.run().unwrap(), 7);
    }

    #[test]
    fn test_cast_float_to_int_truncates() {
        let program = assemble(&[(
            Instruction::Cast(NumberType::Fp32, NumberType::Sint32),
            None,
        )]);
        let mut vm = Vm::new(program, 64).unwrap();
        vm.push_stack(NumberType::Fp32, Number::Float(52.4)).unwrap();
        vm.step().unwrap();
        assert_eq!(vm.pop_stack(NumberType::Sint32).unwrap(), Number::Signed(52));
    }

    #[test]
    fn test_cast_identity_for_all_types() {
        for ty in NumberType::ALL {
            let program = assemble(&[(Instruction::Cast(ty, ty), None)]);
            let mut vm = Vm::new(program, 64).unwrap();
            let value = match ty.interpretation() {
                stackc_core::Interpretation::Unsigned => Number::Unsigned(3),
                stackc_core::Interpretation::Signed => Number::Signed(-3),
                stackc_core::Interpretation::Float => Number::Float(2.5),
            };
            vm.push_stack(ty, value).unwrap();
            vm.step().unwrap();
            assert_eq!(vm.pop_stack(ty).unwrap(), value, "{}", ty);
        }
    }

    #[test]
    fn test_not_is_an_involution() {
        let program = assemble(&[(Instruction::Not, None), (Instruction::Not, None)]);
        let mut vm = Vm::new(program, 64).unwrap();
        vm.push_stack(NumberType::Uint8, Number::Unsigned(41)).unwrap();
        vm.step().unwrap();
        assert_eq!(
            vm.memory().read(vm.stack_pointer(), NumberType::Uint8).unwrap(),
            Number::Unsigned(0)
        );
        vm.step().unwrap();
        assert_eq!(vm.pop_stack(NumberType::Uint8).unwrap(), Number::Unsigned(1));
    }

    #[test]
    fn test_loada_copies_from_address() {
        let program = assemble(&[
            (Instruction::Alloc, Some(Number::Unsigned(4))),
            (Instruction::LoadC(NumberType::Uint16), Some(Number::Unsigned(60))),
            (Instruction::Store, Some(Number::Unsigned(4))),
            (Instruction::LoadC(NumberType::Uint16), Some(Number::Unsigned(60))),
            (Instruction::LoadA, Some(Number::Unsigned(4))),
        ]);
        let mut vm = Vm::new(program, 64).unwrap();
        vm.step().unwrap(); // reserve the destination slot at 60..64
        vm.push_stack(NumberType::Uint32, Number::Unsigned(0xDEAD_BEEF)).unwrap();
        vm.step().unwrap(); // address
        vm.step().unwrap(); // store into 60..64
        vm.step().unwrap(); // address again
        vm.step().unwrap(); // loada back on top
        assert_eq!(
            vm.pop_stack(NumberType::Uint32).unwrap(),
            Number::Unsigned(0xDEAD_BEEF)
        );
    }

    #[test]
    fn test_undefined_opcode_segfaults() {
        let mut vm = Vm::new(vec![0], 64).unwrap();
        let fault = vm.step().unwrap_err();
        assert_eq!(fault.address, 0);
        assert!(fault.reason.contains("undefined opcode"));
    }

    #[test]
    fn test_running_past_the_code_segment_segfaults() {
        let mut vm = Vm::new(Vec::new(), 64).unwrap();
        assert!(vm.step().is_err());
    }

    #[test]
    fn test_pop_beyond_stack_depth_segfaults() {
        let program = assemble(&[(Instruction::Pop, Some(Number::Unsigned(4)))]);
        let mut vm = Vm::new(program, 64).unwrap();
        assert!(vm.step().is_err());
    }

    #[test]
    fn test_division_by_zero_segfaults() {
        let program = assemble(&[(Instruction::Div(NumberType::Sint32), None)]);
        let mut vm = Vm::new(program, 64).unwrap();
        vm.push_stack(NumberType::Sint32, Number::Signed(1)).unwrap();
        vm.push_stack(NumberType::Sint32, Number::Signed(0)).unwrap();
        let fault = vm.step().unwrap_err();
        assert!(fault.reason.contains("division by zero"));
    }

    #[test]
    fn test_image_size_limits() {
        assert!(Vm::new(vec![0; MAX_IMAGE_SIZE], MAX_IMAGE_SIZE).is_ok());
        assert!(Vm::new(vec![0; MAX_IMAGE_SIZE + 1], MAX_IMAGE_SIZE).is_err());
        assert!(Vm::new(Vec::new(), MAX_IMAGE_SIZE + 1).is_err());
    }

    #[test]
    fn test_step_recorder_sees_each_instruction() {
        struct Trace(Rc<RefCell<Vec<(usize, String)>>>);
        impl StepRecorder for Trace {
            fn on_step(&mut self, program_counter: usize, instruction: &Instruction) {
                self.0.borrow_mut().push((program_counter, instruction.to_string()));
            }
        }

        let program = assemble(&[
            (Instruction::LoadC(NumberType::Uint32), Some(Number::Unsigned(0))),
            (Instruction::Halt, None),
        ]);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut vm = Vm::new(program, 64).unwrap();
        vm.set_recorder(Box::new(Trace(log.clone())));
        vm.run().unwrap();
        assert_eq!(
            log.borrow().as_slice(),
            &[(0, "loadc<uint32>".to_string()), (5, "halt".to_string())]
        );
    }
}
