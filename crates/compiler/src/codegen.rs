//! Code generation
//!
//! One walk per namespace definition appends instruction invocations to an
//! output list. Immediates that target AST nodes stay symbolic
//! ([`Immediate::Start`]/[`Immediate::End`]) until a single fixup pass
//! rewrites them to concrete addresses, then the list is encoded into a
//! big-endian byte image through the shared memory accessor.
//!
//! ## Frame layout
//!
//! `call argsSize` saves the caller's registers in four uint16 slots at the
//! new frame pointer (top-down: return PC, saved SP, saved FP, saved EP).
//! Arguments sit above that 8-byte area, and above them the caller-reserved
//! return slot, whose address is exactly the saved SP. Locals are allocated
//! below the frame pointer as their declarations execute and released at
//! block exit. `loadr` offsets are 16-bit two's complement, which is how
//! parameters and the return slot (above the frame pointer) stay reachable.

use std::collections::HashMap;

use stackc_core::{Interpretation, Memory, Number, NumberType};
use stackc_vm::{Instruction, MAX_IMAGE_SIZE, opcode_of};
use tracing::debug;

use crate::ast::{
    Ast, BinaryOp, DefId, Definition, ExprId, ExprKind, Expression, PostfixOp, ScopeId, Statement,
    StmtId, StmtKind, UnaryOp, VarType, unify,
};
use crate::config::CompilerConfig;
use crate::token::Span;

/// Bytes occupied by the four saved registers at the frame pointer.
const SAVED_AREA: i64 = 8;

/// Error type for code generation operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeGenError {
    /// A construct that parses but has no lowering (an extension point).
    Unsupported(String),
    /// The AST violates an invariant the generator depends on.
    InvalidProgram(String),
    /// The encoded image does not fit the 16-bit address space.
    ImageTooLarge { size: usize },
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Unsupported(what) => {
                write!(f, "code generation for {} is not supported", what)
            }
            CodeGenError::InvalidProgram(message) => write!(f, "{}", message),
            CodeGenError::ImageTooLarge { size } => write!(
                f,
                "encoded program of {} bytes exceeds the {}-byte limit",
                size, MAX_IMAGE_SIZE
            ),
        }
    }
}

impl std::error::Error for CodeGenError {}

/// Reference to an AST node used by a pending immediate. `Mark` handles are
/// generator-allocated labels for branch points that have no node of their
/// own (the arms of a short-circuit connective).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeRef {
    Def(DefId),
    Stmt(StmtId),
    Expr(ExprId),
    Mark(u32),
}

/// An instruction's immediate argument before fixup: either a concrete
/// number, or the address where a node's code starts or ends.
#[derive(Debug, Clone, Copy)]
enum Immediate {
    Concrete(Number),
    Start(NodeRef),
    End(NodeRef),
}

#[derive(Debug, Clone)]
struct Invocation {
    instruction: Instruction,
    argument: Option<Immediate>,
    span: Span,
}

/// One encoded instruction with its resolved immediate, for disassembly and
/// tests.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedInstruction {
    pub address: usize,
    pub instruction: Instruction,
    pub argument: Option<Number>,
    pub span: Span,
}

/// The encoded program image plus its listing.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProgram {
    pub bytes: Vec<u8>,
    pub listing: Vec<ListedInstruction>,
}

impl GeneratedProgram {
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for entry in &self.listing {
            match entry.argument {
                Some(argument) => {
                    out.push_str(&format!(
                        "{:5}  {} {}\n",
                        entry.address, entry.instruction, argument
                    ));
                }
                None => out.push_str(&format!("{:5}  {}\n", entry.address, entry.instruction)),
            }
        }
        out
    }
}

/// Lower a parsed program to bytecode.
pub fn generate(
    ast: &Ast,
    namespace: ScopeId,
    config: &CompilerConfig,
) -> Result<GeneratedProgram, CodeGenError> {
    if config.memory_size > MAX_IMAGE_SIZE {
        return Err(CodeGenError::InvalidProgram(format!(
            "memory of {} bytes exceeds the {}-byte limit",
            config.memory_size, MAX_IMAGE_SIZE
        )));
    }
    let mut generator = CodeGen {
        ast,
        invocations: Vec::new(),
        starts: HashMap::new(),
        ends: HashMap::new(),
        global_addresses: HashMap::new(),
        local_offsets: HashMap::new(),
        frame_cursor: 0,
        return_slot_offset: 0,
        return_type: VarType::Void,
        span: Span::default(),
        next_mark: 0,
    };
    generator.generate_program(namespace, config.memory_size)?;
    generator.link()
}

struct CodeGen<'a> {
    ast: &'a Ast,
    invocations: Vec<Invocation>,
    /// Instruction index where each node's code begins.
    starts: HashMap<NodeRef, usize>,
    /// Instruction index just past each node's code.
    ends: HashMap<NodeRef, usize>,
    global_addresses: HashMap<DefId, usize>,
    /// `loadr` offsets per local/parameter of the current function.
    local_offsets: HashMap<DefId, i64>,
    /// Bytes of locals currently allocated below the frame pointer.
    frame_cursor: i64,
    return_slot_offset: i64,
    return_type: VarType,
    span: Span,
    next_mark: u32,
}

impl<'a> CodeGen<'a> {
    fn emit(&mut self, instruction: Instruction, argument: Option<Immediate>) {
        self.invocations.push(Invocation {
            instruction,
            argument,
            span: self.span,
        });
    }

    fn new_mark(&mut self) -> NodeRef {
        self.next_mark += 1;
        NodeRef::Mark(self.next_mark)
    }

    /// Pin a mark to the next emitted instruction.
    fn place_mark(&mut self, mark: NodeRef) {
        self.starts.insert(mark, self.invocations.len());
    }

    fn emit_uint16(&mut self, instruction: Instruction, value: usize) {
        self.emit(
            instruction,
            Some(Immediate::Concrete(Number::Unsigned(value as u64))),
        );
    }

    fn generate_program(
        &mut self,
        namespace: ScopeId,
        memory_size: usize,
    ) -> Result<(), CodeGenError> {
        let entries: Vec<DefId> = self
            .ast
            .scope(namespace)
            .entries()
            .iter()
            .map(|(_, def)| *def)
            .collect();

        // Globals first, contiguously, at the bottom of the stack (the top
        // of the memory image).
        let mut cursor = memory_size;
        for &def in &entries {
            if let Definition::Variable { ty, name, .. } = self.ast.def(def) {
                let size = ty.size_in_bytes();
                cursor = cursor.checked_sub(size).ok_or_else(|| {
                    CodeGenError::InvalidProgram(format!(
                        "global variables do not fit into {} bytes of memory (at '{}')",
                        memory_size, name
                    ))
                })?;
                self.global_addresses.insert(def, cursor);
            }
        }
        for &def in &entries {
            let Definition::Variable {
                ty, initializer, span, ..
            } = self.ast.def(def)
            else {
                continue;
            };
            let (ty, initializer) = (ty.clone(), *initializer);
            self.span = *span;
            let size = ty.size_in_bytes();
            self.emit_uint16(Instruction::Alloc, size);
            if let Some(init) = initializer {
                let init_ty = self.ast.expr(init).ty.clone();
                self.gen_expression(init)?;
                self.emit_cast(&init_ty, &ty)?;
                let address = self.global_addresses[&def];
                self.emit(
                    Instruction::LoadC(NumberType::Uint16),
                    Some(Immediate::Concrete(Number::Unsigned(address as u64))),
                );
                self.emit_uint16(Instruction::Store, size);
            }
        }

        // Bootstrap: reserve main's return slot, call it, halt on its value.
        let main = self.ast.look_up(namespace, "main").ok_or_else(|| {
            CodeGenError::InvalidProgram("the program defines no 'main' function".to_string())
        })?;
        self.span = Span::default();
        self.emit_uint16(Instruction::Alloc, 4);
        self.emit(
            Instruction::LoadC(NumberType::Uint16),
            Some(Immediate::Start(NodeRef::Def(main))),
        );
        self.emit_uint16(Instruction::Call, 0);
        self.emit(Instruction::Halt, None);

        for &def in &entries {
            if matches!(self.ast.def(def), Definition::Function { body: Some(_), .. }) {
                self.generate_function(def)?;
            }
        }
        Ok(())
    }

    fn generate_function(&mut self, function: DefId) -> Result<(), CodeGenError> {
        let (parameters, body, return_type, span) = match self.ast.def(function) {
            Definition::Function {
                parameters,
                body: Some(body),
                return_type,
                span,
                ..
            } => (parameters.clone(), *body, return_type.clone(), *span),
            _ => {
                return Err(CodeGenError::InvalidProgram(
                    "only functions with bodies can be generated".to_string(),
                ));
            }
        };
        self.span = span;
        self.starts.insert(NodeRef::Def(function), self.invocations.len());

        // The frame's locals budget, published through `enter` for the
        // extreme pointer. Sums every declaration in the body.
        let locals: usize = self
            .ast
            .recursive_statements(body)
            .iter()
            .filter_map(|&stmt| match &self.ast.stmt(stmt).kind {
                StmtKind::Declaration { variable, .. } => match self.ast.def(*variable) {
                    Definition::Variable { ty, .. } => Some(ty.size_in_bytes()),
                    _ => None,
                },
                _ => None,
            })
            .sum();
        self.emit_uint16(Instruction::Enter, locals);

        self.local_offsets.clear();
        self.frame_cursor = 0;
        let args_size: i64 = parameters
            .iter()
            .map(|&parameter| self.definition_size(parameter) as i64)
            .sum();
        let mut consumed = 0;
        for &parameter in &parameters {
            consumed += self.definition_size(parameter) as i64;
            self.local_offsets
                .insert(parameter, -(SAVED_AREA + args_size - consumed));
        }
        self.return_slot_offset = -(SAVED_AREA + args_size);
        self.return_type = return_type;

        self.gen_statement(body)?;
        let terminated = matches!(
            self.invocations.last(),
            Some(invocation) if invocation.instruction == Instruction::Return
        );
        // A branch may still jump to the spot right after the body (an if
        // whose other arm returned, a loop exit); such a landing site needs
        // the default return even when the last instruction is a return.
        let here = self.invocations.len();
        let lands_here = self.invocations.iter().any(|invocation| match invocation.argument {
            Some(Immediate::Start(node)) => self.starts.get(&node) == Some(&here),
            Some(Immediate::End(node)) => self.ends.get(&node) == Some(&here),
            _ => false,
        });
        if !terminated || lands_here {
            self.emit(Instruction::Return, None);
        }
        self.ends.insert(NodeRef::Def(function), self.invocations.len());
        Ok(())
    }

    fn definition_size(&self, def: DefId) -> usize {
        match self.ast.def(def) {
            Definition::Variable { ty, .. } => ty.size_in_bytes(),
            _ => 0,
        }
    }

    // ----- Statements -----

    fn gen_statement(&mut self, id: StmtId) -> Result<(), CodeGenError> {
        self.starts.insert(NodeRef::Stmt(id), self.invocations.len());
        let Statement { span, kind, .. } = self.ast.stmt(id).clone();
        self.span = span;
        match kind {
            StmtKind::Empty => {}
            StmtKind::Compound { statements, .. } => {
                let enclosing = self.frame_cursor;
                for stmt in statements {
                    self.gen_statement(stmt)?;
                }
                let freed = self.frame_cursor - enclosing;
                if freed > 0 {
                    self.span = span;
                    self.emit_uint16(Instruction::Pop, freed as usize);
                }
                self.frame_cursor = enclosing;
            }
            StmtKind::Declaration {
                variable,
                initializer,
            } => {
                let size = self.definition_size(variable);
                self.frame_cursor += size as i64;
                self.local_offsets.insert(variable, self.frame_cursor);
                self.emit_uint16(Instruction::Alloc, size);
                if let Some(init) = initializer {
                    // The initializer is an assignment expression; discard
                    // its value.
                    self.gen_expression(init)?;
                    self.emit_uint16(Instruction::Pop, size);
                }
            }
            StmtKind::Expression { expr } => {
                let size = self.ast.expr(expr).ty.size_in_bytes();
                self.gen_expression(expr)?;
                if size > 0 {
                    self.emit_uint16(Instruction::Pop, size);
                }
            }
            StmtKind::Return { value } => {
                if let Some(expr) = value {
                    let expr_ty = self.ast.expr(expr).ty.clone();
                    let return_type = self.return_type.clone();
                    let size = return_type.size_in_bytes();
                    self.gen_expression(expr)?;
                    self.emit_cast(&expr_ty, &return_type)?;
                    let offset = self.return_slot_offset;
                    self.emit_loadr(offset);
                    self.emit_uint16(Instruction::Store, size);
                }
                self.emit(Instruction::Return, None);
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.gen_flag(condition)?;
                match else_body {
                    Some(else_body) => {
                        self.emit(
                            Instruction::JumpZ,
                            Some(Immediate::Start(NodeRef::Stmt(else_body))),
                        );
                        self.gen_statement(then_body)?;
                        self.span = span;
                        self.emit(Instruction::Jump, Some(Immediate::End(NodeRef::Stmt(id))));
                        self.gen_statement(else_body)?;
                    }
                    None => {
                        self.emit(Instruction::JumpZ, Some(Immediate::End(NodeRef::Stmt(id))));
                        self.gen_statement(then_body)?;
                    }
                }
            }
            StmtKind::While { condition, body } => {
                self.gen_flag(condition)?;
                self.emit(Instruction::JumpZ, Some(Immediate::End(NodeRef::Stmt(id))));
                self.gen_statement(body)?;
                self.span = span;
                self.emit(Instruction::Jump, Some(Immediate::Start(NodeRef::Stmt(id))));
            }
            StmtKind::DoWhile { body, condition } => {
                self.gen_statement(body)?;
                self.gen_flag(condition)?;
                self.span = span;
                self.emit(Instruction::JumpZ, Some(Immediate::End(NodeRef::Stmt(id))));
                self.emit(Instruction::Jump, Some(Immediate::Start(NodeRef::Stmt(id))));
            }
            StmtKind::For {
                initializer,
                condition,
                update,
                body,
            } => {
                if let Some(expr) = initializer {
                    let size = self.ast.expr(expr).ty.size_in_bytes();
                    self.gen_expression(expr)?;
                    if size > 0 {
                        self.emit_uint16(Instruction::Pop, size);
                    }
                }
                if let Some(expr) = condition {
                    self.gen_flag(expr)?;
                    self.emit(Instruction::JumpZ, Some(Immediate::End(NodeRef::Stmt(id))));
                }
                self.gen_statement(body)?;
                if let Some(expr) = update {
                    let size = self.ast.expr(expr).ty.size_in_bytes();
                    self.gen_expression(expr)?;
                    if size > 0 {
                        self.emit_uint16(Instruction::Pop, size);
                    }
                }
                self.span = span;
                let top = match condition {
                    Some(expr) => Immediate::Start(NodeRef::Expr(expr)),
                    None => Immediate::Start(NodeRef::Stmt(body)),
                };
                self.emit(Instruction::Jump, Some(top));
            }
            StmtKind::Goto { label, target } => {
                let target = target.ok_or_else(|| {
                    CodeGenError::InvalidProgram(format!("unresolved goto '{}'", label))
                })?;
                self.emit(
                    Instruction::Jump,
                    Some(Immediate::Start(NodeRef::Stmt(target))),
                );
            }
            StmtKind::Switch { .. } => {
                return Err(CodeGenError::Unsupported("the switch statement".to_string()));
            }
        }
        self.ends.insert(NodeRef::Stmt(id), self.invocations.len());
        Ok(())
    }

    // ----- Expressions -----

    /// Generate a condition as a single truth byte for `jumpz`: values wider
    /// than one byte compare against zero first.
    fn gen_flag(&mut self, expr: ExprId) -> Result<(), CodeGenError> {
        let ty = self.basic_type(expr)?;
        self.gen_expression(expr)?;
        if ty.size_in_bytes() != 1 {
            self.emit(
                Instruction::LoadC(ty),
                Some(Immediate::Concrete(zero_of(ty))),
            );
            self.emit(Instruction::Eq(ty), None);
            self.emit(Instruction::Not, None);
        }
        Ok(())
    }

    fn gen_expression(&mut self, id: ExprId) -> Result<(), CodeGenError> {
        self.starts.insert(NodeRef::Expr(id), self.invocations.len());
        let Expression { ty, span, kind } = self.ast.expr(id).clone();
        self.span = span;
        match kind {
            ExprKind::NumberLiteral { value } => {
                let number_type = ty.basic().ok_or_else(|| {
                    CodeGenError::InvalidProgram("literals always have basic types".to_string())
                })?;
                self.emit(
                    Instruction::LoadC(number_type),
                    Some(Immediate::Concrete(value)),
                );
            }
            ExprKind::Variable { definition } => {
                let size = ty.size_in_bytes();
                self.gen_variable_address(definition)?;
                self.emit_uint16(Instruction::LoadA, size);
            }
            ExprKind::Assignment {
                target,
                operator,
                value,
            } => {
                let definition = self.variable_of(target)?;
                let target_ty = self.ast.expr(target).ty.clone();
                let value_ty = self.ast.expr(value).ty.clone();
                let size = target_ty.size_in_bytes();
                match operator {
                    None => {
                        self.gen_expression(value)?;
                        self.emit_cast(&value_ty, &target_ty)?;
                    }
                    Some(op) => {
                        self.gen_expression(target)?;
                        self.gen_expression(value)?;
                        self.emit_cast(&value_ty, &target_ty)?;
                        let number_type = target_ty.basic().ok_or_else(|| {
                            CodeGenError::InvalidProgram(
                                "assignment targets have basic types".to_string(),
                            )
                        })?;
                        self.emit_binary(op, number_type)?;
                    }
                }
                // `store` consumes the value, so re-load the target to keep
                // the expression's value on the stack.
                self.gen_variable_address(definition)?;
                self.emit_uint16(Instruction::Store, size);
                self.gen_variable_address(definition)?;
                self.emit_uint16(Instruction::LoadA, size);
            }
            ExprKind::Prefix { operator, operand } => {
                let number_type = self.basic_type(operand)?;
                match operator {
                    UnaryOp::Plus => {
                        self.gen_expression(operand)?;
                    }
                    UnaryOp::Minus => {
                        self.emit(
                            Instruction::LoadC(number_type),
                            Some(Immediate::Concrete(zero_of(number_type))),
                        );
                        self.gen_expression(operand)?;
                        self.emit(Instruction::Sub(number_type), None);
                    }
                    UnaryOp::BitwiseNot => {
                        self.gen_expression(operand)?;
                        self.emit(
                            Instruction::LoadC(number_type),
                            Some(Immediate::Concrete(all_ones_of(number_type))),
                        );
                        self.emit(Instruction::Xor(number_type), None);
                    }
                    UnaryOp::LogicalNot => {
                        self.gen_expression(operand)?;
                        if number_type.size_in_bytes() == 1 {
                            self.emit(Instruction::Not, None);
                        } else {
                            // v == 0 is exactly logical not.
                            self.emit(
                                Instruction::LoadC(number_type),
                                Some(Immediate::Concrete(zero_of(number_type))),
                            );
                            self.emit(Instruction::Eq(number_type), None);
                        }
                    }
                    UnaryOp::Increment | UnaryOp::Decrement => {
                        let definition = self.variable_of(operand)?;
                        let size = number_type.size_in_bytes();
                        self.gen_expression(operand)?;
                        self.emit(
                            Instruction::LoadC(number_type),
                            Some(Immediate::Concrete(one_of(number_type))),
                        );
                        let step = if operator == UnaryOp::Increment {
                            Instruction::Add(number_type)
                        } else {
                            Instruction::Sub(number_type)
                        };
                        self.emit(step, None);
                        self.gen_variable_address(definition)?;
                        self.emit_uint16(Instruction::Store, size);
                        self.gen_variable_address(definition)?;
                        self.emit_uint16(Instruction::LoadA, size);
                    }
                }
            }
            ExprKind::Postfix { operator, operand } => {
                let number_type = self.basic_type(operand)?;
                let definition = self.variable_of(operand)?;
                let size = number_type.size_in_bytes();
                // The old value stays on the stack as the expression's
                // result while the incremented value is written back.
                self.gen_expression(operand)?;
                self.gen_expression(operand)?;
                self.emit(
                    Instruction::LoadC(number_type),
                    Some(Immediate::Concrete(one_of(number_type))),
                );
                let step = if operator == PostfixOp::Increment {
                    Instruction::Add(number_type)
                } else {
                    Instruction::Sub(number_type)
                };
                self.emit(step, None);
                self.gen_variable_address(definition)?;
                self.emit_uint16(Instruction::Store, size);
            }
            ExprKind::Infix {
                operator,
                left,
                right,
            } => {
                self.gen_infix(operator, left, right)?;
            }
            ExprKind::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let then_ty = self.ast.expr(then_value).ty.clone();
                let else_ty = self.ast.expr(else_value).ty.clone();
                self.gen_flag(condition)?;
                self.emit(
                    Instruction::JumpZ,
                    Some(Immediate::Start(NodeRef::Expr(else_value))),
                );
                self.gen_expression(then_value)?;
                self.emit_cast(&then_ty, &ty)?;
                self.emit(Instruction::Jump, Some(Immediate::End(NodeRef::Expr(id))));
                self.gen_expression(else_value)?;
                self.emit_cast(&else_ty, &ty)?;
            }
            ExprKind::Call {
                function,
                arguments,
            } => {
                let parameters = match self.ast.def(function) {
                    Definition::Function { parameters, .. } => parameters.clone(),
                    _ => {
                        return Err(CodeGenError::InvalidProgram(
                            "call targets are functions".to_string(),
                        ));
                    }
                };
                let return_size = ty.size_in_bytes();
                if return_size > 0 {
                    self.emit_uint16(Instruction::Alloc, return_size);
                }
                let mut args_size = 0;
                for (&argument, &parameter) in arguments.iter().zip(&parameters) {
                    let argument_ty = self.ast.expr(argument).ty.clone();
                    let parameter_ty = match self.ast.def(parameter) {
                        Definition::Variable { ty, .. } => ty.clone(),
                        _ => {
                            return Err(CodeGenError::InvalidProgram(
                                "parameters are variables".to_string(),
                            ));
                        }
                    };
                    self.gen_expression(argument)?;
                    self.emit_cast(&argument_ty, &parameter_ty)?;
                    args_size += parameter_ty.size_in_bytes();
                }
                self.span = span;
                self.emit(
                    Instruction::LoadC(NumberType::Uint16),
                    Some(Immediate::Start(NodeRef::Def(function))),
                );
                self.emit_uint16(Instruction::Call, args_size);
            }
            ExprKind::Cast { operand } => {
                let operand_ty = self.ast.expr(operand).ty.clone();
                self.gen_expression(operand)?;
                self.emit_cast(&operand_ty, &ty)?;
            }
            ExprKind::Subscript { .. } => {
                return Err(CodeGenError::Unsupported("subscript expressions".to_string()));
            }
        }
        self.ends.insert(NodeRef::Expr(id), self.invocations.len());
        Ok(())
    }

    fn gen_infix(
        &mut self,
        operator: BinaryOp,
        left: ExprId,
        right: ExprId,
    ) -> Result<(), CodeGenError> {
        let left_ty = self.ast.expr(left).ty.clone();
        let right_ty = self.ast.expr(right).ty.clone();
        match operator {
            BinaryOp::LogicalAnd => {
                // Short-circuit: the right operand only runs when the left
                // one was non-zero.
                let short = self.new_mark();
                let end = self.new_mark();
                self.gen_flag(left)?;
                self.emit(Instruction::JumpZ, Some(Immediate::Start(short)));
                self.gen_flag(right)?;
                self.emit(Instruction::Jump, Some(Immediate::Start(end)));
                self.place_mark(short);
                self.emit(
                    Instruction::LoadC(NumberType::Uint8),
                    Some(Immediate::Concrete(Number::Unsigned(0))),
                );
                self.place_mark(end);
                Ok(())
            }
            BinaryOp::LogicalOr => {
                let try_right = self.new_mark();
                let end = self.new_mark();
                self.gen_flag(left)?;
                self.emit(Instruction::JumpZ, Some(Immediate::Start(try_right)));
                self.emit(
                    Instruction::LoadC(NumberType::Uint8),
                    Some(Immediate::Concrete(Number::Unsigned(1))),
                );
                self.emit(Instruction::Jump, Some(Immediate::Start(end)));
                self.place_mark(try_right);
                self.gen_flag(right)?;
                self.place_mark(end);
                Ok(())
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                Err(CodeGenError::Unsupported("the shift operators".to_string()))
            }
            _ => {
                let unified = unify(&left_ty, &right_ty).ok_or_else(|| {
                    CodeGenError::InvalidProgram(format!(
                        "operand types {} and {} do not meet",
                        left_ty, right_ty
                    ))
                })?;
                let number_type = unified.basic().ok_or_else(|| {
                    CodeGenError::InvalidProgram("infix operands have basic types".to_string())
                })?;
                self.gen_expression(left)?;
                self.emit_cast(&left_ty, &unified)?;
                self.gen_expression(right)?;
                self.emit_cast(&right_ty, &unified)?;
                self.emit_binary(operator, number_type)
            }
        }
    }

    fn emit_binary(&mut self, operator: BinaryOp, ty: NumberType) -> Result<(), CodeGenError> {
        let instruction = match operator {
            BinaryOp::Add => Instruction::Add(ty),
            BinaryOp::Sub => Instruction::Sub(ty),
            BinaryOp::Mul => Instruction::Mul(ty),
            BinaryOp::Div => Instruction::Div(ty),
            BinaryOp::Mod => Instruction::Mod(ty),
            BinaryOp::BitAnd => Instruction::And(ty),
            BinaryOp::BitXor => Instruction::Xor(ty),
            BinaryOp::BitOr => Instruction::Or(ty),
            BinaryOp::Eq => Instruction::Eq(ty),
            BinaryOp::Gt => Instruction::Gt(ty),
            BinaryOp::Ge => Instruction::Ge(ty),
            BinaryOp::Lt => Instruction::Lt(ty),
            BinaryOp::Le => Instruction::Le(ty),
            BinaryOp::Ne => {
                self.emit(Instruction::Eq(ty), None);
                self.emit(Instruction::Not, None);
                return Ok(());
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                return Err(CodeGenError::Unsupported("the shift operators".to_string()));
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                return Err(CodeGenError::InvalidProgram(
                    "logical connectives lower through flags".to_string(),
                ));
            }
        };
        self.emit(instruction, None);
        Ok(())
    }

    // ----- Addressing -----

    fn variable_of(&self, expr: ExprId) -> Result<DefId, CodeGenError> {
        match &self.ast.expr(expr).kind {
            ExprKind::Variable { definition } => Ok(*definition),
            _ => Err(CodeGenError::InvalidProgram(
                "assignment targets are variable references".to_string(),
            )),
        }
    }

    fn basic_type(&self, expr: ExprId) -> Result<NumberType, CodeGenError> {
        self.ast.expr(expr).ty.basic().ok_or_else(|| {
            CodeGenError::InvalidProgram("expression requires a basic type".to_string())
        })
    }

    fn emit_loadr(&mut self, offset: i64) {
        let encoded = offset.rem_euclid(1 << 16) as u64;
        self.emit(
            Instruction::LoadR,
            Some(Immediate::Concrete(Number::Unsigned(encoded))),
        );
    }

    fn gen_variable_address(&mut self, definition: DefId) -> Result<(), CodeGenError> {
        if let Some(&address) = self.global_addresses.get(&definition) {
            self.emit(
                Instruction::LoadC(NumberType::Uint16),
                Some(Immediate::Concrete(Number::Unsigned(address as u64))),
            );
            return Ok(());
        }
        if let Some(&offset) = self.local_offsets.get(&definition) {
            self.emit_loadr(offset);
            return Ok(());
        }
        Err(CodeGenError::InvalidProgram(format!(
            "variable '{}' has no storage",
            self.ast.def(definition).name()
        )))
    }

    /// Emit the cast for a validated implicit (or explicit) conversion.
    fn emit_cast(&mut self, from: &VarType, to: &VarType) -> Result<(), CodeGenError> {
        if from == to {
            return Ok(());
        }
        match (from.basic(), to.basic()) {
            (Some(from), Some(to)) => {
                self.emit(Instruction::Cast(from, to), None);
                Ok(())
            }
            _ => Err(CodeGenError::InvalidProgram(format!(
                "no conversion from {} to {}",
                from, to
            ))),
        }
    }

    // ----- Fixup and encoding -----

    /// Collapse pending node references to concrete addresses, then encode
    /// the invocation list into the byte image.
    fn link(self) -> Result<GeneratedProgram, CodeGenError> {
        let mut addresses = Vec::with_capacity(self.invocations.len());
        let mut total = 0;
        for invocation in &self.invocations {
            addresses.push(total);
            total += invocation.instruction.encoded_size();
        }
        if total > MAX_IMAGE_SIZE {
            return Err(CodeGenError::ImageTooLarge { size: total });
        }
        let address_of_index =
            |index: usize| -> usize { addresses.get(index).copied().unwrap_or(total) };

        let mut resolved = Vec::with_capacity(self.invocations.len());
        for invocation in &self.invocations {
            let argument = match invocation.argument {
                Some(Immediate::Concrete(value)) => Some(value),
                Some(Immediate::Start(node)) => {
                    let index = *self.starts.get(&node).ok_or_else(|| {
                        CodeGenError::InvalidProgram(
                            "an instruction targets a node that was never emitted".to_string(),
                        )
                    })?;
                    Some(Number::Unsigned(address_of_index(index) as u64))
                }
                Some(Immediate::End(node)) => {
                    let index = *self.ends.get(&node).ok_or_else(|| {
                        CodeGenError::InvalidProgram(
                            "an instruction targets a node that was never emitted".to_string(),
                        )
                    })?;
                    Some(Number::Unsigned(address_of_index(index) as u64))
                }
                None => None,
            };
            resolved.push(argument);
        }

        let mut image = Memory::new(total);
        let mut listing = Vec::with_capacity(self.invocations.len());
        for (index, invocation) in self.invocations.iter().enumerate() {
            let at = addresses[index];
            let opcode = opcode_of(invocation.instruction).ok_or_else(|| {
                CodeGenError::InvalidProgram(format!(
                    "{} is not in the instruction set",
                    invocation.instruction
                ))
            })?;
            image
                .write(at, NumberType::Uint8, Number::Unsigned(opcode as u64))
                .map_err(|err| CodeGenError::InvalidProgram(err.to_string()))?;
            if let Some(ty) = invocation.instruction.immediate_type() {
                let value = resolved[index].ok_or_else(|| {
                    CodeGenError::InvalidProgram(format!(
                        "{} is missing its immediate argument",
                        invocation.instruction
                    ))
                })?;
                image
                    .write(at + 1, ty, value)
                    .map_err(|err| CodeGenError::InvalidProgram(err.to_string()))?;
            }
            listing.push(ListedInstruction {
                address: at,
                instruction: invocation.instruction,
                argument: resolved[index],
                span: invocation.span,
            });
        }
        debug!(
            instructions = listing.len(),
            bytes = total,
            "generated program"
        );
        Ok(GeneratedProgram {
            bytes: image.into_bytes(),
            listing,
        })
    }
}

fn zero_of(ty: NumberType) -> Number {
    match ty.interpretation() {
        Interpretation::Unsigned => Number::Unsigned(0),
        Interpretation::Signed => Number::Signed(0),
        Interpretation::Float => Number::Float(0.0),
    }
}

fn one_of(ty: NumberType) -> Number {
    match ty.interpretation() {
        Interpretation::Unsigned => Number::Unsigned(1),
        Interpretation::Signed => Number::Signed(1),
        Interpretation::Float => Number::Float(1.0),
    }
}

fn all_ones_of(ty: NumberType) -> Number {
    match ty.interpretation() {
        Interpretation::Signed => Number::Signed(-1),
        _ => Number::Unsigned(ty.bitmask()),
    }
}
