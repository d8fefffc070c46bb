//! Compiler error types.
//!
//! One variant per failure class of the front end; code generation has its
//! own error type that folds in via `From`. Every compile-time error reaches
//! the caller of the top-level compile entry points, nothing is swallowed.

use crate::codegen::CodeGenError;
use crate::token::{Span, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The lexer could not match any token pattern.
    UnrecognizedSource {
        offset: usize,
        line: usize,
        column: usize,
    },
    /// A parser expectation was not met.
    UnexpectedToken { expected: String, found: Token },
    /// Name lookup reached the namespace without finding the identifier.
    UndefinedName { name: String, span: Span },
    /// A definition targeted an identifier that already exists in its scope.
    NameCollision { name: String, span: Span },
    /// A semantic rule was broken (label uniqueness, type mismatch,
    /// misplaced `case`/`default`, a bad `main`, and so on).
    LanguageViolation { message: String, span: Option<Span> },
    /// A construct the dialect reserves but does not implement.
    Unimplemented { construct: &'static str, span: Span },
    /// Code generation failed.
    CodeGen(CodeGenError),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UnrecognizedSource { offset, line, column } => write!(
                f,
                "unrecognized source at line {}, column {} (byte {})",
                line + 1,
                column + 1,
                offset
            ),
            CompileError::UnexpectedToken { expected, found } => write!(
                f,
                "expected {}, found {} at bytes {}..{}",
                expected, found.kind, found.span.start, found.span.end
            ),
            CompileError::UndefinedName { name, span } => write!(
                f,
                "undefined name '{}' at bytes {}..{}",
                name, span.start, span.end
            ),
            CompileError::NameCollision { name, span } => write!(
                f,
                "'{}' is already defined in this scope (at bytes {}..{})",
                name, span.start, span.end
            ),
            CompileError::LanguageViolation { message, span } => match span {
                Some(span) => write!(f, "{} (at bytes {}..{})", message, span.start, span.end),
                None => write!(f, "{}", message),
            },
            CompileError::Unimplemented { construct, span } => write!(
                f,
                "'{}' is reserved but not part of this dialect (at bytes {}..{})",
                construct, span.start, span.end
            ),
            CompileError::CodeGen(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CodeGenError> for CompileError {
    fn from(err: CodeGenError) -> CompileError {
        CompileError::CodeGen(err)
    }
}
