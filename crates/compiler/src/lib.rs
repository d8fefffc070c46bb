//! stackc compiler library
//!
//! Compiles a restricted C dialect to bytecode for the stackc virtual
//! machine. The pipeline is source text → tokens → AST with validated
//! scopes → instruction list with deferred address fixups → encoded program
//! bytes; execution lives in the `stackc-vm` crate.
//!
//! ```rust,ignore
//! let program = stackc::compile("int main() { return 0; }")?;
//! let mut vm = stackc_vm::Vm::new(program.bytes, 1 << 16)?;
//! assert_eq!(vm.run()?, 0);
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod token;

pub use codegen::{CodeGenError, GeneratedProgram};
pub use config::CompilerConfig;
pub use error::CompileError;
pub use lexer::Lexer;
pub use parser::{ParsedProgram, Parser};
pub use token::{Token, TokenKind};

/// Compile a source text with the default configuration.
pub fn compile(source: &str) -> Result<GeneratedProgram, CompileError> {
    compile_with_config(source, &CompilerConfig::default())
}

/// Compile a source text: parse, validate, and generate bytecode.
pub fn compile_with_config(
    source: &str,
    config: &CompilerConfig,
) -> Result<GeneratedProgram, CompileError> {
    let parsed = Parser::new(source, config).parse()?;
    let program = codegen::generate(&parsed.ast, parsed.namespace, config)?;
    Ok(program)
}
