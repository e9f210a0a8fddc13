//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and run strictly in sequence:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns one function per
//!   top-level construct, each with its frame layout (`frame`).
//! - `codegen` lowers the parsed program into x86-64 Intel-syntax assembly.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod frame;
pub mod parser;
pub mod tokenizer;

pub use error::{CompileError, CompileResult};

/// Compile a source string into assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source)?;
  let program = parser::parse(tokens, source)?;
  Ok(codegen::generate(&program))
}
