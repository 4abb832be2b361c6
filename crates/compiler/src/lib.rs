//! JAPL Compiler Library
//!
//! Turns JAPL source text into bytecode:
//!
//! - `lexer`: source bytes to a token stream, with best-effort error
//!   recovery so one pass can report several problems
//! - `token`: token kinds (with literal payloads) and the reserved-word
//!   table
//! - `compiler`: the single-pass Pratt parser that emits chunk bytecode,
//!   resolves locals and scopes, interns string constants per chunk, and
//!   panic-mode-recovers at statement boundaries
//!
//! The usual entry point is [`compile`]:
//!
//! ```rust,ignore
//! let mut heap = Heap::new();
//! let function = japl_compiler::compile(source, "script.jpl", &mut heap)?;
//! ```

pub mod compiler;
pub mod lexer;
pub mod token;

pub use compiler::{CompileError, compile};
pub use lexer::Lexer;
pub use token::{Token, TokenKind};
