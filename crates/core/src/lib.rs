//! JAPL Core: object model and bytecode primitives
//!
//! This crate provides the data structures shared by the compiler and the
//! virtual machine:
//!
//! - `value`: the tagged `Object` enum (string, integer, float, bool, nil,
//!   infinity, nan, function, exception) behind counted `Value` handles,
//!   with stringification, truthiness, equality, FNV-1a hashing, and the
//!   arithmetic/bitwise primitives the VM dispatches to
//! - `chunk`: bytecode chunks (opcode bytes, a parallel line table, and a
//!   constant pool with one- and three-byte indexing)
//! - `memory`: capacity growth policy, process-wide allocation counters,
//!   and the `Heap` that owns every object for one interpreter pipeline
//! - `debug`: a chunk disassembler for tracing and tests

pub mod chunk;
pub mod debug;
pub mod memory;
pub mod value;

// Re-export key types
pub use chunk::{Chunk, OpCode};
pub use memory::Heap;
pub use value::{Exception, Function, JaplString, Object, OpError, Value};
