//! JAPL Runtime
//!
//! The bytecode virtual machine: a value stack, a bounded call-frame
//! stack, a VM-scoped globals map, and a runtime error taxonomy rendered
//! as tracebacks.
//!
//! ```rust,ignore
//! let mut vm = Vm::new("script.jpl");
//! let function = japl_compiler::compile(&source, "script.jpl", vm.heap_mut())?;
//! vm.interpret(function)?;
//! ```

pub mod error;
pub mod vm;

pub use error::{ErrorKind, TraceEntry, VmError};
pub use vm::{FRAMES_MAX, STACK_MAX, Vm};
