//! Runtime error taxonomy and tracebacks
//!
//! Every runtime failure carries an error kind (which names the exception
//! the VM builds), a message, and the call-frame traceback captured while
//! unwinding. Rendering follows the interpreter's text protocol: a header,
//! one `[line L in <file>]` entry per frame outermost first, then the
//! `Name: message` line.

use std::fmt;

/// Which exception a runtime error raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported operand types, non-callable callee, wrong arity,
    /// division by zero.
    Type,
    /// Reserved for sequence operations.
    Index,
    /// Read, assignment, or `del` of an undefined global.
    Reference,
    /// Integer arithmetic overflowed.
    Overflow,
    /// Call-frame stack exhausted.
    Recursion,
    /// The cooperative interrupt flag was set.
    Interrupted,
}

impl ErrorKind {
    /// The exception name rendered in tracebacks.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::Index => "IndexError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Overflow => "OverflowError",
            ErrorKind::Recursion => "RecursionError",
            ErrorKind::Interrupted => "InterruptedError",
        }
    }
}

/// One unwound call frame: the line being executed, in which file.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub line: u32,
    pub file: String,
}

/// A runtime error after frame unwinding.
#[derive(Debug)]
pub struct VmError {
    pub kind: ErrorKind,
    pub message: String,
    /// Outermost frame first, the erroring frame last.
    pub traceback: Vec<TraceEntry>,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback (most recent call last):")?;
        for entry in &self.traceback {
            writeln!(f, "  [line {} in '{}']", entry.line, entry.file)?;
        }
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for VmError {}
