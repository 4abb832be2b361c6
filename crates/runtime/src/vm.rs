//! The bytecode virtual machine
//!
//! A fetch-decode-dispatch loop over the current call frame's chunk. The
//! VM owns the value stack, the frame stack, the globals map, and the heap
//! every object lives on; tearing the VM down releases the lot.
//!
//! Stack discipline: every statement leaves the stack balanced. The only
//! top-level exception is `Pop` in the outermost frame, which retains the
//! discarded value in `last_pop` for the REPL to echo.
//!
//! Runtime errors build an exception object, capture a traceback while
//! unwinding every frame, and surface as [`VmError`]. The REPL keeps the
//! same VM alive afterwards: globals survive, the stacks start empty.
//!
//! A cooperative interrupt flag is checked before each instruction fetch;
//! a signal handler may set it from another thread.

use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use japl_core::chunk::OpCode;
use japl_core::memory::Heap;
use japl_core::value::{Exception, Function, Object, OpError, OpResult, Value};

use crate::error::{ErrorKind, TraceEntry, VmError};

/// Hard cap on call depth.
pub const FRAMES_MAX: usize = 400;
/// Hard cap on value-stack depth.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// An activation record: the running function, its instruction pointer,
/// and where its locals begin on the value stack (slot 0 is the function
/// itself).
struct CallFrame {
    function: Rc<Function>,
    ip: usize,
    base: usize,
}

pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: HashMap<String, Value>,
    heap: Heap,
    file: String,
    last_pop: Value,
    interrupt: Arc<AtomicBool>,
    out: Box<dyn Write>,

    // Singletons, shared by every push of the same literal.
    nil: Value,
    true_value: Value,
    false_value: Value,
    inf_value: Value,
    nan_value: Value,
}

impl Vm {
    pub fn new(file: &str) -> Self {
        Self::with_output(file, Box::new(io::stdout()))
    }

    /// Build a VM writing `Print` output to `out` instead of stdout.
    pub fn with_output(file: &str, out: Box<dyn Write>) -> Self {
        let mut heap = Heap::new();
        let nil = heap.alloc(Object::Nil);
        let true_value = heap.alloc(Object::Bool(true));
        let false_value = heap.alloc(Object::Bool(false));
        let inf_value = heap.alloc(Object::Inf { negative: false });
        let nan_value = heap.alloc(Object::Nan);

        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            globals: HashMap::new(),
            heap,
            file: file.to_string(),
            last_pop: nil.clone(),
            interrupt: Arc::new(AtomicBool::new(false)),
            out,
            nil,
            true_value,
            false_value,
            inf_value,
            nan_value,
        }
    }

    /// The heap constants are allocated on; the compiler borrows it while
    /// building a chunk for this VM.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Shared interrupt flag. Setting it makes the VM raise
    /// `InterruptedError` before the next instruction.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Value most recently popped at top level, reset to nil. The REPL
    /// echoes it after each evaluation.
    pub fn take_last_pop(&mut self) -> Value {
        std::mem::replace(&mut self.last_pop, self.nil.clone())
    }

    /// Execute a compiled top-level function to completion.
    pub fn interpret(&mut self, function: Function) -> Result<(), VmError> {
        self.stack.clear();
        self.frames.clear();
        self.last_pop = self.nil.clone();

        let function = Rc::new(function);
        let script = self.heap.alloc(Object::Function(function.clone()));
        self.push(script)?;
        self.frames.push(CallFrame {
            function,
            ip: 0,
            base: 0,
        });
        self.run()
    }

    // Frame and stack plumbing

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("frame stack is never empty while running")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("frame stack is never empty while running")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.function.chunk.code()[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> usize {
        let low = self.read_byte();
        let high = self.read_byte();
        usize::from(u16::from_le_bytes([low, high]))
    }

    fn read_u24(&mut self) -> usize {
        let bytes = [self.read_byte(), self.read_byte(), self.read_byte(), 0];
        u32::from_le_bytes(bytes) as usize
    }

    fn read_constant(&mut self, index: usize) -> Value {
        self.frame().function.chunk.constant(index).clone()
    }

    /// Name string behind a constant-pool index; the compiler only emits
    /// string constants for global accesses.
    fn constant_name(&self, index: usize) -> String {
        match self.frame().function.chunk.constant(index).as_ref() {
            Object::Str(s) => s.as_str().to_string(),
            other => other.to_string(),
        }
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.runtime_error(ErrorKind::Recursion, "value stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_else(|| self.nil.clone())
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn bool_value(&self, value: bool) -> Value {
        if value {
            self.true_value.clone()
        } else {
            self.false_value.clone()
        }
    }

    /// Allocate an operation result, reusing singletons for the variants
    /// that have them.
    fn alloc(&mut self, object: Object) -> Value {
        match object {
            Object::Bool(b) => self.bool_value(b),
            Object::Nil => self.nil.clone(),
            Object::Nan => self.nan_value.clone(),
            Object::Inf { negative: false } => self.inf_value.clone(),
            other => self.heap.alloc(other),
        }
    }

    /// Build the exception object, capture the traceback, and unwind.
    fn runtime_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> VmError {
        let message = message.into();
        self.heap.alloc(Object::Exception(Exception {
            name: kind.name().to_string(),
            message: message.clone(),
        }));

        let traceback = self
            .frames
            .iter()
            .map(|frame| TraceEntry {
                line: frame.function.chunk.line(frame.ip.saturating_sub(1)),
                file: self.file.clone(),
            })
            .collect();

        self.frames.clear();
        self.stack.clear();

        VmError {
            kind,
            message,
            traceback,
        }
    }

    // Dispatch

    fn run(&mut self) -> Result<(), VmError> {
        loop {
            if self.interrupt.swap(false, Ordering::Relaxed) {
                return Err(self.runtime_error(ErrorKind::Interrupted, "execution interrupted"));
            }

            if tracing::event_enabled!(tracing::Level::TRACE) {
                let frame = self.frame();
                let mut text = String::new();
                japl_core::debug::disassemble_instruction(&frame.function.chunk, frame.ip, &mut text);
                tracing::trace!(target: "japl::vm", "{}", text.trim_end());
            }

            let byte = self.read_byte();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(byte) => {
                    return Err(self.runtime_error(
                        ErrorKind::Type,
                        format!("unknown opcode {:#04x}", byte),
                    ));
                }
            };

            match op {
                OpCode::Constant => {
                    let index = usize::from(self.read_byte());
                    let value = self.read_constant(index);
                    self.push(value)?;
                }
                OpCode::ConstantLong => {
                    let index = self.read_u24();
                    let value = self.read_constant(index);
                    self.push(value)?;
                }
                OpCode::True => {
                    let value = self.true_value.clone();
                    self.push(value)?;
                }
                OpCode::False => {
                    let value = self.false_value.clone();
                    self.push(value)?;
                }
                OpCode::Nil => {
                    let value = self.nil.clone();
                    self.push(value)?;
                }
                OpCode::Inf => {
                    let value = self.inf_value.clone();
                    self.push(value)?;
                }
                OpCode::Nan => {
                    let value = self.nan_value.clone();
                    self.push(value)?;
                }
                OpCode::Pop => {
                    let value = self.pop();
                    if self.frames.len() == 1 {
                        self.last_pop = value;
                    }
                }
                OpCode::GetLocal => {
                    let slot = usize::from(self.read_byte());
                    let index = self.frame().base + slot;
                    let value = self.stack[index].clone();
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = usize::from(self.read_byte());
                    let index = self.frame().base + slot;
                    self.stack[index] = self.peek(0).clone();
                }
                OpCode::GetGlobal => {
                    let index = usize::from(self.read_byte());
                    self.get_global(index)?;
                }
                OpCode::GetGlobalLong => {
                    let index = self.read_u24();
                    self.get_global(index)?;
                }
                OpCode::SetGlobal => {
                    let index = usize::from(self.read_byte());
                    self.set_global(index)?;
                }
                OpCode::SetGlobalLong => {
                    let index = self.read_u24();
                    self.set_global(index)?;
                }
                OpCode::DefineGlobal => {
                    let index = usize::from(self.read_byte());
                    self.define_global(index);
                }
                OpCode::DefineGlobalLong => {
                    let index = self.read_u24();
                    self.define_global(index);
                }
                OpCode::DelGlobal => {
                    let index = usize::from(self.read_byte());
                    self.del_global(index)?;
                }
                OpCode::DelGlobalLong => {
                    let index = self.read_u24();
                    self.del_global(index)?;
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    let value = self.bool_value(a.equals(&b));
                    self.push(value)?;
                }
                OpCode::NotEqual => {
                    let b = self.pop();
                    let a = self.pop();
                    let value = self.bool_value(!a.equals(&b));
                    self.push(value)?;
                }
                OpCode::Less => {
                    self.compare_op("<", |ordering| {
                        matches!(ordering, Some(std::cmp::Ordering::Less))
                    })?;
                }
                OpCode::LessEqual => {
                    self.compare_op("<=", |ordering| {
                        matches!(
                            ordering,
                            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                        )
                    })?;
                }
                OpCode::Greater => {
                    self.compare_op(">", |ordering| {
                        matches!(ordering, Some(std::cmp::Ordering::Greater))
                    })?;
                }
                OpCode::GreaterEqual => {
                    self.compare_op(">=", |ordering| {
                        matches!(
                            ordering,
                            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                        )
                    })?;
                }
                OpCode::Add => self.binary_op("+", Object::add)?,
                OpCode::Subtract => self.binary_op("-", Object::sub)?,
                OpCode::Multiply => self.binary_op("*", Object::mul)?,
                OpCode::Divide => self.binary_op("/", Object::div)?,
                OpCode::Modulo => self.binary_op("%", Object::rem)?,
                OpCode::Power => self.binary_op("**", Object::pow)?,
                OpCode::And => self.binary_op("and", Object::and)?,
                OpCode::Or => self.binary_op("or", Object::or)?,
                OpCode::Xor => self.binary_op("^", Object::xor)?,
                OpCode::ShiftLeft => self.binary_op("<<", Object::shl)?,
                OpCode::ShiftRight => self.binary_op(">>", Object::shr)?,
                OpCode::Not => {
                    let value = self.pop();
                    let negated = self.bool_value(value.is_falsey());
                    self.push(negated)?;
                }
                OpCode::Negate => {
                    let value = self.pop();
                    match value.negate() {
                        Ok(object) => {
                            let result = self.alloc(object);
                            self.push(result)?;
                        }
                        Err(_) => {
                            return Err(self.runtime_error(
                                ErrorKind::Type,
                                format!(
                                    "unsupported operand type for unary '-': '{}'",
                                    value.type_name()
                                ),
                            ));
                        }
                    }
                }
                OpCode::Jump => {
                    let offset = self.read_u16();
                    self.frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    self.frame_mut().ip -= offset;
                }
                OpCode::LoopLong => {
                    let offset = self.read_u24();
                    self.frame_mut().ip -= offset;
                }
                OpCode::Call => {
                    let arg_count = usize::from(self.read_byte());
                    self.call_value(arg_count)?;
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self
                        .frames
                        .pop()
                        .expect("frame stack is never empty while running");
                    if self.frames.is_empty() {
                        // Top-level return: discard the script function.
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.base);
                    self.push(result)?;
                }
                OpCode::Print => {
                    let value = self.pop();
                    let _ = writeln!(self.out, "{}", value);
                }
            }
        }
    }

    // Opcode helpers

    fn get_global(&mut self, index: usize) -> Result<(), VmError> {
        let name = self.constant_name(index);
        match self.globals.get(&name) {
            Some(value) => {
                let value = value.clone();
                self.push(value)
            }
            None => Err(self.runtime_error(
                ErrorKind::Reference,
                format!("undefined name '{}'", name),
            )),
        }
    }

    /// Assignment is an expression: the value stays on the stack.
    fn set_global(&mut self, index: usize) -> Result<(), VmError> {
        let name = self.constant_name(index);
        if !self.globals.contains_key(&name) {
            return Err(self.runtime_error(
                ErrorKind::Reference,
                format!("undefined name '{}'", name),
            ));
        }
        let value = self.peek(0).clone();
        self.globals.insert(name, value);
        Ok(())
    }

    fn define_global(&mut self, index: usize) {
        let name = self.constant_name(index);
        let value = self.pop();
        self.globals.insert(name, value);
    }

    fn del_global(&mut self, index: usize) -> Result<(), VmError> {
        let name = self.constant_name(index);
        if self.globals.remove(&name).is_none() {
            return Err(self.runtime_error(
                ErrorKind::Reference,
                format!("undefined name '{}'", name),
            ));
        }
        Ok(())
    }

    fn binary_op(&mut self, symbol: &str, op: fn(&Object, &Object) -> OpResult) -> Result<(), VmError> {
        let b = self.pop();
        let a = self.pop();
        match op(&a, &b) {
            Ok(object) => {
                let value = self.alloc(object);
                self.push(value)
            }
            Err(OpError::Unsupported) => Err(self.runtime_error(
                ErrorKind::Type,
                format!(
                    "unsupported operand type(s) for '{}': '{}' and '{}'",
                    symbol,
                    a.type_name(),
                    b.type_name()
                ),
            )),
            Err(OpError::DivisionByZero) => {
                Err(self.runtime_error(ErrorKind::Type, "division by zero"))
            }
            Err(OpError::Overflow) => Err(self.runtime_error(
                ErrorKind::Overflow,
                format!("integer overflow in '{}'", symbol),
            )),
        }
    }

    fn compare_op(
        &mut self,
        symbol: &str,
        accept: fn(Option<std::cmp::Ordering>) -> bool,
    ) -> Result<(), VmError> {
        let b = self.pop();
        let a = self.pop();
        match a.numeric_cmp(&b) {
            Ok(ordering) => {
                let value = self.bool_value(accept(ordering));
                self.push(value)
            }
            Err(_) => Err(self.runtime_error(
                ErrorKind::Type,
                format!(
                    "unsupported operand type(s) for '{}': '{}' and '{}'",
                    symbol,
                    a.type_name(),
                    b.type_name()
                ),
            )),
        }
    }

    fn call_value(&mut self, arg_count: usize) -> Result<(), VmError> {
        let callee = self.peek(arg_count).clone();
        match callee.as_ref() {
            Object::Function(function) => self.call(function.clone(), arg_count),
            other => Err(self.runtime_error(
                ErrorKind::Type,
                format!("object of type '{}' is not callable", other.type_name()),
            )),
        }
    }

    fn call(&mut self, function: Rc<Function>, arg_count: usize) -> Result<(), VmError> {
        let arity = usize::from(function.arity);
        let required = function.required_arity();
        if arg_count < required || arg_count > arity {
            let expectation = if function.defaults.is_empty() {
                format!("{}", arity)
            } else {
                format!("{} to {}", required, arity)
            };
            let name = function.name.as_deref().unwrap_or("<anonymous>").to_string();
            return Err(self.runtime_error(
                ErrorKind::Type,
                format!(
                    "function '{}' takes {} argument(s), got {}",
                    name, expectation, arg_count
                ),
            ));
        }

        // Omitted trailing parameters take their declared defaults.
        for index in arg_count..arity {
            let default = function.defaults[index - required].clone();
            self.push(default)?;
        }

        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error(
                ErrorKind::Recursion,
                "maximum recursion depth exceeded",
            ));
        }

        let base = self.stack.len() - arity - 1;
        self.frames.push(CallFrame {
            function,
            ip: 0,
            base,
        });
        Ok(())
    }
}
