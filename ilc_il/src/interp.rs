//! Reference interpreter for synthesized bodies.
//!
//! Executes the instruction subset produced by the stub emitters against an
//! [`ExecutionHost`] that supplies callee behavior, indirect stores and
//! exception typing. It exists to check the control flow of generated
//! bodies: which calls happen in which order, which handlers run and what
//! is finally returned.
//!
//! # Exception dispatch
//!
//! ```text
//!   throw at pc
//!        │
//!        ▼
//!   first catch region (in table order) whose try covers pc
//!   and whose class matches ──────────────┐
//!        │ none                            │ found at index k
//!        ▼                                 ▼
//!   run every finally covering pc     run finallies covering pc
//!   propagate to the caller           listed before k, then enter
//!                                     the handler with [exc] on
//!                                     the stack
//! ```
//!
//! `leave` empties the stack and runs every finally whose try covers the
//! `leave` but not its target, innermost first.

use crate::method_il::{ExceptionRegion, ExceptionRegionKind, MethodIL};
use crate::opcode::ILOpcode;
use crate::reader::{ILReadError, ILReader, Instruction, Operand};
use crate::token::{Token, TokenObject};
use ilc_types::{MethodHandle, TypeHandle};
use std::fmt;
use std::sync::Arc;

/// Default bound on executed instructions per [`Interpreter::run`].
pub const DEFAULT_STEP_LIMIT: u64 = 100_000;

// =============================================================================
// Values
// =============================================================================

/// An evaluation stack or variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    /// Opaque object reference issued by the host.
    Object(u64),
    /// Opaque unmanaged or interior pointer issued by the host.
    Pointer(u64),
    /// Address of a local of the executing frame.
    LocalAddress(u16),
    MethodPointer(MethodHandle),
    Str(Arc<str>),
}

impl Value {
    /// Truthiness used by `brtrue` and `brfalse`.
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Null | Value::Int(0) | Value::Pointer(0))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Object(id) => write!(f, "obj#{}", id),
            Value::Pointer(p) => write!(f, "ptr#{:x}", p),
            Value::LocalAddress(i) => write!(f, "&local{}", i),
            Value::MethodPointer(m) => write!(f, "&{}", m),
            Value::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Result of a call into the host.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Returned(Option<Value>),
    Threw(Value),
}

/// Result of running a body.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Returned(Option<Value>),
    /// An exception escaped the body.
    Threw(Value),
}

// =============================================================================
// Errors
// =============================================================================

/// The body could not be executed.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpError {
    StackUnderflow { offset: u32 },
    TypeMismatch { offset: u32, expected: &'static str, found: Value },
    UnresolvedToken { offset: u32, token: Token },
    UnsupportedOpcode { offset: u32, opcode: ILOpcode },
    InvalidBranchTarget { offset: u32, target: u32 },
    LocalOutOfRange { offset: u32, index: u16 },
    ArgumentOutOfRange { offset: u32, index: u16 },
    /// A non-void callee returned nothing.
    MissingReturnValue { offset: u32, method: String },
    /// `endfinally` outside a finally handler, or `ret` inside one.
    InvalidHandlerExit { offset: u32 },
    FellOffEnd,
    StepLimitExceeded { limit: u64 },
    /// The host does not model `method`.
    UnexpectedCall { method: String },
    Read(ILReadError),
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpError::StackUnderflow { offset } => write!(f, "stack underflow at IL_{:04x}", offset),
            InterpError::TypeMismatch {
                offset,
                expected,
                found,
            } => write!(f, "expected {} at IL_{:04x}, found {}", expected, offset, found),
            InterpError::UnresolvedToken { offset, token } => {
                write!(f, "unresolved token {} at IL_{:04x}", token, offset)
            }
            InterpError::UnsupportedOpcode { offset, opcode } => {
                write!(f, "unsupported opcode {} at IL_{:04x}", opcode, offset)
            }
            InterpError::InvalidBranchTarget { offset, target } => {
                write!(f, "branch at IL_{:04x} targets IL_{:04x} outside the body", offset, target)
            }
            InterpError::LocalOutOfRange { offset, index } => {
                write!(f, "local {} out of range at IL_{:04x}", index, offset)
            }
            InterpError::ArgumentOutOfRange { offset, index } => {
                write!(f, "argument {} out of range at IL_{:04x}", index, offset)
            }
            InterpError::MissingReturnValue { offset, method } => {
                write!(f, "{} returned no value at IL_{:04x}", method, offset)
            }
            InterpError::InvalidHandlerExit { offset } => {
                write!(f, "invalid handler exit at IL_{:04x}", offset)
            }
            InterpError::FellOffEnd => f.write_str("execution fell off the end of the body"),
            InterpError::StepLimitExceeded { limit } => write!(f, "step limit of {} exceeded", limit),
            InterpError::UnexpectedCall { method } => write!(f, "unexpected call to {}", method),
            InterpError::Read(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InterpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterpError::Read(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ILReadError> for InterpError {
    fn from(e: ILReadError) -> Self {
        InterpError::Read(e)
    }
}

// =============================================================================
// Host
// =============================================================================

/// Everything outside the executing frame.
pub trait ExecutionHost {
    /// Perform a call. `args` includes `this` for instance methods.
    fn call(&mut self, method: &MethodHandle, args: Vec<Value>) -> Result<CallOutcome, InterpError>;

    /// Value of a freshly initialized local or `initobj` target.
    fn default_value(&mut self, _ty: &TypeHandle) -> Value {
        Value::Null
    }

    /// `stobj` through an address not belonging to the frame.
    fn store_indirect(&mut self, address: &Value, ty: &TypeHandle, value: Value) -> Result<(), InterpError>;

    /// Whether `exception` is an instance of `catch_type`.
    fn exception_matches(&mut self, exception: &Value, catch_type: &TypeHandle) -> bool;
}

// =============================================================================
// Interpreter
// =============================================================================

struct Frame {
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
    /// Exception of the innermost active catch handler.
    caught: Option<Value>,
    steps: u64,
}

enum Flow {
    Return(Option<Value>),
    Throw(Value),
    EndFinally,
}

/// Executes [`MethodIL`] bodies.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter {
    step_limit: u64,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(step_limit: u64) -> Self {
        Self { step_limit }
    }

    /// Run `il` with `args` until it returns or an exception escapes.
    pub fn run<H: ExecutionHost>(&self, il: &MethodIL, args: Vec<Value>, host: &mut H) -> Result<Outcome, InterpError> {
        let locals = il.locals().iter().map(|ty| host.default_value(ty)).collect();
        let mut frame = Frame {
            args,
            locals,
            stack: Vec::with_capacity(il.max_stack() as usize),
            caught: None,
            steps: 0,
        };
        match self.execute(il, &mut frame, 0, host)? {
            Flow::Return(value) => Ok(Outcome::Returned(value)),
            Flow::Throw(exception) => Ok(Outcome::Threw(exception)),
            Flow::EndFinally => Err(InterpError::InvalidHandlerExit { offset: 0 }),
        }
    }

    fn execute<H: ExecutionHost>(
        &self,
        il: &MethodIL,
        frame: &mut Frame,
        start: u32,
        host: &mut H,
    ) -> Result<Flow, InterpError> {
        let bytes = il.il_bytes();
        let mut pc = start;

        loop {
            if pc as usize >= bytes.len() {
                return Err(InterpError::FellOffEnd);
            }
            frame.steps += 1;
            if frame.steps > self.step_limit {
                return Err(InterpError::StepLimitExceeded { limit: self.step_limit });
            }

            let Some(instruction) = ILReader::at(bytes, pc).next_instruction()? else {
                return Err(InterpError::FellOffEnd);
            };
            let offset = instruction.offset;
            let mut next = instruction.next_offset;

            use ILOpcode::*;
            match instruction.opcode {
                Nop => {}

                Ldarg0 | Ldarg1 | Ldarg2 | Ldarg3 | LdargS | Ldarg => {
                    let index = instruction.var_index().unwrap_or(0);
                    let value = frame
                        .args
                        .get(index as usize)
                        .cloned()
                        .ok_or(InterpError::ArgumentOutOfRange { offset, index })?;
                    frame.stack.push(value);
                }
                Ldloc0 | Ldloc1 | Ldloc2 | Ldloc3 | LdlocS | Ldloc => {
                    let index = instruction.var_index().unwrap_or(0);
                    let value = local(frame, offset, index)?.clone();
                    frame.stack.push(value);
                }
                Stloc0 | Stloc1 | Stloc2 | Stloc3 | StlocS | Stloc => {
                    let index = instruction.var_index().unwrap_or(0);
                    let value = pop(frame, offset)?;
                    *local(frame, offset, index)? = value;
                }
                LdlocaS | Ldloca => {
                    let index = instruction.var_index().unwrap_or(0);
                    local(frame, offset, index)?;
                    frame.stack.push(Value::LocalAddress(index));
                }

                Ldnull => frame.stack.push(Value::Null),
                LdcI4M1 | LdcI4_0 | LdcI4_1 | LdcI4_2 | LdcI4_3 | LdcI4_4 | LdcI4_5 | LdcI4_6 | LdcI4_7
                | LdcI4_8 | LdcI4S | LdcI4 | LdcI8 => {
                    frame.stack.push(Value::Int(instruction.int_constant().unwrap_or(0)));
                }
                Ldstr => match resolve(il, &instruction)? {
                    TokenObject::String(s) => frame.stack.push(Value::Str(s)),
                    other => return Err(token_mismatch(offset, "string token", other)),
                },

                Dup => {
                    let value = frame.stack.last().cloned().ok_or(InterpError::StackUnderflow { offset })?;
                    frame.stack.push(value);
                }
                Pop => {
                    pop(frame, offset)?;
                }
                ConvI | ConvU | Box => {
                    // Representation-preserving in this model
                    let value = pop(frame, offset)?;
                    frame.stack.push(value);
                }
                Add => {
                    let b = pop_int(frame, offset)?;
                    let a = pop_int(frame, offset)?;
                    frame.stack.push(Value::Int(a.wrapping_add(b)));
                }
                Ceq => {
                    let b = pop(frame, offset)?;
                    let a = pop(frame, offset)?;
                    frame.stack.push(Value::Int(i64::from(a == b)));
                }

                Initobj => {
                    let ty = resolve_type(il, &instruction)?;
                    let address = pop(frame, offset)?;
                    let value = host.default_value(&ty);
                    store(frame, host, offset, &address, &ty, value)?;
                }
                Stobj => {
                    let ty = resolve_type(il, &instruction)?;
                    let value = pop(frame, offset)?;
                    let address = pop(frame, offset)?;
                    store(frame, host, offset, &address, &ty, value)?;
                }
                Ldobj => {
                    resolve_type(il, &instruction)?;
                    match pop(frame, offset)? {
                        Value::LocalAddress(index) => {
                            let value = local(frame, offset, index)?.clone();
                            frame.stack.push(value);
                        }
                        other => {
                            return Err(InterpError::TypeMismatch {
                                offset,
                                expected: "local address",
                                found: other,
                            });
                        }
                    }
                }

                Ldftn => match resolve(il, &instruction)? {
                    TokenObject::Method(m) => frame.stack.push(Value::MethodPointer(m)),
                    other => return Err(token_mismatch(offset, "method token", other)),
                },

                Call | Callvirt => {
                    let method = match resolve(il, &instruction)? {
                        TokenObject::Method(m) => m,
                        other => return Err(token_mismatch(offset, "method token", other)),
                    };
                    if let Some(exception) = self.invoke(frame, host, offset, &method)? {
                        match self.dispatch(il, frame, host, offset, exception)? {
                            Some(handler) => next = handler,
                            None => return Ok(Flow::Throw(frame.caught.take().unwrap_or(Value::Null))),
                        }
                    }
                }
                Calli => {
                    // Arguments and result follow the pointer's method, not the signature token
                    match resolve(il, &instruction)? {
                        TokenObject::Signature(_) => {}
                        other => return Err(token_mismatch(offset, "signature token", other)),
                    }
                    let method = match pop(frame, offset)? {
                        Value::MethodPointer(m) => m,
                        other => {
                            return Err(InterpError::TypeMismatch {
                                offset,
                                expected: "method pointer",
                                found: other,
                            });
                        }
                    };
                    if let Some(exception) = self.invoke(frame, host, offset, &method)? {
                        match self.dispatch(il, frame, host, offset, exception)? {
                            Some(handler) => next = handler,
                            None => return Ok(Flow::Throw(frame.caught.take().unwrap_or(Value::Null))),
                        }
                    }
                }

                Br | BrS => next = branch_target(il, &instruction)?,
                Brtrue | BrtrueS | Brfalse | BrfalseS => {
                    let target = branch_target(il, &instruction)?;
                    let condition = pop(frame, offset)?.is_true();
                    let wanted = matches!(instruction.opcode, Brtrue | BrtrueS);
                    if condition == wanted {
                        next = target;
                    }
                }

                Leave | LeaveS => {
                    let target = branch_target(il, &instruction)?;
                    frame.stack.clear();
                    let exited: Vec<ExceptionRegion> = il
                        .exception_regions()
                        .iter()
                        .filter(|r| {
                            r.kind == ExceptionRegionKind::Finally && r.try_contains(offset) && !r.try_contains(target)
                        })
                        .copied()
                        .collect();
                    for region in exited {
                        if let Some(flow) = self.run_finally(il, frame, host, &region)? {
                            return Ok(flow);
                        }
                    }
                    if il
                        .exception_regions()
                        .iter()
                        .any(|r| r.kind == ExceptionRegionKind::Catch && r.handler_contains(offset) && !r.handler_contains(target))
                    {
                        frame.caught = None;
                    }
                    next = target;
                }
                Endfinally => {
                    frame.stack.clear();
                    return Ok(Flow::EndFinally);
                }

                Throw => {
                    let exception = pop(frame, offset)?;
                    match self.dispatch(il, frame, host, offset, exception)? {
                        Some(handler) => next = handler,
                        None => return Ok(Flow::Throw(frame.caught.take().unwrap_or(Value::Null))),
                    }
                }
                Rethrow => {
                    let exception = frame.caught.clone().ok_or(InterpError::InvalidHandlerExit { offset })?;
                    match self.dispatch(il, frame, host, offset, exception)? {
                        Some(handler) => next = handler,
                        None => return Ok(Flow::Throw(frame.caught.take().unwrap_or(Value::Null))),
                    }
                }

                Ret => {
                    if il.exception_regions().iter().any(|r| r.handler_contains(offset) || r.try_contains(offset)) {
                        return Err(InterpError::InvalidHandlerExit { offset });
                    }
                    return Ok(Flow::Return(frame.stack.pop()));
                }

                opcode @ (Ldarga | Ldtoken | Newobj) => {
                    return Err(InterpError::UnsupportedOpcode { offset, opcode });
                }
            }

            pc = next;
        }
    }

    /// Call `method` with arguments popped from the stack.
    ///
    /// Returns the exception if the callee threw.
    fn invoke<H: ExecutionHost>(
        &self,
        frame: &mut Frame,
        host: &mut H,
        offset: u32,
        method: &MethodHandle,
    ) -> Result<Option<Value>, InterpError> {
        let signature = method.signature();
        let count = signature.argument_count();
        if frame.stack.len() < count {
            return Err(InterpError::StackUnderflow { offset });
        }
        let args = frame.stack.split_off(frame.stack.len() - count);

        match host.call(method, args)? {
            CallOutcome::Returned(value) => {
                let returns_void = is_void(signature.return_type());
                match (returns_void, value) {
                    (true, _) => {}
                    (false, Some(value)) => frame.stack.push(value),
                    (false, None) => {
                        return Err(InterpError::MissingReturnValue {
                            offset,
                            method: method.display_name(),
                        });
                    }
                }
                Ok(None)
            }
            CallOutcome::Threw(exception) => Ok(Some(exception)),
        }
    }

    /// Route `exception` thrown at `offset` to a handler.
    ///
    /// Returns the handler offset, or `None` with the exception parked in
    /// `frame.caught` when it escapes the body.
    fn dispatch<H: ExecutionHost>(
        &self,
        il: &MethodIL,
        frame: &mut Frame,
        host: &mut H,
        offset: u32,
        exception: Value,
    ) -> Result<Option<u32>, InterpError> {
        let regions = il.exception_regions();

        let mut catch_index = None;
        for (i, region) in regions.iter().enumerate() {
            if region.kind != ExceptionRegionKind::Catch || !region.try_contains(offset) {
                continue;
            }
            let Some(class_token) = region.class_token else {
                continue;
            };
            let catch_type = match il.get_object(class_token) {
                Some(TokenObject::Type(ty)) => ty,
                _ => {
                    return Err(InterpError::UnresolvedToken {
                        offset: region.handler_offset,
                        token: class_token,
                    });
                }
            };
            if host.exception_matches(&exception, &catch_type) {
                catch_index = Some(i);
                break;
            }
        }

        let unwound = catch_index.unwrap_or(regions.len());
        let finallies: Vec<ExceptionRegion> = regions[..unwound]
            .iter()
            .filter(|r| r.kind == ExceptionRegionKind::Finally && r.try_contains(offset))
            .copied()
            .collect();
        for region in finallies {
            match self.run_finally(il, frame, host, &region)? {
                None => {}
                Some(Flow::Throw(replacement)) => {
                    frame.caught = Some(replacement);
                    return Ok(None);
                }
                Some(_) => return Err(InterpError::InvalidHandlerExit { offset: region.handler_offset }),
            }
        }

        frame.stack.clear();
        match catch_index {
            Some(i) => {
                frame.stack.push(exception.clone());
                frame.caught = Some(exception);
                Ok(Some(regions[i].handler_offset))
            }
            None => {
                frame.caught = Some(exception);
                Ok(None)
            }
        }
    }

    /// Run a finally handler. Returns the flow if it did not end with `endfinally`.
    fn run_finally<H: ExecutionHost>(
        &self,
        il: &MethodIL,
        frame: &mut Frame,
        host: &mut H,
        region: &ExceptionRegion,
    ) -> Result<Option<Flow>, InterpError> {
        let saved_stack = std::mem::take(&mut frame.stack);
        let saved_caught = frame.caught.take();
        let flow = self.execute(il, frame, region.handler_offset, host)?;
        frame.stack = saved_stack;
        match flow {
            Flow::EndFinally => {
                frame.caught = saved_caught;
                Ok(None)
            }
            other => Ok(Some(other)),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn is_void(ty: &TypeHandle) -> bool {
    ty.namespace() == "System" && ty.name() == "Void" && ty.module().is_some_and(|m| m.is_system())
}

fn pop(frame: &mut Frame, offset: u32) -> Result<Value, InterpError> {
    frame.stack.pop().ok_or(InterpError::StackUnderflow { offset })
}

fn pop_int(frame: &mut Frame, offset: u32) -> Result<i64, InterpError> {
    match pop(frame, offset)? {
        Value::Int(v) => Ok(v),
        other => Err(InterpError::TypeMismatch {
            offset,
            expected: "integer",
            found: other,
        }),
    }
}

fn local(frame: &mut Frame, offset: u32, index: u16) -> Result<&mut Value, InterpError> {
    frame
        .locals
        .get_mut(index as usize)
        .ok_or(InterpError::LocalOutOfRange { offset, index })
}

fn store<H: ExecutionHost>(
    frame: &mut Frame,
    host: &mut H,
    offset: u32,
    address: &Value,
    ty: &TypeHandle,
    value: Value,
) -> Result<(), InterpError> {
    match address {
        Value::LocalAddress(index) => {
            *local(frame, offset, *index)? = value;
            Ok(())
        }
        other => host.store_indirect(other, ty, value),
    }
}

fn resolve(il: &MethodIL, instruction: &Instruction) -> Result<TokenObject, InterpError> {
    let Operand::Token(token) = instruction.operand else {
        return Err(InterpError::UnsupportedOpcode {
            offset: instruction.offset,
            opcode: instruction.opcode,
        });
    };
    il.get_object(token).ok_or(InterpError::UnresolvedToken {
        offset: instruction.offset,
        token,
    })
}

fn resolve_type(il: &MethodIL, instruction: &Instruction) -> Result<TypeHandle, InterpError> {
    match resolve(il, instruction)? {
        TokenObject::Type(ty) => Ok(ty),
        other => Err(token_mismatch(instruction.offset, "type token", other)),
    }
}

fn token_mismatch(offset: u32, expected: &'static str, found: TokenObject) -> InterpError {
    InterpError::TypeMismatch {
        offset,
        expected,
        found: Value::Str(found.to_string().into()),
    }
}

fn branch_target(il: &MethodIL, instruction: &Instruction) -> Result<u32, InterpError> {
    let Operand::Target(target) = instruction.operand else {
        return Err(InterpError::UnsupportedOpcode {
            offset: instruction.offset,
            opcode: instruction.opcode,
        });
    };
    if target as usize >= il.il_bytes().len() {
        return Err(InterpError::InvalidBranchTarget {
            offset: instruction.offset,
            target,
        });
    }
    Ok(target)
}
