//! Executable models of the async stubs.
//!
//! The emitted IL is run through the interpreter against hosts that model
//! the core library: task factories record how the task ended, the
//! execution store counts `Push`/`Pop`, and `AsyncCallContinuation`
//! reports whether the last async call suspended.
//!
//! [`reference_thunk`] is the same protocol written directly in Rust, with
//! the store scope as a drop guard. Both produce a [`ThunkRun`] so the two
//! can be compared exit path by exit path:
//!
//! ```text
//!                    ┌──────────► Finished  (callee completed)
//!   Running ─ call ──┼──────────► Suspended (continuation produced)
//!                    └──────────► Faulted   (callee threw)
//! ```

use ilc_il::{CallOutcome, ExecutionHost, InterpError, Interpreter, MethodIL, Outcome, Value};
use ilc_types::{MethodHandle, TypeHandle, TypeSystemContext};
use std::cell::RefCell;

/// Object id of the exception thrown by a [`CalleeBehavior::Throw`] callee.
pub const EXCEPTION_OBJECT: u64 = 0xE;
/// Object id of the continuation produced by a suspending callee.
pub const CONTINUATION_OBJECT: u64 = 0xC;
/// Object id of the task a thunk returns.
pub const TASK_OBJECT: u64 = 0x7;
/// Pointer a resumption stub stores its result through.
pub const RESULT_SLOT: u64 = 0x1000;

// =============================================================================
// Protocol
// =============================================================================

/// State of a task-returning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThunkState {
    Running,
    Suspended,
    Finished,
    Faulted,
}

/// What the async-callable callee does when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeBehavior {
    /// Return normally, with a result for non-void callees.
    Complete(Option<i64>),
    /// Produce a continuation.
    Suspend,
    /// Throw [`EXCEPTION_OBJECT`].
    Throw,
}

/// Observable step of the task-returning protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThunkEvent {
    Push,
    CallCallee,
    QueryContinuation,
    /// `FromResult` or `get_CompletedTask`.
    Complete,
    /// `{Task,ValueTask}FromException`.
    Fault,
    /// `Finalize{Task,ValueTask}ReturningThunk`.
    Finalize,
    Pop,
}

impl ThunkEvent {
    /// Event for a call to a library member named `name`.
    fn of_library_member(name: &str) -> Option<Self> {
        match name {
            "Push" => Some(Self::Push),
            "Pop" => Some(Self::Pop),
            "AsyncCallContinuation" => Some(Self::QueryContinuation),
            "FromResult" | "get_CompletedTask" => Some(Self::Complete),
            "TaskFromException" | "ValueTaskFromException" => Some(Self::Fault),
            "FinalizeTaskReturningThunk" | "FinalizeValueTaskReturningThunk" => Some(Self::Finalize),
            _ => None,
        }
    }
}

/// Result of one run of a task-returning thunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ThunkRun {
    pub state: ThunkState,
    /// Task result when finished, exception when faulted.
    pub value: Option<Value>,
    pub events: Vec<ThunkEvent>,
}

impl ThunkRun {
    pub fn push_count(&self) -> usize {
        self.count(ThunkEvent::Push)
    }

    pub fn pop_count(&self) -> usize {
        self.count(ThunkEvent::Pop)
    }

    fn count(&self, event: ThunkEvent) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }
}

// =============================================================================
// Task-Returning Thunk
// =============================================================================

/// How the modeled task ended.
#[derive(Debug, Clone, PartialEq)]
enum TaskState {
    Completed(Option<Value>),
    Faulted(Value),
    Pending,
}

struct ThunkHost<'a> {
    ctx: &'a TypeSystemContext,
    behavior: CalleeBehavior,
    continuation_pending: bool,
    task: Option<TaskState>,
    events: Vec<ThunkEvent>,
}

impl ThunkHost<'_> {
    fn call_callee(&mut self, callee: &MethodHandle) -> CallOutcome {
        self.events.push(ThunkEvent::CallCallee);
        let returns_value = !callee.signature().returns_void(self.ctx);
        match self.behavior {
            CalleeBehavior::Complete(result) => {
                self.continuation_pending = false;
                CallOutcome::Returned(returns_value.then(|| Value::Int(result.unwrap_or(0))))
            }
            CalleeBehavior::Suspend => {
                self.continuation_pending = true;
                CallOutcome::Returned(returns_value.then_some(Value::Int(0)))
            }
            CalleeBehavior::Throw => CallOutcome::Threw(Value::Object(EXCEPTION_OBJECT)),
        }
    }

    fn finish_task(&mut self, state: TaskState) -> CallOutcome {
        self.task = Some(state);
        CallOutcome::Returned(Some(Value::Object(TASK_OBJECT)))
    }
}

impl ExecutionHost for ThunkHost<'_> {
    fn call(&mut self, method: &MethodHandle, mut args: Vec<Value>) -> Result<CallOutcome, InterpError> {
        if method.is_async_call_conv() {
            return Ok(self.call_callee(method));
        }
        let Some(event) = ThunkEvent::of_library_member(method.name()) else {
            return Err(InterpError::UnexpectedCall {
                method: method.display_name(),
            });
        };
        self.events.push(event);

        Ok(match event {
            ThunkEvent::Push | ThunkEvent::Pop => CallOutcome::Returned(None),
            ThunkEvent::QueryContinuation => {
                let pending = std::mem::take(&mut self.continuation_pending);
                CallOutcome::Returned(Some(if pending {
                    Value::Object(CONTINUATION_OBJECT)
                } else {
                    Value::Null
                }))
            }
            ThunkEvent::Complete => self.finish_task(TaskState::Completed(args.pop())),
            ThunkEvent::Fault => self.finish_task(TaskState::Faulted(args.pop().unwrap_or(Value::Null))),
            ThunkEvent::Finalize => self.finish_task(TaskState::Pending),
            ThunkEvent::CallCallee => unreachable!("callee calls are dispatched by calling convention"),
        })
    }

    fn store_indirect(&mut self, address: &Value, _ty: &TypeHandle, _value: Value) -> Result<(), InterpError> {
        Err(InterpError::TypeMismatch {
            offset: 0,
            expected: "local address",
            found: address.clone(),
        })
    }

    fn exception_matches(&mut self, _exception: &Value, catch_type: &TypeHandle) -> bool {
        catch_type.name() == "Exception"
    }
}

/// Run the emitted body of a task-returning thunk against a callee that
/// behaves as `behavior`.
///
/// `args` are the thunk's arguments, `this` first for instance methods.
pub fn simulate_task_returning_thunk(
    ctx: &TypeSystemContext,
    il: &MethodIL,
    behavior: CalleeBehavior,
    args: Vec<Value>,
) -> Result<ThunkRun, InterpError> {
    let mut host = ThunkHost {
        ctx,
        behavior,
        continuation_pending: false,
        task: None,
        events: Vec::new(),
    };
    let outcome = Interpreter::new().run(il, args, &mut host)?;

    let (state, value) = match (outcome, host.task) {
        (Outcome::Threw(exception), _) => (ThunkState::Faulted, Some(exception)),
        (Outcome::Returned(_), Some(TaskState::Completed(result))) => (ThunkState::Finished, result),
        (Outcome::Returned(_), Some(TaskState::Faulted(exception))) => (ThunkState::Faulted, Some(exception)),
        (Outcome::Returned(_), Some(TaskState::Pending)) => (ThunkState::Suspended, None),
        (Outcome::Returned(_), None) => (ThunkState::Running, None),
    };
    tracing::trace!(method = %il.owning_method(), ?state, "simulated task-returning thunk");

    Ok(ThunkRun {
        state,
        value,
        events: host.events,
    })
}

/// Restores the execution store when dropped.
struct StoreScope<'a> {
    events: &'a RefCell<Vec<ThunkEvent>>,
}

impl<'a> StoreScope<'a> {
    fn enter(events: &'a RefCell<Vec<ThunkEvent>>) -> Self {
        events.borrow_mut().push(ThunkEvent::Push);
        Self { events }
    }
}

impl Drop for StoreScope<'_> {
    fn drop(&mut self) {
        self.events.borrow_mut().push(ThunkEvent::Pop);
    }
}

/// The task-returning protocol for a callee that behaves as `behavior`.
pub fn reference_thunk(behavior: CalleeBehavior) -> ThunkRun {
    let events = RefCell::new(Vec::new());
    let mut state = ThunkState::Running;
    let mut value = None;
    {
        let _scope = StoreScope::enter(&events);
        let record = |event| events.borrow_mut().push(event);

        record(ThunkEvent::CallCallee);
        let returned: Result<Option<i64>, Value> = match behavior {
            CalleeBehavior::Complete(result) => Ok(result),
            CalleeBehavior::Suspend => Ok(None),
            CalleeBehavior::Throw => Err(Value::Object(EXCEPTION_OBJECT)),
        };

        match returned {
            Err(exception) => {
                record(ThunkEvent::Fault);
                state = ThunkState::Faulted;
                value = Some(exception);
            }
            Ok(result) => {
                record(ThunkEvent::QueryContinuation);
                if behavior == CalleeBehavior::Suspend {
                    record(ThunkEvent::Finalize);
                    state = ThunkState::Suspended;
                } else {
                    record(ThunkEvent::Complete);
                    state = ThunkState::Finished;
                    value = result.map(Value::Int);
                }
            }
        }
    }
    ThunkRun {
        state,
        value,
        events: events.into_inner(),
    }
}

// =============================================================================
// Resumption Stub
// =============================================================================

/// Result of one run of a resumption stub.
#[derive(Debug, Clone, PartialEq)]
pub struct StubRun {
    /// Continuation the stub returned, if it returned.
    pub continuation: Option<Value>,
    /// Value stored through the result pointer.
    pub stored_result: Option<Value>,
    /// Exception that escaped the stub.
    pub exception: Option<Value>,
    pub target_calls: usize,
}

struct StubHost {
    target: MethodHandle,
    behavior: CalleeBehavior,
    returns_value: bool,
    continuation_pending: bool,
    stored_result: Option<Value>,
    target_calls: usize,
}

impl ExecutionHost for StubHost {
    fn call(&mut self, method: &MethodHandle, _args: Vec<Value>) -> Result<CallOutcome, InterpError> {
        if *method == self.target {
            self.target_calls += 1;
            return Ok(match self.behavior {
                CalleeBehavior::Complete(result) => {
                    CallOutcome::Returned(self.returns_value.then(|| Value::Int(result.unwrap_or(0))))
                }
                CalleeBehavior::Suspend => {
                    self.continuation_pending = true;
                    CallOutcome::Returned(self.returns_value.then_some(Value::Int(0)))
                }
                CalleeBehavior::Throw => CallOutcome::Threw(Value::Object(EXCEPTION_OBJECT)),
            });
        }
        if method.name() == "AsyncCallContinuation" {
            let pending = std::mem::take(&mut self.continuation_pending);
            return Ok(CallOutcome::Returned(Some(if pending {
                Value::Object(CONTINUATION_OBJECT)
            } else {
                Value::Null
            })));
        }
        Err(InterpError::UnexpectedCall {
            method: method.display_name(),
        })
    }

    fn store_indirect(&mut self, address: &Value, _ty: &TypeHandle, value: Value) -> Result<(), InterpError> {
        match address {
            Value::Pointer(RESULT_SLOT) => {
                self.stored_result = Some(value);
                Ok(())
            }
            other => Err(InterpError::TypeMismatch {
                offset: 0,
                expected: "result pointer",
                found: other.clone(),
            }),
        }
    }

    fn exception_matches(&mut self, _exception: &Value, _catch_type: &TypeHandle) -> bool {
        false
    }
}

/// Run the emitted body of `stub` with a target that behaves as `behavior`.
///
/// The stub receives a null continuation and [`RESULT_SLOT`] as its result
/// pointer.
///
/// # Panics
///
/// Panics if the body's owning method is not a resumption stub.
pub fn simulate_resumption_stub(
    ctx: &TypeSystemContext,
    il: &MethodIL,
    behavior: CalleeBehavior,
) -> Result<StubRun, InterpError> {
    let Some(target) = il.owning_method().wrapped_method() else {
        panic!("{} is not a resumption stub", il.owning_method());
    };
    let mut host = StubHost {
        target: target.clone(),
        behavior,
        returns_value: !target.signature().returns_void(ctx),
        continuation_pending: false,
        stored_result: None,
        target_calls: 0,
    };
    let outcome = Interpreter::new().run(il, vec![Value::Null, Value::Pointer(RESULT_SLOT)], &mut host)?;

    let (continuation, exception) = match outcome {
        Outcome::Returned(value) => (value, None),
        Outcome::Threw(exception) => (None, Some(exception)),
    };
    Ok(StubRun {
        continuation,
        stored_result: host.stored_result,
        exception,
        target_calls: host.target_calls,
    })
}
