//! Task-returning thunk bodies.
//!
//! Adapts an async-callable method to the task-returning calling convention:
//!
//! ```text
//!        ldloca store; call Push
//!   ┌─ try ───────────────────────────────────────────────────────────┐
//!   │ ┌─ try ─────────────────────────────────────────────┐           │
//!   │ │  ldarg this/args; call <async callee>             │           │
//!   │ │  [stloc result]                                   │           │
//!   │ │  call AsyncCallContinuation; brfalse finished     │           │
//!   │ │  leave suspended ─────────────────────────────────┼──┐        │
//!   │ │ finished:                                         │  │        │
//!   │ │  FromResult<T>(result) | get_CompletedTask()      │  │        │
//!   │ │  stloc ret; leave return ─────────────────────────┼──┼──┐     │
//!   │ └─ catch Exception ─────────────────────────────────┤  │  │     │
//!   │    FromException[<T>](ex); stloc ret; leave return ─┼──┼──┤     │
//!   │ └───────────────────────────────────────────────────┘  │  │     │
//!   │ suspended: ◄───────────────────────────────────────────┘  │     │
//!   │    Finalize…ReturningThunk[<T>](); stloc ret; leave return┤     │
//!   └─ finally ─────────────────────────────────────────────────┼─────┤
//!        ldloca store; call Pop; endfinally                     │     │
//!   └───────────────────────────────────────────────────────────┼─────┘
//!   return: ◄───────────────────────────────────────────────────┘
//!        ldloc ret; ret
//! ```
//!
//! The suspended path sits outside the inner try so suspension is never
//! caught, and inside the outer try so every exit pops the store.

use crate::error::StubError;
use crate::well_known::{LibraryType, TaskReturnShape, WellKnownMember};
use ilc_il::{ILEmitter, ILOpcode, MethodIL};
use ilc_types::{MethodHandle, TypeSystemContext, WellKnownType};

/// Emit the body of `thunk`, a task-returning method implemented by calling
/// the async-callable `callee`.
///
/// `thunk` supplies the task-returning signature; `callee` must take the
/// same parameters.
///
/// # Panics
///
/// Panics if `thunk` does not return a task-like type or `callee` is not
/// async-callable.
pub fn emit_task_returning_thunk(
    ctx: &TypeSystemContext,
    thunk: &MethodHandle,
    callee: &MethodHandle,
) -> Result<MethodIL, StubError> {
    let signature = thunk.signature();
    let Some(shape) = TaskReturnShape::of(signature.return_type()) else {
        panic!("{} does not return Task or ValueTask", thunk);
    };
    assert!(callee.is_async_call_conv(), "{} is not async-callable", callee);
    assert_eq!(
        signature.argument_count(),
        callee.signature().argument_count(),
        "{} and {} disagree on arguments",
        thunk,
        callee
    );

    // Resolve everything up front so a missing member leaves nothing half-built
    let result_type = shape.result.as_ref();
    let push = WellKnownMember::ExecutionStorePush.resolve(ctx, thunk)?;
    let pop = WellKnownMember::ExecutionStorePop.resolve(ctx, thunk)?;
    let async_call_continuation = WellKnownMember::AsyncCallContinuation.resolve(ctx, thunk)?;
    let complete = match result_type {
        Some(_) => shape.from_result().resolve_for(ctx, thunk, result_type)?,
        None => shape.completed_task().resolve(ctx, thunk)?,
    };
    let from_exception = shape.from_exception().resolve_for(ctx, thunk, result_type)?;
    let finalize = shape.finalize_thunk().resolve_for(ctx, thunk, result_type)?;
    let store_type = LibraryType::ExecutionAndSyncBlockStore.resolve(ctx, thunk)?;
    let exception = ctx.get_well_known_type(WellKnownType::Exception);

    let mut e = ILEmitter::new(ctx);

    let return_value = e.new_local(signature.return_type());
    let logical_result = result_type.map(|ty| e.new_local(ty));
    let store = e.new_local(&store_type);

    let return_label = e.new_label();
    let suspended = e.new_label();
    let finished = e.new_label();

    e.emit_ldloca(store);
    e.emit_call(ILOpcode::Call, &push);

    let exception_token = e.type_token(&exception);
    let inner = e.new_catch_region(exception_token);
    let outer = e.new_finally_region();

    e.begin_try(outer);
    e.begin_try(inner);
    {
        for index in 0..signature.argument_count() {
            e.emit_ldarg(index as u16);
        }
        e.emit_call(ILOpcode::Call, callee);
        if let Some(local) = logical_result {
            e.emit_stloc(local);
        }

        e.emit_call(ILOpcode::Call, &async_call_continuation);
        e.emit_branch(ILOpcode::Brfalse, finished);
        e.emit_branch(ILOpcode::Leave, suspended);

        e.mark_label(finished);
        if let Some(local) = logical_result {
            e.emit_ldloc(local);
        }
        e.emit_call(ILOpcode::Call, &complete);
        e.emit_stloc(return_value);
        e.emit_branch(ILOpcode::Leave, return_label);
    }
    e.end_try(inner);

    e.begin_handler(inner);
    {
        e.emit_call(ILOpcode::Call, &from_exception);
        e.emit_stloc(return_value);
        e.emit_branch(ILOpcode::Leave, return_label);
    }
    e.end_handler(inner);

    e.mark_label(suspended);
    e.emit_call(ILOpcode::Call, &finalize);
    e.emit_stloc(return_value);
    e.emit_branch(ILOpcode::Leave, return_label);
    e.end_try(outer);

    e.begin_handler(outer);
    {
        e.emit_ldloca(store);
        e.emit_call(ILOpcode::Call, &pop);
        e.emit(ILOpcode::Endfinally);
    }
    e.end_handler(outer);

    e.mark_label(return_label);
    e.emit_ldloc(return_value);
    e.emit(ILOpcode::Ret);

    tracing::debug!(
        thunk = %thunk,
        callee = %callee,
        family = ?shape.family,
        has_result = shape.result.is_some(),
        "emitted task-returning thunk"
    );
    Ok(e.link(thunk))
}
