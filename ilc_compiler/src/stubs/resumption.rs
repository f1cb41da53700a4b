//! Resumption stub bodies.
//!
//! ```text
//!   [ldnull | ldc.i4.0; conv.u]       receiver placeholder, instance targets only
//!   ldloca argN; initobj TN; ldloc argN   for every parameter
//!   ldftn target
//!   calli stub-signature
//!   [stloc result]                    non-void targets
//!   call StubHelpers.AsyncCallContinuation
//!   stloc cont
//!   [ldloc cont; brtrue done          non-void targets
//!    ldarg.1; ldloc result; stobj R
//!   done:]
//!   ldloc cont
//!   ret
//! ```
//!
//! The receiver and arguments are placeholders: the resumed frame restores
//! its own state from the continuation.
//!
//! The `calli` carries the stub's own `(object, ref byte) -> object`
//! signature token. Its stack effect is the target's: the target's
//! arguments are popped and its result, if any, pushed.

use crate::error::StubError;
use crate::well_known::{LibraryType, WellKnownMember};
use ilc_il::{ILEmitter, ILOpcode, MethodIL};
use ilc_types::{MethodHandle, MethodKind, TypeSystemContext};

/// Emit the body of the resumption stub `stub`.
///
/// # Panics
///
/// Panics if `stub` is not a resumption stub.
pub fn emit_resumption_stub(ctx: &TypeSystemContext, stub: &MethodHandle) -> Result<MethodIL, StubError> {
    let MethodKind::ResumptionStub(desc) = stub.kind() else {
        panic!("{} is not a resumption stub", stub);
    };
    let target = desc.target();
    let signature = target.signature();

    let mut e = ILEmitter::new(ctx);

    if !signature.is_static() {
        if target.owning_type().is_value_type() {
            e.emit_ldc(0);
            e.emit(ILOpcode::ConvU);
        } else {
            e.emit(ILOpcode::Ldnull);
        }
    }

    for parameter in signature.parameters() {
        let local = e.new_local(parameter);
        let token = e.type_token(parameter);
        e.emit_ldloca(local);
        e.emit_token(ILOpcode::Initobj, token);
        e.emit_ldloc(local);
    }

    let target_token = e.method_token(target);
    e.emit_token(ILOpcode::Ldftn, target_token);
    let returns_value = !signature.returns_void(ctx);
    e.emit_calli(stub.signature(), signature.argument_count(), returns_value);

    let result = if returns_value {
        let local = e.new_local(signature.return_type());
        e.emit_stloc(local);
        Some(local)
    } else {
        None
    };

    let async_call_continuation = WellKnownMember::AsyncCallContinuation.resolve(ctx, stub)?;
    let continuation_type = LibraryType::Continuation.resolve(ctx, stub)?;
    let continuation = e.new_local(&continuation_type);
    e.emit_call(ILOpcode::Call, &async_call_continuation);
    e.emit_stloc(continuation);

    if let Some(result) = result {
        let done = e.new_label();
        e.emit_ldloc(continuation);
        e.emit_branch(ILOpcode::Brtrue, done);
        e.emit_ldarg(1);
        e.emit_ldloc(result);
        let result_token = e.type_token(signature.return_type());
        e.emit_token(ILOpcode::Stobj, result_token);
        e.mark_label(done);
    }

    e.emit_ldloc(continuation);
    e.emit(ILOpcode::Ret);

    tracing::debug!(stub = %stub, target = %target, "emitted resumption stub");
    Ok(e.link(stub))
}
