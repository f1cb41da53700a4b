//! Async calling-convention method descriptions.
//!
//! A task-returning method `Task<T> Foo()` has an async-callable sibling
//! `T Foo()` marked with [`SignatureFlags::ASYNC_CALL_CONV`]. Conversely an
//! async-callable method can be exposed to ordinary callers through a
//! task-returning wrapper. Both are *delegators*: they wrap another method
//! and forward everything except a small set of overridden operations.
//!
//! | Delegator                    | Wraps                          | Overrides            |
//! |------------------------------|--------------------------------|----------------------|
//! | [`AsyncMethodVariant`]       | typical task-returning method  | `signature`          |
//! | [`TaskReturningAsyncWrapper`]| any async-callable method      | `signature`          |
//!
//! Both also re-enter their registry for every projection (typical
//! definition, method definition, canonical form, signature instantiation)
//! through [`MethodDelegator`]'s default methods.
//!
//! [`SignatureFlags::ASYNC_CALL_CONV`]: crate::signature::SignatureFlags::ASYNC_CALL_CONV

use crate::context::TypeSystemContext;
use crate::method::{MethodAttributes, MethodHandle, MethodKind};
use crate::signature::{MethodSignature, SignatureFlags};
use crate::table::FindOrCreateTable;
use crate::types::{CanonicalFormKind, TypeHandle, WellKnownType};

// =============================================================================
// Delegation
// =============================================================================

/// A method that wraps another and forwards to it by default.
///
/// `this` parameters are the handle of the delegator itself, returned
/// unchanged when a projection of the wrapped method is a no-op.
pub trait MethodDelegator {
    /// The wrapped method.
    fn wrapped(&self) -> &MethodHandle;

    /// Registry lookup producing the delegator for `method`.
    fn rewrap(ctx: &TypeSystemContext, method: &MethodHandle) -> MethodHandle
    where
        Self: Sized;

    fn name(&self) -> &str {
        self.wrapped().name()
    }

    fn owning_type(&self) -> TypeHandle {
        self.wrapped().owning_type()
    }

    fn attributes(&self) -> MethodAttributes {
        self.wrapped().attributes()
    }

    fn signature(&self) -> &MethodSignature {
        self.wrapped().signature()
    }

    /// `this` when `real` is the wrapped method, else the registry's delegator for `real`.
    fn rewrap_if_changed(&self, this: &MethodHandle, ctx: &TypeSystemContext, real: MethodHandle) -> MethodHandle
    where
        Self: Sized,
    {
        if real == *self.wrapped() {
            this.clone()
        } else {
            Self::rewrap(ctx, &real)
        }
    }

    fn typical_method_definition(&self, this: &MethodHandle, ctx: &TypeSystemContext) -> MethodHandle
    where
        Self: Sized,
    {
        let real = self.wrapped().typical_method_definition(ctx);
        self.rewrap_if_changed(this, ctx, real)
    }

    fn method_definition(&self, this: &MethodHandle, ctx: &TypeSystemContext) -> MethodHandle
    where
        Self: Sized,
    {
        let real = self.wrapped().method_definition(ctx);
        self.rewrap_if_changed(this, ctx, real)
    }

    fn canonical_form(&self, this: &MethodHandle, ctx: &TypeSystemContext, kind: CanonicalFormKind) -> MethodHandle
    where
        Self: Sized,
    {
        let real = self.wrapped().canonical_form(ctx, kind);
        self.rewrap_if_changed(this, ctx, real)
    }

    fn instantiate_signature(
        &self,
        this: &MethodHandle,
        ctx: &TypeSystemContext,
        type_instantiation: &[TypeHandle],
        method_instantiation: &[TypeHandle],
    ) -> MethodHandle
    where
        Self: Sized,
    {
        let real = self
            .wrapped()
            .instantiate_signature(ctx, type_instantiation, method_instantiation);
        self.rewrap_if_changed(this, ctx, real)
    }
}

// =============================================================================
// Async Variant
// =============================================================================

/// The async-callable sibling of a task-returning method definition.
#[derive(Debug)]
pub struct AsyncMethodVariant {
    wrapped: MethodHandle,
    signature: MethodSignature,
}

impl AsyncMethodVariant {
    fn new(ctx: &TypeSystemContext, definition: MethodHandle) -> Self {
        assert!(
            matches!(definition.kind(), MethodKind::Ecma(_)),
            "async variants wrap authored definitions, got {}",
            definition
        );
        let signature = definition.signature().create_async_signature(ctx);
        Self {
            wrapped: definition,
            signature,
        }
    }
}

impl MethodDelegator for AsyncMethodVariant {
    fn wrapped(&self) -> &MethodHandle {
        &self.wrapped
    }

    fn rewrap(ctx: &TypeSystemContext, method: &MethodHandle) -> MethodHandle {
        ctx.get_async_variant(method)
    }

    fn signature(&self) -> &MethodSignature {
        &self.signature
    }
}

/// Memoized async variants, keyed by typical task-returning definition.
#[derive(Debug, Default)]
pub struct AsyncVariantRegistry {
    variants: FindOrCreateTable<MethodHandle, MethodHandle>,
}

impl AsyncVariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unique variant of `definition`.
    pub fn get_or_create(&self, ctx: &TypeSystemContext, definition: &MethodHandle) -> MethodHandle {
        self.variants.get_or_create_with(definition.clone(), |def| {
            tracing::trace!(method = %def, "creating async variant");
            MethodHandle::new(MethodKind::AsyncVariant(AsyncMethodVariant::new(ctx, def.clone())))
        })
    }

    /// Number of variants constructed.
    pub fn created_count(&self) -> u64 {
        self.variants.created_count()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

// =============================================================================
// Task-Returning Wrapper
// =============================================================================

/// Task-returning face of an async-callable method.
///
/// Exposes the task-returning signature of the wrapped method's other
/// variant. Its body is a thunk that calls the wrapped method.
#[derive(Debug)]
pub struct TaskReturningAsyncWrapper {
    wrapped: MethodHandle,
    signature: MethodSignature,
}

impl TaskReturningAsyncWrapper {
    fn new(ctx: &TypeSystemContext, wrapped: MethodHandle) -> Self {
        assert!(
            wrapped.is_async_call_conv(),
            "task-returning wrappers wrap async-callable methods, got {}",
            wrapped
        );
        let Some(task_returning) = wrapped.async_other_variant(ctx) else {
            panic!("async method {} has no task-returning counterpart", wrapped);
        };
        Self {
            signature: task_returning.signature().clone(),
            wrapped,
        }
    }
}

impl MethodDelegator for TaskReturningAsyncWrapper {
    fn wrapped(&self) -> &MethodHandle {
        &self.wrapped
    }

    fn rewrap(ctx: &TypeSystemContext, method: &MethodHandle) -> MethodHandle {
        ctx.get_task_returning_wrapper(method)
    }

    fn signature(&self) -> &MethodSignature {
        &self.signature
    }
}

/// Memoized task-returning wrappers, keyed by the wrapped async method.
#[derive(Debug, Default)]
pub struct TaskReturningWrapperRegistry {
    wrappers: FindOrCreateTable<MethodHandle, MethodHandle>,
}

impl TaskReturningWrapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unique wrapper of `async_method`.
    pub fn get_or_create(&self, ctx: &TypeSystemContext, async_method: &MethodHandle) -> MethodHandle {
        self.wrappers.get_or_create_with(async_method.clone(), |m| {
            tracing::trace!(method = %m, "creating task-returning wrapper");
            MethodHandle::new(MethodKind::TaskReturningWrapper(TaskReturningAsyncWrapper::new(
                ctx,
                m.clone(),
            )))
        })
    }

    /// Number of wrappers constructed.
    pub fn created_count(&self) -> u64 {
        self.wrappers.created_count()
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}

// =============================================================================
// Resumption Stub
// =============================================================================

/// Entry point used to resume a suspended async call of `target`.
///
/// Signature: `object (object, byref byte)`. The stub is specialized per
/// target; whether a receiver is pushed is decided when its body is built.
#[derive(Debug)]
pub struct AsyncResumptionStub {
    target: MethodHandle,
    signature: MethodSignature,
}

impl AsyncResumptionStub {
    fn new(ctx: &TypeSystemContext, target: MethodHandle) -> Self {
        assert!(
            target.is_async_call_conv(),
            "resumption stubs target async-callable methods, got {}",
            target
        );
        let object = ctx.get_well_known_type(WellKnownType::Object);
        let byref_byte = ctx.get_byref_type(&ctx.get_well_known_type(WellKnownType::Byte));
        Self {
            target,
            signature: MethodSignature::new(SignatureFlags::STATIC, 0, object.clone(), &[object, byref_byte]),
        }
    }

    /// The async method being resumed.
    #[inline]
    pub fn target(&self) -> &MethodHandle {
        &self.target
    }

    /// The stub's own signature.
    #[inline]
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }
}

/// Memoized resumption stubs, keyed by target.
#[derive(Debug, Default)]
pub struct ResumptionStubRegistry {
    stubs: FindOrCreateTable<MethodHandle, MethodHandle>,
}

impl ResumptionStubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unique resumption stub for `target`.
    pub fn get_or_create(&self, ctx: &TypeSystemContext, target: &MethodHandle) -> MethodHandle {
        self.stubs.get_or_create_with(target.clone(), |t| {
            tracing::trace!(method = %t, "creating resumption stub");
            MethodHandle::new(MethodKind::ResumptionStub(AsyncResumptionStub::new(ctx, t.clone())))
        })
    }

    pub fn created_count(&self) -> u64 {
        self.stubs.created_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MethodDefinition, TypeDefinition};
    use crate::corelib::install_async_library;
    use crate::module::ModuleId;
    use crate::signature::Instantiation;
    use crate::types::GenericParameterKind;

    struct Fixture {
        ctx: TypeSystemContext,
        /// `Task<int> Service.Compute(string)`
        compute: MethodHandle,
        /// `Task Service.Run()`
        run: MethodHandle,
        /// `ValueTask Service.Flush()`
        flush: MethodHandle,
        /// `static ValueTask<T> Service.Echo<T>(T)`
        echo: MethodHandle,
    }

    fn fixture() -> Fixture {
        let ctx = TypeSystemContext::default();
        let lib = install_async_library(&ctx);
        let app = ctx.define_module("App");
        let service = ctx.define_type(TypeDefinition::new(app, "App", "Service"));
        let int32 = ctx.get_well_known_type(WellKnownType::Int32);
        let string = ctx.get_well_known_type(WellKnownType::String);
        let m0 = ctx.get_signature_variable(GenericParameterKind::Method, 0);

        let task_of_int = ctx.get_instantiated_type(&lib.task_of_t, Instantiation::from_slice(&[int32]));
        let value_task_of_m0 = ctx.get_instantiated_type(&lib.value_task_of_t, Instantiation::from_slice(&[m0.clone()]));

        let compute = ctx.define_method(MethodDefinition::new(
            &service,
            "Compute",
            MethodSignature::new(SignatureFlags::NONE, 0, task_of_int, &[string]),
        ));
        let run = ctx.define_method(MethodDefinition::new(
            &service,
            "Run",
            MethodSignature::new(SignatureFlags::NONE, 0, lib.task.clone(), &[]),
        ));
        let flush = ctx.define_method(MethodDefinition::new(
            &service,
            "Flush",
            MethodSignature::new(SignatureFlags::NONE, 0, lib.value_task.clone(), &[]),
        ));
        let echo = ctx.define_method(MethodDefinition::new(
            &service,
            "Echo",
            MethodSignature::new(SignatureFlags::STATIC, 1, value_task_of_m0, &[m0]),
        ));
        Fixture {
            ctx,
            compute,
            run,
            flush,
            echo,
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Async variants
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_variant_signature_of_generic_task() {
        let f = fixture();
        let variant = f.ctx.get_async_variant(&f.compute);
        let sig = variant.signature();
        assert_eq!(sig.return_type(), &f.ctx.get_well_known_type(WellKnownType::Int32));
        assert!(sig.is_async_call_conv());
        assert_eq!(sig.parameters(), f.compute.signature().parameters());
        assert_eq!(variant.name(), "Compute");
        assert_eq!(variant.owning_type(), f.compute.owning_type());
    }

    #[test]
    fn test_variant_of_plain_task_returns_void() {
        let f = fixture();
        let variant = f.ctx.get_async_variant(&f.run);
        assert!(variant.signature().returns_void(&f.ctx));
        assert!(!variant.is_task_returning());
    }

    #[test]
    fn test_variant_of_plain_value_task_returns_void() {
        let f = fixture();
        let variant = f.ctx.get_async_variant(&f.flush);
        let sig = variant.signature();
        assert!(sig.returns_void(&f.ctx));
        assert_eq!(sig.return_type(), &f.ctx.get_well_known_type(WellKnownType::Void));
        assert!(sig.is_async_call_conv());
        assert!(!variant.is_task_returning());
        assert_eq!(variant.async_other_variant(&f.ctx), Some(f.flush.clone()));
    }

    #[test]
    fn test_variant_is_memoized() {
        let f = fixture();
        let a = f.ctx.get_async_variant(&f.compute);
        let b = f.ctx.get_async_variant(&f.compute);
        assert_eq!(a, b);
        assert_eq!(f.ctx.async_variants().created_count(), 1);
    }

    #[test]
    fn test_variant_projections_return_self() {
        let f = fixture();
        let variant = f.ctx.get_async_variant(&f.compute);
        let int32 = f.ctx.get_well_known_type(WellKnownType::Int32);

        assert_eq!(variant.typical_method_definition(&f.ctx), variant);
        assert_eq!(variant.method_definition(&f.ctx), variant);
        assert_eq!(variant.canonical_form(&f.ctx, CanonicalFormKind::Specific), variant);
        assert_eq!(variant.instantiate_signature(&f.ctx, &[int32.clone()], &[int32]), variant);
        assert_eq!(f.ctx.async_variants().created_count(), 1);
    }

    #[test]
    fn test_variant_of_instantiated_method() {
        let f = fixture();
        let string = f.ctx.get_well_known_type(WellKnownType::String);
        let echo_string = f.ctx.get_instantiated_method(&f.echo, Instantiation::from_slice(&[string.clone()]));

        let variant = f.ctx.get_async_variant(&echo_string);
        assert_eq!(variant.signature().return_type(), &string);
        assert!(variant.signature().is_async_call_conv());
        assert_eq!(variant.instantiation(), &[string]);

        // Definition round-trip lands on the memoized variant of the definition
        let definition_variant = f.ctx.get_async_variant(&echo_string.method_definition(&f.ctx));
        assert_eq!(variant.method_definition(&f.ctx), definition_variant);
        assert_eq!(f.ctx.async_variants().created_count(), 1);
    }

    #[test]
    #[should_panic(expected = "does not return Task or ValueTask")]
    fn test_variant_of_non_task_method_is_contract_violation() {
        let f = fixture();
        let variant = f.ctx.get_async_variant(&f.compute);
        let _ = f.ctx.get_async_variant(&variant);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Task-returning wrappers
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_wrapper_round_trip() {
        let f = fixture();
        let variant = f.ctx.get_async_variant(&f.compute);
        let wrapper = f.ctx.get_task_returning_wrapper(&variant);

        assert_eq!(wrapper.wrapped_method(), Some(&variant));
        assert_eq!(wrapper.signature(), f.compute.signature());
        assert_eq!(wrapper.async_other_variant(&f.ctx), Some(variant.clone()));
        assert_eq!(variant.async_other_variant(&f.ctx), Some(f.compute.clone()));
        assert_eq!(f.ctx.get_task_returning_wrapper(&variant), wrapper);
    }

    #[test]
    fn test_wrapper_definition_rewraps() {
        let f = fixture();
        let int32 = f.ctx.get_well_known_type(WellKnownType::Int32);
        let echo_int = f.ctx.get_instantiated_method(&f.echo, Instantiation::from_slice(&[int32]));
        let variant = f.ctx.get_async_variant(&echo_int);
        let wrapper = f.ctx.get_task_returning_wrapper(&variant);

        let definition = wrapper.method_definition(&f.ctx);
        assert_ne!(definition, wrapper);
        assert_eq!(
            definition,
            f.ctx.get_task_returning_wrapper(&variant.method_definition(&f.ctx))
        );
    }

    #[test]
    #[should_panic(expected = "async-callable")]
    fn test_wrapper_of_task_method_is_contract_violation() {
        let f = fixture();
        let _ = f.ctx.get_task_returning_wrapper(&f.compute);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Resumption stubs
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_resumption_stub_signature() {
        let f = fixture();
        let variant = f.ctx.get_async_variant(&f.compute);
        let stub = f.ctx.get_resumption_stub(&variant);
        let sig = stub.signature();
        let object = f.ctx.get_well_known_type(WellKnownType::Object);
        let byte = f.ctx.get_well_known_type(WellKnownType::Byte);

        assert_eq!(sig.return_type(), &object);
        assert_eq!(sig.parameters(), &[object, f.ctx.get_byref_type(&byte)]);
        assert_eq!(stub.wrapped_method(), Some(&variant));
        assert_eq!(f.ctx.get_resumption_stub(&variant), stub);
        assert!(stub.display_name().starts_with("[resume] App.Service.Compute"));
        assert!(stub.module() == Some(ModuleId(1)));
    }
}
