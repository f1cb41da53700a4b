//! Shared fixture universe for integration tests.

#![allow(dead_code)]

use ilc_compiler::{AuthoredBodies, CompilationModuleGroup};
use ilc_il::{ILEmitter, ILOpcode, MethodIL};
use ilc_types::{
    AsyncLibrary, MethodDefinition, MethodHandle, MethodSignature, ModuleId, SignatureFlags, TypeDefinition,
    TypeHandle, TypeSystemConfig, TypeSystemContext, WellKnownType, install_async_library,
};
use std::sync::Arc;

/// A context with the async library, an `App` module compiled by the tests
/// and a `Lib` module outside the version bubble.
pub struct Universe {
    pub ctx: TypeSystemContext,
    pub library: AsyncLibrary,
    pub app: ModuleId,
    pub lib: ModuleId,
    pub program: TypeHandle,
    pub bodies: Arc<AuthoredBodies>,
}

impl Universe {
    pub fn new() -> Self {
        Self::with_config(TypeSystemConfig::default())
    }

    pub fn with_config(config: TypeSystemConfig) -> Self {
        let ctx = TypeSystemContext::new(config);
        let library = install_async_library(&ctx);
        let app = ctx.define_module("App");
        let lib = ctx.define_module("Lib");
        let program = ctx.define_type(TypeDefinition::new(app, "App", "Program"));
        Self {
            ctx,
            library,
            app,
            lib,
            program,
            bodies: Arc::new(AuthoredBodies::new()),
        }
    }

    pub fn well_known(&self, wk: WellKnownType) -> TypeHandle {
        self.ctx.get_well_known_type(wk)
    }

    pub fn int32(&self) -> TypeHandle {
        self.well_known(WellKnownType::Int32)
    }

    pub fn task_of(&self, result: &TypeHandle) -> TypeHandle {
        self.ctx
            .get_instantiated_type(&self.library.task_of_t, vec![result.clone()].into())
    }

    pub fn value_task_of(&self, result: &TypeHandle) -> TypeHandle {
        self.ctx
            .get_instantiated_type(&self.library.value_task_of_t, vec![result.clone()].into())
    }

    /// Static method on `App.Program`.
    pub fn define_static(&self, name: &str, ret: TypeHandle, params: &[TypeHandle]) -> MethodHandle {
        self.define_on(&self.program, SignatureFlags::STATIC, name, ret, params)
    }

    pub fn define_on(
        &self,
        owner: &TypeHandle,
        flags: SignatureFlags,
        name: &str,
        ret: TypeHandle,
        params: &[TypeHandle],
    ) -> MethodHandle {
        self.ctx
            .define_method(MethodDefinition::new(owner, name, MethodSignature::new(flags, 0, ret, params)))
    }

    /// Static runtime-async method on `App.Program`.
    pub fn define_runtime_async(&self, name: &str, ret: TypeHandle, params: &[TypeHandle]) -> MethodHandle {
        self.ctx.define_method(
            MethodDefinition::new(&self.program, name, MethodSignature::new(SignatureFlags::STATIC, 0, ret, params))
                .runtime_async(),
        )
    }

    /// Register `ldc.i4 value; ret` as the body of `method`.
    pub fn constant_body(&self, method: &MethodHandle, value: i32) -> MethodIL {
        let mut e = ILEmitter::new(&self.ctx);
        e.emit_ldc(value);
        e.emit(ILOpcode::Ret);
        let il = e.link(method);
        self.bodies.insert(il.clone());
        il
    }

    /// Register `call callee; ret` as the body of `method`.
    pub fn forwarding_body(&self, method: &MethodHandle, callee: &MethodHandle) -> MethodIL {
        let mut e = ILEmitter::new(&self.ctx);
        e.emit_call(ILOpcode::Call, callee);
        e.emit(ILOpcode::Ret);
        let il = e.link(method);
        self.bodies.insert(il.clone());
        il
    }

    /// `App` compiled, system module in the bubble, `Lib` inlineable.
    pub fn group(&self) -> CompilationModuleGroup {
        CompilationModuleGroup::new([self.app])
            .with_version_bubble([ModuleId::SYSTEM])
            .with_cross_module_inlining([self.lib])
    }
}
