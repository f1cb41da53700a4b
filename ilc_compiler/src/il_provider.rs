//! Method bodies as seen by code generation.
//!
//! The provider decides, per method, whether codegen sees an authored body,
//! a synthesized stub, or a body rewritten into the manifest module:
//!
//! ```text
//!   method kind                      body
//!   ─────────────────────────────    ─────────────────────────────────────
//!   authored, runtime-async          task-returning thunk → async variant
//!   authored                         manifest-wrapped body, else authored
//!   async variant                    authored body of the async method
//!   task-returning wrapper           task-returning thunk → wrapped method
//!   resumption stub                  resumption stub
//!   generic projection               typical body, instantiated
//! ```
//!
//! Building happens in two phases. [`ILProviderBuilder`] is the
//! single-threaded phase that creates cross-module inlineable tokens; its
//! [`freeze`](ILProviderBuilder::freeze) seals the manifest and yields the
//! [`ILProvider`] that worker threads share.

use crate::error::{CompileError, CompileResult};
use crate::module_group::CompilationModuleGroup;
use crate::mutable_module::MutableModule;
use crate::stubs::{emit_resumption_stub, emit_task_returning_thunk};
use ilc_il::MethodIL;
use ilc_types::{FindOrCreateTable, MethodHandle, MethodKind, TypeSystemContext};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

// =============================================================================
// Authored Bodies
// =============================================================================

/// Source of authored method bodies.
pub trait MethodBodySource: Send + Sync {
    /// The authored body of `method`, an `Ecma` definition.
    fn method_il(&self, method: &MethodHandle) -> Option<MethodIL>;
}

/// In-memory authored bodies keyed by owning method.
#[derive(Debug, Default)]
pub struct AuthoredBodies {
    bodies: RwLock<FxHashMap<MethodHandle, MethodIL>>,
}

impl AuthoredBodies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `il` as the body of its owning method, replacing any previous one.
    pub fn insert(&self, il: MethodIL) {
        self.bodies.write().insert(il.owning_method().clone(), il);
    }

    pub fn len(&self) -> usize {
        self.bodies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.read().is_empty()
    }
}

impl MethodBodySource for AuthoredBodies {
    fn method_il(&self, method: &MethodHandle) -> Option<MethodIL> {
        self.bodies.read().get(method).cloned()
    }
}

// =============================================================================
// Token Creation Phase
// =============================================================================

/// Single-threaded phase that rewrites bodies for cross-module inlining.
pub struct ILProviderBuilder<'ctx> {
    ctx: &'ctx TypeSystemContext,
    group: Arc<CompilationModuleGroup>,
    manifest: Arc<MutableModule>,
    bodies: Arc<dyn MethodBodySource>,
    /// Manifest-wrapped bodies; `None` records a method that cannot be wrapped.
    wrapped: FxHashMap<MethodHandle, Option<MethodIL>>,
    version: u32,
}

impl<'ctx> ILProviderBuilder<'ctx> {
    pub fn new(
        ctx: &'ctx TypeSystemContext,
        group: Arc<CompilationModuleGroup>,
        bodies: Arc<dyn MethodBodySource>,
    ) -> Self {
        Self {
            ctx,
            manifest: Arc::new(MutableModule::new(group.clone())),
            group,
            bodies,
            wrapped: FxHashMap::default(),
            version: 0,
        }
    }

    /// Whether `method` is inlineable across the bubble and still lacks manifest tokens.
    pub fn needs_cross_module_inlineable_tokens(&self, method: &MethodHandle) -> bool {
        !self.group.versions_with_method_body(self.ctx, method)
            && self.group.cross_module_inlineable(self.ctx, method)
            && !self.wrapped.contains_key(method)
    }

    /// Rewrite the body of `method` into the manifest module.
    ///
    /// If the body cannot be expressed in the manifest, the method is
    /// recorded as having no IL and will not be inlined.
    ///
    /// # Panics
    ///
    /// Panics if `method` is not an authored method outside the version
    /// bubble that may be inlined.
    pub fn create_cross_module_inlineable_tokens(&mut self, method: &MethodHandle) {
        assert!(method.as_ecma().is_some(), "{} is not an authored method", method);
        assert!(
            !self.group.versions_with_method_body(self.ctx, method)
                && self.group.cross_module_inlineable(self.ctx, method),
            "{} is not cross-module inlineable",
            method
        );

        let wrapped = self
            .bodies
            .method_il(method)
            .and_then(|il| self.manifest.wrap_method_il(&il));
        if wrapped.is_none() {
            tracing::debug!(method = %method, "body cannot be expressed in the manifest module");
        }
        self.wrapped.insert(method.clone(), wrapped);
        self.version += 1;
    }

    /// Incremented each time the set of wrapped bodies changes.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn manifest(&self) -> &Arc<MutableModule> {
        &self.manifest
    }

    /// End the token creation phase.
    pub fn freeze(self) -> ILProvider<'ctx> {
        self.manifest.seal();
        tracing::info!(
            wrapped = self.wrapped.len(),
            manifest_tokens = self.manifest.len(),
            version = self.version,
            "cross-module token phase complete"
        );
        ILProvider {
            ctx: self.ctx,
            group: self.group,
            manifest: self.manifest,
            bodies: self.bodies,
            wrapped: self.wrapped,
            version: self.version,
            cache: FindOrCreateTable::new(),
        }
    }
}

// =============================================================================
// IL Provider
// =============================================================================

/// Thread-safe method body provider.
pub struct ILProvider<'ctx> {
    ctx: &'ctx TypeSystemContext,
    group: Arc<CompilationModuleGroup>,
    manifest: Arc<MutableModule>,
    bodies: Arc<dyn MethodBodySource>,
    wrapped: FxHashMap<MethodHandle, Option<MethodIL>>,
    version: u32,
    cache: FindOrCreateTable<MethodHandle, Option<MethodIL>>,
}

impl<'ctx> ILProvider<'ctx> {
    /// The body codegen should compile for `method`, if it has one.
    ///
    /// Bodies are cached; concurrent first requests may each build a body,
    /// and all of them observe the first one stored.
    pub fn get_method_il(&self, method: &MethodHandle) -> CompileResult<Option<MethodIL>> {
        if let Some(cached) = self.cache.get(method) {
            return Ok(cached);
        }
        let il = self.create_method_il(method)?;
        Ok(self.cache.insert_if_absent(method.clone(), il))
    }

    fn create_method_il(&self, method: &MethodHandle) -> CompileResult<Option<MethodIL>> {
        let ctx = self.ctx;
        match method.kind() {
            MethodKind::Ecma(_) if method.is_async() => {
                let variant = ctx.get_async_variant(method);
                Ok(Some(emit_task_returning_thunk(ctx, method, &variant)?))
            }
            MethodKind::Ecma(_) => Ok(self.authored_il(method)),
            MethodKind::AsyncVariant(_) => {
                let Some(wrapped) = method.wrapped_method() else {
                    return Ok(None);
                };
                if !wrapped.is_async() {
                    return Ok(None);
                }
                Ok(self.authored_il(wrapped).map(|il| il.with_owning_method(method)))
            }
            MethodKind::TaskReturningWrapper(_) => match method.wrapped_method() {
                Some(callee) => Ok(Some(emit_task_returning_thunk(ctx, method, callee)?)),
                None => Ok(None),
            },
            MethodKind::ResumptionStub(_) => Ok(Some(emit_resumption_stub(ctx, method)?)),
            MethodKind::OnInstantiatedType(_) | MethodKind::Instantiated(_) => {
                let typical = method.typical_method_definition(ctx);
                let Some(definition_il) = self.get_method_il(&typical)? else {
                    return Ok(None);
                };
                definition_il
                    .instantiate(ctx, method)
                    .map(Some)
                    .map_err(|error| CompileError::InvalidIL {
                        method: method.display_name(),
                        error,
                    })
            }
        }
    }

    /// Manifest-wrapped body if one was created, else the authored body.
    fn authored_il(&self, method: &MethodHandle) -> Option<MethodIL> {
        match self.wrapped.get(method) {
            Some(wrapped) => wrapped.clone(),
            None => self.bodies.method_il(method),
        }
    }

    /// Whether `method` has a manifest-wrapped body.
    pub fn has_wrapped_il(&self, method: &MethodHandle) -> bool {
        matches!(self.wrapped.get(method), Some(Some(_)))
    }

    #[inline]
    pub fn ctx(&self) -> &'ctx TypeSystemContext {
        self.ctx
    }

    pub fn group(&self) -> &CompilationModuleGroup {
        &self.group
    }

    pub fn manifest(&self) -> &MutableModule {
        &self.manifest
    }

    /// Version of the wrapped body set this provider was frozen at.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of methods whose body has been requested.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}
