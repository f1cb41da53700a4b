//! Continuation layout types.
//!
//! When an async method suspends, its live state is spilled into a
//! heap-allocated continuation object. Codegen describes the spill area with
//! a [`GcPointerMap`]; the type system turns that map into a synthesized
//! type whose size and GC layout come entirely from the map.
//!
//! These types have no authored metadata. They are sealed, explicitly laid
//! out, declare no members or interfaces, carry no custom attributes and
//! never have a finalizer, so the generic metadata queries on them are all
//! trivially answered.
//!
//! # Caching
//!
//! ```text
//!   (pointer map, scope) ──► FindOrCreateTable ──► TypeHandle
//!                                   │
//!                                   └──► valid types set
//! ```
//!
//! Identical maps in the same scope always yield the same instance. The
//! scope is either the owning method or its module, chosen once per context
//! by [`ContinuationScopePolicy`](crate::ContinuationScopePolicy).

use crate::context::TypeSystemContext;
use crate::method::MethodHandle;
use crate::module::ModuleId;
use crate::pointer_map::GcPointerMap;
use crate::table::FindOrCreateTable;
use crate::types::{TypeHandle, TypeKind};
use std::sync::Arc;

/// Cache partition of a continuation layout type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContinuationScope {
    Method(MethodHandle),
    Module(ModuleId),
}

impl ContinuationScope {
    /// Owning method, if the scope is per-method.
    pub fn owning_method(&self) -> Option<&MethodHandle> {
        match self {
            ContinuationScope::Method(method) => Some(method),
            ContinuationScope::Module(_) => None,
        }
    }
}

/// A compiler-synthesized continuation storage type.
#[derive(Debug)]
pub struct AsyncContinuationType {
    base_type: TypeHandle,
    pointer_map: GcPointerMap,
    scope: ContinuationScope,
    pointer_size: usize,
    name: Arc<str>,
}

impl AsyncContinuationType {
    /// Diagnostic name, `ContinuationType_<map> for <scope>`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layout description.
    #[inline]
    pub fn pointer_map(&self) -> &GcPointerMap {
        &self.pointer_map
    }

    /// Cache partition this type was created in.
    #[inline]
    pub fn scope(&self) -> &ContinuationScope {
        &self.scope
    }

    /// Base type (the core library `Continuation` class when present).
    #[inline]
    pub fn base_type(&self) -> &TypeHandle {
        &self.base_type
    }

    /// Instance data size in bytes, excluding the base type's fields.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.pointer_map.size() * self.pointer_size
    }

    /// Byte offsets of GC references within the data area.
    pub fn gc_offsets(&self) -> Vec<usize> {
        self.pointer_map
            .set_cells()
            .map(|cell| cell * self.pointer_size)
            .collect()
    }

    /// Whether any cell holds a GC reference.
    #[inline]
    pub fn contains_gc_pointers(&self) -> bool {
        !self.pointer_map.is_empty()
    }
}

/// Find-or-create cache of continuation layout types.
#[derive(Debug, Default)]
pub struct ContinuationTypeRegistry {
    types: FindOrCreateTable<(GcPointerMap, ContinuationScope), TypeHandle>,
}

impl ContinuationTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unique continuation type for `(pointer_map, scope)`.
    pub fn get_or_create(
        &self,
        ctx: &TypeSystemContext,
        pointer_map: &GcPointerMap,
        scope: ContinuationScope,
    ) -> TypeHandle {
        self.types
            .get_or_create_with((pointer_map.clone(), scope), |(map, scope)| {
                let ty = TypeHandle::new(TypeKind::Continuation(AsyncContinuationType {
                    base_type: ctx.continuation_base_type(),
                    pointer_map: map.clone(),
                    scope: scope.clone(),
                    pointer_size: ctx.config().pointer_size,
                    name: diagnostic_name(ctx, map, scope),
                }));
                ctx.register_valid_type(&ty);
                tracing::trace!(name = ty.name(), "created continuation type");
                ty
            })
    }

    /// Number of types constructed.
    pub fn created_count(&self) -> u64 {
        self.types.created_count()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All types created so far, in no particular order.
    pub fn all(&self) -> Vec<TypeHandle> {
        self.types.values()
    }
}

/// `ContinuationType_<map> for <owner>`, so types that share a map stay
/// distinguishable in dumps.
fn diagnostic_name(ctx: &TypeSystemContext, map: &GcPointerMap, scope: &ContinuationScope) -> Arc<str> {
    let owner = match scope {
        ContinuationScope::Method(method) => method.display_name(),
        ContinuationScope::Module(id) => ctx
            .module(*id)
            .map_or_else(|| id.to_string(), |module| module.name().to_string()),
    };
    format!("ContinuationType_{} for {}", map, owner).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContinuationScopePolicy, TypeSystemConfig};
    use crate::context::{MethodDefinition, TypeDefinition};
    use crate::corelib::install_async_library;
    use crate::signature::{MethodSignature, SignatureFlags};
    use crate::types::{TypeAttributes, WellKnownType};

    fn two_methods(ctx: &TypeSystemContext) -> (MethodHandle, MethodHandle) {
        let app = ctx.define_module("App");
        let ty = ctx.define_type(TypeDefinition::new(app, "App", "Worker"));
        let void = ctx.get_well_known_type(WellKnownType::Void);
        let sig = MethodSignature::new(SignatureFlags::STATIC, 0, void, &[]);
        let a = ctx.define_method(MethodDefinition::new(&ty, "A", sig.clone()));
        let b = ctx.define_method(MethodDefinition::new(&ty, "B", sig));
        (a, b)
    }

    #[test]
    fn test_same_map_same_scope_is_identical() {
        let ctx = TypeSystemContext::default();
        let (a, _) = two_methods(&ctx);
        let map = GcPointerMap::from_cells(&[true, false, true]);

        let first = ctx.get_continuation_type(&map, &a);
        let second = ctx.get_continuation_type(&GcPointerMap::from_cells(&[true, false, true]), &a);
        assert_eq!(first, second);
        assert_eq!(ctx.continuation_types().created_count(), 1);
    }

    #[test]
    fn test_different_method_scopes_are_distinct() {
        let ctx = TypeSystemContext::default();
        let (a, b) = two_methods(&ctx);
        let map = GcPointerMap::from_cells(&[true]);

        let in_a = ctx.get_continuation_type(&map, &a);
        let in_b = ctx.get_continuation_type(&map, &b);
        assert_ne!(in_a, in_b);
        assert_eq!(in_a.name(), "ContinuationType_1 for App.Worker.A");
        assert_eq!(in_b.name(), "ContinuationType_1 for App.Worker.B");
    }

    #[test]
    fn test_module_scope_shares_across_methods() {
        let ctx = TypeSystemContext::new(TypeSystemConfig {
            continuation_scope: ContinuationScopePolicy::PerModule,
            ..Default::default()
        });
        let (a, b) = two_methods(&ctx);
        let map = GcPointerMap::from_cells(&[false, true]);

        let in_a = ctx.get_continuation_type(&map, &a);
        let in_b = ctx.get_continuation_type(&map, &b);
        assert_eq!(in_a, in_b);
        assert_eq!(in_a.name(), "ContinuationType_01 for App");
        assert_eq!(
            in_a.as_continuation().map(|ct| ct.scope().clone()),
            Some(ContinuationScope::Module(ModuleId(1)))
        );
    }

    #[test]
    fn test_layout_and_metadata_queries() {
        let ctx = TypeSystemContext::default();
        let lib = install_async_library(&ctx);
        let (a, _) = two_methods(&ctx);
        let ty = ctx.get_continuation_type(&GcPointerMap::from_cells(&[true, false, true, true]), &a);
        let ct = ty.as_continuation().unwrap();

        assert_eq!(ty.name(), "ContinuationType_1011 for App.Worker.A");
        assert_eq!(ct.data_size(), 32);
        assert_eq!(ct.gc_offsets(), vec![0, 16, 24]);
        assert!(ty.is_sealed());
        assert!(!ty.is_abstract());
        assert!(!ty.has_finalizer());
        assert!(ty.attributes().contains(TypeAttributes::EXPLICIT_LAYOUT));
        assert!(ty.interfaces().is_empty());
        assert!(ty.custom_attributes().is_empty());
        assert_eq!(ty.base_type(), Some(lib.continuation));
        assert!(ctx.is_compiler_synthesized_type(&ty));
    }

    #[test]
    fn test_empty_map_is_accepted() {
        let ctx = TypeSystemContext::new(TypeSystemConfig::target_32bit());
        let (a, _) = two_methods(&ctx);
        let ty = ctx.get_continuation_type(&GcPointerMap::empty(), &a);
        let ct = ty.as_continuation().unwrap();
        assert_eq!(ty.name(), "ContinuationType_ for App.Worker.A");
        assert_eq!(ct.data_size(), 0);
        assert!(!ct.contains_gc_pointers());
        // No core library Continuation type: falls back to Object
        assert_eq!(ty.base_type(), Some(ctx.get_well_known_type(WellKnownType::Object)));
    }
}
