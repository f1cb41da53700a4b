//! The type-system context.
//!
//! A [`TypeSystemContext`] owns every module, type and method of one
//! compilation together with all memoization tables. It is passed by
//! reference to whichever component needs it and lives as long as the
//! compilation; nothing in this crate is a process-wide singleton.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── TypeSystemContext ─────────────────────────────┐
//! │  modules            RwLock<Vec<ModuleDesc>>                               │
//! │  definitions        RwLock<FxHashMap>   (by name, methods by type)        │
//! │                                                                            │
//! │  interning          instantiated types · byrefs · signature variables     │
//! │                     methods on instantiated types · instantiated methods  │
//! │                                                                            │
//! │  async registries   async variants · task-returning wrappers              │
//! │                     resumption stubs · continuation layout types          │
//! │                                                                            │
//! │  valid types        DashSet of compiler-synthesized types                 │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All lookups take `&self` and are safe to call from any number of threads.

use crate::async_method::{AsyncVariantRegistry, ResumptionStubRegistry, TaskReturningWrapperRegistry};
use crate::config::{ContinuationScopePolicy, TypeSystemConfig};
use crate::continuation::{ContinuationScope, ContinuationTypeRegistry};
use crate::method::{EcmaMethod, InstantiatedMethod, MethodAttributes, MethodForInstantiatedType, MethodHandle, MethodKind};
use crate::module::{ModuleDesc, ModuleId};
use crate::pointer_map::GcPointerMap;
use crate::signature::{Instantiation, MethodSignature};
use crate::table::FindOrCreateTable;
use crate::types::{GenericParameterKind, MetadataType, TypeAttributes, TypeHandle, TypeKind, WellKnownType};
use dashmap::DashSet;
use parking_lot::RwLock;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::sync::Arc;

/// Name of the core library module.
pub const SYSTEM_MODULE_NAME: &str = "System.Private.CoreLib";

// =============================================================================
// Definitions
// =============================================================================

/// Description of a type to define.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub module: ModuleId,
    pub namespace: Arc<str>,
    pub name: Arc<str>,
    pub generic_arity: u32,
    pub attributes: TypeAttributes,
    /// Explicit base type. Defaults to `System.ValueType` for value types
    /// and `System.Object` otherwise.
    pub base_type: Option<TypeHandle>,
    pub custom_attributes: Vec<Arc<str>>,
}

impl TypeDefinition {
    pub fn new(module: ModuleId, namespace: &str, name: &str) -> Self {
        Self {
            module,
            namespace: namespace.into(),
            name: name.into(),
            generic_arity: 0,
            attributes: TypeAttributes::NONE,
            base_type: None,
            custom_attributes: Vec::new(),
        }
    }

    /// Number of type-level generic parameters.
    pub fn generic(mut self, arity: u32) -> Self {
        self.generic_arity = arity;
        self
    }

    pub fn value_type(mut self) -> Self {
        self.attributes = self.attributes | TypeAttributes::VALUE_TYPE | TypeAttributes::SEALED;
        self
    }

    pub fn with_attributes(mut self, attributes: TypeAttributes) -> Self {
        self.attributes = self.attributes | attributes;
        self
    }

    pub fn base(mut self, base_type: &TypeHandle) -> Self {
        self.base_type = Some(base_type.clone());
        self
    }

    pub fn custom_attribute(mut self, name: &str) -> Self {
        self.custom_attributes.push(name.into());
        self
    }
}

/// Description of a method to define.
#[derive(Debug, Clone)]
pub struct MethodDefinition {
    pub owning_type: TypeHandle,
    pub name: Arc<str>,
    pub signature: MethodSignature,
    pub attributes: MethodAttributes,
}

impl MethodDefinition {
    pub fn new(owning_type: &TypeHandle, name: &str, signature: MethodSignature) -> Self {
        Self {
            owning_type: owning_type.clone(),
            name: name.into(),
            signature,
            attributes: MethodAttributes::NONE,
        }
    }

    pub fn with_attributes(mut self, attributes: MethodAttributes) -> Self {
        self.attributes = self.attributes | attributes;
        self
    }

    /// Mark the authored body as compiled with the async calling convention.
    pub fn runtime_async(self) -> Self {
        self.with_attributes(MethodAttributes::ASYNC)
    }
}

// =============================================================================
// Context
// =============================================================================

/// Owner of all type-system entities and caches of one compilation.
pub struct TypeSystemContext {
    config: TypeSystemConfig,

    modules: RwLock<Vec<Arc<ModuleDesc>>>,
    /// Indexed by `WellKnownType` discriminant.
    well_known: Vec<TypeHandle>,
    types_by_name: RwLock<FxHashMap<(ModuleId, String), TypeHandle>>,
    methods_by_type: RwLock<FxHashMap<TypeHandle, Vec<MethodHandle>>>,

    // Interning
    instantiated_types: FindOrCreateTable<(TypeHandle, Instantiation), TypeHandle>,
    byref_types: FindOrCreateTable<TypeHandle, TypeHandle>,
    signature_variables: FindOrCreateTable<(GenericParameterKind, u32), TypeHandle>,
    methods_for_instantiated_type: FindOrCreateTable<(MethodHandle, TypeHandle), MethodHandle>,
    instantiated_methods: FindOrCreateTable<(MethodHandle, Instantiation), MethodHandle>,

    // Async registries
    async_variants: AsyncVariantRegistry,
    task_wrappers: TaskReturningWrapperRegistry,
    resumption_stubs: ResumptionStubRegistry,
    continuation_types: ContinuationTypeRegistry,

    valid_types: DashSet<TypeHandle, FxBuildHasher>,
}

fn qualified_key(namespace: &str, name: &str) -> String {
    format!("{}\u{0}{}", namespace, name)
}

impl TypeSystemContext {
    /// Create a context with the core library module and its well-known types.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    pub fn new(config: TypeSystemConfig) -> Self {
        if let Err(err) = config.validate() {
            panic!("invalid type system configuration: {}", err);
        }

        let mut ctx = Self {
            config,
            modules: RwLock::new(vec![Arc::new(ModuleDesc::new(ModuleId::SYSTEM, SYSTEM_MODULE_NAME))]),
            well_known: Vec::with_capacity(WellKnownType::COUNT),
            types_by_name: RwLock::new(FxHashMap::default()),
            methods_by_type: RwLock::new(FxHashMap::default()),
            instantiated_types: FindOrCreateTable::new(),
            byref_types: FindOrCreateTable::new(),
            signature_variables: FindOrCreateTable::new(),
            methods_for_instantiated_type: FindOrCreateTable::new(),
            instantiated_methods: FindOrCreateTable::new(),
            async_variants: AsyncVariantRegistry::new(),
            task_wrappers: TaskReturningWrapperRegistry::new(),
            resumption_stubs: ResumptionStubRegistry::new(),
            continuation_types: ContinuationTypeRegistry::new(),
            valid_types: DashSet::with_hasher(FxBuildHasher),
        };

        for wk in WellKnownType::ALL {
            let mut def = TypeDefinition::new(ModuleId::SYSTEM, "System", wk.name());
            if wk.is_value_type() {
                def = def.value_type();
            }
            match wk {
                WellKnownType::String => def = def.with_attributes(TypeAttributes::SEALED),
                WellKnownType::ValueType => def = def.with_attributes(TypeAttributes::ABSTRACT),
                _ => {}
            }
            let ty = ctx.define_type(def);
            ctx.well_known.push(ty);
        }

        ctx
    }

    /// Configuration this context was created with.
    #[inline]
    pub fn config(&self) -> &TypeSystemConfig {
        &self.config
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Add a module.
    pub fn define_module(&self, name: &str) -> ModuleId {
        let mut modules = self.modules.write();
        let id = ModuleId(modules.len() as u32);
        modules.push(Arc::new(ModuleDesc::new(id, name)));
        tracing::debug!(module = name, id = id.raw(), "defined module");
        id
    }

    /// Look up a module.
    pub fn module(&self, id: ModuleId) -> Option<Arc<ModuleDesc>> {
        self.modules.read().get(id.0 as usize).cloned()
    }

    /// All modules, in definition order.
    pub fn modules(&self) -> Vec<Arc<ModuleDesc>> {
        self.modules.read().clone()
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    /// Define a type.
    ///
    /// # Panics
    ///
    /// Panics if the module is unknown or the name is already taken.
    pub fn define_type(&self, def: TypeDefinition) -> TypeHandle {
        let module = self
            .module(def.module)
            .unwrap_or_else(|| panic!("type {}.{} defined in unknown {}", def.namespace, def.name, def.module));

        let base_type = def.base_type.clone().or_else(|| {
            let base = if def.attributes.contains(TypeAttributes::VALUE_TYPE) {
                WellKnownType::ValueType
            } else {
                WellKnownType::Object
            };
            self.well_known.get(base as usize).cloned()
        });

        let key = (def.module, qualified_key(&def.namespace, &def.name));
        let mut types = self.types_by_name.write();
        assert!(
            !types.contains_key(&key),
            "type {}.{} defined twice in {}",
            def.namespace,
            def.name,
            def.module
        );

        let ty = TypeHandle::new(TypeKind::Metadata(MetadataType {
            module: def.module,
            row: module.allocate_type_row(),
            namespace: def.namespace,
            name: def.name,
            generic_arity: def.generic_arity,
            attributes: def.attributes,
            base_type,
            custom_attributes: def.custom_attributes,
        }));
        types.insert(key, ty.clone());
        ty
    }

    /// Define a method on a type definition.
    pub fn define_method(&self, def: MethodDefinition) -> MethodHandle {
        let Some(md) = def.owning_type.as_metadata() else {
            panic!("methods can only be defined on type definitions, got {}", def.owning_type);
        };
        let module = self
            .module(md.module)
            .unwrap_or_else(|| panic!("owning type {} has unknown {}", def.owning_type, md.module));

        let method = MethodHandle::new(MethodKind::Ecma(EcmaMethod {
            owning_type: def.owning_type.clone(),
            name: def.name,
            signature: def.signature,
            attributes: def.attributes,
            row: module.allocate_method_row(),
        }));
        self.methods_by_type
            .write()
            .entry(def.owning_type)
            .or_default()
            .push(method.clone());
        method
    }

    /// Core library type by kind.
    #[inline]
    pub fn get_well_known_type(&self, wk: WellKnownType) -> TypeHandle {
        self.well_known[wk as usize].clone()
    }

    /// Type definition by exact namespace and name.
    pub fn get_known_type(&self, module: ModuleId, namespace: &str, name: &str) -> Option<TypeHandle> {
        self.types_by_name
            .read()
            .get(&(module, qualified_key(namespace, name)))
            .cloned()
    }

    /// Methods declared on the definition of `ty`, in definition order.
    pub fn methods_of(&self, ty: &TypeHandle) -> Vec<MethodHandle> {
        self.methods_by_type
            .read()
            .get(&ty.type_definition())
            .cloned()
            .unwrap_or_default()
    }

    /// First method of `ty` named `name`.
    pub fn get_known_method(&self, ty: &TypeHandle, name: &str) -> Option<MethodHandle> {
        self.methods_of(ty).into_iter().find(|m| m.name() == name)
    }

    /// First method of `ty` named `name` that is (or is not) generic.
    pub fn find_method(&self, ty: &TypeHandle, name: &str, generic: bool) -> Option<MethodHandle> {
        self.methods_of(ty)
            .into_iter()
            .find(|m| m.name() == name && (m.signature().generic_parameter_count() > 0) == generic)
    }

    // =========================================================================
    // Interning
    // =========================================================================

    /// Interned generic instantiation of a type definition.
    pub fn get_instantiated_type(&self, definition: &TypeHandle, instantiation: Instantiation) -> TypeHandle {
        let arity = definition.as_metadata().map(|md| md.generic_arity as usize);
        assert_eq!(
            arity,
            Some(instantiation.len()),
            "wrong number of type arguments for {}",
            definition
        );
        self.instantiated_types
            .get_or_create_with((definition.clone(), instantiation), |(definition, instantiation)| {
                TypeHandle::new(TypeKind::Instantiated {
                    definition: definition.clone(),
                    instantiation: instantiation.clone(),
                })
            })
    }

    /// Interned `T&`.
    pub fn get_byref_type(&self, element: &TypeHandle) -> TypeHandle {
        self.byref_types
            .get_or_create_with(element.clone(), |element| TypeHandle::new(TypeKind::ByRef(element.clone())))
    }

    /// Interned `!index` or `!!index`.
    pub fn get_signature_variable(&self, kind: GenericParameterKind, index: u32) -> TypeHandle {
        self.signature_variables
            .get_or_create_with((kind, index), |&(kind, index)| {
                TypeHandle::new(TypeKind::SignatureVariable { kind, index })
            })
    }

    /// Interned view of a typical method definition through an instantiated owning type.
    pub fn get_method_for_instantiated_type(&self, typical: &MethodHandle, owning_type: &TypeHandle) -> MethodHandle {
        assert!(
            owning_type.has_instantiation() && owning_type.type_definition() == typical.owning_type(),
            "{} is not an instantiation of the owner of {}",
            owning_type,
            typical
        );
        self.methods_for_instantiated_type
            .get_or_create_with((typical.clone(), owning_type.clone()), |(typical, owning_type)| {
                let signature = typical.signature().instantiate(self, owning_type.instantiation(), &[]);
                MethodHandle::new(MethodKind::OnInstantiatedType(MethodForInstantiatedType {
                    typical: typical.clone(),
                    owning_type: owning_type.clone(),
                    signature,
                }))
            })
    }

    /// Interned generic method instantiation.
    pub fn get_instantiated_method(&self, method_def: &MethodHandle, instantiation: Instantiation) -> MethodHandle {
        assert!(
            !method_def.has_instantiation()
                && method_def.signature().generic_parameter_count() as usize == instantiation.len(),
            "wrong number of method type arguments for {}",
            method_def
        );
        self.instantiated_methods
            .get_or_create_with((method_def.clone(), instantiation), |(method_def, instantiation)| {
                let owning_type = method_def.owning_type();
                let signature = method_def
                    .signature()
                    .instantiate(self, owning_type.instantiation(), instantiation);
                MethodHandle::new(MethodKind::Instantiated(InstantiatedMethod {
                    method_def: method_def.clone(),
                    instantiation: instantiation.clone(),
                    signature,
                }))
            })
    }

    // =========================================================================
    // Async
    // =========================================================================

    /// The async calling-convention variant of a task-returning method.
    ///
    /// The variant is memoized per typical definition; generic projections
    /// are re-applied on top of it, owning type first, then method arguments.
    ///
    /// # Panics
    ///
    /// Panics if `method` does not return a task-like type.
    pub fn get_async_variant(&self, method: &MethodHandle) -> MethodHandle {
        assert!(
            method.is_task_returning(),
            "{} does not return Task or ValueTask",
            method
        );
        let definition = method.typical_method_definition(self);
        let mut result = self.async_variants.get_or_create(self, &definition);

        if definition != *method {
            let owning_type = method.owning_type();
            if owning_type.has_instantiation() {
                result = self.get_method_for_instantiated_type(&result, &owning_type);
            }
            if method.has_instantiation() {
                result = self.get_instantiated_method(&result, Instantiation::from_slice(method.instantiation()));
            }
        }

        result
    }

    /// The task-returning wrapper of an async-callable method.
    pub fn get_task_returning_wrapper(&self, async_method: &MethodHandle) -> MethodHandle {
        self.task_wrappers.get_or_create(self, async_method)
    }

    /// The resumption stub of an async-callable method.
    pub fn get_resumption_stub(&self, async_method: &MethodHandle) -> MethodHandle {
        self.resumption_stubs.get_or_create(self, async_method)
    }

    /// The continuation layout type for `pointer_map` in the scope of `owning_method`.
    ///
    /// The scope is the method itself or its module, per
    /// [`TypeSystemConfig::continuation_scope`].
    pub fn get_continuation_type(&self, pointer_map: &GcPointerMap, owning_method: &MethodHandle) -> TypeHandle {
        let scope = match self.config.continuation_scope {
            ContinuationScopePolicy::PerMethod => ContinuationScope::Method(owning_method.clone()),
            ContinuationScopePolicy::PerModule => {
                ContinuationScope::Module(owning_method.module().unwrap_or(ModuleId::SYSTEM))
            }
        };
        self.get_continuation_type_in_scope(pointer_map, scope)
    }

    /// The continuation layout type for an explicit scope.
    pub fn get_continuation_type_in_scope(&self, pointer_map: &GcPointerMap, scope: ContinuationScope) -> TypeHandle {
        self.continuation_types.get_or_create(self, pointer_map, scope)
    }

    /// Base type of continuation layout types.
    pub(crate) fn continuation_base_type(&self) -> TypeHandle {
        self.get_known_type(ModuleId::SYSTEM, "System.Runtime.CompilerServices", "Continuation")
            .unwrap_or_else(|| self.get_well_known_type(WellKnownType::Object))
    }

    pub(crate) fn register_valid_type(&self, ty: &TypeHandle) {
        self.valid_types.insert(ty.clone());
    }

    /// Whether `ty` is legitimate compiler-synthesized output of this context.
    pub fn is_compiler_synthesized_type(&self, ty: &TypeHandle) -> bool {
        self.valid_types.contains(ty)
    }

    pub fn async_variants(&self) -> &AsyncVariantRegistry {
        &self.async_variants
    }

    pub fn task_wrappers(&self) -> &TaskReturningWrapperRegistry {
        &self.task_wrappers
    }

    pub fn resumption_stubs(&self) -> &ResumptionStubRegistry {
        &self.resumption_stubs
    }

    pub fn continuation_types(&self) -> &ContinuationTypeRegistry {
        &self.continuation_types
    }
}

impl Default for TypeSystemContext {
    fn default() -> Self {
        Self::new(TypeSystemConfig::default())
    }
}

impl std::fmt::Debug for TypeSystemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeSystemContext")
            .field("config", &self.config)
            .field("modules", &self.modules.read().len())
            .field("async_variants", &self.async_variants.len())
            .field("continuation_types", &self.continuation_types.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corelib::install_async_library;
    use crate::signature::SignatureFlags;
    use crate::types::CanonicalFormKind;

    /// `class Box<T> { Task<T> Get(); ValueTask<U> Map<U>(T) }`
    fn generic_fixture() -> (TypeSystemContext, TypeHandle, MethodHandle, MethodHandle) {
        let ctx = TypeSystemContext::default();
        let lib = install_async_library(&ctx);
        let app = ctx.define_module("App");
        let boxed = ctx.define_type(TypeDefinition::new(app, "App", "Box`1").generic(1));
        let t0 = ctx.get_signature_variable(GenericParameterKind::Type, 0);
        let m0 = ctx.get_signature_variable(GenericParameterKind::Method, 0);
        let task_of_t = ctx.get_instantiated_type(&lib.task_of_t, Instantiation::from_slice(&[t0.clone()]));
        let value_task_of_u = ctx.get_instantiated_type(&lib.value_task_of_t, Instantiation::from_slice(&[m0]));

        let get = ctx.define_method(MethodDefinition::new(
            &boxed,
            "Get",
            MethodSignature::new(SignatureFlags::NONE, 0, task_of_t, &[]),
        ));
        let map = ctx.define_method(MethodDefinition::new(
            &boxed,
            "Map",
            MethodSignature::new(SignatureFlags::NONE, 1, value_task_of_u, &[t0]),
        ));
        (ctx, boxed, get, map)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Definitions
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_define_and_lookup() {
        let (ctx, boxed, get, map) = generic_fixture();
        assert_eq!(ctx.get_known_type(ModuleId(1), "App", "Box`1"), Some(boxed.clone()));
        assert_eq!(ctx.get_known_type(ModuleId(1), "App", "Missing"), None);
        assert_eq!(ctx.methods_of(&boxed), vec![get.clone(), map.clone()]);
        assert_eq!(ctx.find_method(&boxed, "Map", true), Some(map));
        assert_eq!(ctx.find_method(&boxed, "Map", false), None);
        assert_eq!(ctx.get_known_method(&boxed, "Get"), Some(get));
    }

    #[test]
    #[should_panic(expected = "defined twice")]
    fn test_duplicate_type_is_rejected() {
        let ctx = TypeSystemContext::default();
        ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, "System", "Object"));
    }

    #[test]
    fn test_default_base_types() {
        let ctx = TypeSystemContext::default();
        let value = ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, "App", "Point").value_type());
        let class = ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, "App", "Node"));
        assert_eq!(value.base_type(), Some(ctx.get_well_known_type(WellKnownType::ValueType)));
        assert_eq!(class.base_type(), Some(ctx.get_well_known_type(WellKnownType::Object)));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Generic projections of async variants
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_async_variant_on_instantiated_type() {
        let (ctx, boxed, get, _) = generic_fixture();
        let string = ctx.get_well_known_type(WellKnownType::String);
        let box_of_string = ctx.get_instantiated_type(&boxed, Instantiation::from_slice(&[string.clone()]));
        let get_on_string = ctx.get_method_for_instantiated_type(&get, &box_of_string);

        let variant = ctx.get_async_variant(&get_on_string);
        assert_eq!(variant.owning_type(), box_of_string);
        assert_eq!(variant.signature().return_type(), &string);
        assert!(variant.is_async_call_conv());
        assert_eq!(variant.typical_method_definition(&ctx), ctx.get_async_variant(&get));
    }

    #[test]
    fn test_async_variant_owning_type_before_method_args() {
        let (ctx, boxed, _, map) = generic_fixture();
        let string = ctx.get_well_known_type(WellKnownType::String);
        let int64 = ctx.get_well_known_type(WellKnownType::Int64);
        let box_of_string = ctx.get_instantiated_type(&boxed, Instantiation::from_slice(&[string.clone()]));
        let map_on_string = ctx.get_method_for_instantiated_type(&map, &box_of_string);
        let map_string_int64 = ctx.get_instantiated_method(&map_on_string, Instantiation::from_slice(&[int64.clone()]));

        let variant = ctx.get_async_variant(&map_string_int64);
        assert_eq!(variant.signature().return_type(), &int64);
        assert_eq!(variant.signature().parameters(), &[string]);
        assert_eq!(variant.owning_type(), box_of_string);
        assert_eq!(variant.instantiation(), &[int64]);

        // Definition of the variant == variant of the definition
        assert_eq!(
            variant.method_definition(&ctx),
            ctx.get_async_variant(&map_string_int64.method_definition(&ctx))
        );
        // Round trip back to the task-returning method
        assert_eq!(variant.async_other_variant(&ctx), Some(map_string_int64));
        assert_eq!(ctx.async_variants().created_count(), 1);
    }

    #[test]
    fn test_async_variant_canonical_form() {
        let (ctx, boxed, get, _) = generic_fixture();
        let string = ctx.get_well_known_type(WellKnownType::String);
        let canon = ctx.get_well_known_type(WellKnownType::Canon);
        let box_of_string = ctx.get_instantiated_type(&boxed, Instantiation::from_slice(&[string]));
        let box_of_canon = ctx.get_instantiated_type(&boxed, Instantiation::from_slice(&[canon]));

        let variant = ctx.get_async_variant(&ctx.get_method_for_instantiated_type(&get, &box_of_string));
        let shared = variant.canonical_form(&ctx, CanonicalFormKind::Specific);
        assert_eq!(
            shared,
            ctx.get_async_variant(&ctx.get_method_for_instantiated_type(&get, &box_of_canon))
        );
        // Already canonical: unchanged
        assert_eq!(shared.canonical_form(&ctx, CanonicalFormKind::Specific), shared);
    }
}
