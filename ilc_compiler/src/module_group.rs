//! Which modules a compilation covers.
//!
//! ```text
//!   compilation modules  ⊆  version bubble
//!
//!   cross-module inlineable: modules outside the bubble whose bodies may be
//!   inlined once their tokens are re-expressed in the manifest module
//! ```

use ilc_types::{MethodHandle, ModuleId, TypeHandle, TypeSystemContext};
use rustc_hash::FxHashSet;

/// Module sets of one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompilationModuleGroup {
    compilation_modules: FxHashSet<ModuleId>,
    version_bubble: FxHashSet<ModuleId>,
    cross_module_inlineable: FxHashSet<ModuleId>,
}

impl CompilationModuleGroup {
    /// Group compiling `modules`, whose version bubble is exactly those modules.
    pub fn new(modules: impl IntoIterator<Item = ModuleId>) -> Self {
        let compilation_modules: FxHashSet<ModuleId> = modules.into_iter().collect();
        Self {
            version_bubble: compilation_modules.clone(),
            compilation_modules,
            cross_module_inlineable: FxHashSet::default(),
        }
    }

    /// Extend the version bubble with modules that are not compiled.
    #[must_use]
    pub fn with_version_bubble(mut self, modules: impl IntoIterator<Item = ModuleId>) -> Self {
        self.version_bubble.extend(modules);
        self
    }

    /// Allow inlining from `modules`.
    #[must_use]
    pub fn with_cross_module_inlining(mut self, modules: impl IntoIterator<Item = ModuleId>) -> Self {
        self.cross_module_inlineable.extend(modules);
        self
    }

    pub fn is_compilation_module(&self, module: ModuleId) -> bool {
        self.compilation_modules.contains(&module)
    }

    pub fn versions_with_module(&self, module: ModuleId) -> bool {
        self.version_bubble.contains(&module)
    }

    /// Whether `method` is compiled as part of this group.
    pub fn contains_method(&self, ctx: &TypeSystemContext, method: &MethodHandle) -> bool {
        definition_module(ctx, method).is_some_and(|m| self.is_compilation_module(m))
    }

    /// Whether the body of `method` is versioned together with this compilation.
    pub fn versions_with_method_body(&self, ctx: &TypeSystemContext, method: &MethodHandle) -> bool {
        definition_module(ctx, method).is_some_and(|m| self.versions_with_module(m))
    }

    /// Whether `ty` and all its type arguments are inside the version bubble.
    pub fn versions_with_type(&self, ty: &TypeHandle) -> bool {
        match ty.module() {
            Some(module) if !self.versions_with_module(module) => false,
            _ => ty.instantiation().iter().all(|arg| self.versions_with_type(arg)),
        }
    }

    /// Whether the body of `method` may be inlined across the bubble boundary.
    pub fn cross_module_inlineable(&self, ctx: &TypeSystemContext, method: &MethodHandle) -> bool {
        definition_module(ctx, method).is_some_and(|m| self.cross_module_inlineable.contains(&m))
    }

    /// Compilation modules in id order.
    pub fn compilation_modules(&self) -> Vec<ModuleId> {
        let mut modules: Vec<ModuleId> = self.compilation_modules.iter().copied().collect();
        modules.sort_unstable();
        modules
    }
}

/// Module of the authored definition behind `method`.
fn definition_module(ctx: &TypeSystemContext, method: &MethodHandle) -> Option<ModuleId> {
    let typical = method.typical_method_definition(ctx);
    match typical.wrapped_method() {
        Some(wrapped) => definition_module(ctx, wrapped),
        None => typical.module(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilc_types::{MethodDefinition, MethodSignature, SignatureFlags, TypeDefinition, WellKnownType};

    #[test]
    fn test_bubble_and_inlining() {
        let ctx = TypeSystemContext::default();
        let app = ctx.define_module("App");
        let lib = ctx.define_module("Lib");
        let other = ctx.define_module("Other");
        let group = CompilationModuleGroup::new([app])
            .with_version_bubble([lib])
            .with_cross_module_inlining([other]);

        let void = ctx.get_well_known_type(WellKnownType::Void);
        let helper_ty = ctx.define_type(TypeDefinition::new(other, "Other", "Helpers"));
        let helper = ctx.define_method(MethodDefinition::new(
            &helper_ty,
            "Help",
            MethodSignature::new(SignatureFlags::STATIC, 0, void, &[]),
        ));

        assert!(group.is_compilation_module(app));
        assert!(!group.is_compilation_module(lib));
        assert!(group.versions_with_module(lib));
        assert!(!group.versions_with_method_body(&ctx, &helper));
        assert!(group.cross_module_inlineable(&ctx, &helper));
        assert!(!group.contains_method(&ctx, &helper));
        assert_eq!(group.compilation_modules(), vec![app]);
    }

    #[test]
    fn test_versions_with_type_checks_arguments() {
        let ctx = TypeSystemContext::default();
        let app = ctx.define_module("App");
        let other = ctx.define_module("Other");
        let group = CompilationModuleGroup::new([app]);

        let list = ctx.define_type(TypeDefinition::new(app, "App", "List`1").generic(1));
        let foreign = ctx.define_type(TypeDefinition::new(other, "Other", "Thing"));
        let local = ctx.define_type(TypeDefinition::new(app, "App", "Thing"));
        let list_of_foreign = ctx.get_instantiated_type(&list, vec![foreign].into());
        let list_of_local = ctx.get_instantiated_type(&list, vec![local].into());

        assert!(!group.versions_with_type(&list_of_foreign));
        assert!(group.versions_with_type(&list_of_local));
    }
}
