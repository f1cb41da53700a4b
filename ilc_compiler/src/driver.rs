//! Compilation driver.
//!
//! ```text
//!   roots ──► expand ──► sort (comparer order)
//!                          │
//!   phase 1 (one thread)   ▼
//!     cross-module tokens for roots and their direct callees
//!                          │ freeze: manifest sealed
//!   phase 2 (N threads)    ▼
//!     get_method_il for every method, work-stealing by index
//!                          │
//!                          ▼
//!   results in comparer order
//! ```
//!
//! Token creation is the only phase that mutates shared state in an
//! order-dependent way, so it runs alone and in a fixed order. Output does
//! not depend on how phase 2 is scheduled.

use crate::config::CompilerConfig;
use crate::error::CompileResult;
use crate::il_provider::{ILProvider, ILProviderBuilder, MethodBodySource};
use crate::module_group::CompilationModuleGroup;
use ilc_il::{MethodIL, TokenObject};
use ilc_types::{MethodHandle, MethodKind, TypeSystemComparer, TypeSystemContext};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Body produced for one method.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    pub method: MethodHandle,
    /// `None` when the method has no body to compile.
    pub il: Option<MethodIL>,
}

/// Output of [`Compilation::run`].
#[derive(Debug)]
pub struct CompilationOutput {
    /// Every compiled method, in comparer order.
    pub methods: Vec<CompiledMethod>,
    /// Methods whose bodies were rewritten into the manifest module.
    pub cross_module_inlineable: Vec<MethodHandle>,
    pub manifest_tokens: usize,
}

impl CompilationOutput {
    pub fn get(&self, method: &MethodHandle) -> Option<&CompiledMethod> {
        self.methods.iter().find(|compiled| compiled.method == *method)
    }
}

/// One compilation over a fixed set of modules.
pub struct Compilation<'ctx> {
    ctx: &'ctx TypeSystemContext,
    config: CompilerConfig,
    group: Arc<CompilationModuleGroup>,
    bodies: Arc<dyn MethodBodySource>,
}

impl<'ctx> Compilation<'ctx> {
    pub fn new(
        ctx: &'ctx TypeSystemContext,
        config: CompilerConfig,
        group: CompilationModuleGroup,
        bodies: Arc<dyn MethodBodySource>,
    ) -> Self {
        Self {
            ctx,
            config,
            group: Arc::new(group),
            bodies,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `roots` and the async methods they imply.
    ///
    /// A runtime-async root also compiles its async variant and that
    /// variant's resumption stub. Fails with the first error in comparer
    /// order.
    pub fn run(&self, roots: &[MethodHandle]) -> CompileResult<CompilationOutput> {
        let started = Instant::now();
        let comparer = TypeSystemComparer::new();
        let methods = self.expand_roots(roots, &comparer);
        tracing::info!(roots = roots.len(), methods = methods.len(), "compilation started");

        let provider = self.create_tokens(&methods, &comparer);
        let results = self.emit_bodies(&provider, &methods);

        let mut compiled = Vec::with_capacity(methods.len());
        for (method, result) in methods.into_iter().zip(results) {
            match result {
                Ok(il) => compiled.push(CompiledMethod { method, il }),
                Err(error) => {
                    tracing::error!(method = %method, %error, "compilation failed");
                    return Err(error);
                }
            }
        }

        let cross_module_inlineable: Vec<MethodHandle> = compiled
            .iter()
            .filter(|c| provider.has_wrapped_il(&c.method))
            .map(|c| c.method.clone())
            .collect();
        tracing::info!(
            methods = compiled.len(),
            manifest_tokens = provider.manifest().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compilation finished"
        );
        Ok(CompilationOutput {
            methods: compiled,
            cross_module_inlineable,
            manifest_tokens: provider.manifest().len(),
        })
    }

    /// Roots plus implied async methods, deduplicated and sorted.
    fn expand_roots(&self, roots: &[MethodHandle], comparer: &TypeSystemComparer) -> Vec<MethodHandle> {
        let mut seen = FxHashSet::default();
        let mut methods = Vec::new();
        let mut add = |method: MethodHandle| {
            if seen.insert(method.clone()) {
                methods.push(method);
            }
        };

        for root in roots {
            add(root.clone());
            if matches!(root.kind(), MethodKind::Ecma(_)) && root.is_async() {
                let variant = self.ctx.get_async_variant(root);
                add(self.ctx.get_resumption_stub(&variant));
                add(variant);
            }
        }

        comparer.sort_methods(&mut methods);
        methods
    }

    // =========================================================================
    // Phase 1
    // =========================================================================

    fn create_tokens(&self, methods: &[MethodHandle], comparer: &TypeSystemComparer) -> ILProvider<'ctx> {
        let mut builder = ILProviderBuilder::new(self.ctx, self.group.clone(), self.bodies.clone());
        if !self.config.cross_module_inlining {
            return builder.freeze();
        }

        let mut candidates: Vec<MethodHandle> = methods.to_vec();
        candidates.extend(methods.iter().flat_map(|method| self.direct_callees(method)));
        let mut seen = FxHashSet::default();
        candidates.retain(|method| seen.insert(method.clone()));
        comparer.sort_methods(&mut candidates);

        for method in &candidates {
            if method.as_ecma().is_some() && builder.needs_cross_module_inlineable_tokens(method) {
                builder.create_cross_module_inlineable_tokens(method);
            }
        }
        builder.freeze()
    }

    /// Authored definitions called from the authored body of `method`.
    fn direct_callees(&self, method: &MethodHandle) -> Vec<MethodHandle> {
        let Some(il) = self.bodies.method_il(method) else {
            return Vec::new();
        };
        let Ok(tokens) = il.referenced_tokens() else {
            return Vec::new();
        };
        tokens
            .into_iter()
            .filter_map(|token| match il.get_object(token) {
                Some(TokenObject::Method(callee)) => Some(callee.typical_method_definition(self.ctx)),
                _ => None,
            })
            .collect()
    }

    // =========================================================================
    // Phase 2
    // =========================================================================

    fn emit_bodies(&self, provider: &ILProvider<'_>, methods: &[MethodHandle]) -> Vec<CompileResult<Option<MethodIL>>> {
        let workers = self.config.parallelism.clamp(1, methods.len().max(1));
        let next = AtomicUsize::new(0);

        let batches: Vec<Vec<(usize, CompileResult<Option<MethodIL>>)>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(method) = methods.get(index) else {
                                break;
                            };
                            done.push((index, provider.get_method_il(method)));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut slots: Vec<Option<CompileResult<Option<MethodIL>>>> = (0..methods.len()).map(|_| None).collect();
        for (index, result) in batches.into_iter().flatten() {
            slots[index] = Some(result);
        }
        tracing::debug!(workers, methods = methods.len(), "emitted method bodies");
        slots.into_iter().map(|slot| slot.unwrap_or(Ok(None))).collect()
    }
}
