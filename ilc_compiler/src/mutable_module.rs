//! The manifest module.
//!
//! Bodies inlined across the version bubble cannot keep the tokens of the
//! module they were authored in. They are rewritten to tokens issued here:
//!
//! ```text
//!   Lib.Helpers.Add  (module Lib, outside the bubble)
//!     call 0x0a000012 ──► Lib.Math.Sum
//!                              │ try_get_handle
//!                              ▼
//!   manifest                call 0x0a000001
//! ```
//!
//! Tokens are issued in request order with one row counter per table, so a
//! single-threaded creation phase yields the same manifest on every run.
//! Compiler-synthesized entities have no metadata and are never issued a
//! token.

use crate::module_group::CompilationModuleGroup;
use ilc_il::{ExceptionRegion, MethodIL, Token, TokenObject, TokenResolver, replace_tokens};
use ilc_types::{MethodHandle, MethodKind, MethodSignature, ModuleId, TypeHandle, TypeKind};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Table a manifest token for `object` lives in.
fn manifest_table(object: &TokenObject) -> u32 {
    match object {
        TokenObject::Method(method) if method.has_instantiation() => Token::METHOD_SPEC,
        TokenObject::Type(ty) if !matches!(ty.kind(), TypeKind::Metadata(_)) => Token::TYPE_SPEC,
        _ => object.table(),
    }
}

#[derive(Debug, Default)]
struct ManifestState {
    tokens: FxHashMap<TokenObject, Token>,
    objects: FxHashMap<Token, TokenObject>,
    next_row: FxHashMap<u32, u32>,
    /// Module whose body is being rewritten; its own entities are referenceable.
    source_module: Option<ModuleId>,
    sealed: bool,
}

/// Token space shared by every body rewritten for cross-module inlining.
#[derive(Debug)]
pub struct MutableModule {
    group: Arc<CompilationModuleGroup>,
    state: RwLock<ManifestState>,
}

impl MutableModule {
    pub fn new(group: Arc<CompilationModuleGroup>) -> Self {
        Self {
            group,
            state: RwLock::new(ManifestState::default()),
        }
    }

    /// Token for `object`, issuing one if it is referenceable.
    ///
    /// Returns `None` if the object cannot be expressed in the manifest or
    /// the module has been sealed.
    pub fn try_get_handle(&self, object: &TokenObject) -> Option<Token> {
        if let Some(&token) = self.state.read().tokens.get(object) {
            return Some(token);
        }

        let mut state = self.state.write();
        if let Some(&token) = state.tokens.get(object) {
            return Some(token);
        }
        if state.sealed || !self.is_referenceable(object, state.source_module) {
            return None;
        }

        let table = manifest_table(object);
        let row = state.next_row.entry(table).or_insert(0);
        *row += 1;
        let token = Token::new(table, *row);
        state.tokens.insert(object.clone(), token);
        state.objects.insert(token, object.clone());
        tracing::trace!(token = %token, object = %object, "issued manifest token");
        Some(token)
    }

    /// Token for a user string.
    pub fn try_get_string_handle(&self, value: &str) -> Option<Token> {
        self.try_get_handle(&TokenObject::String(value.into()))
    }

    /// Stop issuing tokens. Existing tokens keep resolving.
    pub fn seal(&self) {
        self.state.write().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.state.read().sealed
    }

    /// Number of issued tokens.
    pub fn len(&self) -> usize {
        self.state.read().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every issued token with its object, in token order.
    pub fn entries(&self) -> Vec<(Token, TokenObject)> {
        let state = self.state.read();
        let mut entries: Vec<(Token, TokenObject)> =
            state.objects.iter().map(|(token, object)| (*token, object.clone())).collect();
        entries.sort_unstable_by_key(|(token, _)| *token);
        entries
    }

    /// Make entities of `module` referenceable until the guard drops.
    ///
    /// # Panics
    ///
    /// Panics if another source module is already active.
    pub fn enter_source_module(&self, module: ModuleId) -> SourceModuleGuard<'_> {
        let mut state = self.state.write();
        assert!(
            state.source_module.is_none(),
            "manifest module is already rewriting a body of {:?}",
            state.source_module
        );
        state.source_module = Some(module);
        SourceModuleGuard { manifest: self }
    }

    /// `il` with every token re-expressed in the manifest.
    ///
    /// Returns `None` if any referenced entity is not referenceable, in
    /// which case the body must not be inlined across modules.
    pub fn wrap_method_il(self: &Arc<Self>, il: &MethodIL) -> Option<MethodIL> {
        let method = il.owning_method();
        method.as_ecma()?;
        let module = method.module()?;
        let _source = self.enter_source_module(module);

        let mut regions: Vec<ExceptionRegion> = il.exception_regions().to_vec();
        for region in &mut regions {
            if let Some(class_token) = region.class_token {
                let object = il.get_object(class_token)?;
                region.class_token = Some(self.try_get_handle(&object)?);
            }
        }

        let mut bytes = il.il_bytes().to_vec();
        let rewritten = replace_tokens(&mut bytes, |token| {
            let object = il.get_object(token)?;
            match &object {
                TokenObject::String(value) => self.try_get_string_handle(value),
                _ => self.try_get_handle(&object),
            }
        });
        match rewritten {
            Ok(true) => {}
            Ok(false) => return None,
            Err(error) => {
                tracing::warn!(method = %method, %error, "cannot rewrite undecodable body");
                return None;
            }
        }

        Some(il.with_token_space(bytes, regions, self.clone()))
    }

    // =========================================================================
    // Referenceability
    // =========================================================================

    fn is_referenceable(&self, object: &TokenObject, source: Option<ModuleId>) -> bool {
        match object {
            TokenObject::Method(method) => self.is_method_referenceable(method, source),
            TokenObject::Type(ty) => self.is_type_referenceable(ty, source),
            TokenObject::Signature(signature) => self.is_signature_referenceable(signature, source),
            TokenObject::String(_) => true,
        }
    }

    fn is_module_referenceable(&self, module: ModuleId, source: Option<ModuleId>) -> bool {
        source == Some(module) || self.group.versions_with_module(module)
    }

    fn is_type_referenceable(&self, ty: &TypeHandle, source: Option<ModuleId>) -> bool {
        match ty.kind() {
            TypeKind::Metadata(def) => self.is_module_referenceable(def.module, source),
            TypeKind::Instantiated {
                definition,
                instantiation,
            } => {
                self.is_type_referenceable(definition, source)
                    && instantiation.iter().all(|arg| self.is_type_referenceable(arg, source))
            }
            TypeKind::SignatureVariable { .. } => true,
            TypeKind::ByRef(element) => self.is_type_referenceable(element, source),
            TypeKind::Continuation(_) => false,
        }
    }

    fn is_signature_referenceable(&self, signature: &MethodSignature, source: Option<ModuleId>) -> bool {
        self.is_type_referenceable(signature.return_type(), source)
            && signature
                .parameters()
                .iter()
                .all(|parameter| self.is_type_referenceable(parameter, source))
    }

    fn is_method_referenceable(&self, method: &MethodHandle, source: Option<ModuleId>) -> bool {
        if method.is_synthesized() {
            return false;
        }
        let definition = match method.kind() {
            MethodKind::Instantiated(m) => &m.method_def,
            _ => method,
        };
        self.is_type_referenceable(&definition.owning_type(), source)
            && self.is_signature_referenceable(method.signature(), source)
            && method
                .instantiation()
                .iter()
                .all(|arg| self.is_type_referenceable(arg, source))
    }
}

impl TokenResolver for MutableModule {
    fn resolve(&self, token: Token) -> Option<TokenObject> {
        self.state.read().objects.get(&token).cloned()
    }
}

/// Clears the manifest's source module on drop.
#[must_use = "the source module is cleared when the guard drops"]
pub struct SourceModuleGuard<'a> {
    manifest: &'a MutableModule,
}

impl Drop for SourceModuleGuard<'_> {
    fn drop(&mut self) {
        self.manifest.state.write().source_module = None;
    }
}
