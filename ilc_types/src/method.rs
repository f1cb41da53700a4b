//! Methods.
//!
//! Like types, methods are interned and compared by identity. A method is
//! either authored (an `Ecma` definition), a generic projection of another
//! method, or one of the async calling-convention entities synthesized by the
//! compiler.
//!
//! ```text
//!   MethodHandle ──► MethodDesc
//!                      ├── Ecma                    authored definition
//!                      ├── OnInstantiatedType      Foo<int>.Bar   (typical + owning type)
//!                      ├── Instantiated            Bar<string>    (definition + method args)
//!                      ├── AsyncVariant            async-callable sibling of a Task method
//!                      ├── TaskReturningWrapper    task-returning face of an async method
//!                      └── ResumptionStub          re-entry point for a suspended async call
//! ```
//!
//! # Projections
//!
//! | Operation                    | Ecma | OnInstantiatedType | Instantiated | Delegators | Stub |
//! |------------------------------|------|--------------------|--------------|------------|------|
//! | `typical_method_definition`  | self | typical            | def.typical  | rewrap     | self |
//! | `method_definition`          | self | self               | def          | rewrap     | self |
//! | `canonical_form`             | self | canon owner        | canon def+args | rewrap   | self |
//! | `instantiate_signature`      | self | subst owner        | subst def+args | rewrap   | self |
//!
//! "rewrap" means: apply the operation to the wrapped method, then return the
//! delegator itself if nothing changed, or the registry's delegator for the
//! new result otherwise. See [`MethodDelegator`].

use crate::async_method::{AsyncMethodVariant, AsyncResumptionStub, MethodDelegator, TaskReturningAsyncWrapper};
use crate::context::TypeSystemContext;
use crate::module::ModuleId;
use crate::signature::{Instantiation, MethodSignature};
use crate::task_like::TaskLikeKind;
use crate::types::{CanonicalFormKind, TypeHandle};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;
use std::sync::Arc;

// =============================================================================
// Method Attributes
// =============================================================================

/// Method definition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodAttributes(u32);

impl MethodAttributes {
    /// No flags.
    pub const NONE: MethodAttributes = MethodAttributes(0);
    /// Body is compiled with the async calling convention; callers see a
    /// task-returning thunk.
    pub const ASYNC: MethodAttributes = MethodAttributes(1 << 0);
    /// Recognized by the compiler.
    pub const INTRINSIC: MethodAttributes = MethodAttributes(1 << 1);
    /// No body.
    pub const ABSTRACT: MethodAttributes = MethodAttributes(1 << 2);
    /// Dispatched through a vtable slot.
    pub const VIRTUAL: MethodAttributes = MethodAttributes(1 << 3);

    /// Check if a flag is set.
    #[inline]
    pub const fn contains(self, other: MethodAttributes) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Combine flags.
    #[inline]
    pub const fn union(self, other: MethodAttributes) -> MethodAttributes {
        MethodAttributes(self.0 | other.0)
    }

    /// Get raw value.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for MethodAttributes {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// =============================================================================
// Method Descriptions
// =============================================================================

/// An authored method definition.
#[derive(Debug)]
pub struct EcmaMethod {
    pub owning_type: TypeHandle,
    pub name: Arc<str>,
    pub signature: MethodSignature,
    pub attributes: MethodAttributes,
    pub row: u32,
}

/// A method definition viewed through an instantiated owning type.
#[derive(Debug)]
pub struct MethodForInstantiatedType {
    pub typical: MethodHandle,
    pub owning_type: TypeHandle,
    pub signature: MethodSignature,
}

/// A generic method with method-level type arguments applied.
#[derive(Debug)]
pub struct InstantiatedMethod {
    pub method_def: MethodHandle,
    pub instantiation: Instantiation,
    pub signature: MethodSignature,
}

/// Shape of a method.
#[derive(Debug)]
pub enum MethodKind {
    Ecma(EcmaMethod),
    OnInstantiatedType(MethodForInstantiatedType),
    Instantiated(InstantiatedMethod),
    AsyncVariant(AsyncMethodVariant),
    TaskReturningWrapper(TaskReturningAsyncWrapper),
    ResumptionStub(AsyncResumptionStub),
}

impl MethodKind {
    /// Stable ordinal used to order methods of different kinds.
    pub(crate) fn ordinal(&self) -> u8 {
        match self {
            MethodKind::Ecma(_) => 0,
            MethodKind::OnInstantiatedType(_) => 1,
            MethodKind::Instantiated(_) => 2,
            MethodKind::AsyncVariant(_) => 3,
            MethodKind::TaskReturningWrapper(_) => 4,
            MethodKind::ResumptionStub(_) => 5,
        }
    }
}

/// Shared method description. Use [`MethodHandle`] to refer to one.
#[derive(Debug)]
pub struct MethodDesc {
    kind: MethodKind,
}

/// Reference-counted handle to an interned method.
#[derive(Clone)]
pub struct MethodHandle(Arc<MethodDesc>);

impl MethodHandle {
    pub(crate) fn new(kind: MethodKind) -> Self {
        MethodHandle(Arc::new(MethodDesc { kind }))
    }

    /// Shape of this method.
    #[inline]
    pub fn kind(&self) -> &MethodKind {
        &self.0.kind
    }

    /// Authored definition data, if this is an `Ecma` method.
    #[inline]
    pub fn as_ecma(&self) -> Option<&EcmaMethod> {
        match &self.0.kind {
            MethodKind::Ecma(m) => Some(m),
            _ => None,
        }
    }

    /// Simple name.
    pub fn name(&self) -> &str {
        match &self.0.kind {
            MethodKind::Ecma(m) => &m.name,
            MethodKind::OnInstantiatedType(m) => m.typical.name(),
            MethodKind::Instantiated(m) => m.method_def.name(),
            MethodKind::AsyncVariant(v) => v.name(),
            MethodKind::TaskReturningWrapper(w) => w.name(),
            MethodKind::ResumptionStub(s) => s.target().name(),
        }
    }

    /// Owning type.
    pub fn owning_type(&self) -> TypeHandle {
        match &self.0.kind {
            MethodKind::Ecma(m) => m.owning_type.clone(),
            MethodKind::OnInstantiatedType(m) => m.owning_type.clone(),
            MethodKind::Instantiated(m) => m.method_def.owning_type(),
            MethodKind::AsyncVariant(v) => v.owning_type(),
            MethodKind::TaskReturningWrapper(w) => w.owning_type(),
            MethodKind::ResumptionStub(s) => s.target().owning_type(),
        }
    }

    /// Visible signature.
    pub fn signature(&self) -> &MethodSignature {
        match &self.0.kind {
            MethodKind::Ecma(m) => &m.signature,
            MethodKind::OnInstantiatedType(m) => &m.signature,
            MethodKind::Instantiated(m) => &m.signature,
            MethodKind::AsyncVariant(v) => v.signature(),
            MethodKind::TaskReturningWrapper(w) => w.signature(),
            MethodKind::ResumptionStub(s) => s.signature(),
        }
    }

    /// Definition flags.
    pub fn attributes(&self) -> MethodAttributes {
        match &self.0.kind {
            MethodKind::Ecma(m) => m.attributes,
            MethodKind::OnInstantiatedType(m) => m.typical.attributes(),
            MethodKind::Instantiated(m) => m.method_def.attributes(),
            MethodKind::AsyncVariant(v) => v.attributes(),
            MethodKind::TaskReturningWrapper(w) => w.attributes(),
            MethodKind::ResumptionStub(_) => MethodAttributes::NONE,
        }
    }

    /// Whether the authored body uses the async calling convention.
    #[inline]
    pub fn is_async(&self) -> bool {
        self.attributes().contains(MethodAttributes::ASYNC)
    }

    /// Whether the compiler recognizes this method.
    #[inline]
    pub fn is_intrinsic(&self) -> bool {
        self.attributes().contains(MethodAttributes::INTRINSIC)
    }

    /// Whether the visible signature uses the async calling convention.
    #[inline]
    pub fn is_async_call_conv(&self) -> bool {
        self.signature().is_async_call_conv()
    }

    /// Whether the method returns `Task`, ``Task`1``, `ValueTask` or ``ValueTask`1``.
    pub fn is_task_returning(&self) -> bool {
        TaskLikeKind::of(self.signature().return_type()).is_some()
    }

    /// Module of the typical definition.
    pub fn module(&self) -> Option<ModuleId> {
        self.owning_type().module()
    }

    /// Whether the method was synthesized by the compiler rather than authored.
    pub fn is_synthesized(&self) -> bool {
        match &self.0.kind {
            MethodKind::Ecma(_) => false,
            MethodKind::OnInstantiatedType(m) => m.typical.is_synthesized(),
            MethodKind::Instantiated(m) => m.method_def.is_synthesized(),
            MethodKind::AsyncVariant(_)
            | MethodKind::TaskReturningWrapper(_)
            | MethodKind::ResumptionStub(_) => true,
        }
    }

    /// Whether method-level type arguments have been applied.
    #[inline]
    pub fn has_instantiation(&self) -> bool {
        matches!(self.0.kind, MethodKind::Instantiated(_))
    }

    /// Method-level type arguments; empty unless instantiated.
    pub fn instantiation(&self) -> &[TypeHandle] {
        match &self.0.kind {
            MethodKind::Instantiated(m) => &m.instantiation,
            _ => &[],
        }
    }

    /// Type arguments of the owning type; empty unless it is instantiated.
    pub fn type_instantiation(&self) -> Instantiation {
        Instantiation::from_slice(self.owning_type().instantiation())
    }

    /// Method wrapped by a delegator, or targeted by a resumption stub.
    pub fn wrapped_method(&self) -> Option<&MethodHandle> {
        match &self.0.kind {
            MethodKind::AsyncVariant(v) => Some(v.wrapped()),
            MethodKind::TaskReturningWrapper(w) => Some(w.wrapped()),
            MethodKind::ResumptionStub(s) => Some(s.target()),
            _ => None,
        }
    }

    // =========================================================================
    // Projections
    // =========================================================================

    /// The uninstantiated definition this method was derived from.
    pub fn typical_method_definition(&self, ctx: &TypeSystemContext) -> MethodHandle {
        match &self.0.kind {
            MethodKind::Ecma(_) | MethodKind::ResumptionStub(_) => self.clone(),
            MethodKind::OnInstantiatedType(m) => m.typical.clone(),
            MethodKind::Instantiated(m) => m.method_def.typical_method_definition(ctx),
            MethodKind::AsyncVariant(v) => v.typical_method_definition(self, ctx),
            MethodKind::TaskReturningWrapper(w) => w.typical_method_definition(self, ctx),
        }
    }

    /// This method with its method-level type arguments removed.
    pub fn method_definition(&self, ctx: &TypeSystemContext) -> MethodHandle {
        match &self.0.kind {
            MethodKind::Ecma(_) | MethodKind::OnInstantiatedType(_) | MethodKind::ResumptionStub(_) => {
                self.clone()
            }
            MethodKind::Instantiated(m) => m.method_def.clone(),
            MethodKind::AsyncVariant(v) => v.method_definition(self, ctx),
            MethodKind::TaskReturningWrapper(w) => w.method_definition(self, ctx),
        }
    }

    /// Shared-code form of this method.
    pub fn canonical_form(&self, ctx: &TypeSystemContext, kind: CanonicalFormKind) -> MethodHandle {
        match &self.0.kind {
            MethodKind::Ecma(_) | MethodKind::ResumptionStub(_) => self.clone(),
            MethodKind::OnInstantiatedType(m) => {
                let canon_owner = m.owning_type.convert_to_canon(ctx, kind);
                if canon_owner == m.owning_type {
                    self.clone()
                } else {
                    ctx.get_method_for_instantiated_type(&m.typical, &canon_owner)
                }
            }
            MethodKind::Instantiated(m) => {
                let canon_def = m.method_def.canonical_form(ctx, kind);
                let canon_args = m.instantiation.convert_to_canon(ctx, kind);
                if canon_def == m.method_def && canon_args == m.instantiation {
                    self.clone()
                } else {
                    ctx.get_instantiated_method(&canon_def, canon_args)
                }
            }
            MethodKind::AsyncVariant(v) => v.canonical_form(self, ctx, kind),
            MethodKind::TaskReturningWrapper(w) => w.canonical_form(self, ctx, kind),
        }
    }

    /// Substitute signature variables in the owning type and method arguments.
    ///
    /// Returns `self` when nothing changes.
    pub fn instantiate_signature(
        &self,
        ctx: &TypeSystemContext,
        type_instantiation: &[TypeHandle],
        method_instantiation: &[TypeHandle],
    ) -> MethodHandle {
        match &self.0.kind {
            MethodKind::Ecma(_) | MethodKind::ResumptionStub(_) => self.clone(),
            MethodKind::OnInstantiatedType(m) => {
                let owner = m
                    .owning_type
                    .instantiate_signature(ctx, type_instantiation, method_instantiation);
                if owner == m.owning_type {
                    self.clone()
                } else {
                    ctx.get_method_for_instantiated_type(&m.typical, &owner)
                }
            }
            MethodKind::Instantiated(m) => {
                let def = m
                    .method_def
                    .instantiate_signature(ctx, type_instantiation, method_instantiation);
                let args = m
                    .instantiation
                    .instantiate_signature(ctx, type_instantiation, method_instantiation);
                if def == m.method_def && args == m.instantiation {
                    self.clone()
                } else {
                    ctx.get_instantiated_method(&def, args)
                }
            }
            MethodKind::AsyncVariant(v) => {
                v.instantiate_signature(self, ctx, type_instantiation, method_instantiation)
            }
            MethodKind::TaskReturningWrapper(w) => {
                w.instantiate_signature(self, ctx, type_instantiation, method_instantiation)
            }
        }
    }

    /// The other calling-convention face of this method.
    ///
    /// For a task-returning method this is its async variant; for an async
    /// variant (or a projection of one) it is the task-returning method it
    /// was derived from; for a task-returning wrapper it is the wrapped
    /// async method.
    pub fn async_other_variant(&self, ctx: &TypeSystemContext) -> Option<MethodHandle> {
        match &self.0.kind {
            MethodKind::Ecma(_) => self.is_task_returning().then(|| ctx.get_async_variant(self)),
            MethodKind::OnInstantiatedType(m) => m
                .typical
                .async_other_variant(ctx)
                .map(|other| ctx.get_method_for_instantiated_type(&other, &m.owning_type)),
            MethodKind::Instantiated(m) => m
                .method_def
                .async_other_variant(ctx)
                .map(|other| ctx.get_instantiated_method(&other, m.instantiation.clone())),
            MethodKind::AsyncVariant(v) => Some(v.wrapped().clone()),
            MethodKind::TaskReturningWrapper(w) => Some(w.wrapped().clone()),
            MethodKind::ResumptionStub(_) => None,
        }
    }

    /// Whether this is an async variant or a generic projection of one.
    fn is_async_variant_like(&self) -> bool {
        match &self.0.kind {
            MethodKind::AsyncVariant(_) => true,
            MethodKind::OnInstantiatedType(m) => m.typical.is_async_variant_like(),
            MethodKind::Instantiated(m) => m.method_def.is_async_variant_like(),
            _ => false,
        }
    }

    /// Human-readable name, e.g. `App.Service.Fetch<System.Int32>`.
    pub fn display_name(&self) -> String {
        let mut out = String::new();
        match &self.0.kind {
            MethodKind::TaskReturningWrapper(_) => out.push_str("[task-returning] "),
            MethodKind::ResumptionStub(_) => out.push_str("[resume] "),
            _ if self.is_async_variant_like() => out.push_str("[async] "),
            _ => {}
        }
        out.push_str(&self.owning_type().display_name());
        out.push('.');
        out.push_str(self.name());
        let args = self.instantiation();
        if !args.is_empty() {
            out.push('<');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&arg.display_name());
            }
            out.push('>');
        }
        out
    }
}

impl PartialEq for MethodHandle {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for MethodHandle {}

impl Hash for MethodHandle {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodHandle({})", self.display_name())
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}
