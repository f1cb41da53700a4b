//! Method signatures and generic instantiations.

use crate::context::TypeSystemContext;
use crate::task_like::TaskLikeKind;
use crate::types::{CanonicalFormKind, TypeHandle, WellKnownType};
use smallvec::SmallVec;
use std::fmt;
use std::ops::{BitOr, Deref};

// =============================================================================
// Instantiation
// =============================================================================

/// An ordered list of generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Instantiation(SmallVec<[TypeHandle; 2]>);

impl Instantiation {
    /// The empty instantiation.
    pub fn empty() -> Self {
        Self(SmallVec::new())
    }

    /// Build from a slice of arguments.
    pub fn from_slice(args: &[TypeHandle]) -> Self {
        Self(args.iter().cloned().collect())
    }

    /// Substitute signature variables in every argument.
    pub fn instantiate_signature(
        &self,
        ctx: &TypeSystemContext,
        type_instantiation: &[TypeHandle],
        method_instantiation: &[TypeHandle],
    ) -> Instantiation {
        self.iter()
            .map(|arg| arg.instantiate_signature(ctx, type_instantiation, method_instantiation))
            .collect()
    }

    /// Shared-code form of the arguments.
    ///
    /// With [`CanonicalFormKind::Specific`], reference type arguments become
    /// `__Canon` and value type arguments are canonicalized recursively.
    pub fn convert_to_canon(&self, ctx: &TypeSystemContext, kind: CanonicalFormKind) -> Instantiation {
        match kind {
            CanonicalFormKind::Universal => {
                let universal = ctx.get_well_known_type(WellKnownType::UniversalCanon);
                self.iter().map(|_| universal.clone()).collect()
            }
            CanonicalFormKind::Specific => {
                let canon = ctx.get_well_known_type(WellKnownType::Canon);
                self.iter()
                    .map(|arg| {
                        if arg.is_value_type() {
                            arg.convert_to_canon(ctx, kind)
                        } else {
                            canon.clone()
                        }
                    })
                    .collect()
            }
        }
    }
}

impl Deref for Instantiation {
    type Target = [TypeHandle];

    #[inline]
    fn deref(&self) -> &[TypeHandle] {
        &self.0
    }
}

impl FromIterator<TypeHandle> for Instantiation {
    fn from_iter<I: IntoIterator<Item = TypeHandle>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<TypeHandle>> for Instantiation {
    fn from(args: Vec<TypeHandle>) -> Self {
        Self(SmallVec::from_vec(args))
    }
}

// =============================================================================
// Signature Flags
// =============================================================================

/// Calling convention and shape flags of a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SignatureFlags(u32);

impl SignatureFlags {
    /// No flags (instance method, managed calling convention).
    pub const NONE: SignatureFlags = SignatureFlags(0);
    /// No `this` argument.
    pub const STATIC: SignatureFlags = SignatureFlags(1 << 0);
    /// Callable with the async calling convention.
    pub const ASYNC_CALL_CONV: SignatureFlags = SignatureFlags(1 << 1);

    /// Check if a flag is set.
    #[inline]
    pub const fn contains(self, other: SignatureFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Combine flags.
    #[inline]
    pub const fn union(self, other: SignatureFlags) -> SignatureFlags {
        SignatureFlags(self.0 | other.0)
    }

    /// Get raw value.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for SignatureFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// =============================================================================
// Method Signature
// =============================================================================

/// A method signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    flags: SignatureFlags,
    generic_parameter_count: u32,
    return_type: TypeHandle,
    parameters: SmallVec<[TypeHandle; 4]>,
}

impl MethodSignature {
    /// Create a signature.
    pub fn new(
        flags: SignatureFlags,
        generic_parameter_count: u32,
        return_type: TypeHandle,
        parameters: &[TypeHandle],
    ) -> Self {
        Self {
            flags,
            generic_parameter_count,
            return_type,
            parameters: parameters.iter().cloned().collect(),
        }
    }

    #[inline]
    pub fn flags(&self) -> SignatureFlags {
        self.flags
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(SignatureFlags::STATIC)
    }

    #[inline]
    pub fn is_async_call_conv(&self) -> bool {
        self.flags.contains(SignatureFlags::ASYNC_CALL_CONV)
    }

    #[inline]
    pub fn generic_parameter_count(&self) -> u32 {
        self.generic_parameter_count
    }

    #[inline]
    pub fn return_type(&self) -> &TypeHandle {
        &self.return_type
    }

    /// Formal parameters, not counting `this`.
    #[inline]
    pub fn parameters(&self) -> &[TypeHandle] {
        &self.parameters
    }

    /// Number of formal parameters, not counting `this`.
    #[inline]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Number of stack arguments a call consumes, including `this`.
    #[inline]
    pub fn argument_count(&self) -> usize {
        self.parameters.len() + usize::from(!self.is_static())
    }

    /// Whether the return type is `System.Void`.
    pub fn returns_void(&self, ctx: &TypeSystemContext) -> bool {
        self.return_type == ctx.get_well_known_type(WellKnownType::Void)
    }

    /// Substitute signature variables in the return and parameter types.
    pub fn instantiate(
        &self,
        ctx: &TypeSystemContext,
        type_instantiation: &[TypeHandle],
        method_instantiation: &[TypeHandle],
    ) -> MethodSignature {
        let mut builder = MethodSignatureBuilder::from(self);
        builder.return_type =
            self.return_type.instantiate_signature(ctx, type_instantiation, method_instantiation);
        builder.parameters = self
            .parameters
            .iter()
            .map(|p| p.instantiate_signature(ctx, type_instantiation, method_instantiation))
            .collect();
        builder.build()
    }

    /// Signature of the async calling-convention variant of a task-returning method.
    ///
    /// The return type becomes the task's result type, or `void` for
    /// non-generic tasks, and [`SignatureFlags::ASYNC_CALL_CONV`] is added.
    /// Parameters and generic arity are unchanged.
    pub fn create_async_signature(&self, ctx: &TypeSystemContext) -> MethodSignature {
        let kind = TaskLikeKind::of(&self.return_type);
        assert!(
            kind.is_some(),
            "async signature requested for non task-returning signature {}",
            self
        );

        let mut builder = MethodSignatureBuilder::from(self);
        builder.return_type = match self.return_type.instantiation().first() {
            Some(result) => result.clone(),
            None => ctx.get_well_known_type(WellKnownType::Void),
        };
        builder.flags = self.flags | SignatureFlags::ASYNC_CALL_CONV;
        builder.build()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static() {
            f.write_str("static ")?;
        }
        if self.is_async_call_conv() {
            f.write_str("async ")?;
        }
        write!(f, "{} (", self.return_type)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}

/// Mutable copy of a signature.
#[derive(Debug, Clone)]
pub struct MethodSignatureBuilder {
    pub flags: SignatureFlags,
    pub generic_parameter_count: u32,
    pub return_type: TypeHandle,
    pub parameters: SmallVec<[TypeHandle; 4]>,
}

impl MethodSignatureBuilder {
    pub fn build(self) -> MethodSignature {
        MethodSignature {
            flags: self.flags,
            generic_parameter_count: self.generic_parameter_count,
            return_type: self.return_type,
            parameters: self.parameters,
        }
    }
}

impl From<&MethodSignature> for MethodSignatureBuilder {
    fn from(sig: &MethodSignature) -> Self {
        Self {
            flags: sig.flags,
            generic_parameter_count: sig.generic_parameter_count,
            return_type: sig.return_type.clone(),
            parameters: sig.parameters.clone(),
        }
    }
}
