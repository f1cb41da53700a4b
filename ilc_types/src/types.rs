//! Types.
//!
//! Types are shared, immutable and interned: structurally equal requests
//! made through the [`TypeSystemContext`] return the same [`TypeHandle`], so
//! handles compare and hash by reference identity.
//!
//! ```text
//!   TypeHandle ──► TypeDesc
//!                    ├── Metadata            authored definition (module, row)
//!                    ├── Instantiated        definition + type arguments
//!                    ├── SignatureVariable   !n / !!n
//!                    ├── ByRef               T&
//!                    └── Continuation        synthesized async frame layout
//! ```

use crate::context::TypeSystemContext;
use crate::continuation::AsyncContinuationType;
use crate::module::ModuleId;
use crate::signature::Instantiation;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;
use std::sync::Arc;

// =============================================================================
// Type Attributes
// =============================================================================

/// Type definition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeAttributes(u32);

impl TypeAttributes {
    /// No flags.
    pub const NONE: TypeAttributes = TypeAttributes(0);
    /// Type is a value type.
    pub const VALUE_TYPE: TypeAttributes = TypeAttributes(1 << 0);
    /// Type cannot be derived from.
    pub const SEALED: TypeAttributes = TypeAttributes(1 << 1);
    /// Type cannot be instantiated.
    pub const ABSTRACT: TypeAttributes = TypeAttributes(1 << 2);
    /// Type is an interface.
    pub const INTERFACE: TypeAttributes = TypeAttributes(1 << 3);
    /// Fields are laid out at explicit offsets.
    pub const EXPLICIT_LAYOUT: TypeAttributes = TypeAttributes(1 << 4);
    /// Type declares a finalizer.
    pub const HAS_FINALIZER: TypeAttributes = TypeAttributes(1 << 5);

    /// Check if a flag is set.
    #[inline]
    pub const fn contains(self, other: TypeAttributes) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Combine flags.
    #[inline]
    pub const fn union(self, other: TypeAttributes) -> TypeAttributes {
        TypeAttributes(self.0 | other.0)
    }

    /// Get raw value.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for TypeAttributes {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// =============================================================================
// Well-Known Types
// =============================================================================

/// Core library types every context defines at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WellKnownType {
    Object,
    ValueType,
    Void,
    Boolean,
    Byte,
    Int32,
    Int64,
    IntPtr,
    String,
    Exception,
    /// Shared-code placeholder for reference type arguments.
    Canon,
    /// Shared-code placeholder for any type argument.
    UniversalCanon,
}

impl WellKnownType {
    /// Number of well-known types.
    pub const COUNT: usize = 12;

    /// All well-known types, in definition order. Matches the discriminants.
    pub const ALL: [WellKnownType; Self::COUNT] = [
        WellKnownType::Object,
        WellKnownType::ValueType,
        WellKnownType::Void,
        WellKnownType::Boolean,
        WellKnownType::Byte,
        WellKnownType::Int32,
        WellKnownType::Int64,
        WellKnownType::IntPtr,
        WellKnownType::String,
        WellKnownType::Exception,
        WellKnownType::Canon,
        WellKnownType::UniversalCanon,
    ];

    /// Metadata name within the `System` namespace.
    pub const fn name(self) -> &'static str {
        match self {
            WellKnownType::Void => "Void",
            WellKnownType::Boolean => "Boolean",
            WellKnownType::Byte => "Byte",
            WellKnownType::Int32 => "Int32",
            WellKnownType::Int64 => "Int64",
            WellKnownType::IntPtr => "IntPtr",
            WellKnownType::Object => "Object",
            WellKnownType::String => "String",
            WellKnownType::Exception => "Exception",
            WellKnownType::ValueType => "ValueType",
            WellKnownType::Canon => "__Canon",
            WellKnownType::UniversalCanon => "__UniversalCanon",
        }
    }

    /// Whether instances are value types.
    pub const fn is_value_type(self) -> bool {
        matches!(
            self,
            WellKnownType::Void
                | WellKnownType::Boolean
                | WellKnownType::Byte
                | WellKnownType::Int32
                | WellKnownType::Int64
                | WellKnownType::IntPtr
        )
    }
}

// =============================================================================
// Type Descriptions
// =============================================================================

/// Whether a signature variable refers to a type or a method generic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenericParameterKind {
    /// `!n`
    Type,
    /// `!!n`
    Method,
}

/// An authored type definition.
#[derive(Debug)]
pub struct MetadataType {
    pub module: ModuleId,
    pub row: u32,
    pub namespace: Arc<str>,
    pub name: Arc<str>,
    pub generic_arity: u32,
    pub attributes: TypeAttributes,
    pub base_type: Option<TypeHandle>,
    pub custom_attributes: Vec<Arc<str>>,
}

/// Shape of a type.
#[derive(Debug)]
pub enum TypeKind {
    Metadata(MetadataType),
    Instantiated {
        definition: TypeHandle,
        instantiation: Instantiation,
    },
    SignatureVariable {
        kind: GenericParameterKind,
        index: u32,
    },
    ByRef(TypeHandle),
    Continuation(AsyncContinuationType),
}

/// Shared type description. Use [`TypeHandle`] to refer to one.
#[derive(Debug)]
pub struct TypeDesc {
    kind: TypeKind,
}

/// Reference-counted handle to an interned type.
#[derive(Clone)]
pub struct TypeHandle(Arc<TypeDesc>);

/// Canonicalization flavor for shared generic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalFormKind {
    /// Reference type arguments collapse to `__Canon`.
    Specific,
    /// Every type argument collapses to `__UniversalCanon`.
    Universal,
}

impl TypeHandle {
    pub(crate) fn new(kind: TypeKind) -> Self {
        TypeHandle(Arc::new(TypeDesc { kind }))
    }

    /// Shape of this type.
    #[inline]
    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    /// Authored definition data, if this is a metadata type.
    #[inline]
    pub fn as_metadata(&self) -> Option<&MetadataType> {
        match &self.0.kind {
            TypeKind::Metadata(md) => Some(md),
            _ => None,
        }
    }

    /// Continuation layout data, if this is a synthesized continuation type.
    #[inline]
    pub fn as_continuation(&self) -> Option<&AsyncContinuationType> {
        match &self.0.kind {
            TypeKind::Continuation(ct) => Some(ct),
            _ => None,
        }
    }

    /// The generic definition of an instantiated type; `self` otherwise.
    pub fn type_definition(&self) -> TypeHandle {
        match &self.0.kind {
            TypeKind::Instantiated { definition, .. } => definition.clone(),
            _ => self.clone(),
        }
    }

    /// Whether this type carries type arguments.
    #[inline]
    pub fn has_instantiation(&self) -> bool {
        matches!(self.0.kind, TypeKind::Instantiated { .. })
    }

    /// Type arguments; empty unless instantiated.
    pub fn instantiation(&self) -> &[TypeHandle] {
        match &self.0.kind {
            TypeKind::Instantiated { instantiation, .. } => instantiation,
            _ => &[],
        }
    }

    /// Module that defines this type, if any.
    pub fn module(&self) -> Option<ModuleId> {
        match &self.0.kind {
            TypeKind::Metadata(md) => Some(md.module),
            TypeKind::Instantiated { definition, .. } => definition.module(),
            _ => None,
        }
    }

    /// Namespace of the (definition of the) type; empty for non-metadata types.
    pub fn namespace(&self) -> &str {
        match &self.0.kind {
            TypeKind::Metadata(md) => &md.namespace,
            TypeKind::Instantiated { definition, .. } => definition.namespace(),
            _ => "",
        }
    }

    /// Simple name of the (definition of the) type.
    pub fn name(&self) -> &str {
        match &self.0.kind {
            TypeKind::Metadata(md) => &md.name,
            TypeKind::Instantiated { definition, .. } => definition.name(),
            TypeKind::Continuation(ct) => ct.name(),
            _ => "",
        }
    }

    /// Attribute flags.
    pub fn attributes(&self) -> TypeAttributes {
        match &self.0.kind {
            TypeKind::Metadata(md) => md.attributes,
            TypeKind::Instantiated { definition, .. } => definition.attributes(),
            TypeKind::Continuation(_) => TypeAttributes::SEALED | TypeAttributes::EXPLICIT_LAYOUT,
            _ => TypeAttributes::NONE,
        }
    }

    /// Whether instances are value types.
    #[inline]
    pub fn is_value_type(&self) -> bool {
        self.attributes().contains(TypeAttributes::VALUE_TYPE)
    }

    /// Whether the type is sealed.
    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.attributes().contains(TypeAttributes::SEALED)
    }

    /// Whether the type is abstract.
    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.attributes().contains(TypeAttributes::ABSTRACT)
    }

    /// Whether the type declares a finalizer.
    #[inline]
    pub fn has_finalizer(&self) -> bool {
        self.attributes().contains(TypeAttributes::HAS_FINALIZER)
    }

    /// Base type, if any.
    pub fn base_type(&self) -> Option<TypeHandle> {
        match &self.0.kind {
            TypeKind::Metadata(md) => md.base_type.clone(),
            TypeKind::Instantiated { definition, .. } => definition.base_type(),
            TypeKind::Continuation(ct) => Some(ct.base_type().clone()),
            _ => None,
        }
    }

    /// Custom attribute type names applied to the definition.
    pub fn custom_attributes(&self) -> &[Arc<str>] {
        match &self.0.kind {
            TypeKind::Metadata(md) => &md.custom_attributes,
            TypeKind::Instantiated { definition, .. } => definition.custom_attributes(),
            _ => &[],
        }
    }

    /// Implemented interfaces. The substrate does not model interface
    /// implementation, and synthesized types never have any.
    pub fn interfaces(&self) -> &[TypeHandle] {
        &[]
    }

    /// Whether this is a signature variable (`!n` or `!!n`).
    #[inline]
    pub fn is_signature_variable(&self) -> bool {
        matches!(self.0.kind, TypeKind::SignatureVariable { .. })
    }

    /// Whether this type mentions no signature variables.
    pub fn is_closed(&self) -> bool {
        match &self.0.kind {
            TypeKind::SignatureVariable { .. } => false,
            TypeKind::Instantiated { instantiation, .. } => instantiation.iter().all(|t| t.is_closed()),
            TypeKind::ByRef(element) => element.is_closed(),
            _ => true,
        }
    }

    /// Substitute signature variables.
    ///
    /// Returns `self` when nothing changes.
    pub fn instantiate_signature(
        &self,
        ctx: &TypeSystemContext,
        type_instantiation: &[TypeHandle],
        method_instantiation: &[TypeHandle],
    ) -> TypeHandle {
        match &self.0.kind {
            TypeKind::SignatureVariable { kind, index } => {
                let source = match kind {
                    GenericParameterKind::Type => type_instantiation,
                    GenericParameterKind::Method => method_instantiation,
                };
                source.get(*index as usize).cloned().unwrap_or_else(|| self.clone())
            }
            TypeKind::Instantiated {
                definition,
                instantiation,
            } => {
                let instantiated =
                    instantiation.instantiate_signature(ctx, type_instantiation, method_instantiation);
                if instantiated == *instantiation {
                    self.clone()
                } else {
                    ctx.get_instantiated_type(definition, instantiated)
                }
            }
            TypeKind::ByRef(element) => {
                let instantiated =
                    element.instantiate_signature(ctx, type_instantiation, method_instantiation);
                if instantiated == *element {
                    self.clone()
                } else {
                    ctx.get_byref_type(&instantiated)
                }
            }
            TypeKind::Metadata(_) | TypeKind::Continuation(_) => self.clone(),
        }
    }

    /// Shared-code form of this type.
    pub fn convert_to_canon(&self, ctx: &TypeSystemContext, kind: CanonicalFormKind) -> TypeHandle {
        match &self.0.kind {
            TypeKind::Instantiated {
                definition,
                instantiation,
            } => {
                let canon = instantiation.convert_to_canon(ctx, kind);
                if canon == *instantiation {
                    self.clone()
                } else {
                    ctx.get_instantiated_type(definition, canon)
                }
            }
            TypeKind::ByRef(element) => {
                let canon = element.convert_to_canon(ctx, kind);
                if canon == *element {
                    self.clone()
                } else {
                    ctx.get_byref_type(&canon)
                }
            }
            _ => self.clone(),
        }
    }

    /// Human-readable name, e.g. ``System.Threading.Tasks.Task`1<System.Int32>``.
    pub fn display_name(&self) -> String {
        let mut out = String::new();
        self.write_display_name(&mut out);
        out
    }

    fn write_display_name(&self, out: &mut String) {
        match &self.0.kind {
            TypeKind::Metadata(md) => {
                if !md.namespace.is_empty() {
                    out.push_str(&md.namespace);
                    out.push('.');
                }
                out.push_str(&md.name);
            }
            TypeKind::Instantiated {
                definition,
                instantiation,
            } => {
                definition.write_display_name(out);
                out.push('<');
                for (i, arg) in instantiation.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.write_display_name(out);
                }
                out.push('>');
            }
            TypeKind::SignatureVariable { kind, index } => {
                out.push_str(match kind {
                    GenericParameterKind::Type => "!",
                    GenericParameterKind::Method => "!!",
                });
                out.push_str(&index.to_string());
            }
            TypeKind::ByRef(element) => {
                element.write_display_name(out);
                out.push('&');
            }
            TypeKind::Continuation(ct) => out.push_str(ct.name()),
        }
    }
}

impl PartialEq for TypeHandle {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TypeHandle {}

impl Hash for TypeHandle {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle({})", self.display_name())
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}
