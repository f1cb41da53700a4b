//! Deterministic ordering of types and methods.
//!
//! Handles compare by identity, and identity depends on creation order,
//! which in turn depends on thread scheduling. Anything that must produce
//! stable output (token assignment, sorted dumps, result lists) orders
//! entities with [`TypeSystemComparer`] instead.
//!
//! Order: kind first, then module and metadata row for definitions, then
//! the kind-specific components in declaration order.

use crate::continuation::ContinuationScope;
use crate::method::{MethodHandle, MethodKind};
use crate::types::{TypeHandle, TypeKind};
use std::cmp::Ordering;

/// Total order over types and methods that does not depend on creation order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeSystemComparer;

fn type_ordinal(kind: &TypeKind) -> u8 {
    match kind {
        TypeKind::Metadata(_) => 0,
        TypeKind::Instantiated { .. } => 1,
        TypeKind::SignatureVariable { .. } => 2,
        TypeKind::ByRef(_) => 3,
        TypeKind::Continuation(_) => 4,
    }
}

impl TypeSystemComparer {
    pub fn new() -> Self {
        TypeSystemComparer
    }

    pub fn compare_types(&self, a: &TypeHandle, b: &TypeHandle) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        match (a.kind(), b.kind()) {
            (TypeKind::Metadata(x), TypeKind::Metadata(y)) => x
                .module
                .cmp(&y.module)
                .then(x.row.cmp(&y.row)),
            (
                TypeKind::Instantiated {
                    definition: dx,
                    instantiation: ix,
                },
                TypeKind::Instantiated {
                    definition: dy,
                    instantiation: iy,
                },
            ) => self
                .compare_types(dx, dy)
                .then_with(|| self.compare_type_lists(ix, iy)),
            (
                TypeKind::SignatureVariable { kind: kx, index: nx },
                TypeKind::SignatureVariable { kind: ky, index: ny },
            ) => kx.cmp(ky).then(nx.cmp(ny)),
            (TypeKind::ByRef(x), TypeKind::ByRef(y)) => self.compare_types(x, y),
            (TypeKind::Continuation(x), TypeKind::Continuation(y)) => x
                .pointer_map()
                .cmp(y.pointer_map())
                .then_with(|| self.compare_scopes(x.scope(), y.scope())),
            (x, y) => type_ordinal(x).cmp(&type_ordinal(y)),
        }
    }

    pub fn compare_methods(&self, a: &MethodHandle, b: &MethodHandle) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        match (a.kind(), b.kind()) {
            (MethodKind::Ecma(x), MethodKind::Ecma(y)) => self
                .compare_types(&x.owning_type, &y.owning_type)
                .then(x.row.cmp(&y.row)),
            (MethodKind::OnInstantiatedType(x), MethodKind::OnInstantiatedType(y)) => self
                .compare_methods(&x.typical, &y.typical)
                .then_with(|| self.compare_types(&x.owning_type, &y.owning_type)),
            (MethodKind::Instantiated(x), MethodKind::Instantiated(y)) => self
                .compare_methods(&x.method_def, &y.method_def)
                .then_with(|| self.compare_type_lists(&x.instantiation, &y.instantiation)),
            (MethodKind::AsyncVariant(_), MethodKind::AsyncVariant(_))
            | (MethodKind::TaskReturningWrapper(_), MethodKind::TaskReturningWrapper(_))
            | (MethodKind::ResumptionStub(_), MethodKind::ResumptionStub(_)) => {
                match (a.wrapped_method(), b.wrapped_method()) {
                    (Some(x), Some(y)) => self.compare_methods(x, y),
                    _ => Ordering::Equal,
                }
            }
            (x, y) => x.ordinal().cmp(&y.ordinal()),
        }
    }

    fn compare_type_lists(&self, a: &[TypeHandle], b: &[TypeHandle]) -> Ordering {
        for (x, y) in a.iter().zip(b) {
            let ord = self.compare_types(x, y);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len().cmp(&b.len())
    }

    fn compare_scopes(&self, a: &ContinuationScope, b: &ContinuationScope) -> Ordering {
        match (a, b) {
            (ContinuationScope::Method(x), ContinuationScope::Method(y)) => self.compare_methods(x, y),
            (ContinuationScope::Module(x), ContinuationScope::Module(y)) => x.cmp(y),
            (ContinuationScope::Method(_), ContinuationScope::Module(_)) => Ordering::Less,
            (ContinuationScope::Module(_), ContinuationScope::Method(_)) => Ordering::Greater,
        }
    }

    /// Sort methods in place.
    pub fn sort_methods(&self, methods: &mut [MethodHandle]) {
        methods.sort_by(|a, b| self.compare_methods(a, b));
    }
}
