//! Modules.
//!
//! A module owns type and method definitions and hands out their metadata
//! rows. Rows are stable for the life of the context and form the basis of
//! the deterministic ordering in [`TypeSystemComparer`](crate::TypeSystemComparer).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifies a module within a [`TypeSystemContext`](crate::TypeSystemContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl ModuleId {
    /// The core library module. Always present.
    pub const SYSTEM: ModuleId = ModuleId(0);

    /// Raw index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is the core library.
    #[inline]
    pub const fn is_system(self) -> bool {
        self.0 == Self::SYSTEM.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// A loaded module.
#[derive(Debug)]
pub struct ModuleDesc {
    id: ModuleId,
    name: Arc<str>,
    /// Next TypeDef row.
    next_type_row: AtomicU32,
    /// Next MethodDef row.
    next_method_row: AtomicU32,
}

impl ModuleDesc {
    pub(crate) fn new(id: ModuleId, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            next_type_row: AtomicU32::new(1),
            next_method_row: AtomicU32::new(1),
        }
    }

    /// Module identity.
    #[inline]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Simple name, e.g. `System.Private.CoreLib`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn allocate_type_row(&self) -> u32 {
        self.next_type_row.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn allocate_method_row(&self) -> u32 {
        self.next_method_row.fetch_add(1, Ordering::Relaxed)
    }
}
