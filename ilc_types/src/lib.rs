//! Type-system substrate and async calling-convention model for the ILC compiler.
//!
//! This crate provides:
//! - Modules, types, methods and signatures with handle identity
//! - Interning of generic instantiations and signature variables
//! - Async variants, task-returning wrappers and resumption stubs
//! - Continuation layout types derived from GC pointer maps
//! - Concurrent find-or-create tables backing every cache
//! - A deterministic comparer for stable output ordering

pub mod async_method;
pub mod comparer;
pub mod config;
pub mod context;
pub mod continuation;
pub mod corelib;
pub mod method;
pub mod module;
pub mod pointer_map;
pub mod signature;
pub mod table;
pub mod task_like;
pub mod types;

// Re-export commonly used items
pub use async_method::{AsyncMethodVariant, AsyncResumptionStub, MethodDelegator, TaskReturningAsyncWrapper};
pub use comparer::TypeSystemComparer;
pub use config::{ConfigError, ContinuationScopePolicy, TypeSystemConfig};
pub use context::{MethodDefinition, SYSTEM_MODULE_NAME, TypeDefinition, TypeSystemContext};
pub use continuation::{AsyncContinuationType, ContinuationScope};
pub use corelib::{AsyncLibrary, install_async_library};
pub use method::{MethodAttributes, MethodHandle, MethodKind};
pub use module::{ModuleDesc, ModuleId};
pub use pointer_map::{GcPointerMap, GcPointerMapBuilder};
pub use signature::{Instantiation, MethodSignature, MethodSignatureBuilder, SignatureFlags};
pub use table::FindOrCreateTable;
pub use task_like::TaskLikeKind;
pub use types::{CanonicalFormKind, GenericParameterKind, TypeAttributes, TypeHandle, TypeKind, WellKnownType};
