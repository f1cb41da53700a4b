//! Async calling-convention support for the ILC ahead-of-time compiler.
//!
//! This crate provides:
//! - Resolution of the core library members stubs call
//! - IL synthesis for task-returning thunks and resumption stubs
//! - The IL provider that picks authored, synthesized or manifest-wrapped bodies
//! - The manifest module and its single-threaded token creation phase
//! - A two-phase compilation driver
//! - Executable models of the stub protocols
//! - Configuration and logging

pub mod config;
pub mod driver;
pub mod error;
pub mod il_provider;
pub mod logging;
pub mod module_group;
pub mod mutable_module;
pub mod simulation;
pub mod stubs;
pub mod well_known;

// Re-export commonly used items
pub use config::{CompilerConfig, ConfigError};
pub use driver::{Compilation, CompilationOutput, CompiledMethod};
pub use error::{CompileError, CompileResult, StubError};
pub use il_provider::{AuthoredBodies, ILProvider, ILProviderBuilder, MethodBodySource};
pub use logging::{LogFormat, LogOptions, init_logging};
pub use module_group::CompilationModuleGroup;
pub use mutable_module::{MutableModule, SourceModuleGuard};
pub use simulation::{
    CalleeBehavior, StubRun, ThunkEvent, ThunkRun, ThunkState, reference_thunk, simulate_resumption_stub,
    simulate_task_returning_thunk,
};
pub use stubs::{emit_resumption_stub, emit_task_returning_thunk};
pub use well_known::{LibraryType, TaskFamily, TaskReturnShape, WellKnownMember};
