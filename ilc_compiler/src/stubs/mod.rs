//! IL synthesis for async calling-convention stubs.
//!
//! - [`emit_resumption_stub`]: resumes a suspended async call.
//! - [`emit_task_returning_thunk`]: exposes an async-callable method to
//!   ordinary callers as a task-returning method.
//!
//! Both bodies carry their own token table and reference core library
//! members resolved through [`crate::well_known`].

mod resumption;
mod task_wrapper;

pub use resumption::emit_resumption_stub;
pub use task_wrapper::emit_task_returning_thunk;
