//! Core library members referenced by synthesized stubs.
//!
//! The set is closed: every member a stub may call is a [`WellKnownMember`],
//! resolved by exact namespace, type name, member name and genericity. There
//! is no lookup by inheritance or overload resolution.

use crate::error::StubError;
use ilc_types::corelib::{COMPILER_SERVICES_NAMESPACE, STUB_HELPERS_NAMESPACE};
use ilc_types::task_like::TASKS_NAMESPACE;
use ilc_types::{Instantiation, MethodHandle, ModuleId, TaskLikeKind, TypeHandle, TypeSystemContext};

// =============================================================================
// Types
// =============================================================================

/// Core library types stubs refer to by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryType {
    Task,
    ValueTask,
    AsyncHelpers,
    ExecutionAndSyncBlockStore,
    Continuation,
    StubHelpers,
}

impl LibraryType {
    /// Namespace and metadata name.
    pub const fn location(self) -> (&'static str, &'static str) {
        match self {
            LibraryType::Task => (TASKS_NAMESPACE, "Task"),
            LibraryType::ValueTask => (TASKS_NAMESPACE, "ValueTask"),
            LibraryType::AsyncHelpers => (COMPILER_SERVICES_NAMESPACE, "AsyncHelpers"),
            LibraryType::ExecutionAndSyncBlockStore => (COMPILER_SERVICES_NAMESPACE, "ExecutionAndSyncBlockStore"),
            LibraryType::Continuation => (COMPILER_SERVICES_NAMESPACE, "Continuation"),
            LibraryType::StubHelpers => (STUB_HELPERS_NAMESPACE, "StubHelpers"),
        }
    }

    /// Resolve in the system module. `for_method` names the stub being built.
    pub fn resolve(self, ctx: &TypeSystemContext, for_method: &MethodHandle) -> Result<TypeHandle, StubError> {
        let (namespace, name) = self.location();
        ctx.get_known_type(ModuleId::SYSTEM, namespace, name)
            .ok_or_else(|| StubError::MissingType {
                method: for_method.display_name(),
                namespace,
                name,
            })
    }
}

// =============================================================================
// Members
// =============================================================================

/// Core library methods stubs call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownMember {
    TaskFromResult,
    TaskCompletedTask,
    ValueTaskFromResult,
    ValueTaskCompletedTask,
    TaskFromException,
    TaskFromExceptionOfT,
    ValueTaskFromException,
    ValueTaskFromExceptionOfT,
    FinalizeTaskReturningThunk,
    FinalizeTaskReturningThunkOfT,
    FinalizeValueTaskReturningThunk,
    FinalizeValueTaskReturningThunkOfT,
    ExecutionStorePush,
    ExecutionStorePop,
    AsyncCallContinuation,
}

impl WellKnownMember {
    /// Declaring type, member name and whether the member is generic.
    pub const fn location(self) -> (LibraryType, &'static str, bool) {
        use LibraryType::*;
        use WellKnownMember as M;
        match self {
            M::TaskFromResult => (Task, "FromResult", true),
            M::TaskCompletedTask => (Task, "get_CompletedTask", false),
            M::ValueTaskFromResult => (ValueTask, "FromResult", true),
            M::ValueTaskCompletedTask => (ValueTask, "get_CompletedTask", false),
            M::TaskFromException => (AsyncHelpers, "TaskFromException", false),
            M::TaskFromExceptionOfT => (AsyncHelpers, "TaskFromException", true),
            M::ValueTaskFromException => (AsyncHelpers, "ValueTaskFromException", false),
            M::ValueTaskFromExceptionOfT => (AsyncHelpers, "ValueTaskFromException", true),
            M::FinalizeTaskReturningThunk => (AsyncHelpers, "FinalizeTaskReturningThunk", false),
            M::FinalizeTaskReturningThunkOfT => (AsyncHelpers, "FinalizeTaskReturningThunk", true),
            M::FinalizeValueTaskReturningThunk => (AsyncHelpers, "FinalizeValueTaskReturningThunk", false),
            M::FinalizeValueTaskReturningThunkOfT => (AsyncHelpers, "FinalizeValueTaskReturningThunk", true),
            M::ExecutionStorePush => (ExecutionAndSyncBlockStore, "Push", false),
            M::ExecutionStorePop => (ExecutionAndSyncBlockStore, "Pop", false),
            M::AsyncCallContinuation => (StubHelpers, "AsyncCallContinuation", false),
        }
    }

    /// Whether the member takes a method-level type argument.
    #[inline]
    pub const fn is_generic(self) -> bool {
        self.location().2
    }

    /// Resolve the member definition.
    pub fn resolve(self, ctx: &TypeSystemContext, for_method: &MethodHandle) -> Result<MethodHandle, StubError> {
        let (owner, name, generic) = self.location();
        let owner = owner.resolve(ctx, for_method)?;
        ctx.find_method(&owner, name, generic)
            .ok_or_else(|| StubError::MissingMethod {
                method: for_method.display_name(),
                owner: owner.display_name(),
                name,
                generic,
            })
    }

    /// Resolve the member, instantiated over `result` when it is generic.
    ///
    /// # Panics
    ///
    /// Panics if a result type is given for a non-generic member or missing
    /// for a generic one.
    pub fn resolve_for(
        self,
        ctx: &TypeSystemContext,
        for_method: &MethodHandle,
        result: Option<&TypeHandle>,
    ) -> Result<MethodHandle, StubError> {
        let definition = self.resolve(ctx, for_method)?;
        match (self.is_generic(), result) {
            (true, Some(result)) => Ok(ctx.get_instantiated_method(
                &definition,
                Instantiation::from_slice(std::slice::from_ref(result)),
            )),
            (false, None) => Ok(definition),
            (generic, _) => panic!(
                "{:?} is {}generic but was requested {} a result type while building {}",
                self,
                if generic { "" } else { "not " },
                if generic { "without" } else { "with" },
                for_method
            ),
        }
    }
}

// =============================================================================
// Task Shapes
// =============================================================================

/// Heap or value-type task family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskFamily {
    Task,
    ValueTask,
}

impl From<TaskLikeKind> for TaskFamily {
    fn from(kind: TaskLikeKind) -> Self {
        if kind.is_value_task() {
            TaskFamily::ValueTask
        } else {
            TaskFamily::Task
        }
    }
}

/// How a task-returning method's result is packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReturnShape {
    pub family: TaskFamily,
    /// Logical result type for `Task<T>` and `ValueTask<T>`.
    pub result: Option<TypeHandle>,
}

impl TaskReturnShape {
    /// Shape of `return_type`, or `None` when it is not task-like.
    pub fn of(return_type: &TypeHandle) -> Option<Self> {
        let kind = TaskLikeKind::of(return_type)?;
        Some(Self {
            family: kind.into(),
            result: if kind.has_result() {
                return_type.instantiation().first().cloned()
            } else {
                None
            },
        })
    }

    /// Builds the completed task from the stored result.
    pub fn from_result(&self) -> WellKnownMember {
        match self.family {
            TaskFamily::Task => WellKnownMember::TaskFromResult,
            TaskFamily::ValueTask => WellKnownMember::ValueTaskFromResult,
        }
    }

    pub fn completed_task(&self) -> WellKnownMember {
        match self.family {
            TaskFamily::Task => WellKnownMember::TaskCompletedTask,
            TaskFamily::ValueTask => WellKnownMember::ValueTaskCompletedTask,
        }
    }

    pub fn from_exception(&self) -> WellKnownMember {
        match (self.family, self.result.is_some()) {
            (TaskFamily::Task, false) => WellKnownMember::TaskFromException,
            (TaskFamily::Task, true) => WellKnownMember::TaskFromExceptionOfT,
            (TaskFamily::ValueTask, false) => WellKnownMember::ValueTaskFromException,
            (TaskFamily::ValueTask, true) => WellKnownMember::ValueTaskFromExceptionOfT,
        }
    }

    pub fn finalize_thunk(&self) -> WellKnownMember {
        match (self.family, self.result.is_some()) {
            (TaskFamily::Task, false) => WellKnownMember::FinalizeTaskReturningThunk,
            (TaskFamily::Task, true) => WellKnownMember::FinalizeTaskReturningThunkOfT,
            (TaskFamily::ValueTask, false) => WellKnownMember::FinalizeValueTaskReturningThunk,
            (TaskFamily::ValueTask, true) => WellKnownMember::FinalizeValueTaskReturningThunkOfT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilc_types::{MethodDefinition, MethodSignature, SignatureFlags, TypeDefinition, WellKnownType, install_async_library};

    fn caller(ctx: &TypeSystemContext) -> MethodHandle {
        let app = ctx.define_module("App");
        let ty = ctx.define_type(TypeDefinition::new(app, "App", "Program"));
        let void = ctx.get_well_known_type(WellKnownType::Void);
        ctx.define_method(MethodDefinition::new(
            &ty,
            "Run",
            MethodSignature::new(SignatureFlags::STATIC, 0, void, &[]),
        ))
    }

    // ════════════════════════════════════════════════════════════════════════
    // Resolution
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_every_member_resolves_against_the_library() {
        let ctx = TypeSystemContext::default();
        install_async_library(&ctx);
        let m = caller(&ctx);
        let int32 = ctx.get_well_known_type(WellKnownType::Int32);

        use WellKnownMember::*;
        for member in [
            TaskFromResult,
            TaskCompletedTask,
            ValueTaskFromResult,
            ValueTaskCompletedTask,
            TaskFromException,
            TaskFromExceptionOfT,
            ValueTaskFromException,
            ValueTaskFromExceptionOfT,
            FinalizeTaskReturningThunk,
            FinalizeTaskReturningThunkOfT,
            FinalizeValueTaskReturningThunk,
            FinalizeValueTaskReturningThunkOfT,
            ExecutionStorePush,
            ExecutionStorePop,
            AsyncCallContinuation,
        ] {
            let result = member.is_generic().then_some(&int32);
            let resolved = member.resolve_for(&ctx, &m, result).unwrap();
            assert_eq!(resolved.name(), member.location().1);
            assert_eq!(resolved.has_instantiation(), member.is_generic());
        }
    }

    #[test]
    fn test_missing_members_are_reported() {
        let ctx = TypeSystemContext::default();
        let m = caller(&ctx);
        let err = WellKnownMember::TaskCompletedTask.resolve(&ctx, &m).unwrap_err();
        assert_eq!(
            err,
            StubError::MissingType {
                method: "App.Program.Run".into(),
                namespace: TASKS_NAMESPACE,
                name: "Task",
            }
        );

        ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, COMPILER_SERVICES_NAMESPACE, "AsyncHelpers"));
        let err = WellKnownMember::FinalizeTaskReturningThunk.resolve(&ctx, &m).unwrap_err();
        assert!(matches!(err, StubError::MissingMethod { name: "FinalizeTaskReturningThunk", .. }));
    }

    #[test]
    #[should_panic(expected = "is generic but was requested without a result type")]
    fn test_generic_member_needs_result() {
        let ctx = TypeSystemContext::default();
        install_async_library(&ctx);
        let m = caller(&ctx);
        let _ = WellKnownMember::TaskFromResult.resolve_for(&ctx, &m, None);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Shapes
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_task_shapes() {
        let ctx = TypeSystemContext::default();
        let lib = install_async_library(&ctx);
        let string = ctx.get_well_known_type(WellKnownType::String);
        let value_task_of_string =
            ctx.get_instantiated_type(&lib.value_task_of_t, Instantiation::from_slice(&[string.clone()]));

        let shape = TaskReturnShape::of(&value_task_of_string).unwrap();
        assert_eq!(shape.family, TaskFamily::ValueTask);
        assert_eq!(shape.result, Some(string));
        assert_eq!(shape.from_exception(), WellKnownMember::ValueTaskFromExceptionOfT);
        assert_eq!(shape.finalize_thunk(), WellKnownMember::FinalizeValueTaskReturningThunkOfT);

        let plain = TaskReturnShape::of(&lib.task).unwrap();
        assert_eq!(plain.result, None);
        assert_eq!(plain.completed_task(), WellKnownMember::TaskCompletedTask);
        assert_eq!(plain.from_exception(), WellKnownMember::TaskFromException);

        assert_eq!(TaskReturnShape::of(&ctx.get_well_known_type(WellKnownType::Int32)), None);
    }
}
