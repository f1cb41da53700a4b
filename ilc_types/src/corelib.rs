//! Core library surface used by async thunks.
//!
//! Installs the task-like types and runtime helpers the thunk synthesizer
//! resolves by name. Everything is defined in the system module; the member
//! set mirrors what the emitted IL calls:
//!
//! ```text
//! System.Threading.Tasks
//!   Task                 static Task          get_CompletedTask()
//!                        static Task`1<!!0>   FromResult<T>(!!0)
//!   Task`1 : Task
//!   ValueTask (struct)   static ValueTask     get_CompletedTask()
//!                        static ValueTask`1<!!0> FromResult<T>(!!0)
//!   ValueTask`1 (struct)
//!
//! System.Runtime.CompilerServices
//!   AsyncHelpers         {Task,ValueTask}FromException[<T>](Exception)
//!                        Finalize{Task,ValueTask}ReturningThunk[<T>]()
//!   ExecutionAndSyncBlockStore (struct)   void Push()  void Pop()
//!   Continuation
//!
//! System.StubHelpers
//!   StubHelpers          static Continuation AsyncCallContinuation()
//! ```

use crate::context::{MethodDefinition, TypeDefinition, TypeSystemContext};
use crate::method::MethodAttributes;
use crate::module::ModuleId;
use crate::signature::{Instantiation, MethodSignature, SignatureFlags};
use crate::task_like::TASKS_NAMESPACE;
use crate::types::{GenericParameterKind, TypeAttributes, TypeHandle, WellKnownType};

/// Namespace of the async runtime helpers.
pub const COMPILER_SERVICES_NAMESPACE: &str = "System.Runtime.CompilerServices";

/// Namespace of the stub helper intrinsics.
pub const STUB_HELPERS_NAMESPACE: &str = "System.StubHelpers";

/// The task-like type definitions.
#[derive(Debug, Clone)]
pub struct TaskTypes {
    pub task: TypeHandle,
    pub task_of_t: TypeHandle,
    pub value_task: TypeHandle,
    pub value_task_of_t: TypeHandle,
}

/// Handles to everything [`install_async_library`] defines.
#[derive(Debug, Clone)]
pub struct AsyncLibrary {
    pub task: TypeHandle,
    pub task_of_t: TypeHandle,
    pub value_task: TypeHandle,
    pub value_task_of_t: TypeHandle,
    pub async_helpers: TypeHandle,
    pub execution_store: TypeHandle,
    pub continuation: TypeHandle,
    pub stub_helpers: TypeHandle,
}

/// Define the task-like types and their factory members.
pub fn install_task_types(ctx: &TypeSystemContext) -> TaskTypes {
    let task = ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, TASKS_NAMESPACE, "Task"));
    let task_of_t = ctx.define_type(
        TypeDefinition::new(ModuleId::SYSTEM, TASKS_NAMESPACE, "Task`1")
            .generic(1)
            .base(&task),
    );
    let value_task = ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, TASKS_NAMESPACE, "ValueTask").value_type());
    let value_task_of_t = ctx.define_type(
        TypeDefinition::new(ModuleId::SYSTEM, TASKS_NAMESPACE, "ValueTask`1")
            .generic(1)
            .value_type(),
    );

    let m0 = ctx.get_signature_variable(GenericParameterKind::Method, 0);
    for (family, generic) in [(&task, &task_of_t), (&value_task, &value_task_of_t)] {
        define_static(ctx, family, "get_CompletedTask", 0, family.clone(), &[]);
        let result = ctx.get_instantiated_type(generic, Instantiation::from_slice(&[m0.clone()]));
        define_static(ctx, family, "FromResult", 1, result, &[m0.clone()]);
    }

    TaskTypes {
        task,
        task_of_t,
        value_task,
        value_task_of_t,
    }
}

/// Define the full async library surface: task types, `AsyncHelpers`,
/// `ExecutionAndSyncBlockStore`, `Continuation` and `StubHelpers`.
pub fn install_async_library(ctx: &TypeSystemContext) -> AsyncLibrary {
    let tasks = install_task_types(ctx);
    let exception = ctx.get_well_known_type(WellKnownType::Exception);
    let void = ctx.get_well_known_type(WellKnownType::Void);
    let m0 = ctx.get_signature_variable(GenericParameterKind::Method, 0);

    let async_helpers = ctx.define_type(
        TypeDefinition::new(ModuleId::SYSTEM, COMPILER_SERVICES_NAMESPACE, "AsyncHelpers")
            .with_attributes(TypeAttributes::ABSTRACT | TypeAttributes::SEALED),
    );
    for (prefix, family, generic) in [
        ("Task", &tasks.task, &tasks.task_of_t),
        ("ValueTask", &tasks.value_task, &tasks.value_task_of_t),
    ] {
        let of_m0 = ctx.get_instantiated_type(generic, Instantiation::from_slice(&[m0.clone()]));
        let from_exception = format!("{}FromException", prefix);
        let finalize = format!("Finalize{}ReturningThunk", prefix);

        define_static(ctx, &async_helpers, &from_exception, 0, family.clone(), &[exception.clone()]);
        define_static(ctx, &async_helpers, &from_exception, 1, of_m0.clone(), &[exception.clone()]);
        define_static(ctx, &async_helpers, &finalize, 0, family.clone(), &[]);
        define_static(ctx, &async_helpers, &finalize, 1, of_m0, &[]);
    }

    let execution_store = ctx.define_type(
        TypeDefinition::new(ModuleId::SYSTEM, COMPILER_SERVICES_NAMESPACE, "ExecutionAndSyncBlockStore").value_type(),
    );
    for name in ["Push", "Pop"] {
        ctx.define_method(MethodDefinition::new(
            &execution_store,
            name,
            MethodSignature::new(SignatureFlags::NONE, 0, void.clone(), &[]),
        ));
    }

    let continuation = ctx.define_type(TypeDefinition::new(
        ModuleId::SYSTEM,
        COMPILER_SERVICES_NAMESPACE,
        "Continuation",
    ));

    let stub_helpers = ctx.define_type(
        TypeDefinition::new(ModuleId::SYSTEM, STUB_HELPERS_NAMESPACE, "StubHelpers")
            .with_attributes(TypeAttributes::ABSTRACT | TypeAttributes::SEALED),
    );
    ctx.define_method(
        MethodDefinition::new(
            &stub_helpers,
            "AsyncCallContinuation",
            MethodSignature::new(SignatureFlags::STATIC, 0, continuation.clone(), &[]),
        )
        .with_attributes(MethodAttributes::INTRINSIC),
    );

    tracing::debug!("installed async library surface");

    AsyncLibrary {
        task: tasks.task,
        task_of_t: tasks.task_of_t,
        value_task: tasks.value_task,
        value_task_of_t: tasks.value_task_of_t,
        async_helpers,
        execution_store,
        continuation,
        stub_helpers,
    }
}

fn define_static(
    ctx: &TypeSystemContext,
    owner: &TypeHandle,
    name: &str,
    generic_parameter_count: u32,
    return_type: TypeHandle,
    parameters: &[TypeHandle],
) {
    ctx.define_method(MethodDefinition::new(
        owner,
        name,
        MethodSignature::new(SignatureFlags::STATIC, generic_parameter_count, return_type, parameters),
    ));
}
