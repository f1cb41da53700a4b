//! Emitted task-returning thunks, executed against the library model.

mod common;

use common::Universe;
use ilc_compiler::simulation::EXCEPTION_OBJECT;
use ilc_compiler::{
    CalleeBehavior, StubError, ThunkEvent, ThunkState, emit_task_returning_thunk, reference_thunk,
    simulate_task_returning_thunk,
};
use ilc_il::{ExceptionRegionKind, MethodIL, Value, disassemble};
use ilc_types::{
    MethodHandle, SignatureFlags, TypeDefinition, TypeHandle, TypeSystemConfig, TypeSystemContext, WellKnownType,
};

const BEHAVIORS: [CalleeBehavior; 3] = [
    CalleeBehavior::Complete(Some(42)),
    CalleeBehavior::Suspend,
    CalleeBehavior::Throw,
];

fn thunk_for(u: &Universe, method: &MethodHandle) -> MethodIL {
    let variant = u.ctx.get_async_variant(method);
    let wrapper = u.ctx.get_task_returning_wrapper(&variant);
    emit_task_returning_thunk(&u.ctx, &wrapper, &variant).unwrap()
}

fn void_behavior(behavior: CalleeBehavior) -> CalleeBehavior {
    match behavior {
        CalleeBehavior::Complete(_) => CalleeBehavior::Complete(None),
        other => other,
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Structure
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_catch_nested_inside_finally() {
    let u = Universe::new();
    let int32 = u.int32();
    let fetch = u.define_static("FetchAsync", u.task_of(&int32), &[]);
    let il = thunk_for(&u, &fetch);

    let regions = il.exception_regions();
    assert_eq!(regions.len(), 2);
    let (inner, outer) = (regions[0], regions[1]);
    assert_eq!(inner.kind, ExceptionRegionKind::Catch);
    assert_eq!(outer.kind, ExceptionRegionKind::Finally);
    assert!(outer.try_contains(inner.try_offset));
    assert!(outer.try_contains(inner.handler_end() - 1));
    assert_eq!(outer.try_offset, inner.try_offset);

    let catch_type = il.get_object(inner.class_token.unwrap()).unwrap();
    assert_eq!(catch_type.as_type(), Some(&u.well_known(WellKnownType::Exception)));

    // Locals: task, logical result, execution store
    assert_eq!(il.locals().len(), 3);
    assert_eq!(il.locals()[1], int32);
    assert_eq!(il.locals()[2], u.library.execution_store);
}

#[test]
fn test_void_task_has_no_result_local() {
    let u = Universe::new();
    let fire = u.define_static("FireAsync", u.library.task.clone(), &[]);
    let il = thunk_for(&u, &fire);

    assert_eq!(il.locals().len(), 2);
    let listing = disassemble(&il).unwrap();
    assert!(listing.contains("get_CompletedTask"), "{}", listing);
    assert!(listing.contains("TaskFromException"), "{}", listing);
    assert!(listing.contains("FinalizeTaskReturningThunk"), "{}", listing);
    assert!(!listing.contains("FromResult"), "{}", listing);
}

#[test]
fn test_value_task_uses_value_task_helpers() {
    let u = Universe::new();
    let int32 = u.int32();
    let fetch = u.define_static("FetchAsync", u.value_task_of(&int32), &[]);
    let listing = disassemble(&thunk_for(&u, &fetch)).unwrap();

    assert!(listing.contains("System.Threading.Tasks.ValueTask.FromResult<System.Int32>"), "{}", listing);
    assert!(listing.contains("ValueTaskFromException<System.Int32>"), "{}", listing);
    assert!(listing.contains("FinalizeValueTaskReturningThunk<System.Int32>"), "{}", listing);
}

// ════════════════════════════════════════════════════════════════════════════
// Exit paths
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_interpreted_thunk_matches_reference_model() {
    let u = Universe::new();
    let int32 = u.int32();
    let fetch = u.define_static("FetchAsync", u.task_of(&int32), &[]);
    let il = thunk_for(&u, &fetch);

    for behavior in BEHAVIORS {
        let simulated = simulate_task_returning_thunk(&u.ctx, &il, behavior, vec![]).unwrap();
        assert_eq!(simulated, reference_thunk(behavior), "{:?}", behavior);
    }
}

#[test]
fn test_every_exit_pops_the_store_once() {
    let u = Universe::new();
    let int32 = u.int32();
    let returns: Vec<(TypeHandle, bool)> = vec![
        (u.task_of(&int32), true),
        (u.library.task.clone(), false),
        (u.value_task_of(&int32), true),
        (u.library.value_task.clone(), false),
    ];

    for (index, (ret, has_result)) in returns.into_iter().enumerate() {
        let method = u.define_static(&format!("Run{}Async", index), ret, &[]);
        let il = thunk_for(&u, &method);
        for behavior in BEHAVIORS {
            let behavior = if has_result { behavior } else { void_behavior(behavior) };
            let run = simulate_task_returning_thunk(&u.ctx, &il, behavior, vec![]).unwrap();
            assert_eq!(run.push_count(), 1, "{} {:?}", method, behavior);
            assert_eq!(run.pop_count(), 1, "{} {:?}", method, behavior);
            assert_eq!(run.events.last(), Some(&ThunkEvent::Pop));
            assert_eq!(run, reference_thunk(behavior), "{} {:?}", method, behavior);
        }
    }
}

#[test]
fn test_throwing_callee_faults_the_task() {
    let u = Universe::new();
    let int32 = u.int32();
    let fetch = u.define_static("FetchAsync", u.task_of(&int32), &[]);
    let il = thunk_for(&u, &fetch);

    let run = simulate_task_returning_thunk(&u.ctx, &il, CalleeBehavior::Throw, vec![]).unwrap();
    assert_eq!(run.state, ThunkState::Faulted);
    assert_eq!(run.value, Some(Value::Object(EXCEPTION_OBJECT)));
    assert_eq!(
        run.events,
        vec![ThunkEvent::Push, ThunkEvent::CallCallee, ThunkEvent::Fault, ThunkEvent::Pop]
    );
}

#[test]
fn test_suspension_is_not_caught() {
    let u = Universe::new();
    let fire = u.define_static("FireAsync", u.library.value_task.clone(), &[]);
    let il = thunk_for(&u, &fire);

    let run = simulate_task_returning_thunk(&u.ctx, &il, CalleeBehavior::Suspend, vec![]).unwrap();
    assert_eq!(run.state, ThunkState::Suspended);
    assert!(!run.events.contains(&ThunkEvent::Fault));
    assert!(run.events.contains(&ThunkEvent::Finalize));
}

#[test]
fn test_instance_thunk_forwards_receiver_and_arguments() {
    let u = Universe::new();
    let int32 = u.int32();
    let string = u.well_known(WellKnownType::String);
    let service = u.ctx.define_type(TypeDefinition::new(u.app, "App", "Service"));
    let fetch = u.define_on(
        &service,
        SignatureFlags::NONE,
        "FetchAsync",
        u.task_of(&string),
        &[int32.clone(), string.clone()],
    );
    let il = thunk_for(&u, &fetch);

    let args = vec![Value::Object(1), Value::Int(3), Value::Str("key".into())];
    let run = simulate_task_returning_thunk(&u.ctx, &il, CalleeBehavior::Complete(Some(8)), args).unwrap();
    assert_eq!(run.state, ThunkState::Finished);
    assert_eq!(run.value, Some(Value::Int(8)));
}

// ════════════════════════════════════════════════════════════════════════════
// Generics
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_generic_thunk_instantiates() {
    let u = Universe::new();
    let holder = u
        .ctx
        .define_type(TypeDefinition::new(u.app, "App", "Holder`1").generic(1));
    let t0 = u
        .ctx
        .get_signature_variable(ilc_types::GenericParameterKind::Type, 0);
    let get = u.define_on(&holder, SignatureFlags::NONE, "GetAsync", u.task_of(&t0), &[]);
    let typical_il = thunk_for(&u, &get);

    let int32 = u.int32();
    let holder_of_int = u.ctx.get_instantiated_type(&holder, vec![int32.clone()].into());
    let get_int = u.ctx.get_method_for_instantiated_type(&get, &holder_of_int);
    let variant = u.ctx.get_async_variant(&get_int);
    let wrapper = u.ctx.get_task_returning_wrapper(&variant);
    let il = typical_il.instantiate(&u.ctx, &wrapper).unwrap();

    assert_eq!(il.locals()[1], int32);
    let listing = disassemble(&il).unwrap();
    assert!(listing.contains("FromResult<System.Int32>"), "{}", listing);

    let run = simulate_task_returning_thunk(&u.ctx, &il, CalleeBehavior::Complete(Some(2)), vec![Value::Object(1)])
        .unwrap();
    assert_eq!(run, reference_thunk(CalleeBehavior::Complete(Some(2))));
}

// ════════════════════════════════════════════════════════════════════════════
// Missing library members
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_library_is_reported_for_the_method() {
    let ctx = TypeSystemContext::new(TypeSystemConfig::default());
    ilc_types::corelib::install_task_types(&ctx);
    let app = ctx.define_module("App");
    let program = ctx.define_type(TypeDefinition::new(app, "App", "Program"));
    let task = ctx
        .get_known_type(ilc_types::ModuleId::SYSTEM, "System.Threading.Tasks", "Task")
        .unwrap();
    let run = ctx.define_method(ilc_types::MethodDefinition::new(
        &program,
        "RunAsync",
        ilc_types::MethodSignature::new(SignatureFlags::STATIC, 0, task, &[]),
    ));
    let variant = ctx.get_async_variant(&run);
    let wrapper = ctx.get_task_returning_wrapper(&variant);

    let error = emit_task_returning_thunk(&ctx, &wrapper, &variant).unwrap_err();
    assert!(matches!(error, StubError::MissingType { name: "ExecutionAndSyncBlockStore", .. }));
    assert!(error.method().contains("App.Program.RunAsync"), "{}", error);
}
