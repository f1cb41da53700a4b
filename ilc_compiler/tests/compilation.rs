//! End-to-end runs of the two-phase driver.

mod common;

use common::Universe;
use ilc_compiler::{Compilation, CompilationOutput, CompileError, CompilerConfig, StubError};
use ilc_il::{ILEmitter, ILOpcode, TokenObject, disassemble};
use ilc_types::{MethodHandle, SignatureFlags, TypeDefinition, TypeSystemComparer};

fn config(parallelism: usize) -> CompilerConfig {
    CompilerConfig {
        parallelism,
        ..CompilerConfig::default()
    }
}

fn listings(output: &CompilationOutput) -> Vec<String> {
    output
        .methods
        .iter()
        .map(|compiled| match &compiled.il {
            Some(il) => disassemble(il).unwrap(),
            None => format!("// {} (no body)", compiled.method),
        })
        .collect()
}

/// Several runtime-async and plain methods calling into `Lib`.
fn populate(u: &Universe) -> Vec<MethodHandle> {
    let int32 = u.int32();
    let math = u.ctx.define_type(TypeDefinition::new(u.lib, "Lib", "Math"));
    let one = u.define_on(&math, SignatureFlags::STATIC, "One", int32.clone(), &[]);
    let two = u.define_on(&math, SignatureFlags::STATIC, "Two", int32.clone(), &[]);
    u.constant_body(&one, 1);
    u.forwarding_body(&two, &one);

    let mut roots = Vec::new();
    for index in 0..6 {
        let run = u.define_runtime_async(&format!("Run{}Async", index), u.task_of(&int32), &[]);
        u.forwarding_body(&run, &two);
        roots.push(run);
    }
    let plain = u.define_static("Main", int32.clone(), &[]);
    u.forwarding_body(&plain, &two);
    roots.push(plain);
    roots
}

// ════════════════════════════════════════════════════════════════════════════
// Ordering
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_output_is_independent_of_parallelism() {
    let u = Universe::new();
    let roots = populate(&u);

    let serial = Compilation::new(&u.ctx, config(1), u.group(), u.bodies.clone())
        .run(&roots)
        .unwrap();
    let mut reversed = roots.clone();
    reversed.reverse();
    let parallel = Compilation::new(&u.ctx, config(8), u.group(), u.bodies.clone())
        .run(&reversed)
        .unwrap();

    assert_eq!(listings(&serial), listings(&parallel));
    assert_eq!(serial.manifest_tokens, parallel.manifest_tokens);
}

#[test]
fn test_results_in_comparer_order() {
    let u = Universe::new();
    let roots = populate(&u);
    let output = Compilation::new(&u.ctx, config(4), u.group(), u.bodies.clone())
        .run(&roots)
        .unwrap();

    let methods: Vec<MethodHandle> = output.methods.iter().map(|c| c.method.clone()).collect();
    let mut sorted = methods.clone();
    TypeSystemComparer::new().sort_methods(&mut sorted);
    assert_eq!(methods, sorted);
}

// ════════════════════════════════════════════════════════════════════════════
// Root expansion
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_runtime_async_root_compiles_variant_and_stub() {
    let u = Universe::new();
    let int32 = u.int32();
    let run = u.define_runtime_async("RunAsync", u.task_of(&int32), &[]);
    u.constant_body(&run, 3);

    let output = Compilation::new(&u.ctx, config(2), u.group(), u.bodies.clone())
        .run(std::slice::from_ref(&run))
        .unwrap();
    assert_eq!(output.methods.len(), 3);

    let variant = u.ctx.get_async_variant(&run);
    let stub = u.ctx.get_resumption_stub(&variant);
    let thunk = output.get(&run).and_then(|c| c.il.as_ref()).unwrap();
    assert_eq!(thunk.exception_regions().len(), 2);
    let body = output.get(&variant).and_then(|c| c.il.as_ref()).unwrap();
    assert_eq!(body.owning_method(), &variant);
    assert!(output.get(&stub).and_then(|c| c.il.as_ref()).is_some());
}

// ════════════════════════════════════════════════════════════════════════════
// Cross-module tokens
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_callees_outside_bubble_get_manifest_bodies() {
    let u = Universe::new();
    let roots = populate(&u);
    let output = Compilation::new(&u.ctx, config(4), u.group(), u.bodies.clone())
        .run(&roots)
        .unwrap();

    // Lib.Math.Two is a direct callee; its body references Lib.Math.One
    assert_eq!(output.manifest_tokens, 1);
    assert!(output.cross_module_inlineable.is_empty());
}

#[test]
fn test_cross_module_inlining_can_be_disabled() {
    let u = Universe::new();
    let roots = populate(&u);
    let config = CompilerConfig {
        cross_module_inlining: false,
        ..config(2)
    };
    let output = Compilation::new(&u.ctx, config, u.group(), u.bodies.clone())
        .run(&roots)
        .unwrap();
    assert_eq!(output.manifest_tokens, 0);
}

#[test]
fn test_inlineable_root_is_reported() {
    let u = Universe::new();
    let int32 = u.int32();
    let math = u.ctx.define_type(TypeDefinition::new(u.lib, "Lib", "Math"));
    let one = u.define_on(&math, SignatureFlags::STATIC, "One", int32.clone(), &[]);
    let two = u.define_on(&math, SignatureFlags::STATIC, "Two", int32, &[]);
    u.constant_body(&one, 1);
    u.forwarding_body(&two, &one);

    let output = Compilation::new(&u.ctx, config(1), u.group(), u.bodies.clone())
        .run(std::slice::from_ref(&two))
        .unwrap();
    assert_eq!(output.cross_module_inlineable, vec![two.clone()]);

    let il = output.get(&two).and_then(|c| c.il.as_ref()).unwrap();
    let token = il.referenced_tokens().unwrap()[0];
    assert_eq!(il.get_object(token), Some(TokenObject::Method(one)));
}

#[test]
fn test_unexpressible_body_falls_back_to_no_il() {
    let u = Universe::new();
    let int32 = u.int32();
    let other = u.ctx.define_module("Other");
    let foreign_ty = u.ctx.define_type(TypeDefinition::new(other, "Other", "Thing"));
    let foreign = u.define_on(&foreign_ty, SignatureFlags::STATIC, "Get", int32.clone(), &[]);
    let math = u.ctx.define_type(TypeDefinition::new(u.lib, "Lib", "Math"));
    let leaky = u.define_on(&math, SignatureFlags::STATIC, "Leaky", int32, &[]);
    u.forwarding_body(&leaky, &foreign);

    let output = Compilation::new(&u.ctx, config(1), u.group(), u.bodies.clone())
        .run(std::slice::from_ref(&leaky))
        .unwrap();
    assert!(output.get(&leaky).unwrap().il.is_none());
    assert!(output.cross_module_inlineable.is_empty());
}

// ════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_library_member_aborts_with_method_name() {
    let ctx = ilc_types::TypeSystemContext::default();
    ilc_types::corelib::install_task_types(&ctx);
    let app = ctx.define_module("App");
    let program = ctx.define_type(TypeDefinition::new(app, "App", "Program"));
    let task = ctx
        .get_known_type(ilc_types::ModuleId::SYSTEM, "System.Threading.Tasks", "Task")
        .unwrap();
    let run = ctx.define_method(
        ilc_types::MethodDefinition::new(
            &program,
            "RunAsync",
            ilc_types::MethodSignature::new(SignatureFlags::STATIC, 0, task, &[]),
        )
        .runtime_async(),
    );

    let bodies = std::sync::Arc::new(ilc_compiler::AuthoredBodies::new());
    let mut e = ILEmitter::new(&ctx);
    e.emit(ILOpcode::Ret);
    bodies.insert(e.link(&run));

    let group = ilc_compiler::CompilationModuleGroup::new([app]);
    let error = Compilation::new(&ctx, config(2), group, bodies)
        .run(std::slice::from_ref(&run))
        .unwrap_err();
    assert!(matches!(error, CompileError::Stub(StubError::MissingType { .. })));
    assert!(error.to_string().contains("App.Program.RunAsync"), "{}", error);
}
