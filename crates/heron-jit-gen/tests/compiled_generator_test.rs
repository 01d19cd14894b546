//! Driving generators whose bodies went through the JIT coordinator.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use heron_jit_exec::{
    CodeMetrics, CodeObject, CompilationEngine, Coordinator, CompileOutcome, EngineResult,
    FunctionFlags, FunctionId, JitConfig, JitFunction,
};
use heron_jit_gen::{ExecutionFooter, GenState, JitGenerator, LiveLocals, ResumeInput};

type Footer = ExecutionFooter<LiveLocals<u32>>;

/// Engine that only compiles generator functions.
#[derive(Default)]
struct GeneratorEngine {
    compiled: Mutex<HashSet<FunctionId>>,
}

impl CompilationEngine for GeneratorEngine {
    fn compile(&self, function: &JitFunction) -> EngineResult {
        if !function.is_generator() {
            return EngineResult::CannotSpecialize;
        }
        self.compiled.lock().unwrap().insert(function.id());
        EngineResult::Ok
    }

    fn did_compile(&self, function: &JitFunction) -> bool {
        self.compiled.lock().unwrap().contains(&function.id())
    }

    fn metrics(&self, _function: &JitFunction) -> Option<CodeMetrics> {
        None
    }
}

fn generator_function(qualname: &str) -> Arc<JitFunction> {
    JitFunction::with_flags(
        qualname,
        CodeObject::new(qualname),
        FunctionFlags {
            is_generator: true,
            ..FunctionFlags::default()
        },
    )
}

/// Counts down from the start local, yielding each value.
fn countdown(footer: &mut Footer, input: ResumeInput<u32>, _: bool) -> Option<u32> {
    let point = footer.take_yield_point()?;
    if input == ResumeInput::Throw {
        return None;
    }
    let remaining = *point.locals.first()?;
    if remaining == 0 {
        return None;
    }
    footer.set_yield_point(LiveLocals::new(point.resume_at + 1, vec![remaining - 1]));
    Some(remaining)
}

fn coordinator() -> Arc<Coordinator> {
    let config = JitConfig {
        enabled: true,
        ..JitConfig::default()
    };
    Coordinator::initialize(config, Arc::new(GeneratorEngine::default()), None).unwrap()
}

#[test]
fn test_compiled_generator_function_runs_to_completion() {
    let coordinator = coordinator();
    let function = generator_function("m:countdown");
    assert!(coordinator.register_function(&function));

    let outcome = coordinator.force_compile(&function.handle()).unwrap();
    assert_eq!(outcome, Some(CompileOutcome::Compiled));
    assert!(coordinator.is_compiled(&function.handle()));

    let mut generator =
        JitGenerator::for_function(&function, LiveLocals::new(0, vec![2]), Box::new(countdown))
            .expect("generator function");
    assert_eq!(generator.function_id(), Some(function.id()));
    assert_eq!(generator.state(), GenState::NotStarted);

    assert_eq!(generator.resume(ResumeInput::Send(None), false), Some(2));
    assert_eq!(generator.state(), GenState::Running);
    assert_eq!(generator.resume(ResumeInput::Send(None), false), Some(1));
    assert_eq!(generator.resume(ResumeInput::Send(None), false), None);
    assert_eq!(generator.state(), GenState::Completed);
}

#[test]
fn test_plain_function_gets_no_generator() {
    let coordinator = coordinator();
    let function = JitFunction::new("m:plain", CodeObject::new("m:plain"));
    coordinator.register_function(&function);

    let outcome = coordinator.force_compile(&function.handle()).unwrap();
    assert_eq!(outcome, Some(CompileOutcome::NotEligible));
    assert!(
        JitGenerator::for_function(&function, LiveLocals::new(0, vec![1]), Box::new(countdown))
            .is_none()
    );
}
