use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use safepoint_compiler::ir::loop_analysis::{DominatorTree, LoopNestInfo};
use safepoint_compiler::ir::safepoints::{PlaceSafepoints, SafepointConfig};
use safepoint_compiler::ir::{
    CallAttributes, CompareOp, FunctionKind, FunctionSignatureBuilder, IrBuilder, IrModule, IrType,
};

/// One function with `loops` sequential loops, each with a nested inner
/// loop; every third inner body calls `alloc`.
fn build_loops(loops: usize) -> IrModule {
    let mut builder = IrBuilder::new("bench".to_string(), "bench.mir".to_string());
    let void = FunctionSignatureBuilder::new().build();
    builder.declare_function("gc.safepoint_poll".to_string(), void.clone(), FunctionKind::ExternC);
    let alloc = builder.declare_function("alloc".to_string(), void, FunctionKind::ExternC);

    let sig = FunctionSignatureBuilder::new()
        .param("n".to_string(), IrType::I64)
        .build();
    builder.start_function("hot".to_string(), sig);
    builder.set_gc("statepoint-example");
    let n = builder.current_function().unwrap().signature.parameters[0].reg;
    let zero = builder.build_int(0, IrType::I64).unwrap();

    for i in 0..loops {
        let outer = builder.create_block().unwrap();
        let inner = builder.create_block().unwrap();
        let inner_body = builder.create_block().unwrap();
        let latch = builder.create_block().unwrap();
        let next = builder.create_block().unwrap();
        builder.build_branch(outer);

        builder.switch_to_block(outer);
        let c = builder.build_cmp(CompareOp::Gt, n, zero).unwrap();
        builder.build_cond_branch(c, inner, next);

        builder.switch_to_block(inner);
        let c = builder.build_cmp(CompareOp::Lt, zero, n).unwrap();
        builder.build_cond_branch(c, inner_body, latch);

        builder.switch_to_block(inner_body);
        if i % 3 == 0 {
            builder.build_call_direct(alloc, vec![], CallAttributes::default());
        }
        builder.build_branch(inner);

        builder.switch_to_block(latch);
        builder.build_branch(outer);

        builder.switch_to_block(next);
    }
    builder.build_return(None);
    builder.finish_function();
    builder.module
}

fn bench_place_safepoints(c: &mut Criterion) {
    let driver = PlaceSafepoints::new(SafepointConfig::default());
    let mut group = c.benchmark_group("place_safepoints");

    for loops in [4, 32, 256].iter() {
        let module = build_loops(*loops);
        group.bench_with_input(BenchmarkId::from_parameter(loops), &module, |b, module| {
            b.iter(|| {
                let mut module = module.clone();
                black_box(driver.run_on_module(&mut module).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_analyses(c: &mut Criterion) {
    let module = build_loops(64);
    let function = module.find_function("hot").unwrap();

    c.bench_function("dominator_tree_64_loops", |b| {
        b.iter(|| black_box(DominatorTree::compute(black_box(function))))
    });

    let dom = DominatorTree::compute(function);
    c.bench_function("loop_nest_64_loops", |b| {
        b.iter(|| black_box(LoopNestInfo::analyze(black_box(function), &dom)))
    });
}

criterion_group!(benches, bench_place_safepoints, bench_analyses);
criterion_main!(benches);
