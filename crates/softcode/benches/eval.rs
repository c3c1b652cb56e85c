use criterion::{criterion_group, criterion_main, Criterion};
use mush_config::EngineConfig;
use mush_core::World;
use mush_softcode::flags::{EV_EVAL, EV_FCHECK, EV_TOP};
use mush_softcode::{Cursor, EvalContext, Evaluator};
use mush_world::MemoryWorld;
use std::hint::black_box;
use std::sync::Arc;

const FLAGS: u32 = EV_EVAL | EV_FCHECK | EV_TOP;

fn setup() -> (Evaluator, mush_core::Dbref) {
    let world = Arc::new(MemoryWorld::new());
    let player = world.create_player("Bench", false);
    world.set_attr(player, "DOUBLE", "[mul(%0,2)]");
    let shared: Arc<dyn World> = world;
    (Evaluator::new(shared, Arc::new(EngineConfig::default())), player)
}

fn bench_substitutions(c: &mut Criterion) {
    let (evaluator, player) = setup();
    let args = vec!["Alice".to_string(), "Bob".to_string()];
    c.bench_function("eval/substitutions", |b| {
        b.iter(|| {
            let mut ctx = EvalContext::new();
            let out = evaluator.evaluate_to_string(
                &mut ctx,
                player,
                player,
                player,
                FLAGS,
                black_box("Hi %0 and %1, you are %n (%#)."),
                &args,
            );
            black_box(out)
        });
    });
}

fn bench_nested_calls(c: &mut Criterion) {
    let (evaluator, player) = setup();
    c.bench_function("eval/nested_calls", |b| {
        b.iter(|| {
            let mut ctx = EvalContext::new();
            let out = evaluator.evaluate_to_string(
                &mut ctx,
                player,
                player,
                player,
                FLAGS,
                black_box("[iter(lnum(1,50),[u(me/DOUBLE,##)])]"),
                &[],
            );
            black_box(out)
        });
    });
}

fn bench_tokenizer(c: &mut Criterion) {
    let (evaluator, _) = setup();
    let line = "a[b,c],d(e,f),{g,h},i\\,j,k".repeat(20);
    c.bench_function("tokenizer/split_commas", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&line));
            let mut count = 0;
            while evaluator.tokenizer().split_at(&mut cursor, Some(b','), 0).is_some() {
                count += 1;
            }
            black_box(count)
        });
    });
}

criterion_group!(benches, bench_substitutions, bench_nested_calls, bench_tokenizer);
criterion_main!(benches);
