use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vivarium_dsl::lexer::Lexer;
use vivarium_dsl::ScriptEngine;

const CONFIG_MIN: &str = r#"
Value pop_cap = 1000;
Value mut_rate = 0.0075;
Struct world {
  Value width = 60;
  Value height = 60;
  String topology = "toroidal";
}
Value cells = world.width * world.height;
"#;

const TICKER: &str = r#"
Value beats = 0;
@UPDATE(1, 1) beats = beats + 1;
"#;

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("dsl/tokenize_min", |b| {
        b.iter(|| {
            let tokens = Lexer::new(black_box(CONFIG_MIN), "bench")
                .tokenize()
                .expect("tokenize config");
            black_box(tokens.len());
        });
    });
}

fn bench_load(c: &mut Criterion) {
    c.bench_function("dsl/load_min", |b| {
        b.iter(|| {
            let mut engine = ScriptEngine::new();
            engine
                .load_str(black_box(CONFIG_MIN), "bench")
                .expect("load config");
            black_box(engine.write_config().len());
        });
    });
}

fn bench_update_ticks(c: &mut Criterion) {
    c.bench_function("dsl/update_1k_ticks", |b| {
        b.iter(|| {
            let mut engine = ScriptEngine::new();
            engine.load_str(black_box(TICKER), "bench").expect("load ticker");
            engine.update(1000);
            black_box(engine.current_update());
        });
    });
}

criterion_group!(benches, bench_tokenize, bench_load, bench_update_ticks);
criterion_main!(benches);
