use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use samplecoach_core::model::{GoalSource, QuestionSet, SampleRow, Task};
use samplecoach_core::planner::{plan_buckets, WindowLimits};
use samplecoach_core::prompt::{build_tasks, PromptSpec};
use samplecoach_core::traits::DEFAULT_PROMPT_TEMPLATE;

fn rows(n: usize) -> Vec<SampleRow> {
    (0..n)
        .map(|i| {
            let fields = [
                ("goal".to_string(), "Persuade readers to sign up".to_string()),
                (
                    "text".to_string(),
                    format!("Sample {i}: join today and get the first month free."),
                ),
            ]
            .into();
            SampleRow::new(i, fields)
        })
        .collect()
}

fn tasks(n: usize) -> Vec<Task> {
    let spec = PromptSpec::new(DEFAULT_PROMPT_TEMPLATE)
        .with_sample_column("text")
        .with_goal(GoalSource::Column("goal".into()));
    build_tasks(&rows(n), &QuestionSet::builtin(), &spec).unwrap_or_default()
}

fn bench_build(c: &mut Criterion) {
    let rows = rows(1000);
    let questions = QuestionSet::builtin();
    let spec = PromptSpec::new(DEFAULT_PROMPT_TEMPLATE)
        .with_sample_column("text")
        .with_goal(GoalSource::Manual("Sell".into()));

    c.bench_function("build_tasks 1000x8", |b| {
        b.iter(|| build_tasks(black_box(&rows), black_box(&questions), black_box(&spec)))
    });
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_buckets");
    for (name, limits) in [
        ("free tier", WindowLimits::new(20)),
        ("paid tier", WindowLimits::new(3500)),
        ("token bound", WindowLimits::new(3500).with_max_tokens(10_000)),
    ] {
        let input = tasks(1000);
        group.bench_function(name, |b| {
            b.iter_batched(
                || input.clone(),
                |tasks| plan_buckets(black_box(tasks), limits),
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_plan);
criterion_main!(benches);
