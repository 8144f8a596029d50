use agentrelay::agent::ScriptedAgent;
use agentrelay::conversation::Conversation;
use agentrelay::workflow::{CancelSignal, NullSink, WorkflowBuilder, WorkflowDefinition};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

const DEFINITION: &str = r#"
entry = "order"
max_steps = 8

[[agents]]
id = "order"
kind = "scripted"
replies = ["large pepperoni"]

[[agents]]
id = "stock"
kind = "scripted"
replies = ["in stock"]

[[agents]]
id = "kitchen"
kind = "scripted"
replies = ["baking"]

[[edges]]
source = "order"
target = "stock"

[[edges]]
source = "stock"
target = "order"
guard = { contains = "out of", no_warnings = false }

[[edges]]
source = "stock"
target = "kitchen"
label = "ready"
"#;

fn bench_linear_run(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut builder = WorkflowBuilder::new("agent-0").max_steps(16);
    for i in 0..8 {
        builder = builder.agent(
            format!("agent-{i}"),
            Arc::new(ScriptedAgent::new([format!("reply {i}")])),
        );
    }
    for i in 0..7 {
        builder = builder.edge(&format!("agent-{i}"), &format!("agent-{}", i + 1));
    }
    let workflow = builder.build().expect("build workflow");

    c.bench_function("engine/linear_8_agents", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = workflow
                .run(
                    Conversation::from_user("go"),
                    &mut NullSink,
                    &CancelSignal::never(),
                )
                .await;
            black_box(result.steps);
        });
    });
}

fn bench_streamed_run(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let workflow = Arc::new(
        WorkflowBuilder::new("talker")
            .agent(
                "talker",
                Arc::new(ScriptedAgent::new(["one two three four five six"]).streaming()),
            )
            .build()
            .expect("build workflow"),
    );

    c.bench_function("engine/streamed_events", |b| {
        b.to_async(&runtime).iter(|| async {
            let (stream, run) = workflow.run_streaming(Conversation::from_user("speak"));
            let events = stream.collect_all().await;
            let _ = run.await;
            black_box(events.len());
        });
    });
}

fn bench_definition_parse(c: &mut Criterion) {
    c.bench_function("definition/parse_pizza", |b| {
        b.iter(|| {
            let definition = WorkflowDefinition::parse(black_box(DEFINITION)).expect("parse");
            black_box(definition.edges.len());
        });
    });
}

criterion_group!(
    benches,
    bench_linear_run,
    bench_streamed_run,
    bench_definition_parse
);
criterion_main!(benches);
