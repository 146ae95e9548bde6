use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use serde_json::{Value, json};
use toolplan_adapters::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk, InferenceRequest,
    ModelAdapter,
};
use toolplan_planner::{Planner, StepOutcome, run_task};
use toolplan_primitives::{CallContext, Config};
use toolplan_tools::{
    BuildContext, CapabilityFactory, CapabilityRegistry, CleanupHook, ErrorKind, Executor, Phase,
    RegistryBuilder, ToolDescriptor, ToolError, ToolMetadata, ToolResult,
};

/// Replies with canned texts in order and records every request.
struct ScriptedAdapter {
    metadata: AdapterMetadata,
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedAdapter {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted", "test-model"),
            replies: Mutex::new(replies.iter().map(|reply| (*reply).to_owned()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn prompt(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index].messages()[0]
            .content()
            .to_owned()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AdapterError::transport("script exhausted"))?;
        let chunks = vec![
            Ok(InferenceChunk::new(reply, false)),
            Ok(InferenceChunk::new("", true)),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[derive(Default)]
struct Calls {
    seen: Mutex<Vec<(&'static str, String)>>,
    releases: AtomicUsize,
}

impl Calls {
    fn seen(&self) -> Vec<(&'static str, String)> {
        self.seen.lock().unwrap().clone()
    }
}

struct FailingRelease {
    calls: Arc<Calls>,
}

#[async_trait]
impl CleanupHook for FailingRelease {
    async fn release(&self) -> ToolResult<()> {
        self.calls.releases.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::execution("scratch directory is busy"))
    }
}

/// A fake tool that records its arguments and answers `reply`, or fails when
/// `reply` is `None`.
fn fake(
    name: &'static str,
    field: &'static str,
    calls: Arc<Calls>,
    reply: Option<&'static str>,
) -> impl CapabilityFactory {
    move |_ctx: &BuildContext, _config: &Config| -> ToolResult<Option<ToolDescriptor>> {
        let metadata = ToolMetadata::new(
            name,
            format!("fake {name}"),
            json!({
                "type": "object",
                "properties": {field: {"type": "string"}},
                "required": [field],
                "additionalProperties": false
            }),
        )?;
        let calls = Arc::clone(&calls);
        Ok(Some(ToolDescriptor::new(
            metadata,
            move |_ctx: CallContext, input: Value| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.seen.lock().unwrap().push((name, input.to_string()));
                    reply
                        .map(str::to_owned)
                        .ok_or_else(|| ToolError::execution(format!("{name} exited with status 1")))
                }
            },
        )))
    }
}

fn scratch(calls: Arc<Calls>) -> impl CapabilityFactory {
    move |_ctx: &BuildContext, _config: &Config| -> ToolResult<Option<ToolDescriptor>> {
        let metadata = ToolMetadata::new("scratch", "holds a directory", json!({"type": "object"}))?;
        let hook = Arc::new(FailingRelease {
            calls: Arc::clone(&calls),
        });
        Ok(Some(
            ToolDescriptor::new(metadata, |_ctx: CallContext, _input: Value| async move {
                Ok(String::from("kept"))
            })
            .with_cleanup(hook),
        ))
    }
}

fn registry(
    calls: &Arc<Calls>,
    adapter: Arc<ScriptedAdapter>,
    dig_reply: Option<&'static str>,
) -> Arc<CapabilityRegistry> {
    let mut builder = RegistryBuilder::new();
    builder
        .register("dig", fake("dig", "domain", Arc::clone(calls), dig_reply))
        .register("nmap", fake("nmap", "ip", Arc::clone(calls), Some("80/tcp open http")));
    toolplan_planner::register(&mut builder, adapter);
    builder.freeze()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| (*name).to_owned()).collect()
}

async fn workers(registry: &Arc<CapabilityRegistry>, names: &[&str]) -> Executor {
    Executor::builder(Arc::clone(registry))
        .whitelist(names.iter().copied())
        .build(&CallContext::new(), &Config::new())
        .await
        .expect("workers build")
}

const RESOLVE_THEN_SCAN: &str = r#"```json
{"thought": "resolve first, then scan the address",
 "steps": [
  {"id": "step1", "tool": "dig", "description": "resolve", "args": {"domain": "example.com"}},
  {"id": "step2", "tool": "nmap", "description": "scan", "args": {"ip": "${step1.output}"}}
 ]}
```"#;

#[tokio::test]
async fn resolved_output_feeds_the_next_step() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[RESOLVE_THEN_SCAN, "<think>ok</think>Port 80 is open."]);
    let registry = registry(&calls, Arc::clone(&adapter), Some("93.184.216.34"));
    let mut executor = workers(&registry, &["dig", "nmap"]).await;

    let planner = Planner::new(adapter.clone()).unwrap();
    let outcome = planner
        .run(&CallContext::new(), &executor, "scan example.com")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Port 80 is open.");
    let step2 = outcome.plan.step("step2").unwrap();
    assert_eq!(step2.resolved(), Some(r#"{"ip":"93.184.216.34"}"#));
    assert_eq!(
        step2.outcome(),
        Some(&StepOutcome::Output("80/tcp open http".to_owned()))
    );
    assert_eq!(
        calls.seen(),
        vec![
            ("dig", r#"{"domain":"example.com"}"#.to_owned()),
            ("nmap", r#"{"ip":"93.184.216.34"}"#.to_owned()),
        ]
    );

    assert!(adapter.prompt(0).contains("- dig: fake dig"));
    let solve_prompt = adapter.prompt(1);
    assert!(solve_prompt.contains("Arguments: {\"ip\":\"93.184.216.34\"}"));
    assert!(solve_prompt.contains("Output:\n80/tcp open http"));

    executor.cleanup().await.unwrap();
}

#[tokio::test]
async fn failing_step_stops_the_plan() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[RESOLVE_THEN_SCAN, "never asked"]);
    let registry = registry(&calls, Arc::clone(&adapter), None);
    let mut executor = workers(&registry, &["dig", "nmap"]).await;

    let err = Planner::new(adapter.clone())
        .unwrap()
        .run(&CallContext::new(), &executor, "scan example.com")
        .await
        .expect_err("dig fails");

    assert_eq!(err.phase(), Some(Phase::Work));
    assert_eq!(err.kind(), ErrorKind::Execution);
    match &err {
        ToolError::Planner { source, .. } => {
            assert!(matches!(
                &**source,
                ToolError::Step { step, tool, .. } if step == "step1" && tool == "dig"
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calls.seen().len(), 1, "step2 must not run");
    assert_eq!(adapter.requests(), 1, "no answer synthesis after a failure");

    executor.cleanup().await.unwrap();
}

#[tokio::test]
async fn unparseable_plan_runs_nothing() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&["First I would resolve the domain."]);
    let registry = registry(&calls, Arc::clone(&adapter), Some("93.184.216.34"));
    let mut executor = workers(&registry, &["dig", "nmap"]).await;

    let err = Planner::new(adapter)
        .unwrap()
        .run(&CallContext::new(), &executor, "scan example.com")
        .await
        .expect_err("prose is not a plan");

    assert_eq!(err.kind(), ErrorKind::PlanParse);
    assert_eq!(err.phase(), Some(Phase::Plan));
    assert!(calls.seen().is_empty());

    executor.cleanup().await.unwrap();
}

#[tokio::test]
async fn step_outside_the_whitelist_runs_nothing() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[RESOLVE_THEN_SCAN]);
    let registry = registry(&calls, Arc::clone(&adapter), Some("93.184.216.34"));
    let mut executor = workers(&registry, &["dig"]).await;

    let err = Planner::new(adapter)
        .unwrap()
        .run(&CallContext::new(), &executor, "scan example.com")
        .await
        .expect_err("nmap is not whitelisted");

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.phase(), Some(Phase::Plan));
    assert!(calls.seen().is_empty(), "dig must not run either");

    executor.cleanup().await.unwrap();
}

#[tokio::test]
async fn cancelled_context_stops_before_the_model_is_asked() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[RESOLVE_THEN_SCAN]);
    let registry = registry(&calls, Arc::clone(&adapter), Some("93.184.216.34"));
    let mut executor = workers(&registry, &["dig", "nmap"]).await;

    let ctx = CallContext::new();
    ctx.cancel();
    let err = Planner::new(adapter.clone())
        .unwrap()
        .run(&ctx, &executor, "scan example.com")
        .await
        .expect_err("cancelled");

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(adapter.requests(), 0);
    executor.cleanup().await.unwrap();
}

#[tokio::test]
async fn run_task_answers_through_the_plan_capability() {
    let calls = Arc::new(Calls::default());
    let adapter =
        ScriptedAdapter::new(&[RESOLVE_THEN_SCAN, "example.com serves HTTP on port 80."]);
    let registry = registry(&calls, Arc::clone(&adapter), Some("93.184.216.34"));

    let report = run_task(
        registry,
        &Config::new(),
        Some(names(&["plan", "dig", "nmap"])),
        "scan example.com",
        &CallContext::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.answer, "example.com serves HTTP on port 80.");
    assert!(report.cleanup.is_ok());
    assert_eq!(calls.seen().len(), 2);
    let plan_prompt = adapter.prompt(0);
    assert!(plan_prompt.contains("- nmap: fake nmap"));
    assert!(!plan_prompt.contains("- plan:"), "plan never plans with itself");
}

#[tokio::test]
async fn run_task_names_the_failing_phase() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[
        r#"{"steps": [{"id": "a", "tool": "dig", "args": {"domain": "x"}, "retries": 2}]}"#,
    ]);
    let registry = registry(&calls, Arc::clone(&adapter), Some("93.184.216.34"));

    let err = run_task(
        registry,
        &Config::new(),
        None,
        "resolve x",
        &CallContext::new(),
    )
    .await
    .expect_err("extra field rejected");

    assert_eq!(err.phase, Phase::Plan);
    assert_eq!(err.source.kind(), ErrorKind::PlanParse);
    assert!(err.cleanup.is_ok());
    assert!(calls.seen().is_empty());
}

#[tokio::test]
async fn run_task_without_plan_is_a_build_error() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[]);
    let registry = registry(&calls, Arc::clone(&adapter), None);

    let err = run_task(
        registry,
        &Config::new().disable("plan"),
        Some(vec!["plan".to_owned()]),
        "anything",
        &CallContext::new(),
    )
    .await
    .expect_err("plan disabled");

    assert_eq!(err.phase, Phase::Build);
    assert_eq!(err.source.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn worker_cleanup_failure_is_reported_next_to_the_answer() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[
        r#"{"steps": [{"id": "look", "tool": "dig", "args": {"domain": "example.com"}}]}"#,
        "93.184.216.34",
    ]);
    let mut builder = RegistryBuilder::new();
    builder
        .register("dig", fake("dig", "domain", Arc::clone(&calls), Some("93.184.216.34")))
        .register("scratch", scratch(Arc::clone(&calls)));
    toolplan_planner::register(&mut builder, adapter);
    let registry = builder.freeze();

    let report = run_task(
        registry,
        &Config::new(),
        Some(names(&["plan", "dig", "scratch"])),
        "resolve example.com",
        &CallContext::new(),
    )
    .await
    .unwrap();

    let (answer, diagnostic) = report.answer.split_once("\n\n").unwrap();
    assert_eq!(answer, "93.184.216.34");
    assert!(diagnostic.starts_with("[cleanup]"));
    assert!(diagnostic.contains("scratch: tool execution failed: scratch directory is busy"));
    // once by the worker executor, once by the outer executor
    assert_eq!(calls.releases.load(Ordering::SeqCst), 2);
    assert_eq!(report.cleanup.expect_err("outer scratch").kind(), ErrorKind::Cleanup);
}

#[tokio::test]
async fn plan_only_whitelist_grants_no_workers() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[
        r#"{"steps": [{"id": "look", "tool": "dig", "args": {"domain": "example.com"}}]}"#,
        "done",
    ]);
    let registry = registry(&calls, Arc::clone(&adapter), Some("93.184.216.34"));

    let err = run_task(
        registry,
        &Config::new(),
        Some(names(&["plan"])),
        "resolve example.com",
        &CallContext::new(),
    )
    .await
    .expect_err("no worker is whitelisted");

    assert_eq!(err.phase, Phase::Build);
    assert_eq!(err.source.kind(), ErrorKind::Config);
    assert_eq!(adapter.requests(), 0);
    assert!(calls.seen().is_empty());
}

#[tokio::test]
async fn workers_option_cannot_widen_the_whitelist() {
    let calls = Arc::new(Calls::default());
    let adapter = ScriptedAdapter::new(&[
        r#"{"steps": [{"id": "scan", "tool": "nmap", "args": {"ip": "10.0.0.1"}}]}"#,
        "done",
    ]);
    let registry = registry(&calls, Arc::clone(&adapter), Some("93.184.216.34"));
    let mut config = Config::new();
    config.capability_mut("plan").set_option("workers", "dig,nmap");

    let err = run_task(
        registry,
        &config,
        Some(names(&["plan", "dig"])),
        "scan 10.0.0.1",
        &CallContext::new(),
    )
    .await
    .expect_err("nmap is outside the whitelist");

    assert_eq!(err.phase, Phase::Plan);
    assert_eq!(err.source.kind(), ErrorKind::NotFound);
    assert!(!adapter.prompt(0).contains("- nmap:"));
    assert!(calls.seen().is_empty());
}
