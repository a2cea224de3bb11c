//! Orchestrator guarantees: hooks tolerate any order, and exactly one
//! `stopped` event is emitted whether the engine succeeds, fails, or panics.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatflow::bootstrap::logger::FallbackLogger;
use chatflow::config::ParsedConfig;
use chatflow::error::AppError;
use chatflow::orchestrator;
use chatflow::pipeline::{CliOptions, Engine, EngineFuture, EngineOutcome, StreamSummary};
use tempfile::TempDir;
use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    LoggerInit,
    Tee,
    ConfigParsed,
    StreamStart,
    Panic,
}

/// An engine that calls hooks in a scripted order, then finishes.
struct ScriptedEngine {
    parsed: ParsedConfig,
    steps: Vec<Step>,
    finish: fn() -> EngineOutcome,
    /// Records sent through the tee layer.
    emitted: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    fn new(parsed: ParsedConfig, steps: Vec<Step>, finish: fn() -> EngineOutcome) -> Self {
        Self { parsed, steps, finish, emitted: Arc::new(AtomicUsize::new(0)) }
    }
}

/// Every ordering of `items`.
fn orderings(items: &[Step]) -> Vec<Vec<Step>> {
    if items.is_empty() {
        return vec![Vec::new()];
    }
    let mut all = Vec::new();
    for (i, first) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in orderings(&rest) {
            tail.insert(0, *first);
            all.push(tail);
        }
    }
    all
}

impl Engine for ScriptedEngine {
    fn run(self: Box<Self>, options: CliOptions) -> EngineFuture {
        Box::pin(async move {
            assert_eq!(options.binary_name, "chatflow");
            assert!(options.schema.top_level_names().contains(&"chatflow"));
            let mut tee: Option<Dispatch> = None;
            let mut emitted = 0;
            for step in &self.steps {
                match step {
                    Step::LoggerInit => {
                        options.hooks.on_logger_init(FallbackLogger::stderr(LevelFilter::WARN));
                    }
                    Step::ConfigParsed => {
                        if let Err(e) = options.hooks.on_config_parsed(&self.parsed) {
                            return EngineOutcome::failure(e);
                        }
                    }
                    Step::StreamStart => {
                        let summary = StreamSummary::new();
                        summary.record_received();
                        if let Err(e) = options.hooks.on_stream_start(summary) {
                            return EngineOutcome::failure(e);
                        }
                    }
                    Step::Tee => {
                        let layer = options.hooks.tee_layer().expect("lifecycle hooks provide a tee");
                        tee = Some(Dispatch::new(tracing_subscriber::registry().with(layer)));
                    }
                    Step::Panic => panic!("engine blew up"),
                }
                if let Some(dispatch) = &tee {
                    tracing::dispatcher::with_default(dispatch, || {
                        tracing::info!(target: "app", after = ?step, "hook step done");
                    });
                    emitted += 1;
                }
            }
            self.emitted.store(emitted, Ordering::SeqCst);
            (self.finish)()
        })
    }
}

fn sink_config(path: &Path) -> ParsedConfig {
    let src = format!(
        "[chatflow]\npipeline_id = \"test\"\nstatus_interval_seconds = 0\n\
         [chatflow.sink]\ntype = \"file\"\npath = \"{}\"\n",
        path.display()
    );
    ParsedConfig::new(toml::from_str(&src).unwrap())
}

fn events(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn of_type<'a>(events: &'a [serde_json::Value], ty: &str) -> Vec<&'a serde_json::Value> {
    events.iter().filter(|e| e["type"] == ty).collect()
}

#[tokio::test]
async fn clean_run_emits_one_stop_without_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let engine = ScriptedEngine::new(
        sink_config(&path),
        vec![Step::LoggerInit, Step::ConfigParsed, Step::StreamStart],
        EngineOutcome::success,
    );

    assert_eq!(orchestrator::run(engine, "test").await, 0);

    let events = events(&path);
    assert_eq!(of_type(&events, "stream_started").len(), 1);
    let stopped = of_type(&events, "stopped");
    assert_eq!(stopped.len(), 1);
    assert!(stopped[0]["error"].is_null());
    assert_eq!(events.last().unwrap()["type"], "stopped");

    let run_id = events[0]["run_id"].as_str().unwrap();
    assert_eq!(run_id.len(), 32);
    assert!(events.iter().all(|e| e["run_id"] == run_id && e["pipeline_id"] == "test"));
}

#[tokio::test]
async fn failed_run_emits_one_stop_with_error_and_propagates_code() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let engine = ScriptedEngine::new(
        sink_config(&path),
        vec![Step::LoggerInit, Step::ConfigParsed],
        || EngineOutcome::failure(AppError::Engine("input closed unexpectedly".into())),
    );

    assert_eq!(orchestrator::run(engine, "test").await, 1);

    let events = events(&path);
    let stopped = of_type(&events, "stopped");
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0]["error"], "engine error: input closed unexpectedly");
}

#[tokio::test]
async fn panicking_engine_still_emits_stop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let engine = ScriptedEngine::new(
        sink_config(&path),
        vec![Step::ConfigParsed, Step::StreamStart, Step::Panic],
        EngineOutcome::success,
    );

    assert_eq!(orchestrator::run(engine, "test").await, 1);

    let events = events(&path);
    let stopped = of_type(&events, "stopped");
    assert_eq!(stopped.len(), 1);
    assert!(stopped[0]["error"].as_str().unwrap().contains("panicked"));
}

#[tokio::test]
async fn every_hook_ordering_delivers_records_and_lifecycle_events() {
    let hooks = [Step::LoggerInit, Step::Tee, Step::ConfigParsed, Step::StreamStart];
    let all = orderings(&hooks);
    assert_eq!(all.len(), 24);

    for steps in all {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let engine = ScriptedEngine::new(sink_config(&path), steps.clone(), EngineOutcome::success);
        let emitted = engine.emitted.clone();

        assert_eq!(orchestrator::run(engine, "test").await, 0, "ordering {steps:?}");

        let events = events(&path);
        let tee_at = steps.iter().position(|s| *s == Step::Tee).unwrap();
        assert_eq!(emitted.load(Ordering::SeqCst), steps.len() - tee_at);
        assert_eq!(
            of_type(&events, "log").iter().filter(|e| e["target"] == "app").count(),
            emitted.load(Ordering::SeqCst),
            "ordering {steps:?}"
        );
        assert_eq!(of_type(&events, "stream_started").len(), 1, "ordering {steps:?}");
        assert_eq!(of_type(&events, "stopped").len(), 1, "ordering {steps:?}");
        assert_eq!(events.last().unwrap()["type"], "stopped", "ordering {steps:?}");
    }
}

#[tokio::test]
async fn engine_that_never_parses_config_exits_cleanly() {
    let engine = ScriptedEngine::new(ParsedConfig::empty(), vec![], || EngineOutcome::exit(3));
    assert_eq!(orchestrator::run(engine, "test").await, 3);
}

#[tokio::test]
async fn broken_sink_config_does_not_fail_the_run() {
    let root = toml::from_str("[chatflow.sink]\ntype = \"http\"\nurl = \"ftp://nope\"\n").unwrap();
    let engine = ScriptedEngine::new(
        ParsedConfig::new(root),
        vec![Step::LoggerInit, Step::ConfigParsed, Step::StreamStart],
        EngineOutcome::success,
    );
    assert_eq!(orchestrator::run(engine, "test").await, 0);
}
