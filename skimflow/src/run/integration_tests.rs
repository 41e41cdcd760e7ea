//! End-to-end tests for prepared runs.

use super::{RunController, RunOutcome, EXIT_ABORTED, EXIT_FAILED_EVENTS};
use crate::cancellation::CancellationToken;
use crate::config::{ProcessConfig, StageDeclaration, StageTemplate};
use crate::core::{SkimDecision, Verdict};
use crate::errors::{ConfigurationErrorKind, SkimflowError};
use crate::events::CollectingEventSink;
use crate::params::ParameterBag;
use crate::pipeline::{FailureMode, SkimPolicy};
use crate::registry::{Library, LibraryCatalog};
use crate::testing::{
    numbered_events, read_indices, write_events, CancellingStage, FailingStage, RecordingStage,
    SlowStage, VotingStage,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const TEST_LIBRARY: &str = "libTestStages.so";

fn catalog_with(library: Library) -> Arc<LibraryCatalog> {
    let catalog = LibraryCatalog::builtin();
    catalog.register(library);
    Arc::new(catalog)
}

fn test_library() -> Library {
    Library::new(TEST_LIBRARY)
        .with_stage("test::FailOn17", || Box::new(FailingStage::on_indices([17], "bad hit")))
        .with_stage("test::KeepEven", || Box::new(VotingStage::keep_if(|i| i % 2 == 0)))
        .with_stage("test::Slow", || Box::new(SlowStage::with_step_ms(2)))
        .with_stage("test::Proceed", || Box::new(VotingStage::new(Verdict::Proceed)))
}

struct Fixture {
    dir: TempDir,
    input: PathBuf,
}

impl Fixture {
    fn new(events: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.ndjson");
        write_events(&input, &numbered_events(events)).unwrap();
        Self { dir, input }
    }

    fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn process(&self, output: &Path) -> ProcessConfig {
        let mut config = ProcessConfig::new("recon");
        config.libraries = vec!["libSkimCore.so".to_string(), TEST_LIBRARY.to_string()];
        config.input_files = vec![self.input.clone()];
        config.output_files = vec![output.to_path_buf()];
        config
    }
}

fn threshold_trigger(threshold: f64) -> StageDeclaration {
    StageDeclaration::new("trigger", "core::ThresholdVote").with_parameters(
        ParameterBag::new()
            .with("collection", "energies")
            .with("threshold", threshold),
    )
}

#[tokio::test]
async fn test_threshold_skim_keeps_passing_events() {
    let fixture = Fixture::new(20);
    let output = fixture.output("out.ndjson");
    let mut config = fixture.process(&output).with_stage(threshold_trigger(30.0));
    config.skim = SkimPolicy::default_drop().consider("trigger");

    let summary = RunController::new(config, catalog_with(test_library()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    // energies of event i sum to 3i
    assert_eq!(read_indices(&output).unwrap(), (10..20).collect::<Vec<u64>>());
    assert_eq!(summary.processed, 20);
    assert_eq!(summary.kept, 10);
    assert_eq!(summary.dropped, 10);
    assert_eq!(summary.outcome(), RunOutcome::Completed);
    assert_eq!(summary.outputs[0].events, 10);
}

#[tokio::test]
async fn test_template_override_reaches_stage() {
    let fixture = Fixture::new(20);
    let output = fixture.output("out.ndjson");
    let mut config = fixture
        .process(&output)
        .with_template(
            "simpleTrigger",
            StageTemplate::new(
                "core::ThresholdVote",
                ParameterBag::new()
                    .with("collection", "energies")
                    .with("threshold", 1500.0),
            ),
        )
        .with_stage(
            StageDeclaration::from_template("trigger", "simpleTrigger")
                .with_parameters(ParameterBag::new().with("threshold", 30.0)),
        );
    config.skim = SkimPolicy::default_drop().consider("trigger");

    let summary = RunController::new(config, catalog_with(test_library()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(read_indices(&output).unwrap(), (10..20).collect::<Vec<u64>>());
    assert_eq!(summary.kept, 10);
}

#[test]
fn test_unknown_template_fails_prepare() {
    let fixture = Fixture::new(1);
    let output = fixture.output("out.ndjson");
    let config = fixture
        .process(&output)
        .with_stage(StageDeclaration::from_template("trigger", "missing"));

    let err = RunController::new(config, catalog_with(test_library()))
        .prepare()
        .unwrap_err();

    match err {
        SkimflowError::Configuration(err) => {
            assert_eq!(err.kind, ConfigurationErrorKind::UnknownStage);
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn test_skip_and_continue_excludes_failed_event() {
    let fixture = Fixture::new(100);
    let output = fixture.output("out.ndjson");
    let mut config = fixture
        .process(&output)
        .with_stage(StageDeclaration::new("hits", "test::FailOn17"));
    config.failure_mode = FailureMode::SkipAndContinue;

    let summary = RunController::new(config, catalog_with(test_library()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let indices = read_indices(&output).unwrap();
    assert_eq!(indices.len(), 99);
    assert!(!indices.contains(&17));
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.kept, 99);
    assert_eq!(summary.failures[0].stage, "hits");
    assert_eq!(summary.failures[0].event_index, 17);
    assert_eq!(summary.exit_code(), EXIT_FAILED_EVENTS);
}

#[tokio::test]
async fn test_fail_fast_stops_with_processing_error() {
    let fixture = Fixture::new(30);
    let output = fixture.output("out.ndjson");
    let config = fixture
        .process(&output)
        .with_stage(StageDeclaration::new("hits", "test::FailOn17"));

    let err = RunController::new(config, catalog_with(test_library()))
        .run(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SkimflowError::Processing(ref e) if e.stage == "hits" && e.event_index == 17
    ));
    assert_eq!(read_indices(&output).unwrap(), (0..17).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_parallel_output_matches_sequential() {
    let fixture = Fixture::new(40);
    let run = |workers: usize, name: &str| {
        let output = fixture.output(name);
        let mut config = fixture
            .process(&output)
            .with_stage(StageDeclaration::new("slow", "test::Slow"))
            .with_stage(StageDeclaration::new("even", "test::KeepEven"));
        config.workers = workers;
        config.skim = SkimPolicy::default_drop().consider("even");
        (config, output)
    };

    let (sequential, sequential_out) = run(1, "seq.ndjson");
    let (parallel, parallel_out) = run(8, "par.ndjson");
    let catalog = catalog_with(test_library());

    let a = RunController::new(sequential, Arc::clone(&catalog))
        .run(&CancellationToken::new())
        .await
        .unwrap();
    let b = RunController::new(parallel, catalog)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let expected: Vec<u64> = (0..40).filter(|i| i % 2 == 0).collect();
    assert_eq!(read_indices(&parallel_out).unwrap(), expected);
    assert_eq!(
        std::fs::read(&sequential_out).unwrap(),
        std::fs::read(&parallel_out).unwrap()
    );
    assert_eq!(a.outputs[0].sha256, b.outputs[0].sha256);
    assert_eq!((a.kept, a.dropped), (b.kept, b.dropped));
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let fixture = Fixture::new(25);
    let catalog = catalog_with(test_library());
    let mut digests = Vec::new();

    for name in ["first.ndjson", "second.ndjson"] {
        let output = fixture.output(name);
        let mut config = fixture
            .process(&output)
            .with_stage(
                StageDeclaration::new("tag", "core::Tag")
                    .with_parameters(ParameterBag::new().with("label", "recon")),
            )
            .with_stage(threshold_trigger(12.0));
        config.skim = SkimPolicy::default_drop().consider("trigger");

        let summary = RunController::new(config, Arc::clone(&catalog))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        digests.push((summary.outputs[0].sha256.clone(), summary.kept, summary.dropped));
    }

    assert_eq!(digests[0], digests[1]);
}

#[tokio::test]
async fn test_abort_between_events() {
    let fixture = Fixture::new(20);
    let output = fixture.output("out.ndjson");
    let token = CancellationToken::new();
    let library = {
        let token = token.clone();
        test_library().with_stage("test::CancelAt5", move || {
            Box::new(CancellingStage::new(token.clone(), 5))
        })
    };
    let config = fixture
        .process(&output)
        .with_stage(StageDeclaration::new("interrupt", "test::CancelAt5"));

    let summary = RunController::new(config, catalog_with(library))
        .run(&token)
        .await
        .unwrap();

    assert_eq!(read_indices(&output).unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.aborted.as_deref(), Some("cancelled at event 5"));
    assert_eq!(summary.exit_code(), EXIT_ABORTED);
}

/// Stages: `first`, then a slow stage, then a recorder. The slow stage
/// delays events by 0 to 60 ms, so most events are still sleeping when the
/// run stops.
fn stop_early_process(fixture: &Fixture, output: &Path, first: &str) -> ProcessConfig {
    let mut config = fixture
        .process(output)
        .with_stage(StageDeclaration::new("first", first))
        .with_stage(StageDeclaration::new("slow", "test::Slow20"))
        .with_stage(StageDeclaration::new("record", "test::Record"));
    config.workers = 8;
    config
}

fn stop_early_library(token: &CancellationToken, recorder: &RecordingStage) -> Library {
    let token = token.clone();
    let recorder = recorder.clone();
    test_library()
        .with_stage("test::CancelAt0", move || {
            Box::new(CancellingStage::new(token.clone(), 0))
        })
        .with_stage("test::FailOn0", || Box::new(FailingStage::on_indices([0], "bad hit")))
        .with_stage("test::Slow20", || Box::new(SlowStage::with_step_ms(20)))
        .with_stage("test::Record", move || Box::new(recorder.clone()))
}

fn assert_no_work_after_return(at_return: &[u64], later: &[u64]) {
    assert_eq!(at_return, later);
    assert!(later.len() < 8, "in-flight events kept running: {later:?}");
    assert!(later.iter().all(|i| i % 4 == 3), "only undelayed events may finish: {later:?}");
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_events() {
    let fixture = Fixture::new(20);
    let output = fixture.output("out.ndjson");
    let token = CancellationToken::new();
    let recorder = RecordingStage::new();
    let config = stop_early_process(&fixture, &output, "test::CancelAt0");

    let summary = RunController::new(config, catalog_with(stop_early_library(&token, &recorder)))
        .run(&token)
        .await
        .unwrap();
    let at_return = recorder.seen();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.exit_code(), EXIT_ABORTED);
    assert_no_work_after_return(&at_return, &recorder.seen());
}

#[tokio::test]
async fn test_fail_fast_aborts_in_flight_events() {
    let fixture = Fixture::new(20);
    let output = fixture.output("out.ndjson");
    let token = CancellationToken::new();
    let recorder = RecordingStage::new();
    let config = stop_early_process(&fixture, &output, "test::FailOn0");

    let err = RunController::new(config, catalog_with(stop_early_library(&token, &recorder)))
        .run(&token)
        .await
        .unwrap_err();
    let at_return = recorder.seen();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    assert!(matches!(err, SkimflowError::Processing(_)));
    assert_no_work_after_return(&at_return, &recorder.seen());
}

#[tokio::test]
async fn test_cancelled_before_start_writes_nothing() {
    let fixture = Fixture::new(5);
    let output = fixture.output("out.ndjson");
    let token = CancellationToken::new();
    token.cancel("interrupted");

    let summary = RunController::new(fixture.process(&output), catalog_with(test_library()))
        .run(&token)
        .await
        .unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.outcome(), RunOutcome::Aborted);
    assert!(std::fs::read_to_string(&output).unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_parameter_fails_before_outputs_open() {
    let fixture = Fixture::new(5);
    let output = fixture.output("out.ndjson");
    let config = fixture
        .process(&output)
        .with_stage(StageDeclaration::new("tag", "core::Tag"));

    let err = RunController::new(config, catalog_with(test_library()))
        .run(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SkimflowError::MissingParameter { ref key, .. } if key == "label"));
    assert!(!output.exists());
}

#[test]
fn test_unknown_library() {
    let fixture = Fixture::new(1);
    let mut config = fixture.process(&fixture.output("out.ndjson"));
    config.libraries.push("libEventProc.so".to_string());

    let err = RunController::new(config, catalog_with(test_library()))
        .prepare()
        .unwrap_err();

    assert!(matches!(err, SkimflowError::LibraryLoad(ref e) if e.library == "libEventProc.so"));
}

#[test]
fn test_unresolved_implementation() {
    let fixture = Fixture::new(1);
    let config = fixture
        .process(&fixture.output("out.ndjson"))
        .with_stage(StageDeclaration::new("ecalDigis", "ldmx::EcalDigiProducer"));

    let err = RunController::new(config, catalog_with(test_library()))
        .prepare()
        .unwrap_err();

    assert_eq!(err.stage(), Some("ecalDigis"));
    assert!(matches!(err, SkimflowError::UnresolvedImplementation { .. }));
}

#[test]
fn test_unknown_voter() {
    let fixture = Fixture::new(1);
    let mut config = fixture
        .process(&fixture.output("out.ndjson"))
        .with_stage(StageDeclaration::new("a", "test::Proceed"));
    config.skim = SkimPolicy::default_drop().consider("simpleTrigger");

    let err = RunController::new(config, catalog_with(test_library()))
        .prepare()
        .unwrap_err();

    assert!(matches!(
        err,
        SkimflowError::Configuration(ref e) if e.kind == ConfigurationErrorKind::UnknownVoter
    ));
}

#[test]
fn test_zero_workers_rejected() {
    let fixture = Fixture::new(1);
    let mut config = fixture.process(&fixture.output("out.ndjson"));
    config.workers = 0;

    let err = RunController::new(config, catalog_with(test_library()))
        .prepare()
        .unwrap_err();

    assert!(matches!(
        err,
        SkimflowError::Configuration(ref e) if e.kind == ConfigurationErrorKind::MalformedRunConfig
    ));
}

#[tokio::test]
async fn test_empty_pipeline_applies_default() {
    let fixture = Fixture::new(4);
    let output = fixture.output("out.ndjson");
    let mut config = fixture.process(&output);
    config.skim = SkimPolicy::new(SkimDecision::Drop);

    let summary = RunController::new(config, catalog_with(test_library()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.dropped, 4);
    assert!(read_indices(&output).unwrap().is_empty());
}

#[tokio::test]
async fn test_per_input_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> = (0..2).map(|i| dir.path().join(format!("in{i}.ndjson"))).collect();
    write_events(&inputs[0], &numbered_events(3)).unwrap();
    write_events(&inputs[1], &numbered_events(2)).unwrap();
    let outputs: Vec<PathBuf> = (0..2).map(|i| dir.path().join(format!("out{i}.ndjson"))).collect();

    let mut config = ProcessConfig::new("split");
    config.input_files = inputs;
    config.output_files = outputs.clone();

    let summary = RunController::new(config, Arc::new(LibraryCatalog::builtin()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(read_indices(&outputs[0]).unwrap(), vec![0, 1, 2]);
    assert_eq!(read_indices(&outputs[1]).unwrap(), vec![3, 4]);
    assert_eq!(summary.kept, 5);
}

#[tokio::test]
async fn test_truncated_input_tail_is_ignored() {
    let fixture = Fixture::new(3);
    let mut content = std::fs::read_to_string(&fixture.input).unwrap();
    content.push_str("{\"collections\":{\"energies\":[1,");
    std::fs::write(&fixture.input, content).unwrap();
    let output = fixture.output("out.ndjson");

    let summary = RunController::new(fixture.process(&output), catalog_with(test_library()))
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(read_indices(&output).unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_lifecycle_events() {
    let fixture = Fixture::new(4);
    let output = fixture.output("out.ndjson");
    let mut config = fixture
        .process(&output)
        .with_stage(StageDeclaration::new("even", "test::KeepEven"));
    config.skim = SkimPolicy::default_drop().consider("even");
    let sink = Arc::new(CollectingEventSink::new());

    RunController::new(config, catalog_with(test_library()))
        .with_event_sink(sink.clone())
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sink.count("run.started"), 1);
    assert_eq!(sink.count("stage.completed"), 4);
    assert_eq!(sink.count("event.kept"), 2);
    assert_eq!(sink.count("event.dropped"), 2);
    let completed = sink.events_of_type("run.completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].1.as_ref().unwrap()["kept"], 2);
}
