//! Integration tests for the build pipeline with real child processes.

use testbed_build::{BuildError, BuildPipeline, BuildSpec, BuildStep};

fn spec(count: u32) -> BuildSpec {
    BuildSpec::new(
        "multiple_services/dns_and_dane",
        vec!["WITH_DANE".to_string(), "WITH_SOMEIP_SD".to_string()],
        count,
    )
}

/// Test: all steps pass and the description is written
#[tokio::test]
async fn test_successful_build() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = BuildPipeline::new(
        dir.path().join("build"),
        vec![
            BuildStep::custom("first", vec!["true".to_string()], 60),
            BuildStep::custom(
                "second",
                vec!["echo".to_string(), "{definitions}".to_string()],
                60,
            ),
        ],
    );

    let report = pipeline.apply_and_build(&spec(2)).await.expect("build failed");

    assert_eq!(report.steps.len(), 2);
    assert!(report.steps[1].stdout.contains("WITH_DANE WITH_SOMEIP_SD"));
    assert_eq!(report.spec_digest, spec(2).digest);

    let written: BuildSpec =
        serde_json::from_slice(&std::fs::read(&report.description_path).unwrap()).unwrap();
    assert_eq!(written, spec(2));
}

/// Test: a failing step is fatal and later steps never run
#[tokio::test]
async fn test_failed_step_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let sentinel = dir.path().join("ran");
    let pipeline = BuildPipeline::new(
        dir.path().join("build"),
        vec![
            BuildStep::custom("broken", vec!["false".to_string()], 60),
            BuildStep::custom(
                "after",
                vec!["touch".to_string(), sentinel.to_string_lossy().to_string()],
                60,
            ),
        ],
    );

    let err = pipeline.apply_and_build(&spec(2)).await.unwrap_err();

    assert!(matches!(err, BuildError::StepFailed { ref step, .. } if step == "broken"));
    assert!(!sentinel.exists(), "steps after a failure must not run");
}

/// Test: disabled steps are skipped
#[tokio::test]
async fn test_disabled_step_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = BuildPipeline::new(
        dir.path().join("build"),
        vec![
            BuildStep::custom("skipped", vec!["false".to_string()], 60).disabled(),
            BuildStep::custom("runs", vec!["true".to_string()], 60),
        ],
    );

    let report = pipeline.apply_and_build(&spec(1)).await.expect("build failed");
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].step_name, "runs");
}

/// Test: missing executable surfaces as a spawn error
#[tokio::test]
async fn test_missing_build_tool() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = BuildPipeline::new(
        dir.path().join("build"),
        vec![BuildStep::custom(
            "ghost",
            vec!["/nonexistent/build.sh".to_string()],
            60,
        )],
    );

    let err = pipeline.apply_and_build(&spec(1)).await.unwrap_err();
    assert!(matches!(err, BuildError::Spawn { .. }));
}

/// Test: the subscriber count define follows the build spec
#[tokio::test]
async fn test_subscriber_define_patched() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("service_discovery_impl.cpp");
    std::fs::write(&source, "#define SUBSCRIBER_COUNT_TO_RECORD 1\n").unwrap();

    let pipeline = BuildPipeline::new(dir.path().join("build"), vec![])
        .with_subscriber_define(&source);
    pipeline.apply_and_build(&spec(9)).await.expect("build failed");

    assert_eq!(
        std::fs::read_to_string(&source).unwrap(),
        "#define SUBSCRIBER_COUNT_TO_RECORD 9\n"
    );
}
