use crate::e2e::helpers;

use helpers::fake_backend::{FakeBackend, SLOW_DELAY};
use helpers::{default_options, pipeline, read_mapping};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use survey_tts::domain::survey::{
    CollisionPolicy, FailurePolicy, PipelineError, SurveyId, TranslationTable,
};
use tokio_util::sync::CancellationToken;

fn table(json: serde_json::Value) -> TranslationTable {
    TranslationTable::from_json_slice(json.to_string().as_bytes()).unwrap()
}

fn survey() -> SurveyId {
    SurveyId::parse("S1").unwrap()
}

#[tokio::test]
async fn it_should_report_the_first_failing_unit_in_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let mut options = default_options();
    options.concurrency = 4;
    let pipeline = pipeline(backend.clone(), dir.path(), options);

    // Row 0 fails last in wall-clock time but first in input order.
    let input = table(serde_json::json!({
        "rows": [
            { "en": "SLOW FAIL first" },
            { "en": "FAIL second" },
            { "en": "Fine" }
        ]
    }));

    let err = pipeline
        .run(&survey(), &input, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        PipelineError::SynthesisFailure { language, row, .. } => {
            assert_eq!((language.as_str(), row), ("en", 0));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(read_mapping(dir.path(), "S1").is_none());
}

#[tokio::test]
async fn it_should_collect_every_failure_when_continuing() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let mut options = default_options();
    options.failure_policy = FailurePolicy::Continue;
    let pipeline = pipeline(backend.clone(), dir.path(), options);

    let input = table(serde_json::json!({
        "rows": [
            { "en": "FAIL one", "da": "Godt" },
            { "en": "Good", "da": "FAIL to" }
        ]
    }));

    let err = pipeline
        .run(&survey(), &input, &CancellationToken::new())
        .await
        .unwrap_err();

    let failures = match err {
        PipelineError::Incomplete { failures } => failures,
        other => panic!("expected incomplete run, got {other}"),
    };
    let failed: Vec<(String, usize)> = failures
        .iter()
        .map(|f| (f.language.clone(), f.row))
        .collect();
    assert_eq!(failed, vec![("en".to_string(), 0), ("da".to_string(), 1)]);
    assert_eq!(backend.calls().len(), 4);
    assert!(read_mapping(dir.path(), "S1").is_none());
}

#[tokio::test]
async fn it_should_produce_the_same_mapping_at_any_concurrency() {
    let rows: Vec<serde_json::Value> = (0..20)
        .map(|i| serde_json::json!({ "en": format!("Question {i}"), "da": format!("Spørgsmål {i}") }))
        .collect();
    let input = table(serde_json::json!({ "rows": rows }));

    let mut mappings = Vec::new();
    for concurrency in [1, 8] {
        let dir = tempfile::tempdir().unwrap();
        let mut options = default_options();
        options.concurrency = concurrency;
        let pipeline = pipeline(Arc::new(FakeBackend::new()), dir.path(), options);

        let report = pipeline
            .run(&survey(), &input, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.entries, 40);
        mappings.push(std::fs::read_to_string(report.mapping_path).unwrap());
    }

    assert_eq!(mappings[0], mappings[1]);
}

#[tokio::test]
async fn it_should_stop_without_publishing_when_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let mut options = default_options();
    options.concurrency = 1;
    let pipeline = pipeline(backend.clone(), dir.path(), options);

    let input = table(serde_json::json!({
        "rows": [
            { "en": "SLOW one" },
            { "en": "SLOW two" },
            { "en": "SLOW three" }
        ]
    }));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SLOW_DELAY / 4).await;
        trigger.cancel();
    });

    let result = pipeline.run(&survey(), &input, &cancel).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(backend.calls().len(), 1, "no synthesis starts after cancel");
    assert!(read_mapping(dir.path(), "S1").is_none());
    assert!(helpers::artifact_files(dir.path(), "S1", "en").is_empty());
}

#[tokio::test]
async fn it_should_reject_cross_language_collisions_before_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let mut options = default_options();
    options.collision_policy = CollisionPolicy::Reject;
    let pipeline = pipeline(backend.clone(), dir.path(), options);

    let input = table(serde_json::json!({ "rows": [{ "en": "Tak", "da": "Tak!" }] }));

    let err = pipeline
        .run(&survey(), &input, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::KeyCollision { ref key, .. } if key == "tak"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn it_should_let_the_later_language_win_collisions_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let pipeline = pipeline(backend.clone(), dir.path(), default_options());

    let input = table(serde_json::json!({ "rows": [{ "en": "Tak", "da": "Tak!" }] }));

    let report = pipeline
        .run(&survey(), &input, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.overwritten, 1);
    let mapping = read_mapping(dir.path(), "S1").unwrap();
    assert!(mapping["tak"].as_str().unwrap().contains("/S1/da/"));
    assert_eq!(backend.calls().len(), 1);
    assert_eq!(backend.calls()[0].language, "da");
}
