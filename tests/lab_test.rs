mod common;

use common::FakeTransport;
use runpost::chaos::ChaosLevel;
use runpost::collection::{Collection, SavedRequest};
use runpost::contract::{DriftKind, Fingerprint};
use runpost::perf::{Percentiles, PerformanceBaseline};
use runpost::planner::Plan;
use runpost::runner::{CollectionRunner, RunnerOptions};
use runpost::storage::{
    BaselineStore, ContractBaseline, FileBaselineStore, MemoryBaselineStore,
};
use runpost::transport::TransportRegistry;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const USER_BODY: &str = r#"{"id": 1, "name": "Alice", "tags": ["a"]}"#;

fn runner(fake: &Arc<FakeTransport>, store: Arc<dyn BaselineStore>) -> CollectionRunner {
    CollectionRunner::new(TransportRegistry::uniform(fake.clone())).with_baseline_store(store)
}

fn user_collection() -> Collection {
    Collection::new("c", "Users").with_request(SavedRequest::new(
        "user",
        "Get user",
        "http://fake/user",
    ))
}

fn contract_options(break_on_drift: bool, auto_update: bool) -> RunnerOptions {
    let mut options = RunnerOptions::serial();
    options.contract.enabled = true;
    options.contract.break_on_drift = break_on_drift;
    options.contract.auto_update_baseline = auto_update;
    options
}

#[tokio::test]
async fn test_contract_first_run_seeds_baseline() {
    let fake = FakeTransport::new();
    fake.route("http://fake/user", 200, USER_BODY);
    let store = Arc::new(MemoryBaselineStore::new());

    let result = runner(&fake, store.clone())
        .run(&user_collection(), &contract_options(true, true), None, None)
        .await
        .unwrap();

    assert!(result.contract_drifts.is_empty());
    assert!(!result.contract_gate_failed);
    assert!(result.contract_baseline_updated);
    let stored = store.get_contract_baseline("user").unwrap().unwrap();
    assert_eq!(stored.fingerprint, Fingerprint::from_body(USER_BODY).unwrap());
}

#[tokio::test]
async fn test_contract_drift_fails_gate() {
    let fake = FakeTransport::new();
    fake.route("http://fake/user", 200, r#"{"id": "1", "tags": ["a"]}"#);
    let store = Arc::new(MemoryBaselineStore::new());
    store
        .set_contract_baseline(
            "user",
            &ContractBaseline::new(Fingerprint::from_body(USER_BODY).unwrap()),
        )
        .unwrap();

    let result = runner(&fake, store.clone())
        .run(&user_collection(), &contract_options(true, false), None, None)
        .await
        .unwrap();

    let summary: Vec<(&str, DriftKind)> = result
        .contract_drifts
        .iter()
        .map(|d| (d.path.as_str(), d.kind))
        .collect();
    assert_eq!(
        summary,
        vec![("$.id", DriftKind::Changed), ("$.name", DriftKind::Removed)]
    );
    assert!(result.contract_gate_failed);
    assert!(result.is_failure());
    // 没有开启自动更新，基线保持不变
    assert!(!result.contract_baseline_updated);
    let stored = store.get_contract_baseline("user").unwrap().unwrap();
    assert_eq!(stored.fingerprint, Fingerprint::from_body(USER_BODY).unwrap());
}

#[tokio::test]
async fn test_contract_drift_without_gate_passes() {
    let fake = FakeTransport::new();
    fake.route("http://fake/user", 200, r#"{"id": 1}"#);
    let store = Arc::new(MemoryBaselineStore::new());
    store
        .set_contract_baseline(
            "user",
            &ContractBaseline::new(Fingerprint::from_body(USER_BODY).unwrap()),
        )
        .unwrap();
    let mut options = RunnerOptions::serial().with_iterations(3);
    options.contract.enabled = true;

    let result = runner(&fake, store)
        .run(&user_collection(), &options, None, None)
        .await
        .unwrap();

    // 三次迭代产生相同漂移，只报告一次: $.name, $.tags, $.tags[]
    assert_eq!(result.contract_drifts.len(), 3);
    assert!(!result.contract_gate_failed);
    assert!(!result.is_failure());
}

#[tokio::test]
async fn test_contract_ignores_errors_and_non_json() {
    let fake = FakeTransport::new();
    fake.route("http://fake/user", 500, r#"{"error": "down"}"#);
    fake.route("http://fake/text", 200, "plain text");
    let collection = user_collection().with_request(SavedRequest::new(
        "text",
        "Text",
        "http://fake/text",
    ));
    let store = Arc::new(MemoryBaselineStore::new());
    store
        .set_contract_baseline(
            "user",
            &ContractBaseline::new(Fingerprint::from_body(USER_BODY).unwrap()),
        )
        .unwrap();

    let result = runner(&fake, store.clone())
        .run(&collection, &contract_options(true, true), None, None)
        .await
        .unwrap();

    assert!(result.contract_drifts.is_empty());
    assert!(!result.contract_baseline_updated);
    assert!(store.get_contract_baseline("text").unwrap().is_none());
}

#[tokio::test]
async fn test_performance_regression_fails_gate() {
    let fake = FakeTransport::new();
    fake.route_with_latency("http://fake/user", 200, USER_BODY, Duration::from_millis(15));
    let store = Arc::new(MemoryBaselineStore::new());
    let baseline = Percentiles {
        p50: 10.0,
        p95: 10.0,
        p99: 10.0,
    };
    store
        .set_performance_baseline("user", &PerformanceBaseline::new(baseline, 5))
        .unwrap();
    let mut options = RunnerOptions::serial().with_iterations(4);
    options.performance.enabled = true;
    options.performance.regression_threshold_pct = 20.0;

    let result = runner(&fake, store)
        .run(&user_collection(), &options, None, None)
        .await
        .unwrap();

    let pct = result.performance_regression_pct.unwrap();
    assert!((pct - 50.0).abs() < 1e-6, "regression was {}", pct);
    assert!(result.performance_gate_failed);
    assert!(result.is_failure());
    let report = result.performance.unwrap();
    assert_eq!(report.sample_count, 4);
    assert_eq!(report.requests[0].baseline_p95, Some(10.0));
}

#[tokio::test]
async fn test_performance_without_baseline_then_seeded() {
    let fake = FakeTransport::new();
    fake.route_with_latency("http://fake/user", 200, USER_BODY, Duration::from_millis(5));
    let store = Arc::new(MemoryBaselineStore::new());
    let mut options = RunnerOptions::serial().with_iterations(2);
    options.performance.enabled = true;
    options.performance.auto_update_baseline = true;

    let result = runner(&fake, store.clone())
        .run(&user_collection(), &options, None, None)
        .await
        .unwrap();

    assert_eq!(result.performance_regression_pct, None);
    assert!(!result.performance_gate_failed);
    assert!(result.performance_baseline_updated);
    let stored = store.get_performance_baseline("user").unwrap().unwrap();
    assert_eq!(stored.sample_count, 2);
    assert!((stored.percentiles.p95 - 5.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_file_store_persists_between_runs() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTransport::new();
    fake.route("http://fake/user", 200, USER_BODY);
    let mut options = contract_options(false, true);
    options.performance.enabled = true;
    options.performance.auto_update_baseline = true;

    let first = runner(&fake, Arc::new(FileBaselineStore::new_with_dir(dir.path())))
        .run(&user_collection(), &options, None, None)
        .await
        .unwrap();
    assert!(first.contract_baseline_updated);
    assert!(first.performance_baseline_updated);
    assert!(dir.path().join("contracts.json").exists());
    assert!(dir.path().join("performance.json").exists());

    fake.route("http://fake/user", 200, r#"{"id": 1, "name": "Alice", "tags": [1]}"#);
    options.contract.auto_update_baseline = false;
    let second = runner(&fake, Arc::new(FileBaselineStore::new_with_dir(dir.path())))
        .run(&user_collection(), &options, None, None)
        .await
        .unwrap();

    assert_eq!(second.contract_drifts.len(), 1);
    assert_eq!(second.contract_drifts[0].path, "$.tags[]");
    assert_eq!(second.contract_drifts[0].kind, DriftKind::Changed);
    assert!(second.performance.unwrap().requests[0].baseline_p95.is_some());
}

fn chaos_collection() -> Collection {
    Collection::new("c", "Chaos").with_request(
        SavedRequest::new("create", "Create", "http://fake/items")
            .with_method("POST")
            .with_header("Content-Type", "application/json")
            .with_header("X-Key", "secret")
            .with_body(r#"{"name": "widget", "count": 2}"#),
    )
}

#[tokio::test]
async fn test_chaos_light_is_stable_across_runs() {
    let fake = FakeTransport::new();
    fake.route("http://fake/items", 201, r#"{"id": 9}"#);
    let mut options = RunnerOptions::serial();
    options.chaos.enabled = true;
    options.chaos.level = ChaosLevel::Light;
    let store: Arc<dyn BaselineStore> = Arc::new(MemoryBaselineStore::new());

    let first = runner(&fake, store.clone())
        .run(&chaos_collection(), &options, None, None)
        .await
        .unwrap();
    let second = runner(&fake, store)
        .run(&chaos_collection(), &options, None, None)
        .await
        .unwrap();

    let cases = |result: &runpost::RunnerResult| -> Vec<Option<String>> {
        result.results.iter().map(|r| r.chaos_case.clone()).collect()
    };
    assert_eq!(cases(&first), cases(&second));
    assert_eq!(
        cases(&first),
        vec![
            None,
            Some("drop-header:Content-Type".to_string()),
            Some("drop-header:X-Key".to_string()),
            Some("empty-body".to_string()),
            Some("corrupt-encoding".to_string()),
            Some("invalid-content-type".to_string()),
        ]
    );
    assert_eq!(first.chaos_level, Some(ChaosLevel::Light));
    assert_eq!(first.chaos_case_count, 5);

    let calls = fake.calls();
    assert_eq!(calls[0].request.header("x-key"), Some("secret"));
    assert_eq!(calls[2].request.header("x-key"), None);
    assert_eq!(calls[3].request.body.as_deref(), Some(""));
    assert_eq!(
        calls[4].request.header("content-type"),
        Some("application/json; charset=iso-8859-1")
    );
}

#[tokio::test]
async fn test_chaos_skipped_with_base() {
    let fake = FakeTransport::new();
    let mut options = RunnerOptions::parallel();
    options.chaos.enabled = true;
    let collection = Collection::new("c", "Skip").with_request(
        SavedRequest::new("a", "A", "http://fake/a").with_condition("false"),
    );

    let result = runner(&fake, Arc::new(MemoryBaselineStore::new()))
        .run(&collection, &options, None, None)
        .await
        .unwrap();

    assert_eq!(result.total_requests, 4);
    assert_eq!(result.skipped, 4);
    assert_eq!(fake.call_count(), 0);
}

#[test]
fn test_chaos_aggressive_reproducible_with_seed() {
    let mut options = RunnerOptions::serial();
    options.chaos.enabled = true;
    options.chaos.level = ChaosLevel::Aggressive;
    options.chaos.seed = Some(42);

    let names = |plan: &Plan| -> Vec<String> {
        plan.contexts
            .iter()
            .filter_map(|c| c.chaos.as_ref().map(|case| case.name.clone()))
            .collect()
    };
    let first = Plan::build(&chaos_collection(), &options).unwrap();
    let second = Plan::build(&chaos_collection(), &options).unwrap();

    assert_eq!(names(&first), names(&second));
    assert_eq!(first.chaos_case_count(), 9);
    assert!(names(&first).iter().any(|n| n.starts_with("latency:")));
    assert!(names(&first).contains(&"fuzz-body".to_string()));
}
