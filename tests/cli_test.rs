use runpost::collection::{Collection, SavedRequest};
use runpost::runner::RunnerResult;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;
use tokio::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 写入集合与空配置文件，返回集合路径与配置路径
fn write_fixture(dir: &Path, collection: &Collection) -> (PathBuf, PathBuf) {
    let collection_path = dir.join("collection.json");
    std::fs::write(
        &collection_path,
        serde_json::to_string_pretty(collection).unwrap(),
    )
    .unwrap();
    let config_path = dir.join("runpost.toml");
    std::fs::write(&config_path, "").unwrap();
    (collection_path, config_path)
}

async fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_runpost"))
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .await
        .expect("failed to run runpost")
}

fn collection() -> Collection {
    Collection::new("c", "Cli")
        .with_request(
            SavedRequest::new("health", "Health", "{{baseUrl}}/health")
                .with_assertion("status == 200"),
        )
        .with_request(
            SavedRequest::new("items", "Items", "{{baseUrl}}/items")
                .depends_on("health")
                .with_assertion("body.items exists"),
        )
}

async fn server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .mount(&server)
        .await;
    server
}

/// `--report json` 且未指定输出文件时，stdout 只包含 JSON 报告
#[tokio::test]
async fn test_json_report_on_stdout_is_parseable() {
    let server = server().await;
    let dir = TempDir::new().unwrap();
    let (collection_path, config_path) = write_fixture(dir.path(), &collection());
    let base_url = format!("baseUrl={}", server.uri());

    let output = run_cli(
        dir.path(),
        &[
            "run",
            collection_path.to_str().unwrap(),
            "--config",
            config_path.to_str().unwrap(),
            "--var",
            &base_url,
            "--report",
            "json",
        ],
    )
    .await;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {}", stderr);

    let parsed: RunnerResult = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not a JSON report ({}): {}", e, stdout));
    assert_eq!(parsed.total_requests, 2);
    assert_eq!(parsed.passed, 2);
    assert_eq!(parsed.results[1].name, "Items");

    // 终端摘要仍然可见，只是在 stderr
    assert!(stderr.contains("Summary"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_failed_run_exits_nonzero_with_clean_json() {
    let server = server().await;
    let dir = TempDir::new().unwrap();
    let failing = Collection::new("c", "Cli").with_request(
        SavedRequest::new("health", "Health", "{{baseUrl}}/health")
            .with_assertion("status == 201"),
    );
    let (collection_path, config_path) = write_fixture(dir.path(), &failing);
    let base_url = format!("baseUrl={}", server.uri());

    let output = run_cli(
        dir.path(),
        &[
            "run",
            collection_path.to_str().unwrap(),
            "--config",
            config_path.to_str().unwrap(),
            "--var",
            &base_url,
            "--report",
            "json",
        ],
    )
    .await;

    assert_eq!(output.status.code(), Some(1));
    let parsed: RunnerResult = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed.failed, 1);
}

/// 写入文件时终端输出保留在 stdout，报告内容写入文件
#[tokio::test]
async fn test_report_written_to_output_file() {
    let server = server().await;
    let dir = TempDir::new().unwrap();
    let (collection_path, config_path) = write_fixture(dir.path(), &collection());
    let report_path = dir.path().join("report.json");
    let base_url = format!("baseUrl={}", server.uri());

    let output = run_cli(
        dir.path(),
        &[
            "run",
            collection_path.to_str().unwrap(),
            "--config",
            config_path.to_str().unwrap(),
            "--var",
            &base_url,
            "--report",
            "json",
            "--output",
            report_path.to_str().unwrap(),
        ],
    )
    .await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Summary"));

    let written = std::fs::read_to_string(&report_path).unwrap();
    let parsed: RunnerResult = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed.passed, 2);
}
