//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a tiny wiki and run the full crawl
//! cycle end-to-end, with in-process workers as well as real worker
//! processes of the `wiki-ripple` binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use wiki_ripple::config::{Config, CrawlerConfig, FetchConfig, Isolation, StorageConfig};
use wiki_ripple::crawler::{Coordinator, ProcessLauncher, StopReason, WorkerLauncher};
use wiki_ripple::state::{ArticleState, RunStatus};
use wiki_ripple::storage::{SqliteStorage, Storage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling from `A` against `base_url`
fn create_test_config(base_url: &str, db_path: &Path, isolation: Isolation) -> Config {
    Config {
        crawler: CrawlerConfig {
            seed: "A".to_string(),
            max_concurrent_workers: 2,
            max_batches: None,
            batch_size: 2,
            isolation,
        },
        fetch: FetchConfig {
            base_url: base_url.to_string(),
            request_delay: 5, // Very short for testing
            timeout: 5,
            user_agent: "TestBot/1.0".to_string(),
        },
        storage: StorageConfig {
            database_path: db_path.to_path_buf(),
        },
    }
}

fn article_page(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|target| format!(r#"<li><a href="/wiki/{}">{}</a></li>"#, target, target))
        .collect();
    format!(
        r#"<html><head><title>Article</title></head><body>
        <a href="/wiki/Main_Page">Main page</a>
        <ul>{}</ul>
        <a href="/wiki/Special:Random">Random</a>
        </body></html>"#,
        anchors
    )
}

/// Serves A -> {B, C, Missing}, B -> {C, A}, C -> {} and a 404 for Missing
async fn start_wiki() -> MockServer {
    let server = MockServer::start().await;

    for (name, links) in [
        ("A", vec!["B", "C", "Missing"]),
        ("B", vec!["C", "A"]),
        ("C", vec![]),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/wiki/{}", name)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(article_page(&links))
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/wiki/Missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    server
}

fn wiki_base(server: &MockServer) -> String {
    format!("{}/wiki/", server.uri())
}

fn worker_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_wiki-ripple"))
}

fn assert_small_wiki_crawled(db_path: &Path) {
    let storage = SqliteStorage::new(db_path).unwrap();

    let mut ready = storage.ready_articles().unwrap();
    ready.sort();
    assert_eq!(ready, vec!["A", "B", "C"]);

    let graph = storage.snapshot_graph().unwrap();
    assert_eq!(graph["A"], vec!["B", "C", "Missing"]);
    assert_eq!(graph["B"], vec!["C", "A"]);
    assert!(!graph.contains_key("C"));

    // The failed fetch leaves the article where the claim put it
    let missing = storage.get_article("Missing").unwrap().unwrap();
    assert_eq!(missing.state, ArticleState::Working);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_crawl_with_task_workers() {
    let server = start_wiki().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("wiki.db");

    let config = create_test_config(&wiki_base(&server), &db_path, Isolation::Task);
    let coordinator = Coordinator::new(config, "test-hash").await.unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::QueueDrained);
    assert_eq!(summary.completed_articles, 3);
    assert_eq!(summary.failed_fetches, 1);
    assert_eq!(summary.crashed_workers, 0);

    assert_small_wiki_crawled(&db_path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_crawl_with_worker_processes() {
    let server = start_wiki().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("wiki.db");

    let config = create_test_config(&wiki_base(&server), &db_path, Isolation::Process);
    let launcher: Arc<dyn WorkerLauncher> =
        Arc::new(ProcessLauncher::new(worker_binary(), config.fetch.clone()));

    let coordinator = Coordinator::with_launcher(config, "test-hash", launcher)
        .await
        .unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::QueueDrained);
    assert_eq!(summary.completed_articles, 3);
    assert_eq!(summary.failed_fetches, 1);
    assert_eq!(summary.crashed_workers, 0);

    assert_small_wiki_crawled(&db_path);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crashed_worker_recovered_on_restart() {
    let server = start_wiki().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("wiki.db");

    // A worker that exits non-zero without reporting anything
    let config = create_test_config(&wiki_base(&server), &db_path, Isolation::Process);
    let crashing: Arc<dyn WorkerLauncher> =
        Arc::new(ProcessLauncher::new(PathBuf::from("false"), config.fetch.clone()));

    let summary = Coordinator::with_launcher(config, "test-hash", crashing)
        .await
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.started_batches, 1);
    assert_eq!(summary.crashed_workers, 1);
    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let seed = storage.get_article("A").unwrap().unwrap();
        assert_eq!(seed.state, ArticleState::Working);
    }

    // Restart: the stalled seed is recovered and crawled
    let config = create_test_config(&wiki_base(&server), &db_path, Isolation::Task);
    let coordinator = Coordinator::new(config, "test-hash").await.unwrap();
    assert_eq!(coordinator.recovered_articles(), 1);

    let summary = coordinator.run().await.unwrap();
    assert_eq!(summary.completed_articles, 3);
    assert_small_wiki_crawled(&db_path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_budgeted_crawl_resumes_on_next_run() {
    let server = start_wiki().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("wiki.db");

    let mut config = create_test_config(&wiki_base(&server), &db_path, Isolation::Task);
    config.crawler.max_batches = Some(1);
    config.crawler.batch_size = 1;

    let summary = Coordinator::new(config, "first")
        .await
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::BatchBudgetExhausted);
    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let counts = storage.count_articles().unwrap();
        assert_eq!(counts.ready, 1);
        assert_eq!(counts.queued, 3);
        assert_eq!(
            storage.get_latest_run().unwrap().unwrap().status,
            RunStatus::BudgetExhausted
        );
    }

    let config = create_test_config(&wiki_base(&server), &db_path, Isolation::Task);
    let summary = Coordinator::new(config, "second")
        .await
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::QueueDrained);
    assert_eq!(summary.completed_articles, 2);
    assert_small_wiki_crawled(&db_path);
}

fn write_config_file(dir: &Path, base_url: &str, db_path: &Path) -> PathBuf {
    let config_path = dir.join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[crawler]
seed = "A"
max-concurrent-workers = 2
batch-size = 2

[fetch]
base-url = "{}"
request-delay = 5
timeout = 5

[storage]
database-path = "{}"
"#,
            base_url,
            db_path.display()
        ),
    )
    .unwrap();
    config_path
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cli_crawl_and_export_graph() {
    let server = start_wiki().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("wiki.db");
    let config_path = write_config_file(dir.path(), &wiki_base(&server), &db_path);

    let status = tokio::process::Command::new(worker_binary())
        .arg("crawl")
        .arg(&config_path)
        .arg("-q")
        .status()
        .await
        .unwrap();
    assert!(status.success());
    assert_small_wiki_crawled(&db_path);

    let export_path = dir.path().join("graph.json");
    let status = tokio::process::Command::new(worker_binary())
        .arg("export-graph")
        .arg(&config_path)
        .arg(&export_path)
        .arg("-q")
        .status()
        .await
        .unwrap();
    assert!(status.success());

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
    assert_eq!(exported["edge_count"], 5);
    assert_eq!(exported["graph"]["B"], serde_json::json!(["C", "A"]));
}

#[test]
fn test_cli_read_commands_require_existing_database() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("missing").join("wiki.db");
    let config_path = write_config_file(dir.path(), "https://en.wikipedia.org/wiki/", &db_path);

    let stats = std::process::Command::new(worker_binary())
        .arg("stats")
        .arg(&config_path)
        .arg("-q")
        .output()
        .unwrap();
    assert!(!stats.status.success());
    assert!(String::from_utf8_lossy(&stats.stderr).contains("Database not found"));

    let export = std::process::Command::new(worker_binary())
        .arg("export-graph")
        .arg(&config_path)
        .arg(dir.path().join("graph.json"))
        .arg("-q")
        .output()
        .unwrap();
    assert!(!export.status.success());

    assert!(!db_path.exists());
    assert!(!db_path.parent().unwrap().exists());
    assert!(!dir.path().join("graph.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cli_stats_after_crawl() {
    let server = start_wiki().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("wiki.db");
    let config_path = write_config_file(dir.path(), &wiki_base(&server), &db_path);

    let status = tokio::process::Command::new(worker_binary())
        .arg("crawl")
        .arg(&config_path)
        .arg("-q")
        .status()
        .await
        .unwrap();
    assert!(status.success());

    let output = tokio::process::Command::new(worker_binary())
        .arg("stats")
        .arg(&config_path)
        .arg("-q")
        .output()
        .await
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Total edges recorded: 5"));
    assert!(stdout.contains("Status: completed"));
}

#[test]
fn test_cli_check_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config_file(dir.path(), "ftp://example.com/wiki/", &dir.path().join("x.db"));

    let output = std::process::Command::new(worker_binary())
        .arg("check")
        .arg(&config_path)
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn test_worker_subcommand_reports_errors_as_lines() {
    // Nothing listens on port 9, so every fetch fails but the worker still succeeds
    let output = std::process::Command::new(worker_binary())
        .args([
            "worker",
            "--base-url",
            "http://127.0.0.1:9/wiki/",
            "--request-delay",
            "0",
            "--timeout",
            "1",
            "--user-agent",
            "TestBot/1.0",
            "-q",
            "--",
            "A",
            "B",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "error");
    assert_eq!(lines[0]["data"]["identifier"], "A");
    assert_eq!(lines[1]["data"]["identifier"], "B");
}
