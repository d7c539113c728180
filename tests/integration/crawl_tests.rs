//! Integration tests for the crawl coordinator
//!
//! These tests use wiremock to stand in for the search provider and run
//! the full coordinator cycle end-to-end against a real SQLite database.

use driftnet::accounts::{Account, Credentials};
use driftnet::config::{Config, JobConfig, OutputConfig, PoolConfig, ProviderConfig};
use driftnet::crawler::{Coordinator, UnitOutcome};
use driftnet::storage::{SqliteStorage, Storage};
use driftnet::AccountState;
use chrono::NaiveDate;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Writes an accounts file and returns a test configuration pointing the
/// provider at the given mock server
fn create_test_config(dir: &TempDir, base_url: &str, usernames: &[&str]) -> Config {
    let accounts: Vec<_> = usernames
        .iter()
        .map(|name| {
            json!({
                "username": name,
                "password": "pw",
                "email": format!("{}@example.com", name),
                "email_pass": "ep",
            })
        })
        .collect();

    let accounts_path = dir.path().join("accounts.json");
    let mut file = std::fs::File::create(&accounts_path).expect("create accounts file");
    file.write_all(serde_json::to_vec(&accounts).unwrap().as_slice())
        .expect("write accounts file");

    Config {
        job: JobConfig {
            keywords: vec!["rust".to_string()],
            start_date: NaiveDate::from_ymd_opt(2023, 1, 12).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 1, 26).unwrap(),
            chunk_days: 7,
            max_per_chunk: 130,
            request_delay_ms: 0,
            chunk_delay_ms: 0,
            max_workers: 2,
        },
        pool: PoolConfig {
            accounts_path: accounts_path.to_string_lossy().into_owned(),
            ban_threshold: 3,
            cooldown_base_secs: 1,
            cooldown_max_secs: 4,
            acquire_attempts: 2,
            acquire_backoff_secs: 0,
        },
        provider: ProviderConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            page_size: 50,
        },
        output: OutputConfig {
            database_path: dir
                .path()
                .join("driftnet.db")
                .to_string_lossy()
                .into_owned(),
        },
    }
}

fn open_db(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).expect("open database")
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-1" })))
        .mount(server)
        .await;
}

fn search_page(ids: &[&str]) -> serde_json::Value {
    let items: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "username": "author",
                "text": format!("post {}", id),
                "date": "2023-01-13T10:00:00Z",
            })
        })
        .collect();
    json!({ "items": items })
}

#[tokio::test]
async fn test_full_crawl_persists_results_and_outcomes() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;

    // Every unit sees the same three items; deduplication keeps one copy
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(search_page(&["p-1", "p-2", "p-3"])),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &mock_server.uri(), &["alice", "bob"]);

    let mut coordinator = Coordinator::new(config.clone(), "hash-1", true).expect("coordinator");
    let progress = coordinator.run().await.expect("crawl run");

    // Two keywords x windows: [01-12, 01-19) and [01-19, 01-26)
    assert_eq!(progress.units_attempted, 2);
    assert_eq!(progress.units_completed, 2);
    assert_eq!(progress.units_failed, 0);
    assert_eq!(progress.records_accepted, 3);
    assert_eq!(progress.duplicates_rejected, 3);

    let storage = open_db(&config);
    assert_eq!(storage.count_results().unwrap(), 3);
    assert_eq!(
        storage
            .count_units_by_outcome(UnitOutcome::Completed)
            .unwrap(),
        2
    );
    assert_eq!(
        storage.count_results_by_keyword().unwrap(),
        vec![("rust".to_string(), 3)]
    );

    // The run record is closed
    let run = storage.get_latest_run().unwrap().expect("run record");
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_resume_skips_completed_units() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(&["p-1"])))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &mock_server.uri(), &["alice"]);

    let mut first = Coordinator::new(config.clone(), "hash-1", true).expect("coordinator");
    let progress = first.run().await.expect("first run");
    assert_eq!(progress.units_completed, 2);
    drop(first);

    // A second invocation finds every unit completed and does nothing
    let mut second = Coordinator::new(config.clone(), "hash-1", false).expect("coordinator");
    let progress = second.run().await.expect("second run");
    assert_eq!(progress.units_attempted, 0);
    assert_eq!(progress.records_accepted, 0);

    let storage = open_db(&config);
    assert_eq!(storage.count_results().unwrap(), 1);
}

#[tokio::test]
async fn test_fresh_recrawl_is_idempotent() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(&["p-1", "p-2"])))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &mock_server.uri(), &["alice"]);

    let mut first = Coordinator::new(config.clone(), "hash-1", true).expect("coordinator");
    first.run().await.expect("first run");
    drop(first);

    // --fresh clears the completion log; the sink absorbs re-crawled records
    let mut second = Coordinator::new(config.clone(), "hash-1", true).expect("coordinator");
    let progress = second.run().await.expect("second run");
    assert_eq!(progress.units_attempted, 2);
    assert_eq!(progress.records_accepted, 0);
    assert_eq!(progress.duplicates_rejected, 4);

    let storage = open_db(&config);
    assert_eq!(storage.count_results().unwrap(), 2);
}

#[tokio::test]
async fn test_rejected_credentials_skip_units_and_ban_account() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &mock_server.uri(), &["alice"]);

    let mut coordinator = Coordinator::new(config.clone(), "hash-1", true).expect("coordinator");
    // Unit-level trouble never fails the process
    let progress = coordinator.run().await.expect("crawl run");

    assert_eq!(progress.units_skipped, 2);
    assert_eq!(progress.units_completed, 0);
    assert_eq!(progress.records_accepted, 0);

    let storage = open_db(&config);
    assert_eq!(storage.count_results().unwrap(), 0);
    assert_eq!(
        storage.count_units_by_outcome(UnitOutcome::Skipped).unwrap(),
        2
    );
    let account = storage.get_account("alice").unwrap().expect("account row");
    assert_eq!(account.state, AccountState::Banned);

    // Skipped units are retried on the next run
    let mut retry = Coordinator::new(config.clone(), "hash-1", false).expect("coordinator");
    let progress = retry.run().await.expect("retry run");
    assert_eq!(progress.units_attempted, 2);
    assert_eq!(progress.units_skipped, 2);
}

#[tokio::test]
async fn test_worker_pool_sized_by_usable_accounts() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(&["p-1"])))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir, &mock_server.uri(), &["alice", "b1", "b2", "b3"]);
    config.job.keywords = vec!["rust".to_string(), "tokio".to_string()];
    config.job.max_workers = 4;
    config.pool.acquire_attempts = 1;

    // Three accounts were banned in an earlier run; only alice is usable.
    {
        let mut storage = open_db(&config);
        for name in ["b1", "b2", "b3"] {
            let mut account = Account::new(Credentials {
                username: name.to_string(),
                password: "pw".to_string(),
                email: format!("{}@example.com", name),
                email_password: "ep".to_string(),
            });
            account.record_hard_failure();
            storage.upsert_account(&account).unwrap();
        }
    }

    let mut coordinator = Coordinator::new(config.clone(), "hash-1", true).expect("coordinator");
    let progress = coordinator.run().await.expect("crawl run");

    // With workers bounded by the one usable account, no unit contends
    // for a lease it can never get.
    assert_eq!(progress.units_attempted, 4);
    assert_eq!(progress.units_completed, 4);
    assert_eq!(progress.units_skipped, 0);

    let storage = open_db(&config);
    assert_eq!(storage.count_results().unwrap(), 1);
}

#[tokio::test]
async fn test_server_errors_fail_units_and_cool_down_account() {
    let mock_server = MockServer::start().await;
    mount_session(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &mock_server.uri(), &["alice"]);

    let mut coordinator = Coordinator::new(config.clone(), "hash-1", true).expect("coordinator");
    let progress = coordinator.run().await.expect("crawl run");

    assert_eq!(progress.units_completed, 0);
    // Each failed search releases the account into cooldown; later units
    // may then be skipped when no account is usable within the retry
    // budget.
    assert_eq!(progress.units_failed + progress.units_skipped, 2);
    assert!(progress.units_failed >= 1);

    let storage = open_db(&config);
    assert_eq!(storage.count_results().unwrap(), 0);
    let account = storage.get_account("alice").unwrap().expect("account row");
    assert_eq!(account.state, AccountState::Cooldown);
}
