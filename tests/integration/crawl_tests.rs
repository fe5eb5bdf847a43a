//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the followers API and run
//! complete crawls, including interrupts and resumes, end-to-end.

use async_trait::async_trait;
use follower_frontier::config::{parse_config, Config};
use follower_frontier::credentials::{Credential, HarvestError, Harvester};
use follower_frontier::crawler::{CrawlOverrides, RunPaths};
use follower_frontier::output::{read_records, OutputError};
use follower_frontier::storage::{load_checkpoint, CheckpointState, RunStatus};
use follower_frontier::{Coordinator, CrawlError, ErrorCategory, Identity, Record};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

const NAMESPACE: &str = "spotify:user:";

/// Builds a configuration pointing at the mock server
///
/// `crawler` and `credentials` are extra lines appended to those sections;
/// each token becomes one static header set. Concurrency defaults to 4
/// unless `crawler` sets it; min pool size defaults to 1 unless
/// `credentials` sets it.
fn create_test_config(server: &MockServer, crawler: &str, credentials: &str, tokens: &[&str]) -> Config {
    let headers: Vec<String> = tokens
        .iter()
        .map(|t| format!("{{ authorization = \"{}\" }}", t))
        .collect();
    let concurrency = if crawler.contains("max-concurrent-requests") {
        ""
    } else {
        "max-concurrent-requests = 4"
    };
    let min_pool = if credentials.contains("min-pool-size") {
        ""
    } else {
        "min-pool-size = 1"
    };

    let content = format!(
        r#"
[crawler]
{concurrency}
retry-backoff-ms = 5
{crawler}

[api]
followers-url = "{uri}/user/{{identity}}/followers"
uri-namespace = "{namespace}"
request-timeout-secs = 5

[credentials]
{min_pool}
max-pool-size = 4
harvest-retry-delay-ms = 10
{credentials}

[harvester]
kind = "static"
headers = [{headers}]
"#,
        concurrency = concurrency,
        min_pool = min_pool,
        crawler = crawler,
        uri = server.uri(),
        namespace = NAMESPACE,
        credentials = credentials,
        headers = headers.join(", "),
    );

    parse_config(&content).expect("test config should be valid")
}

fn paths(dir: &TempDir) -> RunPaths {
    RunPaths::new(dir.path().join("graph.jsonl"), dir.path().join("graph.checkpoint.json"))
}

/// A followers payload listing `ids` in the namespace
fn followers(ids: &[&str]) -> serde_json::Value {
    let profiles: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            json!({
                "uri": format!("{}{}", NAMESPACE, id),
                "name": id.to_uppercase(),
                "followers_count": 3,
            })
        })
        .collect();
    json!({ "profiles": profiles })
}

async fn mount_followers(server: &MockServer, identity: &str, ids: &[&str], expected: impl Into<Times>) {
    Mock::given(method("GET"))
        .and(path(format!("/user/{}/followers", identity)))
        .respond_with(ResponseTemplate::new(200).set_body_json(followers(ids)))
        .expect(expected)
        .mount(server)
        .await;
}

fn find<'a>(records: &'a [Record], identity: &str) -> &'a Record {
    records
        .iter()
        .find(|r| r.identity.as_str() == identity)
        .unwrap_or_else(|| panic!("no record for {}", identity))
}

async fn start(config: &Config, seed: &str, paths: RunPaths) -> Coordinator {
    Coordinator::start(config, Identity::new(seed), CrawlOverrides::default(), paths)
        .expect("coordinator should build")
}

fn identities(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.identity.as_str()).collect()
}

fn pending_identities(checkpoint: &CheckpointState) -> BTreeSet<&str> {
    checkpoint
        .pending_entries
        .iter()
        .map(|e| e.identity.as_str())
        .collect()
}

/// Every visited identity has a record on disk or is pending, never both
fn assert_checkpoint_covers(checkpoint: &CheckpointState, records: &[Record]) {
    let written: BTreeSet<&str> = identities(records).into_iter().collect();
    let pending = pending_identities(checkpoint);
    let visited: BTreeSet<&str> = checkpoint
        .visited_identities
        .iter()
        .map(Identity::as_str)
        .collect();

    assert!(written.is_disjoint(&pending), "{:?} vs {:?}", written, pending);
    let union: BTreeSet<&str> = written.union(&pending).copied().collect();
    assert_eq!(union, visited);
}

#[tokio::test]
async fn test_crawl_stops_at_depth_and_cap() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/user/a/followers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "profiles": [
                { "uri": "spotify:user:b", "name": "B", "followers_count": 1 },
                { "uri": "spotify:artist:x", "name": "Artist" },
                { "uri": "spotify:user:c", "name": "C", "followers_count": 20 },
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_followers(&server, "b", &["d"], 1).await;

    let names: Vec<String> = (0..20).map(|i| format!("c{}", i)).collect();
    let many: Vec<&str> = names.iter().map(String::as_str).collect();
    mount_followers(&server, "c", &many, 1).await;

    // Nothing below depth 1 is ever requested
    mount_followers(&server, "d", &[], 0).await;

    let config = create_test_config(&server, "max-depth = 1\nfollower-cap = 10", "", &["Bearer 1"]);
    let paths = paths(&dir);
    let summary = start(&config, "a", paths.clone())
        .await
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.statistics.records_written, 3);
    assert_eq!(summary.statistics.scraped, 3);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 3);

    let a = find(&records, "a");
    assert_eq!(a.depth, 0);
    assert_eq!(a.follower_count, Some(2));
    assert_eq!(a.follower_profiles.len(), 2);

    let b = find(&records, "b");
    assert_eq!(b.depth, 1);
    assert_eq!(b.name.as_deref(), Some("B"));
    assert_eq!(b.follower_count, Some(1));

    let c = find(&records, "c");
    assert_eq!(c.follower_count, Some(20));
    assert!(records.iter().all(|r| r.error.is_none()));

    let checkpoint = load_checkpoint(&paths.checkpoint).unwrap();
    assert_eq!(checkpoint.status, RunStatus::Completed);
    assert!(checkpoint.pending_entries.is_empty());
    assert_eq!(
        checkpoint.visited_identities,
        vec![Identity::new("a"), Identity::new("b"), Identity::new("c")]
    );
    assert_eq!(checkpoint.scraped_count, 3);
}

#[tokio::test]
async fn test_shared_followers_fetched_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_followers(&server, "a", &["b", "c"], 1).await;
    mount_followers(&server, "b", &["c", "a"], 1).await;
    mount_followers(&server, "c", &[], 1).await;

    let config = create_test_config(&server, "max-depth = 2", "", &["Bearer 1"]);
    let paths = paths(&dir);
    let summary = start(&config, "a", paths.clone())
        .await
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(find(&records, "c").depth, 1);
    assert_eq!(find(&records, "c").follower_count, Some(0));
}

#[tokio::test]
async fn test_expired_credential_is_replaced() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/user/a/followers"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/a/followers"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(followers(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server, "", "", &["Bearer stale", "Bearer fresh"]);
    let paths = paths(&dir);
    let summary = start(&config, "a", paths.clone())
        .await
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.pool.invalidated, 1);
    assert_eq!(summary.statistics.error_count(ErrorCategory::AuthExpired), 1);
    assert_eq!(summary.statistics.retries, 1);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].error.is_none());
}

#[tokio::test]
async fn test_rate_limited_entry_hits_retry_ceiling() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // retry-ceiling = 2 allows three attempts in total
    Mock::given(method("GET"))
        .and(path("/user/a/followers"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let config = create_test_config(
        &server,
        "retry-ceiling = 2",
        "",
        &["Bearer 1", "Bearer 2", "Bearer 3", "Bearer 4", "Bearer 5"],
    );
    let paths = paths(&dir);
    let summary = start(&config, "a", paths.clone())
        .await
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.statistics.rate_limited, 3);
    assert_eq!(summary.statistics.retries, 2);
    assert_eq!(summary.pool.invalidated, 3);
    assert_eq!(
        summary.statistics.error_count(ErrorCategory::RetryCeilingExceeded),
        1
    );

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].error.as_deref(),
        Some("retry ceiling exceeded after 3 attempts (rate limited)")
    );

    let checkpoint = load_checkpoint(&paths.checkpoint).unwrap();
    assert_eq!(checkpoint.rate_limited_count, 3);
    assert_eq!(checkpoint.scraped_count, 0);
}

#[tokio::test]
async fn test_rate_limit_only_removes_offending_credential() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(header("authorization", "Bearer bad"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/a/followers"))
        .and(header("authorization", "Bearer good"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(followers(&["b", "c", "d"]))
                // Lets the second credential join the pool before children go out
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;
    for id in ["b", "c", "d"] {
        Mock::given(method("GET"))
            .and(path(format!("/user/{}/followers", id)))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(followers(&[])))
            .mount(&server)
            .await;
    }

    let config = create_test_config(
        &server,
        "max-depth = 1",
        "min-pool-size = 2",
        &["Bearer good", "Bearer bad"],
    );
    let paths = paths(&dir);
    let summary = start(&config, "a", paths.clone())
        .await
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.pool.invalidated, 1);
    assert_eq!(summary.pool.size, 1);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.error.is_none()));
}

#[tokio::test]
async fn test_auth_expired_removes_only_failing_credential() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/a/followers"))
        .and(header("authorization", "Bearer valid"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(followers(&["b", "c", "d"]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    for id in ["b", "c", "d"] {
        Mock::given(method("GET"))
            .and(path(format!("/user/{}/followers", id)))
            .and(header("authorization", "Bearer valid"))
            // Keeps the children in flight together
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(followers(&[]))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = create_test_config(
        &server,
        "max-depth = 1",
        "min-pool-size = 2",
        &["Bearer valid", "Bearer expired"],
    );
    let paths = paths(&dir);
    let coordinator = start(&config, "a", paths.clone()).await;
    let pool = coordinator.pool();
    let summary = coordinator.run(std::future::pending()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.statistics.error_count(ErrorCategory::AuthExpired), 1);
    assert_eq!(summary.pool.invalidated, 1);
    assert_eq!(pool.size(), 1);
    assert_eq!(pool.acquire().unwrap().authorization(), "Bearer valid");

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.error.is_none()));
}

#[tokio::test]
async fn test_forbidden_and_malformed_become_error_records() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_followers(&server, "a", &["b", "c"], 1).await;
    Mock::given(method("GET"))
        .and(path("/user/b/followers"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/c/followers"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server, "max-depth = 2", "", &["Bearer 1"]);
    let paths = paths(&dir);
    let summary = start(&config, "a", paths.clone())
        .await
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.pool.invalidated, 0);
    assert_eq!(summary.statistics.error_records, 2);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 3);

    let b = find(&records, "b");
    assert_eq!(b.error.as_deref(), Some("forbidden"));
    assert_eq!(b.name.as_deref(), Some("B"));
    assert_eq!(b.follower_count, Some(3));

    let c = find(&records, "c");
    assert!(c.error.as_deref().unwrap().starts_with("malformed payload"));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/user/a/followers"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_followers(&server, "a", &[], 1).await;

    let config = create_test_config(&server, "", "", &["Bearer 1"]);
    let paths = paths(&dir);
    let summary = start(&config, "a", paths.clone())
        .await
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(summary.statistics.retries, 1);
    assert_eq!(summary.statistics.error_count(ErrorCategory::Transient), 1);
    assert_eq!(summary.pool.invalidated, 0);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].error.is_none());
}

#[tokio::test]
async fn test_interrupted_crawl_resumes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_followers(&server, "a", &["b", "c"], 1).await;
    mount_followers(&server, "b", &[], 1).await;
    mount_followers(&server, "c", &[], 1).await;

    let config = create_test_config(&server, "max-depth = 1", "", &["Bearer 1"]);
    let paths = paths(&dir);

    // Interrupt before anything is dispatched
    let summary = start(&config, "a", paths.clone())
        .await
        .run(std::future::ready(()))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Interrupted);

    let checkpoint = load_checkpoint(&paths.checkpoint).unwrap();
    assert_eq!(checkpoint.status, RunStatus::Interrupted);
    assert_eq!(checkpoint.pending_entries.len(), 1);
    assert_eq!(checkpoint.pending_entries[0].identity.as_str(), "a");
    assert_eq!(checkpoint.output_path.as_deref(), Some(paths.records.as_path()));
    assert!(read_records(&paths.records).unwrap().is_empty());

    let summary = Coordinator::resume(&config, &checkpoint, CrawlOverrides::default(), paths.clone())
        .unwrap()
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.statistics.scraped, 3);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(records.len(), 3);

    // A completed crawl has nothing left to do
    let checkpoint = load_checkpoint(&paths.checkpoint).unwrap();
    assert!(checkpoint.is_complete());
    let summary = Coordinator::resume(&config, &checkpoint, CrawlOverrides::default(), paths.clone())
        .unwrap()
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.statistics.records_written, 0);
    assert_eq!(read_records(&paths.records).unwrap().len(), 3);
}

#[tokio::test]
async fn test_resume_appends_without_duplicates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_followers(&server, "a", &["b"], 1).await;
    mount_followers(&server, "b", &["a", "c"], 1).await;
    mount_followers(&server, "c", &[], 1).await;

    // First pass only reaches depth 0
    let config = create_test_config(&server, "max-depth = 0", "", &["Bearer 1"]);
    let paths = paths(&dir);
    start(&config, "a", paths.clone())
        .await
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(read_records(&paths.records).unwrap().len(), 1);

    // Deepen the crawl with the seed's follower still pending
    let mut checkpoint = load_checkpoint(&paths.checkpoint).unwrap();
    checkpoint.max_depth = 2;
    checkpoint.visited_identities.push(Identity::new("b"));
    checkpoint.pending_entries.push(follower_frontier::FrontierEntry {
        depth: 1,
        ..follower_frontier::FrontierEntry::seed("b")
    });

    let summary = Coordinator::resume(&config, &checkpoint, CrawlOverrides::default(), paths.clone())
        .unwrap()
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.max_depth, 2);

    let records = read_records(&paths.records).unwrap();
    let identities: Vec<&str> = records.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(identities, vec!["a", "b", "c"]);
    assert_eq!(find(&records, "c").depth, 2);
}

#[tokio::test]
async fn test_interrupt_waits_for_in_flight_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_followers(&server, "a", &["b", "c", "d"], 1).await;
    Mock::given(method("GET"))
        .and(path("/user/b/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(followers(&[]))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_followers(&server, "c", &[], 1).await;
    mount_followers(&server, "d", &[], 1).await;

    let config = create_test_config(
        &server,
        "max-depth = 1\nmax-concurrent-requests = 1",
        "",
        &["Bearer 1"],
    );
    let paths = paths(&dir);

    // b is in flight when the interrupt lands; c and d are still queued
    let summary = start(&config, "a", paths.clone())
        .await
        .run(tokio::time::sleep(Duration::from_millis(500)))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Interrupted);
    assert_eq!(summary.pending, 2);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(identities(&records), vec!["a", "b"]);

    let checkpoint = load_checkpoint(&paths.checkpoint).unwrap();
    assert_eq!(checkpoint.status, RunStatus::Interrupted);
    assert_eq!(
        pending_identities(&checkpoint),
        BTreeSet::from(["c", "d"])
    );
    assert!(checkpoint.pending_entries.iter().all(|e| e.depth == 1));
    assert_eq!(checkpoint.pending_entries[0].known_name.as_deref(), Some("C"));
    assert_checkpoint_covers(&checkpoint, &records);

    let summary = Coordinator::resume(&config, &checkpoint, CrawlOverrides::default(), paths.clone())
        .unwrap()
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.statistics.scraped, 4);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(identities(&records), vec!["a", "b", "c", "d"]);
    assert!(load_checkpoint(&paths.checkpoint).unwrap().is_complete());
}

/// Hands out one credential, then stalls on every later harvest
struct StallingHarvester {
    calls: AtomicUsize,
}

#[async_trait]
impl Harvester for StallingHarvester {
    async fn harvest(&self) -> Result<Credential, HarvestError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(Credential::new([("authorization", "Bearer 1")]));
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(HarvestError::Timeout(30))
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

#[tokio::test]
async fn test_interrupt_keeps_parked_entries_pending() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_followers(&server, "a", &["b", "c"], 1).await;
    Mock::given(method("GET"))
        .and(path("/user/b/followers"))
        .and(header("authorization", "Bearer 1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/b/followers"))
        .and(header("authorization", "Bearer 2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(followers(&[])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/c/followers"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(followers(&[]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server, "max-depth = 1", "", &["Bearer 1", "Bearer 2"]);
    let paths = paths(&dir);

    // b loses the only credential and parks behind a harvest that never ends
    let summary = start(&config, "a", paths.clone())
        .await
        .with_harvester(Arc::new(StallingHarvester {
            calls: AtomicUsize::new(0),
        }))
        .run(tokio::time::sleep(Duration::from_millis(800)))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Interrupted);
    assert_eq!(summary.parked, 1);
    assert_eq!(summary.pool.size, 0);
    assert_eq!(summary.pool.invalidated, 1);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(identities(&records), vec!["a", "c"]);

    let checkpoint = load_checkpoint(&paths.checkpoint).unwrap();
    assert_eq!(checkpoint.status, RunStatus::Interrupted);
    assert_eq!(pending_identities(&checkpoint), BTreeSet::from(["b"]));
    assert_eq!(checkpoint.pending_entries[0].depth, 1);
    assert_eq!(checkpoint.pending_entries[0].known_name.as_deref(), Some("B"));
    assert_checkpoint_covers(&checkpoint, &records);

    // The configured harvester supplies a working credential on resume
    let summary = Coordinator::resume(&config, &checkpoint, CrawlOverrides::default(), paths.clone())
        .unwrap()
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.parked, 0);

    let records = read_records(&paths.records).unwrap();
    assert_eq!(identities(&records), vec!["a", "c", "b"]);
    assert!(records.iter().all(|r| r.error.is_none()));
    assert!(load_checkpoint(&paths.checkpoint).unwrap().is_complete());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_write_failure_saves_failed_checkpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_followers(&server, "a", &["b", "c"], 2).await;
    mount_followers(&server, "b", &[], 0..=2).await;
    mount_followers(&server, "c", &[], 0..=2).await;

    let config = create_test_config(&server, "max-depth = 1", "", &["Bearer 1"]);
    let checkpoint_path = dir.path().join("graph.checkpoint.json");

    // Every flush to /dev/full fails with ENOSPC
    let result = start(&config, "a", RunPaths::new("/dev/full", &checkpoint_path))
        .await
        .run(std::future::pending())
        .await;
    match result {
        Err(CrawlError::Output(OutputError::Io(_))) => {}
        other => panic!("expected a write error, got {:?}", other.map(|s| s.status)),
    }

    let checkpoint = load_checkpoint(&checkpoint_path).unwrap();
    assert_eq!(checkpoint.status, RunStatus::Failed);
    assert_eq!(checkpoint.scraped_count, 0);
    assert!(pending_identities(&checkpoint).contains("a"));
    assert_checkpoint_covers(&checkpoint, &[]);

    let paths = RunPaths::new(dir.path().join("graph.jsonl"), &checkpoint_path);
    let summary = Coordinator::resume(&config, &checkpoint, CrawlOverrides::default(), paths.clone())
        .unwrap()
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Completed);

    let records = read_records(&paths.records).unwrap();
    let mut written = identities(&records);
    written.sort_unstable();
    assert_eq!(written, vec!["a", "b", "c"]);
}

/// Harvester that never produces a credential
struct BrokenHarvester;

#[async_trait]
impl Harvester for BrokenHarvester {
    async fn harvest(&self) -> Result<Credential, HarvestError> {
        Err(HarvestError::InvalidOutput("browser crashed".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test]
async fn test_harvester_exhaustion_fails_crawl() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_followers(&server, "a", &[], 0).await;

    let config = create_test_config(&server, "", "max-harvest-failures = 2", &["Bearer 1"]);
    let paths = paths(&dir);
    let result = start(&config, "a", paths.clone())
        .await
        .with_harvester(Arc::new(BrokenHarvester))
        .run(std::future::pending())
        .await;

    match result {
        Err(CrawlError::HarvesterExhausted { failures, last }) => {
            assert_eq!(failures, 2);
            assert!(last.starts_with("credential harvest failed"));
            assert!(last.contains("browser crashed"));
        }
        other => panic!("expected harvester exhaustion, got {:?}", other.map(|s| s.status)),
    }

    let checkpoint = load_checkpoint(&paths.checkpoint).unwrap();
    assert_eq!(checkpoint.status, RunStatus::Failed);
    assert_eq!(checkpoint.pending_entries.len(), 1);
    assert!(checkpoint.status.is_resumable());
}
