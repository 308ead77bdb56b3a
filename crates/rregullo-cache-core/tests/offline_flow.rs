//! End-to-end flow against a local HTTP server: install, activate, serve
//! offline, and drain queued reports.

use std::sync::Arc;
use std::time::Duration;

use rregullo_cache_core::cache::CacheStorage;
use rregullo_cache_core::http::TIMEOUT_STATUS;
use rregullo_cache_core::{
    AssetManifest, CacheKey, DiskCacheStorage, FetchOutcome, HttpFetcher, HttpReportSubmitter,
    OfflineCacheWorker, PendingReport, RegisterOutcome, Registration, ReportQueue, ReportSync,
    Request, Response, ResponseSource, WorkerSettings, WorkerState, SYNC_REPORTS_TAG,
};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Client timeout; mocks slower than this stand in for a dead network.
const CLIENT_TIMEOUT: Duration = Duration::from_millis(300);
const SLOW: Duration = Duration::from_secs(2);

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn hang(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_delay(SLOW))
        .mount(server)
        .await;
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

fn worker(server: &MockServer, assets: &[&str], storage: Arc<DiskCacheStorage>) -> OfflineCacheWorker {
    OfflineCacheWorker::new(
        WorkerSettings::for_origin(&server.uri()).unwrap(),
        AssetManifest::new(assets.iter().copied()),
        storage,
        Arc::new(HttpFetcher::new(CLIENT_TIMEOUT).unwrap()),
    )
}

#[tokio::test]
async fn test_install_activate_and_serve_from_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<a>"))
        .expect(1)
        .mount(&server)
        .await;
    serve(&server, "/b.css", "b{}").await;

    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    storage
        .put("rregullo-tiranen-old", &CacheKey::get(&url(&server, "/old.html")), &Response::ok("old"))
        .unwrap();

    let v1 = Arc::new(worker(&server, &["/a.html", "/b.css"], storage.clone()));
    let mut registration = Registration::new();
    match registration.register(v1.clone()).await.unwrap() {
        RegisterOutcome::Activated { install, activate } => {
            assert_eq!(install.cached, 2);
            assert_eq!(activate.deleted, vec!["rregullo-tiranen-old".to_string()]);
        }
        other => panic!("expected activation, got {:?}", other),
    }
    assert_eq!(storage.bucket_names().unwrap(), vec![v1.bucket().to_string()]);

    // Served from the bucket; the mock expects a single network hit
    for _ in 0..2 {
        let outcome = registration.handle_fetch(&Request::get(url(&server, "/a.html"))).await;
        let response = outcome.response().unwrap();
        assert_eq!(response.body, b"<a>");
        assert_eq!(response.source, ResponseSource::Cache);
    }

    // A restarted host resumes the same bucket from disk
    let reopened = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let resumed = worker(&server, &[], reopened)
        .with_bucket(v1.bucket())
        .resume(WorkerState::Activated);
    let outcome = resumed.handle_fetch(&Request::get(url(&server, "/b.css"))).await;
    assert_eq!(outcome.response().unwrap().body, b"b{}");
}

#[tokio::test]
async fn test_concurrent_misses_share_one_disk_entry() {
    let server = MockServer::start().await;
    serve(&server, "/a.html", "<a>").await;
    serve(&server, "/img/map.png", "png").await;

    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let v1 = worker(&server, &["/a.html"], storage.clone());
    v1.install().await.unwrap();
    v1.activate().await.unwrap();

    let requests: Vec<Request> = (0..8).map(|_| Request::get(url(&server, "/img/map.png"))).collect();
    let outcomes = futures::future::join_all(requests.iter().map(|r| v1.handle_fetch(r))).await;
    assert!(outcomes
        .iter()
        .all(|o| o.response().map(|r| r.body == b"png").unwrap_or(false)));

    // Racing writers leave one complete entry per key
    let entries = storage.entries(v1.bucket()).unwrap();
    assert_eq!(entries.len(), 2);
    let key = CacheKey::get(&url(&server, "/img/map.png"));
    assert_eq!(storage.get(v1.bucket(), &key).unwrap().unwrap().response.body, b"png");

    let served = v1.handle_fetch(&Request::get(url(&server, "/img/map.png"))).await;
    assert_eq!(served.response().unwrap().source, ResponseSource::Cache);
}

#[tokio::test]
async fn test_api_responses_always_go_to_network() {
    let server = MockServer::start().await;
    serve(&server, "/a.html", "<a>").await;
    Mock::given(method("GET"))
        .and(path("/api/reports"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let worker = worker(&server, &["/a.html"], storage.clone());
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    for _ in 0..2 {
        let outcome = worker.handle_fetch(&Request::get(url(&server, "/api/reports"))).await;
        assert_eq!(outcome.response().unwrap().source, ResponseSource::Network);
    }
    assert_eq!(storage.entries(worker.bucket()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_network_failures_fall_back() {
    let server = MockServer::start().await;
    serve(&server, "/index.html", "<index>").await;
    serve(&server, "/offline.html", "<offline>").await;
    hang(&server, "/reports/42").await;
    hang(&server, "/js/late.js").await;

    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let worker = worker(&server, &["/index.html", "/offline.html"], storage);
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let navigation = worker.handle_fetch(&Request::navigate(url(&server, "/reports/42"))).await;
    let page = navigation.response().unwrap();
    assert_eq!(page.body, b"<offline>");
    assert_eq!(page.source, ResponseSource::OfflineFallback);

    let script = worker.handle_fetch(&Request::get(url(&server, "/js/late.js"))).await;
    let response = script.response().unwrap();
    assert_eq!(response.status, TIMEOUT_STATUS);
    assert!(response.body.is_empty());

    let tracker = Request::get(Url::parse("https://tracker.example/pixel.gif").unwrap());
    assert_eq!(worker.handle_fetch(&tracker).await, FetchOutcome::Passthrough);
}

#[tokio::test]
async fn test_failed_install_leaves_nothing_behind() {
    let server = MockServer::start().await;
    serve(&server, "/a.html", "<a>").await;
    Mock::given(method("GET"))
        .and(path("/b.css"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let worker = worker(&server, &["/a.html", "/b.css"], storage.clone());
    assert!(worker.install().await.is_err());
    assert_eq!(worker.state(), WorkerState::Redundant);
    assert!(storage.bucket_names().unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_delivers_queued_reports() {
    let server = MockServer::start().await;
    serve(&server, "/a.html", "<a>").await;
    Mock::given(method("POST"))
        .and(path("/api/reports"))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":"r-1"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DiskCacheStorage::new(dir.path().to_path_buf()).unwrap());
    let settings = WorkerSettings::for_origin(&server.uri()).unwrap();

    let submitter = HttpReportSubmitter::new(reqwest::Client::new(), settings.report_endpoint.clone());
    let queue = ReportQueue::open(dir.path().to_path_buf()).unwrap();
    let sync = Arc::new(ReportSync::new(queue, Arc::new(submitter), settings.max_sync_attempts));
    sync.enqueue(PendingReport::new("Ndriçim i prishur", "Drita nuk punon", "lighting"))
        .await
        .unwrap();

    let worker = worker(&server, &["/a.html"], storage).with_report_sync(sync.clone());
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let outcome = worker.handle_sync(SYNC_REPORTS_TAG).await.unwrap();
    assert_eq!(outcome.summary().map(|s| s.delivered), Some(1));
    assert!(ReportQueue::open(dir.path().to_path_buf()).unwrap().is_empty());
}
