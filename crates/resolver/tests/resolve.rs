//! Integration tests for FlagResolver.
//!
//! Uses wiremock for both Commons stages. Tests cover the hit path, the
//! miss path end to end, expiry, stage isolation, the error taxonomy, and
//! the per-key single-flight guard.

use std::time::Duration;

use flagfinder_resolver::{ClientConfig, CommonsClient, FlagResolver, ResolveError};
use flagfinder_store::{FlagStore, StoreConfig};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nnot a real flag";

fn store_at(dir: &TempDir) -> FlagStore {
    FlagStore::new(StoreConfig::new(dir.path()))
}

fn resolver_for(server: &MockServer, store: FlagStore) -> FlagResolver {
    let client = CommonsClient::new(
        ClientConfig::default()
            .with_api_url(format!("{}/w/api.php", server.uri()))
            .with_timeout(Duration::from_millis(250)),
    );
    FlagResolver::new(store, client)
}

fn metadata_body(server: &MockServer, country: &str) -> serde_json::Value {
    let filename = flagfinder_resolver::commons_filename(country);
    json!({
        "batchcomplete": "",
        "query": {
            "pages": {
                "1234": {
                    "pageid": 1234,
                    "ns": 6,
                    "title": format!("File:Flag of {country}.svg"),
                    "thumbnail": {
                        "source": format!("{}/thumb/{filename}.png", server.uri()),
                        "width": 700,
                        "height": 467
                    },
                    "pageimage": filename
                }
            }
        }
    })
}

async fn mount_metadata(server: &MockServer, country: &str, hits: u64) {
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("titles", format!("File:Flag of {country}.svg")))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(server, country)))
        .expect(hits)
        .mount(server)
        .await;
}

async fn mount_image(server: &MockServer, country: &str, body: &[u8], hits: u64) {
    let filename = flagfinder_resolver::commons_filename(country);
    Mock::given(method("GET"))
        .and(path(format!("/thumb/{filename}.png")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn resolves_uncached_country_end_to_end() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_metadata(&server, "France", 1).await;
    mount_image(&server, "France", PNG, 1).await;

    let resolver = resolver_for(&server, store_at(&dir));
    let flag = resolver.resolve("France").await.unwrap();

    assert_eq!(flag.image, PNG);
    assert_eq!(flag.attribution, "Flag_of_France.svg");

    // The fetch populated the cache with the same bytes, still fresh.
    let (cached, _) = store_at(&dir).get("France").await.unwrap();
    assert_eq!(cached, PNG);
}

#[tokio::test]
async fn cache_hit_makes_no_network_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = store_at(&dir);
    store.put("Japan", PNG).await.unwrap();

    // Any request at all fails the mock expectations.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = resolver_for(&server, store);
    let first = resolver.resolve("Japan").await.unwrap();
    let second = resolver.resolve("Japan").await.unwrap();

    assert_eq!(first.image, PNG);
    assert_eq!(first.attribution, "Flag_of_Japan.svg");
    assert_eq!(first, second);
}

#[tokio::test]
async fn expired_entry_triggers_a_full_refetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let store = FlagStore::new(StoreConfig::new(dir.path()).with_ttl(Duration::ZERO));
    store.put("Japan", b"stale bytes").await.unwrap();
    // Ages are whole seconds, so anything a second old is past a zero TTL.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    mount_metadata(&server, "Japan", 1).await;
    mount_image(&server, "Japan", PNG, 1).await;

    let resolver = resolver_for(&server, store);
    let flag = resolver.resolve("Japan").await.unwrap();
    assert_eq!(flag.image, PNG);
}

#[tokio::test]
async fn metadata_timeout_is_reported_and_nothing_is_cached() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(metadata_body(&server, "France"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let resolver = resolver_for(&server, store_at(&dir));
    let err = resolver.resolve("France").await.unwrap_err();
    assert!(matches!(err, ResolveError::MetadataTimeout));

    assert!(!dir.path().join("France.png").exists());
    assert!(!dir.path().join("update.json").exists());
    assert!(!dir.path().join("update.json.sha256").exists());
}

#[tokio::test]
async fn metadata_http_error_skips_the_image_stage() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/thumb/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = resolver_for(&server, store_at(&dir));
    match resolver.resolve("France").await {
        Err(ResolveError::MetadataHttp { status, reason }) => {
            assert_eq!(status, 503);
            assert_eq!(reason, "Service Unavailable");
        }
        other => panic!("expected MetadataHttp, got {other:?}"),
    }
    assert!(!dir.path().join("update.json").exists());
}

#[tokio::test]
async fn unknown_title_reports_malformed_metadata() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // What the API returns for a title it does not know.
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": {
                "pages": {
                    "-1": { "ns": 6, "title": "File:Flag of Atlantis.svg", "missing": "" }
                }
            }
        })))
        .mount(&server)
        .await;

    let resolver = resolver_for(&server, store_at(&dir));
    match resolver.resolve("Atlantis").await {
        Err(ResolveError::MetadataMalformed { country }) => assert_eq!(country, "Atlantis"),
        other => panic!("expected MetadataMalformed, got {other:?}"),
    }
}

#[tokio::test]
async fn image_failure_leaves_the_stale_entry_untouched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let store = FlagStore::new(StoreConfig::new(dir.path()).with_ttl(Duration::ZERO));
    store.put("Japan", b"stale bytes").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    mount_metadata(&server, "Japan", 1).await;
    Mock::given(method("GET"))
        .and(path("/thumb/Flag_of_Japan.svg.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver_for(&server, store);
    match resolver.resolve("Japan").await {
        Err(ResolveError::ImageHttp { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected ImageHttp, got {other:?}"),
    }

    // The expired entry is still on disk and intact under a longer TTL.
    let (bytes, _) = store_at(&dir).get("Japan").await.unwrap();
    assert_eq!(bytes, b"stale bytes");
}

#[tokio::test]
async fn storage_failure_still_returns_the_fetched_flag() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_metadata(&server, "France", 1).await;
    mount_image(&server, "France", PNG, 1).await;

    // A file where the cache directory should be makes every put fail.
    let blocker = dir.path().join("flags");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let resolver = resolver_for(&server, FlagStore::new(StoreConfig::new(&blocker)));
    match resolver.resolve("France").await {
        Err(ResolveError::StorageFailure { flag, .. }) => {
            assert_eq!(flag.image, PNG);
            assert_eq!(flag.attribution, "Flag_of_France.svg");
        }
        other => panic!("expected StorageFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_resolves_for_one_country_share_a_single_fetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_metadata(&server, "France", 1).await;
    mount_image(&server, "France", PNG, 1).await;

    let resolver = resolver_for(&server, store_at(&dir));
    let (a, b) = tokio::join!(resolver.resolve("France"), resolver.resolve("France"));

    // expect(1) on both mocks verifies the second call was served from cache.
    assert_eq!(a.unwrap().image, PNG);
    assert_eq!(b.unwrap().image, PNG);
}

#[tokio::test]
async fn identifies_itself_to_the_api() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(header("user-agent", flagfinder_resolver::USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(&server, "France")))
        .expect(1)
        .mount(&server)
        .await;
    mount_image(&server, "France", PNG, 1).await;

    let resolver = resolver_for(&server, store_at(&dir));
    resolver.resolve("France").await.unwrap();
}

#[tokio::test]
async fn different_countries_fetch_independently() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_metadata(&server, "France", 1).await;
    mount_image(&server, "France", PNG, 1).await;
    mount_metadata(&server, "Japan", 1).await;
    mount_image(&server, "Japan", b"other bytes", 1).await;

    let resolver = resolver_for(&server, store_at(&dir));
    let (a, b) = tokio::join!(resolver.resolve("France"), resolver.resolve("Japan"));

    assert_eq!(a.unwrap().attribution, "Flag_of_France.svg");
    assert_eq!(b.unwrap().attribution, "Flag_of_Japan.svg");
}
