//! Integration tests for the GCP client and adapters using wiremock
//!
//! These tests run real adapters against mocked GCP endpoints, covering
//! error classification, pagination, per-item gets, enrichment and caching.

use blastscan::discovery::adapter::{Adapter, AdapterCore, IdentifierFormat};
use blastscan::discovery::cache::MemoryCache;
use blastscan::discovery::error::{ErrorType, ProviderError};
use blastscan::discovery::item::{BlastPropagation, Health};
use blastscan::discovery::registry::AdapterMetadata;
use blastscan::discovery::strategy::{AlwaysGetAdapter, DescribeOnlyAdapter, EnrichedAdapter, GetListAdapter};
use blastscan::discovery::stream::CollectingSink;
use blastscan::gcp::auth::GcpCredentials;
use blastscan::gcp::client::{Endpoints, GcpClient};
use blastscan::resource::{compute_disk, compute_instance, compute_network, storage_bucket, PARTITION};
use serde_json::json;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT: &str = "test-project";
const ZONE: &str = "us-central1-a";
const ZONAL_SCOPE: &str = "test-project.us-central1-a";

fn client(server: &MockServer) -> GcpClient {
    GcpClient::with_credentials(
        GcpCredentials::from_static_token("test-token"),
        Endpoints::with_base(&server.uri()),
    )
    .expect("client should build")
}

fn core(metadata: AdapterMetadata, zone: &str, format: IdentifierFormat) -> AdapterCore {
    AdapterCore::new(metadata, PROJECT, zone, Arc::new(MemoryCache::new())).with_identifier_format(format)
}

fn names(items: &[blastscan::discovery::item::Item]) -> Vec<String> {
    items.iter().filter_map(|i| i.unique_attribute_value()).collect()
}

/// Test module for the HTTP client
mod http_client_tests {
    use super::*;

    /// Successful GET returns parsed JSON and sends the bearer token
    #[tokio::test]
    async fn test_get_success_returns_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/global/networks"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"name": "default"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let response = client
            .get(&client.compute_global_url(PROJECT, "networks"))
            .await
            .expect("request should succeed");

        assert_eq!(response["items"][0]["name"], "default");
    }

    /// 404 is classified as not found
    #[tokio::test]
    async fn test_404_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/global/networks/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "The resource was not found"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .get(&client.compute_global_url(PROJECT, "networks/missing"))
            .await
            .expect_err("404 should fail");

        assert!(matches!(ProviderError::from(err), ProviderError::NotFound(_)));
    }

    /// Other failures are API errors carrying the provider message
    #[tokio::test]
    async fn test_403_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/restricted/global/networks"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "Permission denied"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .get(&client.compute_global_url("restricted", "networks"))
            .await
            .expect_err("403 should fail");

        match ProviderError::from(err) {
            ProviderError::Api(msg) => assert!(msg.contains("Permission denied"), "{}", msg),
            other => panic!("expected an API error, got {:?}", other),
        }
    }
}

/// Describe-only instances
mod instance_tests {
    use super::*;

    fn adapter(server: &MockServer) -> DescribeOnlyAdapter<compute_instance::ComputeInstanceApi> {
        DescribeOnlyAdapter::new(
            core(
                compute_instance::metadata(),
                ZONE,
                IdentifierFormat::new(PARTITION, "compute", "instance"),
            ),
            compute_instance::ComputeInstanceApi,
            client(server),
        )
    }

    #[tokio::test]
    async fn test_get_uses_name_filter_and_caches() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances"))
            .and(query_param("filter", "name = \"vm-1\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "kind": "compute#instance",
                    "name": "vm-1",
                    "status": "RUNNING",
                    "disks": [{
                        "source": "https://www.googleapis.com/compute/v1/projects/test-project/zones/us-central1-a/disks/vm-1-boot"
                    }]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        let cancel = CancellationToken::new();

        let item = assert_ok!(adapter.get(&cancel, ZONAL_SCOPE, "vm-1", false).await);
        assert_eq!(item.health, Some(Health::Ok));
        assert!(item.attributes.get("kind").is_none());
        assert_eq!(item.linked_item_queries.len(), 1);
        assert_eq!(item.linked_item_queries[0].query.query, "vm-1-boot");
        assert_eq!(item.linked_item_queries[0].blast_propagation, BlastPropagation::both());

        // Served from cache, the mock only allows one call
        let cached = adapter.get(&cancel, ZONAL_SCOPE, "vm-1", false).await.unwrap();
        assert_eq!(cached, item);
    }

    #[tokio::test]
    async fn test_get_without_match_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = assert_err!(
            adapter(&server)
                .get(&CancellationToken::new(), ZONAL_SCOPE, "vm-9", false)
                .await
        );
        assert_eq!(err.error_type, ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_search_by_identifier_and_label() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances"))
            .and(query_param("filter", "name = \"vm-1\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"name": "vm-1"}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances"))
            .and(query_param("filter", "labels.env = \"prod\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "web-1"}, {"name": "web-2"}]
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        let cancel = CancellationToken::new();

        let sink = CollectingSink::new();
        adapter
            .search(&cancel, ZONAL_SCOPE, "arn:gcp:compute:us-central1-a:test-project:instance/vm-1", false, &sink)
            .await;
        assert!(sink.errors().is_empty(), "{:?}", sink.errors());
        assert_eq!(names(&sink.items()), vec!["vm-1"]);

        let sink = CollectingSink::new();
        adapter.search(&cancel, ZONAL_SCOPE, "env=prod", false, &sink).await;
        assert_eq!(names(&sink.items()), vec!["web-1", "web-2"]);
    }
}

/// Always-get disks
mod disk_tests {
    use super::*;

    fn disk(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "status": "READY",
            "users": ["https://www.googleapis.com/compute/v1/projects/test-project/zones/us-central1-a/instances/vm-1"]
        })
    }

    #[tokio::test]
    async fn test_list_fetches_each_disk_in_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/disks"))
            .and(query_param("fields", "items(name),nextPageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "d1"}, {"name": "d2"}, {"name": "d3"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        for name in ["d1", "d3"] {
            Mock::given(method("GET"))
                .and(path(format!("/compute/v1/projects/test-project/zones/us-central1-a/disks/{}", name)))
                .respond_with(ResponseTemplate::new(200).set_body_json(disk(name)))
                .mount(&server)
                .await;
        }
        // Deleted between the list and the get
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/disks/d2"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "not found"}
            })))
            .mount(&server)
            .await;

        let adapter = AlwaysGetAdapter::new(
            core(compute_disk::metadata(), ZONE, IdentifierFormat::new(PARTITION, "compute", "disk")),
            compute_disk::ComputeDiskApi,
            client(&server),
        );
        let sink = CollectingSink::new();
        adapter.list(&CancellationToken::new(), ZONAL_SCOPE, false, &sink).await;

        assert!(sink.errors().is_empty(), "{:?}", sink.errors());
        let items = sink.items();
        assert_eq!(names(&items), vec!["d1", "d3"]);
        assert_eq!(items[0].health, Some(Health::Ok));
        assert_eq!(items[0].linked_item_queries[0].query.item_type, "compute-instance");
        assert_eq!(items[0].linked_item_queries[0].blast_propagation, BlastPropagation::outbound());
    }

    #[tokio::test]
    async fn test_failed_get_is_streamed_as_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/disks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "d1"}, {"name": "d2"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/disks/d1"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"code": 500, "message": "backend error"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/disks/d2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(disk("d2")))
            .mount(&server)
            .await;

        let adapter = AlwaysGetAdapter::new(
            core(compute_disk::metadata(), ZONE, IdentifierFormat::new(PARTITION, "compute", "disk")),
            compute_disk::ComputeDiskApi,
            client(&server),
        );
        let sink = CollectingSink::new();
        adapter.list(&CancellationToken::new(), ZONAL_SCOPE, false, &sink).await;

        assert_eq!(names(&sink.items()), vec!["d2"]);
        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ErrorType::Other);
        assert!(errors[0].error_string.contains("backend error"), "{}", errors[0].error_string);
    }
}

/// Get/list networks
mod network_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/global/networks"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "net-c"}]
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/global/networks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"name": "net-a", "peerings": [{"network": "https://www.googleapis.com/compute/v1/projects/other/global/networks/net-x"}]},
                    {"name": "net-b"}
                ],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = GetListAdapter::new(
            core(
                compute_network::metadata(),
                "",
                IdentifierFormat::new(PARTITION, "compute", "network").global(),
            ),
            compute_network::ComputeNetworkApi,
            client(&server),
        );
        let cancel = CancellationToken::new();
        let sink = CollectingSink::new();
        adapter.list(&cancel, PROJECT, false, &sink).await;

        assert!(sink.errors().is_empty(), "{:?}", sink.errors());
        let items = sink.items();
        assert_eq!(names(&items), vec!["net-a", "net-b", "net-c"]);
        assert_eq!(items[0].linked_item_queries[0].query.scope, "other");

        // The list seeded the get cache, so no further calls are made
        let item = adapter.get(&cancel, PROJECT, "net-b", false).await.unwrap();
        assert_eq!(item.unique_attribute_value().as_deref(), Some("net-b"));
    }

    #[tokio::test]
    async fn test_invalid_name_is_not_found_without_a_call() {
        let server = MockServer::start().await;

        let adapter = GetListAdapter::new(
            core(
                compute_network::metadata(),
                "",
                IdentifierFormat::new(PARTITION, "compute", "network").global(),
            ),
            compute_network::ComputeNetworkApi,
            client(&server),
        );
        let err = adapter
            .get(&CancellationToken::new(), PROJECT, "Not_A_Name", false)
            .await
            .unwrap_err();

        assert_eq!(err.error_type, ErrorType::NotFound);
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}

/// Enriched buckets
mod bucket_tests {
    use super::*;

    fn adapter(server: &MockServer) -> EnrichedAdapter<storage_bucket::StorageBucketApi> {
        EnrichedAdapter::new(
            core(
                storage_bucket::metadata(),
                "",
                IdentifierFormat::new(PARTITION, "storage", "bucket").global(),
            ),
            storage_bucket::StorageBucketApi,
            client(server),
        )
    }

    async fn mount_bucket(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/assets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "storage#bucket",
                "name": "assets",
                "labels": {"team": "web"}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/assets/iam"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bindings": [{
                    "role": "roles/storage.objectViewer",
                    "members": ["serviceAccount:reader@other-proj.iam.gserviceaccount.com"]
                }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_adds_policy_and_tags() {
        let server = MockServer::start().await;
        mount_bucket(&server).await;
        Mock::given(method("GET"))
            .and(path("/v3/effectiveTags"))
            .and(query_param("parent", "//storage.googleapis.com/projects/_/buckets/assets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "effectiveTags": [{
                    "namespacedTagKey": "test-project/env",
                    "namespacedTagValue": "test-project/env/prod"
                }]
            })))
            .mount(&server)
            .await;

        let item = adapter(&server)
            .get(&CancellationToken::new(), PROJECT, "assets", false)
            .await
            .unwrap();

        assert_eq!(item.tags["team"], "web");
        assert_eq!(item.tags["test-project/env"], "prod");
        let policy = item.attributes.get(storage_bucket::IAM_POLICY).expect("policy attribute");
        assert_eq!(policy["bindings"][0]["role"], "roles/storage.objectViewer");

        let link = &item.linked_item_queries[0];
        assert_eq!(link.query.item_type, "iam-service-account");
        assert_eq!(link.query.query, "reader@other-proj.iam.gserviceaccount.com");
        assert_eq!(link.query.scope, "other-proj");
    }

    #[tokio::test]
    async fn test_tag_failure_keeps_item() {
        let server = MockServer::start().await;
        mount_bucket(&server).await;
        Mock::given(method("GET"))
            .and(path("/v3/effectiveTags"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "Permission denied"}
            })))
            .mount(&server)
            .await;

        let item = adapter(&server)
            .get(&CancellationToken::new(), PROJECT, "assets", false)
            .await
            .unwrap();

        assert_eq!(item.tags.len(), 1);
        assert_eq!(item.tags["team"], "web");
        assert!(item.attributes.get(storage_bucket::IAM_POLICY).is_some());
    }

    #[tokio::test]
    async fn test_policy_failure_sets_error_marker() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/storage/v1/b/assets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "assets"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/assets/iam"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"code": 500, "message": "backend error"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/effectiveTags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let item = adapter(&server)
            .get(&CancellationToken::new(), PROJECT, "assets", false)
            .await
            .unwrap();

        let marker = item.attributes.get(storage_bucket::IAM_POLICY).expect("marker");
        assert!(marker["error"].as_str().is_some_and(|e| e.contains("backend error")), "{}", marker);
        assert!(item.linked_item_queries.is_empty());
    }
}
