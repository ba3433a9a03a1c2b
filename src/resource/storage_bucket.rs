//! Cloud Storage buckets
//!
//! Get/list with enrichment: every bucket is decorated with its IAM policy
//! and its Resource Manager tags. Neither lookup fails the bucket.

use super::common::{into_page, labels_to_tags, project_scope};
use crate::discovery::attributes::to_attributes;
use crate::discovery::error::{ProviderError, QueryError};
use crate::discovery::item::{BlastPropagation, Item, QueryMethod};
use crate::discovery::pagination::Page;
use crate::discovery::registry::{AdapterCategory, AdapterMetadata};
use crate::discovery::strategy::EnrichedApi;
use crate::gcp::client::GcpClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const ITEM_TYPE: &str = "storage-bucket";

/// Attribute holding the bucket IAM policy
pub const IAM_POLICY: &str = "iamPolicy";

pub fn metadata() -> AdapterMetadata {
    AdapterMetadata::new(ITEM_TYPE, "Cloud Storage Bucket", AdapterCategory::Storage)
        .get("Get a bucket by name")
        .list("List all buckets in a project")
        .search("Search buckets by identifier")
        .links(&["storage-bucket", "cloud-kms-crypto-key", "iam-service-account"])
}

#[derive(Debug, Deserialize)]
struct Policy {
    #[serde(default)]
    bindings: Vec<Binding>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    #[serde(default)]
    members: Vec<String>,
}

pub struct StorageBucketApi;

/// Bucket names are 3-222 characters of lowercase letters, digits, `-`, `_`
/// and `.`
fn valid_bucket_name(name: &str) -> bool {
    (3..=222).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

pub fn bucket_item(scope: &str, record: &Value) -> Result<Item, QueryError> {
    let attrs = to_attributes(record, &["kind", "etag"])?;
    let mut item = Item::new(ITEM_TYPE, scope, "name", attrs);
    item.tags = labels_to_tags(record);

    if let Some(key) = record.pointer("/encryption/defaultKmsKeyName").and_then(Value::as_str) {
        // Key paths are projects/P/locations/L/keyRings/R/cryptoKeys/K
        let project = key.split('/').nth(1).unwrap_or_default();
        let scope = if project.is_empty() { scope.to_string() } else { project.to_string() };
        item.link(
            "cloud-kms-crypto-key",
            QueryMethod::Get,
            Some(key),
            &scope,
            BlastPropagation::inbound(),
        );
    }

    // Access logs are written into the log bucket
    item.link(
        ITEM_TYPE,
        QueryMethod::Get,
        record.pointer("/logging/logBucket").and_then(Value::as_str),
        scope,
        BlastPropagation::outbound(),
    );

    Ok(item)
}

/// Project a service account belongs to, from its email domain
fn service_account_project(email: &str) -> Option<&str> {
    let (_, domain) = email.split_once('@')?;
    domain.strip_suffix(".iam.gserviceaccount.com")
}

/// Link the service accounts granted access by `policy`
fn link_policy_members(scope: &str, policy: &Value, item: &mut Item) {
    let policy: Policy = match serde_json::from_value(policy.clone()) {
        Ok(policy) => policy,
        Err(err) => {
            tracing::debug!("Unparseable IAM policy on {}: {}", item.global_unique_attribute(), err);
            return;
        },
    };

    for member in policy.bindings.iter().flat_map(|b| b.members.iter()) {
        let Some(email) = member.strip_prefix("serviceAccount:") else {
            continue;
        };
        let project = service_account_project(email).unwrap_or(scope);
        item.link(
            "iam-service-account",
            QueryMethod::Get,
            Some(email),
            project,
            BlastPropagation::outbound(),
        );
    }
}

#[async_trait]
impl EnrichedApi for StorageBucketApi {
    type Client = GcpClient;
    type Output = Value;

    async fn get(&self, client: &GcpClient, _scope: &str, query: &str) -> Result<Value, ProviderError> {
        if !valid_bucket_name(query) {
            return Err(ProviderError::NotFound(format!("{:?} is not a valid bucket name", query)));
        }
        Ok(client.get(&client.storage_bucket_url(query)).await?)
    }

    async fn list(&self, client: &GcpClient, scope: &str, page_token: Option<String>) -> Result<Page<Vec<Value>>, ProviderError> {
        let project = project_scope(scope).map_err(|e| ProviderError::Api(e.error_string))?;
        let mut query = vec![("project", project.as_str())];
        if let Some(token) = &page_token {
            query.push(("pageToken", token.as_str()));
        }
        let response = client.get_with_query(&client.storage_url("b"), &query).await?;
        Ok(into_page(response, "items"))
    }

    fn item_mapper(&self, scope: &str, output: &Value) -> Result<Item, QueryError> {
        bucket_item(scope, output)
    }

    async fn list_tags(&self, client: &GcpClient, item: &Item) -> Option<Result<BTreeMap<String, String>, ProviderError>> {
        let name = item.unique_attribute_value()?;
        let parent = format!("//storage.googleapis.com/projects/_/buckets/{}", name);
        let url = client.resourcemanager_url("effectiveTags");

        let response = match client.get_with_query(&url, &[("parent", parent.as_str())]).await {
            Ok(response) => response,
            Err(err) => return Some(Err(err.into())),
        };

        let tags = response
            .get("effectiveTags")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|tag| {
                let key = tag.get("namespacedTagKey")?.as_str()?;
                let value = tag.get("namespacedTagValue")?.as_str()?;
                Some((key.to_string(), value.rsplit('/').next().unwrap_or(value).to_string()))
            })
            .collect();
        Some(Ok(tags))
    }

    fn enrichments(&self) -> &'static [&'static str] {
        &[IAM_POLICY]
    }

    async fn enrich(&self, client: &GcpClient, _scope: &str, name: &str, output: &Value) -> Result<Value, ProviderError> {
        let bucket = output
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Api("bucket record has no name".to_string()))?;
        match name {
            IAM_POLICY => Ok(client.get(&format!("{}/iam", client.storage_bucket_url(bucket))).await?),
            other => Err(ProviderError::Api(format!("no enrichment named {}", other))),
        }
    }

    fn link_enrichment(&self, scope: &str, name: &str, value: &Value, item: &mut Item) {
        if name == IAM_POLICY {
            link_policy_members(scope, value, item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bucket_links() {
        let record = json!({
            "kind": "storage#bucket",
            "name": "assets",
            "labels": {"team": "web"},
            "encryption": {"defaultKmsKeyName": "projects/kms-proj/locations/eu/keyRings/r/cryptoKeys/k"},
            "logging": {"logBucket": "audit-logs"}
        });

        let item = bucket_item("p1", &record).unwrap();
        assert_eq!(item.tags["team"], "web");
        assert_eq!(item.linked_item_queries.len(), 2);
        assert_eq!(item.linked_item_queries[0].query.scope, "kms-proj");
        assert_eq!(item.linked_item_queries[1].query.query, "audit-logs");
        assert_eq!(item.linked_item_queries[1].blast_propagation, BlastPropagation::outbound());
    }

    #[test]
    fn test_policy_members_become_links() {
        let mut item = bucket_item("p1", &json!({"name": "assets"})).unwrap();
        let policy = json!({
            "bindings": [
                {"role": "roles/storage.objectViewer", "members": [
                    "serviceAccount:reader@other-proj.iam.gserviceaccount.com",
                    "user:someone@example.com",
                    "serviceAccount:12345-compute@developer.gserviceaccount.com"
                ]}
            ]
        });

        link_policy_members("p1", &policy, &mut item);
        let links: Vec<(&str, &str)> = item
            .linked_item_queries
            .iter()
            .map(|l| (l.query.query.as_str(), l.query.scope.as_str()))
            .collect();
        assert_eq!(
            links,
            vec![
                ("reader@other-proj.iam.gserviceaccount.com", "other-proj"),
                ("12345-compute@developer.gserviceaccount.com", "p1"),
            ]
        );
    }

    #[test]
    fn test_member_without_project_is_not_linked() {
        let mut item = bucket_item("p1", &json!({"name": "assets"})).unwrap();
        let policy = json!({
            "bindings": [{"members": [
                "serviceAccount:broken@.iam.gserviceaccount.com",
                "serviceAccount:ok@p2.iam.gserviceaccount.com"
            ]}]
        });

        link_policy_members("p1", &policy, &mut item);
        assert_eq!(item.linked_item_queries.len(), 1);
        assert_eq!(item.linked_item_queries[0].query.scope, "p2");
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_unparseable_policy_adds_no_links() {
        let mut item = bucket_item("p1", &json!({"name": "assets"})).unwrap();
        link_policy_members("p1", &json!({"bindings": "not-a-list"}), &mut item);
        assert!(item.linked_item_queries.is_empty());
    }

    #[test]
    fn test_valid_bucket_name() {
        assert!(valid_bucket_name("my.bucket_1"));
        assert!(!valid_bucket_name("ab"));
        assert!(!valid_bucket_name("Upper"));
    }
}
