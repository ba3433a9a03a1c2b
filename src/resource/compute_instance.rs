//! Compute Engine instances
//!
//! Describe-only: `instances.list` with a `name = "..."` filter serves get,
//! the unfiltered call serves list, and `key=value` searches become label
//! filters.

use super::common::{into_page, labels_to_tags, located_scope, parse_self_link, validate_compute_name};
use crate::discovery::attributes::to_attributes;
use crate::discovery::error::{ProviderError, QueryError};
use crate::discovery::item::{BlastPropagation, Health, Item, QueryMethod};
use crate::discovery::pagination::Page;
use crate::discovery::registry::{AdapterCategory, AdapterMetadata};
use crate::discovery::strategy::DescribeApi;
use crate::gcp::client::GcpClient;
use async_trait::async_trait;
use serde_json::Value;

pub const ITEM_TYPE: &str = "compute-instance";

pub fn metadata() -> AdapterMetadata {
    AdapterMetadata::new(ITEM_TYPE, "Compute Engine Instance", AdapterCategory::Compute)
        .get("Get an instance by name")
        .list("List all instances in a zone")
        .search("Search by identifier, or by label with key=value")
        .links(&[
            "compute-disk",
            "compute-network",
            "compute-subnetwork",
            "iam-service-account",
        ])
}

/// One `instances.list` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceListRequest {
    pub project: String,
    pub zone: String,
    pub filter: Option<String>,
}

pub struct ComputeInstanceApi;

impl ComputeInstanceApi {
    fn request(scope: &str, filter: Option<String>) -> Result<InstanceListRequest, QueryError> {
        let (project, zone) = located_scope(scope)?;
        Ok(InstanceListRequest { project, zone, filter })
    }
}

fn health(status: Option<&str>) -> Option<Health> {
    let health = match status? {
        "RUNNING" => Health::Ok,
        "PROVISIONING" | "STAGING" | "STOPPING" | "SUSPENDING" | "REPAIRING" => Health::Pending,
        "TERMINATED" | "SUSPENDED" => Health::Warning,
        _ => Health::Unknown,
    };
    Some(health)
}

/// Map one instance record
pub fn instance_item(scope: &str, record: &Value) -> Result<Item, QueryError> {
    let attrs = to_attributes(record, &["kind", "fingerprint", "labelFingerprint"])?;
    let mut item = Item::new(ITEM_TYPE, scope, "name", attrs);
    item.tags = labels_to_tags(record);
    item.health = health(record.get("status").and_then(Value::as_str));

    for disk in record.get("disks").and_then(Value::as_array).into_iter().flatten() {
        if let Some(link) = disk.get("source").and_then(Value::as_str).and_then(parse_self_link) {
            // Detaching or deleting either side breaks the other
            item.link("compute-disk", QueryMethod::Get, Some(&link.name), &link.scope(), BlastPropagation::both());
        }
    }

    for nic in record
        .get("networkInterfaces")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(link) = nic.get("network").and_then(Value::as_str).and_then(parse_self_link) {
            item.link("compute-network", QueryMethod::Get, Some(&link.name), &link.scope(), BlastPropagation::inbound());
        }
        if let Some(link) = nic.get("subnetwork").and_then(Value::as_str).and_then(parse_self_link) {
            item.link(
                "compute-subnetwork",
                QueryMethod::Get,
                Some(&link.name),
                &link.scope(),
                BlastPropagation::inbound(),
            );
        }
    }

    let project = located_scope(scope).map(|(project, _)| project)?;
    for account in record
        .get("serviceAccounts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        item.link(
            "iam-service-account",
            QueryMethod::Get,
            account.get("email").and_then(Value::as_str),
            &project,
            BlastPropagation::inbound(),
        );
    }

    Ok(item)
}

/// `key=value` label search as an `instances.list` filter
fn label_filter(query: &str) -> Option<String> {
    let (key, value) = query.split_once('=')?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || key.contains(['"', ' ']) || value.contains('"') {
        return None;
    }
    Some(format!("labels.{} = \"{}\"", key, value))
}

#[async_trait]
impl DescribeApi for ComputeInstanceApi {
    type Client = GcpClient;
    type Input = InstanceListRequest;
    type Output = Value;

    fn input_mapper_get(&self, scope: &str, query: &str) -> Result<InstanceListRequest, QueryError> {
        validate_compute_name(query, scope)?;
        Self::request(scope, Some(format!("name = \"{}\"", query)))
    }

    fn input_mapper_list(&self, scope: &str) -> Result<InstanceListRequest, QueryError> {
        Self::request(scope, None)
    }

    async fn input_mapper_search(
        &self,
        _client: &GcpClient,
        scope: &str,
        query: &str,
    ) -> Option<Result<InstanceListRequest, QueryError>> {
        if query.starts_with("arn:") {
            return None;
        }
        let result = match label_filter(query) {
            Some(filter) => Self::request(scope, Some(filter)),
            None => Err(QueryError::not_found(
                format!("instance search expects key=value or an identifier, got {:?}", query),
                scope,
            )),
        };
        Some(result)
    }

    async fn describe(
        &self,
        client: &GcpClient,
        input: &InstanceListRequest,
        page_token: Option<String>,
    ) -> Result<Page<Value>, ProviderError> {
        let url = client.compute_zonal_url(&input.project, &input.zone, "instances");
        let mut query = Vec::new();
        if let Some(filter) = &input.filter {
            query.push(("filter", filter.as_str()));
        }
        if let Some(token) = &page_token {
            query.push(("pageToken", token.as_str()));
        }

        let response = client.get_with_query(&url, &query).await?;
        let next_token = response
            .get("nextPageToken")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        Ok(Page::new(response, next_token))
    }

    async fn output_mapper(
        &self,
        _client: &GcpClient,
        scope: &str,
        _input: &InstanceListRequest,
        output: Value,
    ) -> Result<Vec<Item>, QueryError> {
        into_page(output, "items")
            .output
            .iter()
            .map(|record| instance_item(scope, record))
            .collect()
    }
}
