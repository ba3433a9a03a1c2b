//! Compute Engine persistent disks
//!
//! The list call only asks for disk names (`fields=items(name)`), so every
//! listed disk is fetched in full with `disks.get`. This keeps list pages
//! small for projects with thousands of disks.

use super::common::{labels_to_tags, located_scope, parse_self_link, string_array, validate_compute_name};
use crate::discovery::attributes::to_attributes;
use crate::discovery::error::{ProviderError, QueryError};
use crate::discovery::item::{BlastPropagation, Health, Item, QueryMethod};
use crate::discovery::pagination::Page;
use crate::discovery::registry::{AdapterCategory, AdapterMetadata};
use crate::discovery::strategy::AlwaysGetApi;
use crate::gcp::client::GcpClient;
use async_trait::async_trait;
use serde_json::Value;

pub const ITEM_TYPE: &str = "compute-disk";

const LIST_FIELDS: &str = "items(name),nextPageToken";

pub fn metadata() -> AdapterMetadata {
    AdapterMetadata::new(ITEM_TYPE, "Persistent Disk", AdapterCategory::Storage)
        .get("Get a disk by name")
        .list("List all disks in a zone")
        .search("Search disks by identifier")
        .links(&["compute-instance", "compute-snapshot", "compute-image"])
}

/// Zone a disk list or get runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskLocation {
    pub project: String,
    pub zone: String,
}

/// One `disks.get` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRequest {
    pub location: DiskLocation,
    pub name: String,
}

pub struct ComputeDiskApi;

fn location(scope: &str) -> Result<DiskLocation, QueryError> {
    let (project, zone) = located_scope(scope)?;
    Ok(DiskLocation { project, zone })
}

fn health(status: Option<&str>) -> Option<Health> {
    let health = match status? {
        "READY" => Health::Ok,
        "CREATING" | "RESTORING" => Health::Pending,
        "DELETING" => Health::Warning,
        "FAILED" => Health::Error,
        _ => Health::Unknown,
    };
    Some(health)
}

pub fn disk_item(scope: &str, record: &Value) -> Result<Item, QueryError> {
    let attrs = to_attributes(record, &["kind", "labelFingerprint"])?;
    let mut item = Item::new(ITEM_TYPE, scope, "name", attrs);
    item.tags = labels_to_tags(record);
    item.health = health(record.get("status").and_then(Value::as_str));

    // Instances using this disk break if it changes
    for user in string_array(record, "users").filter_map(parse_self_link) {
        item.link("compute-instance", QueryMethod::Get, Some(&user.name), &user.scope(), BlastPropagation::outbound());
    }

    for (field, item_type) in [("sourceSnapshot", "compute-snapshot"), ("sourceImage", "compute-image")] {
        let Some(source) = record.get(field).and_then(Value::as_str).and_then(parse_self_link) else {
            continue;
        };
        item.link(item_type, QueryMethod::Get, Some(&source.name), &source.scope(), BlastPropagation::inbound());
    }

    Ok(item)
}

#[async_trait]
impl AlwaysGetApi for ComputeDiskApi {
    type Client = GcpClient;
    type ListInput = DiskLocation;
    type ListOutput = Value;
    type GetInput = DiskRequest;
    type GetOutput = Value;

    fn list_input(&self, scope: &str) -> Result<DiskLocation, QueryError> {
        location(scope)
    }

    async fn list(&self, client: &GcpClient, input: &DiskLocation, page_token: Option<String>) -> Result<Page<Value>, ProviderError> {
        let url = client.compute_zonal_url(&input.project, &input.zone, "disks");
        let mut query = vec![("fields", LIST_FIELDS)];
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

    fn list_output_mapper(&self, scope: &str, output: Value) -> Result<Vec<DiskRequest>, QueryError> {
        let location = location(scope)?;
        let requests = output
            .get("items")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|disk| disk.get("name").and_then(Value::as_str))
            .map(|name| DiskRequest {
                location: location.clone(),
                name: name.to_string(),
            })
            .collect();
        Ok(requests)
    }

    fn get_input(&self, scope: &str, query: &str) -> Result<DiskRequest, QueryError> {
        validate_compute_name(query, scope)?;
        Ok(DiskRequest {
            location: location(scope)?,
            name: query.to_string(),
        })
    }

    async fn get(&self, client: &GcpClient, _scope: &str, input: DiskRequest) -> Result<Value, ProviderError> {
        let url = client.compute_zonal_url(
            &input.location.project,
            &input.location.zone,
            &format!("disks/{}", input.name),
        );
        Ok(client.get(&url).await?)
    }

    fn item_mapper(&self, scope: &str, output: Value) -> Result<Item, QueryError> {
        disk_item(scope, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCOPE: &str = "p1.us-central1-a";

    #[test]
    fn test_disk_links_users_and_sources() {
        let record = json!({
            "name": "data-1",
            "status": "READY",
            "users": ["https://www.googleapis.com/compute/v1/projects/p1/zones/us-central1-a/instances/vm-1"],
            "sourceSnapshot": "https://www.googleapis.com/compute/v1/projects/p1/global/snapshots/snap-1"
        });

        let item = disk_item(SCOPE, &record).unwrap();
        assert_eq!(item.health, Some(Health::Ok));
        assert_eq!(item.linked_item_queries.len(), 2);

        let user = &item.linked_item_queries[0];
        assert_eq!(user.query.item_type, "compute-instance");
        assert_eq!(user.query.scope, SCOPE);
        assert_eq!(user.blast_propagation, BlastPropagation::outbound());

        let snapshot = &item.linked_item_queries[1];
        assert_eq!(snapshot.query.query, "snap-1");
        assert_eq!(snapshot.query.scope, "p1");
        assert_eq!(snapshot.blast_propagation, BlastPropagation::inbound());
    }

    #[test]
    fn test_list_output_mapper_keeps_order() {
        let api = ComputeDiskApi;
        let names: Vec<String> = api
            .list_output_mapper(SCOPE, json!({"items": [{"name": "b"}, {"name": "a"}, {}]}))
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_get_input_needs_a_zone() {
        let api = ComputeDiskApi;
        assert!(api.get_input("p1", "data-1").is_err());
        assert!(api.get_input(SCOPE, "Bad_Name").unwrap_err().is_not_found());
    }
}
