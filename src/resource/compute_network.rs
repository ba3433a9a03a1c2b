//! Compute Engine VPC networks
//!
//! Networks are project-global: get by name, paginated list, identifier
//! search.

use super::common::{into_page, parse_self_link, project_scope, string_array, validate_compute_name};
use crate::discovery::attributes::to_attributes;
use crate::discovery::error::{ProviderError, QueryError};
use crate::discovery::item::{BlastPropagation, Item, QueryMethod};
use crate::discovery::pagination::Page;
use crate::discovery::registry::{AdapterCategory, AdapterMetadata};
use crate::discovery::strategy::GetListApi;
use crate::gcp::client::GcpClient;
use async_trait::async_trait;
use serde_json::Value;

pub const ITEM_TYPE: &str = "compute-network";

pub fn metadata() -> AdapterMetadata {
    AdapterMetadata::new(ITEM_TYPE, "VPC Network", AdapterCategory::Network)
        .get("Get a network by name")
        .list("List all networks in a project")
        .search("Search networks by identifier")
        .links(&["compute-network", "compute-subnetwork"])
}

pub struct ComputeNetworkApi;

pub fn network_item(scope: &str, record: &Value) -> Result<Item, QueryError> {
    let attrs = to_attributes(record, &["kind"])?;
    let mut item = Item::new(ITEM_TYPE, scope, "name", attrs);

    for subnet in string_array(record, "subnetworks").filter_map(parse_self_link) {
        item.link(
            "compute-subnetwork",
            QueryMethod::Get,
            Some(&subnet.name),
            &subnet.scope(),
            BlastPropagation::outbound(),
        );
    }

    // Peered networks exchange routes; a change on either side is felt by the other
    for peering in record.get("peerings").and_then(Value::as_array).into_iter().flatten() {
        let Some(peer) = peering.get("network").and_then(Value::as_str).and_then(parse_self_link) else {
            continue;
        };
        item.link(ITEM_TYPE, QueryMethod::Get, Some(&peer.name), &peer.scope(), BlastPropagation::both());
    }

    Ok(item)
}

#[async_trait]
impl GetListApi for ComputeNetworkApi {
    type Client = GcpClient;
    type Output = Value;

    async fn get(&self, client: &GcpClient, scope: &str, query: &str) -> Result<Value, ProviderError> {
        if let Err(err) = validate_compute_name(query, scope) {
            return Err(ProviderError::NotFound(err.error_string));
        }
        let project = project_scope(scope).map_err(|e| ProviderError::Api(e.error_string))?;
        let url = client.compute_global_url(&project, &format!("networks/{}", query));
        Ok(client.get(&url).await?)
    }

    async fn list(&self, client: &GcpClient, scope: &str, page_token: Option<String>) -> Result<Page<Vec<Value>>, ProviderError> {
        let project = project_scope(scope).map_err(|e| ProviderError::Api(e.error_string))?;
        let url = client.compute_global_url(&project, "networks");
        let query: Vec<(&str, &str)> = page_token.iter().map(|t| ("pageToken", t.as_str())).collect();
        let response = client.get_with_query(&url, &query).await?;
        Ok(into_page(response, "items"))
    }

    fn item_mapper(&self, scope: &str, output: Value) -> Result<Item, QueryError> {
        network_item(scope, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_network_links_subnets_and_peers() {
        let record = json!({
            "kind": "compute#network",
            "name": "vpc-a",
            "subnetworks": [
                "https://www.googleapis.com/compute/v1/projects/p1/regions/europe-west1/subnetworks/sub-1"
            ],
            "peerings": [
                {"name": "to-b", "network": "https://www.googleapis.com/compute/v1/projects/p2/global/networks/vpc-b"},
                {"name": "broken"}
            ]
        });

        let item = network_item("p1", &record).unwrap();
        assert_eq!(item.linked_item_queries.len(), 2);

        let subnet = &item.linked_item_queries[0];
        assert_eq!(subnet.query.item_type, "compute-subnetwork");
        assert_eq!(subnet.query.scope, "p1.europe-west1");
        assert_eq!(subnet.blast_propagation, BlastPropagation::outbound());

        let peer = &item.linked_item_queries[1];
        assert_eq!(peer.query.item_type, ITEM_TYPE);
        assert_eq!(peer.query.query, "vpc-b");
        assert_eq!(peer.query.scope, "p2");
        assert_eq!(peer.blast_propagation, BlastPropagation::both());
    }

    #[test]
    fn test_network_without_references_has_no_links() {
        let item = network_item("p1", &json!({"name": "legacy"})).unwrap();
        assert!(item.linked_item_queries.is_empty());
        assert!(item.validate().is_ok());
    }
}
