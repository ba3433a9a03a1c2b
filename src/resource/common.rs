//! Helpers shared by the GCP adapters

use crate::discovery::error::QueryError;
use crate::discovery::pagination::Page;
use crate::discovery::scope::{format_scope, parse_scope};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// A parsed Compute Engine self link
///
/// `https://www.googleapis.com/compute/v1/projects/P/zones/Z/disks/D` gives
/// project `P`, location `Z`, collection `disks` and name `D`. Global
/// resources have no location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfLink {
    pub project: String,
    pub location: Option<String>,
    pub collection: String,
    pub name: String,
}

impl SelfLink {
    /// Scope the linked resource lives in
    pub fn scope(&self) -> String {
        format_scope(&self.project, self.location.as_deref().unwrap_or_default())
    }
}

/// Parse a self link, full URL or `projects/...` partial path
pub fn parse_self_link(link: &str) -> Option<SelfLink> {
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link.to_string(),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let start = segments.iter().position(|s| *s == "projects")?;

    match &segments[start..] {
        ["projects", project, "zones" | "regions", location, collection, name, ..] => Some(SelfLink {
            project: project.to_string(),
            location: Some(location.to_string()),
            collection: collection.to_string(),
            name: name.to_string(),
        }),
        ["projects", project, "global", collection, name, ..] => Some(SelfLink {
            project: project.to_string(),
            location: None,
            collection: collection.to_string(),
            name: name.to_string(),
        }),
        _ => None,
    }
}

/// Labels as item tags
pub fn labels_to_tags(record: &Value) -> BTreeMap<String, String> {
    record
        .get("labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Split a list response into its records and the next page token
pub fn into_page(mut response: Value, items_key: &str) -> Page<Vec<Value>> {
    let next_token = response
        .get("nextPageToken")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let items = match response.get_mut(items_key).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    Page::new(items, next_token)
}

/// String values of an array field
pub fn string_array<'a>(record: &'a Value, key: &str) -> impl Iterator<Item = &'a str> {
    record
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Check a Compute Engine resource name (RFC 1035 label, at most 63
/// characters). Anything else can never exist, so it is `NotFound`.
pub fn validate_compute_name(name: &str, scope: &str) -> Result<(), QueryError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(QueryError::not_found(
            format!("{:?} is not a valid Compute Engine resource name", name),
            scope,
        ))
    }
}

/// Project and location of a zonal or regional scope
pub fn located_scope(scope: &str) -> Result<(String, String), QueryError> {
    let (project, location) = parse_scope(scope)?;
    if location.is_empty() {
        return Err(QueryError::other(
            format!("scope {} has no zone or region", scope),
            scope,
        ));
    }
    Ok((project, location))
}

/// Project of a project-wide scope
pub fn project_scope(scope: &str) -> Result<String, QueryError> {
    let (project, _) = parse_scope(scope)?;
    Ok(project)
}
