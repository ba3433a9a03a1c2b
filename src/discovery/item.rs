//! Graph nodes and blast-propagation links
//!
//! An [`Item`] is one discovered resource. Its [`LinkedItemQuery`] list points
//! at other resources; each link carries two independent flags describing
//! which way a change can propagate.

use super::attributes::ItemAttributes;
use super::error::QueryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Health of a resource, when the provider exposes one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    Ok,
    Pending,
    Warning,
    Error,
    Unknown,
}

/// Query method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryMethod {
    Get,
    List,
    Search,
}

impl fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryMethod::Get => "GET",
            QueryMethod::List => "LIST",
            QueryMethod::Search => "SEARCH",
        };
        f.write_str(s)
    }
}

/// Which way a change travels across a link
///
/// `in_`: a change to the linked resource can affect this item.
/// `out`: a change to this item can affect the linked resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlastPropagation {
    #[serde(rename = "in")]
    pub in_: bool,
    pub out: bool,
}

impl BlastPropagation {
    pub const fn new(in_: bool, out: bool) -> Self {
        Self { in_, out }
    }

    /// Both sides affect each other
    pub const fn both() -> Self {
        Self::new(true, true)
    }

    /// Neither side affects the other; the link is informational
    pub const fn none() -> Self {
        Self::new(false, false)
    }

    /// Only changes to the linked resource matter to this item
    pub const fn inbound() -> Self {
        Self::new(true, false)
    }

    /// Only changes to this item matter to the linked resource
    pub const fn outbound() -> Self {
        Self::new(false, true)
    }
}

/// A query against another adapter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "type")]
    pub item_type: String,
    pub method: QueryMethod,
    pub query: String,
    pub scope: String,
}

/// An outbound edge from an item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedItemQuery {
    pub query: Query,
    pub blast_propagation: BlastPropagation,
}

impl LinkedItemQuery {
    pub fn new(
        item_type: &str,
        method: QueryMethod,
        query: impl Into<String>,
        scope: impl Into<String>,
        blast_propagation: BlastPropagation,
    ) -> Self {
        Self {
            query: Query {
                item_type: item_type.to_string(),
                method,
                query: query.into(),
                scope: scope.into(),
            },
            blast_propagation,
        }
    }
}

/// A discovered resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub item_type: String,
    pub scope: String,
    pub unique_attribute: String,
    pub attributes: ItemAttributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
    #[serde(default)]
    pub linked_item_queries: Vec<LinkedItemQuery>,
}

impl Item {
    pub fn new(
        item_type: &str,
        scope: impl Into<String>,
        unique_attribute: &str,
        attributes: ItemAttributes,
    ) -> Self {
        Self {
            item_type: item_type.to_string(),
            scope: scope.into(),
            unique_attribute: unique_attribute.to_string(),
            attributes,
            tags: BTreeMap::new(),
            health: None,
            linked_item_queries: Vec::new(),
        }
    }

    /// Value of the unique attribute rendered as a string
    pub fn unique_attribute_value(&self) -> Option<String> {
        self.attributes
            .get_str(&self.unique_attribute)
            .filter(|v| !v.is_empty())
    }

    /// `type.scope.value` identity used for deduplication by graph walkers
    pub fn global_unique_attribute(&self) -> String {
        format!(
            "{}.{}.{}",
            self.item_type,
            self.scope,
            self.unique_attribute_value().unwrap_or_default()
        )
    }

    /// Check the structural invariants every emitted item must satisfy
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.item_type.is_empty() {
            return Err(QueryError::other("item has an empty type", &self.scope));
        }
        if self.scope.is_empty() {
            return Err(QueryError::other(
                format!("{} item has an empty scope", self.item_type),
                "",
            ));
        }
        if self.unique_attribute.is_empty() {
            return Err(QueryError::other(
                format!("{} item has no unique attribute name", self.item_type),
                &self.scope,
            ));
        }
        if self.unique_attribute_value().is_none() {
            return Err(QueryError::other(
                format!(
                    "{} item has no value for unique attribute {:?}",
                    self.item_type, self.unique_attribute
                ),
                &self.scope,
            ));
        }
        for link in &self.linked_item_queries {
            if link.query.item_type.is_empty() || link.query.scope.is_empty() {
                return Err(QueryError::other(
                    format!("{} item has a link with an empty type or scope", self.item_type),
                    &self.scope,
                ));
            }
        }
        Ok(())
    }

    /// Add a link when `query` holds a non-empty value and the target scope
    /// is known
    ///
    /// Returns whether a link was added. Links are appended in call order and
    /// never deduplicated, so a resource may link to several instances of
    /// its own type.
    pub fn link<Q: AsRef<str>>(
        &mut self,
        item_type: &str,
        method: QueryMethod,
        query: Option<Q>,
        scope: &str,
        blast_propagation: BlastPropagation,
    ) -> bool {
        let Some(query) = query else {
            return false;
        };
        let query = query.as_ref();
        if query.is_empty() || scope.is_empty() {
            return false;
        }

        self.linked_item_queries.push(LinkedItemQuery::new(
            item_type,
            method,
            query,
            scope,
            blast_propagation,
        ));
        true
    }
}
