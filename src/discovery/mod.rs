//! Resource discovery framework
//!
//! Provider-neutral building blocks for discovering cloud resources and the
//! links between them.
//!
//! # Module Structure
//!
//! - [`scope`] / [`identifier`] - where a resource lives and how it is named
//! - [`attributes`] - mapping provider records into item attributes
//! - [`item`] - items, linked item queries and blast propagation
//! - [`pagination`] - page-token iteration
//! - [`cache`] - result cache with TTLs and error caching
//! - [`stream`] - sinks receiving streamed list and search results
//! - [`adapter`] - the get / list / search contract and shared machinery
//! - [`strategy`] - the adapter strategies built on top of it
//! - [`registry`] - static metadata for every adapter type
//! - [`error`] - error taxonomy

pub mod adapter;
pub mod attributes;
pub mod cache;
pub mod error;
pub mod identifier;
pub mod item;
pub mod pagination;
pub mod registry;
pub mod scope;
pub mod strategy;
pub mod stream;

pub use adapter::{Adapter, AdapterCore, IdentifierFormat};
pub use attributes::{to_attributes, ItemAttributes};
pub use cache::{Cache, CacheKey, ConfiguredTtlCache, MemoryCache, NoOpCache, TtlPolicy};
pub use error::{ErrorType, ProviderError, QueryError};
pub use identifier::Identifier;
pub use item::{BlastPropagation, Health, Item, LinkedItemQuery, QueryMethod};
pub use registry::{AdapterCategory, AdapterMetadata, MetadataRegistry};
pub use stream::{ChannelSink, CollectingSink, QueryResult, QuerySink};
