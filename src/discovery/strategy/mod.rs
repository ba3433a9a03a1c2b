//! Adapter strategies
//!
//! Each strategy turns a small provider-specific trait into a full
//! [`Adapter`](super::adapter::Adapter):
//!
//! - [`describe`] - one paginated describe call serves get, list and search
//! - [`get_list`] - separate get and list calls returning full records
//! - [`always_get`] - list only yields identifiers, every item is fetched with get
//! - [`enriched`] - get/list plus secondary calls (tags, policies) per item

pub mod always_get;
pub mod describe;
pub mod enriched;
pub mod get_list;

pub use always_get::{AlwaysGetAdapter, AlwaysGetApi};
pub use describe::{DescribeApi, DescribeOnlyAdapter};
pub use enriched::{EnrichedAdapter, EnrichedApi};
pub use get_list::{GetListAdapter, GetListApi};
