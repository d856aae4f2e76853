//! Search over published servables
//!
//! Provides functionality for:
//! - Composing advanced queries with [`SearchHelper`]
//! - Executing them against a [`SearchBackend`] (Globus Search by default)
//! - Pulling method descriptions out of returned records

pub mod backend;
pub mod query;

pub use backend::{GlobusSearchBackend, SearchBackend, SearchRequest, SearchResponse, SortField};
pub use query::{SearchHelper, SearchInfo};

use crate::error::{DlhubError, DlhubResult};
use serde_json::Value;

/// Most records a single search can return
pub const SEARCH_LIMIT: usize = 10_000;

/// Method descriptions from a servable record
///
/// Returns the named method, or the whole `methods` map when `method` is `None`.
pub fn get_method_details(metadata: &Value, method: Option<&str>) -> DlhubResult<Value> {
    let methods = metadata
        .pointer("/servable/methods")
        .ok_or_else(|| DlhubError::MissingField("servable.methods".to_string()))?;

    match method {
        Some(name) => methods
            .get(name)
            .cloned()
            .ok_or_else(|| DlhubError::NotFound(format!("No such method: {}", name))),
        None => Ok(methods.clone()),
    }
}
