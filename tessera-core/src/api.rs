//! Contract of the headless content API.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::{ContentType, Entity};
use crate::error::TesseraResult;

/// Filter key selecting entities by id.
pub const IDS_IN: &str = "sys.id[in]";

/// API operation, used for error reporting and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiOperation {
    GetEntry,
    GetAsset,
    GetContentTypes,
    GetEntries,
    GetAssets,
    PublishEntry,
}

impl ApiOperation {
    pub const ALL: [ApiOperation; 6] = [
        ApiOperation::GetEntry,
        ApiOperation::GetAsset,
        ApiOperation::GetContentTypes,
        ApiOperation::GetEntries,
        ApiOperation::GetAssets,
        ApiOperation::PublishEntry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiOperation::GetEntry => "getEntry",
            ApiOperation::GetAsset => "getAsset",
            ApiOperation::GetContentTypes => "getContentTypes",
            ApiOperation::GetEntries => "getEntries",
            ApiOperation::GetAssets => "getAssets",
            ApiOperation::PublishEntry => "publishEntry",
        }
    }
}

impl fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Query filter for collection requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    params: BTreeMap<String, String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// `sys.id[in]` filter with the comma-joined ids.
    pub fn ids_in<S: AsRef<str>>(ids: &[S]) -> Self {
        let joined = ids.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
        Self::new().with(IDS_IN, joined)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Ids selected by the `sys.id[in]` filter, if present.
    pub fn ids(&self) -> Option<Vec<&str>> {
        self.get(IDS_IN)
            .map(|joined| joined.split(',').filter(|id| !id.is_empty()).collect())
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

/// Collection response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection<T> {
    pub items: Vec<T>,
}

impl<T> Collection<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

/// Headless content API.
///
/// Single lookups return `Ok(None)` when the entity does not exist.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn get_entry(&self, id: &str) -> TesseraResult<Option<Entity>>;

    async fn get_asset(&self, id: &str) -> TesseraResult<Option<Entity>>;

    /// All content types of the space. Single content types cannot be fetched.
    async fn get_content_types(&self) -> TesseraResult<Collection<ContentType>>;

    async fn get_entries(&self, query: &Query) -> TesseraResult<Collection<Entity>>;

    async fn get_assets(&self, query: &Query) -> TesseraResult<Collection<Entity>>;

    async fn publish_entry(&self, entry: &Entity) -> TesseraResult<()>;
}
