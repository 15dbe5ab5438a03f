// src/catalog/mod.rs

//! Catalog collaborators: SAM, MetaCat and Rucio.
//!
//! The mover only ever talks to these through the traits below, which
//! capture the declare/query contract: a `None` lookup means "not yet
//! known", and every error is classified as either transient (retry the
//! whole file later) or rejected (a client/validation problem that
//! quarantines the file). HTTP implementations live in the submodules;
//! tests substitute fakes.

pub mod metacat;
pub mod rucio;
pub mod sam;

pub use metacat::MetacatClient;
pub use rucio::RucioClient;
pub use sam::SamWebClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::CatalogSettings;
use crate::errors::Result;

/// Error taxonomy the mover relies on: transient errors are retried after
/// the cooldown, rejections quarantine the file.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("transient catalog error: {0}")]
    Transient(String),

    #[error("catalog rejected the request: {0}")]
    Rejected(String),
}

impl CatalogError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, CatalogError::Rejected(_))
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// What a catalog already knows about a file, for the idempotency checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub size: u64,
    pub adler32: Option<String>,
}

/// File declaration payload for MetaCat.
#[derive(Debug, Clone)]
pub struct MetacatFileSpec {
    pub namespace: String,
    pub name: String,
    pub size: u64,
    pub adler32: String,
    pub metadata: serde_json::Map<String, Value>,
    pub dataset_did: String,
    pub file_id: Option<String>,
}

#[async_trait]
pub trait SamCatalog: Send + Sync {
    async fn get_file(&self, name: &str) -> CatalogResult<Option<CatalogRecord>>;

    /// Declare a file; returns the catalog-assigned file id.
    async fn declare(&self, metadata: &Value) -> CatalogResult<String>;

    async fn add_location(&self, file_id: &str, location: &str) -> CatalogResult<()>;
}

#[async_trait]
pub trait MetaCatalog: Send + Sync {
    async fn get_file(&self, did: &str) -> CatalogResult<Option<CatalogRecord>>;

    async fn declare_file(&self, spec: &MetacatFileSpec) -> CatalogResult<()>;
}

#[async_trait]
pub trait RucioCatalog: Send + Sync {
    /// Create the dataset if it does not exist; an already-existing
    /// dataset is success.
    async fn ensure_dataset(&self, scope: &str, name: &str) -> CatalogResult<()>;

    /// Create a replication rule for the dataset; a duplicate rule is
    /// success.
    async fn ensure_replication_rule(
        &self,
        scope: &str,
        name: &str,
        rse: &str,
    ) -> CatalogResult<()>;

    async fn add_replica(
        &self,
        rse: &str,
        scope: &str,
        name: &str,
        size: u64,
        adler32: &str,
    ) -> CatalogResult<()>;

    /// Attach a file to a dataset; returns false when it was already
    /// attached.
    async fn attach(
        &self,
        dataset_scope: &str,
        dataset_name: &str,
        file_scope: &str,
        file_name: &str,
    ) -> CatalogResult<bool>;
}

/// The set of configured collaborators, resolved once at startup so task
/// logic never null-checks mid-pipeline.
#[derive(Clone, Default)]
pub struct Catalogs {
    pub sam: Option<Arc<dyn SamCatalog>>,
    pub metacat: Option<Arc<dyn MetaCatalog>>,
    pub rucio: Option<Arc<dyn RucioCatalog>>,
}

impl Catalogs {
    pub fn from_config(settings: &CatalogSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("building HTTP client: {e}"))?;

        Ok(Self {
            sam: settings
                .sam
                .as_ref()
                .map(|s| Arc::new(SamWebClient::new(http.clone(), s)) as Arc<dyn SamCatalog>),
            metacat: settings
                .metacat
                .as_ref()
                .map(|m| Arc::new(MetacatClient::new(http.clone(), m)) as Arc<dyn MetaCatalog>),
            rucio: settings
                .rucio
                .as_ref()
                .map(|r| Arc::new(RucioClient::new(http.clone(), r)) as Arc<dyn RucioCatalog>),
        })
    }
}

/// Map an HTTP response status into the catalog error taxonomy.
///
/// Client errors (4xx) are rejections; everything else that is not
/// success is transient.
pub(crate) fn classify_status(
    context: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> CatalogError {
    if status.is_client_error() {
        CatalogError::Rejected(format!("{context}: HTTP {status}: {body}"))
    } else {
        CatalogError::Transient(format!("{context}: HTTP {status}: {body}"))
    }
}

pub(crate) fn transport_err(context: &str, e: reqwest::Error) -> CatalogError {
    CatalogError::Transient(format!("{context}: {e}"))
}
