// src/catalog/rucio.rs

//! Rucio client.
//!
//! Conflict responses (HTTP 409) mean "already there" for every call here:
//! an existing dataset, a duplicate replication rule, a known replica or
//! an already-attached file are all success for an idempotent re-run.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use crate::config::RucioSettings;

use super::{classify_status, transport_err, CatalogResult, RucioCatalog};

pub struct RucioClient {
    http: reqwest::Client,
    url: String,
}

impl RucioClient {
    pub fn new(http: reqwest::Client, settings: &RucioSettings) -> Self {
        Self {
            http,
            url: settings.url.clone(),
        }
    }
}

#[async_trait]
impl RucioCatalog for RucioClient {
    async fn ensure_dataset(&self, scope: &str, name: &str) -> CatalogResult<()> {
        let url = format!("{}/dids/{}/{}", self.url, scope, name);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "type": "DATASET" }))
            .send()
            .await
            .map_err(|e| transport_err("Rucio ensure_dataset", e))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(()),
            s if s.is_success() => {
                debug!(scope, name, "Rucio dataset created");
                Ok(())
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(classify_status("Rucio ensure_dataset", s, &body))
            }
        }
    }

    async fn ensure_replication_rule(
        &self,
        scope: &str,
        name: &str,
        rse: &str,
    ) -> CatalogResult<()> {
        let url = format!("{}/rules/", self.url);
        let payload = json!({
            "dids": [{ "scope": scope, "name": name }],
            "copies": 1,
            "rse_expression": rse,
        });
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_err("Rucio ensure_replication_rule", e))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(()),
            s if s.is_success() => {
                debug!(scope, name, rse, "Rucio replication rule created");
                Ok(())
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(classify_status("Rucio ensure_replication_rule", s, &body))
            }
        }
    }

    async fn add_replica(
        &self,
        rse: &str,
        scope: &str,
        name: &str,
        size: u64,
        adler32: &str,
    ) -> CatalogResult<()> {
        let url = format!("{}/replicas/{}", self.url, rse);
        let payload = json!({
            "files": [{
                "scope": scope,
                "name": name,
                "bytes": size,
                "adler32": adler32,
            }],
        });
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_err("Rucio add_replica", e))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(()),
            s if s.is_success() => Ok(()),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(classify_status("Rucio add_replica", s, &body))
            }
        }
    }

    async fn attach(
        &self,
        dataset_scope: &str,
        dataset_name: &str,
        file_scope: &str,
        file_name: &str,
    ) -> CatalogResult<bool> {
        let url = format!("{}/dids/{}/{}/dids", self.url, dataset_scope, dataset_name);
        let payload = json!({
            "dids": [{ "scope": file_scope, "name": file_name }],
        });
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_err("Rucio attach", e))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            s if s.is_success() => Ok(true),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(classify_status("Rucio attach", s, &body))
            }
        }
    }
}
