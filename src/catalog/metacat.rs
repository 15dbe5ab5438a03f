// src/catalog/metacat.rs

//! MetaCat client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::MetacatSettings;

use super::{
    classify_status, transport_err, CatalogRecord, CatalogResult, MetaCatalog, MetacatFileSpec,
};

pub struct MetacatClient {
    http: reqwest::Client,
    url: String,
}

impl MetacatClient {
    pub fn new(http: reqwest::Client, settings: &MetacatSettings) -> Self {
        Self {
            http,
            url: settings.url.clone(),
        }
    }
}

#[async_trait]
impl MetaCatalog for MetacatClient {
    async fn get_file(&self, did: &str) -> CatalogResult<Option<CatalogRecord>> {
        let url = format!("{}/data/file", self.url);
        let response = self
            .http
            .get(&url)
            .query(&[("did", did)])
            .send()
            .await
            .map_err(|e| transport_err("MetaCat get_file", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| transport_err("MetaCat get_file body", e))?;
                let size = body.get("size").and_then(Value::as_u64).unwrap_or_default();
                let adler32 = body
                    .get("checksums")
                    .and_then(|c| c.get("adler32"))
                    .and_then(Value::as_str)
                    .map(|s| s.to_lowercase());
                Ok(Some(CatalogRecord { size, adler32 }))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(classify_status("MetaCat get_file", s, &body))
            }
        }
    }

    async fn declare_file(&self, spec: &MetacatFileSpec) -> CatalogResult<()> {
        let url = format!("{}/data/files", self.url);
        let mut file_info = json!({
            "namespace": spec.namespace,
            "name": spec.name,
            "size": spec.size,
            "checksums": { "adler32": spec.adler32 },
            "metadata": Value::Object(spec.metadata.clone()),
        });
        if let Some(fid) = &spec.file_id {
            file_info["fid"] = json!(fid);
        }
        let payload = json!({
            "dataset": spec.dataset_did,
            "files": [file_info],
        });

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_err("MetaCat declare_file", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("MetaCat declare_file", status, &body));
        }
        debug!(namespace = %spec.namespace, name = %spec.name, "declared to MetaCat");
        Ok(())
    }
}
