// src/catalog/sam.rs

//! SAM web client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::SamSettings;

use super::{
    classify_status, transport_err, CatalogRecord, CatalogResult, SamCatalog,
};

pub struct SamWebClient {
    http: reqwest::Client,
    url: String,
}

impl SamWebClient {
    pub fn new(http: reqwest::Client, settings: &SamSettings) -> Self {
        Self {
            http,
            url: settings.url.clone(),
        }
    }
}

#[async_trait]
impl SamCatalog for SamWebClient {
    async fn get_file(&self, name: &str) -> CatalogResult<Option<CatalogRecord>> {
        let url = format!("{}/files/name/{}/metadata?format=json", self.url, name);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| transport_err("SAM get_file", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let meta: Value = response
                    .json()
                    .await
                    .map_err(|e| transport_err("SAM get_file body", e))?;
                Ok(Some(record_from_sam_meta(&meta)))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(classify_status("SAM get_file", s, &body))
            }
        }
    }

    async fn declare(&self, metadata: &Value) -> CatalogResult<String> {
        let url = format!("{}/files", self.url);
        let response = self
            .http
            .post(&url)
            .json(metadata)
            .send()
            .await
            .map_err(|e| transport_err("SAM declare", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_err("SAM declare body", e))?;
        if !status.is_success() {
            return Err(classify_status("SAM declare", status, &body));
        }
        let file_id = body.trim().to_string();
        debug!(file_id, "declared to SAM");
        Ok(file_id)
    }

    async fn add_location(&self, file_id: &str, location: &str) -> CatalogResult<()> {
        let url = format!("{}/files/id/{}/locations", self.url, file_id);
        let response = self
            .http
            .post(&url)
            .header("SAM-Role", "*")
            .form(&[("add", location)])
            .send()
            .await
            .map_err(|e| transport_err("SAM add_location", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("SAM add_location", status, &body));
        }
        Ok(())
    }
}

/// Pull size and adler32 out of SAM metadata. SAM reports checksums as a
/// list of `"type:value"` strings.
fn record_from_sam_meta(meta: &Value) -> CatalogRecord {
    let size = meta
        .get("file_size")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    let adler32 = meta
        .get("checksum")
        .and_then(Value::as_array)
        .and_then(|checksums| {
            checksums.iter().find_map(|ck| {
                ck.as_str()
                    .and_then(|s| s.split_once(':'))
                    .filter(|(kind, _)| *kind == "adler32")
                    .map(|(_, value)| value.to_lowercase())
            })
        });
    CatalogRecord { size, adler32 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_size_and_adler32_from_sam_metadata() {
        let meta = json!({
            "file_size": 1234,
            "checksum": ["md5:abc", "adler32:DEADBEEF"]
        });
        let rec = record_from_sam_meta(&meta);
        assert_eq!(rec.size, 1234);
        assert_eq!(rec.adler32.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn missing_checksum_yields_none() {
        let meta = json!({ "file_size": 7 });
        let rec = record_from_sam_meta(&meta);
        assert_eq!(rec.adler32, None);
    }
}
