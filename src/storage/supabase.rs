//! Supabase Storage REST client, authenticated with the service key.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ObjectStorage, StorageError};

/// Page size used when listing a prefix.
const LIST_PAGE: usize = 100;

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CopyRequest<'a> {
    bucket_id: &'a str,
    source_key: &'a str,
    destination_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// Client for one Supabase Storage bucket.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    /// Creates a client for `bucket` on the project at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, service_key: String, bucket: String) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/storage/v1/{path}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        key: &str,
    ) -> Result<reqwest::Response, StorageError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let url = self.endpoint(&format!("object/{}/{key}", self.bucket));
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.execute(request, key).await?;
        tracing::debug!(key, "object uploaded");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        self.endpoint(&format!("object/public/{}/{key}", self.bucket))
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let url = self.endpoint(&format!("object/sign/{}/{key}", self.bucket));
        let request = self.client.post(url).json(&SignRequest {
            expires_in: expires_in.as_secs(),
        });
        let signed: SignResponse = self
            .execute(request, key)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&format!("object/{}", self.bucket));
        let request = self
            .client
            .delete(url)
            .json(&RemoveRequest { prefixes: keys });
        self.execute(request, &keys.join(",")).await?;
        tracing::debug!(count = keys.len(), "objects removed");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let folder = prefix.trim_end_matches('/');
        let url = self.endpoint(&format!("object/list/{}", self.bucket));
        let mut keys = Vec::new();
        let mut offset = 0;
        loop {
            let request = self.client.post(&url).json(&ListRequest {
                prefix: folder,
                limit: LIST_PAGE,
                offset,
            });
            let page: Vec<ListEntry> = self
                .execute(request, prefix)
                .await?
                .json()
                .await
                .map_err(|e| StorageError::Transport(e.to_string()))?;
            let fetched = page.len();
            keys.extend(page.into_iter().map(|e| format!("{folder}/{}", e.name)));
            if fetched < LIST_PAGE {
                return Ok(keys);
            }
            offset += fetched;
        }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let url = self.endpoint("object/copy");
        let request = self.client.post(url).json(&CopyRequest {
            bucket_id: &self.bucket,
            source_key: from,
            destination_key: to,
        });
        self.execute(request, from).await?;
        Ok(())
    }
}
