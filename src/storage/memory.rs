//! In-process [`ObjectStorage`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ObjectStorage, StorageError};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Objects kept in a sorted map. URLs use the `memory://{bucket}/` scheme.
#[derive(Debug)]
pub struct MemoryStorage {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    fail_removals: AtomicBool,
}

impl MemoryStorage {
    /// Creates an empty bucket.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            fail_removals: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent [`ObjectStorage::remove`] fail while `fail`
    /// is set.
    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    /// Whether an object exists under `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// Contents stored under `key`.
    pub async fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).map(|o| o.bytes.clone())
    }

    /// Content type recorded for `key`.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the bucket is empty.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("event-media")
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{key}", self.bucket)
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        if !self.contains(key).await {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!(
            "memory://{}/{key}?expires_in={}",
            self.bucket,
            expires_in.as_secs()
        ))
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected {
                status: 503,
                body: "simulated outage".to_string(),
            });
        }
        let mut objects = self.objects.write().await;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.write().await;
        let Some(source) = objects.get(from).cloned() else {
            return Err(StorageError::NotFound(from.to_string()));
        };
        objects.insert(to.to_string(), source);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_list_copy_remove() {
        let storage = MemoryStorage::default();
        let _ = storage.upload("u/e1/a.png", vec![1, 2], "image/png").await;
        let _ = storage.upload("u/e2/b.png", vec![3], "image/png").await;

        let listed = storage.list("u/e1/").await.unwrap_or_default();
        assert_eq!(listed, ["u/e1/a.png"]);

        assert!(storage.copy("u/e1/a.png", "u/e3/a.png").await.is_ok());
        assert_eq!(storage.bytes("u/e3/a.png").await, Some(vec![1, 2]));
        assert_eq!(storage.content_type("u/e3/a.png").await.as_deref(), Some("image/png"));
        assert!(matches!(
            storage.copy("missing", "x").await,
            Err(StorageError::NotFound(_))
        ));

        assert!(storage.remove(&["u/e1/a.png".to_string()]).await.is_ok());
        assert!(!storage.contains("u/e1/a.png").await);
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn simulated_removal_failure_keeps_objects() {
        let storage = MemoryStorage::default();
        let _ = storage.upload("k", vec![0], "audio/wav").await;
        storage.fail_removals(true);
        assert!(storage.remove(&["k".to_string()]).await.is_err());
        assert!(storage.contains("k").await);
    }

    #[tokio::test]
    async fn signed_url_requires_object() {
        let storage = MemoryStorage::new("b");
        assert!(storage.signed_url("nope", Duration::from_secs(60)).await.is_err());
        let _ = storage.upload("yes", vec![0], "image/jpeg").await;
        let Ok(url) = storage.signed_url("yes", Duration::from_secs(60)).await else {
            panic!("signing failed");
        };
        assert_eq!(url, "memory://b/yes?expires_in=60");
        assert_eq!(storage.public_url("yes"), "memory://b/yes");
    }
}
