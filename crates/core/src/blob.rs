//! # BlobStore
//!
//! 画像オブジェクトの保存先を抽象化するインターフェース。
//! 本番用のS3互換実装はgatewayクレートにあり、ここにはメモリ内実装のみを置く。

use std::collections::HashMap;

use tokio::sync::RwLock;

use signlink_types::BlobHandle;

use crate::error::BlobError;

/// BlobStoreの抽象インターフェース。
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// URLからオブジェクトを取得する。
    async fn download(&self, url: &str) -> Result<Vec<u8>, BlobError>;

    /// オブジェクトを `key` に保存し、ハンドルを返す。
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobHandle, BlobError>;

    /// ハンドルを外部から参照可能なURLに解決する。
    fn url_for(&self, handle: &BlobHandle) -> String;
}

/// メモリ内のBlobStore（開発・テスト用）。
///
/// URLは `{base_url}/{key}` 形式。`download` はこの形式のURLだけを解決する。
pub struct MemoryBlobStore {
    base_url: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// オブジェクトを直接登録し、そのハンドルを返す。
    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> BlobHandle {
        self.objects.write().await.insert(key.to_string(), bytes);
        BlobHandle::new(key)
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.base_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        let key = self
            .key_from_url(url)
            .ok_or_else(|| BlobError::NotFound(url.to_string()))?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(url.to_string()))
    }

    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<BlobHandle, BlobError> {
        Ok(self.put(key, bytes).await)
    }

    fn url_for(&self, handle: &BlobHandle) -> String {
        format!("{}/{}", self.base_url, handle.as_str())
    }
}
