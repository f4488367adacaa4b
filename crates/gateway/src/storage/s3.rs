//! # S3互換 BlobStore 実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIを使用するBlobStore実装。
//! ハンドルはオブジェクトキーで、公開URLはパススタイル `{endpoint}/{bucket}/{key}`。

use signlink_core::{BlobError, BlobStore};
use signlink_types::BlobHandle;

use super::HttpFetcher;

/// S3互換ストレージによるBlobStore実装。
pub struct S3BlobStore {
    /// 内部通信用バケット（アップロード）
    bucket: s3::Bucket,
    /// 内部から到達できるベースURL（`{endpoint}/{bucket}`）
    internal_base_url: String,
    /// クライアントに返すベースURL。
    /// Docker内部ホスト名と外部ホスト名が異なる場合に内部側と異なる。
    public_base_url: String,
    fetcher: HttpFetcher,
}

impl S3BlobStore {
    pub fn new(
        bucket: s3::Bucket,
        internal_endpoint: &str,
        public_endpoint: Option<&str>,
        fetcher: HttpFetcher,
    ) -> Self {
        let bucket_name = bucket.name();
        let internal_base_url = base_url(internal_endpoint, &bucket_name);
        let public_base_url = public_endpoint
            .map(|ep| base_url(ep, &bucket_name))
            .unwrap_or_else(|| internal_base_url.clone());
        Self {
            bucket,
            internal_base_url,
            public_base_url,
            fetcher,
        }
    }

    /// 環境変数からS3互換バケットを初期化する。
    fn init_bucket(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> anyhow::Result<s3::Bucket> {
        // AWS S3エンドポイント（s3.REGION.amazonaws.com）からリージョンを自動検出。
        // 非AWSエンドポイントではus-east-1をフォールバックとして使用。
        let region_name = std::env::var("S3_REGION")
            .ok()
            .or_else(|| region_from_endpoint(endpoint))
            .unwrap_or_else(|| "us-east-1".to_string());
        let region = s3::Region::Custom {
            region: region_name,
            endpoint: endpoint.to_string(),
        };

        let credentials =
            s3::creds::Credentials::new(Some(access_key), Some(secret_key), None, None, None)?;

        let bucket = s3::Bucket::new(bucket_name, region, credentials)?.with_path_style();

        Ok(*bucket)
    }

    /// 環境変数から構築する。
    pub fn from_env(fetcher: HttpFetcher) -> anyhow::Result<Self> {
        let endpoint = std::env::var("S3_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:9000".to_string());
        let access_key =
            std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let secret_key =
            std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let bucket_name =
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "signlink-contracts".to_string());

        let bucket = Self::init_bucket(&endpoint, &access_key, &secret_key, &bucket_name)?;

        let public_endpoint = std::env::var("S3_PUBLIC_ENDPOINT").ok();
        if let Some(public_ep) = &public_endpoint {
            tracing::info!(s3_public_endpoint = %public_ep, "クライアント向けS3エンドポイントを設定");
        }

        Ok(Self::new(
            bucket,
            &endpoint,
            public_endpoint.as_deref(),
            fetcher,
        ))
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn download(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        let target = to_internal_url(url, &self.public_base_url, &self.internal_base_url);
        self.fetcher.fetch(&target).await
    }

    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobHandle, BlobError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &bytes, content_type)
            .await
            .map_err(|e| BlobError::Transport(format!("アップロード失敗: {e}")))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(BlobError::Transport(format!(
                "アップロードがHTTP {status} を返しました: {key}"
            )));
        }
        tracing::debug!(key, size = bytes.len(), "オブジェクトをアップロードしました");
        Ok(BlobHandle::new(key))
    }

    fn url_for(&self, handle: &BlobHandle) -> String {
        format!("{}/{}", self.public_base_url, handle.as_str())
    }
}

fn base_url(endpoint: &str, bucket_name: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), bucket_name)
}

/// `s3.REGION.amazonaws.com` 形式のエンドポイントからリージョンを取り出す。
fn region_from_endpoint(endpoint: &str) -> Option<String> {
    let start = endpoint.find("s3.")?;
    let rest = &endpoint[start + 3..];
    rest.find(".amazonaws.com").map(|end| rest[..end].to_string())
}

/// 公開URLを内部から到達できるURLに置き換える。自バケット以外のURLはそのまま。
fn to_internal_url(url: &str, public_base: &str, internal_base: &str) -> String {
    match url.strip_prefix(public_base) {
        Some(rest) if rest.starts_with('/') => format!("{internal_base}{rest}"),
        _ => url.to_string(),
    }
}
