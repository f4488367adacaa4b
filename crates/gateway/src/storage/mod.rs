//! # 画像ストレージ
//!
//! `BlobStore` のGateway側実装。
//! 署名画像はクライアントが任意の場所にアップロードするため、ダウンロードは
//! 常にHTTPで行い、サイズ上限を課す。S3互換ストレージ実装は `s3` サブモジュールを参照。

#[cfg(feature = "vendor-aws")]
pub mod s3;

#[cfg(feature = "vendor-aws")]
pub use s3::S3BlobStore;

use signlink_core::BlobError;

/// サイズ上限付きのHTTPダウンローダ。
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }

    /// `url` を取得する。
    ///
    /// 宣言された `Content-Length`、または受信済みの本文が上限を超えた時点で打ち切る。
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlobError::Transport(format!("HTTP送信失敗: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(BlobError::Transport(format!("HTTP {status}: {url}")));
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                return Err(BlobError::TooLarge {
                    size: declared,
                    limit: self.max_bytes,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BlobError::Transport(format!("レスポンス読み取り失敗: {e}")))?
        {
            let size = (body.len() + chunk.len()) as u64;
            if size > self.max_bytes {
                return Err(BlobError::TooLarge {
                    size,
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// モック画像サーバーを起動し、ベースURLを返す。
    async fn spawn_mock_server() -> String {
        let app = axum::Router::new().route(
            "/images/sig.png",
            axum::routing::get(|| async { vec![7u8; 64] }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn test_fetch_within_limit() {
        let base = spawn_mock_server().await;
        let fetcher = HttpFetcher::new(reqwest::Client::new(), 1024);
        let body = fetcher.fetch(&format!("{base}/images/sig.png")).await.unwrap();
        assert_eq!(body, vec![7u8; 64]);
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let base = spawn_mock_server().await;
        let fetcher = HttpFetcher::new(reqwest::Client::new(), 16);
        assert!(matches!(
            fetcher.fetch(&format!("{base}/images/sig.png")).await,
            Err(BlobError::TooLarge { limit: 16, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_missing_object() {
        let base = spawn_mock_server().await;
        let fetcher = HttpFetcher::new(reqwest::Client::new(), 1024);
        assert!(matches!(
            fetcher.fetch(&format!("{base}/images/missing.png")).await,
            Err(BlobError::NotFound(_))
        ));
    }
}
