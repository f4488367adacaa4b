//! # 署名リンクトークンの抽出
//!
//! 次の順に探し、最初に見つかった値を使う。
//! 1. クエリ `token`
//! 2. ヘッダ `contract-token`
//! 3. `Authorization: Bearer <token>`

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;

use crate::error::GatewayError;

/// トークンを渡すヘッダ名
pub const TOKEN_HEADER: &str = "contract-token";

/// リクエストから取り出した署名リンクトークン。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractToken(pub String);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl<S> FromRequestParts<S> for ContractToken
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_query = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token);
        let from_header = || {
            parts
                .headers
                .get(TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let from_bearer = || {
            parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|v| v.trim().to_string())
        };

        from_query
            .filter(|t| !t.is_empty())
            .or_else(|| from_header().filter(|t| !t.is_empty()))
            .or_else(|| from_bearer().filter(|t| !t.is_empty()))
            .map(ContractToken)
            .ok_or_else(|| GatewayError::BadRequest("署名リンクトークンがありません".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<ContractToken, GatewayError> {
        let (mut parts, _) = request.into_parts();
        ContractToken::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_query_takes_precedence() {
        let request = Request::builder()
            .uri("/contract-token/image?token=from-query")
            .header(TOKEN_HEADER, "from-header")
            .header(AUTHORIZATION, "Bearer from-bearer")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().0, "from-query");
    }

    #[tokio::test]
    async fn test_header_then_bearer() {
        let request = Request::builder()
            .uri("/contract-token/image")
            .header(TOKEN_HEADER, "from-header")
            .header(AUTHORIZATION, "Bearer from-bearer")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().0, "from-header");

        let request = Request::builder()
            .uri("/contract-token/image?token=")
            .header(AUTHORIZATION, "Bearer from-bearer")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().0, "from-bearer");
    }

    #[tokio::test]
    async fn test_missing_token_is_bad_request() {
        let request = Request::builder()
            .uri("/contract-token/image")
            .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap();
        assert!(matches!(
            extract(request).await,
            Err(GatewayError::BadRequest(_))
        ));
    }
}
