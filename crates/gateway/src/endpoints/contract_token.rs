//! # /contract-token
//!
//! 署名リンクの発行・検証と、リンク経由の契約画像取得・署名提出。

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use signlink_core::CoreError;
use signlink_types::*;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::extract::ContractToken;

/// GET /contract-token?id=: トークン発行。
pub async fn handle_issue_token(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<IssueTokenQuery>,
) -> Result<Json<IssueTokenResponse>, GatewayError> {
    let raw = query
        .id
        .ok_or_else(|| GatewayError::BadRequest("契約IDが指定されていません".to_string()))?;
    let contract_id: ContractId = raw
        .trim()
        .parse()
        .map_err(|_| GatewayError::BadRequest(format!("契約IDが不正です: {raw}")))?;

    let token = state
        .tokens
        .issue(contract_id, state.token_ttl_minutes)
        .await?;

    tracing::info!(contract_id, expires_at = %token.expires_at, "署名リンクを発行しました");
    Ok(Json(IssueTokenResponse {
        token: token.value,
        contract_id,
        expired_at: token.expires_at,
    }))
}

/// GET /contract-token/validate/{token}: トークン検証。
///
/// 無効なトークンは理由を区別せず404を返す。
pub async fn handle_validate_token(
    State(state): State<Arc<GatewayState>>,
    Path(token): Path<String>,
) -> Result<Json<ValidateTokenResponse>, GatewayError> {
    let validated = state
        .tokens
        .validate(&token)
        .await?
        .ok_or(CoreError::TokenInvalid)?;

    Ok(Json(ValidateTokenResponse {
        valid: true,
        contract: validated.contract,
    }))
}

/// GET /contract-token/image: トークン経由の契約画像。
pub async fn handle_contract_image(
    State(state): State<Arc<GatewayState>>,
    ContractToken(token): ContractToken,
) -> Result<Json<ContractImageResponse>, GatewayError> {
    let image = state.signatures.contract_image(&token).await?;
    Ok(Json(ContractImageResponse {
        contract_image: image.image_url,
        contract_type: image.contract_type,
        contract_id: image.contract_id,
    }))
}

/// POST /contract-token/signature: 署名提出。
pub async fn handle_save_signature(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<SaveSignatureRequest>,
) -> Result<(StatusCode, Json<SaveSignatureResponse>), GatewayError> {
    if body.token.is_empty() {
        return Err(GatewayError::BadRequest("tokenは必須です".to_string()));
    }
    if body.signature_url.trim().is_empty() {
        return Err(GatewayError::BadRequest("signatureUrlは必須です".to_string()));
    }

    let outcome = state
        .signatures
        .submit(body.contract_id, &body.token, body.signature_url.trim())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SaveSignatureResponse {
            success: true,
            message: "署名を保存しました".to_string(),
            contract_id: body.contract_id,
            composite_signature_url: outcome.composite_url,
            encrypted_code: outcome.encrypted_code,
        }),
    ))
}
