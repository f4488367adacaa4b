//! # GET /contract/get-image/{encryptedCode}
//!
//! 署名済み契約の公開参照。トークンは不要。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use signlink_types::SignedContractImageResponse;

use crate::config::GatewayState;
use crate::error::GatewayError;

pub async fn handle_signed_image(
    State(state): State<Arc<GatewayState>>,
    Path(encrypted_code): Path<String>,
) -> Result<Json<SignedContractImageResponse>, GatewayError> {
    let signed = state
        .signatures
        .image_by_encrypted_code(&encrypted_code)
        .await?;

    Ok(Json(SignedContractImageResponse {
        contract_id: signed.contract_id,
        contract_type: signed.contract_type,
        contract_image: signed.image_url,
        signature_url: signed.signature_url,
    }))
}
