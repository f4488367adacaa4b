//! # Gatewayエンドポイント
//!
//! - `GET /contract-token?id=`: トークン発行
//! - `GET /contract-token/validate/{token}`: トークン検証
//! - `GET /contract-token/image`: トークン経由の契約画像
//! - `POST /contract-token/signature`: 署名提出
//! - `GET /contract/get-image/{encryptedCode}`: 署名済み契約の公開参照

pub mod contract;
pub mod contract_token;

pub use contract::handle_signed_image;
pub use contract_token::{
    handle_contract_image, handle_issue_token, handle_save_signature, handle_validate_token,
};
