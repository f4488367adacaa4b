//! # Signlink 共有型定義
//!
//! 署名リンク（契約単位の一時トークン）サブシステムで扱うデータ構造と、
//! HTTP境界のリクエスト・レスポンス型を提供する。
//!
//! ## エンコーディング規則
//! - JSONフィールド名: camelCase（既存クライアントとの互換）
//! - 日時: RFC 3339（UTC）
//! - 契約ステータス: `"0"`未署名 / `"1"`署名済み / `"2"`終了

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 契約ID（CRUD側の主キー）。
pub type ContractId = u64;

/// BlobStore上のオブジェクトを指す不透明なハンドル（オブジェクトキー）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobHandle(pub String);

impl BlobHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// 契約
// ---------------------------------------------------------------------------

/// 契約のライフサイクル状態。
///
/// `Signed` / `Terminated` は終端状態で、`Unsigned` へ戻ることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    /// 未署名
    #[serde(rename = "0")]
    Unsigned,
    /// 署名済み
    #[serde(rename = "1")]
    Signed,
    /// 終了
    #[serde(rename = "2")]
    Terminated,
}

impl ContractStatus {
    /// 終端状態（これ以上遷移しない）かどうか。
    pub fn is_terminal(self) -> bool {
        !matches!(self, ContractStatus::Unsigned)
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ContractStatus::Unsigned => "unsigned",
            ContractStatus::Signed => "signed",
            ContractStatus::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// 署名サブシステムが参照・更新する契約フィールド。
/// その他の業務フィールドはCRUDモジュールが所有する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: ContractId,
    #[serde(rename = "contractStatus")]
    pub status: ContractStatus,
    /// 契約種別（署名位置テーブルのキー）
    #[serde(default)]
    pub contract_type: String,
    /// 契約書スキャン画像
    #[serde(default)]
    pub contract_image: Option<BlobHandle>,
    /// 署名者が提出した元の署名画像URL
    #[serde(default)]
    pub signature_url: Option<String>,
    /// 契約番号
    #[serde(default)]
    pub contract_number: Option<String>,
    /// 署名済み契約の公開識別子（HMAC由来）
    #[serde(default)]
    pub encrypted_code: Option<String>,
}

// ---------------------------------------------------------------------------
// トークン
// ---------------------------------------------------------------------------

/// 単一契約にスコープされた一時アクセストークン。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// 不透明なランダム値（64文字hex）
    #[serde(rename = "token")]
    pub value: String,
    /// 参照先の契約（所有関係ではない）
    pub contract_id: ContractId,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "expiredAt")]
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// `now` 時点で期限切れかどうか。`expires_at` ちょうどはまだ有効。
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ---------------------------------------------------------------------------
// HTTP: GET /contract-token?id=
// ---------------------------------------------------------------------------

/// トークン発行のクエリ。
#[derive(Debug, Clone, Deserialize)]
pub struct IssueTokenQuery {
    /// 契約ID（文字列で受け取り、ハンドラで検証する）
    pub id: Option<String>,
}

/// トークン発行レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenResponse {
    pub token: String,
    pub contract_id: ContractId,
    pub expired_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// HTTP: GET /contract-token/validate/{token}
// ---------------------------------------------------------------------------

/// トークン検証レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub contract: Contract,
}

// ---------------------------------------------------------------------------
// HTTP: GET /contract-token/image
// ---------------------------------------------------------------------------

/// トークン経由で取得する契約画像情報。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractImageResponse {
    /// 契約画像の解決済みURL
    pub contract_image: String,
    pub contract_type: String,
    pub contract_id: ContractId,
}

// ---------------------------------------------------------------------------
// HTTP: POST /contract-token/signature
// ---------------------------------------------------------------------------

/// 署名提出リクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSignatureRequest {
    pub contract_id: ContractId,
    pub token: String,
    /// アップロード済み署名画像のURL
    pub signature_url: String,
}

/// 署名提出レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSignatureResponse {
    pub success: bool,
    pub message: String,
    pub contract_id: ContractId,
    /// 合成済み画像のURL（表示用の派生物）
    pub composite_signature_url: String,
    pub encrypted_code: String,
}

// ---------------------------------------------------------------------------
// HTTP: GET /contract/get-image/{encryptedCode}
// ---------------------------------------------------------------------------

/// 公開識別子から引く署名済み契約の画像情報。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedContractImageResponse {
    pub contract_id: ContractId,
    pub contract_type: String,
    pub contract_image: String,
    pub signature_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_codes() {
        assert_eq!(serde_json::to_string(&ContractStatus::Unsigned).unwrap(), "\"0\"");
        assert_eq!(serde_json::to_string(&ContractStatus::Signed).unwrap(), "\"1\"");
        let parsed: ContractStatus = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(parsed, ContractStatus::Terminated);
        assert!(parsed.is_terminal());
        assert!(!ContractStatus::Unsigned.is_terminal());
    }

    #[test]
    fn test_contract_json_shape() {
        let json = serde_json::json!({
            "id": 7,
            "contractStatus": "0",
            "contractType": "代理记账合同",
            "contractImage": "contracts/7.png",
            "contractNumber": "2024060100001"
        });
        let contract: Contract = serde_json::from_value(json).unwrap();
        assert_eq!(contract.id, 7);
        assert_eq!(contract.status, ContractStatus::Unsigned);
        assert_eq!(contract.contract_image, Some(BlobHandle::new("contracts/7.png")));
        assert!(contract.signature_url.is_none());
        assert!(contract.encrypted_code.is_none());
    }

    #[test]
    fn test_token_expiry_boundary() {
        let created_at = Utc::now();
        let token = Token {
            value: "ab".repeat(32),
            contract_id: 1,
            created_at,
            expires_at: created_at + chrono::Duration::minutes(30),
        };
        assert!(!token.is_expired_at(token.expires_at));
        assert!(token.is_expired_at(token.expires_at + chrono::Duration::seconds(1)));

        let value = serde_json::to_value(&token).unwrap();
        assert!(value.get("token").is_some());
        assert!(value.get("expiredAt").is_some());
    }
}
