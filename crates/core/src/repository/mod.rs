//! # 永続化の抽象インターフェース
//!
//! 契約とトークンの保存先を抽象化する。
//! メモリ内実装は `memory` サブモジュールを参照。
//!
//! 契約ステータスの書き込みは比較交換（compare-and-set）で行い、
//! 同一契約への同時署名のうち成功するのは高々1件となる。

pub mod memory;

pub use memory::{MemoryContractRepository, MemoryTokenRepository};

use chrono::{DateTime, Utc};
use signlink_types::{Contract, ContractId, ContractStatus, Token};

use crate::error::RepositoryError;

/// 署名確定時に契約へ書き込む値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// 提出された元の署名画像URL（合成画像ではない）
    pub signature_url: String,
    pub encrypted_code: String,
}

/// 契約ステータスの比較交換要求。
#[derive(Debug, Clone)]
pub struct StatusTransition {
    /// 書き込み直前に保存されているべき状態
    pub expected: ContractStatus,
    /// 遷移先
    pub next: ContractStatus,
    /// 署名確定時のみ `Some`
    pub signature: Option<SignatureRecord>,
}

/// 契約の参照・状態遷移。
#[async_trait::async_trait]
pub trait ContractRepository: Send + Sync {
    /// IDで契約を取得する。呼び出しのたびに最新の状態を読む。
    async fn find(&self, id: ContractId) -> Result<Option<Contract>, RepositoryError>;

    /// 公開識別子で契約を取得する。
    async fn find_by_encrypted_code(
        &self,
        encrypted_code: &str,
    ) -> Result<Option<Contract>, RepositoryError>;

    /// ステータスと署名情報を原子的に更新する。
    ///
    /// 保存されている状態が `transition.expected` と異なる場合は
    /// `RepositoryError::Conflict` を返し、何も書き込まない。
    async fn update_status_and_signature(
        &self,
        id: ContractId,
        transition: StatusTransition,
    ) -> Result<Contract, RepositoryError>;
}

/// トークンの保存。削除系はすべて冪等で、削除件数を返す。
#[async_trait::async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: Token) -> Result<(), RepositoryError>;

    async fn find_by_value(&self, value: &str) -> Result<Option<Token>, RepositoryError>;

    async fn delete_by_value(&self, value: &str) -> Result<u64, RepositoryError>;

    async fn delete_by_contract_id(&self, contract_id: ContractId)
        -> Result<u64, RepositoryError>;

    /// `expires_at < now` のトークンをすべて削除する。
    async fn delete_expired_before(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
