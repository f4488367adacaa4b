//! # トークン管理
//!
//! 契約単位の一時トークンの発行・検証・一括無効化。
//!
//! ## 不変条件
//! 永続化されている有効期限内のトークンは、すべて `Unsigned` の契約を参照している。
//! - 発行は `Unsigned` の契約に対してのみ行い、挿入後にも状態を読み直す
//! - 検証のたびに契約状態を読み直し、署名済み・終了なら契約の全トークンを削除する

use std::sync::Arc;

use chrono::Duration;

use signlink_types::{Contract, ContractId, Token};

use crate::clock::Clock;
use crate::error::{CoreError, RepositoryError};
use crate::gate::ContractStateGate;
use crate::repository::{ContractRepository, TokenRepository};

/// 検証済みトークンと、検証時点で読み直した契約。
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub token: Token,
    pub contract: Contract,
}

/// ログ出力用にトークン値を短縮する。
pub(crate) fn token_prefix(value: &str) -> &str {
    value.get(..8).unwrap_or(value)
}

/// トークンの発行・検証・無効化。
pub struct TokenManager {
    tokens: Arc<dyn TokenRepository>,
    contracts: Arc<dyn ContractRepository>,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new(
        tokens: Arc<dyn TokenRepository>,
        contracts: Arc<dyn ContractRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            contracts,
            clock,
        }
    }

    /// 契約に対するトークンを発行する。
    ///
    /// 契約が署名済み・終了の場合は残っているトークンを削除したうえで
    /// `NotSignable` を返す。
    pub async fn issue(&self, contract_id: ContractId, ttl_minutes: u32) -> Result<Token, CoreError> {
        let contract = self.load_contract(contract_id).await?;
        if !ContractStateGate::is_signable(&contract) {
            self.invalidate_all(contract_id).await?;
            tracing::warn!(
                contract_id,
                status = %contract.status,
                "署名できない契約へのトークン発行を拒否し、関連トークンを削除しました"
            );
            return Err(CoreError::NotSignable {
                status: contract.status,
            });
        }

        let now = self.clock.now();
        let token = Token {
            value: signlink_crypto::generate_token_value(),
            contract_id,
            created_at: now,
            expires_at: now + Duration::minutes(i64::from(ttl_minutes)),
        };
        self.tokens.insert(token.clone()).await?;

        // 挿入までの間に署名・終了された場合に備えて読み直す
        let current = self.load_contract(contract_id).await?;
        if !ContractStateGate::is_signable(&current) {
            self.invalidate_all(contract_id).await?;
            tracing::warn!(
                contract_id,
                status = %current.status,
                "発行中に契約状態が変化したためトークンを破棄しました"
            );
            return Err(CoreError::NotSignable {
                status: current.status,
            });
        }

        tracing::debug!(
            contract_id,
            token = token_prefix(&token.value),
            expires_at = %token.expires_at,
            "トークンを発行しました"
        );
        Ok(token)
    }

    /// トークンを検証し、契約とともに返す。
    ///
    /// - 存在しない: `None`
    /// - 期限切れ: そのトークンを削除して `None`
    /// - 契約が署名済み・終了・削除済み: 契約の全トークンを削除して `None`
    pub async fn validate(&self, value: &str) -> Result<Option<ValidatedToken>, CoreError> {
        let Some(token) = self.tokens.find_by_value(value).await? else {
            tracing::debug!(token = token_prefix(value), "トークンが存在しません");
            return Ok(None);
        };

        if token.is_expired_at(self.clock.now()) {
            self.tokens.delete_by_value(value).await?;
            tracing::debug!(
                token = token_prefix(value),
                expires_at = %token.expires_at,
                "期限切れのトークンを削除しました"
            );
            return Ok(None);
        }

        let contract = match self.contracts.find(token.contract_id).await? {
            Some(contract) if ContractStateGate::is_signable(&contract) => contract,
            Some(contract) => {
                let removed = self.invalidate_all(token.contract_id).await?;
                tracing::debug!(
                    contract_id = token.contract_id,
                    status = %contract.status,
                    removed,
                    "契約が署名可能でないためトークンを無効化しました"
                );
                return Ok(None);
            }
            None => {
                self.invalidate_all(token.contract_id).await?;
                tracing::debug!(
                    contract_id = token.contract_id,
                    "参照先の契約が存在しないためトークンを無効化しました"
                );
                return Ok(None);
            }
        };

        Ok(Some(ValidatedToken { token, contract }))
    }

    /// `validate` に加えて、トークンが `contract_id` の契約に属することを確認する。
    pub async fn validate_for_contract(
        &self,
        value: &str,
        contract_id: ContractId,
    ) -> Result<bool, CoreError> {
        let Some(token) = self.tokens.find_by_value(value).await? else {
            return Ok(false);
        };
        if token.contract_id != contract_id {
            tracing::debug!(
                token = token_prefix(value),
                contract_id,
                "トークンと契約IDが一致しません"
            );
            return Ok(false);
        }
        Ok(self.validate(value).await?.is_some())
    }

    /// 契約を参照するトークンをすべて削除し、削除件数を返す。
    pub async fn invalidate_all(&self, contract_id: ContractId) -> Result<u64, CoreError> {
        let removed = self.tokens.delete_by_contract_id(contract_id).await?;
        if removed > 0 {
            tracing::debug!(contract_id, removed, "契約のトークンを削除しました");
        }
        Ok(removed)
    }

    async fn load_contract(&self, contract_id: ContractId) -> Result<Contract, CoreError> {
        self.contracts
            .find(contract_id)
            .await?
            .ok_or_else(|| CoreError::from(RepositoryError::ContractNotFound(contract_id)))
    }
}
