//! # メモリ内リポジトリ
//!
//! `tokio::sync::RwLock` で保護したハッシュマップによる実装。
//! 契約ステータスの比較交換は書き込みロック内で読み直してから行う。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use signlink_types::{Contract, ContractId, ContractStatus, Token};

use super::{ContractRepository, StatusTransition, TokenRepository};
use crate::error::RepositoryError;

/// メモリ内の契約ストア。
#[derive(Default)]
pub struct MemoryContractRepository {
    contracts: RwLock<HashMap<ContractId, Contract>>,
}

impl MemoryContractRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期データを投入して構築する。
    pub fn with_contracts(contracts: impl IntoIterator<Item = Contract>) -> Self {
        Self {
            contracts: RwLock::new(contracts.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    /// 契約を登録・置換する（CRUDモジュール側の書き込みに相当）。
    pub async fn upsert(&self, contract: Contract) {
        self.contracts.write().await.insert(contract.id, contract);
    }

    pub async fn len(&self) -> usize {
        self.contracts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contracts.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ContractRepository for MemoryContractRepository {
    async fn find(&self, id: ContractId) -> Result<Option<Contract>, RepositoryError> {
        Ok(self.contracts.read().await.get(&id).cloned())
    }

    async fn find_by_encrypted_code(
        &self,
        encrypted_code: &str,
    ) -> Result<Option<Contract>, RepositoryError> {
        Ok(self
            .contracts
            .read()
            .await
            .values()
            .find(|c| c.encrypted_code.as_deref() == Some(encrypted_code))
            .cloned())
    }

    async fn update_status_and_signature(
        &self,
        id: ContractId,
        transition: StatusTransition,
    ) -> Result<Contract, RepositoryError> {
        if transition.next == ContractStatus::Unsigned || transition.expected.is_terminal() {
            return Err(RepositoryError::InvalidTransition {
                from: transition.expected,
                to: transition.next,
            });
        }

        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&id)
            .ok_or(RepositoryError::ContractNotFound(id))?;

        if contract.status != transition.expected {
            return Err(RepositoryError::Conflict {
                current: contract.status,
            });
        }

        contract.status = transition.next;
        if let Some(signature) = transition.signature {
            contract.signature_url = Some(signature.signature_url);
            contract.encrypted_code = Some(signature.encrypted_code);
        }
        Ok(contract.clone())
    }
}

/// メモリ内のトークンストア。キーはトークン値。
#[derive(Default)]
pub struct MemoryTokenRepository {
    tokens: RwLock<HashMap<String, Token>>,
}

impl MemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定契約を参照しているトークン数。
    pub async fn count_for_contract(&self, contract_id: ContractId) -> usize {
        self.tokens
            .read()
            .await
            .values()
            .filter(|t| t.contract_id == contract_id)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn insert(&self, token: Token) -> Result<(), RepositoryError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.value) {
            return Err(RepositoryError::DuplicateToken);
        }
        tokens.insert(token.value.clone(), token);
        Ok(())
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<Token>, RepositoryError> {
        Ok(self.tokens.read().await.get(value).cloned())
    }

    async fn delete_by_value(&self, value: &str) -> Result<u64, RepositoryError> {
        Ok(self.tokens.write().await.remove(value).map_or(0, |_| 1))
    }

    async fn delete_by_contract_id(
        &self,
        contract_id: ContractId,
    ) -> Result<u64, RepositoryError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.contract_id != contract_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_expired_before(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= now);
        Ok((before - tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SignatureRecord;
    use chrono::Duration;

    fn unsigned(id: ContractId) -> Contract {
        Contract {
            id,
            status: ContractStatus::Unsigned,
            contract_type: "产品服务协议".to_string(),
            contract_image: None,
            signature_url: None,
            contract_number: Some(format!("NO-{id}")),
            encrypted_code: None,
        }
    }

    fn token(value: &str, contract_id: ContractId, expires_at: DateTime<Utc>) -> Token {
        Token {
            value: value.to_string(),
            contract_id,
            created_at: expires_at - Duration::minutes(30),
            expires_at,
        }
    }

    fn sign(url: &str) -> StatusTransition {
        StatusTransition {
            expected: ContractStatus::Unsigned,
            next: ContractStatus::Signed,
            signature: Some(SignatureRecord {
                signature_url: url.to_string(),
                encrypted_code: "ABCDEF0123456789".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_compare_and_set_succeeds_once() {
        let repo = MemoryContractRepository::with_contracts([unsigned(1)]);

        let signed = repo.update_status_and_signature(1, sign("http://a")).await.unwrap();
        assert_eq!(signed.status, ContractStatus::Signed);
        assert_eq!(signed.signature_url.as_deref(), Some("http://a"));

        let err = repo.update_status_and_signature(1, sign("http://b")).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Conflict {
                current: ContractStatus::Signed
            }
        ));

        let stored = repo.find(1).await.unwrap().unwrap();
        assert_eq!(stored.signature_url.as_deref(), Some("http://a"));
    }

    #[tokio::test]
    async fn test_transition_never_returns_to_unsigned() {
        let repo = MemoryContractRepository::with_contracts([unsigned(1)]);
        let err = repo
            .update_status_and_signature(
                1,
                StatusTransition {
                    expected: ContractStatus::Signed,
                    next: ContractStatus::Unsigned,
                    signature: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_missing_contract() {
        let repo = MemoryContractRepository::new();
        let err = repo.update_status_and_signature(9, sign("http://a")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ContractNotFound(9)));
        assert!(repo.find(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_encrypted_code() {
        let repo = MemoryContractRepository::with_contracts([unsigned(1), unsigned(2)]);
        repo.update_status_and_signature(2, sign("http://a")).await.unwrap();
        let found = repo.find_by_encrypted_code("ABCDEF0123456789").await.unwrap().unwrap();
        assert_eq!(found.id, 2);
        assert!(repo.find_by_encrypted_code("0000000000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_deletes_are_idempotent() {
        let repo = MemoryTokenRepository::new();
        let expiry = Utc::now() + Duration::minutes(30);
        repo.insert(token("a", 1, expiry)).await.unwrap();
        repo.insert(token("b", 1, expiry)).await.unwrap();
        repo.insert(token("c", 2, expiry)).await.unwrap();

        assert!(matches!(
            repo.insert(token("a", 3, expiry)).await,
            Err(RepositoryError::DuplicateToken)
        ));

        assert_eq!(repo.delete_by_contract_id(1).await.unwrap(), 2);
        assert_eq!(repo.delete_by_contract_id(1).await.unwrap(), 0);
        assert_eq!(repo.delete_by_value("c").await.unwrap(), 1);
        assert_eq!(repo.delete_by_value("c").await.unwrap(), 0);
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_expired_before_is_strict() {
        let repo = MemoryTokenRepository::new();
        let now = Utc::now();
        repo.insert(token("past", 1, now - Duration::seconds(1))).await.unwrap();
        repo.insert(token("exact", 1, now)).await.unwrap();
        repo.insert(token("future", 2, now + Duration::minutes(5))).await.unwrap();

        assert_eq!(repo.delete_expired_before(now).await.unwrap(), 1);
        assert!(repo.find_by_value("past").await.unwrap().is_none());
        assert!(repo.find_by_value("exact").await.unwrap().is_some());
        assert_eq!(repo.count_for_contract(2).await, 1);
    }
}
