//! # Signlink 暗号処理
//!
//! 署名リンクで使う乱数トークンと、署名済み契約の公開識別子（encryptedCode）を扱う。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | トークン値 | OS乱数 32バイト（hex 64文字） |
//! | 公開識別子 | HMAC-SHA256 先頭16 hex（大文字） |

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// トークン値の乱数バイト長（256ビット）。
pub const TOKEN_BYTES: usize = 32;

/// 公開識別子のhex文字数。
pub const CODE_HEX_LEN: usize = 16;

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// HMAC鍵（salt）が空
    #[error("HMAC鍵が空です")]
    EmptySalt,
    /// HMAC鍵の長さが不正
    #[error("HMAC鍵の長さが不正です")]
    InvalidKeyLength,
}

/// 不透明なトークン値を生成する。
///
/// OS乱数から32バイトを取り、小文字hexで返す（64文字）。
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// encryptedCode 導出用のプロセス共通salt。
///
/// 起動時に一度だけ構築し、以後変更しない。
#[derive(Clone)]
pub struct CodeSalt {
    key: Vec<u8>,
}

impl CodeSalt {
    /// 設定値の秘密文字列からsaltを構築する。
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CryptoError> {
        let key = secret.as_ref().to_vec();
        if key.is_empty() {
            return Err(CryptoError::EmptySalt);
        }
        Ok(Self { key })
    }

    /// 開発環境用: ランダムなsaltを生成する。
    /// 再起動するとencryptedCodeの値が変わる。
    pub fn generate() -> Self {
        let mut key = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// 契約番号と契約IDから公開識別子を導出する。
    ///
    /// `HMAC-SHA256(salt, contract_number + contract_id)` の先頭16 hexを大文字化したもの。
    /// 契約番号がない場合は空文字列として連結する。
    pub fn code_for(
        &self,
        contract_number: Option<&str>,
        contract_id: u64,
    ) -> Result<String, CryptoError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| CryptoError::InvalidKeyLength)?;
        let message = format!("{}{}", contract_number.unwrap_or(""), contract_id);
        mac.update(message.as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(digest[..CODE_HEX_LEN].to_ascii_uppercase())
    }
}

impl std::fmt::Debug for CodeSalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeSalt").field("key", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_value_shape() {
        let a = generate_token_value();
        let b = generate_token_value();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_code_is_deterministic() {
        let salt = CodeSalt::new("unit-test-salt").unwrap();
        let first = salt.code_for(Some("2024060100001"), 42).unwrap();
        let second = salt.code_for(Some("2024060100001"), 42).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), CODE_HEX_LEN);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_code_matches_manual_hmac() {
        let salt = CodeSalt::new("unit-test-salt").unwrap();
        let mut mac = HmacSha256::new_from_slice(b"unit-test-salt").unwrap();
        mac.update(b"202406010000142");
        let expected = hex::encode(mac.finalize().into_bytes())[..16].to_ascii_uppercase();
        assert_eq!(salt.code_for(Some("2024060100001"), 42).unwrap(), expected);
    }

    #[test]
    fn test_code_changes_with_inputs() {
        let salt = CodeSalt::new("unit-test-salt").unwrap();
        let base = salt.code_for(Some("2024060100001"), 42).unwrap();
        assert_ne!(base, salt.code_for(Some("2024060100002"), 42).unwrap());
        assert_ne!(base, salt.code_for(Some("2024060100001"), 43).unwrap());

        let other_salt = CodeSalt::new("another-salt").unwrap();
        assert_ne!(base, other_salt.code_for(Some("2024060100001"), 42).unwrap());
    }

    #[test]
    fn test_missing_contract_number_is_empty_prefix() {
        let salt = CodeSalt::new("unit-test-salt").unwrap();
        assert_eq!(
            salt.code_for(None, 42).unwrap(),
            salt.code_for(Some(""), 42).unwrap()
        );
    }

    #[test]
    fn test_empty_salt_rejected() {
        assert!(matches!(CodeSalt::new(""), Err(CryptoError::EmptySalt)));
    }
}
