//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 環境変数は起動時に一度だけ読み、各コンポーネントには構築時に渡す。

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use signlink_core::{SignatureService, TokenManager};
use signlink_crypto::CodeSalt;

/// 署名画像・契約画像のダウンロード上限の既定値（20 MiB）
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// 環境変数から読み込んだGateway設定。
pub struct GatewayConfig {
    pub bind_addr: String,
    /// 公開識別子（encryptedCode）のHMAC鍵
    pub code_salt: CodeSalt,
    pub token_ttl_minutes: u32,
    pub reaper_interval: Duration,
    /// ダウンロード・アップロード各段階のタイムアウト
    pub upstream_timeout: Duration,
    pub scratch_dir: Option<PathBuf>,
    pub max_image_bytes: u64,
    /// 起動時にメモリ内リポジトリへ投入する契約（JSON配列）
    pub contracts_seed_path: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let code_salt = match std::env::var("SIGNATURE_CODE_SALT") {
            Ok(secret) => CodeSalt::new(secret.as_bytes())
                .context("SIGNATURE_CODE_SALTが不正です")?,
            Err(_) => {
                // 開発環境用: 再起動のたびに公開識別子が変わる
                tracing::warn!(
                    "SIGNATURE_CODE_SALTが未設定です。ランダムな鍵を生成します（開発環境用）"
                );
                CodeSalt::generate()
            }
        };

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            code_salt,
            token_ttl_minutes: env_or("TOKEN_TTL_MINUTES", 30)?,
            reaper_interval: Duration::from_secs(env_or("REAPER_INTERVAL_SECS", 300)?),
            upstream_timeout: Duration::from_secs(env_or("UPSTREAM_TIMEOUT_SECS", 30)?),
            scratch_dir: std::env::var("SCRATCH_DIR").ok().map(PathBuf::from),
            max_image_bytes: env_or("MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES)?,
            contracts_seed_path: std::env::var("CONTRACTS_SEED_PATH").ok().map(PathBuf::from),
        })
    }
}

/// 環境変数を読み、未設定なら `default` を返す。値が解釈できなければエラー。
fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_setting(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_setting<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{name}の値 {raw:?} を解釈できません: {e}"))
}

/// Gatewayの共有状態。
pub struct GatewayState {
    pub tokens: Arc<TokenManager>,
    pub signatures: Arc<SignatureService>,
    /// `GET /contract-token` で発行するトークンの有効期間（分）
    pub token_ttl_minutes: u32,
}
