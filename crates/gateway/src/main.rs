//! # Signlink Gateway
//!
//! 契約書の署名リンクを扱うHTTPゲートウェイ。
//!
//! ## 役割
//! - 契約単位の一時トークン（署名リンク）の発行・検証
//! - 署名画像の受付と契約画像への合成
//! - 期限切れトークンの定期削除
//!
//! ## API エンドポイント
//! - `GET /contract-token?id={contractId}`: トークン発行
//! - `GET /contract-token/validate/{token}`: トークン検証
//! - `GET /contract-token/image`: トークン経由の契約画像
//! - `POST /contract-token/signature`: 署名提出
//! - `GET /contract/get-image/{encryptedCode}`: 署名済み契約の公開参照

mod config;
mod endpoints;
mod error;
mod extract;
mod storage;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use signlink_core::{
    BlobStore, Clock, ExpiredTokenReaper, MemoryContractRepository, MemoryTokenRepository,
    SignatureService, SignatureServiceConfig, SystemClock, TokenManager, TokioScheduler,
};
use signlink_types::Contract;

use config::{GatewayConfig, GatewayState};
use endpoints::*;

/// ルーターを構築する。
fn router(state: Arc<GatewayState>) -> axum::Router {
    axum::Router::new()
        .route("/contract-token", get(handle_issue_token))
        .route("/contract-token/validate/{token}", get(handle_validate_token))
        .route("/contract-token/image", get(handle_contract_image))
        .route("/contract-token/signature", post(handle_save_signature))
        .route("/contract/get-image/{encrypted_code}", get(handle_signed_image))
        .with_state(state)
}

/// 契約の初期データをJSON配列から読み込む。
fn load_seed_contracts(path: &Path) -> anyhow::Result<Vec<Contract>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("契約データ {} を読み込めません", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("契約データ {} を解釈できません", path.display()))
}

#[cfg(feature = "vendor-aws")]
fn blob_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    let fetcher = storage::HttpFetcher::new(reqwest::Client::new(), config.max_image_bytes);
    Ok(Arc::new(storage::S3BlobStore::from_env(fetcher)?))
}

#[cfg(not(feature = "vendor-aws"))]
fn blob_store(_config: &GatewayConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    tracing::warn!("S3ストレージが無効です。メモリ内ストレージを使用します（開発環境用）");
    Ok(Arc::new(signlink_core::MemoryBlobStore::new(
        "http://localhost:3000/blobs",
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    // 永続化（メモリ内リポジトリ）
    let contracts = match &config.contracts_seed_path {
        Some(path) => {
            let seed = load_seed_contracts(path)?;
            tracing::info!(count = seed.len(), path = %path.display(), "契約データを読み込みました");
            MemoryContractRepository::with_contracts(seed)
        }
        None => MemoryContractRepository::new(),
    };
    let contracts = Arc::new(contracts);
    let tokens = Arc::new(MemoryTokenRepository::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let manager = Arc::new(TokenManager::new(
        tokens.clone(),
        contracts.clone(),
        clock.clone(),
    ));
    let signatures = Arc::new(SignatureService::new(
        manager.clone(),
        contracts,
        blob_store(&config)?,
        config.code_salt.clone(),
        SignatureServiceConfig {
            upstream_timeout: config.upstream_timeout,
            scratch_root: config.scratch_dir.clone(),
        },
    ));

    // 期限切れトークンの定期削除
    let scheduler = TokioScheduler::new();
    Arc::new(ExpiredTokenReaper::new(tokens, clock)).schedule(&scheduler, config.reaper_interval);

    let state = Arc::new(GatewayState {
        tokens: manager,
        signatures,
        token_ttl_minutes: config.token_ttl_minutes,
    });

    tracing::info!("Gatewayを {} で起動します", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, router(state)).await?;

    scheduler.shutdown();
    Ok(())
}
