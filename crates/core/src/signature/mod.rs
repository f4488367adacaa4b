//! # 署名提出
//!
//! 署名者が提出した署名画像を契約書画像に合成し、契約を署名済みにする。
//!
//! ## 処理フロー
//! 1. トークンが対象契約に有効であることを確認する（署名済みなら `AlreadySigned`）
//! 2. 契約画像を確認する
//! 3. 署名画像と契約画像を作業ディレクトリへ取得する（並行、タイムアウト付き）
//! 4. 契約種別のアンカーに従って署名をリサイズし、左上原点に変換して合成する
//! 5. 合成画像をアップロードする（表示用の派生物）
//! 6. 契約を比較交換で `Signed` にし、元の署名URLと公開識別子を保存する
//! 7. 契約の全トークンを無効化する（失敗しても6は取り消さない）
//! 8. 作業ディレクトリを削除する（失敗はログと警告のみ）
//!
//! 6が失敗した場合はトークンを無効化せず、同じトークンで再試行できる。
//! そのときアップロード済みの合成画像は参照されないまま残る。

mod scratch;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use signlink_crypto::CodeSalt;
use signlink_types::{BlobHandle, Contract, ContractId, ContractStatus};

use crate::anchor::{anchor_for, Anchor};
use crate::blob::BlobStore;
use crate::codec::ImageCodec;
use crate::error::{CoreError, FetchTarget, RepositoryError};
use crate::gate::ContractStateGate;
use crate::repository::{ContractRepository, SignatureRecord, StatusTransition};
use crate::token::{token_prefix, TokenManager};

use scratch::ScratchSpace;

/// 外部ストレージ操作の既定タイムアウト。
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// 署名提出の設定。
#[derive(Debug, Clone)]
pub struct SignatureServiceConfig {
    /// ダウンロード・アップロードそれぞれの上限時間
    pub upstream_timeout: Duration,
    /// 作業ディレクトリの親（`None` ならシステムの一時ディレクトリ）
    pub scratch_root: Option<PathBuf>,
}

impl Default for SignatureServiceConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            scratch_root: None,
        }
    }
}

/// 結果を変えない後始末の失敗。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupWarning {
    /// 署名確定後のトークン一括無効化に失敗
    TokenInvalidation(String),
    /// 作業ディレクトリの削除に失敗
    Scratch(String),
}

/// 署名提出の結果。
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// 合成画像のURL
    pub composite_url: String,
    pub encrypted_code: String,
    /// 更新後の契約
    pub contract: Contract,
    pub warnings: Vec<CleanupWarning>,
}

/// トークン経由で参照する契約画像。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractImage {
    pub contract_id: ContractId,
    pub contract_type: String,
    pub image_url: String,
}

/// 公開識別子で参照する署名済み契約。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedContractImage {
    pub contract_id: ContractId,
    pub contract_type: String,
    pub image_url: String,
    pub signature_url: Option<String>,
}

/// 署名提出と、署名リンク経由の契約参照。
pub struct SignatureService {
    tokens: Arc<TokenManager>,
    contracts: Arc<dyn ContractRepository>,
    blobs: Arc<dyn BlobStore>,
    codec: ImageCodec,
    salt: CodeSalt,
    config: SignatureServiceConfig,
}

impl SignatureService {
    pub fn new(
        tokens: Arc<TokenManager>,
        contracts: Arc<dyn ContractRepository>,
        blobs: Arc<dyn BlobStore>,
        salt: CodeSalt,
        config: SignatureServiceConfig,
    ) -> Self {
        Self {
            tokens,
            contracts,
            blobs,
            codec: ImageCodec::default(),
            salt,
            config,
        }
    }

    /// 署名画像を提出して契約を署名済みにする。
    pub async fn submit(
        &self,
        contract_id: ContractId,
        token: &str,
        signature_url: &str,
    ) -> Result<SubmitOutcome, CoreError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "submit_signature",
            %request_id,
            contract_id,
            token = token_prefix(token)
        );
        async {
            let result = self
                .submit_inner(request_id, contract_id, token, signature_url)
                .await;
            match &result {
                Ok(outcome) => tracing::info!(
                    encrypted_code = %outcome.encrypted_code,
                    warnings = outcome.warnings.len(),
                    "署名を保存しました"
                ),
                Err(e) if e.is_client_error() => tracing::info!(error = %e, "署名提出を拒否しました"),
                Err(e) => tracing::error!(error = %e, "署名提出に失敗しました"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn submit_inner(
        &self,
        request_id: Uuid,
        contract_id: ContractId,
        token: &str,
        signature_url: &str,
    ) -> Result<SubmitOutcome, CoreError> {
        // Step 1: トークン検証
        if !self.tokens.validate_for_contract(token, contract_id).await? {
            // 署名確定でトークンが消えた後の再提出は競合として返す
            let signed = self
                .contracts
                .find(contract_id)
                .await?
                .is_some_and(|c| c.status == ContractStatus::Signed);
            if signed {
                return Err(CoreError::AlreadySigned(contract_id));
            }
            return Err(CoreError::TokenInvalid);
        }

        // Step 2: 契約と契約画像
        let contract = self
            .contracts
            .find(contract_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("契約 #{contract_id}")))?;
        if !ContractStateGate::is_signable(&contract) {
            self.tokens.invalidate_all(contract_id).await?;
            return Err(not_signable_error(contract_id, contract.status));
        }
        let image_handle = contract
            .contract_image
            .clone()
            .ok_or(CoreError::NoContractImage(contract_id))?;

        // Step 3: 作業ディレクトリへ取得
        let scratch = ScratchSpace::create(self.config.scratch_root.as_deref())
            .map_err(|e| CoreError::Internal(format!("作業ディレクトリの作成に失敗: {e}")))?;
        let contract_image_url = self.blobs.url_for(&image_handle);
        let (signature_bytes, contract_bytes) = tokio::try_join!(
            self.fetch(FetchTarget::Signature, signature_url),
            self.fetch(FetchTarget::ContractImage, &contract_image_url),
        )?;
        let signature_path = write_scratch(&scratch, "signature", &signature_bytes).await?;
        let contract_path = write_scratch(&scratch, "contract", &contract_bytes).await?;
        drop((signature_bytes, contract_bytes));

        // Step 4: 合成
        let anchor = anchor_for(&contract.contract_type);
        let output_path = scratch.path("composite");
        let codec = self.codec;
        let composite = tokio::task::spawn_blocking(move || {
            compose(codec, anchor, &signature_path, &contract_path, &output_path)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("合成タスクが異常終了しました: {e}")))??;

        // Step 5: 合成画像のアップロード
        let key = format!(
            "signatures/{contract_id}/{request_id}.{}",
            composite.extension
        );
        let composite_handle = self.upload(&key, composite.bytes, composite.mime).await?;

        // Step 6: 署名の確定（比較交換）
        let encrypted_code = self
            .salt
            .code_for(contract.contract_number.as_deref(), contract_id)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let signed = self
            .contracts
            .update_status_and_signature(
                contract_id,
                StatusTransition {
                    expected: ContractStatus::Unsigned,
                    next: ContractStatus::Signed,
                    signature: Some(SignatureRecord {
                        signature_url: signature_url.to_string(),
                        encrypted_code: encrypted_code.clone(),
                    }),
                },
            )
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict { current } => not_signable_error(contract_id, current),
                other => {
                    tracing::error!(
                        error = %other,
                        composite = %composite_handle,
                        "契約の署名状態を保存できませんでした"
                    );
                    CoreError::Repository(other)
                }
            })?;

        let mut warnings = Vec::new();

        // Step 7: トークンの一括無効化
        if let Err(e) = self.tokens.invalidate_all(contract_id).await {
            tracing::warn!(error = %e, "署名後のトークン無効化に失敗しました");
            warnings.push(CleanupWarning::TokenInvalidation(e.to_string()));
        }

        // Step 8: 作業ディレクトリの削除
        if let Err(e) = scratch.release() {
            tracing::warn!(error = %e, "作業ディレクトリの削除に失敗しました");
            warnings.push(CleanupWarning::Scratch(e.to_string()));
        }

        // Step 9
        Ok(SubmitOutcome {
            composite_url: self.blobs.url_for(&composite_handle),
            encrypted_code,
            contract: signed,
            warnings,
        })
    }

    /// トークンに紐づく契約画像のURLを返す。
    pub async fn contract_image(&self, token: &str) -> Result<ContractImage, CoreError> {
        let validated = self
            .tokens
            .validate(token)
            .await?
            .ok_or(CoreError::TokenInvalid)?;
        let contract = validated.contract;
        let handle = contract
            .contract_image
            .as_ref()
            .ok_or(CoreError::NoContractImage(contract.id))?;

        Ok(ContractImage {
            contract_id: contract.id,
            image_url: self.blobs.url_for(handle),
            contract_type: contract.contract_type,
        })
    }

    /// 公開識別子から署名済み契約の画像を引く。
    pub async fn image_by_encrypted_code(
        &self,
        encrypted_code: &str,
    ) -> Result<SignedContractImage, CoreError> {
        let not_found = || CoreError::NotFound(format!("公開識別子 {encrypted_code}"));
        let contract = self
            .contracts
            .find_by_encrypted_code(encrypted_code)
            .await?
            .filter(|c| c.status == ContractStatus::Signed)
            .ok_or_else(not_found)?;
        let handle: &BlobHandle = contract.contract_image.as_ref().ok_or_else(not_found)?;

        Ok(SignedContractImage {
            contract_id: contract.id,
            image_url: self.blobs.url_for(handle),
            contract_type: contract.contract_type.clone(),
            signature_url: contract.signature_url.clone(),
        })
    }

    /// 契約を終了し、トークンをすべて無効化する。
    ///
    /// 既に署名済み・終了の場合もトークンを削除したうえで `NotSignable` を返す。
    pub async fn terminate(&self, contract_id: ContractId) -> Result<Contract, CoreError> {
        let result = self
            .contracts
            .update_status_and_signature(
                contract_id,
                StatusTransition {
                    expected: ContractStatus::Unsigned,
                    next: ContractStatus::Terminated,
                    signature: None,
                },
            )
            .await;

        match result {
            Ok(contract) => {
                let removed = self.tokens.invalidate_all(contract_id).await?;
                tracing::info!(contract_id, removed, "契約を終了しました");
                Ok(contract)
            }
            Err(RepositoryError::Conflict { current }) => {
                self.tokens.invalidate_all(contract_id).await?;
                Err(CoreError::NotSignable { status: current })
            }
            Err(RepositoryError::ContractNotFound(id)) => {
                Err(CoreError::NotFound(format!("契約 #{id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, which: FetchTarget, url: &str) -> Result<Vec<u8>, CoreError> {
        tokio::time::timeout(self.config.upstream_timeout, self.blobs.download(url))
            .await
            .map_err(|_| {
                tracing::warn!(%which, "画像の取得がタイムアウトしました");
                CoreError::UpstreamTimeout
            })?
            .map_err(|e| CoreError::FetchFailed {
                which,
                reason: e.to_string(),
            })
    }

    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobHandle, CoreError> {
        tokio::time::timeout(
            self.config.upstream_timeout,
            self.blobs.upload(key, bytes, content_type),
        )
        .await
        .map_err(|_| CoreError::UpstreamTimeout)?
        .map_err(|e| CoreError::Storage(format!("合成画像のアップロードに失敗: {e}")))
    }
}

/// 状態遷移の競合をエラーに変換する。
fn not_signable_error(contract_id: ContractId, status: ContractStatus) -> CoreError {
    match status {
        ContractStatus::Signed => CoreError::AlreadySigned(contract_id),
        other => CoreError::NotSignable { status: other },
    }
}

async fn write_scratch(
    scratch: &ScratchSpace,
    name: &str,
    bytes: &[u8],
) -> Result<PathBuf, CoreError> {
    scratch
        .write(name, bytes)
        .await
        .map_err(|e| CoreError::Internal(format!("作業ファイル {name} の書き込みに失敗: {e}")))
}

/// 合成済み画像。
struct Composite {
    bytes: Vec<u8>,
    extension: &'static str,
    mime: &'static str,
}

/// 作業ファイルから署名を合成する（ブロッキング処理）。
fn compose(
    codec: ImageCodec,
    anchor: Anchor,
    signature_path: &Path,
    contract_path: &Path,
    output_path: &Path,
) -> Result<Composite, CoreError> {
    let read = |path: &Path| {
        std::fs::read(path)
            .map_err(|e| CoreError::Internal(format!("作業ファイルの読み込みに失敗: {e}")))
    };
    let signature = read(signature_path)?;
    let contract = read(contract_path)?;

    let resized = codec.resize_to_width(&signature, anchor.width)?;
    let (_, base_height) = codec.dimensions(&contract)?;
    let (offset_x, offset_top) = anchor.top_left_offset(base_height, resized.height);
    let bytes = codec.composite(&contract, &resized.bytes, offset_x, offset_top)?;

    std::fs::write(output_path, &bytes)
        .map_err(|e| CoreError::Internal(format!("合成結果の書き込みに失敗: {e}")))?;

    let format = image::guess_format(&bytes).ok();
    Ok(Composite {
        extension: format
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("bin"),
        mime: format
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream"),
        bytes,
    })
}
