//! # Core エラー型
//!
//! 署名リンクサブシステム全体で共通のエラー型。
//! 下位の永続化・BlobStore・画像処理のエラーは個別の列挙型で表し、
//! `CoreError` へ変換してから呼び出し側へ返す。

use signlink_types::{ContractId, ContractStatus};

/// 永続化層のエラー。
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// 対象の契約が存在しない
    #[error("契約 #{0} が存在しません")]
    ContractNotFound(ContractId),
    /// 比較交換に失敗（他の書き込みが先に状態を遷移させた）
    #[error("契約の状態が競合しました: 現在の状態は {current}")]
    Conflict {
        /// 書き込み時点の実際の状態
        current: ContractStatus,
    },
    /// 終端状態からの遷移、または未署名への遷移
    #[error("不正な状態遷移: {from} -> {to}")]
    InvalidTransition {
        from: ContractStatus,
        to: ContractStatus,
    },
    /// トークン値の重複
    #[error("トークン値が重複しています")]
    DuplicateToken,
    /// バックエンド固有の失敗
    #[error("永続化に失敗: {0}")]
    Backend(String),
}

/// BlobStore のエラー。
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// 指定URL・ハンドルのオブジェクトが存在しない
    #[error("オブジェクトが見つかりません: {0}")]
    NotFound(String),
    /// サイズ上限超過
    #[error("オブジェクトのサイズが上限を超えています: {size} bytes (上限: {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
    /// 通信・バックエンドの失敗
    #[error("ストレージ通信に失敗: {0}")]
    Transport(String),
}

/// 画像処理のエラー。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// デコード不能（破損・未対応形式）
    #[error("画像のデコードに失敗: {0}")]
    Decode(String),
    /// エンコード失敗
    #[error("画像のエンコードに失敗: {0}")]
    Encode(String),
    /// 寸法が不正（幅0など）
    #[error("画像の寸法が不正です: {0}")]
    InvalidDimensions(String),
}

/// ダウンロード対象の区別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    /// 署名者が提出した署名画像
    Signature,
    /// 契約書スキャン画像
    ContractImage,
}

impl std::fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchTarget::Signature => f.write_str("署名画像"),
            FetchTarget::ContractImage => f.write_str("契約画像"),
        }
    }
}

/// Coreエラー型。
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// トークンまたは契約が存在しない
    #[error("見つかりません: {0}")]
    NotFound(String),
    /// 署名できない状態の契約に対するトークン発行
    #[error("契約は{status}状態のため署名リンクを発行できません")]
    NotSignable { status: ContractStatus },
    /// トークンが無効（期限切れ・契約不一致・状態変化）
    #[error("署名リンクが無効です")]
    TokenInvalid,
    /// 契約画像が登録されていない
    #[error("契約 #{0} に画像がありません")]
    NoContractImage(ContractId),
    /// 画像の取得に失敗
    #[error("{which}の取得に失敗: {reason}")]
    FetchFailed { which: FetchTarget, reason: String },
    /// BlobStore の応答がタイムアウト
    #[error("外部ストレージの応答がタイムアウトしました")]
    UpstreamTimeout,
    /// 合成処理の失敗（破損画像など）
    #[error("署名画像の合成に失敗: {0}")]
    Compositing(#[from] ImageError),
    /// 署名の競合に敗れた
    #[error("契約 #{0} は既に署名されています")]
    AlreadySigned(ContractId),
    /// 永続化エラー
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// ストレージ（アップロード・URL解決）エラー
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl CoreError {
    /// 呼び出し側（クライアント）に起因するエラーかどうか。
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            CoreError::Repository(_) | CoreError::Storage(_) | CoreError::Internal(_)
        )
    }
}
