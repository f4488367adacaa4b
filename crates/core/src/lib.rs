//! # Signlink Core
//!
//! 契約書の署名リンク（契約単位の一時トークン）と署名画像の合成を実装する。
//!
//! ## 構成
//! - [`token`]: トークンの発行・検証・一括無効化
//! - [`signature`]: 署名画像の取得・合成・アップロードと契約の署名確定
//! - [`reaper`]: 期限切れトークンの定期削除
//! - [`repository`] / [`blob`]: 永続化と画像ストレージの抽象化
//!
//! ## 不変条件
//! - 契約の `Unsigned` から `Signed` への遷移は高々1回（比較交換で保証）
//! - 有効期限内のトークンは `Unsigned` の契約だけを参照する

pub mod anchor;
pub mod blob;
pub mod clock;
pub mod codec;
pub mod error;
pub mod gate;
pub mod reaper;
pub mod repository;
pub mod signature;
pub mod token;

pub use anchor::{anchor_for, Anchor};
pub use blob::{BlobStore, MemoryBlobStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::ImageCodec;
pub use error::{BlobError, CoreError, FetchTarget, ImageError, RepositoryError};
pub use gate::ContractStateGate;
pub use reaper::{ExpiredTokenReaper, Scheduler, TokioScheduler};
pub use repository::{
    ContractRepository, MemoryContractRepository, MemoryTokenRepository, TokenRepository,
};
pub use signature::{
    CleanupWarning, ContractImage, SignatureService, SignatureServiceConfig, SignedContractImage,
    SubmitOutcome,
};
pub use token::{TokenManager, ValidatedToken};
