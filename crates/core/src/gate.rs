//! # 契約状態ゲート
//!
//! トークンの発行・検証・署名提出のすべての信頼境界で、
//! 契約が署名可能な状態かどうかをこの述語で再確認する。

use signlink_types::{Contract, ContractStatus};

/// 契約ステータスに対する純粋な述語。
pub struct ContractStateGate;

impl ContractStateGate {
    /// `Unsigned` のときだけ署名可能。
    pub fn is_signable(contract: &Contract) -> bool {
        Self::status_is_signable(contract.status)
    }

    pub fn status_is_signable(status: ContractStatus) -> bool {
        status == ContractStatus::Unsigned
    }
}
