//! # 署名位置テーブル
//!
//! 契約種別ごとの署名の貼り付け位置と幅。
//! 座標は下地画像の**左下**を原点とし、`width` は署名画像の表示幅（ピクセル）。
//!
//! | 契約種別 | x | y | width |
//! |---|---|---|---|
//! | 产品服务协议 | 440 | 1085 | 430 |
//! | 代理记账合同 | 464 | 1257 | 500 |
//! | 单项服务合同 | 430 | 1688 | 430 |
//! | その他 | 450 | 1200 | 430 |

/// 左下原点の署名アンカー。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub x: i64,
    pub y: i64,
    pub width: u32,
}

impl Anchor {
    /// 左下原点のアンカーを、合成に使う左上原点のオフセット `(x, top)` に変換する。
    ///
    /// `top = base_height - y - overlay_height`。画像範囲へのクランプはしない。
    pub fn top_left_offset(&self, base_height: u32, overlay_height: u32) -> (i64, i64) {
        let top = i64::from(base_height) - self.y - i64::from(overlay_height);
        (self.x, top)
    }
}

/// 種別ごとの行（先に一致したものを採用）。
pub const ANCHOR_TABLE: &[(&str, Anchor)] = &[
    ("产品服务协议", Anchor { x: 440, y: 1085, width: 430 }),
    ("代理记账合同", Anchor { x: 464, y: 1257, width: 500 }),
    ("单项服务合同", Anchor { x: 430, y: 1688, width: 430 }),
];

/// どの行にも一致しない場合の既定値。
pub const DEFAULT_ANCHOR: Anchor = Anchor {
    x: 450,
    y: 1200,
    width: 430,
};

/// 契約種別に対応するアンカーを返す。
pub fn anchor_for(contract_type: &str) -> Anchor {
    ANCHOR_TABLE
        .iter()
        .find(|(name, _)| *name == contract_type)
        .map(|(_, anchor)| *anchor)
        .unwrap_or(DEFAULT_ANCHOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types() {
        assert_eq!(anchor_for("产品服务协议"), Anchor { x: 440, y: 1085, width: 430 });
        assert_eq!(anchor_for("代理记账合同"), Anchor { x: 464, y: 1257, width: 500 });
        assert_eq!(anchor_for("单项服务合同"), Anchor { x: 430, y: 1688, width: 430 });
    }

    #[test]
    fn test_unknown_type_uses_default() {
        assert_eq!(anchor_for("其他"), DEFAULT_ANCHOR);
        assert_eq!(anchor_for(""), Anchor { x: 450, y: 1200, width: 430 });
    }

    #[test]
    fn test_bottom_left_to_top_left() {
        let anchor = anchor_for("代理记账合同");
        assert_eq!(anchor.top_left_offset(2000, 250), (464, 493));
    }

    #[test]
    fn test_offset_may_leave_canvas() {
        let anchor = anchor_for("单项服务合同");
        assert_eq!(anchor.top_left_offset(1000, 215), (430, -903));
    }

    #[test]
    fn test_table_has_unique_keys() {
        for (i, (name, _)) in ANCHOR_TABLE.iter().enumerate() {
            assert!(ANCHOR_TABLE[i + 1..].iter().all(|(other, _)| other != name));
        }
    }
}
