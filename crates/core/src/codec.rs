//! # 画像コーデック
//!
//! 署名画像の合成に必要な3つの操作を提供する。
//! - 寸法の取得
//! - 幅指定のリサイズ（縦横比を保った高さを整数演算で算出し、その寸法に厳密に合わせる）
//! - 左上原点のピクセル座標への重ね合わせ（出力は下地画像と同じ形式）
//!
//! 入力・出力ともに画素数の上限 [`DEFAULT_MAX_PIXELS`] を超える画像は扱わない。
//! 圧縮率の高い細長い画像でも、デコードやリサイズの前に寸法で弾く。

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, Limits};

use crate::error::ImageError;

/// リサイズ結果。
#[derive(Debug, Clone)]
pub struct ResizedImage {
    /// PNGでエンコードされた画像（透過を保持する）
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// 目標幅に対する高さを求める。
///
/// `round(target_width * native_height / native_width)`（0.5は切り上げ）を
/// 整数演算のみで計算する。
pub fn scaled_height(
    native_width: u32,
    native_height: u32,
    target_width: u32,
) -> Result<u32, ImageError> {
    if native_width == 0 || native_height == 0 {
        return Err(ImageError::InvalidDimensions(format!(
            "元画像が {native_width}x{native_height} です"
        )));
    }
    if target_width == 0 {
        return Err(ImageError::InvalidDimensions("目標幅が0です".into()));
    }

    let too_large =
        || ImageError::InvalidDimensions(format!("幅 {target_width} に対する高さが大きすぎます"));
    let numerator = u64::from(target_width)
        .checked_mul(u64::from(native_height))
        .and_then(|n| n.checked_mul(2))
        .and_then(|n| n.checked_add(u64::from(native_width)))
        .ok_or_else(too_large)?;
    let height = numerator / (2 * u64::from(native_width));
    if height == 0 {
        return Err(ImageError::InvalidDimensions(format!(
            "幅 {target_width} に縮小すると高さが0になります ({native_width}x{native_height})"
        )));
    }
    u32::try_from(height)
        .map_err(|_| ImageError::InvalidDimensions(format!("高さ {height} が大きすぎます")))
}

/// 1枚あたりの画素数の上限（A4を300dpiで取り込んだ画像の4倍程度）。
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// デコード時の1画素あたりの最大バイト数（16bit RGBA）
const MAX_BYTES_PER_PIXEL: u64 = 8;

/// 画像の寸法取得・リサイズ・合成。
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    filter: FilterType,
    max_pixels: u64,
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::new(FilterType::Lanczos3)
    }
}

impl ImageCodec {
    pub fn new(filter: FilterType) -> Self {
        Self {
            filter,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    /// 画素数の上限を変更する。
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// ヘッダだけを読んで `(width, height)` を返す。
    pub fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| ImageError::Decode(e.to_string()))
    }

    /// 幅 `target_width` にリサイズする。拡大も許可する。
    ///
    /// 高さは [`scaled_height`] で決め、その寸法ちょうどに伸縮する（余白は付けない）。
    /// 元画像かリサイズ後の画素数が上限を超える場合はデコードせずに失敗する。
    pub fn resize_to_width(
        &self,
        bytes: &[u8],
        target_width: u32,
    ) -> Result<ResizedImage, ImageError> {
        let (native_width, native_height) = self.dimensions(bytes)?;
        let height = scaled_height(native_width, native_height, target_width)?;
        self.check_pixels(native_width, native_height)?;
        self.check_pixels(target_width, height)?;

        let source = self.decode(bytes)?;
        let resized = source.resize_exact(target_width, height, self.filter);

        Ok(ResizedImage {
            bytes: encode(&resized, ImageFormat::Png)?,
            width: target_width,
            height,
        })
    }

    /// `overlay` を `base` に重ねる。
    ///
    /// `(offset_x, offset_top)` は下地の左上を原点としたピクセル座標で、
    /// 重ねる画像の左上がその位置に来る。範囲外にはみ出した部分は切り捨てる。
    pub fn composite(
        &self,
        base: &[u8],
        overlay: &[u8],
        offset_x: i64,
        offset_top: i64,
    ) -> Result<Vec<u8>, ImageError> {
        let format =
            image::guess_format(base).map_err(|e| ImageError::Decode(e.to_string()))?;
        let mut canvas = self.decode(base)?.to_rgba8();
        let top = self.decode(overlay)?.to_rgba8();

        imageops::overlay(&mut canvas, &top, offset_x, offset_top);

        encode(&DynamicImage::ImageRgba8(canvas), format)
    }

    fn check_pixels(&self, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.max_pixels {
            return Err(ImageError::InvalidDimensions(format!(
                "{width}x{height} は上限 {} 画素を超えています",
                self.max_pixels
            )));
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, ImageError> {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_pixels.saturating_mul(MAX_BYTES_PER_PIXEL));

        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        reader.limits(limits);
        reader
            .decode()
            .map_err(|e| ImageError::Decode(e.to_string()))
    }
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    // JPEGはアルファチャンネルを持てない
    let result = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut Cursor::new(&mut out), format)
    } else {
        img.write_to(&mut Cursor::new(&mut out), format)
    };
    result.map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(out)
}
