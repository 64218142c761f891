//! JPEG encoding of relayed frames.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;
use std::io::Cursor;
use thiserror::Error;

/// Prefix of the data URI carrying one encoded frame.
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Frame has no pixels")]
    EmptyFrame,

    #[error("JPEG encoding failed: {0}")]
    Jpeg(String),
}

/// Encode an RGB image as JPEG.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(EncodeError::EmptyFrame);
    }

    let mut buffer = Cursor::new(Vec::new());
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .encode(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| EncodeError::Jpeg(e.to_string()))?;

    Ok(buffer.into_inner())
}

/// Encode a frame as a base64 JPEG data URI.
pub fn encode_frame(img: &RgbImage, quality: u8) -> Result<String, EncodeError> {
    let jpeg = encode_jpeg(img, quality)?;
    let mut uri = String::with_capacity(JPEG_DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    uri.push_str(JPEG_DATA_URI_PREFIX);
    STANDARD.encode_string(&jpeg, &mut uri);
    Ok(uri)
}
