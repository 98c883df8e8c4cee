//! Image encoding for both model calls.
//!
//! * Page renders for the structuring call are PNG (lossless; small print in
//!   price tables must stay legible) with `detail: "high"`.
//! * Candidate thumbnails are JPEG data-URIs with the long edge capped. They
//!   are what a record finally carries as `selectedImage`, and what the
//!   selection call sees.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";
const THUMBNAIL_QUALITY: u8 = 80;

/// Encode a rasterised page as a base64 PNG ready for the model API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Shrink `img` so its long edge is at most `max_edge`, then JPEG-encode it
/// as a data-URI.
///
/// Aspect ratio is preserved and images already within bounds keep their
/// size; nothing is ever upscaled.
pub fn encode_thumbnail(img: &DynamicImage, max_edge: u32) -> Result<String, image::ImageError> {
    let resized;
    let img = if img.width() > max_edge || img.height() > max_edge {
        resized = img.resize(max_edge, max_edge, image::imageops::FilterType::Triangle);
        &resized
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, THUMBNAIL_QUALITY).encode_image(&rgb)?;
    Ok(format!("{JPEG_DATA_URI_PREFIX}{}", STANDARD.encode(&buf)))
}

/// Split a `data:<mime>;base64,<payload>` URI into its MIME type and bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URI has no payload".to_string())?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| "data URI is not base64-encoded".to_string())?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64: {e}"))?;
    Ok((mime.to_string(), bytes))
}

/// Turn a thumbnail data-URI into an image attachment for the model.
///
/// The payload is reused as-is; only the prefix is stripped.
pub fn data_uri_to_image_data(uri: &str) -> Option<ImageData> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some(ImageData::new(payload.to_string(), mime))
}
