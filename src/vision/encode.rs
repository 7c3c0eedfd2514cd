//! JPEG + base64 encoding of captured frames for request embedding.

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

/// Compress a frame to JPEG at the given quality and base64-encode the bytes.
///
/// The returned string is the bare base64 payload; wrap it with [`data_uri`]
/// before embedding it in a chat request.
pub fn encode_jpeg_base64(frame: &RgbImage, quality: u8) -> Result<String> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder.encode_image(frame).context("JPEG encoding failed")?;
    Ok(BASE64.encode(&jpeg))
}

/// Wrap a base64 JPEG payload as an inline image URI.
pub fn data_uri(base64_jpeg: &str) -> String {
    format!("data:image/jpeg;base64,{base64_jpeg}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_produces_jpeg_bytes() {
        let frame = RgbImage::from_pixel(8, 8, image::Rgb([120, 30, 200]));
        let encoded = encode_jpeg_base64(&frame, 80).unwrap();

        let bytes = BASE64.decode(encoded.as_bytes()).unwrap();
        // JPEG start-of-image marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_data_uri_prefix() {
        let uri = data_uri("QUJD");
        assert_eq!(uri, "data:image/jpeg;base64,QUJD");
    }
}
