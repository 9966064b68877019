//! Recover the real container format and pixel size from image bytes.
//!
//! Only the header is decoded. Failure is an ordinary outcome: callers leave
//! the labels unset instead of guessing.

use crate::models::image::{ImageKind, ImageMetadata};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Sniff `bytes`. Returns `None` when the payload is not a readable image.
pub fn detect(bytes: &[u8]) -> Option<ImageMetadata> {
    if bytes.is_empty() {
        return None;
    }

    let reader = match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(reader) => reader,
        Err(err) => {
            debug!(error = %err, "image format guess failed");
            return None;
        }
    };

    let format = reader.format().map(kind_of).unwrap_or(ImageKind::Unknown);
    match reader.into_dimensions() {
        Ok((width, height)) => Some(ImageMetadata {
            format,
            width,
            height,
        }),
        Err(err) => {
            debug!(error = %err, "image header could not be read");
            None
        }
    }
}

fn kind_of(format: ImageFormat) -> ImageKind {
    match format {
        ImageFormat::Png => ImageKind::Png,
        ImageFormat::Jpeg => ImageKind::Jpeg,
        ImageFormat::Gif => ImageKind::Gif,
        ImageFormat::WebP => ImageKind::WebP,
        _ => ImageKind::Unknown,
    }
}

pub(crate) fn image_format_of(kind: ImageKind) -> Option<ImageFormat> {
    match kind {
        ImageKind::Png => Some(ImageFormat::Png),
        ImageKind::Jpeg => Some(ImageFormat::Jpeg),
        ImageKind::Gif => Some(ImageFormat::Gif),
        ImageKind::WebP => Some(ImageFormat::WebP),
        ImageKind::Unknown => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    pub(crate) fn encode(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([73, 109, 137]),
        ));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, format).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn detects_png_dimensions() {
        let bytes = encode(ImageFormat::Png, 10, 10);
        let meta = detect(&bytes).unwrap();
        assert_eq!(meta.format, ImageKind::Png);
        assert_eq!(meta.format.label(), "PNG");
        assert_eq!(meta.dimensions_label(), "10 x 10 px");
    }

    #[test]
    fn detects_jpeg_and_gif() {
        let jpeg = detect(&encode(ImageFormat::Jpeg, 1024, 768)).unwrap();
        assert_eq!(jpeg.format, ImageKind::Jpeg);
        assert_eq!(jpeg.dimensions_label(), "1024 x 768 px");

        let gif = detect(&encode(ImageFormat::Gif, 512, 512)).unwrap();
        assert_eq!(gif.format, ImageKind::Gif);
        assert_eq!((gif.width, gif.height), (512, 512));
    }

    #[test]
    fn detection_is_deterministic() {
        let bytes = encode(ImageFormat::Png, 37, 21);
        let first = detect(&bytes);
        assert!(first.is_some());
        for _ in 0..3 {
            assert_eq!(detect(&bytes), first);
        }
    }

    #[test]
    fn garbage_is_undetected() {
        assert_eq!(detect(b""), None);
        assert_eq!(detect(b"definitely not an image"), None);
        // truncated PNG: valid signature, no header
        assert_eq!(detect(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]), None);
    }
}
