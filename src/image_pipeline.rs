//! Cover image decoding and downscaling to the buffer resolution.

use std::fs;
use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbaImage};
use log::debug;
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

/// Decodes with `image`, retrying slightly broken JPEGs with a lenient decoder.
pub fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

pub fn decode_image_from_path_with_fallback(path: &Path) -> Option<DynamicImage> {
    image::open(path).ok().or_else(|| {
        let bytes = fs::read(path).ok()?;
        decode_image_from_memory_with_fallback(&bytes)
    })
}

/// Largest size with the same aspect ratio whose longest edge is at most
/// `max_edge`. Images already small enough keep their size.
pub fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled_height =
            ((u64::from(height) * u64::from(clamped)) + (u64::from(width) / 2)) / u64::from(width);
        (clamped, scaled_height.max(1) as u32)
    } else {
        let scaled_width =
            ((u64::from(width) * u64::from(clamped)) + (u64::from(height) / 2)) / u64::from(height);
        (scaled_width.max(1) as u32, clamped)
    }
}

fn downscale(decoded: DynamicImage, max_edge: u32) -> RgbaImage {
    let (width, height) = decoded.dimensions();
    let (target_w, target_h) = fit_to_max_edge(width, height, max_edge);
    if (target_w, target_h) == (width, height) {
        return decoded.into_rgba8();
    }

    // Halve first; a single large reduction aliases badly on scans.
    let mut current = decoded;
    let mut dims = current.dimensions();
    while dims.0 > target_w.saturating_mul(2) || dims.1 > target_h.saturating_mul(2) {
        let next_w = (dims.0 / 2).max(target_w);
        let next_h = (dims.1 / 2).max(target_h);
        current = current.resize_exact(next_w, next_h, FilterType::Triangle);
        dims = current.dimensions();
    }
    current
        .resize_exact(target_w, target_h, FilterType::CatmullRom)
        .into_rgba8()
}

/// Loads `path` with its longest edge fitted to `max_edge`.
pub fn load_cover_at_edge(path: &Path, max_edge: u32) -> Option<RgbaImage> {
    let Some(decoded) = decode_image_from_path_with_fallback(path) else {
        debug!("Could not decode cover image {}", path.display());
        return None;
    };
    Some(downscale(decoded, max_edge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{codecs::jpeg::JpegEncoder, ImageBuffer, Rgb, RgbImage, Rgba};
    use tempfile::tempdir;

    #[test]
    fn test_fit_to_max_edge_preserves_aspect_ratio() {
        assert_eq!(fit_to_max_edge(2000, 1000, 320), (320, 160));
        assert_eq!(fit_to_max_edge(1000, 2000, 320), (160, 320));
        assert_eq!(fit_to_max_edge(128, 64, 320), (128, 64));
        assert_eq!(fit_to_max_edge(0, 64, 320), (1, 1));
    }

    #[test]
    fn test_decode_image_from_memory_with_fallback_decodes_jpeg_with_trailing_garbage() {
        let rgb = RgbImage::from_pixel(12, 9, Rgb([90, 140, 210]));
        let mut encoded = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut encoded, 85);
            encoder
                .encode_image(&DynamicImage::ImageRgb8(rgb))
                .expect("jpeg encoding should succeed");
        }
        encoded.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let decoded = decode_image_from_memory_with_fallback(&encoded)
            .expect("fallback decoder should decode jpeg bytes");
        assert_eq!(decoded.dimensions(), (12, 9));
    }

    #[test]
    fn test_decode_image_from_memory_with_fallback_rejects_non_image_bytes() {
        assert!(decode_image_from_memory_with_fallback(b"definitely-not-an-image").is_none());
    }

    #[test]
    fn test_load_cover_at_edge_downscales_large_images_only() {
        let dir = tempdir().unwrap();
        let large = dir.path().join("large.png");
        ImageBuffer::from_pixel(900, 600, Rgba([8u8, 16, 24, 255]))
            .save(&large)
            .unwrap();
        let small = dir.path().join("small.png");
        ImageBuffer::from_pixel(40, 20, Rgba([8u8, 16, 24, 255]))
            .save(&small)
            .unwrap();

        assert_eq!(load_cover_at_edge(&large, 256).unwrap().dimensions(), (256, 171));
        assert_eq!(load_cover_at_edge(&small, 256).unwrap().dimensions(), (40, 20));
        assert!(load_cover_at_edge(&dir.path().join("absent.png"), 256).is_none());
    }
}
