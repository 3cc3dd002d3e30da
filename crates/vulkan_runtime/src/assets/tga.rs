//! Uncompressed TGA decoding

use ash::vk;
use std::path::Path;
use super::{ImageData, ImageLoadError};

const HEADER_LEN: usize = 18;
const TRUE_COLOR_HEADER: [u8; 12] = [0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0];
const BLACK_WHITE_HEADER: [u8; 12] = [0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// Decode an uncompressed 24- or 32-bit TGA image
///
/// Pixels are stored BGR(A) in the file. The result is RGBA with opaque
/// alpha for 24-bit input, in `R8G8B8A8_SRGB`.
pub fn parse_tga(bytes: &[u8]) -> Result<ImageData, ImageLoadError> {
    if bytes.len() < HEADER_LEN {
        return Err(ImageLoadError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let (prefix, image_spec) = bytes[..HEADER_LEN].split_at(12);
    if prefix != TRUE_COLOR_HEADER && prefix != BLACK_WHITE_HEADER {
        return Err(ImageLoadError::UnsupportedHeader);
    }

    let width = u16::from_le_bytes([image_spec[0], image_spec[1]]) as u32;
    let height = u16::from_le_bytes([image_spec[2], image_spec[3]]) as u32;
    let bits_per_pixel = image_spec[4];
    if bits_per_pixel < 24 || bits_per_pixel % 8 != 0 {
        return Err(ImageLoadError::UnsupportedDepth(bits_per_pixel));
    }

    let channels = (bits_per_pixel / 8) as usize;
    let pixel_count = width as usize * height as usize;
    let pixels = &bytes[HEADER_LEN..];
    let expected = pixel_count * channels;
    if pixels.len() < expected {
        return Err(ImageLoadError::Truncated {
            expected,
            actual: pixels.len(),
        });
    }

    let mut data = Vec::with_capacity(pixel_count * 4);
    for texel in pixels[..expected].chunks_exact(channels) {
        let alpha = if channels >= 4 { texel[3] } else { u8::MAX };
        data.extend_from_slice(&[texel[2], texel[1], texel[0], alpha]);
    }

    Ok(ImageData {
        width,
        height,
        format: vk::Format::R8G8B8A8_SRGB,
        data,
    })
}

/// Read and decode a TGA file
pub fn load_tga(path: impl AsRef<Path>) -> Result<ImageData, ImageLoadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ImageLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let image = parse_tga(&bytes)?;
    log::debug!("Loaded {}x{} TGA {:?}", image.width, image.height, path);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tga(image_type: u8, width: u16, height: u16, bpp: u8, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0, 0, image_type, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.push(bpp);
        bytes.push(0);
        bytes.extend_from_slice(pixels);
        bytes
    }

    #[test]
    fn test_32_bit_swizzles_bgra() {
        let bytes = tga(2, 2, 1, 32, &[10, 20, 30, 40, 1, 2, 3, 4]);
        let image = parse_tga(&bytes).unwrap();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(image.data, vec![30, 20, 10, 40, 3, 2, 1, 4]);
    }

    #[test]
    fn test_24_bit_expands_to_opaque_rgba() {
        let bytes = tga(2, 1, 2, 24, &[0, 0, 255, 255, 0, 0]);
        let image = parse_tga(&bytes).unwrap();
        assert_eq!(image.data, vec![255, 0, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn test_black_and_white_header_accepted() {
        let bytes = tga(3, 1, 1, 24, &[7, 7, 7]);
        assert!(parse_tga(&bytes).is_ok());
    }

    #[test]
    fn test_compressed_header_rejected() {
        let bytes = tga(10, 1, 1, 32, &[0; 4]);
        assert!(matches!(parse_tga(&bytes), Err(ImageLoadError::UnsupportedHeader)));
    }

    #[test]
    fn test_low_depth_rejected() {
        let bytes = tga(2, 1, 1, 16, &[0; 2]);
        assert!(matches!(parse_tga(&bytes), Err(ImageLoadError::UnsupportedDepth(16))));
    }

    #[test]
    fn test_truncated_pixels() {
        let bytes = tga(2, 2, 2, 32, &[0; 12]);
        assert!(matches!(
            parse_tga(&bytes),
            Err(ImageLoadError::Truncated { expected: 16, actual: 12 })
        ));
        assert!(matches!(parse_tga(&[0, 0, 2]), Err(ImageLoadError::Truncated { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("vulkan_runtime_missing.tga");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(load_tga(&path), Err(ImageLoadError::Io { .. })));
    }
}
