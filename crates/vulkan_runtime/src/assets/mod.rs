//! Image loading for textures
//!
//! Decoded images are always 8-bit RGBA so they can be uploaded without
//! further conversion.

mod tga;

pub use tga::{load_tga, parse_tga};

use ash::vk;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while loading an image file
#[derive(Error, Debug)]
pub enum ImageLoadError {
    /// The file could not be read
    #[error("Failed to read image {path:?}: {source}")]
    Io {
        /// Path of the image file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The TGA header is not an uncompressed true-color or black-and-white header
    #[error("Unsupported TGA header, only uncompressed images are supported")]
    UnsupportedHeader,

    /// Pixel depth below 24 bits
    #[error("Unsupported TGA pixel depth: {0} bits")]
    UnsupportedDepth(u8),

    /// File ends before all pixels were read
    #[error("Image data truncated: expected {expected} bytes, found {actual}")]
    Truncated {
        /// Bytes required by the header
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Decoder error from the `image` crate
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decoded pixels ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Texel format of `data`
    pub format: vk::Format,
    /// Tightly packed RGBA rows
    pub data: Vec<u8>,
}

impl ImageData {
    /// Two-color checkerboard with square cells of `cell` pixels
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let data = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .flat_map(|(x, y)| if (x / cell + y / cell) % 2 == 0 { a } else { b })
            .collect();
        Self {
            width: size,
            height: size,
            format: vk::Format::R8G8B8A8_SRGB,
            data,
        }
    }
}

/// Load a PNG file through the `image` crate
pub fn load_png(path: impl AsRef<Path>) -> Result<ImageData, ImageLoadError> {
    let rgba = image::open(path.as_ref())?.to_rgba8();
    let (width, height) = rgba.dimensions();
    log::debug!("Loaded {}x{} PNG {:?}", width, height, path.as_ref());
    Ok(ImageData {
        width,
        height,
        format: vk::Format::R8G8B8A8_SRGB,
        data: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_cells() {
        let white = [255, 255, 255, 255];
        let black = [0, 0, 0, 255];
        let image = ImageData::checkerboard(4, 2, white, black);
        assert_eq!(image.data.len(), 4 * 4 * 4);

        let pixel = |x: usize, y: usize| &image.data[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(pixel(0, 0), white);
        assert_eq!(pixel(1, 1), white);
        assert_eq!(pixel(2, 0), black);
        assert_eq!(pixel(0, 2), black);
        assert_eq!(pixel(3, 3), white);
    }

    #[test]
    fn test_missing_png() {
        let path = std::env::temp_dir().join("vulkan_runtime_missing.png");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(load_png(&path), Err(ImageLoadError::Decode(_))));
    }
}
