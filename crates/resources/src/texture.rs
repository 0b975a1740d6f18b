//! Image loading and procedural fallback textures.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Decoded RGBA8 pixel data.
pub struct ImageData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Loads an image file and converts it to tightly packed RGBA8.
pub fn load_image_rgba(path: impl AsRef<Path>) -> ResourceResult<ImageData> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let decoded = image::open(path)?.to_rgba8();
    let (width, height) = decoded.dimensions();

    info!("Loaded image {} ({}x{})", path.display(), width, height);

    Ok(ImageData {
        pixels: decoded.into_raw(),
        width,
        height,
    })
}

/// A 1x1 texture of a single packed RGBA color.
pub fn solid_rgba(color: [u8; 4]) -> ImageData {
    ImageData {
        pixels: color.to_vec(),
        width: 1,
        height: 1,
    }
}

/// The classic magenta/black missing-texture checkerboard.
pub fn checkerboard_rgba(size: u32) -> ImageData {
    const MAGENTA: [u8; 4] = [255, 0, 255, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let cell = if (x + y) % 2 == 0 { MAGENTA } else { BLACK };
            pixels.extend_from_slice(&cell);
        }
    }

    ImageData {
        pixels,
        width: size,
        height: size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_is_one_pixel() {
        let img = solid_rgba([255, 255, 255, 255]);
        assert_eq!(img.width, 1);
        assert_eq!(img.height, 1);
        assert_eq!(img.pixels.len(), 4);
    }

    #[test]
    fn test_checkerboard_alternates() {
        let img = checkerboard_rgba(2);
        assert_eq!(img.pixels.len(), 16);
        // (0,0) magenta, (1,0) black.
        assert_eq!(&img.pixels[0..4], &[255, 0, 255, 255]);
        assert_eq!(&img.pixels[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_missing_image_is_reported() {
        let result = load_image_rgba("/nonexistent/texture.png");
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
