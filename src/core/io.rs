//! Image decode/encode collaborators.
//!
//! Decoding converts whatever the file holds (RGB, grayscale, 16-bit, ...)
//! into 8-bit RGBA, which is the channel order the pixel buffer packs. The
//! transform never sees the source layout.

use crate::core::error::{ImgtransError, ImgtransResult};
use crate::core::transform::Surface;
use image::RgbaImage;
use std::path::Path;

/// Load an image from disk as 8-bit RGBA.
pub fn decode(path: &Path) -> ImgtransResult<RgbaImage> {
    let image = image::open(path).map_err(|source| ImgtransError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!(
        "Decoded {} ({}x{}, {:?})",
        path.display(),
        image.width(),
        image.height(),
        image.color()
    );

    Ok(image.into_rgba8())
}

/// Load an image from disk into a [`Surface`].
pub fn decode_surface(path: &Path) -> ImgtransResult<Surface> {
    decode(path).map(Surface::from_image)
}

/// Write an RGBA image; the format follows the file extension.
pub fn encode(path: &Path, image: &RgbaImage) -> ImgtransResult<()> {
    image.save(path).map_err(|source| ImgtransError::Encode {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!("Encoded {} ({}x{})", path.display(), image.width(), image.height());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pixel::{unpack_all, PixelBuffer};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_decode_adds_opaque_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        RgbImage::from_pixel(2, 2, Rgb([10, 20, 30])).save(&path).unwrap();

        let surface = decode_surface(&path).unwrap();
        assert_eq!(surface.width(), 2);
        assert_eq!(unpack_all(surface.pixels.get(1, 1)), [10, 20, 30, 255]);
    }

    #[test]
    fn test_encode_then_decode_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let image = RgbaImage::from_fn(4, 3, |x, y| image::Rgba([x as u8, y as u8, 99, 128]));

        encode(&path, &image).unwrap();
        let decoded = decode(&path).unwrap();
        assert_eq!(PixelBuffer::from_image(&decoded), PixelBuffer::from_image(&image));
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode(Path::new("/nonexistent/input.png")).unwrap_err();
        assert!(matches!(err, ImgtransError::Decode { .. }));
    }

    #[test]
    fn test_encode_unwritable_path() {
        let image = RgbaImage::new(1, 1);
        let err = encode(Path::new("/nonexistent/dir/out.png"), &image).unwrap_err();
        assert!(matches!(err, ImgtransError::Encode { .. }));
    }
}
