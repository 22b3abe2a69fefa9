//! Library backend: `image` and `imageproc` primitives on the image handle.
//!
//! Output lives in [`Surface::image`]; the pixel buffer is left untouched and
//! every result reports [`Status::Image`](crate::core::transform::Status::Image).

use crate::backend::sequential::luminance;
use crate::backend::{Backend, BackendKind, BackendMetadata};
use crate::core::error::TransformError;
use crate::core::pixel::Channel;
use crate::core::transform::{BlurArea, Surface, TransformKind, TransformOutput};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::integral_image::integral_image;
use rayon::prelude::*;

/// Delegates to image-library primitives, splitting channels into planes
/// where the library only works on single-channel images.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryBackend;

impl LibraryBackend {
    /// Create the backend; it holds no state.
    pub fn new() -> Self {
        Self
    }

    /// Static metadata, available without an instance.
    pub fn describe() -> BackendMetadata {
        BackendMetadata::new(
            BackendKind::Library,
            "image/imageproc primitives on the decoded image (no emboss kernel)",
        )
        .without(TransformKind::Emboss)
    }
}

impl Backend for LibraryBackend {
    fn metadata(&self) -> BackendMetadata {
        Self::describe()
    }

    fn swap(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        let mut planes = split_channels(&surface.image);
        planes.swap(Channel::Green.index(), Channel::Blue.index());
        surface.image = merge_channels(&planes);
        Ok(TransformOutput::image())
    }

    fn gray(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        surface.image = imageproc::map::map_colors(&surface.image, |pixel: Rgba<u8>| {
            let Rgba([r, g, b, a]) = pixel;
            let gray = luminance(r, g, b);
            Rgba([gray, gray, gray, a])
        });
        Ok(TransformOutput::image())
    }

    fn blur(&self, surface: &mut Surface, area: BlurArea) -> Result<TransformOutput, TransformError> {
        let radius = area.radius();
        if radius == 0 {
            return Ok(TransformOutput::image());
        }

        let mut planes = split_channels(&surface.image);
        planes
            .par_iter_mut()
            .for_each(|plane| *plane = clipped_box_average(plane, radius));
        surface.image = merge_channels(&planes);
        Ok(TransformOutput::image())
    }

    fn emboss(&self, _surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        log::debug!("No biased directional kernel in the image library; emboss not run");
        Ok(TransformOutput::none())
    }
}

/// Box average over the part of each window that lies inside the plane.
///
/// Window sums come from the integral image, which is one row and one column
/// larger than the plane with a zero first row and column.
fn clipped_box_average(plane: &GrayImage, radius: u32) -> GrayImage {
    let (width, height) = plane.dimensions();
    let integral = integral_image::<_, u64>(plane);
    let at = |x: u32, y: u32| integral.get_pixel(x, y)[0];

    GrayImage::from_fn(width, height, |x, y| {
        let (x_lo, x_hi) = (x.saturating_sub(radius), (x + radius).min(width - 1));
        let (y_lo, y_hi) = (y.saturating_sub(radius), (y + radius).min(height - 1));

        let sum = at(x_hi + 1, y_hi + 1) + at(x_lo, y_lo) - at(x_lo, y_hi + 1) - at(x_hi + 1, y_lo);
        let count = u64::from(x_hi - x_lo + 1) * u64::from(y_hi - y_lo + 1);
        Luma([(sum / count) as u8])
    })
}

/// Split an RGBA image into one grayscale plane per channel.
fn split_channels(image: &RgbaImage) -> Vec<GrayImage> {
    Channel::ALL
        .iter()
        .map(|&channel| {
            GrayImage::from_fn(image.width(), image.height(), |x, y| {
                Luma([image.get_pixel(x, y)[channel.index()]])
            })
        })
        .collect()
}

/// Inverse of [`split_channels`].
fn merge_channels(planes: &[GrayImage]) -> RgbaImage {
    let (width, height) = planes[0].dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            planes[0].get_pixel(x, y)[0],
            planes[1].get_pixel(x, y)[0],
            planes[2].get_pixel(x, y)[0],
            planes[3].get_pixel(x, y)[0],
        ])
    })
}
