//! Sequential backend: plain loops over the pixel buffer.
//!
//! This is the reference implementation. The other backends are checked
//! against it in their tests.

use crate::backend::{Backend, BackendKind, BackendMetadata};
use crate::core::error::TransformError;
use crate::core::pixel::{pack, unpack, unpack_all, Channel, PixelBuffer};
use crate::core::transform::{BlurArea, Surface, TransformOutput};

/// Bias added to emboss differences so flat regions map to mid-gray.
pub const EMBOSS_BIAS: i32 = 128;

/// Integer luminance, exactly `floor(0.21r + 0.72g + 0.07b)`.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((21 * r as u32 + 72 * g as u32 + 7 * b as u32) / 100) as u8
}

/// Runs every transform on the CPU, one pixel after the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialBackend;

impl SequentialBackend {
    /// Create the backend; it holds no state.
    pub fn new() -> Self {
        Self
    }

    /// Static metadata, available without an instance.
    pub fn describe() -> BackendMetadata {
        BackendMetadata::new(
            BackendKind::Sequential,
            "Plain CPU loops over the packed pixel buffer",
        )
    }
}

impl Backend for SequentialBackend {
    fn metadata(&self) -> BackendMetadata {
        Self::describe()
    }

    fn swap(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        for pixel in surface.pixels.pixels_mut() {
            let [r, g, b, a] = unpack_all(*pixel);
            *pixel = pack(r, b, g, a);
        }
        Ok(TransformOutput::array())
    }

    fn gray(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        for pixel in surface.pixels.pixels_mut() {
            let [r, g, b, a] = unpack_all(*pixel);
            let gray = luminance(r, g, b);
            *pixel = pack(gray, gray, gray, a);
        }
        Ok(TransformOutput::array())
    }

    fn blur(&self, surface: &mut Surface, area: BlurArea) -> Result<TransformOutput, TransformError> {
        box_blur(&mut surface.pixels, area.radius());
        Ok(TransformOutput::array())
    }

    fn emboss(&self, surface: &mut Surface) -> Result<TransformOutput, TransformError> {
        emboss(&mut surface.pixels);
        Ok(TransformOutput::array())
    }
}

/// Inclusive range of in-bounds neighbors of `pos` within `radius`.
#[inline]
fn window(pos: usize, radius: usize, len: usize) -> (usize, usize) {
    (pos.saturating_sub(radius), (pos + radius).min(len - 1))
}

/// Separable box blur with the exclusion border policy.
///
/// Pass one stores per-channel horizontal window sums; pass two sums those
/// vertically and divides by the number of in-bounds pixels. Both passes use
/// a moving sum, so the cost does not depend on the radius.
fn box_blur(buffer: &mut PixelBuffer, radius: u32) {
    if buffer.is_empty() || radius == 0 {
        return;
    }

    let width = buffer.width() as usize;
    let height = buffer.height() as usize;
    let radius = radius as usize;
    let mut sums = vec![[0u32; 4]; buffer.len()];

    // Horizontal pass
    for (row, out) in buffer.pixels().chunks_exact(width).zip(sums.chunks_exact_mut(width)) {
        let mut acc = [0u32; 4];
        for &pixel in &row[..=radius.min(width - 1)] {
            add(&mut acc, unpack_all(pixel));
        }

        for x in 0..width {
            out[x] = acc;
            if x + radius + 1 < width {
                add(&mut acc, unpack_all(row[x + radius + 1]));
            }
            if x >= radius {
                sub(&mut acc, unpack_all(row[x - radius]));
            }
        }
    }

    // Vertical pass
    let pixels = buffer.pixels_mut();
    for x in 0..width {
        let (x_lo, x_hi) = window(x, radius, width);
        let span_x = (x_hi - x_lo + 1) as u32;

        let mut acc = [0u32; 4];
        for y in 0..=radius.min(height - 1) {
            add_sums(&mut acc, sums[y * width + x]);
        }

        for y in 0..height {
            let (y_lo, y_hi) = window(y, radius, height);
            let count = span_x * (y_hi - y_lo + 1) as u32;
            pixels[y * width + x] = pack(
                (acc[0] / count) as u8,
                (acc[1] / count) as u8,
                (acc[2] / count) as u8,
                (acc[3] / count) as u8,
            );

            if y + radius + 1 < height {
                add_sums(&mut acc, sums[(y + radius + 1) * width + x]);
            }
            if y >= radius {
                sub_sums(&mut acc, sums[(y - radius) * width + x]);
            }
        }
    }
}

#[inline]
fn add(acc: &mut [u32; 4], channels: [u8; 4]) {
    for (a, c) in acc.iter_mut().zip(channels) {
        *a += c as u32;
    }
}

#[inline]
fn sub(acc: &mut [u32; 4], channels: [u8; 4]) {
    for (a, c) in acc.iter_mut().zip(channels) {
        *a -= c as u32;
    }
}

#[inline]
fn add_sums(acc: &mut [u32; 4], sums: [u32; 4]) {
    for (a, s) in acc.iter_mut().zip(sums) {
        *a += s;
    }
}

#[inline]
fn sub_sums(acc: &mut [u32; 4], sums: [u32; 4]) {
    for (a, s) in acc.iter_mut().zip(sums) {
        *a -= s;
    }
}

/// Emboss each colour channel against the diagonal neighbors, keeping alpha.
///
/// Neighbors outside the image are replaced by the nearest edge pixel.
fn emboss(buffer: &mut PixelBuffer) {
    if buffer.is_empty() {
        return;
    }

    let source = buffer.clone();
    let max_x = buffer.width() - 1;
    let max_y = buffer.height() - 1;

    for y in 0..buffer.height() {
        for x in 0..buffer.width() {
            let before = source.get(x.saturating_sub(1), y.saturating_sub(1));
            let after = source.get((x + 1).min(max_x), (y + 1).min(max_y));

            let relief = |channel: Channel| -> u8 {
                let diff = unpack(after, channel) as i32 - unpack(before, channel) as i32;
                (diff + EMBOSS_BIAS).clamp(0, 255) as u8
            };

            let alpha = unpack(source.get(x, y), Channel::Alpha);
            buffer.set(x, y, pack(relief(Channel::Red), relief(Channel::Green), relief(Channel::Blue), alpha));
        }
    }
}
