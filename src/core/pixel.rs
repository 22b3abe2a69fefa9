//! Packed pixel representation shared by every backend.
//!
//! A pixel is a single `u32` carrying four 8-bit channels. Channel `c` lives at
//! bit offset `8 * c`, in the fixed order red, green, blue, alpha. Access goes
//! through [`pack`] and [`unpack`] only; the buffer is never reinterpreted as
//! bytes, so the layout does not depend on host endianness.

use crate::core::error::TransformError;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four 8-bit channels of a packed pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Bits 0-7.
    Red = 0,
    /// Bits 8-15.
    Green = 1,
    /// Bits 16-23.
    Blue = 2,
    /// Bits 24-31.
    Alpha = 3,
}

impl Channel {
    /// All channels in packing order.
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha];

    /// The colour channels (everything but alpha).
    pub const COLOR: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Position of the channel in packing order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit offset of the channel inside a packed pixel.
    pub fn shift(self) -> u32 {
        8 * self as u32
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
            Channel::Alpha => "alpha",
        };
        f.write_str(name)
    }
}

/// Pack four channel values into one pixel.
#[inline]
pub fn pack(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) << Channel::Red.shift()
        | (g as u32) << Channel::Green.shift()
        | (b as u32) << Channel::Blue.shift()
        | (a as u32) << Channel::Alpha.shift()
}

/// Extract one channel from a packed pixel.
#[inline]
pub fn unpack(pixel: u32, channel: Channel) -> u8 {
    ((pixel >> channel.shift()) & 0xFF) as u8
}

/// Extract all four channels, in packing order.
#[inline]
pub fn unpack_all(pixel: u32) -> [u8; 4] {
    [
        unpack(pixel, Channel::Red),
        unpack(pixel, Channel::Green),
        unpack(pixel, Channel::Blue),
        unpack(pixel, Channel::Alpha),
    ]
}

/// Flat, row-major buffer of packed pixels.
///
/// The length is fixed at `width * height` for the lifetime of the buffer:
/// mutable access is only handed out as a slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    /// Create a buffer of transparent black pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    /// Wrap existing packed pixels.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, TransformError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(TransformError::DimensionMismatch {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Decode an RGBA image by walking rows, then columns, packing four
    /// consecutive bytes per pixel.
    pub fn from_image(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = image
            .as_raw()
            .chunks_exact(4)
            .map(|px| pack(px[0], px[1], px[2], px[3]))
            .collect();
        Self { width, height, pixels }
    }

    /// Encode back into an RGBA image; the exact inverse of [`from_image`](Self::from_image).
    pub fn to_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| Rgba(unpack_all(self.get(x, y))))
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels (`width * height`).
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Whether the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Pixel at `(x, y)`. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[self.index(x, y)]
    }

    /// Overwrite the pixel at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, pixel: u32) {
        let idx = self.index(x, y);
        self.pixels[idx] = pixel;
    }

    /// Row-major packed pixels.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Mutable row-major packed pixels; the length is fixed.
    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }
}
