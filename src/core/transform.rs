//! The transform contract shared by all backends.
//!
//! A transform receives a [`Surface`] (the packed [`PixelBuffer`] plus the
//! backend-native image handle decoded from the same file), mutates one of the
//! two in place, and reports through [`TransformOutput`] where the output lives.
//! Dimensions never change across a call.

use crate::core::error::{ImgtransError, TransformError};
use crate::core::pixel::PixelBuffer;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sentinel reported in place of a device-side time that was not measured.
pub const NOT_MEASURED: i64 = -1;

/// Names of the supported transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Exchange the green and blue channels.
    Swap,
    /// Replace colour channels with a weighted luminance.
    Gray,
    /// Box-average each channel over a square neighborhood.
    Blur,
    /// Directional relief effect biased to mid-gray.
    Emboss,
}

impl TransformKind {
    /// All transforms in display order.
    pub const ALL: [TransformKind; 4] = [
        TransformKind::Swap,
        TransformKind::Gray,
        TransformKind::Blur,
        TransformKind::Emboss,
    ];

    /// Command-line name of the transform.
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::Swap => "swap",
            TransformKind::Gray => "gray",
            TransformKind::Blur => "blur",
            TransformKind::Emboss => "emboss",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for TransformKind {
    type Err = ImgtransError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransformKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ImgtransError::UnsupportedTransform(s.to_string()))
    }
}

/// Side length of the square blur neighborhood.
///
/// Always a positive odd number no larger than [`BlurArea::MAX`]; invalid
/// values are rejected at construction, so every backend sees the same area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlurArea(u32);

impl BlurArea {
    /// Area used when the caller supplies none.
    pub const DEFAULT: BlurArea = BlurArea(11);

    /// Largest accepted area.
    pub const MAX: u32 = 255;

    /// Validate a caller-supplied area.
    pub fn new(area: i64) -> Result<Self, TransformError> {
        let reason = if area < 1 {
            "must be positive"
        } else if area % 2 == 0 {
            "must be odd"
        } else if area > Self::MAX as i64 {
            "must not exceed 255"
        } else {
            return Ok(Self(area as u32));
        };

        Err(TransformError::InvalidParameter {
            name: "area",
            reason: format!("{} (got {})", reason, area),
        })
    }

    /// Side length of the neighborhood.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Neighbors considered on each side of the center pixel.
    pub fn radius(self) -> u32 {
        self.0 / 2
    }
}

impl Default for BlurArea {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for BlurArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transform together with its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Transform {
    /// Exchange green and blue.
    Swap,
    /// Fixed-weight luminance.
    Gray,
    /// Box average over an `area x area` window.
    Blur {
        /// Window side length.
        area: BlurArea,
    },
    /// Diagonal relief biased to mid-gray.
    Emboss,
}

impl Transform {
    /// Build a transform from its name and the optional integer parameter.
    ///
    /// The parameter is only meaningful for blur; other transforms ignore it.
    pub fn from_request(name: &str, parameter: Option<i64>) -> Result<Self, ImgtransError> {
        let kind: TransformKind = name.parse()?;

        if kind != TransformKind::Blur {
            if let Some(value) = parameter {
                log::warn!("Ignoring parameter {} for transformation '{}'", value, kind);
            }
        }

        Ok(match kind {
            TransformKind::Swap => Transform::Swap,
            TransformKind::Gray => Transform::Gray,
            TransformKind::Blur => Transform::Blur {
                area: parameter.map(BlurArea::new).transpose()?.unwrap_or_default(),
            },
            TransformKind::Emboss => Transform::Emboss,
        })
    }

    /// Name of the transform without its parameter.
    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Swap => TransformKind::Swap,
            Transform::Gray => TransformKind::Gray,
            Transform::Blur { .. } => TransformKind::Blur,
            Transform::Emboss => TransformKind::Emboss,
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Blur { area } => write!(f, "blur(area={})", area),
            other => f.write_str(other.kind().name()),
        }
    }
}

/// Where the output of a transform lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The transform did not run (unimplemented on this backend).
    NoResult,
    /// The output is in the pixel buffer.
    Array,
    /// The output is in the image handle.
    Image,
}

/// Result of one transform invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOutput {
    /// Where the output lives.
    pub status: Status,
    /// Elapsed time measured by the backend itself (e.g. GPU timestamps).
    pub device_elapsed: Option<Duration>,
}

impl TransformOutput {
    /// Nothing was produced.
    pub fn none() -> Self {
        Self {
            status: Status::NoResult,
            device_elapsed: None,
        }
    }

    /// Output written to the pixel buffer.
    pub fn array() -> Self {
        Self {
            status: Status::Array,
            device_elapsed: None,
        }
    }

    /// Output written to the image handle.
    pub fn image() -> Self {
        Self {
            status: Status::Image,
            device_elapsed: None,
        }
    }

    /// Attach a backend-measured elapsed time.
    pub fn with_device_elapsed(mut self, elapsed: Option<Duration>) -> Self {
        self.device_elapsed = elapsed;
        self
    }

    /// Whether the transform produced an output.
    pub fn has_result(&self) -> bool {
        self.status != Status::NoResult
    }

    /// Device-side time in microseconds, or [`NOT_MEASURED`].
    pub fn device_elapsed_micros(&self) -> i64 {
        self.device_elapsed
            .map(|d| d.as_micros().min(i64::MAX as u128) as i64)
            .unwrap_or(NOT_MEASURED)
    }
}

/// Everything a transform may touch during one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    /// Packed pixels, mutated by array-producing backends.
    pub pixels: PixelBuffer,
    /// Backend-native image handle, mutated by image-producing backends.
    pub image: RgbaImage,
}

impl Surface {
    /// Build both views from one decoded image.
    pub fn from_image(image: RgbaImage) -> Self {
        let pixels = PixelBuffer::from_image(&image);
        Self { pixels, image }
    }

    /// Build both views from a packed buffer.
    pub fn from_pixels(pixels: PixelBuffer) -> Self {
        let image = pixels.to_image();
        Self { pixels, image }
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Hand over the view that holds the output for `status`.
    ///
    /// Returns `None` for [`Status::NoResult`].
    pub fn into_output(self, status: Status) -> Option<RgbaImage> {
        match status {
            Status::Array => Some(self.pixels.to_image()),
            Status::Image => Some(self.image),
            Status::NoResult => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_transform_names() {
        for kind in TransformKind::ALL {
            assert_eq!(kind.name().parse::<TransformKind>().unwrap(), kind);
        }

        let err = "sepia".parse::<TransformKind>().unwrap_err();
        assert!(matches!(err, ImgtransError::UnsupportedTransform(name) if name == "sepia"));
    }

    #[test]
    fn test_blur_area_policy() {
        assert_eq!(BlurArea::default().get(), 11);
        assert_eq!(BlurArea::new(1).unwrap().radius(), 0);
        assert_eq!(BlurArea::new(11).unwrap().radius(), 5);
        assert!(BlurArea::new(255).is_ok());

        for bad in [0, -3, 4, 10, 257] {
            assert!(
                matches!(BlurArea::new(bad), Err(TransformError::InvalidParameter { name: "area", .. })),
                "area {} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_from_request() {
        assert_eq!(
            Transform::from_request("blur", None).unwrap(),
            Transform::Blur { area: BlurArea::DEFAULT }
        );
        assert_eq!(
            Transform::from_request("blur", Some(3)).unwrap(),
            Transform::Blur { area: BlurArea::new(3).unwrap() }
        );
        assert_eq!(Transform::from_request("swap", Some(3)).unwrap(), Transform::Swap);
        assert!(Transform::from_request("blur", Some(4)).is_err());
        assert!(Transform::from_request("invert", None).is_err());
    }

    #[test]
    fn test_output_sentinel() {
        assert_eq!(TransformOutput::array().device_elapsed_micros(), NOT_MEASURED);

        let timed = TransformOutput::array().with_device_elapsed(Some(Duration::from_micros(42)));
        assert_eq!(timed.device_elapsed_micros(), 42);
        assert!(!TransformOutput::none().has_result());
    }

    #[test]
    fn test_surface_output_selection() {
        let image = RgbaImage::from_pixel(2, 1, Rgba([1, 2, 3, 4]));
        let mut surface = Surface::from_image(image.clone());
        surface.image.put_pixel(0, 0, Rgba([9, 9, 9, 9]));

        assert_eq!(surface.clone().into_output(Status::Array).unwrap(), image);
        assert_eq!(
            *surface.clone().into_output(Status::Image).unwrap().get_pixel(0, 0),
            Rgba([9, 9, 9, 9])
        );
        assert!(surface.into_output(Status::NoResult).is_none());
    }
}
