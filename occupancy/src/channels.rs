//! # Channel extraction
//!
//! Turns a pair of frames into the intensity planes the cell classifier works on. The frames
//! are differenced first, then either reduced to luma or converted to HSV with the requested
//! planes picked out.

use crate::error::{Error, Result};
use crate::frame::{check_dimensions, Frame};
use image::{GrayImage, ImageBuffer, Luma, Rgb};
use std::fmt;
use std::str::FromStr;

/// Single 8-bit intensity plane.
pub type Plane = GrayImage;

/// A plane of the HSV representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HsvPlane {
    Hue,
    Saturation,
    Value,
}

impl HsvPlane {
    fn index(self) -> usize {
        match self {
            Self::Hue => 0,
            Self::Saturation => 1,
            Self::Value => 2,
        }
    }
}

/// Which planes of the frame difference get classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum ChannelMode {
    H,
    S,
    V,
    HS,
    HV,
    SV,
    Grayscale,
}

impl Default for ChannelMode {
    fn default() -> Self {
        Self::V
    }
}

impl ChannelMode {
    pub const ALL: [ChannelMode; 7] = [
        Self::H,
        Self::S,
        Self::V,
        Self::HS,
        Self::HV,
        Self::SV,
        Self::Grayscale,
    ];

    /// HSV planes selected by this mode, in stack order.
    ///
    /// Empty for `Grayscale`.
    pub fn hsv_planes(self) -> &'static [HsvPlane] {
        use HsvPlane::*;
        match self {
            Self::H => &[Hue],
            Self::S => &[Saturation],
            Self::V => &[Value],
            Self::HS => &[Hue, Saturation],
            Self::HV => &[Hue, Value],
            Self::SV => &[Saturation, Value],
            Self::Grayscale => &[],
        }
    }

    /// Number of planes in the stack this mode produces.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Grayscale => 1,
            m => m.hsv_planes().len(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::H => "H",
            Self::S => "S",
            Self::V => "V",
            Self::HS => "H+S",
            Self::HV => "H+V",
            Self::SV => "S+V",
            Self::Grayscale => "gray",
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mode = match s.trim().to_ascii_uppercase().as_str() {
            "H" => Self::H,
            "S" => Self::S,
            "V" => Self::V,
            "H+S" => Self::HS,
            "H+V" => Self::HV,
            "S+V" => Self::SV,
            "GRAY" | "GREY" | "GRAYSCALE" => Self::Grayscale,
            _ => return Err(Error::InvalidChannelMode(s.to_string())),
        };
        Ok(mode)
    }
}

impl TryFrom<String> for ChannelMode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ChannelMode> for String {
    fn from(mode: ChannelMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Ordered intensity planes of one frame cycle.
#[derive(Clone, Debug)]
pub struct ChannelStack {
    planes: Vec<Plane>,
}

impl ChannelStack {
    /// Build a stack from already extracted planes.
    ///
    /// Plane sizes are not checked here; the classifier rejects mismatching planes.
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Dimensions of the first plane.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.planes.first().map(Plane::dimensions)
    }
}

/// Compute the channel stack of a frame pair.
///
/// # Arguments
///
/// * `prev` - earlier frame.
/// * `curr` - later frame, must be of the same size as `prev`.
/// * `mode` - which planes of the difference image to keep.
pub fn extract(prev: &Frame, curr: &Frame, mode: ChannelMode) -> Result<ChannelStack> {
    let diff = abs_diff(prev, curr)?;

    let planes = match mode {
        ChannelMode::Grayscale => vec![image::imageops::grayscale(&diff)],
        mode => {
            let hsv = rgb_to_hsv(&diff);
            mode.hsv_planes()
                .iter()
                .map(|p| split_plane(&hsv, p.index()))
                .collect()
        }
    };

    Ok(ChannelStack { planes })
}

/// Per-pixel absolute difference of two frames.
pub fn abs_diff(a: &Frame, b: &Frame) -> Result<Frame> {
    check_dimensions(a, b)?;

    let mut out = Frame::new(a.width(), a.height());

    for ((o, pa), pb) in out.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        for c in 0..3 {
            o[c] = pa[c].abs_diff(pb[c]);
        }
    }

    Ok(out)
}

/// Convert an RGB image into 8-bit HSV.
///
/// Hue is halved to fit into `[0; 180)`, saturation and value use the full `[0; 255]` range.
pub fn rgb_to_hsv(img: &Frame) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let mut out = ImageBuffer::new(img.width(), img.height());

    for (o, p) in out.pixels_mut().zip(img.pixels()) {
        *o = Rgb(hsv_pixel(*p));
    }

    out
}

fn hsv_pixel(Rgb([r, g, b]): Rgb<u8>) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);

    let v = r.max(g).max(b);
    let delta = v - r.min(g).min(b);

    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };

    let h = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };

    let h = if h < 0.0 { h + 360.0 } else { h };
    let h = (h / 2.0).round() as u32 % 180;

    [h as u8, s.round() as u8, v as u8]
}

fn split_plane(img: &ImageBuffer<Rgb<u8>, Vec<u8>>, idx: usize) -> Plane {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        Luma([img.get_pixel(x, y)[idx]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!("h+v".parse::<ChannelMode>().unwrap(), ChannelMode::HV);
        assert_eq!("gray".parse::<ChannelMode>().unwrap(), ChannelMode::Grayscale);
        assert_eq!(" V ".parse::<ChannelMode>().unwrap(), ChannelMode::V);
        assert!(matches!(
            "V+H".parse::<ChannelMode>(),
            Err(Error::InvalidChannelMode(_))
        ));

        for mode in ChannelMode::ALL {
            assert_eq!(mode.to_string().parse::<ChannelMode>().unwrap(), mode);
        }
    }

    #[test]
    fn plane_counts() {
        assert_eq!(ChannelMode::Grayscale.plane_count(), 1);
        assert_eq!(ChannelMode::S.plane_count(), 1);
        assert_eq!(ChannelMode::SV.plane_count(), 2);
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_pixel(Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(hsv_pixel(Rgb([0, 255, 0])), [60, 255, 255]);
        assert_eq!(hsv_pixel(Rgb([0, 0, 255])), [120, 255, 255]);
        assert_eq!(hsv_pixel(Rgb([255, 255, 255])), [0, 0, 255]);
        assert_eq!(hsv_pixel(Rgb([0, 0, 0])), [0, 0, 0]);
    }

    #[test]
    fn difference_is_symmetric() {
        let a = Frame::from_pixel(3, 2, Rgb([10, 200, 30]));
        let b = Frame::from_pixel(3, 2, Rgb([50, 100, 30]));

        assert_eq!(abs_diff(&a, &b).unwrap(), abs_diff(&b, &a).unwrap());
        assert_eq!(abs_diff(&a, &b).unwrap().get_pixel(1, 1), &Rgb([40, 100, 0]));
    }

    #[test]
    fn planes_follow_mode_order() {
        let a = Frame::new(4, 4);
        let b = Frame::from_pixel(4, 4, Rgb([0, 0, 255]));

        let stack = extract(&a, &b, ChannelMode::HV).unwrap();

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.planes()[0].get_pixel(0, 0), &Luma([120]));
        assert_eq!(stack.planes()[1].get_pixel(0, 0), &Luma([255]));
    }

    #[test]
    fn grayscale_of_identical_frames_is_black() {
        let a = Frame::from_pixel(5, 5, Rgb([90, 12, 200]));

        let stack = extract(&a, &a.clone(), ChannelMode::Grayscale).unwrap();

        assert_eq!(stack.len(), 1);
        assert!(stack.planes()[0].pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn extraction_rejects_mismatched_frames() {
        assert!(matches!(
            extract(&Frame::new(2, 2), &Frame::new(3, 2), ChannelMode::V),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
