//! # Cell classification
//!
//! Decides whether a single grid cell contains motion. Every plane of the channel stack is
//! cropped to the cell, smoothed, binarised, dilated and searched for outer contours. Contours
//! that are large enough count as detections, and enough detections across all planes make the
//! cell occupied.

use crate::channels::{ChannelStack, Plane};
use crate::grid::Rect;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::point::Point;

/// Default minimum contour area, in square pixels.
pub const DEFAULT_CONTOUR_AREA: f64 = 100.0;

/// Occupancy decision for a single cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Occupancy {
    Empty,
    Occupied,
}

impl Occupancy {
    pub fn is_occupied(self) -> bool {
        self == Self::Occupied
    }
}

impl From<bool> for Occupancy {
    fn from(occupied: bool) -> Self {
        if occupied {
            Self::Occupied
        } else {
            Self::Empty
        }
    }
}

/// Why a cell could not be classified.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("channel stack has no planes")]
    EmptyStack,
    #[error("plane {index} is {found:?}, expected {expected:?}")]
    PlaneMismatch {
        index: usize,
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("cell {cell:?} lies outside the {width}x{height} plane")]
    OutOfBounds { cell: Rect, width: u32, height: u32 },
}

/// Image processing parameters of the detection pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClassifierParams {
    /// Standard deviation of the Gaussian smoothing step.
    ///
    /// 1.1 is what a 5x5 kernel with automatic sigma works out to.
    pub blur_sigma: f32,
    /// Pixels strictly above this value become foreground.
    pub binary_threshold: u8,
    /// Chessboard radius of the dilation step.
    pub dilation_radius: u8,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            binary_threshold: 20,
            dilation_radius: 3,
        }
    }
}

/// Detection count needed for occupancy when none is configured.
///
/// Multi-plane stacks need two planes to agree, so that a single noisy plane can not mark a cell
/// on its own.
pub fn default_detection_threshold(planes: usize) -> usize {
    if planes > 1 {
        2
    } else {
        1
    }
}

/// Fully configured cell classifier.
#[derive(Clone, Copy, Debug)]
pub struct CellClassifier {
    pub params: ClassifierParams,
    pub contour_area_threshold: f64,
    /// Detections needed for occupancy. `None` picks [`default_detection_threshold`].
    pub detection_count_threshold: Option<usize>,
}

impl Default for CellClassifier {
    fn default() -> Self {
        Self {
            params: Default::default(),
            contour_area_threshold: DEFAULT_CONTOUR_AREA,
            detection_count_threshold: None,
        }
    }
}

impl CellClassifier {
    /// Detection count threshold for a stack of the given depth.
    pub fn detection_threshold(&self, planes: usize) -> usize {
        self.detection_count_threshold
            .unwrap_or_else(|| default_detection_threshold(planes))
    }

    /// Classify a single cell.
    ///
    /// Zero-area cells are always empty.
    pub fn classify(&self, cell: &Rect, stack: &ChannelStack) -> Result<Occupancy, ClassifyError> {
        if cell.area() == 0 {
            return Ok(Occupancy::Empty);
        }

        check_stack(cell, stack)?;

        let detections = stack
            .planes()
            .iter()
            .map(|plane| self.count_detections(plane, cell))
            .sum::<usize>();

        Ok((detections >= self.detection_threshold(stack.len())).into())
    }

    /// Count contours of sufficient area within the cell of a single plane.
    fn count_detections(&self, plane: &Plane, cell: &Rect) -> usize {
        let crop = image::imageops::crop_imm(plane, cell.x, cell.y, cell.width, cell.height)
            .to_image();

        let blurred = imageproc::filter::gaussian_blur_f32(&crop, self.params.blur_sigma);
        let binary = imageproc::contrast::threshold(&blurred, self.params.binary_threshold);
        let dilated =
            imageproc::morphology::dilate(&binary, Norm::LInf, self.params.dilation_radius);

        find_contours::<i32>(&with_background_border(&dilated))
            .iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer))
            .filter(|c| contour_area(&c.points) >= self.contour_area_threshold)
            .count()
    }
}

/// Classify a cell with the default image processing parameters.
///
/// # Arguments
///
/// * `cell` - pixel rectangle of the cell, in frame coordinates.
/// * `stack` - channel planes of the current frame cycle.
/// * `contour_area_threshold` - smallest contour area counted as a detection.
/// * `detection_count_threshold` - detections needed across all planes.
pub fn classify(
    cell: &Rect,
    stack: &ChannelStack,
    contour_area_threshold: f64,
    detection_count_threshold: usize,
) -> Result<Occupancy, ClassifyError> {
    CellClassifier {
        params: Default::default(),
        contour_area_threshold,
        detection_count_threshold: Some(detection_count_threshold),
    }
    .classify(cell, stack)
}

fn check_stack(cell: &Rect, stack: &ChannelStack) -> Result<(), ClassifyError> {
    let (width, height) = stack.dimensions().ok_or(ClassifyError::EmptyStack)?;

    if let Some((index, plane)) = stack
        .planes()
        .iter()
        .enumerate()
        .find(|(_, p)| p.dimensions() != (width, height))
    {
        return Err(ClassifyError::PlaneMismatch {
            index,
            expected: (width, height),
            found: plane.dimensions(),
        });
    }

    if !cell.fits_within(width, height) {
        return Err(ClassifyError::OutOfBounds {
            cell: *cell,
            width,
            height,
        });
    }

    Ok(())
}

/// Surround a binary image with a 1 pixel background frame.
///
/// Blobs touching the crop edge need background around them to be traced as outer borders.
fn with_background_border(img: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(img.width() + 2, img.height() + 2);
    image::imageops::replace(&mut out, img, 1, 1);
    out
}

/// Area enclosed by a closed contour, using the shoelace formula.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum::<i64>();

    twice_area.unsigned_abs() as f64 / 2.0
}
