//! # Run configuration

use crate::channels::ChannelMode;
use crate::classifier::{CellClassifier, ClassifierParams, DEFAULT_CONTOUR_AREA};
use crate::error::{Error, Result};
use crate::grid::{Rect, Roi};

/// What the frame loop does when a frame cycle can not be aggregated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CyclePolicy {
    /// End the run with the error.
    Abort,
    /// Log nothing for the frame, warn, and carry on with the next one.
    Skip,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self::Abort
    }
}

/// Static configuration of a detection run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OccupancyConfig {
    pub rois: Vec<Roi>,
    pub channel_mode: ChannelMode,
    pub contour_area_threshold: f64,
    /// Detections needed for an occupied cell. Derived from the channel mode when unset.
    pub detection_count_threshold: Option<usize>,
    /// Upper bound on processed frames.
    pub frame_cap: Option<usize>,
    /// Size of the classification worker pool. One per logical CPU when unset.
    pub worker_threads: Option<usize>,
    pub cycle_policy: CyclePolicy,
    pub classifier: ClassifierParams,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            rois: vec![
                Roi::new(Rect::new(480, 250, 200, 180), 8, 8).with_name("lane 1"),
                Roi::new(Rect::new(160, 250, 200, 180), 8, 8).with_name("lane 2"),
            ],
            channel_mode: ChannelMode::default(),
            contour_area_threshold: DEFAULT_CONTOUR_AREA,
            detection_count_threshold: None,
            frame_cap: None,
            worker_threads: None,
            cycle_policy: CyclePolicy::default(),
            classifier: ClassifierParams::default(),
        }
    }
}

impl OccupancyConfig {
    /// Load the configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)?;
        let config = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(config)
    }

    /// Check everything that can be checked before the first frame arrives.
    pub fn validate(&self) -> Result<()> {
        if self.rois.is_empty() {
            return Err(Error::InvalidGridConfig(
                "no regions of interest configured".into(),
            ));
        }

        for roi in &self.rois {
            roi.validate()?;
        }

        if self.worker_threads == Some(0) {
            return Err(Error::InvalidGridConfig(
                "worker pool needs at least one thread".into(),
            ));
        }

        if !(self.contour_area_threshold >= 0.0) {
            return Err(Error::InvalidGridConfig(format!(
                "contour area threshold must be non-negative, got {}",
                self.contour_area_threshold
            )));
        }

        if !(self.classifier.blur_sigma > 0.0) {
            return Err(Error::InvalidGridConfig(format!(
                "blur sigma must be positive, got {}",
                self.classifier.blur_sigma
            )));
        }

        Ok(())
    }

    /// Check that every region lies within frames of the given size.
    pub fn validate_frame_size(&self, width: u32, height: u32) -> Result<()> {
        self.rois
            .iter()
            .try_for_each(|roi| roi.validate_within(width, height))
    }

    /// Classifier described by this configuration.
    pub fn classifier(&self) -> CellClassifier {
        CellClassifier {
            params: self.classifier,
            contour_area_threshold: self.contour_area_threshold,
            detection_count_threshold: self.detection_count_threshold,
        }
    }
}
