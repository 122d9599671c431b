//! # Frames and their collaborators
//!
//! Frames come in from a [`FrameSource`] and leave, annotated or not, through a [`FrameSink`].
//! Neither decoding nor encoding happens in this crate.

use crate::aggregator::FrameOccupancy;
use crate::error::{Error, Result};
use image::RgbImage;

/// A single decoded 8-bit RGB frame.
pub type Frame = RgbImage;

/// Two consecutive frames of equal dimensions.
#[derive(Clone, Debug)]
pub struct FramePair {
    prev: Frame,
    curr: Frame,
}

impl FramePair {
    /// Form a new frame pair.
    ///
    /// Fails with `DimensionMismatch` if the frames are not of equal size.
    pub fn new(prev: Frame, curr: Frame) -> Result<Self> {
        check_dimensions(&prev, &curr)?;
        Ok(Self { prev, curr })
    }

    pub fn prev(&self) -> &Frame {
        &self.prev
    }

    pub fn curr(&self) -> &Frame {
        &self.curr
    }

    /// Width and height shared by both frames.
    pub fn dimensions(&self) -> (u32, u32) {
        self.curr.dimensions()
    }

    /// Shift the pair forward by one frame.
    ///
    /// The current frame becomes the previous one and `next` becomes current. The pair is
    /// consumed, so a mismatching frame leaves nothing half-updated behind.
    pub fn advance(self, next: Frame) -> Result<Self> {
        Self::new(self.curr, next)
    }
}

pub(crate) fn check_dimensions(a: &Frame, b: &Frame) -> Result<()> {
    if a.dimensions() != b.dimensions() {
        Err(Error::DimensionMismatch {
            expected: a.dimensions(),
            found: b.dimensions(),
        })
    } else {
        Ok(())
    }
}

/// Sequential frame provider.
pub trait FrameSource {
    /// Decode the next frame in the stream.
    ///
    /// Returns `Ok(None)` once the stream has ended. Any decoding problem is returned as `Err`.
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;

    /// Get the frame dimensions of the stream, if known up front.
    fn dimensions(&self) -> Option<(u32, u32)> {
        None
    }

    /// Get the framerate of the stream.
    ///
    /// On image sequences and realtime streams this may not be known, in which case `None`
    /// is returned.
    fn framerate(&self) -> Option<f64> {
        None
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        (**self).dimensions()
    }

    fn framerate(&self) -> Option<f64> {
        (**self).framerate()
    }
}

/// Consumer of processed frames.
pub trait FrameSink {
    /// Accept a processed frame along with its occupancy matrices.
    ///
    /// # Arguments
    ///
    /// * `frame` - the frame the occupancy was reported for.
    /// * `occupancy` - per-ROI matrices of that frame.
    fn write_frame(&mut self, frame: &Frame, occupancy: &FrameOccupancy) -> anyhow::Result<()>;

    /// Flush any buffered output. Called once when the stream drains.
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn write_frame(&mut self, frame: &Frame, occupancy: &FrameOccupancy) -> anyhow::Result<()> {
        (**self).write_frame(frame, occupancy)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        (**self).finish()
    }
}

/// Sink that drops every frame.
#[derive(Default, Clone, Copy, Debug)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn write_frame(&mut self, _: &Frame, _: &FrameOccupancy) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink that prints the matrices of each frame through the `log` facade.
#[derive(Default, Clone, Copy, Debug)]
pub struct LogSink;

impl FrameSink for LogSink {
    fn write_frame(&mut self, _: &Frame, occupancy: &FrameOccupancy) -> anyhow::Result<()> {
        for (id, matrix) in occupancy.iter() {
            log::info!(
                "frame {} lane {}: {} occupied\n{}",
                occupancy.frame_index(),
                id,
                matrix.occupied_count(),
                matrix
            );
        }
        Ok(())
    }
}
