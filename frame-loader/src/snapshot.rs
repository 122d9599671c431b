//! Annotated frame snapshots.

use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as DrawRect;
use occupancy::prelude::v1::*;
use std::path::PathBuf;

const EMPTY_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
const OCCUPIED_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline width of the cell rectangles, in pixels.
const OUTLINE: u32 = 2;

/// Draw the occupancy grid of every region onto a copy of the frame.
///
/// Empty cells are outlined in red and occupied cells in green. Occupied cells are drawn last,
/// so they stay visible where regions overlap.
pub fn annotate(frame: &Frame, rois: &[Roi], occupancy: &FrameOccupancy) -> Frame {
    let mut out = frame.clone();

    for pass in [Occupancy::Empty, Occupancy::Occupied] {
        let colour = match pass {
            Occupancy::Empty => EMPTY_COLOUR,
            Occupancy::Occupied => OCCUPIED_COLOUR,
        };

        for (id, matrix) in occupancy.iter() {
            let roi = match rois.get(id.0) {
                Some(roi) => roi,
                None => continue,
            };

            for (row, col, _) in matrix.iter().filter(|&(_, _, o)| o == pass) {
                let cell = roi.cell_rect(row, col);

                for inset in 0..OUTLINE {
                    if cell.width <= 2 * inset || cell.height <= 2 * inset {
                        break;
                    }
                    let rect = DrawRect::at((cell.x + inset) as i32, (cell.y + inset) as i32)
                        .of_size(cell.width - 2 * inset, cell.height - 2 * inset);
                    draw_hollow_rect_mut(&mut out, rect, colour);
                }
            }
        }
    }

    out
}

/// Sink writing every annotated frame as a JPEG image.
///
/// Frames are named `frame_0001.jpg`, `frame_0002.jpg`, and so on, by frame index.
pub struct SnapshotSink {
    dir: PathBuf,
    rois: Vec<Roi>,
    written: usize,
}

impl SnapshotSink {
    /// Create a new snapshot sink, creating the output directory if needed.
    ///
    /// # Arguments
    ///
    /// * `dir` - directory to write the frames into.
    /// * `rois` - regions the occupancy matrices refer to, in `RoiId` order.
    pub fn new(dir: impl Into<PathBuf>, rois: Vec<Roi>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            rois,
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for SnapshotSink {
    fn write_frame(&mut self, frame: &Frame, occupancy: &FrameOccupancy) -> Result<()> {
        let path = self
            .dir
            .join(format!("frame_{:04}.jpg", occupancy.frame_index()));

        annotate(frame, &self.rois, occupancy).save(&path)?;

        self.written += 1;

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        log::info!("Wrote {} snapshots to {}", self.written, self.dir.display());
        Ok(())
    }
}
