//! # Parallel grid evaluation
//!
//! Classifies every cell of a region on a bounded worker pool. Workers only ever return
//! `(row, col, decision)` tuples; the calling thread writes them into the matrix once all of
//! them are in.

use crate::channels::ChannelStack;
use crate::classifier::{CellClassifier, Occupancy};
use crate::error::{Error, Result};
use crate::grid::{partition, Roi};
use crate::matrix::OccupancyMatrix;
use rayon::prelude::*;

/// Bounded pool of classification workers.
pub struct GridEvaluator {
    pool: rayon::ThreadPool,
    classifier: CellClassifier,
}

impl GridEvaluator {
    /// Create a new evaluator.
    ///
    /// # Arguments
    ///
    /// * `classifier` - classifier applied to every cell.
    /// * `threads` - number of worker threads. `None` lets rayon pick one per logical CPU.
    pub fn new(classifier: CellClassifier, threads: Option<usize>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.unwrap_or(0))
            .thread_name(|i| format!("occupancy-worker-{i}"))
            .build()
            .map_err(|e| anyhow::anyhow!("unable to start worker pool: {e}"))?;

        Ok(Self { pool, classifier })
    }

    pub fn classifier(&self) -> &CellClassifier {
        &self.classifier
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` on the worker pool, blocking until it returns.
    pub(crate) fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Compute the occupancy matrix of a region.
    ///
    /// Returns only once every cell has been classified. If any cell fails, the whole matrix
    /// is discarded and the first failure, in row-major order, is returned.
    pub fn evaluate(&self, roi: &Roi, stack: &ChannelStack) -> Result<OccupancyMatrix> {
        self.install(|| self.evaluate_in_pool(roi, stack))
    }

    /// Same as `evaluate`, but expects to already be running inside the pool.
    pub(crate) fn evaluate_in_pool(&self, roi: &Roi, stack: &ChannelStack) -> Result<OccupancyMatrix> {
        let cells = partition(&roi.rect, roi.rows, roi.cols)?;

        let decisions = cells
            .par_iter()
            .map(|cell| {
                self.classifier
                    .classify(&cell.rect, stack)
                    .map(|occupancy| (cell.row, cell.col, occupancy))
                    .map_err(|e| Error::CellClassification {
                        row: cell.row,
                        col: cell.col,
                        reason: e.to_string(),
                    })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let mut matrix = OccupancyMatrix::new(roi.rows, roi.cols);

        for (row, col, occupancy) in decisions {
            if occupancy == Occupancy::Occupied {
                matrix.set(row, col, occupancy);
            }
        }

        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{extract, ChannelMode};
    use crate::frame::Frame;
    use crate::grid::Rect;
    use image::{GrayImage, Rgb};

    fn evaluator() -> GridEvaluator {
        GridEvaluator::new(CellClassifier::default(), Some(4)).unwrap()
    }

    fn lane() -> Roi {
        Roi::new(Rect::new(0, 0, 480, 180), 8, 8)
    }

    #[test]
    fn bounded_pool() {
        assert_eq!(evaluator().threads(), 4);
    }

    #[test]
    fn identical_frames_are_empty() {
        let frame = Frame::from_pixel(480, 180, Rgb([120, 80, 40]));
        let stack = extract(&frame, &frame, ChannelMode::V).unwrap();

        let matrix = evaluator().evaluate(&lane(), &stack).unwrap();

        assert_eq!(matrix.dim(), (8, 8));
        assert_eq!(matrix.occupied_count(), 0);
    }

    #[test]
    fn saturated_frames_are_occupied() {
        let prev = Frame::new(480, 180);
        let curr = Frame::from_pixel(480, 180, Rgb([255, 255, 255]));

        for mode in [ChannelMode::Grayscale, ChannelMode::V] {
            let stack = extract(&prev, &curr, mode).unwrap();
            let matrix = evaluator().evaluate(&lane(), &stack).unwrap();

            assert_eq!(matrix.dim(), (8, 8));
            assert_eq!(matrix.occupied_count(), 64, "{mode}");
        }
    }

    #[test]
    fn single_block() {
        let prev = Frame::new(480, 180);
        let mut curr = prev.clone();

        // Cell (2, 3) spans x 180..240, y 44..66.
        for y in 48..62 {
            for x in 190..230 {
                curr.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let stack = extract(&prev, &curr, ChannelMode::Grayscale).unwrap();
        let matrix = evaluator().evaluate(&lane(), &stack).unwrap();

        for (row, col, occupancy) in matrix.iter() {
            assert_eq!(
                occupancy.is_occupied(),
                (row, col) == (2, 3),
                "({row}, {col})"
            );
        }
    }

    #[test]
    fn deterministic() {
        let prev = Frame::from_fn(480, 180, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 7]));
        let curr = Frame::from_fn(480, 180, |x, y| {
            Rgb([((x * 3) % 256) as u8, ((x + y) % 256) as u8, (y % 64) as u8])
        });

        let stack = extract(&prev, &curr, ChannelMode::HV).unwrap();

        let a = evaluator().evaluate(&lane(), &stack).unwrap();
        let b = GridEvaluator::new(CellClassifier::default(), Some(1))
            .unwrap()
            .evaluate(&lane(), &stack)
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn failing_cell_aborts_the_region() {
        // The region reaches past the plane, so the right column of cells can not be classified.
        let stack = ChannelStack::from_planes(vec![GrayImage::new(100, 100)]);
        let roi = Roi::new(Rect::new(0, 0, 120, 100), 2, 2);

        match evaluator().evaluate(&roi, &stack) {
            Err(Error::CellClassification { row: 0, col: 1, .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalid_grid_is_rejected() {
        let stack = ChannelStack::from_planes(vec![GrayImage::new(100, 100)]);
        let roi = Roi::new(Rect::new(0, 0, 4, 100), 2, 8);

        assert!(matches!(
            evaluator().evaluate(&roi, &stack),
            Err(Error::InvalidGridConfig(_))
        ));
    }
}
