//! # Lane occupancy aggregation

use crate::channels::ChannelStack;
use crate::error::Result;
use crate::evaluator::GridEvaluator;
use crate::grid::Roi;
use crate::matrix::OccupancyMatrix;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a configured region, its index in configuration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoiId(pub usize);

impl fmt::Display for RoiId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Occupancy of every region in one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameOccupancy {
    frame_index: usize,
    matrices: BTreeMap<RoiId, OccupancyMatrix>,
}

impl FrameOccupancy {
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn get(&self, id: RoiId) -> Option<&OccupancyMatrix> {
        self.matrices.get(&id)
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Iterate matrices in `RoiId` order.
    pub fn iter(&self) -> impl Iterator<Item = (RoiId, &OccupancyMatrix)> + '_ {
        self.matrices.iter().map(|(&id, m)| (id, m))
    }

    pub fn into_matrices(self) -> BTreeMap<RoiId, OccupancyMatrix> {
        self.matrices
    }
}

/// Evaluate every region against the same channel stack.
///
/// Regions are evaluated concurrently with each other, and their cells concurrently within.
/// Either every matrix of the frame is returned, or the first error in region order.
///
/// # Arguments
///
/// * `frame_index` - index of the frame cycle, carried into the result.
/// * `rois` - configured regions, indexed by their `RoiId`.
/// * `stack` - channel planes of the frame cycle.
/// * `evaluator` - worker pool and classifier to evaluate with.
pub fn aggregate(
    frame_index: usize,
    rois: &[Roi],
    stack: &ChannelStack,
    evaluator: &GridEvaluator,
) -> Result<FrameOccupancy> {
    let results = evaluator.install(|| {
        rois.par_iter()
            .map(|roi| evaluator.evaluate_in_pool(roi, stack))
            .collect::<Vec<_>>()
    });

    let matrices = results
        .into_iter()
        .enumerate()
        .map(|(i, m)| m.map(|m| (RoiId(i), m)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(FrameOccupancy {
        frame_index,
        matrices,
    })
}
