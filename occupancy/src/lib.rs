//! # Grid Occupancy Detection Library
//!
//! This library detects which cells of a grid laid over one or more regions of interest
//! contain motion, frame by frame, and keeps an append-only history of the results. It is used
//! to measure lane occupancy in traffic footage.
//!
//! A frame cycle goes through the following stages:
//!
//! 1. [`channels`] - difference the frame pair and extract intensity planes.
//! 2. [`grid`] - partition each region into cells.
//! 3. [`classifier`] - decide whether a cell is occupied.
//! 4. [`evaluator`] - classify all cells of a region in parallel.
//! 5. [`aggregator`] - evaluate every region of the frame.
//! 6. [`history`] - append the matrices to the occupancy log.
//!
//! [`driver`] ties these together over a [`frame::FrameSource`].
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use occupancy::prelude::v1::*;
//! ```

pub mod aggregator;
pub mod channels;
pub mod classifier;
pub mod config;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod grid;
pub mod history;
pub mod matrix;

pub use error::{Error, Result};

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            aggregator::{aggregate, FrameOccupancy, RoiId},
            channels::{extract, ChannelMode, ChannelStack},
            classifier::{CellClassifier, ClassifierParams, Occupancy},
            config::{CyclePolicy, OccupancyConfig},
            driver::{DriverState, FrameLoop, RunSummary},
            error::LogWriteError,
            evaluator::GridEvaluator,
            frame::{Frame, FramePair, FrameSink, FrameSource, LogSink, NullSink},
            grid::{partition, GridCell, Rect, Roi},
            history::OccupancyLog,
            matrix::OccupancyMatrix,
        };
        pub use anyhow::{anyhow, Result};
    }
}
