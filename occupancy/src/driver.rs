//! # Frame loop driver
//!
//! Runs the pipeline over a frame stream, one strictly ordered cycle per frame pair:
//!
//! 1. extract the channel stack of the pair,
//! 2. aggregate the occupancy of every region,
//! 3. append the matrices to the log,
//! 4. hand the frame and its matrices to the sink,
//! 5. advance the pair.
//!
//! The pair only advances after the frame has been logged, so frame `n + 1` never starts before
//! frame `n` is on disk.

use crate::aggregator::{aggregate, FrameOccupancy};
use crate::channels::{extract, ChannelStack};
use crate::config::{CyclePolicy, OccupancyConfig};
use crate::error::{Error, Result};
use crate::evaluator::GridEvaluator;
use crate::frame::{FramePair, FrameSink, FrameSource};
use crate::grid::Roi;
use crate::history::OccupancyLog;
use std::time::{Duration, Instant};

/// Lifecycle of a [`FrameLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    Running,
    Draining,
    Terminated,
}

/// Statistics of a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames whose occupancy was logged.
    pub frames_processed: usize,
    /// Frames dropped under `CyclePolicy::Skip`.
    pub frames_skipped: usize,
    /// Blocks in the log after the run.
    pub log_blocks: usize,
    pub elapsed: Duration,
}

/// Occupancy stage of a frame cycle.
type AggregateFn = fn(usize, &[Roi], &ChannelStack, &GridEvaluator) -> Result<FrameOccupancy>;

/// Sequential driver of the detection pipeline.
pub struct FrameLoop<S, K> {
    config: OccupancyConfig,
    evaluator: GridEvaluator,
    aggregate: AggregateFn,
    source: Option<S>,
    sink: K,
    log: Option<OccupancyLog>,
    state: DriverState,
}

impl<S: FrameSource, K: FrameSink> FrameLoop<S, K> {
    /// Create a new frame loop.
    ///
    /// The configuration is validated here, so that configuration errors surface before any
    /// frame is decoded.
    ///
    /// # Arguments
    ///
    /// * `config` - static run configuration.
    /// * `source` - frame stream to process.
    /// * `sink` - receiver of processed frames.
    /// * `log` - occupancy log to append to.
    pub fn new(config: OccupancyConfig, source: S, sink: K, log: OccupancyLog) -> Result<Self> {
        config.validate()?;

        let evaluator = GridEvaluator::new(config.classifier(), config.worker_threads)?;

        log::debug!(
            "Frame loop with {} regions, {} mode, {} workers",
            config.rois.len(),
            config.channel_mode,
            evaluator.threads()
        );

        Ok(Self {
            config,
            evaluator,
            aggregate,
            source: Some(source),
            sink,
            log: Some(log),
            state: DriverState::Initializing,
        })
    }

    /// Replace the occupancy stage, to inject per-cycle failures.
    #[cfg(test)]
    fn with_aggregate(mut self, aggregate: AggregateFn) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Process the stream until it ends, the frame cap is hit, or a fatal error occurs.
    ///
    /// The frame source and the log are released once this returns, whatever the outcome.
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.state != DriverState::Initializing {
            return Err(anyhow::anyhow!("frame loop has already run").into());
        }

        let start = Instant::now();
        let ret = self.run_cycles().map(|mut summary| {
            summary.elapsed = start.elapsed();
            summary
        });

        self.terminate();

        match &ret {
            Ok(summary) => log::info!(
                "Processed {} frames ({} skipped) in {:.2} seconds",
                summary.frames_processed,
                summary.frames_skipped,
                summary.elapsed.as_secs_f32()
            ),
            Err(e) => log::error!("Frame loop failed: {e}"),
        }

        ret
    }

    fn run_cycles(&mut self) -> Result<RunSummary> {
        let mut pair = self.initialize()?;
        let mut summary = RunSummary::default();

        self.state = DriverState::Running;

        loop {
            let cycles = summary.frames_processed + summary.frames_skipped;

            if self.config.frame_cap.map(|cap| cycles >= cap).unwrap_or(false) {
                log::info!("Frame cap of {} reached", cycles);
                break;
            }

            let ret = self.cycle(cycles + 1, &pair);
            self.settle(cycles + 1, ret, &mut summary)?;

            match self.next_frame()? {
                Some(frame) => pair = pair.advance(frame)?,
                None => {
                    log::debug!("End of stream");
                    break;
                }
            }
        }

        self.state = DriverState::Draining;

        self.sink.finish()?;

        summary.log_blocks = self.log.as_ref().map(OccupancyLog::len).unwrap_or(0);

        Ok(summary)
    }

    /// Account for the outcome of a frame cycle, applying the cycle policy to failures.
    fn settle(&self, frame_index: usize, ret: Result<()>, summary: &mut RunSummary) -> Result<()> {
        match ret {
            Ok(()) => summary.frames_processed += 1,
            Err(e) if e.is_per_cycle() && self.config.cycle_policy == CyclePolicy::Skip => {
                log::warn!("Skipping frame {frame_index}: {e}");
                summary.frames_skipped += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Read the first two frames.
    fn initialize(&mut self) -> Result<FramePair> {
        let first = self.next_frame()?.ok_or(Error::InsufficientFrames(0))?;
        let second = self.next_frame()?.ok_or(Error::InsufficientFrames(1))?;

        let pair = FramePair::new(first, second)?;

        let (width, height) = pair.dimensions();
        self.config.validate_frame_size(width, height)?;

        Ok(pair)
    }

    fn next_frame(&mut self) -> Result<Option<crate::frame::Frame>> {
        match self.source.as_mut() {
            Some(source) => source.next_frame().map_err(Error::from),
            None => Ok(None),
        }
    }

    /// Run a single frame cycle.
    fn cycle(&mut self, frame_index: usize, pair: &FramePair) -> Result<()> {
        let stack = extract(pair.prev(), pair.curr(), self.config.channel_mode)?;

        let occupancy =
            (self.aggregate)(frame_index, &self.config.rois, &stack, &self.evaluator)?;

        self.persist(&occupancy)?;

        self.sink.write_frame(pair.prev(), &occupancy)?;

        Ok(())
    }

    fn persist(&mut self, occupancy: &FrameOccupancy) -> Result<()> {
        match self.log.as_mut() {
            Some(log) => log.append_frame(occupancy),
            None => Ok(()),
        }
    }

    fn terminate(&mut self) {
        self.source = None;
        self.log = None;
        self.state = DriverState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RoiId;
    use crate::frame::{Frame, NullSink};
    use crate::grid::{Rect, Roi};
    use crate::matrix::OccupancyMatrix;
    use image::Rgb;
    use std::collections::VecDeque;

    struct VecSource(VecDeque<Frame>);

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
            Ok(self.0.pop_front())
        }
    }

    #[derive(Default)]
    struct CollectSink {
        frames: Vec<FrameOccupancy>,
        finished: bool,
    }

    impl FrameSink for CollectSink {
        fn write_frame(&mut self, _: &Frame, occupancy: &FrameOccupancy) -> anyhow::Result<()> {
            self.frames.push(occupancy.clone());
            Ok(())
        }

        fn finish(&mut self) -> anyhow::Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn config() -> OccupancyConfig {
        OccupancyConfig {
            rois: vec![
                Roi::new(Rect::new(0, 0, 80, 40), 2, 2),
                Roi::new(Rect::new(80, 0, 80, 40), 1, 4),
            ],
            worker_threads: Some(2),
            ..Default::default()
        }
    }

    /// Black frames, with a white left half on the frames listed in `lit`.
    fn frames(count: usize, lit: &[usize]) -> VecSource {
        VecSource(
            (0..count)
                .map(|i| {
                    Frame::from_fn(160, 40, |x, _| {
                        if lit.contains(&i) && x < 80 {
                            Rgb([255, 255, 255])
                        } else {
                            Rgb([0, 0, 0])
                        }
                    })
                })
                .collect(),
        )
    }

    fn open_log(dir: &tempfile::TempDir) -> OccupancyLog {
        OccupancyLog::open(dir.path().join("occupancy.csv")).unwrap()
    }

    #[test]
    fn processes_whole_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver =
            FrameLoop::new(config(), frames(4, &[1]), CollectSink::default(), open_log(&dir))
                .unwrap();

        assert_eq!(driver.state(), DriverState::Initializing);

        let summary = driver.run().unwrap();

        assert_eq!(driver.state(), DriverState::Terminated);
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.frames_skipped, 0);
        assert_eq!(summary.log_blocks, 6);
        assert!(driver.sink().finished);

        // Frame 1 lights up between the first two pairs only.
        let occupied = driver
            .sink()
            .frames
            .iter()
            .map(|f| f.get(RoiId(0)).unwrap().occupied_count())
            .collect::<Vec<_>>();
        assert_eq!(occupied, vec![4, 4, 0]);

        let indices = driver
            .sink()
            .frames
            .iter()
            .map(FrameOccupancy::frame_index)
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![1, 2, 3]);

        let blocks = OccupancyLog::load(dir.path().join("occupancy.csv")).unwrap();
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks[0].dim(), (2, 2));
        assert_eq!(blocks[1], OccupancyMatrix::new(1, 4));
        assert_eq!(blocks[4].occupied_count(), 0);
    }

    #[test]
    fn frame_cap() {
        let dir = tempfile::tempdir().unwrap();
        let config = OccupancyConfig {
            frame_cap: Some(2),
            ..config()
        };

        let summary = FrameLoop::new(config, frames(10, &[]), NullSink, open_log(&dir))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(summary.frames_processed, 2);
        assert_eq!(summary.log_blocks, 4);
    }

    #[test]
    fn insufficient_frames() {
        for count in 0..2 {
            let dir = tempfile::tempdir().unwrap();
            let mut driver =
                FrameLoop::new(config(), frames(count, &[]), NullSink, open_log(&dir)).unwrap();

            match driver.run() {
                Err(Error::InsufficientFrames(n)) => assert_eq!(n, count),
                other => panic!("unexpected result: {other:?}"),
            }
            assert_eq!(driver.state(), DriverState::Terminated);
        }
    }

    #[test]
    fn resized_stream_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = frames(3, &[]);
        source.0.push_back(Frame::new(200, 40));

        let mut driver =
            FrameLoop::new(config(), source, CollectSink::default(), open_log(&dir)).unwrap();

        assert!(matches!(
            driver.run(),
            Err(Error::DimensionMismatch { .. })
        ));
        assert_eq!(driver.sink().frames.len(), 2);
    }

    #[test]
    fn regions_must_fit_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let source = VecSource(vec![Frame::new(100, 40), Frame::new(100, 40)].into());

        let mut driver = FrameLoop::new(config(), source, NullSink, open_log(&dir)).unwrap();

        assert!(matches!(driver.run(), Err(Error::InvalidGridConfig(_))));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.rois[0].cols = 0;

        assert!(FrameLoop::new(config, frames(3, &[]), NullSink, open_log(&dir)).is_err());
    }

    fn classification_error() -> Error {
        Error::CellClassification {
            row: 1,
            col: 2,
            reason: "malformed plane".into(),
        }
    }

    #[test]
    fn cycle_policies() {
        let dir = tempfile::tempdir().unwrap();

        let skip = OccupancyConfig {
            cycle_policy: CyclePolicy::Skip,
            ..config()
        };
        let driver = FrameLoop::new(skip, frames(0, &[]), NullSink, open_log(&dir)).unwrap();
        let mut summary = RunSummary::default();

        driver.settle(1, Ok(()), &mut summary).unwrap();
        driver
            .settle(2, Err(classification_error()), &mut summary)
            .unwrap();
        assert_eq!(summary.frames_processed, 1);
        assert_eq!(summary.frames_skipped, 1);

        // Stream errors stay fatal whatever the policy.
        assert!(driver
            .settle(3, Err(Error::InsufficientFrames(1)), &mut summary)
            .is_err());

        let driver = FrameLoop::new(config(), frames(0, &[]), NullSink, open_log(&dir)).unwrap();
        assert_eq!(driver.config.cycle_policy, CyclePolicy::Abort);
        assert!(matches!(
            driver.settle(1, Err(classification_error()), &mut summary),
            Err(Error::CellClassification { row: 1, col: 2, .. })
        ));
    }

    /// Occupancy stage that fails on the second frame.
    fn fail_second_frame(
        frame_index: usize,
        rois: &[Roi],
        stack: &ChannelStack,
        evaluator: &GridEvaluator,
    ) -> Result<FrameOccupancy> {
        if frame_index == 2 {
            Err(classification_error())
        } else {
            aggregate(frame_index, rois, stack, evaluator)
        }
    }

    #[test]
    fn skipped_frame_is_neither_logged_nor_sunk() {
        let dir = tempfile::tempdir().unwrap();
        let config = OccupancyConfig {
            cycle_policy: CyclePolicy::Skip,
            ..config()
        };

        let mut driver =
            FrameLoop::new(config, frames(4, &[1]), CollectSink::default(), open_log(&dir))
                .unwrap()
                .with_aggregate(fail_second_frame);

        let summary = driver.run().unwrap();

        assert_eq!(summary.frames_processed, 2);
        assert_eq!(summary.frames_skipped, 1);
        assert_eq!(summary.log_blocks, 4);
        assert!(driver.sink().finished);

        let indices = driver
            .sink()
            .frames
            .iter()
            .map(FrameOccupancy::frame_index)
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![1, 3]);

        // Blocks of frames 1 and 3 only: frame 1 is lit, frame 3 is not.
        let blocks = OccupancyLog::load(dir.path().join("occupancy.csv")).unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].occupied_count(), 4);
        assert_eq!(blocks[2].occupied_count(), 0);
    }

    #[test]
    fn failed_frame_aborts_by_default() {
        let dir = tempfile::tempdir().unwrap();

        let mut driver =
            FrameLoop::new(config(), frames(4, &[1]), CollectSink::default(), open_log(&dir))
                .unwrap()
                .with_aggregate(fail_second_frame);

        assert!(matches!(
            driver.run(),
            Err(Error::CellClassification { row: 1, col: 2, .. })
        ));
        assert_eq!(driver.state(), DriverState::Terminated);
        assert_eq!(driver.sink().frames.len(), 1);
        assert!(!driver.sink().finished);
        assert_eq!(
            OccupancyLog::load(dir.path().join("occupancy.csv"))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn runs_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = FrameLoop::new(config(), frames(3, &[]), NullSink, open_log(&dir)).unwrap();

        assert!(driver.run().is_ok());
        assert!(driver.run().is_err());
    }
}
