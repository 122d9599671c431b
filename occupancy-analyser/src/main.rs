//! Analyse how often each cell of each region was occupied.

use clap::*;
use occupancy::prelude::v1::{Result, *};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("occupancy-analyser")
        .version(crate_version!())
        .about(crate_description!())
        .arg(Arg::new("log").takes_value(true).required(true))
        .arg(
            Arg::new("rois")
                .long("rois")
                .short('r')
                .takes_value(true)
                .default_value("1")
                .help("Number of regions logged per frame"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .takes_value(true)
                .help("Write per-cell statistics to this CSV file"),
        )
        .get_matches();

    let path = matches.value_of("log").unwrap_or_default();
    let rois: usize = matches.value_of("rois").unwrap_or("1").parse()?;

    let blocks = OccupancyLog::load(path)?;

    let stats = analyse(&blocks, rois)?;

    for s in &stats {
        println!(
            "Lane {}: {} frames, {:.2} occupied cells per frame",
            s.roi,
            s.frames,
            s.mean_occupied()
        );
        print!("{}", s.ratio_table());
    }

    if let Some(output) = matches.value_of("output") {
        let mut writer = csv::Writer::from_writer(File::create(output)?);
        for record in stats.iter().flat_map(RoiStatistics::records) {
            writer.serialize(record)?;
        }
        writer.flush()?;
        log::info!("Wrote cell statistics to {output}");
    }

    Ok(())
}

/// Split log blocks into regions and compute their statistics.
///
/// Blocks are expected in frame order, with `rois` consecutive blocks per frame. A trailing
/// incomplete frame is ignored.
fn analyse(blocks: &[OccupancyMatrix], rois: usize) -> Result<Vec<RoiStatistics>> {
    if rois == 0 {
        return Err(anyhow!("There must be at least one region per frame"));
    }

    let frames = blocks.len() / rois;

    if blocks.len() % rois != 0 {
        log::warn!(
            "Log ends with an incomplete frame ({} of {} blocks), ignoring it",
            blocks.len() % rois,
            rois
        );
    }

    let blocks = &blocks[..frames * rois];

    (0..rois)
        .into_par_iter()
        .map(|roi| RoiStatistics::new(roi, blocks.iter().skip(roi).step_by(rois)))
        .collect()
}

#[derive(Serialize, Debug, PartialEq)]
struct CellRecord {
    roi: usize,
    row: usize,
    col: usize,
    occupied_frames: usize,
    ratio: f32,
}

struct RoiStatistics {
    roi: usize,
    frames: usize,
    dim: (usize, usize),
    /// Occupied frame count of each cell, row-major.
    counts: Vec<usize>,
}

impl RoiStatistics {
    fn new<'a>(roi: usize, blocks: impl Iterator<Item = &'a OccupancyMatrix>) -> Result<Self> {
        let mut stats = Self {
            roi,
            frames: 0,
            dim: (0, 0),
            counts: vec![],
        };

        for (frame, block) in blocks.enumerate() {
            if frame == 0 {
                stats.dim = block.dim();
                stats.counts = vec![0; stats.dim.0 * stats.dim.1];
            } else if block.dim() != stats.dim {
                return Err(anyhow!(
                    "Lane {roi} changes shape from {:?} to {:?} at frame {}",
                    stats.dim,
                    block.dim(),
                    frame + 1
                ));
            }

            for (row, col, occupancy) in block.iter() {
                if occupancy.is_occupied() {
                    stats.counts[row * stats.dim.1 + col] += 1;
                }
            }

            stats.frames += 1;
        }

        Ok(stats)
    }

    fn ratio(&self, idx: usize) -> f32 {
        if self.frames == 0 {
            0.0
        } else {
            self.counts[idx] as f32 / self.frames as f32
        }
    }

    fn mean_occupied(&self) -> f32 {
        if self.frames == 0 {
            0.0
        } else {
            self.counts.iter().sum::<usize>() as f32 / self.frames as f32
        }
    }

    fn ratio_table(&self) -> String {
        let cols = self.dim.1.max(1);
        (0..self.counts.len())
            .map(|i| {
                let sep = if (i + 1) % cols == 0 { "\n" } else { " " };
                format!("{:.2}{sep}", self.ratio(i))
            })
            .collect()
    }

    fn records(&self) -> impl Iterator<Item = CellRecord> + '_ {
        let cols = self.dim.1.max(1);
        (0..self.counts.len()).map(move |i| CellRecord {
            roi: self.roi,
            row: i / cols,
            col: i % cols,
            occupied_frames: self.counts[i],
            ratio: self.ratio(i),
        })
    }
}
