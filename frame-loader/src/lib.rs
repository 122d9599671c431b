//! Common `FrameSource` loader and frame sinks.

use occupancy::prelude::v1::*;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

mod snapshot;

pub use snapshot::{annotate, SnapshotSink};

/// File extensions picked up from frame directories.
const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp", "ppm"];

/// Create a frame source depending on the input.
///
/// A directory is read as an image sequence, in lexical file name order. A file ending with
/// `.txt` or `.lst` is read as a list of frame paths, one per line, relative to the list's own
/// directory. Any other file is treated as a sequence of that single image.
pub fn create_source(input: &str) -> Result<Box<dyn FrameSource>> {
    let path = Path::new(input);

    let source = if path.is_dir() {
        ImageSequence::from_dir(path)?
    } else if matches!(extension(path).as_deref(), Some("txt" | "lst")) {
        ImageSequence::from_list(path)?
    } else if path.is_file() {
        ImageSequence::new(vec![path.to_path_buf()])
    } else {
        return Err(anyhow!("Input {input} does not exist"));
    };

    log::info!("Reading {} frames from {}", source.remaining(), input);

    Ok(Box::new(source))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Sequence of still image files decoded one after another.
pub struct ImageSequence {
    paths: VecDeque<PathBuf>,
    dimensions: Option<(u32, u32)>,
    framerate: Option<f64>,
}

impl ImageSequence {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into(),
            dimensions: None,
            framerate: None,
        }
    }

    /// Collect every image file in a directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths = std::fs::read_dir(dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;

        paths.retain(|p| {
            p.is_file()
                && extension(p)
                    .map(|e| FRAME_EXTENSIONS.contains(&e.as_str()))
                    .unwrap_or(false)
        });

        paths.sort();

        Ok(Self::new(paths))
    }

    /// Read frame paths from a list file.
    pub fn from_list(list: &Path) -> Result<Self> {
        let base = list.parent().unwrap_or_else(|| Path::new("."));

        let paths = std::fs::read_to_string(list)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| base.join(l))
            .collect();

        Ok(Self::new(paths))
    }

    /// Set the nominal framerate reported by the source.
    pub fn with_framerate(mut self, framerate: f64) -> Self {
        self.framerate = Some(framerate);
        self
    }

    /// Number of frames not yet decoded.
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let path = match self.paths.pop_front() {
            Some(path) => path,
            None => return Ok(None),
        };

        let frame = image::open(&path)
            .map_err(|e| anyhow!("Unable to decode {}: {e}", path.display()))?
            .to_rgb8();

        self.dimensions.get_or_insert(frame.dimensions());

        Ok(Some(frame))
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn framerate(&self) -> Option<f64> {
        self.framerate
    }
}
