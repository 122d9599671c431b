//! # Occupancy history log
//!
//! Durable, append-only history of occupancy matrices. The log is a CSV file in which every
//! matrix is a block of `rows` lines holding `cols` comma separated `0`/`1` values, and blocks
//! are separated by a single empty line:
//!
//! ```text
//! 0,0,1
//! 0,1,1
//!
//! 0,0,0
//! 0,0,1
//! ```
//!
//! Readers get the matrices back in append order by splitting on empty lines.

use crate::aggregator::FrameOccupancy;
use crate::error::{LogWriteError, Result};
use crate::matrix::OccupancyMatrix;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Single-writer handle to an occupancy log on disk.
#[derive(Debug)]
pub struct OccupancyLog {
    path: PathBuf,
    file: File,
    blocks: usize,
    /// Length the file must have before the next append.
    end: u64,
    /// The file ends with a line terminator (or is empty).
    terminated: bool,
    /// The last line of the file is blank (or the file is empty).
    separated: bool,
    poisoned: bool,
}

impl OccupancyLog {
    /// Open the log at `path`, creating an empty one if there is none.
    ///
    /// An existing log is parsed first, so that appends continue after its last block. A log
    /// that exists but can not be parsed is never overwritten; it is reported as corrupted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let (blocks, terminated, separated) = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let blocks = parse_blocks(&contents).map_err(|reason| {
                    LogWriteError::Corrupted {
                        path: path.clone(),
                        reason,
                    }
                })?;
                log::info!("Resuming occupancy log {:?} at block {}", path, blocks.len());
                let terminated = contents.is_empty() || contents.ends_with('\n');
                let separated = contents
                    .lines()
                    .last()
                    .map_or(true, |line| line.trim().is_empty());
                (blocks.len(), terminated, separated)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No occupancy log at {:?}, starting a new one", path);
                (0, true, true)
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(LogWriteError::Corrupted {
                    path,
                    reason: e.to_string(),
                }
                .into())
            }
            Err(source) => return Err(LogWriteError::Io { path, source }.into()),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogWriteError::Io {
                path: path.clone(),
                source,
            })?;

        let end = file
            .seek(SeekFrom::End(0))
            .map_err(|source| LogWriteError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file,
            blocks,
            end,
            terminated,
            separated,
            poisoned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of blocks in the log.
    pub fn len(&self) -> usize {
        self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks == 0
    }

    /// Append a matrix as a new block.
    ///
    /// Once an append fails, the log is poisoned and refuses every following append.
    pub fn append(&mut self, matrix: &OccupancyMatrix) -> Result<()> {
        if self.poisoned {
            return Err(LogWriteError::Poisoned {
                path: self.path.clone(),
            }
            .into());
        }

        let ret = self.try_append(matrix);

        if ret.is_err() {
            self.poisoned = true;
        }

        ret.map_err(Into::into)
    }

    /// Append every region's matrix of a frame, in region order.
    pub fn append_frame(&mut self, occupancy: &FrameOccupancy) -> Result<()> {
        occupancy.iter().try_for_each(|(_, m)| self.append(m))
    }

    fn try_append(&mut self, matrix: &OccupancyMatrix) -> Result<(), LogWriteError> {
        let io_err = |source| LogWriteError::Io {
            path: self.path.clone(),
            source,
        };

        let len = self.file.metadata().map_err(io_err)?.len();

        if len != self.end {
            return Err(LogWriteError::Corrupted {
                path: self.path.clone(),
                reason: format!(
                    "file is {len} bytes long, expected {} bytes after the last append",
                    self.end
                ),
            });
        }

        let mut buf = vec![];

        // Exactly one blank row between blocks, whatever state a resumed file was left in.
        if !self.terminated {
            buf.push(b'\n');
        }

        if !self.separated {
            buf.push(b'\n');
        }

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(&mut buf);

            for row in matrix.rows() {
                writer
                    .write_record(row.iter().map(|&c| if c { "1" } else { "0" }))
                    .map_err(|source| LogWriteError::Csv {
                        path: self.path.clone(),
                        source,
                    })?;
            }

            writer.flush().map_err(io_err)?;
        }

        self.file.write_all(&buf).map_err(io_err)?;
        self.file.flush().map_err(io_err)?;

        self.end += buf.len() as u64;
        self.blocks += 1;
        self.terminated = true;
        self.separated = false;

        Ok(())
    }

    /// Read every block of the log at `path`, in append order.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<OccupancyMatrix>> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|source| LogWriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        parse_blocks(&contents).map_err(|reason| {
            LogWriteError::Corrupted {
                path: path.to_path_buf(),
                reason,
            }
            .into()
        })
    }
}

/// Split log contents into matrices.
fn parse_blocks(contents: &str) -> Result<Vec<OccupancyMatrix>, String> {
    let mut blocks = vec![];
    let mut current = String::new();

    for line in contents.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(parse_block(&current, blocks.len())?);
                current.clear();
            }
        } else {
            current.push_str(line.trim_end());
            current.push('\n');
        }
    }

    Ok(blocks)
}

fn parse_block(block: &str, index: usize) -> Result<OccupancyMatrix, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(block.as_bytes());

    let rows = reader
        .records()
        .map(|record| {
            let record = record.map_err(|e| format!("block {index}: {e}"))?;
            record
                .iter()
                .map(|v| match v.trim() {
                    "0" => Ok(false),
                    "1" => Ok(true),
                    v => Err(format!("block {index}: unexpected cell value `{v}`")),
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    OccupancyMatrix::from_rows(rows).ok_or_else(|| format!("block {index} is not rectangular"))
}
