//! # Grid partitioning
//!
//! Splits a region of interest into equally sized cells. Cell size is computed with floor
//! division, so the right and bottom remainder of a region that is not evenly divisible belongs
//! to no cell at all.

use crate::error::{Error, Result};

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Check whether the rectangle fits inside a `width` by `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Check whether two rectangles share at least one pixel.
    pub fn overlaps(&self, other: &Rect) -> bool {
        (self.x as u64) < other.right()
            && (other.x as u64) < self.right()
            && (self.y as u64) < other.bottom()
            && (other.y as u64) < self.bottom()
    }
}

/// Region of interest with its grid resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct Roi {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub rect: Rect,
    pub rows: usize,
    pub cols: usize,
}

impl Roi {
    pub fn new(rect: Rect, rows: usize, cols: usize) -> Self {
        Self {
            name: None,
            rect,
            rows,
            cols,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Width and height of each cell.
    pub fn cell_size(&self) -> (u32, u32) {
        if self.rows == 0 || self.cols == 0 {
            return (0, 0);
        }
        (
            self.rect.width / self.cols as u32,
            self.rect.height / self.rows as u32,
        )
    }

    /// Check that the grid can be laid out without empty cells.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::InvalidGridConfig(format!(
                "grid must have at least one row and column, got {}x{}",
                self.rows, self.cols
            )));
        }

        if (self.rect.width as u64) < self.cols as u64 || (self.rect.height as u64) < self.rows as u64
        {
            return Err(Error::InvalidGridConfig(format!(
                "region of {}x{} pixels is too small for a {}x{} grid",
                self.rect.width, self.rect.height, self.rows, self.cols
            )));
        }

        Ok(())
    }

    /// Check that the region lies inside a frame of the given size.
    pub fn validate_within(&self, width: u32, height: u32) -> Result<()> {
        if !self.rect.fits_within(width, height) {
            return Err(Error::InvalidGridConfig(format!(
                "region {:?} exceeds the {}x{} frame",
                self.rect, width, height
            )));
        }
        Ok(())
    }

    /// Pixel rectangle of a single cell.
    pub fn cell_rect(&self, row: usize, col: usize) -> Rect {
        let (cw, ch) = self.cell_size();
        Rect::new(
            self.rect.x + col as u32 * cw,
            self.rect.y + row as u32 * ch,
            cw,
            ch,
        )
    }
}

/// Grid cell with its position in the grid and its pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub rect: Rect,
}

/// Partition a region into `rows x cols` cells.
///
/// Cells are returned in row-major order.
///
/// # Arguments
///
/// * `roi` - region to split up. Its `rows` and `cols` are ignored in favour of the arguments.
/// * `rows` - number of grid rows.
/// * `cols` - number of grid columns.
pub fn partition(roi: &Rect, rows: usize, cols: usize) -> Result<Vec<GridCell>> {
    let roi = Roi::new(*roi, rows, cols);
    roi.validate()?;

    Ok((0..rows)
        .flat_map(|row| (0..cols).map(move |col| (row, col)))
        .map(|(row, col)| GridCell {
            row,
            col,
            rect: roi.cell_rect(row, col),
        })
        .collect())
}
