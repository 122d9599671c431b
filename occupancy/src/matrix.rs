//! # Occupancy matrices

use crate::classifier::Occupancy;
use std::fmt;

/// Row-major `rows x cols` grid of occupancy decisions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OccupancyMatrix {
    cells: Vec<bool>,
    cols: usize,
}

impl OccupancyMatrix {
    /// Create an all-empty matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            cells: vec![false; rows * cols],
            cols,
        }
    }

    /// Create a matrix from its rows.
    ///
    /// Returns `None` if the rows are not all of equal length.
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Option<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);

        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }

        Some(Self {
            cells: rows.into_iter().flatten().collect(),
            cols,
        })
    }

    /// Get number of rows and columns.
    pub fn dim(&self) -> (usize, usize) {
        if self.cols == 0 {
            (0, 0)
        } else {
            (self.cells.len() / self.cols, self.cols)
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Occupancy {
        self.cells[row * self.cols + col].into()
    }

    pub fn set(&mut self, row: usize, col: usize, occupancy: Occupancy) {
        self.cells[row * self.cols + col] = occupancy.is_occupied();
    }

    pub fn is_occupied(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_occupied()
    }

    /// Number of occupied cells.
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Iterate the rows of the matrix.
    pub fn rows(&self) -> impl Iterator<Item = &[bool]> + '_ {
        self.cells.chunks(self.cols.max(1))
    }

    /// Iterate every cell.
    ///
    /// The resulting iterator yields `(row, col, occupancy)` entries in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Occupancy)> + '_ {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &c)| (i / cols, i % cols, c.into()))
    }
}

impl fmt::Display for OccupancyMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in self.rows() {
            let line = row
                .iter()
                .map(|&c| if c { "1" } else { "0" })
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "[{line}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut m = OccupancyMatrix::new(2, 3);
        m.set(1, 2, Occupancy::Occupied);

        assert_eq!(m.dim(), (2, 3));
        assert_eq!(m.get(1, 2), Occupancy::Occupied);
        assert_eq!(m.get(0, 2), Occupancy::Empty);
        assert_eq!(m.occupied_count(), 1);
        assert_eq!(m.to_string(), "[0 0 0]\n[0 0 1]\n");
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(OccupancyMatrix::from_rows(vec![vec![true], vec![true, false]]).is_none());
        let m = OccupancyMatrix::from_rows(vec![vec![true, false], vec![false, false]]).unwrap();
        assert_eq!(m.iter().filter(|(_, _, o)| o.is_occupied()).count(), 1);
        assert_eq!(m.iter().next(), Some((0, 0, Occupancy::Occupied)));
    }
}
