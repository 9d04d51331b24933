//! Data containers
//!
//! Column-major matrix used to pass feature data between the dataset layer
//! and the models.
use std::fmt::{self, Display};

/// Contiguous column-major matrix data container.
///
/// Holds a dense matrix of values in a single borrowed memory block, in
/// column-major (Fortran-style) order, which allows for cheap column slicing
/// during split search.
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix over column-major data.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "data length must equal rows * cols");
        Matrix { data, rows, cols }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - The jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }

    /// Get an entire column of the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }

    /// Get a slice of a column in the matrix.
    ///
    /// * `col` - The index of the column to select.
    /// * `start_row` - The index of the start of the slice.
    /// * `end_row` - The index of the end of the slice of the column to select.
    pub fn get_col_slice(&self, col: usize, start_row: usize, end_row: usize) -> &[T] {
        &self.data[col * self.rows + start_row..col * self.rows + end_row]
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        (0..self.cols).map(|j| *self.get(row, j)).collect()
    }
}

impl<'a, T> fmt::Display for Matrix<'a, T>
where
    T: Display,
{
    /// Format a Matrix.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut val = String::new();
        for i in 0..self.rows {
            for j in 0..self.cols {
                val.push_str(&self.get(i, j).to_string());
                if j == (self.cols - 1) {
                    val.push('\n');
                } else {
                    val.push(' ');
                }
            }
        }
        write!(f, "{}", val)
    }
}

/// Gather a row subset of column-major data into a new column-major buffer.
///
/// * `data` - Source matrix.
/// * `indices` - Row indices to keep, in output order.
pub fn gather_rows(data: &Matrix<f64>, indices: &[usize]) -> Vec<f64> {
    let mut out = Vec::with_capacity(indices.len() * data.cols);
    for col in 0..data.cols {
        let col_data = data.get_col(col);
        for &i in indices {
            out.push(col_data[i]);
        }
    }
    out
}
