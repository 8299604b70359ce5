//! Lower-triangular dissimilarity matrices: storage plus the §6 text
//! format (`N`, then one line per sample with its distances to every
//! earlier sample).

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use ndarray::Array2;

use crate::error::{BetaDivError, DataConsistencyError, InputFormatError};

/// A square, symmetric dissimilarity matrix over a fixed sample order.
/// Only entries below the diagonal are ever written or read; the diagonal
/// is always zero and the upper triangle mirrors the lower one in memory
/// for convenient `get(i, j)` lookups regardless of argument order.
#[derive(Debug, Clone)]
pub struct DissimilarityMatrix {
    sample_names: Vec<String>,
    values: Array2<f64>,
}

impl DissimilarityMatrix {
    /// A zeroed matrix over `sample_names`, in the given order.
    pub fn zeros(sample_names: Vec<String>) -> Self {
        let n = sample_names.len();
        Self {
            sample_names,
            values: Array2::zeros((n, n)),
        }
    }

    /// Number of samples.
    pub fn n(&self) -> usize {
        self.sample_names.len()
    }

    /// Sample names, in matrix order.
    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    /// Set the (symmetric) distance between `i` and `j`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.values[[i, j]] = value;
        self.values[[j, i]] = value;
    }

    /// Get the distance between `i` and `j` (zero if `i == j`).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[[i, j]]
    }

    /// Lower-triangle entries only, in row-major `(i, j)` order with
    /// `i > j`, used by the calculator correlator (§4.6).
    pub fn lower_triangle(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n() * self.n().saturating_sub(1) / 2);
        for i in 1..self.n() {
            for j in 0..i {
                out.push(self.values[[i, j]]);
            }
        }
        out
    }

    /// Render in the §6 textual format.
    pub fn to_text(&self) -> String {
        let mut out = format!("{}\n", self.n());
        for i in 0..self.n() {
            out.push_str(&self.sample_names[i]);
            for j in 0..i {
                out.push('\t');
                out.push_str(&format!("{}", self.values[[i, j]]));
            }
            out.push('\n');
        }
        out
    }

    /// Write to `path` in the §6 textual format.
    pub fn write_to(&self, path: &Path) -> Result<(), BetaDivError> {
        let mut file = std::fs::File::create(path).map_err(|e| BetaDivError::io(path, e))?;
        file.write_all(self.to_text().as_bytes())
            .map_err(|e| BetaDivError::io(path, e))
    }

    /// Parse a matrix out of the §6 textual format.
    pub fn from_reader(reader: impl Read) -> Result<Self, BetaDivError> {
        let mut lines = BufReader::new(reader).lines();
        let header = lines
            .next()
            .ok_or(InputFormatError::EmptyTable)?
            .map_err(|e| BetaDivError::io("<dissimilarity matrix>", e))?;
        let n: usize = header
            .trim()
            .parse()
            .map_err(|source| InputFormatError::Numeric {
                value: header.clone(),
                source,
            })?;

        let mut sample_names = Vec::with_capacity(n);
        let mut values = Array2::zeros((n, n));
        for i in 0..n {
            let line = lines
                .next()
                .ok_or(InputFormatError::RowColumnMismatch {
                    row: i,
                    found: 0,
                    expected: i,
                })?
                .map_err(|e| BetaDivError::io("<dissimilarity matrix>", e))?;
            let mut cells = line.split('\t');
            let name = cells.next().unwrap_or_default().to_string();

            let mut found = 0;
            for (j, cell) in cells.enumerate() {
                let value: f64 = cell
                    .trim()
                    .parse()
                    .map_err(|source| InputFormatError::Numeric {
                        value: cell.to_string(),
                        source,
                    })?;
                values[[i, j]] = value;
                values[[j, i]] = value;
                found += 1;
            }
            if found != i {
                return Err(InputFormatError::RowColumnMismatch {
                    row: i,
                    found,
                    expected: i,
                }
                .into());
            }
            sample_names.push(name);
        }

        Ok(Self {
            sample_names,
            values,
        })
    }

    /// Parse a matrix out of a §6-formatted file.
    pub fn from_file(path: &Path) -> Result<Self, BetaDivError> {
        let file = std::fs::File::open(path).map_err(|e| BetaDivError::io(path, e))?;
        Self::from_reader(file)
    }

    /// Check this is a genuine square symmetric matrix (to within `tol`),
    /// as required before feeding it to a clusterer.
    pub fn validate_symmetric(&self, tol: f64) -> Result<(), BetaDivError> {
        let n = self.n();
        for i in 0..n {
            for j in 0..n {
                if (self.values[[i, j]] - self.values[[j, i]]).abs() > tol {
                    return Err(DataConsistencyError::InvalidMatrix(format!(
                        "entry ({i}, {j}) is not symmetric with ({j}, {i})"
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_matrix() -> DissimilarityMatrix {
        let mut matrix = DissimilarityMatrix::zeros(vec!["S1".into(), "S2".into(), "S3".into()]);
        matrix.set(1, 0, 1.0);
        matrix.set(2, 0, 0.5);
        matrix.set(2, 1, 0.5);
        matrix
    }

    #[test]
    fn text_roundtrip() {
        let matrix = sample_matrix();
        let text = matrix.to_text();
        let parsed = DissimilarityMatrix::from_reader(Cursor::new(text.into_bytes())).unwrap();
        assert_eq!(parsed.sample_names(), matrix.sample_names());
        for i in 0..3 {
            for j in 0..3 {
                assert!((parsed.get(i, j) - matrix.get(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn first_row_has_only_the_sample_name() {
        let matrix = sample_matrix();
        let first_line = matrix.to_text().lines().nth(1).unwrap().to_string();
        assert_eq!(first_line, "S1");
    }

    #[test]
    fn lower_triangle_is_row_major_below_diagonal() {
        let matrix = sample_matrix();
        assert_eq!(matrix.lower_triangle(), vec![1.0, 0.5, 0.5]);
    }

    #[test]
    fn rejects_row_with_wrong_column_count() {
        let bad = "2\nS1\nS2\t1.0\t2.0\n";
        let err = DissimilarityMatrix::from_reader(Cursor::new(bad.as_bytes().to_vec())).unwrap_err();
        assert!(matches!(
            err,
            BetaDivError::InputFormat(InputFormatError::RowColumnMismatch { .. })
        ));
    }

    #[test]
    fn validate_symmetric_accepts_a_valid_matrix() {
        assert!(sample_matrix().validate_symmetric(1e-9).is_ok());
    }
}
