use serde::{Deserialize, Serialize};

/// Dense row-major `f32` matrix used for layer weights and biases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn filled(rows: usize, cols: usize, value: f32) -> Matrix {
        Matrix { rows, cols, data: vec![value; rows * cols] }
    }

    /// Builds a matrix from nested rows. All rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Option<Matrix> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != n_cols) {
            return None;
        }
        Some(Matrix { rows: n_rows, cols: n_cols, data: rows.into_iter().flatten().collect() })
    }

    /// `true` when `data` holds exactly `rows * cols` values.
    pub fn is_consistent(&self) -> bool {
        self.rows.checked_mul(self.cols) == Some(self.data.len())
    }

    /// Row vector times matrix: `x (1 x rows) * self (rows x cols)`.
    ///
    /// Returns `None` when `x.len() != rows`.
    pub fn left_mul(&self, x: &[f32]) -> Option<Vec<f32>> {
        if x.len() != self.rows {
            return None;
        }
        let mut out = vec![0.0f32; self.cols];
        for (xi, row) in x.iter().zip(self.data.chunks_exact(self.cols.max(1))) {
            if *xi == 0.0 {
                continue;
            }
            for (o, w) in out.iter_mut().zip(row) {
                *o += xi * w;
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_mul_matches_hand_computation() {
        // [1 2] * [[1 2 3], [4 5 6]] = [9 12 15]
        let m = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.left_mul(&[1.0, 2.0]).unwrap(), vec![9.0, 12.0, 15.0]);
    }

    #[test]
    fn left_mul_rejects_wrong_length() {
        let m = Matrix::zeros(3, 2);
        assert!(m.left_mul(&[1.0, 2.0]).is_none());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(Matrix::from_rows(vec![vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn consistency_check_catches_short_data() {
        let m = Matrix { rows: 2, cols: 2, data: vec![0.0; 3] };
        assert!(!m.is_consistent());
        assert!(Matrix::filled(2, 2, 1.0).is_consistent());
    }
}
