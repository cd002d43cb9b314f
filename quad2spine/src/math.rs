//! Small row-major matrices and the quad transforms built on them.

use crate::Error;

/// Eight floats: `x0, y0, x1, y1, x2, y2, x3, y3`.
pub type Quad = [f32; 8];

#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl Matrix {
    /// Absolute tolerance used by [`Matrix::approx_eq`].
    pub const EPSILON: f32 = 1.0e-6;

    /// Builds a `rows x cols` matrix from row-major `values`. Missing trailing values are
    /// filled with `fill`; extra values are ignored.
    pub fn from_values(rows: usize, cols: usize, values: &[f32], fill: f32) -> Self {
        let len = rows * cols;
        let mut out = Vec::with_capacity(len);
        out.extend(values.iter().copied().take(len));
        out.resize(len, fill);
        Self {
            rows,
            cols,
            values: out,
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::from_values(rows, cols, &[], 0.0)
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.values[i * n + i] = 1.0;
        }
        m
    }

    pub fn identity4() -> Self {
        Self::identity(4)
    }

    /// A 4x4 transform from a (possibly short) row-major array; missing entries come from the
    /// identity matrix.
    pub fn transform4(values: &[f32]) -> Self {
        let mut m = Self::identity4();
        for (dst, src) in m.values.iter_mut().zip(values.iter().copied()) {
            *dst = src;
        }
        m
    }

    /// Four corner points as a 4x2 matrix.
    pub fn from_quad(quad: &Quad) -> Self {
        Self::from_values(4, 2, quad, 0.0)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            self.values.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    fn at(&self, row: usize, col: usize) -> f32 {
        self.get(row, col).unwrap_or(0.0)
    }

    pub fn is_identity(&self) -> bool {
        self.rows == self.cols && self.approx_eq(&Self::identity(self.rows))
    }

    pub fn approx_eq(&self, other: &Matrix) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| (a - b).abs() <= Self::EPSILON)
    }

    pub fn mul(&self, rhs: &Matrix) -> Result<Matrix, Error> {
        if self.cols != rhs.rows {
            return Err(Error::InvalidValue {
                message: format!(
                    "cannot multiply {}x{} by {}x{}",
                    self.rows, self.cols, rhs.rows, rhs.cols
                ),
            });
        }
        let mut out = Self::zeros(self.rows, rhs.cols);
        for r in 0..self.rows {
            for c in 0..rhs.cols {
                let mut sum = 0.0;
                for k in 0..self.cols {
                    sum += self.at(r, k) * rhs.at(k, c);
                }
                out.values[r * rhs.cols + c] = sum;
            }
        }
        Ok(out)
    }

    pub fn add(&self, rhs: &Matrix) -> Result<Matrix, Error> {
        self.zip_with(rhs, "add", |a, b| a + b)
    }

    pub fn sub(&self, rhs: &Matrix) -> Result<Matrix, Error> {
        self.zip_with(rhs, "subtract", |a, b| a - b)
    }

    pub fn scale(&self, k: f32) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            values: self.values.iter().map(|v| v * k).collect(),
        }
    }

    fn zip_with(
        &self,
        rhs: &Matrix,
        op: &str,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Matrix, Error> {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            return Err(Error::InvalidValue {
                message: format!(
                    "cannot {op} {}x{} and {}x{}",
                    self.rows, self.cols, rhs.rows, rhs.cols
                ),
            });
        }
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            values: self
                .values
                .iter()
                .zip(&rhs.values)
                .map(|(a, b)| f(*a, *b))
                .collect(),
        })
    }
}

/// Applies the timeline transform `a` to the corner rows of `b`.
///
/// Each row `(x, y)` of `b` becomes
/// `(a00*x + a01*y + a02 + a03, a10*x + a11*y + a12 + a13)`. An identity `a` returns `b`
/// unchanged.
pub fn quad_multiply(a: &Matrix, b: &Matrix) -> Matrix {
    if a.is_identity() {
        return b.clone();
    }
    let mut out = Matrix::zeros(b.rows, 2);
    for i in 0..b.rows {
        let x = b.at(i, 0);
        let y = b.at(i, 1);
        out.values[i * 2] = a.at(0, 0) * x + a.at(0, 1) * y + a.at(0, 2) + a.at(0, 3);
        out.values[i * 2 + 1] = a.at(1, 0) * x + a.at(1, 1) * y + a.at(1, 2) + a.at(1, 3);
    }
    out
}

/// Like [`quad_multiply`], with a homogeneous divide by the fourth row of `a`.
pub fn quad_multiply_perspective(a: &Matrix, b: &Matrix) -> Matrix {
    if a.is_identity() {
        return b.clone();
    }
    let mut out = Matrix::zeros(b.rows, 2);
    for i in 0..b.rows {
        let x = b.at(i, 0);
        let y = b.at(i, 1);
        let mut w = a.at(3, 0) * x + a.at(3, 1) * y + a.at(3, 2) + a.at(3, 3);
        if w.abs() <= Matrix::EPSILON {
            w = 1.0;
        }
        out.values[i * 2] = (a.at(0, 0) * x + a.at(0, 1) * y + a.at(0, 2) + a.at(0, 3)) / w;
        out.values[i * 2 + 1] =
            (a.at(1, 0) * x + a.at(1, 1) * y + a.at(1, 2) + a.at(1, 3)) / w;
    }
    out
}

/// `a * (1 - rate) + b * rate`.
pub fn lerp(a: &Matrix, b: &Matrix, rate: f32) -> Result<Matrix, Error> {
    a.scale(1.0 - rate).add(&b.scale(rate))
}

/// 3x3 homography mapping the corners of `from` onto the corners of `to`.
///
/// Returns `None` for degenerate quads.
pub fn perspective_transform(from: &Quad, to: &Quad) -> Option<Matrix> {
    let mut system = [[0.0f64; 9]; 8];
    for i in 0..4 {
        let x = f64::from(from[i * 2]);
        let y = f64::from(from[i * 2 + 1]);
        let u = f64::from(to[i * 2]);
        let v = f64::from(to[i * 2 + 1]);
        system[i * 2] = [x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u, u];
        system[i * 2 + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v, v];
    }

    for col in 0..8 {
        let pivot = (col..8).max_by(|&a, &b| {
            system[a][col]
                .abs()
                .partial_cmp(&system[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if system[pivot][col].abs() < 1.0e-12 {
            return None;
        }
        system.swap(col, pivot);
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = system[row][col] / system[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                system[row][k] -= factor * system[col][k];
            }
        }
    }

    let mut h = [0.0f32; 9];
    for i in 0..8 {
        h[i] = (system[i][8] / system[i][i]) as f32;
    }
    h[8] = 1.0;
    Some(Matrix::from_values(3, 3, &h, 0.0))
}

/// Maps one point through a homography from [`perspective_transform`].
pub fn apply_perspective(h: &Matrix, x: f32, y: f32) -> (f32, f32) {
    let mut w = h.at(2, 0) * x + h.at(2, 1) * y + h.at(2, 2);
    if w.abs() <= Matrix::EPSILON {
        w = 1.0;
    }
    (
        (h.at(0, 0) * x + h.at(0, 1) * y + h.at(0, 2)) / w,
        (h.at(1, 0) * x + h.at(1, 1) * y + h.at(1, 2)) / w,
    )
}

#[cfg(feature = "glam")]
impl Matrix {
    /// Converts a 4x4 matrix into a `glam::Mat4`.
    pub fn to_mat4(&self) -> Option<glam::Mat4> {
        if self.rows != 4 || self.cols != 4 {
            return None;
        }
        let mut cols = [0.0f32; 16];
        cols.copy_from_slice(&self.values);
        Some(glam::Mat4::from_cols_array(&cols).transpose())
    }
}

#[cfg(feature = "glam")]
impl From<glam::Mat4> for Matrix {
    fn from(m: glam::Mat4) -> Self {
        Matrix::from_values(4, 4, &m.transpose().to_cols_array(), 0.0)
    }
}
