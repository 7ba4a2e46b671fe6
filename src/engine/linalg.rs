//! Small dense linear algebra on `Vec<Vec<f64>>` matrices.
//!
//! Everything here works on symmetric matrices of modest size (covariances of
//! flattened windows, normal equations), so plain nested vectors are enough.

use crate::core::Table;

/// Dense row-major matrix.
pub type Matrix = Vec<Vec<f64>>;

/// Identity matrix of size `n`.
pub fn identity(n: usize) -> Matrix {
    let mut m = vec![vec![0.0; n]; n];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

/// Per-column means of a table.
pub fn column_means(data: &Table) -> Vec<f64> {
    let mut means = vec![0.0; data.cols()];
    if data.is_empty() {
        return means;
    }
    for row in data.iter_rows() {
        for (m, &x) in means.iter_mut().zip(row) {
            *m += x;
        }
    }
    let n = data.rows() as f64;
    means.iter_mut().for_each(|m| *m /= n);
    means
}

/// Maximum-likelihood covariance (denominator `n`) around the column means.
pub fn covariance(data: &Table) -> (Vec<f64>, Matrix) {
    let means = column_means(data);
    let d = data.cols();
    let mut cov = vec![vec![0.0; d]; d];
    if data.is_empty() {
        return (means, cov);
    }
    let mut centered = vec![0.0; d];
    for row in data.iter_rows() {
        for j in 0..d {
            centered[j] = row[j] - means[j];
        }
        for i in 0..d {
            for j in i..d {
                cov[i][j] += centered[i] * centered[j];
            }
        }
    }
    let n = data.rows() as f64;
    for i in 0..d {
        for j in i..d {
            cov[i][j] /= n;
            cov[j][i] = cov[i][j];
        }
    }
    (means, cov)
}

/// Uncentered second-moment matrix `(1/n) Σ r rᵀ` of a set of vectors.
pub fn second_moment(vectors: &[Vec<f64>]) -> Matrix {
    let d = vectors.first().map(|v| v.len()).unwrap_or(0);
    let mut m = vec![vec![0.0; d]; d];
    if vectors.is_empty() {
        return m;
    }
    for v in vectors {
        for i in 0..d {
            for j in i..d {
                m[i][j] += v[i] * v[j];
            }
        }
    }
    let n = vectors.len() as f64;
    for i in 0..d {
        for j in i..d {
            m[i][j] /= n;
            m[j][i] = m[i][j];
        }
    }
    m
}

/// Add a small ridge to the diagonal so the matrix is safely positive definite.
pub fn regularize(m: &Matrix) -> Matrix {
    let d = m.len();
    let mean_diag = if d == 0 {
        0.0
    } else {
        (0..d).map(|i| m[i][i].abs()).sum::<f64>() / d as f64
    };
    let ridge = 1e-6 * mean_diag + 1e-12;
    let mut out = m.clone();
    for (i, row) in out.iter_mut().enumerate() {
        row[i] += ridge;
    }
    out
}

/// Cholesky factor `L` with `A = L Lᵀ`. `None` if `A` is not positive definite.
pub fn cholesky(a: &Matrix) -> Option<Matrix> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

fn solve_with_factor(l: &Matrix, b: &[f64]) -> Vec<f64> {
    let n = b.len();

    // Forward substitution: L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // Backward substitution: Lᵀ x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }
    x
}

/// Solve `A x = b` for symmetric positive definite `A`.
pub fn solve_symmetric(a: &Matrix, b: &[f64]) -> Option<Vec<f64>> {
    if b.is_empty() || a.len() != b.len() {
        return None;
    }
    let l = cholesky(a)?;
    Some(solve_with_factor(&l, b))
}

/// Inverse of a symmetric positive definite matrix.
pub fn inverse_spd(a: &Matrix) -> Option<Matrix> {
    let n = a.len();
    let l = cholesky(a)?;
    let mut inv = vec![vec![0.0; n]; n];
    let mut e = vec![0.0; n];
    for j in 0..n {
        e.iter_mut().for_each(|v| *v = 0.0);
        e[j] = 1.0;
        let col = solve_with_factor(&l, &e);
        for i in 0..n {
            inv[i][j] = col[i];
        }
    }
    Some(inv)
}

/// `log det A` for a symmetric positive definite matrix.
pub fn log_det_spd(a: &Matrix) -> Option<f64> {
    let l = cholesky(a)?;
    Some(2.0 * (0..l.len()).map(|i| l[i][i].ln()).sum::<f64>())
}

/// `L⁻¹ S L⁻ᵀ` for a lower-triangular factor `L` and symmetric `S`.
///
/// The eigenvalues of the result are the generalized eigenvalues of
/// `(S, L Lᵀ)`.
pub fn whiten(l: &Matrix, s: &Matrix) -> Matrix {
    let n = l.len();
    let forward = |b: &[f64]| {
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = b[i];
            for j in 0..i {
                sum -= l[i][j] * y[j];
            }
            y[i] = sum / l[i][i];
        }
        y
    };
    // half = (L⁻¹ S)ᵀ = S L⁻ᵀ, since S is symmetric
    let half: Matrix = s.iter().map(|row| forward(row.as_slice())).collect();
    let mut out = vec![vec![0.0; n]; n];
    for j in 0..n {
        let column: Vec<f64> = (0..n).map(|k| half[k][j]).collect();
        let solved = forward(column.as_slice());
        for i in 0..n {
            out[i][j] = solved[i];
        }
    }
    out
}

/// Matrix product `A B`.
pub fn mat_mul(a: &Matrix, b: &Matrix) -> Matrix {
    let n = a.len();
    let m = b.first().map(|r| r.len()).unwrap_or(0);
    let mut out = vec![vec![0.0; m]; n];
    for i in 0..n {
        for (k, &aik) in a[i].iter().enumerate() {
            if aik == 0.0 {
                continue;
            }
            for j in 0..m {
                out[i][j] += aik * b[k][j];
            }
        }
    }
    out
}

/// `tr(A B)` without forming the product.
pub fn trace_product(a: &Matrix, b: &Matrix) -> f64 {
    let mut sum = 0.0;
    for i in 0..a.len() {
        for k in 0..a[i].len() {
            sum += a[i][k] * b[k][i];
        }
    }
    sum
}

/// Quadratic form `xᵀ A x`.
pub fn quad_form(a: &Matrix, x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() {
        let mut row = 0.0;
        for j in 0..x.len() {
            row += a[i][j] * x[j];
        }
        sum += x[i] * row;
    }
    sum
}

/// Frobenius norm of a matrix.
pub fn frobenius_norm(a: &Matrix) -> f64 {
    a.iter().flatten().map(|v| v * v).sum::<f64>().sqrt()
}

/// Eigen-decomposition of a symmetric matrix.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues sorted in descending order.
    pub values: Vec<f64>,
    /// `vectors[k]` is the unit eigenvector of `values[k]`.
    pub vectors: Vec<Vec<f64>>,
}

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix.
pub fn symmetric_eigen(a: &Matrix) -> SymmetricEigen {
    let n = a.len();
    let mut m = a.clone();
    let mut v = identity(n);

    let scale: f64 = frobenius_norm(a).max(1e-300);

    for _sweep in 0..100 {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += m[p][q] * m[p][q];
            }
        }
        if off.sqrt() <= 1e-14 * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[p][q];
                if apq.abs() <= 1e-300 {
                    continue;
                }
                let theta = (m[q][q] - m[p][p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in m.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
                for k in 0..n {
                    let (pk, qk) = (m[p][k], m[q][k]);
                    m[p][k] = c * pk - s * qk;
                    m[q][k] = s * pk + c * qk;
                }
                for row in v.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        m[j][j]
            .partial_cmp(&m[i][i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    SymmetricEigen {
        values: order.iter().map(|&k| m[k][k]).collect(),
        vectors: order
            .iter()
            .map(|&k| (0..n).map(|i| v[i][k]).collect())
            .collect(),
    }
}
