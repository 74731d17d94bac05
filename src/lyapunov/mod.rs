//! Shifted Lyapunov Equations on Quasi-Triangular Matrices
//!
//! This module solves continuous-time Lyapunov equations
//!
//! ```text
//! (T - sI) X + X (T - sI)ᵗ = C
//! ```
//!
//! where T is quasi-upper-triangular (real Schur form) and C is symmetric.
//! The shift s is applied on the fly to the diagonal, so a single Schur
//! factorization serves every trial shift of the abscissa search.

use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::error::{Result, SsaError};
use crate::schur::Block;

/// Solve the shifted Lyapunov equation (T - sI) X + X (T - sI)ᵗ = C.
///
/// Only the upper block triangle of X is solved for; every solved block is
/// mirrored into the lower triangle, so X is exactly symmetric.
///
/// # Arguments
///
/// * `t` - n×n quasi-upper-triangular matrix
/// * `blocks` - diagonal block partition of `t` (see [`crate::schur::Block`])
/// * `shift` - the scalar s subtracted from the diagonal of `t`
/// * `c` - n×n symmetric right-hand side
/// * `x` - n×n output buffer, fully overwritten
///
/// # Returns
///
/// trace(X)
///
/// # Errors
///
/// `SsaError::Dimension` if `t`, `c`, or `x` are not all n×n.
///
/// # Examples
///
/// ```
/// use ndarray::{arr2, Array2};
/// use smoothed_abscissa::lyapunov::solve_shifted_lyapunov;
/// use smoothed_abscissa::schur::Block;
///
/// // T = diag(-1, -2), s = 0: X = diag(1/2, 1/4)
/// let t = arr2(&[[-1.0, 0.0], [0.0, -2.0]]);
/// let blocks = [Block { start: 0, size: 1 }, Block { start: 1, size: 1 }];
/// let c = -Array2::<f64>::eye(2);
/// let mut x = Array2::zeros((2, 2));
///
/// let trace = solve_shifted_lyapunov(t.view(), &blocks, 0.0, c.view(), x.view_mut()).unwrap();
/// assert!((trace - 0.75).abs() < 1e-15);
/// ```
///
/// # Algorithm
///
/// Bartels–Stewart back-substitution specialized to a triangular coefficient:
///
/// 1. Block columns j are visited from the bottom-right to the top-left,
///    and inside each column block rows i from the diagonal upward.
/// 2. For block (i, j) the already-known blocks are moved to the right-hand side:
///    ```text
///    R = C_ij - Σ_{k>i} T_ik X_kj - Σ_{l>j} X_il T_jlᵗ
///    ```
/// 3. The remaining p×q system T_ii X_ij + X_ij T_jjᵗ = R (p, q ≤ 2) is
///    vectorized into a Kronecker system of order ≤ 4 and solved by Gaussian
///    elimination with complete pivoting.
///
/// Cost is O(n³), dominated by the substitution sums.
///
/// # Numerical Considerations
///
/// When s approaches the real part of an eigenvalue the small systems become
/// singular. Tiny pivots are replaced by `ε·max|K|` (the rule LAPACK's
/// DLASY2 uses), so the solve never fails: it returns large-magnitude
/// solutions and a trace that grows without bound, which the abscissa
/// search interprets through monotonicity.
pub fn solve_shifted_lyapunov(
    t: ArrayView2<f64>,
    blocks: &[Block],
    shift: f64,
    c: ArrayView2<f64>,
    mut x: ArrayViewMut2<f64>,
) -> Result<f64> {
    let n = t.nrows();
    if t.ncols() != n {
        return Err(SsaError::square(t.shape()));
    }
    if c.shape() != [n, n] {
        return Err(SsaError::size(n, c.shape()));
    }
    if x.shape() != [n, n] {
        return Err(SsaError::size(n, x.shape()));
    }

    for (jpos, jb) in blocks.iter().enumerate().rev() {
        for ib in blocks[..=jpos].iter().rev() {
            let mut rhs = [0.0f64; 4];
            for b in 0..jb.size {
                let j = jb.start + b;
                for a in 0..ib.size {
                    let i = ib.start + a;
                    let mut r = c[(i, j)];
                    for k in ib.end()..n {
                        r -= t[(i, k)] * x[(k, j)];
                    }
                    for l in jb.end()..n {
                        r -= x[(i, l)] * t[(j, l)];
                    }
                    rhs[a + ib.size * b] = r;
                }
            }

            let sol = solve_block_sylvester(&t, ib, jb, shift, rhs);

            for b in 0..jb.size {
                let j = jb.start + b;
                for a in 0..ib.size {
                    let i = ib.start + a;
                    let value = sol[a + ib.size * b];
                    x[(i, j)] = value;
                    x[(j, i)] = value;
                }
            }
        }
    }

    Ok(x.diag().sum())
}

/// Solve T_ii Y + Y T_jjᵗ = R for one p×q block, Y and R vectorized column-major.
fn solve_block_sylvester(
    t: &ArrayView2<f64>,
    ib: &Block,
    jb: &Block,
    shift: f64,
    rhs: [f64; 4],
) -> [f64; 4] {
    let p = ib.size;
    let q = jb.size;
    let m = p * q;

    let tii = |a: usize, c: usize| {
        let v = t[(ib.start + a, ib.start + c)];
        if a == c {
            v - shift
        } else {
            v
        }
    };
    let tjj = |b: usize, d: usize| {
        let v = t[(jb.start + b, jb.start + d)];
        if b == d {
            v - shift
        } else {
            v
        }
    };

    // K = I_q ⊗ T_ii + T_jj ⊗ I_p
    let mut k = [[0.0f64; 4]; 4];
    for b in 0..q {
        for a in 0..p {
            let row = a + p * b;
            for c in 0..p {
                k[row][c + p * b] += tii(a, c);
            }
            for d in 0..q {
                k[row][a + p * d] += tjj(b, d);
            }
        }
    }

    solve_small_system(&mut k, rhs, m)
}

/// Gaussian elimination with complete pivoting on an m×m system, m ≤ 4.
fn solve_small_system(k: &mut [[f64; 4]; 4], mut rhs: [f64; 4], m: usize) -> [f64; 4] {
    let kmax = k
        .iter()
        .take(m)
        .flat_map(|row| row.iter().take(m))
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    let smin = (f64::EPSILON * kmax).max(f64::MIN_POSITIVE);

    // perm[c] = unknown held in column c
    let mut perm = [0usize, 1, 2, 3];

    for col in 0..m {
        let (mut pr, mut pc, mut pval) = (col, col, 0.0f64);
        for r in col..m {
            for c in col..m {
                if k[r][c].abs() > pval {
                    pval = k[r][c].abs();
                    pr = r;
                    pc = c;
                }
            }
        }

        if pr != col {
            k.swap(pr, col);
            rhs.swap(pr, col);
        }
        if pc != col {
            for row in k.iter_mut().take(m) {
                row.swap(pc, col);
            }
            perm.swap(pc, col);
        }

        if k[col][col].abs() < smin {
            k[col][col] = if k[col][col] < 0.0 { -smin } else { smin };
        }

        for r in (col + 1)..m {
            let factor = k[r][col] / k[col][col];
            if factor != 0.0 {
                for c in col..m {
                    k[r][c] -= factor * k[col][c];
                }
                rhs[r] -= factor * rhs[col];
            }
        }
    }

    let mut y = [0.0f64; 4];
    for r in (0..m).rev() {
        let mut sum = rhs[r];
        for c in (r + 1)..m {
            sum -= k[r][c] * y[c];
        }
        y[r] = sum / k[r][r];
    }

    let mut sol = [0.0f64; 4];
    for c in 0..m {
        sol[perm[c]] = y[c];
    }
    sol
}

/// Frobenius norm of (T - sI) X + X (T - sI)ᵗ - C.
///
/// Allocates; meant for checking solutions rather than for the hot loop.
pub fn lyapunov_residual(
    t: ArrayView2<f64>,
    shift: f64,
    c: ArrayView2<f64>,
    x: ArrayView2<f64>,
) -> f64 {
    let n = t.nrows();
    let m = &t - &(Array2::<f64>::eye(n) * shift);
    let residual = m.dot(&x) + x.dot(&m.t()) - c;
    residual.iter().map(|v| v * v).sum::<f64>().sqrt()
}
