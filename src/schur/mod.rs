//! Real Schur Factorization
//!
//! This module reduces a real square matrix to real Schur form,
//! A = U T Uᵗ, with U orthogonal and T quasi-upper-triangular. The
//! factorization is computed once per matrix and then reused for every
//! shifted Lyapunov solve of the abscissa search.
//!
//! All buffers, including the LAPACK workspace, are allocated when the
//! factorization object is created; refreshing it for a new matrix of the
//! same size performs no allocation.

use std::os::raw::c_char;

use ndarray::{Array2, ArrayView2, ShapeBuilder};
use num_complex::Complex;

use crate::error::{Result, SsaError};

/// A diagonal block of a quasi-upper-triangular matrix.
///
/// Size 1 holds a real eigenvalue, size 2 a complex conjugate pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    /// Index of the first row/column of the block
    pub start: usize,
    /// Block order (1 or 2)
    pub size: usize,
}

impl Block {
    /// One past the last row/column of the block.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.size
    }
}

/// Cached real Schur factorization A = U T Uᵗ with its LAPACK scratch.
///
/// Besides T and U, the factorization keeps the reversed transpose
/// T̃ = J Tᵗ J (J the anti-identity). T̃ is again quasi-upper-triangular,
/// which lets the adjoint equation Tᵗ P + P T = C be solved by the same
/// upper-triangular Lyapunov kernel as the primal one.
#[derive(Clone, Debug)]
pub struct SchurFactorization {
    n: usize,
    /// Schur form T, column-major for LAPACK
    t: Array2<f64>,
    /// Schur vectors U, column-major for LAPACK
    u: Array2<f64>,
    /// J Tᵗ J
    t_reversed: Array2<f64>,
    blocks: Vec<Block>,
    reversed_blocks: Vec<Block>,
    wr: Vec<f64>,
    wi: Vec<f64>,
    work: Vec<f64>,
    bwork: Vec<i32>,
}

impl SchurFactorization {
    /// Allocate a factorization for n×n matrices.
    ///
    /// The optimal LAPACK workspace length is obtained with a workspace
    /// query (`LWORK = -1`) so that [`factorize`](Self::factorize) never
    /// reallocates.
    ///
    /// # Errors
    ///
    /// `SsaError::Domain` if `n == 0`.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(SsaError::Domain(
                "matrix order must be at least 1".to_string(),
            ));
        }

        let mut t = Array2::<f64>::zeros((n, n).f());
        let mut u = Array2::<f64>::zeros((n, n).f());
        let mut wr = vec![0.0; n];
        let mut wi = vec![0.0; n];
        let mut bwork = vec![0i32; n];

        // Workspace query
        let mut work_query = [0.0f64];
        let mut info: i32 = 0;
        let mut sdim: i32 = 0;
        let n_i32 = n as i32;
        let jobvs = b'V' as c_char;
        let sort = b'N' as c_char;

        unsafe {
            lapack_sys::dgees_(
                &jobvs,                  // JOBVS: compute Schur vectors
                &sort,                   // SORT: no eigenvalue ordering
                None,                    // SELECT: unused without sorting
                &n_i32,                  // N
                t.as_mut_ptr(),          // A
                &n_i32,                  // LDA
                &mut sdim,               // SDIM
                wr.as_mut_ptr(),         // WR
                wi.as_mut_ptr(),         // WI
                u.as_mut_ptr(),          // VS
                &n_i32,                  // LDVS
                work_query.as_mut_ptr(), // WORK
                &-1,                     // LWORK: query
                bwork.as_mut_ptr(),      // BWORK
                &mut info,               // INFO
            );
        }

        if info != 0 {
            return Err(SsaError::Factorization(format!(
                "DGEES workspace query failed with INFO={info}"
            )));
        }

        let lwork = (work_query[0] as usize).max(3 * n).max(1);

        Ok(SchurFactorization {
            n,
            t,
            u,
            t_reversed: Array2::zeros((n, n)),
            blocks: Vec::with_capacity(n),
            reversed_blocks: Vec::with_capacity(n),
            wr,
            wi,
            work: vec![0.0; lwork],
            bwork,
        })
    }

    /// Compute the real Schur form of `a`, overwriting the cached one.
    ///
    /// `a` itself is left untouched: it is copied into the pre-allocated
    /// column-major buffer that LAPACK factorizes in place.
    ///
    /// # Arguments
    ///
    /// * `a` - n×n matrix with finite entries
    ///
    /// # Errors
    ///
    /// * `SsaError::Dimension` if `a` is not n×n
    /// * `SsaError::Factorization` if `a` has a non-finite entry or the QR
    ///   algorithm fails to converge
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::arr2;
    /// use smoothed_abscissa::schur::SchurFactorization;
    ///
    /// let a = arr2(&[[-1.0, 3.0], [0.0, -2.0]]);
    /// let mut schur = SchurFactorization::new(2).unwrap();
    /// schur.factorize(a.view()).unwrap();
    /// assert!((schur.spectral_abscissa() + 1.0).abs() < 1e-12);
    /// ```
    ///
    /// # Algorithm
    ///
    /// LAPACK's **DGEES** (via `lapack-sys`): Hessenberg reduction followed by
    /// the Francis double-shift QR iteration, accumulating the Schur vectors.
    /// 2×2 diagonal blocks come out in standardized form (equal diagonal,
    /// off-diagonal entries of opposite sign). Entries below the first
    /// subdiagonal are exactly zero.
    ///
    /// After the call the diagonal block partition and the reversed
    /// transpose used by the adjoint solve are rebuilt.
    pub fn factorize(&mut self, a: ArrayView2<f64>) -> Result<()> {
        let n = self.n;
        if a.shape() != [n, n] {
            return Err(SsaError::size(n, a.shape()));
        }

        if let Some(((i, j), value)) = a.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(SsaError::Factorization(format!(
                "entry ({i}, {j}) is not finite ({value})"
            )));
        }

        self.t.assign(&a);

        let n_i32 = n as i32;
        let lwork = self.work.len() as i32;
        let jobvs = b'V' as c_char;
        let sort = b'N' as c_char;
        let mut sdim: i32 = 0;
        let mut info: i32 = 0;

        unsafe {
            lapack_sys::dgees_(
                &jobvs,
                &sort,
                None,
                &n_i32,
                self.t.as_mut_ptr(),
                &n_i32,
                &mut sdim,
                self.wr.as_mut_ptr(),
                self.wi.as_mut_ptr(),
                self.u.as_mut_ptr(),
                &n_i32,
                self.work.as_mut_ptr(),
                &lwork,
                self.bwork.as_mut_ptr(),
                &mut info,
            );
        }

        if info < 0 {
            return Err(SsaError::Factorization(format!(
                "DGEES rejected argument {}",
                -info
            )));
        }
        if info > 0 {
            return Err(SsaError::Factorization(format!(
                "QR algorithm failed to converge (DGEES INFO={info})"
            )));
        }

        self.rebuild_blocks();
        self.rebuild_reversed();
        Ok(())
    }

    /// Scan the subdiagonal of T for 2×2 blocks.
    fn rebuild_blocks(&mut self) {
        let n = self.n;
        self.blocks.clear();
        let mut k = 0;
        while k < n {
            let size = if k + 1 < n && self.t[(k + 1, k)] != 0.0 {
                2
            } else {
                1
            };
            self.blocks.push(Block { start: k, size });
            k += size;
        }

        self.reversed_blocks.clear();
        for block in self.blocks.iter().rev() {
            self.reversed_blocks.push(Block {
                start: n - block.end(),
                size: block.size,
            });
        }
    }

    /// T̃[i, j] = T[n-1-j, n-1-i]
    fn rebuild_reversed(&mut self) {
        let n = self.n;
        for i in 0..n {
            for j in 0..n {
                self.t_reversed[(i, j)] = self.t[(n - 1 - j, n - 1 - i)];
            }
        }
    }

    /// Matrix order n.
    pub fn order(&self) -> usize {
        self.n
    }

    /// Quasi-upper-triangular Schur form T.
    pub fn t(&self) -> ArrayView2<'_, f64> {
        self.t.view()
    }

    /// Orthogonal Schur vectors U.
    pub fn u(&self) -> ArrayView2<'_, f64> {
        self.u.view()
    }

    /// Reversed transpose J Tᵗ J.
    pub fn t_reversed(&self) -> ArrayView2<'_, f64> {
        self.t_reversed.view()
    }

    /// Diagonal blocks of T, top-left to bottom-right.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Diagonal blocks of J Tᵗ J, top-left to bottom-right.
    pub fn reversed_blocks(&self) -> &[Block] {
        &self.reversed_blocks
    }

    /// Largest real part among the eigenvalues, read off the diagonal blocks.
    ///
    /// A 2×2 block [[a, b], [c, d]] contributes (a + d) / 2.
    pub fn spectral_abscissa(&self) -> f64 {
        self.blocks
            .iter()
            .map(|block| {
                let k = block.start;
                if block.size == 1 {
                    self.t[(k, k)]
                } else {
                    0.5 * (self.t[(k, k)] + self.t[(k + 1, k + 1)])
                }
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Eigenvalues in the order they appear along the diagonal of T.
    pub fn eigenvalues(&self) -> Vec<Complex<f64>> {
        self.wr
            .iter()
            .zip(self.wi.iter())
            .map(|(&re, &im)| Complex::new(re, im))
            .collect()
    }

    /// Rebuild U T Uᵗ.
    pub fn reconstruct(&self) -> Array2<f64> {
        self.u.dot(&self.t).dot(&self.u.t())
    }
}
