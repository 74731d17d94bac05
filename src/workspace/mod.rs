//! Reusable Workspace
//!
//! An [`SsaWorkspace`] owns every buffer an SSA evaluation touches: the
//! Schur factorization with its LAPACK scratch, the Lyapunov solutions Q
//! and P, the right-hand side -I and the gradient scratch. It is sized once
//! for a fixed n and reused across calls, so an optimizer evaluating the SSA
//! thousands of times allocates nothing after construction.
//!
//! A workspace is exclusively owned: every operation takes it by `&mut`.
//! Concurrent evaluations each need their own workspace.

use log::debug;
use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::abscissa::{
    AbscissaRootFinder, RootOutcome, RootStrategy, SsaOptions, StabilityFunctional,
};
use crate::error::{Result, SsaError};
use crate::gradient::ssa_gradient;
use crate::schur::SchurFactorization;

/// Pre-allocated state for repeated SSA evaluations on n×n matrices.
#[derive(Clone, Debug)]
pub struct SsaWorkspace {
    n: usize,
    schur: SchurFactorization,
    neg_identity: Array2<f64>,
    q: Array2<f64>,
    y: Array2<f64>,
    product: Array2<f64>,
    rotated: Array2<f64>,
    options: SsaOptions,
    factorized: bool,
    last_outcome: Option<RootOutcome>,
}

impl SsaWorkspace {
    /// Allocate a workspace for n×n matrices.
    ///
    /// # Errors
    ///
    /// `SsaError::Domain` if `n == 0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use smoothed_abscissa::SsaWorkspace;
    ///
    /// let ws = SsaWorkspace::new(4).unwrap();
    /// assert_eq!(ws.order(), 4);
    /// assert!(!ws.is_factorized());
    /// ```
    pub fn new(n: usize) -> Result<Self> {
        let schur = SchurFactorization::new(n)?;
        Ok(SsaWorkspace {
            n,
            schur,
            neg_identity: -Array2::<f64>::eye(n),
            q: Array2::zeros((n, n)),
            y: Array2::zeros((n, n)),
            product: Array2::zeros((n, n)),
            rotated: Array2::zeros((n, n)),
            options: SsaOptions::default(),
            factorized: false,
            last_outcome: None,
        })
    }

    /// Allocate a workspace sized for `a`.
    ///
    /// Only the shape of `a` is used; the workspace is not factorized.
    ///
    /// # Errors
    ///
    /// `SsaError::Dimension` if `a` is not square, `SsaError::Domain` if it is empty.
    pub fn for_matrix(a: &Array2<f64>) -> Result<Self> {
        if !a.is_square() {
            return Err(SsaError::square(a.shape()));
        }
        Self::new(a.nrows())
    }

    /// Replace the root-finding tolerances and caps.
    pub fn with_options(mut self, options: SsaOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the options of an existing workspace; the factorization is kept.
    pub fn set_options(&mut self, options: SsaOptions) {
        self.options = options;
    }

    pub fn options(&self) -> &SsaOptions {
        &self.options
    }

    /// Matrix order n this workspace was sized for.
    pub fn order(&self) -> usize {
        self.n
    }

    /// Whether a factorization is held.
    pub fn is_factorized(&self) -> bool {
        self.factorized
    }

    /// The cached Schur factorization.
    ///
    /// # Errors
    ///
    /// `SsaError::Unfactorized` if [`refresh`](Self::refresh) never succeeded.
    pub fn schur(&self) -> Result<&SchurFactorization> {
        if self.factorized {
            Ok(&self.schur)
        } else {
            Err(SsaError::Unfactorized)
        }
    }

    /// Q(s*) in Schur coordinates from the last successful evaluation.
    pub fn lyapunov_solution(&self) -> ArrayView2<'_, f64> {
        self.q.view()
    }

    /// Summary of the last successful root search.
    pub fn last_outcome(&self) -> Option<RootOutcome> {
        self.last_outcome
    }

    /// Factorize `a`, replacing whatever the workspace held.
    ///
    /// Must be called whenever the matrix under analysis changes. A failed
    /// refresh leaves the workspace unfactorized.
    ///
    /// # Errors
    ///
    /// * `SsaError::Dimension` if `a` is not n×n
    /// * `SsaError::Factorization` if `a` has non-finite entries or the
    ///   Schur decomposition does not converge
    pub fn refresh(&mut self, a: ArrayView2<f64>) -> Result<()> {
        self.factorized = false;
        self.last_outcome = None;
        self.schur.factorize(a)?;
        self.factorized = true;
        debug!(
            "refreshed Schur factorization: n = {}, {} diagonal blocks, spectral abscissa {:.6e}",
            self.n,
            self.schur.blocks().len(),
            self.schur.spectral_abscissa()
        );
        Ok(())
    }

    /// Run the abscissa search on the cached factorization and optionally
    /// write the gradient.
    pub(crate) fn evaluate(
        &mut self,
        epsilon: f64,
        strategy: RootStrategy,
        grad: Option<ArrayViewMut2<f64>>,
    ) -> Result<RootOutcome> {
        if !self.factorized {
            return Err(SsaError::Unfactorized);
        }
        if let Some(buffer) = &grad {
            if buffer.shape() != [self.n, self.n] {
                return Err(SsaError::size(self.n, buffer.shape()));
            }
        }

        let mut functional = StabilityFunctional::new(
            &self.schur,
            self.neg_identity.view(),
            self.q.view_mut(),
            self.y.view_mut(),
        );
        let outcome =
            AbscissaRootFinder::new(strategy, self.options).solve(&mut functional, epsilon)?;

        if let Some(grad) = grad {
            ssa_gradient(
                &mut functional,
                outcome.shift,
                self.product.view_mut(),
                self.rotated.view_mut(),
                grad,
            )?;
        }

        self.last_outcome = Some(outcome);
        Ok(outcome)
    }
}
