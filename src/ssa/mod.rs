//! Smoothed Spectral Abscissa - Public Entry Points
//!
//! This module exposes the SSA of a real square matrix A, the unique
//! s > α(A) with
//!
//! ```text
//! ∫₀^∞ ‖exp((A - sI)t)‖²_F dt = 1/ε,
//! ```
//!
//! together with its gradient ∂s/∂A. The SSA is a smooth upper bound on the
//! spectral abscissa α(A) that tends to α(A) as ε → 0, so driving it below
//! zero certifies stability of ẋ = Ax.
//!
//! Two calling conventions are offered:
//!
//! - allocating: [`compute_ssa`], [`compute_ssa_with_gradient`], [`ssa_report`]
//! - in place, reusing an [`SsaWorkspace`]: [`compute_ssa_inplace`],
//!   [`compute_ssa_inplace_newton`] and the lower-level
//!   [`compute_ssa_factorized`], which skips re-factorization

use ndarray::Array2;
use ndarray_linalg::{Eig, Norm};

use crate::abscissa::RootStrategy;
use crate::error::{Result, SsaError};
use crate::workspace::SsaWorkspace;

/// Scale factor of the default smoothing parameter.
const DEFAULT_EPSILON_FACTOR: f64 = 0.01;

/// Diagnostic summary of one SSA evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SsaReport {
    /// The smoothed spectral abscissa
    pub ssa: f64,
    /// Smoothing parameter used
    pub epsilon: f64,
    /// Unsmoothed spectral abscissa α(A)
    pub spectral_abscissa: f64,
    /// trace(Q) at the SSA, ≈ 1/ε
    pub trace: f64,
    /// Narrowing iterations of the root search
    pub iterations: usize,
    /// Primal Lyapunov solves of the root search
    pub evaluations: usize,
}

/// Compute the smoothed spectral abscissa of `a`.
///
/// Allocates a fresh workspace; for repeated calls use
/// [`compute_ssa_inplace`].
///
/// # Arguments
///
/// * `a` - n×n real matrix, n ≥ 1
/// * `epsilon` - smoothing parameter; `None` uses [`default_epsilon`]
///
/// # Returns
///
/// The SSA α̃_ε(A) ≥ α(A).
///
/// # Errors
///
/// * `SsaError::Dimension` if `a` is not square
/// * `SsaError::Domain` if `a` is empty or `epsilon` is not positive
/// * `SsaError::Factorization` if `a` has non-finite entries
/// * `SsaError::Convergence` if the root search fails (e.g. ε too small to resolve)
///
/// # Examples
///
/// ```
/// use ndarray::arr2;
/// use smoothed_abscissa::{compute_ssa, spectral_abscissa};
///
/// let a = arr2(&[[-1.0, 0.0], [0.0, -2.0]]);
/// let ssa = compute_ssa(&a, Some(0.01)).unwrap();
/// assert!(ssa > spectral_abscissa(&a).unwrap());
/// assert!(ssa < -0.99);
/// ```
pub fn compute_ssa(a: &Array2<f64>, epsilon: Option<f64>) -> Result<f64> {
    let mut ws = SsaWorkspace::for_matrix(a)?;
    compute_ssa_inplace(a, None, &mut ws, epsilon)
}

/// Compute the SSA of `a` and its gradient with respect to every entry.
///
/// # Returns
///
/// `(ssa, grad)` with `grad[(i, j)] = ∂ssa/∂a[(i, j)]`.
///
/// # Errors
///
/// As [`compute_ssa`].
///
/// # Examples
///
/// ```
/// use ndarray::arr2;
/// use smoothed_abscissa::compute_ssa_with_gradient;
///
/// let a = arr2(&[[-1.0, 5.0], [0.0, -2.0]]);
/// let (ssa, grad) = compute_ssa_with_gradient(&a, Some(0.05)).unwrap();
///
/// // Shifting A by tI shifts the SSA by t, so the gradient has unit trace.
/// assert!((grad[(0, 0)] + grad[(1, 1)] - 1.0).abs() < 1e-10);
/// assert!(ssa > -1.0);
/// ```
pub fn compute_ssa_with_gradient(
    a: &Array2<f64>,
    epsilon: Option<f64>,
) -> Result<(f64, Array2<f64>)> {
    let mut ws = SsaWorkspace::for_matrix(a)?;
    let mut grad = Array2::zeros(a.raw_dim());
    let ssa = compute_ssa_inplace(a, Some(&mut grad), &mut ws, epsilon)?;
    Ok((ssa, grad))
}

/// Compute the SSA of `a` in a pre-allocated workspace, bisection/secant search.
///
/// The workspace is re-factorized from `a` on every call, so it may be
/// reused freely across different matrices of the same size. No memory is
/// allocated.
///
/// # Arguments
///
/// * `a` - n×n matrix, n the workspace order
/// * `grad` - `None` skips the gradient; `Some(buffer)` overwrites the n×n
///   buffer with ∂ssa/∂a
/// * `ws` - workspace created by [`make_workspace`] or [`SsaWorkspace::for_matrix`]
/// * `epsilon` - smoothing parameter; `None` uses [`default_epsilon`]
///
/// # Errors
///
/// As [`compute_ssa`]; additionally `SsaError::Dimension` if `a` or `grad`
/// do not match the workspace order.
///
/// # Examples
///
/// ```
/// use ndarray::{arr2, Array2};
/// use smoothed_abscissa::{compute_ssa_inplace, make_workspace};
///
/// let mut ws = make_workspace(2).unwrap();
/// let mut grad = Array2::zeros((2, 2));
/// for k in 0..3 {
///     let a = arr2(&[[-1.0 - k as f64, 1.0], [0.0, -3.0]]);
///     let ssa = compute_ssa_inplace(&a, Some(&mut grad), &mut ws, Some(0.01)).unwrap();
///     assert!(ssa > -1.0 - k as f64);
/// }
/// ```
pub fn compute_ssa_inplace(
    a: &Array2<f64>,
    grad: Option<&mut Array2<f64>>,
    ws: &mut SsaWorkspace,
    epsilon: Option<f64>,
) -> Result<f64> {
    compute_inplace(a, grad, ws, epsilon, RootStrategy::Bisection)
}

/// As [`compute_ssa_inplace`], with the Newton search.
///
/// Each Newton step costs one extra (adjoint) Lyapunov solve but typically
/// needs fewer steps.
pub fn compute_ssa_inplace_newton(
    a: &Array2<f64>,
    grad: Option<&mut Array2<f64>>,
    ws: &mut SsaWorkspace,
    epsilon: Option<f64>,
) -> Result<f64> {
    compute_inplace(a, grad, ws, epsilon, RootStrategy::Newton)
}

fn compute_inplace(
    a: &Array2<f64>,
    grad: Option<&mut Array2<f64>>,
    ws: &mut SsaWorkspace,
    epsilon: Option<f64>,
    strategy: RootStrategy,
) -> Result<f64> {
    if !a.is_square() {
        return Err(SsaError::square(a.shape()));
    }
    if a.nrows() != ws.order() {
        return Err(SsaError::size(ws.order(), a.shape()));
    }
    let epsilon = match epsilon {
        Some(eps) => validate_epsilon(eps)?,
        None => default_epsilon(a)?,
    };

    ws.refresh(a.view())?;
    let outcome = ws.evaluate(epsilon, strategy, grad.map(|g| g.view_mut()))?;
    Ok(outcome.shift)
}

/// Compute the SSA from the factorization already held by `ws`.
///
/// The caller is responsible for having called [`refresh_workspace`] with
/// the matrix of interest; repeated calls (for instance with several ε)
/// then skip the O(n³) factorization.
///
/// When `epsilon` is `None` the default is derived from ‖T‖_F, which equals
/// ‖A‖_F.
///
/// # Errors
///
/// * `SsaError::Unfactorized` if the workspace was never refreshed
/// * `SsaError::Dimension` if `grad` does not match the workspace order
/// * `SsaError::Domain` / `SsaError::Convergence` as [`compute_ssa`]
pub fn compute_ssa_factorized(
    grad: Option<&mut Array2<f64>>,
    ws: &mut SsaWorkspace,
    epsilon: Option<f64>,
    strategy: RootStrategy,
) -> Result<f64> {
    let epsilon = match epsilon {
        Some(eps) => validate_epsilon(eps)?,
        None => {
            let t = ws.schur()?.t();
            epsilon_from_norm(t.norm_l2(), ws.order())
        }
    };
    let outcome = ws.evaluate(epsilon, strategy, grad.map(|g| g.view_mut()))?;
    Ok(outcome.shift)
}

/// Allocate a workspace for n×n matrices.
///
/// # Errors
///
/// `SsaError::Domain` if `n == 0`.
pub fn make_workspace(n: usize) -> Result<SsaWorkspace> {
    SsaWorkspace::new(n)
}

/// Factorize `a` into `ws`, replacing the cached Schur form.
///
/// # Errors
///
/// `SsaError::Dimension` if `a` is not n×n; `SsaError::Factorization` on
/// non-finite input or non-convergence.
pub fn refresh_workspace(a: &Array2<f64>, ws: &mut SsaWorkspace) -> Result<()> {
    ws.refresh(a.view())
}

/// Default smoothing parameter for `a`.
///
/// ε = 0.01 · σ / n with σ = ‖A‖_F / √n, the root-mean-square row norm. For
/// a normal matrix the SSA then sits about σ/200 above the spectral abscissa
/// regardless of n, which keeps the Lyapunov solves well conditioned while
/// staying close to α(A). A zero matrix uses σ = 1.
///
/// # Errors
///
/// `SsaError::Dimension` if `a` is not square, `SsaError::Domain` if empty
/// or not finite.
///
/// # Examples
///
/// ```
/// use ndarray::Array2;
/// use smoothed_abscissa::default_epsilon;
///
/// let a = Array2::<f64>::eye(4) * 2.0;
/// assert!((default_epsilon(&a).unwrap() - 0.005).abs() < 1e-15);
/// ```
pub fn default_epsilon(a: &Array2<f64>) -> Result<f64> {
    if !a.is_square() {
        return Err(SsaError::square(a.shape()));
    }
    let n = a.nrows();
    if n == 0 {
        return Err(SsaError::Domain(
            "matrix order must be at least 1".to_string(),
        ));
    }
    let norm = a.norm_l2();
    if !norm.is_finite() {
        return Err(SsaError::Domain(format!(
            "matrix norm is not finite ({norm})"
        )));
    }
    Ok(epsilon_from_norm(norm, n))
}

fn epsilon_from_norm(frobenius: f64, n: usize) -> f64 {
    let n = n as f64;
    let scale = frobenius / n.sqrt();
    let scale = if scale > 0.0 { scale } else { 1.0 };
    DEFAULT_EPSILON_FACTOR * scale / n
}

fn validate_epsilon(epsilon: f64) -> Result<f64> {
    if epsilon.is_finite() && epsilon > 0.0 {
        Ok(epsilon)
    } else {
        Err(SsaError::Domain(format!(
            "epsilon must be positive and finite, got {epsilon}"
        )))
    }
}

/// Spectral abscissa α(A) = max Re λ(A), the quantity the SSA bounds from above.
///
/// Computed independently of the Schur path with LAPACK's DGEEV (via
/// ndarray-linalg).
///
/// # Errors
///
/// `SsaError::Dimension` if `a` is not square, `SsaError::Domain` if empty,
/// `SsaError::Factorization` if `a` has non-finite entries or the
/// eigenvalue iteration fails.
///
/// # Examples
///
/// ```
/// use ndarray::arr2;
/// use smoothed_abscissa::spectral_abscissa;
///
/// // Eigenvalues -1 ± 2i and -3
/// let a = arr2(&[[-1.0, 2.0, 0.0], [-2.0, -1.0, 0.0], [0.0, 0.0, -3.0]]);
/// assert!((spectral_abscissa(&a).unwrap() + 1.0).abs() < 1e-12);
/// ```
pub fn spectral_abscissa(a: &Array2<f64>) -> Result<f64> {
    if !a.is_square() {
        return Err(SsaError::square(a.shape()));
    }
    if a.nrows() == 0 {
        return Err(SsaError::Domain(
            "matrix order must be at least 1".to_string(),
        ));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(SsaError::Factorization(
            "matrix has non-finite entries".to_string(),
        ));
    }

    let (eigenvalues, _) = a
        .eig()
        .map_err(|e| SsaError::Factorization(format!("eigenvalue computation failed: {e}")))?;
    Ok(eigenvalues
        .iter()
        .map(|lambda| lambda.re)
        .fold(f64::NEG_INFINITY, f64::max))
}

/// Compute the SSA of `a` along with diagnostics of the search.
///
/// # Errors
///
/// As [`compute_ssa`].
pub fn ssa_report(a: &Array2<f64>, epsilon: Option<f64>) -> Result<SsaReport> {
    let mut ws = SsaWorkspace::for_matrix(a)?;
    let epsilon = match epsilon {
        Some(eps) => validate_epsilon(eps)?,
        None => default_epsilon(a)?,
    };
    ws.refresh(a.view())?;
    let outcome = ws.evaluate(epsilon, RootStrategy::Bisection, None)?;
    Ok(SsaReport {
        ssa: outcome.shift,
        epsilon,
        spectral_abscissa: ws.schur()?.spectral_abscissa(),
        trace: outcome.trace,
        iterations: outcome.iterations,
        evaluations: outcome.evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_default_epsilon_zero_matrix() {
        let a = Array2::<f64>::zeros((3, 3));
        assert!((default_epsilon(&a).unwrap() - 0.01 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_default_epsilon_scales_with_matrix() {
        let a = arr2(&[[1.0, -2.0], [0.5, 3.0]]);
        let e1 = default_epsilon(&a).unwrap();
        let e10 = default_epsilon(&(&a * 10.0)).unwrap();
        assert!((e10 / e1 - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_default_epsilon_errors() {
        assert!(matches!(
            default_epsilon(&Array2::zeros((2, 3))),
            Err(SsaError::Dimension { .. })
        ));
        assert!(matches!(
            default_epsilon(&Array2::zeros((0, 0))),
            Err(SsaError::Domain(_))
        ));
    }

    #[test]
    fn test_scalar_matrix() {
        // trace(Q) = 1/(2(s - a))  =>  s = a + ε/2
        let a = arr2(&[[0.7]]);
        let ssa = compute_ssa(&a, Some(0.2)).unwrap();
        assert!((ssa - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_scalar_gradient_is_one() {
        let a = arr2(&[[-4.0]]);
        let (_, grad) = compute_ssa_with_gradient(&a, Some(0.3)).unwrap();
        assert!((grad[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spectral_abscissa_real_and_complex() {
        let a = arr2(&[[0.0, 1.0], [-1.0, 0.0]]);
        assert!(spectral_abscissa(&a).unwrap().abs() < 1e-12);

        let b = arr2(&[[2.0, 7.0], [0.0, -1.0]]);
        assert!((spectral_abscissa(&b).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_spectral_abscissa_errors() {
        assert!(matches!(
            spectral_abscissa(&Array2::zeros((3, 2))),
            Err(SsaError::Dimension { .. })
        ));
        assert!(matches!(
            spectral_abscissa(&arr2(&[[f64::NAN]])),
            Err(SsaError::Factorization(_))
        ));
    }

    #[test]
    fn test_inplace_dimension_mismatch() {
        let mut ws = make_workspace(3).unwrap();
        let a = Array2::<f64>::eye(2);
        assert!(matches!(
            compute_ssa_inplace(&a, None, &mut ws, Some(0.1)),
            Err(SsaError::Dimension { .. })
        ));

        let b = -Array2::<f64>::eye(3);
        let mut grad = Array2::zeros((2, 2));
        assert!(matches!(
            compute_ssa_inplace(&b, Some(&mut grad), &mut ws, Some(0.1)),
            Err(SsaError::Dimension { .. })
        ));
    }

    #[test]
    fn test_factorized_requires_refresh() {
        let mut ws = make_workspace(2).unwrap();
        assert_eq!(
            compute_ssa_factorized(None, &mut ws, Some(0.1), RootStrategy::Bisection),
            Err(SsaError::Unfactorized)
        );
    }

    #[test]
    fn test_factorized_default_epsilon_matches() {
        let a = arr2(&[[-1.0, 3.0, 0.0], [0.0, -2.0, 1.0], [0.5, 0.0, -0.5]]);
        let mut ws = make_workspace(3).unwrap();
        refresh_workspace(&a, &mut ws).unwrap();
        let from_factorization =
            compute_ssa_factorized(None, &mut ws, None, RootStrategy::Bisection).unwrap();
        let direct = compute_ssa(&a, None).unwrap();
        assert!((from_factorization - direct).abs() < 1e-10);
    }

    #[test]
    fn test_report_fields() {
        let a = arr2(&[[-1.0, 0.0], [0.0, -2.0]]);
        let report = ssa_report(&a, Some(0.01)).unwrap();
        assert_eq!(report.epsilon, 0.01);
        assert!((report.spectral_abscissa + 1.0).abs() < 1e-14);
        assert!(report.ssa > report.spectral_abscissa);
        assert!((report.trace * report.epsilon - 1.0).abs() < 1e-8);
        assert!(report.evaluations >= 2);
    }
}
