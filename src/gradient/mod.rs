//! Gradient of the Smoothed Spectral Abscissa
//!
//! With f(A, s) = trace(Q(A, s)) and the adjoint P solving
//! (A - sI)ᵗ P + P (A - sI) = -I, first-order perturbation of the two
//! Lyapunov equations gives
//!
//! ```text
//! ∂f/∂A = 2 P Q,        ∂f/∂s = -2 trace(P Q).
//! ```
//!
//! Differentiating f(A, s*(A)) = 1/ε at fixed ε yields
//!
//! ```text
//! ∂s*/∂A = P Q / trace(P Q),
//! ```
//!
//! so ε enters only through s*. In Schur coordinates P_A Q_A = U P_T Q_T Uᵗ
//! and the trace is invariant, so the gradient is assembled from the
//! triangular-coordinate solutions and mapped back with U.

use ndarray::linalg::general_mat_mul;
use ndarray::{Array2, ArrayViewMut2};

use crate::abscissa::StabilityFunctional;
use crate::error::{Result, SsaError};

/// Write ∂s*/∂A into `grad`.
///
/// # Arguments
///
/// * `functional` - evaluator whose Q buffer holds Q(s*)
/// * `shift` - the converged abscissa s*
/// * `product` - n×n scratch for P_T Q_T
/// * `rotated` - n×n scratch for U P_T Q_T
/// * `grad` - n×n output
///
/// # Errors
///
/// * `SsaError::Dimension` if a buffer is not n×n
/// * `SsaError::Convergence` if trace(P Q) is not a positive finite number
///   (the derivative of the defining equation vanished)
pub fn ssa_gradient(
    functional: &mut StabilityFunctional<'_>,
    shift: f64,
    mut product: ArrayViewMut2<f64>,
    mut rotated: ArrayViewMut2<f64>,
    mut grad: ArrayViewMut2<f64>,
) -> Result<()> {
    let n = functional.schur().order();
    for buffer in [product.shape(), rotated.shape(), grad.shape()] {
        if buffer != [n, n] {
            return Err(SsaError::size(n, buffer));
        }
    }

    if functional.primal_shift() != Some(shift) {
        functional.primal(shift)?;
    }
    functional.adjoint(shift)?;

    let trace_pq = functional.trace_pq();
    if !(trace_pq.is_finite() && trace_pq > 0.0) {
        return Err(SsaError::Convergence(format!(
            "trace(PQ) = {trace_pq:e} at s* = {shift:e}; the abscissa is not differentiable here"
        )));
    }

    let u = functional.schur().u();
    general_mat_mul(1.0, &functional.p(), &functional.q(), 0.0, &mut product);
    general_mat_mul(1.0, &u, &product, 0.0, &mut rotated);
    general_mat_mul(1.0 / trace_pq, &rotated, &u.t(), 0.0, &mut grad);
    Ok(())
}

/// Directional derivative ⟨G, E⟩ = Σᵢⱼ Gᵢⱼ Eᵢⱼ.
pub fn directional_derivative(grad: &Array2<f64>, direction: &Array2<f64>) -> f64 {
    grad.iter().zip(direction.iter()).map(|(g, e)| g * e).sum()
}
