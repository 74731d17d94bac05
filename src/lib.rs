//! smoothed-abscissa: the Smoothed Spectral Abscissa of real matrices
//!
//! The smoothed spectral abscissa (SSA) α̃_ε(A) of a real square matrix A is
//! a smooth upper bound on its spectral abscissa α(A) (the largest real
//! part of its eigenvalues), defined implicitly by
//!
//! ```text
//! ∫₀^∞ ‖exp((A - α̃_ε I)t)‖²_F dt = 1/ε.
//! ```
//!
//! It tends to α(A) as ε → 0 and, unlike α(A), is differentiable in A, which
//! makes it a practical objective for gradient-based stabilization of linear
//! systems ẋ = Ax (Vanbiervliet et al., SIAM J. Optim. 2009). This crate
//! implements the variant with identity input and output weights.
//!
//! # Organization
//!
//! - `schur`: real Schur factorization A = U T Uᵗ (LAPACK DGEES)
//! - `lyapunov`: Bartels–Stewart solver for shifted Lyapunov equations on T
//! - `abscissa`: bracketing root search on trace(Q(s)) = 1/ε, secant/bisection or Newton
//! - `gradient`: adjoint-based gradient ∂α̃_ε/∂A
//! - `workspace`: reusable buffers for allocation-free repeated evaluation
//! - `ssa`: public entry points and the default ε
//!
//! # Example
//!
//! ```
//! use ndarray::arr2;
//! use smoothed_abscissa::{compute_ssa, compute_ssa_with_gradient, spectral_abscissa};
//!
//! let a = arr2(&[[-1.0, 0.0], [0.0, -2.0]]);
//! let alpha = spectral_abscissa(&a).unwrap();
//!
//! let coarse = compute_ssa(&a, Some(0.1)).unwrap();
//! let fine = compute_ssa(&a, Some(0.001)).unwrap();
//! assert!(alpha < fine && fine < coarse);
//!
//! let (_, grad) = compute_ssa_with_gradient(&a, Some(0.1)).unwrap();
//! assert_eq!(grad.shape(), &[2, 2]);
//! ```

pub mod abscissa;
pub mod error;
pub mod gradient;
pub mod lyapunov;
pub mod schur;
pub mod ssa;
pub mod workspace;

pub use abscissa::{RootStrategy, SsaOptions};
pub use error::{Result, SsaError};
pub use gradient::directional_derivative;
pub use ssa::{
    compute_ssa, compute_ssa_factorized, compute_ssa_inplace, compute_ssa_inplace_newton,
    compute_ssa_with_gradient, default_epsilon, make_workspace, refresh_workspace,
    spectral_abscissa, ssa_report, SsaReport,
};
pub use workspace::SsaWorkspace;
