//! Error types shared by every stage of the SSA computation.
//!
//! All failures funnel into [`SsaError`]. Nothing is retried internally and no
//! partial result travels alongside an error.
use thiserror::Error;

/// Errors raised while factorizing, solving, or root-finding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SsaError {
    /// The real Schur factorization could not be computed, either because the
    /// input holds NaN/infinite entries or because LAPACK's QR iteration did
    /// not converge.
    #[error("Schur factorization failed: {0}")]
    Factorization(String),

    /// The shift search hit one of its hard caps, or the functional became
    /// non-finite before the defining equation was met.
    #[error("root finding did not converge: {0}")]
    Convergence(String),

    /// A matrix or buffer does not have the shape the operation expects.
    #[error("dimension mismatch: expected {expected}, got {found}")]
    Dimension { expected: String, found: String },

    /// A scalar parameter lies outside its admissible domain.
    #[error("invalid parameter: {0}")]
    Domain(String),

    /// The workspace was used before any matrix was factorized into it.
    #[error("workspace holds no Schur factorization; call refresh_workspace first")]
    Unfactorized,
}

impl SsaError {
    pub(crate) fn square(shape: &[usize]) -> Self {
        SsaError::Dimension {
            expected: "a square matrix".to_string(),
            found: format!("{}×{}", shape[0], shape[1]),
        }
    }

    pub(crate) fn size(expected: usize, shape: &[usize]) -> Self {
        SsaError::Dimension {
            expected: format!("{expected}×{expected}"),
            found: format!("{}×{}", shape[0], shape[1]),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SsaError>;
