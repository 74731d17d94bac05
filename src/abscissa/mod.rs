//! Abscissa Root Finding
//!
//! This module locates the smoothed spectral abscissa s* of a factorized
//! matrix, the unique shift above the spectral abscissa α with
//!
//! ```text
//! trace(Q(s*)) = 1/ε,    (T - s*I) Q + Q (T - s*I)ᵗ = -I.
//! ```
//!
//! The functional s ↦ trace(Q(s)) is a Laplace transform of a positive
//! function, hence positive, strictly decreasing and convex on (α, ∞). It
//! blows up as s ↓ α and vanishes as s → ∞. The search brackets the root and
//! then narrows the bracket with either a safeguarded secant/bisection
//! iteration or a safeguarded Newton iteration; both share one state machine.

use log::{debug, trace, warn};
use ndarray::{s, ArrayView2, ArrayViewMut2};

use crate::error::{Result, SsaError};
use crate::lyapunov::solve_shifted_lyapunov;
use crate::schur::SchurFactorization;

/// Default relative tolerance on |trace(Q) - 1/ε|, measured against 1/ε.
pub const DEFAULT_FTOL: f64 = 1e-10;
/// Default bracket-width tolerance, relative to the gap s - α.
pub const DEFAULT_XTOL: f64 = 1e-14;
/// Default relative tolerance on the defining equation accepted once the
/// bracket can no longer be narrowed.
pub const DEFAULT_STALL_FTOL: f64 = 1e-6;
/// Default cap on narrowing iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 200;
/// Default cap on upper-bound doublings.
pub const DEFAULT_MAX_DOUBLINGS: usize = 100;

/// Tolerances and iteration caps of the abscissa search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SsaOptions {
    /// Relative tolerance on the defining equation
    pub ftol: f64,
    /// Tolerance on the bracket width, relative to the distance from α
    pub xtol: f64,
    /// Relative tolerance on the defining equation when the bracket stalls
    /// at float resolution; beyond it the search fails
    pub stall_ftol: f64,
    /// Hard cap on narrowing iterations
    pub max_iterations: usize,
    /// Hard cap on doublings while searching for the upper bound
    pub max_doublings: usize,
}

impl Default for SsaOptions {
    fn default() -> Self {
        SsaOptions {
            ftol: DEFAULT_FTOL,
            xtol: DEFAULT_XTOL,
            stall_ftol: DEFAULT_STALL_FTOL,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_doublings: DEFAULT_MAX_DOUBLINGS,
        }
    }
}

/// Narrowing strategy once the root is bracketed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootStrategy {
    /// Secant on 1/trace(Q(s)), safeguarded by bisection
    Bisection,
    /// Newton on trace(Q(s)) with the adjoint derivative, safeguarded by bisection
    Newton,
}

/// Phase of the abscissa search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootState {
    /// Searching for shifts on both sides of the root
    Bracketing,
    /// Narrowing a bracket [lo, hi] around the root
    Iterating,
    /// The defining equation holds at the returned shift
    Converged,
    /// The search stopped with an error
    Failed,
}

/// Result of a converged search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootOutcome {
    /// The smoothed spectral abscissa s*
    pub shift: f64,
    /// trace(Q(s*))
    pub trace: f64,
    /// Narrowing iterations performed
    pub iterations: usize,
    /// Lyapunov solves of the primal equation
    pub evaluations: usize,
}

/// trace(Q(s)) and its adjoint, evaluated on a cached Schur factorization.
///
/// Borrows the solution buffers from the workspace. The primal solution Q
/// lives in Schur coordinates; the adjoint is solved on J Tᵗ J and stored
/// reversed, so P = J Y J is exposed as a negative-stride view of Y.
pub struct StabilityFunctional<'a> {
    schur: &'a SchurFactorization,
    rhs: ArrayView2<'a, f64>,
    q: ArrayViewMut2<'a, f64>,
    y: ArrayViewMut2<'a, f64>,
    primal_shift: Option<f64>,
    adjoint_shift: Option<f64>,
}

impl<'a> StabilityFunctional<'a> {
    /// Wrap a factorization, the right-hand side -I, and two n×n buffers.
    pub fn new(
        schur: &'a SchurFactorization,
        rhs: ArrayView2<'a, f64>,
        q: ArrayViewMut2<'a, f64>,
        y: ArrayViewMut2<'a, f64>,
    ) -> Self {
        StabilityFunctional {
            schur,
            rhs,
            q,
            y,
            primal_shift: None,
            adjoint_shift: None,
        }
    }

    pub fn schur(&self) -> &'a SchurFactorization {
        self.schur
    }

    /// Solve for Q(s) and return its trace.
    pub fn primal(&mut self, shift: f64) -> Result<f64> {
        let trace = solve_shifted_lyapunov(
            self.schur.t(),
            self.schur.blocks(),
            shift,
            self.rhs,
            self.q.view_mut(),
        )?;
        self.primal_shift = Some(shift);
        Ok(trace)
    }

    /// Solve (T - sI)ᵗ P + P (T - sI) = -I unless P(s) is already held.
    pub fn adjoint(&mut self, shift: f64) -> Result<()> {
        if self.adjoint_shift == Some(shift) {
            return Ok(());
        }
        solve_shifted_lyapunov(
            self.schur.t_reversed(),
            self.schur.reversed_blocks(),
            shift,
            self.rhs,
            self.y.view_mut(),
        )?;
        self.adjoint_shift = Some(shift);
        Ok(())
    }

    /// Shift at which Q was last solved.
    pub fn primal_shift(&self) -> Option<f64> {
        self.primal_shift
    }

    /// Q at the last primal shift.
    pub fn q(&self) -> ArrayView2<'_, f64> {
        self.q.view()
    }

    /// P at the last adjoint shift.
    pub fn p(&self) -> ArrayView2<'_, f64> {
        self.y.slice(s![..;-1, ..;-1])
    }

    /// trace(P Q) = Σᵢⱼ Pᵢⱼ Qᵢⱼ, both symmetric.
    pub fn trace_pq(&self) -> f64 {
        self.p()
            .iter()
            .zip(self.q.iter())
            .map(|(p, q)| p * q)
            .sum()
    }

    /// d/ds trace(Q(s)) = -2 trace(P(s) Q(s)).
    ///
    /// Requires Q to be current at `shift`; solves the adjoint if needed.
    pub fn derivative(&mut self, shift: f64) -> Result<f64> {
        debug_assert_eq!(self.primal_shift, Some(shift));
        self.adjoint(shift)?;
        Ok(-2.0 * self.trace_pq())
    }
}

/// Bracketing and narrowing search for trace(Q(s)) = 1/ε.
#[derive(Clone, Debug)]
pub struct AbscissaRootFinder {
    strategy: RootStrategy,
    options: SsaOptions,
    state: RootState,
    alpha: f64,
    lo: f64,
    f_lo: f64,
    hi: f64,
    f_hi: f64,
    iterations: usize,
    evaluations: usize,
}

impl AbscissaRootFinder {
    pub fn new(strategy: RootStrategy, options: SsaOptions) -> Self {
        AbscissaRootFinder {
            strategy,
            options,
            state: RootState::Bracketing,
            alpha: f64::NAN,
            lo: f64::NAN,
            f_lo: f64::NAN,
            hi: f64::NAN,
            f_hi: f64::NAN,
            iterations: 0,
            evaluations: 0,
        }
    }

    pub fn state(&self) -> RootState {
        self.state
    }

    /// Find s* with trace(Q(s*)) = 1/ε.
    ///
    /// On success the functional's Q buffer holds Q(s*).
    ///
    /// # Arguments
    ///
    /// * `functional` - evaluator over the cached factorization
    /// * `epsilon` - smoothing parameter, > 0
    ///
    /// # Errors
    ///
    /// * `SsaError::Domain` if `epsilon` is not a positive finite number
    /// * `SsaError::Convergence` if ε is below what the shift can resolve,
    ///   the functional turns non-finite, or an iteration cap is hit
    ///
    /// # Algorithm
    ///
    /// 1. **Bracketing**: for every eigenvalue λ and s > Re λ,
    ///    trace(Q(s)) ≥ 1/(2(s - Re λ)), so lo = α + ε/2 has
    ///    trace(Q(lo)) ≥ 1/ε. The upper end hi = α + h doubles h, starting
    ///    from max(nε/2, ε), until trace(Q(hi)) < 1/ε. Every trial shift that is
    ///    still too large tightens lo.
    /// 2. **Iterating**: a candidate point comes from the strategy (secant on
    ///    1/trace, or a Newton step on trace); if it is not strictly inside
    ///    the bracket, or a secant step failed to halve the bracket, the
    ///    midpoint is used instead.
    /// 3. **Converged** when |trace - 1/ε| ≤ ftol/ε, or when the bracket is
    ///    narrower than xtol·(lo - α) or its ends are adjacent floats. In the
    ///    latter cases the better end is returned only if it meets the looser
    ///    stall_ftol; otherwise the search fails. Q always matches s*.
    pub fn solve(
        &mut self,
        functional: &mut StabilityFunctional<'_>,
        epsilon: f64,
    ) -> Result<RootOutcome> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(SsaError::Domain(format!(
                "epsilon must be positive and finite, got {epsilon}"
            )));
        }

        self.state = RootState::Bracketing;
        self.iterations = 0;
        self.evaluations = 0;

        let result = self.run(functional, epsilon);
        match &result {
            Ok(outcome) => {
                self.state = RootState::Converged;
                debug!(
                    "abscissa search converged: s* = {:.16e}, trace = {:.6e}, {} iterations, {} solves ({:?})",
                    outcome.shift,
                    outcome.trace,
                    outcome.iterations,
                    outcome.evaluations,
                    self.strategy
                );
            }
            Err(err) => {
                self.state = RootState::Failed;
                warn!("abscissa search failed: {err}");
            }
        }
        result
    }

    fn run(
        &mut self,
        functional: &mut StabilityFunctional<'_>,
        epsilon: f64,
    ) -> Result<RootOutcome> {
        let target = 1.0 / epsilon;
        let n = functional.schur().order() as f64;
        let alpha = functional.schur().spectral_abscissa();
        self.alpha = alpha;

        // Lower bound
        let mut offset = 0.5 * epsilon;
        let mut lo = alpha + offset;
        if lo <= alpha {
            return Err(SsaError::Convergence(format!(
                "epsilon {epsilon:e} is below the resolution of the spectral abscissa {alpha:e}"
            )));
        }
        let mut f_lo = self.evaluate(functional, lo)?;
        if self.is_root(f_lo, target) {
            return Ok(self.outcome(lo, f_lo));
        }

        // Rounding can leave trace(lo) just under the target; move toward α.
        let mut shrinks = 0;
        let mut hi_hint = None;
        while f_lo < target {
            shrinks += 1;
            if shrinks > self.options.max_doublings {
                return Err(SsaError::Convergence(format!(
                    "no shift above {alpha:e} reaches trace 1/epsilon = {target:e}"
                )));
            }
            hi_hint = Some((lo, f_lo));
            offset *= 0.5;
            lo = alpha + offset;
            if lo <= alpha {
                return Err(SsaError::Convergence(format!(
                    "lower bound collapsed onto the spectral abscissa {alpha:e}"
                )));
            }
            f_lo = self.evaluate(functional, lo)?;
            if self.is_root(f_lo, target) {
                return Ok(self.outcome(lo, f_lo));
            }
        }

        // Upper bound
        let (hi, f_hi) = match hi_hint {
            Some(bound) => bound,
            None => {
                let mut step = (0.5 * n * epsilon).max(epsilon);
                let mut doublings = 0;
                loop {
                    let hi = alpha + step;
                    let f_hi = self.evaluate(functional, hi)?;
                    if self.is_root(f_hi, target) {
                        return Ok(self.outcome(hi, f_hi));
                    }
                    if f_hi < target {
                        break (hi, f_hi);
                    }
                    lo = hi;
                    f_lo = f_hi;
                    doublings += 1;
                    if doublings > self.options.max_doublings {
                        return Err(SsaError::Convergence(format!(
                            "no upper bound found after {doublings} doublings (last shift {hi:e}, trace {f_hi:e})"
                        )));
                    }
                    step *= 2.0;
                }
            }
        };

        self.lo = lo;
        self.f_lo = f_lo;
        self.hi = hi;
        self.f_hi = f_hi;
        self.state = RootState::Iterating;
        trace!(
            "bracket [{:.16e}, {:.16e}], trace [{:.6e}, {:.6e}], target {:.6e}",
            lo,
            hi,
            f_lo,
            f_hi,
            target
        );

        self.iterate(functional, epsilon, target)
    }

    fn iterate(
        &mut self,
        functional: &mut StabilityFunctional<'_>,
        epsilon: f64,
        target: f64,
    ) -> Result<RootOutcome> {
        // The last evaluated point is always one of the bracket ends.
        let (mut shift, mut value) = if functional.primal_shift() == Some(self.hi) {
            (self.hi, self.f_hi)
        } else {
            (self.lo, self.f_lo)
        };
        let mut width = self.hi - self.lo;
        let mut force_bisection = false;

        loop {
            let mid = 0.5 * (self.lo + self.hi);
            if !(mid > self.lo && mid < self.hi) {
                return self.settle(functional, target);
            }
            if self.iterations >= self.options.max_iterations {
                return Err(SsaError::Convergence(format!(
                    "iteration cap {} reached with bracket [{:e}, {:e}]",
                    self.options.max_iterations, self.lo, self.hi
                )));
            }
            self.iterations += 1;

            let candidate = match self.strategy {
                RootStrategy::Bisection if force_bisection => f64::NAN,
                RootStrategy::Bisection => {
                    // Secant on r(s) = 1/trace(Q(s)) - ε
                    let r_lo = 1.0 / self.f_lo - epsilon;
                    let r_hi = 1.0 / self.f_hi - epsilon;
                    self.lo - r_lo * (self.hi - self.lo) / (r_hi - r_lo)
                }
                RootStrategy::Newton => {
                    let slope = functional.derivative(shift)?;
                    shift - (value - target) / slope
                }
            };

            let inside = candidate > self.lo && candidate < self.hi;
            let next = if inside { candidate } else { mid };

            value = self.evaluate(functional, next)?;
            shift = next;
            trace!(
                "iteration {}: s = {:.16e}, trace = {:.6e}{}",
                self.iterations,
                shift,
                value,
                if inside { "" } else { " (bisection)" }
            );

            if self.is_root(value, target) {
                return Ok(self.outcome(shift, value));
            }

            if value > target {
                self.lo = shift;
                self.f_lo = value;
            } else {
                self.hi = shift;
                self.f_hi = value;
            }

            let new_width = self.hi - self.lo;
            if new_width <= self.options.xtol * (self.lo - self.alpha) {
                return self.settle(functional, target);
            }
            force_bisection = new_width > 0.5 * width;
            width = new_width;
        }
    }

    /// Finish on the bracket end closer to the target once narrowing stops.
    fn settle(
        &mut self,
        functional: &mut StabilityFunctional<'_>,
        target: f64,
    ) -> Result<RootOutcome> {
        let (shift, value) = if (self.f_lo - target).abs() <= (self.f_hi - target).abs() {
            (self.lo, self.f_lo)
        } else {
            (self.hi, self.f_hi)
        };
        let miss = (value - target).abs() / target;
        if miss > self.options.stall_ftol {
            return Err(SsaError::Convergence(format!(
                "bracket [{:e}, {:e}] cannot be narrowed further; trace(Q) misses 1/epsilon = {target:e} by {miss:.1e} relative",
                self.lo, self.hi
            )));
        }
        let value = if functional.primal_shift() == Some(shift) {
            value
        } else {
            self.evaluate(functional, shift)?
        };
        Ok(self.outcome(shift, value))
    }

    fn evaluate(&mut self, functional: &mut StabilityFunctional<'_>, shift: f64) -> Result<f64> {
        let value = functional.primal(shift)?;
        self.evaluations += 1;
        if !value.is_finite() || value <= 0.0 {
            return Err(SsaError::Convergence(format!(
                "trace(Q) = {value:e} at shift {shift:e}; the Lyapunov solve is too ill-conditioned"
            )));
        }
        Ok(value)
    }

    fn is_root(&self, value: f64, target: f64) -> bool {
        (value - target).abs() <= self.options.ftol * target
    }

    fn outcome(&self, shift: f64, trace: f64) -> RootOutcome {
        RootOutcome {
            shift,
            trace,
            iterations: self.iterations,
            evaluations: self.evaluations,
        }
    }
}
