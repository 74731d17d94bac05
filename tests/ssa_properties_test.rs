//! Integration tests for the SSA value
//!
//! These tests check the defining properties of the smoothed spectral
//! abscissa on random and structured matrices: the upper bound on the
//! spectral abscissa, monotonicity in ε, the defining equation, agreement of
//! the two root-finding strategies, and the error contract.

use approx::assert_relative_eq;
use ndarray::{arr1, arr2, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smoothed_abscissa::{
    compute_ssa, compute_ssa_factorized, compute_ssa_inplace, compute_ssa_inplace_newton,
    make_workspace, refresh_workspace, spectral_abscissa, ssa_report, RootStrategy, SsaError,
    SsaOptions, SsaWorkspace,
};

/// Random n×n matrix with entries uniform in [-1, 1] / √n (spectral radius O(1)).
fn random_matrix(n: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let scale = 1.0 / (n as f64).sqrt();
    Array2::from_shape_fn((n, n), |_| rng.gen_range(-1.0..1.0) * scale)
}

/// Block-diagonal normal matrix with 2×2 rotation-scaling blocks and real entries.
fn normal_matrix(real_parts: &[f64], imag_parts: &[f64], reals: &[f64]) -> Array2<f64> {
    let n = 2 * real_parts.len() + reals.len();
    let mut a = Array2::zeros((n, n));
    for (k, (&re, &im)) in real_parts.iter().zip(imag_parts.iter()).enumerate() {
        let i = 2 * k;
        a[(i, i)] = re;
        a[(i + 1, i + 1)] = re;
        a[(i, i + 1)] = im;
        a[(i + 1, i)] = -im;
    }
    let offset = 2 * real_parts.len();
    for (k, &re) in reals.iter().enumerate() {
        a[(offset + k, offset + k)] = re;
    }
    a
}

#[test]
fn test_diagonal_scenario() {
    let a = arr2(&[[-1.0, 0.0], [0.0, -2.0]]);
    assert_relative_eq!(spectral_abscissa(&a).unwrap(), -1.0, epsilon = 1e-14);

    let mut previous = f64::INFINITY;
    for epsilon in [0.1, 0.01, 0.001] {
        let ssa = compute_ssa(&a, Some(epsilon)).unwrap();
        assert!(ssa > -1.0, "epsilon {epsilon}: {ssa}");
        assert!(ssa < previous);
        // Closed form: 1/(2(s+1)) + 1/(2(s+2)) = 1/ε
        let f = 0.5 / (ssa + 1.0) + 0.5 / (ssa + 2.0);
        assert_relative_eq!(f * epsilon, 1.0, epsilon = 1e-8);
        previous = ssa;
    }
}

#[test]
fn test_upper_bound_on_random_matrices() {
    for seed in 0..12u64 {
        let n = 2 + (seed as usize % 7);
        let a = random_matrix(n, seed);
        let alpha = spectral_abscissa(&a).unwrap();
        for epsilon in [0.5, 0.05, 0.005] {
            let ssa = compute_ssa(&a, Some(epsilon)).unwrap();
            assert!(ssa > alpha, "seed {seed}, epsilon {epsilon}: {ssa} <= {alpha}");
        }
        assert!(compute_ssa(&a, None).unwrap() > alpha);
    }
}

#[test]
fn test_monotone_in_epsilon() {
    let a = random_matrix(6, 42);
    let alpha = spectral_abscissa(&a).unwrap();
    let mut previous = f64::INFINITY;
    for k in 0..8 {
        let epsilon = 0.5 * 0.4f64.powi(k);
        let ssa = compute_ssa(&a, Some(epsilon)).unwrap();
        assert!(ssa <= previous, "not monotone at epsilon {epsilon}");
        assert!(ssa > alpha);
        previous = ssa;
    }
}

#[test]
fn test_normal_matrix_gap_bound() {
    // For normal A, trace(Q(s)) ≤ n / (2(s - α)), hence α < ssa ≤ α + nε/2,
    // so the SSA converges to α linearly in ε.
    let a = normal_matrix(&[-0.3, -1.0], &[2.0, 0.5], &[-0.5, -2.0]);
    let n = a.nrows() as f64;
    let alpha = spectral_abscissa(&a).unwrap();
    assert_relative_eq!(alpha, -0.3, epsilon = 1e-12);

    for epsilon in [0.1, 0.01, 0.001, 0.0001] {
        let ssa = compute_ssa(&a, Some(epsilon)).unwrap();
        assert!(ssa > alpha);
        assert!(ssa - alpha <= 0.5 * n * epsilon * (1.0 + 1e-9));
    }
}

#[test]
fn test_defining_equation_at_solution() {
    for (n, seed) in [(3, 7u64), (8, 8), (15, 9)] {
        let a = random_matrix(n, seed);
        let epsilon = 0.02;
        let mut ws = SsaWorkspace::for_matrix(&a).unwrap();
        let ssa = compute_ssa_inplace(&a, None, &mut ws, Some(epsilon)).unwrap();

        let outcome = ws.last_outcome().unwrap();
        assert_eq!(outcome.shift, ssa);
        let trace = ws.lyapunov_solution().diag().sum();
        assert_relative_eq!(trace * epsilon, 1.0, epsilon = 1e-8);
    }
}

#[test]
fn test_bisection_and_newton_agree() {
    for (n, seed) in [(2, 1u64), (5, 2), (12, 3), (25, 4)] {
        let a = random_matrix(n, seed);
        let mut ws = make_workspace(n).unwrap();
        for epsilon in [0.1, 0.01] {
            let bisection = compute_ssa_inplace(&a, None, &mut ws, Some(epsilon)).unwrap();
            let newton = compute_ssa_inplace_newton(&a, None, &mut ws, Some(epsilon)).unwrap();
            assert_relative_eq!(bisection, newton, epsilon = 1e-9, max_relative = 1e-9);
        }
    }
}

#[test]
fn test_shift_and_orthogonal_invariance() {
    let a = random_matrix(5, 77);
    let epsilon = 0.05;
    let base = compute_ssa(&a, Some(epsilon)).unwrap();

    let shifted = &a + &(Array2::<f64>::eye(5) * 0.75);
    assert_relative_eq!(
        compute_ssa(&shifted, Some(epsilon)).unwrap(),
        base + 0.75,
        epsilon = 1e-9
    );

    // Givens rotation in the (1, 3) plane
    let (c, s) = (0.6f64, 0.8f64);
    let mut g = Array2::<f64>::eye(5);
    g[(1, 1)] = c;
    g[(3, 3)] = c;
    g[(1, 3)] = -s;
    g[(3, 1)] = s;
    let rotated = g.dot(&a).dot(&g.t());
    assert_relative_eq!(
        compute_ssa(&rotated, Some(epsilon)).unwrap(),
        base,
        epsilon = 1e-9
    );
}

#[test]
fn test_idempotent_after_refresh() {
    let a = random_matrix(9, 13);
    let mut ws = make_workspace(9).unwrap();
    refresh_workspace(&a, &mut ws).unwrap();

    let first = compute_ssa_inplace(&a, None, &mut ws, Some(0.03)).unwrap();
    let second = compute_ssa_inplace(&a, None, &mut ws, Some(0.03)).unwrap();
    assert_eq!(first, second);

    let third = compute_ssa_factorized(None, &mut ws, Some(0.03), RootStrategy::Bisection).unwrap();
    let fourth = compute_ssa_factorized(None, &mut ws, Some(0.03), RootStrategy::Bisection).unwrap();
    assert_eq!(third, fourth);
    assert_relative_eq!(first, third, epsilon = 1e-12);
}

#[test]
fn test_workspace_reuse_across_matrices() {
    let mut ws = make_workspace(6).unwrap();
    for seed in 100..105u64 {
        let a = random_matrix(6, seed);
        let reused = compute_ssa_inplace(&a, None, &mut ws, Some(0.05)).unwrap();
        let fresh = compute_ssa(&a, Some(0.05)).unwrap();
        assert_relative_eq!(reused, fresh, epsilon = 1e-12);
    }
}

#[test]
fn test_unstable_and_marginal_matrices() {
    // Positive abscissa
    let a = arr2(&[[1.5, 10.0], [0.0, 0.2]]);
    let ssa = compute_ssa(&a, Some(0.01)).unwrap();
    assert!(ssa > 1.5);

    // Purely imaginary eigenvalues
    let b = arr2(&[[0.0, 1.0], [-1.0, 0.0]]);
    let ssa = compute_ssa(&b, Some(0.01)).unwrap();
    assert!(ssa > 0.0 && ssa <= 0.01 * (1.0 + 1e-9));

    // Nilpotent Jordan block: highly non-normal
    let c = arr2(&[[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]]);
    let ssa = compute_ssa(&c, Some(0.01)).unwrap();
    assert!(ssa > 0.0);
}

#[test]
fn test_report_matches_value() {
    let a = random_matrix(4, 5);
    let report = ssa_report(&a, Some(0.02)).unwrap();
    assert_relative_eq!(report.ssa, compute_ssa(&a, Some(0.02)).unwrap(), epsilon = 1e-12);
    assert_relative_eq!(
        report.spectral_abscissa,
        spectral_abscissa(&a).unwrap(),
        epsilon = 1e-10
    );
    assert_relative_eq!(report.trace * 0.02, 1.0, epsilon = 1e-8);
}

#[test]
fn test_error_contract() {
    let rectangular = Array2::<f64>::zeros((2, 3));
    assert!(matches!(
        compute_ssa(&rectangular, Some(0.1)),
        Err(SsaError::Dimension { .. })
    ));

    let a = arr2(&[[-1.0, 0.0], [0.0, -2.0]]);
    for epsilon in [0.0, -0.01] {
        assert!(matches!(
            compute_ssa(&a, Some(epsilon)),
            Err(SsaError::Domain(_))
        ));
    }

    assert!(matches!(
        compute_ssa(&Array2::zeros((0, 0)), Some(0.1)),
        Err(SsaError::Domain(_))
    ));

    let nan = arr2(&[[-1.0, f64::NAN], [0.0, -2.0]]);
    assert!(matches!(
        compute_ssa(&nan, Some(0.1)),
        Err(SsaError::Factorization(_))
    ));

    // ε far below what the shift can resolve
    assert!(matches!(
        compute_ssa(&a, Some(1e-20)),
        Err(SsaError::Convergence(_))
    ));
}

/// Run both strategies on diag(`diag`) and require either the defining
/// equation at the returned shift or a convergence failure.
fn check_small_epsilon(diag: &[f64], epsilon: f64) -> usize {
    let a = Array2::from_diag(&arr1(diag));
    let mut ws = make_workspace(diag.len()).unwrap();
    let mut converged = 0;
    for newton in [false, true] {
        let result = if newton {
            compute_ssa_inplace_newton(&a, None, &mut ws, Some(epsilon))
        } else {
            compute_ssa_inplace(&a, None, &mut ws, Some(epsilon))
        };
        match result {
            Ok(ssa) => {
                let f: f64 = diag.iter().map(|d| 0.5 / (ssa - d)).sum();
                assert!(
                    (f * epsilon - 1.0).abs() <= 2e-6,
                    "diag {diag:?}, epsilon {epsilon:e}, newton {newton}: trace {f:e}"
                );
                assert_eq!(ws.last_outcome().unwrap().shift, ssa);
                converged += 1;
            }
            Err(SsaError::Convergence(_)) => {}
            Err(other) => panic!("diag {diag:?}, epsilon {epsilon:e}: unexpected {other}"),
        }
    }
    converged
}

#[test]
fn test_small_epsilon_meets_equation_or_fails() {
    for epsilon in [1e-13, 1e-14] {
        check_small_epsilon(&[-1.0, -2.0], epsilon);
    }
    check_small_epsilon(&[1e6, -2.0], 1e-8);
}

#[test]
fn test_small_epsilon_resolved_to_float_precision() {
    // s* - α ≈ ε/2 spans millions of float spacings: both strategies succeed
    assert_eq!(check_small_epsilon(&[-1.0, -2.0], 1e-9), 2);
    assert_eq!(check_small_epsilon(&[1e3, -2.0], 1e-6), 2);
}

#[test]
fn test_stall_tolerance_is_configurable() {
    let a = arr2(&[[-1.0, 0.0], [0.0, -2.0]]);
    let mut ws = make_workspace(2).unwrap();
    // Exact equality is out of reach at float resolution
    let strict = SsaOptions {
        ftol: 0.0,
        stall_ftol: 0.0,
        ..SsaOptions::default()
    };
    ws.set_options(strict);
    assert!(matches!(
        compute_ssa_inplace(&a, None, &mut ws, Some(1e-9)),
        Err(SsaError::Convergence(_))
    ));

    ws.set_options(SsaOptions::default());
    assert!(compute_ssa_inplace(&a, None, &mut ws, Some(1e-9)).is_ok());
}
