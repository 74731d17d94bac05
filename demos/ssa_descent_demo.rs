//! Demonstration of stabilization by SSA descent
//!
//! This example drives the smoothed spectral abscissa of an unstable,
//! strongly non-normal system matrix below zero by gradient steps on a
//! subset of its entries (a static state-feedback column), reusing one
//! workspace for every evaluation.
//!
//! Run with `RUST_LOG=debug` to see the root searches.

use ndarray::{arr2, Array2};
use smoothed_abscissa::{
    compute_ssa_inplace, directional_derivative, make_workspace, spectral_abscissa,
};

fn main() {
    println!("=== SSA Descent Demonstration ===\n");

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let mut a = arr2(&[
        [0.4, 5.0, 0.0, 0.0],
        [0.0, -0.3, 4.0, 0.0],
        [0.0, 0.0, -0.6, 3.0],
        [0.2, 0.0, 0.0, -1.0],
    ]);
    // Only the last column is tunable
    let mut mask = Array2::<f64>::zeros((4, 4));
    mask.column_mut(3).fill(1.0);

    let epsilon = 0.01;
    let step = 0.5;
    let mut ws = match make_workspace(a.nrows()) {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("Workspace allocation failed: {e}");
            return;
        }
    };
    let mut grad = Array2::<f64>::zeros(a.raw_dim());

    println!("Initial matrix A = \n{:?}\n", a);
    println!("{:>5} {:>14} {:>14} {:>14}", "iter", "ssa", "alpha", "slope");

    for k in 0..25 {
        let ssa = match compute_ssa_inplace(&a, Some(&mut grad), &mut ws, Some(epsilon)) {
            Ok(ssa) => ssa,
            Err(e) => {
                eprintln!("SSA evaluation failed at iteration {k}: {e}");
                return;
            }
        };
        let alpha = spectral_abscissa(&a).unwrap_or(f64::NAN);

        // Projected steepest descent on the tunable entries
        let direction = -(&grad * &mask);
        let slope = directional_derivative(&grad, &direction);
        println!("{:>5} {:>14.6e} {:>14.6e} {:>14.6e}", k, ssa, alpha, slope);

        if ssa < 0.0 {
            println!("\nStabilized after {k} steps: ssa = {ssa:.6}, alpha = {alpha:.6}");
            break;
        }
        a.scaled_add(step, &direction);
    }

    println!("\nFinal matrix A = \n{:?}", a);
}
