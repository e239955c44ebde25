//! Invariant checks over a deterministic family of random equality-form
//! programs. Each instance is built around a known feasible point, so
//! feasibility is guaranteed while the slack crash still starts infeasible
//! (equality slacks are fixed at zero), exercising both phases.

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;
use rstest_reuse::{apply, template};

use crate::callback::Callback;
use crate::lp::{LinearProgram, RowSense, Solution, simplex};
use crate::{E, IterationState, Phase, PricingStrategy, SolverHooks, SolverOptions, Status};

#[template]
#[rstest]
pub fn property_pricing_rules(
    #[values(PricingStrategy::Dantzig, PricingStrategy::SteepestEdge)] pricing: PricingStrategy,
) {
}

fn random_equality_lp(seed: u64) -> LinearProgram {
    let mut rng = StdRng::seed_from_u64(seed);
    let m = 6;
    let n = 10;

    let mut triplets = Vec::new();
    for j in 0..n {
        // Two or three entries per column, distinct rows.
        let count = 2 + (rng.random::<u32>() % 2) as usize;
        let mut rows: Vec<usize> = (0..m).collect();
        for k in 0..count {
            let pick = k + (rng.random::<u32>() as usize) % (m - k);
            rows.swap(k, pick);
            let mut value: E = rng.random::<E>() * 4. - 2.;
            if value.abs() < 0.1 {
                value = 0.5;
            }
            triplets.push((rows[k], j, value));
        }
    }

    // Feasible interior point within the boxes.
    let x0: Vec<E> = (0..n).map(|_| rng.random::<E>() * 4.).collect();
    let mut b = vec![0.; m];
    for &(i, j, v) in &triplets {
        b[i] += v * x0[j];
    }

    let c: Vec<E> = (0..n).map(|_| rng.random::<E>() * 10. - 5.).collect();

    LinearProgram::new(
        c,
        &triplets,
        vec![RowSense::Eq; m],
        b,
        vec![0.; n],
        vec![10.; n],
    )
    .unwrap()
}

fn solve_with(lp: &LinearProgram, pricing: PricingStrategy) -> Solution {
    let options = SolverOptions {
        pricing,
        ..SolverOptions::default()
    };
    simplex::solve(lp, &options, &mut SolverHooks::default()).unwrap()
}

#[apply(property_pricing_rules)]
fn random_programs_reach_verified_optima(pricing: PricingStrategy) {
    for seed in 0..8 {
        let lp = random_equality_lp(seed);
        let solution = solve_with(&lp, pricing);
        assert_eq!(solution.status, Status::Optimal, "seed {seed}");

        let (n, m) = lp.dims();

        // Primal equality within the extraction tolerance.
        assert!(
            solution.primal_residual < 1e-8,
            "seed {seed}: residual {}",
            solution.primal_residual
        );
        // Dual feasibility at the reported optimum.
        assert!(
            solution.dual_residual <= 1e-6 + 1e-9,
            "seed {seed}: dual residual {}",
            solution.dual_residual
        );
        // Bounds are honored.
        for (j, &v) in solution.x.iter().enumerate() {
            assert!(
                (-1e-6..=10. + 1e-6).contains(&v),
                "seed {seed}: x[{j}] = {v}"
            );
        }
        // Finite termination bound.
        assert!(solution.iterations <= 20 * (n + m), "seed {seed}");
        // Objective matches c . x.
        let recomputed: E = lp
            .objective()
            .iter()
            .zip(&solution.x)
            .map(|(c, x)| c * x)
            .sum();
        assert_relative_eq!(solution.objective_value, recomputed, epsilon = 1e-6);
    }
}

#[apply(property_pricing_rules)]
fn nonbasic_variables_sit_exactly_on_their_bounds(pricing: PricingStrategy) {
    for seed in 0..4 {
        let lp = random_equality_lp(seed);
        let solution = solve_with(&lp, pricing);
        assert_eq!(solution.status, Status::Optimal);
        let n = lp.num_vars();
        for j in 0..n {
            match solution.basis.statuses[j] {
                crate::lp::VarStatus::AtLower | crate::lp::VarStatus::Fixed => {
                    assert_eq!(solution.x[j], 0., "seed {seed}, var {j}")
                }
                crate::lp::VarStatus::AtUpper => {
                    assert_eq!(solution.x[j], 10., "seed {seed}, var {j}")
                }
                crate::lp::VarStatus::Free => assert_eq!(solution.x[j], 0.),
                crate::lp::VarStatus::Basic => {}
            }
        }
    }
}

#[apply(property_pricing_rules)]
fn reduced_costs_are_consistent_with_duals(pricing: PricingStrategy) {
    for seed in 0..4 {
        let lp = random_equality_lp(seed);
        let solution = solve_with(&lp, pricing);
        assert_eq!(solution.status, Status::Optimal);

        let matrix = lp.matrix();
        for j in 0..lp.num_vars() {
            let (rows, values) = matrix.column(j);
            let pi_a: E = rows
                .iter()
                .zip(values)
                .map(|(&i, &v)| solution.duals[i] * v)
                .sum();
            let expected = lp.objective()[j] - pi_a;
            assert!(
                (solution.reduced_costs[j] - expected).abs() < 1e-9,
                "seed {seed}, var {j}: {} vs {expected}",
                solution.reduced_costs[j]
            );
        }
    }
}

/// Records phase-two objective values through the iteration callback.
struct ObjectiveRecorder {
    log: Arc<Mutex<Vec<E>>>,
}

impl Callback for ObjectiveRecorder {
    fn new(_options: &SolverOptions) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn call(&mut self, state: &IterationState) {
        if state.phase == Phase::Two {
            self.log.lock().unwrap().push(state.objective);
        }
    }
}

#[apply(property_pricing_rules)]
fn phase_two_objective_never_worsens(pricing: PricingStrategy) {
    for seed in 0..4 {
        let lp = random_equality_lp(seed);
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = SolverHooks {
            callback: Box::new(ObjectiveRecorder { log: log.clone() }),
            terminator: Box::new(crate::terminators::MultipleTerminators::new(Vec::new())),
        };
        let options = SolverOptions {
            pricing,
            ..SolverOptions::default()
        };
        let solution = simplex::solve(&lp, &options, &mut hooks).unwrap();
        assert_eq!(solution.status, Status::Optimal);

        let history = log.lock().unwrap();
        for pair in history.windows(2) {
            assert!(
                pair[1] <= pair[0] + 1e-7,
                "seed {seed}: objective worsened {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }
}

#[test]
fn pricing_rules_agree_on_the_optimum() {
    for seed in 0..8 {
        let lp = random_equality_lp(seed);
        let dantzig = solve_with(&lp, PricingStrategy::Dantzig);
        let steepest = solve_with(&lp, PricingStrategy::SteepestEdge);
        assert_eq!(dantzig.status, Status::Optimal);
        assert_eq!(steepest.status, Status::Optimal);
        assert_relative_eq!(
            dantzig.objective_value,
            steepest.objective_value,
            epsilon = 1e-6
        );
    }
}

#[test]
fn tight_refactorization_schedule_matches_loose_one() {
    // Forcing a refactorization every other pivot must not change results.
    for seed in 0..4 {
        let lp = random_equality_lp(seed);
        let loose = solve_with(&lp, PricingStrategy::Dantzig);
        let options = SolverOptions {
            pricing: PricingStrategy::Dantzig,
            refactor_interval: 2,
            max_eta_count: 2,
            ..SolverOptions::default()
        };
        let tight = simplex::solve(&lp, &options, &mut SolverHooks::default()).unwrap();
        assert_eq!(tight.status, Status::Optimal);
        assert_relative_eq!(
            tight.objective_value,
            loose.objective_value,
            epsilon = 1e-6
        );
    }
}

#[test]
fn disabled_perturbation_matches_enabled() {
    for seed in 0..4 {
        let lp = random_equality_lp(seed);
        let with = solve_with(&lp, PricingStrategy::SteepestEdge);
        let options = SolverOptions {
            perturbation: false,
            ..SolverOptions::default()
        };
        let without = simplex::solve(&lp, &options, &mut SolverHooks::default()).unwrap();
        assert_eq!(without.status, Status::Optimal);
        assert_relative_eq!(
            with.objective_value,
            without.objective_value,
            epsilon = 1e-6
        );
    }
}
