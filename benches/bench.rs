use rsplex::lp::{LinearProgram, RowSense, simplex};
use rsplex::{PricingStrategy, SolverHooks, SolverOptions, Status};

fn main() {
    divan::main();
}

/// Transportation-style program: route `size x size` flows at random-ish
/// costs, supplies on rows, demands on columns.
fn transportation_lp(size: usize) -> LinearProgram {
    let n = size * size;
    let m = 2 * size;

    let mut triplets = Vec::with_capacity(2 * n);
    let mut c = Vec::with_capacity(n);
    for s in 0..size {
        for t in 0..size {
            let j = s * size + t;
            triplets.push((s, j, 1.));
            triplets.push((size + t, j, 1.));
            // Deterministic uneven costs.
            c.push(1. + ((7 * s + 13 * t) % 11) as f64);
        }
    }

    let supply = size as f64;
    let mut b = vec![supply; size];
    b.extend(vec![supply; size]);
    let senses = vec![RowSense::Eq; m];

    LinearProgram::new(c, &triplets, senses, b, vec![0.; n], vec![1e100; n]).unwrap()
}

#[divan::bench(args = [4, 8, 12])]
fn dantzig(bencher: divan::Bencher, size: usize) {
    let lp = transportation_lp(size);
    let options = SolverOptions {
        pricing: PricingStrategy::Dantzig,
        ..SolverOptions::default()
    };
    bencher.bench_local(|| {
        let solution = simplex::solve(&lp, &options, &mut SolverHooks::default()).unwrap();
        assert_eq!(solution.status, Status::Optimal);
        solution.objective_value
    });
}

#[divan::bench(args = [4, 8, 12])]
fn steepest_edge(bencher: divan::Bencher, size: usize) {
    let lp = transportation_lp(size);
    let options = SolverOptions {
        pricing: PricingStrategy::SteepestEdge,
        ..SolverOptions::default()
    };
    bencher.bench_local(|| {
        let solution = simplex::solve(&lp, &options, &mut SolverHooks::default()).unwrap();
        assert_eq!(solution.status, Status::Optimal);
        solution.objective_value
    });
}
