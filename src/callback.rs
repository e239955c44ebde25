use crate::{IterationState, Phase, SolverOptions};

/// Hook invoked once per solver iteration for logging, monitoring, or
/// progress reporting.
pub trait Callback {
    /// Creates a new callback from solver options.
    fn new(options: &SolverOptions) -> Self
    where
        Self: Sized;

    /// Called at the end of each iteration with the current solver state.
    fn call(&mut self, state: &IterationState);
}

/// A callback that does nothing. Use when no per-iteration output is needed.
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn new(_options: &SolverOptions) -> Self {
        Self {}
    }

    fn call(&mut self, _state: &IterationState) {
        // Do nothing
    }
}

/// Prints one table row per iteration to stdout.
pub struct IterationOutput {}

impl Callback for IterationOutput {
    fn new(_options: &SolverOptions) -> Self {
        Self {}
    }

    fn call(&mut self, state: &IterationState) {
        let phase = match state.phase {
            Phase::One => "I",
            Phase::Two => "II",
        };
        let txt = format!(
            "| {:6} | {:>2} | {:<12.6e} | {:<8.2e} | {:4} |",
            state.iteration, phase, state.objective, state.infeasibility, state.eta_count,
        );
        println!("{}", txt);
    }
}
