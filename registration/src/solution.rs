use image_transform::similarity::SimilarityParams;

/// A parameter vector together with its fitness under the active metric.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Solution {
    pub params: SimilarityParams,
    pub fitness: f64,
}

impl Solution {
    pub fn new(params: SimilarityParams, fitness: f64) -> Solution {
        Solution { params, fitness }
    }
}

/// Outcome of one optimizer run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub best: Solution,
    /// Best fitness after initialization and after every generation or iteration.
    pub best_history: Vec<f64>,
    /// Generations or iterations actually executed.
    pub iterations: usize,
    /// Whether the convergence threshold stopped the run early.
    pub converged: bool,
}
