use std::time::{Duration, Instant};

use image::RgbImage;
use image_transform::resample::warp;
use image_transform::similarity::SimilarityParams;
use ndarray::Array2;
use slog::{info, o, warn, Logger};

use crate::error::RegistrationError;
use crate::genetic::{GeneticOptimizer, GeneticParameter};
use crate::metric::Metric;
use crate::particle_swarm::{ParticleSwarmOptimizer, SwarmParameter};
use crate::solution::OptimizationResult;

/// One (optimizer, objective) combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    GeneticMse,
    GeneticMi,
    SwarmMse,
    SwarmMi,
}

impl PipelineKind {
    /// Report order.
    pub const ALL: [PipelineKind; 4] = [
        PipelineKind::GeneticMse,
        PipelineKind::GeneticMi,
        PipelineKind::SwarmMse,
        PipelineKind::SwarmMi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineKind::GeneticMse => "GA/MSE",
            PipelineKind::GeneticMi => "GA/MI",
            PipelineKind::SwarmMse => "PSO/MSE",
            PipelineKind::SwarmMi => "PSO/MI",
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            PipelineKind::GeneticMse | PipelineKind::SwarmMse => Metric::MeanSquaredError,
            PipelineKind::GeneticMi | PipelineKind::SwarmMi => Metric::mutual_information(),
        }
    }

    pub fn fitness_type(&self) -> &'static str {
        self.metric().name()
    }

    /// `registeredImage_GA_MSE_Result.png` and the like.
    pub fn output_file_name(&self) -> String {
        format!("registeredImage_{}_Result.png", self.name().replace('/', "_"))
    }
}

/// Parameters for all four pipelines.
///
/// When `seed` is set, pipeline `i` (in [`PipelineKind::ALL`] order) runs with
/// `seed + i`, overriding the seeds of the individual parameter structs.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub genetic_mse: GeneticParameter,
    pub genetic_mi: GeneticParameter,
    pub swarm_mse: SwarmParameter,
    pub swarm_mi: SwarmParameter,
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            genetic_mse: GeneticParameter::new(&Metric::MeanSquaredError),
            genetic_mi: GeneticParameter::new(&Metric::mutual_information()),
            swarm_mse: SwarmParameter::new(&Metric::MeanSquaredError),
            swarm_mi: SwarmParameter::new(&Metric::mutual_information()),
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_seed(seed: u64) -> PipelineConfig {
        PipelineConfig {
            seed: Some(seed),
            ..PipelineConfig::default()
        }
    }

    fn seed_for(&self, kind: PipelineKind, own_seed: Option<u64>) -> Option<u64> {
        let index = PipelineKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        self.seed
            .map(|seed| seed.wrapping_add(index as u64))
            .or(own_seed)
    }

    pub fn genetic_parameter(&self, kind: PipelineKind) -> Option<GeneticParameter> {
        let param = match kind {
            PipelineKind::GeneticMse => &self.genetic_mse,
            PipelineKind::GeneticMi => &self.genetic_mi,
            _ => return None,
        };
        let mut param = param.clone();
        param.random_seed = self.seed_for(kind, param.random_seed);
        Some(param)
    }

    pub fn swarm_parameter(&self, kind: PipelineKind) -> Option<SwarmParameter> {
        let param = match kind {
            PipelineKind::SwarmMse => &self.swarm_mse,
            PipelineKind::SwarmMi => &self.swarm_mi,
            _ => return None,
        };
        let mut param = param.clone();
        param.random_seed = self.seed_for(kind, param.random_seed);
        Some(param)
    }
}

/// Outcome of one pipeline, as reported in the summary table.
#[derive(Clone, Debug)]
pub struct RegistrationResult {
    pub kind: PipelineKind,
    pub name: &'static str,
    pub fitness_type: &'static str,
    pub fitness: f64,
    pub elapsed: Duration,
    pub params: SimilarityParams,
    pub matrix: Array2<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl RegistrationResult {
    pub fn formatted_fitness(&self) -> String {
        format!("{:.4}", self.fitness)
    }

    pub fn formatted_time(&self) -> String {
        format!("{:.2} s", self.elapsed.as_secs_f64())
    }
}

/// Runs a single pipeline to completion and times it.
pub fn run_pipeline(
    kind: PipelineKind,
    reference: &RgbImage,
    moving: &RgbImage,
    config: &PipelineConfig,
    log: &Logger,
) -> Result<RegistrationResult, RegistrationError> {
    let metric = kind.metric();
    let pipeline_log = log.new(o!("pipeline" => kind.name()));
    info!(
        pipeline_log,
        "Starting {}: reference {}x{}, moving {}x{}",
        kind.name(),
        reference.width(),
        reference.height(),
        moving.width(),
        moving.height()
    );

    let start = Instant::now();
    let outcome: OptimizationResult = match kind {
        PipelineKind::GeneticMse | PipelineKind::GeneticMi => {
            let param = config
                .genetic_parameter(kind)
                .ok_or_else(|| RegistrationError::InvalidParameter(kind.name().to_string()))?;
            GeneticOptimizer::new(reference, moving, metric, param)
                .with_logger(pipeline_log.clone())
                .run()?
        }
        PipelineKind::SwarmMse | PipelineKind::SwarmMi => {
            let param = config
                .swarm_parameter(kind)
                .ok_or_else(|| RegistrationError::InvalidParameter(kind.name().to_string()))?;
            ParticleSwarmOptimizer::new(reference, moving, metric, param)
                .with_logger(pipeline_log.clone())
                .run()?
        }
    };
    let elapsed = start.elapsed();

    let params = outcome.best.params;
    info!(
        pipeline_log,
        "Best {}: {:.6} in {:.2} seconds",
        metric,
        outcome.best.fitness,
        elapsed.as_secs_f64()
    );
    Ok(RegistrationResult {
        kind,
        name: kind.name(),
        fitness_type: kind.fitness_type(),
        fitness: outcome.best.fitness,
        elapsed,
        params,
        matrix: params.to_matrix(),
        iterations: outcome.iterations,
        converged: outcome.converged,
    })
}

/// Runs every pipeline in report order; a failing pipeline does not stop the others.
pub fn run_all(
    reference: &RgbImage,
    moving: &RgbImage,
    config: &PipelineConfig,
    log: &Logger,
) -> Vec<(PipelineKind, Result<RegistrationResult, RegistrationError>)> {
    PipelineKind::ALL
        .iter()
        .map(|&kind| {
            let result = run_pipeline(kind, reference, moving, config, log);
            if let Err(e) = &result {
                warn!(log, "{} failed: {}", kind.name(), e);
            }
            (kind, result)
        })
        .collect()
}

fn format_row(matrix: &Array2<f64>, row: usize) -> String {
    let values: Vec<String> = matrix.row(row).iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(", "))
}

/// Tabular report: name, fitness type and value, elapsed time and the first
/// two matrix rows per pipeline.
pub fn format_summary(
    results: &[(PipelineKind, Result<RegistrationResult, RegistrationError>)],
) -> String {
    let mut summary = String::new();
    for (kind, result) in results {
        let row = match result {
            Ok(r) => format!(
                "[{}] -> Fitness({}): {} | Time: {}\n   Matrix: {}{}\n",
                r.name,
                r.fitness_type,
                r.formatted_fitness(),
                r.formatted_time(),
                format_row(&r.matrix, 0),
                format_row(&r.matrix, 1)
            ),
            Err(e) => format!("[{}] -> failed: {}\n", kind.name(), e),
        };
        summary.push_str(&row);
    }
    summary
}

/// The moving image warped by a pipeline's best transform.
pub fn registered_image(
    moving: &RgbImage,
    result: &RegistrationResult,
) -> Result<RgbImage, RegistrationError> {
    Ok(warp(moving, &result.matrix)?)
}
