use image::RgbImage;
use image_transform::similarity::{SimilarityParams, NUM_PARAMETERS};
use slog::{debug, info, Logger};

use crate::bounds::SearchBounds;
use crate::error::RegistrationError;
use crate::metric::{Direction, Metric};
use crate::random::{seeded_rng, RandomSource};
use crate::solution::{OptimizationResult, Solution};
use crate::utils::{clamp, set_log_config};
use crate::IS_DEBUG;

/// Stop thresholds: MI above 3 bits, MSE below 1.
pub const MI_CONVERGENCE_BITS: f64 = 3.0;
pub const MSE_CONVERGENCE: f64 = 1.0;

/// SwarmParameter
///
/// `v_max` bounds every dimension alike, although translation spans
/// hundreds of pixels while scale spans less than two units.
#[derive(Clone, Debug)]
pub struct SwarmParameter {
    pub swarm_size: usize,
    pub max_iterations: usize,
    pub w_max: f64,
    pub w_min: f64,
    /// Cognitive coefficient, pull towards the particle's own best.
    pub c1: f64,
    /// Social coefficient, pull towards the swarm's best.
    pub c2: f64,
    pub v_max: f64,
    pub convergence_threshold: Option<f64>,
    pub bounds: SearchBounds,
    pub random_seed: Option<u64>,
}

impl Default for SwarmParameter {
    fn default() -> Self {
        Self {
            swarm_size: 50,
            max_iterations: 50,
            w_max: 0.9,
            w_min: 0.4,
            c1: 2.0,
            c2: 2.0,
            v_max: 0.1,
            convergence_threshold: None,
            bounds: SearchBounds::default(),
            random_seed: None,
        }
    }
}

impl SwarmParameter {
    #[allow(clippy::field_reassign_with_default)]
    pub fn new(metric: &Metric) -> SwarmParameter {
        let mut ret = SwarmParameter::default();
        ret.convergence_threshold = Some(match metric {
            Metric::MutualInformation { .. } => MI_CONVERGENCE_BITS,
            Metric::MeanSquaredError => MSE_CONVERGENCE,
        });
        ret
    }

    /// Inertia weight, decaying linearly from `w_max` over the whole run.
    pub fn inertia(&self, iteration: usize) -> f64 {
        if self.max_iterations == 0 {
            return self.w_max;
        }
        self.w_max - iteration as f64 * (self.w_max - self.w_min) / self.max_iterations as f64
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.swarm_size == 0 {
            return Err(RegistrationError::InvalidParameter(
                "swarm_size must be at least 1".to_string(),
            ));
        }
        if !(self.v_max >= 0.0) || !(self.w_min <= self.w_max) {
            return Err(RegistrationError::InvalidParameter(format!(
                "need v_max >= 0 and w_min <= w_max, got v_max={} w_min={} w_max={}",
                self.v_max, self.w_min, self.w_max
            )));
        }
        self.bounds.validate()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Particle {
    pub position: [f64; NUM_PARAMETERS],
    pub velocity: [f64; NUM_PARAMETERS],
    pub fitness: f64,
    pub best_position: [f64; NUM_PARAMETERS],
    pub best_fitness: f64,
}

impl Particle {
    pub fn params(&self) -> SimilarityParams {
        SimilarityParams::from_array(self.position)
    }
}

/// Best position found by any particle so far.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct GlobalBest {
    pub position: [f64; NUM_PARAMETERS],
    pub fitness: f64,
}

impl GlobalBest {
    /// Replaces the incumbent when `fitness` is strictly better; returns whether it did.
    pub fn offer(
        &mut self,
        position: [f64; NUM_PARAMETERS],
        fitness: f64,
        direction: Direction,
    ) -> bool {
        if direction.is_better(fitness, self.fitness) {
            self.position = position;
            self.fitness = fitness;
            return true;
        }
        false
    }

    pub fn solution(&self) -> Solution {
        Solution::new(SimilarityParams::from_array(self.position), self.fitness)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Swarm {
    pub particles: Vec<Particle>,
    pub global_best: GlobalBest,
}

/// Particle swarm optimizer over similarity parameters.
pub struct ParticleSwarmOptimizer<'a> {
    reference: &'a RgbImage,
    moving: &'a RgbImage,
    metric: Metric,
    param: SwarmParameter,
    log: Logger,
}

impl<'a> ParticleSwarmOptimizer<'a> {
    pub fn new(
        reference: &'a RgbImage,
        moving: &'a RgbImage,
        metric: Metric,
        param: SwarmParameter,
    ) -> ParticleSwarmOptimizer<'a> {
        ParticleSwarmOptimizer {
            reference,
            moving,
            metric,
            param,
            log: set_log_config(),
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    fn evaluate(&self, position: &[f64; NUM_PARAMETERS]) -> Result<f64, RegistrationError> {
        let params = SimilarityParams::from_array(*position);
        self.metric.evaluate(&params, self.reference, self.moving)
    }

    pub fn is_converged(&self, fitness: f64) -> bool {
        self.param
            .convergence_threshold
            .map_or(false, |threshold| self.metric.direction().is_better(fitness, threshold))
    }

    /// Uniform positions within the bounds, velocities within `v_max`.
    pub fn initialize_swarm<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Swarm, RegistrationError> {
        let bounds = &self.param.bounds;
        let v_max = self.param.v_max;
        let mut particles = Vec::with_capacity(self.param.swarm_size);
        for _ in 0..self.param.swarm_size {
            let mut position = [0.0; NUM_PARAMETERS];
            let mut velocity = [0.0; NUM_PARAMETERS];
            for i in 0..NUM_PARAMETERS {
                position[i] = bounds.min[i] + (bounds.max[i] - bounds.min[i]) * rng.uniform();
                velocity[i] = rng.uniform() * 2.0 * v_max - v_max;
            }
            let fitness = self.evaluate(&position)?;
            particles.push(Particle {
                position,
                velocity,
                fitness,
                best_position: position,
                best_fitness: fitness,
            });
        }

        let direction = self.metric.direction();
        let mut global_best = GlobalBest {
            position: particles[0].best_position,
            fitness: particles[0].best_fitness,
        };
        for particle in &particles[1..] {
            global_best.offer(particle.best_position, particle.best_fitness, direction);
        }
        Ok(Swarm {
            particles,
            global_best,
        })
    }

    /// One sweep over the swarm in particle order.
    ///
    /// The global best is updated as soon as a particle improves on it, so
    /// later particles of the same sweep are already pulled towards it.
    pub fn step<R: RandomSource + ?Sized>(
        &self,
        swarm: &mut Swarm,
        iteration: usize,
        rng: &mut R,
    ) -> Result<(), RegistrationError> {
        let w = self.param.inertia(iteration);
        let (c1, c2, v_max) = (self.param.c1, self.param.c2, self.param.v_max);
        let direction = self.metric.direction();

        for particle in swarm.particles.iter_mut() {
            for i in 0..NUM_PARAMETERS {
                let r1 = rng.uniform();
                let r2 = rng.uniform();
                let cognitive = c1 * r1 * (particle.best_position[i] - particle.position[i]);
                let social = c2 * r2 * (swarm.global_best.position[i] - particle.position[i]);
                let velocity = clamp(w * particle.velocity[i] + cognitive + social, -v_max, v_max);
                particle.velocity[i] = velocity;
                particle.position[i] = self
                    .param
                    .bounds
                    .clamp_component(i, particle.position[i] + velocity);
            }

            particle.fitness = self.evaluate(&particle.position)?;
            if direction.is_better(particle.fitness, particle.best_fitness) {
                particle.best_fitness = particle.fitness;
                particle.best_position = particle.position;
                let improved =
                    swarm
                        .global_best
                        .offer(particle.best_position, particle.best_fitness, direction);
                if IS_DEBUG && improved {
                    debug!(self.log, "new global best {:.6}", particle.best_fitness);
                }
            }
        }
        Ok(())
    }

    /// Runs with the configured seed, or OS entropy when none is set.
    pub fn run(&self) -> Result<OptimizationResult, RegistrationError> {
        let mut rng = seeded_rng(self.param.random_seed);
        self.run_with_rng(&mut rng)
    }

    pub fn run_with_rng<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<OptimizationResult, RegistrationError> {
        self.param.validate()?;
        let mut swarm = self.initialize_swarm(rng)?;
        let mut best_history = Vec::with_capacity(self.param.max_iterations + 1);
        best_history.push(swarm.global_best.fitness);
        info!(
            self.log,
            "PSO start: best {} = {:.6}", self.metric, swarm.global_best.fitness
        );

        let mut iterations = 0;
        let mut converged = false;
        for iteration in 0..self.param.max_iterations {
            self.step(&mut swarm, iteration, rng)?;
            iterations += 1;
            best_history.push(swarm.global_best.fitness);
            info!(
                self.log,
                "Iteration {}: best {} = {:.6}", iteration, self.metric, swarm.global_best.fitness
            );

            if self.is_converged(swarm.global_best.fitness) {
                info!(self.log, "{} convergence reached", self.metric);
                converged = true;
                break;
            }
        }

        Ok(OptimizationResult {
            best: swarm.global_best.solution(),
            best_history,
            iterations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use image::RgbImage;
    use rand::{rngs::StdRng, SeedableRng};

    use super::{GlobalBest, Particle, ParticleSwarmOptimizer, Swarm, SwarmParameter};
    use crate::bounds::SearchBounds;
    use crate::error::RegistrationError;
    use crate::metric::{Direction, Metric};
    use crate::random::tests::ScriptedSource;
    use crate::utils::discard_logger;
    use crate::utils::tests::{
        assert_near_identity, assert_registered_fitness, framed_spots, narrow_bounds, smooth_pattern,
    };

    fn optimizer<'a>(
        image: &'a RgbImage,
        metric: Metric,
        param: SwarmParameter,
    ) -> ParticleSwarmOptimizer<'a> {
        ParticleSwarmOptimizer::new(image, image, metric, param).with_logger(discard_logger())
    }

    #[test]
    fn test_default_parameters() {
        let mi = SwarmParameter::new(&Metric::mutual_information());
        assert_eq!(mi.swarm_size, 50);
        assert_eq!(mi.convergence_threshold, Some(3.0));
        let mse = SwarmParameter::new(&Metric::MeanSquaredError);
        assert_eq!(mse.convergence_threshold, Some(1.0));
        assert_eq!(mse.v_max, 0.1);
        assert!(mse.validate().is_ok());

        let mut invalid = SwarmParameter::default();
        invalid.swarm_size = 0;
        assert!(matches!(
            invalid.validate(),
            Err(RegistrationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_inertia_decay() {
        let param = SwarmParameter::default();
        assert_approx_eq!(param.inertia(0), 0.9);
        assert_approx_eq!(param.inertia(25), 0.65);
        assert_approx_eq!(param.inertia(49), 0.9 - 49.0 * 0.01);
    }

    #[test]
    fn test_global_best_offer() {
        let mut best = GlobalBest {
            position: [1.0; 5],
            fitness: 2.0,
        };
        assert!(!best.offer([0.0; 5], 2.0, Direction::Maximize));
        assert!(best.offer([0.5; 5], 2.5, Direction::Maximize));
        assert_eq!(best.position, [0.5; 5]);
        assert!(best.offer([0.2; 5], 1.0, Direction::Minimize));
        assert_eq!(best.fitness, 1.0);
    }

    #[test]
    fn test_velocity_update() {
        let image = smooth_pattern(12);
        let mut param = SwarmParameter::new(&Metric::MeanSquaredError);
        param.swarm_size = 1;
        let pso = optimizer(&image, Metric::MeanSquaredError, param);
        let mut swarm = Swarm {
            particles: vec![Particle {
                position: [1.0, 1.0, 0.0, 0.0, 0.0],
                velocity: [0.05, -0.05, 0.0, 0.0, 0.0],
                fitness: 1e9,
                best_position: [1.02, 1.0, 0.0, 0.0, 0.0],
                best_fitness: 1e9,
            }],
            global_best: GlobalBest {
                position: [1.0, 1.0, 0.0, 10.0, 0.0],
                fitness: 1e9,
            },
        };
        // r1 = r2 = 0.5 everywhere
        let mut source = ScriptedSource::new(vec![0.5], vec![0], vec![0.0], vec![true]);
        pso.step(&mut swarm, 0, &mut source).unwrap();

        let particle = &swarm.particles[0];
        // 0.9 * 0.05 + 2 * 0.5 * 0.02 = 0.065
        assert_approx_eq!(particle.velocity[0], 0.065);
        assert_approx_eq!(particle.position[0], 1.065);
        assert_approx_eq!(particle.velocity[1], -0.045);
        // social pull of 10 px is clamped to v_max
        assert_approx_eq!(particle.velocity[3], 0.1);
        assert_approx_eq!(particle.position[3], 0.1);
        // any real MSE improves on 1e9, personal and global best follow
        assert_eq!(particle.best_position, particle.position);
        assert_eq!(swarm.global_best.position, particle.position);
        assert_eq!(swarm.global_best.fitness, particle.fitness);
    }

    #[test]
    fn test_swarm_stays_in_bounds() {
        let image = smooth_pattern(10);
        let mut param = SwarmParameter::new(&Metric::MeanSquaredError);
        param.swarm_size = 10;
        param.v_max = 500.0;
        let bounds = SearchBounds::default();
        let pso = optimizer(&image, Metric::MeanSquaredError, param);
        let mut rng = StdRng::seed_from_u64(8);
        let mut swarm = pso.initialize_swarm(&mut rng).unwrap();
        for iteration in 0..5 {
            pso.step(&mut swarm, iteration, &mut rng).unwrap();
            assert!(swarm.particles.iter().all(|p| bounds.contains(&p.params())));
            assert!(swarm
                .particles
                .iter()
                .all(|p| p.velocity.iter().all(|v| v.abs() <= 500.0)));
        }
    }

    #[test]
    fn test_initial_global_best() {
        let image = smooth_pattern(12);
        for metric in [Metric::MeanSquaredError, Metric::mutual_information()] {
            let mut param = SwarmParameter::new(&metric);
            param.swarm_size = 15;
            let pso = optimizer(&image, metric, param);
            let swarm = pso.initialize_swarm(&mut StdRng::seed_from_u64(21)).unwrap();
            let direction = metric.direction();
            assert!(swarm
                .particles
                .iter()
                .all(|p| !direction.is_better(p.best_fitness, swarm.global_best.fitness)));
            assert!(swarm
                .particles
                .iter()
                .all(|p| p.velocity.iter().all(|v| v.abs() <= 0.1)));
        }
    }

    #[test]
    fn test_monotonic_global_best() {
        let image = smooth_pattern(16);
        for metric in [Metric::MeanSquaredError, Metric::mutual_information()] {
            let mut param = SwarmParameter::new(&metric);
            param.swarm_size = 15;
            param.max_iterations = 20;
            param.convergence_threshold = None;
            param.random_seed = Some(17);
            let result = optimizer(&image, metric, param).run().unwrap();
            assert_eq!(result.best_history.len(), 21);
            assert_eq!(result.iterations, 20);
            assert!(!result.converged);
            for pair in result.best_history.windows(2) {
                assert!(!metric.direction().is_better(pair[0], pair[1]));
            }
            assert_eq!(*result.best_history.last().unwrap(), result.best.fitness);
        }
    }

    #[test]
    fn test_early_stop() {
        let image = smooth_pattern(12);
        let mut param = SwarmParameter::new(&Metric::MeanSquaredError);
        param.swarm_size = 5;
        // any finite MSE is below this threshold
        param.convergence_threshold = Some(f64::MAX);
        param.random_seed = Some(3);
        let result = optimizer(&image, Metric::MeanSquaredError, param).run().unwrap();
        assert!(result.converged);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.best_history.len(), 2);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let image = smooth_pattern(12);
        let metric = Metric::mutual_information();
        let mut param = SwarmParameter::new(&metric);
        param.swarm_size = 10;
        let pso = optimizer(&image, metric, param);

        let mut rng_a = StdRng::seed_from_u64(123);
        let mut rng_b = StdRng::seed_from_u64(123);
        let mut swarm_a = pso.initialize_swarm(&mut rng_a).unwrap();
        let mut swarm_b = pso.initialize_swarm(&mut rng_b).unwrap();
        for iteration in 0..5 {
            assert_eq!(swarm_a, swarm_b);
            pso.step(&mut swarm_a, iteration, &mut rng_a).unwrap();
            pso.step(&mut swarm_b, iteration, &mut rng_b).unwrap();
        }
        assert_eq!(swarm_a, swarm_b);

        let run_a = pso.run_with_rng(&mut StdRng::seed_from_u64(5)).unwrap();
        let run_b = pso.run_with_rng(&mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(run_a.best, run_b.best);
        assert_eq!(run_a.best_history, run_b.best_history);
    }

    #[test]
    fn test_converges_to_identity() {
        let image = framed_spots(32);
        for metric in [Metric::MeanSquaredError, Metric::mutual_information()] {
            for seed in [1, 2, 3] {
                let mut param = SwarmParameter::new(&metric);
                param.bounds = narrow_bounds();
                param.convergence_threshold = None;
                param.random_seed = Some(seed);
                let result = optimizer(&image, metric, param).run().unwrap();
                assert_near_identity(&result.best.params);
                assert_registered_fitness(metric, result.best.fitness, &image);
            }
        }
    }
}
