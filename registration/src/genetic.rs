use image::RgbImage;
use image_transform::similarity::{SimilarityParams, NUM_PARAMETERS};
use slog::{debug, info, Logger};

use crate::bounds::SearchBounds;
use crate::error::RegistrationError;
use crate::metric::Metric;
use crate::random::{seeded_rng, RandomSource};
use crate::solution::{OptimizationResult, Solution};
use crate::utils::set_log_config;
use crate::IS_DEBUG;

/// A member of the population: parameters and their fitness.
pub type Individual = Solution;

/// Stop threshold of the MI variant, in bits.
pub const MI_CONVERGENCE_BITS: f64 = 3.0;

/// GeneticParameter
#[derive(Clone, Debug)]
pub struct GeneticParameter {
    pub population_size: usize,
    pub max_generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    pub blx_alpha: f64,
    pub mutation_sigma: f64,
    /// The run stops once the best fitness is strictly better than this value.
    pub convergence_threshold: Option<f64>,
    pub bounds: SearchBounds,
    pub random_seed: Option<u64>,
}

impl Default for GeneticParameter {
    fn default() -> Self {
        Self {
            population_size: 50,
            max_generations: 50,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            tournament_size: 5,
            blx_alpha: 0.5,
            mutation_sigma: 0.05,
            convergence_threshold: None,
            bounds: SearchBounds::default(),
            random_seed: None,
        }
    }
}

impl GeneticParameter {
    /// Defaults for `metric`: MI stops above 3 bits, MSE always runs every generation.
    #[allow(clippy::field_reassign_with_default)]
    pub fn new(metric: &Metric) -> GeneticParameter {
        let mut ret = GeneticParameter::default();
        ret.convergence_threshold = match metric {
            Metric::MutualInformation { .. } => Some(MI_CONVERGENCE_BITS),
            Metric::MeanSquaredError => None,
        };
        ret
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        let invalid = |message: &str| -> Result<(), RegistrationError> {
            Err(RegistrationError::InvalidParameter(message.to_string()))
        };
        if self.population_size == 0 {
            return invalid("population_size must be at least 1");
        }
        if self.tournament_size == 0 {
            return invalid("tournament_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) || !(0.0..=1.0).contains(&self.crossover_rate)
        {
            return invalid("mutation_rate and crossover_rate must lie in [0, 1]");
        }
        if !(self.blx_alpha >= 0.0) || !(self.mutation_sigma >= 0.0) {
            return invalid("blx_alpha and mutation_sigma must be non-negative");
        }
        self.bounds.validate()
    }
}

/// Generational genetic algorithm over similarity parameters.
pub struct GeneticOptimizer<'a> {
    reference: &'a RgbImage,
    moving: &'a RgbImage,
    metric: Metric,
    param: GeneticParameter,
    log: Logger,
}

impl<'a> GeneticOptimizer<'a> {
    pub fn new(
        reference: &'a RgbImage,
        moving: &'a RgbImage,
        metric: Metric,
        param: GeneticParameter,
    ) -> GeneticOptimizer<'a> {
        GeneticOptimizer {
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

    pub fn evaluate(&self, params: SimilarityParams) -> Result<Individual, RegistrationError> {
        let fitness = self.metric.evaluate(&params, self.reference, self.moving)?;
        Ok(Individual::new(params, fitness))
    }

    /// Random individuals drawn uniformly within the bounds, already evaluated.
    pub fn initialize_population<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<Individual>, RegistrationError> {
        (0..self.param.population_size)
            .map(|_| {
                let params = self.param.bounds.sample(rng);
                self.evaluate(params)
            })
            .collect()
    }

    /// Best individual first, according to the metric's direction.
    pub fn sort_population(&self, population: &mut [Individual]) {
        let direction = self.metric.direction();
        population.sort_by(|a, b| direction.best_first(a.fitness, b.fitness));
    }

    pub fn is_converged(&self, fitness: f64) -> bool {
        self.param
            .convergence_threshold
            .map_or(false, |threshold| self.metric.direction().is_better(fitness, threshold))
    }

    /// Best of `tournament_size` individuals drawn with replacement.
    pub fn select_parent<'p, R: RandomSource + ?Sized>(
        &self,
        population: &'p [Individual],
        rng: &mut R,
    ) -> &'p Individual {
        let direction = self.metric.direction();
        let mut best = &population[rng.index(population.len())];
        for _ in 1..self.param.tournament_size {
            let current = &population[rng.index(population.len())];
            if direction.is_better(current.fitness, best.fitness) {
                best = current;
            }
        }
        best
    }

    /// BLX-alpha blend with probability `crossover_rate`, otherwise a copy of either parent.
    pub fn crossover<R: RandomSource + ?Sized>(
        &self,
        parent1: &Individual,
        parent2: &Individual,
        rng: &mut R,
    ) -> SimilarityParams {
        if rng.uniform() >= self.param.crossover_rate {
            return if rng.coin() {
                parent1.params
            } else {
                parent2.params
            };
        }

        let p1 = parent1.params.to_array();
        let p2 = parent2.params.to_array();
        let alpha = self.param.blx_alpha;
        let mut child = [0.0; NUM_PARAMETERS];
        for i in 0..NUM_PARAMETERS {
            let (lo, hi) = (p1[i].min(p2[i]), p1[i].max(p2[i]));
            let range = hi - lo;
            let lower = lo - alpha * range;
            let upper = hi + alpha * range;
            let value = lower + rng.uniform() * (upper - lower);
            child[i] = self.param.bounds.clamp_component(i, value);
        }
        SimilarityParams::from_array(child)
    }

    /// Adds N(0, sigma^2) noise to each parameter with probability `mutation_rate`.
    pub fn mutate<R: RandomSource + ?Sized>(&self, params: &mut SimilarityParams, rng: &mut R) {
        let mut values = params.to_array();
        for (i, value) in values.iter_mut().enumerate() {
            if rng.uniform() < self.param.mutation_rate {
                let noisy = *value + rng.gaussian() * self.param.mutation_sigma;
                *value = self.param.bounds.clamp_component(i, noisy);
            }
        }
        *params = SimilarityParams::from_array(values);
    }

    /// Builds the next population from a population sorted best-first.
    ///
    /// The elite is carried over unchanged at index 0; every other slot is an
    /// evaluated child.
    pub fn next_generation<R: RandomSource + ?Sized>(
        &self,
        population: &[Individual],
        rng: &mut R,
    ) -> Result<Vec<Individual>, RegistrationError> {
        let mut next = Vec::with_capacity(self.param.population_size);
        next.push(population[0]);
        for _ in 1..self.param.population_size {
            let parent1 = self.select_parent(population, rng);
            let parent2 = self.select_parent(population, rng);
            let mut child = self.crossover(parent1, parent2, rng);
            self.mutate(&mut child, rng);
            let child = self.evaluate(child)?;
            if IS_DEBUG {
                debug!(self.log, "child {} fitness {:.6}", child.params, child.fitness);
            }
            next.push(child);
        }
        Ok(next)
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
        let mut population = self.initialize_population(rng)?;
        let mut best_history = Vec::with_capacity(self.param.max_generations + 1);
        let mut generations = 0;
        let mut converged = false;

        for generation in 0..self.param.max_generations {
            self.sort_population(&mut population);
            let best = population[0];
            best_history.push(best.fitness);
            info!(
                self.log,
                "Generation {}: best {} = {:.6}", generation, self.metric, best.fitness
            );

            if self.is_converged(best.fitness) {
                info!(self.log, "{} convergence reached", self.metric);
                converged = true;
                break;
            }

            population = self.next_generation(&population, rng)?;
            generations += 1;
        }

        self.sort_population(&mut population);
        if !converged {
            best_history.push(population[0].fitness);
        }
        Ok(OptimizationResult {
            best: population[0],
            best_history,
            iterations: generations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;
    use image_transform::similarity::SimilarityParams;
    use rand::{rngs::StdRng, SeedableRng};

    use super::{GeneticOptimizer, GeneticParameter, Individual};
    use crate::bounds::SearchBounds;
    use crate::error::RegistrationError;
    use crate::metric::Metric;
    use crate::random::tests::ScriptedSource;
    use crate::utils::discard_logger;
    use crate::utils::tests::{
        assert_near_identity, assert_registered_fitness, framed_spots, narrow_bounds, smooth_pattern,
    };

    fn optimizer<'a>(
        image: &'a RgbImage,
        metric: Metric,
        param: GeneticParameter,
    ) -> GeneticOptimizer<'a> {
        GeneticOptimizer::new(image, image, metric, param).with_logger(discard_logger())
    }

    fn individual(values: [f64; 5], fitness: f64) -> Individual {
        Individual::new(SimilarityParams::from_array(values), fitness)
    }

    #[test]
    fn test_default_parameters() {
        let param = GeneticParameter::new(&Metric::mutual_information());
        assert_eq!(param.population_size, 50);
        assert_eq!(param.max_generations, 50);
        assert_eq!(param.tournament_size, 5);
        assert_eq!(param.convergence_threshold, Some(3.0));
        assert_eq!(
            GeneticParameter::new(&Metric::MeanSquaredError).convergence_threshold,
            None
        );
        assert!(param.validate().is_ok());
    }

    #[test]
    fn test_invalid_parameters() {
        let mut param = GeneticParameter::default();
        param.population_size = 0;
        assert!(matches!(
            param.validate(),
            Err(RegistrationError::InvalidParameter(_))
        ));
        let mut param = GeneticParameter::default();
        param.crossover_rate = 1.5;
        assert!(param.validate().is_err());
    }

    #[test]
    fn test_blx_crossover_extremes() {
        let image = smooth_pattern(8);
        let ga = optimizer(&image, Metric::MeanSquaredError, GeneticParameter::default());
        let p1 = individual([1.0, 1.0, 0.0, 10.0, -10.0], 0.0);
        let p2 = individual([1.2, 0.8, 0.2, 20.0, -20.0], 0.0);

        // first draw triggers crossover, then every gene takes the lower end
        let mut low = ScriptedSource::new(vec![0.0], vec![0], vec![0.0], vec![true]);
        let child = ga.crossover(&p1, &p2, &mut low).to_array();
        let expected = [0.9, 0.7, -0.1, 5.0, -25.0];
        for (c, e) in child.iter().zip(expected.iter()) {
            assert!((c - e).abs() < 1e-12, "{} != {}", c, e);
        }

        // the interval is clamped to the search bounds
        let p3 = individual([0.1, 2.0, 0.0, -150.0, 150.0], 0.0);
        let p4 = individual([0.5, 1.6, 0.0, -100.0, 100.0], 0.0);
        let child = ga.crossover(&p3, &p4, &mut low).to_array();
        assert_eq!(child[0], 0.1);
        assert_eq!(child[3], -150.0);
    }

    #[test]
    fn test_crossover_skipped_copies_parent() {
        let image = smooth_pattern(8);
        let ga = optimizer(&image, Metric::MeanSquaredError, GeneticParameter::default());
        let p1 = individual([1.0, 1.0, 0.0, 10.0, -10.0], 0.0);
        let p2 = individual([1.2, 0.8, 0.2, 20.0, -20.0], 0.0);
        let mut source = ScriptedSource::new(vec![0.95], vec![0], vec![0.0], vec![false, true]);
        assert_eq!(ga.crossover(&p1, &p2, &mut source), p2.params);
        assert_eq!(ga.crossover(&p1, &p2, &mut source), p1.params);
    }

    #[test]
    fn test_mutation() {
        let image = smooth_pattern(8);
        let ga = optimizer(&image, Metric::MeanSquaredError, GeneticParameter::default());
        let mut params = SimilarityParams::new(1.0, 1.99, 0.0, 0.0, 0.0);
        // genes 0 and 1 mutate, the rest are left alone
        let mut source = ScriptedSource::new(
            vec![0.05, 0.05, 0.5, 0.5, 0.5],
            vec![0],
            vec![2.0, 1.0],
            vec![true],
        );
        ga.mutate(&mut params, &mut source);
        assert!((params.sx - 1.1).abs() < 1e-12);
        assert_eq!(params.sy, 2.0);
        assert_eq!(params.theta, 0.0);
        assert_eq!(params.tx, 0.0);
    }

    #[test]
    fn test_tournament_picks_best_of_draw() {
        let image = smooth_pattern(8);
        let population = vec![
            individual([1.0; 5], 5.0),
            individual([1.0; 5], 1.0),
            individual([1.0; 5], 9.0),
            individual([1.0; 5], 3.0),
        ];
        let mut source = ScriptedSource::new(vec![0.0], vec![0, 2, 3, 0, 3], vec![0.0], vec![true]);
        let mse = optimizer(&image, Metric::MeanSquaredError, GeneticParameter::default());
        assert_eq!(mse.select_parent(&population, &mut source).fitness, 3.0);

        let mut source = ScriptedSource::new(vec![0.0], vec![0, 2, 3, 0, 3], vec![0.0], vec![true]);
        let mi = optimizer(&image, Metric::mutual_information(), GeneticParameter::default());
        assert_eq!(mi.select_parent(&population, &mut source).fitness, 9.0);
    }

    #[test]
    fn test_elitism_keeps_best() {
        let image = smooth_pattern(12);
        let mut param = GeneticParameter::default();
        param.population_size = 10;
        let ga = optimizer(&image, Metric::MeanSquaredError, param);
        let mut rng = StdRng::seed_from_u64(5);
        let mut population = ga.initialize_population(&mut rng).unwrap();
        ga.sort_population(&mut population);
        let next = ga.next_generation(&population, &mut rng).unwrap();
        assert_eq!(next.len(), 10);
        assert_eq!(next[0], population[0]);
    }

    #[test]
    fn test_monotonic_improvement() {
        let image = smooth_pattern(16);
        for metric in [Metric::MeanSquaredError, Metric::mutual_information()] {
            let mut param = GeneticParameter::new(&metric);
            param.population_size = 20;
            param.max_generations = 15;
            param.convergence_threshold = None;
            param.random_seed = Some(11);
            let result = optimizer(&image, metric, param).run().unwrap();
            assert_eq!(result.best_history.len(), 16);
            assert_eq!(result.iterations, 15);
            for pair in result.best_history.windows(2) {
                assert!(
                    !metric.direction().is_better(pair[0], pair[1]),
                    "{} got worse: {:?}",
                    metric,
                    pair
                );
            }
            assert_eq!(*result.best_history.last().unwrap(), result.best.fitness);
        }
    }

    #[test]
    fn test_mi_early_stop() {
        let image = smooth_pattern(16);
        let metric = Metric::mutual_information();
        let mut param = GeneticParameter::new(&metric);
        param.population_size = 10;
        // any positive MI beats this threshold
        param.convergence_threshold = Some(-1.0);
        param.random_seed = Some(2);
        let result = optimizer(&image, metric, param).run().unwrap();
        assert!(result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.best_history.len(), 1);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let image = smooth_pattern(12);
        let mut param = GeneticParameter::new(&Metric::MeanSquaredError);
        param.population_size = 12;
        let ga = optimizer(&image, Metric::MeanSquaredError, param);

        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let mut pop_a = ga.initialize_population(&mut rng_a).unwrap();
        let mut pop_b = ga.initialize_population(&mut rng_b).unwrap();
        for _ in 0..5 {
            assert_eq!(pop_a, pop_b);
            ga.sort_population(&mut pop_a);
            ga.sort_population(&mut pop_b);
            pop_a = ga.next_generation(&pop_a, &mut rng_a).unwrap();
            pop_b = ga.next_generation(&pop_b, &mut rng_b).unwrap();
        }
        assert_eq!(pop_a, pop_b);

        let run_a = ga.run_with_rng(&mut StdRng::seed_from_u64(1)).unwrap();
        let run_b = ga.run_with_rng(&mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(run_a.best, run_b.best);
        assert_eq!(run_a.best_history, run_b.best_history);
    }

    #[test]
    fn test_population_stays_in_bounds() {
        let image = smooth_pattern(10);
        let mut param = GeneticParameter::default();
        param.population_size = 15;
        param.mutation_rate = 1.0;
        param.mutation_sigma = 50.0;
        let bounds = SearchBounds::default();
        let ga = optimizer(&image, Metric::MeanSquaredError, param);
        let mut rng = StdRng::seed_from_u64(4);
        let mut population = ga.initialize_population(&mut rng).unwrap();
        for _ in 0..3 {
            ga.sort_population(&mut population);
            population = ga.next_generation(&population, &mut rng).unwrap();
            assert!(population.iter().all(|i| bounds.contains(&i.params)));
        }
    }

    #[test]
    fn test_converges_to_identity() {
        let image = framed_spots(32);
        for metric in [Metric::MeanSquaredError, Metric::mutual_information()] {
            for seed in [1, 2, 3] {
                let mut param = GeneticParameter::new(&metric);
                param.max_generations = 100;
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
