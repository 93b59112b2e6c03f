//! Particle filter for planar Monte Carlo localization against a landmark map.
//!
//! The filter owns a fixed-size population of pose hypotheses ([Particle]) and a seedable random
//! number generator. One cycle of the filter is [ParticleFilter::prediction] (motion model plus
//! process noise), [ParticleFilter::update_weights] (observation likelihood against the map), and
//! [ParticleFilter::resample] (weight-proportional draw with replacement).
//!
//! # Example
//!
//! ```
//! use mcl::map::{Landmark, Map};
//! use mcl::measurements::LandmarkObs;
//! use mcl::particle::ParticleFilter;
//!
//! let map = Map::new(vec![Landmark { id: 1, x: 5.0, y: 0.0 }]);
//! let mut pf = ParticleFilter::new(42);
//! pf.init(0.0, 0.0, 0.0, &[0.3, 0.3, 0.01]).unwrap();
//! pf.prediction(0.1, &[0.3, 0.3, 0.01], 10.0, 0.0).unwrap();
//! pf.update_weights(50.0, &[0.3, 0.3], &[LandmarkObs::unassociated(4.0, 0.0)], &map).unwrap();
//! pf.resample();
//! assert_eq!(pf.particles.len(), pf.num_particles());
//! ```
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use thiserror::Error;

use crate::map::Map;
use crate::measurements::{self, LandmarkObs, bivariate_gaussian, nearest_landmark, to_map_frame};
use crate::motion::{Pose, ctrv};

/// Population size used by [ParticleFilter::init] unless overridden.
pub const DEFAULT_NUM_PARTICLES: usize = 100;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FilterError {
    #[error(
        "expected a finite mean and a finite, non-negative standard deviation for {axis} but got: mean {mean}, std {std_dev}"
    )]
    InvalidNoise {
        axis: &'static str,
        mean: f64,
        std_dev: f64,
    },
    #[error("expected a finite, positive landmark standard deviation for {axis} but got: {std_dev}")]
    InvalidLandmarkStd { axis: &'static str, std_dev: f64 },
}

/// Diagnostic record of which landmark each observation was matched to and where.
///
/// Populated by the driver after a weighting pass, typically on the best particle only. The filter
/// itself never reads it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticleAssociations {
    pub associations: Vec<i32>,
    /// Map-frame x of each associated observation
    pub sense_x: Vec<f64>,
    /// Map-frame y of each associated observation
    pub sense_y: Vec<f64>,
}

/// One pose hypothesis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    /// Assigned at initialization; copied, not regenerated, by resampling
    pub id: usize,
    pub x: f64,
    pub y: f64,
    /// Heading (rad), not wrapped
    pub theta: f64,
    pub weight: f64,
    pub diagnostics: Option<ParticleAssociations>,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("theta", &self.theta)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(id: usize, pose: Pose, weight: f64) -> Particle {
        Particle {
            id,
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            weight,
            diagnostics: None,
        }
    }
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }
}

/// Which diagnostic coordinate sequence [ParticleFilter::get_sense_coord] renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenseCoordinate {
    X,
    Y,
}

/// How the population is collapsed into a single pose estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ParticleAveragingStrategy {
    WeightedAverage,
    UnweightedAverage,
    #[default]
    HighestWeight,
}
impl ParticleAveragingStrategy {
    pub fn estimate(&self, particles: &[Particle]) -> Option<Pose> {
        match self {
            ParticleAveragingStrategy::WeightedAverage => Self::weighted_average(particles),
            ParticleAveragingStrategy::UnweightedAverage => Self::unweighted_average(particles),
            ParticleAveragingStrategy::HighestWeight => {
                highest_weight_index(particles).map(|index| particles[index].pose())
            }
        }
    }
    fn weighted_average(particles: &[Particle]) -> Option<Pose> {
        let total: f64 = particles.iter().map(|p| p.weight).sum();
        if !(total > 0.0) || !total.is_finite() {
            return Self::unweighted_average(particles);
        }
        let mut mean = Pose::default();
        let (mut sin_sum, mut cos_sum) = (0.0_f64, 0.0_f64);
        for particle in particles {
            let w = particle.weight / total;
            mean.x += w * particle.x;
            mean.y += w * particle.y;
            sin_sum += w * particle.theta.sin();
            cos_sum += w * particle.theta.cos();
        }
        mean.theta = sin_sum.atan2(cos_sum);
        Some(mean)
    }
    fn unweighted_average(particles: &[Particle]) -> Option<Pose> {
        if particles.is_empty() {
            return None;
        }
        let n = particles.len() as f64;
        let mut mean = Pose::default();
        let (mut sin_sum, mut cos_sum) = (0.0_f64, 0.0_f64);
        for particle in particles {
            mean.x += particle.x / n;
            mean.y += particle.y / n;
            sin_sum += particle.theta.sin();
            cos_sum += particle.theta.cos();
        }
        mean.theta = sin_sum.atan2(cos_sum);
        Some(mean)
    }
}

// First maximum wins so repeated calls agree on the same particle.
fn highest_weight_index(particles: &[Particle]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, particle) in particles.iter().enumerate() {
        match best {
            Some((_, weight)) if particle.weight <= weight => {}
            _ => best = Some((index, particle.weight)),
        }
    }
    best.map(|(index, _)| index)
}

fn noise(axis: &'static str, mean: f64, std_dev: f64) -> Result<Normal<f64>, FilterError> {
    let invalid = FilterError::InvalidNoise {
        axis,
        mean,
        std_dev,
    };
    if !mean.is_finite() || !std_dev.is_finite() || std_dev < 0.0 {
        return Err(invalid);
    }
    Normal::new(mean, std_dev).map_err(|_| invalid)
}

#[derive(Clone)]
pub struct ParticleFilter {
    pub particles: Vec<Particle>,
    num_particles: usize,
    is_initialized: bool,
    rng: StdRng,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.num_particles)
            .field("is_initialized", &self.is_initialized)
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("best_pose", &self.best_particle().map(Particle::pose))
            .finish()
    }
}
impl ParticleFilter {
    /// Uninitialized filter whose random stream is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }
    pub fn from_rng(rng: StdRng) -> Self {
        ParticleFilter {
            particles: Vec::new(),
            num_particles: DEFAULT_NUM_PARTICLES,
            is_initialized: false,
            rng,
        }
    }
    /// Population size to draw at [init](Self::init). Ignored once the filter is initialized.
    pub fn with_num_particles(mut self, num_particles: usize) -> Self {
        if !self.is_initialized {
            self.num_particles = num_particles;
        }
        self
    }
    pub fn num_particles(&self) -> usize {
        self.num_particles
    }
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }
    /// Seed the population around an initial pose estimate.
    ///
    /// Each particle's `(x, y, theta)` is drawn independently from a Gaussian centered on the estimate
    /// with the per-axis standard deviations in `std`. Weights start at 1.0 and ids are assigned
    /// sequentially. Only the first successful call does anything; later calls return `Ok(())`
    /// without touching the population or the random stream.
    ///
    /// # Arguments
    /// * `x`, `y`, `theta` - Initial pose estimate (e.g. from GPS)
    /// * `std` - Standard deviations of the estimate `[x, y, theta]`
    pub fn init(&mut self, x: f64, y: f64, theta: f64, std: &[f64; 3]) -> Result<(), FilterError> {
        if self.is_initialized {
            return Ok(());
        }
        let dist_x = noise("x", x, std[0])?;
        let dist_y = noise("y", y, std[1])?;
        let dist_theta = noise("theta", theta, std[2])?;
        self.particles = (0..self.num_particles)
            .map(|id| {
                let pose = Pose {
                    x: dist_x.sample(&mut self.rng),
                    y: dist_y.sample(&mut self.rng),
                    theta: dist_theta.sample(&mut self.rng),
                };
                Particle::new(id, pose, 1.0)
            })
            .collect();
        self.is_initialized = true;
        debug!(
            "Initialized {} particles around ({:.4}, {:.4}, {:.4})",
            self.num_particles, x, y, theta
        );
        Ok(())
    }
    /// Move every particle with the CTRV motion model and add zero-mean Gaussian process noise.
    ///
    /// # Arguments
    /// * `delta_t` - Elapsed time since the previous step (s)
    /// * `std_pos` - Process noise standard deviations `[x, y, theta]`
    /// * `velocity` - Commanded speed (m/s)
    /// * `yaw_rate` - Commanded yaw rate (rad/s)
    pub fn prediction(
        &mut self,
        delta_t: f64,
        std_pos: &[f64; 3],
        velocity: f64,
        yaw_rate: f64,
    ) -> Result<(), FilterError> {
        let dist_x = noise("x", 0.0, std_pos[0])?;
        let dist_y = noise("y", 0.0, std_pos[1])?;
        let dist_theta = noise("theta", 0.0, std_pos[2])?;
        for particle in &mut self.particles {
            let moved = ctrv(&particle.pose(), delta_t, velocity, yaw_rate);
            particle.x = moved.x + dist_x.sample(&mut self.rng);
            particle.y = moved.y + dist_y.sample(&mut self.rng);
            particle.theta = moved.theta + dist_theta.sample(&mut self.rng);
        }
        Ok(())
    }
    /// Nearest neighbor association of map-frame `observations` to `predicted` landmarks.
    ///
    /// See [measurements::data_association].
    pub fn data_association(predicted: &[LandmarkObs], observations: &mut [LandmarkObs]) {
        measurements::data_association(predicted, observations);
    }
    /// Re-weight every particle by the likelihood of the current observations.
    ///
    /// For each particle the observations are projected into the map frame from the particle's pose,
    /// matched to the nearest landmark within `sensor_range` of the particle, and scored with an
    /// uncorrelated bivariate Gaussian. The weight is reset to 1.0 and then multiplied by each score.
    /// A particle with no landmark in range scores every observation against the origin, which drives
    /// its weight towards zero.
    ///
    /// # Arguments
    /// * `sensor_range` - Maximum landmark distance from the particle (m), inclusive
    /// * `std_landmark` - Observation standard deviations `[x, y]`
    /// * `observations` - Vehicle-frame observations for this timestep
    /// * `map` - Landmark map
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_landmark: &[f64; 2],
        observations: &[LandmarkObs],
        map: &Map,
    ) -> Result<(), FilterError> {
        for (axis, &std_dev) in ["x", "y"].into_iter().zip(std_landmark.iter()) {
            if !(std_dev > 0.0) || !std_dev.is_finite() {
                return Err(FilterError::InvalidLandmarkStd { axis, std_dev });
            }
        }
        for particle in &mut self.particles {
            let pose = particle.pose();
            let in_range = map.landmarks_in_range(pose.x, pose.y, sensor_range);
            particle.weight = 1.0;
            for observation in observations {
                let projected = to_map_frame(&pose, observation);
                let (mu_x, mu_y) = nearest_landmark(projected.x, projected.y, &in_range)
                    .map_or((0.0, 0.0), |landmark| (landmark.x, landmark.y));
                particle.weight *= bivariate_gaussian(
                    std_landmark[0],
                    std_landmark[1],
                    projected.x,
                    projected.y,
                    mu_x,
                    mu_y,
                );
            }
        }
        Ok(())
    }
    /// Map-frame observations of `particle` with the id of their nearest in-range landmark.
    ///
    /// Uses the same projection, range gate, and tie-break as [update_weights](Self::update_weights).
    /// Observations with no landmark in range keep their incoming id.
    pub fn associate(
        particle: &Particle,
        sensor_range: f64,
        observations: &[LandmarkObs],
        map: &Map,
    ) -> Vec<LandmarkObs> {
        let pose = particle.pose();
        let in_range = map.landmarks_in_range(pose.x, pose.y, sensor_range);
        let mut projected: Vec<LandmarkObs> = observations
            .iter()
            .map(|observation| to_map_frame(&pose, observation))
            .collect();
        measurements::data_association(&in_range, &mut projected);
        projected
    }
    /// Replace the population with a weight-proportional draw with replacement (resampling wheel).
    ///
    /// Duplicated particles are independent copies, ids included. The wheel runs on weights
    /// divided by the largest one, so `beta` stays below 3 for any finite weight magnitude. When
    /// every weight is zero (or the largest weight is not finite) every particle is drawn with
    /// equal probability instead.
    pub fn resample(&mut self) {
        let n = self.particles.len();
        if n == 0 {
            return;
        }
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        let mut resampled = Vec::with_capacity(n);
        if max_weight > 0.0 && max_weight.is_finite() {
            debug!("Resampling {} particles, max weight {:.4e}", n, max_weight);
            // division rather than a reciprocal: 1 / max overflows for subnormal weights
            let scaled: Vec<f64> = self
                .particles
                .iter()
                .map(|p| p.weight / max_weight)
                .collect();
            let mut index = self.rng.random_range(0..n);
            let mut beta = 0.0;
            for _ in 0..n {
                beta += self.rng.random::<f64>() * 2.0;
                while beta > scaled[index] {
                    beta -= scaled[index];
                    index = (index + 1) % n;
                }
                resampled.push(self.particles[index].clone());
            }
        } else {
            warn!(
                "Degenerate particle weights (max {:e}); resampling uniformly",
                max_weight
            );
            for _ in 0..n {
                let index = self.rng.random_range(0..n);
                resampled.push(self.particles[index].clone());
            }
        }
        self.particles = resampled;
    }
    /// Attach diagnostic associations and their map-frame coordinates to `particle`.
    pub fn set_associations(
        particle: &mut Particle,
        associations: Vec<i32>,
        sense_x: Vec<f64>,
        sense_y: Vec<f64>,
    ) {
        particle.diagnostics = Some(ParticleAssociations {
            associations,
            sense_x,
            sense_y,
        });
    }
    /// Space-separated landmark ids of the particle's associations, empty if none are set.
    pub fn get_associations(particle: &Particle) -> String {
        particle
            .diagnostics
            .as_ref()
            .map(|d| join_values(d.associations.iter()))
            .unwrap_or_default()
    }
    /// Space-separated map-frame x or y coordinates of the particle's associations.
    ///
    /// Each value is narrowed to `f32` and printed with six significant digits in the style of C's
    /// `%g`: trailing zeros are dropped and exponent notation is used below `1e-4` or from `1e6` up,
    /// so `75.12345` renders as `75.1235` and `1234567` as `1.23457e+06`.
    pub fn get_sense_coord(particle: &Particle, coord: SenseCoordinate) -> String {
        particle
            .diagnostics
            .as_ref()
            .map(|d| {
                let values = match coord {
                    SenseCoordinate::X => &d.sense_x,
                    SenseCoordinate::Y => &d.sense_y,
                };
                join_values(values.iter().map(|&v| six_significant_digits(v as f32)))
            })
            .unwrap_or_default()
    }
    /// Particle with the largest weight, the first one on ties.
    pub fn best_particle(&self) -> Option<&Particle> {
        highest_weight_index(&self.particles).map(|index| &self.particles[index])
    }
    pub fn best_particle_mut(&mut self) -> Option<&mut Particle> {
        highest_weight_index(&self.particles).map(|index| &mut self.particles[index])
    }
    pub fn estimate(&self, strategy: ParticleAveragingStrategy) -> Option<Pose> {
        strategy.estimate(&self.particles)
    }
    /// Effective number of particles, `(sum w)^2 / sum w^2`, on unnormalized weights.
    pub fn effective_sample_size(&self) -> f64 {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        let sum_of_squares: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_of_squares > 0.0 {
            sum * sum / sum_of_squares
        } else {
            0.0
        }
    }
}

fn six_significant_digits(value: f32) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    // `{:.5e}` rounds to six significant digits and yields the decimal exponent after rounding
    let scientific = format!("{:.5e}", value);
    let Some((mantissa, exponent)) = scientific
        .split_once('e')
        .and_then(|(m, e)| e.parse::<i32>().ok().map(|e| (m, e)))
    else {
        return value.to_string();
    };
    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (5 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

fn join_values<T: Display>(values: impl Iterator<Item = T>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<String>>()
        .join(" ")
}
