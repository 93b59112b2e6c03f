//! Monte Carlo localization toolbox for planar vehicles
//!
//! This crate estimates the pose of a vehicle moving on a known map of point landmarks. The pose is
//! tracked with a particle filter: a population of pose hypotheses that are moved with the commanded
//! motion, weighted by how well they explain the current set of landmark observations, and resampled
//! in proportion to those weights. The map is given and never modified; this is localization, not SLAM.
//!
//! This crate is primarily built off of a handful of additional dependencies:
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides the seedable random number generation used to seed, perturb, and resample particles.
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the rigid body transforms between the vehicle and map frames.
//! - [`serde`](https://crates.io/crates/serde) and [`csv`](https://crates.io/crates/csv): Provides configuration and recorded-data I/O.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [config]: Contains the filter and replay configuration along with its JSON/YAML/TOML serialization.
//! - [map]: Contains the landmark map and its sensor range query.
//! - [measurements]: Contains the landmark observation type, frame transforms, data association, and the observation likelihood.
//! - [motion]: Contains the pose type and the constant turn rate and velocity (CTRV) motion model.
//! - [particle]: Contains the particle filter itself.
//! - [sim]: Contains utilities for replaying recorded runs through the filter and scoring them against ground truth.
//!
//! ## Coordinate and state definitions
//!
//! Each particle carries the three-state planar pose
//!
//! $$
//! x = [p_x, p_y, \theta]
//! $$
//!
//! where $p_x$ and $p_y$ are the position in the map frame and $\theta$ is the heading in radians measured
//! counter-clockwise from the map x-axis. The heading is accumulated raw and is *not* wrapped to $[-\pi, \pi]$;
//! consumers that need a bounded angle must wrap it themselves (see [motion::normalize_angle]).
//!
//! Observations arrive in the vehicle frame ($x$ forward, $y$ left). A particle interprets them from its own
//! pose through the homogeneous transform
//!
//! $$
//! \begin{bmatrix} x_m \\\\ y_m \\\\ 1 \end{bmatrix} =
//! \begin{bmatrix} \cos\theta & -\sin\theta & p_x \\\\ \sin\theta & \cos\theta & p_y \\\\ 0 & 0 & 1 \end{bmatrix}
//! \begin{bmatrix} x_c \\\\ y_c \\\\ 1 \end{bmatrix}
//! $$
//!
//! i.e. a rotation by $\theta$ followed by a translation, with no scaling.
//!
//! ## Filter cycle
//!
//! The driver sequences one cycle per timestep:
//!
//! 1. [`ParticleFilter::init`](particle::ParticleFilter::init) on the first timestep only. Subsequent calls are no-ops.
//! 2. [`ParticleFilter::prediction`](particle::ParticleFilter::prediction) with the control input of the previous timestep.
//! 3. [`ParticleFilter::update_weights`](particle::ParticleFilter::update_weights) with the current observations.
//! 4. [`ParticleFilter::resample`](particle::ParticleFilter::resample).
//!
//! after which the best particle (or a weighted average, see [particle::ParticleAveragingStrategy]) is read back
//! as the pose estimate. The [sim] module implements exactly this loop for recorded data.
pub mod config;
pub mod map;
pub mod measurements;
pub mod motion;
pub mod particle;
pub mod sim;

pub use config::FilterConfig;
pub use map::{Landmark, Map};
pub use measurements::{LandmarkObs, UNASSOCIATED};
pub use motion::Pose;
pub use particle::{FilterError, Particle, ParticleFilter};
