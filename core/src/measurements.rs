//! Landmark observations, vehicle-to-map frame transforms, nearest neighbor data association, and
//! the observation likelihood used to weight particles.
//!
//! Observations are point measurements of landmarks reported in the vehicle frame. To score a
//! particle, each observation is projected into the map frame from that particle's pose, matched to
//! the closest candidate landmark, and evaluated under an uncorrelated bivariate Gaussian centered on
//! the matched landmark:
//!
//! $$
//! p(x, y) = \frac{1}{2\pi\sigma_x\sigma_y}
//! \exp\left(-\left(\frac{(x - \mu_x)^2}{2\sigma_x^2} + \frac{(y - \mu_y)^2}{2\sigma_y^2}\right)\right)
//! $$
use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::motion::Pose;

/// Landmark id carried by an observation that has not been matched to anything.
pub const UNASSOCIATED: i32 = -1;

/// A point observation, either in the vehicle frame or projected into the map frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkObs {
    /// Id of the associated landmark, [UNASSOCIATED] until matched
    pub id: i32,
    pub x: f64,
    pub y: f64,
}
impl LandmarkObs {
    pub fn new(id: i32, x: f64, y: f64) -> LandmarkObs {
        LandmarkObs { id, x, y }
    }
    /// Observation with no landmark association yet.
    pub fn unassociated(x: f64, y: f64) -> LandmarkObs {
        LandmarkObs {
            id: UNASSOCIATED,
            x,
            y,
        }
    }
    pub fn squared_distance_to(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        dx * dx + dy * dy
    }
}

/// Project a vehicle-frame observation into the map frame as seen from `pose`.
///
/// Rotation by the pose heading followed by translation by the pose position; no scaling. The id of
/// the observation is carried through unchanged.
pub fn to_map_frame(pose: &Pose, observation: &LandmarkObs) -> LandmarkObs {
    let vehicle_to_map = Isometry2::new(Vector2::new(pose.x, pose.y), pose.theta);
    let projected = vehicle_to_map * Point2::new(observation.x, observation.y);
    LandmarkObs {
        id: observation.id,
        x: projected.x,
        y: projected.y,
    }
}

/// Nearest candidate to `(x, y)` by squared Euclidean distance.
///
/// On an exact tie the candidate with the lowest index wins. Returns `None` when there are no
/// candidates.
pub fn nearest_landmark(x: f64, y: f64, candidates: &[LandmarkObs]) -> Option<&LandmarkObs> {
    let mut best: Option<(&LandmarkObs, f64)> = None;
    for candidate in candidates {
        let distance = candidate.squared_distance_to(x, y);
        match best {
            Some((_, min_distance)) if distance >= min_distance => {}
            _ => best = Some((candidate, distance)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Assign each observation the id of its nearest predicted landmark, in place.
///
/// Both sequences are expected to be in the map frame. If `predicted` is empty the observations are
/// left exactly as the caller supplied them.
///
/// # Example
///
/// ```
/// use mcl::measurements::{LandmarkObs, data_association};
///
/// let predicted = [LandmarkObs::new(1, 5.0, 5.0), LandmarkObs::new(2, 2.0, 2.0)];
/// let mut observations = [LandmarkObs::unassociated(2.1, 1.9)];
/// data_association(&predicted, &mut observations);
/// assert_eq!(observations[0].id, 2);
/// ```
pub fn data_association(predicted: &[LandmarkObs], observations: &mut [LandmarkObs]) {
    for observation in observations.iter_mut() {
        if let Some(nearest) = nearest_landmark(observation.x, observation.y, predicted) {
            observation.id = nearest.id;
        }
    }
}

/// Uncorrelated bivariate Gaussian density of `(x, y)` about `(mu_x, mu_y)`.
///
/// Always positive in exact arithmetic; large deviations underflow to `0.0` in floating point, which
/// callers treat as a legitimate (if degenerate) weight.
pub fn bivariate_gaussian(std_x: f64, std_y: f64, x: f64, y: f64, mu_x: f64, mu_y: f64) -> f64 {
    let normalizer = 1.0 / (2.0 * PI * std_x * std_y);
    let exponent = (x - mu_x).powi(2) / (2.0 * std_x.powi(2))
        + (y - mu_y).powi(2) / (2.0 * std_y.powi(2));
    normalizer * (-exponent).exp()
}
