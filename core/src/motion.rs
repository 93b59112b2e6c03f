//! Planar pose and the constant turn rate and velocity (CTRV) motion model.
//!
//! The motion model propagates a pose forward by `delta_t` seconds given a commanded speed and yaw
//! rate. When the yaw rate is non-negligible the vehicle follows a circular arc:
//!
//! $$
//! \begin{aligned}
//! x' &= x + \frac{v}{\omega}\left(\sin(\theta + \omega\Delta t) - \sin\theta\right) \\\\
//! y' &= y + \frac{v}{\omega}\left(\cos\theta - \cos(\theta + \omega\Delta t)\right) \\\\
//! \theta' &= \theta + \omega\Delta t
//! \end{aligned}
//! $$
//!
//! The arc form divides by $\omega$, so below [YAW_RATE_EPSILON] the straight line limit
//! $x' = x + v\Delta t\cos\theta$, $y' = y + v\Delta t\sin\theta$ is used instead and the heading is
//! left untouched.
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{self, Display};

/// Yaw rates with a magnitude at or below this value are treated as straight line motion.
pub const YAW_RATE_EPSILON: f64 = 1e-5;

/// Planar pose in the map frame. Heading in radians, not wrapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}
impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Pose {
        Pose { x, y, theta }
    }
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4} rad)", self.x, self.y, self.theta)
    }
}

/// Deterministic CTRV propagation of `pose` over `delta_t` seconds.
///
/// # Arguments
/// * `pose` - Pose at the start of the interval
/// * `delta_t` - Elapsed time (s)
/// * `velocity` - Commanded forward speed (m/s)
/// * `yaw_rate` - Commanded yaw rate (rad/s)
///
/// # Returns
/// The pose at the end of the interval. No noise is applied here; the particle filter adds process
/// noise on top of this.
///
/// # Example
///
/// ```
/// use mcl::motion::{Pose, ctrv};
///
/// let moved = ctrv(&Pose::new(0.0, 0.0, 0.0), 1.0, 1.0, 0.0);
/// assert_eq!(moved, Pose::new(1.0, 0.0, 0.0));
/// ```
pub fn ctrv(pose: &Pose, delta_t: f64, velocity: f64, yaw_rate: f64) -> Pose {
    if yaw_rate.abs() > YAW_RATE_EPSILON {
        let theta_next = pose.theta + yaw_rate * delta_t;
        let radius = velocity / yaw_rate;
        Pose {
            x: pose.x + radius * (theta_next.sin() - pose.theta.sin()),
            y: pose.y + radius * (pose.theta.cos() - theta_next.cos()),
            theta: theta_next,
        }
    } else {
        let distance = velocity * delta_t;
        Pose {
            x: pose.x + distance * pose.theta.cos(),
            y: pose.y + distance * pose.theta.sin(),
            theta: pose.theta,
        }
    }
}

/// Wrap an angle into (-pi, pi].
pub fn normalize_angle(theta: f64) -> f64 {
    let wrapped = theta.rem_euclid(2.0 * PI);
    if wrapped > PI { wrapped - 2.0 * PI } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn straight_line_motion_along_heading() {
        let pose = ctrv(&Pose::new(1.0, 2.0, FRAC_PI_2), 2.0, 3.0, 0.0);
        assert_approx_eq!(pose.x, 1.0, 1e-12);
        assert_approx_eq!(pose.y, 8.0, 1e-12);
        assert_eq!(pose.theta, FRAC_PI_2);
    }

    #[test]
    fn quarter_turn_matches_closed_form() {
        // v = 1, w = pi/2, dt = 1 traces a quarter circle of radius 2/pi
        let pose = ctrv(&Pose::new(1.0, 0.0, 0.0), 1.0, 1.0, FRAC_PI_2);
        let radius = 1.0 / FRAC_PI_2;
        assert_approx_eq!(pose.x, 1.0 + radius, 1e-12);
        assert_approx_eq!(pose.y, radius, 1e-12);
        assert_approx_eq!(pose.theta, FRAC_PI_2, 1e-12);
    }

    #[test]
    fn yaw_rate_at_threshold_uses_straight_line() {
        let pose = ctrv(&Pose::new(0.0, 0.0, 0.3), 1.0, 2.0, YAW_RATE_EPSILON);
        assert_eq!(pose.theta, 0.3);
        let pose = ctrv(&Pose::new(0.0, 0.0, 0.3), 1.0, 2.0, -YAW_RATE_EPSILON);
        assert_eq!(pose.theta, 0.3);
    }

    #[test]
    fn curved_and_straight_agree_across_threshold() {
        let start = Pose::new(4.0, -2.0, 1.1);
        let straight = ctrv(&start, 0.1, 10.0, 0.0);
        let curved = ctrv(&start, 0.1, 10.0, 2.0 * YAW_RATE_EPSILON);
        assert_approx_eq!(curved.x, straight.x, 1e-5);
        assert_approx_eq!(curved.y, straight.y, 1e-5);
        assert_approx_eq!(curved.theta, straight.theta, 1e-5);
    }

    #[test]
    fn slowest_sampled_turn_uses_curved_branch() {
        let start = Pose::new(0.0, 0.0, 0.4);
        let yaw_rate = 1e-3 / 90.0;
        assert!(yaw_rate > YAW_RATE_EPSILON);
        let curved = ctrv(&start, 1.0, 5.0, yaw_rate);
        let straight = ctrv(&start, 1.0, 5.0, 0.0);
        assert_approx_eq!(curved.theta, 0.4 + yaw_rate, 1e-15);
        assert!(curved.theta != straight.theta);
    }

    #[quickcheck]
    fn curved_motion_converges_to_straight_line(
        theta: f64,
        velocity: f64,
        delta_t: f64,
        shrink: u8,
    ) -> TestResult {
        if !theta.is_finite() || !velocity.is_finite() || !delta_t.is_finite() {
            return TestResult::discard();
        }
        let theta = theta % (2.0 * PI);
        let velocity = velocity % 20.0;
        let delta_t = (delta_t % 1.0).abs();
        // divisors up to 90 keep the rate on the curved branch
        let yaw_rate = 1e-3 / (1.0 + (shrink % 90) as f64);
        if yaw_rate <= YAW_RATE_EPSILON {
            return TestResult::discard();
        }
        let start = Pose::new(0.0, 0.0, theta);
        let straight = ctrv(&start, delta_t, velocity, 0.0);
        let curved = ctrv(&start, delta_t, velocity, yaw_rate);
        // the gap is of order v * w * dt^2
        let tolerance = 1e-6 + velocity.abs() * yaw_rate * delta_t * delta_t;
        TestResult::from_bool(
            (curved.x - straight.x).abs() <= tolerance
                && (curved.y - straight.y).abs() <= tolerance,
        )
    }

    #[test]
    fn heading_is_not_wrapped() {
        let mut pose = Pose::default();
        for _ in 0..8 {
            pose = ctrv(&pose, 1.0, 1.0, FRAC_PI_2);
        }
        assert_approx_eq!(pose.theta, 4.0 * PI, 1e-9);
    }

    #[test]
    fn normalize_angle_wraps_into_half_open_range() {
        assert_approx_eq!(normalize_angle(2.5 * PI), FRAC_PI_2, 1e-12);
        assert_approx_eq!(normalize_angle(-FRAC_PI_2), -FRAC_PI_2, 1e-12);
        assert_approx_eq!(normalize_angle(2.0 * PI + 0.25), 0.25, 1e-12);
        assert_approx_eq!(normalize_angle(-PI), PI, 1e-12);
    }
}
