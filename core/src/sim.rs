//! Replay of recorded runs through the particle filter and scoring against ground truth.
//!
//! This module provides:
//! - Record types for controls, ground truth poses, and landmark observations, with CSV import/export
//! - [run_localization], which drives one filter cycle per timestep the way a live vehicle would
//! - [LocalizationResult] and [LocalizationSummary] for storing and judging the resulting estimates
//!
//! ## Timestep convention
//!
//! Timestep `k` has one ground truth pose and zero or more observations. Timestep 0 initializes the
//! filter from the ground truth pose perturbed by `sigma_pos` (a stand-in for a GPS fix). Every later
//! timestep `k` predicts with the control recorded at `k - 1`, so `controls` needs at least one entry
//! fewer than `ground_truth`. Each timestep then weights, resamples, and reads back an estimate.
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use thiserror::Error;

use crate::config::FilterConfig;
use crate::map::Map;
use crate::measurements::LandmarkObs;
use crate::motion::Pose;
use crate::particle::{FilterError, ParticleFilter, SenseCoordinate};

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("expected at least {expected} control records for {timesteps} timesteps but got: {actual}")]
    MissingControls {
        expected: usize,
        actual: usize,
        timesteps: usize,
    },
    #[error("particle population is empty at timestep {0}")]
    EmptyPopulation(usize),
}

/// Commanded motion for one timestep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Forward speed (m/s)
    pub velocity: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate: f64,
}

/// True vehicle pose for one timestep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}
impl From<GroundTruthRecord> for Pose {
    fn from(record: GroundTruthRecord) -> Self {
        Pose::new(record.x, record.y, record.theta)
    }
}

/// One vehicle-frame observation, tagged with the timestep it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub timestep: usize,
    pub x: f64,
    pub y: f64,
}

fn read_records<T: DeserializeOwned, P: AsRef<Path>>(
    path: P,
) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result?;
        records.push(record);
    }
    Ok(records)
}

fn write_records<T: Serialize, P: AsRef<Path>>(
    records: &[T],
    path: P,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

impl ControlRecord {
    /// Reads controls from a CSV file with a `velocity,yaw_rate` header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(
        records: &[Self],
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        write_records(records, path)
    }
}
impl GroundTruthRecord {
    /// Reads ground truth poses from a CSV file with an `x,y,theta` header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(
        records: &[Self],
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        write_records(records, path)
    }
}
impl ObservationRecord {
    /// Reads observations from a CSV file with a `timestep,x,y` header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        read_records(path)
    }
    pub fn to_csv<P: AsRef<Path>>(
        records: &[Self],
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        write_records(records, path)
    }
}

/// Split long-form observation records into one unassociated observation list per timestep.
///
/// Records keep their file order within a timestep. Records at or beyond `timesteps` are dropped.
pub fn group_observations(records: &[ObservationRecord], timesteps: usize) -> Vec<Vec<LandmarkObs>> {
    let mut grouped = vec![Vec::new(); timesteps];
    let mut dropped = 0usize;
    for record in records {
        match grouped.get_mut(record.timestep) {
            Some(step) => step.push(LandmarkObs::unassociated(record.x, record.y)),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!(
            "Dropped {} observation(s) recorded after the last of {} timesteps",
            dropped, timesteps
        );
    }
    grouped
}

/// Absolute error of a pose estimate. Yaw error is reduced into [0, pi].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseError {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}
impl PoseError {
    pub fn translation(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

pub fn pose_error(estimate: &Pose, truth: &Pose) -> PoseError {
    let mut yaw = (estimate.theta - truth.theta).abs() % (2.0 * PI);
    if yaw > PI {
        yaw = 2.0 * PI - yaw;
    }
    PoseError {
        x: (estimate.x - truth.x).abs(),
        y: (estimate.y - truth.y).abs(),
        yaw,
    }
}

/// Filter output for one timestep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalizationResult {
    pub timestep: usize,
    /// Estimated x (m)
    pub x: f64,
    /// Estimated y (m)
    pub y: f64,
    /// Estimated heading (rad), not wrapped
    pub theta: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub true_theta: f64,
    /// Weight of the best particle after resampling
    pub best_weight: f64,
    /// Effective sample size before resampling
    pub effective_sample_size: f64,
    pub error_x: f64,
    pub error_y: f64,
    pub error_yaw: f64,
    /// Running mean of the errors up to and including this timestep
    pub mean_error_x: f64,
    pub mean_error_y: f64,
    pub mean_error_yaw: f64,
    /// Landmark ids matched by the best particle, space separated
    pub associations: String,
    pub sense_x: String,
    pub sense_y: String,
}
impl LocalizationResult {
    pub fn error(&self) -> PoseError {
        PoseError {
            x: self.error_x,
            y: self.error_y,
            yaw: self.error_yaw,
        }
    }
    pub fn mean_error(&self) -> PoseError {
        PoseError {
            x: self.mean_error_x,
            y: self.mean_error_y,
            yaw: self.mean_error_yaw,
        }
    }
    pub fn to_csv<P: AsRef<Path>>(
        records: &[Self],
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        write_records(records, path)
    }
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        read_records(path)
    }
}

/// Run the filter over a recorded sequence.
///
/// # Arguments
/// * `config` - Filter configuration
/// * `map` - Landmark map
/// * `controls` - One control per timestep; entry `k` moves the vehicle from `k` to `k + 1`
/// * `ground_truth` - One true pose per timestep; the first seeds the filter
/// * `observations` - Vehicle-frame observations per timestep; missing trailing entries are treated as empty
///
/// # Returns
/// One [LocalizationResult] per ground truth record.
pub fn run_localization(
    config: &FilterConfig,
    map: &Map,
    controls: &[ControlRecord],
    ground_truth: &[GroundTruthRecord],
    observations: &[Vec<LandmarkObs>],
) -> Result<Vec<LocalizationResult>, SimError> {
    let timesteps = ground_truth.len();
    let expected = timesteps.saturating_sub(1);
    if controls.len() < expected {
        return Err(SimError::MissingControls {
            expected,
            actual: controls.len(),
            timesteps,
        });
    }
    let mut pf = ParticleFilter::new(config.seed).with_num_particles(config.num_particles);
    let mut results = Vec::with_capacity(timesteps);
    let mut cumulative = PoseError::default();
    for (timestep, truth) in ground_truth.iter().enumerate() {
        if !pf.is_initialized() {
            pf.init(truth.x, truth.y, truth.theta, &config.sigma_pos)?;
        } else {
            let control = &controls[timestep - 1];
            pf.prediction(
                config.delta_t,
                &config.sigma_pos,
                control.velocity,
                control.yaw_rate,
            )?;
        }
        let step_observations = observations
            .get(timestep)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        pf.update_weights(
            config.sensor_range,
            &config.sigma_landmark,
            step_observations,
            map,
        )?;
        let effective_sample_size = pf.effective_sample_size();
        pf.resample();

        let estimate = pf
            .estimate(config.averaging_strategy)
            .ok_or(SimError::EmptyPopulation(timestep))?;
        let best = pf
            .best_particle_mut()
            .ok_or(SimError::EmptyPopulation(timestep))?;
        let matched = ParticleFilter::associate(best, config.sensor_range, step_observations, map);
        ParticleFilter::set_associations(
            best,
            matched.iter().map(|obs| obs.id).collect(),
            matched.iter().map(|obs| obs.x).collect(),
            matched.iter().map(|obs| obs.y).collect(),
        );

        let truth_pose = Pose::from(*truth);
        let error = pose_error(&estimate, &truth_pose);
        cumulative.x += error.x;
        cumulative.y += error.y;
        cumulative.yaw += error.yaw;
        let steps = (timestep + 1) as f64;
        debug!(
            "Timestep {}: estimate {} truth {} ess {:.1}",
            timestep, estimate, truth_pose, effective_sample_size
        );
        results.push(LocalizationResult {
            timestep,
            x: estimate.x,
            y: estimate.y,
            theta: estimate.theta,
            true_x: truth.x,
            true_y: truth.y,
            true_theta: truth.theta,
            best_weight: best.weight,
            effective_sample_size,
            error_x: error.x,
            error_y: error.y,
            error_yaw: error.yaw,
            mean_error_x: cumulative.x / steps,
            mean_error_y: cumulative.y / steps,
            mean_error_yaw: cumulative.yaw / steps,
            associations: ParticleFilter::get_associations(best),
            sense_x: ParticleFilter::get_sense_coord(best, SenseCoordinate::X),
            sense_y: ParticleFilter::get_sense_coord(best, SenseCoordinate::Y),
        });
    }
    Ok(results)
}

/// Overall verdict on a replayed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizationSummary {
    pub timesteps: usize,
    /// Mean error over the whole run
    pub mean_error: PoseError,
    /// Largest per-component error seen at any timestep
    pub max_error: PoseError,
    /// Whether the mean x, y, and yaw errors are within the configured limits
    pub passed: bool,
}
impl LocalizationSummary {
    pub fn from_results(results: &[LocalizationResult], config: &FilterConfig) -> Self {
        let Some(last) = results.last() else {
            return LocalizationSummary::default();
        };
        let mean_error = last.mean_error();
        let max_error = results
            .iter()
            .map(LocalizationResult::error)
            .fold(PoseError::default(), |acc, e| PoseError {
                x: acc.x.max(e.x),
                y: acc.y.max(e.y),
                yaw: acc.yaw.max(e.yaw),
            });
        let passed = mean_error.x <= config.max_translation_error
            && mean_error.y <= config.max_translation_error
            && mean_error.yaw <= config.max_yaw_error;
        LocalizationSummary {
            timesteps: results.len(),
            mean_error,
            max_error,
            passed,
        }
    }
}
