//! End-to-end tests for Monte Carlo localization on a synthetic drive
//!
//! A vehicle drives a gentle S-curve through a grid of landmarks. Observations are generated by
//! projecting every landmark within sensor range into the true vehicle frame and adding Gaussian
//! noise. The filter must then keep the estimate close to the true trajectory for the whole run.
//!
//! The error bounds in the assertions are the same limits the replay summary uses by default; they
//! serve as regression checks rather than theoretical guarantees.
use std::path::PathBuf;

use mcl::config::FilterConfig;
use mcl::map::{Landmark, Map};
use mcl::measurements::LandmarkObs;
use mcl::motion::{Pose, ctrv};
use mcl::particle::ParticleFilter;
use mcl::sim::{
    ControlRecord, GroundTruthRecord, LocalizationResult, LocalizationSummary, ObservationRecord,
    group_observations, run_localization,
};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

const TIMESTEPS: usize = 300;

/// Landmarks every 10 m on a 200 m x 200 m grid centered on the origin, with ids in row-major order
fn grid_map() -> Map {
    let mut landmarks = Vec::new();
    let mut id = 1;
    for row in -10..=10 {
        for col in -10..=10 {
            landmarks.push(Landmark {
                id,
                x: col as f64 * 10.0 + 1.3,
                y: row as f64 * 10.0 - 2.7,
            });
            id += 1;
        }
    }
    Map::new(landmarks)
}

/// Controls and true poses for an S-curve at 5 m/s that stays inside the landmark grid
fn drive(config: &FilterConfig) -> (Vec<ControlRecord>, Vec<GroundTruthRecord>) {
    let mut controls = Vec::with_capacity(TIMESTEPS);
    let mut truth = Vec::with_capacity(TIMESTEPS);
    let mut pose = Pose::new(-70.0, -60.0, 0.3);
    for k in 0..TIMESTEPS {
        truth.push(GroundTruthRecord {
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
        });
        let yaw_rate = 0.2 * (k as f64 * config.delta_t * 0.5).sin();
        let control = ControlRecord {
            velocity: 5.0,
            yaw_rate,
        };
        pose = ctrv(&pose, config.delta_t, control.velocity, control.yaw_rate);
        controls.push(control);
    }
    (controls, truth)
}

/// Noisy vehicle-frame observations of every landmark in range of each true pose
fn observe(
    map: &Map,
    truth: &[GroundTruthRecord],
    config: &FilterConfig,
    seed: u64,
) -> Vec<ObservationRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise_x = Normal::new(0.0, config.sigma_landmark[0]).unwrap();
    let noise_y = Normal::new(0.0, config.sigma_landmark[1]).unwrap();
    let mut records = Vec::new();
    for (timestep, pose) in truth.iter().enumerate() {
        for landmark in map.landmarks_in_range(pose.x, pose.y, config.sensor_range) {
            let dx = landmark.x - pose.x;
            let dy = landmark.y - pose.y;
            let (sin, cos) = pose.theta.sin_cos();
            records.push(ObservationRecord {
                timestep,
                x: cos * dx + sin * dy + noise_x.sample(&mut rng),
                y: -sin * dx + cos * dy + noise_y.sample(&mut rng),
            });
        }
    }
    records
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mcl_it_{}_{}", std::process::id(), name))
}

#[test]
fn filter_tracks_synthetic_drive() {
    let config = FilterConfig {
        sensor_range: 30.0,
        ..FilterConfig::default()
    };
    let map = grid_map();
    let (controls, truth) = drive(&config);
    let records = observe(&map, &truth, &config, 7);
    let observations = group_observations(&records, truth.len());

    let results = run_localization(&config, &map, &controls, &truth, &observations).unwrap();
    assert_eq!(results.len(), TIMESTEPS);

    let summary = LocalizationSummary::from_results(&results, &config);
    assert!(summary.passed, "summary: {:?}", summary);
    assert!(summary.mean_error.translation() < 0.5);
    assert!(summary.max_error.x < 2.0 && summary.max_error.y < 2.0);

    for result in &results {
        assert!(!result.associations.is_empty());
        let ids = result.associations.split(' ').count();
        assert_eq!(ids, result.sense_x.split(' ').count());
        assert_eq!(ids, result.sense_y.split(' ').count());
        assert!(result.best_weight > 0.0);
    }
}

#[test]
fn replay_is_reproducible_for_a_seed() {
    let config = FilterConfig {
        sensor_range: 30.0,
        num_particles: 50,
        ..FilterConfig::default()
    };
    let map = grid_map();
    let (controls, truth) = drive(&config);
    let truth = &truth[..60];
    let observations = group_observations(&observe(&map, truth, &config, 3), truth.len());
    let first = run_localization(&config, &map, &controls, truth, &observations).unwrap();
    let second = run_localization(&config, &map, &controls, truth, &observations).unwrap();
    assert_eq!(first, second);
}

#[test]
fn manual_cycle_keeps_population_and_locks_on() {
    let config = FilterConfig::default();
    let map = grid_map();
    let (controls, truth) = drive(&config);
    let observations = group_observations(&observe(&map, &truth, &config, 11), truth.len());

    let mut pf = ParticleFilter::new(config.seed);
    for (k, pose) in truth.iter().enumerate().take(50) {
        if k == 0 {
            pf.init(pose.x, pose.y, pose.theta, &config.sigma_pos).unwrap();
        } else {
            let control = controls[k - 1];
            pf.prediction(config.delta_t, &config.sigma_pos, control.velocity, control.yaw_rate)
                .unwrap();
        }
        assert_eq!(pf.particles.len(), pf.num_particles());
        pf.update_weights(config.sensor_range, &config.sigma_landmark, &observations[k], &map)
            .unwrap();
        assert_eq!(pf.particles.len(), pf.num_particles());
        pf.resample();
        assert_eq!(pf.particles.len(), pf.num_particles());
    }
    let best = pf.best_particle().unwrap();
    let last = truth[49];
    assert!((best.x - last.x).hypot(best.y - last.y) < 1.0);
}

#[test]
fn recorded_run_round_trips_through_csv() {
    let config = FilterConfig::default();
    let map = grid_map();
    let (controls, truth) = drive(&config);
    let controls = &controls[..20];
    let truth = &truth[..20];
    let records = observe(&map, truth, &config, 5);

    let map_path = temp_path("map.csv");
    let control_path = temp_path("control.csv");
    let truth_path = temp_path("truth.csv");
    let obs_path = temp_path("obs.csv");
    let out_path = temp_path("out.csv");
    map.to_csv(&map_path).unwrap();
    ControlRecord::to_csv(controls, &control_path).unwrap();
    GroundTruthRecord::to_csv(truth, &truth_path).unwrap();
    ObservationRecord::to_csv(&records, &obs_path).unwrap();

    let loaded_map = Map::from_csv(&map_path).unwrap();
    let loaded_controls = ControlRecord::from_csv(&control_path).unwrap();
    let loaded_truth = GroundTruthRecord::from_csv(&truth_path).unwrap();
    let loaded_obs = ObservationRecord::from_csv(&obs_path).unwrap();
    assert_eq!(loaded_map, map);
    assert_eq!(loaded_obs.len(), records.len());

    let observations = group_observations(&loaded_obs, loaded_truth.len());
    let results = run_localization(
        &config,
        &loaded_map,
        &loaded_controls,
        &loaded_truth,
        &observations,
    )
    .unwrap();
    LocalizationResult::to_csv(&results, &out_path).unwrap();
    let reloaded = LocalizationResult::from_csv(&out_path).unwrap();

    for path in [&map_path, &control_path, &truth_path, &obs_path, &out_path] {
        std::fs::remove_file(path).ok();
    }
    assert_eq!(reloaded.len(), results.len());
    assert_eq!(reloaded[5].associations, results[5].associations);
    assert_eq!(reloaded[5].timestep, 5);
}

#[test]
fn out_of_range_observations_still_produce_results() {
    // No landmark is ever within range: every particle is scored against the origin.
    let config = FilterConfig {
        sensor_range: 1.0,
        num_particles: 20,
        ..FilterConfig::default()
    };
    let map = Map::new(vec![Landmark { id: 1, x: 500.0, y: 500.0 }]);
    let (controls, truth) = drive(&config);
    let truth = &truth[..10];
    let observations = vec![vec![LandmarkObs::unassociated(5.0, 5.0)]; truth.len()];
    let results = run_localization(&config, &map, &controls, truth, &observations).unwrap();
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|r| r.associations == "-1"));
}
