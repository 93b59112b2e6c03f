//! Filter and replay configuration.
//!
//! [FilterConfig] collects every tunable the filter and the [replay loop](crate::sim) need. It can be
//! read from and written to JSON, YAML, or TOML; the format is picked from the file extension.
//! Missing fields fall back to their defaults, so a partial file only needs to name what it changes.
//!
//! ## Example
//!
//! ```
//! use mcl::config::FilterConfig;
//!
//! let cfg: FilterConfig = toml::from_str("num_particles = 500\nsensor_range = 30.0").unwrap();
//! assert_eq!(cfg.num_particles, 500);
//! assert_eq!(cfg.sigma_landmark, [0.3, 0.3]);
//! ```
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::particle::{DEFAULT_NUM_PARTICLES, ParticleAveragingStrategy};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of particles drawn at initialization
    pub num_particles: usize,
    /// Time between consecutive timesteps (s)
    pub delta_t: f64,
    /// Maximum distance at which a landmark can be observed (m)
    pub sensor_range: f64,
    /// Standard deviations `[x (m), y (m), theta (rad)]` used both for the initial pose estimate and
    /// as process noise
    pub sigma_pos: [f64; 3],
    /// Observation standard deviations `[x (m), y (m)]`
    pub sigma_landmark: [f64; 2],
    /// Random number generator seed for reproducible runs
    pub seed: u64,
    /// Largest acceptable translation error of the estimate (m)
    pub max_translation_error: f64,
    /// Largest acceptable yaw error of the estimate (rad)
    pub max_yaw_error: f64,
    /// How the population is collapsed into the reported pose
    pub averaging_strategy: ParticleAveragingStrategy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: DEFAULT_NUM_PARTICLES,
            delta_t: 0.1,
            sensor_range: 50.0,
            sigma_pos: [0.3, 0.3, 0.01],
            sigma_landmark: [0.3, 0.3],
            seed: 42,
            max_translation_error: 1.0,
            max_yaw_error: 0.05,
            averaging_strategy: ParticleAveragingStrategy::HighestWeight,
        }
    }
}

/// On-disk encodings a [FilterConfig] can be stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Toml,
}
impl Format {
    /// `.json`, `.yaml`/`.yml` or `.toml`, case-insensitive.
    fn from_path(path: &Path) -> io::Result<Format> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Format::Json),
            Some("yaml" | "yml") => Ok(Format::Yaml),
            Some("toml") => Ok(Format::Toml),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported configuration file: {}", path.display()),
            )),
        }
    }
}

impl FilterConfig {
    fn encode(&self, format: Format) -> io::Result<String> {
        match format {
            Format::Json => serde_json::to_string_pretty(self).map_err(io::Error::other),
            Format::Yaml => serde_yaml::to_string(self).map_err(io::Error::other),
            Format::Toml => toml::to_string(self).map_err(io::Error::other),
        }
    }
    fn decode(text: &str, format: Format) -> io::Result<Self> {
        match format {
            Format::Json => serde_json::from_str(text).map_err(io::Error::other),
            Format::Yaml => serde_yaml::from_str(text).map_err(io::Error::other),
            Format::Toml => toml::from_str(text).map_err(io::Error::other),
        }
    }
    fn write_as(&self, path: &Path, format: Format) -> io::Result<()> {
        fs::write(path, self.encode(format)?)
    }
    fn read_as(path: &Path, format: Format) -> io::Result<Self> {
        Self::decode(&fs::read_to_string(path)?, format)
    }

    /// Pretty-printed JSON.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.write_as(path.as_ref(), Format::Json)
    }
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::read_as(path.as_ref(), Format::Json)
    }
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.write_as(path.as_ref(), Format::Yaml)
    }
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::read_as(path.as_ref(), Format::Yaml)
    }
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.write_as(path.as_ref(), Format::Toml)
    }
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::read_as(path.as_ref(), Format::Toml)
    }
    /// Write in the format named by the file extension.
    ///
    /// # Errors
    /// `io::ErrorKind::InvalidInput` for an unrecognised extension, otherwise the underlying I/O or
    /// serialization error.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        self.write_as(path, Format::from_path(path)?)
    }
    /// Read in the format named by the file extension. The extension is checked before the file
    /// is opened.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        Self::read_as(path, Format::from_path(path)?)
    }
}
