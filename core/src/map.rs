//! Landmark map: the fixed set of point landmarks the vehicle localizes against.
//!
//! The map is supplied by the caller and is read-only for the lifetime of a filter run. Landmark ids
//! are assumed unique; order carries no meaning other than acting as the tie-break order for data
//! association.
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::measurements::LandmarkObs;

/// A single map landmark.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: i32,
    /// Map-frame x position (m)
    pub x: f64,
    /// Map-frame y position (m)
    pub y: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    pub landmarks: Vec<Landmark>,
}
impl Map {
    pub fn new(landmarks: Vec<Landmark>) -> Map {
        Map { landmarks }
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
    /// Landmarks within `sensor_range` of `(x, y)`, boundary inclusive, in map order.
    pub fn landmarks_in_range(&self, x: f64, y: f64, sensor_range: f64) -> Vec<LandmarkObs> {
        self.landmarks
            .iter()
            .filter(|landmark| {
                let dx = landmark.x - x;
                let dy = landmark.y - y;
                (dx * dx + dy * dy).sqrt() <= sensor_range
            })
            .map(|landmark| LandmarkObs::new(landmark.id, landmark.x, landmark.y))
            .collect()
    }
    /// Reads a landmark map from a CSV file with an `id,x,y` header.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mcl::map::Map;
    ///
    /// let map = Map::from_csv("./data/map.csv").expect("Failed to read map");
    /// println!("Loaded {} landmarks", map.len());
    /// ```
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Map, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut landmarks = Vec::new();
        for result in rdr.deserialize() {
            let landmark: Landmark = result?;
            landmarks.push(landmark);
        }
        Ok(Map { landmarks })
    }
    /// Writes the map to a CSV file with an `id,x,y` header.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = csv::Writer::from_path(path)?;
        for landmark in &self.landmarks {
            writer.serialize(landmark)?;
        }
        writer.flush()?;
        Ok(())
    }
}
