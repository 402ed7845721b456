//! # Cost Map
//!
//! A dense grid of `u8` occupancy costs backed by an [`ndarray::Array2`], indexed `[[mx, my]]`.

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use std::fs::File;
use std::path::Path;

use log::debug;
use nalgebra::Vector2;
use ndarray::Array2;
use noise::{NoiseFn, Perlin, Seedable};
use serde::{Deserialize, Serialize};

use super::{CostMapAccessor, FREE_SPACE, LETHAL_OBSTACLE, NO_INFORMATION};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Cost Map
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CostMap {
    cells: Array2<u8>,

    resolution_m: f64,

    origin_m: Vector2<f64>,

    frame_id: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors that can arise from building or accessing a [`CostMap`].
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("A cost map must have at least one cell in each axis, got {0} x {1}")]
    InvalidSize(usize, usize),

    #[error("The cell resolution must be positive, got {0}")]
    InvalidResolution(f64),

    #[error("Cell ({0}, {1}) is outside of the map")]
    OutOfBounds(i64, i64),

    #[error("Could not access the cost map file: {0}")]
    FileError(std::io::Error),

    #[error("Could not (de)serialise the cost map: {0}")]
    SerdeError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CostMap {
    /// Create a new cost map in which every cell is free space.
    pub fn new(
        size_x: usize,
        size_y: usize,
        resolution_m: f64,
        origin_m: Vector2<f64>,
        frame_id: &str,
    ) -> Result<Self, GridError> {
        if size_x == 0 || size_y == 0 {
            return Err(GridError::InvalidSize(size_x, size_y));
        }
        if !(resolution_m > 0.0) {
            return Err(GridError::InvalidResolution(resolution_m));
        }

        Ok(Self {
            cells: Array2::from_elem((size_x, size_y), FREE_SPACE),
            resolution_m,
            origin_m,
            frame_id: frame_id.into(),
        })
    }

    /// Generate a random cost map using Perlin noise.
    ///
    /// Cells where the noise exceeds `obstacle_threshold` become lethal obstacles. The remaining
    /// cells get a cost scaled linearly from zero up to `max_free_cost` as the noise approaches
    /// the threshold, giving a soft cost gradient around each obstacle.
    pub fn generate_random(
        size_x: usize,
        size_y: usize,
        resolution_m: f64,
        origin_m: Vector2<f64>,
        frame_id: &str,
        perlin_scale: f64,
        seed: u32,
        obstacle_threshold: f64,
        max_free_cost: u8,
    ) -> Result<Self, GridError> {
        let mut map = Self::new(size_x, size_y, resolution_m, origin_m, frame_id)?;

        let perlin = Perlin::new().set_seed(seed);

        let mut num_obstacles = 0usize;
        for ((mx, my), cost) in map.cells.indexed_iter_mut() {
            let pos = origin_m + Vector2::new(mx as f64, my as f64) * resolution_m;
            let value = perlin.get([pos.x * perlin_scale, pos.y * perlin_scale]);

            if value > obstacle_threshold {
                *cost = LETHAL_OBSTACLE;
                num_obstacles += 1;
            }
            else {
                let scaled = util::maths::lin_map(
                    (-1.0, obstacle_threshold),
                    (0.0, max_free_cost as f64),
                    value,
                );
                *cost = util::maths::clamp(scaled, 0.0, max_free_cost as f64) as u8;
            }
        }

        debug!(
            "Generated random {} x {} cost map with {} obstacle cells",
            size_x, size_y, num_obstacles
        );

        Ok(map)
    }

    /// Load a cost map from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GridError> {
        let file = File::open(path).map_err(GridError::FileError)?;
        serde_json::from_reader(file).map_err(GridError::SerdeError)
    }

    /// Save the cost map to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GridError> {
        let file = File::create(path).map_err(GridError::FileError)?;
        serde_json::to_writer(file, self).map_err(GridError::SerdeError)
    }

    /// Set the cost of a single cell.
    pub fn set_cost(&mut self, mx: usize, my: usize, cost: u8) -> Result<(), GridError> {
        match self.cells.get_mut((mx, my)) {
            Some(c) => {
                *c = cost;
                Ok(())
            }
            None => Err(GridError::OutOfBounds(mx as i64, my as i64)),
        }
    }

    /// Set the cost of the cell containing the given world position.
    pub fn set_cost_world(&mut self, world_m: &Vector2<f64>, cost: u8) -> Result<(), GridError> {
        match self.world_to_map(world_m) {
            Some((mx, my)) => self.set_cost(mx, my, cost),
            None => {
                let (mx, my) = self.world_to_map_unbounded(world_m);
                Err(GridError::OutOfBounds(mx, my))
            }
        }
    }

    /// Set every cell whose centre lies within `radius_m` of `centre_m` to `cost`.
    ///
    /// Cells of the disc which fall outside of the map are ignored.
    pub fn fill_disc(&mut self, centre_m: &Vector2<f64>, radius_m: f64, cost: u8) {
        let origin = self.origin_m;
        let res = self.resolution_m;

        for ((mx, my), c) in self.cells.indexed_iter_mut() {
            let pos = origin + Vector2::new(mx as f64 + 0.5, my as f64 + 0.5) * res;
            if (pos - centre_m).norm() <= radius_m {
                *c = cost;
            }
        }
    }
}

impl CostMapAccessor for CostMap {
    fn size_x(&self) -> usize {
        self.cells.nrows()
    }

    fn size_y(&self) -> usize {
        self.cells.ncols()
    }

    fn resolution(&self) -> f64 {
        self.resolution_m
    }

    fn origin(&self) -> Vector2<f64> {
        self.origin_m
    }

    fn cost(&self, mx: usize, my: usize) -> u8 {
        self.cells.get((mx, my)).copied().unwrap_or(NO_INFORMATION)
    }

    fn global_frame(&self) -> &str {
        &self.frame_id
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_coordinate_conversion() {
        let map = CostMap::new(10, 20, 0.1, Vector2::new(-0.5, 1.0), "odom").unwrap();

        assert_eq!(map.size_x(), 10);
        assert_eq!(map.size_y(), 20);
        assert_eq!(map.num_cells(), 200);

        assert_eq!(map.world_to_map(&Vector2::new(-0.5, 1.0)), Some((0, 0)));
        assert_eq!(map.world_to_map(&Vector2::new(0.05, 1.25)), Some((5, 2)));
        assert_eq!(map.world_to_map(&Vector2::new(-0.51, 1.0)), None);
        assert_eq!(map.world_to_map(&Vector2::new(0.0, 3.01)), None);
        assert_eq!(map.world_to_map_unbounded(&Vector2::new(-0.65, 0.95)), (-2, -1));

        let centre = map.map_to_world(5, 2);
        assert!((centre - Vector2::new(0.05, 1.25)).norm() < 1e-9);
        assert_eq!(map.world_to_map(&centre), Some((5, 2)));
    }

    #[test]
    fn test_costs() {
        let mut map = CostMap::new(10, 10, 0.5, Vector2::zeros(), "odom").unwrap();

        map.set_cost(3, 4, LETHAL_OBSTACLE).unwrap();
        assert_eq!(map.cost(3, 4), LETHAL_OBSTACLE);
        assert_eq!(map.cost(4, 3), FREE_SPACE);
        assert_eq!(map.cost(10, 0), NO_INFORMATION);

        assert!(matches!(map.set_cost(10, 0, 1), Err(GridError::OutOfBounds(10, 0))));
        assert!(map.set_cost_world(&Vector2::new(-1.0, 0.0), 1).is_err());

        map.fill_disc(&Vector2::new(2.5, 2.5), 0.6, 100);
        assert_eq!(map.cost(4, 4), 100);
        assert_eq!(map.cost(5, 5), 100);
        assert_eq!(map.cost(4, 5), 100);
        assert_eq!(map.cost(3, 3), FREE_SPACE);
    }

    #[test]
    fn test_invalid_maps() {
        assert!(matches!(
            CostMap::new(0, 10, 0.1, Vector2::zeros(), "odom"),
            Err(GridError::InvalidSize(0, 10))
        ));
        assert!(matches!(
            CostMap::new(10, 10, 0.0, Vector2::zeros(), "odom"),
            Err(GridError::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_random_and_save() {
        let map = CostMap::generate_random(
            40, 30, 0.1, Vector2::new(1.0, 2.0), "odom", 0.8, 7, 0.4, 100
        ).unwrap();

        for mx in 0..map.size_x() {
            for my in 0..map.size_y() {
                let c = map.cost(mx, my);
                assert!(c <= 100 || c == LETHAL_OBSTACLE);
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cost_map.json");
        map.save(&path).unwrap();
        let loaded = CostMap::load(&path).unwrap();

        assert_eq!(loaded.size_x(), 40);
        assert_eq!(loaded.global_frame(), "odom");
        assert_eq!(loaded.origin(), Vector2::new(1.0, 2.0));
        assert_eq!(loaded.cells, map.cells);
    }
}
