//! # World model
//!
//! A world model answers one question for the planner: does the robot's footprint, placed at a
//! given pose, collide with anything? Two implementations are provided:
//!
//! - [`CostMapModel`] checks the footprint against the cells of the cost map,
//! - [`PointGrid`] checks it against the raw obstacle points seen by the sensors.

// ------------------------------------------------------------------------------------------------
// MODS
// ------------------------------------------------------------------------------------------------

mod cost_map_model;
mod point_grid;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use cost_map_model::CostMapModel;
pub use point_grid::PointGrid;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A set of obstacle points seen from a single sensor origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Position of the sensor when the points were captured
    pub origin_m: Vector2<f64>,

    /// Obstacle points in the working frame
    pub points_m: Vec<Vector2<f64>>,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Collision checking for the robot footprint.
pub trait WorldModel {
    /// Returns true if the footprint polygon, already oriented and placed with its centre at
    /// `position_m`, is free of obstacles.
    ///
    /// The inscribed and circumscribed radii of the footprint allow implementations to skip the
    /// full polygon check where possible.
    fn legal_footprint(
        &self,
        position_m: &Vector2<f64>,
        footprint_m: &[Vector2<f64>],
        inscribed_radius_m: f64,
        circumscribed_radius_m: f64,
    ) -> bool;

    /// Bring the model up to date with new observations. Obstacles previously seen inside the
    /// clearing polygon are forgotten before the observations are added.
    fn update_world(&mut self, observations: &[Observation], clearing_polygon_m: &[Vector2<f64>]);

    /// Forget any obstacles inside the robot's own footprint.
    fn clear_footprint(&mut self, _footprint_m: &[Vector2<f64>]) {}
}
