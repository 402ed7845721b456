//! # Map
//!
//! The local planner scores trajectories against a 2D grid of occupancy costs, the cost map.
//! Building and inflating the cost map is the job of the wider navigation stack, so the planner
//! only talks to it through the [`CostMapAccessor`] trait. [`CostMap`] is a simple dense
//! implementation used by the executable, the benchmarks and the tests.
//!
//! Cells are indexed by `(mx, my)` with `mx` along the X axis of the working frame. The world
//! position of cell `(mx, my)` is the centre of the cell:
//! ```text
//!  world = origin + (m + 0.5) * resolution
//! ```

// ------------------------------------------------------------------------------------------------
// MODS
// ------------------------------------------------------------------------------------------------

/// Implements the [`CostMap`] type
mod cost_map;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use cost_map::{CostMap, GridError};

use nalgebra::Vector2;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Cost of a cell known to be free
pub const FREE_SPACE: u8 = 0;

/// Cost of a cell within the inscribed radius of an obstacle. A robot centred here is in
/// collision no matter its orientation.
pub const INSCRIBED_INFLATED_OBSTACLE: u8 = 253;

/// Cost of a cell containing an obstacle
pub const LETHAL_OBSTACLE: u8 = 254;

/// Cost of a cell which has never been observed
pub const NO_INFORMATION: u8 = 255;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Read access to a cost map.
pub trait CostMapAccessor {
    /// Number of cells along the X axis
    fn size_x(&self) -> usize;

    /// Number of cells along the Y axis
    fn size_y(&self) -> usize;

    /// Side length of a (square) cell in meters
    fn resolution(&self) -> f64;

    /// World position of the lower left corner of cell `(0, 0)`
    fn origin(&self) -> Vector2<f64>;

    /// Cost of the given cell. Cells outside the map are reported as [`NO_INFORMATION`].
    fn cost(&self, mx: usize, my: usize) -> u8;

    /// Name of the frame the map is expressed in
    fn global_frame(&self) -> &str;

    /// Total number of cells in the map
    fn num_cells(&self) -> usize {
        self.size_x() * self.size_y()
    }

    /// Convert a world position into the index of the cell containing it, or `None` if the
    /// position is off the map.
    fn world_to_map(&self, world_m: &Vector2<f64>) -> Option<(usize, usize)> {
        let (mx, my) = self.world_to_map_unbounded(world_m);

        if mx < 0 || my < 0 || mx as usize >= self.size_x() || my as usize >= self.size_y() {
            None
        }
        else {
            Some((mx as usize, my as usize))
        }
    }

    /// Convert a world position into a cell index which may lie outside of the map.
    ///
    /// Used when rasterising shapes that are only partially on the map.
    fn world_to_map_unbounded(&self, world_m: &Vector2<f64>) -> (i64, i64) {
        let rel = (world_m - self.origin()) / self.resolution();
        (rel.x.floor() as i64, rel.y.floor() as i64)
    }

    /// World position of the centre of the given cell.
    fn map_to_world(&self, mx: usize, my: usize) -> Vector2<f64> {
        self.origin() + Vector2::new(mx as f64 + 0.5, my as f64 + 0.5) * self.resolution()
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Returns true if the cost marks the cell as something the robot centre may never occupy.
pub fn is_obstacle(cost: u8) -> bool {
    cost == LETHAL_OBSTACLE || cost == INSCRIBED_INFLATED_OBSTACLE || cost == NO_INFORMATION
}
