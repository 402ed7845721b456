//! # Cost map world model
//!
//! Checks the footprint against the cells of an (inflated) cost map. The robot centre must lie on
//! a cell cheaper than the inscribed cost, and no cell under the footprint outline may be lethal
//! or unknown. The interior of the footprint is not checked, an obstacle small enough to fit
//! inside it without touching the outline is ruled out by the inscribed check on the centre cell.

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector2;

use super::{Observation, WorldModel};
use crate::map::{CostMapAccessor, INSCRIBED_INFLATED_OBSTACLE, LETHAL_OBSTACLE, NO_INFORMATION};
use crate::traj_rollout::footprint::line_cells;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// World model backed by a cost map.
///
/// The cost map is maintained elsewhere, so observation updates are ignored.
pub struct CostMapModel<'a> {
    cost_map: &'a dyn CostMapAccessor,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> CostMapModel<'a> {
    pub fn new(cost_map: &'a dyn CostMapAccessor) -> Self {
        Self { cost_map }
    }

    /// True if the cell is on the map and neither lethal nor unknown.
    fn cell_passable(&self, mx: i64, my: i64) -> bool {
        if mx < 0 || my < 0 {
            return false;
        }

        let (mx, my) = (mx as usize, my as usize);
        if mx >= self.cost_map.size_x() || my >= self.cost_map.size_y() {
            return false;
        }

        let cost = self.cost_map.cost(mx, my);
        cost != LETHAL_OBSTACLE && cost != NO_INFORMATION
    }
}

impl<'a> WorldModel for CostMapModel<'a> {
    fn legal_footprint(
        &self,
        position_m: &Vector2<f64>,
        footprint_m: &[Vector2<f64>],
        _inscribed_radius_m: f64,
        _circumscribed_radius_m: f64,
    ) -> bool {
        let (cx, cy) = match self.cost_map.world_to_map(position_m) {
            Some(c) => c,
            None => return false,
        };

        if self.cost_map.cost(cx, cy) >= INSCRIBED_INFLATED_OBSTACLE {
            return false;
        }

        let vertices: Vec<(i64, i64)> = footprint_m
            .iter()
            .map(|v| self.cost_map.world_to_map_unbounded(v))
            .collect();

        for i in 0..vertices.len() {
            let (x0, y0) = vertices[i];
            let (x1, y1) = vertices[(i + 1) % vertices.len()];

            if !line_cells(x0, y0, x1, y1)
                .into_iter()
                .all(|(x, y)| self.cell_passable(x, y))
            {
                return false;
            }
        }

        true
    }

    fn update_world(&mut self, _observations: &[Observation], _clearing_polygon_m: &[Vector2<f64>]) {}
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
