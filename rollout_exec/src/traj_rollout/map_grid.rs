//! # Distance grid
//!
//! The distance grid mirrors the cost map cell for cell. Each cycle it is reset and two distance
//! fields are propagated over it by breadth first wavefronts:
//!
//! - the path distance, the number of cell steps to the nearest cell of the global plan,
//! - the goal distance, the number of cell steps to the local goal (the last plan cell on the
//!   map).
//!
//! Cells the robot centre can never occupy stop the wavefront. They are given the obstacle
//! distance, which equals the number of cells in the grid, so that any trajectory ending on or
//! passing over them is rejected. Cells under the robot's current footprint never stop the
//! wavefront, otherwise a robot touching an obstacle could never plan its way out.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::VecDeque;
use std::ops::{Index, IndexMut};
use std::path::Path;

use log::{debug, trace};
use nalgebra::Vector2;
use serde::Serialize;

use crate::map::{is_obstacle, CostMapAccessor};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Distance held by cells the wavefront has not reached.
pub const UNVISITED: f64 = std::f64::MAX;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single cell of the distance grid.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MapCell {
    /// Steps to the nearest global plan cell
    pub path_dist: f64,

    /// Steps to the local goal cell
    pub goal_dist: f64,

    /// Set once the path wavefront has visited this cell
    pub path_mark: bool,

    /// Set once the goal wavefront has visited this cell
    pub goal_mark: bool,

    /// Set if the robot's footprint covers this cell at the start of the cycle
    pub within_robot: bool,
}

/// The distance grid, stored row major with index `my * size_x + mx`.
#[derive(Debug, Clone)]
pub struct MapGrid {
    size_x: usize,
    size_y: usize,
    cells: Vec<MapCell>,
    local_goal: Option<(usize, usize)>,
}

/// Row of the CSV dump of the grid.
#[derive(Serialize)]
struct CellRecord {
    mx: usize,
    my: usize,
    path_dist: Option<f64>,
    goal_dist: Option<f64>,
    within_robot: bool,
}

/// Which of the two distance fields to propagate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Field {
    Path,
    Goal,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MapCell {
    fn default() -> Self {
        Self {
            path_dist: UNVISITED,
            goal_dist: UNVISITED,
            path_mark: false,
            goal_mark: false,
            within_robot: false,
        }
    }
}

impl MapCell {
    fn dist_mut(&mut self, field: Field) -> (&mut f64, &mut bool) {
        match field {
            Field::Path => (&mut self.path_dist, &mut self.path_mark),
            Field::Goal => (&mut self.goal_dist, &mut self.goal_mark),
        }
    }

    fn dist(&self, field: Field) -> f64 {
        match field {
            Field::Path => self.path_dist,
            Field::Goal => self.goal_dist,
        }
    }
}

impl MapGrid {
    /// Create a new grid of the given size with every cell unvisited.
    pub fn new(size_x: usize, size_y: usize) -> Self {
        Self {
            size_x,
            size_y,
            cells: vec![MapCell::default(); size_x * size_y],
            local_goal: None,
        }
    }

    pub fn size_x(&self) -> usize {
        self.size_x
    }

    pub fn size_y(&self) -> usize {
        self.size_y
    }

    /// Distance given to cells which block the wavefront, and the threshold at or above which a
    /// trajectory is considered impossible.
    pub fn obstacle_dist(&self) -> f64 {
        self.cells.len() as f64
    }

    /// The cell of the local goal found by the last call to `set_path_cells`.
    pub fn local_goal(&self) -> Option<(usize, usize)> {
        self.local_goal
    }

    /// Linear index of the cell `(mx, my)`.
    pub fn index_of(&self, mx: usize, my: usize) -> usize {
        my * self.size_x + mx
    }

    /// Get a cell, or `None` if it is outside the grid.
    pub fn get(&self, mx: usize, my: usize) -> Option<&MapCell> {
        if mx < self.size_x && my < self.size_y {
            Some(&self.cells[self.index_of(mx, my)])
        }
        else {
            None
        }
    }

    /// Resize the grid to match the cost map, resetting all cells if the size changed.
    pub fn ensure_size(&mut self, size_x: usize, size_y: usize) {
        if size_x != self.size_x || size_y != self.size_y {
            debug!(
                "Resizing distance grid from {} x {} to {} x {}",
                self.size_x, self.size_y, size_x, size_y
            );
            *self = Self::new(size_x, size_y);
        }
    }

    /// Reset every cell to unvisited and clear the footprint flags.
    pub fn reset_path_dist(&mut self) {
        for cell in self.cells.iter_mut() {
            *cell = MapCell::default();
        }
        self.local_goal = None;
    }

    /// Flag the given cells as lying under the robot's footprint.
    pub fn mark_within_robot(&mut self, cells: &[(usize, usize)]) {
        for &(mx, my) in cells {
            if mx < self.size_x && my < self.size_y {
                let idx = self.index_of(mx, my);
                self.cells[idx].within_robot = true;
            }
        }
    }

    /// Seed the grid from the global plan and propagate both distance fields.
    ///
    /// Every plan point on the map seeds a path distance of zero. Seeding stops at the first
    /// point which leaves the map after at least one point was on it, the last seeded point
    /// becomes the local goal and seeds a goal distance of zero.
    ///
    /// Returns the number of plan points seeded. If this is zero no distances were propagated and
    /// every cell remains unvisited.
    pub fn set_path_cells(
        &mut self,
        cost_map: &dyn CostMapAccessor,
        global_plan: &[Vector2<f64>]
    ) -> usize {
        let mut num_seeded = 0;
        let mut local_goal = None;

        for point in global_plan {
            match cost_map.world_to_map(point) {
                Some((mx, my)) if mx < self.size_x && my < self.size_y => {
                    let idx = self.index_of(mx, my);
                    let cell = &mut self.cells[idx];
                    cell.path_dist = 0.0;
                    cell.path_mark = true;

                    local_goal = Some((mx, my));
                    num_seeded += 1;
                }
                _ => {
                    if num_seeded > 0 {
                        break;
                    }
                }
            }
        }

        self.local_goal = local_goal;

        let (gx, gy) = match local_goal {
            Some(g) => g,
            None => return 0,
        };

        let goal_idx = self.index_of(gx, gy);
        self.cells[goal_idx].goal_dist = 0.0;
        self.cells[goal_idx].goal_mark = true;

        self.compute_path_distance(cost_map);
        self.compute_goal_distance(cost_map);

        trace!(
            "Seeded {} plan cells, local goal at ({}, {})",
            num_seeded, gx, gy
        );

        num_seeded
    }

    /// Propagate the path distance from all cells with a path distance of zero.
    pub fn compute_path_distance(&mut self, cost_map: &dyn CostMapAccessor) {
        self.propagate(cost_map, Field::Path);
    }

    /// Propagate the goal distance from all cells with a goal distance of zero.
    pub fn compute_goal_distance(&mut self, cost_map: &dyn CostMapAccessor) {
        self.propagate(cost_map, Field::Goal);
    }

    /// Write the distance fields to a CSV file for inspection. Unvisited cells have empty
    /// distances.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;

        let visited = |d: f64| if d == UNVISITED { None } else { Some(d) };

        for my in 0..self.size_y {
            for mx in 0..self.size_x {
                let cell = &self[(mx, my)];
                writer.serialize(CellRecord {
                    mx,
                    my,
                    path_dist: visited(cell.path_dist),
                    goal_dist: visited(cell.goal_dist),
                    within_robot: cell.within_robot,
                })?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    /// Breadth first wavefront over the 4-connected grid.
    fn propagate(&mut self, cost_map: &dyn CostMapAccessor, field: Field) {
        let obstacle_dist = self.obstacle_dist();

        // Seeds are the cells at zero distance, walked in index order so the result does not
        // depend on the plan order
        let mut queue: VecDeque<usize> = self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.dist(field) == 0.0)
            .map(|(i, _)| i)
            .collect();

        while let Some(idx) = queue.pop_front() {
            let current = self.cells[idx].dist(field);
            let (mx, my) = (idx % self.size_x, idx / self.size_x);

            for (nx, ny) in self.neighbours(mx, my) {
                let n_idx = self.index_of(nx, ny);
                let within_robot = self.cells[n_idx].within_robot;
                let (dist, mark) = self.cells[n_idx].dist_mut(field);

                if *mark {
                    continue;
                }
                *mark = true;

                if is_obstacle(cost_map.cost(nx, ny)) && !within_robot {
                    *dist = obstacle_dist;
                    continue;
                }

                *dist = current + 1.0;
                queue.push_back(n_idx);
            }
        }
    }

    /// The in-bounds 4-connected neighbours of a cell.
    fn neighbours(&self, mx: usize, my: usize) -> impl Iterator<Item = (usize, usize)> {
        let (size_x, size_y) = (self.size_x, self.size_y);

        let left = if mx > 0 { Some((mx - 1, my)) } else { None };
        let right = if mx + 1 < size_x { Some((mx + 1, my)) } else { None };
        let down = if my > 0 { Some((mx, my - 1)) } else { None };
        let up = if my + 1 < size_y { Some((mx, my + 1)) } else { None };

        left.into_iter().chain(right).chain(down).chain(up)
    }
}

impl Index<(usize, usize)> for MapGrid {
    type Output = MapCell;

    fn index(&self, (mx, my): (usize, usize)) -> &Self::Output {
        &self.cells[self.index_of(mx, my)]
    }
}

impl IndexMut<(usize, usize)> for MapGrid {
    fn index_mut(&mut self, (mx, my): (usize, usize)) -> &mut Self::Output {
        let idx = self.index_of(mx, my);
        &mut self.cells[idx]
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
