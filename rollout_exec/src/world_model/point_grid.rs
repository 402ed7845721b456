//! # Point grid world model
//!
//! Stores raw obstacle points bucketed into a coarse grid, so that collision checks only look at
//! points near the robot. A footprint check proceeds in three stages:
//!
//! 1. collect the buckets overlapping the square around the circumscribed circle, if there are no
//!    points the footprint is legal,
//! 2. any point inside the square within the inscribed circle is a collision,
//! 3. any remaining point inside the circumscribed square is tested against the polygon itself.

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use log::trace;
use nalgebra::Vector2;

use super::{Observation, WorldModel};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Grid of obstacle point buckets.
#[derive(Debug, Clone)]
pub struct PointGrid {
    resolution_m: f64,
    origin_m: Vector2<f64>,
    width: usize,
    height: usize,
    cells: Vec<Vec<Vector2<f64>>>,

    /// Observed points further than this from their sensor origin are ignored
    max_obstacle_range_m: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PointGrid {
    /// Create an empty grid covering `size_m` from `origin_m`, bucketed at `resolution_m`.
    pub fn new(
        size_m: Vector2<f64>,
        resolution_m: f64,
        origin_m: Vector2<f64>,
        max_obstacle_range_m: f64,
    ) -> Self {
        let width = (size_m.x / resolution_m).max(0.0) as usize;
        let height = (size_m.y / resolution_m).max(0.0) as usize;

        Self {
            resolution_m,
            origin_m,
            width,
            height,
            cells: vec![Vec::new(); width * height],
            max_obstacle_range_m,
        }
    }

    /// Total number of points held in the grid.
    pub fn num_points(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    /// Add a point to the grid. Points outside the grid are dropped.
    pub fn insert(&mut self, point_m: Vector2<f64>) {
        if let Some((gx, gy)) = self.grid_coords(&point_m) {
            let idx = self.grid_index(gx, gy);
            self.cells[idx].push(point_m);
        }
    }

    /// All points in buckets overlapping the box between the two corners. The box is clipped to
    /// the grid, and the result may include points just outside of it.
    pub fn points_in_range(
        &self,
        lower_left_m: &Vector2<f64>,
        upper_right_m: &Vector2<f64>
    ) -> impl Iterator<Item = &Vector2<f64>> + '_ {
        let (x_range, y_range) = match self.bucket_range(lower_left_m, upper_right_m) {
            Some((xr, yr)) => (xr, yr),
            None => ((1, 0), (1, 0)),
        };

        (y_range.0..=y_range.1)
            .flat_map(move |gy| (x_range.0..=x_range.1).map(move |gx| (gx, gy)))
            .filter(move |&(gx, gy)| gx < self.width && gy < self.height)
            .flat_map(move |(gx, gy)| self.cells[self.grid_index(gx, gy)].iter())
    }

    /// Remove every point inside the polygon.
    pub fn remove_points_in_polygon(&mut self, polygon_m: &[Vector2<f64>]) {
        if polygon_m.len() < 3 {
            return;
        }

        let mut lower_left = polygon_m[0];
        let mut upper_right = polygon_m[0];
        for p in polygon_m.iter().skip(1) {
            lower_left = lower_left.inf(p);
            upper_right = upper_right.sup(p);
        }

        let ((x0, x1), (y0, y1)) = match self.bucket_range(&lower_left, &upper_right) {
            Some(r) => r,
            None => return,
        };

        let mut removed = 0;
        for gy in y0..=y1 {
            for gx in x0..=x1 {
                let idx = self.grid_index(gx, gy);
                let before = self.cells[idx].len();
                self.cells[idx].retain(|p| !pt_in_polygon(p, polygon_m));
                removed += before - self.cells[idx].len();
            }
        }

        if removed > 0 {
            trace!("Removed {} points from the point grid", removed);
        }
    }

    fn grid_coords(&self, point_m: &Vector2<f64>) -> Option<(usize, usize)> {
        let rel = (point_m - self.origin_m) / self.resolution_m;

        if rel.x < 0.0 || rel.y < 0.0 {
            return None;
        }

        let (gx, gy) = (rel.x as usize, rel.y as usize);
        if gx >= self.width || gy >= self.height {
            return None;
        }

        Some((gx, gy))
    }

    fn grid_index(&self, gx: usize, gy: usize) -> usize {
        gy * self.width + gx
    }

    /// Inclusive bucket ranges covering the box, clipped to the grid. `None` if the box misses
    /// the grid entirely.
    fn bucket_range(
        &self,
        lower_left_m: &Vector2<f64>,
        upper_right_m: &Vector2<f64>
    ) -> Option<((usize, usize), (usize, usize))> {
        if self.width == 0 || self.height == 0 {
            return None;
        }

        let ll = (lower_left_m - self.origin_m) / self.resolution_m;
        let ur = (upper_right_m - self.origin_m) / self.resolution_m;

        if ur.x < 0.0 || ur.y < 0.0 || ll.x >= self.width as f64 || ll.y >= self.height as f64 {
            return None;
        }

        let clip = |v: f64, max: usize| (v.max(0.0) as usize).min(max - 1);

        Some((
            (clip(ll.x, self.width), clip(ur.x, self.width)),
            (clip(ll.y, self.height), clip(ur.y, self.height)),
        ))
    }
}

impl WorldModel for PointGrid {
    fn legal_footprint(
        &self,
        position_m: &Vector2<f64>,
        footprint_m: &[Vector2<f64>],
        inscribed_radius_m: f64,
        circumscribed_radius_m: f64,
    ) -> bool {
        let c_offset = Vector2::new(circumscribed_radius_m, circumscribed_radius_m);
        let c_lower_left = position_m - c_offset;
        let c_upper_right = position_m + c_offset;

        let i_offset = Vector2::new(inscribed_radius_m, inscribed_radius_m);
        let i_lower_left = position_m - i_offset;
        let i_upper_right = position_m + i_offset;

        let strictly_inside = |p: &Vector2<f64>, ll: &Vector2<f64>, ur: &Vector2<f64>| {
            p.x > ll.x && p.x < ur.x && p.y > ll.y && p.y < ur.y
        };

        for pt in self.points_in_range(&c_lower_left, &c_upper_right) {
            if !strictly_inside(pt, &c_lower_left, &c_upper_right) {
                continue;
            }

            if strictly_inside(pt, &i_lower_left, &i_upper_right) {
                return false;
            }

            if pt_in_polygon(pt, footprint_m) {
                return false;
            }
        }

        true
    }

    fn update_world(&mut self, observations: &[Observation], clearing_polygon_m: &[Vector2<f64>]) {
        self.remove_points_in_polygon(clearing_polygon_m);

        let max_range_sq = self.max_obstacle_range_m * self.max_obstacle_range_m;

        for obs in observations {
            for point in obs.points_m.iter() {
                if (point - obs.origin_m).norm_squared() <= max_range_sq {
                    self.insert(*point);
                }
            }
        }
    }

    fn clear_footprint(&mut self, footprint_m: &[Vector2<f64>]) {
        self.remove_points_in_polygon(footprint_m);
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Orientation of `c` relative to the directed line `a -> b`. Positive if `c` is to the right.
fn orient(a: &Vector2<f64>, b: &Vector2<f64>, c: &Vector2<f64>) -> f64 {
    (a.x - c.x) * (b.y - c.y) - (a.y - c.y) * (b.x - c.x)
}

/// True if the point is inside the convex polygon, i.e. on the same side of every edge.
///
/// Points on an edge count as inside only if they are on the inner side of every other edge.
pub fn pt_in_polygon(pt: &Vector2<f64>, polygon_m: &[Vector2<f64>]) -> bool {
    if polygon_m.len() < 3 {
        return false;
    }

    let mut seen_left = false;
    let mut seen_right = false;

    for i in 0..polygon_m.len() {
        let a = &polygon_m[i];
        let b = &polygon_m[(i + 1) % polygon_m.len()];

        if orient(a, b, pt) < 0.0 {
            seen_left = true;
        }
        else {
            seen_right = true;
        }

        if seen_left && seen_right {
            return false;
        }
    }

    true
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
