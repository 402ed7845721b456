//! # Footprint geometry
//!
//! Orients the robot footprint polygon at a pose and rasterises it into cost map cells. Edges are
//! traced with Bresenham's line algorithm. A filled footprint additionally covers every cell
//! between the lowest and highest edge cell in each column.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;

use nalgebra::{Rotation2, Vector2};

use crate::map::CostMapAccessor;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Rotate the footprint by `heading_rad` and translate it to `position_m`.
pub fn oriented_footprint(
    position_m: &Vector2<f64>,
    heading_rad: f64,
    footprint_m: &[Vector2<f64>]
) -> Vec<Vector2<f64>> {
    let rot = Rotation2::new(heading_rad);

    footprint_m
        .iter()
        .map(|v| position_m + rot * *v)
        .collect()
}

/// Cells on the straight line between two cells, including both ends, using Bresenham's
/// algorithm.
pub fn line_cells(x0: i64, y0: i64, x1: i64, y1: i64) -> Vec<(i64, i64)> {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };

    let mut cells = Vec::with_capacity((dx.max(-dy) + 1) as usize);
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        cells.push((x, y));

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }

    cells
}

/// Rasterise a polygon given in world coordinates into cost map cells.
///
/// All edges are traced, including the closing edge from the last vertex back to the first. If
/// `fill` is set the interior is filled column by column. Cells outside of the map are dropped,
/// and each cell appears at most once.
pub fn polygon_cells(
    cost_map: &dyn CostMapAccessor,
    polygon_m: &[Vector2<f64>],
    fill: bool
) -> Vec<(usize, usize)> {
    if polygon_m.is_empty() {
        return Vec::new();
    }

    let vertices: Vec<(i64, i64)> = polygon_m
        .iter()
        .map(|v| cost_map.world_to_map_unbounded(v))
        .collect();

    let mut cells = Vec::new();
    for i in 0..vertices.len() {
        let (x0, y0) = vertices[i];
        let (x1, y1) = vertices[(i + 1) % vertices.len()];
        cells.extend(line_cells(x0, y0, x1, y1));
    }

    if fill {
        cells = fill_columns(&cells);
    }
    else {
        cells.sort_unstable();
        cells.dedup();
    }

    let (size_x, size_y) = (cost_map.size_x() as i64, cost_map.size_y() as i64);

    cells
        .into_iter()
        .filter(|&(x, y)| x >= 0 && y >= 0 && x < size_x && y < size_y)
        .map(|(x, y)| (x as usize, y as usize))
        .collect()
}

/// World positions of the centres of the filled footprint cells at the given pose.
pub fn footprint_cell_positions(
    cost_map: &dyn CostMapAccessor,
    position_m: &Vector2<f64>,
    heading_rad: f64,
    footprint_m: &[Vector2<f64>]
) -> Vec<Vector2<f64>> {
    let polygon = oriented_footprint(position_m, heading_rad, footprint_m);

    polygon_cells(cost_map, &polygon, true)
        .into_iter()
        .map(|(mx, my)| cost_map.map_to_world(mx, my))
        .collect()
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Fill every column between its lowest and highest outline cell.
fn fill_columns(outline: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut columns: BTreeMap<i64, (i64, i64)> = BTreeMap::new();

    for &(x, y) in outline {
        let span = columns.entry(x).or_insert((y, y));
        span.0 = span.0.min(y);
        span.1 = span.1.max(y);
    }

    columns
        .into_iter()
        .flat_map(|(x, (min_y, max_y))| (min_y..=max_y).map(move |y| (x, y)))
        .collect()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
