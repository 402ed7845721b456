//! # Path
//!
//! This module defines the global plan handed to the local planner.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A path defining the desired route of the robot, as an ordered list of points in the working
/// frame.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Path {
    pub points_m: Vec<Vector2<f64>>,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("The point separation must be positive, got {0}")]
    InvalidSeparation(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Path {
    /// Create a new empty path
    pub fn new_empty() -> Self {
        Path {
            points_m: Vec::new(),
        }
    }

    /// Produces a direct path between the two position vectors, with each point in the path having
    /// at most the given separation. Both `from` and `to` are included in the path.
    pub fn direct(
        from: Vector2<f64>,
        to: Vector2<f64>,
        point_sep_m: f64,
    ) -> Result<Self, PathError> {
        if !(point_sep_m > 0.0) {
            return Err(PathError::InvalidSeparation(point_sep_m));
        }

        let diff_vec = to - from;
        let dist = diff_vec.norm();

        // If the points are closer than the separation just produce a new path with the from and
        // to being the only points.
        if dist <= point_sep_m {
            return Ok(Path {
                points_m: vec![from, to],
            });
        }

        // Number of whole separations that fit between the points, the remainder goes into the
        // final segment
        let num_steps = (dist / point_sep_m).floor() as usize;
        let delta = point_sep_m / dist * diff_vec;

        let mut points_m: Vec<Vector2<f64>> = (0..=num_steps)
            .map(|i| from + delta * i as f64)
            .collect();

        // Avoid a degenerate zero-length final segment
        if let Some(last) = points_m.last() {
            if (to - last).norm() > 1e-9 {
                points_m.push(to);
            }
        }

        Ok(Path { points_m })
    }

    /// Get the number of points in the path
    pub fn get_num_points(&self) -> usize {
        self.points_m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_m.is_empty()
    }

    /// Get the length of the path
    pub fn get_length(&self) -> Option<f64> {
        if self.points_m.len() < 2 {
            return None;
        }

        Some(
            self.points_m
                .windows(2)
                .map(|w| (w[1] - w[0]).norm())
                .sum()
        )
    }

    /// Returns the portion of the path from the point closest to `position_m` onwards.
    ///
    /// Used to hand the planner only the part of the global plan the robot has not yet passed.
    pub fn remaining_from(&self, position_m: &Vector2<f64>) -> &[Vector2<f64>] {
        let closest = self
            .points_m
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - position_m).norm()))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            });

        match closest {
            Some((i, _)) => &self.points_m[i..],
            None => &self.points_m[..],
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
