//! # Oscillation avoidance
//!
//! When no forward trajectory is feasible the planner falls back to turning on the spot or
//! moving sideways. Left unchecked it can flip between opposing fallbacks forever without making
//! any progress. To prevent this the state remembers the direction of the last rotation and the
//! last lateral move. Reversing either of them marks the previous direction as stuck, and stuck
//! directions are not chosen again until the robot has travelled far enough to clear the state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use nalgebra::Vector2;
use serde::Serialize;

use super::trajectory::Trajectory;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Oscillation flags for one episode.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OscillationState {
    /// Direction of the last in-place rotation
    pub rotating: Option<Direction>,

    /// Direction of the last lateral move
    pub strafing: Option<Direction>,

    pub stuck_rotate_left: bool,
    pub stuck_rotate_right: bool,
    pub stuck_strafe_left: bool,
    pub stuck_strafe_right: bool,

    /// Position of the robot when the flags were last cleared
    #[serde(skip)]
    reset_position_m: Option<Vector2<f64>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Direction of a rotation or lateral move. Left is anticlockwise for rotations and towards +y
/// in the body frame for lateral moves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Direction {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Direction {
    /// Direction of a signed velocity, `None` if it is zero.
    pub fn of(velocity: f64) -> Option<Self> {
        if velocity > 0.0 {
            Some(Direction::Left)
        }
        else if velocity < 0.0 {
            Some(Direction::Right)
        }
        else {
            None
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

impl OscillationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if rotating in this direction is currently blocked.
    pub fn rotation_stuck(&self, dir: Direction) -> bool {
        match dir {
            Direction::Left => self.stuck_rotate_left,
            Direction::Right => self.stuck_rotate_right,
        }
    }

    /// True if moving laterally in this direction is currently blocked.
    pub fn strafe_stuck(&self, dir: Direction) -> bool {
        match dir {
            Direction::Left => self.stuck_strafe_left,
            Direction::Right => self.stuck_strafe_right,
        }
    }

    /// True if any flag is set.
    pub fn is_set(&self) -> bool {
        self.rotating.is_some()
            || self.strafing.is_some()
            || self.stuck_rotate_left
            || self.stuck_rotate_right
            || self.stuck_strafe_left
            || self.stuck_strafe_right
    }

    /// Clear every flag and start a new episode at the given position.
    pub fn reset(&mut self, position_m: &Vector2<f64>) {
        *self = Self {
            reset_position_m: Some(*position_m),
            ..Self::default()
        };
    }

    /// Update the flags with the trajectory chosen this cycle.
    ///
    /// If the robot has moved more than `reset_dist_m` since the last reset the flags are
    /// cleared first. Then, if the winner doesn't drive forwards, its rotation (or failing that
    /// its lateral motion) records a direction.
    ///
    /// Clearing before recording means the cycle which crosses the reset distance starts the new
    /// episode with the winner's direction already set, and a reversal on that cycle marks
    /// nothing as stuck.
    pub fn update(&mut self, position_m: &Vector2<f64>, winner: &Trajectory, reset_dist_m: f64) {
        match self.reset_position_m {
            None => self.reset_position_m = Some(*position_m),
            Some(p) => {
                if (position_m - p).norm() > reset_dist_m {
                    if self.is_set() {
                        debug!("Robot has moved {:.3} m, clearing oscillation flags", (position_m - p).norm());
                    }
                    self.reset(position_m);
                }
            }
        }

        if winner.xv > 0.0 {
            return;
        }

        if let Some(dir) = Direction::of(winner.thetav) {
            if self.rotating == Some(dir.opposite()) {
                debug!("Rotation reversed, marking {:?} rotation as stuck", dir.opposite());
                self.set_rotation_stuck(dir.opposite());
            }
            self.rotating = Some(dir);
        }
        else if let Some(dir) = Direction::of(winner.yv) {
            if self.strafing == Some(dir.opposite()) {
                debug!("Lateral motion reversed, marking {:?} as stuck", dir.opposite());
                self.set_strafe_stuck(dir.opposite());
            }
            self.strafing = Some(dir);
        }
    }

    fn set_rotation_stuck(&mut self, dir: Direction) {
        match dir {
            Direction::Left => self.stuck_rotate_left = true,
            Direction::Right => self.stuck_rotate_right = true,
        }
    }

    fn set_strafe_stuck(&mut self, dir: Direction) {
        match dir {
            Direction::Left => self.stuck_strafe_left = true,
            Direction::Right => self.stuck_strafe_right = true,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
