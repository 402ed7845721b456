//! # Localisation module
//!
//! Localisation itself is provided by the wider navigation stack. This module only defines the
//! pose and velocity types which the local planner consumes every cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The current pose (position and heading in the working frame) of the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// The position of the robot centre in the working frame
    pub position_m: Vector2<f64>,

    /// The heading of the robot (angle to the positive X axis of the working frame)
    pub heading_rad: f64,

    /// The name of the frame this pose is expressed in. Must match the cost map's global frame.
    pub frame_id: String,

    /// The time at which this pose was valid
    pub stamp: DateTime<Utc>,
}

/// The velocity of the robot, expressed in the robot body frame.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    /// Linear velocity, x forwards and y to the left
    pub linear_ms: Vector2<f64>,

    /// Angular velocity about the vertical axis, positive anticlockwise
    pub angular_rads: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Create a new pose stamped with the current time.
    pub fn new(position_m: Vector2<f64>, heading_rad: f64, frame_id: &str) -> Self {
        Self {
            position_m,
            heading_rad,
            frame_id: frame_id.into(),
            stamp: Utc::now(),
        }
    }
}

impl Velocity {
    pub fn new(vx_ms: f64, vy_ms: f64, vth_rads: f64) -> Self {
        Self {
            linear_ms: Vector2::new(vx_ms, vy_ms),
            angular_rads: vth_rads,
        }
    }

    /// The zero velocity, i.e. a stop command.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn vx(&self) -> f64 {
        self.linear_ms.x
    }

    pub fn vy(&self) -> f64 {
        self.linear_ms.y
    }
}

impl Default for Velocity {
    fn default() -> Self {
        Self::zero()
    }
}
