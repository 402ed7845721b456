//! # Trajectory rollout module
//!
//! Trajectory rollout is the local planner. Every control cycle it is given the robot's pose and
//! velocity, the global plan and a cost map of the area around the robot, and it returns the
//! velocity command to drive for the next cycle.
//!
//! It works by sampling the velocities the robot can reach within a short horizon (the dynamic
//! window), forward simulating each one, and scoring the resulting trajectories. The score of a
//! trajectory combines how far its end point is from the global plan, how far it is from the
//! local goal, and how much occupancy cost it crosses on the way. Both distances come from a
//! distance grid computed by wavefront propagation at the start of each cycle.
//!
//! If no forward motion is possible the planner falls back to rotating on the spot, moving
//! sideways (for holonomic robots) and finally reversing slowly. An oscillation state stops it
//! flip-flopping between opposing fallbacks.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod footprint;
pub mod map_grid;
pub mod oscillation;
pub mod params;
pub mod sampler;
pub mod sim;
pub mod state;
pub mod trajectory;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use map_grid::{MapCell, MapGrid};
pub use oscillation::{Direction, OscillationState};
pub use params::Params;
pub use sampler::Tier;
pub use state::*;
pub use trajectory::{TrajPoint, Trajectory};
