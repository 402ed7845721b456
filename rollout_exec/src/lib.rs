//! # Trajectory rollout library.
//!
//! This library contains the trajectory rollout local planner and the types it needs from the
//! rest of the navigation stack. It allows the executable, benchmarks and other crates in the
//! workspace to access the planner.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Localisation types - the pose and velocity of the robot
pub mod loc;

/// Cost map - the local occupancy grid the planner scores against
pub mod map;

/// Paths - global plans handed to the planner
pub mod path;

/// Trajectory rollout - the local planner itself
pub mod traj_rollout;

/// World models - footprint collision checking against the robot's view of obstacles
pub mod world_model;
