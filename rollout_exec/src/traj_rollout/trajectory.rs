//! # Trajectories
//!
//! A trajectory is the result of simulating one constant velocity command over the horizon. The
//! sampler only ever needs two at once: the best found so far and the one being simulated. These
//! are held in a [`TrajectoryPool`] so that their sample buffers are reused from cycle to cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Cost marking a trajectory as infeasible.
pub const INFEASIBLE_COST: f64 = -1.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single simulated pose along a trajectory.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct TrajPoint {
    pub x_m: f64,
    pub y_m: f64,
    pub theta_rad: f64,
}

/// A simulated trajectory and its score.
#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    /// Commanded forward velocity
    pub xv: f64,

    /// Commanded lateral velocity
    pub yv: f64,

    /// Commanded angular velocity
    pub thetav: f64,

    /// Score of the trajectory, lower is better. Negative if infeasible.
    pub cost: f64,

    points: Vec<TrajPoint>,
}

/// Pool of the two trajectory buffers used by the sampler.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryPool {
    buffers: [Trajectory; 2],
    best_idx: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Trajectory {
    fn default() -> Self {
        Self {
            xv: 0.0,
            yv: 0.0,
            thetav: 0.0,
            cost: INFEASIBLE_COST,
            points: Vec::new(),
        }
    }
}

impl Trajectory {
    /// Clear the trajectory ready to simulate a new command, keeping the sample buffer.
    pub fn reset(&mut self, xv: f64, yv: f64, thetav: f64) {
        self.xv = xv;
        self.yv = yv;
        self.thetav = thetav;
        self.cost = INFEASIBLE_COST;
        self.points.clear();
    }

    pub fn add_point(&mut self, x_m: f64, y_m: f64, theta_rad: f64) {
        self.points.push(TrajPoint { x_m, y_m, theta_rad });
    }

    pub fn points(&self) -> &[TrajPoint] {
        &self.points
    }

    pub fn end_point(&self) -> Option<&TrajPoint> {
        self.points.last()
    }

    /// True if the trajectory was found to be feasible.
    pub fn is_legal(&self) -> bool {
        self.cost >= 0.0
    }
}

impl TrajectoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The best trajectory found so far this cycle.
    pub fn best(&self) -> &Trajectory {
        &self.buffers[self.best_idx]
    }

    /// The trajectory which will be overwritten by the next simulation.
    pub fn scratch(&self) -> &Trajectory {
        &self.buffers[1 - self.best_idx]
    }

    pub fn scratch_mut(&mut self) -> &mut Trajectory {
        &mut self.buffers[1 - self.best_idx]
    }

    /// Make the scratch trajectory the best, the old best becomes the scratch.
    pub fn promote_scratch(&mut self) {
        self.best_idx = 1 - self.best_idx;
    }

    /// Mark the best trajectory as infeasible at the start of a new cycle.
    pub fn clear_best(&mut self) {
        let idx = self.best_idx;
        self.buffers[idx].reset(0.0, 0.0, 0.0);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
