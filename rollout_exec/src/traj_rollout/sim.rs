//! # Trajectory simulation and scoring
//!
//! A candidate command is forward simulated from the robot's current pose and velocity. At each
//! step the velocity moves towards the command by at most the acceleration limit, then the pose is
//! integrated with the new velocity. Each simulated pose is checked before it is recorded:
//!
//! 1. it must lie on the cost map,
//! 2. the footprint at that pose must be legal in the world model,
//! 3. both the path and goal distances of its cell must be below the impossible distance.
//!
//! Failing any check rejects the whole trajectory with a cost of `-1`. Otherwise the cost is a
//! weighted sum of the final path distance, the final goal distance and the occupancy costs
//! summed over every sample.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::Vector2;

use super::{
    footprint::oriented_footprint,
    map_grid::MapGrid,
    trajectory::{Trajectory, TrajPoint, INFEASIBLE_COST},
    Params,
};
use crate::loc::Velocity;
use crate::map::CostMapAccessor;
use crate::world_model::WorldModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything a simulation reads, borrowed for the duration of one cycle.
pub struct SimContext<'a> {
    pub params: &'a Params,
    pub grid: &'a MapGrid,
    pub cost_map: &'a dyn CostMapAccessor,
    pub world_model: &'a dyn WorldModel,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> SimContext<'a> {
    /// Simulate the command `(vx_cmd, vy_cmd, vth_cmd)` from `start` with initial velocity
    /// `vel_now`, writing the samples and cost into `traj`.
    pub fn generate_trajectory(
        &self,
        start: &TrajPoint,
        vel_now: &Velocity,
        vx_cmd: f64,
        vy_cmd: f64,
        vth_cmd: f64,
        traj: &mut Trajectory,
    ) {
        let params = self.params;
        let impossible_dist = self.grid.obstacle_dist();

        traj.reset(vx_cmd, vy_cmd, vth_cmd);

        let steps = num_steps(params, vx_cmd, vy_cmd, vth_cmd);
        let dt = params.sim_time_s / steps as f64;

        let (mut x, mut y, mut th) = (start.x_m, start.y_m, start.theta_rad);
        let (mut vx, mut vy, mut vth) = (vel_now.vx(), vel_now.vy(), vel_now.angular_rads);

        let mut path_dist = 0.0;
        let mut goal_dist = 0.0;
        let mut occ_cost = 0.0;

        for _ in 0..steps {
            let position = Vector2::new(x, y);

            let (mx, my) = match self.cost_map.world_to_map(&position) {
                Some(c) => c,
                None => {
                    trace!("({}, {}, {}) rejected: left the map", vx_cmd, vy_cmd, vth_cmd);
                    traj.cost = INFEASIBLE_COST;
                    return;
                }
            };

            if !self.footprint_legal(&position, th) {
                trace!("({}, {}, {}) rejected: footprint in collision", vx_cmd, vy_cmd, vth_cmd);
                traj.cost = INFEASIBLE_COST;
                return;
            }

            occ_cost += self.cost_map.cost(mx, my) as f64;

            let cell = match self.grid.get(mx, my) {
                Some(c) => c,
                None => {
                    traj.cost = INFEASIBLE_COST;
                    return;
                }
            };
            path_dist = cell.path_dist;
            goal_dist = cell.goal_dist;

            if path_dist >= impossible_dist || goal_dist >= impossible_dist {
                trace!("({}, {}, {}) rejected: no path to goal", vx_cmd, vy_cmd, vth_cmd);
                traj.cost = INFEASIBLE_COST;
                return;
            }

            traj.add_point(x, y, th);

            vx = compute_new_velocity(vx_cmd, vx, params.acc_lim_x_mss, dt);
            vy = compute_new_velocity(vy_cmd, vy, params.acc_lim_y_mss, dt);
            vth = compute_new_velocity(vth_cmd, vth, params.acc_lim_th_radss, dt);

            let (nx, ny, nth) = compute_new_position(x, y, th, vx, vy, vth, dt);
            x = nx;
            y = ny;
            th = nth;
        }

        traj.cost = params.pdist_scale * path_dist
            + params.gdist_scale * goal_dist
            + params.occdist_scale * occ_cost;
    }

    /// Check the robot footprint at the given pose against the world model.
    pub fn footprint_legal(&self, position_m: &Vector2<f64>, heading_rad: f64) -> bool {
        // A footprint which isn't a polygon can't be checked
        if self.params.footprint_m.len() < 3 {
            return false;
        }

        let oriented = oriented_footprint(position_m, heading_rad, &self.params.footprint_m);

        self.world_model.legal_footprint(
            position_m,
            &oriented,
            self.params.inscribed_radius_m,
            self.params.circumscribed_radius_m,
        )
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Number of simulation steps for a command, so that no step moves further than the granularity
/// in distance or angle. At least one step is always taken.
pub fn num_steps(params: &Params, vx_cmd: f64, vy_cmd: f64, vth_cmd: f64) -> usize {
    let vmag = vx_cmd.hypot(vy_cmd);
    let raw = (vmag * params.sim_time_s / params.sim_granularity_m)
        .max(vth_cmd.abs() / params.sim_granularity_m);

    // Tolerance stops ratios such as 0.5 / 0.025 rounding up to an extra step
    ((raw - 1e-9).ceil().max(1.0)) as usize
}

/// Step a velocity towards the goal velocity by at most `acc * dt`.
pub fn compute_new_velocity(v_goal: f64, v_now: f64, acc: f64, dt: f64) -> f64 {
    if v_goal >= v_now {
        v_goal.min(v_now + acc * dt)
    }
    else {
        v_goal.max(v_now - acc * dt)
    }
}

/// Integrate the pose over `dt` with body frame velocities `(vx, vy, vth)`.
pub fn compute_new_position(
    x: f64,
    y: f64,
    th: f64,
    vx: f64,
    vy: f64,
    vth: f64,
    dt: f64,
) -> (f64, f64, f64) {
    let (sin, cos) = th.sin_cos();

    (
        x + (vx * cos - vy * sin) * dt,
        y + (vx * sin + vy * cos) * dt,
        th + vth * dt,
    )
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
