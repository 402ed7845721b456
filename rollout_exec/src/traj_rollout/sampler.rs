//! # Velocity space sampler
//!
//! Enumerates the dynamic window around the current velocity and keeps the cheapest feasible
//! trajectory. Tiers are tried in order, later tiers only when the earlier ones found nothing
//! usable:
//!
//! 1. forward arcs across the reachable forward and angular velocities,
//! 2. a small lateral nudge either side (holonomic robots only),
//! 3. rotation on the spot, judged by the goal distance a little ahead of where it leaves the
//!    robot facing,
//! 4. a sweep of lateral velocities (holonomic robots only), judged the same way,
//! 5. a slow reverse, which is returned even if infeasible.
//!
//! Rotations and lateral moves which would reverse a previous one are subject to the
//! [`OscillationState`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, warn};
use nalgebra::Vector2;
use serde::Serialize;

use super::{
    oscillation::{Direction, OscillationState},
    sim::SimContext,
    trajectory::{TrajPoint, Trajectory, TrajectoryPool},
};
use crate::loc::Velocity;
use util::maths::clamp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Forward velocity of the lateral nudge commands
const NUDGE_VX_MS: f64 = 0.1;

/// Lateral velocity of the lateral nudge commands
const NUDGE_VY_MS: f64 = 0.1;

/// Forward velocity of the slow reverse command
const REVERSE_VX_MS: f64 = -0.1;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The sampling tier which produced the chosen trajectory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Tier {
    ForwardArc,
    LateralNudge,
    InPlaceRotation,
    LateralSweep,
    SlowReverse,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The reachable velocity window for this cycle.
#[derive(Debug, Copy, Clone)]
struct Window {
    min_vx: f64,
    dvx: f64,
    min_vth: f64,
    dvth: f64,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Sample the velocity space and leave the chosen trajectory as `pool.best()`.
///
/// Returns the tier which produced the chosen trajectory. Only a [`Tier::SlowReverse`] result
/// may be infeasible.
pub fn create_trajectories(
    ctx: &SimContext,
    oscillation: &mut OscillationState,
    pool: &mut TrajectoryPool,
    start: &TrajPoint,
    vel_now: &Velocity,
) -> Tier {
    let params = ctx.params;
    let position = Vector2::new(start.x_m, start.y_m);
    let window = dynamic_window(ctx, vel_now);

    pool.clear_best();
    let mut tier = Tier::ForwardArc;

    // ---- FORWARD ARCS ----

    let mut vx = window.min_vx;
    for _ in 0..params.samples_per_dim {
        // Straight ahead is always tried explicitly
        ctx.generate_trajectory(start, vel_now, vx, 0.0, 0.0, pool.scratch_mut());
        promote_if_cheaper(pool);

        let mut vth = window.min_vth;
        for _ in 0..params.samples_per_dim - 1 {
            ctx.generate_trajectory(start, vel_now, vx, 0.0, vth, pool.scratch_mut());
            promote_if_cheaper(pool);
            vth += window.dvth;
        }

        vx += window.dvx;
    }

    // ---- LATERAL NUDGE ----

    if params.holonomic_robot {
        for &vy in &[NUDGE_VY_MS, -NUDGE_VY_MS] {
            ctx.generate_trajectory(start, vel_now, NUDGE_VX_MS, vy, 0.0, pool.scratch_mut());
            if promote_if_cheaper(pool) {
                tier = Tier::LateralNudge;
            }
        }
    }

    // ---- IN-PLACE ROTATION ----

    let mut heading_dist = std::f64::MAX;
    let mut vth = window.min_vth;
    for _ in 0..params.samples_per_dim {
        let vth_limited = if vth > 0.0 {
            vth.max(params.min_in_place_vel_th_rads)
        }
        else {
            vth.min(-params.min_in_place_vel_th_rads)
        };

        ctx.generate_trajectory(start, vel_now, 0.0, 0.0, vth_limited, pool.scratch_mut());

        let best = pool.best();
        let scratch = pool.scratch();

        // Rotation wins ties, and always beats a lateral move
        let acceptable = scratch.is_legal()
            && (scratch.cost <= best.cost || !best.is_legal() || best.yv != 0.0)
            && vth.abs() > window.dvth;

        if acceptable {
            if let Some(ahead_dist) = lookahead_goal_dist(ctx, scratch) {
                let allowed = match Direction::of(vth) {
                    Some(dir) => !oscillation.rotation_stuck(dir),
                    None => false,
                };

                if ahead_dist < heading_dist && allowed {
                    pool.promote_scratch();
                    heading_dist = ahead_dist;
                    tier = Tier::InPlaceRotation;
                }
            }
        }

        vth += window.dvth;
    }

    if pool.best().is_legal() {
        oscillation.update(&position, pool.best(), params.oscillation_reset_dist_m);
        debug!("Chose {:?} trajectory {:?}", tier, command_of(pool.best()));
        return tier;
    }

    // ---- LATERAL SWEEP ----

    if params.holonomic_robot {
        let mut heading_dist = std::f64::MAX;

        for &vy in params.y_vels() {
            ctx.generate_trajectory(start, vel_now, 0.0, vy, 0.0, pool.scratch_mut());

            let best = pool.best();
            let scratch = pool.scratch();

            if scratch.is_legal() && (scratch.cost <= best.cost || !best.is_legal()) {
                if let Some(ahead_dist) = lookahead_goal_dist(ctx, scratch) {
                    let allowed = match Direction::of(vy) {
                        Some(dir) => !oscillation.strafe_stuck(dir),
                        None => false,
                    };

                    if ahead_dist < heading_dist && allowed {
                        pool.promote_scratch();
                        heading_dist = ahead_dist;
                        tier = Tier::LateralSweep;
                    }
                }
            }
        }

        if pool.best().is_legal() {
            oscillation.update(&position, pool.best(), params.oscillation_reset_dist_m);
            debug!("Chose {:?} trajectory {:?}", tier, command_of(pool.best()));
            return tier;
        }
    }

    // ---- SLOW REVERSE ----

    ctx.generate_trajectory(start, vel_now, REVERSE_VX_MS, 0.0, 0.0, pool.scratch_mut());
    pool.promote_scratch();
    oscillation.reset(&position);

    if pool.best().is_legal() {
        debug!("No forward, rotation or lateral trajectory found, reversing");
    }
    else {
        warn!("No valid trajectory found, even reversing is infeasible");
    }

    Tier::SlowReverse
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Compute the velocities reachable within one horizon, bounded by the configured limits.
fn dynamic_window(ctx: &SimContext, vel_now: &Velocity) -> Window {
    let p = ctx.params;
    let t = p.sim_time_s;
    let samples = p.samples_per_dim as f64;

    // Both ends are clamped into the limits, so a robot already moving faster than allowed
    // gets a window collapsed onto the nearest limit rather than an inverted one
    let vx_limits = (p.min_vel_x_ms, p.max_vel_x_ms);
    let min_vx = clamp(vel_now.vx() - p.acc_lim_x_mss * t, vx_limits.0, vx_limits.1);
    let max_vx = clamp(vel_now.vx() + p.acc_lim_x_mss * t, vx_limits.0, vx_limits.1);

    let vth_limits = (p.min_vel_th_rads, p.max_vel_th_rads);
    let min_vth = clamp(vel_now.angular_rads - p.acc_lim_th_radss * t, vth_limits.0, vth_limits.1);
    let max_vth = clamp(vel_now.angular_rads + p.acc_lim_th_radss * t, vth_limits.0, vth_limits.1);

    Window {
        min_vx,
        dvx: (max_vx - min_vx) / samples,
        min_vth,
        dvth: (max_vth - min_vth) / (samples - 1.0),
    }
}

/// Replace the best trajectory with the scratch one if it's feasible and strictly cheaper, or if
/// no feasible trajectory has been found yet. Returns true if the scratch was promoted.
fn promote_if_cheaper(pool: &mut TrajectoryPool) -> bool {
    let scratch = pool.scratch();
    let best = pool.best();

    if scratch.is_legal() && (scratch.cost < best.cost || !best.is_legal()) {
        pool.promote_scratch();
        true
    }
    else {
        false
    }
}

/// Goal distance of the cell `heading_lookahead_m` in front of the end of the trajectory, or
/// `None` if that cell is off the map.
fn lookahead_goal_dist(ctx: &SimContext, traj: &Trajectory) -> Option<f64> {
    let end = traj.end_point()?;
    let ahead = Vector2::new(end.x_m, end.y_m)
        + ctx.params.heading_lookahead_m * Vector2::new(end.theta_rad.cos(), end.theta_rad.sin());

    let (mx, my) = ctx.cost_map.world_to_map(&ahead)?;

    ctx.grid.get(mx, my).map(|c| c.goal_dist)
}

fn command_of(traj: &Trajectory) -> (f64, f64, f64) {
    (traj.xv, traj.yv, traj.thetav)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::{CostMap, CostMapAccessor, LETHAL_OBSTACLE};
    use crate::traj_rollout::{params::test::test_params, MapGrid, Params};
    use crate::world_model::{CostMapModel, Observation, WorldModel};

    fn grid_for(map: &CostMap, plan: &[Vector2<f64>]) -> MapGrid {
        let mut grid = MapGrid::new(map.size_x(), map.size_y());
        grid.set_path_cells(map, plan);
        grid
    }

    fn plan(from: Vector2<f64>, to: Vector2<f64>) -> Vec<Vector2<f64>> {
        crate::path::Path::direct(from, to, 0.05).unwrap().points_m
    }

    fn run(
        params: &Params,
        map: &CostMap,
        grid: &MapGrid,
        oscillation: &mut OscillationState,
        start: &TrajPoint,
    ) -> (Tier, Trajectory) {
        let model = CostMapModel::new(map);
        run_with(params, map, grid, &model, oscillation, start, &Velocity::zero())
    }

    fn run_with(
        params: &Params,
        map: &CostMap,
        grid: &MapGrid,
        world_model: &dyn WorldModel,
        oscillation: &mut OscillationState,
        start: &TrajPoint,
        vel_now: &Velocity,
    ) -> (Tier, Trajectory) {
        let ctx = SimContext { params, grid, cost_map: map, world_model };
        let mut pool = TrajectoryPool::new();

        let tier = create_trajectories(&ctx, oscillation, &mut pool, start, vel_now);
        (tier, pool.best().clone())
    }

    /// Only allows poses level with or behind `origin`, or ones at least as far to the side as
    /// they are ahead of it. Every forward arc leaves this region on its first step while
    /// rotations and diagonal moves stay inside it.
    struct ForwardBlocked {
        origin: Vector2<f64>,
    }

    impl WorldModel for ForwardBlocked {
        fn legal_footprint(
            &self,
            position_m: &Vector2<f64>,
            _footprint_m: &[Vector2<f64>],
            _inscribed_radius_m: f64,
            _circumscribed_radius_m: f64,
        ) -> bool {
            let d = position_m - self.origin;
            d.x <= 1e-9 || d.y.abs() >= 0.8 * d.x
        }

        fn update_world(&mut self, _observations: &[Observation], _clearing_polygon_m: &[Vector2<f64>]) {}
    }

    /// Small square robot facing a wall, with the goal off to its left.
    fn facing_wall() -> (CostMap, MapGrid, TrajPoint) {
        let mut map = CostMap::new(100, 100, 0.05, Vector2::zeros(), "odom").unwrap();
        for my in 30..=70 {
            map.set_cost(22, my, LETHAL_OBSTACLE).unwrap();
        }
        let grid = grid_for(&map, &plan(Vector2::new(1.01, 2.51), Vector2::new(1.01, 4.0)));

        (map, grid, TrajPoint { x_m: 1.01, y_m: 2.51, theta_rad: 0.0 })
    }

    #[test]
    fn test_rotates_towards_goal() {
        let params = test_params();
        let (map, grid, start) = facing_wall();
        let mut osc = OscillationState::new();

        let (tier, best) = run(&params, &map, &grid, &mut osc, &start);

        assert_eq!(tier, Tier::InPlaceRotation);
        assert!(best.is_legal());
        assert_eq!(best.xv, 0.0);
        assert!(best.thetav > 0.0);
        assert!(best.thetav.abs() >= params.min_in_place_vel_th_rads);
        assert_eq!(osc.rotating, Some(Direction::Left));
    }

    #[test]
    fn test_stuck_rotation_is_skipped() {
        let params = test_params();
        let (map, grid, start) = facing_wall();
        let mut osc = OscillationState::new();
        osc.stuck_rotate_left = true;

        let (tier, best) = run(&params, &map, &grid, &mut osc, &start);

        assert_eq!(tier, Tier::InPlaceRotation);
        assert!(best.thetav < 0.0);
        assert_eq!(osc.rotating, Some(Direction::Right));
        assert!(osc.stuck_rotate_left);
    }

    #[test]
    fn test_lateral_sweep() {
        let mut params = test_params();
        params.holonomic_robot = true;
        params.footprint_m = vec![
            Vector2::new(0.3, 0.2),
            Vector2::new(-0.3, 0.2),
            Vector2::new(-0.3, -0.2),
            Vector2::new(0.3, -0.2),
        ];
        params.inscribed_radius_m = 0.2;
        params.circumscribed_radius_m = 0.361;

        // A long robot against a wall can neither drive on nor turn, but can slide sideways
        let mut map = CostMap::new(100, 100, 0.05, Vector2::zeros(), "odom").unwrap();
        for my in 30..=70 {
            map.set_cost(47, my, LETHAL_OBSTACLE).unwrap();
        }
        let grid = grid_for(&map, &plan(Vector2::new(1.5, 2.52), Vector2::new(1.5, 4.5)));
        let start = TrajPoint { x_m: 2.02, y_m: 2.52, theta_rad: 0.0 };
        let mut osc = OscillationState::new();

        let (tier, best) = run(&params, &map, &grid, &mut osc, &start);

        assert_eq!(tier, Tier::LateralSweep);
        assert!(best.is_legal());
        assert_eq!((best.xv, best.thetav), (0.0, 0.0));
        assert_eq!(best.yv, 0.3);
        assert_eq!(osc.strafing, Some(Direction::Left));

        // Without lateral motion only the reverse remains
        params.holonomic_robot = false;
        let mut osc = OscillationState::new();
        let (tier, best) = run(&params, &map, &grid, &mut osc, &start);
        assert_eq!(tier, Tier::SlowReverse);
        assert_eq!(best.xv, REVERSE_VX_MS);
    }

    #[test]
    fn test_boxed_in_reverses_infeasibly() {
        let params = test_params();
        let mut map = CostMap::new(100, 100, 0.05, Vector2::zeros(), "odom").unwrap();
        for i in 18..=22 {
            map.set_cost(i, 48, LETHAL_OBSTACLE).unwrap();
            map.set_cost(i, 52, LETHAL_OBSTACLE).unwrap();
        }
        for i in 48..=52 {
            map.set_cost(18, i, LETHAL_OBSTACLE).unwrap();
            map.set_cost(22, i, LETHAL_OBSTACLE).unwrap();
        }
        let grid = grid_for(&map, &plan(Vector2::new(3.0, 2.5), Vector2::new(4.0, 2.5)));
        let start = TrajPoint { x_m: 1.01, y_m: 2.51, theta_rad: 0.0 };

        let mut osc = OscillationState::new();
        osc.stuck_rotate_right = true;
        osc.rotating = Some(Direction::Left);

        let (tier, best) = run(&params, &map, &grid, &mut osc, &start);

        assert_eq!(tier, Tier::SlowReverse);
        assert!(!best.is_legal());
        assert_eq!((best.xv, best.yv, best.thetav), (REVERSE_VX_MS, 0.0, 0.0));
        assert!(!osc.is_set());
    }

    #[test]
    fn test_dynamic_window() {
        let params = test_params();
        let map = CostMap::new(10, 10, 0.05, Vector2::zeros(), "odom").unwrap();
        let grid = MapGrid::new(10, 10);
        let model = CostMapModel::new(&map);
        let ctx = SimContext { params: &params, grid: &grid, cost_map: &map, world_model: &model };

        // From rest the window is limited by the configured velocities
        let w = dynamic_window(&ctx, &Velocity::zero());
        assert!((w.min_vx - 0.1).abs() < 1e-12);
        assert!((w.dvx - 0.4 / 20.0).abs() < 1e-12);
        assert!((w.min_vth + 1.0).abs() < 1e-12);
        assert!((w.dvth - 2.0 / 19.0).abs() < 1e-12);

        // With a short horizon the acceleration limits bind
        let mut params = test_params();
        params.sim_time_s = 0.1;
        let ctx = SimContext { params: &params, grid: &grid, cost_map: &map, world_model: &model };
        let w = dynamic_window(&ctx, &Velocity::new(0.3, 0.0, 0.5));
        assert!((w.min_vx - 0.1).abs() < 1e-12);
        assert!((w.dvx - (0.5 - 0.1) / 20.0).abs() < 1e-12);
        assert!((w.min_vth - 0.18).abs() < 1e-12);
        assert!((w.dvth - (0.82 - 0.18) / 19.0).abs() < 1e-12);
    }

    #[test]
    fn test_window_clamped_when_over_limits() {
        let params = test_params();
        let map = CostMap::new(10, 10, 0.05, Vector2::zeros(), "odom").unwrap();
        let grid = MapGrid::new(10, 10);
        let model = CostMapModel::new(&map);
        let mut short = test_params();
        short.sim_time_s = 0.1;

        for p in vec![&params, &short] {
            let ctx = SimContext { params: p, grid: &grid, cost_map: &map, world_model: &model };

            // Already faster than allowed in both axes
            let w = dynamic_window(&ctx, &Velocity::new(1.0, 0.0, 2.0));
            assert!(w.dvx >= 0.0 && w.dvth >= 0.0);
            assert!(w.min_vx + w.dvx * p.samples_per_dim as f64 <= p.max_vel_x_ms + 1e-12);
            assert!(w.min_vth + w.dvth * (p.samples_per_dim - 1) as f64 <= p.max_vel_th_rads + 1e-12);

            let w = dynamic_window(&ctx, &Velocity::new(0.0, 0.0, -3.0));
            assert!(w.dvth >= 0.0);
            assert!(w.min_vth >= p.min_vel_th_rads - 1e-12);
        }

        // With the short horizon the window collapses onto the limits
        let ctx = SimContext { params: &short, grid: &grid, cost_map: &map, world_model: &model };
        let w = dynamic_window(&ctx, &Velocity::new(1.0, 0.0, 2.0));
        assert!((w.min_vx - 0.5).abs() < 1e-12);
        assert!(w.dvx.abs() < 1e-12);
        assert!((w.min_vth - 1.0).abs() < 1e-12);
        assert!(w.dvth.abs() < 1e-12);
    }

    #[test]
    fn test_commands_respect_limits_when_overspeeding() {
        let mut params = test_params();
        params.sim_time_s = 0.1;
        params.heading_lookahead_m = 100.0;

        let map = CostMap::new(100, 100, 0.05, Vector2::zeros(), "odom").unwrap();
        let grid = grid_for(&map, &plan(Vector2::new(1.01, 2.51), Vector2::new(4.0, 2.51)));
        let model = CostMapModel::new(&map);
        let start = TrajPoint { x_m: 1.01, y_m: 2.51, theta_rad: 0.0 };
        let mut osc = OscillationState::new();

        let (tier, best) = run_with(
            &params, &map, &grid, &model, &mut osc, &start, &Velocity::new(1.0, 0.0, 0.0)
        );

        assert_eq!(tier, Tier::ForwardArc);
        assert!(best.is_legal());
        assert!(best.xv <= params.max_vel_x_ms + 1e-12);
        assert!(best.xv >= params.min_vel_x_ms - 1e-12);
        assert!(best.thetav.abs() <= params.max_vel_th_rads + 1e-12);
    }

    #[test]
    fn test_equal_cost_rotation_wins() {
        let map = CostMap::new(100, 100, 0.05, Vector2::zeros(), "odom").unwrap();
        let grid = grid_for(&map, &plan(Vector2::new(1.01, 2.51), Vector2::new(4.0, 2.51)));
        let start = TrajPoint { x_m: 1.01, y_m: 2.51, theta_rad: 0.0 };

        // With normal weights driving at the goal is cheaper than turning on the spot
        let params = test_params();
        let mut osc = OscillationState::new();
        let (tier, _) = run(&params, &map, &grid, &mut osc, &start);
        assert_eq!(tier, Tier::ForwardArc);

        // With all weights zero every feasible trajectory costs the same, and a rotation with a
        // reachable lookahead takes the tie
        let mut params = test_params();
        params.pdist_scale = 0.0;
        params.gdist_scale = 0.0;
        params.occdist_scale = 0.0;
        let mut osc = OscillationState::new();
        let (tier, best) = run(&params, &map, &grid, &mut osc, &start);

        assert_eq!(tier, Tier::InPlaceRotation);
        assert_eq!(best.cost, 0.0);
        assert_eq!((best.xv, best.yv), (0.0, 0.0));
        assert!(best.thetav.abs() >= params.min_in_place_vel_th_rads);
    }

    #[test]
    fn test_nudge_and_rotation_over_strafe() {
        let mut params = test_params();
        params.holonomic_robot = true;

        let map = CostMap::new(100, 100, 0.05, Vector2::zeros(), "odom").unwrap();
        let grid = grid_for(&map, &plan(Vector2::new(1.01, 2.51), Vector2::new(3.0, 4.5)));
        let start = TrajPoint { x_m: 1.01, y_m: 2.51, theta_rad: 0.0 };
        let model = ForwardBlocked { origin: Vector2::new(start.x_m, start.y_m) };

        // No forward arc is possible and both rotations are stuck, so the nudge is kept
        let mut osc = OscillationState::new();
        osc.stuck_rotate_left = true;
        osc.stuck_rotate_right = true;
        let (tier, nudge) = run_with(
            &params, &map, &grid, &model, &mut osc, &start, &Velocity::zero()
        );

        assert_eq!(tier, Tier::LateralNudge);
        assert!(nudge.is_legal());
        assert_eq!(nudge.xv, NUDGE_VX_MS);
        assert_eq!(nudge.yv, NUDGE_VY_MS);
        assert_eq!(nudge.thetav, 0.0);

        // Free to rotate, a rotation replaces the lateral nudge even though it costs more
        let mut osc = OscillationState::new();
        let (tier, rotation) = run_with(
            &params, &map, &grid, &model, &mut osc, &start, &Velocity::zero()
        );

        assert_eq!(tier, Tier::InPlaceRotation);
        assert!(rotation.is_legal());
        assert_eq!((rotation.xv, rotation.yv), (0.0, 0.0));
        assert!(rotation.cost > nudge.cost);
    }
}
