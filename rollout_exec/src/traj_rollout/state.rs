//! Trajectory rollout module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use super::{
    footprint::{footprint_cell_positions, oriented_footprint, polygon_cells},
    sampler::{create_trajectories, Tier},
    sim::SimContext,
    trajectory::{TrajPoint, TrajectoryPool},
    MapGrid, OscillationState, Params,
};
use crate::loc::{Pose, Velocity};
use crate::map::CostMapAccessor;
use crate::world_model::{Observation, WorldModel};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The trajectory rollout local planner.
pub struct TrajRollout {
    params: Params,

    map_grid: MapGrid,

    pool: TrajectoryPool,

    oscillation: OscillationState,

    /// World position of the local goal found in the last cycle
    local_goal_m: Option<Vector2<f64>>,

    report: StatusReport,
    output: Option<OutputData>,

    arch_report: Archiver,
    arch_drive_cmd: Archiver,
}

/// Input data to the module
#[derive(Debug, Clone)]
pub struct InputData {
    /// Current pose of the robot
    pub pose: Pose,

    /// Current velocity of the robot
    pub velocity: Velocity,

    /// The global plan, in the same frame as the pose
    pub global_plan: Vec<Vector2<f64>>,

    /// Obstacle observations made since the last cycle
    pub observations: Vec<Observation>,
}

/// Output data from the module
#[derive(Debug, Clone, Serialize)]
pub struct OutputData {
    /// The velocity command to execute. Zero if no valid trajectory was found.
    pub drive_cmd: Velocity,

    /// The simulated samples of the chosen trajectory
    pub local_plan: Vec<TrajPoint>,

    /// World position of the local goal
    pub local_goal_m: Option<Vector2<f64>>,
}

/// The status report containing various monitoring quantities.
#[derive(Debug, Default, Copy, Clone, Serialize)]
pub struct StatusReport {
    /// The sampling tier which produced the chosen trajectory
    pub tier: Option<Tier>,

    /// Cost of the chosen trajectory
    pub best_cost: f64,

    /// If true no feasible trajectory was found and the robot has been commanded to stop
    pub no_valid_trajectory: bool,

    /// Number of global plan points seeded into the distance grid
    pub num_seeded_cells: usize,

    /// Number of samples in the chosen trajectory
    pub num_local_plan_points: usize,

    /// If true at least one direction of rotation or lateral motion is blocked
    pub oscillation_stuck: bool,
}

/// Archive row for the drive command
#[derive(Serialize)]
struct DriveCmdRecord {
    vx_ms: f64,
    vy_ms: f64,
    vth_rads: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur during initialisation or processing of the module.
#[derive(Debug, thiserror::Error)]
pub enum TrajRolloutError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(params::LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The global plan contains no points. The robot must be stopped by the caller.
    #[error("The global plan is empty")]
    EmptyPlan,

    /// None of the global plan lies on the cost map. The robot must be stopped by the caller.
    #[error("No point of the global plan lies on the cost map")]
    PlanOutsideMap,

    #[error("The pose is in frame \"{pose_frame}\" but the cost map is in frame \"{map_frame}\"")]
    FrameMismatch {
        pose_frame: String,
        map_frame: String,
    },

    #[error("Could not write the archives: {0}")]
    ArchiveError(ArchiveError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajRollout {
    /// Initialise the TrajRollout module.
    ///
    /// Expected init data is a path to the parameter file, relative to the params directory.
    pub fn init(params_path: &str) -> Result<Self, TrajRolloutError> {
        // Load the parameters
        let params: Params = match params::load(params_path) {
            Ok(p) => p,
            Err(e) => return Err(TrajRolloutError::ParamLoadError(e))
        };

        info!("TrajRollout parameters loaded from {}", params_path);

        Self::new(params)
    }

    /// Create a new planner from already loaded parameters.
    pub fn new(params: Params) -> Result<Self, TrajRolloutError> {
        params.validate()?;

        Ok(Self {
            params,
            map_grid: MapGrid::new(0, 0),
            pool: TrajectoryPool::new(),
            oscillation: OscillationState::new(),
            local_goal_m: None,
            report: StatusReport::default(),
            output: None,
            arch_report: Archiver::default(),
            arch_drive_cmd: Archiver::default(),
        })
    }

    /// Start archiving the status report and drive command into the session.
    pub fn init_archives(&mut self, session: &Session) -> Result<(), TrajRolloutError> {
        self.arch_report = Archiver::from_path(session, "traj_rollout/status_report.csv")
            .map_err(TrajRolloutError::ArchiveError)?;
        self.arch_drive_cmd = Archiver::from_path(session, "traj_rollout/drive_cmd.csv")
            .map_err(TrajRolloutError::ArchiveError)?;

        Ok(())
    }

    /// Run one control cycle, finding the best velocity command to execute.
    ///
    /// Processing involves:
    ///  1. Updating the world model with the new observations, after clearing the area around
    ///     the robot, and clearing the robot's own footprint from it.
    ///  1. Recomputing the distance grid from the global plan.
    ///  1. Sampling and scoring trajectories, see [`create_trajectories`].
    ///
    /// If the plan is empty or entirely off the map an error is returned and the robot must be
    /// stopped. If no feasible trajectory is found the drive command is zero.
    pub fn find_best_path(
        &mut self,
        input: &InputData,
        cost_map: &dyn CostMapAccessor,
        world_model: &mut dyn WorldModel,
    ) -> Result<(OutputData, StatusReport), TrajRolloutError> {

        // Setup cycle data
        self.report = StatusReport::default();
        self.output = None;
        self.local_goal_m = None;

        let pose = &input.pose;
        if pose.frame_id != cost_map.global_frame() {
            return Err(TrajRolloutError::FrameMismatch {
                pose_frame: pose.frame_id.clone(),
                map_frame: cost_map.global_frame().into(),
            });
        }

        // ---- WORLD MODEL UPDATE ----

        let clearing_box = square_around(&pose.position_m, self.params.clearing_box_semi_width_m);
        world_model.update_world(&input.observations, &clearing_box);

        let footprint =
            oriented_footprint(&pose.position_m, pose.heading_rad, &self.params.footprint_m);
        world_model.clear_footprint(&footprint);

        // ---- DISTANCE GRID ----

        self.map_grid.ensure_size(cost_map.size_x(), cost_map.size_y());
        self.map_grid.reset_path_dist();
        self.map_grid.mark_within_robot(&polygon_cells(cost_map, &footprint, true));

        let num_seeded = self.map_grid.set_path_cells(cost_map, &input.global_plan);
        self.report.num_seeded_cells = num_seeded;

        if num_seeded == 0 {
            return if input.global_plan.is_empty() {
                warn!("Global plan is empty, cannot plan a trajectory");
                Err(TrajRolloutError::EmptyPlan)
            }
            else {
                warn!(
                    "None of the {} global plan points lie on the cost map",
                    input.global_plan.len()
                );
                Err(TrajRolloutError::PlanOutsideMap)
            };
        }

        self.local_goal_m = self
            .map_grid
            .local_goal()
            .map(|(mx, my)| cost_map.map_to_world(mx, my));

        trace!("Distance grid computed, local goal at {:?}", self.local_goal_m);

        // ---- TRAJECTORY SAMPLING ----

        let start = TrajPoint {
            x_m: pose.position_m.x,
            y_m: pose.position_m.y,
            theta_rad: pose.heading_rad,
        };

        let ctx = SimContext {
            params: &self.params,
            grid: &self.map_grid,
            cost_map,
            world_model: &*world_model,
        };

        let tier = create_trajectories(
            &ctx,
            &mut self.oscillation,
            &mut self.pool,
            &start,
            &input.velocity,
        );

        // ---- OUTPUT ----

        let best = self.pool.best();

        let drive_cmd = if best.is_legal() {
            Velocity::new(best.xv, best.yv, best.thetav)
        }
        else {
            self.report.no_valid_trajectory = true;
            Velocity::zero()
        };

        self.report.tier = Some(tier);
        self.report.best_cost = best.cost;
        self.report.num_local_plan_points = best.points().len();
        self.report.oscillation_stuck = self.oscillation.stuck_rotate_left
            || self.oscillation.stuck_rotate_right
            || self.oscillation.stuck_strafe_left
            || self.oscillation.stuck_strafe_right;

        let output = OutputData {
            drive_cmd,
            local_plan: best.points().to_vec(),
            local_goal_m: self.local_goal_m,
        };

        debug!(
            "TrajRollout: {:?} cmd ({:.3}, {:.3}, {:.3}) cost {:.3}",
            tier, drive_cmd.vx(), drive_cmd.vy(), drive_cmd.angular_rads, best.cost
        );

        self.output = Some(output.clone());

        Ok((output, self.report))
    }

    /// World position of the local goal found in the last cycle.
    pub fn local_goal(&self) -> Option<Vector2<f64>> {
        self.local_goal_m
    }

    /// World positions of the cells covered by the footprint at the given pose, for display.
    pub fn draw_footprint(&self, pose: &Pose, cost_map: &dyn CostMapAccessor) -> Vec<Vector2<f64>> {
        footprint_cell_positions(
            cost_map,
            &pose.position_m,
            pose.heading_rad,
            &self.params.footprint_m,
        )
    }

    /// True if the velocity is slow enough for the robot to be considered stopped.
    pub fn is_stopped(&self, velocity: &Velocity) -> bool {
        velocity.linear_ms.norm() <= self.params.trans_stopped_vel_ms
            && velocity.angular_rads.abs() <= self.params.rot_stopped_vel_rads
    }

    /// Check the footprint at the given pose against the world model.
    pub fn footprint_legal(
        &self,
        pose: &Pose,
        world_model: &dyn WorldModel,
    ) -> bool {
        if self.params.footprint_m.len() < 3 {
            return false;
        }

        let footprint =
            oriented_footprint(&pose.position_m, pose.heading_rad, &self.params.footprint_m);

        world_model.legal_footprint(
            &pose.position_m,
            &footprint,
            self.params.inscribed_radius_m,
            self.params.circumscribed_radius_m,
        )
    }

    /// The distance grid computed in the last cycle.
    pub fn map_grid(&self) -> &MapGrid {
        &self.map_grid
    }

    pub fn oscillation(&self) -> &OscillationState {
        &self.oscillation
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The status report of the last cycle
    pub fn report(&self) -> StatusReport {
        self.report
    }
}

impl Archived for TrajRollout {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)?;

        let cmd = self
            .output
            .as_ref()
            .map(|o| o.drive_cmd)
            .unwrap_or_else(Velocity::zero);

        self.arch_drive_cmd.serialise(DriveCmdRecord {
            vx_ms: cmd.vx(),
            vy_ms: cmd.vy(),
            vth_rads: cmd.angular_rads,
        })
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Axis aligned square polygon around a point.
fn square_around(centre_m: &Vector2<f64>, semi_width_m: f64) -> Vec<Vector2<f64>> {
    vec![
        centre_m + Vector2::new(-semi_width_m, -semi_width_m),
        centre_m + Vector2::new(semi_width_m, -semi_width_m),
        centre_m + Vector2::new(semi_width_m, semi_width_m),
        centre_m + Vector2::new(-semi_width_m, semi_width_m),
    ]
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::{CostMap, LETHAL_OBSTACLE};
    use crate::path::Path;
    use crate::traj_rollout::params::test::test_params;
    use crate::traj_rollout::map_grid::UNVISITED;
    use crate::traj_rollout::trajectory::{Trajectory, INFEASIBLE_COST};
    use crate::world_model::{CostMapModel, PointGrid};

    const FRAME: &str = "odom";

    fn input(position: Vector2<f64>, heading: f64, plan: Vec<Vector2<f64>>) -> InputData {
        InputData {
            pose: Pose::new(position, heading, FRAME),
            velocity: Velocity::zero(),
            global_plan: plan,
            observations: vec![],
        }
    }

    fn straight_plan(from: Vector2<f64>, to: Vector2<f64>) -> Vec<Vector2<f64>> {
        Path::direct(from, to, 0.05).unwrap().points_m
    }

    #[test]
    fn test_open_space_drives_forward() {
        let map = CostMap::new(140, 100, 0.05, Vector2::zeros(), FRAME).unwrap();
        let mut model = CostMapModel::new(&map);
        let mut rollout = TrajRollout::new(test_params()).unwrap();

        let start = Vector2::new(1.0, 2.5);
        let inp = input(start, 0.0, straight_plan(start, Vector2::new(6.0, 2.5)));

        let (out, report) = rollout.find_best_path(&inp, &map, &mut model).unwrap();

        assert_eq!(report.tier, Some(Tier::ForwardArc));
        assert!(!report.no_valid_trajectory);
        assert!(out.drive_cmd.vx() > 0.0);
        assert!(out.drive_cmd.angular_rads.abs() < 1e-9);
        assert_eq!(out.drive_cmd.vy(), 0.0);

        // Making progress towards the goal at every sample
        let grid = rollout.map_grid();
        let goal_dists: Vec<f64> = out
            .local_plan
            .iter()
            .map(|p| {
                let (mx, my) = map.world_to_map(&Vector2::new(p.x_m, p.y_m)).unwrap();
                grid[(mx, my)].goal_dist
            })
            .collect();
        assert!(goal_dists.len() > 1);
        for w in goal_dists.windows(2) {
            assert!(w[1] <= w[0]);
        }

        let goal = rollout.local_goal().unwrap();
        assert!((goal - Vector2::new(6.0, 2.5)).norm() < 0.05);
    }

    #[test]
    fn test_obstacle_ahead_turns() {
        let mut map = CostMap::new(140, 100, 0.05, Vector2::zeros(), FRAME).unwrap();
        map.set_cost_world(&Vector2::new(1.31, 2.51), LETHAL_OBSTACLE).unwrap();
        let mut model = CostMapModel::new(&map);

        let mut params = test_params();
        params.min_vel_x_ms = 0.3;
        let mut rollout = TrajRollout::new(params).unwrap();

        let start = Vector2::new(1.0, 2.5);
        let inp = input(start, 0.0, straight_plan(start, Vector2::new(6.0, 2.5)));

        let (out, report) = rollout.find_best_path(&inp, &map, &mut model).unwrap();

        assert!(!report.no_valid_trajectory);
        assert!(report.best_cost >= 0.0);
        assert!(out.drive_cmd.angular_rads != 0.0);

        // Every straight ahead command runs into the obstacle
        let ctx = SimContext {
            params: rollout.params(),
            grid: rollout.map_grid(),
            cost_map: &map,
            world_model: &model,
        };
        let from = TrajPoint { x_m: start.x, y_m: start.y, theta_rad: 0.0 };
        let mut traj = Trajectory::default();

        for &vx in &[0.3, 0.4, 0.49] {
            ctx.generate_trajectory(&from, &Velocity::zero(), vx, 0.0, 0.0, &mut traj);
            assert_eq!(traj.cost, INFEASIBLE_COST, "vx = {}", vx);
        }
    }

    #[test]
    fn test_dead_end_reverses() {
        let mut map = CostMap::new(100, 100, 0.05, Vector2::zeros(), FRAME).unwrap();

        // U shaped dead end open towards -x
        for mx in 20..=47 {
            map.set_cost(mx, 45, LETHAL_OBSTACLE).unwrap();
            map.set_cost(mx, 55, LETHAL_OBSTACLE).unwrap();
        }
        for my in 45..=55 {
            map.set_cost(47, my, LETHAL_OBSTACLE).unwrap();
        }
        let mut model = CostMapModel::new(&map);

        let mut params = test_params();
        params.footprint_m = vec![
            Vector2::new(0.3, 0.2),
            Vector2::new(-0.3, 0.2),
            Vector2::new(-0.3, -0.2),
            Vector2::new(0.3, -0.2),
        ];
        params.inscribed_radius_m = 0.2;
        params.circumscribed_radius_m = 0.361;
        let mut rollout = TrajRollout::new(params).unwrap();

        // The goal is on the far side of the dead end
        let inp = input(
            Vector2::new(2.02, 2.52),
            0.0,
            straight_plan(Vector2::new(3.0, 2.52), Vector2::new(4.0, 2.52)),
        );

        let (out, report) = rollout.find_best_path(&inp, &map, &mut model).unwrap();

        assert_eq!(report.tier, Some(Tier::SlowReverse));
        assert!(report.best_cost >= 0.0);
        assert_eq!(out.drive_cmd, Velocity::new(-0.1, 0.0, 0.0));
        assert!(!rollout.oscillation().is_set());
    }

    #[test]
    fn test_degenerate_plans() {
        let map = CostMap::new(40, 40, 0.05, Vector2::zeros(), FRAME).unwrap();
        let mut model = CostMapModel::new(&map);
        let mut rollout = TrajRollout::new(test_params()).unwrap();

        let inp = input(Vector2::new(1.0, 1.0), 0.0, vec![]);
        assert!(matches!(
            rollout.find_best_path(&inp, &map, &mut model),
            Err(TrajRolloutError::EmptyPlan)
        ));
        assert_eq!(rollout.report().num_seeded_cells, 0);

        let grid = rollout.map_grid();
        for mx in 0..40 {
            for my in 0..40 {
                assert_eq!(grid[(mx, my)].path_dist, UNVISITED);
                assert_eq!(grid[(mx, my)].goal_dist, UNVISITED);
            }
        }
        assert!(rollout.local_goal().is_none());

        let inp = input(
            Vector2::new(1.0, 1.0),
            0.0,
            vec![Vector2::new(5.0, 5.0), Vector2::new(-1.0, 0.5)],
        );
        assert!(matches!(
            rollout.find_best_path(&inp, &map, &mut model),
            Err(TrajRolloutError::PlanOutsideMap)
        ));
    }

    #[test]
    fn test_frame_mismatch() {
        let map = CostMap::new(40, 40, 0.05, Vector2::zeros(), "map").unwrap();
        let mut model = CostMapModel::new(&map);
        let mut rollout = TrajRollout::new(test_params()).unwrap();

        let inp = input(Vector2::new(1.0, 1.0), 0.0, vec![Vector2::new(1.5, 1.0)]);
        assert!(matches!(
            rollout.find_best_path(&inp, &map, &mut model),
            Err(TrajRolloutError::FrameMismatch { .. })
        ));
    }

    #[test]
    fn test_point_grid_observations() {
        // The cost map is empty, obstacles come only from observations
        let map = CostMap::new(140, 100, 0.05, Vector2::zeros(), FRAME).unwrap();
        let mut model = PointGrid::new(Vector2::new(7.0, 5.0), 0.1, Vector2::zeros(), 2.5);
        let mut rollout = TrajRollout::new(test_params()).unwrap();

        let start = Vector2::new(1.0, 2.5);
        let mut inp = input(start, 0.0, straight_plan(start, Vector2::new(6.0, 2.5)));

        // A wall of points just in front of the robot
        inp.observations.push(Observation {
            origin_m: start,
            points_m: (0..21).map(|i| Vector2::new(1.1, 2.0 + 0.05 * i as f64)).collect(),
        });

        let (out, report) = rollout.find_best_path(&inp, &map, &mut model).unwrap();

        // No sample gets close enough to the wall for it to enter the inscribed square
        assert!(!report.no_valid_trajectory);
        for p in out.local_plan.iter() {
            assert!(p.x_m <= 1.05 + 1e-9);
        }

        // The wall is forgotten once the robot is told the area is clear
        inp.observations.clear();
        rollout.find_best_path(&inp, &map, &mut model).unwrap();
        assert_eq!(model.num_points(), 0);
    }

    #[test]
    fn test_helpers() {
        let map = CostMap::new(40, 40, 0.05, Vector2::zeros(), FRAME).unwrap();
        let model = CostMapModel::new(&map);
        let rollout = TrajRollout::new(test_params()).unwrap();

        assert!(rollout.is_stopped(&Velocity::new(0.05, 0.0, 0.05)));
        assert!(!rollout.is_stopped(&Velocity::new(0.2, 0.0, 0.0)));
        assert!(!rollout.is_stopped(&Velocity::new(0.0, 0.0, -0.3)));

        let pose = Pose::new(Vector2::new(1.0, 1.0), 0.0, FRAME);
        assert!(rollout.footprint_legal(&pose, &model));
        let cells = rollout.draw_footprint(&pose, &map);
        assert!(!cells.is_empty());
        assert!(cells.iter().all(|c| (c - pose.position_m).norm() < 0.15));

        let mut params = test_params();
        params.samples_per_dim = 0;
        assert!(matches!(TrajRollout::new(params), Err(TrajRolloutError::InvalidParams(_))));
    }
}
