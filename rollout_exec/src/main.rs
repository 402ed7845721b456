//! Trajectory rollout executable entry point.
//!
//! # Architecture
//!
//! The executable runs the local planner in closed loop against a simulated robot:
//!
//!     - Initialise the session, logger, parameters and the planner
//!     - Load or generate a cost map and plan a straight global path across it
//!     - Main loop:
//!         - Run one planner cycle from the current simulated pose
//!         - Drive the simulated robot with the chosen command for one cycle period
//!         - Write archives
//!     - Save the final distance grid and footprint for inspection
//!
//! A cost map JSON file may be given as the only argument, otherwise a random map is generated
//! from the parameters in `sim.toml`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::{eyre, WrapErr}, Report};
use log::{debug, info, warn};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::env;

// Internal
use rollout_lib::{
    loc::{Pose, Velocity},
    map::{CostMap, CostMapAccessor, FREE_SPACE},
    path::Path,
    traj_rollout::{sim::compute_new_position, InputData, TrajRollout, TrajRolloutError},
    world_model::CostMapModel,
};
use util::{
    archive::{Archived, Archiver},
    logger::{logger_init, LevelFilter},
    session::{self, Session},
    time,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of integration steps used to move the simulated robot over one cycle.
const SIM_SUBSTEPS: usize = 10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the closed loop simulation
#[derive(Debug, Deserialize)]
struct SimParams {
    /// Period of one planner cycle
    cycle_period_s: f64,

    /// Stop after this many cycles even if the goal hasn't been reached
    max_num_cycles: usize,

    /// Stop after this many consecutive cycles without a valid trajectory
    max_consec_no_traj: usize,

    /// The goal is reached once the robot is this close to it
    goal_tolerance_m: f64,

    start_position_m: Vector2<f64>,
    start_heading_rad: f64,
    goal_position_m: Vector2<f64>,

    /// Separation between points of the global plan
    plan_separation_m: f64,

    // ---- RANDOM MAP ----

    frame_id: String,
    map_num_cells: [usize; 2],
    map_resolution_m: f64,
    map_origin_m: Vector2<f64>,
    perlin_scale: f64,
    perlin_seed: u32,
    obstacle_threshold: f64,
    max_free_cost: u8,

    /// Radius of the area cleared of obstacles around the start and goal
    clear_radius_m: f64,
}

/// Archive row for the simulated robot
#[derive(Serialize)]
struct SimRecord {
    cycle: usize,
    time_s: f64,
    x_m: f64,
    y_m: f64,
    heading_rad: f64,
    dist_to_goal_m: f64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("rollout_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Trajectory Rollout Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let sim_params: SimParams = util::params::load("sim.toml")
        .wrap_err("Could not load sim params")?;

    let mut rollout = TrajRollout::init("traj_rollout.toml")
        .wrap_err("Failed to initialise TrajRollout")?;
    rollout.init_archives(&session)
        .wrap_err("Failed to initialise the TrajRollout archives")?;

    let mut arch_sim = Archiver::from_path(&session, "sim/robot.csv")
        .wrap_err("Failed to initialise the simulation archive")?;

    info!("Parameters loaded");

    // ---- COST MAP ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let mut cost_map = match args.len() {
        1 => CostMap::generate_random(
            sim_params.map_num_cells[0],
            sim_params.map_num_cells[1],
            sim_params.map_resolution_m,
            sim_params.map_origin_m,
            &sim_params.frame_id,
            sim_params.perlin_scale,
            sim_params.perlin_seed,
            sim_params.obstacle_threshold,
            sim_params.max_free_cost,
        ).wrap_err("Failed to generate a random cost map")?,
        2 => {
            info!("Loading cost map from \"{}\"", &args[1]);
            CostMap::load(&args[1]).wrap_err("Failed to load the cost map")?
        }
        n => return Err(eyre!("Expected either zero or one argument, found {}", n - 1)),
    };

    cost_map.fill_disc(&sim_params.start_position_m, sim_params.clear_radius_m, FREE_SPACE);
    cost_map.fill_disc(&sim_params.goal_position_m, sim_params.clear_radius_m, FREE_SPACE);

    info!(
        "Cost map is {} x {} cells at {} m/cell",
        cost_map.size_x(), cost_map.size_y(), cost_map.resolution()
    );
    session.save("cost_map.json", cost_map.clone());

    // ---- GLOBAL PLAN ----

    let global_path = Path::direct(
        sim_params.start_position_m,
        sim_params.goal_position_m,
        sim_params.plan_separation_m,
    ).wrap_err("Failed to plan the global path")?;

    info!(
        "Global path of {} points, {:.2} m long",
        global_path.get_num_points(),
        global_path.get_length().unwrap_or(0.0)
    );
    session.save("global_path.json", global_path.clone());

    // ---- MAIN LOOP ----

    let mut world_model = CostMapModel::new(&cost_map);

    let mut pose = Pose::new(
        sim_params.start_position_m,
        sim_params.start_heading_rad,
        cost_map.global_frame(),
    );
    let mut velocity = Velocity::zero();
    let mut num_consec_no_traj = 0;
    let mut local_plan = Vec::new();

    info!("Beginning main loop\n");

    for cycle in 0..sim_params.max_num_cycles {
        let dist_to_goal_m = (sim_params.goal_position_m - pose.position_m).norm();

        arch_sim.serialise(SimRecord {
            cycle,
            time_s: cycle as f64 * sim_params.cycle_period_s,
            x_m: pose.position_m.x,
            y_m: pose.position_m.y,
            heading_rad: pose.heading_rad,
            dist_to_goal_m,
        }).wrap_err("Failed to write the simulation archive")?;

        if dist_to_goal_m < sim_params.goal_tolerance_m {
            if rollout.is_stopped(&velocity) {
                info!("Goal reached after {} cycles", cycle);
            }
            else {
                info!("Goal reached after {} cycles, stopping the robot", cycle);
            }
            break;
        }

        let input = InputData {
            pose: pose.clone(),
            velocity,
            global_plan: global_path.remaining_from(&pose.position_m).to_vec(),
            observations: vec![],
        };

        let cmd = match rollout.find_best_path(&input, &cost_map, &mut world_model) {
            Ok((output, report)) => {
                if report.no_valid_trajectory {
                    num_consec_no_traj += 1;
                    session::save_with_timestamp("no_valid_traj/report.json", report);
                }
                else {
                    num_consec_no_traj = 0;
                }

                local_plan = output.local_plan;
                output.drive_cmd
            }
            // The robot has been pushed off the map or has no plan, stop and retry next cycle
            Err(TrajRolloutError::EmptyPlan) | Err(TrajRolloutError::PlanOutsideMap) => {
                warn!("No usable global plan remains, stopping");
                Velocity::zero()
            }
            Err(e) => return Err(e).wrap_err("Error during TrajRollout processing"),
        };

        if num_consec_no_traj >= sim_params.max_consec_no_traj {
            warn!(
                "No valid trajectory for {} consecutive cycles, giving up",
                num_consec_no_traj
            );
            break;
        }

        rollout.write().wrap_err("Failed to write the TrajRollout archives")?;

        // ---- SIMULATE ----

        // The robot tracks the command perfectly
        velocity = cmd;
        pose = drive(&pose, &velocity, sim_params.cycle_period_s);
    }

    // ---- SHUTDOWN ----

    if let Some(goal) = rollout.local_goal() {
        info!("Final local goal: ({:.3}, {:.3})", goal.x, goal.y);
    }

    session.save("local_plan.json", local_plan);
    session.save("footprint.json", rollout.draw_footprint(&pose, &cost_map));

    rollout
        .map_grid()
        .save_csv(session.session_root.join("map_grid.csv"))
        .wrap_err("Failed to save the distance grid")?;

    info!(
        "Final pose ({:.3}, {:.3}, {:.3}) after {:.3} s of execution",
        pose.position_m.x, pose.position_m.y, pose.heading_rad,
        session::get_elapsed_seconds()
    );

    session.exit();

    info!("End of execution");

    Ok(())
}

/// Move the pose with a constant body velocity for `period_s`.
fn drive(pose: &Pose, velocity: &Velocity, period_s: f64) -> Pose {
    let dt = period_s / SIM_SUBSTEPS as f64;
    let (mut x, mut y, mut th) = (pose.position_m.x, pose.position_m.y, pose.heading_rad);

    for _ in 0..SIM_SUBSTEPS {
        let (nx, ny, nth) = compute_new_position(
            x, y, th,
            velocity.vx(), velocity.vy(), velocity.angular_rads,
            dt,
        );
        x = nx;
        y = ny;
        th = nth;
    }

    Pose {
        position_m: Vector2::new(x, y),
        heading_rad: util::maths::wrap_to_pi(th),
        frame_id: pose.frame_id.clone(),
        stamp: pose.stamp + time::seconds_to_duration(period_s),
    }
}
