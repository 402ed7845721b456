//! # Trajectory Rollout Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use nalgebra::Vector2;
use rollout_lib::{
    loc::{Pose, Velocity},
    map::{CostMap, FREE_SPACE},
    path::Path,
    traj_rollout::{InputData, MapGrid, Params, TrajRollout},
    world_model::CostMapModel,
};

fn traj_rollout_benchmark(c: &mut Criterion) {
    // ---- Build a random cost map and a plan across it ----

    let mut cost_map = CostMap::generate_random(
        200, 200, 0.05, Vector2::zeros(), "odom", 0.4, 7, 0.45, 100
    ).unwrap();

    let start = Vector2::new(1.0, 5.0);
    let goal = Vector2::new(9.0, 5.0);
    cost_map.fill_disc(&start, 0.6, FREE_SPACE);
    cost_map.fill_disc(&goal, 0.6, FREE_SPACE);

    let plan = Path::direct(start, goal, 0.05).unwrap().points_m;

    let params: Params = util::params::from_str(
        r#"
        sim_time_s = 1.0
        sim_granularity_m = 0.025
        samples_per_dim = 20
        acc_lim_x_mss = 2.5
        acc_lim_y_mss = 2.5
        acc_lim_th_radss = 3.2
        max_vel_x_ms = 0.5
        min_vel_x_ms = 0.1
        max_vel_th_rads = 1.0
        min_vel_th_rads = -1.0
        min_in_place_vel_th_rads = 0.4
        pdist_scale = 0.6
        gdist_scale = 0.8
        occdist_scale = 0.01
        heading_lookahead_m = 0.325
        oscillation_reset_dist_m = 0.05
        holonomic_robot = true
        footprint_m = [[0.3, 0.2], [-0.3, 0.2], [-0.3, -0.2], [0.3, -0.2]]
        inscribed_radius_m = 0.2
        circumscribed_radius_m = 0.361
        "#
    ).unwrap();

    // Bench the distance grid alone
    c.bench_function("MapGrid::set_path_cells", |b| {
        let mut grid = MapGrid::new(200, 200);
        b.iter(|| {
            grid.reset_path_dist();
            grid.set_path_cells(&cost_map, &plan)
        })
    });

    // Bench a full planning cycle
    let mut rollout = TrajRollout::new(params).unwrap();
    let mut world_model = CostMapModel::new(&cost_map);
    let input = InputData {
        pose: Pose::new(start, 0.0, "odom"),
        velocity: Velocity::new(0.2, 0.0, 0.0),
        global_plan: plan.clone(),
        observations: vec![],
    };

    c.bench_function("TrajRollout::find_best_path", |b| {
        b.iter(|| rollout.find_best_path(&input, &cost_map, &mut world_model).unwrap())
    });
}

criterion_group!(benches, traj_rollout_benchmark);
criterion_main!(benches);
