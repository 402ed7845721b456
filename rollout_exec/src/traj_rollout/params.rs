//! Trajectory rollout parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Deserialize;

// Internal
use super::TrajRolloutError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Lateral velocities tried in the lateral sweep if none are configured.
pub const DEFAULT_Y_VELS_MS: [f64; 4] = [-0.3, -0.1, 0.1, 0.3];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for trajectory rollout
#[derive(Deserialize, Debug, Clone)]
pub struct Params {

    // ---- SIMULATION ----

    /// The horizon over which each candidate trajectory is simulated
    pub sim_time_s: f64,

    /// Distance (and angle, in radians) travelled between simulated samples
    pub sim_granularity_m: f64,

    /// Number of samples taken across each velocity dimension of the dynamic window
    pub samples_per_dim: usize,

    // ---- LIMITS ----

    /// Forward acceleration limit
    pub acc_lim_x_mss: f64,

    /// Lateral acceleration limit
    pub acc_lim_y_mss: f64,

    /// Rotational acceleration limit
    pub acc_lim_th_radss: f64,

    pub max_vel_x_ms: f64,

    pub min_vel_x_ms: f64,

    pub max_vel_th_rads: f64,

    pub min_vel_th_rads: f64,

    /// Smallest rotation rate commanded when turning on the spot. Smaller commands don't overcome
    /// static friction.
    pub min_in_place_vel_th_rads: f64,

    // ---- COST WEIGHTS ----

    /// Weight on the distance from the end of the trajectory to the global plan
    pub pdist_scale: f64,

    /// Weight on the distance from the end of the trajectory to the local goal
    pub gdist_scale: f64,

    /// Weight on the sum of cell costs along the trajectory
    pub occdist_scale: f64,

    // ---- BEHAVIOUR ----

    /// Distance ahead of the end of an in-place or lateral trajectory at which progress towards
    /// the goal is judged
    pub heading_lookahead_m: f64,

    /// Distance the robot must travel before the oscillation flags are cleared
    pub oscillation_reset_dist_m: f64,

    /// If true the robot can move sideways, enabling the lateral nudge and lateral sweep
    pub holonomic_robot: bool,

    /// Lateral velocities tried in the lateral sweep, defaults to [`DEFAULT_Y_VELS_MS`] if empty.
    #[serde(default)]
    pub y_vels_ms: Vec<f64>,

    // ---- FOOTPRINT ----

    /// The robot's outline as offsets from the robot centre, in the robot frame
    pub footprint_m: Vec<Vector2<f64>>,

    /// Radius of the largest circle, centred on the robot, that fits inside the footprint
    pub inscribed_radius_m: f64,

    /// Radius of the smallest circle, centred on the robot, that contains the footprint
    pub circumscribed_radius_m: f64,

    // ---- WORLD MODEL ----

    /// Semi-width of the square around the robot which is cleared of stale obstacles each cycle
    #[serde(default = "default_clearing_box_semi_width_m")]
    pub clearing_box_semi_width_m: f64,

    // ---- STOPPED CHECK ----

    /// Translational speed below which the robot is considered stopped
    #[serde(default = "default_trans_stopped_vel_ms")]
    pub trans_stopped_vel_ms: f64,

    /// Rotational speed below which the robot is considered stopped
    #[serde(default = "default_rot_stopped_vel_rads")]
    pub rot_stopped_vel_rads: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters are usable by the planner.
    pub fn validate(&self) -> Result<(), TrajRolloutError> {
        let invalid = |msg: String| Err(TrajRolloutError::InvalidParams(msg));

        if self.footprint_m.len() < 3 {
            return invalid(format!(
                "The footprint must have at least 3 vertices, found {}",
                self.footprint_m.len()
            ));
        }
        if self.samples_per_dim < 2 {
            return invalid(format!(
                "At least 2 samples per dimension are required, found {}",
                self.samples_per_dim
            ));
        }
        if !(self.sim_time_s > 0.0) {
            return invalid(format!("sim_time_s must be positive, found {}", self.sim_time_s));
        }
        if !(self.sim_granularity_m > 0.0) {
            return invalid(format!(
                "sim_granularity_m must be positive, found {}",
                self.sim_granularity_m
            ));
        }
        if self.min_vel_x_ms > self.max_vel_x_ms {
            return invalid(format!(
                "min_vel_x_ms ({}) is greater than max_vel_x_ms ({})",
                self.min_vel_x_ms, self.max_vel_x_ms
            ));
        }
        if self.min_vel_th_rads > self.max_vel_th_rads {
            return invalid(format!(
                "min_vel_th_rads ({}) is greater than max_vel_th_rads ({})",
                self.min_vel_th_rads, self.max_vel_th_rads
            ));
        }
        if self.acc_lim_x_mss < 0.0 || self.acc_lim_y_mss < 0.0 || self.acc_lim_th_radss < 0.0 {
            return invalid("Acceleration limits must not be negative".into());
        }
        // Feasible trajectories must never score below zero
        for (name, weight) in &[
            ("pdist_scale", self.pdist_scale),
            ("gdist_scale", self.gdist_scale),
            ("occdist_scale", self.occdist_scale),
        ] {
            if !(*weight >= 0.0) {
                return invalid(format!("{} must not be negative, found {}", name, weight));
            }
        }
        if self.inscribed_radius_m > self.circumscribed_radius_m {
            return invalid(format!(
                "inscribed_radius_m ({}) is greater than circumscribed_radius_m ({})",
                self.inscribed_radius_m, self.circumscribed_radius_m
            ));
        }

        Ok(())
    }

    /// The lateral velocities to sweep, falling back to the defaults if none are configured.
    pub fn y_vels(&self) -> &[f64] {
        if self.y_vels_ms.is_empty() {
            &DEFAULT_Y_VELS_MS[..]
        }
        else {
            &self.y_vels_ms[..]
        }
    }
}

fn default_clearing_box_semi_width_m() -> f64 {
    2.0
}

fn default_trans_stopped_vel_ms() -> f64 {
    0.1
}

fn default_rot_stopped_vel_rads() -> f64 {
    0.1
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Parameters for a small square differential drive robot, shared by the module tests.
    pub(crate) fn test_params() -> Params {
        Params {
            sim_time_s: 1.0,
            sim_granularity_m: 0.025,
            samples_per_dim: 20,
            acc_lim_x_mss: 2.5,
            acc_lim_y_mss: 2.5,
            acc_lim_th_radss: 3.2,
            max_vel_x_ms: 0.5,
            min_vel_x_ms: 0.1,
            max_vel_th_rads: 1.0,
            min_vel_th_rads: -1.0,
            min_in_place_vel_th_rads: 0.4,
            pdist_scale: 0.6,
            gdist_scale: 0.8,
            occdist_scale: 0.01,
            heading_lookahead_m: 0.325,
            oscillation_reset_dist_m: 0.05,
            holonomic_robot: false,
            y_vels_ms: vec![],
            footprint_m: vec![
                Vector2::new(0.05, 0.05),
                Vector2::new(-0.05, 0.05),
                Vector2::new(-0.05, -0.05),
                Vector2::new(0.05, -0.05),
            ],
            inscribed_radius_m: 0.05,
            circumscribed_radius_m: 0.071,
            clearing_box_semi_width_m: 2.0,
            trans_stopped_vel_ms: 0.1,
            rot_stopped_vel_rads: 0.1,
        }
    }

    #[test]
    fn test_validate() {
        assert!(test_params().validate().is_ok());

        let mut p = test_params();
        p.footprint_m.truncate(2);
        assert!(matches!(p.validate(), Err(TrajRolloutError::InvalidParams(_))));

        let mut p = test_params();
        p.samples_per_dim = 1;
        assert!(p.validate().is_err());

        let mut p = test_params();
        p.min_vel_x_ms = 1.0;
        assert!(p.validate().is_err());

        let mut p = test_params();
        p.sim_granularity_m = 0.0;
        assert!(p.validate().is_err());

        let mut p = test_params();
        p.gdist_scale = -0.8;
        assert!(matches!(p.validate(), Err(TrajRolloutError::InvalidParams(m)) if m.contains("gdist_scale")));

        let mut p = test_params();
        p.occdist_scale = -0.01;
        assert!(p.validate().is_err());

        // Zero weights switch a term off
        let mut p = test_params();
        p.pdist_scale = 0.0;
        p.occdist_scale = 0.0;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_load() {
        let p: Params = util::params::from_str(
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

        assert!(p.validate().is_ok());
        assert_eq!(p.footprint_m[0], Vector2::new(0.3, 0.2));
        assert_eq!(p.y_vels(), &DEFAULT_Y_VELS_MS[..]);
        assert_eq!(p.clearing_box_semi_width_m, 2.0);
    }
}
