//! Core configuration for motionpath-core.
//!
//! Every section defaults independently, so a JSON document only needs the
//! fields it wants to override.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::bvh::AxisMapping;
use crate::error::{MotionError, Result};
use crate::skeleton::Axis;

/// Top-level configuration grouping the per-stage settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub parse: ParseConfig,
    pub fit: FitConfig,
    pub retarget: RetargetConfig,
    pub ik: IkConfig,
    pub footskate: FootskateConfig,
    pub concat: ConcatConfig,
    pub registration: RegistrationConfig,
}

impl Config {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Config =
            serde_json::from_str(s).map_err(|e| MotionError::Config(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MotionError::Config(format!("serialize error: {e}")))
    }

    /// Reject values that would make a stage loop forever or divide by zero.
    pub fn validate(&self) -> Result<()> {
        if !(self.parse.default_frame_time.is_finite() && self.parse.default_frame_time > 0.0) {
            return Err(MotionError::Config(
                "parse.default_frame_time must be > 0".into(),
            ));
        }
        if !(self.retarget.tangent_epsilon.is_finite() && self.retarget.tangent_epsilon >= 0.0) {
            return Err(MotionError::Config(
                "retarget.tangent_epsilon must be >= 0".into(),
            ));
        }
        if self.retarget.world_up.length_squared() < 1e-12 {
            return Err(MotionError::Config("retarget.world_up must be non-zero".into()));
        }
        if self.ik.iterations == 0 {
            return Err(MotionError::Config("ik.iterations must be >= 1".into()));
        }
        if !(self.ik.epsilon.is_finite() && self.ik.epsilon > 0.0) {
            return Err(MotionError::Config("ik.epsilon must be > 0".into()));
        }
        if self.concat.smooth && self.concat.smooth_window == 0 {
            return Err(MotionError::Config(
                "concat.smooth_window must be >= 1 when smoothing".into(),
            ));
        }
        if self.registration.window == 0 {
            return Err(MotionError::Config("registration.window must be >= 1".into()));
        }
        if !(self.registration.unwrap_threshold > 0.0) {
            return Err(MotionError::Config(
                "registration.unwrap_threshold must be > 0".into(),
            ));
        }
        if !(self.registration.min_time_slope > 0.0 && self.registration.min_time_slope <= 1.0) {
            return Err(MotionError::Config(
                "registration.min_time_slope must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParseConfig {
    /// Which file axis feeds each world axis.
    pub axis_mapping: AxisMapping,
    /// Frame time used when the MOTION section has no readable `Frame Time:`.
    pub default_frame_time: f64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            axis_mapping: AxisMapping::default(),
            default_frame_time: 1.0 / 30.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FitConfig {
    /// Collapse the fitted control points onto the ground plane (z = 0).
    pub flatten_z: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetargetConfig {
    /// Tangents shorter than this fall back to the identity orientation.
    pub tangent_epsilon: f64,
    pub world_up: DVec3,
    /// Run the second (reparameterized) correction pass.
    pub reparameterize: bool,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            tangent_epsilon: 1e-3,
            world_up: DVec3::Z,
            reparameterize: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IkConfig {
    pub iterations: u32,
    pub epsilon: f64,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            iterations: 15,
            epsilon: 1e-3,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FootskateConfig {
    /// Height of the ground plane along `up`.
    pub ground_height: f64,
    pub up: Axis,
    /// Keep the knee bend direction by using its current position as pole.
    pub use_pole: bool,
}

impl Default for FootskateConfig {
    fn default() -> Self {
        Self {
            ground_height: 0.0,
            up: Axis::Z,
            use_pole: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConcatConfig {
    /// Ease rotation jumps at the seam; off by default.
    pub smooth: bool,
    /// Frames before and after the seam touched by smoothing.
    pub smooth_window: usize,
}

impl Default for ConcatConfig {
    fn default() -> Self {
        Self {
            smooth: false,
            smooth_window: 30,
        }
    }
}

/// How consecutive alignment angles are made continuous.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnwrap {
    /// Shift by a full turn; the transform itself is unchanged.
    #[default]
    FullTurn,
    /// Shift by a half turn and re-solve the translation so the aligned root
    /// position stays where it was.
    HalfTurn,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Frames per alignment window.
    pub window: usize,
    pub unwrap: AngleUnwrap,
    /// Angle jump (radians) between consecutive steps that triggers unwrapping.
    pub unwrap_threshold: f64,
    /// Steps on each side used to estimate the local slope of the time warp.
    pub rate_window: usize,
    /// Lower clamp for the local time-warp slope.
    pub min_time_slope: f64,
    /// Frame products above this are logged as expensive.
    pub warn_frame_product: usize,
    /// Frame products above this are refused.
    pub max_frame_product: Option<usize>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            window: 5,
            unwrap: AngleUnwrap::FullTurn,
            unwrap_threshold: 3.0,
            rate_window: 2,
            min_time_slope: 0.1,
            warn_frame_product: 250_000,
            max_frame_product: Some(4_000_000),
        }
    }
}
