//! Path-driven retargeting.
//!
//! Each frame gets a rigid correction `P * R * R0^-1 * P0^-1` mapping the
//! original path frame onto the edited one. The correction is used as the
//! root's parent matrix during forward kinematics. A second pass re-derives
//! the edited parameters from the retargeted trajectory's chord lengths so
//! the edited clip keeps uniform timing.

use glam::{DMat3, DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::config::RetargetConfig;
use crate::curve::{chord_length_parameters, CubicBSpline, SplineFit};
use crate::kinematics::root_trajectory;
use crate::skeleton::Skeleton;

/// Output of a full retarget.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetargetOutcome {
    /// One rigid correction per frame.
    pub corrections: Vec<DMat4>,
    /// Parameters the edited spline was sampled at in the final pass.
    pub parameters: Vec<f64>,
    /// Root trajectory after applying `corrections`.
    pub trajectory: Vec<DVec3>,
    pub passes: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Retargeter {
    cfg: RetargetConfig,
}

impl Retargeter {
    pub fn new(cfg: RetargetConfig) -> Self {
        Self { cfg }
    }

    /// Look-at basis for sample `i` of `curve`: columns are right, forward
    /// and up. Near-zero tangents, or tangents parallel to world up, give
    /// identity.
    pub fn orientation(&self, curve: &[DVec3], i: usize) -> DMat4 {
        if curve.len() < 2 {
            return DMat4::IDENTITY;
        }
        let tangent = if i == 0 {
            curve[1] - curve[0]
        } else {
            curve[i] - curve[i - 1]
        };
        if tangent.length() < self.cfg.tangent_epsilon {
            return DMat4::IDENTITY;
        }
        let forward = tangent.normalize();
        let right = forward.cross(self.cfg.world_up);
        if right.length_squared() < 1e-18 {
            return DMat4::IDENTITY;
        }
        let right = right.normalize();
        let up = right.cross(forward);
        DMat4::from_mat3(DMat3::from_cols(right, forward, up))
    }

    /// Corrections mapping the original spline sampled at `original_t` onto
    /// the edited spline sampled at `edited_t`.
    pub fn corrections(
        &self,
        original: &CubicBSpline,
        original_t: &[f64],
        edited: &CubicBSpline,
        edited_t: &[f64],
    ) -> Vec<DMat4> {
        let before = original.evaluate(original_t);
        let after = edited.evaluate(edited_t);
        before
            .iter()
            .zip(&after)
            .enumerate()
            .map(|(i, (p0, p))| {
                let r0 = self.orientation(&before, i);
                let r = self.orientation(&after, i);
                // Orientation bases are orthonormal, so the transpose inverts.
                DMat4::from_translation(*p) * r * r0.transpose() * DMat4::from_translation(-*p0)
            })
            .collect()
    }

    /// Fit, retarget, reparameterize, retarget again.
    pub fn retarget(
        &self,
        skeleton: &Skeleton,
        frames: usize,
        original: &SplineFit,
        edited: &CubicBSpline,
    ) -> RetargetOutcome {
        let t = &original.parameters;
        let mut corrections = self.corrections(&original.spline, t, edited, t);
        let mut trajectory = root_trajectory(skeleton, frames, &corrections);
        let mut parameters = t.clone();
        let mut passes = 1;

        if self.cfg.reparameterize {
            match chord_length_parameters(&trajectory) {
                Ok(t2) => {
                    corrections = self.corrections(&original.spline, t, edited, &t2);
                    trajectory = root_trajectory(skeleton, frames, &corrections);
                    parameters = t2;
                    passes = 2;
                }
                Err(e) => {
                    log::debug!("skipping reparameterization pass: {e}");
                }
            }
        }

        RetargetOutcome {
            corrections,
            parameters,
            trajectory,
            passes,
        }
    }
}
