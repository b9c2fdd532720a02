//! FABRIK chain solver with an optional pole constraint.
//!
//! Chains are ordered base first: `positions[0]` is the fixed base and the
//! last entry is the effector. Both slices are scratch buffers owned by the
//! call; the solved positions and rotations are written back into them.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::config::IkConfig;
use crate::error::{MotionError, Result};

/// Bones shorter than this make the chain degenerate.
pub const MIN_BONE_LENGTH: f64 = 1e-9;

/// Fraction of the chain length a straight chain is bent by before iterating.
const BEND_NUDGE: f64 = 1e-2;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    /// Effector ended within `epsilon` of the target.
    pub converged: bool,
    /// Backward/forward passes run; zero when the chain was stretched.
    pub iterations: u32,
    /// Final effector-to-target distance.
    pub error: f64,
    /// Target was out of reach and the chain was laid out straight.
    pub stretched: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkSolver {
    pub iterations: u32,
    pub epsilon: f64,
}

impl Default for IkSolver {
    fn default() -> Self {
        Self::from_config(&IkConfig::default())
    }
}

impl IkSolver {
    pub fn from_config(cfg: &IkConfig) -> Self {
        Self {
            iterations: cfg.iterations,
            epsilon: cfg.epsilon,
        }
    }

    pub fn solve(
        &self,
        positions: &mut [DVec3],
        rotations: &mut [DQuat],
        target: DVec3,
        pole: Option<DVec3>,
    ) -> Result<SolveResult> {
        let n = positions.len();
        if n < 2 {
            return Err(MotionError::InvalidInput(format!(
                "ik chain needs at least 2 joints, got {n}"
            )));
        }
        if rotations.len() != n {
            return Err(MotionError::InvalidInput(format!(
                "{n} joint positions but {} rotations",
                rotations.len()
            )));
        }

        let mut lengths = Vec::with_capacity(n - 1);
        let mut directions = Vec::with_capacity(n - 1);
        for (i, w) in positions.windows(2).enumerate() {
            let bone = w[1] - w[0];
            let length = bone.length();
            if !(length >= MIN_BONE_LENGTH) {
                return Err(MotionError::DegenerateChain { bone: i, length });
            }
            lengths.push(length);
            directions.push(bone / length);
        }
        let total: f64 = lengths.iter().sum();
        let base = positions[0];

        let mut stretched = false;
        let mut iterations = 0;
        if base.distance(target) > total {
            stretched = true;
            let dir = (target - base).normalize();
            for i in 1..n {
                positions[i] = positions[i - 1] + dir * lengths[i - 1];
            }
        } else {
            bend_straight_chain(positions, target, total, pole);
            for k in 0..self.iterations {
                iterations = k + 1;
                // Backward: pin the effector, walk to the base.
                positions[n - 1] = target;
                for i in (0..n - 1).rev() {
                    let dir = (positions[i] - positions[i + 1])
                        .try_normalize()
                        .unwrap_or(-directions[i]);
                    positions[i] = positions[i + 1] + dir * lengths[i];
                }
                let drift = positions[0].distance(base);
                // Forward: re-pin the base, walk to the effector.
                positions[0] = base;
                for i in 1..n {
                    let dir = (positions[i] - positions[i - 1])
                        .try_normalize()
                        .unwrap_or(directions[i - 1]);
                    positions[i] = positions[i - 1] + dir * lengths[i - 1];
                }
                if drift < self.epsilon {
                    break;
                }
            }
        }

        if let Some(pole) = pole {
            apply_pole(positions, pole);
        }

        for i in 0..n - 1 {
            if let Some(dir) = (positions[i + 1] - positions[i]).try_normalize() {
                rotations[i] = DQuat::from_rotation_arc(directions[i], dir) * rotations[i];
            }
        }

        let error = positions[n - 1].distance(target);
        Ok(SolveResult {
            converged: !stretched && error < self.epsilon,
            iterations,
            error,
            stretched,
        })
    }
}

/// A chain lying on the base-target line never bends under FABRIK. Nudge its
/// interior joints sideways, towards the pole when one is given.
fn bend_straight_chain(positions: &mut [DVec3], target: DVec3, total: f64, pole: Option<DVec3>) {
    let n = positions.len();
    let base = positions[0];
    let Some(axis) = (target - base).try_normalize() else {
        return;
    };
    if n < 3 {
        return;
    }
    let off_axis = |q: DVec3| (q - base) - axis * (q - base).dot(axis);
    let straight = positions
        .iter()
        .all(|q| off_axis(*q).length() <= MIN_BONE_LENGTH * total.max(1.0));
    if !straight {
        return;
    }
    let bend = pole
        .and_then(|p| off_axis(p).try_normalize())
        .unwrap_or_else(|| axis.any_orthonormal_vector());
    for q in &mut positions[1..n - 1] {
        *q += bend * (BEND_NUDGE * total);
    }
}

/// Twist each interior joint about the line through its neighbours so it lies
/// on the pole's side. Bone lengths are preserved.
fn apply_pole(positions: &mut [DVec3], pole: DVec3) {
    for i in 1..positions.len() - 1 {
        let prev = positions[i - 1];
        let Some(normal) = (positions[i + 1] - prev).try_normalize() else {
            continue;
        };
        let project = |q: DVec3| q - normal * (q - prev).dot(normal);
        let (Some(va), Some(vb)) = (
            (project(positions[i]) - prev).try_normalize(),
            (project(pole) - prev).try_normalize(),
        ) else {
            continue;
        };
        let mut angle = va.dot(vb).clamp(-1.0, 1.0).acos();
        if normal.dot(va.cross(vb)) < 0.0 {
            angle = -angle;
        }
        positions[i] = DQuat::from_axis_angle(normal, angle) * (positions[i] - prev) + prev;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg() -> (Vec<DVec3>, Vec<DQuat>) {
        (
            vec![
                DVec3::new(0.0, 0.0, 80.0),
                DVec3::new(0.0, 0.0, 40.0),
                DVec3::new(0.0, 0.0, 0.0),
            ],
            vec![DQuat::IDENTITY; 3],
        )
    }

    fn bone_lengths(p: &[DVec3]) -> Vec<f64> {
        p.windows(2).map(|w| w[0].distance(w[1])).collect()
    }

    #[test]
    fn reachable_target_converges() {
        let (mut p, mut r) = leg();
        let solver = IkSolver { iterations: 50, epsilon: 1e-4 };
        let target = DVec3::new(10.0, 0.0, 12.0);
        let res = solver.solve(&mut p, &mut r, target, None).unwrap();
        assert!(res.converged, "{res:?}");
        assert!(!res.stretched);
        assert!(p[2].distance(target) < 1e-4);
        assert!(p[0].abs_diff_eq(DVec3::new(0.0, 0.0, 80.0), 1e-12));
        for l in bone_lengths(&p) {
            assert!((l - 40.0).abs() < 1e-9);
        }
    }

    #[test]
    fn unreachable_target_stretches_towards_it() {
        let (mut p, mut r) = leg();
        let target = DVec3::new(100.0, 0.0, 80.0);
        let res = IkSolver::default().solve(&mut p, &mut r, target, None).unwrap();
        assert!(res.stretched && !res.converged);
        let total: f64 = bone_lengths(&p).iter().sum();
        assert!((total - 80.0).abs() < 1e-9);
        let dir = (p[2] - p[0]).normalize();
        assert!(dir.abs_diff_eq(DVec3::X, 1e-12));
        // The rotation of the first bone maps straight down onto +X.
        assert!((r[0] * DVec3::NEG_Z).abs_diff_eq(DVec3::X, 1e-9));
    }

    #[test]
    fn zero_length_bone_is_degenerate() {
        let mut p = vec![DVec3::ZERO, DVec3::ZERO, DVec3::X];
        let mut r = vec![DQuat::IDENTITY; 3];
        let err = IkSolver::default().solve(&mut p, &mut r, DVec3::Y, None).unwrap_err();
        assert!(matches!(err, MotionError::DegenerateChain { bone: 0, .. }));
    }

    #[test]
    fn pole_keeps_the_knee_on_its_side() {
        let (mut p, mut r) = leg();
        // Bent knee pointing forward (+Y).
        p[1] = DVec3::new(0.0, 10.0, 40.0);
        let pole = DVec3::new(0.0, 50.0, 40.0);
        let solver = IkSolver { iterations: 30, epsilon: 1e-5 };
        let target = DVec3::new(0.0, 0.0, 20.0);
        solver.solve(&mut p, &mut r, target, Some(pole)).unwrap();
        assert!(p[1].y > 0.0, "knee flipped: {}", p[1]);
        assert!(p[2].distance(target) < 1e-3);
    }

    #[test]
    fn mismatched_buffers_rejected() {
        let (mut p, _) = leg();
        let mut r = vec![DQuat::IDENTITY; 2];
        assert!(IkSolver::default().solve(&mut p, &mut r, DVec3::ZERO, None).is_err());
    }
}
