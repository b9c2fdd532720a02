//! Blend weights and the blended clip produced by a registration curve.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::samples::FrameChannels;
use crate::error::{MotionError, Result};
use crate::motion::Motion;
use crate::skeleton::{Axis, ChannelFrame, IDENTITY_FRAME};

/// Weight of motion A over the blend; B gets the complement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "weight", rename_all = "snake_case")]
pub enum BlendWeights {
    /// Fixed crossfade.
    Constant(f64),
    /// A at the start, ramping linearly to B by A's last frame.
    Transition,
}

impl BlendWeights {
    /// Weight of A at fractional frame `frame_a` of a clip with `frames_a`
    /// frames, clamped to `[0, 1]`.
    pub fn weight_a(&self, frame_a: f64, frames_a: usize) -> f64 {
        match *self {
            BlendWeights::Constant(w) => w.clamp(0.0, 1.0),
            BlendWeights::Transition if frames_a < 2 => 1.0,
            BlendWeights::Transition => 1.0 - (frame_a / (frames_a - 1) as f64).clamp(0.0, 1.0),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match *self {
            BlendWeights::Constant(w) if !w.is_finite() => Err(MotionError::InvalidInput(format!(
                "blend weight must be finite, got {w}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Output of [`RegistrationCurve::blend`](super::RegistrationCurve::blend).
#[derive(Clone, Debug, PartialEq)]
pub struct BlendedMotion {
    pub(super) name: String,
    pub(super) joint_names: Vec<String>,
    pub(super) rotation_orders: Vec<[Axis; 3]>,
    pub(super) frames: Vec<FrameChannels>,
    /// Weight of A used for each output frame.
    pub(super) weights: Vec<f64>,
    /// Fractional source frames `(a, b)` sampled for each output frame.
    pub(super) sources: Vec<(f64, f64)>,
}

impl BlendedMotion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[FrameChannels] {
        &self.frames
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn sources(&self) -> &[(f64, f64)] {
        &self.sources
    }

    pub fn root_trajectory(&self) -> Vec<DVec3> {
        self.frames.iter().map(|f| f.root).collect()
    }

    /// Build an editable motion from the blend on a copy of `template`'s
    /// skeleton. Every joint gets the full six channels; the root carries the
    /// blended position, other joints only their blended rotations.
    pub fn to_motion(&self, name: &str, template: &Motion, frame_time: f64) -> Result<Motion> {
        if self.frames.is_empty() {
            return Err(MotionError::DegenerateInput(format!("blend '{}' has no frames", self.name)));
        }
        if !(frame_time.is_finite() && frame_time > 0.0) {
            return Err(MotionError::InvalidInput(format!(
                "frame time must be positive, got {frame_time}"
            )));
        }
        let mut skeleton = template.skeleton().clone();
        let order = skeleton.traversal();
        if order.len() != self.joint_names.len() {
            return Err(MotionError::SkeletonMismatch(format!(
                "template has {} joints, blend has {}",
                order.len(),
                self.joint_names.len()
            )));
        }

        for (k, id) in order.iter().enumerate() {
            let joint = skeleton.joint_mut(*id);
            if joint.name != self.joint_names[k] {
                return Err(MotionError::SkeletonMismatch(format!(
                    "template joint '{}' where the blend has '{}'",
                    joint.name, self.joint_names[k]
                )));
            }
            if joint.layout.rotation_order().map(|s| s.axis) != self.rotation_orders[k] {
                return Err(MotionError::SkeletonMismatch(format!(
                    "joint '{}' rotation order differs from the blend",
                    joint.name
                )));
            }
            let head = joint.local_head;
            let mut frames: Vec<ChannelFrame> = Vec::with_capacity(self.frames.len() + 1);
            frames.push(IDENTITY_FRAME);
            frames.extend(self.frames.iter().map(|f| {
                let t = if k == 0 { f.root - head } else { DVec3::ZERO };
                let r = f.rotations[k];
                [t.x, t.y, t.z, r.x.to_degrees(), r.y.to_degrees(), r.z.to_degrees()]
            }));
            joint.layout = joint.layout.with_all_channels();
            joint.frames = frames;
        }

        log::debug!(
            "blend '{}' converted to motion '{name}' ({} frames)",
            self.name,
            self.frames.len()
        );
        Ok(template.derive(name, skeleton, frame_time))
    }
}
