//! Per-frame channel and marker samples of a motion, the input to
//! registration.

use glam::DVec3;

use crate::error::{MotionError, Result};
use crate::host::FrameEvaluator;
use crate::interp::{lerp_vec3, split_index};
use crate::kinematics::Pose;
use crate::motion::Motion;
use crate::skeleton::{Axis, MarkerKind, Skeleton};

/// Root position and joint rotations (radians, x/y/z components) of one
/// frame. `rotations[0]` belongs to the root; the rest follow the skeleton
/// traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameChannels {
    pub root: DVec3,
    pub rotations: Vec<DVec3>,
}

impl FrameChannels {
    pub fn lerp(&self, other: &FrameChannels, t: f64) -> FrameChannels {
        FrameChannels {
            root: lerp_vec3(self.root, other.root, t),
            rotations: self
                .rotations
                .iter()
                .zip(&other.rotations)
                .map(|(a, b)| lerp_vec3(*a, *b, t))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotionSamples {
    joint_names: Vec<String>,
    rotation_orders: Vec<[Axis; 3]>,
    channels: Vec<FrameChannels>,
    positions: Vec<Vec<DVec3>>,
    /// Joint name and end of each marker column; empty when the positions
    /// came from opaque host handles.
    marker_keys: Vec<(String, MarkerKind)>,
}

impl MotionSamples {
    /// Sample a motion with its path edit applied; marker positions come
    /// from forward kinematics.
    pub fn from_motion(motion: &Motion) -> Self {
        let skeleton = motion.baked_skeleton();
        let markers = skeleton.markers();
        let frames = motion.frame_count();
        let positions = (0..frames)
            .map(|f| Pose::evaluate(&skeleton, f, glam::DMat4::IDENTITY).marker_positions(&markers))
            .collect();
        let mut samples = Self::with_positions(&skeleton, frames, positions);
        samples.marker_keys = markers
            .iter()
            .map(|m| (skeleton.joint(m.joint).name.clone(), m.kind))
            .collect();
        samples
    }

    /// Sample channels from `motion` and marker positions from a host
    /// evaluator. Every frame must report one position per handle.
    pub fn from_evaluator<E: FrameEvaluator>(motion: &Motion, evaluator: &mut E, handles: &[E::Handle]) -> Result<Self> {
        if handles.is_empty() {
            return Err(MotionError::InvalidInput("no handles to evaluate".into()));
        }
        let frames = motion.frame_count();
        let mut positions = Vec::with_capacity(frames);
        for f in 0..frames {
            let p = evaluator.positions_at(f, handles)?;
            if p.len() != handles.len() {
                return Err(MotionError::InvalidInput(format!(
                    "evaluator returned {} positions for {} handles at frame {f}",
                    p.len(),
                    handles.len()
                )));
            }
            positions.push(p);
        }
        Ok(Self::with_positions(&motion.baked_skeleton(), frames, positions))
    }

    fn with_positions(skeleton: &Skeleton, frames: usize, positions: Vec<Vec<DVec3>>) -> Self {
        let order = skeleton.traversal();
        let root = skeleton.root_joint();
        let channels = (0..frames)
            .map(|f| {
                let data = root.channels_at(f);
                FrameChannels {
                    root: root.local_head + root.layout.translation(data),
                    rotations: order
                        .iter()
                        .map(|id| {
                            let d = skeleton.joint(*id).channels_at(f);
                            DVec3::new(d[3], d[4], d[5]) * (std::f64::consts::PI / 180.0)
                        })
                        .collect(),
                }
            })
            .collect();
        Self {
            joint_names: order.iter().map(|id| skeleton.joint(*id).name.clone()).collect(),
            rotation_orders: order
                .iter()
                .map(|id| skeleton.joint(*id).layout.rotation_order().map(|s| s.axis))
                .collect(),
            channels,
            positions,
            marker_keys: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    pub fn rotation_orders(&self) -> &[[Axis; 3]] {
        &self.rotation_orders
    }

    pub fn channels(&self) -> &[FrameChannels] {
        &self.channels
    }

    pub fn positions(&self) -> &[Vec<DVec3>] {
        &self.positions
    }

    /// Channels at a fractional frame, clamped to the clip.
    pub fn channels_at(&self, frame: f64) -> FrameChannels {
        let (i0, i1, t) = split_index(frame, self.channels.len());
        self.channels[i0].lerp(&self.channels[i1], t)
    }

    /// Reorder joints and markers to follow `reference` by name. Sibling
    /// order may differ between the two skeletons; a joint or marker missing
    /// from either side is a mismatch.
    pub fn in_joint_order_of(self, reference: &MotionSamples) -> Result<Self> {
        if self.joint_names == reference.joint_names {
            return Ok(self);
        }
        if self.joint_names.len() != reference.joint_names.len() {
            return Err(MotionError::SkeletonMismatch(format!(
                "{} joints vs {}",
                reference.joint_names.len(),
                self.joint_names.len()
            )));
        }
        let joint_map = reference
            .joint_names
            .iter()
            .map(|name| {
                self.joint_names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| MotionError::SkeletonMismatch(format!("joint '{name}' is missing")))
            })
            .collect::<Result<Vec<_>>>()?;

        if self.marker_keys.is_empty() || reference.marker_keys.is_empty() {
            return Err(MotionError::SkeletonMismatch(
                "joint orders differ and host markers cannot be matched by name".into(),
            ));
        }
        let marker_map = reference
            .marker_keys
            .iter()
            .map(|key| {
                self.marker_keys.iter().position(|k| k == key).ok_or_else(|| {
                    MotionError::SkeletonMismatch(format!("marker {:?} of '{}' is missing", key.1, key.0))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let channels = self
            .channels
            .iter()
            .map(|c| FrameChannels {
                root: c.root,
                rotations: joint_map.iter().map(|&k| c.rotations[k]).collect(),
            })
            .collect();
        let positions = self
            .positions
            .iter()
            .map(|frame| marker_map.iter().map(|&k| frame[k]).collect())
            .collect();
        Ok(Self {
            joint_names: reference.joint_names.clone(),
            rotation_orders: joint_map.iter().map(|&k| self.rotation_orders[k]).collect(),
            channels,
            positions,
            marker_keys: reference.marker_keys.clone(),
        })
    }

    /// Checks that two sample sets can be blended: same joints in the same
    /// order with the same rotation orders, and the same marker count.
    pub fn check_blendable(&self, other: &MotionSamples) -> Result<()> {
        if self.is_empty() || other.is_empty() {
            return Err(MotionError::DegenerateInput("cannot register an empty clip".into()));
        }
        if self.joint_names != other.joint_names {
            return Err(MotionError::SkeletonMismatch(
                "joint traversal orders differ".into(),
            ));
        }
        if let Some(k) = (0..self.rotation_orders.len()).find(|k| self.rotation_orders[*k] != other.rotation_orders[*k]) {
            return Err(MotionError::SkeletonMismatch(format!(
                "joint '{}' uses rotation order {:?} vs {:?}",
                self.joint_names[k], self.rotation_orders[k], other.rotation_orders[k]
            )));
        }
        let markers = |s: &MotionSamples| s.positions.first().map_or(0, Vec::len);
        if markers(self) != markers(other) || markers(self) == 0 {
            return Err(MotionError::SkeletonMismatch(format!(
                "{} markers vs {}",
                markers(self),
                markers(other)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::host::PoseEvaluator;

    const CLIP: &str = "HIERARCHY
ROOT Hips
{
  OFFSET 1 2 3
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT Chest
  {
    OFFSET 0 10 0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0 5 0
    }
  }
}
MOTION
Frames: 2
Frame Time: 0.04
0 0 0 0 0 0 90 0 0
0 0 1 0 0 0 0 0 45
";

    #[test]
    fn samples_follow_traversal_in_radians() {
        let motion = Motion::from_bvh_str("clip", CLIP, &Config::default()).unwrap();
        let s = MotionSamples::from_motion(&motion);
        assert_eq!(s.len(), 2);
        assert_eq!(s.joint_names(), &["Hips".to_string(), "Chest".to_string()]);
        // Two joints plus one leaf tail.
        assert_eq!(s.positions()[0].len(), 3);
        let chest = s.channels()[0].rotations[1];
        assert!((chest.length() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!(s.channels()[1].root.abs_diff_eq(motion.root_trajectory()[1], 1e-12));
    }

    #[test]
    fn fractional_frames_interpolate() {
        let motion = Motion::from_bvh_str("clip", CLIP, &Config::default()).unwrap();
        let s = MotionSamples::from_motion(&motion);
        let mid = s.channels_at(0.5);
        let expected = (s.channels()[0].root + s.channels()[1].root) * 0.5;
        assert!(mid.root.abs_diff_eq(expected, 1e-12));
    }

    #[test]
    fn evaluator_positions_match_fk() {
        let motion = Motion::from_bvh_str("clip", CLIP, &Config::default()).unwrap();
        let markers = motion.skeleton().markers();
        let host = MotionSamples::from_evaluator(&motion, &mut PoseEvaluator::new(&motion), &markers).unwrap();
        let fk = MotionSamples::from_motion(&motion);
        for (a, b) in host.positions().iter().zip(fk.positions()) {
            for (p, q) in a.iter().zip(b) {
                assert!(p.abs_diff_eq(*q, 1e-9));
            }
        }
        assert!(host.check_blendable(&fk).is_ok());
    }
}
