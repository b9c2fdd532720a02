//! Forward kinematics.
//!
//! Evaluation never touches the skeleton: each call returns a fresh [`Pose`]
//! table indexed by joint, so different frames can be evaluated side by side.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::ids::JointId;
use crate::skeleton::{Marker, MarkerKind, Skeleton};

/// World transform of one joint for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointTransform {
    pub model: DMat4,
    pub head: DVec3,
    pub tail: DVec3,
}

impl Default for JointTransform {
    fn default() -> Self {
        Self {
            model: DMat4::IDENTITY,
            head: DVec3::ZERO,
            tail: DVec3::ZERO,
        }
    }
}

/// Per-joint world transforms for a single frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    transforms: Vec<JointTransform>,
}

impl Pose {
    /// Evaluate playback frame `frame` with `root_parent` as the root's parent
    /// matrix.
    pub fn evaluate(skeleton: &Skeleton, frame: usize, root_parent: DMat4) -> Pose {
        let mut transforms = vec![JointTransform::default(); skeleton.len()];
        for id in skeleton.traversal() {
            let joint = skeleton.joint(id);
            let parent = match joint.parent {
                Some(p) => transforms[p.index()].model,
                None => root_parent,
            };
            let model = parent * joint.local_matrix(joint.slot_for_frame(frame));
            transforms[id.index()] = JointTransform {
                model,
                head: model.transform_point3(DVec3::ZERO),
                tail: model.transform_point3(joint.tail_offset()),
            };
        }
        Pose { transforms }
    }

    /// Rest pose: every channel at the identity placeholder.
    pub fn rest(skeleton: &Skeleton) -> Pose {
        let mut transforms = vec![JointTransform::default(); skeleton.len()];
        for id in skeleton.traversal() {
            let joint = skeleton.joint(id);
            let parent = match joint.parent {
                Some(p) => transforms[p.index()].model,
                None => DMat4::IDENTITY,
            };
            let model = parent * joint.local_matrix(0);
            transforms[id.index()] = JointTransform {
                model,
                head: model.transform_point3(DVec3::ZERO),
                tail: model.transform_point3(joint.tail_offset()),
            };
        }
        Pose { transforms }
    }

    pub fn get(&self, id: JointId) -> &JointTransform {
        &self.transforms[id.index()]
    }

    pub fn get_mut(&mut self, id: JointId) -> &mut JointTransform {
        &mut self.transforms[id.index()]
    }

    pub fn head(&self, id: JointId) -> DVec3 {
        self.transforms[id.index()].head
    }

    pub fn tail(&self, id: JointId) -> DVec3 {
        self.transforms[id.index()].tail
    }

    pub fn model(&self, id: JointId) -> DMat4 {
        self.transforms[id.index()].model
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn transforms(&self) -> &[JointTransform] {
        &self.transforms
    }

    pub fn marker_position(&self, marker: Marker) -> DVec3 {
        match marker.kind {
            MarkerKind::Head => self.head(marker.joint),
            MarkerKind::Tail => self.tail(marker.joint),
        }
    }

    /// Positions of `markers`, in order.
    pub fn marker_positions(&self, markers: &[Marker]) -> Vec<DVec3> {
        markers.iter().map(|m| self.marker_position(*m)).collect()
    }

    /// Re-set a joint's model matrix and refresh its head and tail.
    pub fn set_model(&mut self, skeleton: &Skeleton, id: JointId, model: DMat4) {
        let tail_offset = skeleton.joint(id).tail_offset();
        self.transforms[id.index()] = JointTransform {
            model,
            head: model.transform_point3(DVec3::ZERO),
            tail: model.transform_point3(tail_offset),
        };
    }
}

/// Evaluate every playback frame in `0..frames` with per-frame root parents.
/// `root_parents` shorter than `frames` repeats identity.
pub fn evaluate_all(skeleton: &Skeleton, frames: usize, root_parents: &[DMat4]) -> Vec<Pose> {
    (0..frames)
        .map(|f| {
            let parent = root_parents.get(f).copied().unwrap_or(DMat4::IDENTITY);
            Pose::evaluate(skeleton, f, parent)
        })
        .collect()
}

/// World position of the root head for each playback frame.
pub fn root_trajectory(skeleton: &Skeleton, frames: usize, root_parents: &[DMat4]) -> Vec<DVec3> {
    let root = skeleton.root();
    (0..frames)
        .map(|f| {
            let parent = root_parents.get(f).copied().unwrap_or(DMat4::IDENTITY);
            let joint = skeleton.joint(root);
            (parent * joint.local_matrix(joint.slot_for_frame(f))).transform_point3(DVec3::ZERO)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Axis, ChannelLayout, Skeleton};

    fn arm() -> Skeleton {
        let order = [Axis::Z, Axis::X, Axis::Y];
        let mut b = Skeleton::builder();
        let root = b
            .add_joint(None, "Root", DVec3::new(0.0, 0.0, 1.0), ChannelLayout::root(order).unwrap())
            .unwrap();
        let upper = b
            .add_joint(Some(root), "Upper", DVec3::new(1.0, 0.0, 0.0), ChannelLayout::rotations(order).unwrap())
            .unwrap();
        b.set_end_site(upper, DVec3::new(2.0, 0.0, 0.0));
        b.push_frame(root, [0.0; 6]);
        b.push_frame(upper, [0.0, 0.0, 0.0, 0.0, 0.0, 90.0]);
        b.push_frame(root, [3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        b.push_frame(upper, [0.0; 6]);
        b.build().unwrap()
    }

    #[test]
    fn rest_pose_accumulates_offsets() {
        let skel = arm();
        let pose = Pose::rest(&skel);
        let upper = skel.require("Upper").unwrap();
        assert!(pose.head(skel.root()).abs_diff_eq(DVec3::new(0.0, 0.0, 1.0), 1e-12));
        assert!(pose.head(upper).abs_diff_eq(DVec3::new(1.0, 0.0, 1.0), 1e-12));
        assert!(pose.tail(upper).abs_diff_eq(DVec3::new(3.0, 0.0, 1.0), 1e-12));
    }

    #[test]
    fn rotation_swings_tail_about_head() {
        let skel = arm();
        let pose = Pose::evaluate(&skel, 0, DMat4::IDENTITY);
        let upper = skel.require("Upper").unwrap();
        assert!(pose.head(upper).abs_diff_eq(DVec3::new(1.0, 0.0, 1.0), 1e-12));
        assert!(pose.tail(upper).abs_diff_eq(DVec3::new(1.0, 2.0, 1.0), 1e-9));
    }

    #[test]
    fn root_parent_is_applied_first() {
        let skel = arm();
        let shift = DMat4::from_translation(DVec3::new(0.0, 5.0, 0.0));
        let pose = Pose::evaluate(&skel, 1, shift);
        assert!(pose.head(skel.root()).abs_diff_eq(DVec3::new(3.0, 5.0, 1.0), 1e-12));
        let traj = root_trajectory(&skel, 2, &[DMat4::IDENTITY, shift]);
        assert!(traj[1].abs_diff_eq(pose.head(skel.root()), 1e-12));
    }

    #[test]
    fn frames_past_the_end_use_the_placeholder() {
        let skel = arm();
        let past = Pose::evaluate(&skel, 5, DMat4::IDENTITY);
        assert_eq!(past, Pose::rest(&skel));
    }
}
