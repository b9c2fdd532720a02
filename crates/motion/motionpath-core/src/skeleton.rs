//! Hierarchical skeleton model: joint arena, channel layouts and per-frame
//! channel data.
//!
//! Channel data is stored per joint as 6-tuples `(tx, ty, tz, rx, ry, rz)` in
//! world axes, rotations in degrees. Slot 0 of every joint is an identity
//! placeholder; captured frame `f` lives in slot `f + 1`.

use glam::{DMat4, DQuat, DVec3, EulerRot};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};
use crate::ids::JointId;

/// One 6-component channel sample: translation xyz then rotation xyz (degrees).
pub type ChannelFrame = [f64; 6];

pub const IDENTITY_FRAME: ChannelFrame = [0.0; 6];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Axis> {
        Axis::ALL.get(index).copied()
    }

    #[inline]
    pub fn unit(self) -> DVec3 {
        match self {
            Axis::X => DVec3::X,
            Axis::Y => DVec3::Y,
            Axis::Z => DVec3::Z,
        }
    }

    fn rotation(self, radians: f64) -> DMat4 {
        match self {
            Axis::X => DMat4::from_rotation_x(radians),
            Axis::Y => DMat4::from_rotation_y(radians),
            Axis::Z => DMat4::from_rotation_z(radians),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Position,
    Rotation,
}

/// A single declared channel, already expressed in world axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelKind,
    pub axis: Axis,
}

impl Channel {
    pub fn position(axis: Axis) -> Self {
        Self {
            kind: ChannelKind::Position,
            axis,
        }
    }

    pub fn rotation(axis: Axis) -> Self {
        Self {
            kind: ChannelKind::Rotation,
            axis,
        }
    }

    /// Index of this channel inside a [`ChannelFrame`].
    #[inline]
    pub fn slot(self) -> usize {
        match self.kind {
            ChannelKind::Position => self.axis.index(),
            ChannelKind::Rotation => 3 + self.axis.index(),
        }
    }
}

/// One step of a joint's rotation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationStep {
    pub axis: Axis,
    pub present: bool,
}

/// Channels a joint exposes, in on-disk order, plus the rotation order derived
/// from them once at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    channels: Vec<Channel>,
    rotation_order: [RotationStep; 3],
    position_present: [bool; 3],
}

impl ChannelLayout {
    /// Build a layout from declared channels. Repeated channels are rejected.
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        let mut seen = [false; 6];
        for ch in &channels {
            if seen[ch.slot()] {
                return Err(MotionError::InvalidInput(format!(
                    "channel {:?} {:?} declared twice",
                    ch.axis, ch.kind
                )));
            }
            seen[ch.slot()] = true;
        }

        let mut order: Vec<RotationStep> = channels
            .iter()
            .filter(|c| c.kind == ChannelKind::Rotation)
            .map(|c| RotationStep {
                axis: c.axis,
                present: true,
            })
            .collect();
        for axis in Axis::ALL {
            if !order.iter().any(|s| s.axis == axis) {
                order.push(RotationStep {
                    axis,
                    present: false,
                });
            }
        }
        let rotation_order = [order[0], order[1], order[2]];
        let position_present = [seen[0], seen[1], seen[2]];

        Ok(Self {
            channels,
            rotation_order,
            position_present,
        })
    }

    /// No channels at all; the joint only contributes its rest offset.
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
            rotation_order: [
                RotationStep {
                    axis: Axis::X,
                    present: false,
                },
                RotationStep {
                    axis: Axis::Y,
                    present: false,
                },
                RotationStep {
                    axis: Axis::Z,
                    present: false,
                },
            ],
            position_present: [false; 3],
        }
    }

    /// Rotations only, applied in the given order.
    pub fn rotations(order: [Axis; 3]) -> Result<Self> {
        Self::new(order.iter().map(|a| Channel::rotation(*a)).collect())
    }

    /// Translations xyz followed by rotations in the given order.
    pub fn root(order: [Axis; 3]) -> Result<Self> {
        let mut channels: Vec<Channel> = Axis::ALL.iter().map(|a| Channel::position(*a)).collect();
        channels.extend(order.iter().map(|a| Channel::rotation(*a)));
        Self::new(channels)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn rotation_order(&self) -> &[RotationStep; 3] {
        &self.rotation_order
    }

    pub fn has_position(&self) -> bool {
        self.position_present.iter().any(|p| *p)
    }

    pub fn has_rotation(&self) -> bool {
        self.rotation_order.iter().any(|s| s.present)
    }

    /// Translation carried by `frame`, with absent axes zeroed.
    pub fn translation(&self, frame: &ChannelFrame) -> DVec3 {
        let mut t = DVec3::ZERO;
        for axis in Axis::ALL {
            if self.position_present[axis.index()] {
                t[axis.index()] = frame[axis.index()];
            }
        }
        t
    }

    /// Rotation carried by `frame`: per-axis rotations composed left to right
    /// in declared order, absent axes contributing identity.
    pub fn rotation_matrix(&self, frame: &ChannelFrame) -> DMat4 {
        let mut r = DMat4::IDENTITY;
        for step in self.rotation_order.iter().filter(|s| s.present) {
            r *= step.axis.rotation(frame[3 + step.axis.index()].to_radians());
        }
        r
    }

    /// Intrinsic Euler convention matching [`rotation_matrix`](Self::rotation_matrix)
    /// once every axis is present.
    pub fn euler_rot(&self) -> EulerRot {
        let o = self.rotation_order;
        match (o[0].axis, o[1].axis, o[2].axis) {
            (Axis::X, Axis::Y, _) => EulerRot::XYZ,
            (Axis::X, Axis::Z, _) => EulerRot::XZY,
            (Axis::Y, Axis::X, _) => EulerRot::YXZ,
            (Axis::Y, Axis::Z, _) => EulerRot::YZX,
            (Axis::Z, Axis::X, _) => EulerRot::ZXY,
            _ => EulerRot::ZYX,
        }
    }

    /// Decompose `rotation` into per-axis degrees (x, y, z slots) using this
    /// layout's rotation order.
    pub fn decompose_rotation(&self, rotation: DQuat) -> [f64; 3] {
        let (a, b, c) = rotation.to_euler(self.euler_rot());
        let mut out = [0.0; 3];
        for (step, angle) in self.rotation_order.iter().zip([a, b, c]) {
            out[step.axis.index()] = angle.to_degrees();
        }
        out
    }

    /// Same order, but every translation and rotation axis marked present.
    /// Used when baking arbitrary transforms into a joint.
    pub fn with_all_channels(&self) -> Self {
        let mut channels: Vec<Channel> = Axis::ALL.iter().map(|a| Channel::position(*a)).collect();
        channels.extend(self.rotation_order.iter().map(|s| Channel::rotation(s.axis)));
        Self {
            channels,
            rotation_order: self.rotation_order.map(|s| RotationStep {
                axis: s.axis,
                present: true,
            }),
            position_present: [true; 3],
        }
    }
}

/// A node of the joint tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub parent: Option<JointId>,
    pub children: Vec<JointId>,
    /// Rest offset from the parent's head.
    pub local_head: DVec3,
    /// Tail in the same parent-relative space as `local_head`.
    pub local_tail: DVec3,
    pub layout: ChannelLayout,
    /// Slot 0 is the identity placeholder.
    pub frames: Vec<ChannelFrame>,
}

impl Joint {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Tail relative to the joint's own head.
    pub fn tail_offset(&self) -> DVec3 {
        self.local_tail - self.local_head
    }

    /// Slot read when evaluating playback frame `frame`: `frame + 1` when that
    /// slot exists, otherwise the identity placeholder.
    #[inline]
    pub fn slot_for_frame(&self, frame: usize) -> usize {
        if frame + 1 < self.frames.len() {
            frame + 1
        } else {
            0
        }
    }

    pub fn channels_at(&self, frame: usize) -> &ChannelFrame {
        &self.frames[self.slot_for_frame(frame)]
    }

    /// Parent-relative transform for a channel slot.
    pub fn local_matrix(&self, slot: usize) -> DMat4 {
        let data = self.frames.get(slot).unwrap_or(&IDENTITY_FRAME);
        DMat4::from_translation(self.local_head)
            * DMat4::from_translation(self.layout.translation(data))
            * self.layout.rotation_matrix(data)
    }
}

/// Which end of a joint a marker tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Head,
    Tail,
}

/// A tracked point of the skeleton: every joint head plus every leaf tail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marker {
    pub joint: JointId,
    pub kind: MarkerKind,
}

/// Joint tree with exactly one root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    joints: Vec<Joint>,
    by_name: HashMap<String, JointId>,
    root: JointId,
}

impl Skeleton {
    pub fn builder() -> SkeletonBuilder {
        SkeletonBuilder::default()
    }

    /// Validate and adopt a joint arena. Checks name uniqueness, a single
    /// root, parent/child consistency, reachability and uniform slot counts.
    pub fn from_joints(joints: Vec<Joint>) -> Result<Self> {
        if joints.is_empty() {
            return Err(MotionError::InvalidInput("skeleton has no joints".into()));
        }
        let mut by_name = HashMap::with_capacity(joints.len());
        let mut root = None;
        for (i, joint) in joints.iter().enumerate() {
            let id = JointId::from_index(i);
            if by_name.insert(joint.name.clone(), id).is_some() {
                return Err(MotionError::InvalidInput(format!(
                    "duplicate joint name '{}'",
                    joint.name
                )));
            }
            match joint.parent {
                None if root.is_some() => {
                    return Err(MotionError::InvalidInput(format!(
                        "second root joint '{}'",
                        joint.name
                    )))
                }
                None => root = Some(id),
                Some(p) => {
                    let parent = joints.get(p.index()).ok_or_else(|| {
                        MotionError::InvalidInput(format!(
                            "joint '{}' has out-of-range parent",
                            joint.name
                        ))
                    })?;
                    if !parent.children.contains(&id) {
                        return Err(MotionError::InvalidInput(format!(
                            "joint '{}' is not listed as a child of '{}'",
                            joint.name, parent.name
                        )));
                    }
                }
            }
            for child in &joint.children {
                let ok = joints
                    .get(child.index())
                    .map(|c| c.parent == Some(id))
                    .unwrap_or(false);
                if !ok {
                    return Err(MotionError::InvalidInput(format!(
                        "joint '{}' lists a child that does not point back to it",
                        joint.name
                    )));
                }
            }
        }
        let root = root.ok_or_else(|| MotionError::InvalidInput("skeleton has no root".into()))?;

        let slots = joints[0].frames.len();
        if let Some(j) = joints.iter().find(|j| j.frames.len() != slots) {
            return Err(MotionError::InvalidInput(format!(
                "joint '{}' has {} channel slots, expected {}",
                j.name,
                j.frames.len(),
                slots
            )));
        }

        let skeleton = Self {
            joints,
            by_name,
            root,
        };
        if skeleton.traversal().len() != skeleton.joints.len() {
            return Err(MotionError::InvalidInput(
                "joint graph is not a single tree".into(),
            ));
        }
        Ok(skeleton)
    }

    pub fn root(&self) -> JointId {
        self.root
    }

    pub fn root_joint(&self) -> &Joint {
        &self.joints[self.root.index()]
    }

    pub fn joint(&self, id: JointId) -> &Joint {
        &self.joints[id.index()]
    }

    pub fn joint_mut(&mut self, id: JointId) -> &mut Joint {
        &mut self.joints[id.index()]
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints
            .iter()
            .enumerate()
            .map(|(i, j)| (JointId::from_index(i), j))
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<JointId> {
        self.by_name.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<JointId> {
        self.find(name)
            .ok_or_else(|| MotionError::UnknownJoint(name.to_string()))
    }

    /// Channel slots per joint, placeholder included.
    pub fn slot_count(&self) -> usize {
        self.joints[0].frames.len()
    }

    /// Captured frames (slots minus the placeholder).
    pub fn frame_count(&self) -> usize {
        self.slot_count().saturating_sub(1)
    }

    /// Root-first depth-first order, children in declaration order.
    pub fn traversal(&self) -> Vec<JointId> {
        self.subtree(self.root)
    }

    /// `id` followed by all of its descendants, depth first.
    pub fn subtree(&self, id: JointId) -> Vec<JointId> {
        let mut out = Vec::with_capacity(self.joints.len());
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if out.len() > self.joints.len() {
                break;
            }
            out.push(current);
            for child in self.joints[current.index()].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Heads of every joint, plus tails of leaves, in traversal order.
    pub fn markers(&self) -> Vec<Marker> {
        let mut out = Vec::with_capacity(self.joints.len() * 2);
        for id in self.traversal() {
            out.push(Marker {
                joint: id,
                kind: MarkerKind::Head,
            });
            if self.joint(id).is_leaf() {
                out.push(Marker {
                    joint: id,
                    kind: MarkerKind::Tail,
                });
            }
        }
        out
    }

    /// Structural equality by joint names and parent/child relations.
    /// Channel layouts and data are ignored.
    pub fn is_compatible(&self, other: &Skeleton) -> bool {
        self.check_compatible(other).is_ok()
    }

    pub fn check_compatible(&self, other: &Skeleton) -> Result<()> {
        if self.len() != other.len() {
            return Err(MotionError::SkeletonMismatch(format!(
                "{} joints vs {}",
                self.len(),
                other.len()
            )));
        }
        self.compare_subtree(self.root, other, other.root)
    }

    fn compare_subtree(&self, a: JointId, other: &Skeleton, b: JointId) -> Result<()> {
        let ja = self.joint(a);
        let jb = other.joint(b);
        if ja.name != jb.name {
            return Err(MotionError::SkeletonMismatch(format!(
                "joint '{}' vs '{}'",
                ja.name, jb.name
            )));
        }
        if ja.children.len() != jb.children.len() {
            return Err(MotionError::SkeletonMismatch(format!(
                "joint '{}' has {} children vs {}",
                ja.name,
                ja.children.len(),
                jb.children.len()
            )));
        }
        for child in &ja.children {
            let name = &self.joint(*child).name;
            let matched = jb
                .children
                .iter()
                .find(|c| other.joint(**c).name == *name)
                .ok_or_else(|| {
                    MotionError::SkeletonMismatch(format!(
                        "joint '{}' has no child '{}' in the other skeleton",
                        ja.name, name
                    ))
                })?;
            self.compare_subtree(*child, other, *matched)?;
        }
        Ok(())
    }

    /// Replace every joint's channel data. `frames[j]` must already contain
    /// the placeholder slot.
    pub(crate) fn replace_frames(&mut self, frames: Vec<Vec<ChannelFrame>>) -> Result<()> {
        if frames.len() != self.joints.len() {
            return Err(MotionError::InvalidInput(format!(
                "expected channel data for {} joints, got {}",
                self.joints.len(),
                frames.len()
            )));
        }
        let slots = frames[0].len();
        if slots == 0 || frames.iter().any(|f| f.len() != slots) {
            return Err(MotionError::InvalidInput(
                "channel data must be non-empty and uniform across joints".into(),
            ));
        }
        for (joint, data) in self.joints.iter_mut().zip(frames) {
            joint.frames = data;
        }
        Ok(())
    }
}

/// Incremental construction of a [`Skeleton`]; used by the BVH parser and by
/// hosts assembling skeletons programmatically.
#[derive(Debug, Default)]
pub struct SkeletonBuilder {
    joints: Vec<Joint>,
    end_sites: Vec<Option<DVec3>>,
}

impl SkeletonBuilder {
    /// Add a joint. `parent == None` declares the root; a second root fails.
    pub fn add_joint(
        &mut self,
        parent: Option<JointId>,
        name: &str,
        offset: DVec3,
        layout: ChannelLayout,
    ) -> Result<JointId> {
        if self.joints.iter().any(|j| j.name == name) {
            return Err(MotionError::InvalidInput(format!(
                "duplicate joint name '{name}'"
            )));
        }
        match parent {
            None if self.joints.iter().any(|j| j.parent.is_none()) => {
                return Err(MotionError::InvalidInput(format!(
                    "second root joint '{name}'"
                )))
            }
            Some(p) if p.index() >= self.joints.len() => {
                return Err(MotionError::InvalidInput(format!(
                    "parent of '{name}' does not exist"
                )))
            }
            _ => {}
        }
        let id = JointId::from_index(self.joints.len());
        if let Some(p) = parent {
            self.joints[p.index()].children.push(id);
        }
        self.joints.push(Joint {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            local_head: offset,
            local_tail: offset,
            layout,
            frames: vec![IDENTITY_FRAME],
        });
        self.end_sites.push(None);
        Ok(id)
    }

    /// Record the terminal end-site offset of a joint.
    pub fn set_end_site(&mut self, joint: JointId, offset: DVec3) {
        if let Some(slot) = self.end_sites.get_mut(joint.index()) {
            *slot = Some(offset);
        }
    }

    pub fn layout(&self, joint: JointId) -> Option<&ChannelLayout> {
        self.joints.get(joint.index()).map(|j| &j.layout)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Joints in declaration order, which is also on-disk channel order.
    pub fn ids(&self) -> impl Iterator<Item = JointId> {
        (0..self.joints.len()).map(JointId::from_index)
    }

    /// Append one captured frame for `joint`.
    pub fn push_frame(&mut self, joint: JointId, frame: ChannelFrame) {
        if let Some(j) = self.joints.get_mut(joint.index()) {
            j.frames.push(frame);
        }
    }

    /// Derive tails and validate the tree.
    pub fn build(mut self) -> Result<Skeleton> {
        let heads: Vec<DVec3> = self.joints.iter().map(|j| j.local_head).collect();
        for (i, joint) in self.joints.iter_mut().enumerate() {
            joint.local_tail = match joint.children.len() {
                0 => joint.local_head + self.end_sites[i].unwrap_or(DVec3::ZERO),
                1 => joint.local_head + heads[joint.children[0].index()],
                n => {
                    let sum: DVec3 = joint.children.iter().map(|c| heads[c.index()]).sum();
                    joint.local_head + sum / n as f64
                }
            };
        }
        Skeleton::from_joints(self.joints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zxy() -> [Axis; 3] {
        [Axis::Z, Axis::X, Axis::Y]
    }

    fn branching() -> Skeleton {
        let mut b = Skeleton::builder();
        let root = b
            .add_joint(None, "Hips", DVec3::ZERO, ChannelLayout::root(zxy()).unwrap())
            .unwrap();
        let l = b
            .add_joint(
                Some(root),
                "Left",
                DVec3::new(2.0, 0.0, 0.0),
                ChannelLayout::rotations(zxy()).unwrap(),
            )
            .unwrap();
        b.add_joint(
            Some(root),
            "Right",
            DVec3::new(-2.0, 0.0, 4.0),
            ChannelLayout::rotations(zxy()).unwrap(),
        )
        .unwrap();
        b.set_end_site(l, DVec3::new(0.0, 0.0, -3.0));
        b.build().unwrap()
    }

    #[test]
    fn rotation_order_appends_absent_axes() {
        let layout = ChannelLayout::new(vec![Channel::rotation(Axis::Y)]).unwrap();
        let order = layout.rotation_order();
        assert_eq!(order[0], RotationStep { axis: Axis::Y, present: true });
        assert!(!order[1].present && !order[2].present);
        assert_eq!(order[1].axis, Axis::X);
        assert_eq!(order[2].axis, Axis::Z);
    }

    #[test]
    fn repeated_channel_rejected() {
        let err = ChannelLayout::new(vec![Channel::rotation(Axis::X), Channel::rotation(Axis::X)]);
        assert!(err.is_err());
    }

    #[test]
    fn absent_rotation_channels_are_ignored() {
        let layout = ChannelLayout::new(vec![Channel::rotation(Axis::Z)]).unwrap();
        let frame = [0.0, 0.0, 0.0, 90.0, 0.0, 45.0];
        let expected = DMat4::from_rotation_z(45f64.to_radians());
        assert!(layout.rotation_matrix(&frame).abs_diff_eq(expected, 1e-12));
    }

    #[test]
    fn decompose_inverts_rotation_matrix() {
        let layout = ChannelLayout::rotations(zxy()).unwrap();
        let frame = [0.0, 0.0, 0.0, 20.0, -35.0, 50.0];
        let q = DQuat::from_mat4(&layout.rotation_matrix(&frame));
        let back = layout.decompose_rotation(q);
        for (a, b) in back.iter().zip(&frame[3..]) {
            assert!((a - b).abs() < 1e-9, "{back:?}");
        }
    }

    #[test]
    fn tails_follow_children_and_end_sites() {
        let skel = branching();
        let hips = skel.joint(skel.root());
        // Mean of (2,0,0) and (-2,0,4).
        assert!(hips.local_tail.abs_diff_eq(DVec3::new(0.0, 0.0, 2.0), 1e-12));
        let left = skel.joint(skel.require("Left").unwrap());
        assert!(left.tail_offset().abs_diff_eq(DVec3::new(0.0, 0.0, -3.0), 1e-12));
        let right = skel.joint(skel.require("Right").unwrap());
        assert_eq!(right.tail_offset(), DVec3::ZERO);
    }

    #[test]
    fn markers_cover_heads_and_leaf_tails() {
        let skel = branching();
        let markers = skel.markers();
        assert_eq!(markers.len(), 5);
        assert_eq!(markers[0].joint, skel.root());
        assert_eq!(markers.iter().filter(|m| m.kind == MarkerKind::Tail).count(), 2);
    }

    #[test]
    fn slot_for_frame_skips_placeholder() {
        let mut b = Skeleton::builder();
        let root = b
            .add_joint(None, "Root", DVec3::ZERO, ChannelLayout::root(zxy()).unwrap())
            .unwrap();
        b.push_frame(root, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        b.push_frame(root, [2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let skel = b.build().unwrap();
        let joint = skel.root_joint();
        assert_eq!(skel.frame_count(), 2);
        assert_eq!(joint.channels_at(0)[0], 1.0);
        assert_eq!(joint.channels_at(1)[0], 2.0);
        // Past the end falls back to the placeholder.
        assert_eq!(joint.channels_at(2)[0], 0.0);
    }

    #[test]
    fn compatibility_ignores_child_order_and_layout() {
        let a = branching();
        let mut b = Skeleton::builder();
        let root = b
            .add_joint(None, "Hips", DVec3::ZERO, ChannelLayout::empty())
            .unwrap();
        b.add_joint(Some(root), "Right", DVec3::ZERO, ChannelLayout::empty())
            .unwrap();
        b.add_joint(Some(root), "Left", DVec3::ZERO, ChannelLayout::empty())
            .unwrap();
        let other = b.build().unwrap();
        assert!(a.is_compatible(&other));

        let mut c = Skeleton::builder();
        let root = c
            .add_joint(None, "Hips", DVec3::ZERO, ChannelLayout::empty())
            .unwrap();
        let l = c
            .add_joint(Some(root), "Left", DVec3::ZERO, ChannelLayout::empty())
            .unwrap();
        c.add_joint(Some(l), "Right", DVec3::ZERO, ChannelLayout::empty())
            .unwrap();
        let nested = c.build().unwrap();
        assert!(matches!(
            a.check_compatible(&nested),
            Err(MotionError::SkeletonMismatch(_))
        ));
    }

    #[test]
    fn second_root_rejected() {
        let mut b = Skeleton::builder();
        b.add_joint(None, "A", DVec3::ZERO, ChannelLayout::empty())
            .unwrap();
        assert!(b
            .add_joint(None, "B", DVec3::ZERO, ChannelLayout::empty())
            .is_err());
    }
}
