//! Seams to the host scene.
//!
//! The core never creates scene objects or stores keyframes itself. A host
//! adapter implements these traits over its own object model and hands back
//! opaque handles; [`SceneBinding`] keeps the mapping between those handles
//! and a motion's joints and path controls.

use glam::{DQuat, DVec3};

use crate::error::{MotionError, Result};
use crate::ids::JointId;
use crate::motion::Motion;
use crate::skeleton::Marker;

/// Creates visual primitives in the host scene.
pub trait PrimitiveFactory {
    type Handle: Clone + PartialEq;

    fn create_marker(&mut self, name: &str, position: DVec3) -> Result<Self::Handle>;

    /// Bone-like segment between two points.
    fn create_segment(&mut self, name: &str, from: DVec3, to: DVec3) -> Result<Self::Handle>;

    fn create_polyline(&mut self, name: &str, points: &[DVec3]) -> Result<Self::Handle>;

    /// Replace the points of a polyline created by this factory.
    fn update_polyline(&mut self, handle: &Self::Handle, points: &[DVec3]) -> Result<()>;
}

/// Receives `(handle, time, position, orientation)` keyframes.
pub trait KeyframeSink<H> {
    fn insert_keyframe(&mut self, handle: &H, time: f64, position: DVec3, orientation: DQuat) -> Result<()>;
}

/// Evaluates world positions of host handles as of a frame index.
pub trait FrameEvaluator {
    type Handle;

    fn positions_at(&mut self, frame: usize, handles: &[Self::Handle]) -> Result<Vec<DVec3>>;
}

/// [`FrameEvaluator`] backed by the motion's own forward kinematics, with
/// skeleton markers as handles.
#[derive(Clone, Copy, Debug)]
pub struct PoseEvaluator<'a> {
    motion: &'a Motion,
}

impl<'a> PoseEvaluator<'a> {
    pub fn new(motion: &'a Motion) -> Self {
        Self { motion }
    }
}

impl FrameEvaluator for PoseEvaluator<'_> {
    type Handle = Marker;

    fn positions_at(&mut self, frame: usize, handles: &[Marker]) -> Result<Vec<DVec3>> {
        let skeleton = self.motion.skeleton();
        if let Some(bad) = handles.iter().find(|m| m.joint.index() >= skeleton.len()) {
            return Err(MotionError::InvalidInput(format!(
                "marker joint {} out of range",
                bad.joint.index()
            )));
        }
        Ok(self.motion.pose(frame).marker_positions(handles))
    }
}

/// Host objects created for one motion.
#[derive(Clone, Debug)]
pub struct SceneBinding<H> {
    motion: String,
    joint_markers: Vec<(JointId, H)>,
    bones: Vec<(JointId, H)>,
    trajectory: Option<H>,
    path_curve: Option<H>,
    control_markers: Vec<H>,
}

impl<H: Clone + PartialEq> SceneBinding<H> {
    /// Create a marker and a bone segment per joint at frame 0, the root
    /// trajectory polyline and, when the motion has a path, the edited path
    /// curve with one marker per control point.
    pub fn create<F>(factory: &mut F, motion: &Motion) -> Result<Self>
    where
        F: PrimitiveFactory<Handle = H>,
    {
        let skeleton = motion.skeleton();
        let pose = motion.pose(0);
        let mut joint_markers = Vec::with_capacity(skeleton.len());
        let mut bones = Vec::with_capacity(skeleton.len());
        for id in skeleton.traversal() {
            let name = &skeleton.joint(id).name;
            let marker = factory.create_marker(&format!("{}.{name}", motion.name()), pose.head(id))?;
            joint_markers.push((id, marker));
            let bone = factory.create_segment(
                &format!("{}.{name}.bone", motion.name()),
                pose.head(id),
                pose.tail(id),
            )?;
            bones.push((id, bone));
        }

        let trajectory = match motion.edited_trajectory() {
            points if points.len() >= 2 => Some(
                factory.create_polyline(&format!("{}.trajectory", motion.name()), &points)?,
            ),
            _ => None,
        };

        let mut path_curve = None;
        let mut control_markers = Vec::new();
        if motion.has_path() {
            path_curve = Some(factory.create_polyline(
                &format!("{}.path", motion.name()),
                &motion.path_polyline()?,
            )?);
            for (i, p) in motion.control_points()?.iter().enumerate() {
                control_markers.push(factory.create_marker(&format!("{}.cp{i}", motion.name()), *p)?);
            }
        }

        log::debug!(
            "bound motion '{}': {} joints, path {}",
            motion.name(),
            joint_markers.len(),
            if path_curve.is_some() { "yes" } else { "no" }
        );
        Ok(Self {
            motion: motion.name().to_string(),
            joint_markers,
            bones,
            trajectory,
            path_curve,
            control_markers,
        })
    }

    pub fn motion_name(&self) -> &str {
        &self.motion
    }

    pub fn joint_marker(&self, id: JointId) -> Option<&H> {
        self.joint_markers.iter().find(|(j, _)| *j == id).map(|(_, h)| h)
    }

    pub fn bone(&self, id: JointId) -> Option<&H> {
        self.bones.iter().find(|(j, _)| *j == id).map(|(_, h)| h)
    }

    pub fn trajectory(&self) -> Option<&H> {
        self.trajectory.as_ref()
    }

    pub fn path_curve(&self) -> Option<&H> {
        self.path_curve.as_ref()
    }

    pub fn control_markers(&self) -> &[H] {
        &self.control_markers
    }

    /// Key every joint marker at every frame of `motion`. Returns the number
    /// of keyframes pushed.
    pub fn bake_keyframes<S: KeyframeSink<H>>(&self, sink: &mut S, motion: &Motion) -> Result<usize> {
        let mut count = 0;
        for (frame, pose) in motion.poses().iter().enumerate() {
            let time = frame as f64 * motion.frame_time();
            for (id, handle) in &self.joint_markers {
                let model = pose.model(*id);
                let orientation = DQuat::from_mat4(&model).normalize();
                sink.insert_keyframe(handle, time, pose.head(*id), orientation)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Map a moved handle back onto the motion. A control-point marker moves
    /// the matching control point and retargets; any other handle is ignored.
    /// Returns whether the motion changed.
    pub fn on_handle_moved(&self, motion: &mut Motion, handle: &H, position: DVec3) -> Result<bool> {
        let Some(index) = self.control_markers.iter().position(|h| h == handle) else {
            return Ok(false);
        };
        if motion.name() != self.motion {
            return Err(MotionError::InvalidInput(format!(
                "binding for '{}' used with motion '{}'",
                self.motion,
                motion.name()
            )));
        }
        motion.set_control_point(index, position)?;
        Ok(true)
    }

    /// Push the motion's current path and trajectory back into the host
    /// polylines.
    pub fn refresh<F>(&self, factory: &mut F, motion: &Motion) -> Result<()>
    where
        F: PrimitiveFactory<Handle = H>,
    {
        if let Some(curve) = &self.path_curve {
            factory.update_polyline(curve, &motion.path_polyline()?)?;
        }
        if let Some(trajectory) = &self.trajectory {
            factory.update_polyline(trajectory, &motion.edited_trajectory())?;
        }
        Ok(())
    }
}
