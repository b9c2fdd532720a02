//! An imported clip with its editable root path.

use std::path::Path;

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::bvh::{load_bvh, parse_bvh, ParsedBvh};
use crate::config::{Config, FitConfig, RetargetConfig};
use crate::curve::{CubicBSpline, SplineFit, PATH_SUBDIVISIONS};
use crate::error::{MotionError, Result};
use crate::kinematics::{root_trajectory, Pose};
use crate::retarget::Retargeter;
use crate::skeleton::{ChannelFrame, ChannelLayout, Skeleton};

/// Root path of a clip: the fitted original, the user's edit and the per
/// frame corrections between them. Corrections always hold one matrix per
/// frame and are recomputed on every edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionPath {
    initial_trajectory: Vec<DVec3>,
    fit: SplineFit,
    edited: CubicBSpline,
    corrections: Vec<DMat4>,
    edited_parameters: Vec<f64>,
    edited_trajectory: Vec<DVec3>,
}

impl MotionPath {
    pub fn initial_trajectory(&self) -> &[DVec3] {
        &self.initial_trajectory
    }

    pub fn original(&self) -> &CubicBSpline {
        &self.fit.spline
    }

    pub fn parameters(&self) -> &[f64] {
        &self.fit.parameters
    }

    pub fn edited(&self) -> &CubicBSpline {
        &self.edited
    }

    pub fn corrections(&self) -> &[DMat4] {
        &self.corrections
    }

    pub fn edited_parameters(&self) -> &[f64] {
        &self.edited_parameters
    }

    pub fn edited_trajectory(&self) -> &[DVec3] {
        &self.edited_trajectory
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    name: String,
    skeleton: Skeleton,
    frame_time: f64,
    path: Option<MotionPath>,
    fit_cfg: FitConfig,
    retarget_cfg: RetargetConfig,
}

impl Motion {
    pub fn from_bvh_str(name: &str, text: &str, cfg: &Config) -> Result<Self> {
        let parsed = parse_bvh(text, &cfg.parse)?;
        Ok(Self::from_parsed(name, parsed, cfg))
    }

    /// Load a BVH file; the motion is named after the file.
    pub fn from_file(path: impl AsRef<Path>, cfg: &Config) -> Result<Self> {
        let path = path.as_ref();
        let parsed = load_bvh(path, &cfg.parse)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_parsed(&name, parsed, cfg))
    }

    pub fn from_parsed(name: &str, parsed: ParsedBvh, cfg: &Config) -> Self {
        let mut motion = Self {
            name: name.to_string(),
            skeleton: parsed.skeleton,
            frame_time: parsed.frame_time,
            path: None,
            fit_cfg: cfg.fit,
            retarget_cfg: cfg.retarget,
        };
        motion.refit();
        motion
    }

    pub fn from_skeleton(name: &str, skeleton: Skeleton, frame_time: f64, cfg: &Config) -> Result<Self> {
        if !(frame_time.is_finite() && frame_time > 0.0) {
            return Err(MotionError::InvalidInput(format!(
                "frame time must be positive, got {frame_time}"
            )));
        }
        let mut motion = Self {
            name: name.to_string(),
            skeleton,
            frame_time,
            path: None,
            fit_cfg: cfg.fit,
            retarget_cfg: cfg.retarget,
        };
        motion.refit();
        Ok(motion)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }

    /// Playback frames. A static clip still plays its single rest pose.
    pub fn frame_count(&self) -> usize {
        self.skeleton.frame_count().max(1)
    }

    /// Frames actually captured in the channel data.
    pub fn captured_frames(&self) -> usize {
        self.skeleton.frame_count()
    }

    pub fn is_static(&self) -> bool {
        self.skeleton.frame_count() == 0
    }

    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 * self.frame_time
    }

    pub fn path(&self) -> Option<&MotionPath> {
        self.path.as_ref()
    }

    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }

    fn path_ref(&self) -> Result<&MotionPath> {
        self.path.as_ref().ok_or_else(|| self.no_path())
    }

    fn path_mut(&mut self) -> Result<&mut MotionPath> {
        match self.path.as_mut() {
            Some(p) => Ok(p),
            None => Err(MotionError::DegenerateInput(format!(
                "motion '{}' has no editable path",
                self.name
            ))),
        }
    }

    fn no_path(&self) -> MotionError {
        MotionError::DegenerateInput(format!("motion '{}' has no editable path", self.name))
    }

    /// Correction applied to the root at `frame`; identity without a path.
    pub fn correction(&self, frame: usize) -> DMat4 {
        self.path
            .as_ref()
            .and_then(|p| p.corrections.get(frame).copied())
            .unwrap_or(DMat4::IDENTITY)
    }

    pub fn corrections(&self) -> Vec<DMat4> {
        match &self.path {
            Some(p) => p.corrections.clone(),
            None => vec![DMat4::IDENTITY; self.frame_count()],
        }
    }

    /// World pose at `frame` with the path correction applied.
    pub fn pose(&self, frame: usize) -> Pose {
        Pose::evaluate(&self.skeleton, frame, self.correction(frame))
    }

    /// World pose at `frame` as captured, ignoring path edits.
    pub fn original_pose(&self, frame: usize) -> Pose {
        Pose::evaluate(&self.skeleton, frame, DMat4::IDENTITY)
    }

    pub fn poses(&self) -> Vec<Pose> {
        (0..self.frame_count()).map(|f| self.pose(f)).collect()
    }

    /// Root positions as captured.
    pub fn root_trajectory(&self) -> Vec<DVec3> {
        match &self.path {
            Some(p) => p.initial_trajectory.clone(),
            None => root_trajectory(&self.skeleton, self.frame_count(), &[]),
        }
    }

    /// Root positions after the path edit.
    pub fn edited_trajectory(&self) -> Vec<DVec3> {
        match &self.path {
            Some(p) => p.edited_trajectory.clone(),
            None => self.root_trajectory(),
        }
    }

    /// Edited spline control points.
    pub fn control_points(&self) -> Result<[DVec3; 4]> {
        Ok(*self.path_ref()?.edited.control_points())
    }

    /// Fitted (unedited) spline control points.
    pub fn original_control_points(&self) -> Result<[DVec3; 4]> {
        Ok(*self.path_ref()?.fit.spline.control_points())
    }

    /// Edited spline drawn as a polyline.
    pub fn path_polyline(&self) -> Result<Vec<DVec3>> {
        Ok(self.path_ref()?.edited.sample(PATH_SUBDIVISIONS))
    }

    pub fn set_control_point(&mut self, index: usize, p: DVec3) -> Result<()> {
        self.path_mut()?.edited.set_control_point(index, p)?;
        self.retarget();
        Ok(())
    }

    pub fn set_control_points(&mut self, control: [DVec3; 4]) -> Result<()> {
        self.path_mut()?.edited.set_control_points(control);
        self.retarget();
        Ok(())
    }

    pub fn translate_path(&mut self, offset: DVec3) -> Result<()> {
        self.path_mut()?.edited.translate(offset);
        self.retarget();
        Ok(())
    }

    /// Drop the edit; the path returns to the fitted original.
    pub fn reset_path(&mut self) -> Result<()> {
        let path = self.path_mut()?;
        path.edited = path.fit.spline;
        self.retarget();
        Ok(())
    }

    /// Copy of the skeleton whose root channels carry the path correction, so
    /// evaluating it with identity parents reproduces [`pose`](Self::pose).
    pub fn baked_skeleton(&self) -> Skeleton {
        let mut skeleton = self.skeleton.clone();
        let Some(path) = &self.path else {
            return skeleton;
        };
        let root = skeleton.root();
        let joint = skeleton.joint_mut(root);
        let layout = joint.layout.with_all_channels();
        let head = joint.local_head;
        for (slot, frame) in joint.frames.iter_mut().enumerate().skip(1) {
            let correction = path.corrections.get(slot - 1).copied().unwrap_or(DMat4::IDENTITY);
            *frame = bake_root_frame(&joint.layout, &layout, head, frame, correction);
        }
        joint.layout = layout;
        skeleton
    }

    /// Fold the current path edit into the channel data and refit.
    pub fn commit_path(&mut self) -> Result<()> {
        if self.path.is_none() {
            return Err(self.no_path());
        }
        self.skeleton = self.baked_skeleton();
        self.refit();
        Ok(())
    }

    /// New motion over `skeleton` sharing this motion's fit settings.
    pub(crate) fn derive(&self, name: &str, skeleton: Skeleton, frame_time: f64) -> Motion {
        let mut motion = Self {
            name: name.to_string(),
            skeleton,
            frame_time,
            path: None,
            fit_cfg: self.fit_cfg,
            retarget_cfg: self.retarget_cfg,
        };
        motion.refit();
        motion
    }

    fn refit(&mut self) {
        self.path = None;
        let frames = self.captured_frames();
        if frames == 0 {
            return;
        }
        let initial = root_trajectory(&self.skeleton, frames, &[]);
        match CubicBSpline::fit(&initial, &self.fit_cfg) {
            Ok(fit) => {
                self.path = Some(MotionPath {
                    initial_trajectory: initial.clone(),
                    edited: fit.spline,
                    fit,
                    corrections: vec![DMat4::IDENTITY; frames],
                    edited_parameters: Vec::new(),
                    edited_trajectory: initial,
                });
                self.retarget();
            }
            Err(e) => {
                log::info!("motion '{}' has no editable path: {e}", self.name);
            }
        }
    }

    fn retarget(&mut self) {
        let frames = self.captured_frames();
        let retargeter = Retargeter::new(self.retarget_cfg);
        if let Some(path) = self.path.as_mut() {
            let outcome = retargeter.retarget(&self.skeleton, frames, &path.fit, &path.edited);
            path.corrections = outcome.corrections;
            path.edited_parameters = outcome.parameters;
            path.edited_trajectory = outcome.trajectory;
        }
    }
}

/// Fold a rigid `correction` into one root channel frame.
fn bake_root_frame(
    layout: &ChannelLayout,
    full: &ChannelLayout,
    head: DVec3,
    frame: &ChannelFrame,
    correction: DMat4,
) -> ChannelFrame {
    let translation = layout.translation(frame);
    let rotation = layout.rotation_matrix(frame);
    let moved = correction.transform_point3(head + translation) - head;
    let q = DQuat::from_mat4(&(correction * rotation)).normalize();
    let angles = full.decompose_rotation(q);
    [moved.x, moved.y, moved.z, angles[0], angles[1], angles[2]]
}
