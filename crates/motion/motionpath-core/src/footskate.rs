//! Foot-contact cleanup: frames whose foot sinks below the ground plane get
//! the leg re-solved so the foot sits on the plane.

use glam::{DMat4, DQuat};
use serde::{Deserialize, Serialize};

use crate::config::{FootskateConfig, IkConfig};
use crate::error::{MotionError, Result};
use crate::ids::JointId;
use crate::ik::IkSolver;
use crate::kinematics::Pose;
use crate::motion::Motion;
use crate::skeleton::Skeleton;

/// Fade weight `2t^3 - 3t^2 + 1`: 1 at `t = 0`, 0 at `t = 1`.
#[inline]
pub fn alpha_blend(t: f64) -> f64 {
    2.0 * t * t * t - 3.0 * t * t + 1.0
}

/// Hip, knee and foot of one leg; each is the parent of the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegChain {
    pub hip: JointId,
    pub knee: JointId,
    pub foot: JointId,
}

impl LegChain {
    pub fn new(skeleton: &Skeleton, hip: JointId, knee: JointId, foot: JointId) -> Result<Self> {
        for (parent, child) in [(hip, knee), (knee, foot)] {
            if parent.index() >= skeleton.len() || child.index() >= skeleton.len() {
                return Err(MotionError::InvalidInput("leg joint out of range".into()));
            }
            if skeleton.joint(child).parent != Some(parent) {
                return Err(MotionError::InvalidInput(format!(
                    "'{}' is not a child of '{}'",
                    skeleton.joint(child).name,
                    skeleton.joint(parent).name
                )));
            }
        }
        Ok(Self { hip, knee, foot })
    }

    pub fn from_names(skeleton: &Skeleton, hip: &str, knee: &str, foot: &str) -> Result<Self> {
        Self::new(
            skeleton,
            skeleton.require(hip)?,
            skeleton.require(knee)?,
            skeleton.require(foot)?,
        )
    }

    fn joints(&self) -> [JointId; 3] {
        [self.hip, self.knee, self.foot]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FootskateCleanup {
    solver: IkSolver,
    cfg: FootskateConfig,
}

impl FootskateCleanup {
    pub fn new(ik: &IkConfig, cfg: FootskateConfig) -> Self {
        Self {
            solver: IkSolver::from_config(ik),
            cfg,
        }
    }

    /// Correct one frame in place. Returns whether the foot was moved.
    pub fn cleanup_frame(&self, skeleton: &Skeleton, pose: &mut Pose, leg: &LegChain) -> Result<bool> {
        let axis = self.cfg.up.index();
        let foot = pose.head(leg.foot);
        if foot[axis] >= self.cfg.ground_height {
            return Ok(false);
        }
        let mut target = foot;
        target[axis] = self.cfg.ground_height;

        let joints = leg.joints();
        let old_positions = joints.map(|j| pose.head(j));
        let old_rotations = joints.map(|j| DQuat::from_mat4(&pose.model(j)).normalize());
        let mut positions = old_positions;
        let mut rotations = old_rotations;
        let pole = self.cfg.use_pole.then(|| old_positions[1]);
        let result = self.solver.solve(&mut positions, &mut rotations, target, pole)?;
        log::trace!(
            "footskate: foot {} -> {} (error {:.2e}, {} iterations)",
            foot,
            positions[2],
            result.error,
            result.iterations
        );

        // Hip and knee pick up the solved rotation about their new heads.
        for i in 0..2 {
            let delta_rot = rotations[i] * old_rotations[i].inverse();
            let delta = DMat4::from_translation(positions[i])
                * DMat4::from_quat(delta_rot)
                * DMat4::from_translation(-old_positions[i]);
            let model = delta * pose.model(joints[i]);
            pose.set_model(skeleton, joints[i], model);
        }
        // The foot keeps its world orientation and carries its subtree along.
        let shift = DMat4::from_translation(positions[2] - old_positions[2]);
        for id in skeleton.subtree(leg.foot) {
            let model = shift * pose.model(id);
            pose.set_model(skeleton, id, model);
        }
        Ok(true)
    }

    /// Correct every frame; returns how many frames changed.
    pub fn cleanup(&self, skeleton: &Skeleton, poses: &mut [Pose], leg: &LegChain) -> Result<usize> {
        let mut corrected = 0;
        for pose in poses.iter_mut() {
            if self.cleanup_frame(skeleton, pose, leg)? {
                corrected += 1;
            }
        }
        log::debug!(
            "footskate cleanup corrected {corrected} of {} frames",
            poses.len()
        );
        Ok(corrected)
    }

    /// Evaluate a motion with its path correction and clean every frame.
    pub fn cleanup_motion(&self, motion: &Motion, leg: &LegChain) -> Result<(Vec<Pose>, usize)> {
        let mut poses = motion.poses();
        let corrected = self.cleanup(motion.skeleton(), &mut poses, leg)?;
        Ok((poses, corrected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Axis, ChannelLayout};
    use glam::DVec3;

    fn leg_skeleton() -> Skeleton {
        let order = [Axis::Z, Axis::X, Axis::Y];
        let mut b = Skeleton::builder();
        let hips = b
            .add_joint(None, "Hips", DVec3::new(0.0, 0.0, 70.0), ChannelLayout::root(order).unwrap())
            .unwrap();
        let upper = b
            .add_joint(Some(hips), "UpLeg", DVec3::new(5.0, 0.0, 0.0), ChannelLayout::rotations(order).unwrap())
            .unwrap();
        let knee = b
            .add_joint(Some(upper), "Leg", DVec3::new(0.0, 0.0, -40.0), ChannelLayout::rotations(order).unwrap())
            .unwrap();
        let foot = b
            .add_joint(Some(knee), "Foot", DVec3::new(0.0, 0.0, -40.0), ChannelLayout::rotations(order).unwrap())
            .unwrap();
        b.set_end_site(foot, DVec3::new(0.0, 10.0, -5.0));
        b.build().unwrap()
    }

    #[test]
    fn alpha_blend_endpoints() {
        assert_eq!(alpha_blend(0.0), 1.0);
        assert_eq!(alpha_blend(1.0), 0.0);
        assert!((alpha_blend(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn leg_must_be_a_parent_chain() {
        let skel = leg_skeleton();
        assert!(LegChain::from_names(&skel, "UpLeg", "Leg", "Foot").is_ok());
        assert!(LegChain::from_names(&skel, "Hips", "Leg", "Foot").is_err());
        assert!(matches!(
            LegChain::from_names(&skel, "UpLeg", "Knee", "Foot"),
            Err(MotionError::UnknownJoint(_))
        ));
    }

    #[test]
    fn foot_above_ground_is_untouched() {
        let skel = leg_skeleton();
        let leg = LegChain::from_names(&skel, "UpLeg", "Leg", "Foot").unwrap();
        let mut pose = Pose::rest(&skel);
        let before = pose.clone();
        let fix = FootskateCleanup::new(&IkConfig::default(), FootskateConfig::default());
        // Rest foot sits at z = -10.
        let cfg = FootskateConfig { ground_height: -20.0, ..FootskateConfig::default() };
        let fix_low = FootskateCleanup::new(&IkConfig::default(), cfg);
        assert!(!fix_low.cleanup_frame(&skel, &mut pose, &leg).unwrap());
        assert_eq!(pose, before);
        assert!(fix.cleanup_frame(&skel, &mut pose, &leg).unwrap());
    }

    #[test]
    fn sunk_foot_is_lifted_onto_the_plane() {
        let skel = leg_skeleton();
        let leg = LegChain::from_names(&skel, "UpLeg", "Leg", "Foot").unwrap();
        let mut pose = Pose::rest(&skel);
        let hip_before = pose.head(leg.hip);
        let toe_offset = pose.tail(leg.foot) - pose.head(leg.foot);
        let ik = IkConfig { iterations: 30, epsilon: 1e-6 };
        let fix = FootskateCleanup::new(&ik, FootskateConfig::default());
        assert!(fix.cleanup_frame(&skel, &mut pose, &leg).unwrap());

        let foot = pose.head(leg.foot);
        assert!(foot.z.abs() < 1e-4, "{foot}");
        assert!(pose.head(leg.hip).abs_diff_eq(hip_before, 1e-9));
        assert!((pose.head(leg.knee).distance(pose.head(leg.hip)) - 40.0).abs() < 1e-6);
        assert!((foot.distance(pose.head(leg.knee)) - 40.0).abs() < 1e-6);
        // Hip tail follows the knee, the foot keeps its orientation.
        assert!(pose.tail(leg.hip).abs_diff_eq(pose.head(leg.knee), 1e-6));
        assert!((pose.tail(leg.foot) - foot).abs_diff_eq(toe_offset, 1e-9));
    }
}
