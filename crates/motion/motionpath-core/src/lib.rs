//! Motionpath Core (host-agnostic)
//!
//! Imports BVH clips into a joint arena, fits a cubic B-spline to the root
//! path and retargets the clip whenever that path is edited. On top of that
//! sit FABRIK-based foot-contact cleanup, clip concatenation and registration
//! curves (time warp plus planar alignment) for blending two clips.
//! Scene objects, keyframe storage and UI live behind the traits in [`host`].

pub mod bvh;
pub mod cancel;
pub mod concat;
pub mod config;
pub mod curve;
pub mod error;
pub mod footskate;
pub mod host;
pub mod ids;
pub mod ik;
pub mod interp;
pub mod kinematics;
pub mod motion;
pub mod registration;
pub mod retarget;
pub mod session;
pub mod skeleton;

// Re-exports for consumers (host adapters)
pub use bvh::{load_bvh, parse_bvh, AxisMapping, ParsedBvh};
pub use cancel::CancelToken;
pub use concat::{concatenate, concatenated_name};
pub use config::{
    AngleUnwrap, ConcatConfig, Config, FitConfig, FootskateConfig, IkConfig, ParseConfig,
    RegistrationConfig, RetargetConfig,
};
pub use curve::{chord_length_parameters, CubicBSpline, SplineFit, PATH_SUBDIVISIONS};
pub use error::{MotionError, Result};
pub use footskate::{alpha_blend, FootskateCleanup, LegChain};
pub use host::{FrameEvaluator, KeyframeSink, PoseEvaluator, PrimitiveFactory, SceneBinding};
pub use ids::JointId;
pub use ik::{IkSolver, SolveResult};
pub use kinematics::{evaluate_all, root_trajectory, JointTransform, Pose};
pub use motion::{Motion, MotionPath};
pub use registration::{
    registration_name, time_warp, BlendWeights, BlendedMotion, FrameChannels, MotionSamples,
    PlanarTransform, RegistrationCurve, TimeWarpPath,
};
pub use retarget::{RetargetOutcome, Retargeter};
pub use session::Session;
pub use skeleton::{
    Axis, Channel, ChannelFrame, ChannelKind, ChannelLayout, Joint, Marker, MarkerKind,
    RotationStep, Skeleton, SkeletonBuilder, IDENTITY_FRAME,
};
