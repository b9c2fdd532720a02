use glam::DVec3;
use motionpath_core::registration::Grid;
use motionpath_core::{
    concatenate, registration_name, time_warp, AngleUnwrap, BlendWeights, CancelToken,
    ConcatConfig, Config, Motion, MotionError, RegistrationConfig, RegistrationCurve,
};
use motionpath_test_fixtures::motions;

fn load(name: &str) -> Motion {
    let text = motions::bvh(name).expect("load fixture");
    Motion::from_bvh_str(name, &text, &Config::default()).expect("import fixture")
}

fn approx_vec(a: DVec3, b: DVec3, eps: f64) {
    assert!(a.abs_diff_eq(b, eps), "left={a} right={b} eps={eps}");
}

const TWO_JOINTS: &str = "HIERARCHY
ROOT Hips
{
  OFFSET 0 0 0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT Head
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
Frames: 4
Frame Time: 0.04
0 0 0 0 0 0 0 0 0
0 0 1 0 0 0 0 0 0
0 0 2 0 0 0 0 0 0
0 0 3 0 0 0 0 0 0
";

#[test]
fn concatenated_root_is_continuous_at_the_seam() {
    let (a, b) = (load("walk_x"), load("crouch_walk"));
    let joined = concatenate(&a, &b, &ConcatConfig::default()).expect("concatenate");
    assert_eq!(joined.name(), "walk_x$crouch_walk");
    assert_eq!(joined.captured_frames(), 18);

    let root = joined.skeleton().root_joint();
    let (last_a, first_b) = (root.frames[8], root.frames[9]);
    for (x, y) in last_a.iter().zip(&first_b) {
        assert!((x - y).abs() < 1e-6, "{last_a:?} vs {first_b:?}");
    }
    // Inputs are untouched.
    assert_eq!(a.captured_frames(), 8);
    assert_eq!(b.captured_frames(), 10);
}

#[test]
fn concatenation_keeps_b_relative_motion() {
    let (a, b) = (load("walk_x"), load("crouch_walk"));
    let joined = concatenate(&a, &b, &ConcatConfig::default()).expect("concatenate");
    let root = joined.skeleton().root();
    for k in 1..10 {
        let step_joined = joined.original_pose(8 + k).head(root) - joined.original_pose(7 + k).head(root);
        let step_b = b.pose(k).head(root) - b.pose(k - 1).head(root);
        approx_vec(step_joined, step_b, 1e-6);
    }
}

#[test]
fn structurally_different_skeletons_are_rejected() {
    let a = load("walk_x");
    let other = Motion::from_bvh_str("small", TWO_JOINTS, &Config::default()).expect("import");
    let err = concatenate(&a, &other, &ConcatConfig::default()).unwrap_err();
    assert!(matches!(err, MotionError::SkeletonMismatch(_)));
    let err = RegistrationCurve::build(
        "bad",
        &a,
        &other,
        &RegistrationConfig::default(),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, MotionError::SkeletonMismatch(_)));
}

#[test]
fn time_warp_is_monotone_on_arbitrary_maps() {
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed % 10_000) as f64 / 10_000.0
    };
    for rows in 1..10 {
        for cols in 1..10 {
            let mut cost = Grid::filled(rows, cols, 0.0);
            for i in 0..rows {
                for j in 0..cols {
                    cost.set(i, j, next());
                }
            }
            let path = time_warp(&cost, &CancelToken::new()).expect("time warp");
            assert_eq!(path.steps()[0], (0, 0));
            assert_eq!(path.last(), (rows - 1, cols - 1));
            for w in path.steps().windows(2) {
                let (da, db) = (w[1].0 - w[0].0, w[1].1 - w[0].1);
                assert!(da <= 1 && db <= 1 && da + db >= 1, "{:?}", w);
            }
        }
    }
}

#[test]
fn registration_blend_becomes_an_editable_motion() {
    let (a, b) = (load("walk_x"), load("curve_walk"));
    let name = registration_name(a.name(), b.name());
    assert_eq!(name, "walk_x_blend_curve_walk");
    let curve = RegistrationCurve::build(&name, &a, &b, &RegistrationConfig::default(), &CancelToken::new())
        .expect("register");
    assert_eq!(curve.path().steps()[0], (0, 0));
    assert_eq!(curve.path().last(), (7, 11));
    assert_eq!(curve.alignment().len(), curve.path().len());

    let blended = curve.blend(&BlendWeights::Transition).expect("blend");
    assert!(!blended.is_empty());
    assert_eq!(blended.weights()[0], 1.0);
    approx_vec(blended.frames()[0].root, a.pose(0).head(a.skeleton().root()), 1e-9);

    let motion = blended.to_motion("mix", &a, a.frame_time()).expect("to motion");
    assert_eq!(motion.captured_frames(), blended.len());
    assert_eq!(motion.frame_time(), a.frame_time());
    let (first, source) = (motion.pose(0), a.pose(0));
    for id in a.skeleton().traversal() {
        approx_vec(first.head(id), source.head(id), 1e-6);
    }
}

#[test]
fn half_turn_unwrapping_builds_too() {
    let (a, b) = (load("walk_x"), load("crouch_walk"));
    let cfg = RegistrationConfig {
        unwrap: AngleUnwrap::HalfTurn,
        unwrap_threshold: 0.7,
        ..RegistrationConfig::default()
    };
    let curve = RegistrationCurve::build("ab", &a, &b, &cfg, &CancelToken::new()).expect("register");
    let out = curve.blend(&BlendWeights::Constant(0.5)).expect("blend");
    assert!(out.frames().iter().all(|f| f.root.is_finite()));
}

#[test]
fn cancelled_registration_stops_early() {
    let (a, b) = (load("walk_x"), load("curve_walk"));
    let token = CancelToken::new();
    token.cancel();
    let err = RegistrationCurve::build("ab", &a, &b, &RegistrationConfig::default(), &token).unwrap_err();
    assert!(matches!(err, MotionError::Cancelled));
}
