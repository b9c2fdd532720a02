use glam::DVec3;
use motionpath_core::{
    parse_bvh, AxisMapping, Config, Motion, MotionError, ParseConfig, Pose, Session,
};
use motionpath_test_fixtures::motions;

fn approx_vec(a: DVec3, b: DVec3, eps: f64) {
    assert!(a.abs_diff_eq(b, eps), "left={a} right={b} eps={eps}");
}

#[test]
fn every_manifest_clip_with_a_frame_count_imports_with_it() {
    for key in motions::keys() {
        let Some(frames) = motions::expected_frames(&key).expect("manifest entry") else {
            continue;
        };
        let text = motions::bvh(&key).expect("load fixture");
        let motion = Motion::from_bvh_str(&key, &text, &Config::default())
            .unwrap_or_else(|e| panic!("{key}: {e}"));
        assert_eq!(motion.captured_frames(), frames, "{key}");
        assert!(motion.has_path(), "{key} should have an editable path");
    }
}

#[test]
fn walk_x_hierarchy_and_timing() {
    let text = motions::bvh("walk_x").expect("load walk_x");
    let parsed = parse_bvh(&text, &ParseConfig::default()).expect("parse walk_x");
    assert_eq!(parsed.frame_count, 8);
    assert!((parsed.frame_time - 0.033333).abs() < 1e-9);
    assert!(!parsed.is_static);

    let skel = &parsed.skeleton;
    assert_eq!(skel.len(), 5);
    assert_eq!(skel.root_joint().name, "Hips");
    // Five heads plus the tails of Spine and LeftFoot.
    assert_eq!(skel.markers().len(), 7);
    let foot = skel.require("LeftFoot").expect("LeftFoot");
    assert_eq!(skel.joint(skel.joint(foot).parent.expect("parent")).name, "LeftLeg");
}

#[test]
fn default_mapping_walks_along_world_x() {
    let text = motions::bvh("walk_x").expect("load walk_x");
    let motion = Motion::from_bvh_str("walk", &text, &Config::default()).expect("import");
    let trajectory = motion.root_trajectory();
    approx_vec(trajectory[0], DVec3::new(0.0, 0.0, 90.0), 1e-9);
    approx_vec(trajectory[7], DVec3::new(70.0, 0.0, 90.0), 1e-9);
}

#[test]
fn identity_mapping_keeps_file_axes() {
    let text = motions::bvh("walk_x").expect("load walk_x");
    let cfg = ParseConfig {
        axis_mapping: AxisMapping::identity(),
        ..ParseConfig::default()
    };
    let parsed = parse_bvh(&text, &cfg).expect("parse");
    let pose = Pose::evaluate(&parsed.skeleton, 7, glam::DMat4::IDENTITY);
    approx_vec(pose.head(parsed.skeleton.root()), DVec3::new(0.0, 90.0, 70.0), 1e-9);
}

#[test]
fn unreadable_frame_count_imports_a_static_pose() {
    let text = motions::bvh("static_pose").expect("load static_pose");
    let motion = Motion::from_bvh_str("static", &text, &Config::default()).expect("static import");
    assert!(motion.is_static());
    assert_eq!(motion.frame_count(), 1);
    assert!(!motion.has_path());
    assert!(matches!(
        motion.control_points(),
        Err(MotionError::DegenerateInput(_))
    ));
}

#[test]
fn bad_header_is_a_parse_error_on_line_one() {
    let path = motions::path("bad_header").expect("fixture path");
    let err = Motion::from_file(&path, &Config::default()).unwrap_err();
    match err {
        MotionError::Parse { path: Some(p), line, .. } => {
            assert_eq!(line, 1);
            assert!(p.ends_with("bad_header.bvh"));
        }
        other => panic!("expected a parse error, got {other}"),
    }
}

#[test]
fn session_loads_files_under_their_file_name() {
    let mut session = Session::default();
    let path = motions::path("walk_x").expect("fixture path");
    let motion = session.load_bvh(&path).expect("load");
    assert_eq!(motion.name(), "walk_x.bvh");
    assert!(session.load_bvh(&path).is_err());
    assert_eq!(session.motion_names(), vec!["walk_x.bvh"]);
}
