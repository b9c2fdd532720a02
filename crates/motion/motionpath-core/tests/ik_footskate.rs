use glam::{DQuat, DVec3};
use motionpath_core::{
    Config, FootskateCleanup, IkSolver, LegChain, Motion, MotionError, SolveResult,
};
use motionpath_test_fixtures::{configs, motions};

fn chain_lengths(p: &[DVec3]) -> Vec<f64> {
    p.windows(2).map(|w| w[0].distance(w[1])).collect()
}

fn solve(positions: &mut [DVec3], target: DVec3, iterations: u32, epsilon: f64) -> SolveResult {
    let mut rotations = vec![DQuat::IDENTITY; positions.len()];
    IkSolver { iterations, epsilon }
        .solve(positions, &mut rotations, target, None)
        .expect("solve")
}

#[test]
fn reachable_targets_converge_within_epsilon() {
    let base = vec![
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(0.0, 0.0, 10.0),
        DVec3::new(0.0, 3.0, 18.0),
        DVec3::new(0.0, 3.0, 25.0),
    ];
    let lengths = chain_lengths(&base);
    for target in [
        DVec3::new(5.0, 5.0, 10.0),
        DVec3::new(-8.0, 2.0, 15.0),
        DVec3::new(0.0, 12.0, 4.0),
    ] {
        let mut p = base.clone();
        let res = solve(&mut p, target, 200, 1e-8);
        assert!(res.converged, "{target}: {res:?}");
        assert!(p[3].distance(target) < 1e-6);
        for (a, b) in chain_lengths(&p).iter().zip(&lengths) {
            assert!((a - b).abs() < 1e-9);
        }
        assert!(p[0].abs_diff_eq(base[0], 1e-12));
    }
}

#[test]
fn unreachable_target_fully_extends_the_chain() {
    let mut p = vec![DVec3::ZERO, DVec3::new(0.0, 0.0, 4.0), DVec3::new(0.0, 3.0, 8.0)];
    let total: f64 = chain_lengths(&p).iter().sum();
    let target = DVec3::new(30.0, -10.0, 5.0);
    let res = solve(&mut p, target, 10, 1e-4);
    assert!(res.stretched);
    let reach: f64 = chain_lengths(&p).iter().sum();
    assert!((reach - total).abs() < 1e-9);
    assert!((p[2].distance(p[0]) - total).abs() < 1e-9);
    let dir = (target - p[0]).normalize();
    assert!((p[2] - p[0]).normalize().abs_diff_eq(dir, 1e-9));
}

#[test]
fn coincident_joints_are_a_degenerate_chain() {
    let mut p = vec![DVec3::ZERO, DVec3::X, DVec3::X];
    let mut r = vec![DQuat::IDENTITY; 3];
    let err = IkSolver::default()
        .solve(&mut p, &mut r, DVec3::Y, None)
        .unwrap_err();
    assert!(matches!(err, MotionError::DegenerateChain { bone: 1, .. }));
}

#[test]
fn foot_plant_config_lifts_sunk_feet() {
    let cfg = Config::from_json_str(&configs::json("foot_plant").expect("load config"))
        .expect("parse config");
    let text = motions::bvh("walk_x").expect("load walk_x");
    let motion = Motion::from_bvh_str("walk", &text, &cfg).expect("import");
    let leg = LegChain::from_names(motion.skeleton(), "LeftUpLeg", "LeftLeg", "LeftFoot")
        .expect("leg");
    let fix = FootskateCleanup::new(&cfg.ik, cfg.footskate);

    let before = motion.poses();
    let (after, corrected) = fix.cleanup_motion(&motion, &leg).expect("cleanup");
    assert_eq!(after.len(), before.len());
    assert!(corrected > 0, "walk_x sinks below a ground at 12");

    let ground = cfg.footskate.ground_height;
    for (f, (old, new)) in before.iter().zip(&after).enumerate() {
        let (was, now) = (old.head(leg.foot), new.head(leg.foot));
        if was.z >= ground {
            assert_eq!(old, new, "frame {f} was above ground and must be untouched");
            continue;
        }
        assert!(now.z > was.z, "frame {f}: foot did not rise ({} -> {})", was.z, now.z);
        assert!((now.z - ground).abs() < (was.z - ground).abs());
        // Hip stays put, leg bones keep their lengths.
        assert!(new.head(leg.hip).abs_diff_eq(old.head(leg.hip), 1e-9));
        assert!((new.head(leg.knee).distance(new.head(leg.hip)) - 40.0).abs() < 1e-6);
        assert!((now.distance(new.head(leg.knee)) - 40.0).abs() < 1e-6);
        // The rest of the body is untouched.
        let spine = motion.skeleton().require("Spine").expect("Spine");
        assert_eq!(new.get(spine), old.get(spine));
    }
}
