//! Motion concatenation.
//!
//! The second clip's captured frames are appended after the first clip's,
//! and a constant offset is added to every root channel from the splice
//! onward so the root is continuous across the seam.

use crate::config::ConcatConfig;
use crate::error::Result;
use crate::interp::{quintic_ease, wrap_angle};
use crate::motion::Motion;
use crate::skeleton::{ChannelFrame, ChannelLayout};

/// Name given to the concatenation of `a` and `b`.
pub fn concatenated_name(a: &str, b: &str) -> String {
    format!("{a}${b}")
}

/// Concatenate `b` after `a`. Path edits of both inputs are baked in first.
/// Neither input is modified; structurally different skeletons are rejected
/// with `SkeletonMismatch`.
pub fn concatenate(a: &Motion, b: &Motion, cfg: &ConcatConfig) -> Result<Motion> {
    a.skeleton().check_compatible(b.skeleton())?;

    let mut out = a.baked_skeleton();
    let other = b.baked_skeleton();
    let splice = out.slot_count();

    let ids: Vec<_> = out.iter().map(|(id, _)| id).collect();
    for id in ids {
        let name = out.joint(id).name.clone();
        let source = other.joint(other.require(&name)?);
        let joint = out.joint_mut(id);
        if joint.layout == source.layout {
            joint.frames.extend_from_slice(&source.frames[1..]);
        } else {
            // Re-express both sides in one layout so neither loses channels.
            let full = joint.layout.with_all_channels();
            for frame in joint.frames.iter_mut().skip(1) {
                *frame = convert_frame(&joint.layout, &full, frame);
            }
            joint
                .frames
                .extend(source.frames[1..].iter().map(|f| convert_frame(&source.layout, &full, f)));
            joint.layout = full;
        }
    }

    let root = out.root();
    let root_frames = &mut out.joint_mut(root).frames;
    if splice < root_frames.len() {
        let mut offset = [0.0; 6];
        for (i, o) in offset.iter_mut().enumerate() {
            *o = root_frames[splice - 1][i] - root_frames[splice][i];
        }
        for frame in &mut root_frames[splice..] {
            for (v, o) in frame.iter_mut().zip(offset) {
                *v += o;
            }
        }
    }

    if cfg.smooth && cfg.smooth_window > 0 {
        for id in out.traversal() {
            smooth_seam(&mut out.joint_mut(id).frames, splice, cfg.smooth_window);
        }
    }

    log::debug!(
        "concatenated '{}' ({} frames) and '{}' ({} frames)",
        a.name(),
        a.captured_frames(),
        b.name(),
        b.captured_frames()
    );
    Ok(a.derive(&concatenated_name(a.name(), b.name()), out, a.frame_time()))
}

fn convert_frame(from: &ChannelLayout, to: &ChannelLayout, frame: &ChannelFrame) -> ChannelFrame {
    let t = from.translation(frame);
    let q = glam::DQuat::from_mat4(&from.rotation_matrix(frame));
    let r = to.decompose_rotation(q);
    [t.x, t.y, t.z, r[0], r[1], r[2]]
}

/// Spread each rotation jump at `splice` over `window` slots either side:
/// slots before the seam ease half way towards it, slots after ease back.
fn smooth_seam(frames: &mut [ChannelFrame], splice: usize, window: usize) {
    if splice == 0 || splice >= frames.len() {
        return;
    }
    let mut jump = [0.0; 3];
    for (i, j) in jump.iter_mut().enumerate() {
        let d = frames[splice][3 + i] - frames[splice - 1][3 + i];
        *j = wrap_angle(d.to_radians()).to_degrees();
    }
    let w = window as f64;
    let first = splice.saturating_sub(window).max(1);
    let last = (splice + window).min(frames.len());
    for (k, frame) in frames.iter_mut().enumerate().take(last).skip(first) {
        let weight = if k < splice {
            0.5 * quintic_ease((k + window + 1 - splice) as f64 / w)
        } else {
            -0.5 * quintic_ease((splice + window - k) as f64 / w)
        };
        for i in 0..3 {
            frame[3 + i] += jump[i] * weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_joins_with_dollar() {
        assert_eq!(concatenated_name("walk", "run"), "walk$run");
    }

    #[test]
    fn seam_smoothing_closes_the_jump() {
        // Slot 0 is the placeholder; the seam sits between slots 4 and 5.
        let mut frames: Vec<ChannelFrame> = (0..10)
            .map(|k| {
                let rz = if k >= 5 { 40.0 } else { 0.0 };
                [0.0, 0.0, 0.0, 0.0, 0.0, rz]
            })
            .collect();
        smooth_seam(&mut frames, 5, 3);
        let jump = frames[5][5] - frames[4][5];
        assert!(jump.abs() < 1.0, "jump {jump}");
        // Outside the window nothing moves.
        assert_eq!(frames[1][5], 0.0);
        assert_eq!(frames[9][5], 40.0);
        // Monotone ramp through the window.
        for w in frames[1..].windows(2) {
            assert!(w[1][5] >= w[0][5] - 1e-12);
        }
    }

    #[test]
    fn seam_smoothing_uses_the_short_way_round() {
        let mut frames: Vec<ChannelFrame> = (0..6)
            .map(|k| {
                let rx = if k >= 3 { -179.0 } else { 179.0 };
                [0.0, 0.0, 0.0, rx, 0.0, 0.0]
            })
            .collect();
        smooth_seam(&mut frames, 3, 2);
        assert!((frames[2][3] - 179.0).abs() < 2.0);
        assert!((frames[3][3] + 179.0).abs() < 2.0);
    }
}
