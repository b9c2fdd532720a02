//! Registration curves: time warp and planar alignment between two motions,
//! and weighted blends synthesized along them.
//!
//! Building a curve is quadratic in the clip lengths (every frame of A is
//! aligned against every frame of B), so [`RegistrationCurve::build`] takes a
//! [`CancelToken`] and refuses frame products above the configured limit.
//! Blending is linear in the path length and can be re-run cheaply with
//! different weights.

pub mod alignment;
pub mod blend;
pub mod samples;
pub mod timewarp;

use std::f64::consts::PI;

use glam::DVec3;

use crate::cancel::CancelToken;
use crate::config::{AngleUnwrap, RegistrationConfig};
use crate::error::{MotionError, Result};
use crate::interp::{split_index, wrap_angle};
use crate::motion::Motion;

pub use alignment::{alignment_transform, distance_map, DistanceMap, Grid, PlanarTransform, TransformMap};
pub use blend::{BlendWeights, BlendedMotion};
pub use samples::{FrameChannels, MotionSamples};
pub use timewarp::{time_warp, TimeWarpPath};

/// Name given to the registration of `a` against `b`.
pub fn registration_name(a: &str, b: &str) -> String {
    format!("{a}_blend_{b}")
}

#[derive(Clone, Debug)]
pub struct RegistrationCurve {
    name: String,
    motion_a: String,
    motion_b: String,
    samples_a: MotionSamples,
    samples_b: MotionSamples,
    distances: DistanceMap,
    transforms: TransformMap,
    path: TimeWarpPath,
    /// Alignment of B for every path step; A is always the identity.
    alignment: Vec<PlanarTransform>,
    cfg: RegistrationConfig,
}

impl RegistrationCurve {
    /// Register `b` against `a`. Both motions are sampled with their path
    /// edits applied.
    pub fn build(name: &str, a: &Motion, b: &Motion, cfg: &RegistrationConfig, cancel: &CancelToken) -> Result<Self> {
        a.skeleton().check_compatible(b.skeleton())?;
        check_frame_product(a.frame_count(), b.frame_count(), cfg)?;
        let mut curve = Self::from_samples(
            name,
            MotionSamples::from_motion(a),
            MotionSamples::from_motion(b),
            cfg,
            cancel,
        )?;
        curve.motion_a = a.name().to_string();
        curve.motion_b = b.name().to_string();
        Ok(curve)
    }

    /// Register pre-extracted samples, e.g. ones built from host-evaluated
    /// positions. B's joints are matched to A's by name.
    pub fn from_samples(
        name: &str,
        samples_a: MotionSamples,
        samples_b: MotionSamples,
        cfg: &RegistrationConfig,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let samples_b = samples_b.in_joint_order_of(&samples_a)?;
        samples_a.check_blendable(&samples_b)?;
        check_frame_product(samples_a.len(), samples_b.len(), cfg)?;
        log::debug!(
            "registering '{name}': {}x{} frames, {} markers, window {}",
            samples_a.len(),
            samples_b.len(),
            samples_a.positions()[0].len(),
            cfg.window
        );

        let (distances, transforms) =
            distance_map(samples_a.positions(), samples_b.positions(), cfg.window, cancel)?;
        let path = time_warp(&distances, cancel)?;
        let alignment = alignment_curve(&path, &transforms, &samples_b, cfg);
        Ok(Self {
            name: name.to_string(),
            motion_a: String::new(),
            motion_b: String::new(),
            samples_a,
            samples_b,
            distances,
            transforms,
            path,
            alignment,
            cfg: *cfg,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Names of the registered motions; empty when built from samples.
    pub fn motion_names(&self) -> (&str, &str) {
        (&self.motion_a, &self.motion_b)
    }

    pub fn samples_a(&self) -> &MotionSamples {
        &self.samples_a
    }

    pub fn samples_b(&self) -> &MotionSamples {
        &self.samples_b
    }

    pub fn distances(&self) -> &DistanceMap {
        &self.distances
    }

    pub fn transforms(&self) -> &TransformMap {
        &self.transforms
    }

    pub fn path(&self) -> &TimeWarpPath {
        &self.path
    }

    pub fn alignment(&self) -> &[PlanarTransform] {
        &self.alignment
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.cfg
    }

    /// Total aligned distance along the time-warp path.
    pub fn path_cost(&self) -> f64 {
        self.path.steps().iter().map(|&(i, j)| *self.distances.get(i, j)).sum()
    }

    /// Redo angle unwrapping with a different mode or threshold. The distance
    /// map and path are kept.
    pub fn set_unwrap(&mut self, unwrap: AngleUnwrap, threshold: f64) -> Result<()> {
        if !(threshold > 0.0) {
            return Err(MotionError::InvalidInput(format!(
                "unwrap threshold must be positive, got {threshold}"
            )));
        }
        self.cfg.unwrap = unwrap;
        self.cfg.unwrap_threshold = threshold;
        self.alignment = alignment_curve(&self.path, &self.transforms, &self.samples_b, &self.cfg);
        Ok(())
    }

    fn alignment_at(&self, u: f64) -> PlanarTransform {
        let (i0, i1, t) = split_index(u, self.alignment.len());
        self.alignment[i0].lerp(&self.alignment[i1], t)
    }

    /// Synthesize a blended clip along the curve.
    ///
    /// The path parameter advances so the dominant clip plays at roughly its
    /// own rate: each step moves `w0 / s0 + w1 / s1`, where `s` is the local
    /// frames-per-step slope of each clip along the time warp. The blended
    /// root is carried by a running transform that composes the per-step
    /// change of each clip's alignment, keeping the trajectory continuous.
    pub fn blend(&self, weights: &BlendWeights) -> Result<BlendedMotion> {
        weights.validate()?;
        let last = (self.path.len() - 1) as f64;
        let frames_a = self.samples_a.len();
        let cfg = &self.cfg;

        let mut out = BlendedMotion {
            name: self.name.clone(),
            joint_names: self.samples_a.joint_names().to_vec(),
            rotation_orders: self.samples_a.rotation_orders().to_vec(),
            frames: Vec::with_capacity(self.path.len()),
            weights: Vec::with_capacity(self.path.len()),
            sources: Vec::with_capacity(self.path.len()),
        };

        let mut running = PlanarTransform::IDENTITY;
        let mut u = 0.0;
        loop {
            let (fa, fb) = self.path.sample(u);
            let w0 = weights.weight_a(fa, frames_a);
            let w1 = 1.0 - w0;
            let align_b = self.alignment_at(u);
            let m0 = self.samples_a.channels_at(fa);
            let m1 = self.samples_b.channels_at(fb);

            let root = running.apply(m0.root * w0 + align_b.apply(m1.root) * w1);
            let rotations = m0
                .rotations
                .iter()
                .zip(&m1.rotations)
                .map(|(r0, r1)| *r0 * w0 + *r1 * w1)
                .collect();
            out.frames.push(FrameChannels { root, rotations });
            out.weights.push(w0);
            out.sources.push((fa, fb));

            let (s0, s1) = self.path.slope(u, cfg.rate_window);
            let step = w0 / s0.max(cfg.min_time_slope) + w1 / s1.max(cfg.min_time_slope);
            let next = u + step;
            if next > last + 1e-9 {
                break;
            }

            // A's alignment is the identity, so its incremental change is too.
            let from_b = running
                .compose(&align_b)
                .compose(&self.alignment_at(next).inverse());
            // Headings come out of atan2; blend on the shortest arc so a
            // crossing of ±π does not flip the running transform.
            running = PlanarTransform::new(
                running.theta + w1 * wrap_angle(from_b.theta - running.theta),
                running.ty + w1 * (from_b.ty - running.ty),
                running.tx + w1 * (from_b.tx - running.tx),
            );
            u = next;
        }

        log::debug!(
            "blend '{}': {} frames from a {}-step path",
            self.name,
            out.frames.len(),
            self.path.len()
        );
        Ok(out)
    }
}

fn check_frame_product(frames_a: usize, frames_b: usize, cfg: &RegistrationConfig) -> Result<()> {
    let product = frames_a.saturating_mul(frames_b);
    if let Some(limit) = cfg.max_frame_product {
        if product > limit {
            return Err(MotionError::RegistrationTooLarge {
                frames_a,
                frames_b,
                limit,
            });
        }
    }
    if product > cfg.warn_frame_product {
        log::warn!("registration of {frames_a}x{frames_b} frames is expensive");
    }
    Ok(())
}

/// B's alignment at every path step, with consecutive angle jumps above the
/// threshold unwrapped.
fn alignment_curve(
    path: &TimeWarpPath,
    transforms: &TransformMap,
    samples_b: &MotionSamples,
    cfg: &RegistrationConfig,
) -> Vec<PlanarTransform> {
    let mut out: Vec<PlanarTransform> = Vec::with_capacity(path.len());
    for &(i, j) in path.steps() {
        let mut t = *transforms.get(i, j);
        if let Some(prev) = out.last() {
            let jump = t.theta - prev.theta;
            if jump.abs() > cfg.unwrap_threshold {
                t = match cfg.unwrap {
                    AngleUnwrap::FullTurn => PlanarTransform {
                        theta: prev.theta + wrap_angle(jump),
                        ..t
                    },
                    AngleUnwrap::HalfTurn => {
                        half_turn(&t, jump.signum() * PI, samples_b.channels()[j].root)
                    }
                };
            }
        }
        out.push(t);
    }
    out
}

/// Rotate `t` back by `turn` and re-solve its translation so `pivot` lands
/// where `t` put it.
fn half_turn(t: &PlanarTransform, turn: f64, pivot: DVec3) -> PlanarTransform {
    let target = t.apply(pivot);
    let rotated = PlanarTransform::new(t.theta - turn, 0.0, 0.0).apply(pivot);
    PlanarTransform::new(t.theta - turn, target.y - rotated.y, target.x - rotated.x)
}
