//! Single-segment uniform cubic B-spline fitted to a sampled trajectory by
//! ordinary least squares.
//!
//! The whole trajectory maps onto one segment with parameter `t` in [0,1]
//! assigned by chord length, giving four control points an editor can drag.

use glam::{DMat4, DVec3, DVec4};
use serde::{Deserialize, Serialize};

use crate::config::FitConfig;
use crate::error::{MotionError, Result};

/// Subdivisions used when drawing a path as a polyline.
pub const PATH_SUBDIVISIONS: usize = 100;

/// Parameter values closer than this count as the same sample.
const DISTINCT_EPS: f64 = 1e-9;

/// Chord-length parameterization: `t[0] = 0`, each step advances by the
/// segment length over the total length, and `t[n-1]` is exactly 1.
pub fn chord_length_parameters(points: &[DVec3]) -> Result<Vec<f64>> {
    if points.len() < 2 {
        return Err(MotionError::DegenerateInput(format!(
            "need at least 2 samples for a chord-length parameterization, got {}",
            points.len()
        )));
    }
    let total: f64 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
    if !(total > f64::EPSILON) {
        return Err(MotionError::DegenerateInput(
            "all trajectory samples coincide".into(),
        ));
    }
    let mut t = Vec::with_capacity(points.len());
    t.push(0.0);
    let mut acc = 0.0;
    for w in points.windows(2) {
        acc += w[0].distance(w[1]) / total;
        t.push(acc);
    }
    if let Some(last) = t.last_mut() {
        *last = 1.0;
    }
    Ok(t)
}

/// The four uniform cubic B-spline basis functions at `t`.
#[inline]
pub fn basis(t: f64) -> DVec4 {
    let t2 = t * t;
    let t3 = t2 * t;
    let u = 1.0 - t;
    DVec4::new(
        u * u * u / 6.0,
        (3.0 * t3 - 6.0 * t2 + 4.0) / 6.0,
        (-3.0 * t3 + 3.0 * t2 + 3.0 * t + 1.0) / 6.0,
        t3 / 6.0,
    )
}

/// A fitted spline together with the parameters its samples were fitted at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplineFit {
    pub spline: CubicBSpline,
    pub parameters: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CubicBSpline {
    control: [DVec3; 4],
}

impl CubicBSpline {
    pub fn new(control: [DVec3; 4]) -> Self {
        Self { control }
    }

    /// Fit `points` at their chord-length parameters.
    pub fn fit(points: &[DVec3], cfg: &FitConfig) -> Result<SplineFit> {
        if points.len() < 4 {
            return Err(MotionError::DegenerateInput(format!(
                "need at least 4 samples to fit a cubic path, got {}",
                points.len()
            )));
        }
        let parameters = chord_length_parameters(points)?;
        let spline = Self::fit_with_parameters(points, &parameters, cfg)?;
        Ok(SplineFit { spline, parameters })
    }

    /// Least-squares fit at caller-supplied parameters.
    pub fn fit_with_parameters(points: &[DVec3], parameters: &[f64], cfg: &FitConfig) -> Result<Self> {
        if points.len() != parameters.len() {
            return Err(MotionError::InvalidInput(format!(
                "{} samples but {} parameters",
                points.len(),
                parameters.len()
            )));
        }
        let distinct = distinct_count(parameters);
        if distinct < 4 {
            return Err(MotionError::DegenerateInput(format!(
                "need at least 4 distinct parameter values, got {distinct}"
            )));
        }

        let mut normal = DMat4::ZERO;
        let mut rhs = [DVec4::ZERO; 3];
        for (p, t) in points.iter().zip(parameters) {
            let b = basis(*t);
            // Column j of the outer product b * b^T is b * b[j].
            normal += DMat4::from_cols(b * b.x, b * b.y, b * b.z, b * b.w);
            rhs[0] += b * p.x;
            rhs[1] += b * p.y;
            rhs[2] += b * p.z;
        }
        let det = normal.determinant();
        if !det.is_finite() || det.abs() < 1e-14 {
            return Err(MotionError::DegenerateInput(format!(
                "singular fit matrix (determinant {det:e})"
            )));
        }
        let inv = normal.inverse();
        let xs = inv * rhs[0];
        let ys = inv * rhs[1];
        let zs = inv * rhs[2];
        let mut control = [DVec3::ZERO; 4];
        for (i, c) in control.iter_mut().enumerate() {
            *c = DVec3::new(xs[i], ys[i], zs[i]);
        }
        let mut spline = Self { control };
        if cfg.flatten_z {
            spline.flatten_z();
        }
        Ok(spline)
    }

    #[inline]
    pub fn point(&self, t: f64) -> DVec3 {
        let b = basis(t);
        self.control[0] * b.x + self.control[1] * b.y + self.control[2] * b.z + self.control[3] * b.w
    }

    /// Curve points at each parameter.
    pub fn evaluate(&self, parameters: &[f64]) -> Vec<DVec3> {
        parameters.iter().map(|t| self.point(*t)).collect()
    }

    /// `subdivisions + 1` evenly spaced points from `t = 0` to `t = 1`.
    pub fn sample(&self, subdivisions: usize) -> Vec<DVec3> {
        let n = subdivisions.max(1);
        (0..=n).map(|i| self.point(i as f64 / n as f64)).collect()
    }

    pub fn control_points(&self) -> &[DVec3; 4] {
        &self.control
    }

    pub fn control_point(&self, index: usize) -> Option<DVec3> {
        self.control.get(index).copied()
    }

    pub fn set_control_point(&mut self, index: usize, p: DVec3) -> Result<()> {
        let slot = self.control.get_mut(index).ok_or_else(|| {
            MotionError::InvalidInput(format!("control point index {index} out of range 0..4"))
        })?;
        *slot = p;
        Ok(())
    }

    pub fn set_control_points(&mut self, control: [DVec3; 4]) {
        self.control = control;
    }

    pub fn translate(&mut self, offset: DVec3) {
        for c in &mut self.control {
            *c += offset;
        }
    }

    /// Drop every control point onto the z = 0 plane.
    pub fn flatten_z(&mut self) {
        for c in &mut self.control {
            c.z = 0.0;
        }
    }
}

fn distinct_count(parameters: &[f64]) -> usize {
    let mut sorted: Vec<f64> = parameters.iter().copied().filter(|t| t.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut count = 0;
    let mut last = f64::NEG_INFINITY;
    for t in sorted {
        if t - last > DISTINCT_EPS {
            count += 1;
            last = t;
        }
    }
    count
}
