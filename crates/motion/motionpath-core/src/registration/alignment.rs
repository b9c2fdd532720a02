//! Rigid planar alignment between windows of two motions, and the distance
//! map built from it.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;

/// Rotation about world Z followed by a translation in the XY plane:
/// `Translate(tx, ty, 0) * RotateZ(theta)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanarTransform {
    pub theta: f64,
    pub ty: f64,
    pub tx: f64,
}

impl PlanarTransform {
    pub const IDENTITY: PlanarTransform = PlanarTransform {
        theta: 0.0,
        ty: 0.0,
        tx: 0.0,
    };

    pub fn new(theta: f64, ty: f64, tx: f64) -> Self {
        Self { theta, ty, tx }
    }

    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_translation(DVec3::new(self.tx, self.ty, 0.0)) * DMat4::from_rotation_z(self.theta)
    }

    /// Inverse of [`to_matrix`](Self::to_matrix) for matrices of that form.
    /// Any tilt out of the XY plane is ignored.
    pub fn from_matrix(m: &DMat4) -> Self {
        let theta = m.x_axis.y.atan2(m.x_axis.x);
        Self {
            theta,
            ty: m.w_axis.y,
            tx: m.w_axis.x,
        }
    }

    pub fn apply(&self, p: DVec3) -> DVec3 {
        let (s, c) = self.theta.sin_cos();
        DVec3::new(c * p.x - s * p.y + self.tx, s * p.x + c * p.y + self.ty, p.z)
    }

    /// Component-wise interpolation of `(theta, ty, tx)`.
    pub fn lerp(&self, other: &PlanarTransform, t: f64) -> Self {
        Self {
            theta: self.theta + (other.theta - self.theta) * t,
            ty: self.ty + (other.ty - self.ty) * t,
            tx: self.tx + (other.tx - self.tx) * t,
        }
    }

    /// `self * other` as matrices.
    pub fn compose(&self, other: &PlanarTransform) -> Self {
        Self::from_matrix(&(self.to_matrix() * other.to_matrix()))
    }

    pub fn inverse(&self) -> Self {
        Self::from_matrix(&self.to_matrix().inverse())
    }
}

/// Equal-length windows `[f0, f0 + n)` and `[f1, f1 + n)`, each clipped to its
/// clip's end.
pub fn window_bounds(f0: usize, len0: usize, f1: usize, len1: usize, window: usize) -> usize {
    let n0 = (f0 + window).min(len0).saturating_sub(f0);
    let n1 = (f1 + window).min(len1).saturating_sub(f1);
    n0.min(n1)
}

/// Least-squares planar transform taking the window of `p1` starting at `f1`
/// onto the window of `p0` starting at `f0`. Each frame holds one position
/// per marker; only x and y enter the fit.
pub fn alignment_transform(p0: &[Vec<DVec3>], f0: usize, p1: &[Vec<DVec3>], f1: usize, window: usize) -> PlanarTransform {
    let frames = window_bounds(f0, p0.len(), f1, p1.len(), window);
    let pairs = (0..frames).flat_map(move |k| p0[f0 + k].iter().zip(p1[f1 + k].iter()));

    let mut n = 0usize;
    let (mut x0, mut y0, mut x1, mut y1) = (0.0, 0.0, 0.0, 0.0);
    let (mut cross, mut dot) = (0.0, 0.0);
    for (a, b) in pairs {
        n += 1;
        x0 += a.x;
        y0 += a.y;
        x1 += b.x;
        y1 += b.y;
        cross += a.y * b.x - b.y * a.x;
        dot += a.y * b.y + a.x * b.x;
    }
    if n == 0 {
        return PlanarTransform::IDENTITY;
    }
    let w = 1.0 / n as f64;
    let (x0, y0, x1, y1) = (x0 * w, y0 * w, x1 * w, y1 * w);
    let num = cross * w - (y0 * x1 - y1 * x0);
    let den = dot * w - (y0 * y1 + x0 * x1);
    // atan2 picks the minimizing branch; a plain atan of the ratio can land
    // on the maximum.
    let theta = num.atan2(den);
    let (s, c) = theta.sin_cos();
    PlanarTransform {
        theta,
        ty: y0 - s * x1 - c * y1,
        tx: x0 - c * x1 + s * y1,
    }
}

/// Mean squared distance between two frames' markers after moving `p1` by
/// `t`.
pub fn frame_distance(p0: &[DVec3], p1: &[DVec3], t: &PlanarTransform) -> f64 {
    let n = p0.len().min(p1.len());
    if n == 0 {
        return 0.0;
    }
    let w = 1.0 / n as f64;
    p0.iter()
        .zip(p1)
        .map(|(a, b)| w * (*a - t.apply(*b)).length_squared())
        .sum()
}

/// Dense row-major grid indexed by (frame in A, frame in B).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }
}

impl<T> Grid<T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self.data[i * self.cols + j] = value;
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }
}

pub type DistanceMap = Grid<f64>;
pub type TransformMap = Grid<PlanarTransform>;

/// Alignment transform and aligned distance for every frame pair. The
/// token is polled once per row.
pub fn distance_map(
    p0: &[Vec<DVec3>],
    p1: &[Vec<DVec3>],
    window: usize,
    cancel: &CancelToken,
) -> Result<(DistanceMap, TransformMap)> {
    let mut distances = Grid::filled(p0.len(), p1.len(), 0.0);
    let mut transforms = Grid::filled(p0.len(), p1.len(), PlanarTransform::IDENTITY);
    for i in 0..p0.len() {
        cancel.check()?;
        for j in 0..p1.len() {
            let t = alignment_transform(p0, i, p1, j, window);
            distances.set(i, j, frame_distance(&p0[i], &p1[j], &t));
            transforms.set(i, j, t);
        }
    }
    Ok((distances, transforms))
}
