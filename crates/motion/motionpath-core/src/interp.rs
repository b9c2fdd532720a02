//! Interpolation helpers:
//! - vector lerp
//! - fractional index splitting for sampled sequences
//! - the quintic ease used when smoothing seams

use glam::DVec3;

#[inline]
pub fn lerp_vec3(a: DVec3, b: DVec3, t: f64) -> DVec3 {
    a + (b - a) * t
}

/// Split a fractional index into `(i0, i1, local_t)` over a sequence of
/// length `len`.
/// Edge cases:
/// - `x <= 0` returns `(0, 0, 0)`.
/// - `x >= len - 1` returns `(last, last, 0)`.
pub fn split_index(x: f64, len: usize) -> (usize, usize, f64) {
    if len == 0 || !x.is_finite() || x <= 0.0 {
        return (0, 0, 0.0);
    }
    let last = len - 1;
    if x >= last as f64 {
        return (last, last, 0.0);
    }
    let i0 = x.floor() as usize;
    (i0, i0 + 1, x - i0 as f64)
}

/// Quintic smoothstep `6x^5 - 15x^4 + 10x^3`, clamped to [0,1].
#[inline]
pub fn quintic_ease(x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    x * x * x * (x * (x * 6.0 - 15.0) + 10.0)
}

/// Wrap an angle difference into (-PI, PI].
#[inline]
pub fn wrap_angle(a: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let mut r = a.rem_euclid(TAU);
    if r > PI {
        r -= TAU;
    }
    r
}
