//! Dynamic time warping over a distance map.

use serde::{Deserialize, Serialize};

use super::alignment::DistanceMap;
use crate::cancel::CancelToken;
use crate::error::{MotionError, Result};
use crate::interp::split_index;

/// Monotone sequence of frame pairs `(a, b)` from `(0, 0)` to the last frame
/// of both clips. Each step advances `a`, `b` or both by one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(usize, usize)>", into = "Vec<(usize, usize)>")]
pub struct TimeWarpPath {
    steps: Vec<(usize, usize)>,
}

impl TryFrom<Vec<(usize, usize)>> for TimeWarpPath {
    type Error = MotionError;

    fn try_from(steps: Vec<(usize, usize)>) -> Result<Self> {
        Self::new(steps)
    }
}

impl From<TimeWarpPath> for Vec<(usize, usize)> {
    fn from(path: TimeWarpPath) -> Self {
        path.steps
    }
}

impl TimeWarpPath {
    pub fn new(steps: Vec<(usize, usize)>) -> Result<Self> {
        match steps.first() {
            None => return Err(MotionError::InvalidInput("time warp path is empty".into())),
            Some(&first) if first != (0, 0) => {
                return Err(MotionError::InvalidInput(format!(
                    "time warp path starts at {first:?}, not (0, 0)"
                )))
            }
            Some(_) => {}
        }
        for (k, w) in steps.windows(2).enumerate() {
            let (da, db) = (w[1].0.wrapping_sub(w[0].0), w[1].1.wrapping_sub(w[0].1));
            if da > 1 || db > 1 || da + db == 0 {
                return Err(MotionError::InvalidInput(format!(
                    "time warp step {k}: {:?} -> {:?} is not monotone",
                    w[0], w[1]
                )));
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[(usize, usize)] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Never true for a validated path; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> (usize, usize) {
        self.steps[self.steps.len() - 1]
    }

    /// Fractional frame pair at path parameter `u`, clamped to the path.
    pub fn sample(&self, u: f64) -> (f64, f64) {
        let (i0, i1, t) = split_index(u, self.steps.len());
        let (a0, b0) = self.steps[i0];
        let (a1, b1) = self.steps[i1];
        (
            a0 as f64 + (a1 as f64 - a0 as f64) * t,
            b0 as f64 + (b1 as f64 - b0 as f64) * t,
        )
    }

    /// Frames of each clip advanced per unit of `u`, measured over
    /// `±radius` steps around `u`.
    pub fn slope(&self, u: f64, radius: usize) -> (f64, f64) {
        let last = self.steps.len() - 1;
        if last == 0 {
            return (1.0, 1.0);
        }
        let centre = u.round().clamp(0.0, last as f64) as usize;
        let lo = centre.saturating_sub(radius.max(1));
        let hi = (centre + radius.max(1)).min(last);
        let span = (hi - lo) as f64;
        let (a0, b0) = self.steps[lo];
        let (a1, b1) = self.steps[hi];
        ((a1 - a0) as f64 / span, (b1 - b0) as f64 / span)
    }
}

/// Minimum-cost monotone path through `cost` from `(0, 0)` to the opposite
/// corner. Ties prefer the diagonal, then advancing B alone, then A alone.
pub fn time_warp(cost: &DistanceMap, cancel: &CancelToken) -> Result<TimeWarpPath> {
    let (rows, cols) = (cost.rows(), cost.cols());
    if rows == 0 || cols == 0 {
        return Err(MotionError::DegenerateInput(
            "time warp needs at least one frame per clip".into(),
        ));
    }

    let mut acc = vec![0.0; rows * cols];
    let at = |i: usize, j: usize| i * cols + j;
    for i in 0..rows {
        cancel.check()?;
        for j in 0..cols {
            let c = *cost.get(i, j);
            acc[at(i, j)] = match (i, j) {
                (0, 0) => c,
                (0, _) => acc[at(0, j - 1)] + c,
                (_, 0) => acc[at(i - 1, 0)] + c,
                _ => {
                    let best = acc[at(i - 1, j - 1)]
                        .min(acc[at(i - 1, j)])
                        .min(acc[at(i, j - 1)]);
                    best + c
                }
            };
        }
    }

    let (mut i, mut j) = (rows - 1, cols - 1);
    let mut steps = vec![(i, j)];
    while i > 0 && j > 0 {
        let diag = acc[at(i - 1, j - 1)];
        let left = acc[at(i, j - 1)];
        let up = acc[at(i - 1, j)];
        if diag <= left && diag <= up {
            i -= 1;
            j -= 1;
        } else if left <= up {
            j -= 1;
        } else {
            i -= 1;
        }
        steps.push((i, j));
    }
    // Along the edge back to the corner.
    while i > 0 {
        i -= 1;
        steps.push((i, j));
    }
    while j > 0 {
        j -= 1;
        steps.push((i, j));
    }
    steps.reverse();
    log::debug!("time warp path: {} steps over {rows}x{cols} frames", steps.len());
    TimeWarpPath::new(steps)
}
