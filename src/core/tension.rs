/// Tension scorer — fitness from how closely a plan's cumulative tension
/// follows a target dramatic arc.

use thiserror::Error;

use crate::schema::trace::ActionTrace;
use crate::schema::world::WorldDefinition;

/// Added to the error so a perfect match does not divide by zero.
const MSE_FLOOR: f64 = 0.1;

/// Rise, rise, rise, fall.
pub const DEFAULT_PATTERN: [i64; 4] = [1, 1, 1, -1];

#[derive(Debug, Error)]
pub enum TensionError {
    #[error("target tension pattern is empty")]
    EmptyPattern,
}

/// Scores action traces against a precomputed target curve.
#[derive(Debug, Clone, PartialEq)]
pub struct TensionScorer {
    target: Vec<i64>,
}

impl Default for TensionScorer {
    fn default() -> Self {
        Self {
            target: cumulative_sum(&DEFAULT_PATTERN),
        }
    }
}

impl TensionScorer {
    /// Build a scorer from per-step tension signs; the target curve is
    /// their running sum.
    pub fn new(pattern: &[i64]) -> Result<Self, TensionError> {
        if pattern.is_empty() {
            return Err(TensionError::EmptyPattern);
        }
        Ok(Self {
            target: cumulative_sum(pattern),
        })
    }

    /// The cumulative target curve.
    pub fn target(&self) -> &[i64] {
        &self.target
    }

    /// Cumulative tension of a trace, using the world's tension table.
    pub fn observed(trace: &ActionTrace, world: &WorldDefinition) -> Vec<i64> {
        let steps: Vec<i64> = trace
            .iter()
            .map(|action| world.tension_of(&action.name).value())
            .collect();
        cumulative_sum(&steps)
    }

    /// `len(trace) / (mse(observed, target) + 0.1)` with both curves
    /// upsampled to their lcm length. An empty trace scores 0.
    pub fn score(&self, trace: &ActionTrace, world: &WorldDefinition) -> f64 {
        if trace.is_empty() {
            return 0.0;
        }
        let observed = Self::observed(trace, world);
        let len = lcm(observed.len(), self.target.len());
        let mse = mean_squared_error(&resample(&observed, len), &resample(&self.target, len));
        trace.len() as f64 / (mse + MSE_FLOOR)
    }
}

pub fn cumulative_sum(values: &[i64]) -> Vec<i64> {
    values
        .iter()
        .scan(0i64, |total, v| {
            *total += v;
            Some(*total)
        })
        .collect()
}

/// Nearest-neighbour upsampling: each element repeated `len / curve.len()`
/// times. `len` must be a multiple of the curve length.
pub fn resample(curve: &[i64], len: usize) -> Vec<i64> {
    if curve.is_empty() {
        return Vec::new();
    }
    let factor = len / curve.len();
    curve
        .iter()
        .flat_map(|&v| std::iter::repeat(v).take(factor))
        .collect()
}

pub fn mean_squared_error(a: &[i64], b: &[i64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let total: i64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    total as f64 / a.len() as f64
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}
