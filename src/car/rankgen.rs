//! CAR ranking-number generators (§4.5): pure functions filling a
//! normalized, descending weight vector `crc[1..slots]` from a qualitative
//! step count.
//!
//! Each generator is a zero-sized marker type dispatched through
//! `enum_dispatch`, the same compile-time dispatch pattern the teacher
//! reserves for interchangeable per-call strategies (its `Callback`
//! variants in `src/callback.rs`) rather than a `Box<dyn Trait>`.

use enum_dispatch::enum_dispatch;

use crate::error::{EngineError, EngineResult};

#[enum_dispatch]
pub trait RankGenerator {
    /// Unnormalized weights for `1..=steps`, descending.
    fn raw(&self, steps: usize) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy)]
pub struct Rx;
#[derive(Debug, Clone, Copy)]
pub struct Rs;
#[derive(Debug, Clone, Copy)]
pub struct Rr;
#[derive(Debug, Clone, Copy)]
pub struct Roc;
#[derive(Debug, Clone, Copy)]
pub struct Sr;
#[derive(Debug, Clone, Copy)]
pub struct Xr;

impl RankGenerator for Rx {
    fn raw(&self, steps: usize) -> Vec<f64> {
        let n = steps as f64;
        let z = 1.0 + (n / 60.0).min(0.25);
        (1..=steps).map(|i| (n + 1.0 - i as f64).powf(z)).collect()
    }
}

impl RankGenerator for Rs {
    fn raw(&self, steps: usize) -> Vec<f64> {
        let n = steps as f64;
        (1..=steps).map(|i| 2.0 * (n + 1.0 - i as f64) / (n * (n + 1.0))).collect()
    }
}

impl RankGenerator for Rr {
    fn raw(&self, steps: usize) -> Vec<f64> {
        (1..=steps).map(|i| 1.0 / i as f64).collect()
    }
}

impl RankGenerator for Roc {
    fn raw(&self, steps: usize) -> Vec<f64> {
        let n = steps as f64;
        (1..=steps)
            .map(|i| (i..=steps).map(|k| 1.0 / k as f64).sum::<f64>() / n)
            .collect()
    }
}

impl RankGenerator for Sr {
    fn raw(&self, steps: usize) -> Vec<f64> {
        let rs = Rs.raw(steps);
        let rr = Rr.raw(steps);
        rs.iter().zip(rr.iter()).map(|(a, b)| 0.5 * (a + b)).collect()
    }
}

impl RankGenerator for Xr {
    fn raw(&self, steps: usize) -> Vec<f64> {
        let rx = Rx.raw(steps);
        let rr = Rr.raw(steps);
        rx.iter().zip(rr.iter()).map(|(a, b)| 0.5 * (a + b)).collect()
    }
}

#[enum_dispatch(RankGenerator)]
#[derive(Debug, Clone, Copy)]
pub enum Generator {
    Rx(Rx),
    Rs(Rs),
    Rr(Rr),
    Roc(Roc),
    Sr(Sr),
    Xr(Xr),
}

impl Default for Generator {
    fn default() -> Self {
        Generator::Rx(Rx)
    }
}

/// Fills `crc[1..slots]`, normalized to sum to 1. When `offset > 0`,
/// generates on a stretched `steps = slots + 2*offset` range, then
/// renormalizes just the middle `slots`-wide window and drops the tail
/// (§4.5 "When `offset > 0`...").
pub fn generate(method: Generator, slots: usize, offset: usize) -> EngineResult<Vec<f64>> {
    if slots == 0 {
        return Err(EngineError::InputError);
    }
    let steps = slots + 2 * offset;
    let raw = method.raw(steps);
    let window = &raw[offset..offset + slots];
    let sum: f64 = window.iter().sum();
    if sum <= 0.0 {
        return Err(EngineError::SameRankings);
    }
    Ok(window.iter().map(|&x| x / sum).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rstest_reuse::{self, *};

    #[template]
    #[rstest]
    #[case(Generator::Rx(Rx), 1, 0)]
    #[case(Generator::Rx(Rx), 5, 0)]
    #[case(Generator::Rx(Rx), 5, 2)]
    #[case(Generator::Rs(Rs), 8, 0)]
    #[case(Generator::Rr(Rr), 8, 1)]
    #[case(Generator::Roc(Roc), 6, 0)]
    #[case(Generator::Sr(Sr), 6, 1)]
    #[case(Generator::Xr(Xr), 6, 1)]
    fn generator_cases(#[case] method: Generator, #[case] slots: usize, #[case] offset: usize) {}

    #[apply(generator_cases)]
    fn sums_to_one_and_descends(method: Generator, slots: usize, offset: usize) {
        let crc = generate(method, slots, offset).unwrap();
        let sum: f64 = crc.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum={sum}");
        for w in crc.windows(2) {
            assert!(w[0] >= w[1] - 1e-9, "{:?} not descending", crc);
        }
    }
}
