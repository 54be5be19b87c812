//! The evaluation kernel: OMEGA/PSI/DELTA/GAMMA/DIGAMMA over a frame's
//! hulls and mass points, plus security-level classification and NEMO
//! moments (§4.4).
//!
//! Grounded on the teacher's read-only `Solver::solve`/`SolverState` split:
//! an `Evaluator` borrows a frame and its bases and never mutates them,
//! exactly as the teacher's solve step reads `SolverState` without owning
//! it.

pub mod nemo;
pub mod security;

use crate::base::PBase;
use crate::base::VBase;
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;
use crate::limits::EPS;

pub use nemo::Moments;
pub use security::SecurityLevel;

/// A min/mid/max interval result, the shape returned by PSI/DELTA/GAMMA/DIGAMMA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triple {
    pub min: f64,
    pub mid: f64,
    pub max: f64,
}

/// Borrows a frame and one criterion's bases; stateless and read-only.
pub struct Evaluator<'a> {
    frame: &'a Frame,
    p: &'a PBase,
    v: &'a VBase,
}

impl<'a> Evaluator<'a> {
    pub fn new(frame: &'a Frame, p: &'a PBase, v: &'a VBase) -> Self {
        Self { frame, p, v }
    }

    /// `OMEGA(Ai)`: the point expected value at the mass point (§4.4).
    pub fn omega(&self, alt: usize) -> EngineResult<f64> {
        let mut sum = 0.0;
        for leaf in self.frame.leaves_of_alt(alt)? {
            sum += self.p.mass_point_at(leaf)? * self.v.mass_point_at(leaf)?;
        }
        Ok(sum)
    }

    /// `PSI(Ai)`: min/mid/max expected value.
    pub fn psi(&self, alt: usize) -> EngineResult<Triple> {
        let min = self.eval_p_extreme(alt, true)?;
        let max = self.eval_p_extreme(alt, false)?;
        let mid = self.omega(alt)?;
        Ok(Triple { min, mid, max })
    }

    /// `DELTA(Ai,Aj)`: the interval of `EV_Ai - EV_Aj`.
    pub fn delta(&self, ai: usize, aj: usize) -> EngineResult<Triple> {
        let psi_i = self.psi(ai)?;
        let psi_j = self.psi(aj)?;
        Ok(Triple {
            min: psi_i.min - psi_j.max,
            mid: psi_i.mid - psi_j.mid,
            max: psi_i.max - psi_j.min,
        })
    }

    /// `GAMMA(Ai)`: one-vs-rest average comparison.
    pub fn gamma(&self, alt: usize, n_alts: usize) -> EngineResult<Triple> {
        let others: Vec<usize> = (0..n_alts).filter(|&a| a != alt).collect();
        self.digamma(alt, &others)
    }

    /// `DIGAMMA(Ai, subset)`: one-vs-subset average comparison; an empty
    /// subset falls back to PSI (the "digamma-psi" rule, §4.4).
    pub fn digamma(&self, alt: usize, subset: &[usize]) -> EngineResult<Triple> {
        if subset.is_empty() {
            return self.psi(alt);
        }
        let psi_i = self.psi(alt)?;
        let mut avg_max = 0.0;
        let mut avg_min = 0.0;
        let mut avg_mid = 0.0;
        for &j in subset {
            let psi_j = self.psi(j)?;
            avg_max += psi_j.max;
            avg_min += psi_j.min;
            avg_mid += psi_j.mid;
        }
        let n = subset.len() as f64;
        Ok(Triple {
            min: psi_i.min - avg_max / n,
            mid: psi_i.mid - avg_mid / n,
            max: psi_i.max - avg_min / n,
        })
    }

    /// `eval_P_max`/`eval_P_min`: extremal expected value via local greedy
    /// mass assignment (§4.4). `minimize = true` sorts ascending and
    /// evaluates at `V_lobo`; `false` sorts descending and evaluates at
    /// `V_upbo`.
    fn eval_p_extreme(&self, alt: usize, minimize: bool) -> EngineResult<f64> {
        let top = self.frame.top_level_b1(alt)?;
        self.extreme_group(&top, minimize).map(|(ev, _)| ev)
    }

    /// Greedy sort-and-fill over one sibling group; returns `(EV, node value)`.
    /// Recurses into intermediate children so their own value is first
    /// obtained the same way.
    fn extreme_group(&self, siblings: &[usize], minimize: bool) -> EngineResult<(f64, f64)> {
        let mut value = Vec::with_capacity(siblings.len());
        for &node in siblings {
            value.push(self.node_value(node, minimize)?);
        }
        let l_hull_lo: Vec<f64> = siblings
            .iter()
            .map(|&n| self.p.local_hull(n).map(|(lo, _)| lo))
            .collect::<EngineResult<_>>()?;
        let l_hull_up: Vec<f64> = siblings
            .iter()
            .map(|&n| self.p.local_hull(n).map(|(_, up)| up))
            .collect::<EngineResult<_>>()?;

        let mut order: Vec<usize> = (0..siblings.len()).collect();
        if minimize {
            order.sort_by(|&a, &b| value[a].partial_cmp(&value[b]).unwrap());
        } else {
            order.sort_by(|&a, &b| value[b].partial_cmp(&value[a]).unwrap());
        }

        let mut probs = l_hull_lo.clone();
        let mut pmass = 1.0 - l_hull_lo.iter().sum::<f64>();
        for &idx in &order {
            if pmass <= EPS {
                break;
            }
            let room = l_hull_up[idx] - l_hull_lo[idx];
            let take = room.min(pmass).max(0.0);
            probs[idx] += take;
            pmass -= take;
        }
        let ev: f64 = probs.iter().zip(value.iter()).map(|(p, v)| p * v).sum();
        Ok((ev, ev))
    }

    fn node_value(&self, node: usize, minimize: bool) -> EngineResult<f64> {
        if self.frame.is_real_b1(node)? {
            if minimize {
                Ok(self.v.hull(node)?.0)
            } else {
                Ok(self.v.hull(node)?.1)
            }
        } else {
            let children = self.frame.children_b1(node)?;
            self.extreme_group(&children, minimize).map(|(_, v)| v)
        }
    }

    pub fn frame(&self) -> &Frame {
        self.frame
    }

    pub fn p_base(&self) -> &PBase {
        self.p
    }

    pub fn v_base(&self) -> &VBase {
        self.v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{PBase, Statement, VBase};
    use crate::frame::Frame;

    #[test]
    fn flat_frame_omega_is_default_midpoint() {
        let frame = Frame::create_flat("f", &[2, 2, 2]).unwrap();
        let mut p = PBase::new();
        p.load(&frame).unwrap();
        let mut v = VBase::new();
        v.load(&frame).unwrap();
        let eval = Evaluator::new(&frame, &p, &v);
        for alt in 0..3 {
            assert!((eval.omega(alt).unwrap() - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn psi_min_mid_max_ordered() {
        let frame = Frame::create_flat("f", &[3]).unwrap();
        let mut p = PBase::new();
        p.load(&frame).unwrap();
        let mut v = VBase::new();
        v.load(&frame).unwrap();
        let eval = Evaluator::new(&frame, &p, &v);
        let psi = eval.psi(0).unwrap();
        assert!(psi.min <= psi.mid + 1e-9);
        assert!(psi.mid <= psi.max + 1e-9);
    }

    #[test]
    fn delta_of_identical_alts_brackets_zero() {
        let frame = Frame::create_flat("f", &[2, 2]).unwrap();
        let mut p = PBase::new();
        p.load(&frame).unwrap();
        let mut v = VBase::new();
        v.load(&frame).unwrap();
        let eval = Evaluator::new(&frame, &p, &v);
        let delta = eval.delta(0, 1).unwrap();
        assert!(delta.min <= 0.0 + 1e-9);
        assert!(delta.max >= 0.0 - 1e-9);
    }

    /// §8 scenario S1: flat frame, 3 alts x 2 leaves, no statements.
    #[test]
    fn scenario_s1_flat_frame_defaults() {
        let frame = Frame::create_flat("f", &[2, 2, 2]).unwrap();
        let mut p = PBase::new();
        p.load(&frame).unwrap();
        let mut v = VBase::new();
        v.load(&frame).unwrap();

        for &node in &frame.top_level_b1(0).unwrap() {
            assert_eq!(p.hull(node).unwrap(), (0.0, 1.0));
            assert!((p.mass_point_at(node).unwrap() - 0.5).abs() < 1e-9);
        }

        let eval = Evaluator::new(&frame, &p, &v);
        assert!((eval.omega(0).unwrap() - 0.5).abs() < 1e-9);

        let delta = eval.delta(0, 1).unwrap();
        assert!(delta.min >= -1.0 - 1e-9 && delta.min <= -1.0 + 1e-9);
        assert!((delta.mid - 0.0).abs() < 1e-9);
        assert!(delta.max >= 1.0 - 1e-9 && delta.max <= 1.0 + 1e-9);
    }

    /// §8 scenario S6: tree frame from S2, V left at default midpoint/hull.
    #[test]
    fn scenario_s6_tree_omega_and_psi_defaults() {
        use crate::frame::{TreeSpec, A1};

        let tot = vec![4, 1];
        let next = vec![vec![Some(3), Some(2), None, None], vec![None]];
        let down = vec![vec![Some(1), None, None, None], vec![None]];
        let spec = TreeSpec { tot_cons: &tot, next: &next, down: &down };
        let frame = Frame::create_tree("f", spec).unwrap();

        let mut p = PBase::new();
        p.load(&frame).unwrap();
        let mut v = VBase::new();
        v.load(&frame).unwrap();

        let a = frame.a1_to_b1(A1::new(0, 0)).unwrap();
        p.add_statement(&frame, Statement::new(a, 0.6, 0.8).unwrap()).unwrap();
        let a1 = frame.a1_to_b1(A1::new(0, 1)).unwrap();
        p.add_statement(&frame, Statement::new(a1, 0.3, 0.5).unwrap()).unwrap();

        let eval = Evaluator::new(&frame, &p, &v);
        assert!((eval.omega(0).unwrap() - 0.5).abs() < 1e-9);

        let psi = eval.psi(0).unwrap();
        assert!(psi.min >= 0.0 - 1e-9 && psi.min <= 0.5 + 1e-9);
        assert!(psi.max >= 0.5 - 1e-9 && psi.max <= 1.0 + 1e-9);
        assert!(psi.min <= psi.mid + 1e-9 && psi.mid <= psi.max + 1e-9);
    }
}
