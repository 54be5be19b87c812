//! Security-level classification (§4.4): for a minimum acceptable value,
//! how much probability mass an alternative can put on "dangerous" leaves.
//!
//! A Rust-native adaptation of the C-shaped `strong[]`/`marked[]`/`weak[]`
//! out-parameter triple (§6): one typed result per alternative instead of
//! three parallel boolean slices (see SPEC_FULL.md "Supplemented features").

use crate::error::EngineResult;
use crate::limits::EPS;

/// The three-way classification of an alternative's exposure to values
/// below a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    /// No feasible probability assignment can put any mass on a dangerous leaf.
    Strong,
    /// Some feasible assignment can put mass on a dangerous leaf, but none is forced to.
    Marked,
    /// Every feasible assignment puts positive mass on a dangerous set.
    Weak,
}

impl<'a> super::Evaluator<'a> {
    /// Classifies `alt`'s exposure to leaves whose value is below
    /// `threshold`, via `ixset_P_max`/`ixset_P_min`: the max/min feasible
    /// probability the "dangerous" index set can receive.
    pub fn security_level(&self, alt: usize, threshold: f64) -> EngineResult<SecurityLevel> {
        let (p_max, p_min) = self.ixset_p_extremes(alt, threshold)?;
        if p_max <= EPS {
            Ok(SecurityLevel::Strong)
        } else if p_min <= EPS {
            Ok(SecurityLevel::Marked)
        } else {
            Ok(SecurityLevel::Weak)
        }
    }

    /// Returns `(ixset_P_max, ixset_P_min)`: the max/min probability mass
    /// feasibly assignable to the set of leaves whose value is below
    /// `threshold`, computed by running the same greedy sort-and-fill as
    /// `eval_P_max/min` with a 0/1 "dangerous" indicator standing in for V.
    fn ixset_p_extremes(&self, alt: usize, threshold: f64) -> EngineResult<(f64, f64)> {
        let dangerous = |node: usize| -> EngineResult<bool> {
            if self.frame().is_real_b1(node)? {
                Ok(self.v_base().mass_point_at(node)? < threshold)
            } else {
                Ok(false)
            }
        };
        let p_max = self.ixset_group(alt, &dangerous, false)?;
        let p_min = self.ixset_group(alt, &dangerous, true)?;
        Ok((p_max, p_min))
    }

    fn ixset_group(
        &self,
        alt: usize,
        dangerous: &dyn Fn(usize) -> EngineResult<bool>,
        minimize: bool,
    ) -> EngineResult<f64> {
        let top = self.frame().top_level_b1(alt)?;
        self.ixset_recurse(&top, dangerous, minimize)
    }

    fn ixset_recurse(
        &self,
        siblings: &[usize],
        dangerous: &dyn Fn(usize) -> EngineResult<bool>,
        minimize: bool,
    ) -> EngineResult<f64> {
        let mut indicator = Vec::with_capacity(siblings.len());
        for &node in siblings {
            let ind = if self.frame().is_real_b1(node)? {
                if dangerous(node)? {
                    1.0
                } else {
                    0.0
                }
            } else {
                let children = self.frame().children_b1(node)?;
                self.ixset_recurse(&children, dangerous, minimize)?
            };
            indicator.push(ind);
        }

        let l_hull_lo: Vec<f64> = siblings
            .iter()
            .map(|&n| self.p_base().local_hull(n).map(|(lo, _)| lo))
            .collect::<EngineResult<_>>()?;
        let l_hull_up: Vec<f64> = siblings
            .iter()
            .map(|&n| self.p_base().local_hull(n).map(|(_, up)| up))
            .collect::<EngineResult<_>>()?;

        let mut order: Vec<usize> = (0..siblings.len()).collect();
        if minimize {
            order.sort_by(|&a, &b| indicator[a].partial_cmp(&indicator[b]).unwrap());
        } else {
            order.sort_by(|&a, &b| indicator[b].partial_cmp(&indicator[a]).unwrap());
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
        Ok(probs.iter().zip(indicator.iter()).map(|(p, i)| p * i).sum())
    }
}

#[cfg(test)]
mod tests {
    use crate::base::{PBase, VBase};
    use crate::eval::{Evaluator, SecurityLevel};
    use crate::frame::Frame;

    #[test]
    fn all_safe_leaves_are_strong() {
        let frame = Frame::create_flat("f", &[2, 2]).unwrap();
        let mut p = PBase::new();
        p.load(&frame).unwrap();
        let mut v = VBase::new();
        v.load(&frame).unwrap();
        let eval = Evaluator::new(&frame, &p, &v);
        assert_eq!(eval.security_level(0, 0.1).unwrap(), SecurityLevel::Strong);
    }

    #[test]
    fn all_dangerous_leaves_are_weak() {
        let frame = Frame::create_flat("f", &[2, 2]).unwrap();
        let mut p = PBase::new();
        p.load(&frame).unwrap();
        let mut v = VBase::new();
        v.load(&frame).unwrap();
        let eval = Evaluator::new(&frame, &p, &v);
        assert_eq!(eval.security_level(0, 0.9).unwrap(), SecurityLevel::Weak);
    }
}
