//! The CAR weight base: a flat (single-group, childless) analogue of
//! `PBase` over `n_criteria` weights summing to 1, reusing `base::hull`'s
//! shared tree-hull/mass-point recursion with one top-level group and no
//! children (§4.5 "Weight base").

use crate::base::hull::{self, HullResult};
use crate::base::statement::Statement;
use crate::error::{EngineError, EngineResult};
use crate::limits::{EPS, MAX_STMTS};

pub const MIDBOX_ABSENT: f64 = -1.0;
pub const MIDBOX_SKIP: f64 = -2.0;

#[derive(Debug, Clone, Default)]
pub struct WBase {
    statements: Vec<Statement>,
    n_criteria: usize,
    lo_midbox: Vec<f64>,
    up_midbox: Vec<f64>,

    loaded: bool,
    hull_lo: Vec<f64>,
    hull_up: Vec<f64>,
    mass_point: Vec<f64>,
}

impl WBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn n_criteria(&self) -> usize {
        self.n_criteria
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn snapshot(&self) -> Vec<Statement> {
        self.statements.clone()
    }

    pub fn restore(&mut self, snapshot: Vec<Statement>) -> EngineResult<()> {
        self.statements = snapshot;
        self.load()
    }

    /// Resets to `n` criteria with no statements. Called once per
    /// `set_W_base`/`rank_W_base` invocation, which replace the whole set.
    pub fn reset(&mut self, n: usize) {
        self.n_criteria = n;
        self.statements.clear();
        self.lo_midbox = vec![MIDBOX_ABSENT; n];
        self.up_midbox = vec![MIDBOX_ABSENT; n];
        self.loaded = false;
    }

    pub fn add_statement(&mut self, stmt: Statement) -> EngineResult<()> {
        if stmt.node >= self.n_criteria {
            return Err(EngineError::CritUnknown);
        }
        if self.statements.len() >= MAX_STMTS {
            return Err(EngineError::TooManyStmts);
        }
        let snapshot = self.statements.clone();
        self.statements.push(stmt);
        match self.load() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.statements = snapshot;
                self.load()?;
                Err(e)
            }
        }
    }

    pub fn set_midpoint_box(&mut self, crit: usize, lobo: f64, upbo: f64) -> EngineResult<()> {
        *self.lo_midbox.get_mut(crit).ok_or(EngineError::CritUnknown)? = lobo;
        *self.up_midbox.get_mut(crit).ok_or(EngineError::CritUnknown)? = upbo;
        Ok(())
    }

    pub fn clear_midpoint_box(&mut self, crit: usize) -> EngineResult<()> {
        self.set_midpoint_box(crit, MIDBOX_ABSENT, MIDBOX_ABSENT)
    }

    pub fn clear_all_midpoint_boxes(&mut self) {
        for v in self.lo_midbox.iter_mut() {
            *v = MIDBOX_ABSENT;
        }
        for v in self.up_midbox.iter_mut() {
            *v = MIDBOX_ABSENT;
        }
    }

    pub fn load(&mut self) -> EngineResult<()> {
        let n = self.n_criteria;
        let mut box_lo = vec![0.0f64; n];
        let mut box_up = vec![1.0f64; n];
        for s in &self.statements {
            box_lo[s.node] = box_lo[s.node].max(s.lobo);
            box_up[s.node] = box_up[s.node].min(s.upbo);
        }
        for v in 0..n {
            if box_up[v] < box_lo[v] - EPS {
                return Err(EngineError::Inconsistent);
            }
        }

        let top_groups = vec![(0..n).collect::<Vec<_>>()];
        let no_children = |_: usize| -> Vec<usize> { Vec::new() };

        let HullResult { l_hull_lo, l_hull_up, hull_lo, hull_up } =
            hull::tree_hull(&no_children, &top_groups, n, &box_lo, &box_up)?;

        let mut mbox_lo = vec![0.0f64; n];
        let mut mbox_up = vec![0.0f64; n];
        for v in 0..n {
            if self.lo_midbox[v] != MIDBOX_ABSENT && self.lo_midbox[v] != MIDBOX_SKIP {
                if self.lo_midbox[v] < l_hull_lo[v] - EPS || self.up_midbox[v] > l_hull_up[v] + EPS {
                    return Err(EngineError::Inconsistent);
                }
                mbox_lo[v] = self.lo_midbox[v];
                mbox_up[v] = self.up_midbox[v];
            } else {
                mbox_lo[v] = l_hull_lo[v];
                mbox_up[v] = l_hull_up[v];
            }
        }

        let HullResult { l_hull_lo: l_mhull_lo, l_hull_up: l_mhull_up, .. } =
            hull::tree_hull(&no_children, &top_groups, n, &mbox_lo, &mbox_up)?;

        let (_, mass_point) = hull::mass_point(&no_children, &top_groups, n, &l_mhull_lo, &l_mhull_up)?;

        self.hull_lo = hull_lo;
        self.hull_up = hull_up;
        self.mass_point = mass_point;
        self.loaded = true;
        Ok(())
    }

    pub fn hull(&self, crit: usize) -> EngineResult<(f64, f64)> {
        self.ensure_loaded()?;
        Ok((
            *self.hull_lo.get(crit).ok_or(EngineError::CritUnknown)?,
            *self.hull_up.get(crit).ok_or(EngineError::CritUnknown)?,
        ))
    }

    pub fn mass_point_at(&self, crit: usize) -> EngineResult<f64> {
        self.ensure_loaded()?;
        self.mass_point.get(crit).copied().ok_or(EngineError::CritUnknown)
    }

    fn ensure_loaded(&self) -> EngineResult<()> {
        if !self.loaded {
            return Err(EngineError::FrameNotLoaded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_three_criteria_split_evenly() {
        let mut w = WBase::new();
        w.reset(3);
        w.load().unwrap();
        for c in 0..3 {
            assert!((w.mass_point_at(c).unwrap() - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn unknown_criterion_rejected() {
        let mut w = WBase::new();
        w.reset(2);
        let err = w.add_statement(Statement::new(5, 0.1, 0.2).unwrap()).unwrap_err();
        assert_eq!(err, EngineError::CritUnknown);
    }
}
