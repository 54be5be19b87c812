//! The probability base: interval statements over a frame's nodes, their
//! tree-tightened hulls, and the warp-adjusted mass point (§4.2).
//!
//! Grounded on the teacher's `Solver` trait shape: a struct that owns mutable
//! state plus a `load`-style recompute entry point returning `Result<(), E>`,
//! exactly like `Solver::solve(&mut self) -> Result<Status, Problem>`
//! re-deriving `SolverState` from scratch on every call rather than
//! incrementally patching it.

use crate::base::hull::{self, HullResult};
use crate::base::statement::Statement;
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;
use crate::limits::{EPS, MAX_STMTS};

/// Sentinel for an absent midpoint-box entry (§3 "Base").
pub const MIDBOX_ABSENT: f64 = -1.0;
/// Sentinel requesting the midpoint-box slot be left unoccupied/skipped.
pub const MIDBOX_SKIP: f64 = -2.0;

#[derive(Debug, Clone, Default)]
pub struct PBase {
    statements: Vec<Statement>,
    explicit_box: Vec<Option<(f64, f64)>>,
    lo_midbox: Vec<f64>,
    up_midbox: Vec<f64>,

    loaded: bool,
    box_lo: Vec<f64>,
    box_up: Vec<f64>,
    l_hull_lo: Vec<f64>,
    l_hull_up: Vec<f64>,
    hull_lo: Vec<f64>,
    hull_up: Vec<f64>,
    l_mhull_lo: Vec<f64>,
    l_mhull_up: Vec<f64>,
    mhull_lo: Vec<f64>,
    mhull_up: Vec<f64>,
    l_mass_point: Vec<f64>,
    mass_point: Vec<f64>,
}

impl PBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Snapshots the statement set, for callers (CAR) that emit several
    /// statements as one atomic operation spanning multiple `add_statement`
    /// calls.
    pub fn snapshot(&self) -> Vec<Statement> {
        self.statements.clone()
    }

    pub fn restore(&mut self, frame: &Frame, snapshot: Vec<Statement>) -> EngineResult<()> {
        self.statements = snapshot;
        self.load(frame)
    }

    /// Marks derived hulls/mass points stale without discarding statements
    /// (§4.1 "detach marks bases invalid but keeps statements").
    pub fn invalidate(&mut self) {
        self.loaded = false;
    }

    /// Adds a statement and reloads; on failure the statement set is
    /// restored to its pre-call contents (§5 "Mutations are transactional").
    pub fn add_statement(&mut self, frame: &Frame, stmt: Statement) -> EngineResult<()> {
        if self.statements.len() >= MAX_STMTS {
            return Err(EngineError::TooManyStmts);
        }
        let snapshot = self.statements.clone();
        self.statements.push(stmt);
        self.reload_or_rollback(frame, snapshot)
    }

    pub fn delete_statement(&mut self, frame: &Frame, index: usize) -> EngineResult<()> {
        if index >= self.statements.len() {
            return Err(EngineError::InputError);
        }
        let snapshot = self.statements.clone();
        self.statements.remove(index);
        self.reload_or_rollback(frame, snapshot)
    }

    pub fn replace_statement(
        &mut self,
        frame: &Frame,
        index: usize,
        stmt: Statement,
    ) -> EngineResult<()> {
        if index >= self.statements.len() {
            return Err(EngineError::InputError);
        }
        let snapshot = self.statements.clone();
        self.statements[index] = stmt;
        self.reload_or_rollback(frame, snapshot)
    }

    /// On reload failure, restores `snapshot` and reloads again; if that
    /// second reload also fails the error is returned but the caller (the
    /// frame) is responsible for forcing a detach (§5, §7).
    fn reload_or_rollback(&mut self, frame: &Frame, snapshot: Vec<Statement>) -> EngineResult<()> {
        match self.load(frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.statements = snapshot;
                self.load(frame)?;
                Err(e)
            }
        }
    }

    pub fn set_range_box(&mut self, node: usize, lobo: f64, upbo: f64) -> EngineResult<()> {
        let slot = self
            .explicit_box
            .get_mut(node)
            .ok_or(EngineError::InputError)?;
        *slot = Some((lobo, upbo));
        Ok(())
    }

    pub fn unset_range_box(&mut self, node: usize) -> EngineResult<()> {
        let slot = self
            .explicit_box
            .get_mut(node)
            .ok_or(EngineError::InputError)?;
        *slot = None;
        Ok(())
    }

    pub fn set_midpoint_box(&mut self, node: usize, lobo: f64, upbo: f64) -> EngineResult<()> {
        let lo = self.lo_midbox.get_mut(node).ok_or(EngineError::InputError)?;
        let up = self.up_midbox.get_mut(node).ok_or(EngineError::InputError)?;
        *lo = lobo;
        *up = upbo;
        Ok(())
    }

    pub fn clear_midpoint_box(&mut self, node: usize) -> EngineResult<()> {
        self.set_midpoint_box(node, MIDBOX_ABSENT, MIDBOX_ABSENT)
    }

    /// Recomputes box, local/global hull, midpoint hull, and mass point from
    /// the current statement set (§4.2 stages 1-4).
    pub fn load(&mut self, frame: &Frame) -> EngineResult<()> {
        let n = frame.total_nodes();
        if self.explicit_box.len() != n {
            self.explicit_box = vec![None; n];
            self.lo_midbox = vec![MIDBOX_ABSENT; n];
            self.up_midbox = vec![MIDBOX_ABSENT; n];
        }

        let mut box_lo = vec![0.0f64; n];
        let mut box_up = vec![1.0f64; n];
        for v in 0..n {
            if let Some((lo, up)) = self.explicit_box[v] {
                box_lo[v] = lo;
                box_up[v] = up;
            }
        }
        for s in &self.statements {
            box_lo[s.node] = box_lo[s.node].max(s.lobo);
            box_up[s.node] = box_up[s.node].min(s.upbo);
        }
        for v in 0..n {
            if box_up[v] < box_lo[v] - EPS {
                return Err(EngineError::Inconsistent);
            }
        }

        let top_groups = Self::top_groups(frame)?;
        let children = |v: usize| frame.children_b1(v).unwrap_or_default();

        let HullResult { l_hull_lo, l_hull_up, hull_lo, hull_up } =
            hull::tree_hull(&children, &top_groups, n, &box_lo, &box_up)?;

        let mut mbox_lo = vec![0.0f64; n];
        let mut mbox_up = vec![0.0f64; n];
        for v in 0..n {
            if self.lo_midbox[v] != MIDBOX_ABSENT && self.lo_midbox[v] != MIDBOX_SKIP {
                if self.lo_midbox[v] < l_hull_lo[v] - EPS || self.up_midbox[v] > l_hull_up[v] + EPS
                {
                    return Err(EngineError::Inconsistent);
                }
                mbox_lo[v] = self.lo_midbox[v];
                mbox_up[v] = self.up_midbox[v];
            } else {
                mbox_lo[v] = l_hull_lo[v];
                mbox_up[v] = l_hull_up[v];
            }
        }

        let HullResult {
            l_hull_lo: l_mhull_lo,
            l_hull_up: l_mhull_up,
            hull_lo: mhull_lo,
            hull_up: mhull_up,
        } = hull::tree_hull(&children, &top_groups, n, &mbox_lo, &mbox_up)?;

        let (l_mass_point, mass_point) =
            hull::mass_point(&children, &top_groups, n, &l_mhull_lo, &l_mhull_up)?;

        self.box_lo = box_lo;
        self.box_up = box_up;
        self.l_hull_lo = l_hull_lo;
        self.l_hull_up = l_hull_up;
        self.hull_lo = hull_lo;
        self.hull_up = hull_up;
        self.l_mhull_lo = l_mhull_lo;
        self.l_mhull_up = l_mhull_up;
        self.mhull_lo = mhull_lo;
        self.mhull_up = mhull_up;
        self.l_mass_point = l_mass_point;
        self.mass_point = mass_point;
        self.loaded = true;
        Ok(())
    }

    fn top_groups(frame: &Frame) -> EngineResult<Vec<Vec<usize>>> {
        (0..frame.n_alts()).map(|alt| frame.top_level_b1(alt)).collect()
    }

    pub fn hull(&self, node: usize) -> EngineResult<(f64, f64)> {
        self.ensure_loaded()?;
        Ok((
            *self.hull_lo.get(node).ok_or(EngineError::InputError)?,
            *self.hull_up.get(node).ok_or(EngineError::InputError)?,
        ))
    }

    pub fn local_hull(&self, node: usize) -> EngineResult<(f64, f64)> {
        self.ensure_loaded()?;
        Ok((
            *self.l_hull_lo.get(node).ok_or(EngineError::InputError)?,
            *self.l_hull_up.get(node).ok_or(EngineError::InputError)?,
        ))
    }

    pub fn mass_point_at(&self, node: usize) -> EngineResult<f64> {
        self.ensure_loaded()?;
        self.mass_point.get(node).copied().ok_or(EngineError::InputError)
    }

    pub fn local_mass_point_at(&self, node: usize) -> EngineResult<f64> {
        self.ensure_loaded()?;
        self.l_mass_point.get(node).copied().ok_or(EngineError::InputError)
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
    use crate::frame::Frame;

    #[test]
    fn flat_frame_default_mass_point_is_uniform() {
        let frame = Frame::create_flat("f", &[2, 2]).unwrap();
        let mut pbase = PBase::new();
        pbase.load(&frame).unwrap();
        for alt in 0..2 {
            let top = frame.top_level_b1(alt).unwrap();
            for &node in &top {
                assert!((pbase.mass_point_at(node).unwrap() - 0.5).abs() < 1e-9);
                assert_eq!(pbase.hull(node).unwrap(), (0.0, 1.0));
            }
        }
    }

    #[test]
    fn inconsistent_statements_roll_back() {
        let frame = Frame::create_flat("f", &[2, 2]).unwrap();
        let mut pbase = PBase::new();
        pbase.load(&frame).unwrap();
        let top = frame.top_level_b1(0).unwrap();
        pbase
            .add_statement(&frame, Statement::new(top[0], 0.6, 1.0).unwrap())
            .unwrap();
        let before = pbase.statement_count();
        let hulls_before: Vec<(f64, f64)> = top.iter().map(|&n| pbase.hull(n).unwrap()).collect();
        let mass_before: Vec<f64> = top.iter().map(|&n| pbase.mass_point_at(n).unwrap()).collect();

        let err = pbase
            .add_statement(&frame, Statement::new(top[1], 0.6, 1.0).unwrap())
            .unwrap_err();
        assert_eq!(err, EngineError::Inconsistent);

        assert_eq!(pbase.statement_count(), before);
        for (i, &node) in top.iter().enumerate() {
            assert_eq!(pbase.hull(node).unwrap(), hulls_before[i]);
            assert_eq!(pbase.mass_point_at(node).unwrap(), mass_before[i]);
        }
    }

    #[test]
    fn mass_point_is_sandwiched_by_local_hull() {
        let frame = Frame::create_flat("f", &[3]).unwrap();
        let mut pbase = PBase::new();
        let top = frame.top_level_b1(0).unwrap();
        pbase.load(&frame).unwrap();
        pbase.add_statement(&frame, Statement::new(top[0], 0.2, 0.5).unwrap()).unwrap();
        for &node in &top {
            let (lo, up) = pbase.local_hull(node).unwrap();
            let mp = pbase.local_mass_point_at(node).unwrap();
            assert!(lo - EPS <= mp && mp <= up + EPS, "node {node}: {lo} <= {mp} <= {up}");
        }
    }

    #[test]
    fn tightening_a_statement_never_widens_the_hull() {
        let frame = Frame::create_flat("f", &[3]).unwrap();
        let top = frame.top_level_b1(0).unwrap();
        let mut pbase = PBase::new();
        pbase.load(&frame).unwrap();
        let (wide_lo, wide_up) = pbase.hull(top[0]).unwrap();

        pbase.add_statement(&frame, Statement::new(top[0], 0.1, 0.4).unwrap()).unwrap();
        let (tight_lo, tight_up) = pbase.hull(top[0]).unwrap();
        assert!(tight_up - tight_lo <= wide_up - wide_lo + 1e-9);

        for &node in &top[1..] {
            let (lo, up) = pbase.hull(node).unwrap();
            assert!(up - lo <= wide_up - wide_lo + 1e-9);
        }
    }

    /// §8 scenario S2: root -> {A (intermediate, children A1, A2), B (real)}.
    #[test]
    fn scenario_s2_tree_global_hulls() {
        use crate::frame::{TreeSpec, A1};

        let tot = vec![4, 1];
        let next = vec![vec![Some(3), Some(2), None, None], vec![None]];
        let down = vec![vec![Some(1), None, None, None], vec![None]];
        let spec = TreeSpec { tot_cons: &tot, next: &next, down: &down };
        let frame = Frame::create_tree("f", spec).unwrap();

        let a = frame.a1_to_b1(A1::new(0, 0)).unwrap();
        let a1 = frame.a1_to_b1(A1::new(0, 1)).unwrap();
        let a2 = frame.a1_to_b1(A1::new(0, 2)).unwrap();
        let b = frame.a1_to_b1(A1::new(0, 3)).unwrap();

        let mut pbase = PBase::new();
        pbase.load(&frame).unwrap();
        pbase.add_statement(&frame, Statement::new(a, 0.6, 0.8).unwrap()).unwrap();
        pbase.add_statement(&frame, Statement::new(a1, 0.3, 0.5).unwrap()).unwrap();

        let (a1_lo, a1_up) = pbase.hull(a1).unwrap();
        let (a2_lo, a2_up) = pbase.hull(a2).unwrap();
        let (b_lo, b_up) = pbase.hull(b).unwrap();
        assert!(a1_lo >= 0.18 - 1e-6 && a1_up <= 0.40 + 1e-6);
        assert!(a2_lo >= 0.30 - 1e-6 && a2_up <= 0.56 + 1e-6);
        assert!(b_lo >= 0.20 - 1e-6 && b_up <= 0.40 + 1e-6);

        let b_mp = pbase.mass_point_at(b).unwrap();
        let a1_mp = pbase.mass_point_at(a1).unwrap();
        let a2_mp = pbase.mass_point_at(a2).unwrap();
        assert!((b_mp + a1_mp + a2_mp - 1.0).abs() < 1e-6);
    }
}
