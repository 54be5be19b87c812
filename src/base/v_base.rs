//! The value base: interval statements over a criterion's leaf nodes on an
//! internal [0,1] scale, with no tree-wise normalization (§4.3).
//!
//! Structurally a trimmed `PBase`: stage 1 (box formation) is identical;
//! stages 2/4 (tree-sum-to-1 tightening, warp correction) do not apply since
//! values are not required to sum to anything. Grounded on the same
//! `Solver`-style `load`-and-query shape as `PBase`.

use crate::base::statement::Statement;
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;
use crate::limits::{EPS, MAX_STMTS};

pub const MIDBOX_ABSENT: f64 = -1.0;
pub const MIDBOX_SKIP: f64 = -2.0;

#[derive(Debug, Clone)]
pub struct VBase {
    statements: Vec<Statement>,
    explicit_box: Vec<Option<(f64, f64)>>,
    lo_midbox: Vec<f64>,
    up_midbox: Vec<f64>,

    loaded: bool,
    hull_lo: Vec<f64>,
    hull_up: Vec<f64>,
    mhull_lo: Vec<f64>,
    mhull_up: Vec<f64>,
    mass_point: Vec<f64>,

    /// External presentation range; internal scale is always [0,1].
    v_lo: f64,
    v_up: f64,
}

impl Default for VBase {
    fn default() -> Self {
        Self {
            statements: Vec::new(),
            explicit_box: Vec::new(),
            lo_midbox: Vec::new(),
            up_midbox: Vec::new(),
            loaded: false,
            hull_lo: Vec::new(),
            hull_up: Vec::new(),
            mhull_lo: Vec::new(),
            mhull_up: Vec::new(),
            mass_point: Vec::new(),
            v_lo: 0.0,
            v_up: 1.0,
        }
    }
}

impl VBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_external_range(&mut self, v_lo: f64, v_up: f64) -> EngineResult<()> {
        if v_up < v_lo {
            return Err(EngineError::InputError);
        }
        self.v_lo = v_lo;
        self.v_up = v_up;
        Ok(())
    }

    pub fn to_external(&self, internal: f64) -> f64 {
        self.v_lo + internal * (self.v_up - self.v_lo)
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

    pub fn add_statement(&mut self, frame: &Frame, stmt: Statement) -> EngineResult<()> {
        if !frame.is_real_b1(stmt.node)? {
            return Err(EngineError::InputError);
        }
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
        let slot = self.explicit_box.get_mut(node).ok_or(EngineError::InputError)?;
        *slot = Some((lobo, upbo));
        Ok(())
    }

    pub fn unset_range_box(&mut self, node: usize) -> EngineResult<()> {
        let slot = self.explicit_box.get_mut(node).ok_or(EngineError::InputError)?;
        *slot = None;
        Ok(())
    }

    pub fn set_midpoint_box(&mut self, node: usize, lobo: f64, upbo: f64) -> EngineResult<()> {
        *self.lo_midbox.get_mut(node).ok_or(EngineError::InputError)? = lobo;
        *self.up_midbox.get_mut(node).ok_or(EngineError::InputError)? = upbo;
        Ok(())
    }

    pub fn clear_midpoint_box(&mut self, node: usize) -> EngineResult<()> {
        self.set_midpoint_box(node, MIDBOX_ABSENT, MIDBOX_ABSENT)
    }

    pub fn load(&mut self, frame: &Frame) -> EngineResult<()> {
        let n = frame.total_nodes();
        if self.explicit_box.len() != n {
            self.explicit_box = vec![None; n];
            self.lo_midbox = vec![MIDBOX_ABSENT; n];
            self.up_midbox = vec![MIDBOX_ABSENT; n];
        }

        let mut hull_lo = vec![0.0f64; n];
        let mut hull_up = vec![1.0f64; n];
        for v in 0..n {
            if let Some((lo, up)) = self.explicit_box[v] {
                hull_lo[v] = lo;
                hull_up[v] = up;
            }
        }
        for s in &self.statements {
            hull_lo[s.node] = hull_lo[s.node].max(s.lobo);
            hull_up[s.node] = hull_up[s.node].min(s.upbo);
        }
        for v in 0..n {
            if hull_up[v] < hull_lo[v] - EPS {
                return Err(EngineError::Inconsistent);
            }
            hull_lo[v] = hull_lo[v].clamp(0.0, 1.0);
            hull_up[v] = hull_up[v].clamp(0.0, 1.0);
        }

        let mut mhull_lo = vec![0.0f64; n];
        let mut mhull_up = vec![0.0f64; n];
        let mut mass_point = vec![0.0f64; n];
        for v in 0..n {
            let (mlo, mup) = if self.lo_midbox[v] != MIDBOX_ABSENT && self.lo_midbox[v] != MIDBOX_SKIP
            {
                if self.lo_midbox[v] < hull_lo[v] - EPS || self.up_midbox[v] > hull_up[v] + EPS {
                    return Err(EngineError::Inconsistent);
                }
                (self.lo_midbox[v], self.up_midbox[v])
            } else {
                (hull_lo[v], hull_up[v])
            };
            mhull_lo[v] = mlo;
            mhull_up[v] = mup;
            mass_point[v] = 0.5 * (mlo + mup);
        }

        self.hull_lo = hull_lo;
        self.hull_up = hull_up;
        self.mhull_lo = mhull_lo;
        self.mhull_up = mhull_up;
        self.mass_point = mass_point;
        self.loaded = true;
        Ok(())
    }

    pub fn hull(&self, node: usize) -> EngineResult<(f64, f64)> {
        self.ensure_loaded()?;
        Ok((
            *self.hull_lo.get(node).ok_or(EngineError::InputError)?,
            *self.hull_up.get(node).ok_or(EngineError::InputError)?,
        ))
    }

    pub fn mass_point_at(&self, node: usize) -> EngineResult<f64> {
        self.ensure_loaded()?;
        self.mass_point.get(node).copied().ok_or(EngineError::InputError)
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
    fn default_value_mass_point_is_half() {
        let frame = Frame::create_flat("f", &[2, 2]).unwrap();
        let mut vbase = VBase::new();
        vbase.load(&frame).unwrap();
        let node = frame.top_level_b1(0).unwrap()[0];
        assert!((vbase.mass_point_at(node).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn statement_on_intermediate_node_rejected() {
        let tot = vec![4usize];
        let next = vec![vec![Some(3), Some(2), None, None]];
        let down = vec![vec![Some(1), None, None, None]];
        let tot2 = vec![1usize];
        let next2 = vec![vec![None]];
        let down2 = vec![vec![None]];
        let spec = crate::frame::TreeSpec {
            tot_cons: &[tot[0], tot2[0]],
            next: &[next[0].clone(), next2[0].clone()],
            down: &[down[0].clone(), down2[0].clone()],
        };
        let frame = Frame::create_tree("f", spec).unwrap();
        let mut vbase = VBase::new();
        vbase.load(&frame).unwrap();
        let intermediate = frame.a1_to_b1(crate::frame::A1::new(0, 0)).unwrap();
        let err = vbase
            .add_statement(&frame, Statement::new(intermediate, 0.2, 0.3).unwrap())
            .unwrap_err();
        assert_eq!(err, EngineError::InputError);
    }
}
