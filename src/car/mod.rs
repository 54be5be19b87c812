//! CAR: Cardinal Alternative Ranking, the ordinal-to-interval translation
//! layer above a frame's bases (§4.5, §6 "CAR API").
//!
//! Stateful like the teacher's `Solver` lifecycle (`new` → mutate → `solve`):
//! exactly one [`CarLayer::init`] before use, paired with [`CarLayer::exit`].

pub mod phull;
pub mod rankgen;
pub mod w_base;

use crate::base::{PBase, Statement, VBase};
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;
use crate::limits::{EPS, MAX_STEPS_PW, V_UNC_MAX, V_UNC_MIN, W_UNC_MAX, W_UNC_MIN};

pub use crate::base::TradeoffStatement;
pub use rankgen::Generator;
pub use w_base::WBase;

/// Bit 0: Excel-compatible weight rounding. Bit 1: Excel-compatible value
/// rounding. Bit 2: "light" mode — skip midpoint-box anchoring (§9 Open
/// Question 3, a runtime flag rather than a compile-time switch since this
/// crate has no compile-time feature matrix elsewhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CarMode(pub u8);

impl CarMode {
    pub const EXCEL_WEIGHTS: u8 = 1 << 0;
    pub const EXCEL_VALUES: u8 = 1 << 1;
    pub const LIGHT: u8 = 1 << 2;

    pub fn is_light(self) -> bool {
        self.0 & Self::LIGHT != 0
    }
}

/// The CAR layer's own state: ranking method, mode bits, compat
/// uncertainties, the standalone weight base, and whether a partial hull is
/// currently open.
#[derive(Debug, Clone, Default)]
pub struct CarLayer {
    initialized: bool,
    method: Generator,
    mode: CarMode,
    w_unc: f64,
    v_unc: f64,
    w_base: WBase,
    phull_open: bool,
}

impl CarLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `frame_attached` lets the caller (the engine) enforce "init-while-
    /// frame-loaded is an error" (§4.5), since the CAR layer itself holds no
    /// frame reference.
    pub fn init(&mut self, method: Generator, mode: CarMode, frame_attached: bool) -> EngineResult<()> {
        if self.initialized {
            return Err(EngineError::StateError);
        }
        if frame_attached {
            return Err(EngineError::StateError);
        }
        self.method = method;
        self.mode = mode;
        self.w_unc = W_UNC_MIN;
        self.v_unc = V_UNC_MIN;
        self.w_base = WBase::new();
        self.phull_open = false;
        self.initialized = true;
        Ok(())
    }

    pub fn exit(&mut self) -> EngineResult<()> {
        self.require_init()?;
        self.initialized = false;
        self.phull_open = false;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_compat(&mut self, w_unc: f64, v_unc: f64) -> EngineResult<()> {
        self.require_init()?;
        if !(W_UNC_MIN..=W_UNC_MAX).contains(&w_unc) || !(V_UNC_MIN..=V_UNC_MAX).contains(&v_unc) {
            return Err(EngineError::InputError);
        }
        self.w_unc = w_unc;
        self.v_unc = v_unc;
        Ok(())
    }

    pub fn w_base(&self) -> &WBase {
        &self.w_base
    }

    /// The criteria sorted descending by current weight mass point.
    pub fn get_w_ordinal(&self) -> EngineResult<Vec<usize>> {
        self.require_init()?;
        let n = self.w_base.n_criteria();
        let mut order: Vec<usize> = (0..n).collect();
        let mut err = None;
        order.sort_by(|&a, &b| match (self.w_base.mass_point_at(a), self.w_base.mass_point_at(b)) {
            (Ok(ma), Ok(mb)) => mb.partial_cmp(&ma).unwrap(),
            (e @ Err(_), _) | (_, e @ Err(_)) => {
                err = e.err();
                std::cmp::Ordering::Equal
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(order)
    }

    /// Builds the per-criterion weight base from an ordering and
    /// consecutive relation steps (§4.5 "Weight base").
    pub fn set_w_base(&mut self, ord_crit: &[usize], rel: &[i32]) -> EngineResult<()> {
        self.require_init()?;
        if self.phull_open {
            return Err(EngineError::NotAllowed);
        }
        let n = ord_crit.len();
        if n == 0 || rel.len() + 1 != n {
            return Err(EngineError::InputError);
        }
        let intervals = ordinal_intervals(self.method, rel)?;

        self.w_base.reset(n);
        for (&crit, &(lo, up)) in ord_crit.iter().zip(&intervals) {
            self.w_base.add_statement(Statement::new(crit, lo, up)?)?;
        }
        if !self.mode.is_light() {
            for &crit in ord_crit {
                let mp = self.w_base.mass_point_at(crit)?;
                self.w_base.set_midpoint_box(crit, (mp - EPS).max(0.0), (mp + EPS).min(1.0))?;
            }
            self.w_base.load()?;
        }
        Ok(())
    }

    /// Analogous to `set_w_base` but emits into a `PBase` under a specific
    /// sibling group (criterion/alternative/subtree-parent), per §4.5.
    pub fn set_p_base(
        &mut self,
        pbase: &mut PBase,
        frame: &Frame,
        siblings: &[usize],
        rel: &[i32],
    ) -> EngineResult<()> {
        self.require_init()?;
        if !frame.is_pure_tree() {
            return Err(EngineError::TreeError);
        }
        let n = siblings.len();
        if n == 0 || rel.len() + 1 != n {
            return Err(EngineError::InputError);
        }
        for w in siblings.windows(2) {
            if !frame.same_parent(w[0], w[1])? {
                return Err(EngineError::TreeError);
            }
        }
        let intervals = ordinal_intervals(self.method, rel)?;

        let snapshot = pbase.snapshot();
        for (&node, &(lo, up)) in siblings.iter().zip(&intervals) {
            if let Err(e) = pbase.add_statement(frame, Statement::new(node, lo, up)?) {
                pbase.restore(frame, snapshot)?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Full joint ranking across all of a criterion's leaves (§4.5 "Probability
    /// and value bases"). An empty ranking maps every leaf to 0.5 and returns
    /// `SameRankings` (benign, per §9 Open Question 2's resolution).
    pub fn set_v_base(
        &mut self,
        vbase: &mut VBase,
        frame: &Frame,
        leaf_order: &[usize],
        rel: &[i32],
    ) -> EngineResult<()> {
        self.require_init()?;
        if leaf_order.is_empty() {
            let snapshot = vbase.snapshot();
            for alt in 0..frame.n_alts() {
                for leaf in frame.leaves_of_alt(alt)? {
                    if let Err(e) = vbase.add_statement(frame, Statement::new(leaf, 0.5, 0.5)?) {
                        vbase.restore(frame, snapshot)?;
                        return Err(e);
                    }
                }
            }
            return Err(EngineError::SameRankings);
        }
        let n = leaf_order.len();
        if rel.len() + 1 != n {
            return Err(EngineError::InputError);
        }
        let intervals = ordinal_intervals(self.method, rel)?;

        let snapshot = vbase.snapshot();
        for (&leaf, &(lo, up)) in leaf_order.iter().zip(&intervals) {
            if let Err(e) = vbase.add_statement(frame, Statement::new(leaf, lo, up)?) {
                vbase.restore(frame, snapshot)?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Distance ranking (§4.5 "Distance ranking"): a strict descending order
    /// plus `dist ∈ [-1,1]` instead of explicit relation steps.
    pub fn rank_w_base(&mut self, ord_crit: &[usize], dist: f64) -> EngineResult<()> {
        self.require_init()?;
        if self.phull_open {
            return Err(EngineError::NotAllowed);
        }
        let intervals = rank_intervals(self.method, ord_crit.len(), dist)?;
        self.w_base.reset(ord_crit.len());
        for (&crit, &(lo, up)) in ord_crit.iter().zip(&intervals) {
            self.w_base.add_statement(Statement::new(crit, lo, up)?)?;
        }
        Ok(())
    }

    pub fn rank_p_base(
        &mut self,
        pbase: &mut PBase,
        frame: &Frame,
        siblings: &[usize],
        dist: f64,
    ) -> EngineResult<()> {
        self.require_init()?;
        let intervals = rank_intervals(self.method, siblings.len(), dist)?;
        let snapshot = pbase.snapshot();
        for (&node, &(lo, up)) in siblings.iter().zip(&intervals) {
            if let Err(e) = pbase.add_statement(frame, Statement::new(node, lo, up)?) {
                pbase.restore(frame, snapshot)?;
                return Err(e);
            }
        }
        Ok(())
    }

    // -- partial hull --------------------------------------------------

    pub fn open_w_phull(&mut self) -> EngineResult<()> {
        self.require_init()?;
        self.phull_open = true;
        phull::open(&mut self.w_base)
    }

    pub fn check_w_phull(&self, stmt: &TradeoffStatement, tradeoff_query: f64) -> EngineResult<f64> {
        self.require_init()?;
        if !self.phull_open {
            return Err(EngineError::NotAllowed);
        }
        phull::check(&self.w_base, stmt, tradeoff_query)
    }

    pub fn prune_w_phull(&mut self, stmt: &TradeoffStatement) -> EngineResult<usize> {
        self.require_init()?;
        if !self.phull_open {
            return Err(EngineError::NotAllowed);
        }
        phull::prune(&mut self.w_base, stmt)
    }

    pub fn cut_w_phull(&mut self, stmt: &TradeoffStatement) -> EngineResult<usize> {
        self.require_init()?;
        if !self.phull_open {
            return Err(EngineError::NotAllowed);
        }
        phull::cut(&mut self.w_base, stmt)
    }

    pub fn equal_w_phull(&mut self, stmt: &TradeoffStatement) -> EngineResult<usize> {
        self.require_init()?;
        if !self.phull_open {
            return Err(EngineError::NotAllowed);
        }
        phull::equal(&mut self.w_base, stmt)
    }

    pub fn close_w_phull(&mut self) -> EngineResult<()> {
        self.require_init()?;
        if !self.phull_open {
            return Err(EngineError::NotAllowed);
        }
        phull::close(&mut self.w_base)?;
        self.phull_open = false;
        Ok(())
    }

    fn require_init(&self) -> EngineResult<()> {
        if !self.initialized {
            return Err(EngineError::StateError);
        }
        Ok(())
    }
}

/// Shared by `set_W_base`/`set_P_base`/`set_V_base`: consecutive relation
/// steps -> per-position `(lobo, upbo)`, nullified tail mapped to `(0,0)`.
fn ordinal_intervals(method: Generator, rel: &[i32]) -> EngineResult<Vec<(f64, f64)>> {
    let n = rel.len() + 1;
    let mut active_len = n;
    for (i, &r) in rel.iter().enumerate() {
        if r == -1 {
            active_len = i + 1;
            break;
        }
        if !(0..=MAX_STEPS_PW).contains(&r) {
            return Err(EngineError::InputError);
        }
    }

    let tot = 1 + rel[..active_len.saturating_sub(1)].iter().map(|&r| r as usize).sum::<usize>();
    let crc = rankgen::generate(method, tot, 0)?;

    let mut positions = Vec::with_capacity(active_len);
    let mut cum = 0usize;
    positions.push(0);
    for &r in &rel[..active_len.saturating_sub(1)] {
        cum += r as usize;
        positions.push(cum);
    }

    let mut out = Vec::with_capacity(n);
    for k in 0..n {
        if k >= active_len {
            out.push((0.0, 0.0));
            continue;
        }
        out.push(crc_interval(&crc, positions[k]));
    }
    Ok(out)
}

/// The midpoint toward each of `crc[pos]`'s neighbors, or an asymmetric
/// extrapolation at the ends (§4.5).
fn crc_interval(crc: &[f64], pos: usize) -> (f64, f64) {
    let n = crc.len();
    let upbo = if pos == 0 {
        if n > 1 {
            (crc[0] + (crc[0] - crc[1]) / 2.0).min(1.0)
        } else {
            crc[0]
        }
    } else {
        0.5 * (crc[pos] + crc[pos - 1])
    };
    let lobo = if pos + 1 >= n {
        if n > 1 {
            (crc[n - 1] - (crc[n - 2] - crc[n - 1]) / 2.0).max(0.0)
        } else {
            crc[n - 1]
        }
    } else {
        0.5 * (crc[pos] + crc[pos + 1])
    };
    (lobo, upbo)
}

/// Shared by `rank_W_base`/`rank_P_base`: a strict descending order plus a
/// signed distance maps to per-rank `(lobo, upbo)` via `dfact = (dist+1)/2`.
fn rank_intervals(method: Generator, n: usize, dist: f64) -> EngineResult<Vec<(f64, f64)>> {
    if !(-1.0..=1.0).contains(&dist) {
        return Err(EngineError::InputError);
    }
    let crc = rankgen::generate(method, n, 0)?;
    let dfact = (dist + 1.0) / 2.0;
    let mut out = Vec::with_capacity(n);
    for k in 0..n {
        let next = if k + 1 < n { crc[k + 1] } else { 0.0 };
        let prev = if k > 0 { crc[k - 1] } else { crc[0] };
        let lobo = dfact * crc[k] + (1.0 - dfact) * next;
        let upbo = dfact * crc[k] + (1.0 - dfact) * prev;
        out.push((lobo.min(upbo), lobo.max(upbo)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_init_rejected() {
        let mut car = CarLayer::new();
        car.init(Generator::default(), CarMode::default(), false).unwrap();
        let err = car.init(Generator::default(), CarMode::default(), false).unwrap_err();
        assert_eq!(err, EngineError::StateError);
    }

    #[test]
    fn init_while_frame_attached_rejected() {
        let mut car = CarLayer::new();
        let err = car.init(Generator::default(), CarMode::default(), true).unwrap_err();
        assert_eq!(err, EngineError::StateError);
    }

    #[test]
    fn set_w_base_strictly_decreasing_weights() {
        let mut car = CarLayer::new();
        car.init(Generator::default(), CarMode::default(), false).unwrap();
        car.set_w_base(&[0, 1, 2], &[1, 1]).unwrap();
        let w0 = car.w_base().mass_point_at(0).unwrap();
        let w1 = car.w_base().mass_point_at(1).unwrap();
        let w2 = car.w_base().mass_point_at(2).unwrap();
        assert!(w0 > w1);
        assert!(w1 > w2);
        assert!((w0 + w1 + w2 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn set_w_base_while_phull_open_rejected() {
        let mut car = CarLayer::new();
        car.init(Generator::default(), CarMode::default(), false).unwrap();
        car.set_w_base(&[0, 1], &[1]).unwrap();
        car.open_w_phull().unwrap();
        let err = car.set_w_base(&[0, 1], &[1]).unwrap_err();
        assert_eq!(err, EngineError::NotAllowed);
    }

    #[test]
    fn equal_w_phull_idempotent_after_first_application() {
        let mut car = CarLayer::new();
        car.init(Generator::default(), CarMode::default(), false).unwrap();
        car.set_w_base(&[0, 1], &[3]).unwrap();
        car.open_w_phull().unwrap();
        let stmt = TradeoffStatement::new(0, 1, 1.0, 1.0).unwrap();
        car.equal_w_phull(&stmt).unwrap();
        let second = car.equal_w_phull(&stmt).unwrap();
        assert_eq!(second, 0);
    }
}
