//! DURENO-II: the partial-hull pairwise trade-off verification protocol
//! layered over a [`WBase`] (§4.5 "Partial-hull trade-off").
//!
//! Two-term trade-off statements are a CAR-only concept (§3 "a two-term
//! weight statement ... records two criteria with signs {+1,-1} and a ratio
//! interval"); they never reach `PBase`/`VBase`, which only accept
//! single-term statements.

use crate::base::{Statement, TradeoffStatement};
use crate::error::{EngineError, EngineResult};
use crate::limits::EPS;

use super::w_base::WBase;

fn validate(wbase: &WBase, stmt: &TradeoffStatement) -> EngineResult<()> {
    if stmt.c1 >= wbase.n_criteria() || stmt.c2 >= wbase.n_criteria() {
        return Err(EngineError::CritUnknown);
    }
    Ok(())
}

/// Clears any ambient midpoint box so the hull is free to move under
/// subsequent `prune`/`cut`/`equal` calls.
pub fn open(wbase: &mut WBase) -> EngineResult<()> {
    wbase.clear_all_midpoint_boxes();
    wbase.load()
}

/// The achievable trade-off ratio on the common scale. `tradeoff_query ==
/// -1.0` asks for the maximum trade-off (caller performs the decomposition);
/// otherwise returns the ratio implied by `stmt` against the current hulls,
/// or `-2.0` if `c2`'s lower bound is degenerate.
pub fn check(wbase: &WBase, stmt: &TradeoffStatement, tradeoff_query: f64) -> EngineResult<f64> {
    validate(wbase, stmt)?;
    let (_, up1) = wbase.hull(stmt.c1)?;
    let (lo2, _) = wbase.hull(stmt.c2)?;
    if lo2.abs() < EPS {
        return Ok(-2.0);
    }
    if tradeoff_query == -1.0 {
        return Ok(up1 / lo2);
    }
    Ok((stmt.lobo * up1) / (stmt.upbo * lo2))
}

/// If `stmt` cuts into the current hull, tighten whichever side is
/// violated by adding a single-term bound. Returns the number of statements
/// added (0 or 1).
pub fn prune(wbase: &mut WBase, stmt: &TradeoffStatement) -> EngineResult<usize> {
    validate(wbase, stmt)?;
    let (lo1, up1) = wbase.hull(stmt.c1)?;
    let (lo2, up2) = wbase.hull(stmt.c2)?;
    if stmt.lobo * lo1 >= stmt.upbo * up2 {
        return Ok(0);
    }

    let new_lo1 = stmt.upbo * lo2 / stmt.lobo;
    if up1 - new_lo1 >= 2.0 * EPS {
        wbase.add_statement(Statement::new(stmt.c1, new_lo1, up1)?)?;
        return Ok(1);
    }
    let new_up2 = stmt.lobo * up1 / stmt.upbo;
    if new_up2 - lo2 >= 2.0 * EPS {
        wbase.add_statement(Statement::new(stmt.c2, lo2, new_up2)?)?;
        return Ok(1);
    }
    Err(EngineError::Inconsistent)
}

/// Stricter than `prune`: splits the overlap gap evenly between both sides
/// (the analog of a strict `>`). Returns the number of statements added (0
/// or 2).
pub fn cut(wbase: &mut WBase, stmt: &TradeoffStatement) -> EngineResult<usize> {
    validate(wbase, stmt)?;
    let (lo1, up1) = wbase.hull(stmt.c1)?;
    let (lo2, up2) = wbase.hull(stmt.c2)?;
    let gap = stmt.upbo * up2 - stmt.lobo * lo1;
    if gap <= 0.0 {
        return Ok(0);
    }
    let new_lo1 = lo1 + gap / (2.0 * stmt.lobo);
    let new_up2 = up2 - gap / (2.0 * stmt.upbo);
    if up1 - new_lo1 < 2.0 * EPS || new_up2 - lo2 < 2.0 * EPS {
        return Err(EngineError::Inconsistent);
    }
    wbase.add_statement(Statement::new(stmt.c1, new_lo1, up1)?)?;
    wbase.add_statement(Statement::new(stmt.c2, lo2, new_up2)?)?;
    Ok(2)
}

/// `prune` in both directions with the terms swapped; total added
/// statement count returned.
pub fn equal(wbase: &mut WBase, stmt: &TradeoffStatement) -> EngineResult<usize> {
    let forward = prune(wbase, stmt)?;
    let swapped = TradeoffStatement::new(stmt.c2, stmt.c1, stmt.lobo, stmt.upbo)?;
    let backward = prune(wbase, &swapped)?;
    Ok(forward + backward)
}

/// Re-reads the current mass point and installs a tight `±ε` midpoint box
/// around it, re-anchoring the base's mass point.
pub fn close(wbase: &mut WBase) -> EngineResult<()> {
    let n = wbase.n_criteria();
    let mut points = Vec::with_capacity(n);
    for c in 0..n {
        points.push(wbase.mass_point_at(c)?);
    }
    for (c, mp) in points.into_iter().enumerate() {
        wbase.set_midpoint_box(c, (mp - EPS).max(0.0), (mp + EPS).min(1.0))?;
    }
    wbase.load()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_criteria(lo1: f64, up1: f64, lo2: f64, up2: f64) -> WBase {
        let mut w = WBase::new();
        w.reset(2);
        w.add_statement(Statement::new(0, lo1, up1).unwrap()).unwrap();
        w.add_statement(Statement::new(1, lo2, up2).unwrap()).unwrap();
        w
    }

    #[test]
    fn check_returns_degenerate_sentinel_on_zero_lower_bound() {
        let w = two_criteria(0.3, 0.5, 0.0, 0.3);
        let stmt = TradeoffStatement::new(0, 1, 2.0, 2.0).unwrap();
        let ratio = check(&w, &stmt, 0.0).unwrap();
        assert_eq!(ratio, -2.0);
    }

    #[test]
    fn prune_tightens_violated_side() {
        let mut w = two_criteria(0.05, 0.5, 0.3, 0.5);
        let stmt = TradeoffStatement::new(0, 1, 2.0, 2.0).unwrap();
        let added = prune(&mut w, &stmt).unwrap();
        assert_eq!(added, 1);
        let (lo1, up1) = w.hull(0).unwrap();
        assert!(lo1 > 0.05 + EPS, "c1's lower bound should have tightened, got {lo1}");
        assert!((lo1 - 0.3).abs() < 1e-9);
        assert!((up1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn equal_is_idempotent_once_consistent() {
        let mut w = two_criteria(0.3, 0.5, 0.1, 0.3);
        let stmt = TradeoffStatement::new(0, 1, 2.0, 2.0).unwrap();
        equal(&mut w, &stmt).unwrap();
        let second = equal(&mut w, &stmt).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn close_centers_midpoint_within_epsilon() {
        let mut w = two_criteria(0.0, 1.0, 0.0, 1.0);
        open(&mut w).unwrap();
        close(&mut w).unwrap();
        for c in 0..2 {
            let (lo, up) = w.hull(c).unwrap();
            assert!(up - lo <= 4.0 * EPS + 1e-9);
        }
    }
}
