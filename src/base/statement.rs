//! Statement records accepted by a base (§3 "Statement").
//!
//! Only single-term statements are accepted everywhere except the CAR
//! partial-hull entry points, which take the distinct two-term
//! [`TradeoffStatement`] shape instead of a generic signed multi-term
//! variant (§9 "Signed two-term statements").

use crate::error::{EngineError, EngineResult};
use crate::limits::MIN_WIDTH;

/// A single-term interval constraint on one variable (a B1 node index, or a
/// criterion index for the CAR weight base).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statement {
    pub node: usize,
    pub lobo: f64,
    pub upbo: f64,
}

impl Statement {
    pub fn new(node: usize, lobo: f64, upbo: f64) -> EngineResult<Self> {
        if !(0.0..=1.0).contains(&lobo) || !(0.0..=1.0).contains(&upbo) || upbo < lobo {
            return Err(EngineError::InputError);
        }
        Ok(Self { node, lobo, upbo })
    }

    pub fn width(&self) -> f64 {
        self.upbo - self.lobo
    }

    pub fn check_min_width(&self) -> EngineResult<()> {
        if self.width() < MIN_WIDTH {
            return Err(EngineError::TooNarrowStmt);
        }
        Ok(())
    }
}

/// A two-term ratio bound between two criteria, accepted only by the CAR
/// partial-hull (DURENO-II) entry points (§4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeoffStatement {
    /// Criterion carrying the `+1` sign.
    pub c1: usize,
    /// Criterion carrying the `-1` sign.
    pub c2: usize,
    pub lobo: f64,
    pub upbo: f64,
}

impl TradeoffStatement {
    pub fn new(c1: usize, c2: usize, lobo: f64, upbo: f64) -> EngineResult<Self> {
        if c1 == c2 {
            return Err(EngineError::InputError);
        }
        if lobo > upbo {
            return Err(EngineError::InputError);
        }
        Ok(Self { c1, c2, lobo, upbo })
    }
}
