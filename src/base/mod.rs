//! Constraint bases: probability (§4.2) and value (§4.3), sharing the
//! tree-hull/mass-point recursion in [`hull`] and the statement shapes in
//! [`statement`].

pub mod hull;
pub mod p_base;
pub mod statement;
pub mod v_base;

pub use p_base::PBase;
pub use statement::{Statement, TradeoffStatement};
pub use v_base::VBase;
