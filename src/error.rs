//! Engine-wide error taxonomy.
//!
//! Grounded on `src/linalg/solver.rs`'s `LinearSolverError` in the teacher
//! crate: a flat enum derived with `derive_more::{Display, Error}`, one
//! variant per failure kind, returned directly from every fallible entry
//! point instead of behind a generic wrapper type.

use derive_more::{Display, Error};

/// Every failure kind a `massframe` engine or CAR operation can return.
#[derive(Debug, Display, Error, PartialEq, Eq, Clone, Copy)]
pub enum EngineError {
    /// Malformed arguments (wrong lengths, out-of-range fields).
    #[display("malformed arguments")]
    InputError,
    /// Correct arguments, wrong lifecycle phase (e.g. CAR double-init).
    #[display("operation not valid in the current lifecycle phase")]
    StateError,
    /// Correct phase, action disallowed in it (e.g. set_W_base while a partial hull is open).
    #[display("operation not allowed in the current mode")]
    NotAllowed,
    /// Reference to a criterion index that does not exist.
    #[display("unknown criterion")]
    CritUnknown,
    /// Reference to an alternative index that does not exist.
    #[display("unknown alternative")]
    AltUnknown,
    /// Operation requires a flat frame but the frame is a tree, or vice versa.
    #[display("wrong frame type for this operation")]
    WrongFrameType,
    /// A base was queried before `load` succeeded at least once.
    #[display("base has not been loaded")]
    FrameNotLoaded,
    /// A statement set has no feasible point (hull/midbox contradiction).
    #[display("constraint set is inconsistent")]
    Inconsistent,
    /// Malformed topology: non-contiguous pre-order numbering, lonely intermediate, count mismatch.
    #[display("malformed tree topology")]
    TreeError,
    /// Too many alternatives requested.
    #[display("too many alternatives")]
    TooManyAlts,
    /// Too many real nodes requested.
    #[display("too many consequences")]
    TooManyCons,
    /// Too many statements requested.
    #[display("too many statements")]
    TooManyStmts,
    /// A statement's interval is narrower than the configured minimum width.
    #[display("statement interval is too narrow")]
    TooNarrowStmt,
    /// Fewer than two alternatives requested.
    #[display("too few alternatives")]
    TooFewAlts,
    /// Allocation failure.
    #[display("out of memory")]
    OutOfMemory,
    /// Internal consistency check failed (programmer error, not a user input problem).
    #[display("corrupted internal state")]
    Corrupted,
    /// Benign: a CAR ranking degenerated to "all equal".
    #[display("ranking degenerated to all-equal")]
    SameRankings,
    /// A requested file does not exist or could not be opened.
    #[display("no such file")]
    NoFile,
}

/// Convenience alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;
