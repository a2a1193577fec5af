//! Pure functions over the current sibling set.
//!
//! The conflict verdict and the import aggregate are computed here as
//! deterministic, side-effect-free functions of the full current state,
//! with time passed as an explicit parameter. The reconcilers are thin
//! imperative shells around these: read state, call the pure function,
//! CAS the difference.

mod aggregate;
mod resolve;

pub use aggregate::aggregate_import;
pub use resolve::VerdictAssignment;
pub use resolve::resolve_verdicts;
pub use resolve::select_winner;
