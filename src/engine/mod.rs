//! The annotation computation core.
//!
//! Computation is driven by the requirement graph between keys, never by
//! individual nodes. A request is first expanded into its closure, then keys
//! are computed in rounds, each round being one traversal of the model that
//! runs every key whose prerequisites finished in earlier rounds. This is a
//! Kahn-style topological schedule evaluated lazily, since the set of
//! computed keys grows between rounds.
//!
//! ## Core abstractions
//!
//! * [`Resolver`]: pure graph queries over the `key -> required keys` map,
//!   closure computation with cycle detection and the ready frontier.
//! * [`Scheduler`]: the incremental driver, it owns no state besides the
//!   [`Phase`] of the current call, all results live in the model.
//! * [`Diagnostics`]: what a call actually computed, round by round.

mod diagnostics;
mod resolver;
mod scheduler;

pub use crate::engine::diagnostics::{Diagnostics, Round};
pub use crate::engine::resolver::Resolver;
pub use crate::engine::scheduler::{Phase, Scheduler, executed_keys};
