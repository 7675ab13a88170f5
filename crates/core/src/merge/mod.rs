//! The batch merge state machine and the hand-off for unresolved conflicts.

pub mod controller;
pub mod handoff;

pub use controller::{MergeController, STASH_MESSAGE};
pub use handoff::{CommandHandoff, ConflictHandoff, NoHandoff};
