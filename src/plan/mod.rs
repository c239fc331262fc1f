//! Execution plan data model
//!
//! The strictly-typed shape every plan takes once it crosses into the
//! pipeline: an intent, an ordered list of steps bound to tool adapters,
//! and the assumptions the drafter made along the way.

mod types;

pub use types::*;
