//! Runs: records, storage and lifecycle
//!
//! A run is created once per governed request and only ever changes through
//! whole-field replacement in the store.

mod model;
mod postgres;
mod service;
mod store;

pub use model::*;
pub use postgres::PostgresRunStore;
pub use service::{RunRequest, RunService};
pub use store::{InMemoryRunStore, RunStore, StoreError};
