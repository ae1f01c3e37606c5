//! Shared interning stores: peer signatures and AS paths.
//!
//! Both stores are append-only and shared (behind `Arc<RwLock<_>>`) between
//! a view, its snapshots and the state engine. Ids are stable for the
//! lifetime of the store.

pub mod paths;
pub mod peers;

pub use paths::*;
pub use peers::*;
