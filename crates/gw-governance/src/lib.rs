//! Governance Gate (C8, spec §4.8): resolves a request's virtual key and
//! enforces its allow-list, budget, and rate limits before dispatch, then
//! commits actual usage after dispatch.
//!
//! Uses a synchronous `RwLock`-guarded `HashMap` store rather than an
//! async store, since every operation here is a short, non-blocking
//! critical section.

pub mod gate;
pub mod store;

pub use gate::{GovernanceGate, UsageCommit};
pub use store::{GovernanceStore, InMemoryGovernanceStore};
