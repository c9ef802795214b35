//! # gw-plugins
//!
//! The Plugin Pipeline (C4, spec §4.4): a `Plugin` trait with symmetric
//! `pre`/`post` hooks and LIFO unwind semantics, generalized from a
//! `Tool` trait registry-and-dispatch shape.
//! Also home to the free-standing partial-JSON repair helper (spec §4.5).

pub mod builtin;
pub mod pipeline;
pub mod plugin;

pub use pipeline::{PostRunResult, PreRunResult, Pipeline};
pub use plugin::{Plugin, PostOutcome, PreOutcome};
