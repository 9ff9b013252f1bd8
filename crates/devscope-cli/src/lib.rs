//! `devscope` crate (library surface).
//!
//! The primary entrypoint for end users is the `devscope` binary. This crate re-exports the
//! backend-agnostic types/traits from `devscope-core`, plus the reqwest-backed pipeline.

pub use devscope_core::*;
pub use devscope_local as local;
