// src/exec/mod.rs

//! Build-system adapters.
//!
//! The strategy only knows the capability traits in [`crate::matrix`]; this
//! module provides the concrete adapter used by the CLI: a local executor
//! that runs each configuration as a child process. Tests provide their own
//! scripted adapter instead.

pub mod local;

pub use local::LocalMatrix;
