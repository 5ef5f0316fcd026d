//! Core domain types
//!
//! This module contains the structures shared between the pipeline stages
//! (which produce and consume them) and the CLI (which reports on them).

pub mod context;
pub mod contract;
pub mod log;
pub mod recipe;
pub mod sdist;
pub mod stage;
pub mod version;
