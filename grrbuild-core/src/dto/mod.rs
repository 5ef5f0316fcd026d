//! Data Transfer Objects
//!
//! Serialisable summaries of a build, written out by the CLI.

pub mod report;
