//! grrbuild Core
//!
//! Core types and abstractions for the GRR server image build.
//!
//! This crate contains:
//! - Domain types: build context, recipe, artifacts, runtime contract
//! - DTOs: the serialisable build report
//! - Errors: the failure taxonomy shared by every pipeline stage

pub mod domain;
pub mod dto;
pub mod error;

pub use error::{BuildError, Result};
