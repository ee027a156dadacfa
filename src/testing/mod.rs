//! Testing infrastructure
//!
//! Fakes for the process and identity seams, shared by unit and integration tests.

pub mod fakes;

pub use fakes::*;
