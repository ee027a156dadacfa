//! Configuration
//!
//! The transition request, the error taxonomy and exit status constants.

pub mod types;
