//! Execution control
//!
//! Orchestrates the identity primitives into one ordered transition that ends
//! in exec, with type-state enforcement of the step order.

pub mod controller;
pub mod image;
pub mod pidfile;
pub mod transition;
