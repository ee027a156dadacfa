//! Thin wrappers around process identity primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: identity -> credentials -> process

pub mod credentials;
pub mod identity;
pub mod process;
