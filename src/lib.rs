//! daemonize: run a program as another user, in the background, with a PID file
//!
//! One invocation performs one identity transition and one exec, then ceases
//! to exist as the original process.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::identity`]: passwd/group resolution and supplementary group scan
//! - [`kernel::credentials`]: setgroups -> setgid -> setuid with strict/permissive policy
//! - [`kernel::process`]: the [`kernel::process::ProcessControl`] seam over chdir, ids, daemon(3), exec
//!
//! ## Execution Control ([`exec`])
//! - [`exec::transition`]: type-state enforced step ordering
//! - [`exec::controller`]: drives the chain from a request to exec
//! - [`exec::pidfile`]: PID file opened early, written after detach
//! - [`exec::image`]: argv and environment of the replacement program
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: [`TransitionRequest`], [`DaemonizeError`], exit codes
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::fakes`]: recording fakes for both seams
//!
//! # Ordering guarantees
//!
//! 1. The PID file is created with the original privileges, before any id change
//! 2. Supplementary groups, then gid, then uid
//! 3. The pid is written after detaching, so it names the final process

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Configuration
pub mod config;

// Testing Infrastructure
pub mod testing;

// CLI entrypoint wiring for the daemonize binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use exec::controller::{daemonize, run_transition};
