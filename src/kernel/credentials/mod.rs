//! UID/GID transitions for privilege dropping.
//!
//! CRITICAL: setgroups MUST be called BEFORE setgid, setgid BEFORE setuid.

mod transition;

pub use transition::apply_identity;
