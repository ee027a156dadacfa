//! Drives the whole transition chain from a request to the final exec.

use crate::config::types::{Result, TransitionRequest};
use crate::exec::transition::Transition;
use crate::kernel::identity::{IdentityDatabase, SystemIdentityDatabase};
use crate::kernel::process::{ProcessControl, SystemProcess};
use std::convert::Infallible;
use std::ffi::OsString;
use std::path::Path;

/// Run every step against the given seams. Returns only on failure; on
/// success the process image has been replaced.
pub fn run_transition(
    request: &TransitionRequest,
    program: &Path,
    args: &[OsString],
    sys: &dyn ProcessControl,
    db: &dyn IdentityDatabase,
) -> Result<Infallible> {
    log::debug!("Transition request: {:?}", request);

    Transition::new(request, sys, db)
        .change_directory()?
        .resolve_identity()?
        .open_pid_file()?
        .drop_privileges()?
        .detach()?
        .record_pid()
        .exec(program, args)
}

/// [`run_transition`] against the running process and the system databases.
pub fn daemonize(request: &TransitionRequest, program: &Path, args: &[OsString]) -> Result<Infallible> {
    run_transition(request, program, args, &SystemProcess, &SystemIdentityDatabase)
}
