//! Apply a resolved identity to the running process.
//!
//! CRITICAL: setgroups MUST run before setgid, and setgid before setuid.
//! Once the uid is dropped the process can no longer change its groups.

use crate::config::types::{DaemonizeError, Result};
use crate::kernel::identity::ResolvedIdentity;
use crate::kernel::process::ProcessControl;
use nix::errno::Errno;

/// 4-step transition: supplementary groups -> gid -> uid -> verify (strict only).
///
/// In permissive mode a failed call is logged and the sequence continues, so
/// the process may keep its original ids. Strict mode fails on the first error.
pub fn apply_identity(
    identity: &ResolvedIdentity,
    sys: &dyn ProcessControl,
    strict_mode: bool,
) -> Result<()> {
    if identity.is_unchanged() {
        log::debug!("No user or group requested; keeping current credentials");
        return Ok(());
    }

    if let Some(gids) = &identity.supplementary_gids {
        if check("setgroups", sys.set_groups(gids), strict_mode)? {
            log::info!("Set supplementary groups to {:?}", gids);
        }
    }

    // CRITICAL: GID before UID
    if let Some(gid) = identity.gid {
        if check("setgid", sys.set_gid(gid), strict_mode)? {
            log::info!("Set GID to {}", gid);
        }
    }

    if let Some(uid) = identity.uid {
        if check("setuid", sys.set_uid(uid), strict_mode)? {
            log::info!("Set UID to {}", uid);
        }
    }

    if strict_mode {
        verify_transition(identity, sys)?;
    }

    Ok(())
}

/// Ok(true) on success, Ok(false) on a tolerated failure.
fn check(op: &'static str, result: std::result::Result<(), Errno>, strict_mode: bool) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(source) if strict_mode => Err(DaemonizeError::Privilege { op, source }),
        Err(source) => {
            log::warn!("{}: {} (permissive mode)", op, source);
            Ok(false)
        }
    }
}

fn verify_transition(identity: &ResolvedIdentity, sys: &dyn ProcessControl) -> Result<()> {
    let current = sys.credentials();

    if let Some(uid) = identity.uid {
        if current.uid != uid || current.euid != uid {
            return Err(DaemonizeError::Verification(format!(
                "expected uid {}, got real={} effective={}",
                uid, current.uid, current.euid
            )));
        }
    }

    if let Some(gid) = identity.gid {
        if current.gid != gid || current.egid != gid {
            return Err(DaemonizeError::Verification(format!(
                "expected gid {}, got real={} effective={}",
                gid, current.gid, current.egid
            )));
        }
    }

    log::info!("UID/GID verification passed: {}", current);
    Ok(())
}
