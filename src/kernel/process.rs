//! Process-wide mutations behind one seam.
//!
//! Every call that changes the running process (working directory, group
//! list, ids, session, image) goes through [`ProcessControl`]. The transition
//! chain only ever talks to this trait, so tests can record the call order
//! without root.

use crate::exec::image::NativeImage;
use nix::errno::Errno;
use std::convert::Infallible;
use std::fs::File;
use std::io;
use std::path::Path;

/// Real and effective ids of the running process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub euid: u32,
    pub gid: u32,
    pub egid: u32,
}

impl std::fmt::Display for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "uid={} euid={} gid={} egid={}",
            self.uid, self.euid, self.gid, self.egid
        )
    }
}

pub trait ProcessControl {
    fn change_directory(&self, path: &Path) -> io::Result<()>;
    /// Create or truncate the PID file with the current privileges.
    fn create_pid_file(&self, path: &Path) -> io::Result<File>;
    fn set_groups(&self, gids: &[u32]) -> Result<(), Errno>;
    /// Set real and effective gid (and saved gid where supported).
    fn set_gid(&self, gid: u32) -> Result<(), Errno>;
    /// Set real and effective uid (and saved uid where supported).
    fn set_uid(&self, uid: u32) -> Result<(), Errno>;
    fn credentials(&self) -> Credentials;
    /// Detach from the controlling terminal. May fork; only the child returns.
    fn daemonize(&self, keep_directory: bool) -> Result<(), Errno>;
    fn pid(&self) -> u32;
    /// Replace the process image. Returns only on failure.
    fn exec(&self, image: &NativeImage) -> Result<Infallible, Errno>;
}

/// The running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcess;

impl ProcessControl for SystemProcess {
    fn change_directory(&self, path: &Path) -> io::Result<()> {
        std::env::set_current_dir(path)
    }

    fn create_pid_file(&self, path: &Path) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;

        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(path)
    }

    fn set_groups(&self, gids: &[u32]) -> Result<(), Errno> {
        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        {
            use nix::unistd::{setgroups, Gid};
            let gids: Vec<Gid> = gids.iter().copied().map(Gid::from_raw).collect();
            setgroups(&gids)
        }

        #[cfg(any(target_os = "macos", target_os = "ios"))]
        {
            // SAFETY: pointer and length describe a live slice of gid_t.
            let rc = unsafe {
                libc::setgroups(gids.len() as libc::c_int, gids.as_ptr() as *const libc::gid_t)
            };
            Errno::result(rc).map(drop)
        }
    }

    /// MUST be called BEFORE set_uid.
    fn set_gid(&self, gid: u32) -> Result<(), Errno> {
        use nix::unistd::Gid;
        let gid = Gid::from_raw(gid);

        #[cfg(target_os = "linux")]
        {
            nix::unistd::setresgid(gid, gid, gid)
        }

        #[cfg(not(target_os = "linux"))]
        {
            nix::unistd::setgid(gid)?;
            nix::unistd::setegid(gid)
        }
    }

    /// MUST be called AFTER set_gid.
    fn set_uid(&self, uid: u32) -> Result<(), Errno> {
        use nix::unistd::Uid;
        let uid = Uid::from_raw(uid);

        #[cfg(target_os = "linux")]
        {
            nix::unistd::setresuid(uid, uid, uid)
        }

        #[cfg(not(target_os = "linux"))]
        {
            nix::unistd::setuid(uid)?;
            nix::unistd::seteuid(uid)
        }
    }

    fn credentials(&self) -> Credentials {
        use nix::unistd::{getegid, geteuid, getgid, getuid};

        Credentials {
            uid: getuid().as_raw(),
            euid: geteuid().as_raw(),
            gid: getgid().as_raw(),
            egid: getegid().as_raw(),
        }
    }

    fn daemonize(&self, keep_directory: bool) -> Result<(), Errno> {
        #[cfg(target_os = "linux")]
        {
            // noclose=false: stdin/stdout/stderr are redirected to /dev/null
            nix::unistd::daemon(keep_directory, false)
        }

        #[cfg(not(target_os = "linux"))]
        {
            let _ = keep_directory;
            log::error!("daemon(3) is only wired up on Linux");
            Err(Errno::ENOSYS)
        }
    }

    fn pid(&self) -> u32 {
        nix::unistd::getpid().as_raw() as u32
    }

    fn exec(&self, image: &NativeImage) -> Result<Infallible, Errno> {
        match image.env() {
            Some(env) => nix::unistd::execve(image.program(), image.argv(), env),
            None => nix::unistd::execv(image.program(), image.argv()),
        }
    }
}
