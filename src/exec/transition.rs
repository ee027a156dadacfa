//! Type-state transition chain
//!
//! The sequence is FIXED and must not drift:
//! 1. chdir into the configured working directory
//! 2. resolve user, group, supplementary groups and `HOME`
//! 3. create the PID file with the original privileges
//! 4. setgroups, then setgid, then setuid
//! 5. detach from the controlling terminal
//! 6. write the post-detach pid into the PID file
//! 7. exec the target program
//!
//! State progression:
//!
//! `Fresh -> DirectoryReady -> IdentityResolved -> PidFileOpened ->
//! CredsDropped -> Detached -> ExecReady`
//!
//! Each step consumes the prior state and returns exactly one next state on
//! success. Only `Transition<ExecReady>` exposes [`Transition::exec`].
//!
//! Exec before the PID file is written does not compile:
//!
//! ```compile_fail
//! use daemonize::exec::transition::Transition;
//! use daemonize::kernel::identity::SystemIdentityDatabase;
//! use daemonize::kernel::process::SystemProcess;
//! use daemonize::TransitionRequest;
//!
//! let request = TransitionRequest::default();
//! let chain = Transition::new(&request, &SystemProcess, &SystemIdentityDatabase);
//! let _ = chain.exec("/bin/true".as_ref(), &[]);
//! ```
//!
//! Neither does dropping privileges before the PID file is open:
//!
//! ```compile_fail
//! use daemonize::exec::transition::Transition;
//! use daemonize::kernel::identity::SystemIdentityDatabase;
//! use daemonize::kernel::process::SystemProcess;
//! use daemonize::TransitionRequest;
//!
//! let request = TransitionRequest::default();
//! let chain = Transition::new(&request, &SystemProcess, &SystemIdentityDatabase)
//!     .change_directory()
//!     .unwrap()
//!     .resolve_identity()
//!     .unwrap();
//! let _ = chain.drop_privileges();
//! ```
//!
//! Or reusing a consumed state:
//!
//! ```compile_fail
//! use daemonize::exec::transition::Transition;
//! use daemonize::kernel::identity::SystemIdentityDatabase;
//! use daemonize::kernel::process::SystemProcess;
//! use daemonize::TransitionRequest;
//!
//! let request = TransitionRequest::default();
//! let chain = Transition::new(&request, &SystemProcess, &SystemIdentityDatabase);
//! let _next = chain.change_directory();
//! let _again = chain.change_directory();
//! ```

use crate::config::types::{DaemonizeError, Result, TransitionRequest};
use crate::exec::image::{minimal_environment, ProcessImageSpec};
use crate::exec::pidfile::PidFile;
use crate::kernel::credentials::apply_identity;
use crate::kernel::identity::{resolve_identity, IdentityDatabase, ResolvedIdentity};
use crate::kernel::process::ProcessControl;
use std::convert::Infallible;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::Path;

/// Type-state marker: nothing has happened yet
pub struct Fresh;

/// Type-state marker: working directory is in place
pub struct DirectoryReady;

/// Type-state marker: names resolved to ids
pub struct IdentityResolved;

/// Type-state marker: PID file created with the original privileges
pub struct PidFileOpened;

/// Type-state marker: groups and ids applied
pub struct CredsDropped;

/// Type-state marker: detached (or deliberately kept in the foreground)
pub struct Detached;

/// Type-state marker: PID recorded, only exec remains
pub struct ExecReady;

pub struct Transition<'a, S> {
    request: &'a TransitionRequest,
    sys: &'a dyn ProcessControl,
    db: &'a dyn IdentityDatabase,
    identity: ResolvedIdentity,
    pid_file: Option<PidFile>,
    _state: PhantomData<S>,
}

impl<'a, S> Transition<'a, S> {
    fn advance<T>(self) -> Transition<'a, T> {
        Transition {
            request: self.request,
            sys: self.sys,
            db: self.db,
            identity: self.identity,
            pid_file: self.pid_file,
            _state: PhantomData,
        }
    }

    pub fn identity(&self) -> &ResolvedIdentity {
        &self.identity
    }
}

impl<'a> Transition<'a, Fresh> {
    pub fn new(
        request: &'a TransitionRequest,
        sys: &'a dyn ProcessControl,
        db: &'a dyn IdentityDatabase,
    ) -> Self {
        Self {
            request,
            sys,
            db,
            identity: ResolvedIdentity::default(),
            pid_file: None,
            _state: PhantomData,
        }
    }

    pub fn change_directory(self) -> Result<Transition<'a, DirectoryReady>> {
        if let Some(dir) = &self.request.working_directory {
            self.sys
                .change_directory(dir)
                .map_err(|source| DaemonizeError::Directory {
                    path: dir.clone(),
                    source,
                })?;
            log::info!("Changed directory to {}", dir.display());
        }
        Ok(self.advance())
    }
}

impl<'a> Transition<'a, DirectoryReady> {
    pub fn resolve_identity(mut self) -> Result<Transition<'a, IdentityResolved>> {
        let real_uid = self.sys.credentials().uid;
        self.identity = resolve_identity(self.request, self.db, real_uid)?;
        Ok(self.advance())
    }
}

impl<'a> Transition<'a, IdentityResolved> {
    /// Must run before any id changes: the target user may not be allowed
    /// to create the file.
    pub fn open_pid_file(mut self) -> Result<Transition<'a, PidFileOpened>> {
        if let Some(path) = &self.request.pidfile {
            let file = self
                .sys
                .create_pid_file(path)
                .map_err(|source| DaemonizeError::PidFile {
                    path: path.clone(),
                    source,
                })?;
            log::debug!("Opened PID file {}", path.display());
            self.pid_file = Some(PidFile::new(path.clone(), file));
        }
        Ok(self.advance())
    }
}

impl<'a> Transition<'a, PidFileOpened> {
    pub fn drop_privileges(self) -> Result<Transition<'a, CredsDropped>> {
        apply_identity(&self.identity, self.sys, self.request.strict)?;
        Ok(self.advance())
    }
}

impl<'a> Transition<'a, CredsDropped> {
    /// A failed detach is fatal; the PID file is closed unwritten on the way out.
    pub fn detach(self) -> Result<Transition<'a, Detached>> {
        if self.request.daemonize {
            let keep_directory = self.request.working_directory.is_some();
            if let Err(e) = self.sys.daemonize(keep_directory) {
                if let Some(pid_file) = &self.pid_file {
                    log::debug!("Closing {} unwritten", pid_file.path().display());
                }
                return Err(DaemonizeError::Detach(e));
            }
            log::debug!("Detached from controlling terminal");
        } else {
            log::debug!("Foreground mode; not detaching");
        }
        Ok(self.advance())
    }
}

impl<'a> Transition<'a, Detached> {
    pub fn record_pid(mut self) -> Transition<'a, ExecReady> {
        if let Some(pid_file) = self.pid_file.take() {
            pid_file.write_pid(self.sys.pid());
        }
        self.advance()
    }
}

impl<'a> Transition<'a, ExecReady> {
    /// This is the ONLY legal way to exec the target. Returns only on failure.
    pub fn exec(self, program: &Path, args: &[OsString]) -> Result<Infallible> {
        let env = if self.request.scrub_environment {
            Some(minimal_environment(self.identity.home_directory.as_deref()))
        } else {
            None
        };
        let image = ProcessImageSpec::new(program.to_path_buf(), args, env).into_native()?;

        log::info!("Executing {:?}", image.spec().argv);
        let source = match self.sys.exec(&image) {
            Ok(never) => match never {},
            Err(e) => e,
        };
        Err(DaemonizeError::Exec {
            program: program.to_path_buf(),
            source,
        })
    }
}
