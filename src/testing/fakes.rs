//! Recording fakes for [`ProcessControl`] and [`IdentityDatabase`].
//!
//! They let the transition chain run without root: every mutating call is
//! appended to an in-memory log instead of touching the process, and any
//! step can be made to fail.

use crate::config::types::{DaemonizeError, Result};
use crate::exec::image::{NativeImage, ProcessImageSpec};
use crate::kernel::identity::{GroupEntry, IdentityDatabase, UserEntry};
use crate::kernel::process::{Credentials, ProcessControl};
use nix::errno::Errno;
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// One recorded mutation, in the order it was requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SysCall {
    ChangeDirectory(PathBuf),
    CreatePidFile(PathBuf),
    SetGroups(Vec<u32>),
    SetGid(u32),
    SetUid(u32),
    Daemonize { keep_directory: bool },
    Exec(ProcessImageSpec),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeFailure {
    ChangeDirectory,
    CreatePidFile,
    /// The PID file opens, but as a read-only handle, so the later write fails.
    WritePid,
    SetGroups,
    SetGid,
    SetUid,
    Daemonize,
}

/// Stand-in for the running process.
///
/// `pid()` reports `pid_before` until `daemonize` succeeds and `pid_after`
/// afterwards, mimicking the fork inside daemon(3). `exec` cannot replace
/// anything: it records the image and reports `ENOEXEC`.
#[derive(Debug)]
pub struct FakeProcess {
    calls: RefCell<Vec<SysCall>>,
    failures: Vec<FakeFailure>,
    credentials: Cell<Credentials>,
    detached: Cell<bool>,
    pid_before: u32,
    pid_after: u32,
    ignore_set_uid: bool,
}

impl Default for FakeProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProcess {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            failures: Vec::new(),
            credentials: Cell::new(Credentials {
                uid: 0,
                euid: 0,
                gid: 0,
                egid: 0,
            }),
            detached: Cell::new(false),
            pid_before: 4000,
            pid_after: 4001,
            ignore_set_uid: false,
        }
    }

    pub fn failing(mut self, failure: FakeFailure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn with_pids(mut self, before: u32, after: u32) -> Self {
        self.pid_before = before;
        self.pid_after = after;
        self
    }

    /// Start as the given (non-root) invoker.
    pub fn with_invoker(self, uid: u32, gid: u32) -> Self {
        self.credentials.set(Credentials {
            uid,
            euid: uid,
            gid,
            egid: gid,
        });
        self
    }

    /// Make setuid report success without changing anything.
    pub fn ignoring_set_uid(mut self) -> Self {
        self.ignore_set_uid = true;
        self
    }

    pub fn calls(&self) -> Vec<SysCall> {
        self.calls.borrow().clone()
    }

    /// Position of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&SysCall) -> bool) -> Option<usize> {
        self.calls.borrow().iter().position(pred)
    }

    pub fn exec_image(&self) -> Option<ProcessImageSpec> {
        self.calls.borrow().iter().find_map(|call| match call {
            SysCall::Exec(image) => Some(image.clone()),
            _ => None,
        })
    }

    fn record(&self, call: SysCall) {
        self.calls.borrow_mut().push(call);
    }

    fn fails(&self, failure: FakeFailure) -> bool {
        self.failures.contains(&failure)
    }
}

impl ProcessControl for FakeProcess {
    fn change_directory(&self, path: &Path) -> io::Result<()> {
        self.record(SysCall::ChangeDirectory(path.to_path_buf()));
        if self.fails(FakeFailure::ChangeDirectory) {
            return Err(io::Error::from(Errno::ENOENT));
        }
        Ok(())
    }

    fn create_pid_file(&self, path: &Path) -> io::Result<File> {
        self.record(SysCall::CreatePidFile(path.to_path_buf()));
        if self.fails(FakeFailure::CreatePidFile) {
            return Err(io::Error::from(Errno::EACCES));
        }
        let file = File::create(path)?;
        if self.fails(FakeFailure::WritePid) {
            drop(file);
            return File::open(path);
        }
        Ok(file)
    }

    fn set_groups(&self, gids: &[u32]) -> std::result::Result<(), Errno> {
        self.record(SysCall::SetGroups(gids.to_vec()));
        if self.fails(FakeFailure::SetGroups) {
            return Err(Errno::EPERM);
        }
        Ok(())
    }

    fn set_gid(&self, gid: u32) -> std::result::Result<(), Errno> {
        self.record(SysCall::SetGid(gid));
        if self.fails(FakeFailure::SetGid) {
            return Err(Errno::EPERM);
        }
        let mut creds = self.credentials.get();
        creds.gid = gid;
        creds.egid = gid;
        self.credentials.set(creds);
        Ok(())
    }

    fn set_uid(&self, uid: u32) -> std::result::Result<(), Errno> {
        self.record(SysCall::SetUid(uid));
        if self.fails(FakeFailure::SetUid) {
            return Err(Errno::EPERM);
        }
        if !self.ignore_set_uid {
            let mut creds = self.credentials.get();
            creds.uid = uid;
            creds.euid = uid;
            self.credentials.set(creds);
        }
        Ok(())
    }

    fn credentials(&self) -> Credentials {
        self.credentials.get()
    }

    fn daemonize(&self, keep_directory: bool) -> std::result::Result<(), Errno> {
        self.record(SysCall::Daemonize { keep_directory });
        if self.fails(FakeFailure::Daemonize) {
            return Err(Errno::EAGAIN);
        }
        self.detached.set(true);
        Ok(())
    }

    fn pid(&self) -> u32 {
        if self.detached.get() {
            self.pid_after
        } else {
            self.pid_before
        }
    }

    fn exec(&self, image: &NativeImage) -> std::result::Result<Infallible, Errno> {
        self.record(SysCall::Exec(image.spec().clone()));
        Err(Errno::ENOEXEC)
    }
}

/// One recorded database query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    UserByName(String),
    UserByUid(u32),
    GroupByName(String),
    GroupByGid(u32),
    AllGroups,
}

/// Fixed passwd/group snapshot.
#[derive(Debug, Default)]
pub struct FakeIdentityDatabase {
    users: Vec<UserEntry>,
    groups: Vec<GroupEntry>,
    lookups: RefCell<Vec<Lookup>>,
    fail_scan: bool,
}

impl FakeIdentityDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, name: &str, uid: u32, gid: u32, home: &str) -> Self {
        self.users.push(UserEntry {
            name: name.to_string(),
            uid,
            gid,
            home: PathBuf::from(home),
        });
        self
    }

    pub fn with_group(mut self, name: &str, gid: u32, members: &[&str]) -> Self {
        self.groups.push(GroupEntry {
            name: name.to_string(),
            gid,
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    /// Make `all_groups` fail with EIO.
    pub fn failing_group_scan(mut self) -> Self {
        self.fail_scan = true;
        self
    }

    pub fn lookups(&self) -> Vec<Lookup> {
        self.lookups.borrow().clone()
    }

    fn record(&self, lookup: Lookup) {
        self.lookups.borrow_mut().push(lookup);
    }
}

impl IdentityDatabase for FakeIdentityDatabase {
    fn user_by_name(&self, name: &str) -> Result<Option<UserEntry>> {
        self.record(Lookup::UserByName(name.to_string()));
        Ok(self.users.iter().find(|u| u.name == name).cloned())
    }

    fn user_by_uid(&self, uid: u32) -> Result<Option<UserEntry>> {
        self.record(Lookup::UserByUid(uid));
        Ok(self.users.iter().find(|u| u.uid == uid).cloned())
    }

    fn group_by_name(&self, name: &str) -> Result<Option<GroupEntry>> {
        self.record(Lookup::GroupByName(name.to_string()));
        Ok(self.groups.iter().find(|g| g.name == name).cloned())
    }

    fn group_by_gid(&self, gid: u32) -> Result<Option<GroupEntry>> {
        self.record(Lookup::GroupByGid(gid));
        Ok(self.groups.iter().find(|g| g.gid == gid).cloned())
    }

    fn all_groups(&self) -> Result<Vec<GroupEntry>> {
        self.record(Lookup::AllGroups);
        if self.fail_scan {
            return Err(DaemonizeError::Lookup {
                context: "getgrent".to_string(),
                source: Errno::EIO,
            });
        }
        Ok(self.groups.clone())
    }
}
