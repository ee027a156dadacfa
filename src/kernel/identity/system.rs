//! libc-backed passwd/group lookups.

use super::{GroupEntry, IdentityDatabase, UserEntry};
use crate::config::types::{DaemonizeError, Result};
use nix::errno::Errno;
use nix::unistd::{Gid, Group, Uid, User};
use std::ffi::CStr;

/// Reads the databases configured through nsswitch on this host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentityDatabase;

fn lookup_error(context: String, source: Errno) -> DaemonizeError {
    DaemonizeError::Lookup { context, source }
}

impl From<User> for UserEntry {
    fn from(user: User) -> Self {
        UserEntry {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        }
    }
}

impl From<Group> for GroupEntry {
    fn from(group: Group) -> Self {
        GroupEntry {
            name: group.name,
            gid: group.gid.as_raw(),
            members: group.mem,
        }
    }
}

impl IdentityDatabase for SystemIdentityDatabase {
    fn user_by_name(&self, name: &str) -> Result<Option<UserEntry>> {
        User::from_name(name)
            .map(|u| u.map(UserEntry::from))
            .map_err(|e| lookup_error(name.to_string(), e))
    }

    fn user_by_uid(&self, uid: u32) -> Result<Option<UserEntry>> {
        User::from_uid(Uid::from_raw(uid))
            .map(|u| u.map(UserEntry::from))
            .map_err(|e| lookup_error(format!("getpwuid({})", uid), e))
    }

    fn group_by_name(&self, name: &str) -> Result<Option<GroupEntry>> {
        Group::from_name(name)
            .map(|g| g.map(GroupEntry::from))
            .map_err(|e| lookup_error(name.to_string(), e))
    }

    fn group_by_gid(&self, gid: u32) -> Result<Option<GroupEntry>> {
        Group::from_gid(Gid::from_raw(gid))
            .map(|g| g.map(GroupEntry::from))
            .map_err(|e| lookup_error(format!("getgrgid({})", gid), e))
    }

    fn all_groups(&self) -> Result<Vec<GroupEntry>> {
        let mut groups = Vec::new();

        // SAFETY: setgrent/getgrent/endgrent share libc-static iteration state.
        // The transition runs single-threaded and every entry is copied out
        // before the next getgrent call invalidates it.
        unsafe { libc::setgrent() };
        loop {
            Errno::clear();
            let raw = unsafe { libc::getgrent() };
            if raw.is_null() {
                let errno = Errno::last();
                unsafe { libc::endgrent() };
                return match errno {
                    Errno::EIO | Errno::EMFILE | Errno::ENFILE | Errno::ENOMEM | Errno::ERANGE => {
                        Err(lookup_error("getgrent".to_string(), errno))
                    }
                    _ => Ok(groups),
                };
            }
            // SAFETY: non-null pointer returned by getgrent, valid until the next call.
            if let Some(entry) = unsafe { group_from_raw(&*raw) } {
                groups.push(entry);
            }
        }
    }
}

/// Copy a `struct group` into an owned entry. Entries without a name are skipped.
///
/// # Safety
/// `raw` must come from getgrent/getgrnam and still be valid.
unsafe fn group_from_raw(raw: &libc::group) -> Option<GroupEntry> {
    if raw.gr_name.is_null() {
        return None;
    }
    let name = CStr::from_ptr(raw.gr_name).to_string_lossy().into_owned();

    let mut members = Vec::new();
    let mut cursor = raw.gr_mem;
    if !cursor.is_null() {
        while !(*cursor).is_null() {
            members.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
            cursor = cursor.add(1);
        }
    }

    Some(GroupEntry {
        name,
        gid: raw.gr_gid,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_user_resolves_by_uid() {
        let db = SystemIdentityDatabase;
        let root = db.user_by_uid(0).expect("lookup failed");
        if let Some(root) = root {
            assert_eq!(root.uid, 0);
        }
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        let db = SystemIdentityDatabase;
        let user = db
            .user_by_name("daemonize-no-such-user-4f1c")
            .expect("lookup failed");
        assert!(user.is_none());
        let group = db
            .group_by_name("daemonize-no-such-group-4f1c")
            .expect("lookup failed");
        assert!(group.is_none());
    }

    #[test]
    fn group_scan_agrees_with_gid_lookup() {
        let db = SystemIdentityDatabase;
        let groups = db.all_groups().expect("group scan failed");
        for group in groups.iter().take(5) {
            let by_gid = db.group_by_gid(group.gid).expect("lookup failed");
            assert!(by_gid.is_some(), "gid {} vanished", group.gid);
        }
    }
}
