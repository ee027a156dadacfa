//! User and group resolution against the passwd/group databases.
//!
//! Lookups go through [`IdentityDatabase`] so the resolver can run against a
//! fixed snapshot in tests. [`SystemIdentityDatabase`] is the libc-backed one.

mod resolve;
mod system;

pub use resolve::{resolve_identity, supplementary_groups, ResolvedIdentity};
pub use system::SystemIdentityDatabase;

use crate::config::types::Result;
use std::path::PathBuf;

/// One passwd entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// One group entry with its explicit member list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

impl GroupEntry {
    /// Exact, case-sensitive membership test.
    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m == username)
    }
}

/// Read-only view of the identity databases.
///
/// `Ok(None)` means the entry does not exist; `Err` is reserved for failures
/// of the lookup itself.
pub trait IdentityDatabase {
    fn user_by_name(&self, name: &str) -> Result<Option<UserEntry>>;
    fn user_by_uid(&self, uid: u32) -> Result<Option<UserEntry>>;
    fn group_by_name(&self, name: &str) -> Result<Option<GroupEntry>>;
    fn group_by_gid(&self, gid: u32) -> Result<Option<GroupEntry>>;
    /// Every group in database order.
    fn all_groups(&self) -> Result<Vec<GroupEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_exact_and_case_sensitive() {
        let group = GroupEntry {
            name: "wheel".into(),
            gid: 10,
            members: vec!["alice".into(), "bob".into()],
        };
        assert!(group.has_member("alice"));
        assert!(!group.has_member("Alice"));
        assert!(!group.has_member("ali"));
        assert!(!group.has_member("alice "));
    }
}
