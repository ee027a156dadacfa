//! Turn a [`TransitionRequest`] into numeric ids, a supplementary group set
//! and a home directory.
//!
//! Resolution order: user by name -> group by name (or the user's primary
//! group by gid) -> passwd entry for `HOME` -> supplementary membership scan.

use super::{GroupEntry, IdentityDatabase, UserEntry};
use crate::config::types::{DaemonizeError, Result, TransitionRequest};
use std::path::PathBuf;

/// Identity derived from the databases; never filled from user input directly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// `None` leaves the current supplementary list untouched.
    pub supplementary_gids: Option<Vec<u32>>,
    pub home_directory: Option<PathBuf>,
}

impl ResolvedIdentity {
    /// True when applying this identity performs no credential change at all.
    pub fn is_unchanged(&self) -> bool {
        self.uid.is_none() && self.gid.is_none() && self.supplementary_gids.is_none()
    }
}

/// Resolve every name in `request`. `real_uid` is the invoking user's uid,
/// used for `HOME` when no target user is given.
pub fn resolve_identity(
    request: &TransitionRequest,
    db: &dyn IdentityDatabase,
    real_uid: u32,
) -> Result<ResolvedIdentity> {
    let mut identity = ResolvedIdentity::default();

    let user = match request.username.as_deref() {
        Some(name) => {
            let user = db
                .user_by_name(name)?
                .ok_or_else(|| DaemonizeError::UnknownUser {
                    name: name.to_string(),
                })?;
            log::debug!("Resolved user {} to uid={} gid={}", name, user.uid, user.gid);
            identity.uid = Some(user.uid);
            Some(user)
        }
        None => None,
    };

    let group = resolve_group(request, db, user.as_ref())?;
    identity.gid = group.as_ref().map(|g| g.gid);

    if request.scrub_environment {
        identity.home_directory = resolve_home(db, user.as_ref(), real_uid)?;
    }

    if let Some(user) = &user {
        identity.supplementary_gids = match supplementary_groups(db, &user.name) {
            Ok(gids) => Some(gids),
            Err(e) if request.strict => return Err(e),
            Err(e) => {
                log::warn!(
                    "Failed to enumerate groups of {} (permissive mode): {}",
                    user.name,
                    e
                );
                None
            }
        };
    }

    Ok(identity)
}

fn resolve_group(
    request: &TransitionRequest,
    db: &dyn IdentityDatabase,
    user: Option<&UserEntry>,
) -> Result<Option<GroupEntry>> {
    if let Some(name) = request.groupname.as_deref() {
        let group = db
            .group_by_name(name)?
            .ok_or_else(|| DaemonizeError::UnknownGroup {
                name: name.to_string(),
            })?;
        log::debug!("Resolved group {} to gid={}", name, group.gid);
        return Ok(Some(group));
    }

    match user {
        Some(user) => {
            let group = db
                .group_by_gid(user.gid)?
                .ok_or(DaemonizeError::UnknownGroupId { gid: user.gid })?;
            Ok(Some(group))
        }
        None => Ok(None),
    }
}

fn resolve_home(
    db: &dyn IdentityDatabase,
    user: Option<&UserEntry>,
    real_uid: u32,
) -> Result<Option<PathBuf>> {
    let entry = match user {
        Some(user) => user.clone(),
        None => db
            .user_by_uid(real_uid)?
            .ok_or(DaemonizeError::UnknownUserId { uid: real_uid })?,
    };

    if entry.home.as_os_str().is_empty() {
        log::debug!("User {} has no home directory; HOME stays unset", entry.name);
        Ok(None)
    } else {
        Ok(Some(entry.home))
    }
}

/// Gids of every group listing `username` as a member, in database order
/// without duplicates. The primary group is only included when the database
/// lists the user as an explicit member of it.
pub fn supplementary_groups(db: &dyn IdentityDatabase, username: &str) -> Result<Vec<u32>> {
    let mut gids: Vec<u32> = Vec::new();
    for group in db.all_groups()? {
        if group.has_member(username) && !gids.contains(&group.gid) {
            gids.push(group.gid);
        }
    }
    Ok(gids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fakes::{FakeIdentityDatabase, Lookup};

    fn database() -> FakeIdentityDatabase {
        FakeIdentityDatabase::new()
            .with_user("nobody", 65534, 65534, "/nonexistent")
            .with_user("alice", 1000, 1000, "/home/alice")
            .with_user("homeless", 1001, 1000, "")
            .with_group("nogroup", 65534, &[])
            .with_group("alice", 1000, &[])
            .with_group("audio", 29, &["alice", "bob"])
            .with_group("video", 44, &["Alice"])
            .with_group("wheel", 10, &["bob", "alice"])
            .with_group("audio-dup", 29, &["alice"])
    }

    fn request_for(user: Option<&str>, group: Option<&str>) -> TransitionRequest {
        TransitionRequest {
            username: user.map(str::to_string),
            groupname: group.map(str::to_string),
            ..TransitionRequest::default()
        }
    }

    #[test]
    fn user_resolves_uid_primary_gid_and_home() {
        let db = database();
        let identity = resolve_identity(&request_for(Some("alice"), None), &db, 0).unwrap();
        assert_eq!(identity.uid, Some(1000));
        assert_eq!(identity.gid, Some(1000));
        assert_eq!(identity.home_directory, Some(PathBuf::from("/home/alice")));
        assert_eq!(identity.supplementary_gids, Some(vec![29, 10]));
    }

    #[test]
    fn explicit_group_overrides_primary_group() {
        let db = database();
        let identity =
            resolve_identity(&request_for(Some("alice"), Some("wheel")), &db, 0).unwrap();
        assert_eq!(identity.uid, Some(1000));
        assert_eq!(identity.gid, Some(10));
    }

    #[test]
    fn unknown_user_is_a_resolution_error() {
        let db = database();
        let err = resolve_identity(&request_for(Some("doesnotexist"), None), &db, 0).unwrap_err();
        assert!(matches!(err, DaemonizeError::UnknownUser { ref name } if name == "doesnotexist"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unknown_group_is_a_resolution_error() {
        let db = database();
        let err = resolve_identity(&request_for(None, Some("nosuchgroup")), &db, 0).unwrap_err();
        assert!(matches!(err, DaemonizeError::UnknownGroup { .. }));
    }

    #[test]
    fn missing_primary_group_is_fatal() {
        let db = FakeIdentityDatabase::new().with_user("orphan", 2000, 4242, "/home/orphan");
        let err = resolve_identity(&request_for(Some("orphan"), None), &db, 0).unwrap_err();
        assert!(matches!(err, DaemonizeError::UnknownGroupId { gid: 4242 }));
    }

    #[test]
    fn no_names_means_no_credential_change() {
        let db = database();
        let identity = resolve_identity(&request_for(None, None), &db, 1000).unwrap();
        assert!(identity.is_unchanged());
        // HOME comes from the invoking user
        assert_eq!(identity.home_directory, Some(PathBuf::from("/home/alice")));
    }

    #[test]
    fn unknown_invoking_user_is_fatal_when_scrubbing() {
        let db = database();
        let err = resolve_identity(&request_for(None, None), &db, 31337).unwrap_err();
        assert!(matches!(err, DaemonizeError::UnknownUserId { uid: 31337 }));
    }

    #[test]
    fn inherited_environment_skips_home_lookup() {
        let db = database();
        let request = TransitionRequest {
            scrub_environment: false,
            ..TransitionRequest::default()
        };
        let identity = resolve_identity(&request, &db, 31337).unwrap();
        assert_eq!(identity.home_directory, None);
        assert!(db.lookups().is_empty());
    }

    #[test]
    fn empty_home_yields_no_home() {
        let db = database();
        let identity = resolve_identity(&request_for(Some("homeless"), None), &db, 0).unwrap();
        assert_eq!(identity.home_directory, None);
    }

    #[test]
    fn group_only_request_does_not_touch_supplementary_groups() {
        let db = database();
        let identity = resolve_identity(&request_for(None, Some("audio")), &db, 1000).unwrap();
        assert_eq!(identity.gid, Some(29));
        assert_eq!(identity.uid, None);
        assert_eq!(identity.supplementary_gids, None);
        assert_eq!(
            db.lookups(),
            vec![Lookup::GroupByName("audio".into()), Lookup::UserByUid(1000)]
        );
    }

    #[test]
    fn supplementary_scan_is_exact_ordered_and_deduplicated() {
        let db = database();
        assert_eq!(supplementary_groups(&db, "alice").unwrap(), vec![29, 10]);
        assert_eq!(supplementary_groups(&db, "Alice").unwrap(), vec![44]);
        assert_eq!(supplementary_groups(&db, "nobody").unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn resolution_is_deterministic() {
        let db = database();
        let request = request_for(Some("alice"), None);
        let first = resolve_identity(&request, &db, 0).unwrap();
        let second = resolve_identity(&request, &db, 0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn group_scan_failure_is_tolerated_unless_strict() {
        let db = database().failing_group_scan();
        let identity = resolve_identity(&request_for(Some("alice"), None), &db, 0).unwrap();
        assert_eq!(identity.supplementary_gids, None);
        assert_eq!(identity.uid, Some(1000));

        let strict = TransitionRequest {
            strict: true,
            ..request_for(Some("alice"), None)
        };
        assert!(resolve_identity(&strict, &db, 0).is_err());
    }
}
