//! User/group resolution and effective-uid/gid dropping.
//!
//! Grounded on `original_source/src/acl-helper.c`. Group is dropped before
//! user (a `setuid` after dropping group privileges would otherwise be
//! unable to change the group), matching the exit-code-4-on-user-failure-
//! after-group-success ordering in the external interface (spec.md §6).

use std::ffi::CString;

pub fn resolve_group_gid(name: &str) -> Option<libc::gid_t> {
    let c_name = CString::new(name).ok()?;
    let entry = unsafe { libc::getgrnam(c_name.as_ptr()) };
    if entry.is_null() {
        None
    } else {
        Some(unsafe { (*entry).gr_gid })
    }
}

pub fn resolve_user_uid(name: &str) -> Option<libc::uid_t> {
    let c_name = CString::new(name).ok()?;
    let entry = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if entry.is_null() {
        None
    } else {
        Some(unsafe { (*entry).pw_uid })
    }
}

/// Drop privileges to the configured user/group, group first. Returns an
/// error describing which half failed so `main` can map it to the right
/// exit code (3 for resolution failure, 4 for the split group/user case).
pub fn drop_privileges(user: Option<&str>, group: Option<&str>) -> Result<(), PrivilegeError> {
    if let Some(group) = group {
        let gid = resolve_group_gid(group).ok_or(PrivilegeError::UnknownGroup)?;
        if unsafe { libc::setegid(gid) } != 0 {
            return Err(PrivilegeError::SetGid);
        }
    }

    if let Some(user) = user {
        let uid = resolve_user_uid(user).ok_or(PrivilegeError::UnknownUser)?;
        if unsafe { libc::seteuid(uid) } != 0 {
            return Err(PrivilegeError::SetUid);
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PrivilegeError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("setegid failed")]
    SetGid,
    #[error("unknown user")]
    UnknownUser,
    #[error("seteuid failed")]
    SetUid,
}
