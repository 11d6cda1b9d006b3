/// Permission checks for `/dev/input` and the sysfs control nodes the
/// tklock policy writes to.
///
/// The daemon normally runs with the privileges of a system user that is
/// already a member of the relevant groups; this module exists so startup
/// fails with an actionable message instead of a silent `EACCES` on the
/// first `open()`.
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum PermissionStatus {
    Granted,
    Denied { missing: Vec<String> },
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    pub fn missing(&self) -> &[String] {
        match self {
            PermissionStatus::Denied { missing } => missing,
            PermissionStatus::Granted => &[],
        }
    }
}

/// Check that `/dev/input` is readable and that at least one `event*`
/// node is accessible. Does not require write access — the daemon only
/// ever reads device nodes and issues ioctls on them.
pub fn check_input_permissions(input_dir: impl AsRef<Path>) -> Result<PermissionStatus> {
    let input_dir = input_dir.as_ref();
    let mut missing = Vec::new();

    let entries = match fs::read_dir(input_dir) {
        Ok(entries) => entries,
        Err(_) => {
            missing.push(format!("{} is not readable", input_dir.display()));
            return Ok(PermissionStatus::Denied { missing });
        }
    };

    let mut any_event_node = false;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("event") {
            continue;
        }
        any_event_node = true;
        if fs::File::open(entry.path()).is_err() {
            missing.push(format!("cannot open {}", entry.path().display()));
        }
    }

    if !any_event_node {
        missing.push(format!("no event* nodes under {}", input_dir.display()));
    }

    if missing.is_empty() {
        Ok(PermissionStatus::Granted)
    } else {
        Ok(PermissionStatus::Denied { missing })
    }
}

/// Check that a sysfs control node exists and is writable by us. Used
/// before wiring up doubletap wake / hardware interrupt gating; per §7,
/// a failing write degrades those features to no-ops rather than failing
/// the daemon, so this is advisory logging, not a hard gate.
pub fn check_sysfs_writable(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    match fs::metadata(path) {
        Ok(meta) => meta.permissions().mode() & 0o200 != 0,
        Err(_) => false,
    }
}

pub fn get_permission_help(input_dir: impl AsRef<Path>) -> String {
    format!(
        "mce-inputd needs read access to {dir} and its event* nodes.\n\
         \n\
         How to grant access:\n\
         1. Add the daemon's user to the 'input' group:\n\
            sudo usermod -a -G input <user>\n\
         2. Ensure udev rules grant group 'input' read access to\n\
            /dev/input/event* (most distributions do this by default).\n\
         3. Log out and back in for group membership to take effect.",
        dir = input_dir.as_ref().display()
    )
}
