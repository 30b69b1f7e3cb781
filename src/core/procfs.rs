//! Working directory lookup through the process-information filesystem

use std::fs;
use std::path::{Path, PathBuf};

const PROC_ROOT: &str = "/proc";

/// Current working directory of a process, if it can be resolved
pub fn process_cwd(pid: u32) -> Option<PathBuf> {
    process_cwd_in(Path::new(PROC_ROOT), pid)
}

/// Like [`process_cwd`] against an arbitrary proc root.
///
/// Only absolute link targets are accepted.
pub fn process_cwd_in(root: &Path, pid: u32) -> Option<PathBuf> {
    let target = fs::read_link(root.join(pid.to_string()).join("cwd")).ok()?;
    target.is_absolute().then_some(target)
}
