//! Tab - a terminal widget and the shell running in it

use std::path::PathBuf;

use super::window::WindowId;
use crate::core::procfs;

/// Key of a tab in the manager's arena
pub type TabId = u64;

/// A notebook page
pub struct Tab<T> {
    /// Owning window (lookup only)
    pub window: WindowId,
    pub terminal: T,
    /// Tab bar label text
    pub label: String,
    /// Shell process id
    pub pid: Option<u32>,
}

impl<T> Tab<T> {
    pub fn new(window: WindowId, terminal: T) -> Self {
        Self {
            window,
            terminal,
            label: String::new(),
            pid: None,
        }
    }

    /// Working directory of the shell, if it can be resolved
    pub fn cwd(&self) -> Option<PathBuf> {
        self.pid.and_then(procfs::process_cwd)
    }
}
