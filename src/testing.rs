//! Test doubles for the terminal widget and the launcher

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use regex::Regex;

use crate::core::{
    Border, MatchTag, MouseCursor, TerminalError, TerminalFactory, TerminalOptions, TerminalSignal,
    TerminalWidget,
};
use crate::launch::Launcher;

/// Scripted terminal widget
#[derive(Default)]
pub struct FakeTerminal {
    pub pid: Option<u32>,
    pub fail_spawn: bool,
    pub char_size: (u32, u32),
    pub border: Border,
    /// Visible text, one string per row
    pub rows: Vec<String>,
    pub title: Option<String>,
    pub spawned: Vec<(Vec<String>, Option<PathBuf>)>,
    pub options: Option<TerminalOptions>,
    pub matches: Vec<(Regex, MouseCursor)>,
    pub copies: usize,
    pub pastes: usize,
    pub size: Option<(u16, u16)>,
    pub pending: Vec<TerminalSignal>,
}

impl TerminalWidget for FakeTerminal {
    fn spawn(&mut self, argv: &[String], cwd: Option<&Path>) -> Result<Option<u32>, TerminalError> {
        self.spawned.push((argv.to_vec(), cwd.map(Path::to_path_buf)));
        if self.fail_spawn {
            return Err(TerminalError::EmptyCommand);
        }
        Ok(self.pid)
    }

    fn configure(&mut self, options: &TerminalOptions) {
        self.options = Some(options.clone());
    }

    fn match_add(&mut self, pattern: Regex) -> MatchTag {
        self.matches.push((pattern, MouseCursor::Text));
        self.matches.len() - 1
    }

    fn match_set_cursor(&mut self, tag: MatchTag, cursor: MouseCursor) {
        self.matches[tag].1 = cursor;
    }

    fn match_check(&self, column: i64, row: i64) -> Option<String> {
        let text = self.rows.get(usize::try_from(row).ok()?)?;
        let column = usize::try_from(column).ok()?;
        self.matches.iter().find_map(|(regex, _)| {
            regex
                .find_iter(text)
                .find(|m| m.start() < m.end() && m.start() <= column && column < m.end())
                .map(|m| m.as_str().to_string())
        })
    }

    fn window_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn char_size(&self) -> (u32, u32) {
        self.char_size
    }

    fn inner_border(&self) -> Border {
        self.border
    }

    fn copy_clipboard(&mut self) {
        self.copies += 1;
    }

    fn paste_clipboard(&mut self) {
        self.pastes += 1;
    }

    fn resize(&mut self, columns: u16, rows: u16) {
        self.size = Some((columns, rows));
    }

    fn poll(&mut self) -> Vec<TerminalSignal> {
        std::mem::take(&mut self.pending)
    }
}

/// Hands out [`FakeTerminal`]s
pub struct FakeFactory {
    pub pid: Option<u32>,
    pub char_size: (u32, u32),
    pub border: Border,
    /// Fail the next spawn only
    pub fail_next_spawn: bool,
    pub rows: Vec<String>,
}

impl Default for FakeFactory {
    fn default() -> Self {
        Self {
            pid: None,
            char_size: (8, 16),
            border: Border::default(),
            fail_next_spawn: false,
            rows: Vec::new(),
        }
    }
}

impl TerminalFactory for FakeFactory {
    type Terminal = FakeTerminal;

    fn create(&mut self) -> FakeTerminal {
        FakeTerminal {
            pid: self.pid,
            fail_spawn: std::mem::take(&mut self.fail_next_spawn),
            char_size: self.char_size,
            border: self.border,
            rows: self.rows.clone(),
            ..FakeTerminal::default()
        }
    }
}

/// Records launched commands
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    pub launched: Rc<RefCell<Vec<Vec<String>>>>,
}

impl Launcher for RecordingLauncher {
    fn launch(&mut self, argv: &[String]) {
        self.launched.borrow_mut().push(argv.to_vec());
    }
}
