//! Terminal widget layer.
//!
//! The window manager only talks to terminals through [`TerminalWidget`];
//! everything below that trait is delegated to external crates:
//!
//! - **session**: PTY allocation and shell process (`portable-pty`)
//! - **vt**: VT100/xterm interpretation, scrollback, match regions (`vt100`)
//! - **procfs**: working directory lookup for a child process
//!
//! # Architecture
//!
//! ```text
//! VtTerminal (TerminalWidget)
//! ├── Session (PTY I/O with shell process)
//! └── vt100::Parser
//!     ├── Screen (cell grid + scrollback)
//!     └── title / bell / modes
//! ```

pub mod procfs;
pub mod session;
pub mod vt;

use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::config::{Color, Settings, DEFAULT_PALETTE_SIZE};

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to open pty: {0:#}")]
    OpenPty(anyhow::Error),

    #[error("failed to spawn {program}: {reason:#}")]
    Spawn {
        program: String,
        reason: anyhow::Error,
    },

    #[error("failed to set up pty I/O: {0:#}")]
    Io(anyhow::Error),
}

/// Notifications a terminal raises while being polled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalSignal {
    ChildExited,
    TitleChanged,
}

/// Padding between the widget edge and the character grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Border {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

/// Pointer shape shown over a match region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseCursor {
    Hand,
    Text,
}

/// Handle returned by [`TerminalWidget::match_add`]
pub type MatchTag = usize;

/// Display-affecting settings handed to every new terminal
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalOptions {
    pub allow_bold: bool,
    pub audible_bell: bool,
    pub visible_bell: bool,
    pub bg_transparent: bool,
    pub bg_saturation: f64,
    pub bg_image: Option<PathBuf>,
    pub font: String,
    pub autohide_mouse: bool,
    pub scroll_on_keystroke: bool,
    pub scroll_on_output: bool,
    pub scrollback_lines: usize,
    pub word_chars: String,
    pub foreground: Color,
    pub background: Color,
    pub palette: [Color; DEFAULT_PALETTE_SIZE],
    pub cursor: Option<Color>,
}

impl From<&Settings> for TerminalOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            allow_bold: settings.allow_bold,
            audible_bell: settings.audible_bell,
            visible_bell: settings.visible_bell,
            bg_transparent: settings.bg_transparent,
            bg_saturation: settings.bg_saturation,
            bg_image: settings.bg_image.clone(),
            font: settings.font.clone(),
            autohide_mouse: settings.autohide_mouse,
            scroll_on_keystroke: settings.scroll_on_keystroke,
            scroll_on_output: settings.scroll_on_output,
            scrollback_lines: settings.num_scrollback_lines,
            word_chars: settings.word_chars.clone(),
            foreground: settings.foreground,
            background: settings.background,
            palette: settings.palette,
            cursor: settings.cursor,
        }
    }
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// The terminal widget surface the window manager relies on
pub trait TerminalWidget {
    /// Start `argv` in the terminal, optionally in `cwd`; returns the child pid
    fn spawn(&mut self, argv: &[String], cwd: Option<&Path>) -> Result<Option<u32>, TerminalError>;

    fn configure(&mut self, options: &TerminalOptions);

    /// Register a match pattern; empty matches are never reported
    fn match_add(&mut self, pattern: Regex) -> MatchTag;

    fn match_set_cursor(&mut self, tag: MatchTag, cursor: MouseCursor);

    /// Text of the match region covering a cell, if any
    fn match_check(&self, column: i64, row: i64) -> Option<String>;

    fn window_title(&self) -> Option<&str>;

    /// Character cell size in toolkit units
    fn char_size(&self) -> (u32, u32);

    fn inner_border(&self) -> Border;

    fn copy_clipboard(&mut self);

    fn paste_clipboard(&mut self);

    /// Resize the character grid
    fn resize(&mut self, columns: u16, rows: u16);

    /// Process pending child output
    fn poll(&mut self) -> Vec<TerminalSignal>;
}

/// Creates terminal widgets for new tabs
pub trait TerminalFactory {
    type Terminal: TerminalWidget;

    fn create(&mut self) -> Self::Terminal;
}
