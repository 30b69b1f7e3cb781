//! Console renderer for the front window.
//!
//! Draws the tab bar (when shown) and the current tab's terminal grid, and
//! maps window state onto the hosting console: title, size, fullscreen,
//! cursor colour and bells.
//!
//! # Rendering Architecture
//!
//! ```text
//! begin_frame()  → Hide cursor, disable autowrap, start sync
//!     ↓
//! render content → Tab bar, terminal grid
//!     ↓
//! end_frame()    → Place cursor, enable autowrap, end sync, flush
//! ```

use std::collections::HashSet;
use std::io::{self, Write};
use std::ops::Range;
use std::time::{Duration, Instant};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{
        DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute, queue,
    style::{
        Attribute, Color as CtColor, ResetColor, SetAttribute, SetBackgroundColor,
        SetForegroundColor,
    },
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetSize, SetTitle},
};
use tracing::{debug, info};
use unicode_width::UnicodeWidthStr;

use crate::config::{Color, PROGRAM_NAME};
use crate::core::vt::{Bell, VtFactory, VtTerminal};
use crate::core::TerminalOptions;
use crate::wm::{Window, WindowId, WindowManager};

/// Widest label shown in the tab bar
const MAX_LABEL_WIDTH: usize = 24;
const TAB_SEPARATOR: &str = "│";
/// How long a visible bell keeps the screen reversed
const FLASH_DURATION: Duration = Duration::from_millis(100);

fn begin_frame<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "\x1b[?2026h")?; // Begin synchronized update
    write!(out, "\x1b[?7l")?; // Disable autowrap
    queue!(out, Hide)?;
    Ok(())
}

fn end_frame<W: Write>(out: &mut W, cursor: Option<(u16, u16)>) -> io::Result<()> {
    if let Some((col, row)) = cursor {
        queue!(out, MoveTo(col, row), Show)?;
    }
    write!(out, "\x1b[?7h")?; // Enable autowrap
    write!(out, "\x1b[?2026l")?; // End synchronized update
    out.flush()
}

/// Tab label as displayed
pub fn tab_label(label: &str) -> String {
    let label = if label.is_empty() { PROGRAM_NAME } else { label };
    if label.width() <= MAX_LABEL_WIDTH {
        return label.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in label.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w + 1 > MAX_LABEL_WIDTH {
            break;
        }
        out.push(ch);
        width += w;
    }
    out.push('…');
    out
}

/// Column span each tab occupies in the tab bar
pub fn tab_spans<S: AsRef<str>>(labels: &[S]) -> Vec<Range<u16>> {
    let mut spans = Vec::with_capacity(labels.len());
    let mut col: u16 = 0;
    for label in labels {
        let width = tab_label(label.as_ref()).width() as u16 + 2;
        spans.push(col..col.saturating_add(width));
        col = col.saturating_add(width + TAB_SEPARATOR.width() as u16);
    }
    spans
}

/// Page index under a tab bar column
pub fn tab_at(spans: &[Range<u16>], col: u16) -> Option<usize> {
    spans.iter().position(|span| span.contains(&col))
}

/// Labels of a window's pages in order
pub fn window_labels(wm: &WindowManager<VtFactory>, window: &Window) -> Vec<String> {
    window
        .pages()
        .iter()
        .map(|&id| wm.tab(id).map(|t| t.label.clone()).unwrap_or_default())
        .collect()
}

fn palette_color(options: &TerminalOptions, color: vt100::Color, default: Color) -> CtColor {
    match color {
        vt100::Color::Default => default.to_crossterm(),
        vt100::Color::Idx(i) if (i as usize) < options.palette.len() => {
            options.palette[i as usize].to_crossterm()
        }
        vt100::Color::Idx(i) => CtColor::AnsiValue(i),
        vt100::Color::Rgb(r, g, b) => CtColor::Rgb { r, g, b },
    }
}

/// Resolved style of one cell
#[derive(Clone, Copy, PartialEq)]
struct CellStyle {
    fg: CtColor,
    bg: CtColor,
    bold: bool,
    italic: bool,
    underline: bool,
}

impl CellStyle {
    fn blank(options: &TerminalOptions) -> Self {
        Self {
            fg: options.foreground.to_crossterm(),
            bg: options.background.to_crossterm(),
            bold: false,
            italic: false,
            underline: false,
        }
    }

    fn of(cell: &vt100::Cell, options: &TerminalOptions, selected: bool, hovered: bool) -> Self {
        let mut fg = palette_color(options, cell.fgcolor(), options.foreground);
        let mut bg = palette_color(options, cell.bgcolor(), options.background);
        if cell.inverse() != selected {
            std::mem::swap(&mut fg, &mut bg);
        }
        Self {
            fg,
            bg,
            bold: cell.bold() && options.allow_bold,
            italic: cell.italic(),
            underline: cell.underline() || hovered,
        }
    }

    fn apply<W: Write>(&self, out: &mut W) -> io::Result<()> {
        queue!(
            out,
            SetAttribute(Attribute::Reset),
            SetForegroundColor(self.fg),
            SetBackgroundColor(self.bg)
        )?;
        if self.bold {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if self.italic {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if self.underline {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        Ok(())
    }
}

/// Console renderer
pub struct Renderer {
    initialized: bool,
    keyboard_enhanced: bool,
    /// Console state last written, to avoid repeating it every frame
    title: Option<String>,
    cursor_color: Option<Color>,
    fullscreen: bool,
    sized: HashSet<WindowId>,
    flash_until: Option<Instant>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            initialized: false,
            keyboard_enhanced: false,
            title: None,
            cursor_color: None,
            fullscreen: false,
            sized: HashSet::new(),
            flash_until: None,
        }
    }

    /// Take over the console
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableBracketedPaste,
            Clear(ClearType::All)
        )?;

        // Needed to tell control+shift letters apart from control letters
        if terminal::supports_keyboard_enhancement().unwrap_or(false) {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
            )?;
            self.keyboard_enhanced = true;
        } else {
            info!("Keyboard enhancement unsupported; control+shift shortcuts may not be distinguishable");
        }
        stdout.flush()?;

        self.initialized = true;
        Ok(())
    }

    /// Restore the console
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }

        let mut stdout = io::stdout();

        // Restore terminal state (in case of abnormal exit)
        write!(stdout, "\x1b[?7h")?;
        write!(stdout, "\x1b[?2026l")?;
        write!(stdout, "\x1b[?5l")?;
        if self.cursor_color.is_some() {
            write!(stdout, "\x1b]112\x07")?; // Reset cursor colour
        }
        if self.fullscreen {
            write!(stdout, "\x1b[10;0t")?;
        }
        if self.keyboard_enhanced {
            execute!(stdout, PopKeyboardEnhancementFlags)?;
        }
        execute!(
            stdout,
            Show,
            DisableBracketedPaste,
            DisableMouseCapture,
            LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()?;
        self.initialized = false;
        Ok(())
    }

    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Present a terminal bell
    pub fn bell(&mut self, bell: Bell) -> io::Result<()> {
        let mut stdout = io::stdout();
        if bell.audible {
            write!(stdout, "\x07")?;
        }
        if bell.visible {
            write!(stdout, "\x1b[?5h")?;
            self.flash_until = Some(Instant::now() + FLASH_DURATION);
        }
        stdout.flush()
    }

    /// Apply window-level state to the console
    fn sync_window<W: Write>(&mut self, out: &mut W, window: &Window, options: &TerminalOptions) -> io::Result<()> {
        if self.title.as_deref() != Some(window.title.as_str()) {
            queue!(out, SetTitle(&window.title))?;
            self.title = Some(window.title.clone());
        }

        if options.cursor != self.cursor_color {
            match options.cursor {
                Some(color) => write!(out, "\x1b]12;{}\x07", color.to_hex())?,
                None => write!(out, "\x1b]112\x07")?,
            }
            self.cursor_color = options.cursor;
        }

        if window.fullscreen != self.fullscreen {
            // xterm window operation: 10;1 enters fullscreen, 10;0 leaves it
            write!(out, "\x1b[10;{}t", u8::from(window.fullscreen))?;
            self.fullscreen = window.fullscreen;
        }

        // Ask for the configured size once per window
        if !window.fullscreen && !self.sized.contains(&window.id) {
            if let Some(hints) = window.geometry {
                let (width, height) = hints.size_for(window.default_size.0, window.default_size.1);
                let rows = height + i32::from(window.show_tabs);
                debug!("Requesting {}x{} for window {}", width, rows, window.id);
                queue!(out, SetSize(width.clamp(1, u16::MAX as i32) as u16, rows.clamp(1, u16::MAX as i32) as u16))?;
                self.sized.insert(window.id);
            }
        }

        if let Some(until) = self.flash_until {
            if Instant::now() >= until {
                write!(out, "\x1b[?5l")?;
                self.flash_until = None;
            }
        }
        Ok(())
    }

    /// Render the front window; `hover` is the pointer cell in the content area
    pub fn render(&mut self, wm: &WindowManager<VtFactory>, hover: Option<(u16, u16)>) -> io::Result<()> {
        let Some(window) = wm.active_window().and_then(|id| wm.window(id)) else {
            return Ok(());
        };
        let Some(tab) = window.current_tab().and_then(|id| wm.tab(id)) else {
            return Ok(());
        };
        let (width, height) = Self::size()?;

        let mut stdout = io::stdout();
        self.sync_window(&mut stdout, window, tab.terminal.options())?;

        begin_frame(&mut stdout)?;
        let result = self.render_window(&mut stdout, wm, window, &tab.terminal, (width, height), hover);
        let cursor = result.as_ref().ok().copied().flatten();
        end_frame(&mut stdout, cursor)?;
        result.map(|_| ())
    }

    fn render_window<W: Write>(
        &self,
        out: &mut W,
        wm: &WindowManager<VtFactory>,
        window: &Window,
        terminal: &VtTerminal,
        (width, height): (u16, u16),
        hover: Option<(u16, u16)>,
    ) -> io::Result<Option<(u16, u16)>> {
        let y_offset = if window.show_tabs {
            self.render_tab_bar(out, wm, window, width, terminal.options())?;
            1
        } else {
            0
        };
        let cursor = self.render_terminal(out, terminal, y_offset, width, height, hover)?;
        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(cursor)
    }

    fn render_tab_bar<W: Write>(
        &self,
        out: &mut W,
        wm: &WindowManager<VtFactory>,
        window: &Window,
        width: u16,
        options: &TerminalOptions,
    ) -> io::Result<()> {
        let fg = options.foreground.to_crossterm();
        let bg = options.background.to_crossterm();

        queue!(out, MoveTo(0, 0), SetAttribute(Attribute::Reset))?;
        queue!(out, SetBackgroundColor(bg), SetForegroundColor(fg))?;
        write!(out, "{:width$}", "", width = width as usize)?;
        queue!(out, MoveTo(0, 0))?;

        let labels = window_labels(wm, window);
        let current = window.current_index();
        for (i, label) in labels.iter().enumerate() {
            if Some(i) == current {
                queue!(out, SetBackgroundColor(fg), SetForegroundColor(bg), SetAttribute(Attribute::Bold))?;
            } else {
                queue!(out, SetAttribute(Attribute::Reset), SetBackgroundColor(bg), SetForegroundColor(fg))?;
            }
            write!(out, " {} ", tab_label(label))?;

            if i + 1 < labels.len() {
                queue!(out, SetAttribute(Attribute::Reset), SetBackgroundColor(bg), SetForegroundColor(fg))?;
                write!(out, "{}", TAB_SEPARATOR)?;
            }
        }
        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(())
    }

    /// Draw the grid; returns where the cursor should be shown
    fn render_terminal<W: Write>(
        &self,
        out: &mut W,
        terminal: &VtTerminal,
        y_offset: u16,
        width: u16,
        height: u16,
        hover: Option<(u16, u16)>,
    ) -> io::Result<Option<(u16, u16)>> {
        let screen = terminal.screen();
        let options = terminal.options();
        let (cols, rows) = terminal.size();
        let blank = CellStyle::blank(options);

        // Underline the match under the pointer when it shows a hand
        let hovered = hover
            .and_then(|(col, row)| terminal.match_at(col, row))
            .filter(|hit| hit.cursor == crate::core::MouseCursor::Hand);

        let mut line = String::with_capacity(256);
        for row in 0..height.saturating_sub(y_offset) {
            queue!(out, MoveTo(0, row + y_offset))?;
            let mut rendered = 0usize;
            let mut style: Option<CellStyle> = None;
            line.clear();

            if row < rows {
                for col in 0..cols.min(width) {
                    let Some(cell) = screen.cell(row, col) else {
                        break;
                    };
                    if cell.is_wide_continuation() {
                        continue;
                    }
                    let hover_cell = hovered
                        .as_ref()
                        .map(|hit| hit.row == row && hit.columns.contains(&col))
                        .unwrap_or(false);
                    let cell_style = CellStyle::of(cell, options, terminal.is_selected(col, row), hover_cell);

                    if style != Some(cell_style) {
                        if let Some(previous) = style {
                            previous.apply(out)?;
                            write!(out, "{}", line)?;
                            line.clear();
                        }
                        style = Some(cell_style);
                    }

                    let contents = cell.contents();
                    let text = if contents.is_empty() { " " } else { contents.as_str() };
                    rendered += text.width().max(1);
                    line.push_str(text);
                }
            }

            if let Some(previous) = style {
                previous.apply(out)?;
                write!(out, "{}", line)?;
            }
            if rendered < width as usize {
                blank.apply(out)?;
                write!(out, "{:pad$}", "", pad = width as usize - rendered)?;
            }
        }

        // Hidden while looking at history
        if screen.hide_cursor() || screen.scrollback() > 0 {
            return Ok(None);
        }
        let (cursor_row, cursor_col) = screen.cursor_position();
        if cursor_col >= width || cursor_row + y_offset >= height {
            return Ok(None);
        }
        Ok(Some((cursor_col, cursor_row + y_offset)))
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
