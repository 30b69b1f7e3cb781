//! Console terminal widget backed by `vt100` and a PTY session.

use std::ops::Range;
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use super::session::Session;
use super::{
    Border, MatchTag, MouseCursor, TerminalError, TerminalFactory, TerminalOptions, TerminalSignal,
    TerminalWidget,
};

/// A registered match pattern
struct MatchPattern {
    regex: Regex,
    cursor: MouseCursor,
}

/// A match found on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchHit {
    pub row: u16,
    pub columns: Range<u16>,
    pub text: String,
    pub cursor: MouseCursor,
}

/// Pending bell to present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bell {
    pub audible: bool,
    pub visible: bool,
}

/// Selection in visible-screen coordinates (row, column), inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selection {
    anchor: (u16, u16),
    head: (u16, u16),
    /// A bare click selects nothing until dragged
    active: bool,
}

impl Selection {
    fn ordered(&self) -> ((u16, u16), (u16, u16)) {
        if self.anchor <= self.head {
            (self.anchor, self.head)
        } else {
            (self.head, self.anchor)
        }
    }

    fn contains(&self, row: u16, col: u16) -> bool {
        let (start, end) = self.ordered();
        (row, col) >= start && (row, col) <= end
    }
}

/// Word characters in `a-z` range notation; a leading `-` is literal
#[derive(Debug)]
struct WordChars {
    ranges: Vec<(char, char)>,
}

impl WordChars {
    fn parse(spec: &str) -> Self {
        let chars: Vec<char> = spec.chars().collect();
        let mut ranges = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if i + 2 < chars.len() && chars[i + 1] == '-' {
                ranges.push((chars[i], chars[i + 2]));
                i += 3;
            } else {
                ranges.push((chars[i], chars[i]));
                i += 1;
            }
        }
        Self { ranges }
    }

    fn contains(&self, c: char) -> bool {
        if self.ranges.is_empty() {
            return c.is_alphanumeric();
        }
        self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi)
    }
}

/// Terminal widget for the console host
pub struct VtTerminal {
    parser: vt100::Parser,
    session: Option<Session>,
    cols: u16,
    rows: u16,
    options: TerminalOptions,
    matches: Vec<MatchPattern>,
    title: Option<String>,
    bell_counts: (usize, usize),
    pending_bell: Option<Bell>,
    selection: Option<Selection>,
    clipboard: Option<arboard::Clipboard>,
    exited: bool,
}

impl VtTerminal {
    pub fn new(cols: u16, rows: u16) -> Self {
        let options = TerminalOptions::default();
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            parser: vt100::Parser::new(rows, cols, options.scrollback_lines),
            session: None,
            cols,
            rows,
            options,
            matches: Vec::new(),
            title: None,
            bell_counts: (0, 0),
            pending_bell: None,
            selection: None,
            clipboard: None,
            exited: false,
        }
    }

    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    pub fn options(&self) -> &TerminalOptions {
        &self.options
    }

    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    pub fn application_cursor(&self) -> bool {
        self.screen().application_cursor()
    }

    /// Send keyboard input to the child
    pub fn write_input(&mut self, data: &[u8]) {
        if self.options.scroll_on_keystroke {
            self.parser.set_scrollback(0);
        }
        self.selection = None;
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.write(data) {
                debug!("PTY write failed: {}", e);
            }
        }
    }

    /// Send pasted text, bracketed when the child asked for it
    pub fn paste_text(&mut self, text: &str) {
        let mut data = Vec::with_capacity(text.len() + 12);
        if self.screen().bracketed_paste() {
            data.extend_from_slice(b"\x1b[200~");
            data.extend_from_slice(text.as_bytes());
            data.extend_from_slice(b"\x1b[201~");
        } else {
            data.extend_from_slice(text.as_bytes());
        }
        self.write_input(&data);
    }

    /// Scroll the view into history (positive) or back toward live output
    pub fn scroll_view(&mut self, delta: isize) {
        let current = self.screen().scrollback();
        let target = current.saturating_add_signed(delta);
        self.parser.set_scrollback(target);
    }

    pub fn take_bell(&mut self) -> Option<Bell> {
        self.pending_bell.take()
    }

    pub fn start_selection(&mut self, col: u16, row: u16) {
        self.selection = Some(Selection {
            anchor: (row, col),
            head: (row, col),
            active: false,
        });
    }

    pub fn extend_selection(&mut self, col: u16, row: u16) {
        if let Some(selection) = self.selection.as_mut() {
            selection.head = (row.min(self.rows - 1), col.min(self.cols - 1));
            selection.active |= selection.head != selection.anchor;
        }
    }

    /// Select the run of word characters under a cell
    pub fn select_word(&mut self, col: u16, row: u16) {
        let word_chars = WordChars::parse(&self.options.word_chars);
        let bounds = {
            let screen = self.parser.screen();
            let is_word = |c: u16| {
                screen
                    .cell(row, c)
                    .map(|cell| {
                        let contents = cell.contents();
                        !contents.is_empty() && contents.chars().all(|ch| word_chars.contains(ch))
                    })
                    .unwrap_or(false)
            };
            if is_word(col) {
                let mut start = col;
                while start > 0 && is_word(start - 1) {
                    start -= 1;
                }
                let mut end = col;
                while end + 1 < self.cols && is_word(end + 1) {
                    end += 1;
                }
                Some((start, end))
            } else {
                None
            }
        };

        match bounds {
            Some((start, end)) => {
                self.selection = Some(Selection {
                    anchor: (row, start),
                    head: (row, end),
                    active: true,
                });
            }
            None => self.start_selection(col, row),
        }
    }

    pub fn is_selected(&self, col: u16, row: u16) -> bool {
        self.selection
            .map(|s| s.active && s.contains(row, col))
            .unwrap_or(false)
    }

    pub fn selected_text(&self) -> Option<String> {
        let selection = self.selection.filter(|s| s.active)?;
        let ((start_row, start_col), (end_row, end_col)) = selection.ordered();
        let text = self
            .screen()
            .contents_between(start_row, start_col, end_row, end_col.saturating_add(1));
        (!text.is_empty()).then_some(text)
    }

    /// Visible text of a row plus the byte offset each column starts at
    fn row_text(&self, row: u16) -> (String, Vec<usize>) {
        let screen = self.screen();
        let mut text = String::new();
        let mut offsets = Vec::with_capacity(self.cols as usize);
        for col in 0..self.cols {
            offsets.push(text.len());
            match screen.cell(row, col) {
                Some(cell) if cell.is_wide_continuation() => {}
                Some(cell) => {
                    let contents = cell.contents();
                    if contents.is_empty() {
                        text.push(' ');
                    } else {
                        text.push_str(&contents);
                    }
                }
                None => text.push(' '),
            }
        }
        (text, offsets)
    }

    /// Match region covering a cell
    pub fn match_at(&self, col: u16, row: u16) -> Option<MatchHit> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let (text, offsets) = self.row_text(row);
        let offset = offsets[col as usize];

        for pattern in &self.matches {
            for m in pattern.regex.find_iter(&text) {
                if m.start() == m.end() {
                    continue;
                }
                if m.start() <= offset && offset < m.end() {
                    let first = offsets.iter().position(|&o| o >= m.start()).unwrap_or(0);
                    let last = offsets.iter().rposition(|&o| o < m.end()).unwrap_or(first);
                    return Some(MatchHit {
                        row,
                        columns: first as u16..last as u16 + 1,
                        text: m.as_str().to_string(),
                        cursor: pattern.cursor,
                    });
                }
            }
        }
        None
    }

    fn clipboard(&mut self) -> Option<&mut arboard::Clipboard> {
        if self.clipboard.is_none() {
            match arboard::Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    warn!("Clipboard unavailable: {}", e);
                    return None;
                }
            }
        }
        self.clipboard.as_mut()
    }

    fn rebuild_parser(&mut self) {
        self.parser = vt100::Parser::new(self.rows, self.cols, self.options.scrollback_lines);
        self.title = None;
        self.bell_counts = (0, 0);
    }
}

impl TerminalWidget for VtTerminal {
    fn spawn(&mut self, argv: &[String], cwd: Option<&Path>) -> Result<Option<u32>, TerminalError> {
        let session = Session::spawn(argv, cwd, self.cols, self.rows)?;
        let pid = session.process_id();
        self.session = Some(session);
        self.exited = false;
        Ok(pid)
    }

    fn configure(&mut self, options: &TerminalOptions) {
        let scrollback_changed = options.scrollback_lines != self.options.scrollback_lines;
        self.options = options.clone();
        if scrollback_changed {
            // Called before any output is parsed
            self.rebuild_parser();
        }
        debug!(
            "Console terminal ignores font {:?}, background image {:?}, saturation {}, transparency {}, mouse autohide {}",
            options.font,
            options.bg_image,
            options.bg_saturation,
            options.bg_transparent,
            options.autohide_mouse
        );
    }

    fn match_add(&mut self, pattern: Regex) -> MatchTag {
        self.matches.push(MatchPattern {
            regex: pattern,
            cursor: MouseCursor::Text,
        });
        self.matches.len() - 1
    }

    fn match_set_cursor(&mut self, tag: MatchTag, cursor: MouseCursor) {
        if let Some(pattern) = self.matches.get_mut(tag) {
            pattern.cursor = cursor;
        }
    }

    fn match_check(&self, column: i64, row: i64) -> Option<String> {
        let col = u16::try_from(column).ok()?;
        let row = u16::try_from(row).ok()?;
        self.match_at(col, row).map(|hit| hit.text)
    }

    fn window_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn char_size(&self) -> (u32, u32) {
        (1, 1)
    }

    fn inner_border(&self) -> Border {
        Border::default()
    }

    fn copy_clipboard(&mut self) {
        let Some(text) = self.selected_text() else {
            return;
        };
        if let Some(clipboard) = self.clipboard() {
            if let Err(e) = clipboard.set_text(text) {
                warn!("Copy to clipboard failed: {}", e);
            }
        }
    }

    fn paste_clipboard(&mut self) {
        let text = match self.clipboard().map(|c| c.get_text()) {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!("Paste from clipboard failed: {}", e);
                return;
            }
            None => return,
        };
        self.paste_text(&text);
    }

    fn resize(&mut self, columns: u16, rows: u16) {
        let columns = columns.max(1);
        let rows = rows.max(1);
        if (columns, rows) == (self.cols, self.rows) {
            return;
        }
        self.cols = columns;
        self.rows = rows;
        self.selection = None;
        self.parser.set_size(rows, columns);
        if let Some(session) = self.session.as_mut() {
            session.resize(columns, rows);
        }
    }

    fn poll(&mut self) -> Vec<TerminalSignal> {
        let mut signals = Vec::new();
        let (chunks, running) = match self.session.as_mut() {
            Some(session) => {
                let chunks = session.read_output();
                (chunks, session.is_running())
            }
            None => (Vec::new(), true),
        };

        if !chunks.is_empty() {
            for chunk in &chunks {
                self.parser.process(chunk);
            }
            if self.options.scroll_on_output {
                self.parser.set_scrollback(0);
            }
        }

        let screen = self.parser.screen();
        let title = Some(screen.title()).filter(|t| !t.is_empty());
        if title != self.title.as_deref() {
            self.title = title.map(str::to_string);
            signals.push(TerminalSignal::TitleChanged);
        }

        let counts = (screen.audible_bell_count(), screen.visual_bell_count());
        if counts != self.bell_counts {
            let bell = Bell {
                audible: self.options.audible_bell,
                visible: self.options.visible_bell,
            };
            self.bell_counts = counts;
            if bell.audible || bell.visible {
                self.pending_bell = Some(bell);
            }
        }

        if !running && !self.exited {
            self.exited = true;
            signals.push(TerminalSignal::ChildExited);
        }
        signals
    }
}

/// Builds console terminals sized to the host's content area
pub struct VtFactory {
    cols: u16,
    rows: u16,
}

impl VtFactory {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    pub fn set_size(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
    }
}

impl TerminalFactory for VtFactory {
    type Terminal = VtTerminal;

    fn create(&mut self) -> VtTerminal {
        VtTerminal::new(self.cols, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    fn url_regex() -> Regex {
        RegexBuilder::new(crate::config::DEFAULT_URL_REGEX)
            .case_insensitive(true)
            .build()
            .unwrap()
    }

    fn terminal_with(text: &str) -> VtTerminal {
        let mut term = VtTerminal::new(40, 4);
        term.parser.process(text.as_bytes());
        term
    }

    #[test]
    fn match_check_finds_url_under_cell() {
        let mut term = terminal_with("see HTTP://example.com/a now");
        let tag = term.match_add(url_regex());
        term.match_set_cursor(tag, MouseCursor::Hand);

        assert_eq!(term.match_check(4, 0).as_deref(), Some("HTTP://example.com/a"));
        assert_eq!(term.match_check(23, 0).as_deref(), Some("HTTP://example.com/a"));
        assert_eq!(term.match_check(24, 0), None);
        assert_eq!(term.match_check(0, 0), None);
        assert_eq!(term.match_check(4, 1), None);
        assert_eq!(term.match_check(-1, 0), None);

        let hit = term.match_at(10, 0).unwrap();
        assert_eq!(hit.columns, 4..24);
        assert_eq!(hit.cursor, MouseCursor::Hand);
    }

    #[test]
    fn empty_matches_are_skipped() {
        let mut term = terminal_with("abc");
        term.match_add(Regex::new("x*").unwrap());
        assert_eq!(term.match_check(1, 0), None);
    }

    #[test]
    fn selection_text() {
        let mut term = terminal_with("hello world");
        term.start_selection(6, 0);
        assert_eq!(term.selected_text(), None);
        term.extend_selection(10, 0);
        assert_eq!(term.selected_text().as_deref(), Some("world"));
        assert!(term.is_selected(8, 0));
        assert!(!term.is_selected(2, 0));
    }

    #[test]
    fn word_chars_ranges() {
        let chars = WordChars::parse(crate::config::DEFAULT_WORD_CHARS);
        for c in ['-', 'a', 'Z', '5', '/', ':', '~', '@'] {
            assert!(chars.contains(c), "{:?}", c);
        }
        for c in [' ', '"', '(', '|'] {
            assert!(!chars.contains(c), "{:?}", c);
        }
        assert!(WordChars::parse("").contains('x'));
    }

    #[test]
    fn double_click_selects_word() {
        let mut term = terminal_with("see http://example.com/a now");
        term.select_word(10, 0);
        assert_eq!(term.selected_text().as_deref(), Some("http://example.com/a"));

        term.select_word(0, 0);
        assert_eq!(term.selected_text().as_deref(), Some("see"));

        // On a blank there is nothing to select
        term.select_word(3, 0);
        assert_eq!(term.selected_text(), None);
    }

    #[test]
    fn title_change_is_signalled_once() {
        let mut term = VtTerminal::new(20, 2);
        assert!(term.poll().is_empty());
        term.parser.process(b"\x1b]0;build\x07");
        assert_eq!(term.poll(), vec![TerminalSignal::TitleChanged]);
        assert_eq!(term.window_title(), Some("build"));
        assert!(term.poll().is_empty());
    }

    #[test]
    fn configure_rebuilds_scrollback() {
        let mut term = VtTerminal::new(20, 2);
        let options = TerminalOptions {
            scrollback_lines: 5,
            ..TerminalOptions::default()
        };
        term.configure(&options);
        for i in 0..20 {
            term.parser.process(format!("line{}\r\n", i).as_bytes());
        }
        term.scroll_view(100);
        assert_eq!(term.screen().scrollback(), 5);
        term.write_input(b"");
        assert_eq!(term.screen().scrollback(), 0);
    }

    #[test]
    fn resize_updates_grid() {
        let mut term = VtTerminal::new(20, 2);
        term.resize(30, 5);
        assert_eq!(term.size(), (30, 5));
        assert_eq!(term.screen().size(), (5, 30));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_failure_is_reported() {
        let mut term = VtTerminal::new(20, 2);
        let argv = vec!["/nonexistent/tabterm-shell".to_string()];
        assert!(term.spawn(&argv, None).is_err());
        assert!(term.spawn(&[], None).is_err());
    }
}
