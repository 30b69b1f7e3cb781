//! Window Manager - window and tab lifecycle

use std::collections::HashMap;
use std::env;

use regex::{Regex, RegexBuilder};
use tracing::{debug, error, info, warn};

use super::geometry::GeometryHints;
use super::tab::{Tab, TabId};
use super::window::{Window, WindowId};
use crate::config::{Settings, DEFAULT_URL_REGEX, PROGRAM_NAME};
use crate::core::{MouseCursor, TerminalFactory, TerminalOptions, TerminalSignal, TerminalWidget};
use crate::event::Event;
use crate::launch::{browser_argv, Launcher};

/// Shell used when `$SHELL` is unset or empty
pub const FALLBACK_SHELL: &str = "sh";

/// Command line for a new tab's shell, parsed with shell quoting
pub fn shell_argv(shell: Option<&str>) -> Vec<String> {
    let argv = match shell_words::split(shell.unwrap_or_default()) {
        Ok(argv) => argv,
        Err(e) => {
            warn!("Cannot parse $SHELL {:?}: {}; using {}", shell, e, FALLBACK_SHELL);
            Vec::new()
        }
    };
    if argv.is_empty() {
        vec![FALLBACK_SHELL.to_string()]
    } else {
        argv
    }
}

fn compile_url_pattern(pattern: &str) -> Option<Regex> {
    let build = |p: &str| RegexBuilder::new(p).case_insensitive(true).build();
    match build(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Invalid url_regex {:?}: {}; using the default", pattern, e);
            build(DEFAULT_URL_REGEX).ok()
        }
    }
}

/// Owns every window and tab along with the settings they are built from
pub struct WindowManager<F: TerminalFactory> {
    settings: Settings,
    factory: F,
    launcher: Box<dyn Launcher>,
    windows: HashMap<WindowId, Window>,
    /// Creation order; the last entry is the front window
    window_order: Vec<WindowId>,
    tabs: HashMap<TabId, Tab<F::Terminal>>,
    next_window_id: WindowId,
    next_tab_id: TabId,
    url_pattern: Option<Regex>,
    running: bool,
}

impl<F: TerminalFactory> WindowManager<F> {
    pub fn new(settings: Settings, factory: F, launcher: Box<dyn Launcher>) -> Self {
        let url_pattern = compile_url_pattern(&settings.url_regex);
        Self {
            settings,
            factory,
            launcher,
            windows: HashMap::new(),
            window_order: Vec::new(),
            tabs: HashMap::new(),
            next_window_id: 1,
            next_tab_id: 1,
            url_pattern,
            running: true,
        }
    }

    #[cfg(test)]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// False once the last window has closed
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    #[cfg(test)]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// The window shown in front
    pub fn active_window(&self) -> Option<WindowId> {
        self.window_order.last().copied()
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab<F::Terminal>> {
        self.tabs.get(&id)
    }

    pub fn tab_mut(&mut self, id: TabId) -> Option<&mut Tab<F::Terminal>> {
        self.tabs.get_mut(&id)
    }

    pub fn current_tab(&self, window: WindowId) -> Option<TabId> {
        self.windows.get(&window)?.current_tab()
    }

    pub fn current_terminal_mut(&mut self, window: WindowId) -> Option<&mut F::Terminal> {
        let tab = self.current_tab(window)?;
        self.tabs.get_mut(&tab).map(|t| &mut t.terminal)
    }

    /// Create a window with one tab and bring it to the front
    pub fn new_window(&mut self) -> Option<WindowId> {
        let id = self.next_window_id;
        self.next_window_id += 1;

        let default_size = (self.settings.window_width, self.settings.window_height);
        self.windows
            .insert(id, Window::new(id, default_size, self.settings.fullscreen));
        self.window_order.push(id);
        info!("Window {} created ({}x{} cells)", id, default_size.0, default_size.1);

        match self.tab_new(id) {
            Some(tab) => {
                self.set_window_title(tab);
                Some(id)
            }
            None => {
                error!("Window {} has no shell, closing it", id);
                self.window_close(id);
                None
            }
        }
    }

    /// Open a new tab running the user's shell
    pub fn tab_new(&mut self, window_id: WindowId) -> Option<TabId> {
        let argv = shell_argv(env::var("SHELL").ok().as_deref());

        let window = self.windows.get(&window_id)?;
        // New tabs start where the current one is
        let cwd = if window.is_empty() {
            None
        } else {
            window
                .current_tab()
                .and_then(|id| self.tabs.get(&id))
                .and_then(Tab::cwd)
        };

        let mut terminal = self.factory.create();
        terminal.configure(&TerminalOptions::from(&self.settings));
        if let Some(pattern) = self.url_pattern.clone() {
            let tag = terminal.match_add(pattern);
            terminal.match_set_cursor(tag, MouseCursor::Hand);
        }

        let pid = match terminal.spawn(&argv, cwd.as_deref()) {
            Ok(pid) => pid,
            Err(e) => {
                error!("Failed to start shell {:?}: {}", argv, e);
                self.update_tab_bar(window_id);
                return None;
            }
        };

        let tab_id = self.next_tab_id;
        self.next_tab_id += 1;

        let hints = GeometryHints::for_cell(terminal.char_size(), terminal.inner_border());
        let mut tab = Tab::new(window_id, terminal);
        tab.pid = pid;
        self.tabs.insert(tab_id, tab);

        let window = self.windows.get_mut(&window_id)?;
        let index = window.append_page(tab_id);
        if index == 0 {
            window.show_tabs = false;
            window.geometry = Some(hints);
        } else {
            window.show_tabs = true;
        }
        info!(
            "Tab {} opened in window {} at index {} (pid {:?}, cwd {:?})",
            tab_id, window_id, index, pid, cwd
        );

        self.set_current_page(window_id, index);
        Some(tab_id)
    }

    /// Close the current tab of a window
    pub fn tab_close(&mut self, window: WindowId) {
        if let Some(tab) = self.current_tab(window) {
            self.close_tab(tab);
        }
    }

    /// Close a tab wherever it is
    pub fn close_tab(&mut self, tab_id: TabId) {
        let Some(tab) = self.tabs.remove(&tab_id) else {
            return;
        };
        let window_id = tab.window;
        // Dropping the record ends the terminal's session
        drop(tab);

        let Some(window) = self.windows.get_mut(&window_id) else {
            return;
        };
        window.remove_page(tab_id);
        info!("Tab {} closed, {} left in window {}", tab_id, window.len(), window_id);

        match window.len() {
            0 => self.window_close(window_id),
            1 => {
                window.show_tabs = false;
                self.set_current_page(window_id, 0);
            }
            _ => {
                if let Some(index) = window.current_index() {
                    self.set_current_page(window_id, index);
                }
            }
        }
    }

    /// Cycle to the next or previous tab
    pub fn tab_switch(&mut self, forward: bool, window_id: WindowId) {
        let Some(window) = self.windows.get(&window_id) else {
            return;
        };
        let len = window.len();
        let Some(current) = window.current_index() else {
            return;
        };
        let next = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        self.set_current_page(window_id, next);
    }

    /// Flip tab bar visibility; a single tab never shows it
    pub fn tab_togglebar(&mut self, window_id: WindowId) {
        if let Some(window) = self.windows.get_mut(&window_id) {
            window.show_tabs = !window.show_tabs && window.len() != 1;
            debug!("Window {} tab bar shown: {}", window_id, window.show_tabs);
        }
    }

    /// Make a page current and take its title
    pub fn set_current_page(&mut self, window_id: WindowId, index: usize) -> bool {
        let Some(window) = self.windows.get_mut(&window_id) else {
            return false;
        };
        if !window.set_current_page(index) {
            return false;
        }
        if let Some(tab) = window.current_tab() {
            self.set_window_title(tab);
        }
        true
    }

    pub fn reorder_tab(&mut self, window_id: WindowId, from: usize, to: usize) -> bool {
        self.windows
            .get_mut(&window_id)
            .map(|w| w.reorder_page(from, to))
            .unwrap_or(false)
    }

    /// Destroy a window and its tabs
    pub fn window_close(&mut self, window_id: WindowId) {
        let Some(window) = self.windows.remove(&window_id) else {
            return;
        };
        for tab in window.pages() {
            self.tabs.remove(tab);
        }
        self.window_order.retain(|&id| id != window_id);
        info!("Window {} closed, {} left", window_id, self.windows.len());

        if self.windows.is_empty() {
            info!("No windows left, shutting down");
            self.running = false;
        }
    }

    pub fn toggle_fullscreen(&mut self, window_id: WindowId) {
        if let Some(window) = self.windows.get_mut(&window_id) {
            self.settings.fullscreen = !self.settings.fullscreen;
            window.fullscreen = self.settings.fullscreen;
            debug!("Window {} fullscreen: {}", window_id, window.fullscreen);
        }
    }

    /// Refresh a tab label from its terminal title
    pub fn tab_title(&mut self, tab_id: TabId) {
        let Some(tab) = self.tabs.get_mut(&tab_id) else {
            return;
        };
        tab.label = tab.terminal.window_title().unwrap_or_default().to_string();
        let window_id = tab.window;
        if self.current_tab(window_id) == Some(tab_id) {
            self.set_window_title(tab_id);
        }
    }

    /// Set the owning window's title from a tab
    pub fn set_window_title(&mut self, tab_id: TabId) {
        let Some(tab) = self.tabs.get(&tab_id) else {
            return;
        };
        let title = tab.terminal.window_title().unwrap_or(PROGRAM_NAME).to_string();
        if let Some(window) = self.windows.get_mut(&tab.window) {
            window.title = title;
        }
    }

    /// Launch the browser on a matched URL
    pub fn open_url(&mut self, url: &str) {
        let Some(argv) = browser_argv(&self.settings.browser_command, url) else {
            return;
        };
        info!("Opening {}", url);
        self.launcher.launch(&argv);
    }

    /// Poll every terminal and collect what they report
    pub fn poll(&mut self) -> Vec<Event> {
        let ids: Vec<TabId> = self
            .window_order
            .iter()
            .filter_map(|id| self.windows.get(id))
            .flat_map(|w| w.pages().iter().copied())
            .collect();

        let mut events = Vec::new();
        for tab in ids {
            let Some(record) = self.tabs.get_mut(&tab) else {
                continue;
            };
            for signal in record.terminal.poll() {
                events.push(match signal {
                    TerminalSignal::ChildExited => Event::ChildExited { tab },
                    TerminalSignal::TitleChanged => Event::TitleChanged { tab },
                });
            }
        }
        events
    }

    /// Size a window's terminals to the space available, in toolkit units
    pub fn fit_window(&mut self, window_id: WindowId, width: i32, height: i32) {
        let Some(window) = self.windows.get(&window_id) else {
            return;
        };
        let hints = window.geometry.unwrap_or_default();
        let (columns, mut rows) = hints.grid_for(width, height);
        if window.show_tabs {
            rows = rows.saturating_sub(1).max(1);
        }
        for tab in window.pages() {
            if let Some(record) = self.tabs.get_mut(tab) {
                record.terminal.resize(columns, rows);
            }
        }
    }

    fn update_tab_bar(&mut self, window_id: WindowId) {
        if let Some(window) = self.windows.get_mut(&window_id) {
            window.show_tabs = window.len() >= 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Border;
    use crate::testing::{FakeFactory, RecordingLauncher};
    use pretty_assertions::assert_eq;

    fn manager() -> WindowManager<FakeFactory> {
        manager_with(FakeFactory::default())
    }

    fn manager_with(factory: FakeFactory) -> WindowManager<FakeFactory> {
        WindowManager::new(
            Settings::default(),
            factory,
            Box::new(RecordingLauncher::default()),
        )
    }

    fn assert_tab_bar_invariant(wm: &WindowManager<FakeFactory>, window: WindowId) {
        let w = wm.window(window).unwrap();
        assert_eq!(w.show_tabs, w.len() >= 2);
    }

    #[test]
    fn shell_argv_falls_back() {
        assert_eq!(shell_argv(None), vec!["sh"]);
        assert_eq!(shell_argv(Some("  ")), vec!["sh"]);
        assert_eq!(shell_argv(Some("/bin/zsh")), vec!["/bin/zsh"]);
        assert_eq!(shell_argv(Some("/usr/bin/fish -l")), vec!["/usr/bin/fish", "-l"]);
    }

    #[test]
    fn shell_argv_honours_quoting() {
        assert_eq!(
            shell_argv(Some("\"/opt/my shell/bin/zsh\" -l")),
            vec!["/opt/my shell/bin/zsh", "-l"]
        );
        assert_eq!(shell_argv(Some("'/opt/fish dir/fish'")), vec!["/opt/fish dir/fish"]);
        // Unbalanced quotes cannot be parsed
        assert_eq!(shell_argv(Some("\"/bin/zsh")), vec!["sh"]);
    }

    #[test]
    fn open_url_passes_url_as_one_argument() {
        let launcher = RecordingLauncher::default();
        let settings = Settings {
            browser_command: "\"/opt/My Browser/firefox\" --new-tab".to_string(),
            ..Settings::default()
        };
        let mut wm = WindowManager::new(settings, FakeFactory::default(), Box::new(launcher.clone()));

        wm.open_url("https://example.com/?q=a b");
        assert_eq!(
            *launcher.launched.borrow(),
            vec![vec![
                "/opt/My Browser/firefox".to_string(),
                "--new-tab".to_string(),
                "https://example.com/?q=a b".to_string(),
            ]]
        );
    }

    #[test]
    fn new_window_has_one_hidden_bar_tab() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        let window = wm.window(id).unwrap();

        assert_eq!(window.len(), 1);
        assert!(!window.show_tabs);
        assert_eq!(window.title, PROGRAM_NAME);
        assert_eq!(window.default_size, (80, 24));
        assert_eq!(wm.active_window(), Some(id));

        let tab = wm.tab(window.current_tab().unwrap()).unwrap();
        assert_eq!(tab.window, id);
        assert_eq!(tab.terminal.spawned.len(), 1);
        assert_eq!(tab.terminal.spawned[0].1, None);
        assert_eq!(tab.terminal.options, Some(TerminalOptions::from(wm.settings())));
        assert_eq!(tab.terminal.matches.len(), 1);
        assert_eq!(tab.terminal.matches[0].1, MouseCursor::Hand);
        assert!(tab.terminal.matches[0].0.is_match("HTTPS://EXAMPLE.COM"));
    }

    #[test]
    fn geometry_hints_follow_cell_size() {
        let mut settings = Settings::default();
        settings.window_width = 100;
        settings.window_height = 30;
        let factory = FakeFactory {
            border: Border {
                left: 1,
                right: 1,
                top: 2,
                bottom: 2,
            },
            ..FakeFactory::default()
        };
        let mut wm = WindowManager::new(settings, factory, Box::new(RecordingLauncher::default()));
        let id = wm.new_window().unwrap();
        let window = wm.window(id).unwrap();
        let hints = window.geometry.unwrap();

        assert_eq!(window.default_size, (100, 30));
        assert_eq!((hints.width_inc, hints.height_inc), (8, 16));
        assert_eq!((hints.min_width, hints.min_height), (10, 20));
        assert_eq!((hints.base_width, hints.base_height), (2, 4));
        assert_eq!(hints.size_for(100, 30), (802, 484));
    }

    #[test]
    fn tab_bar_visible_iff_two_or_more_tabs() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        assert_tab_bar_invariant(&wm, id);

        wm.tab_new(id).unwrap();
        assert_tab_bar_invariant(&wm, id);
        wm.tab_new(id).unwrap();
        assert_tab_bar_invariant(&wm, id);

        wm.tab_close(id);
        assert_tab_bar_invariant(&wm, id);
        wm.tab_close(id);
        assert_tab_bar_invariant(&wm, id);
        assert_eq!(wm.window(id).unwrap().len(), 1);
    }

    #[test]
    fn new_tab_becomes_current() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        let second = wm.tab_new(id).unwrap();
        assert_eq!(wm.current_tab(id), Some(second));
        assert_eq!(wm.window(id).unwrap().current_index(), Some(1));
    }

    #[test]
    fn tab_switch_is_cyclic() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        wm.tab_new(id);
        wm.tab_new(id);
        wm.set_current_page(id, 1);
        let start = wm.current_tab(id);

        for _ in 0..3 {
            wm.tab_switch(true, id);
        }
        assert_eq!(wm.current_tab(id), start);

        wm.tab_switch(false, id);
        assert_eq!(wm.window(id).unwrap().current_index(), Some(0));
        wm.tab_switch(false, id);
        assert_eq!(wm.window(id).unwrap().current_index(), Some(2));
        wm.tab_switch(false, id);
        assert_eq!(wm.current_tab(id), start);
    }

    #[test]
    fn togglebar_never_shows_single_tab() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        wm.tab_togglebar(id);
        assert!(!wm.window(id).unwrap().show_tabs);

        wm.tab_new(id);
        wm.tab_togglebar(id);
        assert!(!wm.window(id).unwrap().show_tabs);
        wm.tab_togglebar(id);
        assert!(wm.window(id).unwrap().show_tabs);
    }

    #[test]
    fn closing_last_tab_closes_window_and_stops() {
        let mut wm = manager();
        let first = wm.new_window().unwrap();
        let second = wm.new_window().unwrap();
        assert_eq!(wm.active_window(), Some(second));

        wm.tab_close(second);
        assert!(wm.window(second).is_none());
        assert_eq!(wm.active_window(), Some(first));
        assert!(wm.is_running());

        wm.tab_close(first);
        assert_eq!(wm.window_count(), 0);
        assert!(!wm.is_running());
    }

    #[test]
    fn window_close_drops_its_tabs() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        let tab = wm.tab_new(id).unwrap();
        wm.window_close(id);
        assert!(wm.tab(tab).is_none());
        assert!(!wm.is_running());
    }

    #[test]
    fn close_tab_targets_that_tab() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        let first = wm.current_tab(id).unwrap();
        let second = wm.tab_new(id).unwrap();
        let third = wm.tab_new(id).unwrap();

        wm.close_tab(first);
        assert_eq!(wm.window(id).unwrap().pages(), &[second, third]);
        assert_eq!(wm.current_tab(id), Some(third));
    }

    #[test]
    fn spawn_failure_leaves_no_tab() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        wm.factory_mut().fail_next_spawn = true;

        assert_eq!(wm.tab_new(id), None);
        assert_eq!(wm.window(id).unwrap().len(), 1);
        assert_tab_bar_invariant(&wm, id);
    }

    #[test]
    fn first_spawn_failure_closes_window() {
        let mut wm = manager_with(FakeFactory {
            fail_next_spawn: true,
            ..FakeFactory::default()
        });
        assert_eq!(wm.new_window(), None);
        assert_eq!(wm.window_count(), 0);
        assert!(!wm.is_running());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn second_tab_inherits_working_directory() {
        let mut wm = manager_with(FakeFactory {
            pid: Some(std::process::id()),
            ..FakeFactory::default()
        });
        let id = wm.new_window().unwrap();
        let tab = wm.tab_new(id).unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(wm.tab(tab).unwrap().terminal.spawned[0].1, Some(cwd));
    }

    #[test]
    fn title_propagates_to_current_tab_only() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        let first = wm.current_tab(id).unwrap();
        let second = wm.tab_new(id).unwrap();

        wm.tab_mut(first).unwrap().terminal.title = Some("vim".into());
        wm.tab_title(first);
        assert_eq!(wm.tab(first).unwrap().label, "vim");
        assert_eq!(wm.window(id).unwrap().title, PROGRAM_NAME);

        wm.tab_mut(second).unwrap().terminal.title = Some("make".into());
        wm.tab_title(second);
        assert_eq!(wm.window(id).unwrap().title, "make");

        wm.set_current_page(id, 0);
        assert_eq!(wm.window(id).unwrap().title, "vim");
    }

    #[test]
    fn fullscreen_toggles_setting() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        wm.toggle_fullscreen(id);
        assert!(wm.settings().fullscreen);
        assert!(wm.window(id).unwrap().fullscreen);
        wm.toggle_fullscreen(id);
        assert!(!wm.settings().fullscreen);
    }

    #[test]
    fn reorder_keeps_current() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        let first = wm.current_tab(id).unwrap();
        let second = wm.tab_new(id).unwrap();
        assert!(wm.reorder_tab(id, 1, 0));
        assert_eq!(wm.window(id).unwrap().pages(), &[second, first]);
        assert_eq!(wm.current_tab(id), Some(second));
    }

    #[test]
    fn poll_converts_signals() {
        let mut wm = manager();
        let id = wm.new_window().unwrap();
        let tab = wm.current_tab(id).unwrap();
        wm.tab_mut(tab).unwrap().terminal.pending =
            vec![TerminalSignal::TitleChanged, TerminalSignal::ChildExited];

        assert_eq!(
            wm.poll(),
            vec![Event::TitleChanged { tab }, Event::ChildExited { tab }]
        );
        assert!(wm.poll().is_empty());
    }

    #[test]
    fn fit_window_reserves_tab_bar_row() {
        let mut wm = manager_with(FakeFactory {
            char_size: (1, 1),
            ..FakeFactory::default()
        });
        let id = wm.new_window().unwrap();
        let first = wm.current_tab(id).unwrap();
        wm.fit_window(id, 100, 40);
        assert_eq!(wm.tab(first).unwrap().terminal.size, Some((100, 40)));

        let second = wm.tab_new(id).unwrap();
        wm.fit_window(id, 100, 40);
        assert_eq!(wm.tab(first).unwrap().terminal.size, Some((100, 39)));
        assert_eq!(wm.tab(second).unwrap().terminal.size, Some((100, 39)));
    }

    #[test]
    fn invalid_url_regex_uses_default() {
        let mut settings = Settings::default();
        settings.url_regex = "(unclosed".into();
        let mut wm = WindowManager::new(settings, FakeFactory::default(), Box::new(RecordingLauncher::default()));
        let id = wm.new_window().unwrap();
        let tab = wm.tab(wm.current_tab(id).unwrap()).unwrap();
        assert!(tab.terminal.matches[0].0.is_match("http://example.com"));
    }
}
