//! Event dispatch
//!
//! Toolkit input and terminal notifications arrive as [`Event`] values and are
//! routed to window/tab operations by [`WindowManager::dispatch`].

use bitflags::bitflags;
use crossterm::event::KeyModifiers;
use tracing::debug;

use crate::core::{TerminalFactory, TerminalWidget};
use crate::wm::{TabId, WindowId, WindowManager};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Keys the dispatcher cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Left,
    Right,
    F(u8),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }
}

impl From<&crossterm::event::KeyEvent> for KeyPress {
    fn from(event: &crossterm::event::KeyEvent) -> Self {
        use crossterm::event::KeyCode;
        let key = match event.code {
            KeyCode::Char(c) => Key::Char(c),
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::F(n) => Key::F(n),
            _ => Key::Other,
        };
        Self::new(key, event.modifiers.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Middle,
    Secondary,
}

/// A button press in toolkit coordinates relative to the terminal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonPress {
    pub button: MouseButton,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Key { window: WindowId, key: KeyPress },
    Button { tab: TabId, press: ButtonPress },
    ChildExited { tab: TabId },
    TitleChanged { tab: TabId },
    SwitchPage { window: WindowId, page: usize },
    ReorderPage { window: WindowId, from: usize, to: usize },
    Destroy { window: WindowId },
}

/// Whether an event was consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Stop,
    Proceed,
}

impl<F: TerminalFactory> WindowManager<F> {
    pub fn dispatch(&mut self, event: Event) -> Propagation {
        debug!("Dispatch {:?}", event);
        match event {
            Event::Key { window, key } => self.handle_key(window, key),
            Event::Button { tab, press } => self.handle_button(tab, press),
            Event::ChildExited { tab } => {
                self.close_tab(tab);
                Propagation::Stop
            }
            Event::TitleChanged { tab } => {
                self.tab_title(tab);
                Propagation::Stop
            }
            Event::SwitchPage { window, page } => stop_if(self.set_current_page(window, page)),
            Event::ReorderPage { window, from, to } => stop_if(self.reorder_tab(window, from, to)),
            Event::Destroy { window } => {
                let known = self.window(window).is_some();
                self.window_close(window);
                stop_if(known)
            }
        }
    }

    fn handle_key(&mut self, window: WindowId, key: KeyPress) -> Propagation {
        if self.window(window).is_none() {
            return Propagation::Proceed;
        }
        let mods = key.modifiers;

        if mods.contains(Modifiers::CTRL | Modifiers::SHIFT) {
            if let Key::Char(c) = key.key {
                match c.to_ascii_uppercase() {
                    'N' => {
                        self.new_window();
                    }
                    'T' => {
                        self.tab_new(window);
                    }
                    'H' => self.tab_togglebar(window),
                    'W' => self.tab_close(window),
                    'V' => {
                        if let Some(terminal) = self.current_terminal_mut(window) {
                            terminal.paste_clipboard();
                        }
                    }
                    'C' => {
                        if let Some(terminal) = self.current_terminal_mut(window) {
                            terminal.copy_clipboard();
                        }
                    }
                    _ => return Propagation::Proceed,
                }
                return Propagation::Stop;
            }
        }

        if mods.contains(Modifiers::ALT) {
            match key.key {
                Key::Left => self.tab_switch(false, window),
                Key::Right => self.tab_switch(true, window),
                Key::F(11) => self.toggle_fullscreen(window),
                _ => return Propagation::Proceed,
            }
            return Propagation::Stop;
        }

        Propagation::Proceed
    }

    fn handle_button(&mut self, tab: TabId, press: ButtonPress) -> Propagation {
        if press.button != MouseButton::Primary {
            return Propagation::Proceed;
        }
        let Some(record) = self.tab(tab) else {
            return Propagation::Proceed;
        };

        let (char_width, char_height) = record.terminal.char_size();
        let column = (press.x / char_width.max(1) as f64).floor() as i64;
        let row = (press.y / char_height.max(1) as f64).floor() as i64;

        match record.terminal.match_check(column, row) {
            Some(url) => {
                self.open_url(&url);
                Propagation::Stop
            }
            None => Propagation::Proceed,
        }
    }
}

fn stop_if(handled: bool) -> Propagation {
    if handled {
        Propagation::Stop
    } else {
        Propagation::Proceed
    }
}
