//! Key and mouse input for the child process
//!
//! Keys become xterm sequences (cursor keys honour application cursor mode);
//! mouse events are reported in whatever protocol the child enabled.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use vt100::{MouseProtocolEncoding, MouseProtocolMode};

use crate::event::Modifiers;

/// Final byte or parameter of a key's escape sequence
#[derive(Clone, Copy)]
enum KeySeq {
    /// `CSI <final>`, or `SS3 <final>` when `ss3` is set
    Final { key: u8, ss3: bool },
    /// `CSI <n> ~`
    Tilde(u8),
}

/// Encodes console key and mouse events as PTY input
pub struct KeyMapper;

impl KeyMapper {
    /// Bytes to send for a key the dispatcher did not consume
    pub fn map(event: &KeyEvent, application_cursor: bool) -> Option<Vec<u8>> {
        let mods = Modifiers::from(event.modifiers);
        let alt_prefixed = |byte: u8| {
            if mods.contains(Modifiers::ALT) {
                vec![0x1B, byte]
            } else {
                vec![byte]
            }
        };

        let seq = match event.code {
            KeyCode::Char(ch) => return Some(Self::map_char(ch, mods)),
            KeyCode::Enter => return Some(alt_prefixed(0x0D)),
            KeyCode::Backspace => return Some(alt_prefixed(0x7F)),
            KeyCode::Esc => return Some(vec![0x1B]),
            KeyCode::Tab if mods.contains(Modifiers::SHIFT) => return Some(b"\x1b[Z".to_vec()),
            KeyCode::Tab => return Some(alt_prefixed(0x09)),
            KeyCode::BackTab => return Some(b"\x1b[Z".to_vec()),

            KeyCode::Up => Self::cursor(b'A', application_cursor),
            KeyCode::Down => Self::cursor(b'B', application_cursor),
            KeyCode::Right => Self::cursor(b'C', application_cursor),
            KeyCode::Left => Self::cursor(b'D', application_cursor),
            KeyCode::Home => Self::cursor(b'H', false),
            KeyCode::End => Self::cursor(b'F', false),
            KeyCode::Insert => KeySeq::Tilde(2),
            KeyCode::Delete => KeySeq::Tilde(3),
            KeyCode::PageUp => KeySeq::Tilde(5),
            KeyCode::PageDown => KeySeq::Tilde(6),
            KeyCode::F(n @ 1..=4) => KeySeq::Final {
                key: b'P' + (n - 1),
                ss3: true,
            },
            KeyCode::F(n @ 5..=12) => KeySeq::Tilde([15, 17, 18, 19, 20, 21, 23, 24][usize::from(n - 5)]),
            _ => return None,
        };
        Some(Self::encode(seq, mods))
    }

    fn cursor(key: u8, ss3: bool) -> KeySeq {
        KeySeq::Final { key, ss3 }
    }

    /// xterm sequence, with the modifier parameter when any modifier is held
    fn encode(seq: KeySeq, mods: Modifiers) -> Vec<u8> {
        let param = Self::modifier_param(mods);
        let text = match (seq, param) {
            (KeySeq::Final { key, ss3: true }, None) => format!("\x1bO{}", key as char),
            (KeySeq::Final { key, .. }, None) => format!("\x1b[{}", key as char),
            (KeySeq::Final { key, .. }, Some(m)) => format!("\x1b[1;{}{}", m, key as char),
            (KeySeq::Tilde(n), None) => format!("\x1b[{}~", n),
            (KeySeq::Tilde(n), Some(m)) => format!("\x1b[{};{}~", n, m),
        };
        text.into_bytes()
    }

    /// Control characters for Ctrl, an ESC prefix for Alt
    fn map_char(ch: char, mods: Modifiers) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4);
        if mods.contains(Modifiers::ALT) {
            bytes.push(0x1B);
        }
        match Self::control_byte(ch).filter(|_| mods.contains(Modifiers::CTRL)) {
            Some(byte) => bytes.push(byte),
            None => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
        bytes
    }

    fn control_byte(ch: char) -> Option<u8> {
        match ch {
            'a'..='z' | 'A'..='Z' => Some(ch.to_ascii_lowercase() as u8 - b'a' + 1),
            '@' | '`' | ' ' | '2' => Some(0x00),
            '[' | '3' => Some(0x1B),
            '\\' | '4' => Some(0x1C),
            ']' | '5' => Some(0x1D),
            '^' | '~' | '6' => Some(0x1E),
            '_' | '?' | '7' => Some(0x1F),
            '8' => Some(0x7F),
            _ => None,
        }
    }

    /// xterm modifier parameter (1 + shift + 2 alt + 4 ctrl)
    fn modifier_param(mods: Modifiers) -> Option<u8> {
        if mods.is_empty() {
            return None;
        }
        let mut param = 1;
        if mods.contains(Modifiers::SHIFT) {
            param += 1;
        }
        if mods.contains(Modifiers::ALT) {
            param += 2;
        }
        if mods.contains(Modifiers::CTRL) {
            param += 4;
        }
        Some(param)
    }

    /// Encode a mouse event for a child that enabled mouse reporting.
    ///
    /// `event` carries terminal-relative cell coordinates. Returns nothing
    /// when the reporting mode does not cover this kind of event.
    pub fn encode_mouse_event(
        event: &MouseEvent,
        mode: MouseProtocolMode,
        encoding: MouseProtocolEncoding,
    ) -> Option<Vec<u8>> {
        let wanted = match event.kind {
            MouseEventKind::Down(_) | MouseEventKind::ScrollUp | MouseEventKind::ScrollDown => {
                mode != MouseProtocolMode::None
            }
            MouseEventKind::Up(_) => !matches!(mode, MouseProtocolMode::None | MouseProtocolMode::Press),
            MouseEventKind::Drag(_) => {
                matches!(mode, MouseProtocolMode::ButtonMotion | MouseProtocolMode::AnyMotion)
            }
            MouseEventKind::Moved => mode == MouseProtocolMode::AnyMotion,
            _ => false,
        };
        if !wanted {
            return None;
        }

        let (button, pressed) = match event.kind {
            MouseEventKind::Down(btn) => (Self::mouse_button_code(btn), true),
            // Legacy encodings cannot name the released button
            MouseEventKind::Up(btn) if encoding == MouseProtocolEncoding::Sgr => {
                (Self::mouse_button_code(btn), false)
            }
            MouseEventKind::Up(_) => (3, false),
            MouseEventKind::Drag(btn) => (Self::mouse_button_code(btn) + 32, true),
            MouseEventKind::Moved => (35, true),
            MouseEventKind::ScrollUp => (64, true),
            MouseEventKind::ScrollDown => (65, true),
            _ => return None,
        };

        let mut cb = button;
        if event.modifiers.contains(KeyModifiers::SHIFT) {
            cb += 4;
        }
        if event.modifiers.contains(KeyModifiers::ALT) {
            cb += 8;
        }
        if event.modifiers.contains(KeyModifiers::CONTROL) {
            cb += 16;
        }

        // 1-based coordinates for terminal protocol
        let x = event.column.saturating_add(1);
        let y = event.row.saturating_add(1);

        match encoding {
            MouseProtocolEncoding::Sgr => {
                let suffix = if pressed { 'M' } else { 'm' };
                Some(format!("\x1b[<{};{};{}{}", cb, x, y, suffix).into_bytes())
            }
            MouseProtocolEncoding::Utf8 => {
                let mut bytes = b"\x1b[M".to_vec();
                for value in [cb as u32 + 32, x as u32 + 32, y as u32 + 32] {
                    let ch = char::from_u32(value)?;
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                Some(bytes)
            }
            MouseProtocolEncoding::Default => {
                // X10 coordinates stop at 223
                if x <= 223 && y <= 223 {
                    Some(vec![0x1b, b'[', b'M', cb + 32, x as u8 + 32, y as u8 + 32])
                } else {
                    None
                }
            }
        }
    }

    /// Convert crossterm MouseButton to protocol button code
    fn mouse_button_code(button: MouseButton) -> u8 {
        match button {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}
