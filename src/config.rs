//! Settings loading for tabterm.
//!
//! This module provides:
//! - Key file loading from `~/.config/tabterm/tabterm.conf`
//! - Colour parsing (`#rgb` forms and common X11 names)
//! - Built-in defaults for every setting
//!
//! # Configuration File
//!
//! ```text
//! [general]
//! browser=firefox
//!
//! [ui]
//! font=Monospace 10
//! num_scrollback_lines=5000
//! window_width=100
//! window_height=30
//!
//! [colour scheme]
//! foreground=#e5e5e5
//! background=#1d1f21
//! cursor=#ff9900
//! 0=#1d1f21
//! 1=#cc6666
//! ```
//!
//! A missing file, a syntax error or a malformed value never stops startup:
//! the problem is logged and the affected settings keep their defaults.

use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use tracing::{debug, warn};

use crate::keyfile::KeyFile;

/// Short program name, also the fallback window title
pub const PROGRAM_NAME: &str = "tabterm";

pub const DEFAULT_PALETTE_SIZE: usize = 16;
pub const DEFAULT_FONT: &str = "Monospace 9";
pub const DEFAULT_BROWSER_COMMAND: &str = "xdg-open";
pub const DEFAULT_URL_REGEX: &str = r"(ftp|http)s?://[-a-zA-Z0-9.?$%&/=_~#.,:;+]*";
pub const DEFAULT_FOREGROUND_COLOR: &str = "#e5e5e5";
pub const DEFAULT_BACKGROUND_COLOR: &str = "#000000";
pub const DEFAULT_WORD_CHARS: &str = "-A-Za-z0-9,./?%&#:_=+@~";
pub const DEFAULT_SCROLLBACK_LINES: usize = 1000;
pub const DEFAULT_BG_SATURATION: f64 = 0.4;
pub const DEFAULT_WINDOW_WIDTH: u16 = 80;
pub const DEFAULT_WINDOW_HEIGHT: u16 = 24;

const GROUP_GENERAL: &str = "general";
const GROUP_UI: &str = "ui";
const GROUP_COLOURS: &str = "colour scheme";

/// Colour definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }

    /// `#rrggbb` form, as understood by OSC colour sequences
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrrgggbbb`, `#rrrrggggbbbb` or a colour name
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        match spec.strip_prefix('#') {
            Some(hex) => Self::parse_hex(hex),
            None => Self::by_name(spec),
        }
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        if hex.is_empty() || hex.len() % 3 != 0 || hex.len() > 12 {
            return None;
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let digits = hex.len() / 3;
        let channel = |i: usize| -> Option<u8> {
            let part = &hex[i * digits..(i + 1) * digits];
            let value = u32::from_str_radix(part, 16).ok()?;
            // Scale an n-digit channel to 8 bits
            let max = (1u32 << (4 * digits)) - 1;
            Some(((value * 255 + max / 2) / max) as u8)
        };

        Some(Self::new(channel(0)?, channel(1)?, channel(2)?))
    }

    fn by_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase().replace(' ', "");
        let color = match lower.as_str() {
            "black" => Self::new(0, 0, 0),
            "white" => Self::new(255, 255, 255),
            "red" => Self::new(255, 0, 0),
            "green" => Self::new(0, 255, 0),
            "blue" => Self::new(0, 0, 255),
            "yellow" => Self::new(255, 255, 0),
            "cyan" => Self::new(0, 255, 255),
            "magenta" => Self::new(255, 0, 255),
            "orange" => Self::new(255, 165, 0),
            "purple" => Self::new(160, 32, 240),
            "brown" => Self::new(165, 42, 42),
            "pink" => Self::new(255, 192, 203),
            "gray" | "grey" => Self::new(190, 190, 190),
            "darkgray" | "darkgrey" => Self::new(169, 169, 169),
            "lightgray" | "lightgrey" => Self::new(211, 211, 211),
            "darkred" => Self::new(139, 0, 0),
            "darkgreen" => Self::new(0, 100, 0),
            "darkblue" => Self::new(0, 0, 139),
            "navy" | "navyblue" => Self::new(0, 0, 128),
            "gold" => Self::new(255, 215, 0),
            "wheat" => Self::new(245, 222, 179),
            "silver" => Self::new(192, 192, 192),
            _ => return None,
        };
        Some(color)
    }
}

/// xterm's 16-colour palette
pub const DEFAULT_PALETTE: [Color; DEFAULT_PALETTE_SIZE] = [
    Color::new(0, 0, 0),
    Color::new(205, 0, 0),
    Color::new(0, 205, 0),
    Color::new(205, 205, 0),
    Color::new(0, 0, 238),
    Color::new(205, 0, 205),
    Color::new(0, 205, 205),
    Color::new(229, 229, 229),
    Color::new(127, 127, 127),
    Color::new(255, 0, 0),
    Color::new(0, 255, 0),
    Color::new(255, 255, 0),
    Color::new(92, 92, 255),
    Color::new(255, 0, 255),
    Color::new(0, 255, 255),
    Color::new(255, 255, 255),
];

/// Process-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub audible_bell: bool,
    pub autohide_mouse: bool,
    pub allow_bold: bool,
    /// Program (plus arguments) the matched URL is appended to
    pub browser_command: String,
    pub font: String,
    /// Toggled at runtime by alt+F11
    pub fullscreen: bool,
    pub num_scrollback_lines: usize,
    pub scroll_on_keystroke: bool,
    pub scroll_on_output: bool,
    pub bg_transparent: bool,
    pub bg_saturation: f64,
    pub bg_image: Option<PathBuf>,
    /// Always a pattern that compiles
    pub url_regex: String,
    pub visible_bell: bool,
    /// Default window size in character cells
    pub window_width: u16,
    pub window_height: u16,
    pub word_chars: String,
    pub foreground: Color,
    pub background: Color,
    pub palette: [Color; DEFAULT_PALETTE_SIZE],
    pub cursor: Option<Color>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_keyfile(&KeyFile::default())
    }
}

impl Settings {
    /// Load settings from a key file; problems are logged, never fatal
    pub fn load(path: &Path) -> Self {
        let keyfile = match KeyFile::load(path) {
            Ok(kf) => kf,
            Err(e) => {
                warn!("Error parsing config file {}: {}", path.display(), e);
                KeyFile::default()
            }
        };
        let settings = Self::from_keyfile(&keyfile);
        debug!("Loaded settings: {:?}", settings);
        settings
    }

    /// Default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(PROGRAM_NAME).join(format!("{}.conf", PROGRAM_NAME)))
            .unwrap_or_else(|| PathBuf::from(format!("{}.conf", PROGRAM_NAME)))
    }

    /// Build settings from an already parsed key file
    pub fn from_keyfile(kf: &KeyFile) -> Self {
        let reader = Reader { kf };

        let url_regex = reader
            .string(GROUP_UI, "url_regex")
            .filter(|pattern| match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(_) => true,
                Err(e) => {
                    warn!("Ignoring url_regex {:?}: {}", pattern, e);
                    false
                }
            })
            .unwrap_or_else(|| DEFAULT_URL_REGEX.to_string());

        let mut palette = DEFAULT_PALETTE;
        for (i, slot) in palette.iter_mut().enumerate() {
            if let Some(color) = reader.color(&i.to_string()) {
                *slot = color;
            }
        }

        Self {
            audible_bell: reader.bool(GROUP_UI, "audible_bell").unwrap_or(false),
            autohide_mouse: reader.bool(GROUP_UI, "autohide_mouse").unwrap_or(false),
            allow_bold: reader.bool(GROUP_UI, "allow_bold").unwrap_or(true),
            browser_command: reader
                .string(GROUP_GENERAL, "browser")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BROWSER_COMMAND.to_string()),
            font: reader
                .string(GROUP_UI, "font")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FONT.to_string()),
            fullscreen: reader.bool(GROUP_UI, "fullscreen").unwrap_or(false),
            num_scrollback_lines: reader
                .ranged(GROUP_UI, "num_scrollback_lines", 0, i64::from(u32::MAX))
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_SCROLLBACK_LINES),
            scroll_on_keystroke: reader.bool(GROUP_UI, "scroll_on_keystroke").unwrap_or(true),
            scroll_on_output: reader.bool(GROUP_UI, "scroll_on_output").unwrap_or(false),
            bg_transparent: reader.bool(GROUP_UI, "bg_transparent").unwrap_or(false),
            bg_saturation: reader
                .double(GROUP_UI, "bg_saturation")
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(DEFAULT_BG_SATURATION),
            bg_image: reader
                .string(GROUP_UI, "bg_image")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            url_regex,
            visible_bell: reader.bool(GROUP_UI, "visible_bell").unwrap_or(false),
            window_height: reader
                .ranged(GROUP_UI, "window_height", 1, i64::from(u16::MAX))
                .map(|n| n as u16)
                .unwrap_or(DEFAULT_WINDOW_HEIGHT),
            window_width: reader
                .ranged(GROUP_UI, "window_width", 1, i64::from(u16::MAX))
                .map(|n| n as u16)
                .unwrap_or(DEFAULT_WINDOW_WIDTH),
            word_chars: reader
                .string(GROUP_UI, "word_chars")
                .unwrap_or_else(|| DEFAULT_WORD_CHARS.to_string()),
            foreground: reader.color_or("foreground", DEFAULT_FOREGROUND_COLOR),
            background: reader.color_or("background", DEFAULT_BACKGROUND_COLOR),
            palette,
            cursor: reader.color("cursor"),
        }
    }
}

/// Typed lookups that log and swallow malformed values
struct Reader<'a> {
    kf: &'a KeyFile,
}

impl Reader<'_> {
    fn string(&self, group: &str, key: &str) -> Option<String> {
        self.kf.get_string(group, key).unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
    }

    fn bool(&self, group: &str, key: &str) -> Option<bool> {
        self.kf.get_bool(group, key).unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
    }

    fn double(&self, group: &str, key: &str) -> Option<f64> {
        self.kf.get_double(group, key).unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
    }

    fn ranged(&self, group: &str, key: &str, min: i64, max: i64) -> Option<i64> {
        let value = self.kf.get_integer(group, key).unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })?;
        if (min..=max).contains(&value) {
            Some(value)
        } else {
            warn!("Ignoring {} = {} in [{}]: out of range {}..={}", key, value, group, min, max);
            None
        }
    }

    fn color(&self, key: &str) -> Option<Color> {
        let spec = self.string(GROUP_COLOURS, key)?;
        let color = Color::parse(&spec);
        if color.is_none() {
            warn!("Unparseable colour {:?} for '{}', using default", spec, key);
        }
        color
    }

    fn color_or(&self, key: &str, default: &str) -> Color {
        self.color(key).unwrap_or_else(|| {
            debug!("Using default {} color", key);
            Color::parse(default).unwrap_or(Color::new(0, 0, 0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn load_text(text: &str) -> Settings {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        Settings::load(file.path())
    }

    #[test]
    fn parses_hex_colours() {
        assert_eq!(Color::parse("#fff"), Some(Color::new(255, 255, 255)));
        assert_eq!(Color::parse("#102030"), Some(Color::new(0x10, 0x20, 0x30)));
        assert_eq!(Color::parse("#ffff00000000"), Some(Color::new(255, 0, 0)));
        assert_eq!(Color::parse("#800"), Some(Color::new(136, 0, 0)));
        assert_eq!(Color::parse("#12345"), None);
        assert_eq!(Color::parse("#gg0000"), None);
        assert_eq!(Color::parse(""), None);
    }

    #[test]
    fn parses_named_colours() {
        assert_eq!(Color::parse("Navy Blue"), Some(Color::new(0, 0, 128)));
        assert_eq!(Color::parse("white"), Some(Color::new(255, 255, 255)));
        assert_eq!(Color::parse("notacolour"), None);
    }

    #[test]
    fn hex_round_trip_for_osc() {
        assert_eq!(Color::new(255, 153, 0).to_hex(), "#ff9900");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("missing.conf"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.font, DEFAULT_FONT);
        assert_eq!(settings.browser_command, DEFAULT_BROWSER_COMMAND);
        assert_eq!(settings.url_regex, DEFAULT_URL_REGEX);
        assert_eq!(settings.palette, DEFAULT_PALETTE);
        assert_eq!(settings.window_width, 80);
        assert_eq!(settings.window_height, 24);
    }

    #[test]
    fn syntax_error_falls_back_to_defaults() {
        let settings = load_text("font=Fira 10\n");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn valid_foreground_is_used() {
        let settings = load_text("[colour scheme]\nforeground=#102030\n");
        assert_eq!(settings.foreground, Color::new(0x10, 0x20, 0x30));
    }

    #[test]
    fn invalid_or_missing_foreground_uses_default() {
        let default = Color::parse(DEFAULT_FOREGROUND_COLOR).unwrap();
        assert_eq!(load_text("[colour scheme]\nforeground=bogus\n").foreground, default);
        assert_eq!(load_text("[colour scheme]\n").foreground, default);
    }

    #[test]
    fn omitted_font_uses_default() {
        let settings = load_text("[ui]\nallow_bold=false\n");
        assert_eq!(settings.font, DEFAULT_FONT);
        assert!(!settings.allow_bold);
    }

    #[test]
    fn full_file() {
        let settings = load_text(
            "[general]\n\
             browser=firefox --new-tab\n\
             [ui]\n\
             audible_bell=true\n\
             font=Fira Code 11\n\
             fullscreen=true\n\
             num_scrollback_lines=250\n\
             scroll_on_output=true\n\
             bg_saturation=3.5\n\
             bg_image=/tmp/bg.png\n\
             window_width=100\n\
             window_height=30\n\
             word_chars=abc\n\
             [colour scheme]\n\
             background=black\n\
             cursor=#ff9900\n\
             1=#112233\n\
             15=nonsense\n",
        );
        assert_eq!(settings.browser_command, "firefox --new-tab");
        assert!(settings.audible_bell);
        assert_eq!(settings.font, "Fira Code 11");
        assert!(settings.fullscreen);
        assert_eq!(settings.num_scrollback_lines, 250);
        assert!(settings.scroll_on_output);
        assert_eq!(settings.bg_saturation, 1.0);
        assert_eq!(settings.bg_image, Some(PathBuf::from("/tmp/bg.png")));
        assert_eq!((settings.window_width, settings.window_height), (100, 30));
        assert_eq!(settings.word_chars, "abc");
        assert_eq!(settings.background, Color::new(0, 0, 0));
        assert_eq!(settings.cursor, Some(Color::new(255, 153, 0)));
        assert_eq!(settings.palette[1], Color::new(0x11, 0x22, 0x33));
        assert_eq!(settings.palette[15], DEFAULT_PALETTE[15]);
        assert_eq!(settings.palette[0], DEFAULT_PALETTE[0]);
    }

    #[test]
    fn malformed_scalars_keep_defaults() {
        let settings = load_text(
            "[ui]\nallow_bold=maybe\nwindow_width=0\nnum_scrollback_lines=-5\nurl_regex=(unclosed\n",
        );
        assert!(settings.allow_bold);
        assert_eq!(settings.window_width, DEFAULT_WINDOW_WIDTH);
        assert_eq!(settings.num_scrollback_lines, DEFAULT_SCROLLBACK_LINES);
        assert_eq!(settings.url_regex, DEFAULT_URL_REGEX);
    }

    #[test]
    fn default_path_names_the_program() {
        let path = Settings::default_path();
        assert!(path.ends_with(format!("{}.conf", PROGRAM_NAME)));
    }
}
