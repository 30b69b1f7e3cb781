//! Reader for the INI-like key file format used by the configuration.
//!
//! ```text
//! # comment
//! [general]
//! browser=firefox
//!
//! [colour scheme]
//! foreground=#e5e5e5
//! 0=#000000
//! ```
//!
//! Group names may contain spaces. Values are raw text until a typed getter
//! interprets them, so one malformed value never prevents the rest of the
//! file from loading.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("invalid value {value:?} for key '{key}' in group [{group}]: expected {expected}")]
    InvalidValue {
        group: String,
        key: String,
        value: String,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, KeyFileError>;

/// Parsed key file: group name -> key -> raw value
#[derive(Debug, Clone, Default)]
pub struct KeyFile {
    groups: HashMap<String, HashMap<String, String>>,
}

impl KeyFile {
    /// Read and parse a key file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| KeyFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse key file text
    pub fn parse(text: &str) -> Result<Self> {
        let mut groups: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| KeyFileError::Syntax {
                    line: line_no,
                    message: format!("unterminated group header {:?}", line),
                })?;
                let name = name.trim().to_string();
                groups.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| KeyFileError::Syntax {
                line: line_no,
                message: format!("expected key=value, found {:?}", line),
            })?;

            let group = current.as_ref().ok_or_else(|| KeyFileError::Syntax {
                line: line_no,
                message: "key/value pair before the first group".to_string(),
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(KeyFileError::Syntax {
                    line: line_no,
                    message: "empty key".to_string(),
                });
            }

            groups
                .entry(group.clone())
                .or_default()
                .insert(key.to_string(), value.trim().to_string());
        }

        Ok(Self { groups })
    }

    #[cfg(test)]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    fn raw(&self, group: &str, key: &str) -> Option<&str> {
        self.groups.get(group)?.get(key).map(String::as_str)
    }

    fn invalid(group: &str, key: &str, value: &str, expected: &'static str) -> KeyFileError {
        KeyFileError::InvalidValue {
            group: group.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }
    }

    /// String value with `\s`, `\n`, `\t`, `\r` and `\\` escapes resolved
    pub fn get_string(&self, group: &str, key: &str) -> Result<Option<String>> {
        let Some(raw) = self.raw(group, key) else {
            return Ok(None);
        };

        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some('s') => out.push(' '),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                _ => return Err(Self::invalid(group, key, raw, "a valid escape sequence")),
            }
        }
        Ok(Some(out))
    }

    pub fn get_bool(&self, group: &str, key: &str) -> Result<Option<bool>> {
        match self.raw(group, key) {
            None => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(other) => Err(Self::invalid(group, key, other, "true or false")),
        }
    }

    pub fn get_integer(&self, group: &str, key: &str) -> Result<Option<i64>> {
        match self.raw(group, key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| Self::invalid(group, key, raw, "an integer")),
        }
    }

    pub fn get_double(&self, group: &str, key: &str) -> Result<Option<f64>> {
        match self.raw(group, key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| Self::invalid(group, key, raw, "a number")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
# tabterm configuration
[general]
browser = firefox --new-tab

[ui]
allow_bold=false
num_scrollback_lines=5000
bg_saturation=0.25
word_chars=a\\sb

[colour scheme]
foreground=#ffffff
0 = #101010
";

    #[test]
    fn parses_groups_with_spaces_and_trims() {
        let kf = KeyFile::parse(SAMPLE).unwrap();
        assert!(kf.has_group("colour scheme"));
        assert_eq!(
            kf.get_string("general", "browser").unwrap().as_deref(),
            Some("firefox --new-tab")
        );
        assert_eq!(
            kf.get_string("colour scheme", "0").unwrap().as_deref(),
            Some("#101010")
        );
    }

    #[test]
    fn typed_getters() {
        let kf = KeyFile::parse(SAMPLE).unwrap();
        assert_eq!(kf.get_bool("ui", "allow_bold").unwrap(), Some(false));
        assert_eq!(kf.get_integer("ui", "num_scrollback_lines").unwrap(), Some(5000));
        assert_eq!(kf.get_double("ui", "bg_saturation").unwrap(), Some(0.25));
        assert_eq!(kf.get_string("ui", "word_chars").unwrap().as_deref(), Some("a b"));
    }

    #[test]
    fn missing_keys_are_none() {
        let kf = KeyFile::parse(SAMPLE).unwrap();
        assert_eq!(kf.get_bool("ui", "fullscreen").unwrap(), None);
        assert_eq!(kf.get_string("nope", "browser").unwrap(), None);
    }

    #[test]
    fn invalid_values_are_reported() {
        let kf = KeyFile::parse("[ui]\nfullscreen=yes\nwindow_width=wide\n").unwrap();
        assert!(matches!(
            kf.get_bool("ui", "fullscreen"),
            Err(KeyFileError::InvalidValue { expected: "true or false", .. })
        ));
        assert!(kf.get_integer("ui", "window_width").is_err());
    }

    #[test]
    fn syntax_errors_carry_line_numbers() {
        let err = KeyFile::parse("[ui]\nfont Monospace\n").unwrap_err();
        assert!(matches!(err, KeyFileError::Syntax { line: 2, .. }));

        let err = KeyFile::parse("# leading\nfont=Monospace\n").unwrap_err();
        assert!(matches!(err, KeyFileError::Syntax { line: 2, .. }));

        let err = KeyFile::parse("[ui\n").unwrap_err();
        assert!(matches!(err, KeyFileError::Syntax { line: 1, .. }));
    }

    #[test]
    fn later_duplicates_win() {
        let kf = KeyFile::parse("[ui]\nfont=A 9\nfont=B 10\n").unwrap();
        assert_eq!(kf.get_string("ui", "font").unwrap().as_deref(), Some("B 10"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = KeyFile::load(&dir.path().join("absent.conf")).unwrap_err();
        assert!(matches!(err, KeyFileError::Io { .. }));
    }
}
