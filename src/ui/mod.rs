//! Console front end.
//!
//! - **renderer**: Draws the front window (tab bar, terminal grid) and
//!   mirrors window state onto the console
//! - **keymapper**: Keyboard and mouse input to PTY byte sequences

pub mod keymapper;
pub mod renderer;

pub use keymapper::KeyMapper;
pub use renderer::{tab_at, tab_spans, window_labels, Renderer};
