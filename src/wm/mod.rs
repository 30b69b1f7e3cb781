//! Window Manager - windows holding notebooks of terminal tabs.
//!
//! - **manager**: `WindowManager`, the context object owning settings,
//!   windows and tabs
//! - **window**: Window record (page order, current page, tab bar, title)
//! - **tab**: Tab record (terminal widget, label, shell pid)
//! - **geometry**: Geometry hints derived from the character cell
//!
//! # Module Hierarchy
//!
//! ```text
//! wm/
//! ├── mod.rs       - Module exports
//! ├── manager.rs   - WindowManager (lifecycle operations)
//! ├── window.rs    - Window (ordered pages)
//! ├── tab.rs       - Tab (terminal + shell)
//! └── geometry.rs  - GeometryHints
//! ```

pub mod geometry;
pub mod manager;
pub mod tab;
pub mod window;

pub use manager::WindowManager;
pub use tab::TabId;
pub use window::{Window, WindowId};
