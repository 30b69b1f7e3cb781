//! Window - an ordered set of tab pages

use super::geometry::GeometryHints;
use super::tab::TabId;

/// Unique identifier for a window
pub type WindowId = u64;

/// A top-level window holding a notebook of tabs
pub struct Window {
    pub id: WindowId,
    /// Page order as shown in the tab bar
    pages: Vec<TabId>,
    /// Index of the current page
    current: Option<usize>,
    /// Tab bar visibility
    pub show_tabs: bool,
    /// Cached title
    pub title: String,
    pub fullscreen: bool,
    /// Requested size in character cells
    pub default_size: (u16, u16),
    /// Set once the first tab exists
    pub geometry: Option<GeometryHints>,
}

impl Window {
    pub fn new(id: WindowId, default_size: (u16, u16), fullscreen: bool) -> Self {
        Self {
            id,
            pages: Vec::new(),
            current: None,
            show_tabs: false,
            title: String::new(),
            fullscreen,
            default_size,
            geometry: None,
        }
    }

    pub fn pages(&self) -> &[TabId] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_tab(&self) -> Option<TabId> {
        self.current.and_then(|i| self.nth_tab(i))
    }

    pub fn nth_tab(&self, index: usize) -> Option<TabId> {
        self.pages.get(index).copied()
    }

    pub fn page_of(&self, tab: TabId) -> Option<usize> {
        self.pages.iter().position(|&id| id == tab)
    }

    /// Append a page, returning its index
    pub fn append_page(&mut self, tab: TabId) -> usize {
        self.pages.push(tab);
        self.pages.len() - 1
    }

    /// Remove a page. The current index keeps its position, clamped to the
    /// new length, and moves down when an earlier page goes away.
    pub fn remove_page(&mut self, tab: TabId) -> Option<usize> {
        let index = self.page_of(tab)?;
        self.pages.remove(index);

        self.current = match self.current {
            _ if self.pages.is_empty() => None,
            Some(current) if index < current => Some(current - 1),
            Some(current) => Some(current.min(self.pages.len() - 1)),
            None => None,
        };
        Some(index)
    }

    /// Move a page; the current tab stays current
    pub fn reorder_page(&mut self, from: usize, to: usize) -> bool {
        if from >= self.pages.len() || to >= self.pages.len() {
            return false;
        }
        let current = self.current_tab();
        let tab = self.pages.remove(from);
        self.pages.insert(to, tab);
        self.current = current.and_then(|id| self.page_of(id));
        true
    }

    pub fn set_current_page(&mut self, index: usize) -> bool {
        if index >= self.pages.len() {
            return false;
        }
        self.current = Some(index);
        true
    }
}
