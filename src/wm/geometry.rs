//! Geometry hints - keep window resizes in whole character cells

use crate::core::Border;

/// Size constraints derived from a terminal's character cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryHints {
    pub min_width: i32,
    pub min_height: i32,
    pub base_width: i32,
    pub base_height: i32,
    pub width_inc: i32,
    pub height_inc: i32,
}

impl GeometryHints {
    /// Hints for a widget with the given cell size and inner border
    pub fn for_cell(char_size: (u32, u32), border: Border) -> Self {
        let char_width = char_size.0.max(1) as i32;
        let char_height = char_size.1.max(1) as i32;
        let border_width = border.left + border.right;
        let border_height = border.top + border.bottom;

        Self {
            min_width: char_width + border_width,
            min_height: char_height + border_height,
            base_width: border_width,
            base_height: border_height,
            width_inc: char_width,
            height_inc: char_height,
        }
    }

    /// Window size showing exactly `columns` x `rows` cells
    pub fn size_for(&self, columns: u16, rows: u16) -> (i32, i32) {
        (
            self.base_width + self.width_inc * columns as i32,
            self.base_height + self.height_inc * rows as i32,
        )
    }

    /// Whole cells that fit in a window of the given size (at least one)
    pub fn grid_for(&self, width: i32, height: i32) -> (u16, u16) {
        let width = width.max(self.min_width);
        let height = height.max(self.min_height);
        let columns = (width - self.base_width) / self.width_inc;
        let rows = (height - self.base_height) / self.height_inc;
        (
            columns.clamp(1, u16::MAX as i32) as u16,
            rows.clamp(1, u16::MAX as i32) as u16,
        )
    }
}

impl Default for GeometryHints {
    fn default() -> Self {
        Self::for_cell((1, 1), Border::default())
    }
}
