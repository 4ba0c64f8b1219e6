// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::ids::ColumnKey;

/// Prefix of `visible` up to and including `column`, or `None` when the
/// column is not visible.
pub fn sticky_through(visible: &[ColumnKey], column: &ColumnKey) -> Option<Vec<ColumnKey>> {
    let index = visible.iter().position(|key| key == column)?;
    Some(visible[..=index].to_vec())
}

/// `sticky` truncated just before `column`; unchanged when it is not sticky.
pub fn sticky_before(sticky: &[ColumnKey], column: &ColumnKey) -> Vec<ColumnKey> {
    match sticky.iter().position(|key| key == column) {
        Some(index) => sticky[..index].to_vec(),
        None => sticky.to_vec(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollMetrics {
    pub scroll_left: u32,
    pub scroll_top: u32,
    /// Distance from the top of the viewport to the top of the table.
    pub table_top: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StickyLayout {
    observing: bool,
    horizontally_scrolled: bool,
    vertically_scrolled: bool,
    header_offset: u32,
    scroll_left: u32,
    widths: Vec<u32>,
    sticky_count: usize,
    left_offsets: Vec<u32>,
}

impl StickyLayout {
    /// Returns false when already observing.
    pub fn add(&mut self) -> bool {
        !std::mem::replace(&mut self.observing, true)
    }

    pub fn remove(&mut self) -> bool {
        std::mem::replace(&mut self.observing, false)
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) {
        if !self.observing {
            return;
        }
        self.scroll_left = metrics.scroll_left;
        self.horizontally_scrolled = metrics.scroll_left > 0;
        self.vertically_scrolled = metrics.table_top < 0;
        self.header_offset = if self.vertically_scrolled {
            metrics.table_top.unsigned_abs()
        } else {
            0
        };
    }

    /// `widths` are the rendered widths of the visible columns in display
    /// order; the first `sticky_count` of them are pinned.
    pub fn on_resize(&mut self, widths: &[u32], sticky_count: usize) {
        if !self.observing {
            return;
        }
        self.widths = widths.to_vec();
        self.sticky_count = sticky_count;
        self.layout_offsets();
    }

    /// Re-pins against the last measured widths after the sticky run
    /// changes without a resize.
    pub fn set_sticky_count(&mut self, sticky_count: usize) {
        if !self.observing || self.sticky_count == sticky_count {
            return;
        }
        self.sticky_count = sticky_count;
        self.layout_offsets();
    }

    fn layout_offsets(&mut self) {
        let pinned = self.sticky_count.min(self.widths.len());
        self.left_offsets = self.widths[..pinned]
            .iter()
            .scan(0_u32, |left, width| {
                let offset = *left;
                *left = left.saturating_add(*width);
                Some(offset)
            })
            .collect();
    }

    pub fn reset_horizontal_scroll(&mut self) {
        self.scroll_left = 0;
        self.horizontally_scrolled = false;
    }

    pub fn horizontally_scrolled(&self) -> bool {
        self.horizontally_scrolled
    }

    pub fn vertically_scrolled(&self) -> bool {
        self.vertically_scrolled
    }

    pub fn header_offset(&self) -> u32 {
        self.header_offset
    }

    pub fn scroll_left(&self) -> u32 {
        self.scroll_left
    }

    pub fn sticky_count(&self) -> usize {
        self.sticky_count
    }

    pub fn left_offsets(&self) -> &[u32] {
        &self.left_offsets
    }
}

#[cfg(test)]
mod tests {
    use super::{ScrollMetrics, StickyLayout, sticky_before, sticky_through};
    use crate::ids::ColumnKey;

    fn keys(values: &[&str]) -> Vec<ColumnKey> {
        values.iter().map(|value| ColumnKey::new(*value)).collect()
    }

    #[test]
    fn prefix_helpers() {
        let visible = keys(&["a", "b", "c", "d"]);
        assert_eq!(
            sticky_through(&visible, &ColumnKey::new("c")),
            Some(keys(&["a", "b", "c"]))
        );
        assert_eq!(sticky_through(&visible, &ColumnKey::new("z")), None);

        let sticky = keys(&["a", "b", "c"]);
        assert_eq!(sticky_before(&sticky, &ColumnKey::new("b")), keys(&["a"]));
        assert_eq!(sticky_before(&sticky, &ColumnKey::new("d")), sticky);
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let mut layout = StickyLayout::default();
        assert!(!layout.remove());
        assert!(layout.add());
        assert!(!layout.add());
        assert!(layout.remove());
        assert!(!layout.is_observing());
    }

    #[test]
    fn scroll_is_ignored_until_added() {
        let mut layout = StickyLayout::default();
        layout.on_scroll(ScrollMetrics {
            scroll_left: 40,
            scroll_top: 0,
            table_top: -12,
        });
        assert!(!layout.horizontally_scrolled());

        layout.add();
        layout.on_scroll(ScrollMetrics {
            scroll_left: 40,
            scroll_top: 30,
            table_top: -12,
        });
        assert!(layout.horizontally_scrolled());
        assert!(layout.vertically_scrolled());
        assert_eq!(layout.header_offset(), 12);

        layout.reset_horizontal_scroll();
        assert!(!layout.horizontally_scrolled());
        assert_eq!(layout.scroll_left(), 0);
    }

    #[test]
    fn resize_computes_left_offsets_for_sticky_columns() {
        let mut layout = StickyLayout::default();
        layout.add();
        layout.on_resize(&[10, 20, 30, 40], 3);
        assert_eq!(layout.left_offsets(), &[0, 10, 30]);
        layout.on_resize(&[10], 3);
        assert_eq!(layout.left_offsets(), &[0]);
    }

    #[test]
    fn sticky_count_change_reuses_measured_widths() {
        let mut layout = StickyLayout::default();
        layout.add();
        layout.on_resize(&[10, 20, 30, 40], 1);
        assert_eq!(layout.left_offsets(), &[0]);

        layout.set_sticky_count(3);
        assert_eq!(layout.sticky_count(), 3);
        assert_eq!(layout.left_offsets(), &[0, 10, 30]);

        layout.set_sticky_count(0);
        assert!(layout.left_offsets().is_empty());
    }
}
