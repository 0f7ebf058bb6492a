use std::ops::Range;

/// Geometry of the hosting scroll container.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub height: f64,
    pub scroll_top: f64,
}

impl Viewport {
    pub fn new(height: f64, scroll_top: f64) -> Self {
        Self { height, scroll_top }
    }
}

/// Rows to materialize for one scroll position.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderWindow {
    /// Rows intersecting the viewport.
    pub visible: Range<usize>,
    /// `visible` padded by the overscan margin.
    pub render: Range<usize>,
    pub total_height: f64,
}

impl RenderWindow {
    pub fn is_empty(&self) -> bool {
        self.render.is_empty()
    }
}

/// Fixed-height row virtualization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualRowScheduler {
    row_height: f64,
    overscan: usize,
}

impl VirtualRowScheduler {
    pub fn new(row_height: f64, overscan: usize) -> Self {
        let row_height = if row_height.is_finite() && row_height > 0.0 {
            row_height
        } else {
            1.0
        };
        Self {
            row_height,
            overscan,
        }
    }

    pub fn row_height(&self) -> f64 {
        self.row_height
    }

    pub fn total_height(&self, row_count: usize) -> f64 {
        row_count as f64 * self.row_height
    }

    /// Top pixel offset of the row at display `index`.
    pub fn row_offset(&self, index: usize) -> f64 {
        index as f64 * self.row_height
    }

    pub fn schedule(&self, row_count: usize, viewport: Viewport) -> RenderWindow {
        let total_height = self.total_height(row_count);
        if row_count == 0 {
            return RenderWindow {
                visible: 0..0,
                render: 0..0,
                total_height,
            };
        }

        let max_scroll = (total_height - viewport.height).max(0.0);
        let scroll_top = viewport.scroll_top.clamp(0.0, max_scroll);
        let height = viewport.height.max(0.0);

        let first = ((scroll_top / self.row_height).floor() as usize).min(row_count - 1);
        let last = (((scroll_top + height) / self.row_height).ceil() as usize)
            .max(first + 1)
            .min(row_count);

        RenderWindow {
            visible: first..last,
            render: first.saturating_sub(self.overscan)..(last + self.overscan).min(row_count),
            total_height,
        }
    }

    /// Pairs each rendered index with its absolute top offset.
    pub fn positions(&self, window: &RenderWindow) -> Vec<(usize, f64)> {
        window
            .render
            .clone()
            .map(|idx| (idx, self.row_offset(idx)))
            .collect()
    }
}
