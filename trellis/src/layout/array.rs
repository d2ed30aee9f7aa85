//! One-dimensional grid solver.
//!
//! A `LayoutArray` holds the column (or row) declarations of one node and
//! turns them into pixel sizes for a given cell size and window extent.

/// Smallest and largest accepted cell sizes (in cells).
const MIN_CELLS: f32 = 0.001;
const MAX_CELLS: f32 = 1e8;
/// Resizers can never collapse a cell below this many cells.
const MIN_RESIZE_CELLS: f32 = 0.3;
/// Most cells one array may declare. Positions at or past it are ignored.
pub const MAX_GRID_CELLS: usize = 1024;
/// Largest pixel size of one cell, so array totals stay far from `i32::MAX`.
const MAX_CELL_PX: i32 = 1 << 16;

/// One column or row declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    /// Minimum size in cells.
    pub min: f32,
    /// Maximum size in cells. 0 = unbounded.
    pub max: f32,
    /// Current resizer value in cells, when the cell is user-resizable.
    pub resize: Option<f32>,
    /// Fill cells receive spare pixels before any other cell.
    pub fill: bool,
}

impl Default for GridCell {
    fn default() -> Self {
        Self { min: 1.0, max: 0.0, resize: None, fill: false }
    }
}

/// Column or row array of a layout node.
#[derive(Debug, Clone, Default)]
pub struct LayoutArray {
    cells: Vec<GridCell>,
    /// Resolved pixel sizes (valid after `solve`).
    outputs: Vec<i32>,
    /// Cell size (pixels per cell) of the last solve.
    cell_px: f32,
    /// Window extent of the last solve.
    window: i32,
}

impl LayoutArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Grow the array with default cells so that index `len - 1` exists.
    pub fn ensure(&mut self, len: usize) {
        let len = len.min(MAX_GRID_CELLS);
        if self.cells.len() < len {
            self.cells.resize(len, GridCell::default());
        }
    }

    /// Declare cell `pos` with min/max and an optional resizer value.
    ///
    /// Re-declaring a cell overwrites it; intermediate cells get defaults.
    pub fn set(&mut self, pos: usize, min: f32, max: f32, resize: Option<f32>) {
        if pos >= MAX_GRID_CELLS {
            tracing::debug!(pos, "cell position out of range");
            return;
        }
        self.ensure(pos + 1);
        let cell = &mut self.cells[pos];
        cell.min = min;
        cell.max = max;
        cell.resize = resize;
    }

    /// Append a cell at the end.
    pub fn add(&mut self, min: f32, max: f32, resize: Option<f32>) -> usize {
        let pos = self.cells.len();
        self.set(pos, min, max, resize);
        pos
    }

    /// Mark cell `pos` as a fill cell.
    pub fn set_fill(&mut self, pos: usize) {
        if pos >= MAX_GRID_CELLS {
            return;
        }
        self.ensure(pos + 1);
        self.cells[pos].fill = true;
    }

    pub fn is_fill(&self, pos: usize) -> bool {
        self.cells.get(pos).is_some_and(|c| c.fill)
    }

    /// Whether cell `i` carries a resizer that can actually be dragged.
    ///
    /// The last cell's resizer is only usable when another cell precedes it;
    /// its handle then sits on the boundary before the last cell.
    pub fn has_valid_resizer(&self, i: usize) -> bool {
        match self.cells.get(i) {
            Some(c) if c.resize.is_some() => i + 1 < self.cells.len() || i > 0,
            _ => false,
        }
    }

    fn is_last_resizer(&self, i: usize) -> bool {
        i + 1 == self.cells.len() && i > 0
    }

    /// Effective (min, max) in cells after applying resizers.
    fn bounds(&self, i: usize) -> (f32, f32) {
        let c = &self.cells[i];
        let min = c.min.clamp(MIN_CELLS, MAX_CELLS);
        if self.has_valid_resizer(i) {
            if let Some(v) = c.resize {
                let v = v.clamp(min.max(MIN_RESIZE_CELLS), MAX_CELLS);
                return (v, v);
            }
        }
        let max = if c.max > 0.0 { c.max.clamp(min, MAX_CELLS) } else { 0.0 };
        (min, max)
    }

    /// Resolve pixel sizes for a cell size and window extent (pixels).
    pub fn solve(&mut self, cell: f32, window: i32) {
        self.cell_px = cell;
        self.window = window.max(0);
        let n = self.cells.len();
        self.outputs.clear();
        self.outputs.resize(n, 0);

        let mut caps = vec![i32::MAX; n];
        for i in 0..n {
            let (min, max) = self.bounds(i);
            let out = (min * cell).ceil() as i32;
            self.outputs[i] = out.clamp(0, MAX_CELL_PX);
            if max > 0.0 {
                caps[i] = ((max * cell).round() as i32).clamp(self.outputs[i], MAX_CELL_PX);
            }
        }

        let used: i64 = self.outputs.iter().map(|&o| i64::from(o)).sum();
        let mut rest = (i64::from(self.window) - used).clamp(0, i64::from(i32::MAX)) as i32;
        let fills: Vec<bool> = self.cells.iter().map(|c| c.fill).collect();
        distribute(&mut self.outputs, &caps, |i| fills[i], &mut rest);
        distribute(&mut self.outputs, &caps, |i| !fills[i], &mut rest);
    }

    /// Resolved pixel size of cell `i` (0 for undeclared cells).
    pub fn output(&self, i: usize) -> i32 {
        self.outputs.get(i).copied().unwrap_or(0)
    }

    pub fn outputs(&self) -> &[i32] {
        &self.outputs
    }

    /// Sum of all resolved sizes.
    pub fn total(&self) -> i32 {
        self.outputs.iter().sum()
    }

    pub fn cell_px(&self) -> f32 {
        self.cell_px
    }

    /// Pixel offset of the start of cell `i` relative to the array start.
    pub fn start_px(&self, i: usize) -> i32 {
        self.outputs.iter().take(i).sum()
    }

    /// Pixel (start, size) of the cell range `[start, start + len)`.
    pub fn range_px(&self, start: usize, len: usize) -> (i32, i32) {
        let begin = self.start_px(start);
        let end = start.saturating_add(len.max(1)).min(self.outputs.len().max(start));
        let size = (start..end).map(|i| self.output(i)).sum();
        (begin, size)
    }

    /// Cell index at a pixel offset, clamped to the last cell.
    pub fn cell_at(&self, px: i32) -> Option<usize> {
        if self.outputs.is_empty() || px < 0 {
            return None;
        }
        let mut acc = 0;
        for (i, &o) in self.outputs.iter().enumerate() {
            acc += o;
            if px < acc {
                return Some(i);
            }
        }
        Some(self.outputs.len() - 1)
    }

    /// Pixel offset of the resizer handle of cell `i`.
    pub fn resizer_position(&self, i: usize) -> Option<i32> {
        if !self.has_valid_resizer(i) {
            return None;
        }
        if self.is_last_resizer(i) {
            Some(self.start_px(i))
        } else {
            Some(self.start_px(i) + self.output(i))
        }
    }

    /// Width of the resizer hit zone in pixels.
    pub fn resizer_hit_width(&self) -> i32 {
        9.max((self.cell_px / 4.0) as i32)
    }

    /// Find the resizer handle under a pixel offset.
    pub fn hit_resizer(&self, px: i32) -> Option<usize> {
        let half = self.resizer_hit_width() / 2;
        (0..self.cells.len()).find(|&i| {
            self.resizer_position(i)
                .is_some_and(|pos| (px - pos).abs() <= half)
        })
    }

    /// Move the handle of cell `i` to pixel offset `px` and return the new
    /// resizer value in cells.
    pub fn set_resizer_from_px(&mut self, i: usize, px: i32) -> Option<f32> {
        if !self.has_valid_resizer(i) || self.cell_px <= 0.0 {
            return None;
        }
        let size_px = if self.is_last_resizer(i) {
            self.window.max(self.total()) - px
        } else {
            px - self.start_px(i)
        };
        let min = self.cells[i].min.clamp(MIN_CELLS, MAX_CELLS).max(MIN_RESIZE_CELLS);
        let value = (size_px as f32 / self.cell_px).clamp(min, MAX_CELLS);
        self.cells[i].resize = Some(value);
        Some(value)
    }

    /// Current resizer value of cell `i`.
    pub fn resize_value(&self, i: usize) -> Option<f32> {
        self.cells.get(i).and_then(|c| c.resize)
    }
}

/// Hand out `rest` pixels over eligible cells with headroom, evenly.
fn distribute(out: &mut [i32], caps: &[i32], eligible: impl Fn(usize) -> bool, rest: &mut i32) {
    while *rest > 0 {
        let open: Vec<usize> = (0..out.len())
            .filter(|&i| eligible(i) && out[i] < caps[i])
            .collect();
        if open.is_empty() {
            break;
        }
        let count = open.len() as i32;
        let step = *rest / count + i32::from(*rest % count != 0);
        for i in open {
            let add = step.min(caps[i] - out[i]).min(*rest);
            out[i] += add;
            *rest -= add;
            if *rest == 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_columns() -> LayoutArray {
        let mut cols = LayoutArray::new();
        cols.add(1.0, 100.0, None);
        cols.add(2.0, 4.0, Some(2.0));
        cols
    }

    #[test]
    fn resizer_scenario_initial() {
        let mut cols = two_columns();
        cols.solve(40.0, 1000);
        assert_eq!(cols.outputs(), &[920, 80]);
    }

    #[test]
    fn resizer_scenario_drag_last_cell() {
        let mut cols = two_columns();
        cols.solve(40.0, 1000);
        // The last cell's handle sits at its left edge.
        assert_eq!(cols.resizer_position(1), Some(920));
        assert_eq!(cols.hit_resizer(922), Some(1));

        let value = cols.set_resizer_from_px(1, 600);
        assert_eq!(value, Some(10.0));
        cols.solve(40.0, 1000);
        assert_eq!(cols.outputs(), &[600, 400]);
    }

    #[test]
    fn fill_cells_win() {
        let mut rows = LayoutArray::new();
        rows.add(1.0, 0.0, None);
        rows.add(1.0, 0.0, None);
        rows.set_fill(1);
        rows.solve(10.0, 100);
        assert_eq!(rows.outputs(), &[10, 90]);
        assert_eq!(rows.total(), 100);
    }

    #[test]
    fn max_limits_growth_without_fill() {
        let mut cols = LayoutArray::new();
        cols.add(1.0, 2.0, None);
        cols.add(1.0, 3.0, None);
        cols.solve(10.0, 1000);
        assert_eq!(cols.outputs(), &[20, 30]);
        assert!(cols.total() <= 1000);
    }

    #[test]
    fn overflow_keeps_minimums() {
        let mut cols = LayoutArray::new();
        cols.add(5.0, 0.0, None);
        cols.add(5.0, 0.0, None);
        cols.solve(10.0, 60);
        assert_eq!(cols.outputs(), &[50, 50]);
    }

    #[test]
    fn even_distribution_rounds_up() {
        let mut cols = LayoutArray::new();
        for _ in 0..3 {
            cols.add(1.0, 0.0, None);
        }
        cols.solve(10.0, 100);
        assert_eq!(cols.total(), 100);
        assert!(cols.outputs().iter().all(|&o| o >= 10));
    }

    #[test]
    fn middle_resizer_handle_at_right_edge() {
        let mut cols = LayoutArray::new();
        cols.add(1.0, 0.0, Some(3.0));
        cols.add(1.0, 0.0, None);
        cols.solve(10.0, 200);
        assert_eq!(cols.outputs(), &[30, 170]);
        assert_eq!(cols.resizer_position(0), Some(30));
        cols.set_resizer_from_px(0, 50);
        cols.solve(10.0, 200);
        assert_eq!(cols.outputs(), &[50, 150]);
    }

    #[test]
    fn single_cell_resizer_is_ignored() {
        let mut cols = LayoutArray::new();
        cols.add(1.0, 0.0, Some(3.0));
        assert!(!cols.has_valid_resizer(0));
        cols.solve(10.0, 100);
        assert_eq!(cols.outputs(), &[100]);
    }

    #[test]
    fn hit_width_has_floor() {
        let mut cols = two_columns();
        cols.solve(8.0, 100);
        assert_eq!(cols.resizer_hit_width(), 9);
        cols.solve(80.0, 1000);
        assert_eq!(cols.resizer_hit_width(), 20);
    }

    #[test]
    fn range_and_cell_lookup() {
        let mut cols = LayoutArray::new();
        cols.add(1.0, 1.0, None);
        cols.add(2.0, 2.0, None);
        cols.add(3.0, 3.0, None);
        cols.solve(10.0, 60);
        assert_eq!(cols.range_px(1, 2), (10, 50));
        assert_eq!(cols.cell_at(15), Some(1));
        assert_eq!(cols.cell_at(500), Some(2));
        assert_eq!(cols.cell_at(-1), None);
    }

    #[test]
    fn huge_minimums_stay_bounded() {
        let mut cols = LayoutArray::new();
        cols.add(1e8, 0.0, None);
        cols.add(1e8, 1e8, None);
        cols.solve(40.0, 800);
        assert!(cols.outputs().iter().all(|&o| o > 0 && o <= MAX_CELL_PX));
        assert_eq!(cols.total(), 2 * MAX_CELL_PX);
        assert_eq!(cols.start_px(2), cols.total());
    }

    #[test]
    fn positions_past_the_cap_are_ignored() {
        let mut cols = LayoutArray::new();
        cols.set(usize::MAX, 1.0, 0.0, None);
        cols.set_fill(usize::MAX);
        cols.set(MAX_GRID_CELLS, 1.0, 0.0, None);
        cols.ensure(usize::MAX);
        assert_eq!(cols.len(), MAX_GRID_CELLS);
        cols.solve(10.0, 100);
        assert_eq!(cols.range_px(MAX_GRID_CELLS - 1, usize::MAX).1, cols.output(MAX_GRID_CELLS - 1));
    }
}
