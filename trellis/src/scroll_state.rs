//! Scroll State
//!
//! Per-axis scroll controller of a layout node: wheel offset, thumb drag,
//! trough jumps, keyboard steps and drag autoscroll.

use std::time::{Duration, Instant};

/// Grab tolerance for scrollbar thumb clicks (pixels).
const GRAB_TOLERANCE: i32 = 2;

/// Drag autoscroll runs at most once per frame interval.
const AUTOSCROLL_INTERVAL: Duration = Duration::from_millis(10);

/// Smallest thumb length in pixels.
const MIN_THUMB: i32 = 12;

/// Keyboard-driven scroll steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollKey {
    LineBack,
    LineForward,
    PageBack,
    PageForward,
    Home,
    End,
}

/// Scroll state for one axis of a node.
#[derive(Debug, Clone, Default)]
pub struct ScrollState {
    /// Current offset in pixels (0 = start).
    pub wheel: i32,
    /// Content extent in pixels.
    data: i32,
    /// Viewport extent in pixels.
    screen: i32,
    /// Thin bar variant.
    pub narrow: bool,
    /// Whether the bar is visible (content exceeds the viewport).
    shown: bool,
    /// Distance from the grab point to the thumb start during a drag.
    grab_offset: i32,
    /// Last wheel change (drag autoscroll pacing).
    last_update: Option<Instant>,
}

impl ScrollState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wheel(wheel: i32) -> Self {
        Self { wheel, ..Self::default() }
    }

    pub fn data(&self) -> i32 {
        self.data
    }

    pub fn screen(&self) -> i32 {
        self.screen
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    /// Bar thickness for a cell size.
    pub fn bar_width(&self, cell: f32) -> i32 {
        if self.narrow {
            4.max((cell / 20.0) as i32)
        } else {
            (cell / 2.0) as i32
        }
    }

    pub fn max_wheel(&self) -> i32 {
        (self.data - self.screen).max(0)
    }

    /// Update extents after a solve. Re-clamps the wheel.
    pub fn set_extent(&mut self, data: i32, screen: i32) {
        self.data = data.max(0);
        self.screen = screen.max(0);
        self.shown = self.data > self.screen;
        self.wheel = self.wheel.clamp(0, self.max_wheel());
    }

    // =====================================================================
    // Scroll operations
    // =====================================================================

    /// Set the offset, clamped to `[0, max(0, data - screen)]`. Returns true
    /// when the offset changed.
    pub fn set_wheel(&mut self, wheel: i32, now: Instant) -> bool {
        let clamped = wheel.clamp(0, self.max_wheel());
        let changed = clamped != self.wheel;
        self.wheel = clamped;
        self.last_update = Some(now);
        changed
    }

    /// Scroll by a delta (positive = towards the end).
    pub fn scroll_by(&mut self, delta: i32, now: Instant) -> bool {
        self.set_wheel(self.wheel.saturating_add(delta), now)
    }

    /// Whether a delta in this direction would move the content.
    pub fn can_scroll(&self, delta: i32) -> bool {
        match delta.signum() {
            -1 => self.wheel > 0,
            1 => self.wheel < self.max_wheel(),
            _ => false,
        }
    }

    pub fn key(&mut self, key: ScrollKey, cell: f32, now: Instant) -> bool {
        let line = cell.round() as i32;
        let page = (self.screen - line).max(line);
        match key {
            ScrollKey::LineBack => self.scroll_by(-line, now),
            ScrollKey::LineForward => self.scroll_by(line, now),
            ScrollKey::PageBack => self.scroll_by(-page, now),
            ScrollKey::PageForward => self.scroll_by(page, now),
            ScrollKey::Home => self.set_wheel(0, now),
            ScrollKey::End => self.set_wheel(self.max_wheel(), now),
        }
    }

    /// Whether a key would move the content.
    pub fn can_key(&self, key: ScrollKey) -> bool {
        match key {
            ScrollKey::LineBack | ScrollKey::PageBack | ScrollKey::Home => self.can_scroll(-1),
            ScrollKey::LineForward | ScrollKey::PageForward | ScrollKey::End => self.can_scroll(1),
        }
    }

    // =====================================================================
    // Thumb geometry (along the axis, relative to the track start)
    // =====================================================================

    pub fn thumb_len(&self) -> i32 {
        if self.data <= 0 || self.data <= self.screen {
            return self.screen;
        }
        let len = (self.screen as i64 * self.screen as i64 / self.data as i64) as i32;
        len.clamp(MIN_THUMB.min(self.screen), self.screen)
    }

    pub fn thumb_start(&self) -> i32 {
        let max = self.max_wheel();
        if max == 0 {
            return 0;
        }
        let travel = self.screen - self.thumb_len();
        (self.wheel as i64 * travel as i64 / max as i64) as i32
    }

    fn wheel_from_thumb(&self, thumb_start: i32) -> i32 {
        let travel = self.screen - self.thumb_len();
        if travel <= 0 {
            return 0;
        }
        (thumb_start as i64 * self.max_wheel() as i64 / travel as i64) as i32
    }

    // =====================================================================
    // Thumb drag
    // =====================================================================

    /// Press on the track at `pos`. A press on the thumb keeps the grab
    /// point; a press on the trough centres the thumb under the cursor.
    pub fn start_drag(&mut self, pos: i32, now: Instant) {
        let start = self.thumb_start();
        let end = start + self.thumb_len();
        if pos >= start - GRAB_TOLERANCE && pos <= end + GRAB_TOLERANCE {
            self.grab_offset = pos - start;
        } else {
            self.grab_offset = self.thumb_len() / 2;
            let wheel = self.wheel_from_thumb(pos - self.grab_offset);
            self.set_wheel(wheel, now);
        }
    }

    pub fn drag_to(&mut self, pos: i32, now: Instant) -> bool {
        let wheel = self.wheel_from_thumb(pos - self.grab_offset);
        self.set_wheel(wheel, now)
    }

    /// Grab point within the thumb of the current drag.
    pub fn grab_offset(&self) -> i32 {
        self.grab_offset
    }

    /// Resume a drag on a state rebuilt this frame.
    pub fn resume_drag(&mut self, grab_offset: i32) {
        self.grab_offset = grab_offset;
    }

    pub fn end_drag(&mut self) {
        self.grab_offset = 0;
    }

    /// Scroll while a drag holds the cursor beyond the viewport. `pos` is
    /// relative to the viewport start; the step grows with the distance.
    pub fn autoscroll(&mut self, pos: i32, now: Instant) -> bool {
        let dist = if pos < 0 {
            pos
        } else if pos >= self.screen {
            pos - self.screen + 1
        } else {
            return false;
        };
        if let Some(last) = self.last_update {
            if now.saturating_duration_since(last) < AUTOSCROLL_INTERVAL {
                return false;
            }
        }
        let step = if dist < 0 { (dist / 4).min(-1) } else { (dist / 4).max(1) };
        self.scroll_by(step, now)
    }
}
