//! Tooltip and selection-brush overlays.

use std::time::{Duration, Instant};

use crate::primitives::{Rect, Vec2f, Vec2i};

/// Pointer must rest this long before a tooltip shows.
pub const TOOLTIP_DELAY: Duration = Duration::from_millis(200);

/// Gap between the anchor rect and the tooltip.
const TOOLTIP_GAP: i32 = 4;

// =========================================================================
// Tooltip
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TooltipProposal {
    pub anchor: Rect,
    pub text: String,
}

#[derive(Debug)]
pub struct Tooltip {
    proposal: Option<TooltipProposal>,
    pointer: Vec2i,
    still_since: Instant,
}

impl Default for Tooltip {
    fn default() -> Self {
        Self { proposal: None, pointer: Vec2i::ZERO, still_since: Instant::now() }
    }
}

impl Tooltip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting proposals. Any pointer movement restarts the delay.
    pub fn begin_frame(&mut self, pointer: Vec2i, now: Instant) {
        if pointer != self.pointer {
            self.pointer = pointer;
            self.still_since = now;
        }
        self.proposal = None;
    }

    /// Offer a tooltip for a region under the pointer. Later proposals are
    /// on top and replace earlier ones.
    pub fn propose(&mut self, anchor: Rect, text: &str) {
        if text.is_empty() || !anchor.inside(self.pointer) {
            return;
        }
        self.proposal = Some(TooltipProposal { anchor, text: text.to_string() });
    }

    /// A proposal exists but may still be waiting for the delay.
    pub fn has_proposal(&self) -> bool {
        self.proposal.is_some()
    }

    /// The winning proposal once the pointer has rested long enough.
    pub fn visible(&self, now: Instant) -> Option<&TooltipProposal> {
        if now.saturating_duration_since(self.still_since) < TOOLTIP_DELAY {
            return None;
        }
        self.proposal.as_ref()
    }
}

/// Place a tooltip of `size` next to `anchor`: below when there is more
/// room below, otherwise above; clamped to the screen.
pub fn place_tooltip(anchor: Rect, size: Vec2i, screen: Rect) -> Rect {
    let below = screen.bottom() - anchor.bottom();
    let above = anchor.y - screen.y;
    let y = if below >= above { anchor.bottom() + TOOLTIP_GAP } else { anchor.y - TOOLTIP_GAP - size.y };
    let x = anchor.x;
    let w = size.x.min(screen.w);
    let h = size.y.min(screen.h);
    let x = x.clamp(screen.x, (screen.right() - w).max(screen.x));
    let y = y.clamp(screen.y, (screen.bottom() - h).max(screen.y));
    Rect::new(x, y, w, h)
}

// =========================================================================
// Selection brush
// =========================================================================

/// A node considered by the brush outline.
#[derive(Debug, Clone)]
pub struct Describable<'a> {
    pub rect: Rect,
    pub depth: usize,
    pub description: &'a str,
}

/// Ctrl+drag polyline.
#[derive(Debug, Default)]
pub struct Brush {
    points: Vec<Vec2f>,
    active: bool,
}

impl Brush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn points(&self) -> &[Vec2f] {
        &self.points
    }

    pub fn start(&mut self, p: Vec2i) {
        self.points.clear();
        self.points.push(p.to_f());
        self.active = true;
    }

    pub fn add(&mut self, p: Vec2i) {
        if !self.active {
            return;
        }
        let p = p.to_f();
        if self.points.last() != Some(&p) {
            self.points.push(p);
        }
    }

    /// End the stroke and return its bounding rect.
    pub fn finish(&mut self) -> Option<Rect> {
        if !self.active {
            return None;
        }
        self.active = false;
        let rect = Rect::bounding(&self.points);
        self.points.clear();
        Some(rect)
    }
}

/// Outline of the nodes `bounds` covers by at least half their own area,
/// each description indented by its depth.
pub fn outline<'a>(bounds: Rect, nodes: impl IntoIterator<Item = Describable<'a>>) -> String {
    let mut out = String::new();
    for node in nodes {
        if node.description.is_empty() || node.rect.is_empty() {
            continue;
        }
        let covered = bounds.intersect(&node.rect).area();
        if covered * 2 < node.rect.area() {
            continue;
        }
        for line in node.description.lines() {
            out.push_str(&"  ".repeat(node.depth));
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
