//! Paint buffer.
//!
//! Immediate-mode list of primitives. Every item is stamped with the depth
//! and clip in effect when it was recorded; [`PaintBuffer::finish`] returns
//! the items stably sorted by depth so later layers (dialogs, overlays)
//! always land on top.

use std::sync::Arc;

use crate::primitives::{Color, Rect, Vec2f, Vec2i};
use crate::render::TextureId;
use crate::text::{FontProps, ShapedText};

/// First depth reserved for overlays.
pub const OVERLAY_DEPTH: u32 = 900;
pub const TOOLTIP_DEPTH: u32 = 910;
pub const BRUSH_DEPTH: u32 = 920;
pub const DEBUG_DEPTH: u32 = 930;
pub const STATS_DEPTH: u32 = 940;

/// Width of the caret-line indicator drawn for empty lines.
pub const EMPTY_LINE_MARK: i32 = 2;

/// A shaped text block ready to draw.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub text: Arc<str>,
    pub shaped: Arc<ShapedText>,
    pub props: FontProps,
    /// Top-left of the first line.
    pub origin: Vec2i,
    pub line_height: i32,
    pub ascent: i32,
    /// Per-line horizontal offsets (alignment), parallel to `shaped.lines`.
    pub line_offsets: Vec<i32>,
}

#[derive(Debug, Clone)]
pub enum Primitive {
    Rect { rect: Rect, color: Color },
    RoundedRect { rect: Rect, radius: f32, color: Color },
    Border { rect: Rect, thickness: i32, radius: f32, color: Color },
    Line { a: Vec2f, b: Vec2f, thickness: f32, color: Color },
    /// Cubic curve. `dash` 0 = solid; `offset` shifts the curve along its normal.
    Bezier { points: [Vec2f; 4], thickness: f32, dash: f32, offset: f32, color: Color },
    Circle { center: Vec2f, radius: f32, thickness: f32, filled: bool, color: Color },
    Image { rect: Rect, texture: TextureId, tint: Color },
    Text { run: TextRun },
    TextBackground { rect: Rect, color: Color },
    TextCursor { rect: Rect, color: Color },
    /// Polyline of soft circles.
    Brush { points: Vec<Vec2f>, thickness: f32, color: Color },
}

#[derive(Debug, Clone)]
pub struct PaintItem {
    pub depth: u32,
    pub clip: Rect,
    pub primitive: Primitive,
}

#[derive(Debug, Default)]
pub struct PaintBuffer {
    items: Vec<PaintItem>,
    clip: Rect,
    depth: u32,
}

impl PaintBuffer {
    pub fn new(screen: Rect) -> Self {
        Self { items: Vec::new(), clip: screen, depth: 0 }
    }

    /// Start a new frame.
    pub fn reset(&mut self, screen: Rect) {
        self.items.clear();
        self.clip = screen;
        self.depth = 0;
    }

    pub fn clip(&self) -> Rect {
        self.clip
    }

    /// Set the clip and return the previous one for restoring.
    pub fn push_clip(&mut self, clip: Rect) -> Rect {
        std::mem::replace(&mut self.clip, clip)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Move to the next layer (below the overlay range).
    pub fn next_layer(&mut self) -> u32 {
        if self.depth + 1 < OVERLAY_DEPTH {
            self.depth += 1;
        }
        self.depth
    }

    /// Set the depth explicitly; returns the previous depth.
    pub fn set_depth(&mut self, depth: u32) -> u32 {
        std::mem::replace(&mut self.depth, depth)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push(&mut self, primitive: Primitive) {
        self.items.push(PaintItem { depth: self.depth, clip: self.clip, primitive });
    }

    pub fn rect(&mut self, rect: Rect, color: Color) {
        if !rect.is_empty() && color.a > 0 {
            self.push(Primitive::Rect { rect, color });
        }
    }

    pub fn rounded_rect(&mut self, rect: Rect, radius: f32, color: Color) {
        if !rect.is_empty() && color.a > 0 {
            self.push(Primitive::RoundedRect { rect, radius, color });
        }
    }

    pub fn border(&mut self, rect: Rect, thickness: i32, radius: f32, color: Color) {
        if !rect.is_empty() && thickness > 0 {
            self.push(Primitive::Border { rect, thickness, radius, color });
        }
    }

    pub fn line(&mut self, a: Vec2f, b: Vec2f, thickness: f32, color: Color) {
        self.push(Primitive::Line { a, b, thickness, color });
    }

    pub fn bezier(&mut self, points: [Vec2f; 4], thickness: f32, dash: f32, offset: f32, color: Color) {
        self.push(Primitive::Bezier { points, thickness, dash, offset, color });
    }

    pub fn circle(&mut self, center: Vec2f, radius: f32, thickness: f32, filled: bool, color: Color) {
        self.push(Primitive::Circle { center, radius, thickness, filled, color });
    }

    pub fn image(&mut self, rect: Rect, texture: TextureId, tint: Color) {
        self.push(Primitive::Image { rect, texture, tint });
    }

    pub fn text(&mut self, run: TextRun) {
        self.push(Primitive::Text { run });
    }

    pub fn text_background(&mut self, rect: Rect, color: Color) {
        self.push(Primitive::TextBackground { rect, color });
    }

    pub fn text_cursor(&mut self, rect: Rect, color: Color) {
        self.push(Primitive::TextCursor { rect, color });
    }

    pub fn brush(&mut self, points: Vec<Vec2f>, thickness: f32, color: Color) {
        if !points.is_empty() {
            self.push(Primitive::Brush { points, thickness, color });
        }
    }

    /// Selection highlight for a text run.
    ///
    /// Non-empty selections get one rect per touched line. An empty line
    /// inside a multi-line control gets a narrow mark so the caret line
    /// stays visible.
    pub fn selection(&mut self, run: &TextRun, selection: (usize, usize), multiline: bool, color: Color) {
        let (start, end) = (selection.0.min(selection.1), selection.0.max(selection.1));
        let shaped = &run.shaped;
        for (i, line) in shaped.lines.iter().enumerate() {
            let y = run.origin.y + i as i32 * run.line_height;
            let dx = run.origin.x + run.line_offsets.get(i).copied().unwrap_or(0);
            if start < end {
                let s = start.max(line.start);
                let e = end.min(line.end);
                let covers_break = end > line.end && start <= line.end;
                if s >= e && !covers_break {
                    continue;
                }
                let x0 = (shaped.pos(s.min(line.end)) - shaped.pos(line.start)).round() as i32;
                let mut x1 = (shaped.pos(e.max(s)) - shaped.pos(line.start)).round() as i32;
                if covers_break && x1 == x0 {
                    x1 += EMPTY_LINE_MARK;
                }
                self.text_background(Rect::new(dx + x0, y, x1 - x0, run.line_height), color);
            } else if multiline && line.is_empty() && line.start == start {
                self.text_background(Rect::new(dx, y, EMPTY_LINE_MARK, run.line_height), color);
            }
        }
    }

    /// Items sorted by depth, recording order kept within a depth.
    pub fn finish(&mut self) -> Vec<PaintItem> {
        let mut items = std::mem::take(&mut self.items);
        items.sort_by_key(|item| item.depth);
        items
    }

    pub fn items(&self) -> &[PaintItem] {
        &self.items
    }
}
