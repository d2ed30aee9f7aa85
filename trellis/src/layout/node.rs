//! Layout tree.
//!
//! Nodes live in an arena rebuilt every frame. Identity across frames is the
//! node hash; everything that must survive a frame (scroll offsets, resizer
//! values, focus, pointer capture) is keyed by it.

use std::collections::HashMap;

use crate::cursor::CursorShape;
use crate::hash::NodeHash;
use crate::input::DropZones;
use crate::layout::array::{LayoutArray, MAX_GRID_CELLS};
use crate::primitives::{Align, Color, Rect, RectF, Vec2f};
use crate::scroll_state::ScrollState;
use crate::widgets::Widget;

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Per-frame life cycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Phase {
    #[default]
    Built,
    Solved,
    InputUpdated,
    Drawn,
}

/// Cell range of a node inside its parent grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl GridPos {
    /// Positions are clamped into the largest grid an array may declare.
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        let cells = MAX_GRID_CELLS as i32;
        Self { x: x.clamp(0, cells - 1), y: y.clamp(0, cells - 1), w: w.clamp(1, cells), h: h.clamp(1, cells) }
    }
}

/// Text drawn by a guest.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestText {
    pub text: String,
    pub font: String,
    /// Height in cells.
    pub height: f32,
    pub weight: u16,
    pub italic: bool,
    pub color: Color,
    pub align: (Align, Align),
    pub formatting: bool,
    pub wrap: bool,
}

/// A guest paint command. Rects are fractions (0..1) of the node rect;
/// radius, thickness and margin are in cells.
#[derive(Debug, Clone, PartialEq)]
pub enum GuestPaint {
    Rect { rect: RectF, color: Color, radius: f32, border: f32 },
    Line { a: Vec2f, b: Vec2f, thickness: f32, color: Color },
    Bezier { points: [Vec2f; 4], thickness: f32, dash: f32, offset: f32, color: Color },
    Circle { center: Vec2f, radius: f32, thickness: f32, color: Color },
    File { rect: RectF, path: String, align: (Align, Align), scale: (f32, f32), translate: (f32, f32) },
    Blob { rect: RectF, bytes: std::sync::Arc<Vec<u8>>, align: (Align, Align), scale: (f32, f32), translate: (f32, f32) },
    Text { rect: RectF, text: GuestText },
    Cursor { rect: RectF, color: Color },
    Tooltip { rect: RectF, text: String },
    Brush { points: Vec<Vec2f>, thickness: f32, color: Color },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub hash: NodeHash,
    pub name: String,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub grid: GridPos,
    pub cols: LayoutArray,
    pub rows: LayoutArray,
    pub children: Vec<NodeId>,
    pub scroll_v: ScrollState,
    pub scroll_h: ScrollState,
    /// Pixel box in screen coordinates.
    pub rect: Rect,
    /// Visible part of the box (box ∩ ancestor viewports).
    pub crop: Rect,
    /// Scrolled content extent; children are positioned inside it.
    pub canvas: Rect,
    /// Box minus the scrollbar strips.
    pub viewport: Rect,
    pub enabled: bool,
    pub drag: Option<(String, i64)>,
    pub drop: Option<(String, i64, DropZones)>,
    pub widget: Option<Widget>,
    pub paint: Vec<GuestPaint>,
    pub tooltip: Option<String>,
    pub cursor: Option<CursorShape>,
    pub description: String,
    /// Style id in effect when the node was declared.
    pub style: usize,
    /// Render another app into this node after the guest returns.
    pub delegate: Option<String>,
    pub phase: Phase,
}

impl Node {
    pub fn new(hash: NodeHash, name: &str, parent: Option<NodeId>, depth: usize, grid: GridPos) -> Self {
        Self {
            hash,
            name: name.to_string(),
            parent,
            depth,
            grid,
            cols: LayoutArray::new(),
            rows: LayoutArray::new(),
            children: Vec::new(),
            scroll_v: ScrollState::new(),
            scroll_h: ScrollState::new(),
            rect: Rect::ZERO,
            crop: Rect::ZERO,
            canvas: Rect::ZERO,
            viewport: Rect::ZERO,
            enabled: true,
            drag: None,
            drop: None,
            widget: None,
            paint: Vec::new(),
            tooltip: None,
            cursor: None,
            description: String::new(),
            style: 0,
            delegate: None,
            phase: Phase::Built,
        }
    }

    pub fn array(&self, vertical: bool) -> &LayoutArray {
        if vertical { &self.rows } else { &self.cols }
    }

    pub fn array_mut(&mut self, vertical: bool) -> &mut LayoutArray {
        if vertical { &mut self.rows } else { &mut self.cols }
    }

    pub fn scroll(&self, vertical: bool) -> &ScrollState {
        if vertical { &self.scroll_v } else { &self.scroll_h }
    }

    pub fn scroll_mut(&mut self, vertical: bool) -> &mut ScrollState {
        if vertical { &mut self.scroll_v } else { &mut self.scroll_h }
    }

    /// Vertical scrollbar strip (screen pixels), when shown.
    pub fn bar_v(&self, cell: f32) -> Option<Rect> {
        if !self.scroll_v.is_shown() {
            return None;
        }
        let w = self.scroll_v.bar_width(cell);
        Some(Rect::new(self.viewport.right(), self.viewport.y, w, self.viewport.h))
    }

    pub fn bar_h(&self, cell: f32) -> Option<Rect> {
        if !self.scroll_h.is_shown() {
            return None;
        }
        let h = self.scroll_h.bar_width(cell);
        Some(Rect::new(self.viewport.x, self.viewport.bottom(), self.viewport.w, h))
    }

    /// Description for the brush outline: explicit text, else the widget's.
    pub fn describe(&self) -> String {
        if !self.description.is_empty() {
            return self.description.clone();
        }
        self.widget.as_ref().map(Widget::describe).unwrap_or_default()
    }

    /// Whether grid and children may still change.
    pub fn is_mutable(&self) -> bool {
        self.phase == Phase::Built
    }
}

/// Arena of nodes for one frame.
#[derive(Debug, Default)]
pub struct NodeTree {
    nodes: Vec<Node>,
    by_hash: HashMap<NodeHash, NodeId>,
    /// Occurrence counters of duplicate hashes.
    duplicates: HashMap<NodeHash, u64>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_hash.clear();
        self.duplicates.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a root (main window or dialog).
    pub fn add_root(&mut self, hash: NodeHash, name: &str) -> NodeId {
        let hash = self.unique(hash);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(hash, name, None, 0, GridPos::new(0, 0, 1, 1)));
        self.by_hash.insert(hash, id);
        id
    }

    /// Add a child of `parent`. The parent's arrays grow to cover the
    /// declared position.
    pub fn add_child(&mut self, parent: NodeId, name: &str, grid: GridPos) -> NodeId {
        let (parent_hash, depth) = {
            let p = &mut self.nodes[parent.0];
            p.cols.ensure(grid.x.saturating_add(grid.w).max(0) as usize);
            p.rows.ensure(grid.y.saturating_add(grid.h).max(0) as usize);
            (p.hash, p.depth + 1)
        };
        let hash = self.unique(parent_hash.child(name, grid.x, grid.y, grid.w, grid.h));
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(hash, name, Some(parent), depth, grid);
        node.style = self.nodes[parent.0].style;
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        self.by_hash.insert(hash, id);
        id
    }

    /// Rename duplicates by mixing an occurrence counter.
    fn unique(&mut self, hash: NodeHash) -> NodeHash {
        if !self.by_hash.contains_key(&hash) {
            return hash;
        }
        let count = self.duplicates.entry(hash).or_insert(0);
        let mut renamed = hash;
        while self.by_hash.contains_key(&renamed) {
            *count += 1;
            renamed = hash.mix(*count);
        }
        tracing::debug!(%hash, %renamed, "duplicate node hash renamed");
        renamed
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn find(&self, hash: NodeHash) -> Option<NodeId> {
        self.by_hash.get(&hash).copied()
    }

    pub fn node(&self, hash: NodeHash) -> Option<&Node> {
        self.find(hash).map(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Nodes of the subtree rooted at `root` in declaration order.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.get(id).children.iter().rev().copied());
        }
        out
    }

    /// Path from `root` to the deepest node whose crop contains `p`.
    /// Later siblings win over earlier ones (drawn on top).
    pub fn hit_path(&self, root: NodeId, p: crate::primitives::Vec2i) -> Vec<NodeId> {
        let mut path = Vec::new();
        if !self.get(root).crop.inside(p) {
            return path;
        }
        let mut cur = root;
        path.push(cur);
        loop {
            let next = self.get(cur).children.iter().rev().copied().find(|&c| self.get(c).crop.inside(p));
            match next {
                Some(c) => {
                    path.push(c);
                    cur = c;
                }
                None => return path,
            }
        }
    }

    pub fn set_phase(&mut self, root: NodeId, phase: Phase) {
        for id in self.subtree(root) {
            self.get_mut(id).phase = phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Vec2i;

    #[test]
    fn children_grow_parent_arrays() {
        let mut tree = NodeTree::new();
        let root = tree.add_root(NodeHash::ROOT, "root");
        tree.add_child(root, "a", GridPos::new(2, 1, 2, 1));
        assert_eq!(tree.get(root).cols.len(), 4);
        assert_eq!(tree.get(root).rows.len(), 2);
    }

    #[test]
    fn duplicate_hashes_are_renamed() {
        let mut tree = NodeTree::new();
        let root = tree.add_root(NodeHash::ROOT, "root");
        let a = tree.add_child(root, "same", GridPos::new(0, 0, 1, 1));
        let b = tree.add_child(root, "same", GridPos::new(0, 0, 1, 1));
        let c = tree.add_child(root, "same", GridPos::new(0, 0, 1, 1));
        let hashes = [tree.get(a).hash, tree.get(b).hash, tree.get(c).hash];
        assert_ne!(hashes[0], hashes[1]);
        assert_ne!(hashes[1], hashes[2]);
        assert_ne!(hashes[0], hashes[2]);
        assert_eq!(tree.find(hashes[2]), Some(c));
    }

    #[test]
    fn hit_path_prefers_later_siblings() {
        let mut tree = NodeTree::new();
        let root = tree.add_root(NodeHash::ROOT, "root");
        let a = tree.add_child(root, "a", GridPos::new(0, 0, 1, 1));
        let b = tree.add_child(root, "b", GridPos::new(0, 0, 1, 1));
        for id in [root, a, b] {
            tree.get_mut(id).crop = Rect::new(0, 0, 100, 100);
        }
        assert_eq!(tree.hit_path(root, Vec2i::new(5, 5)), vec![root, b]);
        assert!(tree.hit_path(root, Vec2i::new(500, 5)).is_empty());
    }

    #[test]
    fn subtree_is_declaration_order() {
        let mut tree = NodeTree::new();
        let root = tree.add_root(NodeHash::ROOT, "root");
        let a = tree.add_child(root, "a", GridPos::new(0, 0, 1, 1));
        let a1 = tree.add_child(a, "a1", GridPos::new(0, 0, 1, 1));
        let b = tree.add_child(root, "b", GridPos::new(1, 0, 1, 1));
        assert_eq!(tree.subtree(root), vec![root, a, a1, b]);
    }

    #[test]
    fn far_grid_coordinates_are_clamped() {
        let mut tree = NodeTree::new();
        let root = tree.add_root(NodeHash::ROOT, "root");
        tree.add_child(root, "far", GridPos::new(i32::MAX, i32::MIN, 5, i32::MAX));
        assert_eq!(tree.get(root).cols.len(), MAX_GRID_CELLS);
        assert_eq!(tree.get(root).rows.len(), MAX_GRID_CELLS);
    }
}
