//! Frame orchestration.
//!
//! A frame is `begin_frame`, any number of build calls, then `finish`, which
//! solves sizes, handles input and draws. Input is evaluated against the
//! geometry solved in the same frame and reported back through the build
//! API during the next frame, keyed by node hash.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::cursor::CursorShape;
use crate::edit::{EditFlags, EditState};
use crate::hash::NodeHash;
use crate::image_cache::{Decoder, ImageCache, ImageCrateDecoder, ImageStatus, place};
use crate::input::{
    Arbiter, DragDrop, DragSource, DropEvent, DropTarget, DropZones, InputFrame, Key, KeyEvent, ResizerGrab, Slot,
};
use crate::layout::{
    DialogAnchor, DialogStack, GridPos, GuestPaint, Node, NodeId, NodeTree, Phase, dialog_path, place_dialog,
};
use crate::overlay::{Brush, Describable, Tooltip, outline, place_tooltip};
use crate::paint::{BRUSH_DEPTH, DEBUG_DEPTH, PaintBuffer, PaintItem, STATS_DEPTH, TOOLTIP_DEPTH, TextRun};
use crate::primitives::{Align, Color, Rect, RectF, Vec2f, Vec2i};
use crate::render::TextureStore;
use crate::scroll_state::ScrollKey;
use crate::settings::Settings;
use crate::stats::{FrameStats, Phase as StatPhase};
use crate::text::{FixedFontLoader, FontLoader, FontProps, TextEngine};
use crate::widgets::{DrawCtx, Widget, WidgetInput, WidgetResult, WidgetStyle};

pub const DEFAULT_DPI: f32 = 100.0;
const MIN_DPI: f32 = 30.0;
const MAX_DPI: f32 = 600.0;

/// Pixels per cell at a DPI.
pub fn cell_for_dpi(dpi: f32) -> f32 {
    dpi / 2.5
}

/// Geometry of a node as of the last solved frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NodeInfo {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub crop_x: i32,
    pub crop_y: i32,
    pub crop_w: i32,
    pub crop_h: i32,
    pub cell: f32,
    pub scroll_v: i32,
    pub scroll_h: i32,
    pub data_v: i32,
    pub data_h: i32,
    pub hover: bool,
}

/// Pointer state relative to a node as of the last input pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TouchInfo {
    /// Pointer as a fraction of the node rect.
    pub x: f32,
    pub y: f32,
    pub inside: bool,
    /// Pressed on this node.
    pub down: bool,
    /// This node owns the pointer.
    pub held: bool,
    /// Released after pressing on this node.
    pub up: bool,
    pub clicks: u8,
    pub wheel_x: i32,
    pub wheel_y: i32,
}

/// What a finished frame hands to the host.
#[derive(Debug, Default)]
pub struct FrameOutput {
    pub items: Vec<PaintItem>,
    pub cursor: CursorShape,
    /// Text to put on the system clipboard.
    pub clipboard: Option<String>,
    /// Brush outline (also copied to the clipboard).
    pub outline: Option<String>,
    /// Ctrl+wheel zoom steps.
    pub dpi_steps: i32,
    /// Something is pending (images, tooltip delay, drags).
    pub redraw: bool,
}

#[derive(Debug, Clone)]
struct ComboPopup {
    owner: NodeHash,
    options: Vec<String>,
    selected: i64,
    rect: Rect,
}

pub struct Ui {
    pub text: TextEngine,
    pub images: ImageCache,
    pub settings: Settings,
    pub stats: FrameStats,
    dialogs: DialogStack,
    tree: NodeTree,
    main_root: Option<NodeId>,
    dialog_roots: Vec<(NodeHash, NodeId)>,
    stack: Vec<NodeId>,
    saved_stacks: Vec<Vec<NodeId>>,
    input: InputFrame,
    screen: Rect,
    dpi: f32,
    arbiter: Arbiter,
    dragdrop: DragDrop,
    edit: EditState,
    tooltip: Tooltip,
    brush: Brush,
    paint: PaintBuffer,
    combo: Option<ComboPopup>,
    results: HashMap<NodeHash, WidgetResult>,
    drops: HashMap<NodeHash, DropEvent>,
    infos: HashMap<NodeHash, NodeInfo>,
    touches: HashMap<NodeHash, TouchInfo>,
    styles: Vec<WidgetStyle>,
    current_style: usize,
    edit_order: u32,
    /// Thumb grab point of the scrollbar drag in progress.
    scroll_grab: i32,
    clipboard_in: String,
    clipboard_out: Option<String>,
    debug_lines: Vec<String>,
    phase: Phase,
    now: Instant,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new(Box::new(FixedFontLoader::new(8.0)), Arc::new(ImageCrateDecoder))
    }
}

impl Ui {
    pub fn new(fonts: Box<dyn FontLoader>, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            text: TextEngine::new(fonts),
            images: ImageCache::new(decoder),
            settings: Settings::new(),
            stats: FrameStats::new(),
            dialogs: DialogStack::new(),
            tree: NodeTree::new(),
            main_root: None,
            dialog_roots: Vec::new(),
            stack: Vec::new(),
            saved_stacks: Vec::new(),
            input: InputFrame::default(),
            screen: Rect::ZERO,
            dpi: DEFAULT_DPI,
            arbiter: Arbiter::new(),
            dragdrop: DragDrop::new(),
            edit: EditState::new(),
            tooltip: Tooltip::new(),
            brush: Brush::new(),
            paint: PaintBuffer::default(),
            combo: None,
            results: HashMap::new(),
            drops: HashMap::new(),
            infos: HashMap::new(),
            touches: HashMap::new(),
            styles: vec![WidgetStyle::default()],
            current_style: 0,
            edit_order: 0,
            scroll_grab: 0,
            clipboard_in: String::new(),
            clipboard_out: None,
            debug_lines: Vec::new(),
            phase: Phase::Drawn,
            now: Instant::now(),
        }
    }

    // =====================================================================
    // Accessors
    // =====================================================================

    pub fn cell(&self) -> f32 {
        cell_for_dpi(self.dpi)
    }

    pub fn dpi(&self) -> f32 {
        self.dpi
    }

    pub fn set_dpi(&mut self, dpi: f32) {
        self.dpi = dpi.clamp(MIN_DPI, MAX_DPI);
    }

    pub fn screen(&self) -> Rect {
        self.screen
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn edit_state(&self) -> &EditState {
        &self.edit
    }

    pub fn dialogs(&self) -> &DialogStack {
        &self.dialogs
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Replace settings (startup or app GUI blob).
    pub fn load_settings(&mut self, settings: Settings) {
        self.dialogs = DialogStack::from_entries(settings.dialogs.clone());
        self.settings = settings;
    }

    /// Settings with the current dialog stack, ready to persist.
    pub fn snapshot_settings(&mut self) -> &Settings {
        self.settings.dialogs = self.dialogs.entries().to_vec();
        &self.settings
    }

    /// Text the platform clipboard holds (paste source).
    pub fn set_clipboard_source(&mut self, text: String) {
        self.clipboard_in = text;
    }

    /// Debug lines recorded since the last call (arbitration losers).
    pub fn take_debug_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.debug_lines)
    }

    pub fn close_all_dialogs(&mut self) {
        self.dialogs.clear();
        self.combo = None;
    }

    // =====================================================================
    // Build API
    // =====================================================================

    pub fn begin_frame(&mut self, screen: Rect, input: InputFrame, now: Instant) {
        self.phase = Phase::Built;
        self.now = now;
        self.screen = screen;
        self.tree.clear();
        self.paint.reset(screen);
        self.dragdrop.begin_frame();
        self.tooltip.begin_frame(input.pointer, now);
        self.input = input;
        self.edit.tick();
        self.edit_order = 0;
        self.dialog_roots.clear();
        self.saved_stacks.clear();
        self.current_style = 0;
        self.images.poll();
        let root = self.tree.add_root(NodeHash::ROOT, "root");
        self.main_root = Some(root);
        self.stack = vec![root];
    }

    fn top(&self) -> Option<NodeId> {
        self.stack.last().copied()
    }

    /// Hash of the node being built.
    pub fn current(&self) -> NodeHash {
        self.top().map(|id| self.tree.get(id).hash).unwrap_or(NodeHash::NONE)
    }

    fn building(&self, op: &str) -> Option<NodeId> {
        let id = self.top()?;
        if self.phase != Phase::Built || !self.tree.get(id).is_mutable() {
            tracing::warn!(op, phase = ?self.phase, "layout mutation outside the build phase ignored");
            return None;
        }
        Some(id)
    }

    fn div_axis(&mut self, vertical: bool, pos: usize, min: f32, max: f32, resize: Option<f32>) {
        let Some(id) = self.building(if vertical { "div_row" } else { "div_col" }) else {
            return;
        };
        let hash = self.tree.get(id).hash;
        let resize = resize.map(|v| self.settings.resize(hash, vertical, pos).unwrap_or(v));
        self.tree.get_mut(id).array_mut(vertical).set(pos, min, max, resize);
    }

    /// Declare column `pos`. `resize` makes it user-resizable with that
    /// initial value (cells); a persisted value wins.
    pub fn div_col(&mut self, pos: usize, min: f32, max: f32, resize: Option<f32>) {
        self.div_axis(false, pos, min, max, resize);
    }

    pub fn div_row(&mut self, pos: usize, min: f32, max: f32, resize: Option<f32>) {
        self.div_axis(true, pos, min, max, resize);
    }

    pub fn div_fill(&mut self, col: Option<usize>, row: Option<usize>) {
        let Some(id) = self.building("div_fill") else {
            return;
        };
        let node = self.tree.get_mut(id);
        if let Some(c) = col {
            node.cols.set_fill(c);
        }
        if let Some(r) = row {
            node.rows.set_fill(r);
        }
    }

    /// Open a child node covering cells `x..x+w`, `y..y+h`.
    pub fn div_start(&mut self, x: i32, y: i32, w: i32, h: i32, name: &str) -> NodeHash {
        let Some(parent) = self.building("div_start") else {
            return NodeHash::NONE;
        };
        let id = self.tree.add_child(parent, name, GridPos::new(x, y, w, h));
        let (v, hz) = {
            let hash = self.tree.get(id).hash;
            self.settings.scroll(hash)
        };
        let style = self.current_style;
        let node = self.tree.get_mut(id);
        node.scroll_v.wheel = v;
        node.scroll_h.wheel = hz;
        node.style = style;
        let hash = node.hash;
        self.stack.push(id);
        hash
    }

    pub fn div_end(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        } else {
            tracing::warn!("div_end without matching div_start");
        }
    }

    /// Re-open a node declared earlier this frame (render delegation).
    pub fn enter(&mut self, hash: NodeHash) -> bool {
        match self.tree.find(hash) {
            Some(id) if self.phase == Phase::Built => {
                self.saved_stacks.push(std::mem::replace(&mut self.stack, vec![id]));
                true
            }
            _ => false,
        }
    }

    /// Leave a node opened with [`Ui::enter`] or [`Ui::dialog_start`].
    pub fn leave(&mut self) {
        if let Some(saved) = self.saved_stacks.pop() {
            self.stack = saved;
        }
    }

    /// Last solved geometry of the current node.
    pub fn div_info(&self) -> NodeInfo {
        self.infos.get(&self.current()).copied().unwrap_or(NodeInfo { cell: self.cell(), ..Default::default() })
    }

    /// Pointer state of the current node from the last input pass.
    pub fn div_touch(&self) -> TouchInfo {
        self.touches.get(&self.current()).copied().unwrap_or_default()
    }

    /// Set a node attribute: `scroll_v`, `scroll_h` (pixels), `enable`, `narrow`.
    pub fn div_set(&mut self, key: &str, value: f64) -> bool {
        let Some(id) = self.top() else {
            return false;
        };
        let hash = self.tree.get(id).hash;
        match key {
            "scroll_v" | "scroll_h" => {
                let vertical = key == "scroll_v";
                let (mut v, mut h) = self.settings.scroll(hash);
                if vertical {
                    v = value.max(0.0) as i32;
                } else {
                    h = value.max(0.0) as i32;
                }
                self.settings.set_scroll(hash, v, h);
                let node = self.tree.get_mut(id);
                node.scroll_mut(vertical).wheel = if vertical { v } else { h };
            }
            "enable" => self.tree.get_mut(id).enabled = value != 0.0,
            "narrow" => {
                let node = self.tree.get_mut(id);
                node.scroll_v.narrow = value != 0.0;
                node.scroll_h.narrow = value != 0.0;
            }
            _ => return false,
        }
        true
    }

    fn with_current(&mut self, f: impl FnOnce(&mut Node)) {
        if let Some(id) = self.top() {
            f(self.tree.get_mut(id));
        }
    }

    pub fn div_cursor(&mut self, shape: CursorShape) {
        self.with_current(|n| n.cursor = Some(shape));
    }

    pub fn div_tooltip(&mut self, text: &str) {
        self.with_current(|n| n.tooltip = Some(text.to_string()));
    }

    pub fn div_describe(&mut self, text: &str) {
        self.with_current(|n| n.description = text.to_string());
    }

    pub fn div_drag(&mut self, group: &str, index: i64) {
        self.with_current(|n| n.drag = Some((group.to_string(), index)));
    }

    /// Declare the current node a drop target. Returns the drop it received
    /// during the last input pass.
    pub fn div_drop(&mut self, group: &str, index: i64, zones: DropZones) -> Option<DropEvent> {
        let hash = self.current();
        self.with_current(|n| n.drop = Some((group.to_string(), index, zones)));
        self.drops.get(&hash).copied()
    }

    /// Ask the host to render another app into the current node.
    pub fn delegate(&mut self, app: &str) {
        self.with_current(|n| n.delegate = Some(app.to_string()));
    }

    /// Delegations recorded this frame.
    pub fn delegations(&self) -> Vec<(NodeHash, String)> {
        self.tree.iter().filter_map(|(_, n)| n.delegate.clone().map(|d| (n.hash, d))).collect()
    }

    // =====================================================================
    // Dialogs
    // =====================================================================

    pub fn dialog_open(&mut self, name: &str, anchor: DialogAnchor) {
        let path = dialog_path(self.current(), name);
        let anchor = match anchor {
            DialogAnchor::Node(h) if h.is_none() => DialogAnchor::Node(self.current()),
            other => other,
        };
        self.dialogs.open(path, anchor);
    }

    pub fn dialog_close(&mut self, name: &str) -> bool {
        self.dialogs.close(dialog_path(self.current(), name))
    }

    pub fn dialog_is_open(&self, name: &str) -> bool {
        self.dialogs.is_open(dialog_path(self.current(), name))
    }

    /// Begin building an open dialog. Must be paired with [`Ui::dialog_end`]
    /// when it returns true.
    pub fn dialog_start(&mut self, name: &str) -> bool {
        let path = dialog_path(self.current(), name);
        if !self.dialogs.is_open(path) || self.phase != Phase::Built {
            return false;
        }
        let root = self.tree.add_root(path, name);
        let style = self.current_style;
        self.tree.get_mut(root).style = style;
        let root_hash = self.tree.get(root).hash;
        self.dialog_roots.push((root_hash, root));
        self.saved_stacks.push(std::mem::replace(&mut self.stack, vec![root]));
        true
    }

    pub fn dialog_end(&mut self) {
        self.leave();
    }

    // =====================================================================
    // Paint and widgets
    // =====================================================================

    pub fn paint(&mut self, cmd: GuestPaint) {
        self.with_current(|n| n.paint.push(cmd));
    }

    /// Unwrapped width of `text` in pixels.
    pub fn text_width(&mut self, text: &str, props: &FontProps, formatting: bool) -> f32 {
        self.text.text_width(text, props, formatting, self.now)
    }

    pub fn style_register(&mut self, style: WidgetStyle) -> usize {
        self.styles.push(style);
        self.styles.len() - 1
    }

    pub fn style_use(&mut self, id: usize) -> bool {
        if id >= self.styles.len() {
            return false;
        }
        self.current_style = id;
        self.with_current(|n| n.style = id);
        true
    }

    fn widget(&mut self, widget: Widget) -> Option<WidgetResult> {
        let hash = self.current();
        self.with_current(|n| n.widget = Some(widget));
        self.results.get(&hash).cloned()
    }

    pub fn button(&mut self, label: &str, enabled: bool) -> bool {
        matches!(self.widget(Widget::Button { label: label.into(), enabled }), Some(WidgetResult::Clicked))
    }

    pub fn slider(&mut self, value: f64, min: f64, max: f64, step: f64) -> f64 {
        match self.widget(Widget::Slider { value, min, max, step }) {
            Some(WidgetResult::Value(v)) => v,
            _ => value,
        }
    }

    pub fn progress(&mut self, value: f64) {
        self.widget(Widget::Progress { value });
    }

    pub fn text_widget(&mut self, text: &str, align: Align, selectable: bool, formatting: bool) {
        self.widget(Widget::Text { text: text.into(), align, selectable, formatting });
    }

    /// Edit box. Returns the committed value, once per commit.
    pub fn edit(&mut self, value: &str, multiline: bool, formatting: bool) -> Option<String> {
        let hash = self.current();
        let order = self.edit_order;
        self.edit_order += 1;
        if self.edit.activate_next == Some(order) {
            self.edit.activate_next = None;
            let flags = EditFlags { multiline, formatting, tab_is_char: false };
            if let Some(commit) = self.edit.set_focus(hash, value, flags, order) {
                self.results.insert(commit.0, WidgetResult::Committed(commit.1));
            }
            self.edit.select_all();
        }
        self.edit.sync(hash, value);
        match self.widget(Widget::Edit { value: value.into(), multiline, formatting }) {
            Some(WidgetResult::Committed(s)) => Some(s),
            _ => None,
        }
    }

    pub fn combo(&mut self, options: &str, selected: i64) -> i64 {
        match self.widget(Widget::Combo { options: Widget::split_options(options), selected }) {
            Some(WidgetResult::Selected(i)) => i,
            _ => selected,
        }
    }

    pub fn checkbox(&mut self, label: &str, checked: bool) -> bool {
        match self.widget(Widget::Checkbox { label: label.into(), checked }) {
            Some(WidgetResult::Toggled(b)) => b,
            _ => checked,
        }
    }

    // =====================================================================
    // Input queries
    // =====================================================================

    /// Whether a key (by name, e.g. `Enter`, `a`, `F5`) was pressed this frame.
    pub fn key_pressed(&self, name: &str) -> bool {
        self.input.keys.iter().any(|k| k.key.name().eq_ignore_ascii_case(name))
    }

    /// Pointer position in screen pixels.
    pub fn pointer(&self) -> Vec2i {
        self.input.pointer
    }

    pub fn typed_text(&self) -> &str {
        &self.input.text
    }

    pub fn clipboard_get(&self) -> &str {
        &self.clipboard_in
    }

    pub fn clipboard_set(&mut self, text: &str) {
        self.clipboard_out = Some(text.to_string());
    }

    // =====================================================================
    // Finish: solve, input, draw
    // =====================================================================

    pub fn finish(&mut self, textures: &mut dyn TextureStore, now: Instant) -> FrameOutput {
        self.now = now;
        if self.stack.len() > 1 || !self.saved_stacks.is_empty() {
            tracing::debug!(open = self.stack.len() - 1, "unbalanced div_start at frame end");
        }
        let Some(main) = self.main_root else {
            return FrameOutput::default();
        };

        let t = Instant::now();
        self.solve_roots(main);
        self.stats.record(StatPhase::Solve, t.elapsed());

        let t = Instant::now();
        let mut out = FrameOutput::default();
        self.handle_input(main, &mut out);
        self.stats.record(StatPhase::Input, t.elapsed());

        let t = Instant::now();
        self.draw(main, textures, &mut out);
        self.stats.record(StatPhase::Draw, t.elapsed());

        self.record_infos();
        self.text.evict(textures, now);
        self.images.evict(textures, now);

        out.items = self.paint.finish();
        out.clipboard = self.clipboard_out.take().or(out.clipboard);
        out.redraw |= self.images.take_redraw() || self.brush.is_active() || self.dragdrop.is_active();
        self.stats.counts(self.tree.len(), out.items.len());
        self.stats.end_frame();
        self.phase = Phase::Drawn;
        out
    }

    /// Roots in input priority order: combo popup aside, topmost dialog first.
    fn roots_top_down(&self, main: NodeId) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .dialogs
            .entries()
            .iter()
            .rev()
            .filter_map(|e| self.dialog_roots.iter().find(|(h, _)| *h == e.path).map(|(_, id)| *id))
            .collect();
        roots.push(main);
        roots
    }

    fn solve_roots(&mut self, main: NodeId) {
        let screen = self.screen;
        self.solve_root(main, screen, screen);
        let cell = self.cell();
        for entry in self.dialogs.entries().to_vec() {
            let Some(&(_, root)) = self.dialog_roots.iter().find(|(h, _)| *h == entry.path) else {
                continue;
            };
            let size = {
                let node = self.tree.get_mut(root);
                node.cols.ensure(1);
                node.rows.ensure(1);
                node.cols.solve(cell, 0);
                node.rows.solve(cell, 0);
                Vec2i::new(node.cols.total(), node.rows.total())
            };
            let anchor = match (entry.parent, entry.touch) {
                (Some(h), _) => self.tree.node(h).map(|n| n.rect),
                (None, Some(p)) => Some(Rect::new(p.x, p.y, 1, 1)),
                (None, None) => None,
            };
            let rect = place_dialog(size, anchor, screen);
            self.solve_root(root, rect, screen);
        }
    }

    fn solve_root(&mut self, root: NodeId, rect: Rect, clip: Rect) {
        {
            let node = self.tree.get_mut(root);
            node.rect = rect;
            node.crop = rect.intersect(&clip);
        }
        let mut order = vec![root];
        while let Some(id) = order.pop() {
            self.solve_node(id);
            order.extend(self.tree.get(id).children.iter().rev().copied());
        }
    }

    /// Size the grid of `id` and position its children. The node's own
    /// rect and crop are already set.
    fn solve_node(&mut self, id: NodeId) {
        let cell = self.cell();
        let children: Vec<(NodeId, GridPos)> =
            self.tree.get(id).children.iter().map(|&c| (c, self.tree.get(c).grid)).collect();
        let node = self.tree.get_mut(id);
        let rect = node.rect;

        let (mut bar_v, mut bar_h) = (false, false);
        let mut viewport = rect;
        let mut data = Vec2i::ZERO;
        for _ in 0..3 {
            let bw_v = if bar_v { node.scroll_v.bar_width(cell) } else { 0 };
            let bw_h = if bar_h { node.scroll_h.bar_width(cell) } else { 0 };
            viewport = Rect::new(rect.x, rect.y, (rect.w - bw_v).max(0), (rect.h - bw_h).max(0));
            node.cols.solve(cell, viewport.w);
            node.rows.solve(cell, viewport.h);
            data = Vec2i::ZERO;
            for (_, g) in &children {
                let (x, w) = node.cols.range_px(g.x as usize, g.w as usize);
                let (y, h) = node.rows.range_px(g.y as usize, g.h as usize);
                data.x = data.x.max(x + w);
                data.y = data.y.max(y + h);
            }
            let need = (data.y > viewport.h, data.x > viewport.w);
            if need == (bar_v, bar_h) {
                break;
            }
            (bar_v, bar_h) = need;
        }
        node.scroll_v.set_extent(data.y, viewport.h);
        node.scroll_h.set_extent(data.x, viewport.w);
        node.viewport = viewport;
        node.canvas = Rect::new(
            viewport.x - node.scroll_h.wheel,
            viewport.y - node.scroll_v.wheel,
            data.x.max(viewport.w),
            data.y.max(viewport.h),
        );
        node.phase = Phase::Solved;
        let view_crop = viewport.intersect(&node.crop);
        let canvas = node.canvas;
        let boxes: Vec<(NodeId, Rect)> = children
            .iter()
            .map(|(c, g)| {
                let (x, w) = node.cols.range_px(g.x as usize, g.w as usize);
                let (y, h) = node.rows.range_px(g.y as usize, g.h as usize);
                (*c, Rect::new(canvas.x + x, canvas.y + y, w, h))
            })
            .collect();
        for (c, b) in boxes {
            let child = self.tree.get_mut(c);
            child.rect = b;
            child.crop = b.intersect(&view_crop);
        }
    }

    // =====================================================================
    // Input
    // =====================================================================

    fn handle_input(&mut self, main: NodeId, out: &mut FrameOutput) {
        let input = self.input.clone();
        let p = input.pointer;
        let now = self.now;
        let cell = self.cell();
        let mut results: HashMap<NodeHash, WidgetResult> = HashMap::new();
        self.touches.clear();

        for (_, node) in self.tree.iter() {
            if let Some((group, index)) = &node.drag {
                self.dragdrop.declare_source(DragSource { hash: node.hash, group: group.clone(), index: *index });
            }
            if let Some((group, index, zones)) = &node.drop {
                self.dragdrop.declare_target(DropTarget {
                    hash: node.hash,
                    group: group.clone(),
                    index: *index,
                    zones: *zones,
                    rect: node.crop,
                });
            }
        }

        let roots = self.roots_top_down(main);
        let active_root = roots[0];
        let path = self.tree.hit_path(active_root, p);
        let owner_before = self.arbiter.owner(Slot::Canvas);

        // Pointer down.
        let mut consumed = false;
        if input.down {
            if let Some(popup) = self.combo.take() {
                consumed = true;
                if popup.rect.inside(p) {
                    let row = ((p.y - popup.rect.y) / self.combo_row_height()).max(0) as i64;
                    if row < popup.options.len() as i64 && row != popup.selected {
                        results.insert(popup.owner, WidgetResult::Selected(row));
                    }
                }
            } else if active_root != main && !self.tree.get(active_root).crop.inside(p) {
                let popped = self.dialogs.pop();
                tracing::debug!(dialog = ?popped.map(|d| d.path), "outside click closed dialog");
                consumed = true;
            }
            if !consumed {
                self.press(&path, &input, &mut results);
            }
        }

        // Pointer held: deliver motion to the owner.
        if input.pressed && !input.down {
            self.motion(&input);
        }
        if self.brush.is_active() {
            self.brush.add(p);
        }

        // Widget input for the canvas owner and the hovered node.
        let owner = if input.down { self.arbiter.owner(Slot::Canvas) } else { owner_before };
        let mut candidates: Vec<NodeHash> = Vec::new();
        if !owner.is_none() {
            candidates.push(owner);
        }
        if let Some(&deepest) = path.last() {
            let h = self.tree.get(deepest).hash;
            if h != owner {
                candidates.push(h);
            }
        }
        for hash in candidates {
            let Some(node) = self.tree.node(hash) else { continue };
            let hovered = node.crop.inside(p);
            let is_owner = owner == hash;
            let wi = WidgetInput {
                rect: node.rect,
                pointer: p,
                hovered,
                held: is_owner && input.pressed,
                pressed: is_owner && input.down,
                clicked: is_owner && input.up && hovered,
                clicks: input.clicks,
            };
            let rect = node.rect;
            self.touches.insert(
                hash,
                TouchInfo {
                    x: (p.x - rect.x) as f32 / rect.w.max(1) as f32,
                    y: (p.y - rect.y) as f32 / rect.h.max(1) as f32,
                    inside: hovered,
                    down: wi.pressed,
                    held: wi.held,
                    up: is_owner && input.up,
                    clicks: input.clicks,
                    wheel_x: input.wheel.x,
                    wheel_y: input.wheel.y,
                },
            );
            if !node.enabled {
                continue;
            }
            let Some(widget) = node.widget.clone() else { continue };
            match widget.input(&wi) {
                Some(WidgetResult::OpenPopup) => {
                    if let Widget::Combo { options, selected } = widget {
                        let row = self.combo_row_height();
                        let size = Vec2i::new(rect.w, row * options.len().max(1) as i32);
                        let rect = place_dialog(size, Some(rect), self.screen);
                        self.combo = Some(ComboPopup { owner: hash, options, selected, rect });
                    }
                }
                Some(WidgetResult::Copy(text)) => out.clipboard = Some(text),
                Some(WidgetResult::Focus) | None => {}
                Some(res) => {
                    results.insert(hash, res);
                }
            }
        }

        // Pointer up.
        if input.up {
            if let Some(bounds) = self.brush.finish() {
                let tree = &self.tree;
                let descriptions: Vec<(Rect, usize, String)> = tree
                    .subtree(active_root)
                    .into_iter()
                    .map(|id| tree.get(id))
                    .map(|n| (n.crop, n.depth, n.describe()))
                    .collect();
                let text = outline(
                    bounds,
                    descriptions.iter().map(|(rect, depth, d)| Describable { rect: *rect, depth: *depth, description: d }),
                );
                if !text.is_empty() {
                    out.clipboard = Some(text.clone());
                    out.outline = Some(text);
                }
            }
            self.drops.clear();
            if let Some(event) = self.dragdrop.release(p) {
                self.drops.insert(event.dst_source, event);
            }
            for slot in [Slot::ScrollV, Slot::ScrollH] {
                let h = self.arbiter.owner(slot);
                if let Some(id) = self.tree.find(h) {
                    self.tree.get_mut(id).scroll_mut(slot == Slot::ScrollV).end_drag();
                }
            }
            self.arbiter.release_all();
        }
        self.debug_lines.extend(self.arbiter.take_conflicts());

        // Wheel.
        if input.wheel != Vec2i::ZERO {
            if input.mods.ctrl {
                out.dpi_steps += input.wheel.y.signum();
            } else {
                let (vertical, lines) = if input.mods.shift || input.wheel.y == 0 {
                    (false, if input.wheel.y != 0 { input.wheel.y } else { input.wheel.x })
                } else {
                    (true, input.wheel.y)
                };
                let delta = lines * cell.round() as i32;
                for &id in path.iter().rev() {
                    if self.tree.get(id).scroll(vertical).can_scroll(delta) {
                        self.tree.get_mut(id).scroll_mut(vertical).scroll_by(delta, now);
                        self.persist_scroll(id);
                        break;
                    }
                }
            }
        }

        self.keys(&path, &mut results, out);

        self.results = results;
        for root in roots {
            self.tree.set_phase(root, Phase::InputUpdated);
        }
    }

    fn combo_row_height(&self) -> i32 {
        (self.cell() * 0.6).round().max(1.0) as i32
    }

    fn persist_scroll(&mut self, id: NodeId) {
        let node = self.tree.get(id);
        let (hash, v, h) = (node.hash, node.scroll_v.wheel, node.scroll_h.wheel);
        self.settings.set_scroll(hash, v, h);
    }

    /// Pointer-down routing: scrollbars, resizers, brush, then canvas.
    fn press(&mut self, path: &[NodeId], input: &InputFrame, results: &mut HashMap<NodeHash, WidgetResult>) {
        let p = input.pointer;
        let cell = self.cell();
        let now = self.now;

        for &id in path.iter().rev() {
            let node = self.tree.get(id);
            let hash = node.hash;
            if let Some(bar) = node.bar_v(cell).filter(|b| b.inside(p)) {
                if self.arbiter.activate(Slot::ScrollV, hash) {
                    let scroll = &mut self.tree.get_mut(id).scroll_v;
                    scroll.start_drag(p.y - bar.y, now);
                    self.scroll_grab = scroll.grab_offset();
                    self.persist_scroll(id);
                }
                return;
            }
            if let Some(bar) = node.bar_h(cell).filter(|b| b.inside(p)) {
                if self.arbiter.activate(Slot::ScrollH, hash) {
                    let scroll = &mut self.tree.get_mut(id).scroll_h;
                    scroll.start_drag(p.x - bar.x, now);
                    self.scroll_grab = scroll.grab_offset();
                    self.persist_scroll(id);
                }
                return;
            }
        }
        for &id in path.iter().rev() {
            let node = self.tree.get(id);
            if !node.viewport.inside(p) {
                continue;
            }
            let hash = node.hash;
            let hit = node
                .cols
                .hit_resizer(p.x - node.canvas.x)
                .map(|i| ResizerGrab { vertical: false, index: i })
                .or_else(|| node.rows.hit_resizer(p.y - node.canvas.y).map(|i| ResizerGrab { vertical: true, index: i }));
            if let Some(grab) = hit {
                self.arbiter.activate_resizer(hash, grab);
                return;
            }
        }
        if input.mods.ctrl {
            self.brush.start(p);
            return;
        }
        let Some(&deepest) = path.last() else {
            return;
        };
        let hash = self.tree.get(deepest).hash;
        self.arbiter.activate(Slot::Canvas, hash);
        if let Some(src) = path.iter().rev().map(|&id| self.tree.get(id)).find(|n| n.drag.is_some()) {
            self.dragdrop.press(src.hash, p);
        }

        match self.tree.get(deepest).widget.clone() {
            Some(Widget::Edit { value, multiline, formatting }) if self.tree.get(deepest).enabled => {
                let order = self.edit_order_of(hash);
                let flags = EditFlags { multiline, formatting, tab_is_char: false };
                if let Some((h, v)) = self.edit.set_focus(hash, &value, flags, order) {
                    results.insert(h, WidgetResult::Committed(v));
                }
                if let Some(cursor) = self.edit_cursor_at(hash, p) {
                    if input.clicks >= 2 {
                        self.edit.select_word(cursor);
                    } else {
                        self.edit.click(cursor, input.mods.shift);
                    }
                }
            }
            _ => {
                if let Some((h, v)) = self.edit.blur() {
                    results.insert(h, WidgetResult::Committed(v));
                }
            }
        }
    }

    /// Tab order of an edit node in this frame's declaration order.
    fn edit_order_of(&self, hash: NodeHash) -> u32 {
        let mut order = 0;
        for (_, n) in self.tree.iter() {
            if n.hash == hash {
                return order;
            }
            if matches!(n.widget, Some(Widget::Edit { .. })) {
                order += 1;
            }
        }
        order
    }

    fn motion(&mut self, input: &InputFrame) {
        let p = input.pointer;
        let now = self.now;
        let cell = self.cell();
        self.dragdrop.moved(p);
        let Some((slot, hash)) = self.arbiter.active() else {
            return;
        };
        let Some(id) = self.tree.find(hash) else {
            return;
        };
        match slot {
            Slot::ScrollV => {
                let node = self.tree.get_mut(id);
                if let Some(bar) = node.bar_v(cell) {
                    node.scroll_v.resume_drag(self.scroll_grab);
                    node.scroll_v.drag_to(p.y - bar.y, now);
                }
                self.persist_scroll(id);
            }
            Slot::ScrollH => {
                let node = self.tree.get_mut(id);
                if let Some(bar) = node.bar_h(cell) {
                    node.scroll_h.resume_drag(self.scroll_grab);
                    node.scroll_h.drag_to(p.x - bar.x, now);
                }
                self.persist_scroll(id);
            }
            Slot::Resizer => {
                let Some(grab) = self.arbiter.resizer_grab() else {
                    return;
                };
                let node = self.tree.get_mut(id);
                let px = if grab.vertical { p.y - node.canvas.y } else { p.x - node.canvas.x };
                if let Some(v) = node.array_mut(grab.vertical).set_resizer_from_px(grab.index, px) {
                    self.settings.set_resize(hash, grab.vertical, grab.index, v);
                }
            }
            Slot::Canvas => {
                if self.edit.is_focused(hash) {
                    if let Some(cursor) = self.edit_cursor_at(hash, p) {
                        self.edit.click(cursor, true);
                    }
                }
                if self.dragdrop.is_active() || self.edit.is_focused(hash) {
                    self.autoscroll(id, p);
                }
            }
        }
    }

    /// Scroll the nearest scrollable ancestor while dragging past its edge.
    fn autoscroll(&mut self, from: NodeId, p: Vec2i) {
        let now = self.now;
        let mut cur = Some(from);
        while let Some(id) = cur {
            let node = self.tree.get_mut(id);
            let vp = node.viewport;
            let mut moved = false;
            if node.scroll_v.is_shown() {
                moved |= node.scroll_v.autoscroll(p.y - vp.y, now);
            }
            if node.scroll_h.is_shown() {
                moved |= node.scroll_h.autoscroll(p.x - vp.x, now);
            }
            if node.scroll_v.is_shown() || node.scroll_h.is_shown() {
                if moved {
                    self.persist_scroll(id);
                }
                return;
            }
            cur = node.parent;
        }
    }

    fn keys(&mut self, path: &[NodeId], results: &mut HashMap<NodeHash, WidgetResult>, out: &mut FrameOutput) {
        let ctrl_shift_esc = self.input.keys.iter().any(|k| k.key == Key::Escape && k.mods.ctrl && k.mods.shift);
        if ctrl_shift_esc {
            self.close_all_dialogs();
            self.input.keys.retain(|k| k.key != Key::Escape);
        }
        if self.combo.is_some() && self.input.take_key(Key::Escape).is_some() {
            self.combo = None;
        }

        let nav = |k: &KeyEvent| {
            matches!(k.key, Key::Left | Key::Right | Key::Up | Key::Down | Key::Home | Key::End | Key::PageUp | Key::PageDown)
        };
        let mut pass: Vec<KeyEvent> = Vec::new();
        if self.edit.has_focus() {
            let focus = self.edit.focus;
            let layout = self.edit_run(focus).map(|(run, _)| run);
            let shaped = layout.as_ref().map(|r| r.shaped.clone());
            let keys = std::mem::take(&mut self.input.keys);
            let (blocked, accepted): (Vec<KeyEvent>, Vec<KeyEvent>) = keys
                .into_iter()
                .partition(|k| nav(k) && !k.mods.ctrl && !self.edit.can_move(k.key, shaped.as_deref()));
            pass = blocked;
            let mut frame = InputFrame { keys: accepted, text: std::mem::take(&mut self.input.text), ..Default::default() };
            let outcome = self.edit.handle(&mut frame, &self.clipboard_in, shaped.as_deref(), self.now);
            pass.extend(frame.keys);
            if let Some(copy) = outcome.copy {
                out.clipboard = Some(copy);
            }
            if let Some((h, v)) = outcome.commit {
                results.insert(h, WidgetResult::Committed(v));
            }
            if self.edit.has_focus() {
                self.edit_keep_visible();
            }
        } else {
            pass = std::mem::take(&mut self.input.keys);
        }

        for k in pass {
            if k.key == Key::Escape && self.combo.is_none() && !self.dialogs.is_empty() {
                self.dialogs.pop();
                continue;
            }
            let route = match k.key {
                Key::Up => Some((true, ScrollKey::LineBack)),
                Key::Down => Some((true, ScrollKey::LineForward)),
                Key::PageUp => Some((true, ScrollKey::PageBack)),
                Key::PageDown => Some((true, ScrollKey::PageForward)),
                Key::Home => Some((true, ScrollKey::Home)),
                Key::End => Some((true, ScrollKey::End)),
                Key::Left => Some((false, ScrollKey::LineBack)),
                Key::Right => Some((false, ScrollKey::LineForward)),
                _ => None,
            };
            let Some((vertical, key)) = route else { continue };
            let cell = self.cell();
            for &id in path.iter().rev() {
                if self.tree.get(id).scroll(vertical).can_key(key) {
                    self.tree.get_mut(id).scroll_mut(vertical).key(key, cell, self.now);
                    self.persist_scroll(id);
                    break;
                }
            }
        }
    }

    /// Text run of an edit node as drawn, plus its inner rect.
    fn edit_run(&mut self, hash: NodeHash) -> Option<(TextRun, Rect)> {
        let node = self.tree.node(hash)?;
        let Some(Widget::Edit { value, multiline, formatting }) = &node.widget else {
            return None;
        };
        let style = self.styles.get(node.style).cloned().unwrap_or_default();
        let cell = self.cell();
        let rect = node.rect.crop((style.margin * cell).round() as i32);
        let inner = rect.crop((cell / 8.0) as i32);
        let shown = if self.edit.is_focused(hash) { self.edit.value.clone() } else { value.clone() };
        let props = style.font_props(cell);
        let v_align = if *multiline { Align::Start } else { Align::Center };
        let (multiline, formatting) = (*multiline, *formatting);
        let mut text_rect = inner;
        if self.edit.is_focused(hash) {
            text_rect = text_rect.translate(Vec2i::new(-self.edit.scroll_x, -self.edit.scroll_y));
        }
        let run = self.text.run(&shown, &props, style.color, formatting, multiline, text_rect, (Align::Start, v_align), self.now);
        Some((run, inner))
    }

    /// Byte offset under the pointer inside an edit.
    fn edit_cursor_at(&mut self, hash: NodeHash, p: Vec2i) -> Option<usize> {
        let (run, _) = self.edit_run(hash)?;
        let lines = run.shaped.lines.len().max(1) as i32;
        let line = ((p.y - run.origin.y) / run.line_height.max(1)).clamp(0, lines - 1) as usize;
        let x = p.x - run.origin.x - run.line_offsets.get(line).copied().unwrap_or(0);
        Some(run.shaped.cursor_at(line, x as f32, true))
    }

    fn edit_keep_visible(&mut self) {
        let focus = self.edit.focus;
        let Some((run, inner)) = self.edit_run(focus) else {
            return;
        };
        let line = run.shaped.line_of(self.edit.end);
        let x = run.origin.x - inner.x + self.edit.scroll_x
            + run.line_offsets.get(line).copied().unwrap_or(0)
            + run.shaped.cursor_x(self.edit.end).round() as i32;
        let y = run.origin.y - inner.y + self.edit.scroll_y + line as i32 * run.line_height;
        self.edit.ensure_visible(x, y, run.line_height, inner.w, inner.h);
    }

    // =====================================================================
    // Draw
    // =====================================================================

    fn draw(&mut self, main: NodeId, textures: &mut dyn TextureStore, out: &mut FrameOutput) {
        let p = self.input.pointer;
        let cell = self.cell();
        let now = self.now;
        let mut roots = self.roots_top_down(main);
        roots.reverse();

        let Self { tree, text, images, paint, edit, tooltip, styles, dragdrop, arbiter, .. } = self;
        let mut loading = false;
        for (i, &root) in roots.iter().enumerate() {
            paint.next_layer();
            if i > 0 {
                let r = tree.get(root);
                let style = styles.get(r.style).cloned().unwrap_or_default();
                paint.push_clip(r.crop);
                paint.rounded_rect(r.rect, style.radius * cell, style.background.mix(Color::BLACK, 0.3));
                paint.border(r.rect, (style.border * cell).round().max(1.0) as i32, style.radius * cell, style.border_color);
            }
            for id in tree.subtree(root) {
                let node = tree.get(id);
                let prev = paint.push_clip(node.crop);
                if node.crop.is_empty() {
                    paint.push_clip(prev);
                    continue;
                }
                let style = styles.get(node.style).cloned().unwrap_or_default();
                let hovered = node.crop.inside(p);
                if let Some(widget) = &node.widget {
                    let mut ctx = DrawCtx {
                        paint: &mut *paint,
                        text: &mut *text,
                        rect: node.rect,
                        cell,
                        style: &style,
                        hovered,
                        held: arbiter.is_owner(Slot::Canvas, node.hash),
                        edit: edit.is_focused(node.hash).then_some(&*edit),
                        now,
                    };
                    widget.draw(&mut ctx);
                    if !node.enabled {
                        paint.rect(node.rect, Color::BLACK.with_alpha(90));
                    }
                }
                for cmd in &node.paint {
                    loading |= draw_guest(paint, text, images, textures, tooltip, node.rect, cell, cmd, now);
                }
                if hovered {
                    if let Some(tip) = &node.tooltip {
                        tooltip.propose(node.crop, tip);
                    }
                }
                draw_scrollbars(paint, node, cell, arbiter);
                draw_resizers(paint, node, p, arbiter, &style);
                if let Some((target, aim)) = dragdrop.hover(p) {
                    if target.hash == node.hash {
                        draw_drop_aim(paint, target.rect, aim, &style);
                    }
                }
                paint.push_clip(prev);
            }
            tree.set_phase(root, Phase::Drawn);
        }

        if let Some(popup) = &self.combo {
            self.paint.next_layer();
            let style = self.styles.first().cloned().unwrap_or_default();
            self.paint.push_clip(self.screen);
            self.paint.rect(popup.rect, style.background.mix(Color::BLACK, 0.3));
            self.paint.border(popup.rect, 1, 0.0, style.border_color);
            let row = self.combo_row_height();
            let props = style.font_props(cell);
            for (i, option) in popup.options.iter().enumerate() {
                let r = Rect::new(popup.rect.x, popup.rect.y + i as i32 * row, popup.rect.w, row);
                if r.inside(p) || i as i64 == popup.selected {
                    self.paint.rect(r, style.accent.fade(if r.inside(p) { 0.8 } else { 0.4 }));
                }
                let pad = (cell / 5.0) as i32;
                let label = Rect::new(r.x + pad, r.y, r.w - pad, r.h);
                let run = self.text.run(option, &props, style.color, false, false, label, (Align::Start, Align::Center), now);
                self.paint.text(run);
            }
        }

        self.draw_overlays(out);
        out.cursor = self.cursor_shape();
        out.redraw |= loading;
    }

    fn draw_overlays(&mut self, out: &mut FrameOutput) {
        let cell = self.cell();
        let now = self.now;
        let style = self.styles.first().cloned().unwrap_or_default();
        self.paint.push_clip(self.screen);
        match self.tooltip.visible(now).cloned() {
            Some(tip) => {
                let props = style.font_props(cell);
                let pad = (cell / 6.0).round() as i32;
                let shaped = self.text.shape(&tip.text, &props, style.color, false, 0.0, now);
                let lh = self.text.line_height(&props) as i32;
                let size = Vec2i::new(shaped.max_width.ceil() as i32 + 2 * pad, lh * shaped.lines.len().max(1) as i32 + 2 * pad);
                let rect = place_tooltip(tip.anchor, size, self.screen);
                self.paint.set_depth(TOOLTIP_DEPTH);
                self.paint.rounded_rect(rect, 3.0, Color::rgba(30, 30, 34, 240));
                let run = self.text.run(&tip.text, &props, style.color, false, false, rect.crop(pad), (Align::Start, Align::Start), now);
                self.paint.text(run);
            }
            None => out.redraw |= self.tooltip.has_proposal(),
        }
        if self.brush.is_active() {
            self.paint.set_depth(BRUSH_DEPTH);
            self.paint.brush(self.brush.points().to_vec(), 3.0, style.accent.with_alpha(160));
        }
        if self.stats.visible {
            let props = FontProps::new(style.font.clone(), 400, false, (cell * 0.3).max(8.0));
            let lh = self.text.line_height(&props) as i32;
            self.paint.set_depth(STATS_DEPTH);
            let lines = self.stats.lines();
            let rect = Rect::new(self.screen.x + 4, self.screen.y + 4, (cell * 5.0) as i32, lh * lines.len() as i32 + 8);
            self.paint.rect(rect, Color::BLACK.with_alpha(180));
            let run = self.text.run(&lines.join("\n"), &props, Color::WHITE, false, false, rect.crop(4), (Align::Start, Align::Start), now);
            self.paint.text(run);
            if !self.debug_lines.is_empty() {
                self.paint.set_depth(DEBUG_DEPTH);
                let text = self.debug_lines.join("\n");
                let r = Rect::new(self.screen.x + 4, rect.bottom() + 4, self.screen.w - 8, lh * self.debug_lines.len() as i32);
                let run = self.text.run(&text, &props, Color::rgba(255, 200, 80, 255), false, false, r, (Align::Start, Align::Start), now);
                self.paint.text(run);
            }
        }
    }

    /// Cursor for the pointer position: captures first, then hover.
    fn cursor_shape(&self) -> CursorShape {
        let p = self.input.pointer;
        if let Some(grab) = self.arbiter.resizer_grab() {
            return if grab.vertical { CursorShape::ResizeRow } else { CursorShape::ResizeCol };
        }
        if self.dragdrop.is_active() {
            return CursorShape::Move;
        }
        let Some(main) = self.main_root else {
            return CursorShape::Default;
        };
        let root = self.roots_top_down(main)[0];
        let path = self.tree.hit_path(root, p);
        for &id in path.iter().rev() {
            let node = self.tree.get(id);
            if node.viewport.inside(p) {
                if node.cols.hit_resizer(p.x - node.canvas.x).is_some() {
                    return CursorShape::ResizeCol;
                }
                if node.rows.hit_resizer(p.y - node.canvas.y).is_some() {
                    return CursorShape::ResizeRow;
                }
            }
        }
        for &id in path.iter().rev() {
            let node = self.tree.get(id);
            if let Some(c) = node.cursor {
                return c;
            }
            if let Some(w) = &node.widget {
                return w.cursor();
            }
        }
        CursorShape::Default
    }

    fn record_infos(&mut self) {
        let cell = self.cell();
        let p = self.input.pointer;
        self.infos.clear();
        for (_, n) in self.tree.iter() {
            self.infos.insert(
                n.hash,
                NodeInfo {
                    x: n.rect.x,
                    y: n.rect.y,
                    w: n.rect.w,
                    h: n.rect.h,
                    crop_x: n.crop.x,
                    crop_y: n.crop.y,
                    crop_w: n.crop.w,
                    crop_h: n.crop.h,
                    cell,
                    scroll_v: n.scroll_v.wheel,
                    scroll_h: n.scroll_h.wheel,
                    data_v: n.scroll_v.data(),
                    data_h: n.scroll_h.data(),
                    hover: n.crop.inside(p),
                },
            );
        }
    }

    /// Nodes visible this frame (crop not empty), for diagnostics and tests.
    pub fn visible_hashes(&self) -> HashSet<NodeHash> {
        self.tree.iter().filter(|(_, n)| !n.crop.is_empty()).map(|(_, n)| n.hash).collect()
    }
}

/// Map a fraction-of-rect to screen pixels.
fn frac_rect(rect: Rect, f: RectF) -> Rect {
    let x0 = rect.x + (f.x * rect.w as f32).round() as i32;
    let y0 = rect.y + (f.y * rect.h as f32).round() as i32;
    let x1 = rect.x + ((f.x + f.w) * rect.w as f32).round() as i32;
    let y1 = rect.y + ((f.y + f.h) * rect.h as f32).round() as i32;
    Rect::new(x0, y0, x1 - x0, y1 - y0)
}

fn frac_point(rect: Rect, p: Vec2f) -> Vec2f {
    Vec2f::new(rect.x as f32 + p.x * rect.w as f32, rect.y as f32 + p.y * rect.h as f32)
}

/// Draw one guest command. Returns true while an image is still loading.
#[allow(clippy::too_many_arguments)]
fn draw_guest(
    paint: &mut PaintBuffer,
    text: &mut TextEngine,
    images: &mut ImageCache,
    textures: &mut dyn TextureStore,
    tooltip: &mut Tooltip,
    rect: Rect,
    cell: f32,
    cmd: &GuestPaint,
    now: Instant,
) -> bool {
    match cmd {
        GuestPaint::Rect { rect: f, color, radius, border } => {
            let r = frac_rect(rect, *f);
            if *border > 0.0 {
                paint.border(r, (border * cell).round().max(1.0) as i32, radius * cell, *color);
            } else if *radius > 0.0 {
                paint.rounded_rect(r, radius * cell, *color);
            } else {
                paint.rect(r, *color);
            }
        }
        GuestPaint::Line { a, b, thickness, color } => {
            paint.line(frac_point(rect, *a), frac_point(rect, *b), thickness * cell, *color);
        }
        GuestPaint::Bezier { points, thickness, dash, offset, color } => {
            let pts = points.map(|p| frac_point(rect, p));
            paint.bezier(pts, thickness * cell, dash * cell, offset * cell, *color);
        }
        GuestPaint::Circle { center, radius, thickness, color } => {
            paint.circle(frac_point(rect, *center), radius * cell, thickness * cell, *thickness <= 0.0, *color);
        }
        GuestPaint::File { rect: f, path, align, scale, translate } => {
            let status = images.file(&PathBuf::from(path), None, textures, now);
            return draw_image(paint, text, frac_rect(rect, *f), status, *align, *scale, *translate, cell, now);
        }
        GuestPaint::Blob { rect: f, bytes, align, scale, translate } => {
            let status = images.blob(bytes, None, textures, now);
            return draw_image(paint, text, frac_rect(rect, *f), status, *align, *scale, *translate, cell, now);
        }
        GuestPaint::Text { rect: f, text: t } => {
            let props = FontProps::new(t.font.clone(), t.weight, t.italic, (t.height * cell).max(1.0));
            let run = text.run(&t.text, &props, t.color, t.formatting, t.wrap, frac_rect(rect, *f), t.align, now);
            paint.text(run);
        }
        GuestPaint::Cursor { rect: f, color } => paint.text_cursor(frac_rect(rect, *f), *color),
        GuestPaint::Tooltip { rect: f, text: t } => tooltip.propose(frac_rect(rect, *f), t),
        GuestPaint::Brush { points, thickness, color } => {
            paint.brush(points.iter().map(|p| frac_point(rect, *p)).collect(), thickness * cell, *color);
        }
    }
    false
}

#[allow(clippy::too_many_arguments)]
fn draw_image(
    paint: &mut PaintBuffer,
    text: &mut TextEngine,
    r: Rect,
    status: ImageStatus,
    align: (Align, Align),
    scale: (f32, f32),
    translate: (f32, f32),
    cell: f32,
    now: Instant,
) -> bool {
    let props = FontProps::new("Inter", 400, false, (cell * 0.35).max(8.0));
    let centre = (Align::Center, Align::Center);
    match status {
        ImageStatus::Ready { texture, size } => {
            paint.image(place(r, size, align.0, align.1, scale, translate), texture, Color::WHITE);
            false
        }
        ImageStatus::Loading => {
            let run = text.run("loading …", &props, Color::GRAY, false, false, r, centre, now);
            paint.text(run);
            true
        }
        ImageStatus::Failed(err) => {
            let run = text.run(&err, &props, Color::RED, false, true, r, centre, now);
            paint.text(run);
            false
        }
    }
}

fn draw_scrollbars(paint: &mut PaintBuffer, node: &Node, cell: f32, arbiter: &Arbiter) {
    let track = Color::rgba(255, 255, 255, 20);
    for vertical in [true, false] {
        let bar = if vertical { node.bar_v(cell) } else { node.bar_h(cell) };
        let Some(bar) = bar else { continue };
        let s = node.scroll(vertical);
        let held = arbiter.is_owner(if vertical { Slot::ScrollV } else { Slot::ScrollH }, node.hash);
        let thumb_color = Color::rgba(255, 255, 255, if held { 150 } else { 90 });
        paint.rect(bar, track);
        let thumb = if vertical {
            Rect::new(bar.x, bar.y + s.thumb_start(), bar.w, s.thumb_len())
        } else {
            Rect::new(bar.x + s.thumb_start(), bar.y, s.thumb_len(), bar.h)
        };
        paint.rounded_rect(thumb.crop(1), bar.w.min(bar.h) as f32 / 3.0, thumb_color);
    }
}

fn draw_resizers(paint: &mut PaintBuffer, node: &Node, p: Vec2i, arbiter: &Arbiter, style: &WidgetStyle) {
    let grab = arbiter.resizer_grab().filter(|_| arbiter.is_owner(Slot::Resizer, node.hash));
    for vertical in [false, true] {
        let array = node.array(vertical);
        let (origin, along) = if vertical { (node.canvas.y, p.y) } else { (node.canvas.x, p.x) };
        let hovered = node.viewport.inside(p).then(|| array.hit_resizer(along - origin)).flatten();
        let active = grab.filter(|g| g.vertical == vertical).map(|g| g.index);
        for i in [hovered, active].into_iter().flatten() {
            let Some(pos) = array.resizer_position(i) else { continue };
            let line = if vertical {
                Rect::new(node.viewport.x, origin + pos - 1, node.viewport.w, 2)
            } else {
                Rect::new(origin + pos - 1, node.viewport.y, 2, node.viewport.h)
            };
            paint.rect(line, style.accent);
        }
    }
}

fn draw_drop_aim(paint: &mut PaintBuffer, rect: Rect, aim: crate::input::DropAim, style: &WidgetStyle) {
    use crate::input::DropAim;
    let t = 3;
    match aim {
        DropAim::Inside => paint.border(rect, t, 0.0, style.accent),
        DropAim::Top => paint.rect(Rect::new(rect.x, rect.y, rect.w, t), style.accent),
        DropAim::Bottom => paint.rect(Rect::new(rect.x, rect.bottom() - t, rect.w, t), style.accent),
        DropAim::Left => paint.rect(Rect::new(rect.x, rect.y, t, rect.h), style.accent),
        DropAim::Right => paint.rect(Rect::new(rect.right() - t, rect.y, t, rect.h), style.accent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::SoftwareRenderer;

    fn frame(ui: &mut Ui, input: InputFrame, build: impl FnOnce(&mut Ui)) -> FrameOutput {
        let mut tex = SoftwareRenderer::new(4, 4);
        ui.begin_frame(Rect::new(0, 0, 1000, 600), input, Instant::now());
        build(ui);
        ui.finish(&mut tex, Instant::now())
    }

    #[test]
    fn resizer_drag_persists() {
        let mut ui = Ui::default();
        let build = |ui: &mut Ui| {
            ui.div_col(0, 1.0, 100.0, None);
            ui.div_col(1, 2.0, 4.0, Some(2.0));
            ui.div_start(0, 0, 1, 1, "left");
            ui.div_end();
            ui.div_start(1, 0, 1, 1, "right");
            ui.div_end();
        };
        frame(&mut ui, InputFrame::default(), build);
        let left = ui.tree().iter().find(|(_, n)| n.name == "left").map(|(_, n)| n.rect);
        assert_eq!(left.map(|r| r.w), Some(920));

        let down = InputFrame { pointer: Vec2i::new(920, 10), pressed: true, down: true, ..Default::default() };
        frame(&mut ui, down, build);
        assert!(ui.arbiter().resizer_grab().is_some());
        let drag = InputFrame { pointer: Vec2i::new(600, 10), pressed: true, ..Default::default() };
        frame(&mut ui, drag, build);
        let up = InputFrame { pointer: Vec2i::new(600, 10), up: true, ..Default::default() };
        frame(&mut ui, up, build);
        assert!(ui.arbiter().is_free());
        frame(&mut ui, InputFrame::default(), build);
        let widths: Vec<i32> = ui.tree().get(NodeId(0)).cols.outputs().to_vec();
        assert_eq!(widths, vec![600, 400]);
        assert_eq!(ui.settings.resize(NodeHash::ROOT, false, 1), Some(10.0));
    }

    #[test]
    fn button_click_reported_next_frame() {
        let mut ui = Ui::default();
        let mut clicked = Vec::new();
        let inputs = [
            InputFrame { pointer: Vec2i::new(10, 10), pressed: true, down: true, clicks: 1, ..Default::default() },
            InputFrame { pointer: Vec2i::new(10, 10), up: true, clicks: 1, ..Default::default() },
            InputFrame { pointer: Vec2i::new(10, 10), ..Default::default() },
        ];
        for input in inputs {
            frame(&mut ui, input, |ui| {
                ui.div_start(0, 0, 1, 1, "btn");
                clicked.push(ui.button("Go", true));
                ui.div_end();
            });
        }
        frame(&mut ui, InputFrame::default(), |ui| {
            ui.div_start(0, 0, 1, 1, "btn");
            clicked.push(ui.button("Go", true));
            ui.div_end();
        });
        assert_eq!(clicked, vec![false, false, true, false]);
    }

    #[test]
    fn outside_click_pops_dialog() {
        let mut ui = Ui::default();
        let build = |ui: &mut Ui| {
            ui.div_start(0, 0, 1, 1, "opener");
            if ui.dialog_start("menu") {
                ui.div_col(0, 3.0, 0.0, None);
                ui.div_row(0, 2.0, 0.0, None);
                ui.dialog_end();
            }
            ui.div_end();
        };
        frame(&mut ui, InputFrame::default(), |ui| {
            ui.div_start(0, 0, 1, 1, "opener");
            ui.dialog_open("menu", DialogAnchor::None);
            ui.div_end();
        });
        assert_eq!(ui.dialogs().len(), 1);
        frame(&mut ui, InputFrame::default(), build);
        let dialog = ui.tree().iter().find(|(_, n)| n.name == "menu").map(|(_, n)| n.crop);
        assert_eq!(dialog, Some(Rect::new(440, 260, 120, 80)));
        let click = InputFrame { pointer: Vec2i::new(5, 5), pressed: true, down: true, ..Default::default() };
        frame(&mut ui, click, build);
        assert!(ui.dialogs().is_empty());
    }

    #[test]
    fn wheel_scrolls_deepest_scrollable() {
        let mut ui = Ui::default();
        let build = |ui: &mut Ui| {
            ui.div_start(0, 0, 1, 1, "list");
            ui.div_row(0, 40.0, 0.0, None);
            ui.div_start(0, 0, 1, 1, "content");
            ui.div_end();
            ui.div_end();
        };
        frame(&mut ui, InputFrame::default(), build);
        let wheel = InputFrame { pointer: Vec2i::new(50, 50), wheel: Vec2i::new(0, 3), ..Default::default() };
        frame(&mut ui, wheel, build);
        let list = ui.tree().iter().find(|(_, n)| n.name == "list").map(|(_, n)| n.hash).unwrap_or_default();
        assert_eq!(ui.settings.scroll(list), (120, 0));
    }
}
