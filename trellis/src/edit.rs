//! Edit State
//!
//! Single-focus text editing controller shared by every edit widget. Cursor
//! and selection are byte offsets; movement is rune-safe and steps over
//! formatting escapes so a cursor never rests inside one.

use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::time::{Duration, Instant};

use crate::hash::NodeHash;
use crate::input::{InputFrame, Key, KeyEvent};
use crate::text::format::escape_spans;
use crate::text::shape::{ShapedText, is_word_char};

/// Undo entries kept per edit.
pub const UNDO_CAPACITY: usize = 100;

/// Edits closer together than this collapse into one undo entry.
pub const UNDO_COALESCE: Duration = Duration::from_secs(1);

/// Frames during which an externally supplied value is ignored after an edit.
const REFRESH_TICKS: u32 = 3;

/// Per-edit behaviour flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditFlags {
    pub multiline: bool,
    pub formatting: bool,
    /// Tab inserts `\t` instead of moving focus.
    pub tab_is_char: bool,
}

/// What a frame of key handling produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    pub changed: bool,
    /// Committed (hash, value).
    pub commit: Option<(NodeHash, String)>,
    /// Escape: value restored, focus dropped.
    pub cancelled: bool,
    /// Text to put on the clipboard.
    pub copy: Option<String>,
    /// Tab moved focus forward.
    pub focus_next: bool,
}

// =========================================================================
// Undo ring
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    text: String,
    cursor: usize,
}

#[derive(Debug)]
pub struct UndoRing {
    entries: VecDeque<Snapshot>,
    pos: usize,
    last_push: Option<Instant>,
    /// The top entry belongs to the current burst and may absorb the next edit.
    merge_top: bool,
}

impl UndoRing {
    fn new(text: &str, cursor: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(Snapshot { text: text.to_string(), cursor });
        Self { entries, pos: 0, last_push: None, merge_top: false }
    }

    fn record(&mut self, text: &str, cursor: usize, now: Instant) {
        let snap = Snapshot { text: text.to_string(), cursor };
        if self.entries.get(self.pos) == Some(&snap) {
            return;
        }
        self.entries.truncate(self.pos + 1);
        let in_burst = self.last_push.is_some_and(|t| now.saturating_duration_since(t) < UNDO_COALESCE);
        if in_burst && self.merge_top {
            if let Some(top) = self.entries.back_mut() {
                *top = snap;
            }
        } else {
            // The entry a burst starts from stays as its own undo step.
            self.entries.push_back(snap);
            if self.entries.len() > UNDO_CAPACITY {
                self.entries.pop_front();
            }
            self.pos = self.entries.len() - 1;
            self.merge_top = in_burst;
        }
        self.last_push = Some(now);
    }

    fn backward(&mut self) -> Option<&Snapshot> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        self.last_push = None;
        self.merge_top = false;
        self.entries.get(self.pos)
    }

    fn forward(&mut self) -> Option<&Snapshot> {
        if self.pos + 1 >= self.entries.len() {
            return None;
        }
        self.pos += 1;
        self.last_push = None;
        self.merge_top = false;
        self.entries.get(self.pos)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =========================================================================
// Edit state
// =========================================================================

#[derive(Debug, Default)]
pub struct EditState {
    pub focus: NodeHash,
    pub original: String,
    pub value: String,
    /// Selection anchor.
    pub start: usize,
    /// Cursor.
    pub end: usize,
    pub flags: EditFlags,
    /// Tab order of the focused edit.
    pub order: u32,
    /// Tab order that should take focus during the next build.
    pub activate_next: Option<u32>,
    refresh_ticks: u32,
    /// Viewport offset (pixels) keeping the cursor visible.
    pub scroll_x: i32,
    pub scroll_y: i32,
    undo: HashMap<NodeHash, UndoRing>,
}

impl EditState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_focused(&self, hash: NodeHash) -> bool {
        !hash.is_none() && self.focus == hash
    }

    pub fn has_focus(&self) -> bool {
        !self.focus.is_none()
    }

    pub fn selection(&self) -> (usize, usize) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    pub fn has_selection(&self) -> bool {
        self.start != self.end
    }

    pub fn is_modified(&self) -> bool {
        self.value != self.original
    }

    /// Focus an edit. Returns the commit of the previously focused edit.
    pub fn set_focus(&mut self, hash: NodeHash, value: &str, flags: EditFlags, order: u32) -> Option<(NodeHash, String)> {
        if self.focus == hash {
            return None;
        }
        let commit = self.blur();
        self.focus = hash;
        self.original = value.to_string();
        self.value = value.to_string();
        self.flags = flags;
        self.order = order;
        self.end = self.value.len();
        self.start = self.end;
        self.scroll_x = 0;
        self.scroll_y = 0;
        self.refresh_ticks = 0;
        self.undo.entry(hash).or_insert_with(|| UndoRing::new(value, value.len()));
        commit
    }

    /// Drop focus, committing a changed value.
    pub fn blur(&mut self) -> Option<(NodeHash, String)> {
        if self.focus.is_none() {
            return None;
        }
        let hash = std::mem::replace(&mut self.focus, NodeHash::NONE);
        let value = std::mem::take(&mut self.value);
        let original = std::mem::take(&mut self.original);
        self.start = 0;
        self.end = 0;
        (value != original).then_some((hash, value))
    }

    /// Drop focus, restoring the original value.
    pub fn cancel(&mut self) {
        self.value = self.original.clone();
        self.focus = NodeHash::NONE;
        self.start = 0;
        self.end = 0;
    }

    /// Offer the value the app supplies this frame. Adopted only while the
    /// user is not mid-edit.
    pub fn sync(&mut self, hash: NodeHash, value: &str) {
        if !self.is_focused(hash) || self.refresh_ticks > 0 || self.is_modified() || self.original == value {
            return;
        }
        self.original = value.to_string();
        self.value = value.to_string();
        self.start = self.start.min(self.value.len());
        self.end = self.end.min(self.value.len());
        self.start = self.snap(self.start);
        self.end = self.snap(self.end);
    }

    /// Once per frame.
    pub fn tick(&mut self) {
        self.refresh_ticks = self.refresh_ticks.saturating_sub(1);
    }

    fn spans(&self) -> Vec<Range<usize>> {
        if self.flags.formatting { escape_spans(&self.value) } else { Vec::new() }
    }

    fn snap(&self, pos: usize) -> usize {
        let mut p = pos.min(self.value.len());
        while !self.value.is_char_boundary(p) {
            p -= 1;
        }
        normalize(&self.spans(), p)
    }

    // =====================================================================
    // Editing operations
    // =====================================================================

    fn edited(&mut self, now: Instant) {
        self.refresh_ticks = REFRESH_TICKS;
        let (text, cursor) = (self.value.clone(), self.end);
        if let Some(ring) = self.undo.get_mut(&self.focus) {
            ring.record(&text, cursor, now);
        }
    }

    pub fn delete_selection(&mut self) -> bool {
        if !self.has_selection() {
            return false;
        }
        let (lo, hi) = self.selection();
        self.value.replace_range(lo..hi, "");
        self.start = lo;
        self.end = lo;
        true
    }

    pub fn insert(&mut self, s: &str, now: Instant) {
        self.delete_selection();
        let at = self.end.min(self.value.len());
        self.value.insert_str(at, s);
        self.end = at + s.len();
        self.start = self.end;
        self.edited(now);
    }

    pub fn backspace(&mut self, now: Instant) {
        if !self.delete_selection() {
            let to = step_left(&self.value, &self.spans(), self.end);
            if to < self.end {
                let from = prev_rune(&self.value, self.end);
                let from = last_visible_start(&self.value, &self.spans(), from, self.end).unwrap_or(to);
                let end = next_rune(&self.value, from);
                self.value.replace_range(from..end, "");
                self.end = from;
            }
        }
        self.start = self.end;
        self.edited(now);
    }

    pub fn delete(&mut self, now: Instant) {
        if !self.delete_selection() {
            let spans = self.spans();
            let from = normalize(&spans, self.end);
            if from < self.value.len() {
                let end = next_rune(&self.value, from);
                self.value.replace_range(from..end, "");
                self.end = from;
            }
        }
        self.start = self.end;
        self.edited(now);
    }

    pub fn select_all(&mut self) {
        self.start = 0;
        self.end = self.value.len();
    }

    /// Text a copy would take: the selection, or the current line.
    pub fn copy_text(&self) -> String {
        if self.has_selection() {
            let (lo, hi) = self.selection();
            return self.value[lo..hi].to_string();
        }
        let r = hard_line(&self.value, self.end);
        self.value[r].to_string()
    }

    fn cut(&mut self, now: Instant) -> String {
        let text = self.copy_text();
        if !self.has_selection() {
            let r = hard_line(&self.value, self.end);
            let end = if r.end < self.value.len() { r.end + 1 } else { r.end };
            self.start = r.start;
            self.end = end;
        }
        self.delete_selection();
        self.edited(now);
        text
    }

    pub fn undo(&mut self) -> bool {
        let Some(snap) = self.undo.get_mut(&self.focus).and_then(|r| r.backward()).cloned() else {
            return false;
        };
        self.value = snap.text;
        self.end = snap.cursor.min(self.value.len());
        self.start = self.end;
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snap) = self.undo.get_mut(&self.focus).and_then(|r| r.forward()).cloned() else {
            return false;
        };
        self.value = snap.text;
        self.end = snap.cursor.min(self.value.len());
        self.start = self.end;
        true
    }

    // =====================================================================
    // Cursor movement
    // =====================================================================

    fn place(&mut self, cursor: usize, extend: bool) {
        self.end = cursor;
        if !extend {
            self.start = cursor;
        }
    }

    pub fn move_left(&mut self, extend: bool) {
        if !extend && self.has_selection() {
            let (lo, _) = self.selection();
            return self.place(lo, false);
        }
        let to = step_left(&self.value, &self.spans(), self.end);
        self.place(to, extend);
    }

    pub fn move_right(&mut self, extend: bool) {
        if !extend && self.has_selection() {
            let (_, hi) = self.selection();
            return self.place(hi, false);
        }
        let to = step_right(&self.value, &self.spans(), self.end);
        self.place(to, extend);
    }

    pub fn move_word_left(&mut self, extend: bool) {
        let spans = self.spans();
        let mut p = self.end;
        while p > 0 {
            let q = step_left(&self.value, &spans, p);
            if q == p || char_before(&self.value, p).is_some_and(is_word_char) {
                break;
            }
            p = q;
        }
        while p > 0 {
            let q = step_left(&self.value, &spans, p);
            if q == p || !char_before(&self.value, p).is_some_and(is_word_char) {
                break;
            }
            p = q;
        }
        self.place(p, extend);
    }

    pub fn move_word_right(&mut self, extend: bool) {
        let spans = self.spans();
        let mut p = normalize(&spans, self.end);
        let len = self.value.len();
        while p < len && char_at(&self.value, p).is_some_and(is_word_char) {
            p = step_right(&self.value, &spans, p);
        }
        while p < len && !char_at(&self.value, p).is_some_and(is_word_char) {
            p = step_right(&self.value, &spans, p);
        }
        self.place(p, extend);
    }

    pub fn move_home(&mut self, layout: Option<&ShapedText>, extend: bool) {
        let to = match layout {
            Some(s) => s.lines.get(s.line_of(self.end)).map(|r| r.start).unwrap_or(0),
            None => hard_line(&self.value, self.end).start,
        };
        let to = self.snap(to);
        self.place(to, extend);
    }

    pub fn move_end(&mut self, layout: Option<&ShapedText>, extend: bool) {
        let to = match layout {
            Some(s) => s.lines.get(s.line_of(self.end)).map(|r| r.end).unwrap_or(self.value.len()),
            None => hard_line(&self.value, self.end).end,
        };
        self.place(to, extend);
    }

    /// Move one visual line up (`dir` = -1) or down (1). Returns false when
    /// there is no line in that direction.
    pub fn move_vertical(&mut self, layout: &ShapedText, dir: i32, extend: bool) -> bool {
        let line = layout.line_of(self.end) as i32 + dir;
        if line < 0 || line as usize >= layout.lines.len() {
            return false;
        }
        let x = layout.cursor_x(self.end);
        let to = self.snap(layout.cursor_at(line as usize, x, true));
        self.place(to, extend);
        true
    }

    /// Whether a navigation key would move the cursor (keyboard routing).
    pub fn can_move(&self, key: Key, layout: Option<&ShapedText>) -> bool {
        if !self.has_focus() {
            return false;
        }
        match key {
            Key::Left | Key::Home => self.end > 0 || self.has_selection(),
            Key::Right | Key::End => self.end < self.value.len() || self.has_selection(),
            Key::Up | Key::PageUp => self.flags.multiline && layout.is_some_and(|l| l.line_of(self.end) > 0),
            Key::Down | Key::PageDown => {
                self.flags.multiline && layout.is_some_and(|l| l.line_of(self.end) + 1 < l.lines.len())
            }
            _ => false,
        }
    }

    // =====================================================================
    // Mouse
    // =====================================================================

    /// Place the cursor from a click; `extend` keeps the anchor (drag).
    pub fn click(&mut self, cursor: usize, extend: bool) {
        let to = self.snap(cursor);
        self.place(to, extend);
        if extend {
            self.explode();
        }
    }

    pub fn select_word(&mut self, cursor: usize) {
        let p = self.snap(cursor);
        let mut lo = p;
        while char_before(&self.value, lo).is_some_and(is_word_char) {
            lo = prev_rune(&self.value, lo);
        }
        let mut hi = p;
        while char_at(&self.value, hi).is_some_and(is_word_char) {
            hi = next_rune(&self.value, hi);
        }
        self.start = lo;
        self.end = hi;
    }

    /// Grow the selection so it never covers part of an escaped run.
    pub fn explode(&mut self) {
        if !self.flags.formatting || !self.has_selection() {
            return;
        }
        let (lo, hi) = explode_selection(&self.value, self.selection());
        if self.start <= self.end {
            self.start = lo;
            self.end = hi;
        } else {
            self.start = hi;
            self.end = lo;
        }
    }

    /// Scroll the viewport minimally so the caret stays visible.
    pub fn ensure_visible(&mut self, caret_x: i32, caret_y: i32, line_h: i32, view_w: i32, view_h: i32) {
        if caret_x < self.scroll_x {
            self.scroll_x = caret_x;
        } else if caret_x + 2 > self.scroll_x + view_w {
            self.scroll_x = caret_x + 2 - view_w;
        }
        if caret_y < self.scroll_y {
            self.scroll_y = caret_y;
        } else if caret_y + line_h > self.scroll_y + view_h {
            self.scroll_y = caret_y + line_h - view_h;
        }
        self.scroll_x = self.scroll_x.max(0);
        self.scroll_y = self.scroll_y.max(0);
    }

    // =====================================================================
    // Key handling
    // =====================================================================

    /// Consume this frame's keys and typed text.
    ///
    /// Order: select-all, copy/cut, paste, text insertion, delete, movement.
    pub fn handle(&mut self, input: &mut InputFrame, clipboard: &str, layout: Option<&ShapedText>, now: Instant) -> EditOutcome {
        let mut out = EditOutcome::default();
        if !self.has_focus() {
            return out;
        }
        let keys = std::mem::take(&mut input.keys);
        let mut rest: Vec<KeyEvent> = Vec::new();

        for ev in &keys {
            if ev.mods.ctrl && ev.key == Key::Char('a') {
                self.select_all();
            }
        }
        for ev in &keys {
            if ev.mods.ctrl && matches!(ev.key, Key::Char('c') | Key::Char('x')) {
                if ev.key == Key::Char('c') {
                    out.copy = Some(self.copy_text());
                } else {
                    out.copy = Some(self.cut(now));
                    out.changed = true;
                }
            }
        }
        for ev in &keys {
            if ev.mods.ctrl && ev.key == Key::Char('v') && !clipboard.is_empty() {
                let paste = if self.flags.multiline { clipboard.to_string() } else { clipboard.replace(['\r', '\n'], " ") };
                self.insert(&paste, now);
                out.changed = true;
            }
        }

        let typed = std::mem::take(&mut input.text);
        let typed: String = typed.chars().filter(|c| !c.is_control()).collect();
        if !typed.is_empty() {
            self.insert(&typed, now);
            out.changed = true;
        }

        for ev in keys {
            let extend = ev.mods.shift;
            match ev.key {
                Key::Char('a' | 'c' | 'x' | 'v') if ev.mods.ctrl => {}
                Key::Char('z') if ev.mods.ctrl && ev.mods.shift => out.changed |= self.redo(),
                Key::Char('z') if ev.mods.ctrl => out.changed |= self.undo(),
                Key::Char('y') if ev.mods.ctrl => out.changed |= self.redo(),
                Key::Tab if self.flags.tab_is_char => {
                    self.insert("\t", now);
                    out.changed = true;
                }
                Key::Tab => {
                    out.commit = self.blur();
                    self.activate_next = Some(self.order + 1);
                    out.focus_next = true;
                    break;
                }
                Key::Enter if self.flags.multiline && !ev.mods.ctrl => {
                    self.insert("\n", now);
                    out.changed = true;
                }
                Key::Enter => {
                    out.commit = self.blur();
                    break;
                }
                Key::Escape => {
                    self.cancel();
                    out.cancelled = true;
                    break;
                }
                Key::Backspace => {
                    self.backspace(now);
                    out.changed = true;
                }
                Key::Delete => {
                    self.delete(now);
                    out.changed = true;
                }
                Key::Left if ev.mods.ctrl => self.move_word_left(extend),
                Key::Right if ev.mods.ctrl => self.move_word_right(extend),
                Key::Left => self.move_left(extend),
                Key::Right => self.move_right(extend),
                Key::Up | Key::Down if self.flags.multiline => {
                    let dir = if ev.key == Key::Up { -1 } else { 1 };
                    if let Some(l) = layout {
                        self.move_vertical(l, dir, extend);
                    }
                }
                Key::Home => self.move_home(layout, extend),
                Key::End => self.move_end(layout, extend),
                _ => rest.push(ev),
            }
        }
        input.keys = rest;
        out
    }
}

// =========================================================================
// Helper functions
// =========================================================================

fn next_rune(text: &str, pos: usize) -> usize {
    text[pos..].chars().next().map(|c| pos + c.len_utf8()).unwrap_or(text.len())
}

fn prev_rune(text: &str, pos: usize) -> usize {
    text[..pos].chars().next_back().map(|c| pos - c.len_utf8()).unwrap_or(0)
}

fn char_at(text: &str, pos: usize) -> Option<char> {
    text.get(pos..)?.chars().next()
}

fn char_before(text: &str, pos: usize) -> Option<char> {
    text.get(..pos)?.chars().next_back()
}

/// Skip escapes that start at `pos`.
fn normalize(spans: &[Range<usize>], mut pos: usize) -> usize {
    while let Some(s) = spans.iter().find(|s| s.start == pos) {
        pos = s.end;
    }
    pos
}

/// One visible rune to the right.
pub fn step_right(text: &str, spans: &[Range<usize>], pos: usize) -> usize {
    let p = normalize(spans, pos);
    if p >= text.len() {
        return p.min(text.len());
    }
    normalize(spans, next_rune(text, p))
}

/// One visible rune to the left.
pub fn step_left(text: &str, spans: &[Range<usize>], pos: usize) -> usize {
    let mut p = pos.min(text.len());
    while let Some(s) = spans.iter().find(|s| s.end == p && s.start < p) {
        p = s.start;
    }
    if p == 0 {
        return normalize(spans, 0);
    }
    normalize(spans, prev_rune(text, p))
}

/// Start of the visible rune ending at or before `end`, skipping escapes.
fn last_visible_start(text: &str, spans: &[Range<usize>], _hint: usize, end: usize) -> Option<usize> {
    let mut p = end;
    while let Some(s) = spans.iter().find(|s| s.end == p && s.start < p) {
        p = s.start;
    }
    (p > 0).then(|| prev_rune(text, p))
}

/// Byte range of the hard line containing `pos` (newline excluded).
fn hard_line(text: &str, pos: usize) -> Range<usize> {
    let pos = pos.min(text.len());
    let start = text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[pos..].find('\n').map(|i| pos + i).unwrap_or(text.len());
    start..end
}

/// Matched (open.start, close.end) runs of formatting escapes.
fn escaped_runs(text: &str) -> Vec<Range<usize>> {
    use crate::text::format::{Escape, parse_escape};
    let mut open: Vec<(crate::text::format::Tag, usize)> = Vec::new();
    let mut runs = Vec::new();
    for span in escape_spans(text) {
        match parse_escape(text, span.start) {
            Some((Escape::Open(tag, _), _)) => open.push((tag, span.start)),
            Some((Escape::Close(tag), _)) => {
                if let Some(i) = open.iter().rposition(|(t, _)| *t == tag) {
                    let (_, start) = open.remove(i);
                    runs.push(start..span.end);
                }
            }
            None => {}
        }
    }
    runs
}

/// Grow `(lo, hi)` until no escaped run is only partly covered through one
/// of its escapes.
pub fn explode_selection(text: &str, (mut lo, mut hi): (usize, usize)) -> (usize, usize) {
    if lo >= hi {
        return (lo, hi);
    }
    let spans = escape_spans(text);
    let runs = escaped_runs(text);
    loop {
        let touches_escape = |r: &Range<usize>, lo: usize, hi: usize| {
            spans
                .iter()
                .filter(|s| s.start >= r.start && s.end <= r.end)
                .any(|s| s.start < hi && s.end > lo)
        };
        let grow = runs
            .iter()
            .find(|r| touches_escape(r, lo, hi) && (lo > r.start || hi < r.end));
        match grow {
            Some(r) => {
                lo = lo.min(r.start);
                hi = hi.max(r.end);
            }
            None => return (lo, hi),
        }
    }
}
