//! Input frame, pointer arbitration and drag/drop.
//!
//! The platform fills an [`InputFrame`] per frame. Pointer capture is a
//! single global [`Arbiter`] record with four mutually exclusive slots;
//! everything refers to nodes by hash so the record outlives the tree it
//! was built from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::hash::NodeHash;
use crate::primitives::{Rect, Vec2i};

/// Drag hysteresis threshold in pixels (squared).
pub const DRAG_THRESHOLD_SQ: i32 = 25;

// =========================================================================
// Keys
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Enter,
    Escape,
    Tab,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
    /// A shortcut letter/symbol (only meaningful with modifiers).
    Char(char),
}

impl Key {
    /// Wire name used by the key query opcode.
    pub fn name(&self) -> String {
        match self {
            Key::Enter => "enter".into(),
            Key::Escape => "esc".into(),
            Key::Tab => "tab".into(),
            Key::Backspace => "backspace".into(),
            Key::Delete => "delete".into(),
            Key::Left => "left".into(),
            Key::Right => "right".into(),
            Key::Up => "up".into(),
            Key::Down => "down".into(),
            Key::Home => "home".into(),
            Key::End => "end".into(),
            Key::PageUp => "pageup".into(),
            Key::PageDown => "pagedown".into(),
            Key::F(n) => format!("f{n}"),
            Key::Char(c) => c.to_lowercase().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    pub mods: Modifiers,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self { key, mods: Modifiers::default() }
    }

    pub fn ctrl(key: Key) -> Self {
        Self { key, mods: Modifiers { ctrl: true, ..Modifiers::default() } }
    }

    pub fn shift(key: Key) -> Self {
        Self { key, mods: Modifiers { shift: true, ..Modifiers::default() } }
    }
}

// =========================================================================
// Input frame
// =========================================================================

/// Everything the platform observed since the previous frame.
#[derive(Debug, Clone, Default)]
pub struct InputFrame {
    pub pointer: Vec2i,
    /// Primary button is held.
    pub pressed: bool,
    /// Primary button went down this frame.
    pub down: bool,
    /// Primary button went up this frame.
    pub up: bool,
    /// Click count of the last press (2 = double click).
    pub clicks: u8,
    /// Wheel delta in lines (positive y = towards the end).
    pub wheel: Vec2i,
    pub mods: Modifiers,
    pub keys: Vec<KeyEvent>,
    /// Typed text.
    pub text: String,
}

impl InputFrame {
    pub fn has_key(&self, key: Key) -> bool {
        self.keys.iter().any(|k| k.key == key)
    }

    /// Remove and return the first occurrence of a key.
    pub fn take_key(&mut self, key: Key) -> Option<KeyEvent> {
        let pos = self.keys.iter().position(|k| k.key == key)?;
        Some(self.keys.remove(pos))
    }

    pub fn is_idle(&self) -> bool {
        !self.down && !self.up && self.wheel == Vec2i::ZERO && self.keys.is_empty() && self.text.is_empty()
    }
}

// =========================================================================
// Arbiter
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Canvas,
    ScrollV,
    ScrollH,
    Resizer,
}

/// Resizer capture detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizerGrab {
    /// false = column, true = row.
    pub vertical: bool,
    pub index: usize,
}

/// Who owns the pointer. At most one slot is non-zero.
#[derive(Debug, Default)]
pub struct Arbiter {
    canvas: NodeHash,
    scroll_v: NodeHash,
    scroll_h: NodeHash,
    resizer: NodeHash,
    grab: Option<ResizerGrab>,
    conflicts: Vec<String>,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut NodeHash {
        match slot {
            Slot::Canvas => &mut self.canvas,
            Slot::ScrollV => &mut self.scroll_v,
            Slot::ScrollH => &mut self.scroll_h,
            Slot::Resizer => &mut self.resizer,
        }
    }

    pub fn owner(&self, slot: Slot) -> NodeHash {
        match slot {
            Slot::Canvas => self.canvas,
            Slot::ScrollV => self.scroll_v,
            Slot::ScrollH => self.scroll_h,
            Slot::Resizer => self.resizer,
        }
    }

    /// The single active (slot, hash), if any.
    pub fn active(&self) -> Option<(Slot, NodeHash)> {
        [Slot::Canvas, Slot::ScrollV, Slot::ScrollH, Slot::Resizer]
            .into_iter()
            .map(|s| (s, self.owner(s)))
            .find(|(_, h)| !h.is_none())
    }

    pub fn is_free(&self) -> bool {
        self.active().is_none()
    }

    /// Request a slot. Only granted when every slot is empty or already
    /// carries `hash`; losing requests are recorded.
    pub fn activate(&mut self, slot: Slot, hash: NodeHash) -> bool {
        match self.active() {
            None => {
                *self.slot_mut(slot) = hash;
                true
            }
            Some((s, h)) if h == hash && s == slot => true,
            Some((s, h)) => {
                let line = format!("pointer request {slot:?} by {hash} ignored: {s:?} owned by {h}");
                tracing::debug!("{line}");
                self.conflicts.push(line);
                false
            }
        }
    }

    pub fn activate_resizer(&mut self, hash: NodeHash, grab: ResizerGrab) -> bool {
        if self.activate(Slot::Resizer, hash) {
            self.grab = Some(grab);
            true
        } else {
            false
        }
    }

    pub fn resizer_grab(&self) -> Option<ResizerGrab> {
        self.grab
    }

    /// Pointer-up: clear every slot.
    pub fn release_all(&mut self) {
        self.canvas = NodeHash::NONE;
        self.scroll_v = NodeHash::NONE;
        self.scroll_h = NodeHash::NONE;
        self.resizer = NodeHash::NONE;
        self.grab = None;
    }

    pub fn is_owner(&self, slot: Slot, hash: NodeHash) -> bool {
        !hash.is_none() && self.owner(slot) == hash
    }

    /// Debug lines recorded for lost requests.
    pub fn take_conflicts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.conflicts)
    }
}

// =========================================================================
// Drag & drop
// =========================================================================

/// Where on a target the pointer aims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropAim {
    Inside = 0,
    Top = 1,
    Bottom = 2,
    Left = 3,
    Right = 4,
}

/// Zones a drop target accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropZones {
    pub h: bool,
    pub v: bool,
    pub inside: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSource {
    pub hash: NodeHash,
    pub group: String,
    pub index: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTarget {
    pub hash: NodeHash,
    pub group: String,
    pub index: i64,
    pub zones: DropZones,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropEvent {
    pub src_index: i64,
    pub dst_index: i64,
    pub aim: DropAim,
    pub src_source: NodeHash,
    pub dst_source: NodeHash,
}

#[derive(Debug, Clone, Default)]
enum DragStatus {
    #[default]
    Inactive,
    /// Pressed on a source, not moved past the threshold yet.
    Pending { origin: Vec2i, source: DragSource },
    Active { source: DragSource },
}

/// Drag/drop state: sources and targets are re-declared every frame.
#[derive(Debug, Default)]
pub struct DragDrop {
    status: DragStatus,
    sources: Vec<DragSource>,
    targets: Vec<DropTarget>,
    events: HashMap<NodeHash, DropEvent>,
}

impl DragDrop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget declarations of the previous frame.
    pub fn begin_frame(&mut self) {
        self.sources.clear();
        self.targets.clear();
    }

    pub fn declare_source(&mut self, source: DragSource) {
        self.sources.push(source);
    }

    pub fn declare_target(&mut self, target: DropTarget) {
        self.targets.push(target);
    }

    pub fn source_of(&self, hash: NodeHash) -> Option<&DragSource> {
        self.sources.iter().find(|s| s.hash == hash)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, DragStatus::Active { .. })
    }

    pub fn active_source(&self) -> Option<&DragSource> {
        match &self.status {
            DragStatus::Active { source } => Some(source),
            _ => None,
        }
    }

    /// Pointer went down on `hash`.
    pub fn press(&mut self, hash: NodeHash, pointer: Vec2i) {
        self.status = match self.source_of(hash) {
            Some(source) => DragStatus::Pending { origin: pointer, source: source.clone() },
            None => DragStatus::Inactive,
        };
    }

    pub fn moved(&mut self, pointer: Vec2i) {
        if let DragStatus::Pending { origin, source } = &self.status {
            let d = pointer - *origin;
            if d.x * d.x + d.y * d.y >= DRAG_THRESHOLD_SQ {
                self.status = DragStatus::Active { source: source.clone() };
            }
        }
    }

    /// Pointer-up. Produces an event for the matching target under the pointer.
    pub fn release(&mut self, pointer: Vec2i) -> Option<DropEvent> {
        let status = std::mem::take(&mut self.status);
        let DragStatus::Active { source } = status else {
            return None;
        };
        let target = self
            .targets
            .iter()
            .rev()
            .find(|t| t.group == source.group && t.rect.inside(pointer))?;
        let aim = aim_for(target.rect, target.zones, pointer)?;
        let event = DropEvent {
            src_index: source.index,
            dst_index: target.index,
            aim,
            src_source: source.hash,
            dst_source: target.hash,
        };
        self.events.insert(target.hash, event);
        Some(event)
    }

    /// Aim the active drag would land on, for highlight drawing.
    pub fn hover(&self, pointer: Vec2i) -> Option<(&DropTarget, DropAim)> {
        let source = self.active_source()?;
        let target = self
            .targets
            .iter()
            .rev()
            .find(|t| t.group == source.group && t.rect.inside(pointer))?;
        aim_for(target.rect, target.zones, pointer).map(|aim| (target, aim))
    }

    /// Take the drop delivered to a target (consumed by the drop opcode).
    pub fn take_event(&mut self, target: NodeHash) -> Option<DropEvent> {
        self.events.remove(&target)
    }

    pub fn cancel(&mut self) {
        self.status = DragStatus::Inactive;
    }
}

/// Pick an aim inside `rect`. The middle half is "inside" when accepted;
/// otherwise the nearest accepted edge wins.
fn aim_for(rect: Rect, zones: DropZones, p: Vec2i) -> Option<DropAim> {
    let fx = (p.x - rect.x) as f32 / rect.w.max(1) as f32;
    let fy = (p.y - rect.y) as f32 / rect.h.max(1) as f32;
    if zones.inside && (0.25..=0.75).contains(&fx) && (0.25..=0.75).contains(&fy) {
        return Some(DropAim::Inside);
    }
    let mut best: Option<(f32, DropAim)> = None;
    let mut consider = |dist: f32, aim: DropAim| {
        if best.is_none_or(|(d, _)| dist < d) {
            best = Some((dist, aim));
        }
    };
    if zones.v {
        consider(fy, DropAim::Top);
        consider(1.0 - fy, DropAim::Bottom);
    }
    if zones.h {
        consider(fx, DropAim::Left);
        consider(1.0 - fx, DropAim::Right);
    }
    match best {
        Some((_, aim)) => Some(aim),
        None if zones.inside => Some(DropAim::Inside),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_owner_blocks_child_scrollbar() {
        let parent = NodeHash(10);
        let child = NodeHash(20);
        let mut arb = Arbiter::new();

        assert!(arb.activate(Slot::Canvas, parent));
        assert!(!arb.activate(Slot::ScrollV, child));
        assert_eq!(arb.owner(Slot::ScrollV), NodeHash::NONE);
        assert_eq!(arb.take_conflicts().len(), 1);

        arb.release_all();
        assert!(arb.is_free());
        assert_eq!(arb.owner(Slot::Canvas), NodeHash::NONE);
    }

    #[test]
    fn at_most_one_slot_is_owned() {
        let mut arb = Arbiter::new();
        let h = NodeHash(7);
        assert!(arb.activate(Slot::ScrollH, h));
        // Same node asking for a different slot still loses.
        assert!(!arb.activate(Slot::Canvas, h));
        assert!(arb.activate(Slot::ScrollH, h));
        let owned = [Slot::Canvas, Slot::ScrollV, Slot::ScrollH, Slot::Resizer]
            .iter()
            .filter(|s| !arb.owner(**s).is_none())
            .count();
        assert_eq!(owned, 1);
    }

    #[test]
    fn drop_needs_threshold_and_group() {
        let src = NodeHash(1);
        let dst = NodeHash(2);
        let mut dd = DragDrop::new();
        dd.declare_source(DragSource { hash: src, group: "rows".into(), index: 3 });
        dd.declare_target(DropTarget {
            hash: dst,
            group: "rows".into(),
            index: 5,
            zones: DropZones { h: false, v: true, inside: false },
            rect: Rect::new(0, 100, 100, 20),
        });

        // Click without moving is not a drag.
        dd.press(src, Vec2i::new(10, 10));
        assert_eq!(dd.release(Vec2i::new(10, 10)), None);

        dd.press(src, Vec2i::new(10, 10));
        dd.moved(Vec2i::new(10, 40));
        assert!(dd.is_active());
        let ev = dd.release(Vec2i::new(50, 117)).unwrap();
        assert_eq!(ev.src_index, 3);
        assert_eq!(ev.dst_index, 5);
        assert_eq!(ev.aim, DropAim::Bottom);
        assert_eq!(dd.take_event(dst), Some(ev));
        assert_eq!(dd.take_event(dst), None);
    }

    #[test]
    fn mismatched_group_does_not_drop() {
        let mut dd = DragDrop::new();
        dd.declare_source(DragSource { hash: NodeHash(1), group: "a".into(), index: 0 });
        dd.declare_target(DropTarget {
            hash: NodeHash(2),
            group: "b".into(),
            index: 0,
            zones: DropZones { h: true, v: true, inside: true },
            rect: Rect::new(0, 0, 100, 100),
        });
        dd.press(NodeHash(1), Vec2i::ZERO);
        dd.moved(Vec2i::new(50, 50));
        assert_eq!(dd.release(Vec2i::new(50, 50)), None);
    }

    #[test]
    fn aim_prefers_inside_centre() {
        let r = Rect::new(0, 0, 100, 100);
        let all = DropZones { h: true, v: true, inside: true };
        assert_eq!(aim_for(r, all, Vec2i::new(50, 50)), Some(DropAim::Inside));
        assert_eq!(aim_for(r, all, Vec2i::new(5, 50)), Some(DropAim::Left));
        assert_eq!(aim_for(r, all, Vec2i::new(50, 95)), Some(DropAim::Bottom));
        assert_eq!(aim_for(r, DropZones::default(), Vec2i::new(50, 50)), None);
    }

    #[test]
    fn key_names() {
        assert_eq!(Key::F(2).name(), "f2");
        assert_eq!(Key::Char('A').name(), "a");
        assert_eq!(Key::PageDown.name(), "pagedown");
    }
}
