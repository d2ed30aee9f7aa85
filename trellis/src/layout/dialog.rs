//! Dialog stack and placement.

use crate::hash::NodeHash;
use crate::primitives::{Rect, Vec2i};
use crate::settings::DialogEntry;

/// Discriminator mixed into dialog hashes.
const DIALOG_SALT: u64 = 0xd1a1_0600;

/// Hash of the dialog `name` opened from node `opener`.
pub fn dialog_path(opener: NodeHash, name: &str) -> NodeHash {
    opener.child(name, 0, 0, 0, 0).mix(DIALOG_SALT)
}

/// What a dialog is placed next to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAnchor {
    /// Centred on the screen.
    None,
    Node(NodeHash),
    Point(Vec2i),
}

/// Open dialogs, bottom to top.
#[derive(Debug, Clone, Default)]
pub struct DialogStack {
    entries: Vec<DialogEntry>,
}

impl DialogStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<DialogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[DialogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_open(&self, path: NodeHash) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    pub fn get(&self, path: NodeHash) -> Option<&DialogEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn top(&self) -> Option<&DialogEntry> {
        self.entries.last()
    }

    /// Push a dialog. Re-opening an open dialog only updates its anchor.
    pub fn open(&mut self, path: NodeHash, anchor: DialogAnchor) {
        let (parent, touch) = match anchor {
            DialogAnchor::None => (None, None),
            DialogAnchor::Node(h) => (Some(h), None),
            DialogAnchor::Point(p) => (None, Some(p)),
        };
        match self.entries.iter_mut().find(|e| e.path == path) {
            Some(e) => {
                e.parent = parent;
                e.touch = touch;
            }
            None => self.entries.push(DialogEntry { path, parent, touch }),
        }
    }

    /// Close a dialog and every dialog stacked above it.
    pub fn close(&mut self, path: NodeHash) -> bool {
        match self.entries.iter().position(|e| e.path == path) {
            Some(i) => {
                self.entries.truncate(i);
                true
            }
            None => false,
        }
    }

    pub fn pop(&mut self) -> Option<DialogEntry> {
        self.entries.pop()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Place a dialog of `size` next to `anchor` inside `screen`.
///
/// Below/above is tried first, then right/left, each time on the side with
/// more room. When nothing fits the roomier vertical side is used and the
/// dialog is clipped to the screen. Without an anchor the dialog is centred.
pub fn place_dialog(size: Vec2i, anchor: Option<Rect>, screen: Rect) -> Rect {
    let Some(a) = anchor else {
        let c = screen.center();
        return Rect::new(c.x - size.x / 2, c.y - size.y / 2, size.x, size.y).intersect(&screen);
    };
    let clamp_x = |x: i32| x.clamp(screen.x, (screen.right() - size.x).max(screen.x));
    let clamp_y = |y: i32| y.clamp(screen.y, (screen.bottom() - size.y).max(screen.y));

    let below = screen.bottom() - a.bottom();
    let above = a.y - screen.y;
    let vertical = if below >= above {
        Rect::new(clamp_x(a.x), a.bottom(), size.x, size.y)
    } else {
        Rect::new(clamp_x(a.x), a.y - size.y, size.x, size.y)
    };
    if below.max(above) >= size.y {
        return vertical;
    }

    let right = screen.right() - a.right();
    let left = a.x - screen.x;
    if right.max(left) >= size.x {
        let x = if right >= left { a.right() } else { a.x - size.x };
        return Rect::new(x, clamp_y(a.y), size.x, size.y);
    }
    vertical.intersect(&screen)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect::new(0, 0, 1000, 800);

    #[test]
    fn opens_below_when_room() {
        let r = place_dialog(Vec2i::new(200, 100), Some(Rect::new(50, 100, 80, 30)), SCREEN);
        assert_eq!(r, Rect::new(50, 130, 200, 100));
    }

    #[test]
    fn flips_above_near_bottom() {
        let r = place_dialog(Vec2i::new(200, 100), Some(Rect::new(50, 750, 80, 30)), SCREEN);
        assert_eq!(r, Rect::new(50, 650, 200, 100));
    }

    #[test]
    fn goes_sideways_when_too_tall() {
        let r = place_dialog(Vec2i::new(200, 500), Some(Rect::new(50, 350, 80, 30)), SCREEN);
        assert_eq!(r, Rect::new(130, 300, 200, 500));
    }

    #[test]
    fn clips_when_nothing_fits() {
        let r = place_dialog(Vec2i::new(990, 600), Some(Rect::new(400, 350, 80, 30)), SCREEN);
        assert_eq!(r, Rect::new(10, 380, 990, 420));
        assert!(SCREEN.contains_rect(&r));
    }

    #[test]
    fn centred_without_anchor_and_clamped_x() {
        assert_eq!(place_dialog(Vec2i::new(200, 100), None, SCREEN), Rect::new(400, 350, 200, 100));
        let r = place_dialog(Vec2i::new(200, 100), Some(Rect::new(950, 100, 40, 20)), SCREEN);
        assert_eq!(r.x, 800);
    }

    #[test]
    fn close_truncates_above() {
        let mut stack = DialogStack::new();
        let (a, b, c) = (NodeHash(1), NodeHash(2), NodeHash(3));
        stack.open(a, DialogAnchor::None);
        stack.open(b, DialogAnchor::Node(a));
        stack.open(c, DialogAnchor::Point(Vec2i::new(3, 4)));
        stack.open(b, DialogAnchor::None);
        assert_eq!(stack.len(), 3);
        assert!(stack.close(b));
        assert_eq!(stack.len(), 1);
        assert!(stack.is_open(a));
        assert_eq!(stack.pop().map(|e| e.path), Some(a));
        assert!(!stack.close(c));
    }
}
