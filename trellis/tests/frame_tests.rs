//! Integration tests driving whole frames through `Ui`.
//!
//! Each test builds the same layout every frame, the way an app does, and
//! feeds one `InputFrame` per frame. Widget results and node geometry are
//! observed one frame later, matching what an app sees.

use std::time::{Duration, Instant};

use trellis::input::Slot;
use trellis::layout::{NodeId, NodeTree};
use trellis::{InputFrame, Key, KeyEvent, NodeHash, Rect, SoftwareRenderer, Ui, Vec2i};

struct FrameTest {
    ui: Ui,
    textures: SoftwareRenderer,
    now: Instant,
}

impl FrameTest {
    fn new() -> Self {
        Self { ui: Ui::default(), textures: SoftwareRenderer::new(4, 4), now: Instant::now() }
    }

    fn run(&mut self, input: InputFrame, build: impl FnOnce(&mut Ui)) {
        self.now += Duration::from_millis(16);
        self.ui.begin_frame(Rect::new(0, 0, 1000, 600), input, self.now);
        build(&mut self.ui);
        self.ui.finish(&mut self.textures, self.now);
    }

    fn hash_of(&self, name: &str) -> NodeHash {
        self.ui.tree().iter().find(|(_, n)| n.name == name).map(|(_, n)| n.hash).unwrap_or_default()
    }

    fn rect_of(&self, name: &str) -> Rect {
        self.ui.tree().iter().find(|(_, n)| n.name == name).map(|(_, n)| n.rect).unwrap_or_default()
    }
}

fn down(x: i32, y: i32) -> InputFrame {
    InputFrame { pointer: Vec2i::new(x, y), pressed: true, down: true, clicks: 1, ..Default::default() }
}

fn held(x: i32, y: i32) -> InputFrame {
    InputFrame { pointer: Vec2i::new(x, y), pressed: true, ..Default::default() }
}

fn up(x: i32, y: i32) -> InputFrame {
    InputFrame { pointer: Vec2i::new(x, y), up: true, clicks: 1, ..Default::default() }
}

/// A narrow "side" column and a scrollable "list" filling the rest.
fn side_and_list(ui: &mut Ui) {
    ui.div_col(0, 5.0, 5.0, None);
    ui.div_col(1, 1.0, 0.0, None);
    ui.div_fill(Some(1), None);
    ui.div_start(0, 0, 1, 1, "side");
    ui.div_end();
    ui.div_start(1, 0, 1, 1, "list");
    ui.div_row(0, 40.0, 0.0, None);
    ui.div_start(0, 0, 1, 1, "items");
    ui.div_end();
    ui.div_end();
}

fn assert_crops_nested(tree: &NodeTree, screen: Rect) {
    for (_, node) in tree.iter() {
        assert!(node.crop.is_empty() || screen.contains_rect(&node.crop), "{} escapes the screen", node.name);
        if let Some(parent) = node.parent {
            let p = tree.get(parent);
            assert!(
                node.crop.is_empty() || p.crop.contains_rect(&node.crop),
                "{} crop {:?} not inside parent crop {:?}",
                node.name,
                node.crop,
                p.crop
            );
        }
    }
}

#[test]
fn crops_stay_inside_parents_while_scrolled() {
    let mut t = FrameTest::new();
    let nested = |ui: &mut Ui| {
        ui.div_start(0, 0, 1, 1, "outer");
        ui.div_row(0, 30.0, 0.0, None);
        ui.div_row(1, 30.0, 0.0, None);
        for (i, name) in ["a", "b"].iter().enumerate() {
            ui.div_start(0, i as i32, 1, 1, name);
            ui.div_col(0, 40.0, 0.0, None);
            ui.div_start(0, 0, 1, 1, "deep");
            ui.div_end();
            ui.div_end();
        }
        ui.div_end();
    };
    t.run(InputFrame::default(), nested);
    let wheel = InputFrame { pointer: Vec2i::new(100, 100), wheel: Vec2i::new(0, 20), ..Default::default() };
    t.run(wheel, nested);
    t.run(InputFrame::default(), nested);
    assert!(t.ui.settings.scroll(t.hash_of("outer")).0 > 0);
    assert_crops_nested(t.ui.tree(), t.ui.screen());
    assert_eq!(t.ui.tree().get(NodeId(0)).crop, Rect::new(0, 0, 1000, 600));
}

#[test]
fn canvas_capture_ignores_foreign_scrollbar() {
    let mut t = FrameTest::new();
    t.run(InputFrame::default(), side_and_list);
    let list = t.hash_of("list");
    let side = t.hash_of("side");
    let bar = t.ui.tree().node(list).and_then(|n| n.bar_v(t.ui.cell())).expect("list scrolls");

    t.run(down(50, 50), side_and_list);
    assert_eq!(t.ui.arbiter().owner(Slot::Canvas), side);

    let over_bar = bar.center();
    t.run(held(over_bar.x, over_bar.y), side_and_list);
    t.run(held(over_bar.x, over_bar.y + 200), side_and_list);
    assert!(t.ui.arbiter().owner(Slot::ScrollV).is_none());
    assert_eq!(t.ui.arbiter().owner(Slot::Canvas), side);
    assert_eq!(t.ui.settings.scroll(list), (0, 0));

    t.run(up(over_bar.x, over_bar.y + 200), side_and_list);
    assert!(t.ui.arbiter().is_free());
}

#[test]
fn scrollbar_drag_scrolls_its_node() {
    let mut t = FrameTest::new();
    t.run(InputFrame::default(), side_and_list);
    let list = t.hash_of("list");
    let bar = t.ui.tree().node(list).and_then(|n| n.bar_v(t.ui.cell())).expect("list scrolls");
    let grip = Vec2i::new(bar.center().x, bar.y + 5);

    t.run(down(grip.x, grip.y), side_and_list);
    assert_eq!(t.ui.arbiter().owner(Slot::ScrollV), list);
    t.run(held(grip.x, grip.y + 100), side_and_list);
    t.run(up(grip.x, grip.y + 100), side_and_list);
    assert!(t.ui.settings.scroll(list).0 > 0);
    assert!(t.ui.arbiter().is_free());

    // Scrolled children move up with the canvas.
    t.run(InputFrame::default(), side_and_list);
    let offset = t.ui.settings.scroll(list).0;
    assert_eq!(t.rect_of("items").y, -offset);
}

#[test]
fn edit_commits_on_enter() {
    let mut t = FrameTest::new();
    let mut committed = Vec::new();
    let frames = vec![
        down(20, 20),
        up(20, 20),
        InputFrame { pointer: Vec2i::new(20, 20), text: "abc".into(), ..Default::default() },
        InputFrame { pointer: Vec2i::new(20, 20), keys: vec![KeyEvent::new(Key::Enter)], ..Default::default() },
        InputFrame::default(),
    ];
    for input in frames {
        t.run(input, |ui| {
            ui.div_col(0, 6.0, 0.0, None);
            ui.div_row(0, 1.0, 1.0, None);
            ui.div_start(0, 0, 1, 1, "name");
            if let Some(v) = ui.edit("", false, false) {
                committed.push(v);
            }
            ui.div_end();
        });
    }
    assert_eq!(committed, vec!["abc".to_string()]);
    assert!(!t.ui.edit_state().has_focus());
}

#[test]
fn settings_survive_a_restart() {
    let mut t = FrameTest::new();
    t.run(InputFrame::default(), side_and_list);
    let wheel = InputFrame { pointer: Vec2i::new(500, 100), wheel: Vec2i::new(0, 2), ..Default::default() };
    t.run(wheel, side_and_list);
    let json = t.ui.snapshot_settings().to_json().expect("serialize");

    let mut restarted = FrameTest::new();
    restarted.ui.load_settings(trellis::Settings::from_json(&json).expect("parse"));
    restarted.run(InputFrame::default(), side_and_list);
    let list = restarted.hash_of("list");
    assert_eq!(restarted.ui.tree().node(list).map(|n| n.scroll_v.wheel), Some(80));
}
