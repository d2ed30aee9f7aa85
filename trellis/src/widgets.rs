//! Composite widgets.
//!
//! The protocol names a closed set of controls. Each one fills the node it
//! is declared in and exposes the same three hooks: `draw`, `input` and
//! `describe`. Results are reported by node hash one frame later.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cursor::CursorShape;
use crate::edit::EditState;
use crate::paint::PaintBuffer;
use crate::primitives::{Align, Color, Rect, Vec2i};
use crate::text::{FontProps, TextEngine};

/// Visual style of widgets and guest text. Sizes are in cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetStyle {
    pub font: String,
    pub height: f32,
    pub weight: u16,
    pub italic: bool,
    pub color: Color,
    pub background: Color,
    pub accent: Color,
    pub border_color: Color,
    pub radius: f32,
    pub border: f32,
    pub margin: f32,
}

impl Default for WidgetStyle {
    fn default() -> Self {
        Self {
            font: "Inter".into(),
            height: 0.4,
            weight: 400,
            italic: false,
            color: Color::rgba(230, 230, 230, 255),
            background: Color::rgba(60, 60, 66, 255),
            accent: Color::rgba(70, 130, 220, 255),
            border_color: Color::rgba(90, 90, 96, 255),
            radius: 0.1,
            border: 0.025,
            margin: 0.05,
        }
    }
}

impl WidgetStyle {
    pub fn font_props(&self, cell: f32) -> FontProps {
        FontProps::new(self.font.clone(), self.weight, self.italic, (self.height * cell).max(1.0))
    }

    fn px(&self, v: f32, cell: f32) -> i32 {
        (v * cell).round() as i32
    }
}

/// Controls known to the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    Button { label: String, enabled: bool },
    Slider { value: f64, min: f64, max: f64, step: f64 },
    Progress { value: f64 },
    Text { text: String, align: Align, selectable: bool, formatting: bool },
    Edit { value: String, multiline: bool, formatting: bool },
    /// `options` are the `|`-separated wire list, split.
    Combo { options: Vec<String>, selected: i64 },
    Checkbox { label: String, checked: bool },
}

/// What a widget reported during input handling.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetResult {
    Clicked,
    Value(f64),
    Toggled(bool),
    Selected(i64),
    /// Edit committed this text.
    Committed(String),
    /// Open the option popup of a combo.
    OpenPopup,
    /// Request focus for an edit.
    Focus,
    /// Put text on the clipboard.
    Copy(String),
}

/// Pointer state of one widget this frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct WidgetInput {
    pub rect: Rect,
    pub pointer: Vec2i,
    pub hovered: bool,
    /// The widget owns the canvas slot and the button is held.
    pub held: bool,
    /// Pointer went down on the widget this frame.
    pub pressed: bool,
    /// Pointer went up on the widget it was pressed on.
    pub clicked: bool,
    pub clicks: u8,
}

/// Everything a widget needs to draw itself.
pub struct DrawCtx<'a> {
    pub paint: &'a mut PaintBuffer,
    pub text: &'a mut TextEngine,
    pub rect: Rect,
    pub cell: f32,
    pub style: &'a WidgetStyle,
    pub hovered: bool,
    pub held: bool,
    /// Present when this widget holds edit focus.
    pub edit: Option<&'a EditState>,
    pub now: Instant,
}

impl Widget {
    /// Split a `|`-separated option list.
    pub fn split_options(options: &str) -> Vec<String> {
        if options.is_empty() {
            return Vec::new();
        }
        options.split('|').map(str::to_string).collect()
    }

    pub fn cursor(&self) -> CursorShape {
        match self {
            Widget::Button { enabled: false, .. } => CursorShape::No,
            Widget::Button { .. } | Widget::Checkbox { .. } | Widget::Combo { .. } | Widget::Slider { .. } => {
                CursorShape::Hand
            }
            Widget::Edit { .. } | Widget::Text { selectable: true, .. } => CursorShape::IBeam,
            _ => CursorShape::Default,
        }
    }

    /// Semantic description used by the brush outline.
    pub fn describe(&self) -> String {
        match self {
            Widget::Button { label, .. } => format!("button \"{label}\""),
            Widget::Slider { value, min, max, .. } => format!("slider {value} in [{min}, {max}]"),
            Widget::Progress { value } => format!("progress {:.0}%", value.clamp(0.0, 1.0) * 100.0),
            Widget::Text { text, formatting, .. } => {
                if *formatting {
                    crate::text::format::strip(text)
                } else {
                    text.clone()
                }
            }
            Widget::Edit { value, .. } => format!("edit \"{value}\""),
            Widget::Combo { options, selected } => {
                let current = usize::try_from(*selected).ok().and_then(|i| options.get(i));
                format!("combo \"{}\"", current.map(String::as_str).unwrap_or(""))
            }
            Widget::Checkbox { label, checked } => format!("checkbox \"{label}\" {}", if *checked { "on" } else { "off" }),
        }
    }

    /// React to the pointer.
    pub fn input(&self, input: &WidgetInput) -> Option<WidgetResult> {
        match self {
            Widget::Button { enabled, .. } => (input.clicked && *enabled).then_some(WidgetResult::Clicked),
            Widget::Checkbox { checked, .. } => input.clicked.then_some(WidgetResult::Toggled(!checked)),
            Widget::Combo { .. } => input.clicked.then_some(WidgetResult::OpenPopup),
            Widget::Slider { value, min, max, step } => {
                if !input.held || input.rect.w <= 0 {
                    return None;
                }
                let frac = ((input.pointer.x - input.rect.x) as f64 / input.rect.w as f64).clamp(0.0, 1.0);
                let mut v = min + frac * (max - min);
                if *step > 0.0 {
                    v = min + ((v - min) / step).round() * step;
                }
                let v = v.clamp(min.min(*max), max.max(*min));
                (v != *value).then_some(WidgetResult::Value(v))
            }
            Widget::Edit { .. } => input.pressed.then_some(WidgetResult::Focus),
            Widget::Text { text, selectable: true, formatting, .. } if input.clicked && input.clicks >= 2 => {
                let plain = if *formatting { crate::text::format::strip(text) } else { text.clone() };
                Some(WidgetResult::Copy(plain))
            }
            Widget::Text { .. } | Widget::Progress { .. } => None,
        }
    }

    pub fn draw(&self, ctx: &mut DrawCtx<'_>) {
        let style = ctx.style;
        let cell = ctx.cell;
        let margin = style.px(style.margin, cell);
        let rect = ctx.rect.crop(margin);
        let radius = style.radius * cell;
        let border = style.px(style.border, cell).max(1);
        let props = style.font_props(cell);
        let centre = (Align::Center, Align::Center);

        match self {
            Widget::Button { label, enabled } => {
                let mut bg = style.background;
                if !enabled {
                    bg = bg.fade(0.5);
                } else if ctx.held {
                    bg = bg.mix(style.accent, 0.5);
                } else if ctx.hovered {
                    bg = bg.mix(Color::WHITE, 0.1);
                }
                ctx.paint.rounded_rect(rect, radius, bg);
                ctx.paint.border(rect, border, radius, style.border_color);
                let color = if *enabled { style.color } else { style.color.fade(0.5) };
                let run = ctx.text.run(label, &props, color, false, false, rect, centre, ctx.now);
                ctx.paint.text(run);
            }
            Widget::Slider { value, min, max, .. } => {
                let track_h = (cell / 8.0).max(2.0) as i32;
                let track = Rect::new(rect.x, rect.y + (rect.h - track_h) / 2, rect.w, track_h);
                ctx.paint.rounded_rect(track, track_h as f32 / 2.0, style.background);
                let span = max - min;
                let frac = if span.abs() > f64::EPSILON { ((value - min) / span).clamp(0.0, 1.0) } else { 0.0 };
                let x = rect.x as f32 + frac as f32 * rect.w as f32;
                let filled = Rect::new(track.x, track.y, (x as i32 - track.x).max(0), track.h);
                ctx.paint.rounded_rect(filled, track_h as f32 / 2.0, style.accent);
                let knob = (rect.h as f32 / 3.0).max(3.0);
                let knob_color = if ctx.held || ctx.hovered { style.color } else { style.color.fade(0.85) };
                ctx.paint.circle((x, rect.y as f32 + rect.h as f32 / 2.0).into(), knob, 0.0, true, knob_color);
            }
            Widget::Progress { value } => {
                ctx.paint.rounded_rect(rect, radius, style.background);
                let w = (rect.w as f64 * value.clamp(0.0, 1.0)).round() as i32;
                ctx.paint.rounded_rect(Rect::new(rect.x, rect.y, w, rect.h), radius, style.accent);
            }
            Widget::Text { text, align, formatting, .. } => {
                let run = ctx.text.run(text, &props, style.color, *formatting, true, rect, (*align, Align::Center), ctx.now);
                ctx.paint.text(run);
            }
            Widget::Edit { value, multiline, formatting } => draw_edit(ctx, value, *multiline, *formatting, rect, &props),
            Widget::Combo { options, selected } => {
                let bg = if ctx.hovered { style.background.mix(Color::WHITE, 0.1) } else { style.background };
                ctx.paint.rounded_rect(rect, radius, bg);
                ctx.paint.border(rect, border, radius, style.border_color);
                let current = usize::try_from(*selected).ok().and_then(|i| options.get(i)).map(String::as_str).unwrap_or("");
                let pad = (cell / 5.0) as i32;
                let label_rect = Rect::new(rect.x + pad, rect.y, (rect.w - rect.h - pad).max(0), rect.h);
                let run = ctx.text.run(current, &props, style.color, false, false, label_rect, (Align::Start, Align::Center), ctx.now);
                ctx.paint.text(run);
                let arrow = Rect::new(rect.right() - rect.h, rect.y, rect.h, rect.h).center().to_f();
                let s = rect.h as f32 / 6.0;
                ctx.paint.line((arrow.x - s, arrow.y - s / 2.0).into(), (arrow.x, arrow.y + s / 2.0).into(), 1.5, style.color);
                ctx.paint.line((arrow.x, arrow.y + s / 2.0).into(), (arrow.x + s, arrow.y - s / 2.0).into(), 1.5, style.color);
            }
            Widget::Checkbox { label, checked } => {
                let size = rect.h.min((cell * 0.5) as i32);
                let bx = Rect::new(rect.x, rect.y + (rect.h - size) / 2, size, size);
                let bg = if *checked { style.accent } else { style.background };
                ctx.paint.rounded_rect(bx, radius, bg);
                ctx.paint.border(bx, border, radius, style.border_color);
                if *checked {
                    let c = bx.crop(size / 4);
                    ctx.paint.line((c.x as f32, c.center().y as f32).into(), (c.center().x as f32, c.bottom() as f32).into(), 2.0, style.color);
                    ctx.paint.line((c.center().x as f32, c.bottom() as f32).into(), (c.right() as f32, c.y as f32).into(), 2.0, style.color);
                }
                let gap = size + (cell / 5.0) as i32;
                let label_rect = Rect::new(rect.x + gap, rect.y, (rect.w - gap).max(0), rect.h);
                let run = ctx.text.run(label, &props, style.color, false, false, label_rect, (Align::Start, Align::Center), ctx.now);
                ctx.paint.text(run);
            }
        }
    }
}

fn draw_edit(ctx: &mut DrawCtx<'_>, value: &str, multiline: bool, formatting: bool, rect: Rect, props: &FontProps) {
    let style = ctx.style;
    let radius = style.radius * ctx.cell;
    let focused = ctx.edit.is_some();
    let bg = if focused { style.background.mix(Color::BLACK, 0.2) } else { style.background };
    ctx.paint.rounded_rect(rect, radius, bg);
    let border_color = if focused { style.accent } else { style.border_color };
    ctx.paint.border(rect, style.px(style.border, ctx.cell).max(1), radius, border_color);

    let pad = (ctx.cell / 8.0) as i32;
    let inner = rect.crop(pad);
    let prev_clip = ctx.paint.push_clip(ctx.paint.clip().intersect(&inner));
    let shown = ctx.edit.map(|e| e.value.as_str()).unwrap_or(value);
    let v_align = if multiline { Align::Start } else { Align::Center };
    let mut text_rect = inner;
    if let Some(edit) = ctx.edit {
        text_rect = text_rect.translate(Vec2i::new(-edit.scroll_x, -edit.scroll_y));
    }
    let run = ctx.text.run(shown, props, style.color, formatting, multiline, text_rect, (Align::Start, v_align), ctx.now);
    if let Some(edit) = ctx.edit {
        ctx.paint.selection(&run, edit.selection(), multiline, Color::SELECTION);
        let line = run.shaped.line_of(edit.end);
        let x = run.origin.x + run.line_offsets.get(line).copied().unwrap_or(0) + run.shaped.cursor_x(edit.end).round() as i32;
        let y = run.origin.y + line as i32 * run.line_height;
        ctx.paint.text_cursor(Rect::new(x, y, 2, run.line_height), style.color);
    }
    ctx.paint.text(run);
    ctx.paint.push_clip(prev_clip);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointer_at(x: i32, held: bool, clicked: bool) -> WidgetInput {
        WidgetInput {
            rect: Rect::new(0, 0, 100, 20),
            pointer: Vec2i::new(x, 10),
            hovered: true,
            held,
            pressed: false,
            clicked,
            clicks: 1,
        }
    }

    #[test]
    fn button_click_only_when_enabled() {
        let on = Widget::Button { label: "Save".into(), enabled: true };
        let off = Widget::Button { label: "Save".into(), enabled: false };
        assert_eq!(on.input(&pointer_at(5, false, true)), Some(WidgetResult::Clicked));
        assert_eq!(off.input(&pointer_at(5, false, true)), None);
        assert_eq!(off.cursor(), CursorShape::No);
    }

    #[test]
    fn slider_snaps_to_step() {
        let s = Widget::Slider { value: 0.0, min: 0.0, max: 10.0, step: 2.0 };
        assert_eq!(s.input(&pointer_at(47, true, false)), Some(WidgetResult::Value(4.0)));
        assert_eq!(s.input(&pointer_at(200, true, false)), Some(WidgetResult::Value(10.0)));
        assert_eq!(s.input(&pointer_at(47, false, false)), None);
    }

    #[test]
    fn checkbox_toggles_and_combo_opens() {
        let c = Widget::Checkbox { label: "x".into(), checked: true };
        assert_eq!(c.input(&pointer_at(1, false, true)), Some(WidgetResult::Toggled(false)));
        let combo = Widget::Combo { options: Widget::split_options("a|b|c"), selected: 1 };
        assert_eq!(combo.input(&pointer_at(1, false, true)), Some(WidgetResult::OpenPopup));
        assert_eq!(combo.describe(), "combo \"b\"");
    }

    #[test]
    fn style_json_uses_defaults() {
        let s: WidgetStyle = serde_json::from_str(r#"{"height":0.5,"weight":700}"#).unwrap();
        assert_eq!(s.height, 0.5);
        assert_eq!(s.weight, 700);
        assert_eq!(s.font, "Inter");
        assert_eq!(s.font_props(40.0).height, 20.0);
    }

    #[test]
    fn selectable_text_copies_on_double_click() {
        let t = Widget::Text { text: "<b>hi</b>".into(), align: Align::Start, selectable: true, formatting: true };
        let mut input = pointer_at(1, false, true);
        assert_eq!(t.input(&input), None);
        input.clicks = 2;
        assert_eq!(t.input(&input), Some(WidgetResult::Copy("hi".into())));
    }
}
