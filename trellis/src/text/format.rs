//! Inline formatting escapes.
//!
//! Recognised tags: `<b>`, `<i>`, `<small>`, `<h1>`, `<h2>` and
//! `<rgba R,G,B,A>`, each with a closing form. Escape bytes keep their byte
//! offsets in the text but contribute no advance.

use std::ops::Range;

use crate::primitives::Color;

/// Height factor of `<small>`.
pub const SMALL_SCALE: f32 = 0.8;
/// Height factor of `<h1>`.
pub const H1_SCALE: f32 = 1.6;
/// Height factor of `<h2>`.
pub const H2_SCALE: f32 = 1.3;

/// Which attribute a tag controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Bold,
    Italic,
    Small,
    H1,
    H2,
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    Open(Tag, Option<Color>),
    Close(Tag),
}

const SIMPLE_TAGS: [(&str, Tag); 5] = [
    ("b", Tag::Bold),
    ("i", Tag::Italic),
    ("small", Tag::Small),
    ("h1", Tag::H1),
    ("h2", Tag::H2),
];

/// Parse an escape beginning at byte `at`. Returns the escape and its length.
pub fn parse_escape(text: &str, at: usize) -> Option<(Escape, usize)> {
    let rest = text.get(at..)?;
    if !rest.starts_with('<') {
        return None;
    }
    let end = rest.find('>')?;
    let inner = &rest[1..end];
    let len = end + 1;

    if let Some(name) = inner.strip_prefix('/') {
        if name == "rgba" {
            return Some((Escape::Close(Tag::Rgba), len));
        }
        return SIMPLE_TAGS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, tag)| (Escape::Close(*tag), len));
    }
    if let Some(args) = inner.strip_prefix("rgba ") {
        let parts: Vec<i64> = args
            .split(',')
            .map(|p| p.trim().parse::<i64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if let [r, g, b, a] = parts[..] {
            return Some((Escape::Open(Tag::Rgba, Some(Color::from_channels(r, g, b, a))), len));
        }
        return None;
    }
    SIMPLE_TAGS
        .iter()
        .find(|(n, _)| *n == inner)
        .map(|(_, tag)| (Escape::Open(*tag, None), len))
}

/// Byte ranges of every escape in `text`.
pub fn escape_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut i = 0;
    while i < text.len() {
        if text.as_bytes()[i] == b'<' {
            if let Some((_, len)) = parse_escape(text, i) {
                spans.push(i..i + len);
                i += len;
                continue;
            }
        }
        i += 1;
    }
    spans
}

/// Text without its escapes.
pub fn strip(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in escape_spans(text) {
        out.push_str(&text[last..span.start]);
        last = span.end;
    }
    out.push_str(&text[last..]);
    out
}

/// The shaping attributes an escape can change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub weight: u16,
    pub italic: bool,
    pub scale: f32,
    pub color: Color,
}

/// Escape state machine. Opening tags mutate the current style; a closing
/// tag restores what its matching open tag replaced, or the base value
/// when nothing is open.
#[derive(Debug, Clone)]
pub struct FormatState {
    base: Style,
    current: Style,
    open: Vec<(Tag, Style)>,
}

impl FormatState {
    pub fn new(weight: u16, italic: bool, color: Color) -> Self {
        let base = Style { weight, italic, scale: 1.0, color };
        Self { base, current: base, open: Vec::new() }
    }

    pub fn current(&self) -> Style {
        self.current
    }

    /// Newlines reset every attribute.
    pub fn reset(&mut self) {
        self.current = self.base;
        self.open.clear();
    }

    pub fn apply(&mut self, esc: Escape) {
        match esc {
            Escape::Open(tag, color) => {
                self.open.push((tag, self.current));
                let cur = &mut self.current;
                match tag {
                    Tag::Bold => cur.weight = 700.max(self.base.weight),
                    Tag::Italic => cur.italic = true,
                    Tag::Small => cur.scale = SMALL_SCALE,
                    Tag::H1 => {
                        cur.scale = H1_SCALE;
                        cur.weight = 700;
                    }
                    Tag::H2 => {
                        cur.scale = H2_SCALE;
                        cur.weight = 700;
                    }
                    Tag::Rgba => cur.color = color.unwrap_or(self.base.color),
                }
            }
            Escape::Close(tag) => {
                let prev = match self.open.iter().rposition(|(t, _)| *t == tag) {
                    Some(i) => self.open.remove(i).1,
                    None => self.base,
                };
                let cur = &mut self.current;
                match tag {
                    Tag::Bold => cur.weight = prev.weight,
                    Tag::Italic => cur.italic = prev.italic,
                    Tag::Small => cur.scale = prev.scale,
                    Tag::H1 | Tag::H2 => {
                        cur.scale = prev.scale;
                        cur.weight = prev.weight;
                    }
                    Tag::Rgba => cur.color = prev.color,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_tags() {
        assert_eq!(parse_escape("<b>x", 0), Some((Escape::Open(Tag::Bold, None), 3)));
        assert_eq!(parse_escape("x</small>", 1), Some((Escape::Close(Tag::Small), 8)));
        assert_eq!(parse_escape("<p>", 0), None);
        assert_eq!(parse_escape("a < b", 2), None);
    }

    #[test]
    fn parses_rgba() {
        let (esc, len) = parse_escape("<rgba 255, 0,10,128>red</rgba>", 0).unwrap();
        assert_eq!(esc, Escape::Open(Tag::Rgba, Some(Color::rgba(255, 0, 10, 128))));
        assert_eq!(len, 20);
        assert_eq!(parse_escape("<rgba 1,2,3>", 0), None);
    }

    #[test]
    fn spans_and_strip() {
        let text = "a<b>bold</b>c";
        assert_eq!(escape_spans(text), vec![1..4, 8..12]);
        assert_eq!(strip(text), "aboldc");
    }

    #[test]
    fn close_restores_base() {
        let mut st = FormatState::new(400, false, Color::WHITE);
        st.apply(Escape::Open(Tag::H1, None));
        assert_eq!(st.current().weight, 700);
        st.apply(Escape::Close(Tag::H1));
        assert_eq!(st.current().weight, 400);
        assert_eq!(st.current().scale, 1.0);
        st.apply(Escape::Open(Tag::Italic, None));
        st.reset();
        assert!(!st.current().italic);
    }

    #[test]
    fn nested_close_restores_outer_value() {
        let red = Color::rgba(255, 0, 0, 255);
        let blue = Color::rgba(0, 0, 255, 255);
        let mut st = FormatState::new(400, false, Color::WHITE);
        st.apply(Escape::Open(Tag::Rgba, Some(red)));
        st.apply(Escape::Open(Tag::Rgba, Some(blue)));
        st.apply(Escape::Close(Tag::Rgba));
        assert_eq!(st.current().color, red);
        st.apply(Escape::Close(Tag::Rgba));
        assert_eq!(st.current().color, Color::WHITE);

        // Bold inside a heading keeps the heading weight after it closes.
        st.apply(Escape::Open(Tag::H2, None));
        st.apply(Escape::Open(Tag::Bold, None));
        st.apply(Escape::Close(Tag::Bold));
        assert_eq!((st.current().weight, st.current().scale), (700, H2_SCALE));

        // An unmatched close falls back to the base value.
        st.reset();
        st.apply(Escape::Close(Tag::Rgba));
        assert_eq!(st.current().color, Color::WHITE);
    }
}
