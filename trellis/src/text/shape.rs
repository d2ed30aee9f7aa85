//! Text shaping and line wrapping.
//!
//! Shaping produces a per-byte advance table that is cumulative across the
//! whole text, so cursor/pixel conversion is a binary search and the table
//! is non-decreasing by construction.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::font::{FaceKey, FontProps, FontStore, clamp_weight};
use super::format::{FormatState, Style, parse_escape};
use crate::primitives::Color;

/// Shaped lines unused for this long are evicted.
pub const LINE_IDLE: Duration = Duration::from_secs(30);

const LINE_CACHE_CAPACITY: usize = 4096;

/// Accented Latin letters that count as word characters.
pub const ACCENTED: &str = "ÀÁÂÃÄÅÆÇÈÉÊËÌÍÎÏÐÑÒÓÔÕÖØÙÚÛÜÝÞßàáâãäåæçèéêëìíîïðñòóôõöøùúûüýþÿ";

/// Word characters: alphanumerics, `_`, accented Latin.
pub fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ACCENTED.contains(ch) || ('\u{100}'..='\u{17e}').contains(&ch)
}

/// Result of shaping one text.
#[derive(Debug, Clone, Default)]
pub struct ShapedText {
    /// Byte ranges of visual lines (newlines and wrap spaces excluded).
    pub lines: Vec<Range<usize>>,
    /// Widest line in pixels.
    pub max_width: f32,
    /// Pen position after each byte. Bytes of one codepoint share a value.
    pub advances: Vec<f32>,
    /// Bytes that belong to formatting escapes.
    pub skip: Vec<bool>,
    /// Byte offset → color, in order.
    pub colors: Vec<(usize, Color)>,
    /// Byte offset → full style, in order (drawing picks faces from it).
    pub styles: Vec<(usize, Style)>,
}

impl ShapedText {
    /// Pen position at a cursor (byte offset).
    pub fn pos(&self, cursor: usize) -> f32 {
        if cursor == 0 || self.advances.is_empty() {
            0.0
        } else {
            self.advances[cursor.min(self.advances.len()) - 1]
        }
    }

    pub fn line_width(&self, line: usize) -> f32 {
        self.lines
            .get(line)
            .map(|r| self.pos(r.end) - self.pos(r.start))
            .unwrap_or(0.0)
    }

    /// Index of the visual line containing `cursor`.
    pub fn line_of(&self, cursor: usize) -> usize {
        self.lines
            .partition_point(|r| r.start <= cursor)
            .saturating_sub(1)
    }

    /// Horizontal offset of `cursor` within its line.
    pub fn cursor_x(&self, cursor: usize) -> f32 {
        let line = self.line_of(cursor);
        match self.lines.get(line) {
            Some(r) => self.pos(cursor.clamp(r.start, r.end)) - self.pos(r.start),
            None => 0.0,
        }
    }

    /// Cursor on `line` at horizontal offset `x`.
    ///
    /// Without `round` the cursor stays left of `x`; with `round` it snaps
    /// to the nearer boundary.
    pub fn cursor_at(&self, line: usize, x: f32, round: bool) -> usize {
        let Some(r) = self.lines.get(line) else {
            return self.advances.len();
        };
        let base = self.pos(r.start);
        let target = base + x.max(0.0);
        let table = &self.advances[r.start..r.end];
        let c = r.start + table.partition_point(|&a| a <= target);
        if !round || c >= r.end {
            return c.min(r.end);
        }
        let next_adv = self.advances[c];
        let next = r.start + table.partition_point(|&a| a <= next_adv);
        if next_adv - target < target - self.pos(c) { next.min(r.end) } else { c }
    }

    /// Style in effect at a byte.
    pub fn style_at(&self, byte: usize) -> Option<Style> {
        let i = self.styles.partition_point(|(b, _)| *b <= byte);
        i.checked_sub(1).map(|i| self.styles[i].1)
    }
}

/// Shape `text` with the given props.
///
/// With `formatting` off, escapes are ordinary characters. A `wrap` width of
/// zero or less disables soft wrapping.
pub fn shape(
    fonts: &mut FontStore,
    text: &str,
    props: &FontProps,
    color: Color,
    formatting: bool,
    wrap: f32,
    now: Instant,
) -> ShapedText {
    let len = text.len();
    let mut advances = vec![0.0f32; len];
    let mut skip = vec![false; len];
    let mut state = FormatState::new(props.weight, props.italic, color);
    let mut styles = vec![(0usize, state.current())];
    let mut colors = vec![(0usize, color)];
    let mut pen = 0.0f32;
    let mut prev: Option<char> = None;

    let mut i = 0;
    while i < len {
        if formatting && text.as_bytes()[i] == b'<' {
            if let Some((esc, esc_len)) = parse_escape(text, i) {
                for b in i..i + esc_len {
                    advances[b] = pen;
                    skip[b] = true;
                }
                state.apply(esc);
                push_style(i + esc_len, state.current(), &mut styles, &mut colors);
                i += esc_len;
                continue;
            }
        }
        let Some(ch) = text[i..].chars().next() else {
            break;
        };
        let ch_len = ch.len_utf8();
        if ch == '\n' {
            advances[i] = pen;
            prev = None;
            if formatting {
                state.reset();
                push_style(i + 1, state.current(), &mut styles, &mut colors);
            }
            i += 1;
            continue;
        }
        let st = state.current();
        let key = FaceKey { family: props.family.clone(), weight: clamp_weight(st.weight), italic: st.italic };
        let px = props.height * st.scale;
        let face = fonts.face(&key, px, now);
        let mut adv = face.advance(ch, px);
        if let Some(p) = prev {
            adv += face.kern(p, ch, px);
        }
        pen += adv.max(0.0);
        for b in i..i + ch_len {
            advances[b] = pen;
        }
        prev = Some(ch);
        i += ch_len;
    }

    let mut shaped = ShapedText { lines: Vec::new(), max_width: 0.0, advances, skip, colors, styles };
    shaped.lines = wrap_lines(text, &shaped, wrap);
    shaped.max_width = (0..shaped.lines.len())
        .map(|l| shaped.line_width(l))
        .fold(0.0, f32::max);
    shaped
}

fn push_style(at: usize, st: Style, styles: &mut Vec<(usize, Style)>, colors: &mut Vec<(usize, Color)>) {
    if styles.last().map(|(_, s)| *s) != Some(st) {
        styles.push((at, st));
    }
    if colors.last().map(|(_, c)| *c) != Some(st.color) {
        colors.push((at, st.color));
    }
}

/// Split `text` into visual lines.
fn wrap_lines(text: &str, shaped: &ShapedText, wrap: f32) -> Vec<Range<usize>> {
    let width = |a: usize, b: usize| shaped.pos(b) - shaped.pos(a);
    let mut lines = Vec::new();
    let mut hard_start = 0;

    for hard in text.split('\n') {
        let hard_end = hard_start + hard.len();
        let mut s = hard_start;
        let mut candidate: Option<(usize, usize)> = None;
        let mut i = hard_start;

        while wrap > 0.0 && i < hard_end {
            if shaped.skip[i] {
                i += 1;
                continue;
            }
            let Some(ch) = text[i..].chars().next() else {
                break;
            };
            let end = i + ch.len_utf8();
            if width(s, end) > wrap {
                if ch == ' ' {
                    lines.push(s..i);
                    s = end;
                    candidate = None;
                    i = end;
                    continue;
                }
                if let Some((line_end, next)) = candidate.take() {
                    lines.push(s..line_end);
                    s = next;
                    continue;
                }
                if width(s, i) > 0.0 {
                    lines.push(s..i);
                    s = i;
                    continue;
                }
            }
            if ch == ' ' {
                candidate = Some((i, end));
            } else if !is_word_char(ch) {
                candidate = Some((end, end));
            }
            i = end;
        }
        lines.push(s..hard_end);
        hard_start = hard_end + 1;
    }
    lines
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LineKey {
    text: String,
    face: FaceKey,
    height: u16,
    color: Color,
    formatting: bool,
    wrap: i32,
}

struct LineEntry {
    shaped: Arc<ShapedText>,
    last_use: Instant,
}

/// LRU cache of shaped texts.
pub struct LineCache {
    cache: LruCache<LineKey, LineEntry>,
}

impl Default for LineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCache {
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(LINE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self { cache: LruCache::new(cap) }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_or_shape(
        &mut self,
        fonts: &mut FontStore,
        text: &str,
        props: &FontProps,
        color: Color,
        formatting: bool,
        wrap: f32,
        now: Instant,
    ) -> Arc<ShapedText> {
        let key = LineKey {
            text: text.to_string(),
            face: props.face_key(),
            height: props.height_px(),
            color,
            formatting,
            wrap: wrap.max(0.0).round() as i32,
        };
        if let Some(entry) = self.cache.get_mut(&key) {
            entry.last_use = now;
            return entry.shaped.clone();
        }
        let shaped = Arc::new(shape(fonts, text, props, color, formatting, wrap, now));
        self.cache.put(key, LineEntry { shaped: shaped.clone(), last_use: now });
        shaped
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop lines unused for longer than [`LINE_IDLE`].
    pub fn evict(&mut self, now: Instant) -> usize {
        let stale: Vec<LineKey> = self
            .cache
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_use) > LINE_IDLE)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.cache.pop(key);
        }
        stale.len()
    }

    /// Drop everything shaped with a face (the face was evicted).
    pub fn drop_face(&mut self, face: &FaceKey) {
        let stale: Vec<LineKey> = self
            .cache
            .iter()
            .filter(|(k, _)| &k.face == face)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.cache.pop(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::font::FixedFontLoader;

    fn fixed() -> FontStore {
        FontStore::new(Box::new(FixedFontLoader::new(10.0)))
    }

    fn lines(text: &str, wrap: f32, formatting: bool) -> ShapedText {
        shape(&mut fixed(), text, &FontProps::default(), Color::WHITE, formatting, wrap, Instant::now())
    }

    #[test]
    fn wraps_at_word_boundaries() {
        let s = lines("hello world this is a test", 70.0, false);
        assert_eq!(s.lines, vec![0..5, 6..11, 12..19, 20..26]);
        assert_eq!(s.max_width, 70.0);
    }

    #[test]
    fn long_word_breaks_at_last_fitting_char() {
        let s = lines("abcdefghij", 40.0, false);
        assert_eq!(s.lines, vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn hard_newlines_split() {
        let text = "ab\n\ncd";
        let s = lines(text, 0.0, false);
        assert_eq!(s.lines, vec![0..2, 3..3, 4..6]);
        let joined: Vec<&str> = s.lines.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(joined.join("\n"), text);
    }

    #[test]
    fn advances_are_monotonic_with_multibyte() {
        let s = lines("aé<b>x</b>€\nz", 0.0, true);
        assert!(s.advances.windows(2).all(|w| w[0] <= w[1]));
        // 'é' is two bytes sharing one advance.
        assert_eq!(s.advances[1], s.advances[2]);
        assert_eq!(s.advances[1], 20.0);
    }

    #[test]
    fn escapes_have_no_advance() {
        let s = lines("a<b>bold</b>c", 0.0, true);
        assert_eq!(s.max_width, 60.0);
        assert!(s.skip[1] && s.skip[3] && !s.skip[4]);
        assert_eq!(s.style_at(5).map(|st| st.weight), Some(700));
        assert_eq!(s.style_at(12).map(|st| st.weight), Some(400));
    }

    #[test]
    fn rgba_escape_records_color_change() {
        let s = lines("x<rgba 255,0,0,255>r</rgba>", 0.0, true);
        assert_eq!(s.colors[1], (19, Color::rgba(255, 0, 0, 255)));
        assert_eq!(s.colors.last().map(|c| c.1), Some(Color::WHITE));
    }

    #[test]
    fn cursor_pixel_roundtrip() {
        let s = lines("hello world", 0.0, false);
        assert_eq!(s.cursor_x(3), 30.0);
        assert_eq!(s.cursor_at(0, 34.0, false), 3);
        assert_eq!(s.cursor_at(0, 36.0, true), 4);
        assert_eq!(s.cursor_at(0, 999.0, true), 11);
    }

    #[test]
    fn wrapped_lines_cover_the_whole_text() {
        let texts = [
            "hello world this is a test",
            "a  b   c    dddddddddddd e",
            "punct,uation.and-dashes/slashes here",
            "aé€ü wörds\nnext  line\n\nend ",
            "x<b>bold words</b> and <rgba 255,0,0,255>red text</rgba>!",
            " leading and trailing ",
        ];
        for text in texts {
            for formatting in [false, true] {
                for wrap in [0.0, 5.0, 10.0, 15.0, 25.0, 40.0, 65.0, 130.0] {
                    let s = lines(text, wrap, formatting);
                    let mut at = 0;
                    for (n, line) in s.lines.iter().enumerate() {
                        assert!(line.start >= at && line.start <= line.end, "{text:?} at {wrap}: {:?}", s.lines);
                        let gap = &text[at..line.start];
                        // Only a wrap space or a newline sits between lines.
                        let allowed = if n == 0 { gap.is_empty() } else { matches!(gap, "" | " " | "\n") };
                        assert!(allowed, "{text:?} at {wrap}: gap {gap:?} before line {n}");
                        at = line.end;
                    }
                    assert_eq!(at, text.len(), "{text:?} at {wrap}: dropped tail");
                    let hard = text.matches('\n').count();
                    let breaks = s.lines.windows(2).filter(|w| &text[w[0].end..w[1].start] == "\n").count();
                    assert_eq!(breaks, hard, "{text:?} at {wrap}");
                }
            }
        }
    }

    #[test]
    fn cursor_x_on_wrapped_line() {
        let s = lines("hello world", 60.0, false);
        assert_eq!(s.lines, vec![0..5, 6..11]);
        assert_eq!(s.line_of(8), 1);
        assert_eq!(s.cursor_x(8), 20.0);
    }

    #[test]
    fn cache_evicts_idle_lines() {
        let mut fonts = fixed();
        let mut cache = LineCache::new();
        let t0 = Instant::now();
        let props = FontProps::default();
        let a = cache.get_or_shape(&mut fonts, "abc", &props, Color::WHITE, false, 0.0, t0);
        let b = cache.get_or_shape(&mut fonts, "abc", &props, Color::WHITE, false, 0.0, t0);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.evict(t0 + Duration::from_secs(31)), 1);
        assert!(cache.is_empty());
    }
}
