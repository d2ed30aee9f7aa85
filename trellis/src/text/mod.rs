//! Text: faces, formatting escapes, shaping and glyphs.

pub mod font;
pub mod format;
pub mod glyph_cache;
pub mod shape;

use std::sync::Arc;
use std::time::Instant;

pub use font::{DirFontLoader, FaceKey, FixedFontLoader, FontLoader, FontProps, FontStore};
pub use glyph_cache::{GlyphCache, GlyphDraw, GlyphKey};
pub use shape::{LineCache, ShapedText};

use crate::paint::TextRun;
use crate::primitives::{Align, Color, Rect, Vec2i};
use crate::render::TextureStore;

/// Line height as a multiple of the font height.
const LINE_SPACING: f32 = 1.25;

/// Owns every text cache. Lives on the UI thread.
pub struct TextEngine {
    pub fonts: FontStore,
    pub glyphs: GlyphCache,
    pub lines: LineCache,
}

impl TextEngine {
    pub fn new(loader: Box<dyn FontLoader>) -> Self {
        Self { fonts: FontStore::new(loader), glyphs: GlyphCache::new(), lines: LineCache::new() }
    }

    /// Shape (cached) `text`.
    pub fn shape(
        &mut self,
        text: &str,
        props: &FontProps,
        color: Color,
        formatting: bool,
        wrap: f32,
        now: Instant,
    ) -> Arc<ShapedText> {
        self.lines.get_or_shape(&mut self.fonts, text, props, color, formatting, wrap, now)
    }

    /// Shape `text` and lay it out inside `rect` with the given alignment.
    /// `wrap` wraps at the rect width.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        text: &str,
        props: &FontProps,
        color: Color,
        formatting: bool,
        wrap: bool,
        rect: Rect,
        align: (Align, Align),
        now: Instant,
    ) -> TextRun {
        let width = if wrap { rect.w.max(1) as f32 } else { 0.0 };
        let shaped = self.shape(text, props, color, formatting, width, now);
        let line_height = self.line_height(props) as i32;
        let ascent = self.ascent(props, now).round() as i32;
        let total = line_height * shaped.lines.len().max(1) as i32;
        let line_offsets = (0..shaped.lines.len())
            .map(|i| align.0.offset(rect.w, shaped.line_width(i).ceil() as i32))
            .collect();
        TextRun {
            text: text.into(),
            origin: Vec2i::new(rect.x, rect.y + align.1.offset(rect.h, total)),
            shaped,
            props: props.clone(),
            line_height,
            ascent,
            line_offsets,
        }
    }

    /// Width of the widest line of `text` without wrapping.
    pub fn text_width(&mut self, text: &str, props: &FontProps, formatting: bool, now: Instant) -> f32 {
        self.shape(text, props, Color::WHITE, formatting, 0.0, now).max_width
    }

    /// Distance between baselines.
    pub fn line_height(&self, props: &FontProps) -> f32 {
        (props.height * LINE_SPACING).ceil()
    }

    /// Ascent of the face used for `props`.
    pub fn ascent(&mut self, props: &FontProps, now: Instant) -> f32 {
        let face = self.fonts.face(&props.face_key(), props.height, now);
        face.line_metrics(props.height).0
    }

    pub fn glyph(
        &mut self,
        textures: &mut dyn TextureStore,
        key: &GlyphKey,
        now: Instant,
    ) -> Option<GlyphDraw> {
        self.glyphs.draw(&mut self.fonts, textures, key, now)
    }

    /// Time-based eviction of faces, glyph textures and shaped lines.
    pub fn evict(&mut self, textures: &mut dyn TextureStore, now: Instant) {
        for face in self.fonts.evict(now) {
            tracing::debug!(family = %face.family, weight = face.weight, "evicting idle face");
            self.glyphs.drop_face(&face, textures);
            self.lines.drop_face(&face);
        }
        self.glyphs.evict_textures(textures, now);
        self.lines.evict(now);
    }
}
