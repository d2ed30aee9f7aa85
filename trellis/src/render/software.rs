//! CPU rasterizer.
//!
//! Renders a sorted paint list into an RGBA image. Used by the headless
//! backend and by tests; shapes are anti-aliased with distance fields.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use image::{Rgba, RgbaImage};

use super::{TextureFormat, TextureId, TextureStore};
use crate::error::{Result, TrellisError};
use crate::paint::{PaintItem, Primitive, TextRun};
use crate::primitives::{Color, Rect, Vec2f};
use crate::text::{GlyphKey, TextEngine};

/// Segments used to flatten one cubic curve.
const BEZIER_STEPS: usize = 32;

struct Texture {
    width: u32,
    height: u32,
    format: TextureFormat,
    data: Vec<u8>,
}

/// Owns the framebuffer and every uploaded texture.
pub struct SoftwareRenderer {
    canvas: RgbaImage,
    textures: HashMap<u32, Texture>,
    next_id: u32,
    clear: Color,
}

impl TextureStore for SoftwareRenderer {
    fn upload(&mut self, width: u32, height: u32, format: TextureFormat, data: &[u8]) -> TextureId {
        self.next_id += 1;
        let id = self.next_id;
        self.textures.insert(id, Texture { width, height, format, data: data.to_vec() });
        TextureId(id)
    }

    fn release(&mut self, id: TextureId) {
        self.textures.remove(&id.0);
    }

    fn live(&self) -> usize {
        self.textures.len()
    }
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width.max(1), height.max(1)),
            textures: HashMap::new(),
            next_id: 0,
            clear: Color::rgba(24, 24, 28, 255),
        }
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear = color;
    }

    /// Resize the framebuffer. Textures survive.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.dimensions() != (width.max(1), height.max(1)) {
            self.canvas = RgbaImage::new(width.max(1), height.max(1));
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let (w, h) = self.canvas.dimensions();
        if x >= w || y >= h {
            return None;
        }
        let Rgba([r, g, b, a]) = *self.canvas.get_pixel(x, y);
        Some(Color::rgba(r, g, b, a))
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.canvas
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| TrellisError::Decode(e.to_string()))
    }

    /// Rasterize a paint list (already sorted by depth).
    pub fn render(&mut self, items: &[PaintItem], text: &mut TextEngine, now: Instant) {
        let clear = Rgba([self.clear.r, self.clear.g, self.clear.b, self.clear.a]);
        for p in self.canvas.pixels_mut() {
            *p = clear;
        }
        let (w, h) = self.canvas.dimensions();
        let bounds = Rect::new(0, 0, w as i32, h as i32);
        for item in items {
            let clip = item.clip.intersect(&bounds);
            if clip.is_empty() {
                continue;
            }
            self.primitive(&item.primitive, clip, text, now);
        }
    }

    fn primitive(&mut self, prim: &Primitive, clip: Rect, text: &mut TextEngine, now: Instant) {
        match prim {
            Primitive::Rect { rect, color }
            | Primitive::TextBackground { rect, color }
            | Primitive::TextCursor { rect, color } => self.fill_rect(*rect, clip, *color),
            Primitive::RoundedRect { rect, radius, color } => {
                self.shade(*rect, clip, |x, y| coverage(rounded_distance(*rect, *radius, x, y)), *color);
            }
            Primitive::Border { rect, thickness, radius, color } => {
                let t = *thickness as f32;
                self.shade(
                    *rect,
                    clip,
                    |x, y| {
                        let d = rounded_distance(*rect, *radius, x, y);
                        coverage(d) * coverage(-(d + t))
                    },
                    *color,
                );
            }
            Primitive::Line { a, b, thickness, color } => self.segment(*a, *b, *thickness, clip, *color),
            Primitive::Bezier { points, thickness, dash, offset, color } => {
                self.bezier(points, *thickness, *dash, *offset, clip, *color);
            }
            Primitive::Circle { center, radius, thickness, filled, color } => {
                let (c, r, t) = (*center, *radius, *thickness);
                let pad = r + t + 1.0;
                let area = Rect::new((c.x - pad) as i32, (c.y - pad) as i32, (2.0 * pad) as i32 + 1, (2.0 * pad) as i32 + 1);
                let filled = *filled;
                self.shade(
                    area,
                    clip,
                    |x, y| {
                        let d = (Vec2f::new(x, y) - c).length() - r;
                        if filled { coverage(d) } else { coverage(d.abs() - t / 2.0) }
                    },
                    *color,
                );
            }
            Primitive::Image { rect, texture, tint } => self.blit_image(*rect, *texture, *tint, clip),
            Primitive::Text { run } => self.text(run, clip, text, now),
            Primitive::Brush { points, thickness, color } => {
                for pair in points.windows(2) {
                    self.segment(pair[0], pair[1], *thickness, clip, *color);
                }
                if let [p] = points.as_slice() {
                    self.segment(*p, *p, *thickness, clip, *color);
                }
            }
        }
    }

    fn blend(&mut self, x: i32, y: i32, color: Color, alpha: f32) {
        let a = (color.a as f32 / 255.0) * alpha.clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let px = self.canvas.get_pixel_mut(x as u32, y as u32);
        let Rgba([r, g, b, da]) = *px;
        let mix = |d: u8, s: u8| (s as f32 * a + d as f32 * (1.0 - a)).round() as u8;
        let out_a = (a * 255.0 + da as f32 * (1.0 - a)).round().min(255.0) as u8;
        *px = Rgba([mix(r, color.r), mix(g, color.g), mix(b, color.b), out_a]);
    }

    fn fill_rect(&mut self, rect: Rect, clip: Rect, color: Color) {
        let area = rect.intersect(&clip);
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                self.blend(x, y, color, 1.0);
            }
        }
    }

    /// Evaluate `cov` at pixel centres of `area ∩ clip`.
    fn shade(&mut self, area: Rect, clip: Rect, cov: impl Fn(f32, f32) -> f32, color: Color) {
        let area = area.intersect(&clip);
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let c = cov(x as f32 + 0.5, y as f32 + 0.5);
                if c > 0.0 {
                    self.blend(x, y, color, c);
                }
            }
        }
    }

    fn segment(&mut self, a: Vec2f, b: Vec2f, thickness: f32, clip: Rect, color: Color) {
        let half = (thickness / 2.0).max(0.5);
        let area = Rect::bounding(&[a, b]).extend(half.ceil() as i32 + 1);
        self.shade(area, clip, |x, y| coverage(segment_distance(Vec2f::new(x, y), a, b) - half), color);
    }

    fn bezier(&mut self, p: &[Vec2f; 4], thickness: f32, dash: f32, offset: f32, clip: Rect, color: Color) {
        let eval = |t: f32| {
            let u = 1.0 - t;
            p[0] * (u * u * u) + p[1] * (3.0 * u * u * t) + p[2] * (3.0 * u * t * t) + p[3] * (t * t * t)
        };
        let mut pts: Vec<Vec2f> = (0..=BEZIER_STEPS).map(|i| eval(i as f32 / BEZIER_STEPS as f32)).collect();
        if offset != 0.0 {
            let shifted: Vec<Vec2f> = (0..pts.len())
                .map(|i| {
                    let prev = pts[i.saturating_sub(1)];
                    let next = pts[(i + 1).min(pts.len() - 1)];
                    pts[i] + (next - prev).normal() * offset
                })
                .collect();
            pts = shifted;
        }
        let mut walked = 0.0;
        for pair in pts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let len = (b - a).length();
            if dash <= 0.0 {
                self.segment(a, b, thickness, clip, color);
            } else {
                // Split the segment on dash boundaries; even periods are drawn.
                let mut s = 0.0;
                while s < len {
                    let pos = walked + s;
                    let period = (pos / dash).floor();
                    let until = ((period + 1.0) * dash - walked).min(len);
                    if period as i64 % 2 == 0 {
                        let f0 = s / len;
                        let f1 = until / len;
                        self.segment(a + (b - a) * f0, a + (b - a) * f1, thickness, clip, color);
                    }
                    s = until.max(s + 0.01);
                }
            }
            walked += len;
        }
    }

    fn blit_image(&mut self, rect: Rect, texture: TextureId, tint: Color, clip: Rect) {
        let Some(tex) = self.textures.get(&texture.0) else {
            return;
        };
        if rect.w <= 0 || rect.h <= 0 || tex.width == 0 || tex.height == 0 {
            return;
        }
        let (tw, th, format) = (tex.width, tex.height, tex.format);
        let data = tex.data.clone();
        let area = rect.intersect(&clip);
        for y in area.y..area.bottom() {
            let ty = (((y - rect.y) as i64 * th as i64) / rect.h as i64).clamp(0, th as i64 - 1) as usize;
            for x in area.x..area.right() {
                let tx = (((x - rect.x) as i64 * tw as i64) / rect.w as i64).clamp(0, tw as i64 - 1) as usize;
                let i = ty * tw as usize + tx;
                let (color, alpha) = match format {
                    TextureFormat::Rgba => {
                        let s = &data[i * 4..i * 4 + 4];
                        let c = Color::rgba(
                            (s[0] as u16 * tint.r as u16 / 255) as u8,
                            (s[1] as u16 * tint.g as u16 / 255) as u8,
                            (s[2] as u16 * tint.b as u16 / 255) as u8,
                            (s[3] as u16 * tint.a as u16 / 255) as u8,
                        );
                        (c, 1.0)
                    }
                    TextureFormat::Alpha => (tint, data[i] as f32 / 255.0),
                };
                self.blend(x, y, color, alpha);
            }
        }
    }

    fn text(&mut self, run: &TextRun, clip: Rect, engine: &mut TextEngine, now: Instant) {
        let shaped = run.shaped.clone();
        let base = run.props.face_key();
        for (i, line) in shaped.lines.iter().enumerate() {
            let offset = run.line_offsets.get(i).copied().unwrap_or(0);
            let baseline = run.origin.y + i as i32 * run.line_height + run.ascent;
            if baseline - run.line_height > clip.bottom() || baseline + run.line_height < clip.y {
                continue;
            }
            let start = shaped.pos(line.start);
            for (b, ch) in run.text[line.clone()].char_indices() {
                let byte = line.start + b;
                if shaped.skip.get(byte).copied().unwrap_or(false) || ch.is_whitespace() {
                    continue;
                }
                let style = shaped.style_at(byte);
                let mut face = base.clone();
                let mut height = run.props.height;
                let mut color = Color::WHITE;
                if let Some(s) = style {
                    face.weight = s.weight;
                    face.italic = s.italic;
                    height *= s.scale;
                    color = s.color;
                }
                let key = GlyphKey { face, height: height.round().clamp(1.0, 1000.0) as u16, ch };
                let Some(glyph) = engine.glyph(self, &key, now) else {
                    continue;
                };
                let m = glyph.metrics;
                let x = run.origin.x + offset + (shaped.pos(byte) - start).round() as i32 + m.xmin;
                let y = baseline - m.ymin - m.height as i32;
                self.blit_image(Rect::new(x, y, m.width as i32, m.height as i32), glyph.texture, color, clip);
            }
        }
    }
}

/// Pixel coverage for a signed distance (negative inside).
fn coverage(d: f32) -> f32 {
    (0.5 - d).clamp(0.0, 1.0)
}

/// Signed distance to a rounded rectangle.
fn rounded_distance(rect: Rect, radius: f32, x: f32, y: f32) -> f32 {
    let half = Vec2f::new(rect.w as f32 / 2.0, rect.h as f32 / 2.0);
    let r = radius.clamp(0.0, half.x.min(half.y));
    let c = Vec2f::new(rect.x as f32 + half.x, rect.y as f32 + half.y);
    let qx = (x - c.x).abs() - half.x + r;
    let qy = (y - c.y).abs() - half.y + r;
    let outside = Vec2f::new(qx.max(0.0), qy.max(0.0)).length();
    outside + qx.max(qy).min(0.0) - r
}

fn segment_distance(p: Vec2f, a: Vec2f, b: Vec2f) -> f32 {
    let ab = b - a;
    let len2 = ab.x * ab.x + ab.y * ab.y;
    let t = if len2 <= f32::EPSILON { 0.0 } else { (((p - a).x * ab.x + (p - a).y * ab.y) / len2).clamp(0.0, 1.0) };
    (p - (a + ab * t)).length()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::PaintBuffer;
    use crate::text::FixedFontLoader;

    fn engine() -> TextEngine {
        TextEngine::new(Box::new(FixedFontLoader::new(8.0)))
    }

    #[test]
    fn rect_respects_clip() {
        let mut r = SoftwareRenderer::new(4, 4);
        r.set_clear_color(Color::BLACK);
        let mut paint = PaintBuffer::new(Rect::new(0, 0, 4, 4));
        paint.push_clip(Rect::new(0, 0, 2, 4));
        paint.rect(Rect::new(0, 0, 4, 4), Color::WHITE);
        r.render(&paint.finish(), &mut engine(), Instant::now());
        assert_eq!(r.pixel(1, 1), Some(Color::WHITE));
        assert_eq!(r.pixel(3, 1), Some(Color::BLACK));
        assert_eq!(r.pixel(4, 0), None);
    }

    #[test]
    fn later_depth_paints_over() {
        let mut r = SoftwareRenderer::new(4, 4);
        let mut paint = PaintBuffer::new(Rect::new(0, 0, 4, 4));
        paint.next_layer();
        paint.rect(Rect::new(0, 0, 4, 4), Color::RED);
        paint.set_depth(0);
        paint.rect(Rect::new(0, 0, 4, 4), Color::WHITE);
        r.render(&paint.finish(), &mut engine(), Instant::now());
        assert_eq!(r.pixel(2, 2), Some(Color::RED));
    }

    #[test]
    fn textures_are_tracked() {
        let mut r = SoftwareRenderer::new(4, 4);
        let id = r.upload(1, 1, TextureFormat::Rgba, &[1, 2, 3, 4]);
        assert_eq!(r.live(), 1);
        r.release(id);
        r.release(id);
        assert_eq!(r.live(), 0);
    }

    #[test]
    fn circle_outline_leaves_centre_clear() {
        let mut r = SoftwareRenderer::new(21, 21);
        r.set_clear_color(Color::BLACK);
        let mut paint = PaintBuffer::new(Rect::new(0, 0, 21, 21));
        paint.circle(Vec2f::new(10.5, 10.5), 8.0, 2.0, false, Color::WHITE);
        r.render(&paint.finish(), &mut engine(), Instant::now());
        assert_eq!(r.pixel(10, 10), Some(Color::BLACK));
        assert_eq!(r.pixel(18, 10), Some(Color::WHITE));
    }
}
