//! Rasterized glyph cache.
//!
//! Glyphs are rasterized on first request and kept while their face is
//! alive. The texture is uploaded lazily on first draw and released after
//! 30 s without a draw; the CPU bitmap stays so a later draw re-uploads
//! without rasterizing again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::font::{FaceKey, FontStore, GlyphMetrics};
use crate::render::{TextureFormat, TextureId, TextureStore};

/// Glyph textures unused for this long are released.
pub const GLYPH_TEXTURE_IDLE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlyphKey {
    pub face: FaceKey,
    pub height: u16,
    pub ch: char,
}

pub struct GlyphEntry {
    pub metrics: GlyphMetrics,
    pub bitmap: Vec<u8>,
    pub texture: Option<TextureId>,
    pub last_use: Instant,
}

/// A glyph ready to blit.
#[derive(Debug, Clone, Copy)]
pub struct GlyphDraw {
    pub texture: TextureId,
    pub metrics: GlyphMetrics,
}

#[derive(Default)]
pub struct GlyphCache {
    glyphs: HashMap<GlyphKey, GlyphEntry>,
}

impl GlyphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Get or rasterize a glyph.
    pub fn entry(&mut self, fonts: &mut FontStore, key: &GlyphKey, now: Instant) -> &mut GlyphEntry {
        let entry = self.glyphs.entry(key.clone()).or_insert_with(|| {
            let px = key.height as f32;
            let face = fonts.face(&key.face, px, now);
            let (metrics, bitmap) = face.rasterize(key.ch, px);
            GlyphEntry { metrics, bitmap, texture: None, last_use: now }
        });
        entry.last_use = now;
        entry
    }

    /// Glyph with its texture, uploading on first draw. Blank glyphs
    /// (spaces) have no texture and return `None`.
    pub fn draw(
        &mut self,
        fonts: &mut FontStore,
        textures: &mut dyn TextureStore,
        key: &GlyphKey,
        now: Instant,
    ) -> Option<GlyphDraw> {
        let entry = self.entry(fonts, key, now);
        if entry.bitmap.is_empty() {
            return None;
        }
        let texture = match entry.texture {
            Some(t) => t,
            None => {
                let m = entry.metrics;
                let t = textures.upload(m.width, m.height, TextureFormat::Alpha, &entry.bitmap);
                entry.texture = Some(t);
                t
            }
        };
        Some(GlyphDraw { texture, metrics: entry.metrics })
    }

    /// Release textures idle for longer than [`GLYPH_TEXTURE_IDLE`].
    pub fn evict_textures(&mut self, textures: &mut dyn TextureStore, now: Instant) -> usize {
        let mut released = 0;
        for entry in self.glyphs.values_mut() {
            if now.saturating_duration_since(entry.last_use) > GLYPH_TEXTURE_IDLE {
                if let Some(t) = entry.texture.take() {
                    textures.release(t);
                    released += 1;
                }
            }
        }
        released
    }

    /// Drop every glyph of an evicted face.
    pub fn drop_face(&mut self, face: &FaceKey, textures: &mut dyn TextureStore) {
        self.glyphs.retain(|key, entry| {
            if &key.face != face {
                return true;
            }
            if let Some(t) = entry.texture.take() {
                textures.release(t);
            }
            false
        });
    }

    pub fn textures_live(&self) -> usize {
        self.glyphs.values().filter(|e| e.texture.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::SoftwareRenderer;
    use crate::text::font::{FixedFontLoader, FontProps};

    fn key(ch: char) -> GlyphKey {
        GlyphKey { face: FontProps::default().face_key(), height: 16, ch }
    }

    #[test]
    fn texture_uploaded_once_and_released_when_idle() {
        let mut fonts = FontStore::new(Box::new(FixedFontLoader::new(8.0)));
        let mut store = SoftwareRenderer::new(4, 4);
        let mut cache = GlyphCache::new();
        let t0 = Instant::now();

        let a = cache.draw(&mut fonts, &mut store, &key('a'), t0).unwrap();
        let b = cache.draw(&mut fonts, &mut store, &key('a'), t0).unwrap();
        assert_eq!(a.texture, b.texture);
        assert_eq!(store.live(), 1);
        assert!(cache.draw(&mut fonts, &mut store, &key(' '), t0).is_none());

        assert_eq!(cache.evict_textures(&mut store, t0 + Duration::from_secs(31)), 1);
        assert_eq!(store.live(), 0);
        // Entry survives, only the texture is gone.
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.textures_live(), 0);
    }

    #[test]
    fn dropping_face_removes_glyphs() {
        let mut fonts = FontStore::new(Box::new(FixedFontLoader::new(8.0)));
        let mut store = SoftwareRenderer::new(4, 4);
        let mut cache = GlyphCache::new();
        cache.draw(&mut fonts, &mut store, &key('x'), Instant::now());
        cache.drop_face(&FontProps::default().face_key(), &mut store);
        assert!(cache.is_empty());
        assert_eq!(store.live(), 0);
    }
}
