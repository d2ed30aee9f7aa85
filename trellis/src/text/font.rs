//! Font faces.
//!
//! A face is identified by (family, weight, italic). Faces are loaded on
//! first use through a [`FontLoader`] and dropped after 30 s without use.
//! The pixel height is a per-glyph parameter: fontdue faces rasterize at
//! any size, so one face serves every height.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fontdue::{Font, FontSettings};

use crate::error::{Result, TrellisError};

/// Faces unused for this long are evicted.
pub const FACE_IDLE: Duration = Duration::from_secs(30);

/// Font properties carried by text draw calls and styles.
#[derive(Debug, Clone, PartialEq)]
pub struct FontProps {
    pub family: String,
    /// 100..=900.
    pub weight: u16,
    pub italic: bool,
    /// Pixel height.
    pub height: f32,
}

impl Default for FontProps {
    fn default() -> Self {
        Self { family: "Inter".into(), weight: 400, italic: false, height: 16.0 }
    }
}

impl FontProps {
    pub fn new(family: impl Into<String>, weight: u16, italic: bool, height: f32) -> Self {
        Self { family: family.into(), weight: clamp_weight(weight), italic, height }
    }

    pub fn face_key(&self) -> FaceKey {
        FaceKey { family: self.family.clone(), weight: clamp_weight(self.weight), italic: self.italic }
    }

    /// Height rounded to whole pixels (glyph and line cache key component).
    pub fn height_px(&self) -> u16 {
        self.height.round().clamp(1.0, 1000.0) as u16
    }

    /// Hashable form of the props (height rounded to whole pixels).
    pub fn key(&self) -> (FaceKey, u16) {
        (self.face_key(), self.height_px())
    }
}

/// Round a weight to the nearest hundred inside 100..=900.
pub fn clamp_weight(weight: u16) -> u16 {
    (((weight as u32 + 50) / 100) * 100).clamp(100, 900) as u16
}

/// Identity of a loaded face.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceKey {
    pub family: String,
    pub weight: u16,
    pub italic: bool,
}

/// Bitmap placement of a rasterized glyph.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlyphMetrics {
    pub advance: f32,
    pub width: u32,
    pub height: u32,
    /// Left bearing.
    pub xmin: i32,
    /// Offset of the bitmap bottom from the baseline (positive = up).
    pub ymin: i32,
}

/// A loaded face.
pub enum Face {
    /// Outline font parsed by fontdue.
    Outline(Box<Font>),
    /// Every glyph has the same advance; glyphs rasterize as solid boxes.
    Fixed { advance: f32 },
}

impl Face {
    pub fn advance(&self, ch: char, px: f32) -> f32 {
        if ch == '\n' {
            return 0.0;
        }
        match self {
            Face::Outline(font) => font.metrics(ch, px).advance_width,
            Face::Fixed { advance } => *advance,
        }
    }

    pub fn kern(&self, prev: char, ch: char, px: f32) -> f32 {
        match self {
            Face::Outline(font) => font.horizontal_kern(prev, ch, px).unwrap_or(0.0),
            Face::Fixed { .. } => 0.0,
        }
    }

    /// (ascent, descent) in pixels; descent is negative.
    pub fn line_metrics(&self, px: f32) -> (f32, f32) {
        match self {
            Face::Outline(font) => font
                .horizontal_line_metrics(px)
                .map(|m| (m.ascent, m.descent))
                .unwrap_or((px * 0.8, -px * 0.2)),
            Face::Fixed { .. } => (px * 0.8, -px * 0.2),
        }
    }

    /// Rasterize one glyph into an alpha bitmap.
    pub fn rasterize(&self, ch: char, px: f32) -> (GlyphMetrics, Vec<u8>) {
        match self {
            Face::Outline(font) => {
                let (m, bitmap) = font.rasterize(ch, px);
                let metrics = GlyphMetrics {
                    advance: m.advance_width,
                    width: m.width as u32,
                    height: m.height as u32,
                    xmin: m.xmin,
                    ymin: m.ymin,
                };
                (metrics, bitmap)
            }
            Face::Fixed { advance } => {
                if ch.is_whitespace() {
                    return (GlyphMetrics { advance: *advance, ..Default::default() }, Vec::new());
                }
                let w = (advance * 0.7).max(1.0) as u32;
                let h = (px * 0.6).max(1.0) as u32;
                let metrics = GlyphMetrics {
                    advance: *advance,
                    width: w,
                    height: h,
                    xmin: ((advance - w as f32) / 2.0) as i32,
                    ymin: 0,
                };
                (metrics, vec![255; (w * h) as usize])
            }
        }
    }
}

/// Loads face data for a (family, weight, italic) triple.
pub trait FontLoader: Send {
    fn load(&self, key: &FaceKey) -> Result<Face>;
}

/// Loads `<dir>/<Family>-<Style>.ttf` (or `.otf`) files.
///
/// `Style` is the conventional weight name (`Regular`, `Bold`, ...) with
/// `Italic` appended. A missing weight falls back to `Regular`.
pub struct DirFontLoader {
    dir: PathBuf,
}

impl DirFontLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates(&self, key: &FaceKey) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for weight in [key.weight, 400] {
            let style = style_name(weight, key.italic);
            for ext in ["ttf", "otf"] {
                out.push(self.dir.join(format!("{}-{}.{}", key.family, style, ext)));
            }
        }
        out
    }
}

impl FontLoader for DirFontLoader {
    fn load(&self, key: &FaceKey) -> Result<Face> {
        let path = self
            .candidates(key)
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| TrellisError::Font(format!("no font file for {} {} in {}", key.family, key.weight, self.dir.display())))?;
        let bytes = std::fs::read(&path)?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| TrellisError::Font(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded font face");
        Ok(Face::Outline(Box::new(font)))
    }
}

/// Produces fixed-advance faces. Used headless and in tests.
pub struct FixedFontLoader {
    pub advance: f32,
}

impl FixedFontLoader {
    pub fn new(advance: f32) -> Self {
        Self { advance }
    }
}

impl FontLoader for FixedFontLoader {
    fn load(&self, _key: &FaceKey) -> Result<Face> {
        Ok(Face::Fixed { advance: self.advance })
    }
}

/// Conventional style suffix for a weight.
pub fn style_name(weight: u16, italic: bool) -> String {
    let base = match clamp_weight(weight) {
        100 => "Thin",
        200 => "ExtraLight",
        300 => "Light",
        500 => "Medium",
        600 => "SemiBold",
        700 => "Bold",
        800 => "ExtraBold",
        900 => "Black",
        _ => "Regular",
    };
    match (base, italic) {
        ("Regular", true) => "Italic".to_string(),
        (b, true) => format!("{b}Italic"),
        (b, false) => b.to_string(),
    }
}

struct FaceSlot {
    face: Arc<Face>,
    last_use: Instant,
}

/// Lazily loaded faces with idle eviction.
pub struct FontStore {
    loader: Box<dyn FontLoader>,
    faces: HashMap<FaceKey, FaceSlot>,
    last_error: Option<String>,
}

impl FontStore {
    pub fn new(loader: Box<dyn FontLoader>) -> Self {
        Self { loader, faces: HashMap::new(), last_error: None }
    }

    /// Get (loading if needed) the face for `key`.
    ///
    /// A face that fails to load is replaced by a fixed-advance face so text
    /// still lays out; the error is kept for display.
    pub fn face(&mut self, key: &FaceKey, px: f32, now: Instant) -> Arc<Face> {
        if let Some(slot) = self.faces.get_mut(key) {
            slot.last_use = now;
            return slot.face.clone();
        }
        let face = match self.loader.load(key) {
            Ok(face) => face,
            Err(e) => {
                tracing::warn!(family = %key.family, weight = key.weight, "font load failed: {e}");
                self.last_error = Some(e.to_string());
                Face::Fixed { advance: (px * 0.5).max(1.0) }
            }
        };
        let face = Arc::new(face);
        self.faces.insert(key.clone(), FaceSlot { face: face.clone(), last_use: now });
        face
    }

    pub fn is_loaded(&self, key: &FaceKey) -> bool {
        self.faces.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Drop faces idle for longer than [`FACE_IDLE`]; returns their keys.
    pub fn evict(&mut self, now: Instant) -> Vec<FaceKey> {
        let stale: Vec<FaceKey> = self
            .faces
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.last_use) > FACE_IDLE)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.faces.remove(key);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_names() {
        assert_eq!(style_name(400, false), "Regular");
        assert_eq!(style_name(400, true), "Italic");
        assert_eq!(style_name(700, true), "BoldItalic");
        assert_eq!(style_name(640, false), "SemiBold");
    }

    #[test]
    fn weight_is_clamped() {
        assert_eq!(clamp_weight(0), 100);
        assert_eq!(clamp_weight(1200), 900);
        assert_eq!(clamp_weight(449), 400);
    }

    #[test]
    fn faces_evict_after_idle() {
        let mut store = FontStore::new(Box::new(FixedFontLoader::new(10.0)));
        let t0 = Instant::now();
        let key = FontProps::default().face_key();
        store.face(&key, 16.0, t0);
        assert!(store.evict(t0 + Duration::from_secs(10)).is_empty());
        let gone = store.evict(t0 + Duration::from_secs(31));
        assert_eq!(gone, vec![key.clone()]);
        assert!(!store.is_loaded(&key));
    }

    #[test]
    fn missing_dir_font_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FontStore::new(Box::new(DirFontLoader::new(dir.path())));
        let face = store.face(&FontProps::default().face_key(), 20.0, Instant::now());
        assert_eq!(face.advance('a', 20.0), 10.0);
        assert!(store.last_error().is_some());
    }
}
