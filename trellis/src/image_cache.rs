//! Decoded image cache.
//!
//! The first reference to an image starts a decode on a worker thread and
//! reports [`ImageStatus::Loading`]. Finished decodes are handed back
//! through a shared record; the UI thread drains it at frame start, uploads
//! pixels lazily on the next draw and raises the redraw flag.
//!
//! Entries unused for 60 s drop their texture and pixels but keep their
//! size, so layout stays stable while the next draw re-decodes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Result, TrellisError};
use crate::hash::content_hash;
use crate::primitives::{Align, Rect, Vec2i};
use crate::render::{TextureFormat, TextureId, TextureStore};

/// Image textures unused for this long are released.
pub const IMAGE_IDLE: Duration = Duration::from_secs(60);

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    File(PathBuf),
    /// Content hash of an in-memory blob.
    Blob(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub source: ImageSource,
    /// Per-instance player id (audio/video previews share a source).
    pub player: Option<u64>,
}

/// RGBA8 pixels.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Image decoding seam. Called from worker threads.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage>;

    fn decode_file(&self, path: &Path) -> Result<DecodedImage> {
        let bytes = std::fs::read(path)?;
        self.decode(&bytes)
    }
}

/// Decoder backed by the `image` crate.
pub struct ImageCrateDecoder;

impl Decoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        let img = image::load_from_memory(bytes).map_err(|e| TrellisError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(DecodedImage { width, height, rgba: rgba.into_raw() })
    }
}

/// What a draw call gets back.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageStatus {
    Ready { texture: TextureId, size: Vec2i },
    Loading,
    Failed(String),
}

struct ImageEntry {
    size: Option<Vec2i>,
    pixels: Option<Vec<u8>>,
    texture: Option<TextureId>,
    loading: bool,
    error: Option<String>,
    last_draw: Instant,
}

type Finished = Vec<(ImageKey, std::result::Result<DecodedImage, String>)>;

pub struct ImageCache {
    decoder: Arc<dyn Decoder>,
    entries: HashMap<ImageKey, ImageEntry>,
    blobs: HashMap<u64, Arc<Vec<u8>>>,
    finished: Arc<Mutex<Finished>>,
    redraw: Arc<AtomicBool>,
}

impl ImageCache {
    pub fn new(decoder: Arc<dyn Decoder>) -> Self {
        Self {
            decoder,
            entries: HashMap::new(),
            blobs: HashMap::new(),
            finished: Arc::new(Mutex::new(Vec::new())),
            redraw: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag raised by workers when a decode finishes.
    pub fn redraw_flag(&self) -> Arc<AtomicBool> {
        self.redraw.clone()
    }

    /// Consume the redraw flag.
    pub fn take_redraw(&self) -> bool {
        self.redraw.swap(false, Ordering::AcqRel)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move finished decodes into their entries. Call at frame start.
    pub fn poll(&mut self) -> usize {
        let done = match self.finished.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let count = done.len();
        for (key, result) in done {
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            entry.loading = false;
            match result {
                Ok(img) => {
                    entry.size = Some(Vec2i::new(img.width as i32, img.height as i32));
                    entry.pixels = Some(img.rgba);
                    entry.error = None;
                }
                Err(e) => {
                    tracing::warn!(source = ?key.source, "image decode failed: {e}");
                    entry.error = Some(e);
                }
            }
        }
        count
    }

    /// Status of an image file, starting a decode if needed.
    pub fn file(&mut self, path: &Path, player: Option<u64>, textures: &mut dyn TextureStore, now: Instant) -> ImageStatus {
        let key = ImageKey { source: ImageSource::File(path.to_path_buf()), player };
        self.lookup(key, textures, now)
    }

    /// Status of an in-memory image, keyed by content hash.
    pub fn blob(&mut self, bytes: &[u8], player: Option<u64>, textures: &mut dyn TextureStore, now: Instant) -> ImageStatus {
        let hash = content_hash(bytes);
        self.blobs.entry(hash).or_insert_with(|| Arc::new(bytes.to_vec()));
        let key = ImageKey { source: ImageSource::Blob(hash), player };
        self.lookup(key, textures, now)
    }

    /// Original size, when known (kept across eviction).
    pub fn size(&self, key: &ImageKey) -> Option<Vec2i> {
        self.entries.get(key).and_then(|e| e.size)
    }

    fn lookup(&mut self, key: ImageKey, textures: &mut dyn TextureStore, now: Instant) -> ImageStatus {
        let entry = self.entries.entry(key.clone()).or_insert_with(|| ImageEntry {
            size: None,
            pixels: None,
            texture: None,
            loading: false,
            error: None,
            last_draw: now,
        });
        entry.last_draw = now;

        if let Some(err) = &entry.error {
            return ImageStatus::Failed(err.clone());
        }
        if let (Some(texture), Some(size)) = (entry.texture, entry.size) {
            return ImageStatus::Ready { texture, size };
        }
        if let (Some(pixels), Some(size)) = (entry.pixels.take(), entry.size) {
            let texture = textures.upload(size.x as u32, size.y as u32, TextureFormat::Rgba, &pixels);
            entry.texture = Some(texture);
            return ImageStatus::Ready { texture, size };
        }
        if !entry.loading {
            entry.loading = true;
            self.spawn_decode(key);
        }
        ImageStatus::Loading
    }

    fn spawn_decode(&self, key: ImageKey) {
        let decoder = self.decoder.clone();
        let finished = self.finished.clone();
        let redraw = self.redraw.clone();
        let blob = match &key.source {
            ImageSource::Blob(hash) => self.blobs.get(hash).cloned(),
            ImageSource::File(_) => None,
        };
        std::thread::spawn(move || {
            let result = match (&key.source, blob) {
                (ImageSource::File(path), _) => decoder.decode_file(path),
                (ImageSource::Blob(_), Some(bytes)) => decoder.decode(&bytes),
                (ImageSource::Blob(_), None) => Err(TrellisError::Decode("blob is gone".into())),
            };
            let result = result.map_err(|e| e.to_string());
            match finished.lock() {
                Ok(mut guard) => guard.push((key, result)),
                Err(poisoned) => poisoned.into_inner().push((key, result)),
            }
            redraw.store(true, Ordering::Release);
        });
    }

    /// Drop textures and pixels of entries unused for [`IMAGE_IDLE`].
    pub fn evict(&mut self, textures: &mut dyn TextureStore, now: Instant) -> usize {
        let mut dropped = 0;
        for entry in self.entries.values_mut() {
            if entry.loading || now.saturating_duration_since(entry.last_draw) <= IMAGE_IDLE {
                continue;
            }
            if let Some(t) = entry.texture.take() {
                textures.release(t);
                dropped += 1;
            }
            entry.pixels = None;
        }
        let live: std::collections::HashSet<u64> = self
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_draw) <= IMAGE_IDLE || e.loading)
            .filter_map(|(k, _)| match k.source {
                ImageSource::Blob(h) => Some(h),
                ImageSource::File(_) => None,
            })
            .collect();
        self.blobs.retain(|h, _| live.contains(h));
        dropped
    }

    /// Block until no decode is running (tests and headless screenshots).
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            self.poll();
            if !self.entries.values().any(|e| e.loading) {
                return true;
            }
            if start.elapsed() > timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

/// Place an image of `size` inside `rect`.
///
/// `scale` 0 fits (inscribed), negative fills (circumscribed), positive
/// draws at `size * scale` shifted by `translate`. The translation is
/// clamped so the content moves at most its own size past the aligned spot.
pub fn place(rect: Rect, size: Vec2i, h: Align, v: Align, scale: (f32, f32), translate: (f32, f32)) -> Rect {
    if size.x <= 0 || size.y <= 0 || rect.is_empty() {
        return Rect::new(rect.x, rect.y, 0, 0);
    }
    let (sw, sh) = (size.x as f32, size.y as f32);
    let (content_w, content_h) = if scale.0 <= 0.0 {
        let fx = rect.w as f32 / sw;
        let fy = rect.h as f32 / sh;
        let f = if scale.0 == 0.0 { fx.min(fy) } else { fx.max(fy) };
        (sw * f, sh * f)
    } else {
        let sy = if scale.1 > 0.0 { scale.1 } else { scale.0 };
        (sw * scale.0, sh * sy)
    };
    let content = Vec2i::new(content_w.round() as i32, content_h.round() as i32);
    let mut placed = rect.align(content, h, v);
    if scale.0 > 0.0 {
        let tx = translate.0.clamp(-content_w, content_w).round() as i32;
        let ty = translate.1.clamp(-content_h, content_h).round() as i32;
        placed = placed.translate(Vec2i::new(tx, ty));
    }
    placed
}
