//! Rendering backends.
//!
//! The engine never talks to a GPU directly. Glyph bitmaps and decoded
//! images are uploaded through a [`TextureStore`], and the paint list is
//! rasterized by whatever backend owns that store.

pub mod software;

pub use software::SoftwareRenderer;

/// Opaque handle to an uploaded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Pixel layout of an uploaded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// One coverage byte per pixel (glyphs), tinted at draw time.
    Alpha,
    /// Four bytes per pixel, straight alpha.
    Rgba,
}

/// Texture allocation seam.
///
/// Only the UI thread owns a `TextureStore`; workers hand decoded pixels
/// to the UI thread and never upload themselves.
pub trait TextureStore {
    /// Upload pixels and return a handle. `data.len()` must match the format.
    fn upload(&mut self, width: u32, height: u32, format: TextureFormat, data: &[u8]) -> TextureId;

    /// Release a texture. Unknown handles are ignored.
    fn release(&mut self, id: TextureId);

    /// Number of live textures.
    fn live(&self) -> usize;
}
