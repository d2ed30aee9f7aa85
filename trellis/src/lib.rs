//! Trellis - immediate-mode grid UI engine.
//!
//! This crate contains:
//! - Grid layout (1-D solver, node tree, dialogs)
//! - Scrolling, pointer arbitration and drag & drop
//! - Text shaping with inline formatting escapes
//! - Edit boxes and built-in widgets
//! - Async image cache
//! - Paint list and a software rasterizer
//! - Persisted layout settings

pub mod cursor;
pub mod edit;
pub mod hash;
pub mod image_cache;
pub mod input;
pub mod layout;
pub mod overlay;
pub mod paint;
pub mod primitives;
pub mod render;
pub mod scroll_state;
pub mod settings;
pub mod stats;
pub mod text;
pub mod ui;
pub mod widgets;

mod error;

pub use cursor::CursorShape;
pub use error::{Result, TrellisError};
pub use hash::{NodeHash, content_hash};
pub use image_cache::{Decoder, ImageCache, ImageCrateDecoder, ImageStatus};
pub use input::{DropAim, DropEvent, DropZones, InputFrame, Key, KeyEvent, Modifiers};
pub use layout::{DialogAnchor, GuestPaint, GuestText, MAX_GRID_CELLS};
pub use paint::{PaintItem, Primitive};
pub use primitives::{Align, Color, Rect, RectF, Vec2f, Vec2i};
pub use render::{SoftwareRenderer, TextureFormat, TextureId, TextureStore};
pub use settings::Settings;
pub use text::{DirFontLoader, FixedFontLoader, FontLoader, FontProps, TextEngine};
pub use ui::{FrameOutput, NodeInfo, TouchInfo, Ui, cell_for_dpi};
pub use widgets::WidgetStyle;
