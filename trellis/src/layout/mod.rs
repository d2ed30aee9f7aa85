//! Grid layout: 1-D solver, node tree and dialogs.

pub mod array;
pub mod dialog;
pub mod node;

pub use array::{GridCell, LayoutArray, MAX_GRID_CELLS};
pub use dialog::{DialogAnchor, DialogStack, dialog_path, place_dialog};
pub use node::{GridPos, GuestPaint, GuestText, Node, NodeId, NodeTree, Phase};
