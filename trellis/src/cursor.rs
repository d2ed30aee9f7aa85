//! Mouse cursor shapes.
//!
//! Nodes set a shape during the build; the deepest node under the pointer
//! wins and the host forwards it to the platform.

use serde::{Deserialize, Serialize};

/// Cursor shape hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CursorShape {
    /// Arrow.
    #[default]
    Default,
    /// Pointer over a clickable element.
    Hand,
    /// Text insertion.
    IBeam,
    Cross,
    /// Column resizer.
    ResizeCol,
    /// Row resizer.
    ResizeRow,
    ResizeNwse,
    ResizeNesw,
    Move,
    Wait,
    /// Action not allowed.
    No,
}

impl CursorShape {
    pub const ALL: [CursorShape; 11] = [
        CursorShape::Default,
        CursorShape::Hand,
        CursorShape::IBeam,
        CursorShape::Cross,
        CursorShape::ResizeCol,
        CursorShape::ResizeRow,
        CursorShape::ResizeNwse,
        CursorShape::ResizeNesw,
        CursorShape::Move,
        CursorShape::Wait,
        CursorShape::No,
    ];

    /// Name used on the wire.
    pub fn name(self) -> &'static str {
        match self {
            CursorShape::Default => "default",
            CursorShape::Hand => "hand",
            CursorShape::IBeam => "ibeam",
            CursorShape::Cross => "cross",
            CursorShape::ResizeCol => "res_col",
            CursorShape::ResizeRow => "res_row",
            CursorShape::ResizeNwse => "res_nwse",
            CursorShape::ResizeNesw => "res_nesw",
            CursorShape::Move => "move",
            CursorShape::Wait => "wait",
            CursorShape::No => "no",
        }
    }

    /// Parse a wire name. Unknown names map to `Default`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL.into_iter().find(|c| c.name() == name).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for shape in CursorShape::ALL {
            assert_eq!(CursorShape::from_name(shape.name()), shape);
        }
        assert_eq!(CursorShape::from_name("bogus"), CursorShape::Default);
    }
}
