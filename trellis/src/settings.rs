//! Persisted layout settings.
//!
//! Scroll offsets, resizer values and the open dialog stack, keyed by node
//! hash. The JSON shape is shared by `layouts/Root.json` and the per-app GUI
//! blob in the host store.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash::NodeHash;
use crate::primitives::Vec2i;

/// One persisted resizer value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeEntry {
    #[serde(rename = "Pos")]
    pub pos: usize,
    #[serde(rename = "Resize_value")]
    pub value: f32,
}

/// Per-node persisted state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(rename = "ScrollV", default)]
    pub scroll_v: i32,
    #[serde(rename = "ScrollH", default)]
    pub scroll_h: i32,
    #[serde(rename = "Cols", default, skip_serializing_if = "Vec::is_empty")]
    pub cols: Vec<ResizeEntry>,
    #[serde(rename = "Rows", default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<ResizeEntry>,
}

impl NodeSettings {
    fn is_default(&self) -> bool {
        self.scroll_v == 0 && self.scroll_h == 0 && self.cols.is_empty() && self.rows.is_empty()
    }

    fn axis(&self, vertical: bool) -> &Vec<ResizeEntry> {
        if vertical { &self.rows } else { &self.cols }
    }

    fn axis_mut(&mut self, vertical: bool) -> &mut Vec<ResizeEntry> {
        if vertical { &mut self.rows } else { &mut self.cols }
    }
}

/// An open dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogEntry {
    /// Hash of the dialog root.
    #[serde(rename = "Path")]
    pub path: NodeHash,
    /// Node the dialog is anchored to.
    #[serde(rename = "ParentPath", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeHash>,
    /// Pixel anchor.
    #[serde(rename = "ParentTouch", default, skip_serializing_if = "Option::is_none")]
    pub touch: Option<Vec2i>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "Dialogs", default)]
    pub dialogs: Vec<DialogEntry>,
    #[serde(rename = "Layouts", default)]
    pub layouts: BTreeMap<NodeHash, NodeSettings>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Load from a file. A missing file gives empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Self::from_json(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Scroll offsets (vertical, horizontal).
    pub fn scroll(&self, hash: NodeHash) -> (i32, i32) {
        self.layouts.get(&hash).map(|n| (n.scroll_v, n.scroll_h)).unwrap_or((0, 0))
    }

    pub fn set_scroll(&mut self, hash: NodeHash, v: i32, h: i32) {
        if self.scroll(hash) == (v, h) {
            return;
        }
        let node = self.layouts.entry(hash).or_default();
        node.scroll_v = v;
        node.scroll_h = h;
        if node.is_default() {
            self.layouts.remove(&hash);
        }
    }

    pub fn resize(&self, hash: NodeHash, vertical: bool, index: usize) -> Option<f32> {
        self.layouts
            .get(&hash)?
            .axis(vertical)
            .iter()
            .find(|e| e.pos == index)
            .map(|e| e.value)
    }

    pub fn set_resize(&mut self, hash: NodeHash, vertical: bool, index: usize, value: f32) {
        let axis = self.layouts.entry(hash).or_default().axis_mut(vertical);
        match axis.iter_mut().find(|e| e.pos == index) {
            Some(e) => e.value = value,
            None => {
                axis.push(ResizeEntry { pos: index, value });
                axis.sort_by_key(|e| e.pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let mut s = Settings::new();
        s.set_scroll(NodeHash(7), 120, 0);
        s.set_resize(NodeHash(7), false, 1, 2.5);
        s.dialogs.push(DialogEntry { path: NodeHash(9), parent: Some(NodeHash(7)), touch: None });
        let v: serde_json::Value = serde_json::from_slice(&s.to_json().unwrap()).unwrap();
        assert_eq!(v["Dialogs"][0]["Path"], 9);
        assert_eq!(v["Dialogs"][0]["ParentPath"], 7);
        assert_eq!(v["Layouts"]["7"]["ScrollV"], 120);
        assert_eq!(v["Layouts"]["7"]["Cols"][0]["Pos"], 1);
        assert_eq!(v["Layouts"]["7"]["Cols"][0]["Resize_value"], 2.5);
        assert!(v["Layouts"]["7"].get("Rows").is_none());
    }

    #[test]
    fn load_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layouts").join("Root.json");
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
        let mut s = Settings::new();
        s.set_resize(NodeHash(3), true, 0, 4.0);
        s.save(&path).unwrap();
        let back = Settings::load(&path).unwrap();
        assert_eq!(back.resize(NodeHash(3), true, 0), Some(4.0));
        assert_eq!(back.resize(NodeHash(3), false, 0), None);
    }

    #[test]
    fn resetting_scroll_drops_entry() {
        let mut s = Settings::new();
        s.set_scroll(NodeHash(1), 10, 5);
        s.set_scroll(NodeHash(1), 0, 0);
        assert!(s.layouts.is_empty());
    }

    #[test]
    fn corrupt_json_is_an_error() {
        assert!(Settings::from_json(b"{not json").is_err());
    }
}
