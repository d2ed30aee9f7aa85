//! Node identity.
//!
//! Every layout node carries a 64-bit hash derived from its parent's hash,
//! its declared name and its grid position. The hash is stable across frames,
//! so scroll offsets, resizer values, focus and pointer capture can all refer
//! to nodes without holding pointers into the tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// FNV-1a constants.
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Stable identity of a layout node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHash(pub u64);

impl NodeHash {
    /// Hash of the window root.
    pub const ROOT: Self = Self(FNV_OFFSET);

    /// The "nobody" hash used by empty arbiter slots and focus.
    pub const NONE: Self = Self(0);

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Derive a child hash from a name and a grid position.
    pub fn child(&self, name: &str, x: i32, y: i32, w: i32, h: i32) -> Self {
        let mut hash = self.0 ^ FNV_OFFSET;
        for b in name.as_bytes() {
            hash = (hash ^ *b as u64).wrapping_mul(FNV_PRIME);
        }
        for v in [x, y, w, h] {
            for b in v.to_le_bytes() {
                hash = (hash ^ b as u64).wrapping_mul(FNV_PRIME);
            }
        }
        Self::nonzero(hash)
    }

    /// Mix a discriminator into this hash (golden-ratio mixing).
    ///
    /// Used for sub-identities of a node (dialogs, duplicate renames).
    pub const fn mix(&self, discriminator: u64) -> Self {
        const PHI: u64 = 0x9E37_79B9_7F4A_7C15;
        let mixed = self.0.rotate_left(21) ^ discriminator.wrapping_mul(PHI);
        Self::nonzero(mixed)
    }

    const fn nonzero(v: u64) -> Self {
        if v == 0 { Self(1) } else { Self(v) }
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Content hash of a byte blob (FNV-1a), used to key images from memory.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash = (hash ^ *b as u64).wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_is_deterministic() {
        let a = NodeHash::ROOT.child("panel", 0, 0, 1, 1);
        let b = NodeHash::ROOT.child("panel", 0, 0, 1, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn child_depends_on_position_and_name() {
        let base = NodeHash::ROOT.child("panel", 0, 0, 1, 1);
        assert_ne!(base, NodeHash::ROOT.child("panel", 1, 0, 1, 1));
        assert_ne!(base, NodeHash::ROOT.child("other", 0, 0, 1, 1));
        assert_ne!(base, base.child("panel", 0, 0, 1, 1));
    }

    #[test]
    fn never_none() {
        assert!(!NodeHash::ROOT.mix(0).is_none());
        assert!(!NodeHash(0).child("", 0, 0, 0, 0).is_none());
    }
}
