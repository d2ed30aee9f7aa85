//! Core primitive types for Trellis.
//!
//! Integer rectangles are used for everything the layout engine produces
//! (screen pixels). Float vectors are used by paint primitives that need
//! sub-pixel positions (lines, curves, brush strokes).

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A 2D integer vector (pixels or cells).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2i {
    pub x: i32,
    pub y: i32,
}

impl Vec2i {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Component by axis (false = x, true = y).
    #[inline]
    pub fn axis(&self, vertical: bool) -> i32 {
        if vertical { self.y } else { self.x }
    }

    #[inline]
    pub fn to_f(self) -> Vec2f {
        Vec2f::new(self.x as f32, self.y as f32)
    }
}

impl Add for Vec2i {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2i {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A 2D float vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2f {
    pub x: f32,
    pub y: f32,
}

impl Vec2f {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector rotated 90° counter-clockwise (zero for a zero vector).
    pub fn normal(&self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            return Self::ZERO;
        }
        Self::new(-self.y / len, self.x / len)
    }

    #[inline]
    pub fn to_i(self) -> Vec2i {
        Vec2i::new(self.x.round() as i32, self.y.round() as i32)
    }
}

impl Add for Vec2f {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2f {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2f {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl From<(f32, f32)> for Vec2f {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Alignment along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Align {
    #[default]
    Start,
    Center,
    End,
}

impl Align {
    /// Wire encoding: 0 = start, 1 = center, 2 = end. Anything else is start.
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Align::Center,
            2 => Align::End,
            _ => Align::Start,
        }
    }

    /// Offset of an item of `inner` length inside `outer`.
    #[inline]
    pub fn offset(self, outer: i32, inner: i32) -> i32 {
        match self {
            Align::Start => 0,
            Align::Center => (outer - inner) / 2,
            Align::End => outer - inner,
        }
    }
}

/// An integer rectangle in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const ZERO: Self = Self { x: 0, y: 0, w: 0, h: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn from_pos_size(pos: Vec2i, size: Vec2i) -> Self {
        Self::new(pos.x, pos.y, size.x, size.y)
    }

    #[inline]
    pub fn pos(&self) -> Vec2i {
        Vec2i::new(self.x, self.y)
    }

    #[inline]
    pub fn size(&self) -> Vec2i {
        Vec2i::new(self.w, self.h)
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_empty() { 0 } else { self.w as i64 * self.h as i64 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    #[inline]
    pub fn center(&self) -> Vec2i {
        Vec2i::new(self.x + self.w / 2, self.y + self.h / 2)
    }

    /// Check if a point is inside this rectangle (right/bottom exclusive).
    #[inline]
    pub fn inside(&self, p: Vec2i) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Check if `other` lies completely within this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Intersection of two rectangles. Disjoint rectangles give an empty
    /// rectangle positioned at the clamped corner, so it still lies inside both.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return Rect::new(
                x.min(self.right()).min(other.right()),
                y.min(self.bottom()).min(other.bottom()),
                0,
                0,
            );
        }
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Smallest rectangle containing both. Empty operands are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Shrink by `px` on every side (never below zero size).
    pub fn crop(&self, px: i32) -> Rect {
        let w = (self.w - 2 * px).max(0);
        let h = (self.h - 2 * px).max(0);
        Rect::new(self.x + px, self.y + px, w, h)
    }

    /// Grow by `px` on every side.
    pub fn extend(&self, px: i32) -> Rect {
        Rect::new(self.x - px, self.y - px, self.w + 2 * px, self.h + 2 * px)
    }

    /// Place a `size` rectangle inside self according to the alignment pair.
    pub fn align(&self, size: Vec2i, h: Align, v: Align) -> Rect {
        Rect::new(
            self.x + h.offset(self.w, size.x),
            self.y + v.offset(self.h, size.y),
            size.x,
            size.y,
        )
    }

    #[inline]
    pub fn translate(&self, d: Vec2i) -> Rect {
        Rect::new(self.x + d.x, self.y + d.y, self.w, self.h)
    }

    /// Start and length along an axis (false = x, true = y).
    #[inline]
    pub fn span(&self, vertical: bool) -> (i32, i32) {
        if vertical { (self.y, self.h) } else { (self.x, self.w) }
    }

    /// Bounding box of a point set (empty for no points).
    pub fn bounding(points: &[Vec2f]) -> Rect {
        let Some(first) = points.first() else {
            return Rect::ZERO;
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let x = min_x.floor() as i32;
        let y = min_y.floor() as i32;
        Rect::new(x, y, max_x.ceil() as i32 - x + 1, max_y.ceil() as i32 - y + 1)
    }
}

/// A float rectangle (cells or sub-pixel screen positions).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl RectF {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Scale by `factor` and translate by `origin`, rounding to pixels.
    pub fn to_screen(&self, origin: Vec2i, factor: f32) -> Rect {
        let x = origin.x + (self.x * factor).round() as i32;
        let y = origin.y + (self.y * factor).round() as i32;
        let right = origin.x + ((self.x + self.w) * factor).round() as i32;
        let bottom = origin.y + ((self.y + self.h) * factor).round() as i32;
        Rect::new(x, y, right - x, bottom - y)
    }
}

impl From<Rect> for RectF {
    fn from(r: Rect) -> Self {
        RectF::new(r.x as f32, r.y as f32, r.w as f32, r.h as f32)
    }
}

/// RGBA color, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);
    pub const BLACK: Self = Self::rgba(0, 0, 0, 255);
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);
    pub const RED: Self = Self::rgba(220, 40, 40, 255);
    pub const GRAY: Self = Self::rgba(128, 128, 128, 255);
    /// Selection highlight.
    pub const SELECTION: Self = Self::rgba(70, 130, 220, 110);

    #[inline]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Wire encoding: four separate channel integers, clamped to 0..=255.
    pub fn from_channels(r: i64, g: i64, b: i64, a: i64) -> Self {
        let c = |v: i64| v.clamp(0, 255) as u8;
        Self::rgba(c(r), c(g), c(b), c(a))
    }

    /// Wire encoding used by paint opcodes: `0xRRGGBBAA` in the low 32 bits.
    pub fn from_packed(v: i64) -> Self {
        let v = v as u32;
        Self::rgba((v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8)
    }

    pub fn packed(self) -> i64 {
        ((self.r as i64) << 24) | ((self.g as i64) << 16) | ((self.b as i64) << 8) | self.a as i64
    }

    #[inline]
    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Multiply alpha by `factor` (0..1).
    pub fn fade(self, factor: f32) -> Self {
        let a = (self.a as f32 * factor.clamp(0.0, 1.0)).round() as u8;
        self.with_alpha(a)
    }

    /// Linear blend toward `other` by `t` (0..1).
    pub fn mix(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let l = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color::rgba(l(self.r, other.r), l(self.g, other.g), l(self.b, other.b), l(self.a, other.a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_overlapping() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 60, 100, 100);
        assert_eq!(a.intersect(&b), Rect::new(50, 60, 50, 40));
    }

    #[test]
    fn intersect_disjoint_is_empty_and_inside_both() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(50, 50, 10, 10);
        let i = a.intersect(&b);
        assert!(i.is_empty());
        assert!(a.contains_rect(&i));
        assert!(b.contains_rect(&i));
    }

    #[test]
    fn align_center_and_end() {
        let r = Rect::new(10, 10, 100, 50);
        assert_eq!(r.align(Vec2i::new(20, 10), Align::Center, Align::End), Rect::new(50, 50, 20, 10));
        assert_eq!(r.align(Vec2i::new(20, 10), Align::Start, Align::Start), Rect::new(10, 10, 20, 10));
    }

    #[test]
    fn crop_never_negative() {
        let r = Rect::new(0, 0, 6, 6);
        assert_eq!(r.crop(2), Rect::new(2, 2, 2, 2));
        assert_eq!(r.crop(5).size(), Vec2i::ZERO);
    }

    #[test]
    fn inside_excludes_right_edge() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(r.inside(Vec2i::new(0, 0)));
        assert!(r.inside(Vec2i::new(9, 9)));
        assert!(!r.inside(Vec2i::new(10, 5)));
    }

    #[test]
    fn union_ignores_empty() {
        let a = Rect::new(5, 5, 10, 10);
        assert_eq!(a.union(&Rect::ZERO), a);
        assert_eq!(a.union(&Rect::new(0, 0, 2, 2)), Rect::new(0, 0, 15, 15));
    }

    #[test]
    fn color_mix_midpoint() {
        let c = Color::BLACK.mix(Color::WHITE, 0.5);
        assert_eq!(c.r, 128);
        assert_eq!(c.a, 255);
    }
}
