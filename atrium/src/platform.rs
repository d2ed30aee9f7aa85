//! Window and event backend.
//!
//! The host only talks to the OS through [`Platform`]. The shipped backend
//! is headless: input comes from a script, the clipboard lives in memory
//! and presented frames are counted (and optionally kept).

use std::collections::VecDeque;

use trellis::{CursorShape, InputFrame, SoftwareRenderer};

use crate::error::Result;

pub trait Platform {
    /// Input since the last frame; `None` once the window is closed.
    fn poll(&mut self) -> Option<InputFrame>;

    /// Client area in pixels.
    fn size(&self) -> (u32, u32);

    fn dpi(&self) -> f32;

    fn clipboard(&self) -> String;

    fn set_clipboard(&mut self, text: &str);

    fn set_cursor(&mut self, shape: CursorShape);

    fn is_fullscreen(&self) -> bool;

    fn set_fullscreen(&mut self, on: bool);

    /// Show a finished frame.
    fn present(&mut self, frame: &SoftwareRenderer) -> Result<()>;
}

/// Platform without a window.
#[derive(Debug)]
pub struct HeadlessPlatform {
    size: (u32, u32),
    dpi: f32,
    script: VecDeque<InputFrame>,
    open: bool,
    clipboard: String,
    cursor: CursorShape,
    fullscreen: bool,
    presented: u64,
}

impl HeadlessPlatform {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            dpi: trellis::ui::DEFAULT_DPI,
            script: VecDeque::new(),
            open: true,
            clipboard: String::new(),
            cursor: CursorShape::Default,
            fullscreen: false,
            presented: 0,
        }
    }

    /// Queue input for the coming frames (one entry per frame).
    pub fn push_input(&mut self, input: InputFrame) {
        self.script.push_back(input);
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    pub fn cursor(&self) -> CursorShape {
        self.cursor
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Platform for HeadlessPlatform {
    fn poll(&mut self) -> Option<InputFrame> {
        if !self.open {
            return None;
        }
        Some(self.script.pop_front().unwrap_or_default())
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn dpi(&self) -> f32 {
        self.dpi
    }

    fn clipboard(&self) -> String {
        self.clipboard.clone()
    }

    fn set_clipboard(&mut self, text: &str) {
        self.clipboard = text.to_string();
    }

    fn set_cursor(&mut self, shape: CursorShape) {
        self.cursor = shape;
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn set_fullscreen(&mut self, on: bool) {
        self.fullscreen = on;
    }

    fn present(&mut self, _frame: &SoftwareRenderer) -> Result<()> {
        self.presented += 1;
        Ok(())
    }
}
