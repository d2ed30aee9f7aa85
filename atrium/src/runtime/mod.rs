//! Guest runtimes.
//!
//! A runtime drives one app: it runs the guest's render entry point and
//! feeds every call the guest makes through [`crate::dispatch`].

pub mod debug;
pub mod wasm;

use trellis::Ui;

use crate::app::AppState;
use crate::dispatch::Services;
use crate::error::Result;

pub use debug::{DebugRuntime, DebugServer};
pub use wasm::WasmRuntime;

pub trait GuestRuntime {
    /// Short name for logs (`wasm`, `debug`).
    fn kind(&self) -> &'static str;

    fn state(&mut self) -> &mut AppState;

    /// Run one frame of the guest. A trap is [`HostError::Fault`]; a broken
    /// transport is any other error.
    ///
    /// [`HostError::Fault`]: crate::error::HostError::Fault
    fn render(&mut self, ui: &mut Ui, services: &Services) -> Result<()>;

    fn shutdown(&mut self);
}
