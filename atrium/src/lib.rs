//! Atrium - host for sandboxed grid-layout apps.
//!
//! An app is a WebAssembly module (or a native build connected through the
//! debugger port) that rebuilds its UI every frame by calling host opcodes.
//!
//! # Module Organization
//!
//! - `host`: frame loop, app slots and render delegation
//! - `runtime`: WebAssembly and debugger guests
//! - `dispatch`: opcode handlers shared by both runtimes
//! - `app`: per-app state, log ring and fault/reload lifecycle
//! - `storage`: per-app SQL and the host database
//! - `jobs`, `download`, `mic`: background work reported to apps
//! - `package`: `.app` archive extraction
//! - `platform`: window and event backend
//! - `config`: command line and persisted window geometry

pub mod app;
pub mod config;
pub mod dispatch;
pub mod download;
pub mod error;
pub mod host;
pub mod jobs;
pub mod mic;
pub mod package;
pub mod platform;
pub mod runtime;
pub mod storage;

pub use config::HostConfig;
pub use error::{HostError, Result};
pub use host::Host;
