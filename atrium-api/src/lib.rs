//! Atrium API - Wire protocol shared by the host and its guests.
//!
//! One opcode table drives both transports: the WebAssembly import table
//! and the little-endian debugger stream.

mod client;
mod codec;
mod error;
mod handle;
mod opcode;

pub use client::DebugClient;
pub use codec::*;
pub use error::ProtocolError;
pub use handle::{pack_handle, unpack_handle};
pub use opcode::*;
