//! Wire protocol for the reference HTTP/WebSocket server (SPEC_FULL.md
//! §4.10). Not part of the embedded engine's own correctness contract —
//! a host embedding this crate directly never touches this module.

pub mod error;
pub mod wire;

pub use error::{to_http, ErrorBody};
pub use wire::{Request, Response, WireColumn, WireDataType, WireValue};

/// Default HTTP/WS listen port for `engine-server`.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum request/response body size accepted by the reference server.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
