//! DAP wire layer: framing, message envelopes and typed payloads.

pub mod codec;
pub mod messages;
pub mod requests;
pub mod stream;
pub mod types;

/// Default cap for the `Content-Length` of a single inbound message.
///
/// Without an upper bound a hostile client could announce an enormous body and
/// force the adapter to buffer it before the JSON is even looked at.
pub const MAX_DAP_MESSAGE_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

/// Maximum size of a header block (everything before the blank line).
pub const MAX_DAP_HEADER_BYTES: usize = 8 * 1024; // 8 KiB
