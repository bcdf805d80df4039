//! `Content-Length` framing.
//!
//! DAP messages are framed using an HTTP-like header section:
//!
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! { ...json... }
//! ```
//!
//! The length counts UTF-8 encoded bytes of the body, not characters.

use thiserror::Error;

use super::{MAX_DAP_HEADER_BYTES, MAX_DAP_MESSAGE_BYTES};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "content-length";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("DAP header block exceeds maximum size ({limit} bytes)")]
    HeaderTooLarge { limit: usize },

    #[error("DAP message Content-Length {length} exceeds maximum allowed size {limit}")]
    MessageTooLarge { length: usize, limit: usize },
}

/// Incremental decoder: feed raw bytes with [`FrameDecoder::append`] and pull
/// complete bodies with [`FrameDecoder::next_frame`].
///
/// A header block without a `Content-Length` field is not an error by itself;
/// the bytes stay buffered until more input arrives. The buffered header is
/// still bounded by [`MAX_DAP_HEADER_BYTES`].
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Body length announced by an already consumed header.
    body_len: Option<usize>,
    max_message_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_message_bytes(MAX_DAP_MESSAGE_BYTES)
    }

    pub fn with_max_message_bytes(max_message_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            body_len: None,
            max_message_bytes,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet returned as part of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` while a frame has been started but not completed.
    pub fn is_mid_frame(&self) -> bool {
        self.body_len.is_some() || !self.buf.is_empty()
    }

    /// Pops the next complete message body, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            if let Some(len) = self.body_len {
                if self.buf.len() < len {
                    return Ok(None);
                }
                let rest = self.buf.split_off(len);
                let body = std::mem::replace(&mut self.buf, rest);
                self.body_len = None;
                return Ok(Some(body));
            }

            let Some(header_end) = find(&self.buf, HEADER_TERMINATOR) else {
                if self.buf.len() > MAX_DAP_HEADER_BYTES {
                    return Err(FrameError::HeaderTooLarge {
                        limit: MAX_DAP_HEADER_BYTES,
                    });
                }
                return Ok(None);
            };

            match parse_content_length(&self.buf[..header_end]) {
                Some(length) => {
                    if length > self.max_message_bytes {
                        return Err(FrameError::MessageTooLarge {
                            length,
                            limit: self.max_message_bytes,
                        });
                    }
                    self.buf.drain(..header_end + HEADER_TERMINATOR.len());
                    self.body_len = Some(length);
                }
                None => {
                    if self.buf.len() > MAX_DAP_HEADER_BYTES {
                        return Err(FrameError::HeaderTooLarge {
                            limit: MAX_DAP_HEADER_BYTES,
                        });
                    }
                    return Ok(None);
                }
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_content_length(header: &[u8]) -> Option<usize> {
    // Header names are ASCII; anything else cannot be a `Content-Length` line.
    let header = std::str::from_utf8(header).ok()?;
    header.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            return None;
        }
        let value = value.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // All digits but too large for `usize`: report it as oversized.
        Some(value.parse::<usize>().unwrap_or(usize::MAX))
    })
}

/// Frames a JSON body.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body);
    out
}

pub(crate) fn sanitize_json_error_message(message: &str) -> String {
    // `serde_json::Error` display strings can include user-provided scalar values (for example:
    // `invalid type: string "..."` or `unknown field `...``). DAP payloads can carry secrets
    // (launch args, evaluated expressions), so never echo those values back.
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find('"') {
        out.push_str(&rest[..start + 1]);
        rest = &rest[start + 1..];

        let Some(end) = rest.find('"') else {
            // Unterminated quote: append the remainder and stop.
            out.push_str(rest);
            return out;
        };
        out.push_str("<redacted>\"");
        rest = &rest[end + 1..];
    }
    out.push_str(rest);

    // Redact only the first backticked segment so the list of expected values stays actionable.
    // `missing field `x`` names a field of our own schema, not client data.
    if out.starts_with("missing field") {
        return out;
    }
    if let Some(start) = out.find('`') {
        if let Some(end_rel) = out[start + 1..].find('`') {
            let end = start + 1 + end_rel;
            out.replace_range(start + 1..end, "<redacted>");
        }
    }

    out
}
