use std::io;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::codec::{encode_frame, sanitize_json_error_message, FrameDecoder};
use crate::error::ProtocolError;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Reads framed message bodies from an async byte stream.
///
/// [`DapReader::read_frame`] is cancel safe: bytes already pulled off the
/// stream stay in the decoder, so it can be used as a `tokio::select!` branch.
pub struct DapReader<R> {
    reader: R,
    decoder: FrameDecoder,
    chunk: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> DapReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_decoder(reader, FrameDecoder::new())
    }

    pub fn with_decoder(reader: R, decoder: FrameDecoder) -> Self {
        Self {
            reader,
            decoder,
            chunk: vec![0u8; READ_CHUNK_BYTES].into_boxed_slice(),
        }
    }

    /// Returns the next message body, or `None` on a clean EOF between
    /// messages.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.decoder.is_mid_frame() {
                    return Err(ProtocolError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "EOF in the middle of a DAP message",
                    )));
                }
                return Ok(None);
            }
            self.decoder.append(&self.chunk[..n]);
        }
    }

    pub async fn read_value(&mut self) -> Result<Option<serde_json::Value>, ProtocolError> {
        let Some(frame) = self.read_frame().await? else {
            return Ok(None);
        };
        serde_json::from_slice(&frame)
            .map(Some)
            .map_err(|err| ProtocolError::Json(sanitize_json_error_message(&err.to_string())))
    }
}

/// Writes framed messages. Callers serialize access; each call writes the
/// header and body and flushes before returning.
pub struct DapWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> DapWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), ProtocolError> {
        let body = serde_json::to_vec(message)
            .map_err(|err| ProtocolError::Json(sanitize_json_error_message(&err.to_string())))?;
        self.writer.write_all(&encode_frame(&body)).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
