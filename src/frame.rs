//! Framed reading of one continuous TCP byte stream.
//!
//! [`FrameReader`] buffers bytes off an async reader and segments them
//! into RESP frames. It has a second mode for the one out-of-band payload
//! the protocol carries: the inline RDB blob a master sends after
//! `FULLRESYNC`, framed as `$<len>\r\n<len bytes>` without the trailing
//! CRLF of a normal bulk string. Those bytes are not counted toward any
//! replication offset.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::resp::{Message, RespError, parse_message};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed mid-frame")]
    ConnectionClosed,
    #[error("RESP parse error: {0}")]
    Resp(RespError),
    #[error("invalid RDB payload header")]
    InvalidRdbHeader,
}

impl From<RespError> for FrameError {
    fn from(error: RespError) -> Self {
        FrameError::Resp(error)
    }
}

/// Segments a byte stream into RESP frames, transparently reassembling
/// frames that arrive split across packet boundaries.
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Reads one RESP frame, blocking until enough bytes are available.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames. EOF in the middle
    /// of a frame is reported as [`FrameError::ConnectionClosed`]; the
    /// caller treats both as the peer going away.
    pub async fn read_message(&mut self) -> Result<Option<Message>, FrameError> {
        loop {
            match parse_message(&self.buffer) {
                Ok(message) => {
                    self.buffer.advance(message.bytes_consumed as usize);
                    return Ok(Some(message));
                }
                Err(RespError::Incomplete) => {
                    if self.fill_buffer().await? == 0 {
                        if self.buffer.is_empty() {
                            return Ok(None);
                        }
                        return Err(FrameError::ConnectionClosed);
                    }
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Reads the inline RDB blob that follows a `FULLRESYNC` reply:
    /// `$<len>\r\n` then exactly `len` raw bytes, no trailing CRLF.
    pub async fn read_rdb_payload(&mut self) -> Result<Vec<u8>, FrameError> {
        let payload_length = loop {
            match parse_rdb_header(&self.buffer)? {
                Some((length, header_length)) => {
                    self.buffer.advance(header_length);
                    break length;
                }
                None => {
                    if self.fill_buffer().await? == 0 {
                        return Err(FrameError::ConnectionClosed);
                    }
                }
            }
        };

        while self.buffer.len() < payload_length {
            if self.fill_buffer().await? == 0 {
                return Err(FrameError::ConnectionClosed);
            }
        }

        Ok(self.buffer.split_to(payload_length).to_vec())
    }

    async fn fill_buffer(&mut self) -> Result<usize, FrameError> {
        Ok(self.reader.read_buf(&mut self.buffer).await?)
    }
}

/// Parses the `$<len>\r\n` blob header. `Ok(None)` means more bytes are
/// needed; the successful value is `(payload length, header length)`.
fn parse_rdb_header(buffer: &[u8]) -> Result<Option<(usize, usize)>, FrameError> {
    let Some(type_byte) = buffer.first() else {
        return Ok(None);
    };

    if *type_byte != b'$' {
        return Err(FrameError::InvalidRdbHeader);
    }

    let mut index = 1;
    while index + 1 < buffer.len() {
        if buffer[index] == b'\r' && buffer[index + 1] == b'\n' {
            let length = str::from_utf8(&buffer[1..index])
                .ok()
                .and_then(|line| line.parse::<usize>().ok())
                .ok_or(FrameError::InvalidRdbHeader)?;

            return Ok(Some((length, index + 2)));
        }
        index += 1;
    }

    Ok(None)
}
