//! Frame-relay wire codec
//!
//! Raw framing sends bare frame bytes and reads the reply until the expected
//! size arrives. Once the first reply byte is in, the rest must follow within
//! the settle window; a reply that stops short is a per-frame decode failure.
//! Bytes already waiting past the expected size make the reply too long, and
//! are discarded with it so the next reply starts clean.
//!
//! Length-prefixed framing puts a big-endian `u32` payload length in front of
//! every message, so a wrong-sized reply is consumed whole and the stream stays
//! in sync.

use crate::config::Framing;
use crate::error::VisionError;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Framing and timing of one relay connection
#[derive(Debug, Clone, Copy)]
pub struct RelayCodec {
    pub framing: Framing,
    /// Wait for the first byte of a reply
    pub reply_timeout: Duration,
    /// Wait for each further chunk of a raw reply
    pub reply_settle: Duration,
    /// Largest length-prefixed payload accepted
    pub max_message_bytes: usize,
}

fn connection_error(e: io::Error) -> VisionError {
    VisionError::ConnectionLost(e.to_string())
}

impl RelayCodec {
    /// Send one frame to the processor
    pub async fn write_frame<W>(&self, writer: &mut W, payload: &[u8]) -> Result<(), VisionError>
    where
        W: AsyncWrite + Unpin,
    {
        if self.framing == Framing::LengthPrefixed {
            let len = u32::try_from(payload.len())
                .map_err(|_| VisionError::Config(format!("Frame of {} bytes too large to send", payload.len())))?;
            writer.write_all(&len.to_be_bytes()).await.map_err(connection_error)?;
        }
        writer.write_all(payload).await.map_err(connection_error)?;
        writer.flush().await.map_err(connection_error)
    }

    /// Read one reply expected to hold `expected` bytes
    pub async fn read_frame<R>(&self, reader: &mut R, expected: usize) -> Result<Bytes, VisionError>
    where
        R: AsyncRead + Unpin,
    {
        match self.framing {
            Framing::Raw => self.read_raw(reader, expected).await,
            Framing::LengthPrefixed => self.read_prefixed(reader, expected).await,
        }
    }

    async fn read_raw<R>(&self, reader: &mut R, expected: usize) -> Result<Bytes, VisionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::zeroed(expected);
        let mut filled = 0;

        while filled < expected {
            let wait = if filled == 0 {
                self.reply_timeout
            } else {
                self.reply_settle
            };

            match timeout(wait, reader.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => {
                    return Err(VisionError::ConnectionLost(format!(
                        "Peer closed the connection after {} of {} reply bytes",
                        filled, expected
                    )))
                }
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => return Err(connection_error(e)),
                Err(_) if filled == 0 => {
                    return Err(VisionError::Timeout(format!(
                        "No reply within {:?}",
                        self.reply_timeout
                    )))
                }
                Err(_) => {
                    return Err(VisionError::ProtocolDecode {
                        expected,
                        actual: filled,
                    })
                }
            }
        }

        let excess = self.discard_pending(reader).await?;
        if excess > 0 {
            return Err(VisionError::ProtocolDecode {
                expected,
                actual: filled + excess,
            });
        }

        Ok(buf.freeze())
    }

    /// Drop bytes that are readable right now without waiting.
    ///
    /// Raw framing has no boundaries, so anything still queued before a
    /// request is the leftover of an earlier reply.
    pub async fn discard_pending<R>(&self, reader: &mut R) -> Result<usize, VisionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut scratch = [0u8; 4096];
        let mut discarded = 0usize;

        loop {
            match timeout(Duration::ZERO, reader.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => return Ok(discarded),
                Ok(Ok(n)) => {
                    discarded += n;
                    if discarded > self.max_message_bytes {
                        return Err(VisionError::ConnectionLost(format!(
                            "Processor flooded the relay with {} unrequested bytes",
                            discarded
                        )));
                    }
                }
                Ok(Err(e)) => return Err(connection_error(e)),
            }
        }
    }

    async fn read_prefixed<R>(&self, reader: &mut R, expected: usize) -> Result<Bytes, VisionError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 4];
        match timeout(self.reply_timeout, reader.read_exact(&mut header)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(connection_error(e)),
            Err(_) => {
                return Err(VisionError::Timeout(format!(
                    "No reply within {:?}",
                    self.reply_timeout
                )))
            }
        }

        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_message_bytes {
            // Cannot skip a payload this large safely
            return Err(VisionError::ConnectionLost(format!(
                "Reply of {} bytes exceeds limit of {}",
                len, self.max_message_bytes
            )));
        }

        let mut payload = BytesMut::zeroed(len);
        match timeout(self.reply_settle.max(self.reply_timeout), reader.read_exact(&mut payload)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(connection_error(e)),
            Err(_) => {
                return Err(VisionError::ConnectionLost(format!(
                    "Reply payload of {} bytes stalled",
                    len
                )))
            }
        }

        if len != expected {
            return Err(VisionError::ProtocolDecode { expected, actual: len });
        }
        Ok(payload.freeze())
    }
}
