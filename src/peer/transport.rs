use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;

use crate::constants::MAX_FRAME_SIZE;

use super::error::PeerError;
use super::message::{Handshake, Message, HANDSHAKE_LEN};

/// Buffered reader for the framed side of a peer connection.
///
/// Frames are a 4-byte big-endian length prefix followed by the body; a
/// zero length is a keep-alive. Frames above the safety cap tear the
/// connection down - legitimate piece messages are four orders of
/// magnitude smaller.
pub struct FrameReader {
    stream: OwnedReadHalf,
    buf: BytesMut,
}

impl FrameReader {
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(32 * 1024),
        }
    }

    /// Reads exactly one handshake (68 bytes).
    pub async fn read_handshake(&mut self) -> Result<Handshake, PeerError> {
        self.fill_to(HANDSHAKE_LEN).await?;
        let data = self.buf.split_to(HANDSHAKE_LEN);
        Handshake::decode(&data)
    }

    /// Reads one framed message, blocking until a whole frame is buffered.
    pub async fn read_message(&mut self) -> Result<Message, PeerError> {
        self.fill_to(4).await?;

        let length =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;

        if length > MAX_FRAME_SIZE {
            return Err(PeerError::OversizedFrame(length));
        }

        self.fill_to(4 + length).await?;

        let data = self.buf.split_to(4 + length);
        Message::decode(data.freeze())
    }

    async fn fill_to(&mut self, len: usize) -> Result<(), PeerError> {
        while self.buf.len() < len {
            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(PeerError::ConnectionClosed);
            }
        }
        Ok(())
    }
}
