//! Newline-delimited JSON framing.
//!
//! A receiver buffers bytes until it sees `\n`; the prefix is one JSON
//! envelope, trailing bytes stay buffered for the next frame. Senders never
//! emit a raw newline inside a value (canonical JSON guarantees this), so the
//! delimiter is unambiguous.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::envelope::{known_type, Envelope};

/// Size of one socket read. Frames larger than this span multiple reads.
const READ_CHUNK: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The bytes before the newline are not a valid envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),
    /// Well-formed JSON whose `type` is outside the closed set.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// The envelope could not be serialized.
    #[error("frame encode: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Serializes one envelope as a single newline-terminated frame.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let mut bytes = serde_json::to_vec(envelope).map_err(CodecError::Encode)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes the bytes of one frame (without the delimiter).
///
/// An unknown `type` tag is reported as such rather than as a parse failure,
/// so callers can drop unknown messages without tearing the connection down.
pub fn decode_line(line: &[u8]) -> Result<Envelope, CodecError> {
    let value: serde_json::Value =
        serde_json::from_slice(line).map_err(CodecError::MalformedFrame)?;
    if let Some(tag) = value.get("type").and_then(|t| t.as_str()) {
        if !known_type(tag) {
            return Err(CodecError::UnknownType(tag.to_string()));
        }
    }
    serde_json::from_value(value).map_err(CodecError::MalformedFrame)
}

/// Accumulates raw socket bytes and yields one envelope per complete frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame, or `Ok(None)` when no full line is buffered yet.
    /// Blank lines are skipped.
    pub fn next_frame(&mut self) -> Result<Option<Envelope>, CodecError> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            return decode_line(line).map(Some);
        }
    }

    /// Bytes buffered but not yet framed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Reads envelopes off an async stream. Frames that fail to decode are logged
/// and skipped (the sender sees no reply, per the error policy); `Ok(None)`
/// means clean EOF.
pub struct FramedReader<R> {
    inner: R,
    frames: FrameBuffer,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            frames: FrameBuffer::new(),
        }
    }

    pub async fn next(&mut self) -> std::io::Result<Option<Envelope>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.frames.next_frame() {
                Ok(Some(envelope)) => return Ok(Some(envelope)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("dropping frame: {}", e);
                    continue;
                }
            }
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                if self.frames.pending() > 0 {
                    tracing::debug!(
                        bytes = self.frames.pending(),
                        "discarding partial frame at EOF"
                    );
                }
                return Ok(None);
            }
            self.frames.extend(&chunk[..n]);
        }
    }
}

/// Drains an outbound queue onto a socket's write half. Running this as the
/// sole owner of the write side keeps frames from interleaving no matter how
/// many producers enqueue envelopes.
pub async fn forward_frames<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(envelope) = rx.recv().await {
        let bytes = match encode(&envelope) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("skipping unencodable frame: {}", e);
                continue;
            }
        };
        if writer.write_all(&bytes).await.is_err() {
            break;
        }
    }
}
