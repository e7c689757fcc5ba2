//! Wire protocol: typed envelopes and newline-delimited JSON framing.
//!
//! Every message is one JSON object per line:
//! `{ "type": TAG, "from": id, "to": id, "timestamp": ms, "data": {..} }`.
//! The `type` tag comes from a closed set; payload shapes are typed per tag.

mod envelope;
mod frame;

pub use envelope::{known_type, now_millis, Envelope, OpStatus, Payload, MASTER_ID};
pub use frame::{decode_line, encode, forward_frames, CodecError, FrameBuffer, FramedReader};
