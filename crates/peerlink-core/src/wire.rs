//! Outbound message envelope.
//!
//! The only framing this layer defines is the envelope: one message-type byte
//! followed by the payload. Everything inside the payload belongs to the
//! protocol handlers above.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Stable numeric handle for a remote node, assigned by the peer index
/// resolver and never generated locally.
pub type PeerIndex = u32;

/// Protocol message type: the first byte of every framed message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MsgType(pub u8);

impl MsgType {
    pub const POINT_REQ: Self = Self(0x30);
    pub const POINT_RESP: Self = Self(0x31);
    pub const CHAN_DESC: Self = Self(0x32);
    pub const CHAN_ACK: Self = Self(0x33);
    pub const SIG_PROOF: Self = Self(0x34);

    pub const CLOSE_REQ: Self = Self(0x40);
    pub const CLOSE_RESP: Self = Self(0x41);

    /// Reserved for plain-text chat between node operators.
    pub const TEXT_CHAT: Self = Self(0x60);

    pub const DELTA_SIG: Self = Self(0x70);
    pub const SIG_REV: Self = Self(0x71);
    pub const GAP_SIG_REV: Self = Self(0x72);
    pub const REV: Self = Self(0x73);

    /// Human-readable name for logging. Unknown types are still routable.
    pub fn name(self) -> &'static str {
        match self {
            Self::POINT_REQ => "point_req",
            Self::POINT_RESP => "point_resp",
            Self::CHAN_DESC => "chan_desc",
            Self::CHAN_ACK => "chan_ack",
            Self::SIG_PROOF => "sig_proof",
            Self::CLOSE_REQ => "close_req",
            Self::CLOSE_RESP => "close_resp",
            Self::TEXT_CHAT => "text_chat",
            Self::DELTA_SIG => "delta_sig",
            Self::SIG_REV => "sig_rev",
            Self::GAP_SIG_REV => "gap_sig_rev",
            Self::REV => "rev",
            _ => "unknown",
        }
    }
}

impl fmt::Debug for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}({})", self.0, self.name())
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// One queued outbound message, consumed exactly once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEnvelope {
    pub peer: PeerIndex,
    pub msg_type: MsgType,
    pub payload: Bytes,
}

impl OutboundEnvelope {
    pub fn new(peer: PeerIndex, msg_type: MsgType, payload: impl Into<Bytes>) -> Self {
        Self {
            peer,
            msg_type,
            payload: payload.into(),
        }
    }

    /// A text chat message for `peer`.
    pub fn text(peer: PeerIndex, text: &str) -> Self {
        Self::new(peer, MsgType::TEXT_CHAT, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Wire form: the type byte followed by the payload.
    pub fn frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.msg_type.0);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Split a received frame back into type and payload.
/// Returns None for an empty frame.
pub fn split_frame(frame: &Bytes) -> Option<(MsgType, Bytes)> {
    let first = *frame.first()?;
    Some((MsgType(first), frame.slice(1..)))
}
