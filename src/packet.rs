//! Wire-format definitions for protocol frames.
//!
//! Every datagram exchanged between the two endpoints is a [`Packet`].  This
//! module is responsible for:
//! - Defining the on-wire binary layout (kind byte, sequence number, payload,
//!   trailing SHA-1 checksum).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated, corrupted, or unrecognised input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Layout
//!
//! ```text
//! ┌──────┬─────────────┬──────────────────┬───────────────────┐
//! │ kind │ seq (be16)  │ payload (0..=1024)│ SHA-1 over prefix │
//! │ 1 B  │ 2 B         │ variable          │ 20 B              │
//! └──────┴─────────────┴──────────────────┴───────────────────┘
//! ```
//!
//! The checksum guards against accidental corruption only.  There is no
//! secret involved, so it provides no authenticity.

use sha1::{Digest, Sha1};
use thiserror::Error;

/// Fixed prefix: kind byte plus big-endian sequence number.
pub const HEADER_LEN: usize = 3;

/// Width of the trailing SHA-1 digest.
pub const CHECKSUM_LEN: usize = 20;

/// Largest payload a single DATA frame may carry.
pub const MAX_PAYLOAD: usize = 1024;

/// Smallest frame that can possibly decode (empty payload).
pub const MIN_FRAME: usize = HEADER_LEN + CHECKSUM_LEN;

/// Largest frame the protocol ever produces; must fit in one datagram.
pub const MAX_FRAME: usize = HEADER_LEN + MAX_PAYLOAD + CHECKSUM_LEN;

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Discriminant carried in the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    /// Stream bytes for one segment.
    Data = 0x00,
    /// Zero-payload confirmation echoing a single sequence number.
    Ack = 0x01,
}

impl Kind {
    fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Kind::Data),
            0x01 => Some(Kind::Ack),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A complete protocol frame: kind, sequence number, payload.
///
/// The checksum is not stored; it is computed on [`encode`](Packet::encode)
/// and verified on [`decode`](Packet::decode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: Kind,
    pub seq: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a DATA frame carrying one segment of the stream.
    pub fn data(seq: u16, payload: Vec<u8>) -> Self {
        debug_assert!(
            payload.len() <= MAX_PAYLOAD,
            "segment of {} bytes exceeds the {MAX_PAYLOAD}-byte payload cap",
            payload.len()
        );
        Self {
            kind: Kind::Data,
            seq,
            payload,
        }
    }

    /// Build an ACK frame confirming `seq`.
    pub fn ack(seq: u16) -> Self {
        Self {
            kind: Kind::Ack,
            seq,
            payload: Vec::new(),
        }
    }

    /// Serialise this frame into a newly allocated byte vector.
    ///
    /// Layout: `kind ‖ seq_be16 ‖ payload ‖ sha1(kind ‖ seq_be16 ‖ payload)`.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        bytes.push(self.kind as u8);
        bytes.extend_from_slice(&self.seq.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        let digest = Sha1::digest(&bytes);
        bytes.extend_from_slice(&digest);
        bytes
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// The trailing [`CHECKSUM_LEN`] bytes are split off and compared against
    /// a recomputed SHA-1 over the prefix.  Any mismatch — including a flipped
    /// kind byte, which corrupts the digest input — is reported as
    /// [`FrameError::ChecksumMismatch`].
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < MIN_FRAME {
            return Err(FrameError::Truncated(buf.len()));
        }
        let (body, checksum) = buf.split_at(buf.len() - CHECKSUM_LEN);
        let digest = Sha1::digest(body);
        if digest.as_slice() != checksum {
            return Err(FrameError::ChecksumMismatch);
        }
        let kind = Kind::from_u8(body[0]).ok_or(FrameError::UnknownKind(body[0]))?;
        let seq = u16::from_be_bytes([body[1], body[2]]);
        Ok(Self {
            kind,
            seq,
            payload: body[HEADER_LEN..].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing a raw datagram.
///
/// Every variant maps to the same disposition at the endpoints: drop the
/// datagram silently and, on the receiver, withhold the ACK.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram shorter than header plus checksum.
    #[error("datagram of {0} bytes is too short for a frame")]
    Truncated(usize),
    /// Recomputed SHA-1 does not match the trailing digest.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Checksum was valid but the kind byte names no known frame type.
    #[error("unknown frame kind {0:#04x}")]
    UnknownKind(u8),
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
