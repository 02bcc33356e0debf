//! Byte-code tags and their wire layouts.
//!
//! [`ByteCode`] is the single source of truth for the tag byte that opens every
//! frame. Both directions of the bridge (inbound decode, outbound inlet encode)
//! read the layout from [`ByteCode::layout`] so they cannot drift apart.
//!
//! ## Frame layout
//!
//! ```text
//! +--------+------------------+---------------------+
//! | tag u8 | length prefix    | payload (len bytes) |
//! +--------+------------------+---------------------+
//!   0x01     u16 little-endian   Short
//!   0x02     u8                  Char
//! ```

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag byte identifying the layout and destination of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteCode {
    /// Short-integer length prefix; carries continuous tracking records.
    Short,
    /// Single-character length prefix; carries discrete event records.
    Char,
}

impl ByteCode {
    /// Every byte-code the bridge understands.
    pub const ALL: [ByteCode; 2] = [ByteCode::Short, ByteCode::Char];

    /// The tag byte written on the wire.
    pub const fn tag(self) -> u8 {
        match self {
            ByteCode::Short => 0x01,
            ByteCode::Char => 0x02,
        }
    }

    /// Look up a byte-code from its tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.tag() == tag)
    }

    /// Wire layout for frames carrying this tag.
    pub const fn layout(self) -> FrameLayout {
        match self {
            ByteCode::Short => FrameLayout { prefix: LengthPrefix::U16Le },
            ByteCode::Char => FrameLayout { prefix: LengthPrefix::U8 },
        }
    }

    /// Lower-case name, as used in settings files and logs.
    pub const fn name(self) -> &'static str {
        match self {
            ByteCode::Short => "short",
            ByteCode::Char => "char",
        }
    }
}

impl fmt::Display for ByteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Width and byte order of a frame's length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    /// One byte.
    U8,
    /// Two bytes, little-endian.
    U16Le,
}

impl LengthPrefix {
    /// Number of bytes the prefix occupies.
    pub const fn width(self) -> usize {
        match self {
            LengthPrefix::U8 => 1,
            LengthPrefix::U16Le => 2,
        }
    }

    /// Largest payload length the prefix can express.
    pub const fn max_len(self) -> usize {
        match self {
            LengthPrefix::U8 => u8::MAX as usize,
            LengthPrefix::U16Le => u16::MAX as usize,
        }
    }

    /// Read the declared length. `bytes` must hold at least [`Self::width`] bytes.
    pub fn read(self, bytes: &[u8]) -> usize {
        match self {
            LengthPrefix::U8 => bytes[0] as usize,
            LengthPrefix::U16Le => u16::from_le_bytes([bytes[0], bytes[1]]) as usize,
        }
    }

    /// Append `len` to `dst`. Callers check `len <= max_len()` first.
    pub fn write(self, len: usize, dst: &mut BytesMut) {
        match self {
            LengthPrefix::U8 => dst.put_u8(len as u8),
            LengthPrefix::U16Le => dst.put_u16_le(len as u16),
        }
    }
}

/// Layout rules shared by the decoder and the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub prefix: LengthPrefix,
}

impl FrameLayout {
    /// Bytes before the payload: tag plus length prefix.
    pub const fn header_len(self) -> usize {
        1 + self.prefix.width()
    }
}
