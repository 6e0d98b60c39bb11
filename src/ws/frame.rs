//! WebSocket frame codec (RFC 6455 section 5.2)
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |  (if payload len==126/127)    |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               | Masking-key, if MASK set to 1 |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! Both directions are pure functions over byte slices; no connection state.
//! Decode never reads past the input: every shortfall is reported as one of
//! the `Incomplete*` errors so the caller can wait for more bytes.

use crate::ws::mask::{apply_mask, random_mask_key};
use bytes::{BufMut, Bytes, BytesMut};

/// Largest payload that fits the 7-bit length field
pub const MAX_SMALL_PAYLOAD: usize = 125;

/// Largest payload that fits the 16-bit extended length
pub const MAX_MEDIUM_PAYLOAD: usize = 65_535;

/// Longest possible header: 2 + 8 extended length + 4 masking key
pub const MAX_HEADER_LEN: usize = 14;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LEN_MASK: u8 = 0x7F;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Frame opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Control frames (close/ping/pong)
    #[inline]
    pub fn is_control(self) -> bool {
        (self as u8) & 0x08 != 0
    }
}

impl TryFrom<u8> for OpCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(FrameError::InvalidOpcode(other)),
        }
    }
}

impl From<OpCode> for u8 {
    #[inline]
    fn from(opcode: OpCode) -> u8 {
        opcode as u8
    }
}

/// Frame decode failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("incomplete frame header")]
    IncompleteHeader,
    #[error("incomplete extended payload length")]
    IncompleteExtendedLength,
    #[error("incomplete masking key")]
    IncompleteMaskingKey,
    #[error("incomplete payload data")]
    IncompletePayload,
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),
    #[error("payload length {0} is not representable")]
    PayloadTooLarge(u64),
}

impl FrameError {
    /// True when more input could complete the frame
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            FrameError::IncompleteHeader
                | FrameError::IncompleteExtendedLength
                | FrameError::IncompleteMaskingKey
                | FrameError::IncompletePayload
        )
    }
}

/// Decoded frame; `payload` is already unmasked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub masking_key: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    #[inline]
    pub fn is_masked(&self) -> bool {
        self.masking_key.is_some()
    }
}

/// Decode one frame from the front of `data`
///
/// # Returns
/// The frame and the number of bytes it occupied. Trailing bytes (the start
/// of the next frame) are left untouched.
///
/// # Errors
/// `Incomplete*` when `data` ends early, `InvalidOpcode` for reserved
/// opcodes, `PayloadTooLarge` for a 64-bit length with the top bit set or
/// one that cannot be addressed on this platform.
pub fn decode_frame(data: &[u8]) -> Result<(Frame, usize), FrameError> {
    if data.len() < 2 {
        return Err(FrameError::IncompleteHeader);
    }

    let fin = data[0] & FIN_BIT != 0;
    let opcode = OpCode::try_from(data[0] & OPCODE_MASK)?;
    let masked = data[1] & MASK_BIT != 0;

    let (payload_len, mut offset) = match data[1] & LEN_MASK {
        LEN_16 => {
            let bytes: [u8; 2] = data
                .get(2..4)
                .and_then(|s| s.try_into().ok())
                .ok_or(FrameError::IncompleteExtendedLength)?;
            (u64::from(u16::from_be_bytes(bytes)), 4)
        }
        LEN_64 => {
            let bytes: [u8; 8] = data
                .get(2..10)
                .and_then(|s| s.try_into().ok())
                .ok_or(FrameError::IncompleteExtendedLength)?;
            let len = u64::from_be_bytes(bytes);
            if len >> 63 != 0 {
                return Err(FrameError::PayloadTooLarge(len));
            }
            (len, 10)
        }
        small => (u64::from(small), 2),
    };

    let masking_key = if masked {
        let key: [u8; 4] = data
            .get(offset..offset + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or(FrameError::IncompleteMaskingKey)?;
        offset += 4;
        Some(key)
    } else {
        None
    };

    let len = usize::try_from(payload_len).map_err(|_| FrameError::PayloadTooLarge(payload_len))?;
    let end = offset
        .checked_add(len)
        .ok_or(FrameError::PayloadTooLarge(payload_len))?;
    let body = data.get(offset..end).ok_or(FrameError::IncompletePayload)?;

    let mut payload = BytesMut::from(body);
    if let Some(key) = masking_key {
        apply_mask(&mut payload, key);
    }

    Ok((
        Frame {
            fin,
            opcode,
            masking_key,
            payload: payload.freeze(),
        },
        end,
    ))
}

/// Decode one frame and return only its unmasked payload
pub fn parse_frame(data: &[u8]) -> Result<Bytes, FrameError> {
    decode_frame(data).map(|(frame, _)| frame.payload)
}

/// Encode a frame; with `mask` set a random key is generated
///
/// # Example
/// ```
/// use reactor_core::ws::{construct_frame, OpCode};
///
/// let frame = construct_frame(OpCode::Text, b"hi", true, false);
/// assert_eq!(&frame[..], &[0x81, 0x02, 0x68, 0x69]);
/// ```
pub fn construct_frame(opcode: OpCode, payload: &[u8], fin: bool, mask: bool) -> Bytes {
    let key = mask.then(random_mask_key);
    construct_frame_with_key(opcode, payload, fin, key)
}

/// Encode a frame with an explicit masking key (`None` = unmasked)
pub fn construct_frame_with_key(
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    masking_key: Option<[u8; 4]>,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(payload.len(), masking_key.is_some()));
    encode_frame_into(&mut buf, opcode, payload, fin, masking_key);
    buf.freeze()
}

/// Append an encoded frame to `buf`
pub fn encode_frame_into(
    buf: &mut BytesMut,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    masking_key: Option<[u8; 4]>,
) {
    buf.reserve(encoded_len(payload.len(), masking_key.is_some()));

    let first = u8::from(opcode) | if fin { FIN_BIT } else { 0 };
    let mask_bit = if masking_key.is_some() { MASK_BIT } else { 0 };
    buf.put_u8(first);

    let len = payload.len();
    if len <= MAX_SMALL_PAYLOAD {
        buf.put_u8(len as u8 | mask_bit);
    } else if len <= MAX_MEDIUM_PAYLOAD {
        buf.put_u8(LEN_16 | mask_bit);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(LEN_64 | mask_bit);
        buf.put_u64(len as u64);
    }

    match masking_key {
        Some(key) => {
            buf.put_slice(&key);
            let start = buf.len();
            buf.put_slice(payload);
            apply_mask(&mut buf[start..], key);
        }
        None => buf.put_slice(payload),
    }
}

/// Total encoded size for a payload of `payload_len` bytes
#[inline]
pub fn encoded_len(payload_len: usize, masked: bool) -> usize {
    let ext = if payload_len <= MAX_SMALL_PAYLOAD {
        0
    } else if payload_len <= MAX_MEDIUM_PAYLOAD {
        2
    } else {
        8
    };
    2 + ext + if masked { 4 } else { 0 } + payload_len
}
