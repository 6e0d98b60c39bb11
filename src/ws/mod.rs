//! WebSocket framing for connection handlers

pub mod frame;
pub mod mask;

pub use frame::{
    construct_frame, construct_frame_with_key, decode_frame, encode_frame_into, parse_frame,
    Frame, FrameError, OpCode,
};
pub use mask::apply_mask;
