//! Core types shared by every layer of the bridge.
//!
//! - [`ByteCode`] names a frame's tag and owns its wire [`FrameLayout`]
//! - [`Frame`] is a decoded tag plus payload
//! - [`Sample`] is what the dispatch table turns a frame into

mod byte_code;
mod frame;
mod sample;

pub use byte_code::{ByteCode, FrameLayout, LengthPrefix};
pub use frame::Frame;
pub use sample::Sample;
