//! Wire-level building blocks: receive buffer, frame parser, request
//! encoder, and the frame type itself.

mod buffer;
mod encoder;
mod frame;
mod parser;

pub use buffer::{RecvBuffer, INITIAL_CAPACITY, MAX_CAPACITY};
pub use encoder::{canonical_name, encode_request, Arg};
pub use frame::Frame;
pub use parser::FrameParser;
