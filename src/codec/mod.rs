//! Blocking frame output for established WebSocket connections.

mod framed;

pub use framed::FrameWriter;
