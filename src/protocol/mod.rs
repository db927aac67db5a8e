//! Wire-level building blocks: tokens, the WebSocket handshake and frames.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod token;

pub use assembler::MessageAssembler;
pub use frame::Frame;
pub use handshake::{
    HandshakeError, HandshakeRequest, HandshakeResponse, REJECT_RESPONSE, WS_GUID,
    compute_accept_key,
};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;
pub use token::Tokenizer;
