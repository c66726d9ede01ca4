//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (V1 - Simple Binary)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬────────┬─────────┬────────┬──────────┬───────────────────────┐
//! │DbLen (2) │   Db   │CmdLen(1)│  Cmd   │ Argc (2) │ Argc × [Len (4) │ Arg] │
//! └──────────┴────────┴─────────┴────────┴──────────┴───────────────────────┘
//! ```
//! An empty database name addresses no database: the command runs as a
//! global command.
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND
//! - 0x02: ERROR
//! - 0x03: BAD_REQUEST
//! - 0x04: UNAVAILABLE (transient, retry later)

mod request;
mod response;
mod codec;

pub use request::Request;
pub use response::{Response, Status};
pub use codec::{
    decode_request, decode_response, decode_values, encode_request, encode_response,
    encode_values, read_frame, write_frame, MAX_FRAME_SIZE,
};
