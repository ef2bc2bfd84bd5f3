//! Line echo protocol.
//!
//! The client sends newline-terminated records and the server writes each
//! one back byte for byte. There is no framing beyond the `\n` delimiter.
//!
//! ```text
//! Request:  hello\n
//! Response: hello\n
//! ```
//!
//! Records longer than the configured maximum are split into max-length
//! pieces and every piece is echoed, so the client still receives all of
//! its bytes in order. A trailing record without a newline is echoed when the
//! client closes its side, then the connection is closed.

pub mod handler;

pub use handler::{Echo, EchoHandler};
