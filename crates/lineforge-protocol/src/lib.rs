//! Wire protocol for Lineforge.
//!
//! The protocol is deliberately small:
//!
//! - **Framing** ([`LineCodec`]) — newline-delimited lines with a hard
//!   upper bound on how much unterminated input is buffered.
//! - **Transform** ([`LineTransform`], [`Uppercase`]) — the pure function
//!   applied to every line before it is echoed back.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (lines) → Session (read/transform/write)
//! ```

mod codec;
mod error;
mod transform;

pub use codec::{DEFAULT_MAX_LINE_LENGTH, LineCodec};
pub use error::ProtocolError;
pub use transform::{LineTransform, Uppercase};
