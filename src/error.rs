//! A crate-wide error enum unifying the three error families for callers who
//! don't need to distinguish a malformed binary from a link failure from a trap.
//! Library-internal code keeps using the typed family errors directly; this exists at
//! the outer API surface (`instantiate`, `call_export`) where one `?`-friendly type is
//! more convenient than three.

use crate::leb128::CodecError;
use crate::runtime::error::{LinkError, Trap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WasmError {
    #[error(transparent)]
    MalformedBinary(#[from] CodecError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Trap(#[from] Trap),
}
