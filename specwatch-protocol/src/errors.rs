// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while encoding and decoding protocol frames.

use thiserror::Error;

/// An error that occurred while encoding or decoding a protocol frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame received from the service could not be decoded.
    #[error("failed to decode server frame")]
    Decode(#[source] serde_json::Error),

    /// A request could not be encoded.
    #[error("failed to encode client request")]
    Encode(#[source] serde_json::Error),
}
