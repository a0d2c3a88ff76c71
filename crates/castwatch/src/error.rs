// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type and result alias.

use thiserror::Error;

/// Errors surfaced by castwatch operations.
///
/// Coordinator operations never return errors to the caller; these values
/// travel between the codec, the demuxer, and the per-receiver message
/// handlers (see [`crate::demux::MessageCallback`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The buffer ends before the message does. The demuxer retains the
    /// bytes and retries once more data arrives.
    #[error("incomplete message, need more bytes")]
    IncompleteMessage,

    /// The message is structurally invalid and cannot be decoded.
    #[error("message parse error: {0}")]
    Parse(&'static str),

    /// The leading type tag does not name a known message.
    #[error("unknown message type tag {0}")]
    UnknownMessageType(u8),

    /// A response arrived whose request id matches no outstanding request.
    #[error("no outstanding request with id {0}")]
    InvalidResponseId(u64),

    /// A response arrived whose shape does not match the outstanding request.
    #[error("response does not match the outstanding request")]
    InvalidMessage,

    /// An outbound message could not be encoded.
    #[error("message encoding failed: {0}")]
    Encode(&'static str),

    /// An operation that requires an open connection ran without one.
    #[error("no open connection to the receiver")]
    NotConnected,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
