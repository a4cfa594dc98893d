// tracecodec: Decoding and encoding of ZTR, SCF and AB1 sequencing traces.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//
//! Error type shared by the trace codecs.
//!
//! Every codec returns [TraceError]. Some kinds are contained by the
//! container that owns them (a single ZTR chunk or a single AB1 tag) and are
//! returned next to the decoded trace in [Decoded](crate::Decoded). The rest
//! abort the whole parse. See [TraceError::is_recoverable].

use thiserror::Error;

/// Result type alias for trace codec operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Error type for trace codec operations
#[derive(Error, Debug)]
pub enum TraceError {
    /// The input does not start with the expected magic number
    #[error("Format mismatch: expected {format} magic {expected:02x?}, found {found:02x?}")]
    FormatMismatch {
        /// Name of the format that was expected
        format: &'static str,
        /// Magic bytes of that format
        expected: Vec<u8>,
        /// Bytes found at the start of the input
        found: Vec<u8>,
    },

    /// A declared length runs past the end of the input
    #[error("Truncated stream while reading {context} at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedStream {
        /// What was being read
        context: String,
        /// Byte offset of the read
        offset: u64,
        /// Bytes required
        needed: u64,
        /// Bytes left in the input
        available: u64,
    },

    /// A byte-transform filter found data it could not have produced
    #[error("Corrupt {filter} filter data: {reason}")]
    CorruptFilterData {
        /// Name of the filter
        filter: &'static str,
        /// Explanation of the framing violation
        reason: String,
    },

    /// A section offset or tag offset points outside the input
    #[error("Reference to {context} out of bounds: offset {offset} + length {length} exceeds input size {size}")]
    OutOfBoundsReference {
        /// Field or section that holds the reference
        context: String,
        /// Referenced offset
        offset: u64,
        /// Referenced length
        length: u64,
        /// Size of the input
        size: u64,
    },

    /// A filter id or sample width that this crate cannot handle
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// A decoded chunk or tag payload does not fit its meaning
    #[error("Malformed {context} payload: {reason}")]
    MalformedPayload {
        /// Chunk type or tag name
        context: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Trace fields violate a model invariant
    #[error("Invalid trace: {0}")]
    InvalidTrace(String),

    /// Fixed-layout header could not be decoded
    #[error("Header decoding failed: {0}")]
    HeaderDecode(#[from] bincode::error::DecodeError),

    /// Fixed-layout header could not be encoded
    #[error("Header encoding failed: {0}")]
    HeaderEncode(#[from] bincode::error::EncodeError),

    /// I/O failure on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TraceError {
    /// Whether a container may skip the failing chunk or tag and carry on.
    ///
    /// Only meaningful for errors raised while decoding one ZTR chunk or one
    /// AB1 tag. Header and container level errors are never contained.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TraceError::CorruptFilterData { .. }
                | TraceError::UnsupportedEncoding(_)
                | TraceError::MalformedPayload { .. }
                | TraceError::OutOfBoundsReference { .. }
        )
    }

    pub(crate) fn truncated(context: impl Into<String>, offset: u64, needed: u64, available: u64) -> Self {
        TraceError::TruncatedStream { context: context.into(), offset, needed, available }
    }

    pub(crate) fn corrupt(filter: &'static str, reason: impl Into<String>) -> Self {
        TraceError::CorruptFilterData { filter, reason: reason.into() }
    }

    pub(crate) fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        TraceError::MalformedPayload { context: context.into(), reason: reason.into() }
    }
}
