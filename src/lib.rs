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
//! tracecodec is a library and a command-line client for:
//!
//!   - Identifying DNA sequencing trace files from their magic number.
//!   - Decoding ZTR, SCF and AB1 traces into one [Trace] model.
//!   - Encoding a [Trace] as any of the three formats.
//!   - Converting between the formats.
//!
//! The following formats are supported:
//!   - [ZTR](https://staden.sourceforge.net/ztr.html), chunked and compressed
//!     through filter chains.
//!   - [SCF](https://staden.sourceforge.net/manual/formats_unix_3.html)
//!     versions 2 and 3, with 1 or 2 byte samples.
//!   - [AB1](https://www.thermofisher.com/) (ABIF), a directory of typed tags.
//!
//! ## Usage
//!
//! ### Command line
//!
//! The tracecodec CLI supports the following subcommands:
//!   - `tracecodec detect` print the format of each input file.
//!   - `tracecodec info` print a summary of each decoded trace.
//!   - `tracecodec convert` decode a trace and encode it in another format.
//!
//! ### Rust API
//!
//! [decode_from_read] identifies the format of a [Read] and decodes it.
//! [encode_to_write] and [convert_from_read_to_write] write a chosen format
//! to a [Write]. Each format can also be used directly through its module
//! ([ztr], [scf] and [ab1]) or through the [TraceCodec] implementations
//! [ZtrCodec], [ScfCodec] and [Ab1Codec].
//!
//! ## Partial failures
//!
//! Each format contains damage differently:
//!
//!   - ZTR: a chunk with a broken filter chain or payload is skipped.
//!   - AB1: a tag whose value cannot be resolved or interpreted is skipped.
//!   - SCF: any damage fails the whole parse.
//!
//! Skipped parts are listed in [Decoded::skipped] next to the trace.
//! Structural damage such as a wrong magic number, a truncated header or an
//! AB1 directory outside the file always fails the parse.
//!

use crate::error::Result;
use crate::error::TraceError;
use crate::format::TraceFormat;
use crate::scf::ScfOptions;
use crate::trace::Trace;

use std::io::Read;
use std::io::Write;

pub mod ab1;
pub mod compression;
pub mod error;
pub mod format;
pub mod scf;
pub mod trace;
pub mod ztr;

/// A part of the input that was left out of the decoded trace.
#[derive(Debug)]
pub struct Skipped {
    /// Chunk or tag that was skipped, e.g. `SMP4 chunk at offset 412`.
    pub context: String,
    pub error: TraceError,
}

/// A decoded trace and the parts of the input that could not be used.
#[derive(Debug)]
pub struct Decoded {
    pub trace: Trace,
    pub skipped: Vec<Skipped>,
}

/// Encoder settings that are not implied by the trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub scf: ScfOptions,
}

/// A trace format codec.
///
/// Codecs hold no state between calls and can be shared between threads
/// decoding different inputs.
pub trait TraceCodec: Send + Sync {
    fn format(&self) -> TraceFormat;

    fn decode(&self, bytes: &[u8]) -> Result<Decoded>;

    fn encode(&self, trace: &Trace) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZtrCodec;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScfCodec {
    pub opts: ScfOptions,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ab1Codec;

impl TraceCodec for ZtrCodec {
    fn format(&self) -> TraceFormat {
        TraceFormat::Ztr
    }

    fn decode(&self, mut bytes: &[u8]) -> Result<Decoded> {
        ztr::decode_from_read(&mut bytes)
    }

    fn encode(&self, trace: &Trace) -> Result<Vec<u8>> {
        ztr::encode(trace)
    }
}

impl TraceCodec for ScfCodec {
    fn format(&self) -> TraceFormat {
        TraceFormat::Scf
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        scf::decode(bytes)
    }

    fn encode(&self, trace: &Trace) -> Result<Vec<u8>> {
        scf::encode(trace, &self.opts)
    }
}

impl TraceCodec for Ab1Codec {
    fn format(&self) -> TraceFormat {
        TraceFormat::Ab1
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        ab1::decode(bytes)
    }

    fn encode(&self, trace: &Trace) -> Result<Vec<u8>> {
        ab1::encode(trace)
    }
}

/// Returns the codec of `format` configured with `options`.
pub fn codec(
    format: TraceFormat,
    options: &EncodeOptions,
) -> Box<dyn TraceCodec> {
    match format {
        TraceFormat::Ztr => Box::new(ZtrCodec),
        TraceFormat::Scf => Box::new(ScfCodec{ opts: options.scf }),
        TraceFormat::Ab1 => Box::new(Ab1Codec),
    }
}

/// Identifies the format of the trace in `conn` from its first bytes.
///
/// Reads at most [SNIFF_LEN](format::SNIFF_LEN) bytes.
pub fn detect_from_read<R: Read>(
    conn: &mut R,
) -> Result<Option<TraceFormat>> {
    let (format, _) = format::sniff_read(conn)?;
    Ok(format)
}

/// Identifies the format of `conn` and decodes it.
///
/// ZTR is decoded as it is read. SCF and AB1 refer to absolute offsets and
/// are read into memory first.
///
/// ## Errors
///
/// Returns [TraceError::FormatMismatch] if the input does not start with a
/// known magic number.
///
/// ## Usage
/// ```rust
/// use tracecodec::{decode_from_read, encode_to_write, EncodeOptions};
/// use tracecodec::format::TraceFormat;
/// use tracecodec::trace::Trace;
/// use std::io::Cursor;
///
/// let mut builder = Trace::builder();
/// builder.bases(b"ACGT".to_vec())
///     .qualities(vec![30, 30, 20, 10])
///     .channel_positions(b'A', vec![10, 80, 10, 0])
///     .channel_positions(b'C', vec![0, 10, 80, 10])
///     .channel_positions(b'G', vec![0, 0, 10, 80])
///     .channel_positions(b'T', vec![80, 10, 0, 0]);
/// let trace = builder.build().unwrap();
///
/// let mut bytes: Vec<u8> = Vec::new();
/// encode_to_write(TraceFormat::Scf, &trace, &EncodeOptions::default(), &mut bytes).unwrap();
///
/// let got = decode_from_read(&mut Cursor::new(bytes)).unwrap();
/// assert_eq!(got.trace, trace);
/// ```
pub fn decode_from_read<R: Read>(
    conn: &mut R,
) -> Result<Decoded> {
    let (format, mut replay) = format::sniff_read(conn)?;

    match format {
        Some(TraceFormat::Ztr) => ztr::decode_from_read(&mut replay),
        Some(TraceFormat::Scf) => scf::decode_from_read(&mut replay),
        Some(TraceFormat::Ab1) => ab1::decode_from_read(&mut replay),
        None => Err(TraceError::FormatMismatch{
            format: "ZTR, SCF or AB1",
            expected: Vec::new(),
            found: replay.get_ref().0.get_ref().clone(),
        }),
    }
}

/// Encodes `trace` as `format` and writes it to `conn`.
///
/// Nothing is written if encoding fails.
pub fn encode_to_write<W: Write>(
    format: TraceFormat,
    trace: &Trace,
    options: &EncodeOptions,
    conn: &mut W,
) -> Result<()> {
    let bytes = codec(format, options).encode(trace)?;
    conn.write_all(&bytes)?;
    conn.flush()?;
    Ok(())
}

/// Decodes the trace in `conn_in` and writes it to `conn_out` as `format`.
///
/// Returns the parts of the input that were skipped while decoding.
///
/// ## Usage
/// ```rust
/// use tracecodec::{convert_from_read_to_write, decode_from_read, EncodeOptions};
/// use tracecodec::format::TraceFormat;
/// use tracecodec::trace::Trace;
/// use std::io::Cursor;
///
/// let mut builder = Trace::builder();
/// builder.bases(b"GATTACA".to_vec()).comment("NAME", "sample_1");
/// let trace = builder.build().unwrap();
/// let mut input = Cursor::new(tracecodec::ztr::encode(&trace).unwrap());
///
/// let mut output: Vec<u8> = Vec::new();
/// let skipped = convert_from_read_to_write(TraceFormat::Ab1, &EncodeOptions::default(), &mut input, &mut output).unwrap();
///
/// assert!(skipped.is_empty());
/// assert_eq!(&output[0..4], b"ABIF");
/// assert_eq!(decode_from_read(&mut Cursor::new(output)).unwrap().trace, trace);
/// ```
pub fn convert_from_read_to_write<R: Read, W: Write>(
    format: TraceFormat,
    options: &EncodeOptions,
    conn_in: &mut R,
    conn_out: &mut W,
) -> Result<Vec<Skipped>> {
    let decoded = decode_from_read(conn_in)?;
    encode_to_write(format, &decoded.trace, options, conn_out)?;
    Ok(decoded.skipped)
}
