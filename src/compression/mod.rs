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
//! Reversible byte-transform filters and filter chains.
//!
//! A ZTR chunk payload starts with its filter chain: one id byte per
//! [Filter], terminated by [CHAIN_END]. The filtered data follows.
//!
//! ```text
//! id_1 | id_2 | ... | id_n | 0x00 | filtered data
//! ```
//!
//! [decode_chain] undoes the filters in stored order (`id_1` first), so
//! [encode_chain] applies them last to first. Each filter's auxiliary
//! parameters are stored in its own output; the chain only records ids.

pub mod delta;
pub mod gzwrapper;
pub mod pack;
pub mod rle;

use crate::error::Result;
use crate::error::TraceError;

/// Terminates a filter chain. Also the id of [Filter::Raw].
pub const CHAIN_END: u8 = 0;

/// Delta order used when a filter is created from its id.
const DEFAULT_ORDER: u8 = 1;

/// Supported byte-transform filters.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Filter {
    /// Identity
    #[default]
    Raw,
    /// `(value, count)` byte pairs
    RunLength,
    /// zlib deflate with flate2
    Zlib,
    /// Delta coding of 8-bit elements
    Delta8 { order: u8 },
    /// Delta coding of 16-bit big-endian elements
    Delta16 { order: u8 },
    /// Delta coding of 32-bit big-endian elements
    Delta32 { order: u8 },
    /// Pack 16-bit big-endian integers into bytes
    Pack16To8,
    /// Pack 32-bit big-endian integers into bytes
    Pack32To8,
}

impl Filter {
    pub fn from_u8(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Filter::Raw),
            1 => Ok(Filter::RunLength),
            2 => Ok(Filter::Zlib),
            64 => Ok(Filter::Delta8 { order: DEFAULT_ORDER }),
            65 => Ok(Filter::Delta16 { order: DEFAULT_ORDER }),
            66 => Ok(Filter::Delta32 { order: DEFAULT_ORDER }),
            70 => Ok(Filter::Pack16To8),
            71 => Ok(Filter::Pack32To8),
            _ => Err(TraceError::UnsupportedEncoding(format!("unknown filter id {}", id))),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match &self {
            Filter::Raw => 0,
            Filter::RunLength => 1,
            Filter::Zlib => 2,
            Filter::Delta8 { .. } => 64,
            Filter::Delta16 { .. } => 65,
            Filter::Delta32 { .. } => 66,
            Filter::Pack16To8 => 70,
            Filter::Pack32To8 => 71,
        }
    }

    pub fn name(&self) -> &'static str {
        match &self {
            Filter::Raw => "raw",
            Filter::RunLength => "run-length",
            Filter::Zlib => "zlib",
            Filter::Delta8 { .. } => "delta8",
            Filter::Delta16 { .. } => "delta16",
            Filter::Delta32 { .. } => "delta32",
            Filter::Pack16To8 => "16to8",
            Filter::Pack32To8 => "32to8",
        }
    }

    /// Every registered filter, with default parameters.
    pub fn all() -> [Filter; 8] {
        [
            Filter::Raw,
            Filter::RunLength,
            Filter::Zlib,
            Filter::Delta8 { order: DEFAULT_ORDER },
            Filter::Delta16 { order: DEFAULT_ORDER },
            Filter::Delta32 { order: DEFAULT_ORDER },
            Filter::Pack16To8,
            Filter::Pack32To8,
        ]
    }

    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        match *self {
            Filter::Raw => Ok(bytes.to_vec()),
            Filter::RunLength => Ok(rle::encode(bytes)),
            Filter::Zlib => gzwrapper::deflate_bytes(bytes),
            Filter::Delta8 { order } => delta::encode(bytes, 1, order),
            Filter::Delta16 { order } => delta::encode(bytes, 2, order),
            Filter::Delta32 { order } => delta::encode(bytes, 4, order),
            Filter::Pack16To8 => Ok(pack::encode(bytes, 2)),
            Filter::Pack32To8 => Ok(pack::encode(bytes, 4)),
        }
    }

    /// Undoes [encode](Filter::encode). Parameters are read from `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        match *self {
            Filter::Raw => Ok(bytes.to_vec()),
            Filter::RunLength => rle::decode(bytes),
            Filter::Zlib => gzwrapper::inflate_bytes(bytes),
            Filter::Delta8 { .. } => delta::decode(bytes, 1),
            Filter::Delta16 { .. } => delta::decode(bytes, 2),
            Filter::Delta32 { .. } => delta::decode(bytes, 4),
            Filter::Pack16To8 => pack::decode(bytes, 2),
            Filter::Pack32To8 => pack::decode(bytes, 4),
        }
    }
}

/// Splits a chunk payload into its filter chain and the filtered data.
pub fn read_chain(
    payload: &[u8],
) -> Result<(Vec<Filter>, &[u8])> {
    let end = payload.iter().position(|id| *id == CHAIN_END).ok_or_else(|| {
        TraceError::corrupt("chain", format!("no terminator in {} payload bytes", payload.len()))
    })?;

    let filters = payload[0..end].iter().map(|id| Filter::from_u8(*id)).collect::<Result<Vec<Filter>>>()?;

    Ok((filters, &payload[(end + 1)..]))
}

/// Decodes a chunk payload through the filter chain it declares.
pub fn decode_chain(
    payload: &[u8],
) -> Result<Vec<u8>> {
    let (filters, data) = read_chain(payload)?;

    let mut bytes: Vec<u8> = data.to_vec();
    for filter in filters.iter() {
        bytes = filter.decode(&bytes)?;
    }

    Ok(bytes)
}

/// Encodes `raw` through `filters` and prepends the chain.
///
/// [Filter::Raw] entries are dropped from the chain since their id is the
/// terminator.
pub fn encode_chain(
    filters: &[Filter],
    raw: &[u8],
) -> Result<Vec<u8>> {
    let filters: Vec<&Filter> = filters.iter().filter(|filter| **filter != Filter::Raw).collect();

    let mut bytes: Vec<u8> = raw.to_vec();
    for filter in filters.iter().rev() {
        bytes = filter.encode(&bytes)?;
    }

    let mut out: Vec<u8> = filters.iter().map(|filter| filter.to_u8()).collect();
    out.push(CHAIN_END);
    out.append(&mut bytes);

    Ok(out)
}
