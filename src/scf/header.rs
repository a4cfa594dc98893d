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
//! The fixed 128-byte SCF header.
//!
//! All fields are big-endian 32-bit integers except the magic number and the
//! version, which are 4 ASCII bytes each. Version 2 and version 3 files share
//! the header layout; they differ in how the sample and base sections are
//! arranged.

use crate::error::Result;
use crate::error::TraceError;
use crate::format::SCF_MAGIC;

use bincode::{Encode, Decode};
use bincode::encode_into_std_write;
use bincode::decode_from_slice;

/// Encoded size of [ScfHeader].
pub const HEADER_LEN: usize = 128;

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ScfHeader {
    pub magic: [u8; 4],
    /// Samples per channel
    pub samples: u32,
    pub samples_offset: u32,
    /// Number of base calls
    pub bases: u32,
    pub bases_left_clip: u32,
    pub bases_right_clip: u32,
    pub bases_offset: u32,
    /// Bytes in the comment section, including the final NUL
    pub comments_size: u32,
    pub comments_offset: u32,
    /// ASCII version, "3.00" or "2.00"
    pub version: [u8; 4],
    /// Bytes per sample, 1 or 2
    pub sample_size: u32,
    pub code_set: u32,
    pub private_size: u32,
    pub private_offset: u32,
    pub spare: [u32; 18],
}

impl Default for ScfHeader {
    fn default() -> Self {
        ScfHeader{
            magic: SCF_MAGIC,
            samples: 0, samples_offset: HEADER_LEN as u32,
            bases: 0, bases_left_clip: 0, bases_right_clip: 0, bases_offset: HEADER_LEN as u32,
            comments_size: 0, comments_offset: HEADER_LEN as u32,
            version: *b"3.00",
            sample_size: 2, code_set: 0,
            private_size: 0, private_offset: 0,
            spare: [0; 18],
        }
    }
}

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_big_endian().with_fixed_int_encoding()
}

pub fn encode_header(
    header: &ScfHeader,
) -> Result<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::with_capacity(HEADER_LEN);
    let nbytes = encode_into_std_write(header, &mut bytes, config())?;
    assert_eq!(nbytes, HEADER_LEN);
    Ok(bytes)
}

/// Decodes the header at the start of `bytes`.
///
/// Checks the magic number before anything else.
pub fn decode_header(
    bytes: &[u8],
) -> Result<ScfHeader> {
    let prefix = &bytes[0..bytes.len().min(SCF_MAGIC.len())];
    if prefix != &SCF_MAGIC[..] {
        return Err(TraceError::FormatMismatch{ format: "SCF", expected: SCF_MAGIC.to_vec(), found: prefix.to_vec() });
    }
    if bytes.len() < HEADER_LEN {
        return Err(TraceError::truncated("SCF header", 0, HEADER_LEN as u64, bytes.len() as u64));
    }
    Ok(decode_from_slice(&bytes[0..HEADER_LEN], config())?.0)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn encode_header_layout() {
        use super::{encode_header, ScfHeader};

        let header = ScfHeader{ samples: 0x0102, bases: 7, sample_size: 1, ..Default::default() };
        let got = encode_header(&header).unwrap();

        assert_eq!(got.len(), 128);
        assert_eq!(&got[0..4], b".scf");
        assert_eq!(&got[4..8], &[0, 0, 1, 2]);
        assert_eq!(&got[8..12], &[0, 0, 0, 128]);
        assert_eq!(&got[12..16], &[0, 0, 0, 7]);
        assert_eq!(&got[36..40], b"3.00");
        assert_eq!(&got[40..44], &[0, 0, 0, 1]);
        assert!(got[56..128].iter().all(|x| *x == 0));
    }

    #[test]
    fn decode_encoded_header() {
        use super::{decode_header, encode_header, ScfHeader};

        let header = ScfHeader{ samples: 4000, bases: 512, comments_size: 33, version: *b"2.00", ..Default::default() };
        let got = decode_header(&encode_header(&header).unwrap()).unwrap();

        assert_eq!(got, header);
    }

    #[test]
    fn decode_wrong_magic() {
        use super::decode_header;
        use crate::error::TraceError;

        let got = decode_header(b"ABIF0000");

        assert!(matches!(got, Err(TraceError::FormatMismatch{ .. })));
    }

    #[test]
    fn decode_short_header() {
        use super::decode_header;
        use crate::error::TraceError;

        let got = decode_header(b".scf\x00\x00\x00\x01");

        assert!(matches!(got, Err(TraceError::TruncatedStream{ needed: 128, available: 8, .. })));
    }
}
