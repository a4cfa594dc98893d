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
//! zlib deflate through flate2.
//!
//! Encoded layout: `raw_len(4, BE) | zlib stream`.

use crate::error::Result;
use crate::error::TraceError;

use std::io::Read;
use std::io::Write;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

pub fn deflate_bytes(
    bytes: &[u8],
) -> Result<Vec<u8>> {
    let raw_len = u32::try_from(bytes.len()).map_err(|_| {
        TraceError::UnsupportedEncoding(format!("{} bytes is too long for a zlib block", bytes.len()))
    })?;

    let mut out: Vec<u8> = raw_len.to_be_bytes().to_vec();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    out.append(&mut encoder.finish()?);

    Ok(out)
}

pub fn inflate_bytes(
    bytes: &[u8],
) -> Result<Vec<u8>> {
    if bytes.len() < 4 {
        return Err(TraceError::corrupt("zlib", format!("{} bytes is too short for the length prefix", bytes.len())));
    }
    let raw_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

    let mut out: Vec<u8> = Vec::with_capacity(raw_len);
    let mut decoder = ZlibDecoder::new(&bytes[4..]);
    decoder.read_to_end(&mut out).map_err(|e| TraceError::corrupt("zlib", e.to_string()))?;

    if out.len() != raw_len {
        return Err(TraceError::corrupt("zlib", format!("inflated {} bytes, header declares {}", out.len(), raw_len)));
    }

    Ok(out)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn deflate_and_inflate() {
        use super::{deflate_bytes, inflate_bytes};

        let data: Vec<u8> = b"ACGTACGTACGTACGTNNNNACGT".repeat(20);
        let deflated = deflate_bytes(&data).unwrap();

        assert_eq!(&deflated[0..4], &[0, 0, 1, 224]);
        assert!(deflated.len() < data.len());
        assert_eq!(inflate_bytes(&deflated).unwrap(), data);
    }

    #[test]
    fn inflate_wrong_length() {
        use super::{deflate_bytes, inflate_bytes};
        use crate::error::TraceError;

        let mut deflated = deflate_bytes(b"ACGT").unwrap();
        deflated[3] = 5;

        assert!(matches!(inflate_bytes(&deflated), Err(TraceError::CorruptFilterData{ .. })));
    }

    #[test]
    fn inflate_garbage() {
        use super::inflate_bytes;

        assert!(inflate_bytes(&[0, 0, 0, 4, 1, 2, 3, 4, 5]).is_err());
        assert!(inflate_bytes(&[0, 0]).is_err());
    }
}
