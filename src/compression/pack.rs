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
//! Packing of 16 and 32-bit big-endian integers into single bytes.
//!
//! Values in `-127..=127` are stored as one signed byte. Anything else is
//! stored as the escape byte `0x80` followed by the full big-endian value.
//! Delta coded trace samples are mostly small, so most elements shrink to a
//! single byte.
//!
//! Encoded layout:
//!
//! ```text
//! n_trailing(1) | packed elements | trailing bytes
//! ```

use crate::error::Result;
use crate::error::TraceError;

const ESCAPE: u8 = 0x80;

fn name(width: usize) -> &'static str {
    if width == 2 { "16to8" } else { "32to8" }
}

fn signed_value(chunk: &[u8]) -> i64 {
    match chunk.len() {
        2 => i16::from_be_bytes([chunk[0], chunk[1]]) as i64,
        _ => i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as i64,
    }
}

pub fn encode(bytes: &[u8], width: usize) -> Vec<u8> {
    let n_trailing = bytes.len() % width;
    let split = bytes.len() - n_trailing;

    let mut out: Vec<u8> = Vec::with_capacity(split / width + n_trailing + 1);
    out.push(n_trailing as u8);
    bytes[0..split].chunks_exact(width).for_each(|chunk| {
        let value = signed_value(chunk);
        if (-127..=127).contains(&value) {
            out.push(value as i8 as u8);
        } else {
            out.push(ESCAPE);
            out.extend_from_slice(chunk);
        }
    });
    out.extend_from_slice(&bytes[split..]);
    out
}

pub fn decode(bytes: &[u8], width: usize) -> Result<Vec<u8>> {
    let Some((n_trailing, body)) = bytes.split_first() else {
        return Err(TraceError::corrupt(name(width), "missing padding byte"));
    };

    let n_trailing = *n_trailing as usize;
    if n_trailing >= width || n_trailing > body.len() {
        return Err(TraceError::corrupt(name(width), format!("{} trailing bytes with element width {}", n_trailing, width)));
    }
    let (packed, trailing) = body.split_at(body.len() - n_trailing);

    let mut out: Vec<u8> = Vec::with_capacity(packed.len() * width + n_trailing);
    let mut pos: usize = 0;
    while pos < packed.len() {
        let byte = packed[pos];
        pos += 1;
        if byte == ESCAPE {
            if pos + width > packed.len() {
                return Err(TraceError::corrupt(name(width), format!("escaped value at byte {} runs past the end", pos - 1)));
            }
            out.extend_from_slice(&packed[pos..(pos + width)]);
            pos += width;
        } else {
            let value = byte as i8 as i32;
            out.extend_from_slice(&value.to_be_bytes()[(4 - width)..]);
        }
    }
    out.extend_from_slice(trailing);
    Ok(out)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn encode_small_and_large_16() {
        use super::encode;

        // 5, -3, 300, -128
        let data: Vec<u8> = vec![0x00, 0x05, 0xFF, 0xFD, 0x01, 0x2C, 0xFF, 0x80];
        let got = encode(&data, 2);
        let expected: Vec<u8> = vec![0, 0x05, 0xFD, 0x80, 0x01, 0x2C, 0x80, 0xFF, 0x80];

        assert_eq!(got, expected);
    }

    #[test]
    fn decode_sign_extends_32() {
        use super::decode;

        let got = decode(&[0, 0xFE, 0x7F], 4).unwrap();
        let expected: Vec<u8> = vec![0xFF, 0xFF, 0xFF, 0xFE, 0x00, 0x00, 0x00, 0x7F];

        assert_eq!(got, expected);
    }

    #[test]
    fn decode_truncated_escape() {
        use super::decode;
        use crate::error::TraceError;

        let got = decode(&[0, 0x01, 0x80, 0x01], 2);

        assert!(matches!(got, Err(TraceError::CorruptFilterData{ .. })));
    }

    #[test]
    fn decode_empty_input() {
        use super::decode;

        assert!(decode(&[], 2).is_err());
    }
}
