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
//! Fixed-order delta coding of big-endian 8, 16 and 32-bit elements.
//!
//! Encoded layout:
//!
//! ```text
//! order(1) | n_trailing(1) | deltas (multiple of width) | trailing bytes
//! ```
//!
//! `n_trailing` counts the bytes after the last whole element. They are
//! stored as they are so that any input length can be encoded.

use crate::error::Result;
use crate::error::TraceError;

/// Highest supported delta order.
pub const MAX_ORDER: u8 = 3;

fn name(width: usize) -> &'static str {
    match width {
        1 => "delta8",
        2 => "delta16",
        _ => "delta32",
    }
}

/// Largest value of an element `width` bytes wide.
pub fn mask(width: usize) -> u32 {
    if width == 4 { u32::MAX } else { (1_u32 << (8 * width)) - 1 }
}

/// Replaces `words` with their differences, `order` times, wrapping at `mask`.
pub fn difference(words: &mut [u32], mask: u32, order: u8) {
    for _ in 0..order {
        for idx in (1..words.len()).rev() {
            words[idx] = words[idx].wrapping_sub(words[idx - 1]) & mask;
        }
    }
}

/// Inverse of [difference].
pub fn accumulate(words: &mut [u32], mask: u32, order: u8) {
    for _ in 0..order {
        for idx in 1..words.len() {
            words[idx] = words[idx].wrapping_add(words[idx - 1]) & mask;
        }
    }
}

fn to_words(bytes: &[u8], width: usize) -> Vec<u32> {
    bytes.chunks_exact(width).map(|chunk| {
        chunk.iter().fold(0_u32, |acc, byte| (acc << 8) | *byte as u32)
    }).collect()
}

fn extend_from_words(words: &[u32], width: usize, out: &mut Vec<u8>) {
    words.iter().for_each(|word| {
        (0..width).rev().for_each(|shift| out.push((word >> (8 * shift)) as u8));
    });
}

pub fn encode(bytes: &[u8], width: usize, order: u8) -> Result<Vec<u8>> {
    if order == 0 || order > MAX_ORDER {
        return Err(TraceError::UnsupportedEncoding(format!("{} order {} (supported 1-{})", name(width), order, MAX_ORDER)));
    }

    let n_trailing = bytes.len() % width;
    let split = bytes.len() - n_trailing;
    let mask = mask(width);

    let mut words = to_words(&bytes[0..split], width);
    difference(&mut words, mask, order);

    let mut out: Vec<u8> = Vec::with_capacity(bytes.len() + 2);
    out.push(order);
    out.push(n_trailing as u8);
    extend_from_words(&words, width, &mut out);
    out.extend_from_slice(&bytes[split..]);
    Ok(out)
}

pub fn decode(bytes: &[u8], width: usize) -> Result<Vec<u8>> {
    if bytes.len() < 2 {
        return Err(TraceError::corrupt(name(width), format!("{} bytes is too short for the order and padding bytes", bytes.len())));
    }

    let order = bytes[0];
    if order == 0 || order > MAX_ORDER {
        return Err(TraceError::corrupt(name(width), format!("order {} outside 1-{}", order, MAX_ORDER)));
    }

    let n_trailing = bytes[1] as usize;
    let body = &bytes[2..];
    if n_trailing >= width || n_trailing > body.len() {
        return Err(TraceError::corrupt(name(width), format!("{} trailing bytes with element width {}", n_trailing, width)));
    }

    let split = body.len() - n_trailing;
    if split % width != 0 {
        return Err(TraceError::corrupt(name(width), format!("{} bytes is not a multiple of element width {}", split, width)));
    }

    let mask = mask(width);
    let mut words = to_words(&body[0..split], width);
    accumulate(&mut words, mask, order);

    let mut out: Vec<u8> = Vec::with_capacity(body.len());
    extend_from_words(&words, width, &mut out);
    out.extend_from_slice(&body[split..]);
    Ok(out)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn encode_first_order_bytes() {
        use super::encode;

        let got = encode(&[10, 12, 15, 15, 9], 1, 1).unwrap();
        let expected: Vec<u8> = vec![1, 0, 10, 2, 3, 0, 250];

        assert_eq!(got, expected);
    }

    #[test]
    fn encode_second_order_words() {
        use super::encode;

        // 100, 110, 130, 160 -> 100, 10, 20, 30 -> 100, 10, 10, 10
        let data: Vec<u8> = vec![0, 100, 0, 110, 0, 130, 0, 160];
        let got = encode(&data, 2, 2).unwrap();
        let expected: Vec<u8> = vec![2, 0, 0, 100, 0, 10, 0, 10, 0, 10];

        assert_eq!(got, expected);
    }

    #[test]
    fn decode_keeps_trailing_bytes() {
        use super::{decode, encode};

        let data: Vec<u8> = vec![0, 0, 1, 0, 0, 0, 0, 3, 0xAA, 0xBB];
        let encoded = encode(&data, 4, 3).unwrap();
        assert_eq!(encoded[1], 2);

        let got = decode(&encoded, 4).unwrap();

        assert_eq!(got, data);
    }

    #[test]
    fn decode_wraps_around() {
        use super::decode;

        let got = decode(&[1, 0, 0xFF, 0xFF, 0x00, 0x02], 2).unwrap();

        assert_eq!(got, vec![0xFF, 0xFF, 0x00, 0x01]);
    }

    #[test]
    fn decode_not_multiple_of_width() {
        use super::decode;
        use crate::error::TraceError;

        let got = decode(&[1, 0, 0, 1, 2], 2);

        assert!(matches!(got, Err(TraceError::CorruptFilterData{ .. })));
    }

    #[test]
    fn decode_bad_order() {
        use super::decode;

        assert!(decode(&[0, 0, 1, 2], 1).is_err());
        assert!(decode(&[4, 0, 1, 2], 1).is_err());
    }

    #[test]
    fn encode_bad_order() {
        use super::encode;
        use crate::error::TraceError;

        let got = encode(&[1, 2, 3], 1, 4);

        assert!(matches!(got, Err(TraceError::UnsupportedEncoding(_))));
    }
}
