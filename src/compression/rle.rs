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
//! Run-length coding as `(value, count)` byte pairs.

use crate::error::Result;
use crate::error::TraceError;

/// Longest run a single pair can hold.
const MAX_RUN: usize = u8::MAX as usize;

pub fn encode(bytes: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().peekable();
    while let Some(value) = iter.next() {
        let mut count: usize = 1;
        while count < MAX_RUN && iter.peek() == Some(&value) {
            iter.next();
            count += 1;
        }
        out.push(*value);
        out.push(count as u8);
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() % 2 != 0 {
        return Err(TraceError::corrupt("run-length", format!("{} bytes is not a whole number of pairs", bytes.len())));
    }

    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    for (idx, pair) in bytes.chunks_exact(2).enumerate() {
        if pair[1] == 0 {
            return Err(TraceError::corrupt("run-length", format!("pair {} has a zero repeat count", idx)));
        }
        out.extend(std::iter::repeat(pair[0]).take(pair[1] as usize));
    }
    Ok(out)
}
