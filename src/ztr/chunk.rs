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
//! ZTR chunk framing and the mapping between chunk payloads and trace fields.
//!
//! A chunk is
//!
//! ```text
//! type(4) | payload_len(4, BE) | filter chain | filtered data
//! ```
//!
//! Decoded payloads of the known chunk types:
//!
//!   - `BASE` base calls as ASCII.
//!   - `CNF1` one confidence byte per base call.
//!   - `BPOS` one 32-bit BE peak position per base call.
//!   - `SMP4` 16-bit BE samples, all of A, then C, G and T.
//!   - `CNF4` per-sample confidence bytes, all of A, then C, G and T.
//!   - `CLIP` 32-bit BE start and end base index, inclusive.
//!   - `TEXT` `key\0value\0` pairs.

use crate::error::Result;
use crate::error::TraceError;
use crate::trace::is_nucleotide;
use crate::trace::ClipRange;

use std::io::Read;

pub const BASE: [u8; 4] = *b"BASE";
pub const CNF1: [u8; 4] = *b"CNF1";
pub const BPOS: [u8; 4] = *b"BPOS";
pub const SMP4: [u8; 4] = *b"SMP4";
pub const CNF4: [u8; 4] = *b"CNF4";
pub const CLIP: [u8; 4] = *b"CLIP";
pub const TEXT: [u8; 4] = *b"TEXT";

/// A chunk as stored in the container, payload still filtered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawChunk {
    pub chunk_type: [u8; 4],
    /// Offset of the chunk type in the container
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl RawChunk {
    pub fn type_name(&self) -> String {
        String::from_utf8_lossy(&self.chunk_type).to_string()
    }
}

/// Chunk payload interpreted as a trace field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkData {
    Bases(Vec<u8>),
    Qualities(Vec<u8>),
    Peaks(Vec<u32>),
    Samples([Vec<u16>; 4]),
    Confidences([Vec<u8>; 4]),
    Clip(ClipRange),
    Text(Vec<(String, String)>),
    Unknown { chunk_type: [u8; 4], payload: Vec<u8> },
}

/// Reads chunks from a ZTR container until the end of the stream.
///
/// Yields an error and stops if a chunk header or payload is cut short.
pub struct ChunkReader<'a, R: Read> {
    conn: &'a mut R,
    offset: u64,
    done: bool,
}

impl<'a, R: Read> ChunkReader<'a, R> {
    /// `offset` is the position of `conn` in the container, used in errors.
    pub fn new(
        conn: &'a mut R,
        offset: u64,
    ) -> Self {
        ChunkReader{ conn, offset, done: false }
    }
}

impl<R: Read> ChunkReader<'_, R> {
    fn read_chunk(&mut self) -> Result<Option<RawChunk>> {
        let chunk_offset = self.offset;

        let mut chunk_type: Vec<u8> = Vec::with_capacity(4);
        self.conn.by_ref().take(4).read_to_end(&mut chunk_type)?;
        if chunk_type.is_empty() {
            return Ok(None);
        }
        if chunk_type.len() < 4 {
            return Err(TraceError::truncated("chunk type", chunk_offset, 4, chunk_type.len() as u64));
        }

        let mut len_bytes: Vec<u8> = Vec::with_capacity(4);
        self.conn.by_ref().take(4).read_to_end(&mut len_bytes)?;
        if len_bytes.len() < 4 {
            return Err(TraceError::truncated("chunk payload length", chunk_offset + 4, 4, len_bytes.len() as u64));
        }
        let payload_len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as u64;

        let mut payload: Vec<u8> = Vec::new();
        self.conn.by_ref().take(payload_len).read_to_end(&mut payload)?;
        if (payload.len() as u64) < payload_len {
            return Err(TraceError::truncated(
                format!("{} chunk payload", String::from_utf8_lossy(&chunk_type)),
                chunk_offset + 8, payload_len, payload.len() as u64,
            ));
        }

        self.offset += 8 + payload_len;

        Ok(Some(RawChunk{
            chunk_type: [chunk_type[0], chunk_type[1], chunk_type[2], chunk_type[3]],
            offset: chunk_offset,
            payload,
        }))
    }
}

impl<R: Read> Iterator for ChunkReader<'_, R> {
    type Item = Result<RawChunk>;

    fn next(
        &mut self,
    ) -> Option<Result<RawChunk>> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
        }
    }
}

pub fn write_chunk(
    chunk_type: &[u8; 4],
    payload: &[u8],
    out: &mut Vec<u8>,
) -> Result<()> {
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        TraceError::UnsupportedEncoding(format!(
            "{} chunk of {} bytes exceeds the 32-bit length field", String::from_utf8_lossy(chunk_type), payload.len()
        ))
    })?;
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(&payload_len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

fn check_multiple(name: &str, payload: &[u8], width: usize) -> Result<()> {
    if payload.len() % width != 0 {
        return Err(TraceError::malformed(name, format!("{} bytes is not a multiple of {}", payload.len(), width)));
    }
    Ok(())
}

/// Interprets a decoded chunk payload.
pub fn parse_payload(
    chunk_type: &[u8; 4],
    payload: Vec<u8>,
) -> Result<ChunkData> {
    let name = String::from_utf8_lossy(chunk_type).to_string();

    let data = match *chunk_type {
        BASE => {
            if let Some(pos) = payload.iter().position(|base| !is_nucleotide(*base)) {
                return Err(TraceError::malformed(name, format!("byte {:#04x} at {} is not a base call", payload[pos], pos)));
            }
            ChunkData::Bases(payload)
        },
        CNF1 => ChunkData::Qualities(payload),
        BPOS => {
            check_multiple(&name, &payload, 4)?;
            ChunkData::Peaks(payload.chunks_exact(4).map(|x| u32::from_be_bytes([x[0], x[1], x[2], x[3]])).collect())
        },
        SMP4 => {
            check_multiple(&name, &payload, 8)?;
            let n_samples = payload.len() / 8;
            let mut channels: [Vec<u16>; 4] = Default::default();
            for (idx, channel) in channels.iter_mut().enumerate() {
                *channel = payload[(idx * n_samples * 2)..((idx + 1) * n_samples * 2)]
                    .chunks_exact(2)
                    .map(|x| u16::from_be_bytes([x[0], x[1]]))
                    .collect();
            }
            ChunkData::Samples(channels)
        },
        CNF4 => {
            check_multiple(&name, &payload, 4)?;
            let n_samples = payload.len() / 4;
            let mut channels: [Vec<u8>; 4] = Default::default();
            for (idx, channel) in channels.iter_mut().enumerate() {
                *channel = payload[(idx * n_samples)..((idx + 1) * n_samples)].to_vec();
            }
            ChunkData::Confidences(channels)
        },
        CLIP => {
            if payload.len() != 8 {
                return Err(TraceError::malformed(name, format!("expected 8 bytes, got {}", payload.len())));
            }
            let start = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            let end = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
            if start > end {
                return Err(TraceError::malformed(name, format!("start {} after end {}", start, end)));
            }
            ChunkData::Clip(ClipRange{ start, end })
        },
        TEXT => ChunkData::Text(parse_text(&payload)?),
        _ => ChunkData::Unknown{ chunk_type: *chunk_type, payload },
    };

    Ok(data)
}

fn parse_text(
    payload: &[u8],
) -> Result<Vec<(String, String)>> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    if payload.last() != Some(&0) {
        return Err(TraceError::malformed("TEXT", "missing final terminator"));
    }

    let fields: Vec<&[u8]> = payload[0..(payload.len() - 1)].split(|byte| *byte == 0).collect();
    if fields.len() % 2 != 0 {
        return Err(TraceError::malformed("TEXT", format!("{} fields do not form key-value pairs", fields.len())));
    }

    fields.chunks_exact(2).map(|pair| -> Result<(String, String)> {
        let key = String::from_utf8(pair[0].to_vec()).map_err(|e| TraceError::malformed("TEXT", e.to_string()))?;
        let value = String::from_utf8(pair[1].to_vec()).map_err(|e| TraceError::malformed("TEXT", e.to_string()))?;
        Ok((key, value))
    }).collect()
}

pub fn samples_payload(channels: &[Vec<u16>]) -> Vec<u8> {
    channels.iter().flat_map(|channel| channel.iter().flat_map(|x| x.to_be_bytes())).collect()
}

pub fn peaks_payload(peaks: &[u32]) -> Vec<u8> {
    peaks.iter().flat_map(|x| x.to_be_bytes()).collect()
}

pub fn clip_payload(clip: &ClipRange) -> Vec<u8> {
    let mut out: Vec<u8> = clip.start.to_be_bytes().to_vec();
    out.extend_from_slice(&clip.end.to_be_bytes());
    out
}

pub fn text_payload<'a, I: Iterator<Item = (&'a String, &'a String)>>(
    comments: I,
) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    for (key, value) in comments {
        if key.as_bytes().contains(&0) || value.as_bytes().contains(&0) {
            return Err(TraceError::UnsupportedEncoding(format!("comment '{}' contains a NUL byte", key)));
        }
        out.extend_from_slice(key.as_bytes());
        out.push(0);
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }
    Ok(out)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn read_chunks_until_end() {
        use super::{write_chunk, ChunkReader};

        use std::io::Cursor;

        let mut bytes: Vec<u8> = Vec::new();
        write_chunk(b"BASE", b"\x00ACGT", &mut bytes).unwrap();
        write_chunk(b"TEXT", b"\x00", &mut bytes).unwrap();

        let mut conn = Cursor::new(bytes);
        let got: Vec<_> = ChunkReader::new(&mut conn, 8).map(|chunk| chunk.unwrap()).collect();

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].chunk_type, *b"BASE");
        assert_eq!(got[0].offset, 8);
        assert_eq!(got[0].payload, b"\x00ACGT".to_vec());
        assert_eq!(got[1].offset, 8 + 8 + 5);
    }

    #[test]
    fn payload_past_end_is_truncation() {
        use super::ChunkReader;
        use crate::error::TraceError;

        use std::io::Cursor;

        let bytes: Vec<u8> = vec![b'B', b'A', b'S', b'E', 0, 0, 0, 10, 0, b'A'];
        let mut conn = Cursor::new(bytes);
        let got: Vec<_> = ChunkReader::new(&mut conn, 0).collect();

        assert_eq!(got.len(), 1);
        assert!(matches!(got[0], Err(TraceError::TruncatedStream{ needed: 10, available: 2, .. })));
    }

    #[test]
    fn partial_chunk_type_is_truncation() {
        use super::ChunkReader;

        use std::io::Cursor;

        let mut conn = Cursor::new(vec![b'B', b'A']);
        let got: Vec<_> = ChunkReader::new(&mut conn, 0).collect();

        assert!(got[0].is_err());
    }

    #[test]
    fn parse_samples() {
        use super::{parse_payload, ChunkData, SMP4};

        let payload: Vec<u8> = vec![0, 1, 0, 2, 0, 3, 0, 4, 1, 0, 1, 1, 0, 7, 0, 8];
        let got = parse_payload(&SMP4, payload).unwrap();
        let expected = ChunkData::Samples([vec![1, 2], vec![3, 4], vec![256, 257], vec![7, 8]]);

        assert_eq!(got, expected);
    }

    #[test]
    fn parse_samples_bad_length() {
        use super::{parse_payload, SMP4};
        use crate::error::TraceError;

        let got = parse_payload(&SMP4, vec![0; 12]);

        assert!(matches!(got, Err(TraceError::MalformedPayload{ .. })));
    }

    #[test]
    fn parse_text_pairs() {
        use super::{parse_payload, text_payload, ChunkData, TEXT};

        use std::collections::BTreeMap;

        let mut comments: BTreeMap<String, String> = BTreeMap::new();
        comments.insert("MACH".to_string(), "3730xl".to_string());
        comments.insert("NAME".to_string(), "".to_string());

        let payload = text_payload(comments.iter()).unwrap();
        assert_eq!(payload, b"MACH\x003730xl\x00NAME\x00\x00".to_vec());

        let got = parse_payload(&TEXT, payload).unwrap();
        let expected = ChunkData::Text(vec![("MACH".to_string(), "3730xl".to_string()), ("NAME".to_string(), "".to_string())]);

        assert_eq!(got, expected);
    }

    #[test]
    fn parse_text_odd_fields() {
        use super::{parse_payload, TEXT};

        assert!(parse_payload(&TEXT, b"NAME\x00".to_vec()).is_err());
        assert!(parse_payload(&TEXT, b"NAME".to_vec()).is_err());
    }

    #[test]
    fn parse_clip() {
        use super::{clip_payload, parse_payload, ChunkData, CLIP};
        use crate::trace::ClipRange;

        let range = ClipRange{ start: 12, end: 480 };
        let got = parse_payload(&CLIP, clip_payload(&range)).unwrap();

        assert_eq!(got, ChunkData::Clip(range));
        assert!(parse_payload(&CLIP, vec![0, 0, 0, 9, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn parse_unknown_type() {
        use super::{parse_payload, ChunkData};

        let got = parse_payload(b"REGN", vec![1, 2, 3]).unwrap();

        assert_eq!(got, ChunkData::Unknown{ chunk_type: *b"REGN", payload: vec![1, 2, 3] });
    }

    #[test]
    fn parse_bad_base_call() {
        use super::{parse_payload, BASE};

        assert!(parse_payload(&BASE, b"AC-T".to_vec()).is_err());
    }
}
