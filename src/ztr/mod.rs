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
//! ZTR container codec.
//!
//! ```text
//! magic(8) | chunk | chunk | ...
//! ```
//!
//! Chunks are described in [chunk]. Decoding is forward-only, one chunk at a
//! time. A chunk whose filter chain or payload is broken is skipped and
//! reported in [Decoded::skipped]; the chunks around it are kept. A chunk
//! whose declared length runs past the end of the input ends the parse with
//! [TraceError::TruncatedStream].

pub mod chunk;

use crate::compression::decode_chain;
use crate::compression::encode_chain;
use crate::compression::Filter;
use crate::error::Result;
use crate::error::TraceError;
use crate::format::ZTR_MAGIC;
use crate::trace::ClipRange;
use crate::trace::Opaque;
use crate::trace::Trace;
use crate::trace::TraceBuilder;
use crate::trace::CHANNEL_ORDER;
use crate::Decoded;
use crate::Skipped;

use chunk::ChunkData;
use chunk::ChunkReader;
use chunk::RawChunk;

use std::io::Read;
use std::io::Write;

/// Filters applied to each chunk type by [encode_to_write].
///
/// Listed in stored order, so the last filter is applied first when encoding.
pub fn chunk_policy(
    chunk_type: &[u8; 4],
) -> Vec<Filter> {
    match *chunk_type {
        chunk::BASE | chunk::TEXT => vec![Filter::Zlib],
        chunk::CNF1 => vec![Filter::Zlib, Filter::Delta8{ order: 1 }],
        chunk::BPOS => vec![Filter::Zlib, Filter::Pack32To8, Filter::Delta32{ order: 1 }],
        chunk::SMP4 => vec![Filter::Zlib, Filter::Pack16To8, Filter::Delta16{ order: 2 }],
        chunk::CNF4 => vec![Filter::Zlib, Filter::RunLength],
        chunk::CLIP => vec![Filter::Raw],
        _ => vec![Filter::Zlib],
    }
}

/// Trace fields collected from the chunks read so far.
#[derive(Default)]
struct ChunkFields {
    bases: Option<Vec<u8>>,
    qualities: Option<Vec<u8>>,
    peaks: Option<Vec<u32>>,
    samples: Option<[Vec<u16>; 4]>,
    confidences: Option<[Vec<u8>; 4]>,
    clip: Option<ClipRange>,
    comments: Vec<(String, String)>,
    opaque: Vec<Opaque>,
}

impl ChunkFields {
    fn insert(&mut self, data: ChunkData) {
        match data {
            ChunkData::Bases(x) => self.bases = Some(x),
            ChunkData::Qualities(x) => self.qualities = Some(x),
            ChunkData::Peaks(x) => self.peaks = Some(x),
            ChunkData::Samples(x) => self.samples = Some(x),
            ChunkData::Confidences(x) => self.confidences = Some(x),
            ChunkData::Clip(x) => self.clip = Some(x),
            ChunkData::Text(mut x) => self.comments.append(&mut x),
            ChunkData::Unknown{ chunk_type, payload } => self.opaque.push(Opaque::ZtrChunk{ chunk_type, payload }),
        }
    }

    /// Drops fields that disagree with the field they describe.
    fn into_builder(
        self,
        skipped: &mut Vec<Skipped>,
    ) -> TraceBuilder {
        let mut builder = TraceBuilder::new();
        let mut drop_field = |chunk_type: &str, reason: String| {
            log::warn!("Dropping {} chunk: {}", chunk_type, reason);
            skipped.push(Skipped{ context: format!("{} chunk", chunk_type), error: TraceError::malformed(chunk_type, reason) });
        };

        let bases = self.bases.unwrap_or_default();
        let n_bases = bases.len();
        builder.bases(bases);

        match self.qualities {
            Some(x) if x.len() != n_bases => drop_field("CNF1", format!("{} confidences for {} base calls", x.len(), n_bases)),
            Some(x) => { builder.qualities(x); },
            None => (),
        }

        match self.peaks {
            Some(x) if x.len() != n_bases => drop_field("BPOS", format!("{} peak positions for {} base calls", x.len(), n_bases)),
            Some(x) => { builder.peaks(x); },
            None => (),
        }

        let n_samples = self.samples.as_ref().map(|x| x[0].len()).unwrap_or(0);
        if let Some(samples) = self.samples {
            for (base, channel) in CHANNEL_ORDER.into_iter().zip(samples) {
                builder.channel_positions(base, channel);
            }
        }

        match self.confidences {
            Some(x) if x[0].len() != n_samples => drop_field("CNF4", format!("{} confidences for {} samples", x[0].len(), n_samples)),
            Some(x) => {
                for (base, channel) in CHANNEL_ORDER.into_iter().zip(x) {
                    builder.channel_confidences(base, channel);
                }
            },
            None => (),
        }

        if let Some(range) = self.clip {
            match builder.check_clip(&range) {
                Ok(()) => { builder.clip(Some(range)); },
                Err(e) => drop_field("CLIP", e.to_string()),
            }
        }

        self.comments.into_iter().for_each(|(key, value)| { builder.comment(key, value); });
        self.opaque.into_iter().for_each(|record| { builder.opaque(record); });

        builder
    }
}

fn read_magic<R: Read>(
    conn: &mut R,
) -> Result<()> {
    let mut magic: Vec<u8> = Vec::with_capacity(ZTR_MAGIC.len());
    conn.by_ref().take(ZTR_MAGIC.len() as u64).read_to_end(&mut magic)?;

    if magic == ZTR_MAGIC {
        Ok(())
    } else if ZTR_MAGIC.starts_with(&magic) {
        Err(TraceError::truncated("ZTR magic number", 0, ZTR_MAGIC.len() as u64, magic.len() as u64))
    } else {
        Err(TraceError::FormatMismatch{ format: "ZTR", expected: ZTR_MAGIC.to_vec(), found: magic })
    }
}

fn decode_chunk(
    raw: &RawChunk,
) -> Result<ChunkData> {
    let payload = decode_chain(&raw.payload)?;
    chunk::parse_payload(&raw.chunk_type, payload)
}

/// Decodes a ZTR container from `conn`.
///
/// ## Usage
///
/// ```rust
/// use tracecodec::trace::Trace;
/// use tracecodec::ztr::{decode_from_read, encode};
/// use std::io::Cursor;
///
/// let mut builder = Trace::builder();
/// builder.bases(b"ACGT".to_vec()).qualities(vec![20, 30, 40, 50]);
/// let trace = builder.build().unwrap();
///
/// let bytes = encode(&trace).unwrap();
/// let got = decode_from_read(&mut Cursor::new(bytes)).unwrap();
///
/// assert_eq!(got.trace, trace);
/// assert!(got.skipped.is_empty());
/// ```
pub fn decode_from_read<R: Read>(
    conn: &mut R,
) -> Result<Decoded> {
    read_magic(conn)?;

    let mut fields = ChunkFields::default();
    let mut skipped: Vec<Skipped> = Vec::new();

    for raw in ChunkReader::new(conn, ZTR_MAGIC.len() as u64) {
        let raw = raw?;
        match decode_chunk(&raw) {
            Ok(data) => {
                log::debug!("Decoded {} chunk at offset {}", raw.type_name(), raw.offset);
                fields.insert(data);
            },
            Err(e) if e.is_recoverable() => {
                log::warn!("Skipping {} chunk at offset {}: {}", raw.type_name(), raw.offset, e);
                skipped.push(Skipped{ context: format!("{} chunk at offset {}", raw.type_name(), raw.offset), error: e });
            },
            Err(e) => return Err(e),
        }
    }

    let trace = fields.into_builder(&mut skipped).build()?;
    Ok(Decoded{ trace, skipped })
}

/// Encodes `trace` as a ZTR container with filters chosen by `policy`.
pub fn encode_with_policy<F: Fn(&[u8; 4]) -> Vec<Filter>>(
    trace: &Trace,
    policy: F,
) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = ZTR_MAGIC.to_vec();
    let mut put = |chunk_type: &[u8; 4], raw: &[u8]| -> Result<()> {
        let payload = encode_chain(&policy(chunk_type), raw)?;
        chunk::write_chunk(chunk_type, &payload, &mut out)
    };

    put(&chunk::BASE, trace.bases())?;
    put(&chunk::CNF1, trace.qualities())?;
    if !trace.peaks().is_empty() {
        put(&chunk::BPOS, &chunk::peaks_payload(trace.peaks()))?;
    }
    if trace.sample_count() > 0 {
        let positions: Vec<Vec<u16>> = trace.channels().iter().map(|channel| channel.positions().to_vec()).collect();
        put(&chunk::SMP4, &chunk::samples_payload(&positions))?;
        let confidences: Vec<u8> = trace.channels().iter().flat_map(|channel| channel.confidences().to_vec()).collect();
        put(&chunk::CNF4, &confidences)?;
    }
    if let Some(range) = trace.clip() {
        put(&chunk::CLIP, &chunk::clip_payload(&range))?;
    }
    if !trace.comments().is_empty() {
        put(&chunk::TEXT, &chunk::text_payload(trace.comments().iter())?)?;
    }
    for record in trace.opaque() {
        match record {
            Opaque::ZtrChunk{ chunk_type, payload } => put(chunk_type, payload)?,
            _ => log::debug!("Not writing {:?} to ZTR", record),
        }
    }

    Ok(out)
}

/// Encodes `trace` as a ZTR container using [chunk_policy].
pub fn encode(
    trace: &Trace,
) -> Result<Vec<u8>> {
    encode_with_policy(trace, chunk_policy)
}

pub fn encode_to_write<W: Write>(
    trace: &Trace,
    conn: &mut W,
) -> Result<()> {
    let bytes = encode(trace)?;
    conn.write_all(&bytes)?;
    Ok(())
}

// Tests
#[cfg(test)]
mod tests {

    use crate::trace::ClipRange;
    use crate::trace::Trace;
    use crate::trace::CHANNEL_ORDER;

    fn example_trace() -> Trace {
        let mut builder = Trace::builder();
        builder.bases(b"ACGTNACG".to_vec())
            .qualities(vec![40, 40, 35, 20, 2, 30, 31, 12])
            .peaks(vec![4, 10, 16, 22, 28, 34, 40, 46])
            .clip(Some(ClipRange{ start: 1, end: 6 }))
            .comment("NAME", "sample_1")
            .comment("MACH", "3730xl");
        for (idx, base) in CHANNEL_ORDER.into_iter().enumerate() {
            let samples: Vec<u16> = (0..50_u16).map(|x| (x * (idx as u16 + 3) * 97) % 2048).collect();
            let confidences: Vec<u8> = (0..50_u8).map(|x| if x % 10 < 5 { 0 } else { idx as u8 + 1 }).collect();
            builder.channel_positions(base, samples).channel_confidences(base, confidences);
        }
        builder.build().unwrap()
    }

    #[test]
    fn encode_and_decode() {
        use super::{decode_from_read, encode};

        use std::io::Cursor;

        let trace = example_trace();
        let bytes = encode(&trace).unwrap();
        let got = decode_from_read(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(got.trace, trace);
        assert!(got.skipped.is_empty());
    }

    #[test]
    fn encode_layout() {
        use super::encode;
        use crate::format::ZTR_MAGIC;

        let mut builder = Trace::builder();
        builder.bases(b"AC".to_vec()).qualities(vec![7, 9]).clip(Some(ClipRange{ start: 0, end: 1 }));
        let trace = builder.build().unwrap();

        let got = encode(&trace).unwrap();

        assert_eq!(&got[0..8], &ZTR_MAGIC);
        assert_eq!(&got[8..12], b"BASE");
        // CLIP is stored raw: empty chain then start and end
        let clip_at = got.windows(4).position(|x| x == b"CLIP").unwrap();
        assert_eq!(&got[(clip_at + 4)..], &[0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn damaged_chunk_is_skipped() {
        use super::chunk::write_chunk;
        use super::decode_from_read;
        use crate::compression::encode_chain;
        use crate::compression::Filter;
        use crate::error::TraceError;
        use crate::format::ZTR_MAGIC;

        use std::io::Cursor;

        let mut bytes: Vec<u8> = ZTR_MAGIC.to_vec();
        write_chunk(b"BASE", &encode_chain(&[Filter::Zlib], b"ACGT").unwrap(), &mut bytes).unwrap();
        // filter id 99 does not exist
        write_chunk(b"SMP4", &[99, 0, 0, 1, 0, 2, 0, 3, 0, 4], &mut bytes).unwrap();
        write_chunk(b"TEXT", &encode_chain(&[Filter::RunLength], b"NAME\x00x\x00").unwrap(), &mut bytes).unwrap();

        let got = decode_from_read(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(got.trace.bases(), b"ACGT");
        assert_eq!(got.trace.comments().get("NAME").unwrap(), "x");
        assert_eq!(got.trace.sample_count(), 0);
        assert_eq!(got.skipped.len(), 1);
        assert!(got.skipped[0].context.starts_with("SMP4"));
        assert!(matches!(got.skipped[0].error, TraceError::UnsupportedEncoding(_)));
    }

    #[test]
    fn corrupt_filter_data_is_skipped() {
        use super::chunk::write_chunk;
        use super::decode_from_read;
        use crate::error::TraceError;
        use crate::format::ZTR_MAGIC;

        use std::io::Cursor;

        let mut bytes: Vec<u8> = ZTR_MAGIC.to_vec();
        write_chunk(b"BASE", b"\x00ACGT", &mut bytes).unwrap();
        // run-length data with an odd length
        write_chunk(b"CNF1", &[1, 0, 30, 4, 9], &mut bytes).unwrap();

        let got = decode_from_read(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(got.trace.bases(), b"ACGT");
        assert_eq!(got.trace.qualities(), &[0, 0, 0, 0]);
        assert!(matches!(got.skipped[0].error, TraceError::CorruptFilterData{ .. }));
    }

    #[test]
    fn truncated_chunk_is_fatal() {
        use super::decode_from_read;
        use super::encode;
        use crate::error::TraceError;

        use std::io::Cursor;

        let mut bytes = encode(&example_trace()).unwrap();
        bytes.truncate(bytes.len() - 3);

        let got = decode_from_read(&mut Cursor::new(bytes));

        assert!(matches!(got, Err(TraceError::TruncatedStream{ .. })));
    }

    #[test]
    fn wrong_magic() {
        use super::decode_from_read;
        use crate::error::TraceError;

        use std::io::Cursor;

        let got = decode_from_read(&mut Cursor::new(b".scf\x00\x00\x00\x00".to_vec()));
        assert!(matches!(got, Err(TraceError::FormatMismatch{ .. })));

        let got = decode_from_read(&mut Cursor::new(vec![0xAE, b'Z']));
        assert!(matches!(got, Err(TraceError::TruncatedStream{ .. })));
    }

    #[test]
    fn quality_count_mismatch_is_dropped() {
        use super::chunk::write_chunk;
        use super::decode_from_read;
        use crate::format::ZTR_MAGIC;

        use std::io::Cursor;

        let mut bytes: Vec<u8> = ZTR_MAGIC.to_vec();
        write_chunk(b"BASE", b"\x00ACGT", &mut bytes).unwrap();
        write_chunk(b"CNF1", b"\x00\x01\x02", &mut bytes).unwrap();

        let got = decode_from_read(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(got.trace.qualities(), &[0, 0, 0, 0]);
        assert_eq!(got.skipped.len(), 1);
        assert_eq!(got.skipped[0].context, "CNF1 chunk");
    }

    #[test]
    fn unknown_chunk_is_retained() {
        use super::chunk::write_chunk;
        use super::{decode_from_read, encode};
        use crate::format::ZTR_MAGIC;
        use crate::trace::Opaque;

        use std::io::Cursor;

        let mut bytes: Vec<u8> = ZTR_MAGIC.to_vec();
        write_chunk(b"BASE", b"\x00AC", &mut bytes).unwrap();
        write_chunk(b"REGN", b"\x00\x01\x02\x03", &mut bytes).unwrap();

        let got = decode_from_read(&mut Cursor::new(bytes)).unwrap();
        let expected = vec![Opaque::ZtrChunk{ chunk_type: *b"REGN", payload: vec![1, 2, 3] }];
        assert_eq!(got.trace.opaque(), expected.as_slice());

        let again = decode_from_read(&mut Cursor::new(encode(&got.trace).unwrap())).unwrap();
        assert_eq!(again.trace, got.trace);
    }

    #[test]
    fn empty_trace() {
        use super::{decode_from_read, encode};

        use std::io::Cursor;

        let trace = Trace::builder().build().unwrap();
        let got = decode_from_read(&mut Cursor::new(encode(&trace).unwrap())).unwrap();

        assert_eq!(got.trace, trace);
    }
}
