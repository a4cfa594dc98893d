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
//! SCF codec.
//!
//! ```text
//! header(128) | samples | bases | comments | private
//! ```
//!
//! The header gives the offset and size of every section. The whole file is
//! read into memory before parsing so that each section can be bounds-checked
//! against the input length; a section that runs past the end fails the
//! parse with [TraceError::OutOfBoundsReference]. SCF has no recovery unit
//! smaller than the file, so [Decoded::skipped] is always empty.
//!
//! Per-sample channel confidences are kept in the private section:
//!
//! ```text
//! "CONF" | A confidences | C confidences | G confidences | T confidences
//! ```
//!
//! A private section of any other shape is ignored.

pub mod header;
pub mod sections;

use crate::error::Result;
use crate::error::TraceError;
use crate::trace::Trace;
use crate::trace::CHANNEL_ORDER;
use crate::Decoded;

use header::ScfHeader;
use header::HEADER_LEN;
use sections::BaseSection;

pub use sections::SampleWidth;
pub use sections::ScfVersion;

use std::io::Read;
use std::io::Write;

/// Tag at the start of a private section holding channel confidences.
pub const CONF_TAG: [u8; 4] = *b"CONF";

/// Options for [encode].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScfOptions {
    pub version: ScfVersion,
    /// Width of stored samples, or `None` to use the narrowest that fits.
    pub sample_width: Option<SampleWidth>,
}

/// Returns `offset..offset+length` if it lies within `size` bytes.
fn section(
    context: &str,
    offset: u32,
    length: u64,
    size: usize,
) -> Result<std::ops::Range<usize>> {
    let end = offset as u64 + length;
    if end > size as u64 {
        return Err(TraceError::OutOfBoundsReference{
            context: format!("SCF {} section", context), offset: offset as u64, length, size: size as u64,
        });
    }
    Ok((offset as usize)..(end as usize))
}

fn decode_confidences(
    private: &[u8],
    n_samples: usize,
) -> Option<[Vec<u8>; 4]> {
    if private.len() != CONF_TAG.len() + 4 * n_samples || private[0..CONF_TAG.len()] != CONF_TAG {
        log::debug!("Ignoring {} byte private section", private.len());
        return None;
    }
    let mut confidences: [Vec<u8>; 4] = Default::default();
    private[CONF_TAG.len()..].chunks_exact(n_samples.max(1)).zip(confidences.iter_mut()).for_each(|(bytes, channel)| {
        *channel = bytes.to_vec();
    });
    Some(confidences)
}

/// Decodes an SCF file held in memory.
pub fn decode(
    bytes: &[u8],
) -> Result<Decoded> {
    let header = header::decode_header(bytes)?;
    let version = ScfVersion::from_bytes(&header.version)?;
    let width = SampleWidth::from_u32(header.sample_size)?;
    let n_samples = header.samples as usize;
    let n_bases = header.bases as usize;
    log::debug!("SCF version {:?}: {} samples of {} bytes, {} bases", version, n_samples, width.bytes(), n_bases);

    let samples_range = section("samples", header.samples_offset, sections::samples_len(n_samples, width) as u64, bytes.len())?;
    let bases_range = section("bases", header.bases_offset, (sections::BASE_RECORD_LEN * n_bases) as u64, bytes.len())?;
    let comments_range = section("comments", header.comments_offset, header.comments_size as u64, bytes.len())?;

    let channels = sections::decode_samples(&bytes[samples_range], n_samples, width, version);
    let BaseSection { bases, qualities, peaks } = sections::decode_bases(&bytes[bases_range], n_bases, version);
    let comments = sections::decode_comments(&bytes[comments_range])?;

    let mut builder = Trace::builder();
    builder.bases(bases).qualities(qualities);
    if peaks.iter().any(|x| *x != 0) {
        builder.peaks(peaks);
    }
    for (base, positions) in CHANNEL_ORDER.into_iter().zip(channels) {
        builder.channel_positions(base, positions);
    }
    for (key, value) in comments {
        builder.comment(key, value);
    }

    if header.private_size > 0 {
        let private_range = section("private", header.private_offset, header.private_size as u64, bytes.len())?;
        if let Some(confidences) = decode_confidences(&bytes[private_range], n_samples) {
            for (base, channel) in CHANNEL_ORDER.into_iter().zip(confidences) {
                builder.channel_confidences(base, channel);
            }
        }
    }

    let trace = builder.build()?;
    Ok(Decoded{ trace, skipped: Vec::new() })
}

/// Reads `conn` to the end and decodes it with [decode].
pub fn decode_from_read<R: Read>(
    conn: &mut R,
) -> Result<Decoded> {
    let mut bytes: Vec<u8> = Vec::new();
    conn.read_to_end(&mut bytes)?;
    decode(&bytes)
}

/// Encodes `trace` as an SCF file.
///
/// Fails with [TraceError::UnsupportedEncoding] if a sample does not fit
/// the requested width, before anything is written. The clip range has no
/// SCF representation and is dropped.
///
/// Missing peak positions are written as zeros, and [decode] reads a base
/// section whose peaks are all zero as having none. Peaks that are all zero,
/// e.g. `[0]`, therefore decode as empty.
///
/// Comments are written as `key=value` lines. Keys may not be empty or
/// contain `=`, and no comment may contain `\n`, `\r` or NUL.
pub fn encode(
    trace: &Trace,
    opts: &ScfOptions,
) -> Result<Vec<u8>> {
    let width = opts.sample_width.unwrap_or_else(|| SampleWidth::for_max(trace.max_sample()));
    let n_samples = trace.sample_count();
    let n_bases = trace.bases().len();

    let positions: [&[u16]; 4] = [
        trace.channels()[0].positions(), trace.channels()[1].positions(),
        trace.channels()[2].positions(), trace.channels()[3].positions(),
    ];
    let mut samples: Vec<u8> = Vec::with_capacity(sections::samples_len(n_samples, width));
    sections::encode_samples(&positions, width, opts.version, &mut samples)?;

    let base_section = BaseSection{
        bases: trace.bases().to_vec(),
        qualities: trace.qualities().to_vec(),
        peaks: if trace.peaks().is_empty() { vec![0; n_bases] } else { trace.peaks().to_vec() },
    };
    let mut bases: Vec<u8> = Vec::with_capacity(sections::BASE_RECORD_LEN * n_bases);
    sections::encode_bases(&base_section, opts.version, &mut bases);

    let mut comments: Vec<u8> = Vec::new();
    sections::encode_comments(trace.comments().iter(), &mut comments)?;

    let mut private: Vec<u8> = Vec::new();
    if trace.channels().iter().any(|channel| channel.confidences().iter().any(|x| *x != 0)) {
        private.extend_from_slice(&CONF_TAG);
        trace.channels().iter().for_each(|channel| private.extend_from_slice(channel.confidences()));
    }

    if trace.clip().is_some() {
        log::warn!("Dropping clip range, SCF does not store one");
    }

    let samples_offset = HEADER_LEN;
    let bases_offset = samples_offset + samples.len();
    let comments_offset = bases_offset + bases.len();
    let private_offset = comments_offset + comments.len();
    let total = private_offset + private.len();
    if total > u32::MAX as usize {
        return Err(TraceError::UnsupportedEncoding(format!("{} bytes does not fit in an SCF file", total)));
    }

    let header = ScfHeader{
        samples: n_samples as u32,
        samples_offset: samples_offset as u32,
        bases: n_bases as u32,
        bases_offset: bases_offset as u32,
        comments_size: comments.len() as u32,
        comments_offset: comments_offset as u32,
        version: opts.version.to_bytes(),
        sample_size: width.bytes() as u32,
        private_size: private.len() as u32,
        private_offset: if private.is_empty() { 0 } else { private_offset as u32 },
        ..Default::default()
    };

    let mut out: Vec<u8> = header::encode_header(&header)?;
    out.reserve(total - HEADER_LEN);
    out.append(&mut samples);
    out.append(&mut bases);
    out.append(&mut comments);
    out.append(&mut private);

    Ok(out)
}

pub fn encode_to_write<W: Write>(
    trace: &Trace,
    opts: &ScfOptions,
    conn: &mut W,
) -> Result<()> {
    let bytes = encode(trace, opts)?;
    conn.write_all(&bytes)?;
    Ok(())
}

// Tests
#[cfg(test)]
mod tests {

    use crate::trace::ClipRange;
    use crate::trace::Trace;

    fn example_trace(max_sample: u16) -> Trace {
        let mut builder = Trace::builder();
        builder.bases(b"ACGTN".to_vec())
            .qualities(vec![40, 35, 20, 10, 3])
            .peaks(vec![1, 3, 5, 7, 9])
            .channel_positions(b'A', vec![0, 5, 10, 20, 40, 20, 10, 5, 0, 0, 0])
            .channel_positions(b'C', vec![0, 0, 0, 9, 30, 60, 30, 9, 0, 0, 0])
            .channel_positions(b'G', vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, max_sample])
            .channel_positions(b'T', vec![0; 11])
            .comment("NAME", "sample_1")
            .comment("MACH", "ABI 3730");
        builder.build().unwrap()
    }

    #[test]
    fn round_trip_v3() {
        use super::{decode, encode, ScfOptions};

        let trace = example_trace(127);
        let bytes = encode(&trace, &ScfOptions::default()).unwrap();

        assert_eq!(&bytes[0..4], b".scf");
        assert_eq!(&bytes[36..40], b"3.00");
        // auto width picks one byte for 127
        assert_eq!(&bytes[40..44], &[0, 0, 0, 1]);

        let got = decode(&bytes).unwrap();
        assert_eq!(got.trace, trace);
        assert!(got.skipped.is_empty());
    }

    #[test]
    fn round_trip_v2() {
        use super::{decode, encode, ScfOptions, ScfVersion};

        let trace = example_trace(3000);
        let opts = ScfOptions{ version: ScfVersion::V2, sample_width: None };
        let bytes = encode(&trace, &opts).unwrap();

        assert_eq!(&bytes[36..40], b"2.00");
        assert_eq!(&bytes[40..44], &[0, 0, 0, 2]);

        let got = decode(&bytes).unwrap();
        assert_eq!(got.trace, trace);
    }

    #[test]
    fn all_zero_peaks_decode_as_empty() {
        use super::{decode, encode, ScfOptions};

        let mut builder = Trace::builder();
        builder.bases(b"A".to_vec()).qualities(vec![20]).peaks(vec![0]);
        let trace = builder.build().unwrap();

        let got = decode(&encode(&trace, &ScfOptions::default()).unwrap()).unwrap();

        assert!(got.trace.peaks().is_empty());
        assert_eq!(got.trace.qualities(), &[20]);
    }

    #[test]
    fn comment_with_carriage_return() {
        use super::{encode, ScfOptions};
        use crate::error::TraceError;

        let mut builder = example_trace(50).to_builder();
        builder.comment("NAME", "x\r");
        let trace = builder.build().unwrap();

        assert!(matches!(encode(&trace, &ScfOptions::default()), Err(TraceError::UnsupportedEncoding(_))));
    }

    #[test]
    fn auto_width_switches_at_128() {
        use super::{encode, ScfOptions};

        let bytes = encode(&example_trace(128), &ScfOptions::default()).unwrap();

        assert_eq!(&bytes[40..44], &[0, 0, 0, 2]);
    }

    #[test]
    fn forced_one_byte_width_rejects_128() {
        use super::{encode, SampleWidth, ScfOptions, ScfVersion};
        use crate::error::TraceError;

        let opts = ScfOptions{ version: ScfVersion::V3, sample_width: Some(SampleWidth::One) };

        assert!(encode(&example_trace(127), &opts).is_ok());
        assert!(matches!(encode(&example_trace(128), &opts), Err(TraceError::UnsupportedEncoding(_))));
    }

    #[test]
    fn forced_two_byte_width() {
        use super::{decode, encode, SampleWidth, ScfOptions, ScfVersion};

        let trace = example_trace(20);
        let opts = ScfOptions{ version: ScfVersion::V3, sample_width: Some(SampleWidth::Two) };
        let bytes = encode(&trace, &opts).unwrap();

        assert_eq!(&bytes[40..44], &[0, 0, 0, 2]);
        assert_eq!(decode(&bytes).unwrap().trace, trace);
    }

    #[test]
    fn confidences_in_private_section() {
        use super::{decode, encode, ScfOptions};

        let mut builder = example_trace(50).to_builder();
        builder.channel_confidences(b'C', vec![9; 11]);
        let trace = builder.build().unwrap();

        let bytes = encode(&trace, &ScfOptions::default()).unwrap();
        let private_size = u32::from_be_bytes([bytes[48], bytes[49], bytes[50], bytes[51]]);
        assert_eq!(private_size, 4 + 4 * 11);

        let got = decode(&bytes).unwrap();
        assert_eq!(got.trace.channels()[1].confidences(), &[9; 11]);
        assert_eq!(got.trace, trace);
    }

    #[test]
    fn clip_is_dropped() {
        use super::{decode, encode, ScfOptions};

        let mut builder = example_trace(10).to_builder();
        builder.clip(Some(ClipRange{ start: 1, end: 3 }));
        let trace = builder.build().unwrap();

        let got = decode(&encode(&trace, &ScfOptions::default()).unwrap()).unwrap();

        assert_eq!(got.trace.clip(), None);
        assert_eq!(got.trace.bases(), trace.bases());
    }

    #[test]
    fn missing_peaks_stay_missing() {
        use super::{decode, encode, ScfOptions};

        let mut builder = Trace::builder();
        builder.bases(b"AC".to_vec()).qualities(vec![1, 2]);
        let trace = builder.build().unwrap();

        let got = decode(&encode(&trace, &ScfOptions::default()).unwrap()).unwrap();

        assert!(got.trace.peaks().is_empty());
        assert_eq!(got.trace, trace);
    }

    #[test]
    fn section_out_of_bounds() {
        use super::{decode, encode, ScfOptions};
        use crate::error::TraceError;

        let mut bytes = encode(&example_trace(100), &ScfOptions::default()).unwrap();
        // bases offset past the end of the file
        bytes[24..28].copy_from_slice(&10_000_u32.to_be_bytes());

        let got = decode(&bytes);

        assert!(matches!(got, Err(TraceError::OutOfBoundsReference{ offset: 10_000, .. })));
    }

    #[test]
    fn truncated_samples() {
        use super::{decode, encode, ScfOptions};
        use crate::error::TraceError;

        let bytes = encode(&example_trace(100), &ScfOptions::default()).unwrap();

        let got = decode(&bytes[0..140]);

        assert!(matches!(got, Err(TraceError::OutOfBoundsReference{ .. })));
    }

    #[test]
    fn unsupported_sample_size() {
        use super::{decode, encode, ScfOptions};
        use crate::error::TraceError;

        let mut bytes = encode(&example_trace(100), &ScfOptions::default()).unwrap();
        bytes[40..44].copy_from_slice(&4_u32.to_be_bytes());

        assert!(matches!(decode(&bytes), Err(TraceError::UnsupportedEncoding(_))));
    }

    #[test]
    fn unsupported_version() {
        use super::{decode, encode, ScfOptions};
        use crate::error::TraceError;

        let mut bytes = encode(&example_trace(100), &ScfOptions::default()).unwrap();
        bytes[36..40].copy_from_slice(b"4.00");

        assert!(matches!(decode(&bytes), Err(TraceError::UnsupportedEncoding(_))));
    }

    #[test]
    fn decode_from_reader() {
        use super::{decode_from_read, encode, ScfOptions};

        use std::io::Cursor;

        let trace = example_trace(90);
        let bytes = encode(&trace, &ScfOptions::default()).unwrap();

        let got = decode_from_read(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(got.trace, trace);
    }

    #[test]
    fn wrong_magic() {
        use super::decode;
        use crate::error::TraceError;

        assert!(matches!(decode(&[0xAE, b'Z', b'T', b'R']), Err(TraceError::FormatMismatch{ .. })));
    }
}
