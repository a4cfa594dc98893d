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
//! AB1 (ABIF) codec.
//!
//! The file is random access: the directory and most values live at
//! absolute offsets. Decoding therefore works on the whole file in memory.
//!
//! Tags mapped onto the trace:
//!
//!   - `PBAS2` base calls.
//!   - `PCON2` base qualities.
//!   - `PLOC2` peak positions.
//!   - `FWO_1` base order of the `DATA9` to `DATA12` channels.
//!   - `DATA9` to `DATA12` analysed channel samples.
//!   - `CONF1` to `CONF4` per-sample confidences of A, C, G and T.
//!   - `CMNTn` holding `key=value` becomes that comment.
//!   - any other string tag becomes a comment keyed by its tag name, e.g. `SMPL1`.
//!
//! All other tags are kept as [Opaque::Ab1Tag]. A tag whose value cannot be
//! resolved or does not fit its meaning is skipped and reported in
//! [Decoded::skipped]; the rest of the file is still decoded.

pub mod directory;
pub mod value;

use crate::error::Result;
use crate::error::TraceError;
use crate::trace::channel_index;
use crate::trace::is_nucleotide;
use crate::trace::Opaque;
use crate::trace::OpaqueTag;
use crate::trace::Trace;
use crate::trace::TraceBuilder;
use crate::trace::CHANNEL_ORDER;
use crate::Decoded;
use crate::Skipped;

use directory::DirEntry;
use value::Value;

use std::io::Read;
use std::io::Write;

pub const PBAS: [u8; 4] = *b"PBAS";
pub const PCON: [u8; 4] = *b"PCON";
pub const PLOC: [u8; 4] = *b"PLOC";
pub const FWO: [u8; 4] = *b"FWO_";
pub const DATA: [u8; 4] = *b"DATA";
pub const CONF: [u8; 4] = *b"CONF";
pub const CMNT: [u8; 4] = *b"CMNT";

/// Numbers of the `DATA` tags holding the analysed channels.
const ANALYSED_DATA: std::ops::RangeInclusive<i32> = 9..=12;
/// Numbers of the `CONF` tags, in [CHANNEL_ORDER].
const CONF_NUMBERS: std::ops::RangeInclusive<i32> = 1..=4;
/// Channel order assumed when `FWO_1` is absent.
const DEFAULT_BASE_ORDER: [u8; 4] = *b"GATC";

/// Tags that [encode] writes from trace fields.
fn is_reserved(name: &[u8; 4]) -> bool {
    [PBAS, PCON, PLOC, FWO, DATA, CONF, CMNT].contains(name)
}

/// Splits a comment key like `SMPL1` into a tag name and number.
fn parse_tag_key(key: &str) -> Option<([u8; 4], i32)> {
    let bytes = key.as_bytes();
    if bytes.len() < 5 || !bytes[0..4].iter().all(|x| x.is_ascii_graphic()) {
        return None;
    }
    let number: i32 = key.get(4..)?.parse().ok()?;
    if number < 1 || key[4..].starts_with(['+', '0']) {
        return None;
    }
    Some(([bytes[0], bytes[1], bytes[2], bytes[3]], number))
}

fn skip(skipped: &mut Vec<Skipped>, context: String, error: TraceError) {
    log::warn!("Skipping {}: {}", context, error);
    skipped.push(Skipped{ context, error });
}

fn positions(context: &str, value: Value) -> Result<Vec<u16>> {
    match value {
        Value::Shorts(x) => Ok(x.into_iter().map(|v| v.max(0) as u16).collect()),
        Value::Words(x) => Ok(x),
        other => Err(TraceError::malformed(context, format!("expected 16-bit integers, found {:?}", element_name(&other)))),
    }
}

fn bytes(context: &str, value: Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(x) | Value::Chars(x) => Ok(x),
        other => Err(TraceError::malformed(context, format!("expected bytes, found {:?}", element_name(&other)))),
    }
}

fn element_name(value: &Value) -> &'static str {
    match value {
        Value::Bytes(_) => "byte",
        Value::Chars(_) => "char",
        Value::Words(_) => "word",
        Value::Shorts(_) => "short",
        Value::Longs(_) => "long",
        Value::Floats(_) => "float",
        Value::Doubles(_) => "double",
        Value::Date{ .. } => "date",
        Value::Time{ .. } => "time",
        Value::Bools(_) => "bool",
        Value::PString(_) => "pString",
        Value::CString(_) => "cString",
        Value::Raw{ .. } => "user",
    }
}

fn base_order(context: &str, order: &[u8]) -> Result<[u8; 4]> {
    let mut seen = [false; 4];
    for base in order.iter() {
        if let Some(idx) = channel_index(*base) {
            seen[idx] = true;
        }
    }
    if order.len() != 4 || !seen.iter().all(|x| *x) {
        return Err(TraceError::malformed(context, format!("{:?} is not an order of ACGT", String::from_utf8_lossy(order))));
    }
    Ok([order[0], order[1], order[2], order[3]])
}

/// Tag values collected from the directory.
#[derive(Default)]
struct TagFields {
    bases: Option<Vec<u8>>,
    qualities: Option<Vec<u8>>,
    peaks: Option<Vec<u32>>,
    base_order: Option<[u8; 4]>,
    data: [Option<Vec<u16>>; 4],
    confidences: [Option<Vec<u8>>; 4],
    comments: Vec<(String, String)>,
    opaque: Vec<Opaque>,
}

impl TagFields {
    fn insert(
        &mut self,
        entry: &DirEntry,
        raw: &[u8],
    ) -> Result<()> {
        let context = entry.tag_name();
        let value = Value::decode(&context, entry.element_type, entry.element_size, raw)?;

        match (entry.name, entry.number) {
            (PBAS, 2) => {
                let bases = bytes(&context, value)?;
                if let Some(pos) = bases.iter().position(|x| !is_nucleotide(*x)) {
                    return Err(TraceError::malformed(context, format!("base call {:?} at index {}", bases[pos] as char, pos)));
                }
                self.bases = Some(bases);
            },
            (PCON, 2) => self.qualities = Some(bytes(&context, value)?),
            (PLOC, 2) => self.peaks = Some(positions(&context, value)?.into_iter().map(|x| x as u32).collect()),
            (FWO, 1) => self.base_order = Some(base_order(&context, &bytes(&context, value)?)?),
            (DATA, n) if ANALYSED_DATA.contains(&n) => {
                self.data[(n - ANALYSED_DATA.start()) as usize] = Some(positions(&context, value)?);
            },
            (CONF, n) if CONF_NUMBERS.contains(&n) => {
                self.confidences[(n - CONF_NUMBERS.start()) as usize] = Some(bytes(&context, value)?);
            },
            (name, _) => match value.as_text() {
                Some(text) if name == CMNT && text.contains('=') => {
                    if let Some((key, val)) = text.split_once('=') {
                        self.comments.push((key.to_string(), val.to_string()));
                    }
                },
                Some(text) => self.comments.push((context, text.to_string())),
                None => self.opaque.push(Opaque::Ab1Tag(OpaqueTag{
                    name: entry.name,
                    number: entry.number,
                    element_type: entry.element_type,
                    element_size: entry.element_size,
                    element_count: entry.element_count,
                    data: raw.to_vec(),
                })),
            },
        }

        Ok(())
    }

    /// Moves the collected tags into a builder, dropping fields that
    /// disagree with the base calls or with each other.
    fn into_builder(
        self,
        skipped: &mut Vec<Skipped>,
    ) -> TraceBuilder {
        let mut builder = Trace::builder();

        let bases = self.bases.unwrap_or_default();
        let n_bases = bases.len();
        builder.bases(bases);

        if let Some(qualities) = self.qualities {
            if qualities.len() == n_bases {
                builder.qualities(qualities);
            } else {
                skip(skipped, "PCON2 tag".to_string(), TraceError::malformed("PCON2", format!("{} qualities for {} bases", qualities.len(), n_bases)));
            }
        }
        if let Some(peaks) = self.peaks {
            if peaks.len() == n_bases {
                builder.peaks(peaks);
            } else {
                skip(skipped, "PLOC2 tag".to_string(), TraceError::malformed("PLOC2", format!("{} peaks for {} bases", peaks.len(), n_bases)));
            }
        }

        let order = self.base_order.unwrap_or(DEFAULT_BASE_ORDER);
        let mut channels: [Vec<u16>; 4] = Default::default();
        let mut present = 0;
        for (data, base) in self.data.into_iter().zip(order) {
            if let (Some(samples), Some(idx)) = (data, channel_index(base)) {
                channels[idx] = samples;
                present += 1;
            }
        }
        let n_samples = channels.iter().map(|x| x.len()).max().unwrap_or(0);
        if present > 0 && (present < 4 || channels.iter().any(|x| x.len() != n_samples)) {
            let lengths: Vec<usize> = channels.iter().map(|x| x.len()).collect();
            skip(skipped, "DATA9-12 tags".to_string(), TraceError::malformed("DATA", format!("{} of 4 channels with sample counts {:?}", present, lengths)));
        } else {
            for (base, samples) in CHANNEL_ORDER.into_iter().zip(channels) {
                builder.channel_positions(base, samples);
            }
            for (idx, confidences) in self.confidences.into_iter().enumerate() {
                match confidences {
                    Some(x) if x.len() == n_samples => { builder.channel_confidences(CHANNEL_ORDER[idx], x); },
                    Some(x) => {
                        let context = format!("CONF{}", idx + 1);
                        let error = TraceError::malformed(&context, format!("{} confidences for {} samples", x.len(), n_samples));
                        skip(skipped, format!("{} tag", context), error);
                    },
                    None => (),
                }
            }
        }

        for (key, value) in self.comments {
            builder.comment(key, value);
        }
        for record in self.opaque {
            builder.opaque(record);
        }

        builder
    }
}

/// Decodes an AB1 file held in memory.
///
/// ## Usage
/// ```rust
/// use tracecodec::ab1::{decode, encode};
/// use tracecodec::trace::Trace;
///
/// let mut builder = Trace::builder();
/// builder.bases(b"GATTACA".to_vec())
///     .qualities(vec![20, 30, 40, 40, 30, 20, 10])
///     .comment("SMPL1", "sample_1");
/// let trace = builder.build().unwrap();
///
/// let got = decode(&encode(&trace).unwrap()).unwrap();
///
/// assert_eq!(got.trace, trace);
/// ```
pub fn decode(
    bytes: &[u8],
) -> Result<Decoded> {
    let header = directory::decode_header(bytes)?;
    let entries = directory::read_directory(&header, bytes)?;
    log::debug!("AB1 version {} with {} directory entries", header.version, entries.len());

    let mut fields = TagFields::default();
    let mut skipped: Vec<Skipped> = Vec::new();

    for entry in entries.iter() {
        let inserted = entry.value(bytes).and_then(|raw| fields.insert(entry, raw));
        match inserted {
            Ok(()) => log::trace!("Decoded {} tag", entry.tag_name()),
            Err(e) if e.is_recoverable() => skip(&mut skipped, format!("{} tag", entry.tag_name()), e),
            Err(e) => return Err(e),
        }
    }

    let trace = fields.into_builder(&mut skipped).build()?;
    Ok(Decoded{ trace, skipped })
}

/// Reads `conn` to the end and decodes it with [decode].
pub fn decode_from_read<R: Read>(
    conn: &mut R,
) -> Result<Decoded> {
    let mut bytes: Vec<u8> = Vec::new();
    conn.read_to_end(&mut bytes)?;
    decode(&bytes)
}

fn shorts(context: &str, values: impl Iterator<Item = u32>) -> Result<Value> {
    values.map(|x| {
        i16::try_from(x).map_err(|_| TraceError::UnsupportedEncoding(format!("{} value {} exceeds {}", context, x, i16::MAX)))
    }).collect::<Result<Vec<i16>>>().map(Value::Shorts)
}

/// Tags written by [encode], in directory order.
fn tags(
    trace: &Trace,
) -> Result<Vec<([u8; 4], i32, Value)>> {
    let mut tags: Vec<([u8; 4], i32, Value)> = Vec::new();

    if trace.sample_count() > 0 {
        for (n, channel) in ANALYSED_DATA.zip(trace.channels().iter()) {
            let context = format!("DATA{}", n);
            tags.push((DATA, n, shorts(&context, channel.positions().iter().map(|x| *x as u32))?));
        }
        tags.push((FWO, 1, Value::Chars(CHANNEL_ORDER.to_vec())));
        if trace.channels().iter().any(|channel| channel.confidences().iter().any(|x| *x != 0)) {
            for (n, channel) in CONF_NUMBERS.zip(trace.channels().iter()) {
                tags.push((CONF, n, Value::Bytes(channel.confidences().to_vec())));
            }
        }
    }

    tags.push((PBAS, 2, Value::Chars(trace.bases().to_vec())));
    tags.push((PCON, 2, Value::Chars(trace.qualities().to_vec())));
    if !trace.peaks().is_empty() {
        tags.push((PLOC, 2, shorts("PLOC2", trace.peaks().iter().copied())?));
    }

    let mut n_cmnt = 0;
    for (key, text) in trace.comments().iter() {
        match parse_tag_key(key) {
            Some((name, number)) if !is_reserved(&name) => tags.push((name, number, Value::text(text))),
            _ => {
                if key.contains('=') {
                    return Err(TraceError::UnsupportedEncoding(format!("comment key '{}' cannot be stored in a CMNT tag", key)));
                }
                n_cmnt += 1;
                tags.push((CMNT, n_cmnt, Value::text(&format!("{}={}", key, text))));
            },
        }
    }

    if trace.clip().is_some() {
        log::warn!("Dropping clip range, AB1 does not store one");
    }

    Ok(tags)
}

/// Encodes `trace` as an AB1 file.
///
/// Sample values and peak positions must fit in a signed 16-bit integer.
/// Text must be Latin-1. A comment whose key is not a tag name is stored
/// as a `CMNTn` tag holding `key=value`, so such a key may not contain `=`.
/// The clip range and records of other formats are not written.
pub fn encode(
    trace: &Trace,
) -> Result<Vec<u8>> {
    let mut values: Vec<u8> = Vec::new();
    let mut entries: Vec<DirEntry> = Vec::new();

    let mut put = |name: [u8; 4], number: i32, element_type: i16, element_size: i16, element_count: i32, data: &[u8]| {
        let offset = directory::DATA_START + values.len();
        let entry = DirEntry::new(name, number, element_type, element_size, element_count, data, offset as u32);
        if !entry.is_inline() {
            values.extend_from_slice(data);
        }
        entries.push(entry);
    };

    for (name, number, value) in tags(trace)? {
        let (element_type, element_size, element_count, data) = value.encode()?;
        put(name, number, element_type, element_size, element_count, &data);
    }
    for record in trace.opaque() {
        match record {
            Opaque::Ab1Tag(tag) => put(tag.name, tag.number, tag.element_type, tag.element_size, tag.element_count, &tag.data),
            _ => log::debug!("Not writing {:?} to AB1", record),
        }
    }

    let directory_offset = directory::DATA_START + values.len();
    if directory_offset + entries.len() * directory::ENTRY_LEN > i32::MAX as usize {
        return Err(TraceError::UnsupportedEncoding(format!("{} bytes of values does not fit in an AB1 file", values.len())));
    }

    let mut out = directory::encode_header(entries.len(), directory_offset as u32)?;
    out.append(&mut values);
    for entry in entries.iter() {
        directory::encode_entry(entry, &mut out)?;
    }

    Ok(out)
}

pub fn encode_to_write<W: Write>(
    trace: &Trace,
    conn: &mut W,
) -> Result<()> {
    let bytes = encode(trace)?;
    conn.write_all(&bytes)?;
    Ok(())
}
