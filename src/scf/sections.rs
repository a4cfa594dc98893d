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
//! SCF sample, base and comment sections.
//!
//! Version 3 stores each channel's samples contiguously (A, C, G, T) as
//! second-order deltas, and the base records column by column. Version 2
//! interleaves the four channels sample by sample and stores one 12-byte
//! record per base:
//!
//! ```text
//! peak(4) | prob_A | prob_C | prob_G | prob_T | base | spare(3)
//! ```

use crate::compression::delta;
use crate::error::Result;
use crate::error::TraceError;
use crate::trace::channel_index;

/// Bytes per base record, in either layout.
pub const BASE_RECORD_LEN: usize = 12;

/// Delta order of version 3 samples.
const SAMPLE_DELTA_ORDER: u8 = 2;

/// Section layout selected by the header version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScfVersion {
    V2,
    #[default]
    V3,
}

impl ScfVersion {
    pub fn from_bytes(version: &[u8; 4]) -> Result<Self> {
        match version[0] {
            b'1' | b'2' => Ok(ScfVersion::V2),
            b'3' => Ok(ScfVersion::V3),
            _ => Err(TraceError::UnsupportedEncoding(format!("SCF version {:?}", String::from_utf8_lossy(version)))),
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        match &self {
            ScfVersion::V2 => *b"2.00",
            ScfVersion::V3 => *b"3.00",
        }
    }

    pub fn from_u8(val: u8) -> Result<Self> {
        match val {
            2 => Ok(ScfVersion::V2),
            3 => Ok(ScfVersion::V3),
            _ => Err(TraceError::UnsupportedEncoding(format!("SCF version {}", val))),
        }
    }
}

/// Bytes per stored sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    One,
    Two,
}

impl SampleWidth {
    pub fn from_u32(val: u32) -> Result<Self> {
        match val {
            1 => Ok(SampleWidth::One),
            2 => Ok(SampleWidth::Two),
            _ => Err(TraceError::UnsupportedEncoding(format!("SCF sample size {} (supported 1 or 2)", val))),
        }
    }

    pub fn bytes(&self) -> usize {
        match &self {
            SampleWidth::One => 1,
            SampleWidth::Two => 2,
        }
    }

    /// Largest sample value this width may encode.
    pub fn max(&self) -> u16 {
        match &self {
            SampleWidth::One => 127,
            SampleWidth::Two => u16::MAX,
        }
    }

    /// Narrowest width that holds `max_sample`.
    pub fn for_max(max_sample: u16) -> Self {
        if max_sample <= SampleWidth::One.max() { SampleWidth::One } else { SampleWidth::Two }
    }

    /// Errors if any sample exceeds [max](SampleWidth::max).
    pub fn check(&self, channels: &[&[u16]; 4]) -> Result<()> {
        for channel in channels.iter() {
            if let Some(pos) = channel.iter().position(|x| *x > self.max()) {
                return Err(TraceError::UnsupportedEncoding(format!(
                    "sample {} at index {} exceeds the {}-byte maximum {}", channel[pos], pos, self.bytes(), self.max()
                )));
            }
        }
        Ok(())
    }

    fn read(&self, bytes: &[u8]) -> u16 {
        match &self {
            SampleWidth::One => bytes[0] as u16,
            SampleWidth::Two => u16::from_be_bytes([bytes[0], bytes[1]]),
        }
    }

    fn write(&self, value: u16, out: &mut Vec<u8>) {
        match &self {
            SampleWidth::One => out.push(value as u8),
            SampleWidth::Two => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

/// Byte length of the sample section.
pub fn samples_len(n_samples: usize, width: SampleWidth) -> usize {
    n_samples * 4 * width.bytes()
}

pub fn decode_samples(
    bytes: &[u8],
    n_samples: usize,
    width: SampleWidth,
    version: ScfVersion,
) -> [Vec<u16>; 4] {
    let step = width.bytes();
    let mut channels: [Vec<u16>; 4] = Default::default();

    match version {
        ScfVersion::V3 => {
            let mask = delta::mask(step);
            for (idx, channel) in channels.iter_mut().enumerate() {
                let start = idx * n_samples * step;
                let mut words: Vec<u32> = bytes[start..(start + n_samples * step)]
                    .chunks_exact(step)
                    .map(|x| width.read(x) as u32)
                    .collect();
                delta::accumulate(&mut words, mask, SAMPLE_DELTA_ORDER);
                *channel = words.into_iter().map(|x| x as u16).collect();
            }
        },
        ScfVersion::V2 => {
            bytes[0..samples_len(n_samples, width)].chunks_exact(4 * step).for_each(|point| {
                for (idx, channel) in channels.iter_mut().enumerate() {
                    channel.push(width.read(&point[(idx * step)..((idx + 1) * step)]));
                }
            });
        },
    }

    channels
}

/// Encodes the four channels. Fails before writing if a sample is too wide.
pub fn encode_samples(
    channels: &[&[u16]; 4],
    width: SampleWidth,
    version: ScfVersion,
    out: &mut Vec<u8>,
) -> Result<()> {
    width.check(channels)?;
    let n_samples = channels[0].len();

    match version {
        ScfVersion::V3 => {
            let mask = delta::mask(width.bytes());
            channels.iter().for_each(|channel| {
                let mut words: Vec<u32> = channel.iter().map(|x| *x as u32).collect();
                delta::difference(&mut words, mask, SAMPLE_DELTA_ORDER);
                words.iter().for_each(|x| width.write(*x as u16, out));
            });
        },
        ScfVersion::V2 => {
            for idx in 0..n_samples {
                channels.iter().for_each(|channel| width.write(channel[idx], out));
            }
        },
    }

    Ok(())
}

/// Base calls with their qualities and peak positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseSection {
    pub bases: Vec<u8>,
    pub qualities: Vec<u8>,
    pub peaks: Vec<u32>,
}

/// Quality of a base call from its four channel probabilities.
fn call_quality(base: u8, probs: [u8; 4]) -> u8 {
    match channel_index(base) {
        Some(idx) => probs[idx],
        None => probs.into_iter().max().unwrap_or(0),
    }
}

/// Channel probabilities for a base call of quality `quality`.
fn call_probs(base: u8, quality: u8) -> [u8; 4] {
    match channel_index(base) {
        Some(idx) => {
            let mut probs = [0_u8; 4];
            probs[idx] = quality;
            probs
        },
        None => [quality; 4],
    }
}

pub fn decode_bases(
    bytes: &[u8],
    n_bases: usize,
    version: ScfVersion,
) -> BaseSection {
    let mut section = BaseSection{
        bases: Vec::with_capacity(n_bases),
        qualities: Vec::with_capacity(n_bases),
        peaks: Vec::with_capacity(n_bases),
    };

    match version {
        ScfVersion::V3 => {
            let peaks = &bytes[0..(4 * n_bases)];
            let probs = &bytes[(4 * n_bases)..(8 * n_bases)];
            let calls = &bytes[(8 * n_bases)..(9 * n_bases)];
            section.peaks = peaks.chunks_exact(4).map(|x| u32::from_be_bytes([x[0], x[1], x[2], x[3]])).collect();
            section.bases = calls.to_vec();
            section.qualities = (0..n_bases).map(|idx| {
                let p = [probs[idx], probs[n_bases + idx], probs[2 * n_bases + idx], probs[3 * n_bases + idx]];
                call_quality(calls[idx], p)
            }).collect();
        },
        ScfVersion::V2 => {
            bytes[0..(BASE_RECORD_LEN * n_bases)].chunks_exact(BASE_RECORD_LEN).for_each(|record| {
                section.peaks.push(u32::from_be_bytes([record[0], record[1], record[2], record[3]]));
                section.qualities.push(call_quality(record[8], [record[4], record[5], record[6], record[7]]));
                section.bases.push(record[8]);
            });
        },
    }

    section
}

pub fn encode_bases(
    section: &BaseSection,
    version: ScfVersion,
    out: &mut Vec<u8>,
) {
    let probs: Vec<[u8; 4]> = section.bases.iter().zip(section.qualities.iter())
        .map(|(base, quality)| call_probs(*base, *quality))
        .collect();

    match version {
        ScfVersion::V3 => {
            section.peaks.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes()));
            for channel in 0..4 {
                probs.iter().for_each(|p| out.push(p[channel]));
            }
            out.extend_from_slice(&section.bases);
            out.extend(std::iter::repeat(0).take(3 * section.bases.len()));
        },
        ScfVersion::V2 => {
            for (idx, base) in section.bases.iter().enumerate() {
                out.extend_from_slice(&section.peaks[idx].to_be_bytes());
                out.extend_from_slice(&probs[idx]);
                out.push(*base);
                out.extend_from_slice(&[0, 0, 0]);
            }
        },
    }
}

/// Parses `key=value` lines up to the first NUL.
///
/// Lines without `=` become keys with an empty value.
pub fn decode_comments(
    bytes: &[u8],
) -> Result<Vec<(String, String)>> {
    let end = bytes.iter().position(|x| *x == 0).unwrap_or(bytes.len());
    let text = std::str::from_utf8(&bytes[0..end]).map_err(|e| TraceError::malformed("SCF comments", e.to_string()))?;

    Ok(text.lines().filter(|line| !line.is_empty()).map(|line| {
        match line.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (line.to_string(), String::new()),
        }
    }).collect())
}

/// Writes `key=value` lines followed by a NUL.
///
/// Keys may not be empty or contain `=`. Neither keys nor values may contain
/// a line break or a NUL.
pub fn encode_comments<'a, I: Iterator<Item = (&'a String, &'a String)>>(
    comments: I,
    out: &mut Vec<u8>,
) -> Result<()> {
    for (key, value) in comments {
        if key.is_empty() || key.contains(['=', '\n', '\r', '\0']) || value.contains(['\n', '\r', '\0']) {
            return Err(TraceError::UnsupportedEncoding(format!("comment '{}' cannot be stored as an SCF key=value line", key)));
        }
        out.extend_from_slice(key.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
        out.push(b'\n');
    }
    out.push(0);
    Ok(())
}
