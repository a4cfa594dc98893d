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
//! The canonical trace model shared by all codecs.
//!
//! A [Trace] is built once through a [TraceBuilder] and is immutable
//! afterwards. [TraceBuilder::build] enforces the model invariants:
//!
//!   - one quality per base call,
//!   - peak positions are either absent or one per base call,
//!   - all four channels hold the same number of samples,
//!   - every channel has one confidence per sample,
//!   - the clip range lies within the base calls.

use crate::error::Result;
use crate::error::TraceError;

use std::collections::BTreeMap;

/// Order of the channels in [Trace::channels].
pub const CHANNEL_ORDER: [u8; 4] = *b"ACGT";

/// IUPAC nucleotide symbols accepted as base calls.
const IUPAC: &[u8] = b"ACGTUNRYKMSWBDHVacgtunrykmswbdhv";

/// Whether `base` is an accepted base call symbol.
pub fn is_nucleotide(base: u8) -> bool {
    IUPAC.contains(&base)
}

/// Returns the index of `base` in [CHANNEL_ORDER], ignoring case.
pub fn channel_index(base: u8) -> Option<usize> {
    CHANNEL_ORDER.iter().position(|x| *x == base.to_ascii_uppercase())
}

/// Analog signal of one base channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Channel {
    positions: Vec<u16>,
    confidences: Vec<u8>,
}

impl Channel {
    /// Sample values of this channel.
    pub fn positions(&self) -> &[u16] {
        &self.positions
    }

    /// Per-sample confidences, same length as [positions](Channel::positions).
    pub fn confidences(&self) -> &[u8] {
        &self.confidences
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Largest sample value, 0 for an empty channel.
    pub fn max_position(&self) -> u16 {
        self.positions.iter().copied().max().unwrap_or(0)
    }
}

/// Inclusive range of base indexes considered high quality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipRange {
    pub start: u32,
    pub end: u32,
}

/// An AB1 directory record that has no field in [Trace].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpaqueTag {
    pub name: [u8; 4],
    pub number: i32,
    pub element_type: i16,
    pub element_size: i16,
    pub element_count: i32,
    pub data: Vec<u8>,
}

/// Well-formed data that a codec does not map onto the model.
///
/// Retained so that the codec that produced it can write it back.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Opaque {
    /// Decoded payload of a ZTR chunk with an unknown type
    ZtrChunk { chunk_type: [u8; 4], payload: Vec<u8> },
    /// AB1 tag with an unknown name or a non-string type
    Ab1Tag(OpaqueTag),
}

/// A decoded sequencing trace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Trace {
    bases: Vec<u8>,
    qualities: Vec<u8>,
    peaks: Vec<u32>,
    channels: [Channel; 4],
    comments: BTreeMap<String, String>,
    clip: Option<ClipRange>,
    opaque: Vec<Opaque>,
}

impl Trace {
    pub fn builder() -> TraceBuilder {
        TraceBuilder::default()
    }

    /// Base calls as ASCII symbols.
    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    /// One confidence per base call.
    pub fn qualities(&self) -> &[u8] {
        &self.qualities
    }

    /// Sample index of each base call, empty if the source had none.
    pub fn peaks(&self) -> &[u32] {
        &self.peaks
    }

    /// Channels in [CHANNEL_ORDER].
    pub fn channels(&self) -> &[Channel; 4] {
        &self.channels
    }

    /// Channel for `base` (one of A, C, G, T).
    pub fn channel(&self, base: u8) -> Option<&Channel> {
        channel_index(base).map(|idx| &self.channels[idx])
    }

    /// Number of samples in each channel.
    pub fn sample_count(&self) -> usize {
        self.channels[0].len()
    }

    /// Largest sample value over all channels.
    pub fn max_sample(&self) -> u16 {
        self.channels.iter().map(|channel| channel.max_position()).max().unwrap_or(0)
    }

    pub fn comments(&self) -> &BTreeMap<String, String> {
        &self.comments
    }

    pub fn clip(&self) -> Option<ClipRange> {
        self.clip
    }

    pub fn opaque(&self) -> &[Opaque] {
        &self.opaque
    }

    /// Returns a builder holding a copy of this trace's fields.
    pub fn to_builder(&self) -> TraceBuilder {
        TraceBuilder {
            bases: self.bases.clone(),
            qualities: self.qualities.clone(),
            peaks: self.peaks.clone(),
            positions: self.channels.clone().map(|channel| channel.positions),
            confidences: self.channels.clone().map(|channel| channel.confidences),
            comments: self.comments.clone(),
            clip: self.clip,
            opaque: self.opaque.clone(),
            bad_channel: None,
        }
    }

    /// One-line human readable description of the trace contents.
    pub fn summary(&self) -> String {
        let clip = match self.clip {
            Some(range) => format!("{}-{}", range.start, range.end),
            None => "none".to_string(),
        };
        format!(
            "bases: {}\tsamples: {}\tmax sample: {}\tpeaks: {}\tclip: {}\tcomments: {}\topaque: {}",
            self.bases.len(), self.sample_count(), self.max_sample(),
            self.peaks.len(), clip, self.comments.len(), self.opaque.len(),
        )
    }
}

fn check_clip(clip: &ClipRange, n_bases: usize) -> Result<()> {
    if clip.start > clip.end || clip.end as usize >= n_bases {
        return Err(TraceError::InvalidTrace(format!(
            "clip range {}-{} outside {} base calls", clip.start, clip.end, n_bases
        )));
    }
    Ok(())
}

/// Collects trace fields and validates them in [build](TraceBuilder::build).
#[derive(Clone, Debug, Default)]
pub struct TraceBuilder {
    bases: Vec<u8>,
    qualities: Vec<u8>,
    peaks: Vec<u32>,
    positions: [Vec<u16>; 4],
    confidences: [Vec<u8>; 4],
    comments: BTreeMap<String, String>,
    clip: Option<ClipRange>,
    opaque: Vec<Opaque>,
    bad_channel: Option<u8>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bases(&mut self, bases: Vec<u8>) -> &mut Self {
        self.bases = bases;
        self
    }

    pub fn qualities(&mut self, qualities: Vec<u8>) -> &mut Self {
        self.qualities = qualities;
        self
    }

    pub fn peaks(&mut self, peaks: Vec<u32>) -> &mut Self {
        self.peaks = peaks;
        self
    }

    /// Sets the samples of the channel for `base` (one of A, C, G, T).
    ///
    /// Any other symbol makes [build](TraceBuilder::build) fail.
    pub fn channel_positions(&mut self, base: u8, positions: Vec<u16>) -> &mut Self {
        match channel_index(base) {
            Some(idx) => self.positions[idx] = positions,
            None => self.bad_channel = Some(base),
        }
        self
    }

    /// Sets the per-sample confidences of the channel for `base` (one of A, C, G, T).
    ///
    /// Any other symbol makes [build](TraceBuilder::build) fail.
    pub fn channel_confidences(&mut self, base: u8, confidences: Vec<u8>) -> &mut Self {
        match channel_index(base) {
            Some(idx) => self.confidences[idx] = confidences,
            None => self.bad_channel = Some(base),
        }
        self
    }

    pub fn comment(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.comments.insert(key.into(), value.into());
        self
    }

    pub fn clip(&mut self, clip: Option<ClipRange>) -> &mut Self {
        self.clip = clip;
        self
    }

    pub fn opaque(&mut self, record: Opaque) -> &mut Self {
        self.opaque.push(record);
        self
    }

    /// Number of base calls collected so far.
    pub fn base_count(&self) -> usize {
        self.bases.len()
    }

    /// Checks a clip range against the base calls collected so far.
    pub fn check_clip(&self, clip: &ClipRange) -> Result<()> {
        check_clip(clip, self.bases.len())
    }

    /// Validates the collected fields and returns the finished [Trace].
    ///
    /// Missing qualities and missing channel confidences are filled with
    /// zeros; any other length disagreement is an error.
    pub fn build(self) -> Result<Trace> {
        let TraceBuilder { bases, mut qualities, peaks, positions, mut confidences, comments, clip, opaque, bad_channel } = self;

        if let Some(base) = bad_channel {
            return Err(TraceError::InvalidTrace(format!("{:?} does not name a channel", base as char)));
        }

        if let Some(pos) = bases.iter().position(|base| !is_nucleotide(*base)) {
            return Err(TraceError::InvalidTrace(format!(
                "base call {:?} at index {} is not a nucleotide symbol", bases[pos] as char, pos
            )));
        }

        if let Some(range) = &clip {
            check_clip(range, bases.len())?;
        }

        if qualities.is_empty() && !bases.is_empty() {
            log::debug!("No qualities for {} base calls, using zeros", bases.len());
            qualities = vec![0; bases.len()];
        }
        if qualities.len() != bases.len() {
            return Err(TraceError::InvalidTrace(format!(
                "{} qualities for {} base calls", qualities.len(), bases.len()
            )));
        }

        if !peaks.is_empty() && peaks.len() != bases.len() {
            return Err(TraceError::InvalidTrace(format!(
                "{} peak positions for {} base calls", peaks.len(), bases.len()
            )));
        }

        let n_samples = positions[0].len();
        for (idx, channel) in positions.iter().enumerate() {
            if channel.len() != n_samples {
                return Err(TraceError::InvalidTrace(format!(
                    "channel {} has {} samples, channel {} has {}",
                    CHANNEL_ORDER[idx] as char, channel.len(), CHANNEL_ORDER[0] as char, n_samples
                )));
            }
        }

        for (idx, channel) in confidences.iter_mut().enumerate() {
            if channel.is_empty() {
                *channel = vec![0; n_samples];
            }
            if channel.len() != n_samples {
                return Err(TraceError::InvalidTrace(format!(
                    "channel {} has {} confidences for {} samples",
                    CHANNEL_ORDER[idx] as char, channel.len(), n_samples
                )));
            }
        }

        let mut channels: [Channel; 4] = Default::default();
        for (channel, (positions, confidences)) in channels.iter_mut().zip(positions.into_iter().zip(confidences)) {
            *channel = Channel { positions, confidences };
        }

        Ok(Trace { bases, qualities, peaks, channels, comments, clip, opaque })
    }
}
