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
//! Format detection from the leading magic number.

use std::io::Cursor;
use std::io::Read;

/// Magic number at the start of a ZTR file.
pub const ZTR_MAGIC: [u8; 8] = [0xAE, b'Z', b'T', b'R', 0x0D, 0x0A, 0x1A, 0x0A];
/// Magic number at the start of an SCF file.
pub const SCF_MAGIC: [u8; 4] = *b".scf";
/// Magic number at the start of an AB1 file.
pub const AB1_MAGIC: [u8; 4] = *b"ABIF";

/// Number of bytes [sniff] needs to tell the formats apart.
pub const SNIFF_LEN: usize = 4;

/// Supported trace file formats.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TraceFormat {
    #[default]
    Ztr,
    Scf,
    Ab1,
}

impl TraceFormat {
    /// Leading bytes compared by [sniff].
    pub fn magic(&self) -> &'static [u8] {
        match self {
            TraceFormat::Ztr => &ZTR_MAGIC[0..SNIFF_LEN],
            TraceFormat::Scf => &SCF_MAGIC,
            TraceFormat::Ab1 => &AB1_MAGIC,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TraceFormat::Ztr => "ZTR",
            TraceFormat::Scf => "SCF",
            TraceFormat::Ab1 => "AB1",
        }
    }

    /// Conventional file extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TraceFormat::Ztr => "ztr",
            TraceFormat::Scf => "scf",
            TraceFormat::Ab1 => "ab1",
        }
    }

    pub fn all() -> [TraceFormat; 3] {
        [TraceFormat::Ztr, TraceFormat::Scf, TraceFormat::Ab1]
    }
}

impl std::fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TraceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ztr" => Ok(TraceFormat::Ztr),
            "scf" => Ok(TraceFormat::Scf),
            "ab1" | "abi" | "abif" => Ok(TraceFormat::Ab1),
            _ => Err(format!("'{}' is not a valid TraceFormat", s)),
        }
    }
}

/// Identifies the format whose magic number starts `prefix`.
///
/// Returns None for inputs shorter than [SNIFF_LEN] or with an unknown magic
/// number.
pub fn sniff(prefix: &[u8]) -> Option<TraceFormat> {
    if prefix.len() < SNIFF_LEN {
        return None;
    }
    TraceFormat::all().into_iter().find(|format| prefix[0..SNIFF_LEN] == *format.magic())
}

/// Reads at most [SNIFF_LEN] bytes from `conn` and identifies the format.
///
/// The bytes consumed from `conn` are put back in front of it in the returned
/// reader, so the caller can hand the stream to a codec as if nothing had been
/// read.
pub fn sniff_read<R: Read>(
    mut conn: R,
) -> std::io::Result<(Option<TraceFormat>, std::io::Chain<Cursor<Vec<u8>>, R>)> {
    let mut prefix: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
    (&mut conn).take(SNIFF_LEN as u64).read_to_end(&mut prefix)?;

    let format = sniff(&prefix);
    log::debug!("Sniffed {:02x?} as {:?}", prefix, format);

    Ok((format, Cursor::new(prefix).chain(conn)))
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn sniff_each_format() {
        use super::{sniff, TraceFormat, AB1_MAGIC, SCF_MAGIC, ZTR_MAGIC};

        assert_eq!(sniff(&ZTR_MAGIC), Some(TraceFormat::Ztr));
        assert_eq!(sniff(&ZTR_MAGIC[0..4]), Some(TraceFormat::Ztr));
        assert_eq!(sniff(&SCF_MAGIC), Some(TraceFormat::Scf));
        assert_eq!(sniff(b"ABIF\x00\x65"), Some(TraceFormat::Ab1));
        assert_eq!(sniff(&AB1_MAGIC), Some(TraceFormat::Ab1));
    }

    #[test]
    fn magic_numbers_do_not_overlap() {
        use super::{sniff, TraceFormat};

        for format in TraceFormat::all() {
            let matches: Vec<TraceFormat> = TraceFormat::all().into_iter()
                .filter(|other| sniff(format.magic()) == Some(*other))
                .collect();
            assert_eq!(matches, vec![format]);
        }
    }

    #[test]
    fn sniff_foreign_and_short_input() {
        use super::sniff;

        assert_eq!(sniff(b">seq1\nACGT\n"), None);
        assert_eq!(sniff(b"AB"), None);
        assert_eq!(sniff(b""), None);
        assert_eq!(sniff(b".SCF"), None);
    }

    #[test]
    fn sniff_read_replays_prefix() {
        use super::{sniff_read, TraceFormat};

        use std::io::Cursor;
        use std::io::Read;

        let data: Vec<u8> = b".scf\x00\x00\x00\x10rest".to_vec();
        let (format, mut replay) = sniff_read(Cursor::new(data.clone())).unwrap();

        let mut got: Vec<u8> = Vec::new();
        replay.read_to_end(&mut got).unwrap();

        assert_eq!(format, Some(TraceFormat::Scf));
        assert_eq!(got, data);
    }

    #[test]
    fn sniff_read_consumes_at_most_prefix() {
        use super::sniff_read;

        use std::io::Cursor;

        let mut data = Cursor::new(b"ABIFxxxxxxxx".to_vec());
        let (_, replay) = sniff_read(&mut data).unwrap();
        drop(replay);

        assert_eq!(data.position(), 4);
    }

    #[test]
    fn parse_format_name() {
        use super::TraceFormat;

        assert_eq!("ZTR".parse::<TraceFormat>(), Ok(TraceFormat::Ztr));
        assert_eq!("abi".parse::<TraceFormat>(), Ok(TraceFormat::Ab1));
        assert!("fasta".parse::<TraceFormat>().is_err());
    }
}
