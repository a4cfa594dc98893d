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
//! ABIF header and directory entries.
//!
//! ```text
//! "ABIF" | version(2) | tdir entry(28) | reserved | ... | directory
//! ```
//!
//! The `tdir` entry in the header points to the directory, a table of
//! entries with the same 28-byte layout:
//!
//! ```text
//! name(4) | number(4) | element_type(2) | element_size(2) | element_count(4) | data_size(4) | data_offset(4) | handle(4)
//! ```
//!
//! A value of at most [INLINE_LEN] bytes is stored in the `data_offset` field
//! itself, left-aligned. Larger values are stored at that absolute offset.

use crate::error::Result;
use crate::error::TraceError;
use crate::format::AB1_MAGIC;

use super::value::element;
use super::value::latin1;

use bincode::{Encode, Decode};
use bincode::encode_into_std_write;
use bincode::decode_from_slice;

/// Bytes in one directory entry.
pub const ENTRY_LEN: usize = 28;
/// Bytes of a value that fit in the `data_offset` field.
pub const INLINE_LEN: usize = 4;
/// Bytes of [Ab1Header]: magic, version and the `tdir` entry.
pub const HEADER_LEN: usize = 34;
/// Offset where writing value blocks starts; the gap after the header is reserved.
pub const DATA_START: usize = 128;
/// Format version written by this crate.
pub const VERSION: u16 = 101;

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 4],
    pub number: i32,
    pub element_type: i16,
    pub element_size: i16,
    pub element_count: i32,
    pub data_size: i32,
    /// Offset of the value, or the value itself if it fits.
    pub data_offset: [u8; 4],
    pub handle: i32,
}

#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct Ab1Header {
    pub magic: [u8; 4],
    pub version: u16,
    pub tdir: DirEntry,
}

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_big_endian().with_fixed_int_encoding()
}

impl DirEntry {
    /// Entry holding `data` of `element_count` elements, inline when it fits.
    ///
    /// `offset` is where the value is written when it does not fit.
    pub fn new(
        name: [u8; 4],
        number: i32,
        element_type: i16,
        element_size: i16,
        element_count: i32,
        data: &[u8],
        offset: u32,
    ) -> Self {
        let mut data_offset = [0_u8; 4];
        if data.len() <= INLINE_LEN {
            data_offset[0..data.len()].copy_from_slice(data);
        } else {
            data_offset = offset.to_be_bytes();
        }
        DirEntry{
            name, number, element_type, element_size, element_count,
            data_size: data.len() as i32,
            data_offset,
            handle: 0,
        }
    }

    /// Tag name and number, e.g. `PBAS2`.
    pub fn tag_name(&self) -> String {
        format!("{}{}", latin1(&self.name), self.number)
    }

    pub fn offset(&self) -> u32 {
        u32::from_be_bytes(self.data_offset)
    }

    pub fn is_inline(&self) -> bool {
        self.data_size >= 0 && self.data_size as usize <= INLINE_LEN
    }

    /// Resolves the value bytes, inline or at the stored offset in `file`.
    pub fn value<'a>(
        &'a self,
        file: &'a [u8],
    ) -> Result<&'a [u8]> {
        let expected = self.element_size as i64 * self.element_count as i64;
        if self.data_size < 0 || self.data_size as i64 != expected {
            return Err(TraceError::malformed(self.tag_name(), format!(
                "data size {} is not {} elements of {} bytes", self.data_size, self.element_count, self.element_size
            )));
        }

        let len = self.data_size as usize;
        if self.is_inline() {
            return Ok(&self.data_offset[0..len]);
        }

        let offset = self.offset() as usize;
        if offset as u64 + len as u64 > file.len() as u64 {
            return Err(TraceError::OutOfBoundsReference{
                context: format!("{} tag", self.tag_name()),
                offset: offset as u64, length: len as u64, size: file.len() as u64,
            });
        }
        Ok(&file[offset..(offset + len)])
    }
}

pub fn encode_header(
    n_entries: usize,
    directory_offset: u32,
) -> Result<Vec<u8>> {
    let tdir = DirEntry{
        name: *b"tdir",
        number: 1,
        element_type: element::DIRECTORY,
        element_size: ENTRY_LEN as i16,
        element_count: n_entries as i32,
        data_size: (ENTRY_LEN * n_entries) as i32,
        data_offset: directory_offset.to_be_bytes(),
        handle: 0,
    };
    let header = Ab1Header{ magic: AB1_MAGIC, version: VERSION, tdir };

    let mut bytes: Vec<u8> = Vec::with_capacity(DATA_START);
    let nbytes = encode_into_std_write(&header, &mut bytes, config())?;
    assert_eq!(nbytes, HEADER_LEN);
    bytes.resize(DATA_START, 0);
    Ok(bytes)
}

pub fn decode_header(
    bytes: &[u8],
) -> Result<Ab1Header> {
    let prefix = &bytes[0..bytes.len().min(AB1_MAGIC.len())];
    if prefix != &AB1_MAGIC[..] {
        return Err(TraceError::FormatMismatch{ format: "AB1", expected: AB1_MAGIC.to_vec(), found: prefix.to_vec() });
    }
    if bytes.len() < HEADER_LEN {
        return Err(TraceError::truncated("AB1 header", 0, HEADER_LEN as u64, bytes.len() as u64));
    }
    let header: Ab1Header = decode_from_slice(&bytes[0..HEADER_LEN], config())?.0;
    if header.tdir.element_size as usize != ENTRY_LEN {
        return Err(TraceError::UnsupportedEncoding(format!("directory entries of {} bytes", header.tdir.element_size)));
    }
    Ok(header)
}

pub fn encode_entry(
    entry: &DirEntry,
    out: &mut Vec<u8>,
) -> Result<()> {
    let nbytes = encode_into_std_write(entry, out, config())?;
    assert_eq!(nbytes, ENTRY_LEN);
    Ok(())
}

/// Reads the directory that `header` points to.
///
/// A directory outside `file` fails the whole parse.
pub fn read_directory(
    header: &Ab1Header,
    file: &[u8],
) -> Result<Vec<DirEntry>> {
    let n_entries = header.tdir.element_count.max(0) as usize;
    let offset = header.tdir.offset() as usize;
    let len = n_entries * ENTRY_LEN;
    if offset as u64 + len as u64 > file.len() as u64 {
        return Err(TraceError::OutOfBoundsReference{
            context: "AB1 directory".to_string(), offset: offset as u64, length: len as u64, size: file.len() as u64,
        });
    }

    file[offset..(offset + len)].chunks_exact(ENTRY_LEN).map(|bytes| {
        Ok(decode_from_slice(bytes, config())?.0)
    }).collect()
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn encode_entry_layout() {
        use super::{encode_entry, DirEntry};

        let entry = DirEntry::new(*b"PBAS", 2, 2, 1, 6, b"ACGTNA", 300);
        let mut out: Vec<u8> = Vec::new();
        encode_entry(&entry, &mut out).unwrap();

        let expected: Vec<u8> = vec![
            b'P', b'B', b'A', b'S', 0, 0, 0, 2, 0, 2, 0, 1, 0, 0, 0, 6,
            0, 0, 0, 6, 0, 0, 1, 44, 0, 0, 0, 0,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn four_bytes_are_inline() {
        use super::DirEntry;

        let entry = DirEntry::new(*b"FWO_", 1, 2, 1, 4, b"GATC", 9999);
        let file: Vec<u8> = Vec::new();

        assert!(entry.is_inline());
        assert_eq!(entry.value(&file).unwrap(), b"GATC");
    }

    #[test]
    fn five_bytes_are_read_from_offset() {
        use super::DirEntry;

        let file: Vec<u8> = b"......GATCA..".to_vec();
        let entry = DirEntry::new(*b"PBAS", 2, 2, 1, 5, b"GATCA", 6);

        assert!(!entry.is_inline());
        assert_eq!(entry.value(&file).unwrap(), b"GATCA");
    }

    #[test]
    fn offset_past_end() {
        use super::DirEntry;
        use crate::error::TraceError;

        let file: Vec<u8> = vec![0; 20];
        let entry = DirEntry::new(*b"DATA", 9, 4, 2, 4, &[0; 8], 16);

        let got = entry.value(&file);

        assert!(matches!(got, Err(TraceError::OutOfBoundsReference{ offset: 16, length: 8, size: 20, .. })));
    }

    #[test]
    fn size_disagrees_with_count() {
        use super::DirEntry;
        use crate::error::TraceError;

        let mut entry = DirEntry::new(*b"PLOC", 2, 4, 2, 3, &[0; 6], 200);
        entry.element_count = 4;

        assert!(matches!(entry.value(&[]), Err(TraceError::MalformedPayload{ .. })));
    }

    #[test]
    fn header_round_trip() {
        use super::{decode_header, encode_header, DATA_START, VERSION};

        let bytes = encode_header(3, 512).unwrap();

        assert_eq!(bytes.len(), DATA_START);
        assert_eq!(&bytes[0..4], b"ABIF");
        assert_eq!(&bytes[4..6], &[0, 101]);
        assert_eq!(&bytes[6..10], b"tdir");

        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.version, VERSION);
        assert_eq!(header.tdir.element_count, 3);
        assert_eq!(header.tdir.data_size, 84);
        assert_eq!(header.tdir.offset(), 512);
    }

    #[test]
    fn short_header() {
        use super::decode_header;
        use crate::error::TraceError;

        assert!(matches!(decode_header(b"ABIF\x00\x65"), Err(TraceError::TruncatedStream{ needed: 34, available: 6, .. })));
        assert!(matches!(decode_header(b".scf"), Err(TraceError::FormatMismatch{ .. })));
    }

    #[test]
    fn directory_out_of_bounds() {
        use super::{decode_header, encode_header, read_directory};
        use crate::error::TraceError;

        let bytes = encode_header(2, 120).unwrap();
        let header = decode_header(&bytes).unwrap();

        assert!(matches!(read_directory(&header, &bytes), Err(TraceError::OutOfBoundsReference{ .. })));
    }
}
