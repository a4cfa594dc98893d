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
//! Typed values of AB1 directory entries.
//!
//! All numbers are big-endian. Strings are read as Latin-1 so that any byte
//! sequence maps to a `String` and back without loss.

use crate::error::Result;
use crate::error::TraceError;

/// Element type codes of the ABIF directory.
pub mod element {
    pub const BYTE: i16 = 1;
    pub const CHAR: i16 = 2;
    pub const WORD: i16 = 3;
    pub const SHORT: i16 = 4;
    pub const LONG: i16 = 5;
    pub const FLOAT: i16 = 7;
    pub const DOUBLE: i16 = 8;
    pub const DATE: i16 = 10;
    pub const TIME: i16 = 11;
    pub const BOOL: i16 = 13;
    pub const PSTRING: i16 = 18;
    pub const CSTRING: i16 = 19;
    /// Directory entry type of the `tdir` pointer in the header.
    pub const DIRECTORY: i16 = 1023;
}

/// Longest string a Pascal string length byte can describe.
pub const PSTRING_MAX: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    Chars(Vec<u8>),
    Words(Vec<u16>),
    Shorts(Vec<i16>),
    Longs(Vec<i32>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
    Date { year: i16, month: u8, day: u8 },
    Time { hour: u8, minute: u8, second: u8, hsecond: u8 },
    Bools(Vec<bool>),
    PString(String),
    CString(String),
    /// User-defined or unknown element type.
    Raw { element_type: i16, element_size: i16, data: Vec<u8> },
}

pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|x| *x as char).collect()
}

fn to_latin1(text: &str) -> Result<Vec<u8>> {
    text.chars().map(|x| {
        u8::try_from(x as u32).map_err(|_| TraceError::UnsupportedEncoding(format!("character {:?} is not Latin-1", x)))
    }).collect()
}

fn check_multiple(context: &str, data: &[u8], width: usize) -> Result<()> {
    if data.len() % width != 0 {
        return Err(TraceError::malformed(context, format!("{} bytes is not a multiple of {}", data.len(), width)));
    }
    Ok(())
}

impl Value {
    /// Interprets `data` as elements of `element_type`.
    ///
    /// `context` names the tag in errors.
    pub fn decode(
        context: &str,
        element_type: i16,
        element_size: i16,
        data: &[u8],
    ) -> Result<Value> {
        let value = match element_type {
            element::BYTE => Value::Bytes(data.to_vec()),
            element::CHAR => Value::Chars(data.to_vec()),
            element::WORD => {
                check_multiple(context, data, 2)?;
                Value::Words(data.chunks_exact(2).map(|x| u16::from_be_bytes([x[0], x[1]])).collect())
            },
            element::SHORT => {
                check_multiple(context, data, 2)?;
                Value::Shorts(data.chunks_exact(2).map(|x| i16::from_be_bytes([x[0], x[1]])).collect())
            },
            element::LONG => {
                check_multiple(context, data, 4)?;
                Value::Longs(data.chunks_exact(4).map(|x| i32::from_be_bytes([x[0], x[1], x[2], x[3]])).collect())
            },
            element::FLOAT => {
                check_multiple(context, data, 4)?;
                Value::Floats(data.chunks_exact(4).map(|x| f32::from_be_bytes([x[0], x[1], x[2], x[3]])).collect())
            },
            element::DOUBLE => {
                check_multiple(context, data, 8)?;
                Value::Doubles(data.chunks_exact(8).map(|x| {
                    f64::from_be_bytes([x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7]])
                }).collect())
            },
            element::DATE => {
                if data.len() != 4 {
                    return Err(TraceError::malformed(context, format!("date of {} bytes", data.len())));
                }
                Value::Date{ year: i16::from_be_bytes([data[0], data[1]]), month: data[2], day: data[3] }
            },
            element::TIME => {
                if data.len() != 4 {
                    return Err(TraceError::malformed(context, format!("time of {} bytes", data.len())));
                }
                Value::Time{ hour: data[0], minute: data[1], second: data[2], hsecond: data[3] }
            },
            element::BOOL => Value::Bools(data.iter().map(|x| *x != 0).collect()),
            element::PSTRING => {
                let len = *data.first().ok_or_else(|| TraceError::malformed(context, "empty pString"))? as usize;
                if len + 1 > data.len() {
                    return Err(TraceError::malformed(context, format!("pString of length {} in {} bytes", len, data.len())));
                }
                Value::PString(latin1(&data[1..(len + 1)]))
            },
            element::CSTRING => {
                let end = data.iter().position(|x| *x == 0).unwrap_or(data.len());
                Value::CString(latin1(&data[0..end]))
            },
            _ => Value::Raw{ element_type, element_size, data: data.to_vec() },
        };
        Ok(value)
    }

    /// Returns `(element_type, element_size, element_count, data)`.
    pub fn encode(
        &self,
    ) -> Result<(i16, i16, i32, Vec<u8>)> {
        let encoded = match self {
            Value::Bytes(x) => (element::BYTE, 1, x.len() as i32, x.clone()),
            Value::Chars(x) => (element::CHAR, 1, x.len() as i32, x.clone()),
            Value::Words(x) => (element::WORD, 2, x.len() as i32, x.iter().flat_map(|v| v.to_be_bytes()).collect()),
            Value::Shorts(x) => (element::SHORT, 2, x.len() as i32, x.iter().flat_map(|v| v.to_be_bytes()).collect()),
            Value::Longs(x) => (element::LONG, 4, x.len() as i32, x.iter().flat_map(|v| v.to_be_bytes()).collect()),
            Value::Floats(x) => (element::FLOAT, 4, x.len() as i32, x.iter().flat_map(|v| v.to_be_bytes()).collect()),
            Value::Doubles(x) => (element::DOUBLE, 8, x.len() as i32, x.iter().flat_map(|v| v.to_be_bytes()).collect()),
            Value::Date{ year, month, day } => {
                let y = year.to_be_bytes();
                (element::DATE, 4, 1, vec![y[0], y[1], *month, *day])
            },
            Value::Time{ hour, minute, second, hsecond } => (element::TIME, 4, 1, vec![*hour, *minute, *second, *hsecond]),
            Value::Bools(x) => (element::BOOL, 1, x.len() as i32, x.iter().map(|v| *v as u8).collect()),
            Value::PString(x) => {
                let bytes = to_latin1(x)?;
                if bytes.len() > PSTRING_MAX {
                    return Err(TraceError::UnsupportedEncoding(format!("pString of {} bytes", bytes.len())));
                }
                let mut data: Vec<u8> = Vec::with_capacity(bytes.len() + 1);
                data.push(bytes.len() as u8);
                data.extend(bytes);
                (element::PSTRING, 1, data.len() as i32, data)
            },
            Value::CString(x) => {
                let mut data = to_latin1(x)?;
                if data.contains(&0) {
                    return Err(TraceError::UnsupportedEncoding(format!("cString {:?} contains a NUL byte", x)));
                }
                data.push(0);
                (element::CSTRING, 1, data.len() as i32, data)
            },
            Value::Raw{ element_type, element_size, data } => {
                let count = if *element_size > 0 { data.len() as i32 / *element_size as i32 } else { data.len() as i32 };
                (*element_type, *element_size, count, data.clone())
            },
        };
        Ok(encoded)
    }

    /// Text of a string value, for either string type.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::PString(x) | Value::CString(x) => Some(x),
            _ => None,
        }
    }

    /// Text value stored as a Pascal string when it fits, C string otherwise.
    pub fn text(text: &str) -> Value {
        if text.len() <= PSTRING_MAX { Value::PString(text.to_string()) } else { Value::CString(text.to_string()) }
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn decode_shorts() {
        use super::{element, Value};

        let got = Value::decode("DATA9", element::SHORT, 2, &[0, 1, 0xFF, 0xFE, 0x7F, 0xFF]).unwrap();

        assert_eq!(got, Value::Shorts(vec![1, -2, i16::MAX]));
    }

    #[test]
    fn decode_odd_shorts() {
        use super::{element, Value};
        use crate::error::TraceError;

        let got = Value::decode("DATA9", element::SHORT, 2, &[0, 1, 0]);

        assert!(matches!(got, Err(TraceError::MalformedPayload{ .. })));
    }

    #[test]
    fn decode_pstring() {
        use super::{element, Value};

        let got = Value::decode("SMPL1", element::PSTRING, 1, b"\x05hello").unwrap();

        assert_eq!(got, Value::PString("hello".to_string()));
        assert_eq!(got.as_text(), Some("hello"));
    }

    #[test]
    fn decode_short_pstring() {
        use super::{element, Value};
        use crate::error::TraceError;

        let got = Value::decode("SMPL1", element::PSTRING, 1, b"\x09hello");

        assert!(matches!(got, Err(TraceError::MalformedPayload{ .. })));
    }

    #[test]
    fn decode_cstring() {
        use super::{element, Value};

        let got = Value::decode("CTID1", element::CSTRING, 1, b"plate_7\x00").unwrap();

        assert_eq!(got, Value::CString("plate_7".to_string()));
    }

    #[test]
    fn decode_date_and_time() {
        use super::{element, Value};

        let date = Value::decode("RUND1", element::DATE, 4, &[0x07, 0xE9, 3, 14]).unwrap();
        let time = Value::decode("RUNT1", element::TIME, 4, &[13, 5, 59, 0]).unwrap();

        assert_eq!(date, Value::Date{ year: 2025, month: 3, day: 14 });
        assert_eq!(time, Value::Time{ hour: 13, minute: 5, second: 59, hsecond: 0 });
    }

    #[test]
    fn decode_unknown_type() {
        use super::Value;

        let got = Value::decode("USER1", 1024, 3, &[1, 2, 3, 4, 5, 6]).unwrap();

        assert_eq!(got, Value::Raw{ element_type: 1024, element_size: 3, data: vec![1, 2, 3, 4, 5, 6] });
        assert_eq!(got.encode().unwrap(), (1024, 3, 2, vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn encode_pstring() {
        use super::{element, Value};

        let got = Value::PString("ACGT".to_string()).encode().unwrap();

        assert_eq!(got, (element::PSTRING, 1, 5, b"\x04ACGT".to_vec()));
    }

    #[test]
    fn long_text_becomes_cstring() {
        use super::Value;

        let long = "x".repeat(300);

        assert_eq!(Value::text("short"), Value::PString("short".to_string()));
        assert_eq!(Value::text(&long), Value::CString(long.clone()));
        assert!(Value::PString(long).encode().is_err());
    }

    #[test]
    fn cstring_with_nul() {
        use super::Value;
        use crate::error::TraceError;

        let got = Value::CString("plate\x007".to_string()).encode();

        assert!(matches!(got, Err(TraceError::UnsupportedEncoding(_))));
        assert!(Value::PString("plate\x007".to_string()).encode().is_ok());
    }

    #[test]
    fn latin1_round_trip() {
        use super::{element, Value};

        let bytes: Vec<u8> = vec![3, b'a', 0xE9, 0xFF];
        let value = Value::decode("CMNT1", element::PSTRING, 1, &bytes).unwrap();

        assert_eq!(value.encode().unwrap().3, bytes);
    }

    #[test]
    fn encode_floats() {
        use super::{element, Value};

        let got = Value::Floats(vec![1.5]).encode().unwrap();

        assert_eq!(got, (element::FLOAT, 4, 1, 1.5_f32.to_be_bytes().to_vec()));
    }
}
