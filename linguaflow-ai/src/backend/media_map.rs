//! Media manifest decoding
//!
//! Packages store media files under opaque zip entry names ("0", "1", ...)
//! plus a `media` manifest mapping those entries back to real filenames.
//! Legacy packages use a JSON object; `anki21b` packages use a protobuf
//! `MediaEntries` message (zstd-compressed, decompressed by the caller).

use super::BackendError;
use std::collections::BTreeMap;

/// One manifest row: zip entry name → original filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMapEntry {
    pub zip_name: String,
    pub filename: String,
}

/// Parse the legacy `{"0": "cat.jpg", ...}` manifest
pub fn parse_legacy_json(bytes: &[u8]) -> Result<Vec<MediaMapEntry>, BackendError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let map: BTreeMap<String, String> = serde_json::from_slice(bytes)?;
    Ok(map
        .into_iter()
        .map(|(zip_name, filename)| MediaMapEntry { zip_name, filename })
        .collect())
}

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

/// Parse a protobuf `MediaEntries` manifest
///
/// ```text
/// message MediaEntries { repeated MediaEntry entries = 1; }
/// message MediaEntry {
///     string name = 1;
///     uint32 size = 2;
///     bytes sha1 = 3;
///     optional uint32 legacy_zip_filename = 255;
/// }
/// ```
///
/// The zip entry name is `legacy_zip_filename` when present, otherwise the
/// entry's position in the list.
pub fn parse_media_entries(bytes: &[u8]) -> Result<Vec<MediaMapEntry>, BackendError> {
    let mut reader = ProtoReader::new(bytes);
    let mut entries = Vec::new();
    let mut index = 0usize;

    while let Some((field, wire)) = reader.next_key()? {
        if field == 1 && wire == WIRE_LEN {
            let body = reader.read_len()?;
            let (name, legacy_zip_filename) = parse_media_entry(body)?;
            let zip_name = legacy_zip_filename
                .map(|n| n.to_string())
                .unwrap_or_else(|| index.to_string());
            entries.push(MediaMapEntry { zip_name, filename: name });
            index += 1;
        } else {
            reader.skip(wire)?;
        }
    }

    Ok(entries)
}

fn parse_media_entry(bytes: &[u8]) -> Result<(String, Option<u64>), BackendError> {
    let mut reader = ProtoReader::new(bytes);
    let mut name = String::new();
    let mut legacy_zip_filename = None;

    while let Some((field, wire)) = reader.next_key()? {
        match (field, wire) {
            (1, WIRE_LEN) => {
                name = String::from_utf8(reader.read_len()?.to_vec())
                    .map_err(|_| malformed("media name is not UTF-8"))?;
            }
            (255, WIRE_VARINT) => legacy_zip_filename = Some(reader.read_varint()?),
            _ => reader.skip(wire)?,
        }
    }

    Ok((name, legacy_zip_filename))
}

fn malformed(detail: &str) -> BackendError {
    BackendError::Archive(format!("Malformed media manifest: {}", detail))
}

/// Minimal protobuf wire-format reader
struct ProtoReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ProtoReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn next_key(&mut self) -> Result<Option<(u64, u64)>, BackendError> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        Ok(Some((key >> 3, key & 0x7)))
    }

    fn read_varint(&mut self) -> Result<u64, BackendError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| malformed("truncated varint"))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(malformed("varint too long"))
    }

    fn read_len(&mut self) -> Result<&'a [u8], BackendError> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], BackendError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| malformed("field runs past end of message"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, wire: u64) -> Result<(), BackendError> {
        match wire {
            WIRE_VARINT => self.read_varint().map(|_| ()),
            WIRE_FIXED64 => self.take(8).map(|_| ()),
            WIRE_LEN => self.read_len().map(|_| ()),
            WIRE_FIXED32 => self.take(4).map(|_| ()),
            other => Err(malformed(&format!("unsupported wire type {}", other))),
        }
    }
}
