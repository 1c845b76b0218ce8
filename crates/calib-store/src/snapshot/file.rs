//! Snapshot file format.
//!
//! Every revision of a snapshot is stored as one self-checking binary file.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (6 bytes)                                            │
//! │  - Magic: "ACAL" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Body                                                        │
//! │  - Calibration name (u16 length + UTF-8)                     │
//! │  - First / last point (i64 ts, u32 sub-order, u8 flags)      │
//! │  - Author (u16 length + UTF-8), created_at: i64              │
//! │  - Value count: u32, then (channel: u32, value: f64)         │
//! │  - Fit count: u32, then (channel: u32, n: u32, n × f64)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Footer (8 bytes)                                            │
//! │  - CRC32 of header + body (4 bytes)                          │
//! │  - Reverse magic: "LACA" (4 bytes)                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

use crate::error::{CalibError, Result};
use crate::id::{PointFlags, PointId};
use crate::snapshot::CalibrationSnapshot;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::error;

/// Magic bytes for the snapshot file header: "ACAL"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"ACAL";

/// Reverse magic bytes for the snapshot file footer: "LACA"
pub const SNAPSHOT_MAGIC_REVERSE: [u8; 4] = *b"LACA";

/// Current snapshot file format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 6;

/// Footer size in bytes.
pub const FOOTER_SIZE: usize = 8;

/// Longest string field, in bytes, the u16 length prefix can describe.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Encodes a snapshot into its on-disk byte representation.
///
/// # Errors
///
/// Returns `CalibError::Validation` if a string field is longer than the
/// format can hold.
pub fn encode(snapshot: &CalibrationSnapshot) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 64 + snapshot.values.len() * 12);

    buf.extend_from_slice(&SNAPSHOT_MAGIC);
    buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());

    put_str(&mut buf, &snapshot.calibration)?;
    put_point(&mut buf, &snapshot.first);
    put_point(&mut buf, &snapshot.last);
    put_str(&mut buf, &snapshot.author)?;
    buf.extend_from_slice(&snapshot.created_at.to_le_bytes());

    buf.extend_from_slice(&(snapshot.values.len() as u32).to_le_bytes());
    for (channel, value) in &snapshot.values {
        buf.extend_from_slice(&channel.to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
    }

    buf.extend_from_slice(&(snapshot.fit_parameters.len() as u32).to_le_bytes());
    for (channel, params) in &snapshot.fit_parameters {
        buf.extend_from_slice(&channel.to_le_bytes());
        buf.extend_from_slice(&(params.len() as u32).to_le_bytes());
        for param in params {
            buf.extend_from_slice(&param.to_le_bytes());
        }
    }

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&SNAPSHOT_MAGIC_REVERSE);

    Ok(buf)
}

/// Decodes a snapshot from its on-disk byte representation.
///
/// # Errors
///
/// Returns `CalibError::InvalidMagic` if either magic does not match,
/// `CalibError::UnsupportedVersion` for files from a newer format,
/// `CalibError::ChecksumMismatch` if the content was altered, and
/// `CalibError::Corrupt` for truncated or structurally invalid content.
pub fn decode(bytes: &[u8]) -> Result<CalibrationSnapshot> {
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(CalibError::Corrupt(format!(
            "file too short: {} bytes",
            bytes.len()
        )));
    }

    let (content, footer) = bytes.split_at(bytes.len() - FOOTER_SIZE);
    let magic: [u8; 4] = array_at(content, 0)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(CalibError::InvalidMagic(magic));
    }
    let magic_reverse: [u8; 4] = array_at(footer, 4)?;
    if magic_reverse != SNAPSHOT_MAGIC_REVERSE {
        return Err(CalibError::InvalidMagic(magic_reverse));
    }

    let expected = u32::from_le_bytes(array_at(footer, 0)?);
    let actual = crc32fast::hash(content);
    if expected != actual {
        return Err(CalibError::ChecksumMismatch { expected, actual });
    }

    let mut reader = ByteReader::new(content);
    reader.skip(4)?;
    let version = reader.u16()?;
    if version > SNAPSHOT_VERSION {
        return Err(CalibError::UnsupportedVersion(version));
    }

    let calibration = reader.string()?;
    let first = reader.point()?;
    let last = reader.point()?;
    let author = reader.string()?;
    let created_at = reader.i64()?;

    let value_count = reader.u32()? as usize;
    let mut values = BTreeMap::new();
    for _ in 0..value_count {
        let channel = reader.u32()?;
        values.insert(channel, reader.f64()?);
    }

    let fit_count = reader.u32()? as usize;
    let mut fit_parameters = BTreeMap::new();
    for _ in 0..fit_count {
        let channel = reader.u32()?;
        let n = reader.u32()? as usize;
        let mut params = Vec::with_capacity(n.min(reader.remaining() / 8));
        for _ in 0..n {
            params.push(reader.f64()?);
        }
        fit_parameters.insert(channel, params);
    }

    if reader.remaining() != 0 {
        return Err(CalibError::Corrupt(format!(
            "{} trailing bytes after body",
            reader.remaining()
        )));
    }

    Ok(CalibrationSnapshot {
        calibration,
        first,
        last,
        values,
        fit_parameters,
        author,
        created_at,
    })
}

/// Writes `bytes` to `path` through a temporary sibling file and a rename,
/// so readers never observe a half-written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], sync: bool) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| CalibError::Corrupt(format!("bad target path {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        if sync {
            file.sync_all()?;
        }
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            error!("Failed to remove {}: {}", tmp_path.display(), cleanup);
        }
        return Err(err.into());
    }
    Ok(())
}

/// Encodes `snapshot` and writes it to `path`.
pub fn write_snapshot(path: &Path, snapshot: &CalibrationSnapshot, sync: bool) -> Result<()> {
    let bytes = encode(snapshot)?;
    write_atomic(path, &bytes, sync)
}

/// Reads and decodes the snapshot file at `path`.
pub fn read_snapshot(path: &Path) -> Result<CalibrationSnapshot> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

fn put_str(buf: &mut Vec<u8>, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_STRING_LEN {
        return Err(CalibError::Validation(format!(
            "string field too long: {} bytes",
            bytes.len()
        )));
    }
    let len = bytes.len() as u16;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_point(buf: &mut Vec<u8>, point: &PointId) {
    buf.extend_from_slice(&point.timestamp.to_le_bytes());
    buf.extend_from_slice(&point.sub_order.to_le_bytes());
    buf.push(point.flags.as_u8());
}

fn array_at<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| CalibError::Corrupt("truncated snapshot file".to_string()))
}

/// Cursor over the body of a snapshot file.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CalibError::Corrupt(format!(
                "truncated snapshot file: need {} bytes at offset {}",
                n, self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take(N)?;
        slice
            .try_into()
            .map_err(|_| CalibError::Corrupt("truncated snapshot file".to_string()))
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CalibError::Corrupt(format!("Invalid UTF-8 in string field: {}", e)))
    }

    fn point(&mut self) -> Result<PointId> {
        let timestamp = self.i64()?;
        let sub_order = self.u32()?;
        let flags = PointFlags::from_u8(self.u8()?);
        Ok(PointId {
            timestamp,
            sub_order,
            flags,
        })
    }
}
