//! Variable-length integer and fixed-width primitives.
//!
//! Unsigned varints carry 7 payload bits per byte, most significant group
//! first; the high bit of each byte means "more bytes follow". Signed values
//! use a zigzag mapping biased by one: positive `v` encodes as `2v - 1`,
//! non-positive `v` as `-2v`. Fixed-width integers are big-endian.

use std::io::Read;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

/// Largest length accepted for a length-prefixed blob (16 MiB).
pub const MAX_BLOB_LEN: usize = 16 * 1024 * 1024;

/// Read one byte.
pub fn read_u8(r: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a big-endian u32.
pub fn read_u32_be(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Read a big-endian u64.
pub fn read_u64_be(r: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Read an unsigned varint of up to 63 usable bits.
pub fn read_var_u64(r: &mut impl Read) -> Result<u64> {
    let mut acc: u64 = 0;
    loop {
        let byte = read_u8(r)?;
        if acc >> 56 != 0 {
            // Another 7-bit group would push past 63 bits.
            return Err(CodecError::VarintOverflow);
        }
        acc = (acc << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(acc);
        }
    }
}

/// Read a signed varint (one-biased zigzag).
pub fn read_var_i64(r: &mut impl Read) -> Result<i64> {
    let biased = read_var_u64(r)?;
    Ok(unzigzag(biased))
}

/// Read a length-prefixed byte blob (varint length + raw bytes).
pub fn read_blob(r: &mut impl Read) -> Result<Bytes> {
    let len = read_var_u64(r)? as usize;
    if len > MAX_BLOB_LEN {
        return Err(CodecError::PayloadTooLarge {
            size: len,
            max: MAX_BLOB_LEN,
        });
    }
    let mut data = vec![0u8; len];
    r.read_exact(&mut data)?;
    Ok(Bytes::from(data))
}

/// Write an unsigned varint.
pub fn write_var_u64(buf: &mut BytesMut, value: u64) {
    let mut shift = 0;
    while value >> shift >= 0x80 {
        shift += 7;
    }
    while shift > 0 {
        buf.put_u8(0x80 | ((value >> shift) & 0x7F) as u8);
        shift -= 7;
    }
    buf.put_u8((value & 0x7F) as u8);
}

/// Write a signed varint (one-biased zigzag).
pub fn write_var_i64(buf: &mut BytesMut, value: i64) {
    write_var_u64(buf, zigzag(value));
}

/// Write a length-prefixed byte blob.
pub fn write_blob(buf: &mut BytesMut, data: &[u8]) {
    write_var_u64(buf, data.len() as u64);
    buf.put_slice(data);
}

fn zigzag(value: i64) -> u64 {
    if value > 0 {
        (value as u64) * 2 - 1
    } else {
        value.unsigned_abs() * 2
    }
}

fn unzigzag(biased: u64) -> i64 {
    let tmp = biased + 1;
    let magnitude = (tmp >> 1) as i64;
    if tmp & 1 == 1 {
        -magnitude
    } else {
        magnitude
    }
}
