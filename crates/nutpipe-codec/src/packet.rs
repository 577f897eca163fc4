//! Startcoded packets: the framing shared by main and stream headers.
//!
//! A packet is an 8-byte big-endian startcode, a forward pointer (varint
//! counting the payload plus the 4-byte checksum footer), an optional header
//! checksum for large packets, the payload, and a checksum footer over the
//! payload.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::crc::{checksum, Crc32};
use crate::error::{CodecError, Result};
use crate::varint::{read_u32_be, read_u8, write_var_u64, MAX_BLOB_LEN};

/// File magic preceding the first main header.
pub const MAGIC: &[u8; 25] = b"nut/multimedia container\0";

/// Startcode of the main header packet. The first byte of every startcode is
/// the reserved frame code byte `b'N'`.
pub const MAIN_STARTCODE: u64 = 0x4E4D_7A56_1F5F_04AD;

/// Startcode of a stream header packet.
pub const STREAM_STARTCODE: u64 = 0x4E53_1140_5BF2_F9DB;

/// Forward pointers above this carry a checksum over the packet header.
const HEADER_CHECKSUM_THRESHOLD: u64 = 4096;

/// Write one packet.
pub fn write_packet(w: &mut impl Write, startcode: u64, payload: &[u8]) -> Result<()> {
    let forward_ptr = payload.len() as u64 + 4;

    let mut header = BytesMut::with_capacity(24);
    header.put_u64(startcode);
    write_var_u64(&mut header, forward_ptr);
    if forward_ptr > HEADER_CHECKSUM_THRESHOLD {
        let crc = checksum(&header);
        header.put_u32(crc);
    }

    w.write_all(&header)?;
    w.write_all(payload)?;
    w.write_all(&checksum(payload).to_be_bytes())?;
    Ok(())
}

/// Read the next 8-byte startcode.
pub fn read_startcode(r: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Read the body of a packet whose startcode was already consumed. Verifies
/// the header checksum (when present) and the payload footer.
pub fn read_packet_body(r: &mut impl Read, startcode: u64) -> Result<Bytes> {
    let mut header_crc = Crc32::new();
    header_crc.update(&startcode.to_be_bytes());

    // The forward pointer's own bytes are part of the header checksum, so
    // decode it by hand here.
    let mut forward_ptr: u64 = 0;
    loop {
        let byte = read_u8(r)?;
        header_crc.update(&[byte]);
        if forward_ptr >> 56 != 0 {
            return Err(CodecError::VarintOverflow);
        }
        forward_ptr = (forward_ptr << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            break;
        }
    }

    if forward_ptr < 4 {
        return Err(CodecError::MalformedContainer(format!(
            "forward pointer {forward_ptr} shorter than checksum footer"
        )));
    }
    let payload_len = (forward_ptr - 4) as usize;
    if payload_len > MAX_BLOB_LEN {
        return Err(CodecError::PayloadTooLarge {
            size: payload_len,
            max: MAX_BLOB_LEN,
        });
    }

    if forward_ptr > HEADER_CHECKSUM_THRESHOLD {
        let expected = read_u32_be(r)?;
        let computed = header_crc.finish();
        if expected != computed {
            return Err(CodecError::ChecksumMismatch { expected, computed });
        }
    }

    let mut payload = vec![0u8; payload_len];
    r.read_exact(&mut payload)?;

    let expected = read_u32_be(r)?;
    let computed = checksum(&payload);
    if expected != computed {
        return Err(CodecError::ChecksumMismatch { expected, computed });
    }

    Ok(Bytes::from(payload))
}
