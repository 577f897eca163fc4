//! The 256-entry frame-code table.
//!
//! Every frame starts with a single code byte indexing this table; the entry
//! supplies the fields the frame header then omits. The table itself is
//! serialized inside the main header as run-length groups of entries whose
//! `data_size_lsb` increases by one per code.

use std::io::Read;

use bytes::BytesMut;

use crate::error::{CodecError, Result};
use crate::flags::{
    FLAG_CODED, FLAG_CODED_PTS, FLAG_INVALID, FLAG_KEY, FLAG_SIZE_MSB, FLAG_STREAM_ID,
};
use crate::model::{FrameCode, MATCH_UNKNOWN};
use crate::varint::{read_var_i64, read_var_u64, write_var_i64, write_var_u64};

/// The code byte reserved for the startcode prefix. Its table entry is always
/// invalid so a frame can never begin with this byte.
pub const RESERVED_CODE: u8 = b'N';

/// The frame code whose entry requires every field to be coded explicitly.
pub const ESCAPE_CODE: u8 = 0;

/// Upper bound for `data_size_mul` and `data_size_lsb` in table entries.
const MAX_SIZE_FIELD: u64 = 16384;

/// A contiguous range of codes assigned to one stream, used by the writer to
/// map small frames back to a code byte. Not populated when a table is read
/// from the wire.
#[derive(Debug, Clone, Copy)]
struct StreamBlock {
    logical_start: usize,
    len: usize,
}

#[derive(Debug, Clone)]
pub struct FrameCodeTable {
    entries: Vec<FrameCode>,
    blocks: Vec<StreamBlock>,
}

/// Map a logical code index (0..254, the codes usable for frames) to the
/// physical code byte, skipping the escape code and the reserved byte.
fn physical(logical: usize) -> usize {
    let code = logical + 1;
    if code >= RESERVED_CODE as usize {
        code + 1
    } else {
        code
    }
}

impl FrameCodeTable {
    /// Build the table this implementation writes: code 0 is the escape
    /// entry, `RESERVED_CODE` is invalid, and the remaining 254 codes are
    /// split into per-stream blocks sweeping `data_size_lsb`.
    pub fn build(stream_count: usize) -> Self {
        let mut entries = vec![FrameCode::default(); 256];
        entries[ESCAPE_CODE as usize] = FrameCode {
            flags: FLAG_CODED | FLAG_STREAM_ID | FLAG_CODED_PTS | FLAG_SIZE_MSB | FLAG_KEY,
            stream_id: 0,
            data_size_mul: 1,
            data_size_lsb: 0,
            pts_delta: 0,
            reserved_count: 0,
            match_time_delta: MATCH_UNKNOWN,
            header_idx: 0,
        };

        let count = stream_count.max(1);
        let base = 254 / count;
        let rem = 254 % count;
        let mut blocks = Vec::with_capacity(count);
        let mut logical = 0;
        for stream_id in 0..count {
            let len = if base == 0 {
                usize::from(stream_id < 254)
            } else if stream_id == count - 1 {
                base + rem
            } else {
                base
            };
            blocks.push(StreamBlock {
                logical_start: logical,
                len,
            });
            for lsb in 0..len {
                entries[physical(logical + lsb)] = FrameCode {
                    flags: FLAG_KEY | FLAG_SIZE_MSB,
                    stream_id: stream_id as u64,
                    data_size_mul: len as u64,
                    data_size_lsb: lsb as u64,
                    pts_delta: 1,
                    reserved_count: 0,
                    match_time_delta: MATCH_UNKNOWN,
                    header_idx: 0,
                };
            }
            logical += len;
        }

        Self { entries, blocks }
    }

    pub fn get(&self, code: u8) -> &FrameCode {
        &self.entries[code as usize]
    }

    pub fn escape_entry(&self) -> &FrameCode {
        &self.entries[ESCAPE_CODE as usize]
    }

    pub fn entries(&self) -> &[FrameCode] {
        &self.entries
    }

    /// The code byte and `size_msb` for a frame of `size` bytes on
    /// `stream_id`, if the stream has a code block. Only valid for frames
    /// whose pts advances by exactly the block's pts delta.
    pub fn small_frame_code(&self, stream_id: usize, size: u64) -> Option<(u8, u64)> {
        let block = self.blocks.get(stream_id)?;
        if block.len == 0 {
            return None;
        }
        let mul = block.len as u64;
        let lsb = (size % mul) as usize;
        let msb = size / mul;
        Some((physical(block.logical_start + lsb) as u8, msb))
    }

    pub fn write(&self, buf: &mut BytesMut) {
        let mut i = 0usize;
        while i < 256 {
            // The reserved code is skipped by readers without consuming a
            // count slot, so probe past it when a group starts there.
            let probe = if i == RESERVED_CODE as usize { i + 1 } else { i };
            let head = self.entries[probe];
            let tmp_size = head.data_size_lsb;

            let mut j = 0u64;
            while i < 256 {
                if i == RESERVED_CODE as usize {
                    i += 1;
                    continue;
                }
                let e = self.entries[i];
                if e.flags != head.flags
                    || e.stream_id != head.stream_id
                    || e.data_size_mul != head.data_size_mul
                    || e.pts_delta != head.pts_delta
                    || e.reserved_count != head.reserved_count
                    || e.match_time_delta != head.match_time_delta
                    || e.header_idx != head.header_idx
                    || e.data_size_lsb != tmp_size + j
                {
                    break;
                }
                j += 1;
                i += 1;
            }
            let count = j;

            let mut fields = 0;
            if head.pts_delta != 0 {
                fields = 1;
            }
            if head.data_size_mul != 1 {
                fields = 2;
            }
            if head.stream_id != 0 {
                fields = 3;
            }
            if tmp_size != 0 {
                fields = 4;
            }
            if head.reserved_count != 0 {
                fields = 5;
            }
            if count != head.data_size_mul - tmp_size {
                fields = 6;
            }
            if head.match_time_delta != MATCH_UNKNOWN {
                fields = 7;
            }
            if head.header_idx != 0 {
                fields = 8;
            }

            write_var_u64(buf, head.flags);
            write_var_u64(buf, fields);
            if fields > 0 {
                write_var_i64(buf, head.pts_delta);
            }
            if fields > 1 {
                write_var_u64(buf, head.data_size_mul);
            }
            if fields > 2 {
                write_var_u64(buf, head.stream_id);
            }
            if fields > 3 {
                write_var_u64(buf, tmp_size);
            }
            if fields > 4 {
                write_var_u64(buf, head.reserved_count);
            }
            if fields > 5 {
                write_var_u64(buf, count);
            }
            if fields > 6 {
                write_var_i64(buf, head.match_time_delta);
            }
            if fields > 7 {
                write_var_u64(buf, head.header_idx);
            }
        }
    }

    pub fn read(r: &mut impl Read) -> Result<Self> {
        let mut entries = vec![FrameCode::default(); 256];
        let mut i = 0usize;
        while i < 256 {
            let tmp_flag = read_var_u64(r)?;
            let fields = read_var_u64(r)?;
            let tmp_pts = if fields > 0 { read_var_i64(r)? } else { 0 };
            let tmp_mul = if fields > 1 { read_var_u64(r)? } else { 1 };
            let tmp_stream = if fields > 2 { read_var_u64(r)? } else { 0 };
            let tmp_size = if fields > 3 { read_var_u64(r)? } else { 0 };
            let tmp_res = if fields > 4 { read_var_u64(r)? } else { 0 };
            let count = if fields > 5 {
                read_var_u64(r)?
            } else {
                tmp_mul.checked_sub(tmp_size).ok_or_else(|| {
                    CodecError::MalformedContainer(format!(
                        "frame code group size {tmp_size} exceeds multiplier {tmp_mul}"
                    ))
                })?
            };
            let tmp_match = if fields > 6 {
                read_var_i64(r)?
            } else {
                MATCH_UNKNOWN
            };
            let tmp_head = if fields > 7 { read_var_u64(r)? } else { 0 };
            for _ in 8..fields {
                read_var_u64(r)?;
            }

            if count == 0 || count > 256 {
                return Err(CodecError::MalformedContainer(format!(
                    "frame code group of {count} entries"
                )));
            }
            if tmp_mul >= MAX_SIZE_FIELD || tmp_size + count > MAX_SIZE_FIELD {
                return Err(CodecError::MalformedContainer(format!(
                    "frame code size fields out of range (mul {tmp_mul}, size {tmp_size})"
                )));
            }
            if tmp_res >= 256 {
                return Err(CodecError::MalformedContainer(format!(
                    "implausible reserved count {tmp_res}"
                )));
            }

            let mut j = 0u64;
            while j < count {
                if i >= 256 {
                    return Err(CodecError::MalformedContainer(
                        "frame code groups exceed 256 codes".to_string(),
                    ));
                }
                if i == RESERVED_CODE as usize {
                    // The startcode prefix byte is always invalid and does
                    // not consume a slot of the group.
                    entries[i] = FrameCode::default();
                    i += 1;
                    continue;
                }
                entries[i] = FrameCode {
                    flags: tmp_flag,
                    stream_id: tmp_stream,
                    data_size_mul: tmp_mul,
                    data_size_lsb: tmp_size + j,
                    pts_delta: tmp_pts,
                    reserved_count: tmp_res,
                    match_time_delta: tmp_match,
                    header_idx: tmp_head,
                };
                j += 1;
                i += 1;
            }
        }

        Ok(Self {
            entries,
            blocks: Vec::new(),
        })
    }
}
