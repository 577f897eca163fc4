//! Frame flags.
//!
//! Each frame-code table entry carries a set of these; `FLAG_CODED` means the
//! frame header itself carries a varint that is XORed into the entry's flags.

/// Frame is a keyframe.
pub const FLAG_KEY: u64 = 1 << 0;

/// End-of-relevance: the stream ends with this (dataless) frame.
pub const FLAG_EOR: u64 = 1 << 1;

/// The pts is coded explicitly in the frame header (lsb form).
pub const FLAG_CODED_PTS: u64 = 1 << 3;

/// The stream id is coded explicitly in the frame header.
pub const FLAG_STREAM_ID: u64 = 1 << 4;

/// The data size has a coded msb part (`size = lsb + mul * msb`).
pub const FLAG_SIZE_MSB: u64 = 1 << 5;

/// The frame header carries a 4-byte checksum.
pub const FLAG_CHECKSUM: u64 = 1 << 6;

/// The reserved-value count is coded in the frame header.
pub const FLAG_RESERVED: u64 = 1 << 7;

/// The frame carries side/meta data items before its payload.
pub const FLAG_SM_DATA: u64 = 1 << 8;

/// The elision header index is coded in the frame header.
pub const FLAG_HEADER_IDX: u64 = 1 << 10;

/// The match-time delta is coded in the frame header.
pub const FLAG_MATCH_TIME: u64 = 1 << 11;

/// The frame header carries coded flags that are XORed into these.
pub const FLAG_CODED: u64 = 1 << 12;

/// The frame code is invalid; encountering it is a parse error.
pub const FLAG_INVALID: u64 = 1 << 13;

/// True if `flags` contains every bit of `mask`.
pub fn has(flags: u64, mask: u64) -> bool {
    flags & mask == mask
}

/// Short human-readable rendering, e.g. `KEY|SIZE_MSB`.
pub fn describe(flags: u64) -> String {
    const NAMES: [(u64, &str); 12] = [
        (FLAG_KEY, "KEY"),
        (FLAG_EOR, "EOR"),
        (FLAG_CODED_PTS, "CODED_PTS"),
        (FLAG_STREAM_ID, "STREAM_ID"),
        (FLAG_SIZE_MSB, "SIZE_MSB"),
        (FLAG_CHECKSUM, "CHECKSUM"),
        (FLAG_RESERVED, "RESERVED"),
        (FLAG_SM_DATA, "SM_DATA"),
        (FLAG_HEADER_IDX, "HEADER_IDX"),
        (FLAG_MATCH_TIME, "MATCH_TIME"),
        (FLAG_CODED, "CODED"),
        (FLAG_INVALID, "INVALID"),
    ];

    let parts: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join("|")
    }
}
