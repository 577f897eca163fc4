//! CRC32 over the container's generator polynomial.
//!
//! The container uses generator `0x104C11DB7`, MSB first, initial value 0 and
//! no final XOR. This is not the reflected IEEE CRC32 most tools compute, so
//! the table is built here rather than borrowed from a general-purpose
//! implementation.

const POLY: u32 = 0x04C1_1DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Running CRC32 state, reset per logical packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32 {
    value: u32,
}

impl Crc32 {
    pub fn new() -> Self {
        Self { value: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let idx = ((self.value >> 24) ^ u32::from(byte)) & 0xFF;
            self.value = (self.value << 8) ^ TABLE[idx as usize];
        }
    }

    pub fn finish(self) -> u32 {
        self.value
    }
}

/// One-shot checksum of a byte slice.
pub fn checksum(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finish()
}
