//! Raw pixel layouts understood by the exchange.
//!
//! A format maps between the alpha-carrying in-memory image and the packed
//! byte layout a transcoder expects for raw video, and names that layout with
//! the fourcc written into the stream header.

use bytes::{BufMut, Bytes, BytesMut};
use image::RgbaImage;

use crate::error::{ExchangeError, Result};

/// A raw video pixel layout.
pub trait ImageFormat: Send + Sync {
    /// The stream-header fourcc for this layout.
    fn fourcc(&self) -> [u8; 4];

    fn bytes_per_pixel(&self) -> usize;

    /// Pack an image into this layout.
    fn encode(&self, image: &RgbaImage) -> Bytes;

    /// Unpack a frame payload. The payload length must be exactly
    /// `width * height * bytes_per_pixel`.
    fn decode(&self, data: &[u8], width: u32, height: u32) -> Result<RgbaImage>;
}

fn check_len(data: &[u8], width: u32, height: u32, bpp: usize) -> Result<()> {
    let expected = width as usize * height as usize * bpp;
    if data.len() != expected {
        return Err(ExchangeError::BadFrame(format!(
            "payload is {} bytes, expected {expected} for {width}x{height}",
            data.len()
        )));
    }
    Ok(())
}

/// Packed 24-bit BGR, no alpha. The default layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bgr24;

impl ImageFormat for Bgr24 {
    fn fourcc(&self) -> [u8; 4] {
        [24, b'B', b'G', b'R']
    }

    fn bytes_per_pixel(&self) -> usize {
        3
    }

    fn encode(&self, image: &RgbaImage) -> Bytes {
        let mut buf = BytesMut::with_capacity(image.as_raw().len() / 4 * 3);
        for px in image.as_raw().chunks_exact(4) {
            buf.put_slice(&[px[2], px[1], px[0]]);
        }
        buf.freeze()
    }

    fn decode(&self, data: &[u8], width: u32, height: u32) -> Result<RgbaImage> {
        check_len(data, width, height, 3)?;
        let mut raw = Vec::with_capacity(data.len() / 3 * 4);
        for px in data.chunks_exact(3) {
            raw.extend_from_slice(&[px[2], px[1], px[0], 0xFF]);
        }
        RgbaImage::from_raw(width, height, raw)
            .ok_or_else(|| ExchangeError::BadFrame("image buffer size mismatch".to_string()))
    }
}

/// Packed 32-bit ABGR, alpha preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Abgr32;

impl ImageFormat for Abgr32 {
    fn fourcc(&self) -> [u8; 4] {
        [32, b'B', b'G', b'R']
    }

    fn bytes_per_pixel(&self) -> usize {
        4
    }

    fn encode(&self, image: &RgbaImage) -> Bytes {
        let mut buf = BytesMut::with_capacity(image.as_raw().len());
        for px in image.as_raw().chunks_exact(4) {
            buf.put_slice(&[px[3], px[2], px[1], px[0]]);
        }
        buf.freeze()
    }

    fn decode(&self, data: &[u8], width: u32, height: u32) -> Result<RgbaImage> {
        check_len(data, width, height, 4)?;
        let mut raw = Vec::with_capacity(data.len());
        for px in data.chunks_exact(4) {
            raw.extend_from_slice(&[px[3], px[2], px[1], px[0]]);
        }
        RgbaImage::from_raw(width, height, raw)
            .ok_or_else(|| ExchangeError::BadFrame("image buffer size mismatch".to_string()))
    }
}
