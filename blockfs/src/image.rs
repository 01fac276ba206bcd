//! Byte level codec for persisted file system images.
//!
//! Integers are fixed width little endian. Strings and payloads are written as a
//! `u64` length followed by the raw bytes.

use crate::error::{FsError, Result};
use std::convert::TryInto;

#[derive(Default)]
pub struct ImageWriter {
    buf: Vec<u8>,
}

impl ImageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a `usize` widened to `u64`.
    pub fn put_len(&mut self, value: usize) {
        self.put_u64(value as u64);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads an image front to back. Running out of input is reported as a corrupt
/// image, never as a panic.
pub struct ImageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ImageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(FsError::CorruptImage(format!(
                "truncated {}: wanted {} bytes at offset {}, {} left",
                what,
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.bytes(1, what)?[0])
    }

    pub fn u64(&mut self, what: &str) -> Result<u64> {
        let raw = self.bytes(8, what)?;
        Ok(u64::from_le_bytes(raw.try_into().map_err(|_| {
            FsError::CorruptImage(format!("malformed {}", what))
        })?))
    }

    /// Reads a `u64` that must fit the host `usize`.
    pub fn length(&mut self, what: &str) -> Result<usize> {
        let value = self.u64(what)?;
        value
            .try_into()
            .map_err(|_| FsError::CorruptImage(format!("{} {} does not fit in memory", what, value)))
    }
}
