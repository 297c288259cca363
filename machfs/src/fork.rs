//! A logical byte stream over one fork's scattered allocation blocks.

use std::io::{Read, Seek, SeekFrom};

use crate::device::BlockDevice;
use crate::error::{HfsError, Result};
use crate::volume::Extent;

struct Span {
    logical: u64,
    block: u32,
    len: u64,
}

/// Presents a fork as a contiguous, bounds-checked byte range and as a
/// `Read + Seek` stream. The extent list must already cover the fork
/// (see `extents::resolve_extents`); finding the extent for an offset is
/// then a binary search.
pub struct ForkReader<'a, R: Read + Seek> {
    device: &'a mut BlockDevice<R>,
    logical_size: u64,
    spans: Vec<Span>,
    position: u64,
}

impl<'a, R: Read + Seek> ForkReader<'a, R> {
    pub fn new(
        device: &'a mut BlockDevice<R>,
        extents: &[Extent],
        logical_size: u64,
    ) -> ForkReader<'a, R> {
        let block_size = device.block_size() as u64;
        let mut spans = Vec::with_capacity(extents.len());
        let mut logical = 0u64;
        for extent in extents {
            if extent.block_count == 0 {
                continue;
            }
            let len = extent.block_count as u64 * block_size;
            spans.push(Span { logical, block: extent.start_block, len });
            logical += len;
        }
        ForkReader {
            device,
            logical_size,
            spans,
            position: 0,
        }
    }

    pub fn logical_size(&self) -> u64 {
        self.logical_size
    }

    /// Read an exact byte range. Reads past `logical_size` are refused.
    pub fn read_at(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(length)
            .ok_or(HfsError::OutOfRange { offset, length })?;
        if end > self.logical_size {
            return Err(HfsError::OutOfRange { offset, length });
        }

        let mut out = Vec::with_capacity(length as usize);
        let mut pos = offset;
        while pos < end {
            let at = self
                .spans
                .partition_point(|span| span.logical <= pos)
                .checked_sub(1)
                .ok_or(HfsError::OutOfRange { offset, length })?;
            let span = &self.spans[at];
            let within = pos - span.logical;
            if within >= span.len {
                return Err(HfsError::OutOfRange { offset, length });
            }
            let take = (span.len - within).min(end - pos);
            let device_offset = self.device.block_offset(span.block)? + within;
            out.extend_from_slice(&self.device.read_at(device_offset, take as usize)?);
            pos += take;
        }
        Ok(out)
    }

    /// The whole fork.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.read_at(0, self.logical_size)
    }
}

impl<R: Read + Seek> Read for ForkReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.position >= self.logical_size {
            return Ok(0);
        }
        let take = (buf.len() as u64).min(self.logical_size - self.position);
        let bytes = self
            .read_at(self.position, take)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, e.to_string()))?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        self.position += bytes.len() as u64;
        Ok(bytes.len())
    }
}

impl<R: Read + Seek> Seek for ForkReader<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.position as i64 + delta,
            SeekFrom::End(delta) => self.logical_size as i64 + delta,
        };
        if target < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of fork",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}
