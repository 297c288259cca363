//! Random-access reads against the backing file or block device.
//!
//! All offsets handed to a [`BlockDevice`] are relative to the volume it
//! was narrowed to; allocation-block addresses additionally go through
//! the volume's block geometry. Short reads surface as `DeviceIo`.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{HfsError, Result};
use crate::volume::Extent;

/// A seekable handle narrowed to one volume.
#[derive(Debug)]
pub struct BlockDevice<R> {
    inner: R,
    /// Byte offset of the volume within the underlying handle.
    base: u64,
    /// Byte length of the volume (bounds every read).
    len: u64,
    /// Allocation block size, once geometry is known.
    block_size: u32,
    /// Byte offset of allocation block 0, relative to `base`. Negative
    /// when the image was trimmed in front of the header block.
    block_base: i64,
}

impl<R: Read + Seek> BlockDevice<R> {
    /// Wrap a whole handle; the volume spans all of it until narrowed.
    pub fn open(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        Ok(BlockDevice {
            inner,
            base: 0,
            len,
            block_size: 512,
            block_base: 0,
        })
    }

    /// Restrict the device to the volume at `base`, `len` bytes long.
    pub fn narrow(&mut self, base: u64, len: u64) {
        self.base = base;
        self.len = len;
    }

    /// Install the volume's allocation-block geometry.
    pub fn set_geometry(&mut self, block_size: u32, block_base: i64) {
        self.block_size = block_size;
        self.block_base = block_base;
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Volume length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Volume-relative byte offset of an allocation block.
    pub fn block_offset(&self, block: u32) -> Result<u64> {
        let off = self.block_base + block as i64 * self.block_size as i64;
        u64::try_from(off).map_err(|_| HfsError::OutOfRange {
            offset: 0,
            length: self.block_size as u64,
        })
    }

    /// Read `len` bytes at a volume-relative byte offset.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(HfsError::OutOfRange { offset, length: len as u64 })?;
        if end > self.len {
            return Err(HfsError::OutOfRange { offset, length: len as u64 });
        }
        self.inner.seek(SeekFrom::Start(self.base + offset))?;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read `count` whole allocation blocks starting at `first`.
    pub fn read_blocks(&mut self, first: u32, count: u32) -> Result<Vec<u8>> {
        let offset = self.block_offset(first)?;
        let len = count as u64 * self.block_size as u64;
        self.read_at(offset, len as usize)
    }

    /// Synthesize a contiguous slice of a fork from its extent list by
    /// translating a logical byte range through the extents in order.
    pub fn read_extent_range(
        &mut self,
        extents: &[Extent],
        first_byte: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        let block_size = self.block_size as u64;
        let mut out = Vec::with_capacity(length as usize);
        let mut logical = 0u64;
        let mut pos = first_byte;
        let end = first_byte
            .checked_add(length)
            .ok_or(HfsError::OutOfRange { offset: first_byte, length })?;

        for extent in extents {
            let extent_len = extent.block_count as u64 * block_size;
            if pos < logical + extent_len && pos >= logical {
                let within = pos - logical;
                let take = (extent_len - within).min(end - pos);
                let offset = self.block_offset(extent.start_block)? + within;
                out.extend_from_slice(&self.read_at(offset, take as usize)?);
                pos += take;
                if pos == end {
                    return Ok(out);
                }
            }
            logical += extent_len;
        }

        if pos == end {
            Ok(out)
        } else {
            Err(HfsError::OutOfRange { offset: first_byte, length })
        }
    }
}
