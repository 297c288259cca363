//! Volume header models: the HFS Master Directory Block and the HFS+
//! volume header, plus the unified geometry view the rest of the crate
//! works against.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::{HfsError, Result};
use crate::macroman;

/// Both headers live 1024 bytes into the volume.
pub const HEADER_OFFSET: u64 = 1024;

/// HFS signature: "BD"
pub const HFS_SIGNATURE: u16 = 0x4244;
/// HFS+ signature: "H+"
pub const HFS_PLUS_SIGNATURE: u16 = 0x482B;
/// HFSX signature: "HX" (case-sensitive variant, accepted)
pub const HFSX_SIGNATURE: u16 = 0x4858;

pub const HFS_PLUS_VERSION: u16 = 4;
pub const HFSX_VERSION: u16 = 5;

/// A contiguous run of allocation blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extent {
    pub start_block: u32,
    pub block_count: u32,
}

/// One fork's size and initial extents (3 for HFS, 8 for HFS+).
#[derive(Debug, Clone, Default)]
pub struct ForkData {
    pub logical_size: u64,
    pub clump_size: u32,
    pub total_blocks: u32,
    pub extents: Vec<Extent>,
}

impl ForkData {
    /// Blocks covered by the initial extents alone.
    pub fn inline_blocks(&self) -> u32 {
        self.extents.iter().map(|e| e.block_count).sum()
    }

    /// Physical size in bytes for a given block size.
    pub fn physical_size(&self, block_size: u32) -> u64 {
        self.total_blocks as u64 * block_size as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Hfs,
    HfsPlus,
}

impl std::fmt::Display for VolumeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeKind::Hfs => write!(f, "HFS"),
            VolumeKind::HfsPlus => write!(f, "HFS+"),
        }
    }
}

fn read_extent_u16<R: Read>(reader: &mut R) -> Result<Extent> {
    Ok(Extent {
        start_block: reader.read_u16::<BigEndian>()? as u32,
        block_count: reader.read_u16::<BigEndian>()? as u32,
    })
}

fn read_extent_u32<R: Read>(reader: &mut R) -> Result<Extent> {
    Ok(Extent {
        start_block: reader.read_u32::<BigEndian>()?,
        block_count: reader.read_u32::<BigEndian>()?,
    })
}

fn read_extent_record_u16<R: Read>(reader: &mut R) -> Result<Vec<Extent>> {
    (0..3).map(|_| read_extent_u16(reader)).collect()
}

fn read_fork_data<R: Read>(reader: &mut R) -> Result<ForkData> {
    let logical_size = reader.read_u64::<BigEndian>()?;
    let clump_size = reader.read_u32::<BigEndian>()?;
    let total_blocks = reader.read_u32::<BigEndian>()?;
    let extents = (0..8)
        .map(|_| read_extent_u32(reader))
        .collect::<Result<Vec<_>>>()?;
    Ok(ForkData {
        logical_size,
        clump_size,
        total_blocks,
        extents,
    })
}

/// The HFS Master Directory Block (162 bytes at offset 1024).
#[derive(Debug, Clone)]
pub struct Mdb {
    pub signature: u16,
    pub create_date: u32,
    pub modify_date: u32,
    pub attributes: u16,
    pub root_file_count: u16,
    /// First sector (512-byte units from the volume start) of the
    /// allocation bitmap.
    pub bitmap_start: u16,
    pub total_blocks: u16,
    pub block_size: u32,
    pub clump_size: u32,
    /// First sector of allocation block 0.
    pub alloc_block_start: u16,
    pub next_cnid: u32,
    pub free_blocks: u16,
    pub volume_name: String,
    pub backup_date: u32,
    pub write_count: u32,
    pub extents_clump_size: u32,
    pub catalog_clump_size: u32,
    pub root_folder_count: u16,
    pub file_count: u32,
    pub folder_count: u32,
    pub finder_info: [u32; 8],
    /// Signature of an embedded volume ('H+'/'HX'), or the obsolete
    /// drVCSize field on pre-8.1 volumes.
    pub embed_signature: u16,
    pub embed_extent: Extent,
    pub extents_file: ForkData,
    pub catalog_file: ForkData,
}

impl Mdb {
    /// Parse the MDB from its raw 162-byte block.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let signature = cursor.read_u16::<BigEndian>()?;
        if signature != HFS_SIGNATURE {
            return Err(HfsError::UnknownVolume);
        }
        let create_date = cursor.read_u32::<BigEndian>()?;
        let modify_date = cursor.read_u32::<BigEndian>()?;
        let attributes = cursor.read_u16::<BigEndian>()?;
        let root_file_count = cursor.read_u16::<BigEndian>()?;
        let bitmap_start = cursor.read_u16::<BigEndian>()?;
        let _alloc_ptr = cursor.read_u16::<BigEndian>()?;
        let total_blocks = cursor.read_u16::<BigEndian>()?;
        let block_size = cursor.read_u32::<BigEndian>()?;
        let clump_size = cursor.read_u32::<BigEndian>()?;
        let alloc_block_start = cursor.read_u16::<BigEndian>()?;
        let next_cnid = cursor.read_u32::<BigEndian>()?;
        let free_blocks = cursor.read_u16::<BigEndian>()?;

        let mut name_raw = [0u8; 28];
        cursor.read_exact(&mut name_raw)?;
        let name_len = (name_raw[0] as usize).min(27);
        let volume_name = macroman::to_string(&name_raw[1..1 + name_len]);

        let backup_date = cursor.read_u32::<BigEndian>()?;
        let _backup_seq = cursor.read_u16::<BigEndian>()?;
        let write_count = cursor.read_u32::<BigEndian>()?;
        let extents_clump_size = cursor.read_u32::<BigEndian>()?;
        let catalog_clump_size = cursor.read_u32::<BigEndian>()?;
        let root_folder_count = cursor.read_u16::<BigEndian>()?;
        let file_count = cursor.read_u32::<BigEndian>()?;
        let folder_count = cursor.read_u32::<BigEndian>()?;

        let mut finder_info = [0u32; 8];
        for fi in &mut finder_info {
            *fi = cursor.read_u32::<BigEndian>()?;
        }

        let embed_signature = cursor.read_u16::<BigEndian>()?;
        let embed_extent = read_extent_u16(&mut cursor)?;

        if block_size == 0 || block_size % 512 != 0 {
            return Err(HfsError::UnknownVolume);
        }

        let extents_size = cursor.read_u32::<BigEndian>()?;
        let extents_rec = read_extent_record_u16(&mut cursor)?;
        let catalog_size = cursor.read_u32::<BigEndian>()?;
        let catalog_rec = read_extent_record_u16(&mut cursor)?;

        let btree_fork = |size: u32, clump: u32, extents: Vec<Extent>| ForkData {
            logical_size: size as u64,
            clump_size: clump,
            total_blocks: size.div_ceil(block_size),
            extents,
        };

        Ok(Mdb {
            signature,
            create_date,
            modify_date,
            attributes,
            root_file_count,
            bitmap_start,
            total_blocks,
            block_size,
            clump_size,
            alloc_block_start,
            next_cnid,
            free_blocks,
            volume_name,
            backup_date,
            write_count,
            extents_clump_size,
            catalog_clump_size,
            root_folder_count,
            file_count,
            folder_count,
            finder_info,
            embed_signature,
            embed_extent,
            extents_file: btree_fork(extents_size, extents_clump_size, extents_rec),
            catalog_file: btree_fork(catalog_size, catalog_clump_size, catalog_rec),
        })
    }

    /// Does this MDB wrap an embedded HFS+ volume?
    pub fn embeds_hfs_plus(&self) -> bool {
        matches!(self.embed_signature, HFS_PLUS_SIGNATURE | HFSX_SIGNATURE)
            && self.embed_extent.block_count > 0
    }

    /// Byte offset of the embedded volume, relative to the wrapper start.
    pub fn embedded_offset(&self) -> u64 {
        self.alloc_block_start as u64 * 512
            + self.embed_extent.start_block as u64 * self.block_size as u64
    }

    /// Byte length of the embedded volume.
    pub fn embedded_length(&self) -> u64 {
        self.embed_extent.block_count as u64 * self.block_size as u64
    }

    /// Total byte length of the volume (blocks plus the leading sectors
    /// and the trailing alternate MDB area).
    pub fn byte_length(&self) -> u64 {
        self.alloc_block_start as u64 * 512
            + self.total_blocks as u64 * self.block_size as u64
            + 1024
    }
}

/// The HFS+ volume header (512 bytes at offset 1024).
#[derive(Debug, Clone)]
pub struct VolumeHeader {
    pub signature: u16,
    pub version: u16,
    pub attributes: u32,
    pub last_mounted_version: u32,
    pub journal_info_block: u32,
    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
    pub checked_date: u32,
    pub file_count: u32,
    pub folder_count: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub next_allocation: u32,
    pub rsrc_clump_size: u32,
    pub data_clump_size: u32,
    pub next_catalog_id: u32,
    pub write_count: u32,
    pub encoding_bitmap: u64,
    pub finder_info: [u32; 8],
    pub allocation_file: ForkData,
    pub extents_file: ForkData,
    pub catalog_file: ForkData,
    pub attributes_file: ForkData,
    pub startup_file: ForkData,
    /// true when the HFSX signature was present
    pub is_hfsx: bool,
}

impl VolumeHeader {
    /// Parse the volume header from its raw 512-byte block.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let signature = cursor.read_u16::<BigEndian>()?;
        let is_hfsx = match signature {
            HFS_PLUS_SIGNATURE => false,
            HFSX_SIGNATURE => true,
            _ => return Err(HfsError::UnknownVolume),
        };

        let version = cursor.read_u16::<BigEndian>()?;
        match version {
            HFS_PLUS_VERSION | HFSX_VERSION => {}
            _ => return Err(HfsError::UnsupportedVersion(version)),
        }

        let attributes = cursor.read_u32::<BigEndian>()?;
        let last_mounted_version = cursor.read_u32::<BigEndian>()?;
        let journal_info_block = cursor.read_u32::<BigEndian>()?;
        let create_date = cursor.read_u32::<BigEndian>()?;
        let modify_date = cursor.read_u32::<BigEndian>()?;
        let backup_date = cursor.read_u32::<BigEndian>()?;
        let checked_date = cursor.read_u32::<BigEndian>()?;
        let file_count = cursor.read_u32::<BigEndian>()?;
        let folder_count = cursor.read_u32::<BigEndian>()?;
        let block_size = cursor.read_u32::<BigEndian>()?;
        let total_blocks = cursor.read_u32::<BigEndian>()?;
        let free_blocks = cursor.read_u32::<BigEndian>()?;
        let next_allocation = cursor.read_u32::<BigEndian>()?;
        let rsrc_clump_size = cursor.read_u32::<BigEndian>()?;
        let data_clump_size = cursor.read_u32::<BigEndian>()?;
        let next_catalog_id = cursor.read_u32::<BigEndian>()?;
        let write_count = cursor.read_u32::<BigEndian>()?;
        let encoding_bitmap = cursor.read_u64::<BigEndian>()?;

        let mut finder_info = [0u32; 8];
        for fi in &mut finder_info {
            *fi = cursor.read_u32::<BigEndian>()?;
        }

        if block_size == 0 || block_size % 512 != 0 {
            return Err(HfsError::UnknownVolume);
        }

        Ok(VolumeHeader {
            signature,
            version,
            attributes,
            last_mounted_version,
            journal_info_block,
            create_date,
            modify_date,
            backup_date,
            checked_date,
            file_count,
            folder_count,
            block_size,
            total_blocks,
            free_blocks,
            next_allocation,
            rsrc_clump_size,
            data_clump_size,
            next_catalog_id,
            write_count,
            encoding_bitmap,
            finder_info,
            allocation_file: read_fork_data(&mut cursor)?,
            extents_file: read_fork_data(&mut cursor)?,
            catalog_file: read_fork_data(&mut cursor)?,
            attributes_file: read_fork_data(&mut cursor)?,
            startup_file: read_fork_data(&mut cursor)?,
            is_hfsx,
        })
    }
}

/// Where the allocation bitmap lives.
pub enum BitmapSource {
    /// HFS: raw sectors starting at a fixed position.
    Raw { offset: u64, bytes: usize },
    /// HFS+: the allocation file's data fork.
    Fork(ForkData),
}

/// Parsed header of either dialect, plus the kind-agnostic accessors the
/// rest of the crate needs.
#[derive(Debug, Clone)]
pub enum VolumeInfo {
    Hfs(Mdb),
    HfsPlus(VolumeHeader),
}

impl VolumeInfo {
    pub fn kind(&self) -> VolumeKind {
        match self {
            VolumeInfo::Hfs(_) => VolumeKind::Hfs,
            VolumeInfo::HfsPlus(_) => VolumeKind::HfsPlus,
        }
    }

    /// Names compare binarily on HFSX volumes.
    pub fn case_sensitive(&self) -> bool {
        matches!(self, VolumeInfo::HfsPlus(vh) if vh.is_hfsx)
    }

    pub fn block_size(&self) -> u32 {
        match self {
            VolumeInfo::Hfs(mdb) => mdb.block_size,
            VolumeInfo::HfsPlus(vh) => vh.block_size,
        }
    }

    /// Byte offset of allocation block 0 from the volume start.
    pub fn block_base(&self) -> u64 {
        match self {
            VolumeInfo::Hfs(mdb) => mdb.alloc_block_start as u64 * 512,
            VolumeInfo::HfsPlus(_) => 0,
        }
    }

    pub fn total_blocks(&self) -> u32 {
        match self {
            VolumeInfo::Hfs(mdb) => mdb.total_blocks as u32,
            VolumeInfo::HfsPlus(vh) => vh.total_blocks,
        }
    }

    pub fn free_blocks(&self) -> u32 {
        match self {
            VolumeInfo::Hfs(mdb) => mdb.free_blocks as u32,
            VolumeInfo::HfsPlus(vh) => vh.free_blocks,
        }
    }

    pub fn file_count(&self) -> u32 {
        match self {
            VolumeInfo::Hfs(mdb) => mdb.file_count,
            VolumeInfo::HfsPlus(vh) => vh.file_count,
        }
    }

    pub fn folder_count(&self) -> u32 {
        match self {
            VolumeInfo::Hfs(mdb) => mdb.folder_count,
            VolumeInfo::HfsPlus(vh) => vh.folder_count,
        }
    }

    pub fn catalog_fork(&self) -> &ForkData {
        match self {
            VolumeInfo::Hfs(mdb) => &mdb.catalog_file,
            VolumeInfo::HfsPlus(vh) => &vh.catalog_file,
        }
    }

    pub fn extents_fork(&self) -> &ForkData {
        match self {
            VolumeInfo::Hfs(mdb) => &mdb.extents_file,
            VolumeInfo::HfsPlus(vh) => &vh.extents_file,
        }
    }

    pub fn bitmap_source(&self) -> BitmapSource {
        match self {
            VolumeInfo::Hfs(mdb) => BitmapSource::Raw {
                offset: mdb.bitmap_start as u64 * 512,
                bytes: (mdb.total_blocks as usize).div_ceil(8),
            },
            VolumeInfo::HfsPlus(vh) => BitmapSource::Fork(vh.allocation_file.clone()),
        }
    }
}

/// Count the zero bits among the first `total_bits` of a bitmap.
/// Free blocks are the zero bits; bit 0 is the high bit of byte 0.
pub fn count_free_bits(bitmap: &[u8], total_bits: u32) -> u32 {
    let mut used = 0u32;
    let whole = (total_bits / 8) as usize;
    for &byte in bitmap.iter().take(whole) {
        used += byte.count_ones();
    }
    let stray = total_bits % 8;
    if stray > 0 {
        if let Some(&byte) = bitmap.get(whole) {
            used += (byte >> (8 - stray)).count_ones();
        }
    }
    total_bits - used.min(total_bits)
}
