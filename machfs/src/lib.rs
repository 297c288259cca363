//! Read-only access to classic HFS and HFS+ volumes.
//!
//! The crate probes a raw device or disk image for volume signatures
//! (including HFS+ volumes embedded in an HFS wrapper), parses the
//! volume header, loads the catalog and extents-overflow B-trees, and
//! exposes catalog enumeration, name/path lookup, path reconstruction,
//! and streaming fork readers.
//!
//! ```no_run
//! use machfs::Volume;
//!
//! let file = std::fs::File::open("classic.img")?;
//! let volume = Volume::open(file)?;
//! for item in volume.list_children(machfs::catalog::CNID_ROOT_FOLDER)? {
//!     println!("{}", item.name);
//! }
//! # Ok::<(), machfs::HfsError>(())
//! ```

pub mod btree;
pub mod catalog;
pub mod device;
pub mod error;
pub mod extents;
pub mod fork;
pub mod macroman;
pub mod path;
pub mod probe;
pub mod unicode;
pub mod volume;

use log::warn;
use std::cmp::Ordering;
use std::io::{Read, Seek};

use btree::{BTreeFile, Visit};
use catalog::{CatalogEntry, CatalogFlavor};
use device::BlockDevice;
use fork::ForkReader;
use probe::VolumeSite;
use volume::{BitmapSource, VolumeInfo, VolumeKind, HEADER_OFFSET};

pub use catalog::{CatalogItem, ItemKind};
pub use error::{HfsError, Result};
pub use extents::ForkKind;
pub use probe::preferred_site;

/// An opened volume: the narrowed device, its parsed header, and the
/// two system B-trees held in memory.
#[derive(Debug)]
pub struct Volume<R: Read + Seek> {
    device: BlockDevice<R>,
    site: VolumeSite,
    info: VolumeInfo,
    name: String,
    catalog: BTreeFile,
    extents_overflow: BTreeFile,
    /// Zero bits counted over the allocation bitmap, when it was readable.
    bitmap_free: Option<u32>,
}

impl<R: Read + Seek> Volume<R> {
    /// Probe `reader` and open the preferred volume (an embedded HFS+
    /// volume over its wrapper, HFS+ over HFS, else the first found).
    pub fn open(reader: R) -> Result<Volume<R>> {
        let mut device = BlockDevice::open(reader)?;
        let sites = probe::probe(&mut device)?;
        let site = preferred_site(&sites).ok_or(HfsError::UnknownVolume)?.clone();
        Volume::load(device, site)
    }

    /// Open the volume at a specific probed site.
    pub fn open_at(reader: R, site: &VolumeSite) -> Result<Volume<R>> {
        Volume::load(BlockDevice::open(reader)?, site.clone())
    }

    fn load(mut device: BlockDevice<R>, site: VolumeSite) -> Result<Volume<R>> {
        device.narrow(site.start, site.length);

        let header_block = device.read_at(site.header_offset, 512)?;
        let info = match site.kind {
            VolumeKind::Hfs => VolumeInfo::Hfs(volume::Mdb::parse(&header_block[..162])?),
            VolumeKind::HfsPlus => {
                VolumeInfo::HfsPlus(volume::VolumeHeader::parse(&header_block)?)
            }
        };

        // An image trimmed in front of its header block shifts every
        // allocation-block address back by the missing bytes.
        let skew = (HEADER_OFFSET - site.header_offset) as i64;
        device.set_geometry(info.block_size(), info.block_base() as i64 - skew);

        let flavor = CatalogFlavor {
            kind: info.kind(),
            case_sensitive: info.case_sensitive(),
            block_size: info.block_size(),
        };

        // The extents tree must come up first: the catalog fork may
        // itself continue into it.
        let extents_overflow = {
            let fork = info.extents_fork();
            let list = extents::resolve_extents(
                flavor.kind,
                catalog::CNID_EXTENTS_FILE,
                ForkKind::Data,
                fork,
                None,
            )?;
            let raw = ForkReader::new(&mut device, &list, fork.logical_size).read_all()?;
            BTreeFile::new(raw)?
        };

        let catalog_tree = {
            let fork = info.catalog_fork();
            let list = extents::resolve_extents(
                flavor.kind,
                catalog::CNID_CATALOG_FILE,
                ForkKind::Data,
                fork,
                Some(&extents_overflow),
            )?;
            let raw = ForkReader::new(&mut device, &list, fork.logical_size).read_all()?;
            BTreeFile::new(raw)?
        };

        let bitmap_free = read_bitmap_free(&mut device, &info, &extents_overflow);
        if let Some(free) = bitmap_free {
            if free != info.free_blocks() {
                warn!(
                    "volume header counts {} free blocks but the allocation bitmap has {} zero bits",
                    info.free_blocks(),
                    free
                );
            }
        }

        let name = match &info {
            VolumeInfo::Hfs(mdb) => mdb.volume_name.clone(),
            VolumeInfo::HfsPlus(_) => {
                match catalog::thread_of(&catalog_tree, flavor, catalog::CNID_ROOT_FOLDER) {
                    Ok(thread) => thread.name,
                    Err(err) => {
                        warn!("root folder thread record is missing: {err}");
                        String::new()
                    }
                }
            }
        };

        Ok(Volume {
            device,
            site,
            info,
            name,
            catalog: catalog_tree,
            extents_overflow,
            bitmap_free,
        })
    }

    pub fn info(&self) -> &VolumeInfo {
        &self.info
    }

    pub fn kind(&self) -> VolumeKind {
        self.info.kind()
    }

    pub fn site(&self) -> &VolumeSite {
        &self.site
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog_tree(&self) -> &BTreeFile {
        &self.catalog
    }

    pub fn extents_tree(&self) -> &BTreeFile {
        &self.extents_overflow
    }

    pub fn flavor(&self) -> CatalogFlavor {
        CatalogFlavor {
            kind: self.info.kind(),
            case_sensitive: self.info.case_sensitive(),
            block_size: self.info.block_size(),
        }
    }

    /// Header free-block count against the bitmap's zero-bit count.
    pub fn free_block_check(&self) -> Option<(u32, u32)> {
        self.bitmap_free.map(|free| (self.info.free_blocks(), free))
    }

    /// Children of a folder, in catalog key order.
    pub fn list_children(&self, parent: u32) -> Result<Vec<CatalogItem>> {
        let mut items = Vec::new();
        catalog::list_children(&self.catalog, self.flavor(), parent, |item| {
            items.push(item);
            Ok(Visit::Continue)
        })?;
        Ok(items)
    }

    /// Every file and folder on the volume, in catalog key order.
    pub fn walk<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(CatalogItem) -> Result<Visit>,
    {
        catalog::for_each_record(&self.catalog, self.flavor(), |entry| {
            match CatalogItem::from_record(entry.parent_id, entry.name, &entry.record) {
                Some(item) => visit(item),
                None => Ok(Visit::Continue),
            }
        })
    }

    /// Every catalog leaf record, threads included.
    pub fn records<F>(&self, visit: F) -> Result<()>
    where
        F: FnMut(CatalogEntry) -> Result<Visit>,
    {
        catalog::for_each_record(&self.catalog, self.flavor(), visit)
    }

    /// One child of `parent` by name; `Ok(None)` when absent.
    pub fn lookup(&self, parent: u32, name: &str) -> Result<Option<CatalogItem>> {
        catalog::lookup(&self.catalog, self.flavor(), parent, name)
    }

    /// First file anywhere on the volume whose name matches,
    /// case-insensitively.
    pub fn find_file(&self, name: &str) -> Result<Option<CatalogItem>> {
        let target = decomposed_units(name);
        let mut found = None;
        self.walk(|item| {
            if item.kind == ItemKind::File
                && unicode::compare_folded(&unicode::string_to_units(&item.name), &target)
                    == Ordering::Equal
            {
                found = Some(item);
                Ok(Visit::Stop)
            } else {
                Ok(Visit::Continue)
            }
        })?;
        Ok(found)
    }

    /// Resolve a TN1041 colon path. An absolute path's first component
    /// must name this volume; a leading colon is volume-relative.
    pub fn resolve_path(&self, text: &str) -> Result<CatalogItem> {
        let components = path::parse(text)?;
        let mut rest = components.as_slice();
        match rest.first() {
            Some(first) if first.is_empty() => rest = &rest[1..],
            Some(first) => {
                let matches = unicode::compare_folded(
                    &decomposed_units(first),
                    &decomposed_units(&self.name),
                ) == Ordering::Equal;
                if !matches {
                    return Err(HfsError::NotFound(text.to_string()));
                }
                rest = &rest[1..];
            }
            None => {}
        }

        if rest.is_empty() {
            return self.root_item();
        }

        let mut parent = catalog::CNID_ROOT_FOLDER;
        for (i, component) in rest.iter().enumerate() {
            let item = self
                .lookup(parent, component)?
                .ok_or_else(|| HfsError::NotFound(rest[..=i].join(":")))?;
            if i == rest.len() - 1 {
                return Ok(item);
            }
            match item.kind {
                ItemKind::Folder => parent = item.cnid,
                ItemKind::File => {
                    return Err(HfsError::NotFound(rest[..=i].join(":")));
                }
            }
        }
        unreachable!()
    }

    /// The root folder as a catalog item.
    pub fn root_item(&self) -> Result<CatalogItem> {
        self.lookup(catalog::CNID_ROOT_PARENT, &self.name)?
            .ok_or_else(|| HfsError::NotFound(self.name.clone()))
    }

    /// Rebuild the colon path of a CNID from thread records.
    pub fn path_of(&self, cnid: u32) -> Result<String> {
        catalog::path_of(&self.catalog, self.flavor(), cnid)
    }

    /// A streaming reader over one fork of a file, overflow extents
    /// resolved up front.
    pub fn fork_reader(&mut self, item: &CatalogItem, which: ForkKind) -> Result<ForkReader<'_, R>> {
        let fork = match which {
            ForkKind::Data => &item.data_fork,
            ForkKind::Resource => &item.resource_fork,
        };
        let list = extents::resolve_extents(
            self.info.kind(),
            item.cnid,
            which,
            fork,
            Some(&self.extents_overflow),
        )?;
        Ok(ForkReader::new(&mut self.device, &list, fork.logical_size))
    }

    /// Blocks actually covered by a fork's extents (inline + overflow).
    pub fn fork_coverage(&self, cnid: u32, which: ForkKind, fork: &volume::ForkData) -> Result<u32> {
        let list =
            extents::resolve_extents(self.info.kind(), cnid, which, fork, Some(&self.extents_overflow))?;
        Ok(list.iter().map(|e| e.block_count).sum())
    }
}

fn read_bitmap_free<R: Read + Seek>(
    device: &mut BlockDevice<R>,
    info: &VolumeInfo,
    overflow: &BTreeFile,
) -> Option<u32> {
    let wanted = (info.total_blocks() as usize).div_ceil(8);
    let bitmap = match info.bitmap_source() {
        BitmapSource::Raw { offset, bytes } => device.read_at(offset, bytes),
        BitmapSource::Fork(fork) => extents::resolve_extents(
            info.kind(),
            catalog::CNID_ALLOCATION_FILE,
            ForkKind::Data,
            &fork,
            Some(overflow),
        )
        .and_then(|list| {
            ForkReader::new(device, &list, fork.logical_size)
                .read_at(0, (wanted as u64).min(fork.logical_size))
        }),
    };
    match bitmap {
        Ok(bytes) => Some(volume::count_free_bits(&bytes, info.total_blocks())),
        Err(err) => {
            warn!("allocation bitmap is unreadable: {err}");
            None
        }
    }
}

/// A display name decomposed the way on-disk HFS+ names are.
fn decomposed_units(name: &str) -> Vec<u16> {
    match macroman::from_str(name) {
        Some(bytes) => macroman::to_units(&bytes, bytes.len() * 2).unwrap_or_default(),
        None => unicode::string_to_units(name),
    }
}
