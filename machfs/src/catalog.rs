//! Catalog keys, records, enumeration, and path reconstruction for both
//! dialects.
//!
//! HFS keys carry MacRoman Pascal names and byte-sized fields; HFS+
//! keys carry UTF-16BE names. Records are file, folder, or thread; a
//! thread record is the inverse entry keyed by a child CNID that names
//! its parent, which is what upward path reconstruction walks.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::cmp::Ordering;
use std::io::{Cursor, Read};

use crate::btree::{BTreeFile, LeafCursor, Visit};
use crate::error::{HfsError, Result};
use crate::macroman;
use crate::unicode;
use crate::volume::{Extent, ForkData, VolumeKind};

/// Reserved Catalog Node IDs.
pub const CNID_ROOT_PARENT: u32 = 1;
pub const CNID_ROOT_FOLDER: u32 = 2;
pub const CNID_EXTENTS_FILE: u32 = 3;
pub const CNID_CATALOG_FILE: u32 = 4;
pub const CNID_BAD_BLOCKS_FILE: u32 = 5;
pub const CNID_ALLOCATION_FILE: u32 = 6;
pub const CNID_STARTUP_FILE: u32 = 7;
pub const CNID_ATTRIBUTES_FILE: u32 = 8;

/// Record discriminants (one byte on HFS, u16 on HFS+).
pub const RECORD_TYPE_FOLDER: u16 = 0x0001;
pub const RECORD_TYPE_FILE: u16 = 0x0002;
pub const RECORD_TYPE_FOLDER_THREAD: u16 = 0x0003;
pub const RECORD_TYPE_FILE_THREAD: u16 = 0x0004;

/// Name length ceilings: bytes for HFS, UTF-16 units for HFS+.
pub const HFS_NAME_MAX: usize = 31;
pub const HFS_PLUS_NAME_MAX: usize = 255;

/// Everything the catalog routines need to know about the volume.
#[derive(Debug, Clone, Copy)]
pub struct CatalogFlavor {
    pub kind: VolumeKind,
    /// HFSX: names compare binarily.
    pub case_sensitive: bool,
    pub block_size: u32,
}

/// A catalog key picked apart, name still in its on-disk encoding.
#[derive(Debug, Clone, Copy)]
pub struct ParsedKey<'a> {
    pub parent_id: u32,
    name: RawName<'a>,
}

#[derive(Debug, Clone, Copy)]
enum RawName<'a> {
    MacRoman(&'a [u8]),
    Utf16Be(&'a [u8]),
}

impl<'a> ParsedKey<'a> {
    /// Parse key content (the key-length prefix already stripped).
    pub fn parse(kind: VolumeKind, key: &'a [u8]) -> Option<ParsedKey<'a>> {
        match kind {
            VolumeKind::Hfs => {
                // reserved byte, parent CNID, Pascal name
                if key.len() < 6 {
                    return None;
                }
                let parent_id = BigEndian::read_u32(&key[1..5]);
                let len = key[5] as usize;
                let name = key.get(6..6 + len)?;
                Some(ParsedKey { parent_id, name: RawName::MacRoman(name) })
            }
            VolumeKind::HfsPlus => {
                if key.len() < 6 {
                    return None;
                }
                let parent_id = BigEndian::read_u32(&key[0..4]);
                let len = BigEndian::read_u16(&key[4..6]) as usize;
                let name = key.get(6..6 + len * 2)?;
                Some(ParsedKey { parent_id, name: RawName::Utf16Be(name) })
            }
        }
    }

    pub fn name_is_empty(&self) -> bool {
        match self.name {
            RawName::MacRoman(bytes) => bytes.is_empty(),
            RawName::Utf16Be(bytes) => bytes.is_empty(),
        }
    }

    /// The name as decomposed UTF-16 units.
    pub fn name_units(&self) -> Vec<u16> {
        match self.name {
            RawName::MacRoman(bytes) => {
                macroman::to_units(bytes, bytes.len() * 2).unwrap_or_default()
            }
            RawName::Utf16Be(bytes) => unicode::utf16be_to_units(bytes),
        }
    }

    pub fn name_string(&self) -> String {
        unicode::units_to_string(&self.name_units())
    }
}

/// A search key plus the encoding state needed to order candidates
/// against it during descent.
#[derive(Debug, Clone)]
pub struct CatalogQuarry {
    flavor: CatalogFlavor,
    parent_id: u32,
    /// MacRoman rendering of the name (HFS ordering).
    mac_name: Vec<u8>,
    /// Decomposed UTF-16 rendering (HFS+ ordering and leaf matching).
    units: Vec<u16>,
}

impl CatalogQuarry {
    /// Quarry for a named child of `parent_id`.
    pub fn named(flavor: CatalogFlavor, parent_id: u32, name: &str) -> Result<CatalogQuarry> {
        let mac_name = macroman::from_str(name);
        let units = match &mac_name {
            Some(bytes) => macroman::to_units(bytes, HFS_PLUS_NAME_MAX)?,
            None => unicode::string_to_units(name),
        };
        match flavor.kind {
            VolumeKind::Hfs => {
                let mac = mac_name.ok_or_else(|| HfsError::NotFound(name.to_string()))?;
                if mac.len() > HFS_NAME_MAX {
                    return Err(HfsError::PathSyntax(format!(
                        "name longer than {HFS_NAME_MAX} bytes: {name:?}"
                    )));
                }
                Ok(CatalogQuarry { flavor, parent_id, mac_name: mac, units })
            }
            VolumeKind::HfsPlus => {
                if units.len() > HFS_PLUS_NAME_MAX {
                    return Err(HfsError::PathSyntax(format!(
                        "name longer than {HFS_PLUS_NAME_MAX} units: {name:?}"
                    )));
                }
                Ok(CatalogQuarry {
                    flavor,
                    parent_id,
                    mac_name: mac_name.unwrap_or_default(),
                    units,
                })
            }
        }
    }

    /// Quarry for the thread record of `cnid`: the empty name, which
    /// sorts before every named record of the same parent.
    pub fn thread(flavor: CatalogFlavor, cnid: u32) -> CatalogQuarry {
        CatalogQuarry {
            flavor,
            parent_id: cnid,
            mac_name: Vec::new(),
            units: Vec::new(),
        }
    }

    pub fn parent_id(&self) -> u32 {
        self.parent_id
    }

    /// Order a candidate key against this quarry, under the volume's
    /// native collation. Malformed candidates sort low.
    pub fn compare(&self, candidate: &[u8]) -> Ordering {
        let Some(key) = ParsedKey::parse(self.flavor.kind, candidate) else {
            return Ordering::Less;
        };
        match key.parent_id.cmp(&self.parent_id) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match key.name {
            RawName::MacRoman(bytes) => bytes.cmp(self.mac_name.as_slice()),
            RawName::Utf16Be(bytes) => {
                let units = unicode::utf16be_to_units(bytes);
                if self.flavor.case_sensitive {
                    unicode::compare_binary(&units, &self.units)
                } else {
                    unicode::compare_folded(&units, &self.units)
                }
            }
        }
    }

    /// Case-insensitive equality against a candidate key, decided at
    /// the leaf independently of the descent ordering.
    pub fn matches(&self, key: &ParsedKey) -> bool {
        if key.parent_id != self.parent_id {
            return false;
        }
        let units = key.name_units();
        if self.flavor.case_sensitive {
            unicode::compare_binary(&units, &self.units) == Ordering::Equal
        } else {
            unicode::compare_folded(&units, &self.units) == Ordering::Equal
        }
    }
}

/// Type, creator, and flags from a file's Finder info.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinderFileInfo {
    pub file_type: [u8; 4],
    pub creator: [u8; 4],
    pub flags: u16,
}

impl FinderFileInfo {
    fn parse(cursor: &mut Cursor<&[u8]>) -> Result<FinderFileInfo> {
        let mut file_type = [0u8; 4];
        cursor.read_exact(&mut file_type)?;
        let mut creator = [0u8; 4];
        cursor.read_exact(&mut creator)?;
        let flags = cursor.read_u16::<BigEndian>()?;
        // location and folder fields
        let mut rest = [0u8; 6];
        cursor.read_exact(&mut rest)?;
        Ok(FinderFileInfo { file_type, creator, flags })
    }
}

#[derive(Debug, Clone)]
pub struct FolderRecord {
    pub id: u32,
    pub valence: u32,
    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: u32,
    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
    pub finder: FinderFileInfo,
    pub data_fork: ForkData,
    pub resource_fork: ForkData,
}

#[derive(Debug, Clone)]
pub struct ThreadRecord {
    pub parent_id: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum CatalogRecord {
    Folder(FolderRecord),
    File(FileRecord),
    FolderThread(ThreadRecord),
    FileThread(ThreadRecord),
}

impl CatalogRecord {
    pub fn type_name(&self) -> &'static str {
        match self {
            CatalogRecord::Folder(_) => "folder",
            CatalogRecord::File(_) => "file",
            CatalogRecord::FolderThread(_) => "folder-thread",
            CatalogRecord::FileThread(_) => "file-thread",
        }
    }
}

/// Parse a catalog record payload.
pub fn parse_record(flavor: CatalogFlavor, payload: &[u8]) -> Result<CatalogRecord> {
    match flavor.kind {
        VolumeKind::Hfs => parse_record_hfs(payload, flavor.block_size),
        VolumeKind::HfsPlus => parse_record_hfs_plus(payload),
    }
}

fn record_error(reason: &str) -> HfsError {
    HfsError::corrupt(0, reason)
}

fn parse_record_hfs(payload: &[u8], block_size: u32) -> Result<CatalogRecord> {
    if payload.len() < 2 {
        return Err(record_error("catalog record too short"));
    }
    let record_type = payload[0] as u16;
    let mut cursor = Cursor::new(payload);
    cursor.set_position(2); // type byte plus reserved byte

    match record_type {
        RECORD_TYPE_FOLDER => {
            let _flags = cursor.read_u16::<BigEndian>()?;
            let valence = cursor.read_u16::<BigEndian>()? as u32;
            let id = cursor.read_u32::<BigEndian>()?;
            let create_date = cursor.read_u32::<BigEndian>()?;
            let modify_date = cursor.read_u32::<BigEndian>()?;
            let backup_date = cursor.read_u32::<BigEndian>()?;
            Ok(CatalogRecord::Folder(FolderRecord {
                id,
                valence,
                create_date,
                modify_date,
                backup_date,
            }))
        }
        RECORD_TYPE_FILE => {
            let _flags = cursor.read_u8()?;
            let _file_type = cursor.read_u8()?;
            let finder = FinderFileInfo::parse(&mut cursor)?;
            let id = cursor.read_u32::<BigEndian>()?;
            let _data_start_block = cursor.read_u16::<BigEndian>()?;
            let data_logical = cursor.read_u32::<BigEndian>()?;
            let data_physical = cursor.read_u32::<BigEndian>()?;
            let _rsrc_start_block = cursor.read_u16::<BigEndian>()?;
            let rsrc_logical = cursor.read_u32::<BigEndian>()?;
            let rsrc_physical = cursor.read_u32::<BigEndian>()?;
            let create_date = cursor.read_u32::<BigEndian>()?;
            let modify_date = cursor.read_u32::<BigEndian>()?;
            let backup_date = cursor.read_u32::<BigEndian>()?;
            let mut finder_ext = [0u8; 16];
            cursor.read_exact(&mut finder_ext)?;
            let clump = cursor.read_u16::<BigEndian>()? as u32;
            let data_extents = read_extent_record_hfs(&mut cursor)?;
            let rsrc_extents = read_extent_record_hfs(&mut cursor)?;

            let fork = |logical: u32, physical: u32, extents: Vec<Extent>| ForkData {
                logical_size: logical as u64,
                clump_size: clump,
                total_blocks: physical / block_size.max(1),
                extents,
            };

            Ok(CatalogRecord::File(FileRecord {
                id,
                create_date,
                modify_date,
                backup_date,
                finder,
                data_fork: fork(data_logical, data_physical, data_extents),
                resource_fork: fork(rsrc_logical, rsrc_physical, rsrc_extents),
            }))
        }
        RECORD_TYPE_FOLDER_THREAD | RECORD_TYPE_FILE_THREAD => {
            let mut reserved = [0u8; 8];
            cursor.read_exact(&mut reserved)?;
            let parent_id = cursor.read_u32::<BigEndian>()?;
            let len = cursor.read_u8()? as usize;
            let mut name = vec![0u8; len];
            cursor.read_exact(&mut name)?;
            let record = ThreadRecord {
                parent_id,
                name: macroman::to_string(&name),
            };
            if record_type == RECORD_TYPE_FOLDER_THREAD {
                Ok(CatalogRecord::FolderThread(record))
            } else {
                Ok(CatalogRecord::FileThread(record))
            }
        }
        other => Err(record_error(&format!("unknown catalog record type {other}"))),
    }
}

fn parse_record_hfs_plus(payload: &[u8]) -> Result<CatalogRecord> {
    if payload.len() < 2 {
        return Err(record_error("catalog record too short"));
    }
    let record_type = BigEndian::read_u16(&payload[0..2]);
    let mut cursor = Cursor::new(payload);
    cursor.set_position(2);

    match record_type {
        RECORD_TYPE_FOLDER => {
            let _flags = cursor.read_u16::<BigEndian>()?;
            let valence = cursor.read_u32::<BigEndian>()?;
            let id = cursor.read_u32::<BigEndian>()?;
            let create_date = cursor.read_u32::<BigEndian>()?;
            let modify_date = cursor.read_u32::<BigEndian>()?;
            let _attribute_mod_date = cursor.read_u32::<BigEndian>()?;
            let _access_date = cursor.read_u32::<BigEndian>()?;
            let backup_date = cursor.read_u32::<BigEndian>()?;
            Ok(CatalogRecord::Folder(FolderRecord {
                id,
                valence,
                create_date,
                modify_date,
                backup_date,
            }))
        }
        RECORD_TYPE_FILE => {
            let _flags = cursor.read_u16::<BigEndian>()?;
            let _reserved = cursor.read_u32::<BigEndian>()?;
            let id = cursor.read_u32::<BigEndian>()?;
            let create_date = cursor.read_u32::<BigEndian>()?;
            let modify_date = cursor.read_u32::<BigEndian>()?;
            let _attribute_mod_date = cursor.read_u32::<BigEndian>()?;
            let _access_date = cursor.read_u32::<BigEndian>()?;
            let backup_date = cursor.read_u32::<BigEndian>()?;
            let mut bsd_info = [0u8; 16];
            cursor.read_exact(&mut bsd_info)?;
            let finder = FinderFileInfo::parse(&mut cursor)?;
            let mut finder_ext = [0u8; 16];
            cursor.read_exact(&mut finder_ext)?;
            let _text_encoding = cursor.read_u32::<BigEndian>()?;
            let _reserved2 = cursor.read_u32::<BigEndian>()?;
            let data_fork = read_fork_data_hfs_plus(&mut cursor)?;
            let resource_fork = read_fork_data_hfs_plus(&mut cursor)?;
            Ok(CatalogRecord::File(FileRecord {
                id,
                create_date,
                modify_date,
                backup_date,
                finder,
                data_fork,
                resource_fork,
            }))
        }
        RECORD_TYPE_FOLDER_THREAD | RECORD_TYPE_FILE_THREAD => {
            let _reserved = cursor.read_u16::<BigEndian>()?;
            let parent_id = cursor.read_u32::<BigEndian>()?;
            let len = cursor.read_u16::<BigEndian>()? as usize;
            let mut name_raw = vec![0u8; len * 2];
            cursor.read_exact(&mut name_raw)?;
            let record = ThreadRecord {
                parent_id,
                name: unicode::units_to_string(&unicode::utf16be_to_units(&name_raw)),
            };
            if record_type == RECORD_TYPE_FOLDER_THREAD {
                Ok(CatalogRecord::FolderThread(record))
            } else {
                Ok(CatalogRecord::FileThread(record))
            }
        }
        other => Err(record_error(&format!("unknown catalog record type {other}"))),
    }
}

fn read_extent_record_hfs(cursor: &mut Cursor<&[u8]>) -> Result<Vec<Extent>> {
    (0..3)
        .map(|_| {
            Ok(Extent {
                start_block: cursor.read_u16::<BigEndian>()? as u32,
                block_count: cursor.read_u16::<BigEndian>()? as u32,
            })
        })
        .collect()
}

fn read_fork_data_hfs_plus(cursor: &mut Cursor<&[u8]>) -> Result<ForkData> {
    let logical_size = cursor.read_u64::<BigEndian>()?;
    let clump_size = cursor.read_u32::<BigEndian>()?;
    let total_blocks = cursor.read_u32::<BigEndian>()?;
    let extents = (0..8)
        .map(|_| {
            Ok(Extent {
                start_block: cursor.read_u32::<BigEndian>()?,
                block_count: cursor.read_u32::<BigEndian>()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ForkData {
        logical_size,
        clump_size,
        total_blocks,
        extents,
    })
}

/// What a file or folder record dehydrates to: value-typed fields only,
/// materialized when a leaf record is visited.
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub cnid: u32,
    pub parent_id: u32,
    pub name: String,
    pub kind: ItemKind,
    pub create_date: u32,
    pub modify_date: u32,
    pub backup_date: u32,
    /// Child count; zero for files.
    pub valence: u32,
    /// Zeroed for folders.
    pub finder: FinderFileInfo,
    pub data_fork: ForkData,
    pub resource_fork: ForkData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Folder,
}

impl CatalogItem {
    /// Materialize a file or folder record; threads yield `None`.
    pub fn from_record(parent_id: u32, name: String, record: &CatalogRecord) -> Option<CatalogItem> {
        match record {
            CatalogRecord::Folder(folder) => Some(CatalogItem {
                cnid: folder.id,
                parent_id,
                name,
                kind: ItemKind::Folder,
                create_date: folder.create_date,
                modify_date: folder.modify_date,
                backup_date: folder.backup_date,
                valence: folder.valence,
                finder: FinderFileInfo::default(),
                data_fork: ForkData::default(),
                resource_fork: ForkData::default(),
            }),
            CatalogRecord::File(file) => Some(CatalogItem {
                cnid: file.id,
                parent_id,
                name,
                kind: ItemKind::File,
                create_date: file.create_date,
                modify_date: file.modify_date,
                backup_date: file.backup_date,
                valence: 0,
                finder: file.finder,
                data_fork: file.data_fork.clone(),
                resource_fork: file.resource_fork.clone(),
            }),
            _ => None,
        }
    }
}

/// A leaf record handed to full-catalog walkers; threads included.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub parent_id: u32,
    pub name: String,
    pub record: CatalogRecord,
}

/// Visit every catalog leaf record in key order.
pub fn for_each_record<F>(tree: &BTreeFile, flavor: CatalogFlavor, mut visit: F) -> Result<()>
where
    F: FnMut(CatalogEntry) -> Result<Visit>,
{
    let Some(mut cursor) = LeafCursor::first(tree)? else {
        return Ok(());
    };
    loop {
        let view = cursor.view()?;
        let key = ParsedKey::parse(flavor.kind, view.key).ok_or_else(|| {
            HfsError::corrupt(cursor.node_index(), "unparseable catalog key")
        })?;
        let entry = CatalogEntry {
            parent_id: key.parent_id,
            name: key.name_string(),
            record: parse_record(flavor, view.payload)?,
        };
        if visit(entry)? == Visit::Stop {
            return Ok(());
        }
        if !cursor.advance()? {
            return Ok(());
        }
    }
}

/// Enumerate the children of `parent`: descend to the (parent, ε)
/// thread record, then take records forward while the parent matches.
pub fn list_children<F>(
    tree: &BTreeFile,
    flavor: CatalogFlavor,
    parent: u32,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(CatalogItem) -> Result<Visit>,
{
    let quarry = CatalogQuarry::thread(flavor, parent);
    let Some(hit) = tree.search(&|key| quarry.compare(key))? else {
        return Ok(());
    };
    let mut cursor = LeafCursor::from_hit(tree, hit);
    loop {
        let view = cursor.view()?;
        let Some(key) = ParsedKey::parse(flavor.kind, view.key) else {
            return Err(HfsError::corrupt(cursor.node_index(), "unparseable catalog key"));
        };
        if key.parent_id != parent {
            return Ok(());
        }
        let record = parse_record(flavor, view.payload)?;
        if let Some(item) = CatalogItem::from_record(parent, key.name_string(), &record) {
            if visit(item)? == Visit::Stop {
                return Ok(());
            }
        }
        if !cursor.advance()? {
            return Ok(());
        }
    }
}

/// Look up one child of `parent` by name. The descent runs under the
/// volume's collation; equality is the separate case-insensitive match.
pub fn lookup(
    tree: &BTreeFile,
    flavor: CatalogFlavor,
    parent: u32,
    name: &str,
) -> Result<Option<CatalogItem>> {
    let quarry = CatalogQuarry::named(flavor, parent, name)?;
    match flavor.kind {
        VolumeKind::HfsPlus => {
            let Some(hit) = tree.search(&|key| quarry.compare(key))? else {
                return Ok(None);
            };
            if !hit.exact {
                return Ok(None);
            }
            let view = tree.keyed_record(&hit.node, hit.record)?;
            let key = ParsedKey::parse(flavor.kind, view.key)
                .ok_or_else(|| HfsError::corrupt(hit.node.index, "unparseable catalog key"))?;
            let record = parse_record(flavor, view.payload)?;
            Ok(CatalogItem::from_record(parent, key.name_string(), &record))
        }
        VolumeKind::Hfs => {
            // The on-disk HFS ordering differs from plain byte order for
            // some scripts, so scan the parent's records instead of
            // trusting an exact landing.
            let mut found = None;
            list_children(tree, flavor, parent, |item| {
                let units = unicode::string_to_units(&item.name);
                if unicode::compare_folded(&units, &quarry.units) == Ordering::Equal {
                    found = Some(item);
                    Ok(Visit::Stop)
                } else {
                    Ok(Visit::Continue)
                }
            })?;
            Ok(found)
        }
    }
}

/// The thread record of `cnid`; its absence breaks the parent chain.
pub fn thread_of(tree: &BTreeFile, flavor: CatalogFlavor, cnid: u32) -> Result<ThreadRecord> {
    let quarry = CatalogQuarry::thread(flavor, cnid);
    let hit = tree
        .search(&|key| quarry.compare(key))?
        .filter(|hit| hit.exact)
        .ok_or(HfsError::BrokenChain(cnid))?;
    let view = tree.keyed_record(&hit.node, hit.record)?;
    match parse_record(flavor, view.payload)? {
        CatalogRecord::FolderThread(thread) | CatalogRecord::FileThread(thread) => Ok(thread),
        _ => Err(HfsError::BrokenChain(cnid)),
    }
}

/// Reconstruct the colon path of `cnid` by following thread records up
/// to the root.
pub fn path_of(tree: &BTreeFile, flavor: CatalogFlavor, cnid: u32) -> Result<String> {
    let mut parts = Vec::new();
    let mut current = cnid;
    while current != CNID_ROOT_PARENT {
        if parts.len() > 512 {
            // Deeper than any real volume: the chain loops.
            return Err(HfsError::BrokenChain(cnid));
        }
        let thread = thread_of(tree, flavor, current)?;
        parts.push(thread.name);
        current = thread.parent_id;
    }
    parts.reverse();
    Ok(parts.join(":"))
}
