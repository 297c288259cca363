//! Builders for synthetic volumes and B-trees used by the scenario
//! tests. Everything is assembled in memory and read back through the
//! public API.
#![allow(dead_code)] // each test binary uses its own subset

pub const NODE_SIZE: usize = 512;

/// HFS+ catalog trees use u16 key lengths and true-length index keys.
pub const ATTRS_HFS_PLUS_CATALOG: u32 = 0x0000_0006;
/// HFS+ extents trees use u16 key lengths with fixed-size keys.
pub const ATTRS_HFS_PLUS_EXTENTS: u32 = 0x0000_0002;
/// HFS trees predate both attribute bits.
pub const ATTRS_HFS: u32 = 0;

/// Assemble one node: descriptor, record bodies, trailing offset table.
pub fn build_node(kind: i8, height: u8, flink: u32, blink: u32, records: &[Vec<u8>]) -> Vec<u8> {
    let mut node = vec![0u8; NODE_SIZE];
    node[0..4].copy_from_slice(&flink.to_be_bytes());
    node[4..8].copy_from_slice(&blink.to_be_bytes());
    node[8] = kind as u8;
    node[9] = height;
    node[10..12].copy_from_slice(&(records.len() as u16).to_be_bytes());
    let mut at = 14;
    for (i, record) in records.iter().enumerate() {
        node[at..at + record.len()].copy_from_slice(record);
        let slot = NODE_SIZE - (i + 1) * 2;
        node[slot..slot + 2].copy_from_slice(&(at as u16).to_be_bytes());
        at += record.len();
    }
    let sentinel = NODE_SIZE - (records.len() + 1) * 2;
    node[sentinel..sentinel + 2].copy_from_slice(&(at as u16).to_be_bytes());
    node
}

pub struct TreeShape {
    pub depth: u16,
    pub root: u32,
    pub leaf_records: u32,
    pub first_leaf: u32,
    pub last_leaf: u32,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub max_key_length: u16,
    pub attributes: u32,
}

/// The header node: BTHeaderRec, 128-byte user data record, map record.
pub fn header_node(shape: &TreeShape, used_nodes: &[u32]) -> Vec<u8> {
    let mut rec = vec![0u8; 106];
    rec[0..2].copy_from_slice(&shape.depth.to_be_bytes());
    rec[2..6].copy_from_slice(&shape.root.to_be_bytes());
    rec[6..10].copy_from_slice(&shape.leaf_records.to_be_bytes());
    rec[10..14].copy_from_slice(&shape.first_leaf.to_be_bytes());
    rec[14..18].copy_from_slice(&shape.last_leaf.to_be_bytes());
    rec[18..20].copy_from_slice(&(NODE_SIZE as u16).to_be_bytes());
    rec[20..22].copy_from_slice(&shape.max_key_length.to_be_bytes());
    rec[22..26].copy_from_slice(&shape.total_nodes.to_be_bytes());
    rec[26..30].copy_from_slice(&shape.free_nodes.to_be_bytes());
    rec[38..42].copy_from_slice(&shape.attributes.to_be_bytes());

    // Map record: 256 bytes in a 512-byte header node.
    let mut map = vec![0u8; NODE_SIZE - 14 - 106 - 128 - 8];
    for &node in used_nodes {
        map[(node / 8) as usize] |= 0x80 >> (node % 8);
    }

    build_node(1, 0, 0, 0, &[rec, vec![0u8; 128], map])
}

/// A keyed record with a u8 key-length prefix (HFS trees).
pub fn keyed_record_u8(key_content: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut rec = vec![key_content.len() as u8];
    rec.extend_from_slice(key_content);
    if rec.len() % 2 == 1 {
        rec.push(0);
    }
    rec.extend_from_slice(payload);
    rec
}

/// A keyed record with a u16 key-length prefix (HFS+ trees).
pub fn keyed_record_u16(key_content: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut rec = (key_content.len() as u16).to_be_bytes().to_vec();
    rec.extend_from_slice(key_content);
    if rec.len() % 2 == 1 {
        rec.push(0);
    }
    rec.extend_from_slice(payload);
    rec
}

// ── key contents ─────────────────────────────────────────────────────────

pub fn hfs_cat_key(parent: u32, name: &[u8]) -> Vec<u8> {
    let mut key = vec![0u8];
    key.extend_from_slice(&parent.to_be_bytes());
    key.push(name.len() as u8);
    key.extend_from_slice(name);
    key
}

pub fn hfsp_cat_key(parent: u32, name: &str) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut key = parent.to_be_bytes().to_vec();
    key.extend_from_slice(&(units.len() as u16).to_be_bytes());
    for unit in units {
        key.extend_from_slice(&unit.to_be_bytes());
    }
    key
}

pub fn hfsp_ext_key(fork_type: u8, cnid: u32, start_block: u32) -> Vec<u8> {
    let mut key = vec![fork_type, 0];
    key.extend_from_slice(&cnid.to_be_bytes());
    key.extend_from_slice(&start_block.to_be_bytes());
    key
}

// ── record payloads ──────────────────────────────────────────────────────

pub fn hfsp_folder_payload(cnid: u32, valence: u32) -> Vec<u8> {
    let mut payload = 1u16.to_be_bytes().to_vec(); // folder
    payload.extend_from_slice(&0u16.to_be_bytes()); // flags
    payload.extend_from_slice(&valence.to_be_bytes());
    payload.extend_from_slice(&cnid.to_be_bytes());
    payload.extend_from_slice(&[0u8; 20]); // five dates
    payload.extend_from_slice(&[0u8; 48]); // bsd + user + finder info
    payload.extend_from_slice(&[0u8; 8]); // text encoding + reserved
    payload
}

pub fn hfsp_fork_bytes(logical: u64, total_blocks: u32, extents: &[(u32, u32)]) -> Vec<u8> {
    let mut fork = logical.to_be_bytes().to_vec();
    fork.extend_from_slice(&0u32.to_be_bytes()); // clump
    fork.extend_from_slice(&total_blocks.to_be_bytes());
    for i in 0..8 {
        let (start, count) = extents.get(i).copied().unwrap_or((0, 0));
        fork.extend_from_slice(&start.to_be_bytes());
        fork.extend_from_slice(&count.to_be_bytes());
    }
    fork
}

pub fn hfsp_file_payload(cnid: u32, data_fork: &[u8], rsrc_fork: &[u8]) -> Vec<u8> {
    let mut payload = 2u16.to_be_bytes().to_vec(); // file
    payload.extend_from_slice(&0u16.to_be_bytes()); // flags
    payload.extend_from_slice(&0u32.to_be_bytes()); // reserved
    payload.extend_from_slice(&cnid.to_be_bytes());
    payload.extend_from_slice(&[0u8; 20]); // five dates
    payload.extend_from_slice(&[0u8; 16]); // bsd info
    payload.extend_from_slice(b"TEXTttxt"); // finder type + creator
    payload.extend_from_slice(&[0u8; 8]); // finder flags + location + folder
    payload.extend_from_slice(&[0u8; 16]); // extended finder info
    payload.extend_from_slice(&[0u8; 8]); // text encoding + reserved
    payload.extend_from_slice(data_fork);
    payload.extend_from_slice(rsrc_fork);
    payload
}

pub fn hfsp_thread_payload(folder: bool, parent: u32, name: &str) -> Vec<u8> {
    let record_type: u16 = if folder { 3 } else { 4 };
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut payload = record_type.to_be_bytes().to_vec();
    payload.extend_from_slice(&0u16.to_be_bytes());
    payload.extend_from_slice(&parent.to_be_bytes());
    payload.extend_from_slice(&(units.len() as u16).to_be_bytes());
    for unit in units {
        payload.extend_from_slice(&unit.to_be_bytes());
    }
    payload
}

pub fn hfs_folder_payload(cnid: u32, valence: u16) -> Vec<u8> {
    let mut payload = vec![1u8, 0]; // cdrDirRec + reserved
    payload.extend_from_slice(&0u16.to_be_bytes()); // flags
    payload.extend_from_slice(&valence.to_be_bytes());
    payload.extend_from_slice(&cnid.to_be_bytes());
    payload.extend_from_slice(&[0u8; 12]); // three dates
    payload.extend_from_slice(&[0u8; 48]); // user, finder, reserved
    payload
}

pub struct HfsForkSpec {
    pub logical: u32,
    pub physical: u32,
    pub extents: [(u16, u16); 3],
}

impl HfsForkSpec {
    pub fn empty() -> HfsForkSpec {
        HfsForkSpec { logical: 0, physical: 0, extents: [(0, 0); 3] }
    }
}

pub fn hfs_file_payload(cnid: u32, data: &HfsForkSpec, rsrc: &HfsForkSpec) -> Vec<u8> {
    let mut payload = vec![2u8, 0]; // cdrFilRec + reserved
    payload.extend_from_slice(&[0u8, 0]); // flags + type
    payload.extend_from_slice(b"TEXTttxt"); // finder type + creator
    payload.extend_from_slice(&[0u8; 8]); // finder flags + location + folder
    payload.extend_from_slice(&cnid.to_be_bytes());
    payload.extend_from_slice(&0u16.to_be_bytes()); // first data block
    payload.extend_from_slice(&data.logical.to_be_bytes());
    payload.extend_from_slice(&data.physical.to_be_bytes());
    payload.extend_from_slice(&0u16.to_be_bytes()); // first rsrc block
    payload.extend_from_slice(&rsrc.logical.to_be_bytes());
    payload.extend_from_slice(&rsrc.physical.to_be_bytes());
    payload.extend_from_slice(&[0u8; 12]); // three dates
    payload.extend_from_slice(&[0u8; 16]); // extended finder info
    payload.extend_from_slice(&0u16.to_be_bytes()); // clump
    for (start, count) in data.extents.iter().chain(rsrc.extents.iter()) {
        payload.extend_from_slice(&start.to_be_bytes());
        payload.extend_from_slice(&count.to_be_bytes());
    }
    payload.extend_from_slice(&0u32.to_be_bytes()); // reserved
    payload
}

pub fn hfs_thread_payload(folder: bool, parent: u32, name: &[u8]) -> Vec<u8> {
    let mut payload = vec![if folder { 3u8 } else { 4u8 }, 0];
    payload.extend_from_slice(&[0u8; 8]); // reserved
    payload.extend_from_slice(&parent.to_be_bytes());
    payload.push(name.len() as u8);
    payload.extend_from_slice(name);
    payload
}

/// An index record: separator key plus the child node number.
pub fn index_record_u16(key_content: &[u8], child: u32) -> Vec<u8> {
    keyed_record_u16(key_content, &child.to_be_bytes())
}

/// Concatenate nodes into one B-tree fork image.
pub fn assemble_tree(nodes: &[Vec<u8>]) -> Vec<u8> {
    nodes.concat()
}

// ── whole volumes ────────────────────────────────────────────────────────

/// Scenario S1: a 1.44 MiB HFS floppy holding only the root folder.
///
/// Geometry: 1024-byte allocation blocks starting at sector 16, bitmap
/// at sector 3. The extents tree (blocks 0–3) is empty; the catalog
/// (blocks 4–11) holds the root folder record and its thread.
pub fn hfs_empty_image() -> Vec<u8> {
    let mut image = vec![0u8; 2880 * 512];

    let mdb = &mut image[1024..1024 + 162];
    mdb[0..2].copy_from_slice(&0x4244u16.to_be_bytes()); // 'BD'
    mdb[14..16].copy_from_slice(&3u16.to_be_bytes()); // drVBMSt
    mdb[18..20].copy_from_slice(&1432u16.to_be_bytes()); // drNmAlBlks
    mdb[20..24].copy_from_slice(&1024u32.to_be_bytes()); // drAlBlkSiz
    mdb[28..30].copy_from_slice(&16u16.to_be_bytes()); // drAlBlSt
    mdb[30..34].copy_from_slice(&16u32.to_be_bytes()); // drNxtCNID
    mdb[34..36].copy_from_slice(&1420u16.to_be_bytes()); // drFreeBks
    mdb[36] = 7;
    mdb[37..44].copy_from_slice(b"TestVol");
    mdb[130..134].copy_from_slice(&4096u32.to_be_bytes()); // drXTFlSize
    mdb[134..136].copy_from_slice(&0u16.to_be_bytes());
    mdb[136..138].copy_from_slice(&4u16.to_be_bytes()); // extents: 4 blocks at 0
    mdb[146..150].copy_from_slice(&8192u32.to_be_bytes()); // drCTFlSize
    mdb[150..152].copy_from_slice(&4u16.to_be_bytes());
    mdb[152..154].copy_from_slice(&8u16.to_be_bytes()); // catalog: 8 blocks at 4

    // Allocation bitmap at sector 3: blocks 0-11 in use.
    image[3 * 512] = 0xFF;
    image[3 * 512 + 1] = 0xF0;

    let block0 = 16 * 512;

    // Extents overflow tree: header node only.
    let extents_tree = header_node(
        &TreeShape {
            depth: 0,
            root: 0,
            leaf_records: 0,
            first_leaf: 0,
            last_leaf: 0,
            total_nodes: 8,
            free_nodes: 7,
            max_key_length: 7,
            attributes: ATTRS_HFS,
        },
        &[0],
    );
    image[block0..block0 + extents_tree.len()].copy_from_slice(&extents_tree);

    // Catalog tree at block 4: root folder record plus its thread.
    let leaf = build_node(
        -1,
        1,
        0,
        0,
        &[
            keyed_record_u8(&hfs_cat_key(1, b"TestVol"), &hfs_folder_payload(2, 0)),
            keyed_record_u8(&hfs_cat_key(2, b""), &hfs_thread_payload(true, 1, b"TestVol")),
        ],
    );
    let catalog_tree = assemble_tree(&[
        header_node(
            &TreeShape {
                depth: 1,
                root: 1,
                leaf_records: 2,
                first_leaf: 1,
                last_leaf: 1,
                total_nodes: 16,
                free_nodes: 14,
                max_key_length: 37,
                attributes: ATTRS_HFS,
            },
            &[0, 1],
        ),
        leaf,
    ]);
    let catalog_at = block0 + 4 * 1024;
    image[catalog_at..catalog_at + catalog_tree.len()].copy_from_slice(&catalog_tree);

    image
}

/// A minimal HFS+ volume: 8 blocks of 4096 bytes. Root folder
/// "PlusVol" holds one file "Readme" whose data fork lives in block 5.
pub const PLUS_README_TEXT: &[u8] = b"Hello, classic Mac!";

pub fn hfs_plus_min_image() -> Vec<u8> {
    let block = 4096usize;
    let mut image = vec![0u8; 8 * block];

    {
        let vh = &mut image[1024..1536];
        vh[0..2].copy_from_slice(&0x482Bu16.to_be_bytes()); // 'H+'
        vh[2..4].copy_from_slice(&4u16.to_be_bytes()); // version
        vh[32..36].copy_from_slice(&1u32.to_be_bytes()); // file count
        vh[36..40].copy_from_slice(&1u32.to_be_bytes()); // folder count
        vh[40..44].copy_from_slice(&4096u32.to_be_bytes()); // block size
        vh[44..48].copy_from_slice(&8u32.to_be_bytes()); // total blocks
        vh[48..52].copy_from_slice(&2u32.to_be_bytes()); // free blocks
        // fork data records start at 112: allocation, extents, catalog
        let allocation = hfsp_fork_bytes(4096, 1, &[(1, 1)]);
        vh[112..192].copy_from_slice(&allocation);
        let extents = hfsp_fork_bytes(4096, 1, &[(2, 1)]);
        vh[192..272].copy_from_slice(&extents);
        let catalog = hfsp_fork_bytes(8192, 2, &[(3, 2)]);
        vh[272..352].copy_from_slice(&catalog);
    }

    // Allocation bitmap in block 1: blocks 0-5 in use, 6-7 free.
    image[block] = 0xFC;

    // Extents tree in block 2: header node only.
    let extents_tree = header_node(
        &TreeShape {
            depth: 0,
            root: 0,
            leaf_records: 0,
            first_leaf: 0,
            last_leaf: 0,
            total_nodes: 8,
            free_nodes: 7,
            max_key_length: 10,
            attributes: ATTRS_HFS_PLUS_EXTENTS,
        },
        &[0],
    );
    image[2 * block..2 * block + extents_tree.len()].copy_from_slice(&extents_tree);

    // Catalog tree in blocks 3-4.
    let data_fork = hfsp_fork_bytes(PLUS_README_TEXT.len() as u64, 1, &[(5, 1)]);
    let empty_fork = hfsp_fork_bytes(0, 0, &[]);
    let leaf = build_node(
        -1,
        1,
        0,
        0,
        &[
            keyed_record_u16(&hfsp_cat_key(1, "PlusVol"), &hfsp_folder_payload(2, 1)),
            keyed_record_u16(&hfsp_cat_key(2, ""), &hfsp_thread_payload(true, 1, "PlusVol")),
            keyed_record_u16(
                &hfsp_cat_key(2, "Readme"),
                &hfsp_file_payload(16, &data_fork, &empty_fork),
            ),
        ],
    );
    let catalog_tree = assemble_tree(&[
        header_node(
            &TreeShape {
                depth: 1,
                root: 1,
                leaf_records: 3,
                first_leaf: 1,
                last_leaf: 1,
                total_nodes: 16,
                free_nodes: 14,
                max_key_length: 516,
                attributes: ATTRS_HFS_PLUS_CATALOG,
            },
            &[0, 1],
        ),
        leaf,
    ]);
    image[3 * block..3 * block + catalog_tree.len()].copy_from_slice(&catalog_tree);

    // File content in block 5.
    image[5 * block..5 * block + PLUS_README_TEXT.len()].copy_from_slice(PLUS_README_TEXT);

    image
}

/// An HFS wrapper whose embedded extent carries the minimal HFS+
/// volume at byte 16384.
pub fn hfs_wrapped_plus_image() -> Vec<u8> {
    let inner = hfs_plus_min_image();
    let mut image = vec![0u8; 16384 + inner.len()];

    let mdb = &mut image[1024..1024 + 162];
    mdb[0..2].copy_from_slice(&0x4244u16.to_be_bytes());
    mdb[14..16].copy_from_slice(&3u16.to_be_bytes());
    mdb[18..20].copy_from_slice(&10u16.to_be_bytes()); // drNmAlBlks
    mdb[20..24].copy_from_slice(&4096u32.to_be_bytes()); // drAlBlkSiz
    mdb[28..30].copy_from_slice(&16u16.to_be_bytes()); // drAlBlSt
    mdb[36] = 7;
    mdb[37..44].copy_from_slice(b"Wrapper");
    mdb[124..126].copy_from_slice(&0x482Bu16.to_be_bytes()); // drEmbedSigWord
    mdb[126..128].copy_from_slice(&2u16.to_be_bytes()); // embed start block
    mdb[128..130].copy_from_slice(&8u16.to_be_bytes()); // embed block count

    image[16384..].copy_from_slice(&inner);
    image
}
