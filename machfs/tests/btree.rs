//! B-tree descent, directory enumeration, and extents-overflow
//! behavior against hand-assembled trees.

mod common;

use common::*;
use machfs::btree::{BTreeFile, NodeKind, Visit};
use machfs::catalog::{self, CatalogFlavor, CatalogQuarry, ItemKind};
use machfs::device::BlockDevice;
use machfs::error::HfsError;
use machfs::extents::{self, ForkKind};
use machfs::fork::ForkReader;
use machfs::volume::{Extent, ForkData, VolumeKind};
use std::cmp::Ordering;
use std::io::Cursor;

fn plus_flavor() -> CatalogFlavor {
    CatalogFlavor {
        kind: VolumeKind::HfsPlus,
        case_sensitive: false,
        block_size: 4096,
    }
}

/// Root index node over two leaves: (2,A) (2,B) (2,C) | (2,D) (2,E).
fn two_leaf_catalog() -> BTreeFile {
    let header = header_node(
        &TreeShape {
            depth: 2,
            root: 1,
            leaf_records: 5,
            first_leaf: 2,
            last_leaf: 3,
            total_nodes: 4,
            free_nodes: 0,
            max_key_length: 516,
            attributes: ATTRS_HFS_PLUS_CATALOG,
        },
        &[0, 1, 2, 3],
    );
    let index = build_node(
        0,
        2,
        0,
        0,
        &[
            index_record_u16(&hfsp_cat_key(2, "A"), 2),
            index_record_u16(&hfsp_cat_key(2, "D"), 3),
        ],
    );
    let folder = |cnid| hfsp_folder_payload(cnid, 0);
    let leaf2 = build_node(
        -1,
        1,
        3,
        0,
        &[
            keyed_record_u16(&hfsp_cat_key(2, "A"), &folder(20)),
            keyed_record_u16(&hfsp_cat_key(2, "B"), &folder(21)),
            keyed_record_u16(&hfsp_cat_key(2, "C"), &folder(22)),
        ],
    );
    let leaf3 = build_node(
        -1,
        1,
        0,
        2,
        &[
            keyed_record_u16(&hfsp_cat_key(2, "D"), &folder(23)),
            keyed_record_u16(&hfsp_cat_key(2, "E"), &folder(24)),
        ],
    );
    BTreeFile::new(assemble_tree(&[header, index, leaf2, leaf3])).unwrap()
}

#[test]
fn descent_finds_exact_key() {
    let tree = two_leaf_catalog();
    let quarry = CatalogQuarry::named(plus_flavor(), 2, "C").unwrap();
    let hit = tree.search(&|key| quarry.compare(key)).unwrap().unwrap();
    assert_eq!(hit.node.index, 2);
    assert_eq!(hit.record, 2);
    assert!(hit.exact);
}

#[test]
fn descent_lands_on_next_key_when_absent() {
    let tree = two_leaf_catalog();
    let quarry = CatalogQuarry::named(plus_flavor(), 2, "CA").unwrap();
    let hit = tree.search(&|key| quarry.compare(key)).unwrap().unwrap();
    // "CA" sorts after "C"; the next key is "D" at the start of leaf 3.
    assert_eq!(hit.node.index, 3);
    assert_eq!(hit.record, 0);
    assert!(!hit.exact);
    let landing = tree.keyed_record(&hit.node, hit.record).unwrap();
    assert_eq!(quarry.compare(landing.key), Ordering::Greater);
}

#[test]
fn descent_past_every_key_is_none() {
    let tree = two_leaf_catalog();
    let quarry = CatalogQuarry::named(plus_flavor(), 2, "Z").unwrap();
    assert!(tree.search(&|key| quarry.compare(key)).unwrap().is_none());
}

#[test]
fn breadth_first_emits_levels_in_order() {
    let tree = two_leaf_catalog();
    let mut order = Vec::new();
    tree.walk_breadth_first(|_, node| {
        order.push((node.index, node.desc.kind));
        Ok(Visit::Continue)
    })
    .unwrap();
    assert_eq!(
        order,
        vec![(1, NodeKind::Index), (2, NodeKind::Leaf), (3, NodeKind::Leaf)]
    );
}

#[test]
fn leaf_walk_visits_every_leaf_once() {
    let tree = two_leaf_catalog();
    let mut records = 0;
    let visited = tree
        .walk_leaf_nodes(|_, node| {
            records += node.record_count();
            Ok(Visit::Continue)
        })
        .unwrap();
    assert_eq!(visited, 2);
    assert_eq!(records as u32, tree.header.leaf_records);
}

/// Catalog with a folder "stuff" (CNID 17) holding alpha, beta, gamma,
/// plus the thread records for path reconstruction and a trailing
/// record under another parent.
fn family_catalog() -> BTreeFile {
    let header = header_node(
        &TreeShape {
            depth: 2,
            root: 1,
            leaf_records: 7,
            first_leaf: 2,
            last_leaf: 3,
            total_nodes: 4,
            free_nodes: 0,
            max_key_length: 516,
            attributes: ATTRS_HFS_PLUS_CATALOG,
        },
        &[0, 1, 2, 3],
    );
    let index = build_node(
        0,
        2,
        0,
        0,
        &[
            index_record_u16(&hfsp_cat_key(2, ""), 2),
            index_record_u16(&hfsp_cat_key(17, "beta"), 3),
        ],
    );
    let file_fork = hfsp_fork_bytes(0, 0, &[]);
    let leaf2 = build_node(
        -1,
        1,
        3,
        0,
        &[
            keyed_record_u16(&hfsp_cat_key(2, ""), &hfsp_thread_payload(true, 1, "Disk")),
            keyed_record_u16(&hfsp_cat_key(2, "stuff"), &hfsp_folder_payload(17, 3)),
            keyed_record_u16(&hfsp_cat_key(17, ""), &hfsp_thread_payload(true, 2, "stuff")),
            keyed_record_u16(
                &hfsp_cat_key(17, "alpha"),
                &hfsp_file_payload(21, &file_fork, &file_fork),
            ),
        ],
    );
    let leaf3 = build_node(
        -1,
        1,
        0,
        2,
        &[
            keyed_record_u16(&hfsp_cat_key(17, "beta"), &hfsp_folder_payload(22, 0)),
            keyed_record_u16(
                &hfsp_cat_key(17, "gamma"),
                &hfsp_file_payload(23, &file_fork, &file_fork),
            ),
            keyed_record_u16(&hfsp_cat_key(19, ""), &hfsp_thread_payload(true, 2, "zzz")),
        ],
    );
    BTreeFile::new(assemble_tree(&[header, index, leaf2, leaf3])).unwrap()
}

#[test]
fn keys_are_strictly_increasing_within_every_node() {
    let tree = family_catalog();
    tree.walk_breadth_first(|tree, node| {
        if node.desc.kind == NodeKind::Leaf || node.desc.kind == NodeKind::Index {
            let mut previous: Option<(u32, Vec<u16>)> = None;
            for i in 0..node.record_count() {
                let view = tree.keyed_record(node, i).unwrap();
                let key =
                    machfs::catalog::ParsedKey::parse(VolumeKind::HfsPlus, view.key).unwrap();
                let current = (key.parent_id, key.name_units());
                if let Some(prev) = &previous {
                    assert!(
                        *prev < current,
                        "node {} record {i} does not sort above its predecessor",
                        node.index
                    );
                }
                previous = Some(current);
            }
        }
        Ok(Visit::Continue)
    })
    .unwrap();
}

#[test]
fn enumeration_yields_children_in_key_order_and_stops() {
    let tree = family_catalog();
    let mut seen = Vec::new();
    catalog::list_children(&tree, plus_flavor(), 17, |item| {
        seen.push((item.name.clone(), item.kind, item.cnid));
        Ok(Visit::Continue)
    })
    .unwrap();
    assert_eq!(
        seen,
        vec![
            ("alpha".to_string(), ItemKind::File, 21),
            ("beta".to_string(), ItemKind::Folder, 22),
            ("gamma".to_string(), ItemKind::File, 23),
        ]
    );
}

#[test]
fn enumeration_honors_stop() {
    let tree = family_catalog();
    let mut seen = 0;
    catalog::list_children(&tree, plus_flavor(), 17, |_| {
        seen += 1;
        Ok(Visit::Stop)
    })
    .unwrap();
    assert_eq!(seen, 1);
}

#[test]
fn path_reconstruction_inverts_lookup() {
    let tree = family_catalog();
    let flavor = plus_flavor();
    assert_eq!(catalog::path_of(&tree, flavor, 17).unwrap(), "Disk:stuff");

    let item = catalog::lookup(&tree, flavor, 2, "stuff").unwrap().unwrap();
    assert_eq!(item.cnid, 17);
    assert_eq!(item.kind, ItemKind::Folder);
    assert_eq!(item.valence, 3);
}

#[test]
fn missing_thread_breaks_the_chain() {
    let tree = family_catalog();
    assert!(matches!(
        catalog::thread_of(&tree, plus_flavor(), 99),
        Err(HfsError::BrokenChain(99))
    ));
}

#[test]
fn lookup_is_case_insensitive_at_the_leaf() {
    let tree = family_catalog();
    let item = catalog::lookup(&tree, plus_flavor(), 17, "GAMMA").unwrap().unwrap();
    assert_eq!(item.cnid, 23);
}

/// Extents tree carrying the overflow records of CNID 30's data fork:
/// blocks 100.. in two runs of 100 and 50.
fn overflow_tree() -> BTreeFile {
    let header = header_node(
        &TreeShape {
            depth: 1,
            root: 1,
            leaf_records: 2,
            first_leaf: 1,
            last_leaf: 1,
            total_nodes: 2,
            free_nodes: 0,
            max_key_length: 10,
            attributes: ATTRS_HFS_PLUS_EXTENTS,
        },
        &[0, 1],
    );
    let mut payload = Vec::new();
    for (start, count) in [(500u32, 100u32), (700, 50), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)]
    {
        payload.extend_from_slice(&start.to_be_bytes());
        payload.extend_from_slice(&count.to_be_bytes());
    }
    let other: Vec<u8> = std::iter::repeat_n(0u8, 64).collect();
    let leaf = build_node(
        -1,
        1,
        0,
        0,
        &[
            keyed_record_u16(&hfsp_ext_key(0, 30, 100), &payload),
            keyed_record_u16(&hfsp_ext_key(0, 31, 0), &other),
        ],
    );
    BTreeFile::new(assemble_tree(&[header, leaf])).unwrap()
}

fn long_fork() -> ForkData {
    ForkData {
        logical_size: 250 * 16 - 5,
        clump_size: 0,
        total_blocks: 250,
        extents: vec![
            Extent { start_block: 10, block_count: 60 },
            Extent { start_block: 80, block_count: 40 },
        ],
    }
}

#[test]
fn overflow_completes_fork_coverage() {
    let tree = overflow_tree();
    let fork = long_fork();
    let extents =
        extents::resolve_extents(VolumeKind::HfsPlus, 30, ForkKind::Data, &fork, Some(&tree))
            .unwrap();
    assert_eq!(
        extents,
        vec![
            Extent { start_block: 10, block_count: 60 },
            Extent { start_block: 80, block_count: 40 },
            Extent { start_block: 500, block_count: 100 },
            Extent { start_block: 700, block_count: 50 },
        ]
    );
}

#[test]
fn overflow_gap_is_a_short_fork() {
    let tree = overflow_tree();
    let mut fork = long_fork();
    fork.total_blocks = 300; // nothing maps blocks 250..300
    let err =
        extents::resolve_extents(VolumeKind::HfsPlus, 30, ForkKind::Data, &fork, Some(&tree))
            .unwrap_err();
    assert!(matches!(
        err,
        HfsError::ShortFork { cnid: 30, covered: 250, total: 300 }
    ));
}

#[test]
fn fork_reader_reaches_the_last_byte_and_no_further() {
    let tree = overflow_tree();
    let fork = long_fork();
    let extents =
        extents::resolve_extents(VolumeKind::HfsPlus, 30, ForkKind::Data, &fork, Some(&tree))
            .unwrap();

    // Block b of the device is filled with b & 0xFF.
    let block_size = 16u32;
    let mut bytes = Vec::new();
    for b in 0u32..760 {
        bytes.extend(std::iter::repeat_n((b & 0xFF) as u8, block_size as usize));
    }
    let mut device = BlockDevice::open(Cursor::new(bytes)).unwrap();
    device.set_geometry(block_size, 0);

    let mut reader = ForkReader::new(&mut device, &extents, fork.logical_size);
    let last = reader.read_at(fork.logical_size - 1, 1).unwrap();
    // Logical block 249 maps into the (700, 50) run at physical 749.
    assert_eq!(last, [749u32 as u8]);
    assert!(matches!(
        reader.read_at(fork.logical_size, 1),
        Err(HfsError::OutOfRange { .. })
    ));
}
