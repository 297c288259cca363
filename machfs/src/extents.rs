//! Extents-overflow B-tree lookups.
//!
//! Forks longer than their inline extent record continue in the extents
//! tree, keyed by (fork type, CNID, first unmapped block). Records are
//! collated by CNID first, then fork type, then start block, which is
//! the on-disk ordering of both dialects.

use byteorder::{BigEndian, ByteOrder};
use std::cmp::Ordering;

use crate::btree::BTreeFile;
use crate::error::{HfsError, Result};
use crate::volume::{Extent, ForkData, VolumeKind};

/// Which fork of a file an extent record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkKind {
    Data,
    Resource,
}

impl ForkKind {
    /// The key's fork-type byte.
    pub fn raw(self) -> u8 {
        match self {
            ForkKind::Data => 0x00,
            ForkKind::Resource => 0xFF,
        }
    }
}

impl std::fmt::Display for ForkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForkKind::Data => write!(f, "data"),
            ForkKind::Resource => write!(f, "resource"),
        }
    }
}

/// Decoded extents-overflow key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentKey {
    pub fork_type: u8,
    pub cnid: u32,
    pub start_block: u32,
}

impl ExtentKey {
    /// Parse the key content of an extents record.
    pub fn parse(kind: VolumeKind, key: &[u8]) -> Option<ExtentKey> {
        match kind {
            VolumeKind::Hfs => {
                if key.len() < 7 {
                    return None;
                }
                Some(ExtentKey {
                    fork_type: key[0],
                    cnid: BigEndian::read_u32(&key[1..5]),
                    start_block: BigEndian::read_u16(&key[5..7]) as u32,
                })
            }
            VolumeKind::HfsPlus => {
                if key.len() < 10 {
                    return None;
                }
                Some(ExtentKey {
                    fork_type: key[0],
                    cnid: BigEndian::read_u32(&key[2..6]),
                    start_block: BigEndian::read_u32(&key[6..10]),
                })
            }
        }
    }

    fn order_against(&self, other: &ExtentKey) -> Ordering {
        self.cnid
            .cmp(&other.cnid)
            .then(self.fork_type.cmp(&other.fork_type))
            .then(self.start_block.cmp(&other.start_block))
    }
}

/// Fetch the overflow record keyed exactly (`fork`, `cnid`,
/// `start_block`). Returns the extents it contributes, or `None` when no
/// such record exists.
pub fn overflow_extents(
    tree: &BTreeFile,
    kind: VolumeKind,
    cnid: u32,
    fork: ForkKind,
    start_block: u32,
) -> Result<Option<Vec<Extent>>> {
    let quarry = ExtentKey {
        fork_type: fork.raw(),
        cnid,
        start_block,
    };
    let cmp = |candidate: &[u8]| -> Ordering {
        match ExtentKey::parse(kind, candidate) {
            Some(key) => key.order_against(&quarry),
            // Malformed keys sort low so the descent skips past them.
            None => Ordering::Less,
        }
    };

    let Some(hit) = tree.search(&cmp)? else {
        return Ok(None);
    };
    if !hit.exact {
        return Ok(None);
    }
    let view = tree.keyed_record(&hit.node, hit.record)?;
    parse_extent_payload(kind, view.payload)
        .ok_or_else(|| HfsError::corrupt(hit.node.index, "truncated extent record"))
        .map(Some)
}

fn parse_extent_payload(kind: VolumeKind, payload: &[u8]) -> Option<Vec<Extent>> {
    match kind {
        VolumeKind::Hfs => {
            if payload.len() < 12 {
                return None;
            }
            Some(
                (0..3)
                    .map(|i| Extent {
                        start_block: BigEndian::read_u16(&payload[i * 4..]) as u32,
                        block_count: BigEndian::read_u16(&payload[i * 4 + 2..]) as u32,
                    })
                    .collect(),
            )
        }
        VolumeKind::HfsPlus => {
            if payload.len() < 64 {
                return None;
            }
            Some(
                (0..8)
                    .map(|i| Extent {
                        start_block: BigEndian::read_u32(&payload[i * 8..]),
                        block_count: BigEndian::read_u32(&payload[i * 8 + 4..]),
                    })
                    .collect(),
            )
        }
    }
}

/// Gather the complete extent list of a fork: the inline record, then
/// overflow records in ascending start-block order until `total_blocks`
/// is covered. A gap or an exhausted overflow tree is a `ShortFork`.
pub fn resolve_extents(
    kind: VolumeKind,
    cnid: u32,
    fork_kind: ForkKind,
    fork: &ForkData,
    overflow: Option<&BTreeFile>,
) -> Result<Vec<Extent>> {
    let mut out: Vec<Extent> = fork
        .extents
        .iter()
        .copied()
        .filter(|e| e.block_count > 0)
        .collect();
    let mut covered: u32 = out.iter().map(|e| e.block_count).sum();

    let short = |covered| HfsError::ShortFork {
        cnid,
        covered,
        total: fork.total_blocks,
    };

    while covered < fork.total_blocks {
        let tree = overflow.ok_or_else(|| short(covered))?;
        let extents = overflow_extents(tree, kind, cnid, fork_kind, covered)?
            .ok_or_else(|| short(covered))?;
        let before = covered;
        for extent in extents.into_iter().filter(|e| e.block_count > 0) {
            covered += extent.block_count;
            out.push(extent);
        }
        if covered == before {
            return Err(short(covered));
        }
    }
    Ok(out)
}
