//! B-tree file parsing and traversal.
//!
//! A B-tree file is the logical content of one fork, cut into
//! fixed-size nodes. Node 0 is the header node; its first record is the
//! `BTHeaderRec` describing the tree, its third the node-usage map.
//! Records inside a node grow forward from the 14-byte descriptor while
//! their offsets grow backward from the node end.
//!
//! The whole fork is held in memory; nodes are parsed once and cached,
//! and record views borrow straight from the backing buffer.

use byteorder::{BigEndian, ByteOrder};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::{HfsError, Result};

/// Node descriptor size.
pub const NODE_DESCRIPTOR_LEN: usize = 14;

/// `kBTBigKeysMask`: key lengths are u16 rather than u8.
pub const ATTR_BIG_KEYS: u32 = 0x0000_0002;
/// `kBTVariableIndexKeysMask`: index records carry true-length keys
/// instead of `max_key_length`-sized slots.
pub const ATTR_VARIABLE_INDEX_KEYS: u32 = 0x0000_0004;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Index,
    Header,
    Map,
}

impl NodeKind {
    fn from_raw(raw: i8) -> Option<NodeKind> {
        match raw {
            -1 => Some(NodeKind::Leaf),
            0 => Some(NodeKind::Index),
            1 => Some(NodeKind::Header),
            2 => Some(NodeKind::Map),
            _ => None,
        }
    }
}

/// The 14 bytes at the start of every node.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub forward_link: u32,
    pub backward_link: u32,
    pub kind: NodeKind,
    pub height: u8,
    pub num_records: u16,
}

/// A parsed node: descriptor plus its validated record offset table.
/// Shared handles are cheap; record bytes stay in the tree's buffer.
#[derive(Debug)]
pub struct Node {
    pub index: u32,
    pub desc: NodeDescriptor,
    offsets: Vec<u16>,
}

impl Node {
    fn parse(index: u32, data: &[u8]) -> Result<Node> {
        let corrupt = |reason: &str| HfsError::corrupt(index, reason);

        let forward_link = BigEndian::read_u32(&data[0..4]);
        let backward_link = BigEndian::read_u32(&data[4..8]);
        let kind = NodeKind::from_raw(data[8] as i8)
            .ok_or_else(|| corrupt(&format!("unknown node kind {}", data[8] as i8)))?;
        let height = data[9];
        let num_records = BigEndian::read_u16(&data[10..12]);

        let table_len = (num_records as usize + 1) * 2;
        if NODE_DESCRIPTOR_LEN + table_len > data.len() {
            return Err(corrupt("record count overflows the node"));
        }

        // The offset table sits at the node end, last entry first.
        let mut offsets = Vec::with_capacity(num_records as usize + 1);
        for i in 0..=num_records as usize {
            let pos = data.len() - (i + 1) * 2;
            offsets.push(BigEndian::read_u16(&data[pos..pos + 2]));
        }

        let limit = (data.len() - table_len) as u16;
        let mut previous = 0u16;
        for (i, &off) in offsets.iter().enumerate() {
            if off < NODE_DESCRIPTOR_LEN as u16 || off > limit {
                return Err(corrupt(&format!("record offset {off} out of bounds")));
            }
            if i > 0 && off <= previous {
                return Err(corrupt("record offsets are not strictly increasing"));
            }
            previous = off;
        }

        Ok(Node {
            index,
            desc: NodeDescriptor {
                forward_link,
                backward_link,
                kind,
                height,
                num_records,
            },
            offsets,
        })
    }

    pub fn record_count(&self) -> usize {
        self.desc.num_records as usize
    }
}

/// The `BTHeaderRec` from the header node.
#[derive(Debug, Clone)]
pub struct BTreeHeaderRecord {
    pub tree_depth: u16,
    pub root_node: u32,
    pub leaf_records: u32,
    pub first_leaf_node: u32,
    pub last_leaf_node: u32,
    pub node_size: u16,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub clump_size: u32,
    pub btree_type: u8,
    pub key_compare_type: u8,
    pub attributes: u32,
}

impl BTreeHeaderRecord {
    fn parse(data: &[u8]) -> BTreeHeaderRecord {
        BTreeHeaderRecord {
            tree_depth: BigEndian::read_u16(&data[0..2]),
            root_node: BigEndian::read_u32(&data[2..6]),
            leaf_records: BigEndian::read_u32(&data[6..10]),
            first_leaf_node: BigEndian::read_u32(&data[10..14]),
            last_leaf_node: BigEndian::read_u32(&data[14..18]),
            node_size: BigEndian::read_u16(&data[18..20]),
            max_key_length: BigEndian::read_u16(&data[20..22]),
            total_nodes: BigEndian::read_u32(&data[22..26]),
            free_nodes: BigEndian::read_u32(&data[26..30]),
            clump_size: BigEndian::read_u32(&data[32..36]),
            btree_type: data[36],
            key_compare_type: data[37],
            attributes: BigEndian::read_u32(&data[38..42]),
        }
    }

    pub fn live_nodes(&self) -> u32 {
        self.total_nodes - self.free_nodes.min(self.total_nodes)
    }
}

/// A keyed record split into its key and payload views.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub key: &'a [u8],
    pub payload: &'a [u8],
}

/// Where a comparator-driven descent landed.
#[derive(Debug, Clone)]
pub struct LeafHit {
    pub node: Rc<Node>,
    pub record: usize,
    /// true when the landing key compared equal to the quarry.
    pub exact: bool,
}

/// Visitor verdict for traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// A whole B-tree file held in memory.
#[derive(Debug)]
pub struct BTreeFile {
    pub header: BTreeHeaderRecord,
    raw: Vec<u8>,
    node_size: usize,
    big_keys: bool,
    variable_index_keys: bool,
    cache: RefCell<Vec<Option<Rc<Node>>>>,
}

impl BTreeFile {
    /// Wrap the raw bytes of a B-tree fork.
    pub fn new(raw: Vec<u8>) -> Result<BTreeFile> {
        if raw.len() < 512 {
            return Err(HfsError::corrupt(0, "fork shorter than one node"));
        }
        // The node size is only known once the header record is read, so
        // node 0's own offset table is validated after that.
        if NodeKind::from_raw(raw[8] as i8) != Some(NodeKind::Header) {
            return Err(HfsError::corrupt(0, "node 0 is not a header node"));
        }

        let header = BTreeHeaderRecord::parse(&raw[NODE_DESCRIPTOR_LEN..]);
        let node_size = header.node_size as usize;
        if !node_size.is_power_of_two() || !(512..=32768).contains(&node_size) {
            return Err(HfsError::corrupt(0, format!("bad node size {node_size}")));
        }
        if header.total_nodes == 0
            || header.total_nodes as usize * node_size > raw.len()
        {
            return Err(HfsError::corrupt(0, "node count exceeds the fork"));
        }
        Node::parse(0, &raw[..node_size])?;

        let big_keys = header.attributes & ATTR_BIG_KEYS != 0;
        let variable_index_keys = header.attributes & ATTR_VARIABLE_INDEX_KEYS != 0;
        let cache = RefCell::new(vec![None; header.total_nodes as usize]);

        Ok(BTreeFile {
            header,
            raw,
            node_size,
            big_keys,
            variable_index_keys,
            cache,
        })
    }

    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Fetch (and cache) a node by number.
    pub fn node(&self, index: u32) -> Result<Rc<Node>> {
        if index >= self.header.total_nodes {
            return Err(HfsError::InvalidNodeIndex {
                index,
                total: self.header.total_nodes,
            });
        }
        if let Some(node) = &self.cache.borrow()[index as usize] {
            return Ok(Rc::clone(node));
        }
        let start = index as usize * self.node_size;
        let node = Rc::new(Node::parse(index, &self.raw[start..start + self.node_size])?);
        self.cache.borrow_mut()[index as usize] = Some(Rc::clone(&node));
        Ok(node)
    }

    /// Raw bytes of record `i`, bounds-checked against the offset table.
    pub fn record<'a>(&'a self, node: &Node, i: usize) -> Result<&'a [u8]> {
        if i >= node.record_count() {
            return Err(HfsError::corrupt(
                node.index,
                format!("record {i} beyond count {}", node.record_count()),
            ));
        }
        let base = node.index as usize * self.node_size;
        let start = base + node.offsets[i] as usize;
        let end = base + node.offsets[i + 1] as usize;
        Ok(&self.raw[start..end])
    }

    /// Split record `i` of an index or leaf node into key and payload.
    pub fn keyed_record<'a>(&'a self, node: &Node, i: usize) -> Result<RecordView<'a>> {
        let data = self.record(node, i)?;
        let width = if self.big_keys { 2 } else { 1 };
        if data.len() < width {
            return Err(HfsError::corrupt(node.index, "record shorter than its key length"));
        }
        let key_len = if self.big_keys {
            BigEndian::read_u16(&data[0..2]) as usize
        } else {
            data[0] as usize
        };
        if width + key_len > data.len() {
            return Err(HfsError::corrupt(node.index, "key extends past the record"));
        }
        let key = &data[width..width + key_len];

        // Index records of fixed-key trees reserve a full-size key slot.
        let slot = match node.desc.kind {
            NodeKind::Index if !self.variable_index_keys => {
                width + self.header.max_key_length as usize
            }
            _ => width + key_len,
        };
        let payload_at = (slot + 1) & !1;
        if payload_at > data.len() {
            return Err(HfsError::corrupt(node.index, "payload offset past the record"));
        }
        Ok(RecordView {
            key,
            payload: &data[payload_at..],
        })
    }

    /// Child node number carried by index record `i`.
    pub fn index_child(&self, node: &Node, i: usize) -> Result<u32> {
        let view = self.keyed_record(node, i)?;
        if view.payload.len() < 4 {
            return Err(HfsError::corrupt(node.index, "index record lacks a child pointer"));
        }
        Ok(BigEndian::read_u32(&view.payload[0..4]))
    }

    /// Comparator-driven descent from the root.
    ///
    /// `cmp` orders a candidate key against the quarry (`Less` means the
    /// candidate sorts before the quarry). The hit is the first leaf
    /// record whose key is greater than or equal to the quarry, crossing
    /// the sibling chain when the landing leaf runs out. `None` means
    /// every key in the tree is smaller.
    pub fn search(&self, cmp: &dyn Fn(&[u8]) -> Ordering) -> Result<Option<LeafHit>> {
        if self.header.root_node == 0 {
            return Ok(None);
        }
        let mut node = self.node(self.header.root_node)?;
        let mut hops = 0u32;

        loop {
            hops += 1;
            if hops > self.header.total_nodes {
                return Err(HfsError::corrupt(node.index, "descent does not terminate"));
            }
            match node.desc.kind {
                NodeKind::Index => {
                    node = self.descend_step(node, cmp)?;
                }
                NodeKind::Leaf => {
                    let at = self.lower_bound(&node, cmp)?;
                    if at < node.record_count() {
                        let exact = cmp(self.keyed_record(&node, at)?.key) == Ordering::Equal;
                        return Ok(Some(LeafHit { node, record: at, exact }));
                    }
                    return self.first_record_after(&node);
                }
                other => {
                    return Err(HfsError::corrupt(
                        node.index,
                        format!("descent reached a {other:?} node"),
                    ));
                }
            }
        }
    }

    /// One index-node step: pick the rightmost child whose separator key
    /// is ≤ the quarry, stepping along the sibling chain first when even
    /// the last separator here sorts before the quarry and the right
    /// sibling still covers it.
    fn descend_step(
        &self,
        mut node: Rc<Node>,
        cmp: &dyn Fn(&[u8]) -> Ordering,
    ) -> Result<Rc<Node>> {
        let mut hops = 0u32;
        loop {
            hops += 1;
            if hops > self.header.total_nodes {
                return Err(HfsError::corrupt(node.index, "sibling chain cycles"));
            }
            let count = node.record_count();
            if count == 0 {
                return Err(HfsError::corrupt(node.index, "empty index node"));
            }
            let last = self.keyed_record(&node, count - 1)?;
            if cmp(last.key) != Ordering::Less || node.desc.forward_link == 0 {
                break;
            }
            let sibling = self.node(node.desc.forward_link)?;
            if sibling.record_count() == 0
                || cmp(self.keyed_record(&sibling, 0)?.key) == Ordering::Greater
            {
                break;
            }
            node = sibling;
        }

        let below = self.upper_bound(&node, cmp)?;
        let pick = below.saturating_sub(1);
        self.node(self.index_child(&node, pick)?)
    }

    /// First record index whose key is ≥ the quarry.
    fn lower_bound(&self, node: &Node, cmp: &dyn Fn(&[u8]) -> Ordering) -> Result<usize> {
        let mut lo = 0;
        let mut hi = node.record_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if cmp(self.keyed_record(node, mid)?.key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Count of records whose key is ≤ the quarry.
    fn upper_bound(&self, node: &Node, cmp: &dyn Fn(&[u8]) -> Ordering) -> Result<usize> {
        let mut lo = 0;
        let mut hi = node.record_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if cmp(self.keyed_record(node, mid)?.key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(lo)
    }

    fn first_record_after(&self, node: &Node) -> Result<Option<LeafHit>> {
        let mut next = node.desc.forward_link;
        let mut hops = 0u32;
        while next != 0 {
            hops += 1;
            if hops > self.header.total_nodes {
                return Err(HfsError::corrupt(node.index, "leaf chain cycles"));
            }
            let candidate = self.node(next)?;
            if candidate.desc.kind != NodeKind::Leaf {
                return Err(HfsError::corrupt(candidate.index, "leaf chain leaves the leaves"));
            }
            if candidate.record_count() > 0 {
                return Ok(Some(LeafHit { node: candidate, record: 0, exact: false }));
            }
            next = candidate.desc.forward_link;
        }
        Ok(None)
    }

    /// Emit every node reachable from the root, all of height h before
    /// any of height h−1. Cycles are a corruption signal, bounded by the
    /// node count.
    pub fn walk_breadth_first<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&BTreeFile, &Node) -> Result<Visit>,
    {
        if self.header.root_node == 0 {
            return Ok(());
        }
        let mut level = vec![self.header.root_node];
        let mut emitted = 0u64;
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for &index in &level {
                emitted += 1;
                if emitted > self.header.total_nodes as u64 {
                    return Err(HfsError::corrupt(index, "breadth-first walk cycles"));
                }
                let node = self.node(index)?;
                if visit(self, &node)? == Visit::Stop {
                    return Ok(());
                }
                if node.desc.kind == NodeKind::Index {
                    for i in 0..node.record_count() {
                        next_level.push(self.index_child(&node, i)?);
                    }
                }
            }
            level = next_level;
        }
        Ok(())
    }

    /// Follow the leaf chain from the first leaf; returns how many leaf
    /// nodes were visited.
    pub fn walk_leaf_nodes<F>(&self, mut visit: F) -> Result<u32>
    where
        F: FnMut(&BTreeFile, &Node) -> Result<Visit>,
    {
        let mut current = self.header.first_leaf_node;
        let mut visited = 0u32;
        while current != 0 {
            if visited >= self.header.total_nodes {
                return Err(HfsError::corrupt(current, "leaf chain cycles"));
            }
            let node = self.node(current)?;
            if node.desc.kind != NodeKind::Leaf {
                return Err(HfsError::corrupt(current, "leaf chain reaches a non-leaf"));
            }
            visited += 1;
            if visit(self, &node)? == Visit::Stop {
                break;
            }
            current = node.desc.forward_link;
        }
        Ok(visited)
    }

    /// Visit every live node in index order, as recorded by the node
    /// map. Integrity passes use this to touch nodes the tree never
    /// descends into.
    pub fn for_each_node<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&BTreeFile, &Node) -> Result<Visit>,
    {
        let map = self.node_map()?;
        for index in 0..self.header.total_nodes {
            let byte = map.get((index / 8) as usize).copied().unwrap_or(0);
            if byte & (0x80 >> (index % 8)) == 0 {
                continue;
            }
            let node = self.node(index)?;
            if visit(self, &node)? == Visit::Stop {
                break;
            }
        }
        Ok(())
    }

    /// The node-usage bitmap: the header node's map record, extended by
    /// chained map nodes.
    pub fn node_map(&self) -> Result<Vec<u8>> {
        let header_node = self.node(0)?;
        if header_node.record_count() < 3 {
            return Err(HfsError::corrupt(0, "header node lacks a map record"));
        }
        let mut map = self.record(&header_node, 2)?.to_vec();

        let mut next = header_node.desc.forward_link;
        let mut hops = 0u32;
        while next != 0 {
            hops += 1;
            if hops > self.header.total_nodes {
                return Err(HfsError::corrupt(next, "map chain cycles"));
            }
            let node = self.node(next)?;
            if node.desc.kind != NodeKind::Map {
                return Err(HfsError::corrupt(node.index, "map chain reaches a non-map node"));
            }
            map.extend_from_slice(self.record(&node, 0)?);
            next = node.desc.forward_link;
        }
        Ok(map)
    }
}

/// Forward iteration over leaf records from a starting position.
pub struct LeafCursor<'t> {
    tree: &'t BTreeFile,
    node: Rc<Node>,
    record: usize,
    hops: u32,
}

impl<'t> LeafCursor<'t> {
    pub fn from_hit(tree: &'t BTreeFile, hit: LeafHit) -> LeafCursor<'t> {
        LeafCursor {
            tree,
            node: hit.node,
            record: hit.record,
            hops: 0,
        }
    }

    /// Cursor at the first record of the first leaf, if any.
    pub fn first(tree: &'t BTreeFile) -> Result<Option<LeafCursor<'t>>> {
        if tree.header.first_leaf_node == 0 {
            return Ok(None);
        }
        let node = tree.node(tree.header.first_leaf_node)?;
        if node.desc.kind != NodeKind::Leaf {
            return Err(HfsError::corrupt(node.index, "first leaf is not a leaf"));
        }
        let mut cursor = LeafCursor { tree, node, record: 0, hops: 0 };
        if cursor.node.record_count() == 0 && !cursor.next_node()? {
            return Ok(None);
        }
        Ok(Some(cursor))
    }

    pub fn node_index(&self) -> u32 {
        self.node.index
    }

    pub fn record_index(&self) -> usize {
        self.record
    }

    /// The record under the cursor.
    pub fn view(&self) -> Result<RecordView<'t>> {
        self.tree.keyed_record(&self.node, self.record)
    }

    /// Move to the next record, crossing to sibling leaves as needed.
    /// Returns false when the chain ends.
    pub fn advance(&mut self) -> Result<bool> {
        if self.record + 1 < self.node.record_count() {
            self.record += 1;
            return Ok(true);
        }
        self.next_node()
    }

    fn next_node(&mut self) -> Result<bool> {
        loop {
            let next = self.node.desc.forward_link;
            if next == 0 {
                return Ok(false);
            }
            self.hops += 1;
            if self.hops > self.tree.header.total_nodes {
                return Err(HfsError::corrupt(next, "leaf chain cycles"));
            }
            let node = self.tree.node(next)?;
            if node.desc.kind != NodeKind::Leaf {
                return Err(HfsError::corrupt(node.index, "leaf chain reaches a non-leaf"));
            }
            self.node = node;
            self.record = 0;
            if self.node.record_count() > 0 {
                return Ok(true);
            }
        }
    }
}
