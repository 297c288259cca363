use std::error::Error;
use std::fs::File;
use std::process;

use machfs::btree::{BTreeFile, Visit};
use machfs::catalog::CatalogRecord;
use machfs::volume::VolumeInfo;
use machfs::{ForkKind, HfsError, Volume};

use crate::opts;
use crate::style::*;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let options = match opts::parse(args, 1) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{RED}error:{RESET} {e}");
            eprintln!("Usage: machfs-tool analyze <image>");
            process::exit(1);
        }
    };
    let image = options.image();

    let sites = opts::probe_image(image)?;
    if sites.is_empty() {
        return Err(HfsError::UnknownVolume.into());
    }

    header(&format!("Analyze: {image}"));
    kv("Volumes found", &sites.len().to_string());

    for (index, site) in sites.iter().enumerate() {
        let wrapped = if site.embedded { " (embedded)" } else { "" };
        section(&format!(
            "Volume {index}: {}{wrapped} at byte {}, {}",
            site.kind,
            site.start,
            format_size(site.length)
        ));

        match Volume::open_at(File::open(image)?, site) {
            Ok(volume) => {
                if let Err(e) = analyze_volume(&volume) {
                    warn_line(&format!("analysis aborted: {e}"));
                }
            }
            Err(e) => warn_line(&format!("cannot open volume: {e}")),
        }
    }

    println!();
    Ok(())
}

fn analyze_volume(volume: &Volume<File>) -> Result<(), Box<dyn Error>> {
    kv("Volume name", volume.name());
    match volume.info() {
        VolumeInfo::Hfs(mdb) => {
            kv("Signature", "HFS (\"BD\")");
            kv("Created", &format_mac_date(mdb.create_date));
            kv("Modified", &format_mac_date(mdb.modify_date));
            kv("Block size", &format!("{} bytes", mdb.block_size));
            kv("Total blocks", &format_commas(mdb.total_blocks as u64));
            kv("Free blocks", &format_commas(mdb.free_blocks as u64));
            kv("Bitmap start", &format!("sector {}", mdb.bitmap_start));
            kv("Block 0 start", &format!("sector {}", mdb.alloc_block_start));
            kv_highlight("Files", &format_commas(mdb.file_count as u64));
            kv_highlight("Folders", &format_commas(mdb.folder_count as u64));
        }
        VolumeInfo::HfsPlus(vh) => {
            let variant = if vh.is_hfsx {
                "HFSX (\"HX\", case-sensitive)"
            } else {
                "HFS+ (\"H+\")"
            };
            kv("Signature", variant);
            kv("Version", &vh.version.to_string());
            kv("Created", &format_mac_date(vh.create_date));
            kv("Modified", &format_mac_date(vh.modify_date));
            kv("Block size", &format!("{} bytes", vh.block_size));
            kv("Total blocks", &format_commas(vh.total_blocks as u64));
            kv("Free blocks", &format_commas(vh.free_blocks as u64));
            kv("Data clump", &format_size(vh.data_clump_size as u64));
            kv("Resource clump", &format_size(vh.rsrc_clump_size as u64));
            kv_highlight("Files", &format_commas(vh.file_count as u64));
            kv_highlight("Folders", &format_commas(vh.folder_count as u64));
        }
    }

    tree_shape("Catalog B-tree", volume.catalog_tree())?;
    tree_shape("Extents overflow B-tree", volume.extents_tree())?;
    catalog_records(volume)?;
    integrity(volume)?;
    Ok(())
}

fn tree_shape(title: &str, tree: &BTreeFile) -> Result<(), Box<dyn Error>> {
    section(title);
    let header = &tree.header;
    kv("Depth", &header.tree_depth.to_string());
    kv("Root node", &header.root_node.to_string());
    kv("Node size", &format!("{} bytes", header.node_size));
    kv("Max key length", &header.max_key_length.to_string());
    kv(
        "Nodes",
        &format!(
            "{} total, {} free, {} live",
            format_commas(header.total_nodes as u64),
            format_commas(header.free_nodes as u64),
            format_commas(header.live_nodes() as u64)
        ),
    );
    kv("Leaf records", &format_commas(header.leaf_records as u64));
    kv(
        "Leaf chain",
        &format!("{} -> {}", header.first_leaf_node, header.last_leaf_node),
    );

    // Every live node must parse with a sane offset table.
    let mut swept = 0u64;
    tree.for_each_node(|_, _| {
        swept += 1;
        Ok(Visit::Continue)
    })?;
    kv("Node sweep", &format!("{swept} live node(s) parsed"));

    let mut leaf_records = 0u64;
    let leaves = tree.walk_leaf_nodes(|_, node| {
        leaf_records += node.record_count() as u64;
        Ok(Visit::Continue)
    })?;
    kv("Leaf walk", &format!("{leaves} node(s), {leaf_records} record(s)"));
    if leaf_records != header.leaf_records as u64 {
        warn_line(&format!(
            "leaf walk saw {leaf_records} records but the header counts {}",
            header.leaf_records
        ));
    }
    Ok(())
}

fn catalog_records(volume: &Volume<File>) -> Result<(), Box<dyn Error>> {
    section("Catalog records");
    let mut count = 0u64;
    volume.records(|entry| {
        count += 1;
        let parent = entry.parent_id;
        match &entry.record {
            CatalogRecord::Folder(folder) => println!(
                "  {DIM}{parent:>10}{RESET} {BLUE}dir {RESET} {:<28} cnid={} valence={}",
                quoted(&entry.name),
                folder.id,
                folder.valence
            ),
            CatalogRecord::File(file) => println!(
                "  {DIM}{parent:>10}{RESET} file {:<28} cnid={} data={} rsrc={}",
                quoted(&entry.name),
                file.id,
                file.data_fork.logical_size,
                file.resource_fork.logical_size
            ),
            CatalogRecord::FolderThread(thread) | CatalogRecord::FileThread(thread) => println!(
                "  {DIM}{parent:>10}{RESET} {CYAN}thd {RESET} {:<28} -> ({}, {})",
                quoted(&entry.name),
                thread.parent_id,
                quoted(&thread.name)
            ),
        }
        Ok(Visit::Continue)
    })?;
    println!("  {DIM}{count} record(s){RESET}");
    Ok(())
}

fn integrity(volume: &Volume<File>) -> Result<(), Box<dyn Error>> {
    section("Integrity");
    let block_size = volume.info().block_size();
    let mut files = 0u64;
    let mut complaints = 0u64;

    volume.records(|entry| {
        if let CatalogRecord::File(file) = &entry.record {
            files += 1;
            for (fork_kind, fork) in [
                (ForkKind::Data, &file.data_fork),
                (ForkKind::Resource, &file.resource_fork),
            ] {
                if fork.logical_size > fork.physical_size(block_size) {
                    complaints += 1;
                    warn_line(&format!(
                        "{} {} fork: logical {} exceeds physical {}",
                        quoted(&entry.name),
                        fork_kind,
                        fork.logical_size,
                        fork.physical_size(block_size)
                    ));
                }
                if fork.total_blocks == 0 {
                    continue;
                }
                match volume.fork_coverage(file.id, fork_kind, fork) {
                    Ok(covered) if covered == fork.total_blocks => {}
                    Ok(covered) => {
                        complaints += 1;
                        warn_line(&format!(
                            "{} {} fork: extents cover {covered} of {} blocks",
                            quoted(&entry.name),
                            fork_kind,
                            fork.total_blocks
                        ));
                    }
                    Err(e) => {
                        complaints += 1;
                        warn_line(&format!("{} {} fork: {e}", quoted(&entry.name), fork_kind));
                    }
                }
            }
        }
        Ok(Visit::Continue)
    })?;

    match volume.free_block_check() {
        Some((header, bitmap)) if header == bitmap => {
            kv("Free blocks", &format!("{} (header and bitmap agree)", format_commas(header as u64)));
        }
        Some((header, bitmap)) => {
            complaints += 1;
            warn_line(&format!(
                "header counts {header} free blocks, allocation bitmap has {bitmap} zero bits"
            ));
        }
        None => warn_line("allocation bitmap was unreadable"),
    }

    if complaints == 0 {
        kv_highlight("Checks", &format!("ok ({files} file(s) verified)"));
    } else {
        kv("Checks", &format!("{complaints} warning(s) across {files} file(s)"));
    }
    Ok(())
}

fn quoted(name: &str) -> String {
    format!("\"{name}\"")
}
