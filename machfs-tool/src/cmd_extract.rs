use std::error::Error;
use std::fs::File;
use std::io;
use std::process;

use machfs::{ForkKind, HfsError, ItemKind};

use crate::opts;
use crate::style::*;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let options = match opts::parse(args, 2) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{RED}error:{RESET} {e}");
            eprintln!("Usage: machfs-tool extract <image> <name-or-path> [out] [-v volume]");
            process::exit(1);
        }
    };
    let quarry = &options.positional[1];

    let mut volume = opts::open_volume(&options)?;

    // A colon makes it a TN1041 path; a bare name matches the first
    // file anywhere on the volume.
    let item = if quarry.contains(':') {
        volume.resolve_path(quarry)?
    } else {
        volume
            .find_file(quarry)?
            .ok_or_else(|| HfsError::NotFound(quarry.clone()))?
    };
    if item.kind == ItemKind::Folder {
        return Err(format!("{quarry:?} is a folder, not a file").into());
    }

    let dest = options
        .positional
        .get(2)
        .cloned()
        .unwrap_or_else(|| sanitize(&item.name));

    header(&format!("extract: {}", volume.path_of(item.parent_id)
        .map(|p| format!("{p}:{}", item.name))
        .unwrap_or_else(|_| item.name.clone())));

    section("File");
    kv("CNID", &item.cnid.to_string());
    kv("Type / creator", &format!(
        "{} / {}",
        four_cc(&item.finder.file_type),
        four_cc(&item.finder.creator)
    ));
    kv("Created", &format_mac_date(item.create_date));
    kv("Modified", &format_mac_date(item.modify_date));
    kv("Data fork", &format_size(item.data_fork.logical_size));
    if item.resource_fork.logical_size > 0 {
        kv("Resource fork", &format_size(item.resource_fork.logical_size));
    }

    section("Output");
    let mut out = File::create(&dest)?;
    let written = {
        let mut reader = volume.fork_reader(&item, ForkKind::Data)?;
        io::copy(&mut reader, &mut out)?
    };
    kv_highlight(&dest, &format!("{} written", format_size(written)));

    if item.resource_fork.logical_size > 0 {
        let rsrc_dest = format!("{dest}.rsrc");
        let mut rsrc_out = File::create(&rsrc_dest)?;
        let mut reader = volume.fork_reader(&item, ForkKind::Resource)?;
        let written = io::copy(&mut reader, &mut rsrc_out)?;
        kv_highlight(&rsrc_dest, &format!("{} written", format_size(written)));
    }

    println!();
    Ok(())
}

/// Colons and slashes have meanings the host filesystem disagrees with.
fn sanitize(name: &str) -> String {
    name.replace([':', '/'], "_")
}
