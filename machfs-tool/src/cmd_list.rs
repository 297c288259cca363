use std::error::Error;
use std::fs::File;
use std::process;

use machfs::catalog::CNID_ROOT_FOLDER;
use machfs::{ItemKind, Volume};

use crate::opts;
use crate::style::*;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let options = match opts::parse(args, 1) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{RED}error:{RESET} {e}");
            eprintln!("Usage: machfs-tool list <image> [-v volume]");
            process::exit(1);
        }
    };

    let volume = opts::open_volume(&options)?;

    header(&format!(
        "{} {DIM}({} volume at byte {}){RESET}",
        volume.name(),
        volume.kind(),
        volume.site().start,
    ));
    println!();
    println!("  {BOLD}{}{RESET}", volume.name());

    let mut files = 0u64;
    let mut folders = 0u64;
    print_tree(&volume, CNID_ROOT_FOLDER, "", &mut files, &mut folders)?;

    println!();
    println!("  {DIM}{} file(s), {} folder(s){RESET}", files, folders);
    println!();
    Ok(())
}

fn print_tree(
    volume: &Volume<File>,
    parent: u32,
    prefix: &str,
    files: &mut u64,
    folders: &mut u64,
) -> Result<(), Box<dyn Error>> {
    let children = volume.list_children(parent)?;
    for (i, item) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        let connector = if is_last { ELBOW } else { TEE };
        let color = kind_color(item.kind);
        let size = if item.kind == ItemKind::File {
            let mut tag = format!("  {DIM}{}", format_size(item.data_fork.logical_size));
            if item.resource_fork.logical_size > 0 {
                tag.push_str(&format!(
                    " (+{} rsrc)",
                    format_size(item.resource_fork.logical_size)
                ));
            }
            tag.push_str(RESET);
            tag
        } else {
            String::new()
        };

        println!(
            "  {prefix}{DIM}{connector}{RESET} {color}{}{RESET}{size}",
            item.name
        );

        match item.kind {
            ItemKind::File => *files += 1,
            ItemKind::Folder => {
                *folders += 1;
                let child_prefix = if is_last {
                    format!("{prefix}    ")
                } else {
                    format!("{prefix}{PIPE}   ")
                };
                print_tree(volume, item.cnid, &child_prefix, files, folders)?;
            }
        }
    }
    Ok(())
}
