//! machfs-tool — explore classic HFS and HFS+ disk images
//!
//! # Usage
//!
//! ```text
//! machfs-tool analyze <image>                      Structural dump of every volume
//! machfs-tool list    <image>                      Directory tree
//! machfs-tool extract <image> <name-or-path> [out] Rehydrate a file's forks
//!
//! Options:
//!   -v, --volume <n>      operate on the n-th probed volume
//!   -e, --encoding <enc>  HFS name decoding hint (only "macroman")
//! ```
//!
//! Paths are colon-separated in the classic style (`Vol:Folder:File`);
//! a bare name finds the first file matching case-insensitively.

mod cmd_analyze;
mod cmd_extract;
mod cmd_list;
mod opts;
mod style;

use std::env;
use std::process;

use style::{BOLD, DIM, GREEN, RED, RESET};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "analyze" => cmd_analyze::run(&args[2..]),
        "list" | "ls" | "tree" => cmd_list::run(&args[2..]),
        "extract" | "cat" => cmd_extract::run(&args[2..]),
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            eprintln!("{RED}Unknown command: {}{RESET}", args[1]);
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("{RED}error:{RESET} {e}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!(
        r#"
{BOLD}machfs-tool{RESET} — classic HFS / HFS+ image explorer

{DIM}Reads HFS, HFS+, and HFS-wrapped HFS+ volumes from raw images{RESET}

{BOLD}USAGE:{RESET}
    machfs-tool <COMMAND> [OPTIONS]

{BOLD}COMMANDS:{RESET}
    {GREEN}analyze{RESET} <image>                        Volume headers, B-tree shape, every catalog record
    {GREEN}list{RESET}    <image>                        Directory tree with sizes
    {GREEN}extract{RESET} <image> <name-or-path> [out]   Write a file's data (and resource) fork

{BOLD}OPTIONS:{RESET}
    -v, --volume <n>       operate on the n-th volume found by the probe
    -e, --encoding <enc>   HFS name decoding hint (default and only: macroman)

{BOLD}EXAMPLES:{RESET}
    machfs-tool analyze System7.img
    machfs-tool list Install.img
    machfs-tool extract Install.img "Disk Tools:Disk First Aid" rescued/dfa
"#
    );
}
