//! Shared argument handling and volume opening for the subcommands.

use std::error::Error;
use std::fs::File;

use machfs::device::BlockDevice;
use machfs::probe::{preferred_site, probe, VolumeSite};
use machfs::Volume;

pub(crate) struct Options {
    /// Positional arguments: image path first.
    pub positional: Vec<String>,
    /// `--volume N` picks the n-th probed volume.
    pub volume: Option<usize>,
}

impl Options {
    pub fn image(&self) -> &str {
        &self.positional[0]
    }
}

/// Parse `-v/--volume` and `-e/--encoding` flags plus positionals. At
/// least `required` positional arguments must be present.
pub(crate) fn parse(args: &[String], required: usize) -> Result<Options, Box<dyn Error>> {
    let mut positional = Vec::new();
    let mut volume = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-v" | "--volume" => {
                i += 1;
                let value = args.get(i).ok_or("--volume requires an index")?;
                volume = Some(value.parse::<usize>().map_err(|_| "bad --volume index")?);
            }
            "-e" | "--encoding" => {
                i += 1;
                let value = args.get(i).ok_or("--encoding requires a name")?;
                if !value.eq_ignore_ascii_case("macroman") {
                    return Err(format!("unsupported encoding {value:?} (only macroman)").into());
                }
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown flag: {flag}").into());
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    if positional.len() < required {
        return Err("missing arguments".into());
    }
    Ok(Options { positional, volume })
}

pub(crate) fn probe_image(image: &str) -> Result<Vec<VolumeSite>, Box<dyn Error>> {
    let mut device = BlockDevice::open(File::open(image)?)?;
    Ok(probe(&mut device)?)
}

/// Open the selected (or preferred) volume of an image.
pub(crate) fn open_volume(opts: &Options) -> Result<Volume<File>, Box<dyn Error>> {
    let sites = probe_image(opts.image())?;
    let site = match opts.volume {
        Some(index) => sites.get(index).ok_or_else(|| {
            format!("no volume {index}: the probe found {} volume(s)", sites.len())
        })?,
        None => preferred_site(&sites).ok_or(machfs::HfsError::UnknownVolume)?,
    };
    Ok(Volume::open_at(File::open(opts.image())?, site)?)
}
