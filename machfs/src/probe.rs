//! Volume detection: find HFS / HFS+ signatures at the candidate
//! offsets and report where each volume lives.

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use std::io::{Read, Seek};

use crate::device::BlockDevice;
use crate::error::Result;
use crate::volume::{
    Mdb, VolumeHeader, VolumeKind, HEADER_OFFSET, HFSX_SIGNATURE, HFS_PLUS_SIGNATURE,
    HFS_SIGNATURE,
};

/// One detected volume.
#[derive(Debug, Clone)]
pub struct VolumeSite {
    /// Byte offset of the volume within the device.
    pub start: u64,
    /// Offset of the header block relative to `start`: 1024 normally,
    /// 0 for images trimmed in front of the MDB/volume header.
    pub header_offset: u64,
    /// Byte length of the volume.
    pub length: u64,
    pub kind: VolumeKind,
    /// true for an HFS+ volume found inside an HFS wrapper.
    pub embedded: bool,
}

/// Scan for volumes. The standard header position (byte 1024) is tried
/// first, then byte 0; an HFS wrapper with an embedded HFS+ signature
/// yields both the wrapper and the inner volume. Unrecognized bytes are
/// not an error; the scan just emits nothing for them.
pub fn probe<R: Read + Seek>(device: &mut BlockDevice<R>) -> Result<Vec<VolumeSite>> {
    let total = device.len();
    let mut sites: Vec<VolumeSite> = Vec::new();

    for candidate in [HEADER_OFFSET, 0] {
        if candidate + 512 > total {
            continue;
        }
        let block = device.read_at(candidate, 512)?;
        let start = candidate.saturating_sub(HEADER_OFFSET);
        let header_offset = candidate - start;

        match BigEndian::read_u16(&block[0..2]) {
            HFS_SIGNATURE => {
                let Ok(mdb) = Mdb::parse(&block[..162]) else {
                    continue;
                };
                debug!(
                    "HFS signature at {candidate}: {:?}, {} blocks of {}",
                    mdb.volume_name, mdb.total_blocks, mdb.block_size
                );
                push(&mut sites, VolumeSite {
                    start,
                    header_offset,
                    length: mdb.byte_length().min(total - start),
                    kind: VolumeKind::Hfs,
                    embedded: false,
                });
                if mdb.embeds_hfs_plus() {
                    probe_embedded(device, total, candidate, &mdb, &mut sites)?;
                }
            }
            HFS_PLUS_SIGNATURE | HFSX_SIGNATURE => {
                let Ok(vh) = VolumeHeader::parse(&block) else {
                    continue;
                };
                debug!(
                    "HFS+ signature at {candidate}: {} blocks of {}",
                    vh.total_blocks, vh.block_size
                );
                let length = vh.total_blocks as u64 * vh.block_size as u64;
                push(&mut sites, VolumeSite {
                    start,
                    header_offset,
                    length: length.min(total - start),
                    kind: VolumeKind::HfsPlus,
                    embedded: false,
                });
            }
            _ => {}
        }
    }

    Ok(sites)
}

fn probe_embedded<R: Read + Seek>(
    device: &mut BlockDevice<R>,
    total: u64,
    wrapper_header: u64,
    mdb: &Mdb,
    sites: &mut Vec<VolumeSite>,
) -> Result<()> {
    // The embedded offset counts from the true volume start, one header
    // block before the MDB.
    let Some(inner_start) = (wrapper_header + mdb.embedded_offset()).checked_sub(HEADER_OFFSET)
    else {
        return Ok(());
    };
    if inner_start + HEADER_OFFSET + 512 > total {
        debug!("embedded HFS+ extent lies outside the device");
        return Ok(());
    }
    let block = device.read_at(inner_start + HEADER_OFFSET, 512)?;
    match BigEndian::read_u16(&block[0..2]) {
        HFS_PLUS_SIGNATURE | HFSX_SIGNATURE => {
            if VolumeHeader::parse(&block).is_ok() {
                push(sites, VolumeSite {
                    start: inner_start,
                    header_offset: HEADER_OFFSET,
                    length: mdb.embedded_length().min(total - inner_start),
                    kind: VolumeKind::HfsPlus,
                    embedded: true,
                });
            }
        }
        other => debug!("embedded area carries no HFS+ header (0x{other:04X})"),
    }
    Ok(())
}

/// The volume an operator most likely means: an embedded HFS+ volume
/// over its wrapper, then any HFS+ volume, then whatever came first.
pub fn preferred_site(sites: &[VolumeSite]) -> Option<&VolumeSite> {
    sites
        .iter()
        .find(|s| s.embedded)
        .or_else(|| sites.iter().find(|s| s.kind == VolumeKind::HfsPlus))
        .or_else(|| sites.first())
}

fn push(sites: &mut Vec<VolumeSite>, site: VolumeSite) {
    if !sites.iter().any(|s| s.start == site.start && s.kind == site.kind) {
        sites.push(site);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn device(bytes: Vec<u8>) -> BlockDevice<Cursor<Vec<u8>>> {
        BlockDevice::open(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn blank_image_yields_nothing() {
        let mut dev = device(vec![0u8; 4096]);
        assert!(probe(&mut dev).unwrap().is_empty());
    }

    #[test]
    fn finds_hfs_plus_at_standard_offset() {
        let mut image = vec![0u8; 64 * 1024];
        image[1024..1026].copy_from_slice(&HFS_PLUS_SIGNATURE.to_be_bytes());
        image[1026..1028].copy_from_slice(&4u16.to_be_bytes()); // version
        image[1064..1068].copy_from_slice(&4096u32.to_be_bytes()); // block size
        image[1068..1072].copy_from_slice(&16u32.to_be_bytes()); // total blocks
        let mut dev = device(image);
        let sites = probe(&mut dev).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].kind, VolumeKind::HfsPlus);
        assert_eq!(sites[0].start, 0);
        assert_eq!(sites[0].header_offset, 1024);
        assert_eq!(sites[0].length, 64 * 1024);
    }

    #[test]
    fn header_at_zero_is_tolerated() {
        let mut image = vec![0u8; 64 * 1024];
        image[0..2].copy_from_slice(&HFS_PLUS_SIGNATURE.to_be_bytes());
        image[2..4].copy_from_slice(&4u16.to_be_bytes());
        image[40..44].copy_from_slice(&4096u32.to_be_bytes());
        image[44..48].copy_from_slice(&16u32.to_be_bytes());
        let mut dev = device(image);
        let sites = probe(&mut dev).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].header_offset, 0);
    }
}
