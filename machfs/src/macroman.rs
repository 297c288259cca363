//! MacRoman text decoding.
//!
//! HFS names are length-prefixed MacRoman strings. They decode to the
//! canonically decomposed Unicode form HFS+ stores on disk (TN1150's
//! "Unicode 2.0 decomposed" convention), so a decoded HFS name can be
//! used directly as a quarry key against an HFS+ catalog.

use crate::error::{HfsError, Result};

/// Decompositions for MacRoman 0x80–0xFF. Accented letters map to base
/// letter + combining mark; everything else is a single code unit.
static HIGH_HALF: [&[u16]; 128] = [
    &[0x0041, 0x0308], // 0x80 Ä
    &[0x0041, 0x030A], // 0x81 Å
    &[0x0043, 0x0327], // 0x82 Ç
    &[0x0045, 0x0301], // 0x83 É
    &[0x004E, 0x0303], // 0x84 Ñ
    &[0x004F, 0x0308], // 0x85 Ö
    &[0x0055, 0x0308], // 0x86 Ü
    &[0x0061, 0x0301], // 0x87 á
    &[0x0061, 0x0300], // 0x88 à
    &[0x0061, 0x0302], // 0x89 â
    &[0x0061, 0x0308], // 0x8A ä
    &[0x0061, 0x0303], // 0x8B ã
    &[0x0061, 0x030A], // 0x8C å
    &[0x0063, 0x0327], // 0x8D ç
    &[0x0065, 0x0301], // 0x8E é
    &[0x0065, 0x0300], // 0x8F è
    &[0x0065, 0x0302], // 0x90 ê
    &[0x0065, 0x0308], // 0x91 ë
    &[0x0069, 0x0301], // 0x92 í
    &[0x0069, 0x0300], // 0x93 ì
    &[0x0069, 0x0302], // 0x94 î
    &[0x0069, 0x0308], // 0x95 ï
    &[0x006E, 0x0303], // 0x96 ñ
    &[0x006F, 0x0301], // 0x97 ó
    &[0x006F, 0x0300], // 0x98 ò
    &[0x006F, 0x0302], // 0x99 ô
    &[0x006F, 0x0308], // 0x9A ö
    &[0x006F, 0x0303], // 0x9B õ
    &[0x0075, 0x0301], // 0x9C ú
    &[0x0075, 0x0300], // 0x9D ù
    &[0x0075, 0x0302], // 0x9E û
    &[0x0075, 0x0308], // 0x9F ü
    &[0x2020],         // 0xA0 †
    &[0x00B0],         // 0xA1 °
    &[0x00A2],         // 0xA2 ¢
    &[0x00A3],         // 0xA3 £
    &[0x00A7],         // 0xA4 §
    &[0x2022],         // 0xA5 •
    &[0x00B6],         // 0xA6 ¶
    &[0x00DF],         // 0xA7 ß
    &[0x00AE],         // 0xA8 ®
    &[0x00A9],         // 0xA9 ©
    &[0x2122],         // 0xAA ™
    &[0x00B4],         // 0xAB ´
    &[0x00A8],         // 0xAC ¨
    &[0x2260],         // 0xAD ≠
    &[0x00C6],         // 0xAE Æ
    &[0x00D8],         // 0xAF Ø
    &[0x221E],         // 0xB0 ∞
    &[0x00B1],         // 0xB1 ±
    &[0x2264],         // 0xB2 ≤
    &[0x2265],         // 0xB3 ≥
    &[0x00A5],         // 0xB4 ¥
    &[0x00B5],         // 0xB5 µ
    &[0x2202],         // 0xB6 ∂
    &[0x2211],         // 0xB7 ∑
    &[0x220F],         // 0xB8 ∏
    &[0x03C0],         // 0xB9 π
    &[0x222B],         // 0xBA ∫
    &[0x00AA],         // 0xBB ª
    &[0x00BA],         // 0xBC º
    &[0x03A9],         // 0xBD Ω
    &[0x00E6],         // 0xBE æ
    &[0x00F8],         // 0xBF ø
    &[0x00BF],         // 0xC0 ¿
    &[0x00A1],         // 0xC1 ¡
    &[0x00AC],         // 0xC2 ¬
    &[0x221A],         // 0xC3 √
    &[0x0192],         // 0xC4 ƒ
    &[0x2248],         // 0xC5 ≈
    &[0x2206],         // 0xC6 ∆
    &[0x00AB],         // 0xC7 «
    &[0x00BB],         // 0xC8 »
    &[0x2026],         // 0xC9 …
    &[0x00A0],         // 0xCA no-break space
    &[0x0041, 0x0300], // 0xCB À
    &[0x0041, 0x0303], // 0xCC Ã
    &[0x004F, 0x0303], // 0xCD Õ
    &[0x0152],         // 0xCE Œ
    &[0x0153],         // 0xCF œ
    &[0x2013],         // 0xD0 –
    &[0x2014],         // 0xD1 —
    &[0x201C],         // 0xD2 “
    &[0x201D],         // 0xD3 ”
    &[0x2018],         // 0xD4 ‘
    &[0x2019],         // 0xD5 ’
    &[0x00F7],         // 0xD6 ÷
    &[0x25CA],         // 0xD7 ◊
    &[0x0079, 0x0308], // 0xD8 ÿ
    &[0x0059, 0x0308], // 0xD9 Ÿ
    &[0x2044],         // 0xDA ⁄
    &[0x20AC],         // 0xDB €
    &[0x2039],         // 0xDC ‹
    &[0x203A],         // 0xDD ›
    &[0xFB01],         // 0xDE ﬁ
    &[0xFB02],         // 0xDF ﬂ
    &[0x2021],         // 0xE0 ‡
    &[0x00B7],         // 0xE1 ·
    &[0x201A],         // 0xE2 ‚
    &[0x201E],         // 0xE3 „
    &[0x2030],         // 0xE4 ‰
    &[0x0041, 0x0302], // 0xE5 Â
    &[0x0045, 0x0302], // 0xE6 Ê
    &[0x0041, 0x0301], // 0xE7 Á
    &[0x0045, 0x0308], // 0xE8 Ë
    &[0x0045, 0x0300], // 0xE9 È
    &[0x0049, 0x0301], // 0xEA Í
    &[0x0049, 0x0302], // 0xEB Î
    &[0x0049, 0x0308], // 0xEC Ï
    &[0x0049, 0x0300], // 0xED Ì
    &[0x004F, 0x0301], // 0xEE Ó
    &[0x004F, 0x0302], // 0xEF Ô
    &[0xF8FF],         // 0xF0 Apple logo
    &[0x004F, 0x0300], // 0xF1 Ò
    &[0x0055, 0x0301], // 0xF2 Ú
    &[0x0055, 0x0302], // 0xF3 Û
    &[0x0055, 0x0300], // 0xF4 Ù
    &[0x0131],         // 0xF5 ı
    &[0x02C6],         // 0xF6 ˆ
    &[0x02DC],         // 0xF7 ˜
    &[0x00AF],         // 0xF8 ¯
    &[0x02D8],         // 0xF9 ˘
    &[0x02D9],         // 0xFA ˙
    &[0x02DA],         // 0xFB ˚
    &[0x00B8],         // 0xFC ¸
    &[0x02DD],         // 0xFD ˝
    &[0x02DB],         // 0xFE ˛
    &[0x02C7],         // 0xFF ˇ
];

/// Decode MacRoman bytes to decomposed UTF-16 code units, refusing to
/// emit more than `max_units`.
pub fn to_units(bytes: &[u8], max_units: usize) -> Result<Vec<u16>> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        let units: &[u16] = if b < 0x80 {
            out.push(b as u16);
            continue;
        } else {
            HIGH_HALF[(b - 0x80) as usize]
        };
        out.extend_from_slice(units);
    }
    if out.len() > max_units {
        return Err(HfsError::OutputTooSmall);
    }
    Ok(out)
}

/// Decode a length-prefixed MacRoman string (Pascal convention).
pub fn pascal_to_units(pascal: &[u8], max_units: usize) -> Result<Vec<u16>> {
    let len = *pascal.first().ok_or(HfsError::OutputTooSmall)? as usize;
    if pascal.len() < 1 + len {
        return Err(HfsError::OutputTooSmall);
    }
    to_units(&pascal[1..1 + len], max_units)
}

/// Decode MacRoman bytes straight to a displayable string.
pub fn to_string(bytes: &[u8]) -> String {
    // 2 units per source byte is the worst case, so no cap can be hit.
    let units = to_units(bytes, bytes.len() * 2).unwrap_or_default();
    String::from_utf16_lossy(&units)
}

/// Re-encode decomposed code units as MacRoman. Returns `None` when a
/// unit (or base + combining pair) has no MacRoman equivalent.
pub fn from_units(units: &[u16]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(units.len());
    let mut i = 0;
    while i < units.len() {
        if units[i] < 0x80 {
            // ASCII maps to itself unless the next unit composes with it
            if i + 1 >= units.len() || lookup(&units[i..i + 2]).is_none() {
                out.push(units[i] as u8);
                i += 1;
                continue;
            }
        }
        if i + 1 < units.len() {
            if let Some(b) = lookup(&units[i..i + 2]) {
                out.push(b);
                i += 2;
                continue;
            }
        }
        out.push(lookup(&units[i..i + 1])?);
        i += 1;
    }
    Some(out)
}

/// Re-encode a Rust string as MacRoman, decomposing on the fly is not
/// attempted; the caller supplies decomposed or plain text.
pub fn from_str(s: &str) -> Option<Vec<u8>> {
    let units: Vec<u16> = s.encode_utf16().collect();
    from_units(&units)
}

fn lookup(seq: &[u16]) -> Option<u8> {
    HIGH_HALF
        .iter()
        .position(|&entry| entry == seq)
        .map(|i| (i + 0x80) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_cafe_decomposed() {
        // Pascal string "Caf\x8E": 0x8E is MacRoman é
        let units = pascal_to_units(b"\x04Caf\x8E", 255).unwrap();
        assert_eq!(units, [0x0043, 0x0061, 0x0066, 0x0065, 0x0301]);
        assert_eq!(String::from_utf16_lossy(&units), "Cafe\u{301}");
    }

    #[test]
    fn refuses_oversized_output() {
        let err = to_units(b"\x8E\x8E", 3).unwrap_err();
        assert!(matches!(err, HfsError::OutputTooSmall));
    }

    #[test]
    fn round_trips_every_byte() {
        for b in 0u8..=255 {
            let units = to_units(&[b], 2).unwrap();
            let back = from_units(&units).unwrap();
            assert_eq!(back, [b], "byte 0x{b:02X} did not round-trip");
        }
    }

    #[test]
    fn rejects_unmappable() {
        assert!(from_str("日本語").is_none());
    }
}
