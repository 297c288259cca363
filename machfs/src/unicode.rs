//! UTF-16 helpers and HFS+ name ordering.
//!
//! HFS+ orders catalog names with a case-folding comparison (Apple's
//! FastUnicodeCompare, TN1150); HFSX uses plain binary comparison of the
//! UTF-16 code units. Both operate on unswapped host-order units.

use std::cmp::Ordering;

/// Case-fold one UTF-16 code unit for HFS+ name ordering.
///
/// Covers Basic Latin, Latin-1 and Latin Extended-A, the ranges the
/// on-disk fold table differs from identity for in practice.
pub fn fold(c: u16) -> u16 {
    match c {
        0x0041..=0x005A => c + 0x20,
        // Latin-1 uppercase, minus the multiplication sign at 0x00D7
        0x00C0..=0x00D6 | 0x00D8..=0x00DE => c + 0x20,
        // Latin Extended-A pairs alternate upper/lower
        0x0130 => 0x0069, // dotted capital I folds to plain i
        0x0178 => 0x00FF, // capital Y-diaeresis pairs with Latin-1 ÿ
        0x0100..=0x0137 | 0x014A..=0x0177 if c & 1 == 0 => c + 1,
        0x0139..=0x0148 | 0x0179..=0x017E if c & 1 == 1 => c + 1,
        _ => c,
    }
}

/// Compare two names under the HFS+ case-insensitive ordering.
pub fn compare_folded(a: &[u16], b: &[u16]) -> Ordering {
    let len = a.len().min(b.len());
    for i in 0..len {
        match fold(a[i]).cmp(&fold(b[i])) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

/// Compare two names code unit by code unit (HFSX, case-sensitive).
pub fn compare_binary(a: &[u16], b: &[u16]) -> Ordering {
    let len = a.len().min(b.len());
    for i in 0..len {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

/// Swap a UTF-16BE byte slice into host-order code units.
pub fn utf16be_to_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Render code units as a displayable string.
pub fn units_to_string(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

/// Encode a Rust string as UTF-16 code units.
pub fn string_to_units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_compare() {
        let a = string_to_units("abc");
        assert_eq!(compare_binary(&a, &string_to_units("abd")), Ordering::Less);
        assert_eq!(compare_binary(&a, &string_to_units("abc")), Ordering::Equal);
        assert_eq!(compare_binary(&a, &string_to_units("ab")), Ordering::Greater);
    }

    #[test]
    fn folded_compare_ignores_case() {
        let upper = string_to_units("ÀBĆ");
        let lower = string_to_units("àbć");
        assert_eq!(compare_folded(&upper, &lower), Ordering::Equal);
        assert_eq!(
            compare_folded(&string_to_units("Alpha"), &string_to_units("beta")),
            Ordering::Less
        );
    }

    #[test]
    fn fold_specials() {
        assert_eq!(fold(0x0130), 0x0069);
        assert_eq!(fold(0x0178), 0x00FF);
        assert_eq!(fold(0x00D7), 0x00D7); // × is not a letter
        assert_eq!(fold(0x0141), 0x0142); // Ł -> ł
    }

    #[test]
    fn utf16_swap_and_back() {
        let be = [0x00, 0x43, 0x00, 0x61, 0x00, 0x66, 0x00, 0xE9];
        let units = utf16be_to_units(&be);
        assert_eq!(units, [0x0043, 0x0061, 0x0066, 0x00E9]);
        assert_eq!(units_to_string(&units), "Café");
    }
}
