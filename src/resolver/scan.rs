//! Pattern, string and reference scanning over module sections.
//!
//! All scans are linear, read-only passes over section bytes. They return the first match in
//! address order; ambiguity between several matches is not resolved.

use crate::{
    image::{ModuleImage, Section},
    resolver::signature::BytePattern,
};

/// Finds the first offset in `data` where `pattern` matches.
#[must_use]
pub fn find_pattern(data: &[u8], pattern: &BytePattern) -> Option<usize> {
    if data.len() < pattern.len() {
        return None;
    }

    let (anchor, anchor_byte) = pattern.anchor();
    let last = data.len() - pattern.len();
    let mut offset = 0;

    while offset <= last {
        // Jump to the next occurrence of the first significant byte
        let search = &data[offset + anchor..=last + anchor];
        let skip = search.iter().position(|byte| *byte == anchor_byte)?;
        offset += skip;

        if pattern.matches(&data[offset..]) {
            return Some(offset);
        }
        offset += 1;
    }

    None
}

/// Scans one section for `pattern`, returning the absolute address of the first match.
#[must_use]
pub fn scan_section(image: &ModuleImage, section: &Section, pattern: &BytePattern) -> Option<u64> {
    let data = image.section_data(section).ok()?;
    find_pattern(data, pattern).map(|offset| section.start + offset as u64)
}

/// Scans the executable section for `pattern`.
#[must_use]
pub fn scan_text(image: &ModuleImage, pattern: &BytePattern) -> Option<u64> {
    scan_section(image, image.text(), pattern)
}

/// Scans every section of the module, in header order, for `pattern`.
#[must_use]
pub fn scan_module(image: &ModuleImage, pattern: &BytePattern) -> Option<u64> {
    image
        .sections()
        .iter()
        .find_map(|section| scan_section(image, section, pattern))
}

/// Finds a NUL-terminated copy of `text` in the read-only data section.
#[must_use]
pub fn find_string(image: &ModuleImage, text: &str) -> Option<u64> {
    let rdata = image.rdata()?;
    let data = image.section_data(rdata).ok()?;

    let mut needle = text.as_bytes().to_vec();
    needle.push(0);

    data.windows(needle.len())
        .position(|window| window == needle.as_slice())
        .map(|offset| rdata.start + offset as u64)
}

/// Finds the first RIP-relative `LEA` in the executable section that loads `target`.
///
/// Recognises `48 8D modrm disp32` and `4C 8D modrm disp32` with `modrm & 0xC7 == 0x05`; the
/// referenced address is `instruction + 7 + disp32`.
#[must_use]
pub fn find_string_reference(image: &ModuleImage, target: u64) -> Option<u64> {
    let text = image.text();
    let data = image.section_data(text).ok()?;
    if data.len() < 7 {
        return None;
    }

    for offset in 0..=data.len() - 7 {
        let rex = data[offset];
        if (rex != 0x48 && rex != 0x4C) || data[offset + 1] != 0x8D {
            continue;
        }
        if data[offset + 2] & 0xC7 != 0x05 {
            continue;
        }

        let disp = i32::from_le_bytes([
            data[offset + 3],
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
        ]);
        let address = text.start + offset as u64;
        if address.wrapping_add(7).wrapping_add_signed(i64::from(disp)) == target {
            return Some(address);
        }
    }

    None
}
