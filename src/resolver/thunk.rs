//! Jump thunk following.
//!
//! Exports of protected modules frequently point at a tiny jump stub instead of the function body.
//! Two x86-64 encodings are recognised:
//!
//! - `E9 rel32` - relative jump, target `address + 5 + rel32`
//! - `FF 25 disp32` - indirect jump through a pointer stored at `address + 6 + disp32`
//!
//! Following is bounded; a chain longer than the bound, or one whose target leaves the module,
//! is a resolution failure rather than a guessed address.

use crate::{image::ModuleImage, Result};

/// Decodes the jump at `address`, returning its target.
///
/// `Ok(None)` means the instruction at `address` is not a thunk.
///
/// # Errors
///
/// Returns [`crate::Error::Resolution`] if `address` cannot be read, if a jump is cut off by the
/// end of the module, or if an indirect jump reads its pointer from outside the module.
pub fn decode(image: &ModuleImage, address: u64, symbol: &str) -> Result<Option<u64>> {
    let Ok(opcode) = image.read_u8(address) else {
        return Err(resolution_error!(
            symbol,
            "address 0x{:x} is outside of the module",
            address
        ));
    };

    match opcode {
        0xE9 => {
            let Ok(rel) = image.read_i32(address + 1) else {
                return Err(resolution_error!(
                    symbol,
                    "relative thunk at 0x{:x} is truncated",
                    address
                ));
            };
            Ok(Some(address.wrapping_add(5).wrapping_add_signed(i64::from(rel))))
        }
        0xFF if image.read_u8(address + 1).is_ok_and(|modrm| modrm == 0x25) => {
            let Ok(disp) = image.read_i32(address + 2) else {
                return Err(resolution_error!(
                    symbol,
                    "indirect thunk at 0x{:x} is truncated",
                    address
                ));
            };
            let slot = address.wrapping_add(6).wrapping_add_signed(i64::from(disp));
            match image.read_u64(slot) {
                Ok(target) => Ok(Some(target)),
                Err(_) => Err(resolution_error!(
                    symbol,
                    "indirect thunk at 0x{:x} reads its target from 0x{:x} outside of the module",
                    address,
                    slot
                )),
            }
        }
        _ => Ok(None),
    }
}

/// Follows thunks starting at `address`.
///
/// Returns the final address and the number of hops taken. A non-thunk address is returned
/// unchanged with depth 0.
///
/// # Errors
///
/// Returns [`crate::Error::Resolution`] if more than `max_depth` hops would be needed or a target
/// lies outside the module.
pub fn follow(image: &ModuleImage, address: u64, max_depth: u32, symbol: &str) -> Result<(u64, u32)> {
    let mut current = address;
    let mut depth = 0;

    while let Some(target) = decode(image, current, symbol)? {
        if depth == max_depth {
            return Err(resolution_error!(
                symbol,
                "thunk chain starting at 0x{:x} exceeds {} hops",
                address,
                max_depth
            ));
        }
        if !image.contains(target) {
            return Err(resolution_error!(
                symbol,
                "thunk at 0x{:x} jumps to 0x{:x} outside of the module",
                current,
                target
            ));
        }

        log::trace!("{}: thunk 0x{:x} -> 0x{:x}", symbol, current, target);
        current = target;
        depth += 1;
    }

    Ok((current, depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::ModuleImageBuilder, Error};

    fn jmp_rel32(from: u32, to: u32) -> Vec<u8> {
        let rel = to as i64 - (from as i64 + 5);
        let mut code = vec![0xE9];
        code.extend_from_slice(&(rel as i32).to_le_bytes());
        code
    }

    #[test]
    fn non_thunk_is_unchanged() {
        let image = ModuleImageBuilder::new()
            .text(vec![0x48, 0x8B, 0x05, 0, 0, 0, 0, 0xC3])
            .load()
            .unwrap();
        let start = image.text().start;

        assert_eq!(follow(&image, start, 10, "f").unwrap(), (start, 0));
        // Idempotent on its own result
        let (address, _) = follow(&image, start, 10, "f").unwrap();
        assert_eq!(follow(&image, address, 10, "f").unwrap(), (start, 0));
    }

    #[test]
    fn relative_chain() {
        let mut code = vec![0xCC; 0x40];
        code[0..5].copy_from_slice(&jmp_rel32(0x00, 0x10));
        code[0x10..0x15].copy_from_slice(&jmp_rel32(0x10, 0x30));
        code[0x30] = 0xC3;

        let image = ModuleImageBuilder::new().text(code).load().unwrap();
        let start = image.text().start;

        assert_eq!(follow(&image, start, 10, "f").unwrap(), (start + 0x30, 2));
        assert!(matches!(
            follow(&image, start, 1, "f"),
            Err(Error::Resolution { .. })
        ));
    }

    #[test]
    fn indirect_jump_reads_slot() {
        let base = 0x1_8000_0000_u64;
        let mut code = vec![0xCC; 0x40];
        // jmp [rip + 0x1A] -> slot at 0x20
        code[0..6].copy_from_slice(&[0xFF, 0x25, 0x1A, 0x00, 0x00, 0x00]);
        code[0x20..0x28].copy_from_slice(&(base + 0x1030).to_le_bytes());
        code[0x30] = 0xC3;

        let image = ModuleImageBuilder::new().text(code).load().unwrap();
        assert_eq!(
            follow(&image, base + 0x1000, 10, "f").unwrap(),
            (base + 0x1030, 1)
        );
    }

    #[test]
    fn cyclic_chain_terminates() {
        let mut code = jmp_rel32(0x00, 0x08);
        code.resize(8, 0xCC);
        code.extend_from_slice(&jmp_rel32(0x08, 0x00));

        let image = ModuleImageBuilder::new().text(code).load().unwrap();
        let result = follow(&image, image.text().start, 10, "il2cpp_domain_get");

        match result {
            Err(Error::Resolution { symbol, reason }) => {
                assert_eq!(symbol, "il2cpp_domain_get");
                assert!(reason.contains("exceeds 10 hops"));
            }
            other => panic!("expected resolution error, got {:?}", other),
        }
    }

    #[test]
    fn truncated_thunk_fails() {
        // jmp rel32 cut off by the end of the image
        let mut code = vec![0xCC; 0x1000];
        code[0xFFE] = 0xE9;
        code[0xFFF] = 0x00;

        let image = ModuleImageBuilder::new().text(code).load().unwrap();
        let start = image.text().start;
        assert!(!image.contains(start + 0x1000));

        match follow(&image, start + 0xFFE, 10, "f") {
            Err(Error::Resolution { reason, .. }) => assert!(reason.contains("truncated")),
            other => panic!("expected resolution error, got {:?}", other),
        }
    }

    #[test]
    fn unreadable_start_fails() {
        let image = ModuleImageBuilder::new().text(vec![0xC3]).load().unwrap();
        let outside = image.base() + image.size();

        assert!(matches!(
            decode(&image, outside, "f"),
            Err(Error::Resolution { .. })
        ));
        assert!(matches!(
            follow(&image, outside, 10, "f"),
            Err(Error::Resolution { .. })
        ));
    }

    #[test]
    fn escaping_target_fails() {
        let image = ModuleImageBuilder::new()
            .text(jmp_rel32(0, 0x7FFF_0000))
            .load()
            .unwrap();

        assert!(matches!(
            follow(&image, image.text().start, 10, "f"),
            Err(Error::Resolution { .. })
        ));
    }
}
