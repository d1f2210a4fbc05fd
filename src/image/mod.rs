//! Module introspection for the target runtime module.
//!
//! This module parses the headers of the module that hosts the foreign runtime, locates the
//! executable and read-only-data sections and builds the name → address export table that the
//! [`crate::resolver`] works from. The result, [`ModuleImage`], is built once per attached module
//! and is immutable afterwards.
//!
//! # Architecture
//!
//! - **Backend system** - Pluggable byte sources (live process memory, memory-mapped dumps,
//!   owned buffers) behind the [`Backend`] trait
//! - **Header validation** - Magic checks on the DOS, PE and optional headers before the
//!   structure is handed to goblin
//! - **Section lookup** - `{start, size}` for `.text` and `.rdata` in absolute addresses
//! - **Export table** - Names, ordinals and function RVAs folded into an ordered map
//!
//! # Key Components
//!
//! - [`ModuleImage`] - The parsed module
//! - [`Section`] - A section in absolute address space
//! - [`Export`] - One named export
//! - [`LoadedModule`] - Backend over a module mapped into the current process
//! - [`ModuleImageBuilder`] - Synthetic PE32+ images for tests and tooling
//!
//! # Layouts
//!
//! A module mapped by the OS loader has every section at its RVA ([`ImageLayout::Mapped`]); a PE
//! file on disk stores sections at their raw file offsets ([`ImageLayout::File`]). Both are
//! supported, all public addresses are absolute (`base + rva`) and translation to backend offsets
//! happens internally.
//!
//! # Examples
//!
//! ```rust,no_run
//! use il2scope::image::ModuleImage;
//!
//! let image = ModuleImage::from_file("GameAssembly.dll".as_ref())?;
//! println!("base 0x{:x}, {} exports", image.base(), image.exports().len());
//! println!(".text at 0x{:x} ({} bytes)", image.text().start, image.text().size);
//! # Ok::<(), il2scope::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! [`ModuleImage`] is `Send + Sync` and is shared between threads behind an `Arc`.

pub mod io;

mod builder;
mod mapped;
mod memory;
mod physical;

pub use builder::{ModuleImageBuilder, SECTION_CODE, SECTION_RDATA};
pub use mapped::LoadedModule;

use std::{collections::HashMap, path::Path};

use goblin::pe::{options::ParseOptions, PE};

use crate::{
    image::io::read_le,
    Error::{Empty, GoblinErr, OutOfBounds},
    Result,
};
use memory::Memory;
use physical::Physical;

/// `MZ`
const DOS_MAGIC: u16 = 0x5A4D;
/// `PE\0\0`
const PE_MAGIC: u32 = 0x0000_4550;
/// Optional header magic of PE32 images
const PE32_MAGIC: u16 = 0x10B;
/// Optional header magic of PE32+ images
const PE32PLUS_MAGIC: u16 = 0x20B;
/// `IMAGE_SCN_MEM_EXECUTE`
const SCN_MEM_EXECUTE: u32 = 0x2000_0000;

/// Backend trait for module data sources.
///
/// This trait abstracts over where the bytes of a module come from, allowing the same parsing
/// and scanning code to run against a live module, a dump on disk, or a test buffer. All
/// implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// How section contents are arranged in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    /// Sections live at their RVA (loaded modules, memory dumps)
    Mapped,
    /// Sections live at their raw file offset (PE files on disk)
    File,
}

/// A section of the module in absolute address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name without trailing NULs
    pub name: String,
    /// Absolute address of the first byte
    pub start: u64,
    /// Size in bytes as mapped
    pub size: u64,
    /// Relative virtual address
    pub rva: u32,
    /// Offset of the contents in a file-layout image
    pub raw_offset: u32,
    /// Size of the contents in a file-layout image
    pub raw_size: u32,
    /// `IMAGE_SCN_*` flags
    pub characteristics: u32,
}

impl Section {
    /// Returns `true` if `address` lies in `[start, start + size)`.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address - self.start < self.size
    }

    /// One past the last address of the section.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    /// Returns `true` if the section is mapped executable.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.characteristics & SCN_MEM_EXECUTE != 0
    }
}

/// A named export of the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    /// Exported name
    pub name: String,
    /// Function RVA
    pub rva: u32,
    /// Absolute address (`base + rva`)
    pub address: u64,
}

/// A parsed module image.
///
/// Holds the backend the module was read from together with everything extracted from its
/// headers. Lookups never re-parse; all accessors are cheap.
pub struct ModuleImage {
    data: Box<dyn Backend>,
    layout: ImageLayout,
    base: u64,
    size: u64,
    is_64: bool,
    sections: Vec<Section>,
    text: usize,
    rdata: Option<usize>,
    exports: Vec<Export>,
    export_index: HashMap<String, usize>,
}

impl std::fmt::Debug for ModuleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleImage")
            .field("layout", &self.layout)
            .field("base", &format_args!("0x{:x}", self.base))
            .field("size", &self.size)
            .field("sections", &self.sections.len())
            .field("exports", &self.exports.len())
            .finish()
    }
}

impl ModuleImage {
    /// Parses a PE file on disk. The preferred image base is used as base address.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be mapped or is not a valid PE image.
    pub fn from_file(path: &Path) -> Result<ModuleImage> {
        Self::load(Physical::new(path)?, ImageLayout::File, None)
    }

    /// Parses a memory dump of a loaded module that was captured at `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be mapped or does not contain a valid image.
    pub fn from_dump(path: &Path, base: u64) -> Result<ModuleImage> {
        Self::load(Physical::new(path)?, ImageLayout::Mapped, Some(base))
    }

    /// Parses an image held in memory.
    ///
    /// `base` overrides the preferred image base from the optional header.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty or not a valid PE image.
    pub fn from_mem(data: Vec<u8>, layout: ImageLayout, base: Option<u64>) -> Result<ModuleImage> {
        Self::load(Memory::new(data), layout, base)
    }

    /// Parses a module that is mapped in the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapped headers are malformed.
    pub fn from_loaded(module: LoadedModule) -> Result<ModuleImage> {
        let base = module.base();
        Self::load(module, ImageLayout::Mapped, Some(base))
    }

    fn load<T: Backend + 'static>(
        data: T,
        layout: ImageLayout,
        base: Option<u64>,
    ) -> Result<ModuleImage> {
        if data.len() == 0 {
            return Err(Empty);
        }

        validate_headers(data.data())?;

        let mut opts = ParseOptions::default();
        opts.resolve_rva = layout == ImageLayout::File;
        opts.parse_attribute_certificates = false;

        let pe = PE::parse_with_opts(data.data(), &opts).map_err(GoblinErr)?;
        let Some(optional_header) = pe.header.optional_header else {
            return Err(malformed_error!("Module does not have an OptionalHeader"));
        };

        let base = base.unwrap_or(pe.image_base as u64);
        let size = u64::from(optional_header.windows_fields.size_of_image);

        let mut sections = Vec::with_capacity(pe.sections.len());
        for section in &pe.sections {
            let name = String::from_utf8_lossy(&section.name)
                .trim_end_matches('\0')
                .to_string();
            let mapped_size = if section.virtual_size == 0 {
                section.size_of_raw_data
            } else {
                section.virtual_size
            };

            sections.push(Section {
                name,
                start: base + u64::from(section.virtual_address),
                size: u64::from(mapped_size),
                rva: section.virtual_address,
                raw_offset: section.pointer_to_raw_data,
                raw_size: section.size_of_raw_data,
                characteristics: section.characteristics,
            });
        }

        let text = sections
            .iter()
            .position(|section| section.name == ".text")
            .or_else(|| sections.iter().position(Section::is_executable))
            .ok_or_else(|| malformed_error!("Module has no executable section"))?;
        let rdata = sections.iter().position(|section| section.name == ".rdata");

        let mut exports = Vec::with_capacity(pe.exports.len());
        let mut export_index = HashMap::with_capacity(pe.exports.len());
        for export in &pe.exports {
            let Some(name) = export.name else {
                continue;
            };
            if export.reexport.is_some() {
                continue;
            }

            let rva = export.rva as u32;
            if !export_index.contains_key(name) {
                export_index.insert(name.to_string(), exports.len());
                exports.push(Export {
                    name: name.to_string(),
                    rva,
                    address: base + u64::from(rva),
                });
            }
        }

        let is_64 = pe.is_64;
        drop(pe);

        log::debug!(
            "parsed module at 0x{:x}: {} sections, {} exports",
            base,
            sections.len(),
            exports.len()
        );

        Ok(ModuleImage {
            data: Box::new(data),
            layout,
            base,
            size,
            is_64,
            sections,
            text,
            rdata,
            exports,
            export_index,
        })
    }

    /// Load address of the module.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Size of the mapped image (`SizeOfImage`).
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Layout of the backing data.
    #[must_use]
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Returns `true` for PE32+ images.
    #[must_use]
    pub fn is_64(&self) -> bool {
        self.is_64
    }

    /// Returns `true` if `address` lies inside `[base, base + size)`.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address - self.base < self.size
    }

    /// All sections in header order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Looks up a section by name.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// The executable section.
    #[must_use]
    pub fn text(&self) -> &Section {
        &self.sections[self.text]
    }

    /// The read-only data section, if present.
    #[must_use]
    pub fn rdata(&self) -> Option<&Section> {
        self.rdata.map(|index| &self.sections[index])
    }

    /// All named exports in export-table enumeration order.
    #[must_use]
    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    /// Looks up an export by exact name.
    #[must_use]
    pub fn export(&self, name: &str) -> Option<&Export> {
        self.export_index
            .get(name)
            .map(|index| &self.exports[*index])
    }

    /// Converts an RVA into an absolute address.
    #[must_use]
    pub fn address_of_rva(&self, rva: u64) -> u64 {
        self.base + rva
    }

    /// Converts an absolute address into an RVA.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the address is outside of the module.
    pub fn rva_of(&self, address: u64) -> Result<u64> {
        if !self.contains(address) {
            return Err(OutOfBounds);
        }

        Ok(address - self.base)
    }

    /// Reads `len` bytes starting at absolute `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range is not backed by module data.
    pub fn read(&self, address: u64, len: usize) -> Result<&[u8]> {
        let rva = self.rva_of(address)?;
        let offset = self.rva_to_offset(rva)?;
        self.data.data_slice(offset, len)
    }

    /// Reads one byte at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `address` is not backed by module data.
    pub fn read_u8(&self, address: u64) -> Result<u8> {
        read_le::<u8>(self.read(address, 1)?)
    }

    /// Reads a little-endian `u32` at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the read leaves the module.
    pub fn read_u32(&self, address: u64) -> Result<u32> {
        read_le::<u32>(self.read(address, 4)?)
    }

    /// Reads a little-endian `i32` at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the read leaves the module.
    pub fn read_i32(&self, address: u64) -> Result<i32> {
        read_le::<i32>(self.read(address, 4)?)
    }

    /// Reads a little-endian `u64` at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the read leaves the module.
    pub fn read_u64(&self, address: u64) -> Result<u64> {
        read_le::<u64>(self.read(address, 8)?)
    }

    /// Returns the bytes of `section` that are backed by data.
    ///
    /// For file-layout images this is the smaller of the mapped and raw size; for mapped images
    /// it is clamped to the end of the backend.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the section starts outside of the data.
    pub fn section_data(&self, section: &Section) -> Result<&[u8]> {
        let (offset, len) = match self.layout {
            ImageLayout::Mapped => (section.rva as usize, section.size as usize),
            ImageLayout::File => (
                section.raw_offset as usize,
                section.size.min(u64::from(section.raw_size)) as usize,
            ),
        };

        if offset > self.data.len() {
            return Err(OutOfBounds);
        }

        let len = len.min(self.data.len() - offset);
        self.data.data_slice(offset, len)
    }

    /// The whole backing buffer.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    fn rva_to_offset(&self, rva: u64) -> Result<usize> {
        match self.layout {
            ImageLayout::Mapped => usize::try_from(rva).map_err(|_| OutOfBounds),
            ImageLayout::File => {
                for section in &self.sections {
                    let start = u64::from(section.rva);
                    let span = section.size.max(u64::from(section.raw_size));
                    if rva >= start && rva < start + span {
                        let delta = rva - start;
                        if delta >= u64::from(section.raw_size) {
                            return Err(OutOfBounds);
                        }
                        return usize::try_from(u64::from(section.raw_offset) + delta)
                            .map_err(|_| OutOfBounds);
                    }
                }

                // Headers are stored 1:1 before the first section
                let first = self
                    .sections
                    .iter()
                    .map(|section| u64::from(section.rva))
                    .min()
                    .unwrap_or(0);
                if rva < first {
                    return usize::try_from(rva).map_err(|_| OutOfBounds);
                }

                Err(OutOfBounds)
            }
        }
    }
}

/// Checks DOS, PE and optional header magic before handing the buffer to goblin.
fn validate_headers(data: &[u8]) -> Result<()> {
    if data.len() < 0x40 {
        return Err(malformed_error!(
            "Module is too small for a DOS header - {} bytes",
            data.len()
        ));
    }

    if read_le::<u16>(data)? != DOS_MAGIC {
        return Err(malformed_error!("Invalid DOS signature"));
    }

    let pe_offset = read_le::<u32>(&data[0x3C..])? as usize;
    let Some(signature) = pe_offset
        .checked_add(4)
        .and_then(|end| data.get(pe_offset..end))
    else {
        return Err(malformed_error!(
            "PE header offset 0x{:x} is outside of the module",
            pe_offset
        ));
    };
    if read_le::<u32>(signature)? != PE_MAGIC {
        return Err(malformed_error!("Invalid PE signature"));
    }

    let magic_offset = pe_offset + 4 + 20;
    let Some(magic) = data.get(magic_offset..magic_offset + 2) else {
        return Err(malformed_error!("Module does not have an OptionalHeader"));
    };
    match read_le::<u16>(magic)? {
        PE32_MAGIC | PE32PLUS_MAGIC => Ok(()),
        other => Err(malformed_error!("Unknown optional header magic 0x{:x}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn sample() -> ModuleImageBuilder {
        ModuleImageBuilder::new()
            .text(vec![0xCC; 0x40])
            .rdata(b"System.Private.CoreLib\0".to_vec())
            .export("il2cpp_domain_get", ".text", 0x10)
            .export("il2cpp_thread_attach", ".text", 0x20)
            .export("il2cpp_string_new", ".text", 0x30)
    }

    #[test]
    fn parses_sections_and_exports() {
        let image = sample().load().unwrap();

        assert_eq!(image.base(), 0x1_8000_0000);
        assert!(image.is_64());
        assert_eq!(image.text().name, ".text");
        assert_eq!(image.text().start, 0x1_8000_1000);
        assert_eq!(image.text().size, 0x40);
        assert_eq!(image.rdata().unwrap().start, 0x1_8000_2000);

        let names: Vec<&str> = image.exports().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            ["il2cpp_domain_get", "il2cpp_thread_attach", "il2cpp_string_new"]
        );

        // Reversed function table, resolved through the ordinal table
        assert_eq!(
            image.export("il2cpp_domain_get").unwrap().address,
            0x1_8000_1010
        );
        assert_eq!(
            image.export("il2cpp_string_new").unwrap().address,
            0x1_8000_1030
        );
        assert!(image.export("il2cpp_domain_get_assemblies").is_none());
    }

    #[test]
    fn rebased_mapped_image() {
        let bytes = sample().build().unwrap();
        let image = ModuleImage::from_mem(bytes, ImageLayout::Mapped, Some(0x7FF6_0000_0000)).unwrap();

        assert_eq!(image.text().start, 0x7FF6_0000_1000);
        assert_eq!(
            image.export("il2cpp_thread_attach").unwrap().address,
            0x7FF6_0000_1020
        );
    }

    #[test]
    fn file_layout_reads_match() {
        let bytes = sample().build().unwrap();
        let image = ModuleImage::from_mem(bytes, ImageLayout::File, None).unwrap();

        let rdata = image.rdata().unwrap();
        assert_eq!(image.read(rdata.start, 6).unwrap(), b"System");
        assert_eq!(image.section_data(image.text()).unwrap().len(), 0x40);
    }

    #[test]
    fn reads_are_bounded() {
        let image = sample().load().unwrap();

        assert!(image.contains(image.base()));
        assert!(!image.contains(image.base() + image.size()));
        assert!(image.read(image.base() - 1, 1).is_err());
        assert!(image.read(image.base() + image.size(), 1).is_err());
        assert_eq!(image.read_u32(image.text().start).unwrap(), 0xCCCC_CCCC);
        assert_eq!(image.rva_of(image.text().start).unwrap(), 0x1000);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().build().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            ModuleImage::from_mem(bytes, ImageLayout::Mapped, None),
            Err(Error::ModuleParse { .. })
        ));

        let mut bytes = sample().build().unwrap();
        bytes[0x80] = b'N';
        assert!(matches!(
            ModuleImage::from_mem(bytes, ImageLayout::Mapped, None),
            Err(Error::ModuleParse { .. })
        ));

        let mut bytes = sample().build().unwrap();
        bytes[0x98] = 0x07;
        assert!(matches!(
            ModuleImage::from_mem(bytes, ImageLayout::Mapped, None),
            Err(Error::ModuleParse { .. })
        ));
    }

    #[test]
    fn rejects_truncated_and_empty() {
        assert!(matches!(
            ModuleImage::from_mem(Vec::new(), ImageLayout::Mapped, None),
            Err(Error::Empty)
        ));
        assert!(matches!(
            ModuleImage::from_mem(vec![b'M', b'Z', 0, 0], ImageLayout::Mapped, None),
            Err(Error::ModuleParse { .. })
        ));

        let mut bytes = sample().build().unwrap();
        bytes[0x3C..0x40].copy_from_slice(&0xFFFF_FF00_u32.to_le_bytes());
        assert!(matches!(
            ModuleImage::from_mem(bytes, ImageLayout::Mapped, None),
            Err(Error::ModuleParse { .. })
        ));
    }

    #[test]
    fn loaded_module_round_trip() {
        let bytes = sample().build().unwrap();
        let module = unsafe { LoadedModule::new(bytes.as_ptr(), bytes.len()) };
        let image = ModuleImage::from_loaded(module).unwrap();

        assert_eq!(image.base(), bytes.as_ptr() as u64);
        let export = image.export("il2cpp_domain_get").unwrap();
        assert_eq!(export.address, bytes.as_ptr() as u64 + 0x1010);
        assert_eq!(image.read(export.address, 1).unwrap(), &[0xCC]);
    }
}
