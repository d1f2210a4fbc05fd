//! Builder for synthetic PE32+ module images.
//!
//! [`ModuleImageBuilder`] lays out a minimal but well-formed x64 module: DOS header, PE headers,
//! a section table, the section contents and an optional export directory. Sections are placed so
//! that every RVA equals its file offset, which makes the produced bytes valid both as an on-disk
//! file and as a mapped image. It is used to build fixtures for the resolver and to craft modules
//! with obfuscated export tables.
//!
//! # Examples
//!
//! ```rust
//! use il2scope::image::ModuleImageBuilder;
//!
//! let image = ModuleImageBuilder::new()
//!     .text(vec![0x48, 0x8B, 0x05, 0x10, 0x00, 0x00, 0x00, 0xC3])
//!     .rdata(b"UnityEngine\0".to_vec())
//!     .export("il2cpp_domain_get", ".text", 0)
//!     .load()?;
//!
//! assert!(image.export("il2cpp_domain_get").is_some());
//! # Ok::<(), il2scope::Error>(())
//! ```

use crate::{
    image::{io::write_le_at, ImageLayout, ModuleImage},
    Result,
};

/// Alignment used for both sections and raw data, keeping RVA == file offset
const PAGE: u32 = 0x1000;
/// Offset of the PE signature in the generated image
const PE_OFFSET: u32 = 0x80;
/// Size of a PE32+ optional header with 16 data directories
const OPTIONAL_HEADER_SIZE: u16 = 240;

/// `IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ`
pub const SECTION_CODE: u32 = 0x6000_0020;
/// `IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ`
pub const SECTION_RDATA: u32 = 0x4000_0040;

struct SectionSpec {
    name: String,
    data: Vec<u8>,
    characteristics: u32,
}

struct ExportSpec {
    name: String,
    section: String,
    offset: u32,
}

/// Fluent builder producing a PE32+ image.
pub struct ModuleImageBuilder {
    image_base: u64,
    dll_name: String,
    sections: Vec<SectionSpec>,
    exports: Vec<ExportSpec>,
}

impl Default for ModuleImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleImageBuilder {
    /// Creates an empty builder with the preferred base `0x1_8000_0000`.
    pub fn new() -> Self {
        ModuleImageBuilder {
            image_base: 0x1_8000_0000,
            dll_name: "GameAssembly.dll".to_string(),
            sections: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Sets the preferred image base written to the optional header.
    #[must_use]
    pub fn image_base(mut self, base: u64) -> Self {
        self.image_base = base;
        self
    }

    /// Sets the module name stored in the export directory.
    #[must_use]
    pub fn dll_name(mut self, name: &str) -> Self {
        self.dll_name = name.to_string();
        self
    }

    /// Adds an executable `.text` section.
    #[must_use]
    pub fn text(self, code: Vec<u8>) -> Self {
        self.section(".text", code, SECTION_CODE)
    }

    /// Adds a read-only `.rdata` section.
    #[must_use]
    pub fn rdata(self, data: Vec<u8>) -> Self {
        self.section(".rdata", data, SECTION_RDATA)
    }

    /// Adds an arbitrary section. Names longer than eight bytes are truncated.
    #[must_use]
    pub fn section(mut self, name: &str, data: Vec<u8>, characteristics: u32) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            data,
            characteristics,
        });
        self
    }

    /// Exports `name` at `offset` bytes into section `section`.
    ///
    /// Exports keep the order in which they are added; the function table is written in reverse
    /// so lookups have to go through the name-ordinal table.
    #[must_use]
    pub fn export(mut self, name: &str, section: &str, offset: u32) -> Self {
        self.exports.push(ExportSpec {
            name: name.to_string(),
            section: section.to_string(),
            offset,
        });
        self
    }

    /// Parses the built image as a mapped module based at the preferred image base.
    ///
    /// # Errors
    ///
    /// Returns an error if an export references an unknown section or the image does not parse.
    pub fn load(self) -> Result<ModuleImage> {
        let base = self.image_base;
        let data = self.build()?;
        ModuleImage::from_mem(data, ImageLayout::Mapped, Some(base))
    }

    /// Produces the raw image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if an export references an unknown section, or
    /// [`crate::Error::ModuleParse`] if a section, the export count or the export directory does
    /// not fit its PE header field.
    pub fn build(self) -> Result<Vec<u8>> {
        let mut rvas = Vec::with_capacity(self.sections.len() + 1);
        let mut next_rva = PAGE;
        for section in &self.sections {
            rvas.push(next_rva);
            next_rva += align(section_len(section.data.len())?, PAGE);
        }

        let mut sections: Vec<(String, Vec<u8>, u32, u32)> = self
            .sections
            .iter()
            .zip(&rvas)
            .map(|(spec, rva)| {
                (
                    spec.name.clone(),
                    spec.data.clone(),
                    spec.characteristics,
                    *rva,
                )
            })
            .collect();

        let mut export_dir = (0_u32, 0_u32);
        if !self.exports.is_empty() {
            let edata_rva = next_rva;
            let mut targets = Vec::with_capacity(self.exports.len());
            for export in &self.exports {
                let Some((_, _, _, rva)) = sections.iter().find(|s| s.0 == export.section) else {
                    return Err(crate::Error::InvalidArgument(format!(
                        "export '{}' references unknown section '{}'",
                        export.name, export.section
                    )));
                };
                targets.push(rva + export.offset);
            }

            let edata = self.build_export_directory(edata_rva, &targets)?;
            let edata_len = u32::try_from(edata.len())
                .map_err(|_| malformed_error!("Export directory too large"))?;
            export_dir = (edata_rva, edata_len);
            next_rva += align(section_len(edata.len())?, PAGE);
            sections.push((".edata".to_string(), edata, SECTION_RDATA, edata_rva));
        }

        let size_of_image = next_rva;
        let mut image = vec![0_u8; size_of_image as usize];

        self.write_headers(&mut image, &sections, size_of_image, export_dir)?;
        for (_, data, _, rva) in &sections {
            let start = *rva as usize;
            image[start..start + data.len()].copy_from_slice(data);
        }

        Ok(image)
    }

    fn write_headers(
        &self,
        image: &mut [u8],
        sections: &[(String, Vec<u8>, u32, u32)],
        size_of_image: u32,
        export_dir: (u32, u32),
    ) -> Result<()> {
        // DOS header
        image[0] = b'M';
        image[1] = b'Z';
        let mut offset = 0x3C;
        write_le_at(image, &mut offset, PE_OFFSET)?;

        // PE signature + COFF header
        let mut offset = PE_OFFSET as usize;
        image[offset..offset + 4].copy_from_slice(b"PE\0\0");
        offset += 4;
        write_le_at(image, &mut offset, 0x8664_u16)?;
        let section_count = u16::try_from(sections.len())
            .map_err(|_| malformed_error!("Too many sections: {}", sections.len()))?;
        write_le_at(image, &mut offset, section_count)?;
        write_le_at(image, &mut offset, 0_u32)?; // timestamp
        write_le_at(image, &mut offset, 0_u32)?; // symbol table
        write_le_at(image, &mut offset, 0_u32)?; // symbol count
        write_le_at(image, &mut offset, OPTIONAL_HEADER_SIZE)?;
        write_le_at(image, &mut offset, 0x2022_u16)?; // executable | large address aware | dll

        // Optional header, standard fields
        let mut code_size = 0_u32;
        for section in sections.iter().filter(|s| s.2 & 0x20 != 0) {
            code_size += align(section_len(section.1.len())?, PAGE);
        }
        let base_of_code = sections
            .iter()
            .find(|s| s.2 & 0x20 != 0)
            .map_or(0, |s| s.3);
        write_le_at(image, &mut offset, 0x20B_u16)?;
        write_le_at(image, &mut offset, 14_u8)?;
        write_le_at(image, &mut offset, 0_u8)?;
        write_le_at(image, &mut offset, code_size)?;
        write_le_at(image, &mut offset, 0_u32)?; // initialized data
        write_le_at(image, &mut offset, 0_u32)?; // uninitialized data
        write_le_at(image, &mut offset, 0_u32)?; // entry point
        write_le_at(image, &mut offset, base_of_code)?;

        // Optional header, windows fields
        write_le_at(image, &mut offset, self.image_base)?;
        write_le_at(image, &mut offset, PAGE)?; // section alignment
        write_le_at(image, &mut offset, PAGE)?; // file alignment
        write_le_at(image, &mut offset, 6_u16)?; // os major
        write_le_at(image, &mut offset, 0_u16)?;
        write_le_at(image, &mut offset, 0_u16)?; // image version
        write_le_at(image, &mut offset, 0_u16)?;
        write_le_at(image, &mut offset, 6_u16)?; // subsystem version
        write_le_at(image, &mut offset, 0_u16)?;
        write_le_at(image, &mut offset, 0_u32)?; // win32 version
        write_le_at(image, &mut offset, size_of_image)?;
        write_le_at(image, &mut offset, PAGE)?; // size of headers
        write_le_at(image, &mut offset, 0_u32)?; // checksum
        write_le_at(image, &mut offset, 2_u16)?; // subsystem: windows gui
        write_le_at(image, &mut offset, 0x0160_u16)?; // dll characteristics
        write_le_at(image, &mut offset, 0x10_0000_u64)?;
        write_le_at(image, &mut offset, 0x1000_u64)?;
        write_le_at(image, &mut offset, 0x10_0000_u64)?;
        write_le_at(image, &mut offset, 0x1000_u64)?;
        write_le_at(image, &mut offset, 0_u32)?; // loader flags
        write_le_at(image, &mut offset, 16_u32)?;

        // Data directories, only the export table is populated
        write_le_at(image, &mut offset, export_dir.0)?;
        write_le_at(image, &mut offset, export_dir.1)?;
        offset += 15 * 8;

        // Section table
        for (name, data, characteristics, rva) in sections {
            let mut raw_name = [0_u8; 8];
            let len = name.len().min(8);
            raw_name[..len].copy_from_slice(&name.as_bytes()[..len]);
            image[offset..offset + 8].copy_from_slice(&raw_name);
            offset += 8;

            let virtual_size = section_len(data.len())?;
            write_le_at(image, &mut offset, virtual_size)?;
            write_le_at(image, &mut offset, *rva)?;
            write_le_at(image, &mut offset, align(virtual_size, PAGE))?;
            write_le_at(image, &mut offset, *rva)?;
            write_le_at(image, &mut offset, 0_u32)?; // relocations
            write_le_at(image, &mut offset, 0_u32)?; // line numbers
            write_le_at(image, &mut offset, 0_u16)?;
            write_le_at(image, &mut offset, 0_u16)?;
            write_le_at(image, &mut offset, *characteristics)?;
        }

        Ok(())
    }

    fn build_export_directory(&self, edata_rva: u32, targets: &[u32]) -> Result<Vec<u8>> {
        let count = u32::try_from(targets.len())
            .map_err(|_| malformed_error!("Too many exports: {}", targets.len()))?;
        let functions_rva = edata_rva + 40;
        let names_rva = functions_rva + count * 4;
        let ordinals_rva = names_rva + count * 4;
        let strings_rva = ordinals_rva + count * 2;

        let mut strings = Vec::new();
        let dll_name_rva = strings_rva;
        strings.extend_from_slice(self.dll_name.as_bytes());
        strings.push(0);

        let mut name_rvas = Vec::with_capacity(targets.len());
        for export in &self.exports {
            let string_offset = u32::try_from(strings.len())
                .map_err(|_| malformed_error!("Export name table too large"))?;
            name_rvas.push(strings_rva + string_offset);
            strings.extend_from_slice(export.name.as_bytes());
            strings.push(0);
        }

        let total = (strings_rva - edata_rva) as usize + strings.len();
        let mut edata = vec![0_u8; total];
        let mut offset = 0;
        write_le_at(&mut edata, &mut offset, 0_u32)?; // characteristics
        write_le_at(&mut edata, &mut offset, 0_u32)?; // timestamp
        write_le_at(&mut edata, &mut offset, 0_u16)?;
        write_le_at(&mut edata, &mut offset, 0_u16)?;
        write_le_at(&mut edata, &mut offset, dll_name_rva)?;
        write_le_at(&mut edata, &mut offset, 1_u32)?; // ordinal base
        write_le_at(&mut edata, &mut offset, count)?;
        write_le_at(&mut edata, &mut offset, count)?;
        write_le_at(&mut edata, &mut offset, functions_rva)?;
        write_le_at(&mut edata, &mut offset, names_rva)?;
        write_le_at(&mut edata, &mut offset, ordinals_rva)?;

        // Function table in reverse, so name i maps to function slot count-1-i
        for target in targets.iter().rev() {
            write_le_at(&mut edata, &mut offset, *target)?;
        }
        for name_rva in &name_rvas {
            write_le_at(&mut edata, &mut offset, *name_rva)?;
        }
        for index in 0..count {
            let ordinal = u16::try_from(count - 1 - index)
                .map_err(|_| malformed_error!("Export ordinal {} exceeds 16 bits", index))?;
            write_le_at(&mut edata, &mut offset, ordinal)?;
        }
        edata[offset..].copy_from_slice(&strings);

        Ok(edata)
    }
}

fn section_len(len: usize) -> Result<u32> {
    let len = u32::try_from(len).map_err(|_| malformed_error!("Section too large: {}", len))?;
    Ok(len.max(1))
}

fn align(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
