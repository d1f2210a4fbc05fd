use il2scope::image::ImageLayout;
use serde::Serialize;

use crate::{
    app::{GlobalOptions, ModuleArgs},
    commands::common::{file_display_name, load_module},
    output::{address, emit, Column, Listing},
};

#[derive(Debug, Serialize)]
struct SectionInfo {
    name: String,
    start: String,
    size: u64,
    rva: String,
    executable: bool,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    file: String,
    base: String,
    size: u64,
    layout: &'static str,
    pe64: bool,
    text: String,
    exports: usize,
    sections: Vec<SectionInfo>,
}

pub fn run(module: &ModuleArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let image = load_module(module)?;

    let output = InfoOutput {
        file: file_display_name(&module.path),
        base: address(image.base()),
        size: image.size(),
        layout: match image.layout() {
            ImageLayout::Mapped => "mapped",
            ImageLayout::File => "file",
        },
        pe64: image.is_64(),
        text: image.text().name.clone(),
        exports: image.exports().len(),
        sections: image
            .sections()
            .iter()
            .map(|section| SectionInfo {
                name: section.name.clone(),
                start: address(section.start),
                size: section.size,
                rva: address(u64::from(section.rva)),
                executable: section.is_executable(),
            })
            .collect(),
    };

    emit(&output, opts, |out| {
        println!("File:     {}", out.file);
        println!("Base:     {}", out.base);
        println!("Size:     {} bytes", out.size);
        println!("Layout:   {}", out.layout);
        println!("PE32+:    {}", out.pe64);
        println!("Code:     {}", out.text);
        println!("Exports:  {}", out.exports);

        println!();
        let mut sections = Listing::new(
            "Sections",
            &[
                Column::Name("Name"),
                Column::Address("Start"),
                Column::Address("RVA"),
                Column::Size("Size"),
                Column::Note("Exec"),
            ],
        );
        for section in &out.sections {
            sections.row([
                section.name.clone(),
                section.start.clone(),
                section.rva.clone(),
                section.size.to_string(),
                if section.executable { "x" } else { "" }.to_string(),
            ]);
        }
        sections.print_or("No sections.");
    })
}
