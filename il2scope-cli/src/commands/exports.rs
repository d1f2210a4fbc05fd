use serde::Serialize;

use crate::{
    app::{GlobalOptions, ModuleArgs},
    commands::common::load_module,
    output::{address, emit, Column, Listing},
};

#[derive(Debug, Serialize)]
struct ExportEntry {
    name: String,
    rva: String,
    address: String,
}

#[derive(Debug, Serialize)]
struct ExportsOutput {
    exports: Vec<ExportEntry>,
}

pub fn run(module: &ModuleArgs, filter: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let image = load_module(module)?;

    let exports = image
        .exports()
        .iter()
        .filter(|export| filter.is_none_or(|text| export.name.contains(text)))
        .map(|export| ExportEntry {
            name: export.name.clone(),
            rva: address(u64::from(export.rva)),
            address: address(export.address),
        })
        .collect();

    let output = ExportsOutput { exports };

    emit(&output, opts, |out| {
        let mut listing = Listing::new(
            "Exports",
            &[
                Column::Address("RVA"),
                Column::Address("Address"),
                Column::Name("Name"),
            ],
        );
        for entry in &out.exports {
            listing.row([&entry.rva, &entry.address, &entry.name].map(String::clone));
        }
        listing.print_or("No exports found.");
    })
}
