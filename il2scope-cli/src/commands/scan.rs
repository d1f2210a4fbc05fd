use anyhow::Context;
use il2scope::resolver::{scan::find_pattern, BytePattern};
use serde::Serialize;

use crate::{
    app::{GlobalOptions, ModuleArgs},
    commands::common::load_module,
    output::{address, emit, Column, Listing},
};

/// Hits reported per section before the search stops.
const MAX_HITS: usize = 256;

#[derive(Debug, Serialize)]
struct Hit {
    section: String,
    address: String,
    rva: String,
}

#[derive(Debug, Serialize)]
struct ScanOutput {
    pattern: String,
    hits: Vec<Hit>,
}

pub fn run(
    module: &ModuleArgs,
    pattern: &str,
    all_sections: bool,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let image = load_module(module)?;
    let parsed =
        BytePattern::parse_ida(pattern).with_context(|| format!("invalid pattern: {pattern}"))?;

    let mut hits = Vec::new();
    for section in image.sections() {
        if !all_sections && !section.is_executable() {
            continue;
        }
        let Ok(data) = image.section_data(section) else {
            log::debug!("section {} has no readable contents", section.name);
            continue;
        };

        let mut cursor = 0;
        let mut found = 0;
        while let Some(offset) = find_pattern(&data[cursor..], &parsed) {
            let hit = section.start + (cursor + offset) as u64;
            hits.push(Hit {
                section: section.name.clone(),
                address: address(hit),
                rva: address(hit - image.base()),
            });
            cursor += offset + 1;
            found += 1;
            if found == MAX_HITS {
                log::info!("stopping {} after {} hits", section.name, MAX_HITS);
                break;
            }
        }
    }

    let output = ScanOutput {
        pattern: pattern.to_string(),
        hits,
    };

    emit(&output, opts, |out| {
        let mut listing = Listing::new(
            format!("Matches for {}", out.pattern),
            &[
                Column::Name("Section"),
                Column::Address("Address"),
                Column::Address("RVA"),
            ],
        );
        for hit in &out.hits {
            listing.row([&hit.section, &hit.address, &hit.rva].map(String::clone));
        }
        listing.print_or(&format!("No matches for {}", out.pattern));
    })
}
