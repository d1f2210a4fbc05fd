use std::sync::Arc;

use anyhow::Context;
use il2scope::image::ModuleImage;

use crate::app::ModuleArgs;

/// Load the module as a file, or as a dump when a base address is given.
pub fn load_module(args: &ModuleArgs) -> anyhow::Result<Arc<ModuleImage>> {
    let image = match args.dump_base.as_deref() {
        Some(base) => {
            let base = parse_address(base)?;
            ModuleImage::from_dump(&args.path, base)
        }
        None => ModuleImage::from_file(&args.path),
    }
    .with_context(|| format!("failed to load module: {}", args.path.display()))?;

    Ok(Arc::new(image))
}

/// Parse a hex (`0x` prefixed) or decimal address.
pub fn parse_address(text: &str) -> anyhow::Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid address: {text}"))
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &std::path::Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
