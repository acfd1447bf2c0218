use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use oxide80_core::{Cpu8080, MEMORY_SIZE};

/// Copy a raw image into memory starting at `offset`.
///
/// Fails when the image does not fit below the 64 KiB ceiling; nothing
/// outside `offset..offset + len` is modified either way.
pub fn load_bytes(cpu: &mut Cpu8080, image: &[u8], offset: u16) -> Result<usize> {
    let start = offset as usize;
    if image.len() > MEMORY_SIZE - start {
        bail!(
            "image of {} bytes does not fit at offset {:#06x} ({} bytes available)",
            image.len(),
            offset,
            MEMORY_SIZE - start
        );
    }
    cpu.memory[start..start + image.len()].copy_from_slice(image);
    Ok(image.len())
}

/// Read a raw binary (no header) from `path` and load it at `offset`.
pub fn load_image(cpu: &mut Cpu8080, path: &Path, offset: u16) -> Result<usize> {
    let image =
        fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    load_bytes(cpu, &image, offset)
        .with_context(|| format!("failed to load '{}'", path.display()))
}
