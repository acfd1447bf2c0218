use std::path::Path;

use anyhow::{Context, Result};
use oxide80_cpm::{CpmConfig, CpmMachine, RunSummary};

/// Load the `.COM` image at `path` and run it to completion, with BDOS
/// console output going to the host's standard output.
pub fn run(path: &Path, load_offset: u16) -> Result<RunSummary> {
    let config = CpmConfig::builder().load_offset(load_offset).build();
    let mut machine = CpmMachine::with_config(config);

    let len = machine.load(path)?;
    log::info!(
        "loaded '{}' ({} bytes) at {:#06x}, running",
        path.display(),
        len,
        load_offset
    );

    let mut stdout = std::io::stdout();
    let summary = machine.run(&mut stdout);
    log::info!(
        "cpu stopped at pc {:#06x} after {} cycles",
        summary.pc,
        summary.cycles
    );
    Ok(summary)
}

/// Parse a load offset given on the command line as bare hex (e.g. `0100`).
pub fn parse_load_offset(arg: &str) -> Result<u16> {
    u16::from_str_radix(arg, 16).with_context(|| format!("invalid hex load offset '{arg}'"))
}

#[cfg(test)]
mod tests {
    use super::parse_load_offset;

    #[test]
    fn offsets_parse_as_hex() {
        assert_eq!(parse_load_offset("0100").unwrap(), 0x0100);
        assert_eq!(parse_load_offset("f000").unwrap(), 0xF000);
        assert!(parse_load_offset("xyz").is_err());
        assert!(parse_load_offset("10000").is_err());
    }
}
