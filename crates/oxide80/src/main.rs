use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("Usage: oxide80 <program.com> [load_offset_hex]");
        eprintln!("  load_offset_hex defaults to 0100 (standard CP/M load address)");
        return ExitCode::from(1);
    };

    let load_offset = match args.next() {
        Some(arg) => match oxide80::parse_load_offset(&arg) {
            Ok(offset) => offset,
            Err(err) => {
                eprintln!("{err:#}");
                return ExitCode::from(1);
            }
        },
        None => 0x0100,
    };

    match oxide80::run(Path::new(&path), load_offset) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Load error: {err:#}");
            ExitCode::from(1)
        }
    }
}
