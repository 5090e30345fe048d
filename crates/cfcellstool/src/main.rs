use cfcells::CellsFile;
use cfcellstool::{cli, convert_half, decode_options, expand_paths, info, textures};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let matches = cli().get_matches();

    // Logging stuff: keep above everything but the cmdline parsing.
    let mut log_builder = env_logger::Builder::new();
    match matches.occurrences_of("verbose") {
        0 => {
            log_builder.filter_level(log::LevelFilter::Warn);
        }
        1 => {
            log_builder.filter_level(log::LevelFilter::Info);
        }
        2 => {
            log_builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            log_builder.filter_level(log::LevelFilter::Trace);
        }
    };
    if let Some(filter) = matches.value_of("vmodule") {
        log_builder.parse_filters(filter);
    }
    log_builder.init();

    let options = decode_options(&matches)?;

    match matches.subcommand() {
        Some(("version", _)) => {
            println!(env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(("info", sub_matches)) => {
            let patterns = sub_matches.values_of_os("PATH").ok_or("missing PATH")?;
            let paths = expand_paths(patterns)?;
            print!("{}", info(&paths, &options, sub_matches.is_present("all"))?);
        }
        Some(("cells2text", sub_matches)) => {
            let in_path = sub_matches.value_of_os("INPUT").ok_or("missing INPUT")?;
            let file = CellsFile::open(in_path)?;
            let resolver = file.resolver(&options);
            let text = file.to_text(&options, &resolver, sub_matches.is_present("all"));
            if let Some(out_path) = sub_matches.value_of_os("OUTPUT") {
                std::fs::write(out_path, text.as_bytes())?;
                println!("Wrote data to {:?}", &out_path);
            } else {
                print!("{}", text);
            }
        }
        Some(("textures", sub_matches)) => {
            let path = sub_matches.value_of_os("PATH").ok_or("missing PATH")?;
            print!("{}", textures(path, &options)?);
        }
        Some(("half", sub_matches)) => {
            let value = sub_matches.value_of("VALUE").ok_or("missing VALUE")?;
            println!("{}", convert_half(value)?);
        }
        _ => unreachable!(),
    }
    Ok(())
}
