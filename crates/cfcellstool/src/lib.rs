use cfcells::half::{f32_to_half, half_to_f32};
use cfcells::{CellsFile, DecodeOptions, MeshGroup, Scene, SceneBuilder};
use clap::{arg, command, Arg, ArgMatches, Command};
use glam::DVec2;
use simple_error::bail;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::ffi::OsStr;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// The command line interface of cfcellstool.
pub fn cli() -> Command<'static> {
    command!()
        .propagate_version(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(arg!(-v --verbose ... "Increases verbosity by one level (can be repeated)"))
        .arg(
            arg!(--vmodule <FILTER> "sets the env_logger filter to the given string: \
                                     default,module::path=level,... \
                                     {trace,debug,info,warn,error,none}")
            .required(false),
        )
        .arg(
            arg!(--origin <EASTING_NORTHING> "reference origin subtracted from cell origins, \
                                              e.g. 336825,5898525")
            .required(false)
            .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("texture-dir")
                .long("texture-dir")
                .value_name("DIR")
                .help("directory part of texture names (default: textures)")
                .takes_value(true)
                .allow_invalid_utf8(true),
        )
        .arg(
            Arg::new("texture-ext")
                .long("texture-ext")
                .value_name("EXT")
                .help("extension of texture names (default: crn)")
                .takes_value(true),
        )
        .arg(
            Arg::new("search-path")
                .long("search-path")
                .value_name("DIR")
                .help("also look for textures under DIR (can be repeated)")
                .takes_value(true)
                .multiple_occurrences(true)
                .allow_invalid_utf8(true),
        )
        .subcommand(Command::new("version").about("Print version information"))
        .subcommand(
            Command::new("info")
                .about("prints details about cells files")
                .arg(arg!(-a - -all "If set, prints out every cell footer."))
                .arg(
                    arg!([PATH] "files or glob patterns")
                        .required(true)
                        .multiple_values(true)
                        .allow_invalid_utf8(true),
                ),
        )
        .subcommand(
            Command::new("cells2text")
                .about("prints out the decoded cells as text")
                .arg(arg!(-a - -all "If set, lists every triangle."))
                .arg(arg!([INPUT]).required(true).allow_invalid_utf8(true))
                .arg(arg!([OUTPUT]).required(false).allow_invalid_utf8(true)),
        )
        .subcommand(
            Command::new("textures")
                .about("lists the textures a cells file refers to and where they were found")
                .arg(arg!([PATH]).required(true).allow_invalid_utf8(true)),
        )
        .subcommand(
            Command::new("half")
                .about("converts a float to half bits, or 0x-prefixed half bits to a float")
                .arg(arg!([VALUE]).required(true).allow_hyphen_values(true)),
        )
}

/// Parses "easting,northing".
pub fn parse_origin(s: &str) -> Result<DVec2, Box<dyn Error>> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        bail!("expected EASTING,NORTHING but got {:?}", s);
    }
    let easting: f64 = parts[0].parse()?;
    let northing: f64 = parts[1].parse()?;
    Ok(DVec2::new(easting, northing))
}

/// Maps the global flags onto decode options.
pub fn decode_options(matches: &ArgMatches) -> Result<DecodeOptions, Box<dyn Error>> {
    let mut options = DecodeOptions::default();
    if let Some(origin) = matches.value_of("origin") {
        options.reference_origin = parse_origin(origin)?;
    }
    if let Some(dir) = matches.value_of_os("texture-dir") {
        options.texture_dir = PathBuf::from(dir);
    }
    if let Some(ext) = matches.value_of("texture-ext") {
        let ext = ext.trim_start_matches('.');
        if ext.is_empty() {
            bail!("empty texture extension");
        }
        options.texture_extension = ext.to_string();
    }
    if let Some(paths) = matches.values_of_os("search-path") {
        options.search_paths = paths.map(PathBuf::from).collect();
    }
    Ok(options)
}

/// Converts between floats and half bits. "0x3c00" gives the float, "1.0" gives the bits.
pub fn convert_half(value: &str) -> Result<String, Box<dyn Error>> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        let bits = u16::from_str_radix(hex, 16)?;
        return Ok(format!("{:#06x} = {:?}", bits, half_to_f32(bits)));
    }
    let float: f32 = value.parse()?;
    let bits = f32_to_half(float);
    Ok(format!("{:?} = {:#06x} (decodes to {:?})", float, bits, half_to_f32(bits)))
}

/// Expands glob patterns. A pattern that matches nothing is kept as a plain path.
pub fn expand_paths<'a, I>(patterns: I) -> Result<Vec<PathBuf>, Box<dyn Error>>
where
    I: IntoIterator<Item = &'a OsStr>,
{
    let mut paths = vec![];
    for pattern in patterns {
        let matched = match pattern.to_str() {
            Some(s) => glob::glob(s)?.collect::<Result<Vec<_>, _>>()?,
            None => vec![],
        };
        if matched.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            paths.extend(matched);
        }
    }
    Ok(paths)
}

/// Counts distinct texture ids by whether they resolved. Everything else is dropped.
#[derive(Default)]
struct TextureCount {
    resolved: BTreeSet<u32>,
    missing: BTreeSet<u32>,
}

impl SceneBuilder for TextureCount {
    fn add_mesh_group(&mut self, group: MeshGroup) {
        if let Some(texture) = group.texture {
            if texture.path.is_some() {
                self.resolved.insert(texture.texture_id);
            } else {
                self.missing.insert(texture.texture_id);
            }
        }
    }
}

/// Prints the header, footer totals and decode summary of each file.
pub fn info<P: AsRef<Path>>(
    paths: &[P],
    options: &DecodeOptions,
    all: bool,
) -> Result<String, Box<dyn Error>> {
    let mut out = String::new();
    for path in paths {
        let file = CellsFile::open(path)?;
        if all {
            write!(out, "{:+}", &file)?;
        } else {
            write!(out, "{}", &file)?;
        }
        let mut textures = TextureCount::default();
        let summary = file.decode(options, &file.resolver(options), &mut textures);
        writeln!(out, "    decoded:    {}", summary)?;
        writeln!(
            out,
            "    textures:   {} found, {} missing",
            textures.resolved.len(),
            textures.missing.len()
        )?;
    }
    Ok(out)
}

/// Lists each texture once with the path it resolved to, or MISSING.
pub fn textures<P: AsRef<Path>>(
    path: P,
    options: &DecodeOptions,
) -> Result<String, Box<dyn Error>> {
    let file = CellsFile::open(path)?;
    let resolver = file.resolver(options);
    let mut scene = Scene::new();
    file.decode(options, &resolver, &mut scene);

    let found: BTreeMap<u32, String> = scene
        .groups()
        .filter_map(|group| group.texture.as_ref())
        .map(|texture| {
            let location = match &texture.path {
                Some(p) => p.display().to_string(),
                None => "MISSING".to_string(),
            };
            (
                texture.texture_id,
                format!("{} {}", texture.name.display(), location),
            )
        })
        .collect();

    let mut out = String::new();
    for (id, line) in &found {
        writeln!(out, "{} {}", id, line)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tool_tests {
    use super::*;
    use std::fs;

    /// A valid file with no cells.
    fn empty_file() -> Vec<u8> {
        let mut bytes = b"CFCL".to_vec();
        bytes.extend_from_slice(&995i32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&32i64.to_le_bytes());
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.extend_from_slice(&104i32.to_le_bytes());
        bytes
    }

    /// One cell: a triangle with texture map id 5.
    fn textured_file() -> Vec<u8> {
        let mut bytes = b"CFCL".to_vec();
        bytes.extend_from_slice(&995i32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(32i64 + 36 + 16).to_le_bytes());
        bytes.extend_from_slice(&1i64.to_le_bytes());
        bytes.extend_from_slice(&104i32.to_le_bytes());
        // Three vertices at the origin, then the face.
        bytes.extend_from_slice(&[0; 36]);
        for v in [0u32, 1, 2, 5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        // Footer: position, vertex indices and texture map id.
        bytes.extend_from_slice(&32i64.to_le_bytes());
        bytes.extend_from_slice(&0x0003_0001u32.to_le_bytes());
        for count in [0i64, 3, 1] {
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        for size in [0i32, 12, 16] {
            bytes.extend_from_slice(&size.to_le_bytes());
        }
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.extend_from_slice(&[0; 24 + 24]);
        bytes
    }

    #[test]
    fn info_follows_texture_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cfcells");
        fs::write(&path, textured_file()).unwrap();
        fs::create_dir(dir.path().join("textures")).unwrap();
        fs::write(dir.path().join("textures/5.crn"), b"").unwrap();

        let text = info(&[&path], &DecodeOptions::default(), false).unwrap();
        assert!(text.contains("1 decoded"), "{}", text);
        assert!(text.contains("textures:   1 found, 0 missing"), "{}", text);

        let options = DecodeOptions {
            texture_extension: "dds".to_string(),
            ..Default::default()
        };
        let text = info(&[&path], &options, false).unwrap();
        assert!(text.contains("textures:   0 found, 1 missing"), "{}", text);
    }

    #[test]
    fn origins() {
        assert_eq!(DVec2::new(1.5, -2.0), parse_origin("1.5, -2").unwrap());
        assert!(parse_origin("1").is_err());
        assert!(parse_origin("1,2,3").is_err());
        assert!(parse_origin("a,2").is_err());
    }

    #[test]
    fn half_conversions() {
        assert_eq!("0x3c00 = 1.0", convert_half("0x3c00").unwrap());
        assert_eq!(
            "-2.0 = 0xc000 (decodes to -2.0)",
            convert_half("-2").unwrap()
        );
        assert_eq!(
            "100000.0 = 0x7bff (decodes to 65504.0)",
            convert_half("100000").unwrap()
        );
        assert!(convert_half("0x10000").is_err());
        assert!(convert_half("one").is_err());
    }

    #[test]
    fn flags_become_options() {
        let matches = cli()
            .try_get_matches_from([
                "cfcellstool",
                "--origin",
                "10,20",
                "--texture-dir",
                "tex",
                "--texture-ext",
                ".dds",
                "--search-path",
                "/a",
                "--search-path",
                "/b",
                "version",
            ])
            .unwrap();
        let options = decode_options(&matches).unwrap();
        assert_eq!(DVec2::new(10.0, 20.0), options.reference_origin);
        assert_eq!(PathBuf::from("tex"), options.texture_dir);
        assert_eq!("dds", options.texture_extension);
        assert_eq!(
            vec![PathBuf::from("/a"), PathBuf::from("/b")],
            options.search_paths
        );

        let matches = cli().try_get_matches_from(["cfcellstool", "version"]).unwrap();
        assert_eq!(DecodeOptions::default(), decode_options(&matches).unwrap());
    }

    #[test]
    fn globs_and_info() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.cfcells"), empty_file()).unwrap();
        fs::write(dir.path().join("b.cfcells"), empty_file()).unwrap();
        let pattern = dir.path().join("*.cfcells");
        let literal = dir.path().join("absent.cfcells");
        let paths = expand_paths([pattern.as_os_str(), literal.as_os_str()]).unwrap();
        assert_eq!(
            vec![
                dir.path().join("a.cfcells"),
                dir.path().join("b.cfcells"),
                literal.clone()
            ],
            paths
        );

        let options = DecodeOptions::default();
        let text = info(&paths[..2], &options, false).unwrap();
        assert_eq!(2, text.matches("decoded:    0 cells").count(), "{}", text);
        assert!(info(&paths, &options, false).is_err());
    }

    #[test]
    fn no_textures_in_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cfcells");
        fs::write(&path, empty_file()).unwrap();
        assert_eq!("", textures(&path, &DecodeOptions::default()).unwrap());
    }
}
