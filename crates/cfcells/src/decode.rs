use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use glam::{DVec2, DVec3};
use log::{debug, info, warn};

use crate::cell::decode_cell;
use crate::error::{CellsError, Result, Stage};
use crate::format::{CellFooter, MainHeader};
use crate::scene::{MeshGroup, Scene, SceneBuilder, TextureRef};
use crate::texture::{SearchPathResolver, TextureResolver};

/// Easting and northing subtracted from every cell's local origin.
pub const DEFAULT_REFERENCE_ORIGIN: DVec2 = DVec2::new(336825.0, 5898525.0);

/// Settings for turning decoded cells into placed mesh groups.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    /// Subtracted from the x and y of each local origin. The altitude is kept.
    pub reference_origin: DVec2,
    /// Directory part of texture names.
    pub texture_dir: PathBuf,
    /// Extension of texture names, without the dot.
    pub texture_extension: String,
    /// Extra directories to look for textures in when reading from a path.
    pub search_paths: Vec<PathBuf>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            reference_origin: DEFAULT_REFERENCE_ORIGIN,
            texture_dir: PathBuf::from("textures"),
            texture_extension: "crn".to_string(),
            search_paths: vec![],
        }
    }
}

impl DecodeOptions {
    /// Returns the translation that places a cell with the given local origin.
    pub fn placement(&self, local_origin: DVec3) -> DVec3 {
        DVec3::new(
            local_origin.x - self.reference_origin.x,
            local_origin.y - self.reference_origin.y,
            local_origin.z,
        )
    }

    /// Returns the unresolved name of a texture, e.g. "textures/5.crn".
    pub fn texture_name(&self, texture_id: u32) -> PathBuf {
        self.texture_dir
            .join(format!("{}.{}", texture_id, self.texture_extension))
    }
}

/// Counts from one pass over a file's cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    pub cells: usize,
    pub decoded: usize,
    pub skipped: usize,
    pub groups: usize,
}

impl fmt::Display for DecodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} cells: {} decoded, {} skipped, {} mesh groups",
            self.cells, self.decoded, self.skipped, self.groups
        )
    }
}

/// A cf-cells file whose header, cell data and footers have been read.
///
/// Reading never fails because of a single bad cell. Cells are only checked by decode().
#[derive(Debug, Clone)]
pub struct CellsFile {
    /// The filesystem path used to access the file, if any.
    path: Option<PathBuf>,
    header: MainHeader,
    footers: Vec<CellFooter>,
    /// Everything between the header and the footer table.
    data: Vec<u8>,
}

impl CellsFile {
    /// Reads a file from a forward-only stream: header, then the cell data, then the footers.
    pub fn read<R: Read>(mut source: R) -> Result<CellsFile> {
        let header = MainHeader::read(&mut source)?;
        debug!(
            "Header: version {} with {} cells, footers at {}",
            header.format_version, header.cell_count, header.footer_offset
        );

        let data = read_blob(&mut source, header.cell_data_len()?, Stage::CellData)?;
        let table = read_blob(&mut source, header.footer_table_len()?, Stage::Footers)?;
        let footers = CellFooter::parse_table(&table, header.cells()?, header.footer_stride()?)?;
        debug!(
            "Read {} bytes of cell data and {} footers",
            data.len(),
            footers.len()
        );

        Ok(CellsFile {
            path: None,
            header,
            footers,
            data,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<CellsFile> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CellsError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cells = CellsFile::read(BufReader::new(file))?;
        cells.path = Some(path.to_path_buf());
        Ok(cells)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &MainHeader {
        &self.header
    }

    pub fn footers(&self) -> &[CellFooter] {
        &self.footers
    }

    /// Size of the cell data blob in bytes.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Texture resolution for a file read from a path: the file's own directory first, then
    /// the configured search paths.
    pub fn resolver(&self, options: &DecodeOptions) -> SearchPathResolver {
        let own_dir = self
            .path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        SearchPathResolver::new(own_dir.into_iter().chain(options.search_paths.iter().cloned()))
    }

    /// Decodes every cell in footer order and hands the results to builder.
    ///
    /// Cells that can't be decoded are logged, reported through skip_cell() and left out.
    pub fn decode<R, B>(
        &self,
        options: &DecodeOptions,
        resolver: &R,
        builder: &mut B,
    ) -> DecodeSummary
    where
        R: TextureResolver + ?Sized,
        B: SceneBuilder + ?Sized,
    {
        let mut summary = DecodeSummary {
            cells: self.footers.len(),
            ..Default::default()
        };
        let mut textures = TextureCache::default();

        for (index, footer) in self.footers.iter().enumerate() {
            let cell = match decode_cell(footer, &self.data) {
                Ok(cell) => cell,
                Err(e) => {
                    warn!("Skipping cell {}: {}", index, e);
                    builder.skip_cell(index, &e);
                    summary.skipped += 1;
                    continue;
                }
            };

            builder.begin_cell(index, footer, options.placement(footer.local_origin));
            for station in cell.stations {
                builder.add_station(station);
            }
            for group in cell.groups {
                let texture = group
                    .texture_id
                    .map(|id| textures.lookup(id, options, resolver));
                builder.add_mesh_group(MeshGroup {
                    vertices: cell.vertices.clone(),
                    primitive: group.primitive,
                    texture,
                });
                summary.groups += 1;
            }
            builder.end_cell();
            summary.decoded += 1;
        }

        info!("Decoded {}", summary);
        summary
    }
}

impl fmt::Display for CellsFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let print_cells = f.sign_plus();
        match &self.path {
            Some(path) => writeln!(f, "CELLS: {}", path.display())?,
            None => writeln!(f, "CELLS: <stream>")?,
        }
        writeln!(
            f,
            "    version {}; flags {:#x}; footer size {} bytes",
            self.header.format_version, self.header.flags, self.header.footer_size
        )?;
        writeln!(
            f,
            "    cells:      {} ({} bytes of cell data)",
            self.footers.len(),
            self.data.len()
        )?;
        // Counts come straight from the file.
        let total = |count: fn(&CellFooter) -> i64| -> i128 {
            self.footers.iter().map(|c| i128::from(count(c))).sum()
        };
        writeln!(f, "    stations:   {}", total(|c: &CellFooter| c.station_count))?;
        writeln!(f, "    vertices:   {}", total(|c: &CellFooter| c.vertex_count))?;
        writeln!(f, "    faces:      {}", total(|c: &CellFooter| c.face_count))?;
        if print_cells {
            for (i, footer) in self.footers.iter().enumerate() {
                writeln!(f, "    cell {}: {}", i, footer)?;
            }
        }
        Ok(())
    }
}

/// Reads exactly len bytes, failing instead of aborting when they can't be allocated.
fn read_blob<R: Read>(source: &mut R, len: usize, stage: Stage) -> Result<Vec<u8>> {
    let mut blob = Vec::new();
    blob.try_reserve_exact(len)
        .map_err(|_| CellsError::Allocation { stage, size: len })?;
    (&mut *source)
        .take(len as u64)
        .read_to_end(&mut blob)
        .map_err(|e| CellsError::io(stage, e))?;
    if blob.len() < len {
        let short = io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("got {} of {} bytes", blob.len(), len),
        );
        return Err(CellsError::io(stage, short));
    }
    Ok(blob)
}

/// Resolves each texture id once per decode.
#[derive(Debug, Default)]
struct TextureCache {
    resolved: HashMap<u32, TextureRef>,
}

impl TextureCache {
    fn lookup<R>(&mut self, texture_id: u32, options: &DecodeOptions, resolver: &R) -> TextureRef
    where
        R: TextureResolver + ?Sized,
    {
        self.resolved
            .entry(texture_id)
            .or_insert_with(|| {
                let name = options.texture_name(texture_id);
                let path = resolver.resolve(&name);
                if path.is_none() {
                    warn!("Texture {} not found", name.display());
                }
                TextureRef {
                    texture_id,
                    name,
                    path,
                }
            })
            .clone()
    }
}

/// Reads a whole file from a stream and collects its cells.
pub fn read_scene<R, T>(source: R, options: &DecodeOptions, resolver: &T) -> Result<Scene>
where
    R: Read,
    T: TextureResolver + ?Sized,
{
    let file = CellsFile::read(source)?;
    let mut scene = Scene::new();
    file.decode(options, resolver, &mut scene);
    Ok(scene)
}

/// Reads a file from a path, looking for textures next to it and then in options.search_paths.
pub fn read_scene_file<P: AsRef<Path>>(path: P, options: &DecodeOptions) -> Result<Scene> {
    let file = CellsFile::open(path)?;
    let resolver = file.resolver(options);
    let mut scene = Scene::new();
    file.decode(options, &resolver, &mut scene);
    Ok(scene)
}
