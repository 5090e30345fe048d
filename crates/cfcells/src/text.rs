use std::fmt::Write;

use glam::DVec3;
use itertools::Itertools;

use crate::decode::{CellsFile, DecodeOptions};
use crate::error::CellError;
use crate::format::CellFooter;
use crate::scene::{MeshGroup, Primitive, SceneBuilder, Station};
use crate::texture::TextureResolver;

/// Produces a line-oriented text version of the decoded cells, for inspection and diffing.
#[derive(Debug, Default)]
pub struct CellsToText {
    /// The file contents are accumulated here.
    out: String,
    /// Lines of the cell in progress. A cell's first line needs its group count.
    cell: String,
    index: usize,
    groups: usize,
    /// Adds the triangle indices of every mesh group.
    verbose: bool,
}

impl CellsToText {
    pub fn new(verbose: bool) -> CellsToText {
        CellsToText {
            verbose,
            ..Default::default()
        }
    }

    pub fn into_text(self) -> String {
        self.out
    }
}

fn xyz(v: DVec3) -> String {
    format!("{:.3} {:.3} {:.3}", v.x, v.y, v.z)
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl SceneBuilder for CellsToText {
    fn begin_cell(&mut self, index: usize, footer: &CellFooter, translation: DVec3) {
        self.cell.clear();
        self.index = index;
        self.groups = 0;
        writeln!(self.cell, "ORIGIN {}", xyz(footer.local_origin)).unwrap();
        writeln!(self.cell, "TRANSLATE {}", xyz(translation)).unwrap();
    }

    fn add_station(&mut self, station: Station) {
        writeln!(
            self.cell,
            "STATION {} {} {}",
            or_dash(station.id),
            or_dash(station.kind),
            station.position.map_or_else(|| "-".to_string(), xyz)
        )
        .unwrap();
    }

    fn add_mesh_group(&mut self, group: MeshGroup) {
        self.groups += 1;
        let kind = match group.primitive {
            Primitive::Triangles(_) => "triangles",
            Primitive::Points { .. } => "points",
        };
        writeln!(
            self.cell,
            "MESH {} {} {}",
            or_dash(group.texture_id()),
            kind,
            group.primitive.count()
        )
        .unwrap();
        if let Some(texture) = &group.texture {
            writeln!(
                self.cell,
                "TEXTURE {} {}",
                texture.name.display(),
                texture
                    .path
                    .as_ref()
                    .map_or_else(|| "MISSING".to_string(), |p| p.display().to_string())
            )
            .unwrap();
        }
        if self.verbose {
            if let Primitive::Triangles(indices) = &group.primitive {
                for (a, b, c) in indices.iter().tuples() {
                    writeln!(self.cell, "TRI {} {} {}", a, b, c).unwrap();
                }
            }
        }
    }

    fn end_cell(&mut self) {
        writeln!(self.out, "CELL {} {}", self.index, self.groups).unwrap();
        self.out.push_str(&self.cell);
        self.cell.clear();
    }

    fn skip_cell(&mut self, index: usize, error: &CellError) {
        writeln!(self.out, "SKIP {} {}", index, error).unwrap();
    }
}

impl CellsFile {
    /// Outputs the decoded cells in the text format of CellsToText.
    pub fn to_text<R>(&self, options: &DecodeOptions, resolver: &R, verbose: bool) -> String
    where
        R: TextureResolver + ?Sized,
    {
        let mut converter = CellsToText::new(verbose);
        if let Some(path) = self.path() {
            writeln!(converter.out, "# file: {}", path.display()).unwrap();
        }
        writeln!(
            converter.out,
            "# version {}, {} cells\n",
            self.header().format_version,
            self.footers().len()
        )
        .unwrap();
        self.decode(options, resolver, &mut converter);
        converter.into_text()
    }
}
