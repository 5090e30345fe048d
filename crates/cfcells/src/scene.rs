use std::path::PathBuf;
use std::sync::Arc;

use glam::{DVec3, Vec2, Vec3};

use crate::error::CellError;
use crate::format::CellFooter;

/// The 64 bit id of a vertex's primary station, stored on disk as two 32 bit words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationRef {
    pub low: u32,
    pub high: i32,
}

impl StationRef {
    pub fn id(self) -> i64 {
        (i64::from(self.high) << 32) | i64::from(self.low)
    }
}

/// Per-vertex attribute arrays of one cell. Every present array has one entry per vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexAttributes {
    /// Relative to the cell's local origin.
    pub positions: Vec<Vec3>,
    pub colors: Option<Vec<[u8; 4]>>,
    /// Unit normals; z is reconstructed from x and y and is never negative.
    pub normals: Option<Vec<Vec3>>,
    pub primary_stations: Option<Vec<StationRef>>,
    /// 128 bit station visibility masks, low word first.
    pub visibility: Option<Vec<[u32; 4]>>,
    pub blob_ids: Option<Vec<i32>>,
    pub tex_coords: Option<Vec<Vec2>>,
    pub kinds: Option<Vec<u16>>,
    pub confidence: Option<Vec<f32>>,
}

impl VertexAttributes {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// How the vertices of a mesh group are drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    /// Indexed triangles, three indices per face.
    Triangles(Vec<u32>),
    /// The first count vertices drawn as points.
    Points { count: usize },
}

impl Primitive {
    /// Number of triangles or points drawn.
    pub fn count(&self) -> usize {
        match self {
            Primitive::Triangles(indices) => indices.len() / 3,
            Primitive::Points { count } => *count,
        }
    }
}

/// A texture companion file named after a texture map id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureRef {
    pub texture_id: u32,
    /// The unresolved name, e.g. "textures/5.crn".
    pub name: PathBuf,
    /// Where the resolver found it, if anywhere.
    pub path: Option<PathBuf>,
}

/// One drawable: the cell's shared vertex arrays, one primitive and at most one texture.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGroup {
    pub vertices: Arc<VertexAttributes>,
    pub primitive: Primitive,
    pub texture: Option<TextureRef>,
}

impl MeshGroup {
    pub fn texture_id(&self) -> Option<u32> {
        self.texture.as_ref().map(|t| t.texture_id)
    }
}

/// An auxiliary point record. Not used for geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Station {
    pub id: Option<i64>,
    pub kind: Option<i32>,
    /// Absolute, not relative to the local origin.
    pub position: Option<DVec3>,
}

/// A decoded cell with its placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedCell {
    pub index: usize,
    pub footer: CellFooter,
    /// Added to every vertex position to place the cell.
    pub translation: DVec3,
    pub stations: Vec<Station>,
    pub groups: Vec<MeshGroup>,
}

/// Receives the decoded contents of a file one cell at a time.
///
/// For each cell either skip_cell() is called, or begin_cell() followed by its stations, its
/// mesh groups and end_cell(). Cells arrive in footer table order.
#[allow(unused_variables)]
pub trait SceneBuilder {
    fn begin_cell(&mut self, index: usize, footer: &CellFooter, translation: DVec3) {}
    fn add_station(&mut self, station: Station) {}
    fn add_mesh_group(&mut self, group: MeshGroup) {}
    fn end_cell(&mut self) {}
    fn skip_cell(&mut self, index: usize, error: &CellError) {}
}

/// Collects decoded cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub cells: Vec<PlacedCell>,
    /// Indices of the cells that couldn't be decoded.
    pub skipped: Vec<usize>,
    open: Option<PlacedCell>,
}

impl Scene {
    pub fn new() -> Scene {
        Scene::default()
    }

    pub fn groups(&self) -> impl Iterator<Item = &MeshGroup> {
        self.cells.iter().flat_map(|cell| cell.groups.iter())
    }
}

impl SceneBuilder for Scene {
    fn begin_cell(&mut self, index: usize, footer: &CellFooter, translation: DVec3) {
        self.end_cell();
        self.open = Some(PlacedCell {
            index,
            footer: footer.clone(),
            translation,
            stations: Vec::new(),
            groups: Vec::new(),
        });
    }

    fn add_station(&mut self, station: Station) {
        if let Some(cell) = self.open.as_mut() {
            cell.stations.push(station);
        }
    }

    fn add_mesh_group(&mut self, group: MeshGroup) {
        if let Some(cell) = self.open.as_mut() {
            cell.groups.push(group);
        }
    }

    fn end_cell(&mut self) {
        if let Some(cell) = self.open.take() {
            self.cells.push(cell);
        }
    }

    fn skip_cell(&mut self, index: usize, _error: &CellError) {
        self.skipped.push(index);
    }
}
