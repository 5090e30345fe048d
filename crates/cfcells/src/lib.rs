// This is a library for reading cf-cells files.
//
// A cf-cells file holds a scanned scene split into cells. Each cell carries a variable layout of
// station, vertex and face records, described by a bitmask in the cell's footer, plus a local
// origin that places it in the world. The decoder turns every cell into mesh groups: the cell's
// shared vertex arrays plus one index buffer per texture map id, in the order the ids were first
// seen. Cells that can't be decoded are skipped without giving up on the rest of the file.
//
// Textures are only located, never loaded. A group's texture is a companion file named after its
// texture map id, found through a TextureResolver.
//
// The half module is a standalone 16 bit float codec used alongside the format.

mod bucket;
pub mod cell;
mod decode;
pub mod error;
pub mod format;
pub mod half;
mod reader;
pub mod scene;
mod text;
pub mod texture;

#[cfg(test)]
mod testdata;

pub use crate::bucket::{FaceBuckets, TextureBucket};
pub use crate::decode::{
    read_scene, read_scene_file, CellsFile, DecodeOptions, DecodeSummary, DEFAULT_REFERENCE_ORIGIN,
};
pub use crate::error::{CellError, CellsError, Result, Stage, Truncated};
pub use crate::format::{CellFooter, CellType, MainHeader};
pub use crate::scene::{
    MeshGroup, PlacedCell, Primitive, Scene, SceneBuilder, Station, StationRef, TextureRef,
    VertexAttributes,
};
pub use crate::text::CellsToText;
pub use crate::texture::{NoTextures, SearchPathResolver, TextureResolver};
