use std::ops::Range;
use std::sync::Arc;

use glam::{DVec3, Vec2, Vec3};
use log::{trace, warn};

use crate::bucket::FaceBuckets;
use crate::error::CellError;
use crate::format::{layout_width, CellFooter, CellType, StationField, VertexField, HEADER_SIZE};
use crate::reader::DataReader;
use crate::scene::{Primitive, Station, StationRef, VertexAttributes};

/// Where a cell's records live within the cell data blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellLayout {
    pub stations: Range<usize>,
    pub vertices: Range<usize>,
    pub faces: Range<usize>,
    pub station_count: usize,
    pub vertex_count: usize,
    pub face_count: usize,
}

impl CellLayout {
    /// Computes the station, vertex and face sub-ranges of a cell and checks that they lie
    /// within a blob of data_len bytes that starts right after the main header.
    pub fn locate(footer: &CellFooter, data_len: usize) -> Result<CellLayout, CellError> {
        let start = i128::from(footer.file_pos) - HEADER_SIZE as i128;
        let station_len = i128::from(footer.station_count) * i128::from(footer.station_size);
        let vertex_len = i128::from(footer.vertex_count) * i128::from(footer.vertex_size);
        let face_len = i128::from(footer.face_count) * i128::from(footer.face_size);
        let end = start + station_len + vertex_len + face_len;

        let out_of_range = CellError::OutOfRange {
            start,
            end,
            data_len,
        };
        let negative = [
            footer.station_count,
            footer.vertex_count,
            footer.face_count,
            i64::from(footer.station_size),
            i64::from(footer.vertex_size),
            i64::from(footer.face_size),
        ]
        .into_iter()
        .any(|v| v < 0);
        if start < 0 || negative || end > data_len as i128 {
            return Err(out_of_range);
        }

        let offset = |v: i128| usize::try_from(v).map_err(|_| out_of_range.clone());
        let count = |v: i64| usize::try_from(v).map_err(|_| out_of_range.clone());
        let stations = offset(start)?..offset(start + station_len)?;
        let vertices = stations.end..offset(start + station_len + vertex_len)?;
        let faces = vertices.end..offset(end)?;
        Ok(CellLayout {
            stations,
            vertices,
            faces,
            station_count: count(footer.station_count)?,
            vertex_count: count(footer.vertex_count)?,
            face_count: count(footer.face_count)?,
        })
    }
}

/// The faces of a cell that are drawn with one texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellGroup {
    pub texture_id: Option<u32>,
    pub primitive: Primitive,
}

/// Everything extracted from one cell, before placement and texture lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCell {
    pub stations: Vec<Station>,
    pub vertices: Arc<VertexAttributes>,
    pub groups: Vec<CellGroup>,
}

/// Decodes one cell out of the cell data blob.
pub fn decode_cell(footer: &CellFooter, data: &[u8]) -> Result<DecodedCell, CellError> {
    let layout = CellLayout::locate(footer, data.len())?;
    let cell_type = footer.cell_type;
    if !cell_type.contains(CellType::VERTEX_HAS_POSITION) {
        return Err(CellError::MissingPosition);
    }

    let station_fields = cell_type.station_fields();
    let vertex_fields = cell_type.vertex_fields();
    check_record_size(
        "vertex",
        footer.vertex_size,
        layout.vertex_count,
        layout_width(&vertex_fields, VertexField::width),
    )?;
    check_record_size(
        "face",
        footer.face_size,
        layout.face_count,
        cell_type.face_width(),
    )?;
    trace!(
        "Cell layout stations {:?} vertices {:?} faces {:?}",
        &layout.stations,
        &layout.vertices,
        &layout.faces
    );

    // Bad station records only lose the stations.
    let stations = if station_fields.is_empty() {
        Vec::new()
    } else {
        check_record_size(
            "station",
            footer.station_size,
            layout.station_count,
            layout_width(&station_fields, StationField::width),
        )
        .and_then(|()| {
            decode_stations(
                &data[layout.stations.clone()],
                footer.station_size as usize,
                layout.station_count,
                &station_fields,
            )
        })
        .unwrap_or_else(|e| {
            warn!("Ignoring the stations of the cell: {}", e);
            Vec::new()
        })
    };

    let vertices = decode_vertices(
        &data[layout.vertices.clone()],
        footer.vertex_size as usize,
        layout.vertex_count,
        cell_type,
        &vertex_fields,
    )?;

    let faces = &data[layout.faces.clone()];
    let face_size = footer.face_size as usize;
    let groups = if cell_type.contains(CellType::FACE_HAS_VERTEX_INDICES) {
        decode_faces(faces, face_size, cell_type, layout.vertex_count)?
    } else {
        // Unindexed: the whole cell is a point set. Only the first face's texture id matters.
        let first_texture =
            cell_type.contains(CellType::FACE_HAS_TEXMAP_ID) && layout.face_count > 0;
        let texture_id = if first_texture {
            Some(DataReader::new(faces).read_u32()?)
        } else {
            None
        };
        vec![CellGroup {
            texture_id,
            primitive: Primitive::Points {
                count: layout.vertex_count,
            },
        }]
    };

    Ok(DecodedCell {
        stations,
        vertices: Arc::new(vertices),
        groups,
    })
}

fn check_record_size(
    record: &'static str,
    size: i32,
    count: usize,
    needed: usize,
) -> Result<(), CellError> {
    if count > 0 && (size as usize) < needed {
        return Err(CellError::RecordTooSmall {
            record,
            size,
            needed,
        });
    }
    Ok(())
}

/// Splits data into records of size bytes. Records beyond their fields' width are padding.
fn records(data: &[u8], size: usize) -> std::slice::ChunksExact<'_, u8> {
    // A zero size only occurs with an empty range.
    data.chunks_exact(size.max(1))
}

/// Allocates an empty array with room for count values, or reports what couldn't fit.
fn alloc<T>(count: usize, what: &'static str) -> Result<Vec<T>, CellError> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(count)
        .map_err(|_| CellError::Allocation { what, count })?;
    Ok(values)
}

fn alloc_if<T>(
    cell_type: CellType,
    flag: CellType,
    count: usize,
    what: &'static str,
) -> Result<Option<Vec<T>>, CellError> {
    if cell_type.contains(flag) {
        alloc(count, what).map(Some)
    } else {
        Ok(None)
    }
}

fn decode_stations(
    data: &[u8],
    size: usize,
    count: usize,
    fields: &[StationField],
) -> Result<Vec<Station>, CellError> {
    let mut stations = alloc(count, "stations")?;
    for record in records(data, size) {
        let mut reader = DataReader::new(record);
        let mut station = Station::default();
        for field in fields {
            match field {
                StationField::Id => station.id = Some(reader.read_i64()?),
                StationField::Type => station.kind = Some(reader.read_i32()?),
                StationField::Position => {
                    station.position = Some(DVec3::from_array(reader.read_array::<f64, 3>()?))
                }
            }
        }
        stations.push(station);
    }
    Ok(stations)
}

fn decode_vertices(
    data: &[u8],
    size: usize,
    count: usize,
    cell_type: CellType,
    fields: &[VertexField],
) -> Result<VertexAttributes, CellError> {
    let mut attributes = VertexAttributes {
        positions: alloc(count, "positions")?,
        colors: alloc_if(cell_type, CellType::VERTEX_HAS_COLOR, count, "colors")?,
        normals: alloc_if(cell_type, CellType::VERTEX_HAS_NORMAL, count, "normals")?,
        primary_stations: alloc_if(
            cell_type,
            CellType::VERTEX_HAS_PRIMARY_STATION,
            count,
            "primary stations",
        )?,
        visibility: alloc_if(
            cell_type,
            CellType::VERTEX_HAS_VISIBILITY_FLAGS,
            count,
            "visibility flags",
        )?,
        blob_ids: alloc_if(cell_type, CellType::VERTEX_HAS_BLOB_ID, count, "blob ids")?,
        tex_coords: alloc_if(
            cell_type,
            CellType::VERTEX_HAS_TEX_COORDS,
            count,
            "texture coordinates",
        )?,
        kinds: alloc_if(cell_type, CellType::VERTEX_HAS_KIND, count, "kinds")?,
        confidence: alloc_if(
            cell_type,
            CellType::VERTEX_HAS_CONFIDENCE_VALUE,
            count,
            "confidence values",
        )?,
    };

    for record in records(data, size) {
        let mut reader = DataReader::new(record);
        for field in fields {
            match field {
                VertexField::Position => {
                    let position = Vec3::from_array(reader.read_array::<f32, 3>()?);
                    attributes.positions.push(position);
                }
                VertexField::Color => {
                    let color = reader.read_array::<u8, 4>()?;
                    attributes.colors.get_or_insert_with(Vec::new).push(color);
                }
                VertexField::Normal => {
                    let [x, y] = reader.read_array::<f32, 2>()?;
                    let z = (1.0 - x * x - y * y).max(0.0).sqrt();
                    attributes
                        .normals
                        .get_or_insert_with(Vec::new)
                        .push(Vec3::new(x, y, z));
                }
                VertexField::PrimaryStation => {
                    let station = StationRef {
                        low: reader.read_u32()?,
                        high: reader.read_i32()?,
                    };
                    attributes
                        .primary_stations
                        .get_or_insert_with(Vec::new)
                        .push(station);
                }
                VertexField::VisibilityFlags => {
                    let flags = reader.read_array::<u32, 4>()?;
                    attributes.visibility.get_or_insert_with(Vec::new).push(flags);
                }
                VertexField::BlobId => {
                    let blob_id = reader.read_i32()?;
                    attributes.blob_ids.get_or_insert_with(Vec::new).push(blob_id);
                }
                VertexField::TexCoords => {
                    let uv = Vec2::from_array(reader.read_array::<f32, 2>()?);
                    attributes.tex_coords.get_or_insert_with(Vec::new).push(uv);
                }
                VertexField::Kind => {
                    let kind = reader.read_u16()?;
                    attributes.kinds.get_or_insert_with(Vec::new).push(kind);
                }
                VertexField::Confidence => {
                    let confidence = reader.read_f32()?;
                    attributes
                        .confidence
                        .get_or_insert_with(Vec::new)
                        .push(confidence);
                }
            }
        }
    }
    Ok(attributes)
}

fn decode_faces(
    data: &[u8],
    size: usize,
    cell_type: CellType,
    vertex_count: usize,
) -> Result<Vec<CellGroup>, CellError> {
    let textured = cell_type.contains(CellType::FACE_HAS_TEXMAP_ID);
    let mut buckets = FaceBuckets::new();
    for (face, record) in records(data, size).enumerate() {
        let mut reader = DataReader::new(record);
        let indices = reader.read_array::<u32, 3>()?;
        let texture_id = if textured {
            Some(reader.read_u32()?)
        } else {
            None
        };
        if let Some(index) = indices.into_iter().find(|i| *i as usize >= vertex_count) {
            return Err(CellError::IndexOutOfRange {
                face,
                index,
                vertex_count,
            });
        }
        buckets.push(texture_id, indices);
    }
    trace!("Bucketed faces into {} groups", buckets.len());
    Ok(buckets
        .into_buckets()
        .into_iter()
        .map(|bucket| CellGroup {
            texture_id: bucket.texture_id,
            primitive: Primitive::Triangles(bucket.indices),
        })
        .collect())
}
