//! Builds cf-cells files in memory for tests.

use glam::DVec3;

use crate::format::{CellFooter, CellType, MainHeader, FOOTER_SIZE, HEADER_SIZE, SIGNATURE};

pub(crate) fn encode_header(header: &MainHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE);
    out.extend_from_slice(&header.signature);
    out.extend_from_slice(&header.format_version.to_le_bytes());
    out.extend_from_slice(&header.flags.to_le_bytes());
    out.extend_from_slice(&header.footer_offset.to_le_bytes());
    out.extend_from_slice(&header.cell_count.to_le_bytes());
    out.extend_from_slice(&header.footer_size.to_le_bytes());
    out
}

pub(crate) fn encode_footer(footer: &CellFooter) -> Vec<u8> {
    let mut out = Vec::with_capacity(FOOTER_SIZE);
    out.extend_from_slice(&footer.file_pos.to_le_bytes());
    out.extend_from_slice(&footer.cell_type.bits().to_le_bytes());
    out.extend_from_slice(&footer.station_count.to_le_bytes());
    out.extend_from_slice(&footer.vertex_count.to_le_bytes());
    out.extend_from_slice(&footer.face_count.to_le_bytes());
    out.extend_from_slice(&footer.station_size.to_le_bytes());
    out.extend_from_slice(&footer.vertex_size.to_le_bytes());
    out.extend_from_slice(&footer.face_size.to_le_bytes());
    out.extend_from_slice(&footer.primary_station.to_le_bytes());
    for v in footer.local_origin.to_array() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for v in footer.bounding_box {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// A face record with vertex indices only.
pub(crate) fn face(indices: [u32; 3]) -> Vec<u8> {
    indices.iter().flat_map(|i| i.to_le_bytes()).collect()
}

/// A face record with vertex indices followed by a texture map id.
pub(crate) fn textured_face(indices: [u32; 3], texture_id: u32) -> Vec<u8> {
    let mut record = face(indices);
    record.extend_from_slice(&texture_id.to_le_bytes());
    record
}

/// One cell's records. Record sizes default to the longest record of each kind.
#[derive(Debug, Clone)]
pub(crate) struct TestCell {
    cell_type: CellType,
    stations: Vec<Vec<u8>>,
    vertices: Vec<Vec<u8>>,
    faces: Vec<Vec<u8>>,
    vertex_size: Option<i32>,
    local_origin: DVec3,
}

impl TestCell {
    pub(crate) fn new(cell_type: CellType) -> TestCell {
        TestCell {
            cell_type,
            stations: vec![],
            vertices: vec![],
            faces: vec![],
            vertex_size: None,
            local_origin: DVec3::ZERO,
        }
    }

    /// Adds a vertex record holding only a position.
    pub(crate) fn vertex(self, position: &[f32; 3]) -> TestCell {
        let record: Vec<u8> = position.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.vertex_record(&record)
    }

    pub(crate) fn vertex_record(mut self, record: &[u8]) -> TestCell {
        self.vertices.push(record.to_vec());
        self
    }

    pub(crate) fn station_record(mut self, record: &[u8]) -> TestCell {
        self.stations.push(record.to_vec());
        self
    }

    pub(crate) fn face(mut self, record: &[u8]) -> TestCell {
        self.faces.push(record.to_vec());
        self
    }

    /// Declares a vertex record size that may differ from the records written.
    pub(crate) fn vertex_size(mut self, size: i32) -> TestCell {
        self.vertex_size = Some(size);
        self
    }

    pub(crate) fn origin(mut self, x: f64, y: f64, z: f64) -> TestCell {
        self.local_origin = DVec3::new(x, y, z);
        self
    }

    /// Returns the footer for the cell placed at file_pos, and the cell's data block.
    pub(crate) fn encode(&self, file_pos: i64) -> (CellFooter, Vec<u8>) {
        let size = |records: &[Vec<u8>]| records.iter().map(Vec::len).max().unwrap_or(0);
        let station_size = size(&self.stations);
        let face_size = size(&self.faces);
        let vertex_size = match self.vertex_size {
            Some(declared) => declared,
            None => size(&self.vertices) as i32,
        };

        let mut data = vec![];
        for record in &self.stations {
            data.extend_from_slice(record);
            data.resize(data.len() + station_size - record.len(), 0);
        }
        for record in &self.vertices {
            data.extend_from_slice(record);
            let padding = (vertex_size as usize).saturating_sub(record.len());
            data.resize(data.len() + padding, 0);
        }
        for record in &self.faces {
            data.extend_from_slice(record);
            data.resize(data.len() + face_size - record.len(), 0);
        }

        let footer = CellFooter {
            file_pos,
            cell_type: self.cell_type,
            station_count: self.stations.len() as i64,
            vertex_count: self.vertices.len() as i64,
            face_count: self.faces.len() as i64,
            station_size: station_size as i32,
            vertex_size,
            face_size: face_size as i32,
            primary_station: 0,
            local_origin: self.local_origin,
            bounding_box: [-1.0, -1.0, -1.0, 1.0, 1.0, 1.0],
        };
        (footer, data)
    }
}

/// Lays out a complete file: header, every cell's data block, then the footer table.
pub(crate) fn build(cells: &[TestCell]) -> Vec<u8> {
    let mut data = vec![];
    let mut footers = vec![];
    for cell in cells {
        let (footer, block) = cell.encode((HEADER_SIZE + data.len()) as i64);
        data.extend(block);
        footers.push(footer);
    }
    let mut file = encode_header(&MainHeader {
        signature: SIGNATURE,
        format_version: 995,
        flags: 0,
        footer_offset: (HEADER_SIZE + data.len()) as i64,
        cell_count: cells.len() as i64,
        footer_size: FOOTER_SIZE as i32,
    });
    file.extend(data);
    for footer in &footers {
        file.extend(encode_footer(footer));
    }
    file
}

/// A file whose only cell is a single untextured triangle.
pub(crate) fn triangle_file() -> Vec<u8> {
    build(&[TestCell::new(
        CellType::VERTEX_HAS_POSITION | CellType::FACE_HAS_VERTEX_INDICES,
    )
    .vertex(&[0.0, 0.0, 0.0])
    .vertex(&[1.0, 0.0, 0.0])
    .vertex(&[0.0, 1.0, 0.0])
    .face(&face([0, 1, 2]))])
}
