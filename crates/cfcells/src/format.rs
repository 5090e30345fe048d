// FILE FORMAT NOTES
//
// A cf-cells file is laid out as:
//   1. The 32 byte main header, starting with the "CFCL" signature.
//   2. The cell data: one block per cell, each holding station, vertex and face records.
//   3. The footer table at footer_offset: one fixed-size footer per cell, in cell order.
//
// All values are little-endian and nothing is padded: the header and footer fields must be
// read one at a time at their exact widths.

use std::fmt;
use std::io::Read;

use glam::DVec3;
use log::trace;

use crate::error::{CellsError, Stage, Truncated};
use crate::reader::DataReader;

/// The four bytes every cf-cells file starts with.
pub const SIGNATURE: [u8; 4] = *b"CFCL";

/// Size of the main header on disk: 4 + 4 + 4 + 8 + 8 + 4.
pub const HEADER_SIZE: usize = 32;

/// Size of one footer record on disk. The header may declare larger records.
pub const FOOTER_SIZE: usize = 104;

/// The main header at the start of every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainHeader {
    pub signature: [u8; 4],
    pub format_version: i32,
    /// Reserved.
    pub flags: u32,
    /// Byte offset of the footer table from the start of the file.
    pub footer_offset: i64,
    pub cell_count: i64,
    /// Size in bytes of one record in the footer table.
    pub footer_size: i32,
}

impl MainHeader {
    /// Reads exactly HEADER_SIZE bytes from source and validates them.
    pub fn read<R: Read>(source: &mut R) -> Result<MainHeader, CellsError> {
        let mut bytes = [0u8; HEADER_SIZE];
        source
            .read_exact(&mut bytes)
            .map_err(|e| CellsError::io(Stage::Header, e))?;
        Self::parse(&bytes)
    }

    /// Parses and validates a header from the start of bytes.
    pub fn parse(bytes: &[u8]) -> Result<MainHeader, CellsError> {
        let mut reader = DataReader::new(bytes);
        let signature = reader.read_array::<u8, 4>()?;
        if signature != SIGNATURE {
            return Err(CellsError::InvalidSignature(signature));
        }
        let header = MainHeader {
            signature,
            format_version: reader.read_i32()?,
            flags: reader.read_u32()?,
            footer_offset: reader.read_i64()?,
            cell_count: reader.read_i64()?,
            footer_size: reader.read_i32()?,
        };
        header.cell_data_len()?;
        header.footer_table_len()?;
        trace!("Parsed {} byte main header {:?}", reader.position(), &header);
        Ok(header)
    }

    /// Number of bytes between the end of the header and the footer table.
    pub fn cell_data_len(&self) -> Result<usize, CellsError> {
        self.footer_offset
            .checked_sub(HEADER_SIZE as i64)
            .filter(|len| *len >= 0)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| {
                CellsError::InvalidHeader(format!(
                    "footer offset {} is inside the {} byte header",
                    self.footer_offset, HEADER_SIZE
                ))
            })
    }

    /// Number of bytes in the footer table.
    pub fn footer_table_len(&self) -> Result<usize, CellsError> {
        let count = self.cells()?;
        let size = self.footer_stride()?;
        count.checked_mul(size).ok_or_else(|| {
            CellsError::InvalidHeader(format!(
                "{} footers of {} bytes overflow the address space",
                count, size
            ))
        })
    }

    /// The cell count as usize.
    pub fn cells(&self) -> Result<usize, CellsError> {
        usize::try_from(self.cell_count).map_err(|_| {
            CellsError::InvalidHeader(format!("invalid cell count {}", self.cell_count))
        })
    }

    /// The footer record size as usize; never smaller than FOOTER_SIZE.
    pub fn footer_stride(&self) -> Result<usize, CellsError> {
        match usize::try_from(self.footer_size) {
            Ok(size) if size >= FOOTER_SIZE => Ok(size),
            _ => Err(CellsError::InvalidHeader(format!(
                "footer size {} is smaller than {} bytes",
                self.footer_size, FOOTER_SIZE
            ))),
        }
    }
}

bitflags::bitflags! {
    /// The `type` bitmask of a cell footer, describing which record fields are present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CellType: u32 {
        const VERTEX_HAS_POSITION = 0x0000_0001;
        const VERTEX_HAS_COLOR = 0x0000_0002;
        const VERTEX_HAS_NORMAL = 0x0000_0004;
        const VERTEX_HAS_PRIMARY_STATION = 0x0000_0008;
        const VERTEX_HAS_VISIBILITY_FLAGS = 0x0000_0010;
        const VERTEX_HAS_BLOB_ID = 0x0000_0020;
        const VERTEX_HAS_TEX_COORDS = 0x0000_0040;
        /// Since format version 995.
        const VERTEX_HAS_KIND = 0x0000_0080;
        /// Since format version 995.
        const VERTEX_HAS_CONFIDENCE_VALUE = 0x0000_0100;
        const FACE_HAS_VERTEX_INDICES = 0x0001_0000;
        const FACE_HAS_TEXMAP_ID = 0x0002_0000;
        const STATION_HAS_ID = 0x0100_0000;
        const STATION_HAS_POSITION = 0x0200_0000;
        const STATION_HAS_TYPE = 0x0400_0000;
    }
}

impl CellType {
    /// The vertex fields present in this cell, in record order.
    pub fn vertex_fields(self) -> Vec<VertexField> {
        VertexField::ALL
            .into_iter()
            .filter(|field| self.contains(field.flag()))
            .collect()
    }

    /// The station fields present in this cell, in record order.
    pub fn station_fields(self) -> Vec<StationField> {
        StationField::ALL
            .into_iter()
            .filter(|field| self.contains(field.flag()))
            .collect()
    }

    /// Bytes needed by the fields of one face record.
    pub fn face_width(self) -> usize {
        let mut width = 0;
        if self.contains(Self::FACE_HAS_VERTEX_INDICES) {
            width += 12;
        }
        if self.contains(Self::FACE_HAS_TEXMAP_ID) {
            width += 4;
        }
        width
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (name, _) in self.iter_names() {
            write!(f, "{}{}", if first { "" } else { "|" }, name)?;
            first = false;
        }
        let unknown = self.bits() & !CellType::all().bits();
        if unknown != 0 || first {
            write!(f, "{}{:#010x}", if first { "" } else { "|" }, unknown)?;
        }
        Ok(())
    }
}

/// One optional field of a vertex record.
///
/// Present fields appear in a record in the order of ALL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexField {
    /// 3 x f32, relative to the cell's local origin.
    Position,
    /// 4 x u8 RGBA.
    Color,
    /// 2 x f32; the z component is implied.
    Normal,
    /// u32 low word then i32 high word.
    PrimaryStation,
    /// 4 x u32; a 128 bit mask of the stations that see the vertex.
    VisibilityFlags,
    /// i32.
    BlobId,
    /// 2 x f32.
    TexCoords,
    /// u16, user defined.
    Kind,
    /// f32.
    Confidence,
}

impl VertexField {
    pub const ALL: [VertexField; 9] = [
        VertexField::Position,
        VertexField::Color,
        VertexField::Normal,
        VertexField::PrimaryStation,
        VertexField::VisibilityFlags,
        VertexField::BlobId,
        VertexField::TexCoords,
        VertexField::Kind,
        VertexField::Confidence,
    ];

    pub fn flag(self) -> CellType {
        match self {
            VertexField::Position => CellType::VERTEX_HAS_POSITION,
            VertexField::Color => CellType::VERTEX_HAS_COLOR,
            VertexField::Normal => CellType::VERTEX_HAS_NORMAL,
            VertexField::PrimaryStation => CellType::VERTEX_HAS_PRIMARY_STATION,
            VertexField::VisibilityFlags => CellType::VERTEX_HAS_VISIBILITY_FLAGS,
            VertexField::BlobId => CellType::VERTEX_HAS_BLOB_ID,
            VertexField::TexCoords => CellType::VERTEX_HAS_TEX_COORDS,
            VertexField::Kind => CellType::VERTEX_HAS_KIND,
            VertexField::Confidence => CellType::VERTEX_HAS_CONFIDENCE_VALUE,
        }
    }

    /// Width of the field in bytes.
    pub fn width(self) -> usize {
        match self {
            VertexField::Position => 12,
            VertexField::Color => 4,
            VertexField::Normal => 8,
            VertexField::PrimaryStation => 8,
            VertexField::VisibilityFlags => 16,
            VertexField::BlobId => 4,
            VertexField::TexCoords => 8,
            VertexField::Kind => 2,
            VertexField::Confidence => 4,
        }
    }
}

/// One optional field of a station record, which has the order id, type, position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationField {
    /// i64.
    Id,
    /// i32.
    Type,
    /// 3 x f64, absolute (not relative to the cell's local origin).
    Position,
}

impl StationField {
    pub const ALL: [StationField; 3] = [
        StationField::Id,
        StationField::Type,
        StationField::Position,
    ];

    pub fn flag(self) -> CellType {
        match self {
            StationField::Id => CellType::STATION_HAS_ID,
            StationField::Type => CellType::STATION_HAS_TYPE,
            StationField::Position => CellType::STATION_HAS_POSITION,
        }
    }

    pub fn width(self) -> usize {
        match self {
            StationField::Id => 8,
            StationField::Type => 4,
            StationField::Position => 24,
        }
    }
}

/// Total width of a list of fields.
pub(crate) fn layout_width<F: Copy>(fields: &[F], width: impl Fn(F) -> usize) -> usize {
    fields.iter().map(|f| width(*f)).sum()
}

/// Describes the layout and placement of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellFooter {
    /// Absolute file offset of the cell's data block.
    pub file_pos: i64,
    pub cell_type: CellType,
    pub station_count: i64,
    pub vertex_count: i64,
    pub face_count: i64,
    /// Bytes per station record.
    pub station_size: i32,
    /// Bytes per vertex record.
    pub vertex_size: i32,
    /// Bytes per face record.
    pub face_size: i32,
    pub primary_station: i64,
    pub local_origin: DVec3,
    /// Bounding box relative to the local origin. Not used for geometry.
    pub bounding_box: [f32; 6],
}

impl CellFooter {
    /// Parses one footer from the start of the reader.
    pub(crate) fn parse(reader: &mut DataReader) -> Result<CellFooter, Truncated> {
        Ok(CellFooter {
            file_pos: reader.read_i64()?,
            cell_type: CellType::from_bits_retain(reader.read_u32()?),
            station_count: reader.read_i64()?,
            vertex_count: reader.read_i64()?,
            face_count: reader.read_i64()?,
            station_size: reader.read_i32()?,
            vertex_size: reader.read_i32()?,
            face_size: reader.read_i32()?,
            primary_station: reader.read_i64()?,
            local_origin: DVec3::from_array(reader.read_array::<f64, 3>()?),
            bounding_box: reader.read_array::<f32, 6>()?,
        })
    }

    /// Parses count footers of stride bytes each. Bytes past FOOTER_SIZE in a record are ignored.
    pub(crate) fn parse_table(
        data: &[u8],
        count: usize,
        stride: usize,
    ) -> Result<Vec<CellFooter>, CellsError> {
        let mut footers = Vec::with_capacity(count);
        let mut reader = DataReader::new(data);
        for _ in 0..count {
            let mut record = DataReader::new(reader.bytes(stride)?);
            footers.push(CellFooter::parse(&mut record)?);
        }
        Ok(footers)
    }
}

impl fmt::Display for CellFooter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "@{} stations {}x{}B vertices {}x{}B faces {}x{}B origin ({:.3}, {:.3}, {:.3}) [{}]",
            self.file_pos,
            self.station_count,
            self.station_size,
            self.vertex_count,
            self.vertex_size,
            self.face_count,
            self.face_size,
            self.local_origin.x,
            self.local_origin.y,
            self.local_origin.z,
            self.cell_type
        )
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;
    use crate::testdata::{encode_footer, encode_header};

    fn header_bytes(
        signature: &[u8; 4],
        footer_offset: i64,
        cell_count: i64,
        footer_size: i32,
    ) -> Vec<u8> {
        encode_header(&MainHeader {
            signature: *signature,
            format_version: 995,
            flags: 0,
            footer_offset,
            cell_count,
            footer_size,
        })
    }

    #[test]
    fn header_fields_are_read_unpadded() {
        let bytes = header_bytes(b"CFCL", 1032, 3, 104);
        assert_eq!(HEADER_SIZE, bytes.len());
        let header = MainHeader::parse(&bytes).unwrap();
        assert_eq!(995, header.format_version);
        assert_eq!(1032, header.footer_offset);
        assert_eq!(3, header.cell_count);
        assert_eq!(104, header.footer_size);
        assert_eq!(1000, header.cell_data_len().unwrap());
        assert_eq!(312, header.footer_table_len().unwrap());
    }

    #[test]
    fn header_from_stream_leaves_the_rest() {
        let mut bytes = header_bytes(b"CFCL", 32, 0, 104);
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut source = &bytes[..];
        MainHeader::read(&mut source).unwrap();
        assert_eq!(&[1, 2, 3], source);
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let bytes = header_bytes(b"CFCX", 32, 0, 104);
        match MainHeader::parse(&bytes) {
            Err(CellsError::InvalidSignature(sig)) => assert_eq!(*b"CFCX", sig),
            other => panic!("expected InvalidSignature, got {:?}", other),
        }
    }

    #[test]
    fn short_header_is_an_io_error() {
        let bytes = b"CFCL\x01\x00";
        let mut source = &bytes[..];
        match MainHeader::read(&mut source) {
            Err(CellsError::Io { stage, .. }) => assert_eq!(Stage::Header, stage),
            other => panic!("expected Io, got {:?}", other),
        }
    }

    #[test]
    fn impossible_sizes_are_rejected() {
        for bytes in [
            header_bytes(b"CFCL", 16, 0, 104),
            header_bytes(b"CFCL", 32, -1, 104),
            header_bytes(b"CFCL", 32, 1, 100),
            header_bytes(b"CFCL", 32, i64::MAX, 104),
        ] {
            assert!(
                matches!(MainHeader::parse(&bytes), Err(CellsError::InvalidHeader(_))),
                "{:?}",
                MainHeader::parse(&bytes)
            );
        }
    }

    #[test]
    fn footer_round_trips_through_the_table() {
        let footer = CellFooter {
            file_pos: 32,
            cell_type: CellType::VERTEX_HAS_POSITION | CellType::FACE_HAS_TEXMAP_ID,
            station_count: 1,
            vertex_count: 2,
            face_count: 3,
            station_size: 36,
            vertex_size: 12,
            face_size: 16,
            primary_station: -7,
            local_origin: DVec3::new(336825.5, 5898525.25, 12.0),
            bounding_box: [0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        };
        let mut table = encode_footer(&footer);
        assert_eq!(FOOTER_SIZE, table.len());
        // A second record with trailing padding, as a newer writer might produce.
        let stride = FOOTER_SIZE + 8;
        table.extend_from_slice(&[0; 8]);
        table.extend(encode_footer(&footer));
        table.extend_from_slice(&[0xee; 8]);

        let footers = CellFooter::parse_table(&table, 2, stride).unwrap();
        assert_eq!(vec![footer.clone(), footer], footers);
    }

    #[test]
    fn short_footer_table_is_truncated() {
        let table = vec![0u8; FOOTER_SIZE * 2 - 1];
        assert!(matches!(
            CellFooter::parse_table(&table, 2, FOOTER_SIZE),
            Err(CellsError::Truncated(_))
        ));
    }

    #[test]
    fn fields_follow_record_order() {
        let cell_type = CellType::VERTEX_HAS_CONFIDENCE_VALUE
            | CellType::VERTEX_HAS_POSITION
            | CellType::VERTEX_HAS_NORMAL
            | CellType::STATION_HAS_POSITION
            | CellType::STATION_HAS_ID;
        assert_eq!(
            vec![
                VertexField::Position,
                VertexField::Normal,
                VertexField::Confidence
            ],
            cell_type.vertex_fields()
        );
        assert_eq!(
            vec![StationField::Id, StationField::Position],
            cell_type.station_fields()
        );
        assert_eq!(
            24,
            layout_width(&cell_type.vertex_fields(), VertexField::width)
        );
        assert_eq!(0, cell_type.face_width());
    }

    #[test]
    fn display_names_flags() {
        let cell_type = CellType::VERTEX_HAS_POSITION | CellType::FACE_HAS_VERTEX_INDICES;
        assert_eq!(
            "VERTEX_HAS_POSITION|FACE_HAS_VERTEX_INDICES",
            cell_type.to_string()
        );
        assert_eq!(
            "VERTEX_HAS_COLOR|0x00000200",
            (CellType::VERTEX_HAS_COLOR | CellType::from_bits_retain(0x200)).to_string()
        );
        assert_eq!("0x00000000", CellType::empty().to_string());
    }
}
