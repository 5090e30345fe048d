use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for whole-file operations.
pub type Result<T> = std::result::Result<T, CellsError>;

/// The part of the file being read when a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Header,
    CellData,
    Footers,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Header => write!(f, "main header"),
            Stage::CellData => write!(f, "cell data"),
            Stage::Footers => write!(f, "cell footers"),
        }
    }
}

/// A read ran past the end of the bytes it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("needed {needed} bytes at offset {offset} but only {remaining} remain")]
pub struct Truncated {
    pub offset: usize,
    pub needed: usize,
    pub remaining: usize,
}

/// Errors that abort decoding of the whole file. No partial scene is produced.
#[derive(Debug, Error)]
pub enum CellsError {
    /// The first four bytes are not "CFCL".
    #[error("invalid signature: expected \"CFCL\", got {0:?}")]
    InvalidSignature([u8; 4]),

    /// A header field is outside of what the format allows.
    #[error("invalid main header: {0}")]
    InvalidHeader(String),

    /// The underlying stream failed or ended early.
    #[error("couldn't read {stage}{}: {source}", describe_io(.source))]
    Io {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    /// The file named by the caller couldn't be opened.
    #[error("couldn't open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// One of the two bulk blobs couldn't be allocated.
    #[error("couldn't allocate {size} bytes for {stage}")]
    Allocation { stage: Stage, size: usize },

    /// A fixed-size record was shorter than its layout.
    #[error("truncated record: {0}")]
    Truncated(#[from] Truncated),
}

impl CellsError {
    pub(crate) fn io(stage: Stage, source: io::Error) -> CellsError {
        CellsError::Io { stage, source }
    }
}

fn describe_io(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => " (end of stream)",
        io::ErrorKind::InvalidData => " (corrupted stream)",
        _ => "",
    }
}

/// Errors scoped to a single cell. The cell is skipped and decoding continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("cell data [{start}..{end}) is not within the data block of {data_len} bytes")]
    OutOfRange {
        start: i128,
        end: i128,
        data_len: usize,
    },

    #[error("cannot handle a vertex with no position")]
    MissingPosition,

    #[error("{record} records are {size} bytes but their fields need {needed}")]
    RecordTooSmall {
        record: &'static str,
        size: i32,
        needed: usize,
    },

    #[error("face {face} references vertex {index} but the cell has {vertex_count} vertices")]
    IndexOutOfRange {
        face: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("couldn't allocate {count} {what}")]
    Allocation { what: &'static str, count: usize },

    #[error("truncated record: {0}")]
    Truncated(#[from] Truncated),
}
