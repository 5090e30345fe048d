use crate::error::Truncated;

/// Describes a fixed-width little-endian type that can be used with DataReader::read().
pub(crate) trait Readable: Sized + Copy + Default {
    const WIDTH: usize;

    /// Decodes the value from exactly WIDTH bytes.
    fn from_le(bytes: &[u8]) -> Self;
}

macro_rules! readable {
    ($($t:ty),*) => {
        $(
            impl Readable for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn from_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

readable!(u8, u16, u32, i32, i64, f32, f64);

/// This is a wrapper around a byte slice that keeps a position and enables easy parsing.
///
/// Every read is checked against the end of the slice. A failed read returns Truncated and
/// leaves the position where it was.
#[derive(Debug, Clone)]
pub(crate) struct DataReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DataReader<'a> {
    /// Creates a reader over the given slice and sets the position to the beginning.
    pub(crate) fn new(data: &'a [u8]) -> DataReader<'a> {
        DataReader { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns the next n bytes and advances past them.
    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], Truncated> {
        if n > self.remaining() {
            return Err(Truncated {
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let result = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(result)
    }

    pub(crate) fn read<T: Readable>(&mut self) -> Result<T, Truncated> {
        self.bytes(T::WIDTH).map(T::from_le)
    }

    /// Reads N consecutive values. Either all of them are read or none are.
    pub(crate) fn read_array<T: Readable, const N: usize>(&mut self) -> Result<[T; N], Truncated> {
        let bytes = self.bytes(T::WIDTH * N)?;
        let mut result = [T::default(); N];
        for (value, chunk) in result.iter_mut().zip(bytes.chunks_exact(T::WIDTH)) {
            *value = T::from_le(chunk);
        }
        Ok(result)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Truncated> {
        self.read()
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Truncated> {
        self.read()
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, Truncated> {
        self.read()
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, Truncated> {
        self.read()
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32, Truncated> {
        self.read()
    }
}
