use crate::error::FormatError;
use crate::format::n5::DataType;

/// Element types that can be stored in a [`VolumeArray`].
pub trait Element: Copy + Send + Sync + 'static {
    /// Matching N5 data type
    const DATA_TYPE: DataType;

    /// Append the little-endian bytes of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Read one element from exactly `size_of::<Self>()` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dt:expr),* $(,)?) => {
        $(
            impl Element for $ty {
                const DATA_TYPE: DataType = $dt;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_element! {
    u8 => DataType::Uint8,
    u16 => DataType::Uint16,
    u32 => DataType::Uint32,
    u64 => DataType::Uint64,
    i8 => DataType::Int8,
    i16 => DataType::Int16,
    i32 => DataType::Int32,
    i64 => DataType::Int64,
    f32 => DataType::Float32,
    f64 => DataType::Float64,
}

/// A fully materialised volume held in memory.
///
/// Samples are stored little-endian in C order: the last axis varies
/// fastest, matching the slow-to-fast axis order of [`LazyVolume`].
///
/// [`LazyVolume`]: super::LazyVolume
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeArray {
    shape: Vec<usize>,
    data_type: DataType,
    data: Vec<u8>,
}

impl VolumeArray {
    /// Wrap raw little-endian sample bytes.
    pub fn new(shape: Vec<usize>, data_type: DataType, data: Vec<u8>) -> Result<Self, FormatError> {
        let expected = shape.iter().product::<usize>() * data_type.size();
        if data.len() != expected {
            return Err(FormatError::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape,
            data_type,
            data,
        })
    }

    /// A zero-filled volume.
    pub fn zeros(shape: Vec<usize>, data_type: DataType) -> Self {
        let len = shape.iter().product::<usize>() * data_type.size();
        Self {
            shape,
            data_type,
            data: vec![0; len],
        }
    }

    /// Build a volume from typed samples in C order.
    pub fn from_elements<T: Element>(shape: Vec<usize>, values: &[T]) -> Result<Self, FormatError> {
        let mut data = Vec::with_capacity(values.len() * T::DATA_TYPE.size());
        for &v in values {
            v.write_le(&mut data);
        }
        Self::new(shape, T::DATA_TYPE, data)
    }

    /// Copy the samples out as typed values.
    ///
    /// Fails if `T` does not match the stored data type.
    pub fn to_elements<T: Element>(&self) -> Result<Vec<T>, FormatError> {
        if T::DATA_TYPE != self.data_type {
            return Err(FormatError::DataTypeMismatch {
                stored: self.data_type.name(),
                requested: T::DATA_TYPE.name(),
            });
        }
        Ok(self
            .data
            .chunks_exact(self.data_type.size())
            .map(T::read_le)
            .collect())
    }

    /// Extent along each axis, slowest first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Element type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Number of samples.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Raw little-endian sample bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the volume, returning its sample bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Sample `index` (flat C-order index) widened to `f64`.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub fn value_f64(&self, index: usize) -> f64 {
        let size = self.data_type.size();
        let bytes = &self.data[index * size..(index + 1) * size];
        match self.data_type {
            DataType::Uint8 => u8::read_le(bytes) as f64,
            DataType::Uint16 => u16::read_le(bytes) as f64,
            DataType::Uint32 => u32::read_le(bytes) as f64,
            DataType::Uint64 => u64::read_le(bytes) as f64,
            DataType::Int8 => i8::read_le(bytes) as f64,
            DataType::Int16 => i16::read_le(bytes) as f64,
            DataType::Int32 => i32::read_le(bytes) as f64,
            DataType::Int64 => i64::read_le(bytes) as f64,
            DataType::Float32 => f32::read_le(bytes) as f64,
            DataType::Float64 => f64::read_le(bytes),
        }
    }

    /// Smallest and largest finite sample, or `None` if there are none.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        (0..self.element_count())
            .map(|i| self.value_f64(i))
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
